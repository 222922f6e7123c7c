//! Collecting produced packages into the output directory.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const LOCK_FILE_NAME: &str = ".dep-builder.lock";

/// A package copied into the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedOutput {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
}

impl CollectedOutput {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Copy `produced` to `<output_dir>/<filename>` and hash it. The copy goes
/// through a temporary file so a reader never sees a partial package.
pub fn collect_file(produced: &Path, output_dir: &Path, filename: &str) -> Result<CollectedOutput> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating output directory '{}'", output_dir.display()))?;
    let dest = output_dir.join(filename);
    let tmp = output_dir.join(format!(".{filename}.{}", tmp_suffix()));
    fs::copy(produced, &tmp).with_context(|| {
        format!("copying '{}' to '{}'", produced.display(), tmp.display())
    })?;
    if let Err(err) = fs::rename(&tmp, &dest) {
        let _ = fs::remove_file(&tmp);
        return Err(err).with_context(|| format!("moving package into '{}'", dest.display()));
    }

    let (sha256, size_bytes) = sha256_file(&dest)?;
    Ok(CollectedOutput {
        path: dest,
        sha256,
        size_bytes,
    })
}

pub fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let f = File::open(path).with_context(|| format!("opening '{}'", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = r
            .read(&mut buf)
            .with_context(|| format!("reading '{}'", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}

pub(crate) fn tmp_suffix() -> String {
    let n = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{}-{n}", std::process::id())
}

/// Exclusive advisory lock on an output directory, held for a whole run.
#[derive(Debug)]
pub struct OutputLock {
    _file: File,
    path: PathBuf,
}

impl OutputLock {
    pub fn acquire(output_dir: &Path) -> Result<Self> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("creating output directory '{}'", output_dir.display()))?;
        let path = output_dir.join(LOCK_FILE_NAME);

        // A stale lock file is left in place; unlinking a file another
        // process still holds locked would let two runs lock it at once.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("creating lock file '{}'", path.display()))?;
        if file.try_lock_exclusive().is_err() {
            anyhow::bail!(
                "output directory '{}' is in use by another dep-builder run (lock: {})",
                output_dir.display(),
                path.display()
            );
        }
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collected_package_is_renamed_and_hashed() {
        let temp = tempfile::TempDir::new().unwrap();
        let produced = temp.path().join("six-1.16.0-py3-none-any.whl");
        fs::write(&produced, b"abc").unwrap();

        let output_dir = temp.path().join("dist");
        let collected = collect_file(&produced, &output_dir, "six-1.16.0-py3-none-any.whl").unwrap();
        assert_eq!(collected.path, output_dir.join("six-1.16.0-py3-none-any.whl"));
        assert_eq!(
            collected.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(collected.size_bytes, 3);
        assert_eq!(collected.file_name(), "six-1.16.0-py3-none-any.whl");

        let leftovers = fs::read_dir(&output_dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|item| item.file_name().to_string_lossy().starts_with('.'))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn second_lock_on_output_dir_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let first = OutputLock::acquire(temp.path()).unwrap();
        assert!(first.path().is_file());
        let err = OutputLock::acquire(temp.path()).unwrap_err();
        assert!(err.to_string().contains("in use by another dep-builder run"));
        drop(first);
        assert!(OutputLock::acquire(temp.path()).is_ok());
    }
}

//! Source archives: locating, unpacking and repacking.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::Builder as TarBuilder;
use walkdir::WalkDir;

use crate::manifest::DependencyEntry;

/// Archive extensions accepted in the sources directory, in lookup order.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["tar.gz", "tgz", "tar.zst", "tar"];

/// `<sources>/<source-name>-<version>.<ext>` for the first extension that
/// exists.
pub fn locate_archive(sources_dir: &Path, entry: &DependencyEntry) -> Option<PathBuf> {
    let stem = format!("{}-{}", entry.source_name(), entry.version_string());
    ARCHIVE_EXTENSIONS
        .iter()
        .map(|ext| sources_dir.join(format!("{stem}.{ext}")))
        .find(|path| path.is_file())
}

/// Unpack `archive` into `dest` and return the single top-level directory
/// it contained.
pub fn extract_source(archive: &Path, dest: &Path) -> Result<PathBuf> {
    let file =
        File::open(archive).with_context(|| format!("opening archive '{}'", archive.display()))?;
    let name = archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let reader: Box<dyn Read> = if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else if name.ends_with(".tar.zst") {
        Box::new(
            zstd::stream::Decoder::new(file)
                .with_context(|| format!("reading zstd archive '{}'", archive.display()))?,
        )
    } else {
        Box::new(BufReader::new(file))
    };

    fs::create_dir_all(dest).with_context(|| format!("creating '{}'", dest.display()))?;
    let mut unpacked = tar::Archive::new(reader);
    unpacked
        .unpack(dest)
        .with_context(|| format!("unpacking '{}'", archive.display()))?;

    let mut top_level = Vec::new();
    for item in fs::read_dir(dest).with_context(|| format!("reading '{}'", dest.display()))? {
        let item = item.with_context(|| format!("reading '{}'", dest.display()))?;
        top_level.push(item.path());
    }
    match top_level.as_slice() {
        [dir] if dir.is_dir() => Ok(dir.clone()),
        _ => bail!(
            "archive '{}' must contain exactly one top-level directory, found {} entries",
            archive.display(),
            top_level.len()
        ),
    }
}

/// Rename the extracted `tree` to `name` within its parent, so trees from
/// archives like `six-release-1.16.0.tar.gz` get the usual
/// `<source-name>-<version>` directory.
pub fn rename_tree(tree: &Path, name: &str) -> Result<PathBuf> {
    let renamed = tree.with_file_name(name);
    if renamed == tree {
        return Ok(renamed);
    }
    if renamed.exists() {
        bail!("cannot rename '{}': '{}' already exists", tree.display(), renamed.display());
    }
    fs::rename(tree, &renamed)
        .with_context(|| format!("renaming '{}' to '{}'", tree.display(), renamed.display()))?;
    Ok(renamed)
}

/// Write `tree` as a gzip tarball at `out` with every path below `prefix`.
///
/// Entries are sorted and carry no owner or timestamp, so equal trees give
/// byte-identical archives.
pub fn pack_tree(tree: &Path, prefix: &str, out: &Path) -> Result<()> {
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(out).with_context(|| format!("creating '{}'", out.display()))?;
    let mut builder = TarBuilder::new(GzEncoder::new(file, Compression::default()));

    let mut entries = WalkDir::new(tree)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .map(|item| item.into_path())
        .collect::<Vec<_>>();
    entries.sort();

    for path in entries {
        let rel = path.strip_prefix(tree).unwrap_or(&path);
        let name = if rel.as_os_str().is_empty() {
            PathBuf::from(prefix)
        } else {
            Path::new(prefix).join(rel)
        };

        let md = fs::symlink_metadata(&path)
            .with_context(|| format!("reading metadata of '{}'", path.display()))?;
        let mut header = tar::Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mode(file_mode(&md));

        if md.is_dir() {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            header.set_cksum();
            builder.append_data(&mut header, &name, std::io::empty())?;
        } else if md.file_type().is_symlink() {
            let target = fs::read_link(&path)?;
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
            builder.append_link(&mut header, &name, &target)?;
        } else {
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(md.len());
            header.set_cksum();
            let data = File::open(&path)
                .with_context(|| format!("opening '{}'", path.display()))?;
            builder.append_data(&mut header, &name, data)?;
        }
    }

    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .with_context(|| format!("finishing '{}'", out.display()))?;
    Ok(())
}

#[cfg(unix)]
fn file_mode(md: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    md.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(md: &fs::Metadata) -> u32 {
    if md.is_dir() {
        0o755
    } else {
        0o644
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Track;
    use crate::manifest::Manifest;

    fn entry() -> DependencyEntry {
        let manifest = Manifest::parse(
            "[[dependency]]\nname = \"six\"\nversion = \"1.16.0\"\n",
            Path::new("dependencies.toml"),
            &Track::default(),
        )
        .unwrap();
        manifest.entries()[0].clone()
    }

    fn sample_tree(root: &Path) -> PathBuf {
        let tree = root.join("tree");
        fs::create_dir_all(tree.join("six")).unwrap();
        fs::write(tree.join("setup.py"), "from setuptools import setup\n").unwrap();
        fs::write(tree.join("six/__init__.py"), "").unwrap();
        tree
    }

    #[test]
    fn locates_archives_by_extension_order() {
        let temp = tempfile::TempDir::new().unwrap();
        assert_eq!(locate_archive(temp.path(), &entry()), None);

        fs::write(temp.path().join("six-1.16.0.tar"), b"").unwrap();
        fs::write(temp.path().join("six-1.16.0.tgz"), b"").unwrap();
        assert_eq!(
            locate_archive(temp.path(), &entry()),
            Some(temp.path().join("six-1.16.0.tgz"))
        );
    }

    #[test]
    fn pack_then_extract_yields_prefixed_tree() {
        let temp = tempfile::TempDir::new().unwrap();
        let tree = sample_tree(temp.path());
        let archive = temp.path().join("six-1.16.0.tar.gz");
        pack_tree(&tree, "six-1.16.0", &archive).unwrap();

        let extracted = extract_source(&archive, &temp.path().join("out")).unwrap();
        assert_eq!(extracted, temp.path().join("out/six-1.16.0"));
        assert!(extracted.join("six/__init__.py").is_file());
    }

    #[test]
    fn packing_is_deterministic() {
        let temp = tempfile::TempDir::new().unwrap();
        let tree = sample_tree(temp.path());
        let first = temp.path().join("a.tar.gz");
        let second = temp.path().join("b.tar.gz");
        pack_tree(&tree, "six-1.16.0", &first).unwrap();
        pack_tree(&tree, "six-1.16.0", &second).unwrap();
        assert_eq!(fs::read(first).unwrap(), fs::read(second).unwrap());
    }

    #[test]
    fn extracts_zstd_archives() {
        let temp = tempfile::TempDir::new().unwrap();
        let tree = sample_tree(temp.path());
        let archive = temp.path().join("six-1.16.0.tar.zst");
        {
            let file = File::create(&archive).unwrap();
            let encoder = zstd::stream::Encoder::new(file, 3).unwrap().auto_finish();
            let mut builder = TarBuilder::new(encoder);
            builder.append_dir_all("six-1.16.0", &tree).unwrap();
            builder.finish().unwrap();
        }
        let extracted = extract_source(&archive, &temp.path().join("out")).unwrap();
        assert!(extracted.join("setup.py").is_file());
    }

    #[test]
    fn differently_named_tree_is_renamed() {
        let temp = tempfile::TempDir::new().unwrap();
        let tree = sample_tree(temp.path());
        let archive = temp.path().join("six-1.16.0.tar.gz");
        pack_tree(&tree, "six-release-1.16.0", &archive).unwrap();

        let extracted = extract_source(&archive, &temp.path().join("out")).unwrap();
        assert_eq!(extracted, temp.path().join("out/six-release-1.16.0"));
        let renamed = rename_tree(&extracted, "six-1.16.0").unwrap();
        assert_eq!(renamed, temp.path().join("out/six-1.16.0"));
        assert!(renamed.join("setup.py").is_file());
        assert!(!extracted.exists());

        assert_eq!(rename_tree(&renamed, "six-1.16.0").unwrap(), renamed);
    }

    #[test]
    fn flat_archives_are_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        let archive = temp.path().join("six-1.16.0.tar");
        {
            let mut builder = TarBuilder::new(File::create(&archive).unwrap());
            let mut header = tar::Header::new_gnu();
            header.set_size(3);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, "README", &b"hi\n"[..]).unwrap();
            builder.finish().unwrap();
        }
        let err = extract_source(&archive, &temp.path().join("out")).unwrap_err();
        assert!(err.to_string().contains("exactly one top-level directory"));
    }
}

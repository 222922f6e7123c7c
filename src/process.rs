//! External tool invocations.
//!
//! Output of a running tool is drained by reader threads while the caller
//! polls for exit and the optional timeout; an expired tool is killed.

use std::ffi::OsStr;
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::ToolError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Packaging tools the builder drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    DpkgBuildpackage,
    DpkgSource,
    Rpmbuild,
    Python,
    Patch,
    Make,
    Shell,
    Docker,
}

impl Tool {
    pub const ALL: [Tool; 8] = [
        Tool::DpkgBuildpackage,
        Tool::DpkgSource,
        Tool::Rpmbuild,
        Tool::Python,
        Tool::Patch,
        Tool::Make,
        Tool::Shell,
        Tool::Docker,
    ];

    /// Program name looked up in `PATH`.
    pub fn program(self) -> &'static str {
        match self {
            Tool::DpkgBuildpackage => "dpkg-buildpackage",
            Tool::DpkgSource => "dpkg-source",
            Tool::Rpmbuild => "rpmbuild",
            Tool::Python => "python3",
            Tool::Patch => "patch",
            Tool::Make => "make",
            Tool::Shell => "sh",
            Tool::Docker => "docker",
        }
    }

    /// Distribution package that provides the tool.
    pub fn package(self) -> &'static str {
        match self {
            Tool::DpkgBuildpackage | Tool::DpkgSource => "dpkg-dev",
            Tool::Rpmbuild => "rpm-build",
            Tool::Python => "python3",
            Tool::Patch => "patch",
            Tool::Make => "make",
            Tool::Shell => "dash",
            Tool::Docker => "docker.io",
        }
    }

    /// Environment variable overriding the tool path.
    pub fn env_var(self) -> Option<&'static str> {
        match self {
            Tool::DpkgBuildpackage => Some("DEP_BUILDER_DPKG_BUILDPACKAGE"),
            Tool::Rpmbuild => Some("DEP_BUILDER_RPMBUILD"),
            Tool::Python => Some("DEP_BUILDER_PYTHON"),
            Tool::Docker => Some("DEP_BUILDER_DOCKER"),
            _ => None,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// One tool run inside an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub tool: Tool,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(tool: Tool, cwd: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            args: Vec::new(),
            cwd: cwd.into(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Shell-like rendering for logs and error messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.tool.program())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Exit code and combined stdout/stderr of a finished tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub code: Option<i32>,
    pub output: String,
}

/// Run `invocation` with `program` as the executable.
pub fn run_invocation(
    program: &Path,
    invocation: &Invocation,
    timeout: Option<Duration>,
) -> Result<ToolOutput, ToolError> {
    let mut command = Command::new(program);
    command.args(&invocation.args).current_dir(&invocation.cwd);
    for (key, value) in &invocation.env {
        command.env(key, value);
    }
    run_command(command, &invocation.command_line(), timeout)
}

/// Spawn `command`, capture its output and wait for it. A non-zero exit is
/// a [`ToolError::Failed`] carrying the captured output.
pub fn run_command(
    mut command: Command,
    label: &str,
    timeout: Option<Duration>,
) -> Result<ToolOutput, ToolError> {
    debug!(command = label, "running");
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .spawn()
        .map_err(|source| ToolError::Spawn { program, source })?;

    let (tx, rx) = mpsc::channel();
    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(stderr, tx.clone());
    }
    drop(tx);

    let start = Instant::now();
    let mut lines = Vec::new();
    let mut readers_done = false;
    let status = loop {
        if let Some(limit) = timeout.filter(|limit| start.elapsed() > *limit) {
            let _ = child.kill();
            let _ = child.wait();
            lines.extend(rx.try_iter());
            return Err(ToolError::TimedOut {
                command: label.to_string(),
                after: limit,
                output: lines.join("\n"),
            });
        }

        // Both pipes closed does not mean the tool exited.
        if readers_done {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    return Err(ToolError::Spawn {
                        program: label.to_string(),
                        source,
                    })
                }
            }
            continue;
        }

        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                debug!(target: "dep_builder::tool", "{}", line);
                lines.push(line);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => readers_done = true,
        }
    };

    let output = ToolOutput {
        code: status.code(),
        output: lines.join("\n"),
    };
    if !status.success() {
        return Err(ToolError::Failed {
            command: label.to_string(),
            code: output.code,
            output: output.output,
        });
    }
    Ok(output)
}

fn spawn_reader<R: Read + Send + 'static>(stream: R, tx: mpsc::Sender<String>) {
    std::thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

/// Resolve `name` in `PATH`.
pub fn find_program(name: impl AsRef<OsStr>) -> Option<PathBuf> {
    which::which(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.args(["-c", script]);
        command
    }

    #[test]
    fn captures_stdout_and_stderr() {
        let output = run_command(sh("echo out; echo err >&2"), "sh", None).unwrap();
        assert_eq!(output.code, Some(0));
        assert!(output.output.contains("out"));
        assert!(output.output.contains("err"));
    }

    #[test]
    fn non_zero_exit_is_failed_with_output() {
        let err = run_command(sh("echo broken; exit 3"), "sh -c", None).unwrap_err();
        match err {
            ToolError::Failed { code, output, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(output, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn expired_tool_is_killed() {
        let start = Instant::now();
        let err = run_command(
            sh("echo started; exec sleep 30"),
            "sleep",
            Some(Duration::from_millis(300)),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }), "{err}");
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn tool_that_closes_its_output_still_times_out() {
        let start = Instant::now();
        let err = run_command(
            sh("exec >/dev/null 2>&1; sleep 30"),
            "sh -c",
            Some(Duration::from_millis(500)),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }), "{err}");
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn exit_after_closing_output_is_reported() {
        let output = run_command(
            sh("echo before; exec >/dev/null 2>&1; sleep 0.3; exit 0"),
            "sh -c",
            Some(Duration::from_secs(20)),
        )
        .unwrap();
        assert_eq!(output.output, "before");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let invocation = Invocation::new(Tool::Make, ".");
        let err = run_invocation(Path::new("/nonexistent/make-xyz"), &invocation, None).unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[test]
    fn command_line_joins_program_and_args() {
        let invocation = Invocation::new(Tool::DpkgBuildpackage, "/tmp")
            .args(["-uc", "-us"])
            .arg("-b");
        assert_eq!(invocation.command_line(), "dpkg-buildpackage -uc -us -b");
    }
}

//! External tool execution.
//!
//! Every external tool the builder drives (mtools, sfdisk, gzip, the boot
//! loader installer) goes through [`Cmd`]. A command is an argument list,
//! never an interpolated shell string. Execution is delegated to a
//! [`ToolInvoker`] so pipelines can be driven by a fake in tests.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{BuildError, IoContext, Result};
use crate::preflight::package_for;

/// Result of a command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    /// Exit code, `None` if terminated by signal.
    pub code: Option<i32>,
    /// Captured stdout (empty when stdout was redirected to a file).
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CommandResult {
    /// A successful result with no output.
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            ..Self::default()
        }
    }

    /// A failed result with the given exit code and stderr text.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Get the exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.code.unwrap_or(-1)
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }

    /// stderr followed by stdout, for failure diagnostics.
    pub fn combined_output(&self) -> String {
        let mut out = String::new();
        out.push_str(self.stderr_trimmed());
        let stdout = self.stdout_trimmed();
        if !stdout.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(stdout);
        }
        out
    }
}

/// Executes a [`Cmd`] and reports what happened.
///
/// Implementations only spawn and collect; exit-status policy is applied
/// by [`Cmd::run_with`] so every invoker fails the same way.
pub trait ToolInvoker {
    fn execute(&self, cmd: &Cmd) -> Result<CommandResult>;

    /// Resolve a program name to an executable path.
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which(program)
    }
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInvoker;

impl ToolInvoker for SystemInvoker {
    fn execute(&self, cmd: &Cmd) -> Result<CommandResult> {
        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);

        for key in &cmd.env_removes {
            command.env_remove(key);
        }
        for (key, value) in &cmd.envs {
            command.env(key, value);
        }
        if let Some(ref dir) = cmd.current_dir {
            command.current_dir(dir);
        }

        match cmd.stdin_file {
            Some(ref path) => {
                let file = File::open(path)
                    .io_context(|| format!("failed to open stdin file {}", path.display()))?;
                command.stdin(file);
            }
            None => {
                command.stdin(Stdio::null());
            }
        }
        if let Some(ref path) = cmd.stdout_file {
            let file = File::create(path)
                .io_context(|| format!("failed to create stdout file {}", path.display()))?;
            command.stdout(file);
        }

        let output = command.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BuildError::MissingTool {
                    tool: cmd.program.clone(),
                    package: package_for(&cmd.program).to_string(),
                }
            } else {
                BuildError::io(format!("failed to execute '{}'", cmd.program), e)
            }
        })?;

        Ok(CommandResult {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Builder for configuring command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    env_removes: Vec<String>,
    current_dir: Option<PathBuf>,
    stdin_file: Option<PathBuf>,
    stdout_file: Option<PathBuf>,
}

impl Cmd {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            envs: Vec::new(),
            env_removes: Vec::new(),
            current_dir: None,
            stdin_file: None,
            stdout_file: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set an environment variable for the child only.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.envs
            .push((key.as_ref().to_string(), value.as_ref().to_string()));
        self
    }

    /// Apply a list of environment variables.
    pub fn envs<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = &'a (String, String)>,
    {
        for (key, value) in vars {
            self.envs.push((key.clone(), value.clone()));
        }
        self
    }

    /// Remove an inherited environment variable from the child.
    pub fn env_remove(mut self, key: impl AsRef<str>) -> Self {
        self.env_removes.push(key.as_ref().to_string());
        self
    }

    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Feed the contents of a file to the child's stdin.
    pub fn stdin_file(mut self, path: &Path) -> Self {
        self.stdin_file = Some(path.to_path_buf());
        self
    }

    /// Redirect the child's stdout into a file (created or truncated).
    pub fn stdout_file(mut self, path: &Path) -> Self {
        self.stdout_file = Some(path.to_path_buf());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_envs(&self) -> &[(String, String)] {
        &self.envs
    }

    pub fn get_env_removes(&self) -> &[String] {
        &self.env_removes
    }

    pub fn get_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn get_stdin_file(&self) -> Option<&Path> {
        self.stdin_file.as_deref()
    }

    pub fn get_stdout_file(&self) -> Option<&Path> {
        self.stdout_file.as_deref()
    }

    /// Human-readable command line, quoted for copy-paste into a shell.
    pub fn command_line(&self) -> String {
        let mut parts = Vec::new();
        for (key, value) in &self.envs {
            parts.push(format!("{}={}", key, quote(value)));
        }
        parts.push(quote(&self.program));
        parts.extend(self.args.iter().map(|a| quote(a)));
        if let Some(ref path) = self.stdin_file {
            parts.push(format!("< {}", quote(&path.to_string_lossy())));
        }
        if let Some(ref path) = self.stdout_file {
            parts.push(format!("> {}", quote(&path.to_string_lossy())));
        }
        parts.join(" ")
    }

    /// Run the command on the host.
    pub fn run(self) -> Result<CommandResult> {
        self.run_with(&SystemInvoker)
    }

    /// Run the command through the given invoker.
    ///
    /// Non-zero exit becomes [`BuildError::ExternalCommand`] carrying the
    /// command line and captured output.
    pub fn run_with(&self, invoker: &dyn ToolInvoker) -> Result<CommandResult> {
        let line = self.command_line();
        debug!(command = %line, "running");

        let result = invoker.execute(self)?;

        if !result.success() {
            return Err(BuildError::ExternalCommand {
                command: line,
                code: result.code(),
                output: result.combined_output(),
            });
        }

        Ok(result)
    }
}

fn quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || matches!(c, '/' | '.' | '-' | '_' | ':' | '@' | '=' | ',' | '+')
        });
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Check if a program exists in PATH.
///
/// Returns the full path if found, None otherwise.
pub fn which(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Check if a program exists in PATH (bool version).
pub fn exists(program: &str) -> bool {
    which(program).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_run_success() {
        let result = Cmd::new("echo").arg("hello").run().unwrap();
        assert!(result.success());
        assert_eq!(result.stdout_trimmed(), "hello");
    }

    #[test]
    fn test_run_failure_carries_command_and_output() {
        let err = Cmd::new("ls")
            .arg("/nonexistent_path_12345")
            .run()
            .unwrap_err();

        match err {
            BuildError::ExternalCommand {
                command,
                code,
                output,
            } => {
                assert_eq!(command, "ls /nonexistent_path_12345");
                assert_ne!(code, 0);
                assert!(output.contains("No such file") || output.contains("cannot access"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_program_is_missing_tool() {
        let err = Cmd::new("nonexistent_program_12345").run().unwrap_err();
        assert!(matches!(
            err,
            BuildError::MissingTool { ref tool, .. } if tool == "nonexistent_program_12345"
        ));
    }

    #[test]
    fn test_stdout_redirect() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.txt");
        let result = Cmd::new("echo").arg("redirected").stdout_file(&out).run().unwrap();
        assert!(result.stdout.is_empty());
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "redirected");
    }

    #[test]
    fn test_stdin_from_file() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.txt");
        fs::write(&input, "label: dos\n").unwrap();
        let result = Cmd::new("cat").stdin_file(&input).run().unwrap();
        assert_eq!(result.stdout, "label: dos\n");
    }

    #[test]
    fn test_env_passed_to_child() {
        let result = Cmd::new("sh")
            .args(["-c", "echo $MTOOLS_SKIP_CHECK"])
            .env("MTOOLS_SKIP_CHECK", "1")
            .run()
            .unwrap();
        assert_eq!(result.stdout_trimmed(), "1");
    }

    #[test]
    fn test_run_in_directory() {
        let result = Cmd::new("pwd").dir(Path::new("/tmp")).run().unwrap();
        assert!(result.stdout_trimmed().contains("tmp"));
    }

    #[test]
    fn test_command_line_quotes_only_when_needed() {
        let cmd = Cmd::new("mformat")
            .args(["-i", "/tmp/usb.img@@1048576", "-F", "-v", "RETRO ROCKET", "::"])
            .env("MTOOLS_SKIP_CHECK", "1");
        assert_eq!(
            cmd.command_line(),
            "MTOOLS_SKIP_CHECK=1 mformat -i /tmp/usb.img@@1048576 -F -v 'RETRO ROCKET' ::"
        );
    }

    #[test]
    fn test_command_line_shows_redirects() {
        let cmd = Cmd::new("sfdisk")
            .arg("usb.img")
            .stdin_file(Path::new("/tmp/sfdisk script"));
        assert_eq!(cmd.command_line(), "sfdisk usb.img < '/tmp/sfdisk script'");
    }

    #[test]
    fn test_which() {
        assert!(which("sh").is_some());
        assert!(!exists("nonexistent_program_12345"));
    }

    #[test]
    fn test_combined_output_order() {
        let result = CommandResult {
            code: Some(1),
            stdout: "out\n".into(),
            stderr: "err\n".into(),
        };
        assert_eq!(result.combined_output(), "err\nout");
    }
}

//! Shared test utilities for rrimage tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use rrimage::config::Config;
use rrimage::error::Result;
use rrimage::layout::MIB;
use rrimage::process::{Cmd, CommandResult, ToolInvoker};

/// Bytes the fake gzip writes, so compressed sizes are predictable.
pub const FAKE_GZ: &[u8] = b"\x1f\x8b\x08\x00\x00\x00\x00\x00\x02\x03fake-compressed-payload";

/// Test environment laid out like a Retro Rocket checkout.
///
/// ```text
/// <tmp>/limine/{BOOTX64.EFI, limine-bios.sys, limine}
/// <tmp>/limine-usb.conf
/// <tmp>/work/{limine-hdd.conf, rr.iso, iso/kernel.bin, iso/kernel.sym}
/// ```
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Base directory (where the tool is invoked from)
    pub base_dir: PathBuf,
    /// Limine checkout, `<tmp>/limine` (passed as `LIMINE_DIR`)
    pub limine_dir: PathBuf,
    /// Kernel build output directory, `<base>/iso`
    pub build_dir: PathBuf,
    /// Extra environment for `Config::from_vars`
    pub vars: HashMap<String, String>,
}

impl TestEnv {
    /// Create a new test environment with every input present.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path();

        let base_dir = root.join("work");
        let limine_dir = root.join("limine");
        let build_dir = base_dir.join("iso");

        fs::create_dir_all(&build_dir).expect("Failed to create build dir");
        fs::create_dir_all(&limine_dir).expect("Failed to create limine dir");

        write_sized(&build_dir.join("kernel.bin"), 2 * MIB);
        write_sized(&build_dir.join("kernel.sym"), 100 * 1024);
        write_sized(&base_dir.join("rr.iso"), 5 * MIB);
        fs::write(base_dir.join("limine-hdd.conf"), "timeout: 0\n").expect("write hdd conf");
        fs::write(root.join("limine-usb.conf"), "timeout: 5\n").expect("write usb conf");

        write_sized(&limine_dir.join("BOOTX64.EFI"), 64 * 1024);
        write_sized(&limine_dir.join("limine-bios.sys"), 32 * 1024);
        let installer = limine_dir.join("limine");
        fs::write(&installer, "#!/bin/sh\nexit 0\n").expect("write installer");
        fs::set_permissions(&installer, fs::Permissions::from_mode(0o755))
            .expect("chmod installer");

        let mut vars = HashMap::new();
        vars.insert(
            "LIMINE_DIR".to_string(),
            limine_dir.to_string_lossy().into_owned(),
        );

        Self {
            _temp_dir: temp_dir,
            base_dir,
            limine_dir,
            build_dir,
            vars,
        }
    }

    /// Set a configuration variable.
    pub fn set(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }

    pub fn config(&self) -> Config {
        Config::from_vars(&self.base_dir, &self.vars).expect("valid test config")
    }

    pub fn kernel_sym(&self) -> PathBuf {
        self.build_dir.join("kernel.sym")
    }

    pub fn efi_output(&self) -> PathBuf {
        self.build_dir.join("efi.fat")
    }

    pub fn usb_output(&self) -> PathBuf {
        self.base_dir.join("usb.img")
    }
}

/// Write a file of exactly `len` zero bytes.
pub fn write_sized(path: &Path, len: u64) {
    let file = fs::File::create(path).expect("Failed to create file");
    file.set_len(len).expect("Failed to size file");
}

/// Records every command instead of running it.
///
/// `gzip` is simulated by writing [`FAKE_GZ`] to the redirected stdout, and
/// the contents of any stdin file are captured since scratch files are
/// gone by the time the build returns.
#[derive(Default)]
pub struct RecordingInvoker {
    commands: RefCell<Vec<Cmd>>,
    stdin: RefCell<Vec<String>>,
    fail_on: Option<String>,
    missing: Vec<String>,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every invocation of `program` exit 1.
    pub fn failing_on(program: &str) -> Self {
        Self {
            fail_on: Some(program.to_string()),
            ..Self::default()
        }
    }

    /// Pretend `program` is not installed.
    pub fn without_tool(program: &str) -> Self {
        Self {
            missing: vec![program.to_string()],
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<Cmd> {
        self.commands.borrow().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.commands
            .borrow()
            .iter()
            .map(|c| c.program().to_string())
            .collect()
    }

    /// Command lines of every invocation of `program`.
    pub fn lines_for(&self, program: &str) -> Vec<String> {
        self.commands
            .borrow()
            .iter()
            .filter(|c| c.program() == program)
            .map(|c| c.command_line())
            .collect()
    }

    pub fn stdin_contents(&self) -> Vec<String> {
        self.stdin.borrow().clone()
    }
}

impl ToolInvoker for RecordingInvoker {
    fn execute(&self, cmd: &Cmd) -> Result<CommandResult> {
        self.commands.borrow_mut().push(cmd.clone());

        if let Some(path) = cmd.get_stdin_file() {
            let content = fs::read_to_string(path).unwrap_or_default();
            self.stdin.borrow_mut().push(content);
        }

        if self.fail_on.as_deref() == Some(cmd.program()) {
            return Ok(CommandResult::failed(1, format!("{} failed", cmd.program())));
        }

        if cmd.program() == "gzip" {
            if let Some(out) = cmd.get_stdout_file() {
                fs::write(out, FAKE_GZ).expect("fake gzip write");
            }
        }

        Ok(CommandResult::ok())
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        if self.missing.iter().any(|m| m == program) {
            None
        } else {
            Some(Path::new("/usr/bin").join(program))
        }
    }
}

/// Check that all given tools are on the host.
pub fn host_has(tools: &[&str]) -> bool {
    tools.iter().all(|t| rrimage::process::exists(t))
}

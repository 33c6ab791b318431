//! Stub toolchain for integration tests.
//!
//! The compiler, assembler and broker are small POSIX shell scripts. Their
//! behaviour is steered by markers embedded in the submitted source:
//!
//! | marker            | effect                                        |
//! |-------------------|-----------------------------------------------|
//! | `@compile-error`  | compiler prints a diagnostic and exits 1      |
//! | `@compile-silent` | compiler exits 3 without stderr               |
//! | `@compile-hang`   | compiler sleeps, recording the sleeper's pid  |
//! | `@no-asm`         | compiler exits 0 without writing assembly     |
//! | `@link-error`     | assembler fails                               |
//! | `@run-error`      | produced binary prints, then exits 5          |
//! | `@run-hang`       | produced binary sleeps                        |
//!
//! Without markers the binary prints `7\n`.
#![allow(dead_code)]

use compilebox::{HostEnvironment, Pipeline, PipelineConfig};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const ASSEMBLY_HEADER: &str = "\t.globl main\nmain:\n";
pub const DIAGNOSTIC: &str = "syntax error at line 2";

const COMPILER: &str = r#"#!/bin/sh
src="$1"
here=$(dirname "$0")
dirname "$src" >> "$here/compiler.log"
if grep -q '@compile-error' "$src"; then
    printf 'syntax error at line 2' >&2
    exit 1
fi
if grep -q '@compile-silent' "$src"; then
    exit 3
fi
if grep -q '@compile-hang' "$src"; then
    sleep 30 &
    echo $! > "$here/hang.pid"
    wait
fi
if grep -q '@no-asm' "$src"; then
    echo "nothing to emit"
    exit 0
fi
{ printf '\t.globl main\nmain:\n'; cat "$src"; } > "${src%.*}.s"
"#;

const ASSEMBLER: &str = r#"#!/bin/sh
asm="$1"
out=""
while [ $# -gt 0 ]; do
    if [ "$1" = "-o" ]; then
        shift
        out="$1"
    fi
    shift
done
if grep -q '@link-error' "$asm"; then
    printf 'undefined reference to main' >&2
    exit 1
fi
if grep -q '@run-hang' "$asm"; then
    body='sleep 30'
elif grep -q '@run-error' "$asm"; then
    body='printf partial; exit 5'
else
    body='printf "7\n"'
fi
printf '#!/bin/sh\n%s\n' "$body" > "$out"
chmod +x "$out"
"#;

const BROKER: &str = r#"#!/bin/sh
printf '%s\n' "$*" >> "$(dirname "$0")/broker.log"
exec "$@"
"#;

pub struct StubToolchain {
    _dir: TempDir,
    pub root: PathBuf,
    pub scratch: PathBuf,
}

impl StubToolchain {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("toolchain");
        let scratch = dir.path().join("scratch");
        std::fs::create_dir(&root).unwrap();
        std::fs::create_dir(&scratch).unwrap();

        write_script(&root.join("main.exe"), COMPILER);
        write_script(&root.join("fake-gxx"), ASSEMBLER);
        write_script(&root.join("broker"), BROKER);

        Self {
            _dir: dir,
            root,
            scratch,
        }
    }

    pub fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::for_toolchain_root(self.root.clone());
        config.host = HostEnvironment::Native;
        config.toolchain.assembler = self.root.join("fake-gxx").display().to_string();
        config.toolchain.shell = "sh".to_string();
        config.toolchain.shell_args = vec!["-c".to_string()];
        config.workspace.scratch_root = Some(self.scratch.clone());
        config.limits.compile_timeout_ms = 5_000;
        config.limits.run_timeout_ms = 5_000;
        config
    }

    pub fn delegated_config(&self) -> PipelineConfig {
        let mut config = self.config();
        config.host = HostEnvironment::Delegated;
        config.toolchain.broker = self.root.join("broker").display().to_string();
        config
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.config()).unwrap()
    }

    /// Workspace directories the compiler was invoked in, in call order
    pub fn compiled_workspaces(&self) -> Vec<PathBuf> {
        match std::fs::read_to_string(self.root.join("compiler.log")) {
            Ok(log) => log.lines().map(PathBuf::from).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn broker_calls(&self) -> Vec<String> {
        match std::fs::read_to_string(self.root.join("broker.log")) {
            Ok(log) => log.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Pid of the sleeper started by `@compile-hang`, once recorded
    pub fn hang_pid(&self) -> Option<i32> {
        std::fs::read_to_string(self.root.join("hang.pid"))
            .ok()
            .and_then(|pid| pid.trim().parse().ok())
    }

    /// Entries currently under the scratch root
    pub fn scratch_entries(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.scratch)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }
}

/// True while `pid` names a process that has not exited. Zombies count as gone.
pub fn process_alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => !stat
            .rsplit_once(')')
            .map(|(_, rest)| rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) if Path::new("/proc/self").exists() => false,
        Err(_) => nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok(),
    }
}

pub fn expected_assembly(source: &str) -> String {
    format!("{ASSEMBLY_HEADER}{source}")
}

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use pyrevit_setup_core::machine::{MachineStore, UninstallEntry};
use pyrevit_setup_core::sandbox::FileMachineStore;
use uuid::Uuid;

pub const APP_ID: &str = "9557b432-cf79-4ece-91cf-b8f996c88b47";
pub const SEED_PATH: &str = r"C:\Windows\system32;C:\Windows";

/// 一套隔离的安装环境：安装介质、ProgramData、沙箱注册表、安装目录、钩子日志。
pub struct Sandbox {
    pub root: PathBuf,
    pub media: PathBuf,
    pub program_data: PathBuf,
    pub registry_dir: PathBuf,
    pub install_root: PathBuf,
    pub hook_log: PathBuf,
    _cleanup: CleanupDir,
}

impl Sandbox {
    pub fn new(prefix: &str) -> Self {
        let root = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&root).expect("create temp dir");
        let sandbox = Self {
            media: root.join("media"),
            program_data: root.join("ProgramData"),
            registry_dir: root.join("registry"),
            install_root: root.join("Program Files").join("pyRevit CLI"),
            hook_log: root.join("hooks.log"),
            _cleanup: CleanupDir(root.clone()),
            root,
        };

        write_file(&sandbox.media.join("bin").join("lib").join("core.dll"), "core");
        write_hook_program(&sandbox.media.join("bin").join("pyrevit.exe"));
        sandbox.write_manifest("4.8.16.24121");
        FileMachineStore::new(&sandbox.registry_dir)
            .write_path(SEED_PATH)
            .expect("seed machine PATH");
        sandbox
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.media.join("setup-manifest.json")
    }

    /// 写入（或覆盖）安装介质中的清单。
    pub fn write_manifest(&self, version: &str) {
        let manifest = format!(
            r#"
{{
  "app": {{
    "id": "{APP_ID}",
    "name": "pyRevit CLI",
    "version": "{version}",
    "publisher": "pyRevitLabs",
    "urls": {{ "publisher": "https://pyrevitlabs.io" }}
  }},
  "target": {{ "display_icon": "bin/pyrevit.exe" }},
  "payload": [ {{ "source": "bin", "dest": "bin", "overwrite": "always" }} ],
  "environment": {{ "path_entry": "bin" }},
  "hooks": [
    {{ "trigger": "post_install", "program": "bin/pyrevit.exe",
       "args": ["caches", "clear", "--all"], "description": "Clearing caches...", "timeout_secs": 30 }},
    {{ "trigger": "post_install", "program": "bin/pyrevit.exe",
       "args": ["detach", "--all"], "description": "Detaching existing installs...", "timeout_secs": 30 }},
    {{ "run_once_id": "ClearCaches", "trigger": "pre_uninstall", "program": "bin/pyrevit.exe",
       "args": ["caches", "clear", "--all"], "description": "Clearing caches...", "timeout_secs": 30 }},
    {{ "run_once_id": "DetachClones", "trigger": "pre_uninstall", "program": "bin/pyrevit.exe",
       "args": ["detach", "--all"], "description": "Detaching existing installs...", "timeout_secs": 30 }}
  ]
}}
"#
        );
        write_file(&self.manifest_path(), &manifest);
    }

    /// 以测试环境变量运行 bootstrapper（跳过管理员检查）。
    pub fn run(&self, manifest: &Path, args: &[&str]) -> Output {
        let mut cmd = self.command(env!("CARGO_BIN_EXE_pyrevit-setup"), manifest, args);
        cmd.env("PYREVIT_SETUP_TEST_ALLOW_NON_ADMIN", "1");
        cmd.output().expect("run pyrevit-setup")
    }

    /// 与 [`Sandbox::run`] 相同，但不跳过管理员检查。
    pub fn run_as_user(&self, manifest: &Path, args: &[&str]) -> Output {
        let mut cmd = self.command(env!("CARGO_BIN_EXE_pyrevit-setup"), manifest, args);
        cmd.env_remove("PYREVIT_SETUP_TEST_ALLOW_NON_ADMIN");
        cmd.output().expect("run pyrevit-setup")
    }

    /// 运行指定的 bootstrapper 副本（例如安装目录中的卸载程序）。
    pub fn run_program(&self, program: &Path, manifest: &Path, args: &[&str]) -> Output {
        let mut cmd = self.command(program, manifest, args);
        cmd.env("PYREVIT_SETUP_TEST_ALLOW_NON_ADMIN", "1");
        cmd.output()
            .unwrap_or_else(|e| panic!("run {} failed: {e}", program.display()))
    }

    fn command(&self, program: impl AsRef<std::ffi::OsStr>, manifest: &Path, args: &[&str]) -> Command {
        let mut cmd = Command::new(program);
        cmd.arg("--manifest")
            .arg(manifest)
            .args(args)
            .env("ProgramData", &self.program_data)
            .env("PYREVIT_SETUP_SANDBOX", &self.registry_dir)
            .env("PYREVIT_SETUP_TEST_HOOK_LOG", &self.hook_log)
            .env_remove("ProgramFiles")
            .env_remove("ProgramW6432");
        cmd
    }

    pub fn install(&self) -> Output {
        let dir = self.install_root.to_string_lossy().into_owned();
        let out = self.run(&self.manifest_path(), &["install", "--dir", &dir]);
        assert_success("install", &out);
        out
    }

    pub fn uninstall(&self) -> Output {
        let out = self.run(&self.manifest_path(), &["uninstall"]);
        assert_success("uninstall", &out);
        out
    }

    pub fn store(&self) -> FileMachineStore {
        FileMachineStore::new(&self.registry_dir)
    }

    pub fn machine_path(&self) -> String {
        self.store()
            .read_path()
            .expect("read sandbox PATH")
            .unwrap_or_default()
    }

    pub fn uninstall_entry(&self) -> Option<UninstallEntry> {
        self.store()
            .read_uninstall_entry(APP_ID)
            .expect("read sandbox uninstall entry")
    }

    pub fn bin_entry(&self) -> String {
        self.install_root.join("bin").to_string_lossy().into_owned()
    }

    pub fn state_file(&self) -> PathBuf {
        self.program_data
            .join("pyRevitSetup")
            .join(format!("install-state-{APP_ID}.json"))
    }

    /// 钩子日志（每行为一次调用的参数）。
    pub fn hook_calls(&self) -> Vec<String> {
        std::fs::read_to_string(&self.hook_log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn clear_hook_log(&self) {
        let _ = std::fs::remove_file(&self.hook_log);
    }

    /// `detect --json` 的输出。
    pub fn detect(&self) -> serde_json::Value {
        let out = self.run(&self.manifest_path(), &["detect", "--json"]);
        assert_success("detect --json", &out);
        serde_json::from_slice(&out.stdout).expect("detect json")
    }
}

/// 占住 JSON 文件的临时替换路径，使其后的原子写入失败（读取不受影响）。
pub fn block_writes(file: &Path) -> PathBuf {
    let tmp = file.with_extension("json.tmp");
    std::fs::create_dir_all(&tmp)
        .unwrap_or_else(|e| panic!("create {} failed: {e}", tmp.display()));
    tmp
}

pub fn unblock_writes(tmp: &Path) {
    std::fs::remove_dir_all(tmp).unwrap_or_else(|e| panic!("remove {} failed: {e}", tmp.display()));
}

pub fn assert_success(what: &str, out: &Output) {
    assert!(
        out.status.success(),
        "{what} failed: status={:?}, stdout={}, stderr={}",
        out.status.code(),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
}

pub fn write_file(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().expect("parent"))
        .unwrap_or_else(|e| panic!("create parent for {} failed: {e}", path.display()));
    std::fs::write(path, content).unwrap_or_else(|e| panic!("write {} failed: {e}", path.display()));
}

/// 伪造的 `pyrevit.exe`：把参数追加到 `$PYREVIT_SETUP_TEST_HOOK_LOG`。
fn write_hook_program(path: &Path) {
    write_file(
        path,
        "#!/bin/sh\necho \"$*\" >> \"$PYREVIT_SETUP_TEST_HOOK_LOG\"\n",
    );
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .unwrap_or_else(|e| panic!("chmod {} failed: {e}", path.display()));
    }
}

struct CleanupDir(PathBuf);

impl Drop for CleanupDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

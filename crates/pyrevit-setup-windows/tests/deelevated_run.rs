#![cfg(windows)]

use std::path::PathBuf;
use std::time::Duration;

use pyrevit_setup_windows::cleanup::schedule_delete_on_reboot;
use pyrevit_setup_windows::elevation::is_running_as_admin;
use pyrevit_setup_windows::shell_user::{run_as_shell_user, ShellUserExit};
use uuid::Uuid;

fn cmd_exe() -> PathBuf {
    let root = std::env::var_os("SystemRoot").unwrap_or_else(|| r"C:\Windows".into());
    PathBuf::from(root).join("System32").join("cmd.exe")
}

#[test]
fn shell_user_run_reports_exit_code() {
    if !is_running_as_admin().unwrap() {
        eprintln!("skip: requires an elevated test run");
        return;
    }
    let args = vec!["/c".to_string(), "exit 7".to_string()];
    match run_as_shell_user(&cmd_exe(), &args, None, true, Duration::from_secs(30)) {
        Ok(exit) => assert_eq!(exit, ShellUserExit::Exited(7)),
        // 无交互桌面（CI 会话）时取不到 Shell 令牌
        Err(e) => eprintln!("skip: {e:#}"),
    }
}

#[test]
fn shell_user_run_times_out() {
    if !is_running_as_admin().unwrap() {
        eprintln!("skip: requires an elevated test run");
        return;
    }
    let args = vec!["/c".to_string(), "ping -n 30 127.0.0.1 >nul".to_string()];
    match run_as_shell_user(&cmd_exe(), &args, None, true, Duration::from_secs(1)) {
        Ok(exit) => assert_eq!(exit, ShellUserExit::TimedOut),
        Err(e) => eprintln!("skip: {e:#}"),
    }
}

#[test]
fn reboot_delete_registers_every_entry() {
    if !is_running_as_admin().unwrap() {
        eprintln!("skip: requires an elevated test run");
        return;
    }
    let dir = std::env::temp_dir().join(format!("pyrevit-setup-reboot-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("pyrevit-setup.exe"), "exe").unwrap();

    let scheduled = schedule_delete_on_reboot(&dir).unwrap();
    assert_eq!(scheduled, 2);
    let _ = std::fs::remove_dir_all(&dir);
}

mod common;

use common::{assert_success, Sandbox, APP_ID};

#[test]
fn e2e_detect_reports_install_state() {
    let sb = Sandbox::new("pyrevit-setup-e2e-detect");

    let out = sb.run(&sb.manifest_path(), &["detect"]);
    assert_success("detect", &out);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        stdout.contains(&format!("pyRevit CLI ({APP_ID}) = false")),
        "stdout: {stdout}"
    );

    sb.install();
    sb.install();

    let out = sb.run(&sb.manifest_path(), &["detect", "--json"]);
    assert_success("detect --json", &out);
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).expect("detect json");
    assert_eq!(report["installed"], true);
    assert_eq!(report["version"], "4.8.16.24121");
    assert_eq!(
        report["install_location"],
        sb.install_root.to_string_lossy().into_owned()
    );
    assert_eq!(report["path_entries"], 2);
}

#[test]
fn e2e_verify_reports_modified_and_missing_files() {
    let sb = Sandbox::new("pyrevit-setup-e2e-verify");
    sb.install();

    let out = sb.run(&sb.manifest_path(), &["verify"]);
    assert_success("verify", &out);
    assert!(String::from_utf8_lossy(&out.stdout).contains("verified = 2/2"));

    std::fs::write(sb.install_root.join("bin").join("lib").join("core.dll"), "patched").unwrap();
    std::fs::remove_file(sb.install_root.join("bin").join("pyrevit.exe")).unwrap();

    let out = sb.run(&sb.manifest_path(), &["verify"]);
    assert!(!out.status.success(), "verify should fail");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("modified = bin/lib/core.dll"), "stdout: {stdout}");
    assert!(stdout.contains("missing = bin/pyrevit.exe"), "stdout: {stdout}");
}

#[test]
fn e2e_verify_without_install_fails() {
    let sb = Sandbox::new("pyrevit-setup-e2e-verify-none");
    let out = sb.run(&sb.manifest_path(), &["verify"]);
    assert!(!out.status.success());
}

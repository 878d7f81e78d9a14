mod common;

use std::path::PathBuf;

use pyrevit_setup_core::manifest::SetupManifest;

use common::{assert_success, write_file, Sandbox};

/// 在沙箱清单中加入品牌素材与输出命名。
fn add_assets(sb: &Sandbox) {
    write_file(&sb.media.join("LICENSE.txt"), "GPLv3");
    write_file(&sb.media.join("release").join("pyrevit-cli.bmp"), "bmp");

    let bytes = std::fs::read(sb.manifest_path()).unwrap();
    let mut manifest: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    manifest["assets"] = serde_json::json!({
        "license": "LICENSE.txt",
        "wizard_image": "release/pyrevit-cli.bmp"
    });
    manifest["output"] = serde_json::json!({
        "dir": "dist",
        "base_filename": "pyRevit_CLI_{version}_admin_signed"
    });
    std::fs::write(sb.manifest_path(), serde_json::to_vec_pretty(&manifest).unwrap()).unwrap();
}

#[test]
fn e2e_package_stages_payload_assets_and_manifest() {
    let sb = Sandbox::new("pyrevit-setup-e2e-package");
    add_assets(&sb);

    let out = sb.run(&sb.manifest_path(), &["package"]);
    assert_success("package", &out);

    let stage = PathBuf::from(String::from_utf8_lossy(&out.stdout).trim());
    assert_eq!(
        stage,
        sb.media.join("dist").join("pyRevit_CLI_4.8.16.24121_admin_signed")
    );
    assert!(stage.join("payload").join("bin").join("pyrevit.exe").is_file());
    assert!(stage.join("payload").join("bin").join("lib").join("core.dll").is_file());
    assert!(stage.join("assets").join("LICENSE.txt").is_file());
    assert!(stage.join("assets").join("pyrevit-cli.bmp").is_file());
    assert!(stage
        .join(format!("pyrevit-setup{}", std::env::consts::EXE_SUFFIX))
        .is_file());

    let bytes = std::fs::read(stage.join("setup-manifest.json")).unwrap();
    let packaged: SetupManifest = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(packaged.payload[0].source, "payload/bin");
    assert_eq!(packaged.payload[0].dest, "bin");
    assert_eq!(packaged.assets.license.as_deref(), Some("assets/LICENSE.txt"));
    assert_eq!(packaged.assets.icon, None);
}

#[test]
fn e2e_packaged_media_installs() {
    let sb = Sandbox::new("pyrevit-setup-e2e-package-install");
    add_assets(&sb);
    let out_dir = sb.root.join("out");
    let out_arg = out_dir.to_string_lossy().into_owned();

    let out = sb.run(&sb.manifest_path(), &["package", "--out", &out_arg]);
    assert_success("package", &out);
    let stage = out_dir.join("pyRevit_CLI_4.8.16.24121_admin_signed");

    let dir = sb.install_root.to_string_lossy().into_owned();
    let out = sb.run(&stage.join("setup-manifest.json"), &["install", "--dir", &dir]);
    assert_success("install from package", &out);
    assert!(sb.install_root.join("bin").join("lib").join("core.dll").is_file());
}

#[test]
fn e2e_package_fails_on_missing_asset() {
    let sb = Sandbox::new("pyrevit-setup-e2e-package-missing");
    add_assets(&sb);
    std::fs::remove_file(sb.media.join("LICENSE.txt")).unwrap();

    let out = sb.run(&sb.manifest_path(), &["package"]);
    assert!(!out.status.success(), "package should fail without license");
}

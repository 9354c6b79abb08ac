use std::fs::{self, File};
use std::io::{Cursor, Read};
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;
use zip::ZipArchive;

fn write_png(path: &Path, rgba: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(4, 4, image::Rgba(rgba));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    let bytes = bytes.into_inner();
    fs::write(path, &bytes).unwrap();
    bytes
}

fn pbrview(config_dir: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_pbrview"));
    command
        .env("PBRVIEW_CONFIG_DIR", config_dir)
        .env("RUST_LOG", "warn");
    command
}

#[test]
fn export_packages_only_supplied_channels() {
    let root = TempDir::new().unwrap();
    let config_dir = root.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let albedo = write_png(&root.path().join("albedo.png"), [200, 120, 40, 255]);
    let rough = write_png(&root.path().join("rough.png"), [128, 128, 128, 255]);
    let archive_path = root.path().join("out/material.zip");

    let status = pbrview(&config_dir)
        .arg("export")
        .arg("--basecolor")
        .arg(root.path().join("albedo.png"))
        .arg("--roughness")
        .arg(root.path().join("rough.png"))
        .arg("-o")
        .arg(&archive_path)
        .status()
        .expect("failed to run pbrview export");
    assert!(status.success());

    let mut archive = ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
    let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "pbr_material/",
            "pbr_material/material_basecolor.png",
            "pbr_material/material_roughness.png",
        ]
    );

    for (name, expected) in [
        ("pbr_material/material_basecolor.png", albedo),
        ("pbr_material/material_roughness.png", rough),
    ] {
        let mut stored = Vec::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_end(&mut stored)
            .unwrap();
        assert_eq!(stored, expected, "{name} must hold the original bytes");
    }
}

#[test]
fn export_without_channels_fails_and_writes_nothing() {
    let root = TempDir::new().unwrap();
    let config_dir = root.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let archive_path = root.path().join("material.zip");

    let output = pbrview(&config_dir)
        .arg("export")
        .arg("-o")
        .arg(&archive_path)
        .output()
        .expect("failed to run pbrview export");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No textures loaded"), "stderr: {stderr}");
    assert!(!archive_path.exists());
}

#[test]
fn export_reads_channels_from_the_config_file() {
    let root = TempDir::new().unwrap();
    let config_dir = root.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let height = root.path().join("height.png");
    write_png(&height, [10, 10, 10, 255]);
    let archive_path = root.path().join("from_config.zip");

    fs::write(
        config_dir.join("viewer.toml"),
        format!(
            "version = 1\n\n[material]\nheight = {:?}\n\n[output]\ndirectory = {:?}\nmaterial_archive = \"from_config.zip\"\n",
            height.display().to_string(),
            root.path().display().to_string(),
        ),
    )
    .unwrap();

    let status = pbrview(&config_dir)
        .arg("export")
        .status()
        .expect("failed to run pbrview export");
    assert!(status.success());

    let archive = ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
    let mut names: Vec<_> = archive.file_names().collect();
    names.sort();
    assert_eq!(names, vec!["pbr_material/", "pbr_material/material_height.png"]);
}

#[test]
fn config_default_prints_valid_toml() {
    let root = TempDir::new().unwrap();
    let output = pbrview(root.path())
        .args(["config", "default"])
        .output()
        .expect("failed to run pbrview config default");
    assert!(output.status.success());

    let printed = String::from_utf8(output.stdout).unwrap();
    assert!(printed.contains("preset = \"city\""), "{printed}");
    assert!(printed.contains("background = \"#121212\""), "{printed}");
}

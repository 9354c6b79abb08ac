use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use materialpack::{write_archive_file, ArchiveEntry};
use renderer::{export_channels, ExportedChannel, MaterialExporter};
use viewconfig::ViewerConfig;

use crate::cli::ExportArgs;
use crate::settings::{apply_material_overrides, archive_path, material_sources};

pub fn archive_entries(channels: &[ExportedChannel]) -> Vec<ArchiveEntry> {
    channels
        .iter()
        .map(|channel| ArchiveEntry::new(channel.file_name, channel.source.bytes()))
        .collect()
}

pub fn write_material_archive(path: &Path, channels: &[ExportedChannel]) -> Result<()> {
    write_archive_file(path, &archive_entries(channels))
        .with_context(|| format!("failed to write material archive {}", path.display()))
}

/// Exporter used by the preview window: every export overwrites the same archive.
pub fn archive_exporter(path: PathBuf) -> MaterialExporter {
    Box::new(move |channels| {
        write_material_archive(&path, &channels)?;
        Ok(path.clone())
    })
}

/// Packages the configured channels without touching the GPU.
pub fn run_export(mut config: ViewerConfig, args: ExportArgs) -> Result<()> {
    apply_material_overrides(&mut config.material, &args.material);
    let sources = material_sources(&config.material)?;
    let channels = export_channels(sources)?;
    let path = args.output.unwrap_or_else(|| archive_path(&config.output));

    write_material_archive(&path, &channels)?;
    for channel in &channels {
        println!(
            "  {:<24} <- {}",
            channel.file_name,
            channel.source.name()
        );
    }
    println!("Wrote {} ({} channels)", path.display(), channels.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use renderer::{ImageSource, MaterialChannel, ViewerError};
    use tempfile::TempDir;
    use zip::ZipArchive;

    use super::*;

    #[test]
    fn exporter_overwrites_one_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pbr_material.zip");
        let mut exporter = archive_exporter(path.clone());

        let first = export_channels([(
            MaterialChannel::Normal,
            ImageSource::from_bytes("n.png", vec![1u8, 2, 3]),
        )])
        .unwrap();
        assert_eq!(exporter(first).unwrap(), path);

        let second = export_channels([
            (
                MaterialChannel::BaseColor,
                ImageSource::from_bytes("a.png", vec![4u8]),
            ),
            (
                MaterialChannel::Metalness,
                ImageSource::from_bytes("m.png", vec![5u8]),
            ),
        ])
        .unwrap();
        exporter(second).unwrap();

        let archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "pbr_material/",
                "pbr_material/material_basecolor.png",
                "pbr_material/material_metalness.png",
            ]
        );
    }

    #[test]
    fn empty_export_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let args = ExportArgs {
            material: Default::default(),
            output: Some(dir.path().join("out.zip")),
        };
        let err = run_export(ViewerConfig::default(), args).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ViewerError>(),
            Some(ViewerError::NothingToExport)
        ));
        assert!(!dir.path().join("out.zip").exists());
    }
}

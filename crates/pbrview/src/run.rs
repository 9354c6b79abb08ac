use anyhow::Result;
use renderer::{run_viewer, ViewerOptions};
use tracing_subscriber::EnvFilter;
use viewconfig::ViewerConfig;

use crate::cli::ViewArgs;
use crate::export::archive_exporter;
use crate::settings::{
    apply_view_overrides, archive_path, capture_names, material_sources, viewer_settings,
};

const DEFAULT_WINDOW_SIZE: (u32, u32) = (1280, 800);

pub fn run(mut config: ViewerConfig, args: ViewArgs) -> Result<()> {
    apply_view_overrides(&mut config, &args)?;
    let settings = viewer_settings(&config)?;
    let channels = material_sources(&config.material)?;
    let window_size = args.size.unwrap_or(DEFAULT_WINDOW_SIZE);

    tracing::info!(
        geometry = settings.geometry.as_str(),
        preset = settings.environment.preset.as_str(),
        custom_environment = settings.environment.custom.as_ref().map(|source| source.name()),
        channels = channels.len(),
        width = window_size.0,
        height = window_size.1,
        "starting pbrview"
    );

    run_viewer(ViewerOptions {
        settings,
        channels,
        window_size,
        capture_directory: config.output.directory.clone(),
        captures: capture_names(&config.output),
        exporter: archive_exporter(archive_path(&config.output)),
    })
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

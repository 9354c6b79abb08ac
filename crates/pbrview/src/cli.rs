use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use viewconfig::{GeometrySetting, ENVIRONMENT_PRESETS};

#[derive(Parser, Debug)]
#[command(
    name = "pbrview",
    author,
    version,
    about = "Interactive PBR material previewer",
    arg_required_else_help = false
)]
pub struct Cli {
    /// Viewer configuration file; defaults to `viewer.toml` in the config directory.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
    #[command(flatten)]
    pub view: ViewArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// One optional image per material channel.
#[derive(Args, Debug, Clone, Default)]
pub struct MaterialArgs {
    /// Base colour (albedo) map, treated as sRGB.
    #[arg(long, value_name = "IMAGE")]
    pub basecolor: Option<PathBuf>,

    /// Tangent-space normal map.
    #[arg(long, value_name = "IMAGE")]
    pub normal: Option<PathBuf>,

    #[arg(long, value_name = "IMAGE")]
    pub roughness: Option<PathBuf>,

    #[arg(long, value_name = "IMAGE")]
    pub metalness: Option<PathBuf>,

    /// Height map driving vertex displacement.
    #[arg(long, value_name = "IMAGE")]
    pub height: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ViewArgs {
    #[command(flatten)]
    pub material: MaterialArgs,

    /// Custom light probe (`.hdr`, `.exr`, or any LDR panorama); wins over `--preset`.
    #[arg(long, value_name = "IMAGE")]
    pub environment: Option<PathBuf>,

    /// Named environment preset (e.g. `city`, `studio`, `sunset`).
    #[arg(long, value_name = "NAME", value_parser = parse_preset)]
    pub preset: Option<String>,

    /// Primitive to preview on: `sphere`, `cube`, `cylinder`, or `plane`.
    #[arg(long, value_name = "SHAPE", value_parser = parse_geometry)]
    pub geometry: Option<GeometrySetting>,

    /// Initial window size in logical pixels (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_window_size)]
    pub size: Option<(u32, u32)>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Package material channels into a zip archive without opening a window.
    Export(ExportArgs),
    /// Inspect the viewer configuration.
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(flatten)]
    pub material: MaterialArgs,

    /// Archive to write; defaults to `output.material_archive` in `output.directory`.
    #[arg(short, long, value_name = "ZIP")]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Print the built-in defaults as TOML.
    Default,
    /// Print the configuration file path that would be loaded.
    Where,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_geometry(value: &str) -> Result<GeometrySetting, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("geometry must not be empty".to_string());
    }

    match trimmed.to_ascii_lowercase().as_str() {
        "sphere" => Ok(GeometrySetting::Sphere),
        "cube" | "box" => Ok(GeometrySetting::Cube),
        "cylinder" => Ok(GeometrySetting::Cylinder),
        "plane" => Ok(GeometrySetting::Plane),
        _ => Err(format!(
            "unknown geometry '{trimmed}' (expected sphere, cube, cylinder, or plane)"
        )),
    }
}

pub fn parse_preset(value: &str) -> Result<String, String> {
    let normalized = value.trim().to_ascii_lowercase();
    if ENVIRONMENT_PRESETS.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(format!(
            "unknown preset '{}' (expected one of {})",
            value.trim(),
            ENVIRONMENT_PRESETS.join(", ")
        ))
    }
}

pub fn parse_window_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .trim()
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WIDTHxHEIGHT, e.g. 1280x720".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width '{}'", width.trim()))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height '{}'", height.trim()))?;

    if width == 0 || height == 0 {
        return Err("window dimensions must be greater than zero".to_string());
    }
    Ok((width, height))
}

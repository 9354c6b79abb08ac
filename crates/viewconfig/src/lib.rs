use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometrySetting {
    #[default]
    Sphere,
    Cube,
    Cylinder,
    Plane,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub version: u32,
    pub geometry: GeometrySetting,
    pub shading: ShadingSection,
    pub environment: EnvironmentSection,
    pub lighting: LightingSection,
    pub camera: CameraSection,
    pub material: MaterialSection,
    pub output: OutputSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ShadingSection {
    pub displacement_scale: f32,
    pub normal_scale: f32,
    pub roughness: f32,
    pub metalness: f32,
    pub rim_strength: f32,
    pub rim_power: f32,
    pub texture_repeat: Repeat,
    pub double_sided: bool,
    /// Model rotation in degrees, applied X then Y then Z.
    pub rotation: Rotation,
    pub auto_rotate: bool,
    /// Radians per second.
    pub auto_rotate_speed: f32,
}

impl Default for ShadingSection {
    fn default() -> Self {
        Self {
            displacement_scale: 0.02,
            normal_scale: 1.0,
            roughness: 1.0,
            metalness: 1.0,
            rim_strength: 0.5,
            rim_power: 3.0,
            texture_repeat: Repeat::default(),
            double_sided: false,
            rotation: Rotation::default(),
            auto_rotate: false,
            auto_rotate_speed: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Repeat {
    pub u: f32,
    pub v: f32,
}

impl Default for Repeat {
    fn default() -> Self {
        Self { u: 1.0, v: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Rotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvironmentSection {
    pub preset: String,
    /// Custom light probe; takes precedence over `preset` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    pub intensity: f32,
    pub show_background: bool,
}

impl Default for EnvironmentSection {
    fn default() -> Self {
        Self {
            preset: "city".to_string(),
            source: None,
            intensity: 1.0,
            show_background: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LightingSection {
    pub ambient_intensity: f32,
    pub spot_intensity: f32,
    pub spot_angle: f32,
    pub spot_penumbra: f32,
    pub shadow: ShadowSection,
}

impl Default for LightingSection {
    fn default() -> Self {
        Self {
            ambient_intensity: 0.5,
            spot_intensity: 1.0,
            spot_angle: 0.2,
            spot_penumbra: 0.8,
            shadow: ShadowSection::default(),
        }
    }
}

/// Soft contact shadow on a ground plane below the model.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ShadowSection {
    pub enabled: bool,
    pub opacity: f32,
    /// Blur radius in shadow-map texels.
    pub blur: f32,
}

impl Default for ShadowSection {
    fn default() -> Self {
        Self {
            enabled: true,
            opacity: 0.4,
            blur: 2.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CameraSection {
    pub lock: bool,
    pub distance: f32,
    pub fov_degrees: f32,
    #[serde(
        deserialize_with = "deserialize_hex_color",
        serialize_with = "serialize_hex_color"
    )]
    pub background: [u8; 3],
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            lock: false,
            distance: 4.0,
            fov_degrees: 45.0,
            background: [0x12, 0x12, 0x12],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MaterialSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basecolor: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normal: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roughness: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metalness: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputSection {
    pub viewport_capture: String,
    pub full_capture: String,
    pub full_capture_scale: f32,
    pub material_archive: String,
    /// Directory captures and archives are written into.
    pub directory: PathBuf,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            viewport_capture: "pbr_viewport.png".to_string(),
            full_capture: "pbr_full.png".to_string(),
            full_capture_scale: 2.0,
            material_archive: "pbr_material.zip".to_string(),
            directory: PathBuf::from("."),
        }
    }
}

fn deserialize_hex_color<'de, D>(deserializer: D) -> Result<[u8; 3], D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_hex_color(&raw).map_err(de::Error::custom)
}

fn serialize_hex_color<S>(value: &[u8; 3], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&HexColor(*value))
}

struct HexColor([u8; 3]);

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

pub fn parse_hex_color(raw: &str) -> Result<[u8; 3], String> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
    let expanded: String = match digits.len() {
        3 => digits.chars().flat_map(|ch| [ch, ch]).collect(),
        6 => digits.to_string(),
        _ => return Err(format!("invalid colour '{raw}'; expected #rgb or #rrggbb")),
    };
    let mut rgb = [0u8; 3];
    for (index, slot) in rgb.iter_mut().enumerate() {
        let pair = &expanded[index * 2..index * 2 + 2];
        *slot = u8::from_str_radix(pair, 16)
            .map_err(|_| format!("invalid colour '{raw}'; '{pair}' is not hexadecimal"))?;
    }
    Ok(rgb)
}

/// Names accepted by `environment.preset`.
pub const ENVIRONMENT_PRESETS: [&str; 10] = [
    "apartment",
    "city",
    "dawn",
    "forest",
    "lobby",
    "night",
    "park",
    "studio",
    "sunset",
    "warehouse",
];

impl ViewerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: ViewerConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Loads the file at `path`, or defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|err| ConfigError::Invalid(format!("failed to serialise config: {err}")))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version > 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let shading = &self.shading;
        check_range("shading.displacement_scale", shading.displacement_scale, 0.0, 0.3)?;
        check_range("shading.normal_scale", shading.normal_scale, 0.0, 3.0)?;
        check_range("shading.roughness", shading.roughness, 0.0, 1.0)?;
        check_range("shading.metalness", shading.metalness, 0.0, 1.0)?;
        check_range("shading.rim_strength", shading.rim_strength, 0.0, 2.0)?;
        check_range("shading.rim_power", shading.rim_power, 1.0, 6.0)?;
        check_range("shading.texture_repeat.u", shading.texture_repeat.u, 0.1, 10.0)?;
        check_range("shading.texture_repeat.v", shading.texture_repeat.v, 0.1, 10.0)?;
        check_range("shading.rotation.x", shading.rotation.x, -180.0, 180.0)?;
        check_range("shading.rotation.y", shading.rotation.y, -180.0, 180.0)?;
        check_range("shading.rotation.z", shading.rotation.z, -180.0, 180.0)?;
        check_range("shading.auto_rotate_speed", shading.auto_rotate_speed, 0.0, 5.0)?;

        let environment = &self.environment;
        check_range("environment.intensity", environment.intensity, 0.0, 5.0)?;
        if !ENVIRONMENT_PRESETS.contains(&environment.preset.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "environment.preset '{}' is unknown; expected one of {}",
                environment.preset,
                ENVIRONMENT_PRESETS.join(", ")
            )));
        }

        let lighting = &self.lighting;
        check_range("lighting.ambient_intensity", lighting.ambient_intensity, 0.0, 2.0)?;
        check_range("lighting.spot_intensity", lighting.spot_intensity, 0.0, 3.0)?;
        check_range("lighting.spot_angle", lighting.spot_angle, 0.05, 0.6)?;
        check_range("lighting.spot_penumbra", lighting.spot_penumbra, 0.0, 1.0)?;
        check_range("lighting.shadow.opacity", lighting.shadow.opacity, 0.0, 1.0)?;
        check_range("lighting.shadow.blur", lighting.shadow.blur, 0.0, 10.0)?;

        if !(self.camera.distance > 0.0) {
            return Err(ConfigError::Invalid(
                "camera.distance must be greater than zero".into(),
            ));
        }
        check_range("camera.fov_degrees", self.camera.fov_degrees, 1.0, 170.0)?;

        let output = &self.output;
        if !(output.full_capture_scale >= 1.0) {
            return Err(ConfigError::Invalid(
                "output.full_capture_scale must be >= 1".into(),
            ));
        }
        for (field, name) in [
            ("output.viewport_capture", &output.viewport_capture),
            ("output.full_capture", &output.full_capture),
            ("output.material_archive", &output.material_archive),
        ] {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} may not be empty")));
            }
        }

        Ok(())
    }
}

fn check_range(field: &str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value.is_nan() || value < min || value > max {
        return Err(ConfigError::Invalid(format!(
            "{field} = {value} is outside the allowed range {min}..={max}"
        )));
    }
    Ok(())
}

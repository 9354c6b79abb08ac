use std::fmt;
use std::path::Path;
use std::sync::Arc;

use glam::Vec3;

/// Number of material channels a PBR material exposes.
pub const CHANNEL_COUNT: usize = 5;

/// One of the per-pixel inputs of a PBR material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MaterialChannel {
    BaseColor,
    Normal,
    Roughness,
    Metalness,
    Displacement,
}

impl MaterialChannel {
    pub const ALL: [MaterialChannel; CHANNEL_COUNT] = [
        MaterialChannel::BaseColor,
        MaterialChannel::Normal,
        MaterialChannel::Roughness,
        MaterialChannel::Metalness,
        MaterialChannel::Displacement,
    ];

    pub fn index(self) -> usize {
        match self {
            MaterialChannel::BaseColor => 0,
            MaterialChannel::Normal => 1,
            MaterialChannel::Roughness => 2,
            MaterialChannel::Metalness => 3,
            MaterialChannel::Displacement => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MaterialChannel::BaseColor => "basecolor",
            MaterialChannel::Normal => "normal",
            MaterialChannel::Roughness => "roughness",
            MaterialChannel::Metalness => "metalness",
            MaterialChannel::Displacement => "displacement",
        }
    }

    /// Base colour is display-referred; every other channel carries linear data.
    pub fn color_space(self) -> ColorSpace {
        match self {
            MaterialChannel::BaseColor => ColorSpace::Srgb,
            _ => ColorSpace::Linear,
        }
    }

    /// File name used when the channel is exported.
    pub fn export_name(self) -> &'static str {
        match self {
            MaterialChannel::BaseColor => "material_basecolor.png",
            MaterialChannel::Normal => "material_normal.png",
            MaterialChannel::Roughness => "material_roughness.png",
            MaterialChannel::Metalness => "material_metalness.png",
            MaterialChannel::Displacement => "material_height.png",
        }
    }

    /// Preprocessor symbol enabled in the shading program when the channel is bound.
    pub(crate) fn define(self) -> &'static str {
        match self {
            MaterialChannel::BaseColor => "USE_BASECOLOR_MAP",
            MaterialChannel::Normal => "USE_NORMAL_MAP",
            MaterialChannel::Roughness => "USE_ROUGHNESS_MAP",
            MaterialChannel::Metalness => "USE_METALNESS_MAP",
            MaterialChannel::Displacement => "USE_DISPLACEMENT_MAP",
        }
    }
}

impl fmt::Display for MaterialChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How texel values should be interpreted when sampled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    /// Gamma-encoded, display-referred data.
    Srgb,
    /// Data stored as-is (normals, scalar masks, radiance).
    Linear,
}

/// Set of channels that currently hold a texture; selects shading program variants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChannelMask(u8);

impl ChannelMask {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn with(mut self, channel: MaterialChannel) -> Self {
        self.0 |= 1 << channel.index();
        self
    }

    pub fn contains(self, channel: MaterialChannel) -> bool {
        self.0 & (1 << channel.index()) != 0
    }

    pub fn channels(self) -> impl Iterator<Item = MaterialChannel> {
        MaterialChannel::ALL
            .into_iter()
            .filter(move |channel| self.contains(*channel))
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

/// An uploaded image: a display name (used for format detection) plus its raw bytes.
///
/// Bytes are shared, so handing a source to a decode worker or to the exporter
/// never copies the payload.
#[derive(Clone)]
pub struct ImageSource {
    name: String,
    bytes: Arc<[u8]>,
}

impl ImageSource {
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_bytes(name, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    /// Lower-cased file extension, if the name has one.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSource")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl PartialEq for ImageSource {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

/// Primitive the material is previewed on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    #[default]
    Sphere,
    Cube,
    Cylinder,
    Plane,
}

impl GeometryKind {
    pub const ALL: [GeometryKind; 4] = [
        GeometryKind::Sphere,
        GeometryKind::Cube,
        GeometryKind::Cylinder,
        GeometryKind::Plane,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GeometryKind::Sphere => "sphere",
            GeometryKind::Cube => "cube",
            GeometryKind::Cylinder => "cylinder",
            GeometryKind::Plane => "plane",
        }
    }
}

/// Named environments that ship with the viewer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EnvironmentPreset {
    Apartment,
    #[default]
    City,
    Dawn,
    Forest,
    Lobby,
    Night,
    Park,
    Studio,
    Sunset,
    Warehouse,
}

impl EnvironmentPreset {
    pub const ALL: [EnvironmentPreset; 10] = [
        EnvironmentPreset::Apartment,
        EnvironmentPreset::City,
        EnvironmentPreset::Dawn,
        EnvironmentPreset::Forest,
        EnvironmentPreset::Lobby,
        EnvironmentPreset::Night,
        EnvironmentPreset::Park,
        EnvironmentPreset::Studio,
        EnvironmentPreset::Sunset,
        EnvironmentPreset::Warehouse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EnvironmentPreset::Apartment => "apartment",
            EnvironmentPreset::City => "city",
            EnvironmentPreset::Dawn => "dawn",
            EnvironmentPreset::Forest => "forest",
            EnvironmentPreset::Lobby => "lobby",
            EnvironmentPreset::Night => "night",
            EnvironmentPreset::Park => "park",
            EnvironmentPreset::Studio => "studio",
            EnvironmentPreset::Sunset => "sunset",
            EnvironmentPreset::Warehouse => "warehouse",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|preset| preset.as_str() == normalized)
    }
}

/// Rim (fresnel) coefficients applied on top of the base BRDF.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RimParameters {
    pub strength: f32,
    pub power: f32,
}

impl Default for RimParameters {
    fn default() -> Self {
        Self {
            strength: 0.5,
            power: 3.0,
        }
    }
}

/// Continuously adjustable shading knobs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadingParameters {
    pub displacement_scale: f32,
    pub normal_scale: f32,
    pub roughness: f32,
    pub metalness: f32,
    pub rim: RimParameters,
    pub texture_repeat: [f32; 2],
    pub double_sided: bool,
    /// Static model rotation in degrees (X, Y, Z).
    pub rotation_degrees: Vec3,
    pub auto_rotate: bool,
    /// Radians per second.
    pub auto_rotate_speed: f32,
}

impl ShadingParameters {
    /// Offset that centres the undisplaced surface in the displacement range.
    pub fn displacement_bias(&self) -> f32 {
        -self.displacement_scale / 2.0
    }

    pub fn rotation_radians(&self) -> Vec3 {
        Vec3::new(
            self.rotation_degrees.x.to_radians(),
            self.rotation_degrees.y.to_radians(),
            self.rotation_degrees.z.to_radians(),
        )
    }
}

impl Default for ShadingParameters {
    fn default() -> Self {
        Self {
            displacement_scale: 0.02,
            normal_scale: 1.0,
            roughness: 1.0,
            metalness: 1.0,
            rim: RimParameters::default(),
            texture_repeat: [1.0, 1.0],
            double_sided: false,
            rotation_degrees: Vec3::ZERO,
            auto_rotate: false,
            auto_rotate_speed: 0.5,
        }
    }
}

/// Environment selection as configured by the user.
///
/// The active mode is derived from these fields, never stored; see
/// [`EnvironmentState::mode`].
#[derive(Clone, Debug, PartialEq)]
pub struct EnvironmentState {
    pub preset: EnvironmentPreset,
    pub custom: Option<ImageSource>,
    pub intensity: f32,
    pub show_background: bool,
}

impl Default for EnvironmentState {
    fn default() -> Self {
        Self {
            preset: EnvironmentPreset::City,
            custom: None,
            intensity: 1.0,
            show_background: false,
        }
    }
}

/// Container format of a high-dynamic-range light probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HdrFormat {
    RadianceHdr,
    Exr,
}

/// The single active environment mode.
#[derive(Clone, Debug, PartialEq)]
pub enum EnvironmentMode {
    Preset(EnvironmentPreset),
    CustomHdr(ImageSource, HdrFormat),
    CustomLdr(ImageSource),
}

impl EnvironmentState {
    /// A custom source always wins over the preset; its extension picks HDR vs LDR.
    pub fn mode(&self) -> EnvironmentMode {
        match &self.custom {
            Some(source) => match source.extension().as_deref() {
                Some("hdr") => EnvironmentMode::CustomHdr(source.clone(), HdrFormat::RadianceHdr),
                Some("exr") => EnvironmentMode::CustomHdr(source.clone(), HdrFormat::Exr),
                _ => EnvironmentMode::CustomLdr(source.clone()),
            },
            None => EnvironmentMode::Preset(self.preset),
        }
    }
}

/// Soft shadow the model drops onto a ground plane below it.
///
/// Geometry up to `far` above the plane darkens it, fading with height, and
/// the result is blurred before it is composited.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactShadow {
    pub enabled: bool,
    /// World-space height of the ground plane.
    pub height: f32,
    pub opacity: f32,
    /// Side length of the square ground plane.
    pub scale: f32,
    pub blur: f32,
    pub far: f32,
}

impl Default for ContactShadow {
    fn default() -> Self {
        Self {
            enabled: true,
            height: -1.5,
            opacity: 0.4,
            scale: 10.0,
            blur: 2.5,
            far: 4.0,
        }
    }
}

/// Ambient term, the single spot light, and the contact shadow of the preview rig.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightingRig {
    pub ambient_intensity: f32,
    pub spot_intensity: f32,
    /// Cone half-angle in radians.
    pub spot_angle: f32,
    pub spot_penumbra: f32,
    pub spot_position: Vec3,
    pub contact_shadow: ContactShadow,
}

impl Default for LightingRig {
    fn default() -> Self {
        Self {
            ambient_intensity: 0.5,
            spot_intensity: 1.0,
            spot_angle: 0.2,
            spot_penumbra: 0.8,
            spot_position: Vec3::new(10.0, 10.0, 10.0),
            contact_shadow: ContactShadow::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraSettings {
    pub lock: bool,
    pub distance: f32,
    pub fov_degrees: f32,
    /// Clear colour (sRGB) used when the environment background is hidden.
    pub background: [u8; 3],
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            lock: false,
            distance: 4.0,
            fov_degrees: 45.0,
            background: [0x12, 0x12, 0x12],
        }
    }
}

/// Complete settings snapshot consumed by the render loop each frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewerSettings {
    pub geometry: GeometryKind,
    pub shading: ShadingParameters,
    pub environment: EnvironmentState,
    pub lighting: LightingRig,
    pub camera: CameraSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_basecolor_is_display_referred() {
        for channel in MaterialChannel::ALL {
            let expected = if channel == MaterialChannel::BaseColor {
                ColorSpace::Srgb
            } else {
                ColorSpace::Linear
            };
            assert_eq!(channel.color_space(), expected, "{channel}");
        }
    }

    #[test]
    fn displacement_bias_is_half_scale() {
        let mut shading = ShadingParameters::default();
        for step in 0..=30 {
            shading.displacement_scale = step as f32 * 0.01;
            assert_eq!(shading.displacement_bias(), -shading.displacement_scale / 2.0);
        }
        shading.displacement_scale = 0.0;
        assert_eq!(shading.displacement_bias(), 0.0);
    }

    #[test]
    fn custom_source_takes_precedence_over_preset() {
        let mut state = EnvironmentState {
            preset: EnvironmentPreset::Studio,
            ..EnvironmentState::default()
        };
        assert_eq!(state.mode(), EnvironmentMode::Preset(EnvironmentPreset::Studio));

        let exr = ImageSource::from_bytes("Probe.EXR", vec![0u8; 4]);
        state.custom = Some(exr.clone());
        assert_eq!(state.mode(), EnvironmentMode::CustomHdr(exr, HdrFormat::Exr));

        let hdr = ImageSource::from_bytes("sky.hdr", vec![0u8; 4]);
        state.custom = Some(hdr.clone());
        assert_eq!(
            state.mode(),
            EnvironmentMode::CustomHdr(hdr, HdrFormat::RadianceHdr)
        );

        let jpg = ImageSource::from_bytes("sky.jpeg", vec![0u8; 4]);
        state.custom = Some(jpg.clone());
        assert_eq!(state.mode(), EnvironmentMode::CustomLdr(jpg));
    }

    #[test]
    fn channel_mask_tracks_channels() {
        let mask = ChannelMask::empty()
            .with(MaterialChannel::BaseColor)
            .with(MaterialChannel::Displacement);
        assert!(mask.contains(MaterialChannel::BaseColor));
        assert!(!mask.contains(MaterialChannel::Normal));
        assert_eq!(
            mask.channels().collect::<Vec<_>>(),
            vec![MaterialChannel::BaseColor, MaterialChannel::Displacement]
        );
    }

    #[test]
    fn preset_names_parse_case_insensitively() {
        assert_eq!(
            EnvironmentPreset::from_name("Warehouse"),
            Some(EnvironmentPreset::Warehouse)
        );
        assert_eq!(EnvironmentPreset::from_name("moon"), None);
    }
}

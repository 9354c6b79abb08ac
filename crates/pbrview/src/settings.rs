//! Maps the on-disk configuration (plus command-line overrides) onto the
//! renderer's settings snapshot.
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use renderer::{
    CameraSettings, CaptureNames, ContactShadow, EnvironmentPreset, EnvironmentState, GeometryKind, ImageSource,
    LightingRig, MaterialChannel, RimParameters, ShadingParameters, ViewerSettings,
};
use viewconfig::{GeometrySetting, MaterialSection, OutputSection, ViewerConfig};

use crate::cli::{MaterialArgs, ViewArgs};
use crate::paths::AppPaths;

/// Loads the configuration `explicit` or discovery points at; a missing file yields defaults.
pub fn load_config(paths: &AppPaths, explicit: Option<&Path>) -> Result<ViewerConfig> {
    let path = paths.config_file(explicit);
    let config = ViewerConfig::load_or_default(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    tracing::debug!(path = %path.display(), exists = path.exists(), "viewer configuration resolved");
    Ok(config)
}

pub fn apply_material_overrides(material: &mut MaterialSection, args: &MaterialArgs) {
    let overrides = [
        (&mut material.basecolor, &args.basecolor),
        (&mut material.normal, &args.normal),
        (&mut material.roughness, &args.roughness),
        (&mut material.metalness, &args.metalness),
        (&mut material.height, &args.height),
    ];
    for (slot, value) in overrides {
        if let Some(path) = value {
            *slot = Some(path.clone());
        }
    }
}

/// Command-line flags override the file, then the merged result is re-validated.
pub fn apply_view_overrides(config: &mut ViewerConfig, args: &ViewArgs) -> Result<()> {
    apply_material_overrides(&mut config.material, &args.material);
    if let Some(preset) = &args.preset {
        config.environment.preset = preset.clone();
        // An explicit preset on the command line beats a probe from the file.
        if args.environment.is_none() {
            config.environment.source = None;
        }
    }
    if let Some(environment) = &args.environment {
        config.environment.source = Some(environment.clone());
    }
    if let Some(geometry) = args.geometry {
        config.geometry = geometry;
    }
    config.validate()?;
    Ok(())
}

/// Builds the renderer snapshot, reading the custom environment file if one is configured.
pub fn viewer_settings(config: &ViewerConfig) -> Result<ViewerSettings> {
    let shading = &config.shading;
    let environment = &config.environment;
    let lighting = &config.lighting;
    let camera = &config.camera;

    let preset = EnvironmentPreset::from_name(&environment.preset)
        .ok_or_else(|| anyhow!("unknown environment preset '{}'", environment.preset))?;
    let custom = environment
        .source
        .as_deref()
        .map(read_source)
        .transpose()?;

    Ok(ViewerSettings {
        geometry: geometry_kind(config.geometry),
        shading: ShadingParameters {
            displacement_scale: shading.displacement_scale,
            normal_scale: shading.normal_scale,
            roughness: shading.roughness,
            metalness: shading.metalness,
            rim: RimParameters {
                strength: shading.rim_strength,
                power: shading.rim_power,
            },
            texture_repeat: [shading.texture_repeat.u, shading.texture_repeat.v],
            double_sided: shading.double_sided,
            rotation_degrees: Vec3::new(shading.rotation.x, shading.rotation.y, shading.rotation.z),
            auto_rotate: shading.auto_rotate,
            auto_rotate_speed: shading.auto_rotate_speed,
        },
        environment: EnvironmentState {
            preset,
            custom,
            intensity: environment.intensity,
            show_background: environment.show_background,
        },
        lighting: LightingRig {
            ambient_intensity: lighting.ambient_intensity,
            spot_intensity: lighting.spot_intensity,
            spot_angle: lighting.spot_angle,
            spot_penumbra: lighting.spot_penumbra,
            contact_shadow: ContactShadow {
                enabled: lighting.shadow.enabled,
                opacity: lighting.shadow.opacity,
                blur: lighting.shadow.blur,
                ..ContactShadow::default()
            },
            ..LightingRig::default()
        },
        camera: CameraSettings {
            lock: camera.lock,
            distance: camera.distance,
            fov_degrees: camera.fov_degrees,
            background: camera.background,
        },
    })
}

pub fn geometry_kind(setting: GeometrySetting) -> GeometryKind {
    match setting {
        GeometrySetting::Sphere => GeometryKind::Sphere,
        GeometrySetting::Cube => GeometryKind::Cube,
        GeometrySetting::Cylinder => GeometryKind::Cylinder,
        GeometrySetting::Plane => GeometryKind::Plane,
    }
}

/// Reads every configured channel image, in channel order.
pub fn material_sources(material: &MaterialSection) -> Result<Vec<(MaterialChannel, ImageSource)>> {
    let configured = [
        (MaterialChannel::BaseColor, &material.basecolor),
        (MaterialChannel::Normal, &material.normal),
        (MaterialChannel::Roughness, &material.roughness),
        (MaterialChannel::Metalness, &material.metalness),
        (MaterialChannel::Displacement, &material.height),
    ];
    configured
        .into_iter()
        .filter_map(|(channel, path)| path.as_deref().map(|path| (channel, path)))
        .map(|(channel, path)| {
            read_source(path)
                .with_context(|| format!("failed to load {channel} map"))
                .map(|source| (channel, source))
        })
        .collect()
}

pub fn capture_names(output: &OutputSection) -> CaptureNames {
    CaptureNames {
        viewport: output.viewport_capture.clone(),
        full: output.full_capture.clone(),
        full_scale: output.full_capture_scale,
    }
}

pub fn archive_path(output: &OutputSection) -> PathBuf {
    output.directory.join(&output.material_archive)
}

fn read_source(path: &Path) -> Result<ImageSource> {
    ImageSource::from_path(path).with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn defaults_map_onto_renderer_defaults() {
        let settings = viewer_settings(&ViewerConfig::default()).unwrap();
        assert_eq!(settings, ViewerSettings::default());
    }

    #[test]
    fn shadow_settings_reach_the_lighting_rig() {
        let config =
            ViewerConfig::from_toml_str("[lighting.shadow]\nenabled = false\nopacity = 0.7\n")
                .unwrap();
        let shadow = viewer_settings(&config).unwrap().lighting.contact_shadow;
        assert!(!shadow.enabled);
        assert_eq!(shadow.opacity, 0.7);
        assert_eq!(shadow.scale, ContactShadow::default().scale);
    }

    #[test]
    fn cli_flags_override_the_file() {
        let mut config = ViewerConfig::from_toml_str(
            r#"
            geometry = "cube"

            [environment]
            preset = "night"
            source = "probe.hdr"

            [material]
            basecolor = "file_albedo.png"
            normal = "file_normal.png"
            "#,
        )
        .unwrap();
        let args = ViewArgs {
            material: MaterialArgs {
                basecolor: Some(PathBuf::from("cli_albedo.png")),
                ..MaterialArgs::default()
            },
            preset: Some("studio".into()),
            geometry: Some(GeometrySetting::Plane),
            ..ViewArgs::default()
        };

        apply_view_overrides(&mut config, &args).unwrap();
        assert_eq!(config.geometry, GeometrySetting::Plane);
        assert_eq!(config.environment.preset, "studio");
        assert_eq!(config.environment.source, None);
        assert_eq!(config.material.basecolor, Some(PathBuf::from("cli_albedo.png")));
        assert_eq!(config.material.normal, Some(PathBuf::from("file_normal.png")));
    }

    #[test]
    fn material_sources_follow_channel_order() {
        let dir = TempDir::new().unwrap();
        let height = dir.path().join("height.png");
        let albedo = dir.path().join("albedo.png");
        fs::write(&height, b"height").unwrap();
        fs::write(&albedo, b"albedo").unwrap();

        let material = MaterialSection {
            height: Some(height),
            basecolor: Some(albedo),
            ..MaterialSection::default()
        };
        let sources = material_sources(&material).unwrap();
        let listed: Vec<_> = sources
            .iter()
            .map(|(channel, source)| (*channel, source.name().to_string(), source.bytes().to_vec()))
            .collect();
        assert_eq!(
            listed,
            vec![
                (MaterialChannel::BaseColor, "albedo.png".into(), b"albedo".to_vec()),
                (MaterialChannel::Displacement, "height.png".into(), b"height".to_vec()),
            ]
        );
    }

    #[test]
    fn missing_channel_file_names_the_channel() {
        let material = MaterialSection {
            roughness: Some(PathBuf::from("/definitely/not/here.png")),
            ..MaterialSection::default()
        };
        let err = material_sources(&material).unwrap_err();
        assert!(format!("{err:#}").contains("roughness map"));
    }

    #[test]
    fn custom_environment_is_read_from_disk() {
        let dir = TempDir::new().unwrap();
        let probe = dir.path().join("probe.hdr");
        fs::write(&probe, b"#?RADIANCE").unwrap();

        let mut config = ViewerConfig::default();
        config.environment.source = Some(probe);
        let settings = viewer_settings(&config).unwrap();
        let custom = settings.environment.custom.unwrap();
        assert_eq!(custom.name(), "probe.hdr");
        assert_eq!(custom.extension().as_deref(), Some("hdr"));
    }
}

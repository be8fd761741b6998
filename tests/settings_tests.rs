//! Settings Tests
//!
//! Tests for:
//! - Defaults
//! - Partial JSON documents falling back to defaults
//! - Loading from a file, and error reporting for bad input
//! - Shader overrides picked up from `shader_root`

use sheen::errors::SheenError;
use sheen::pipeline::{ShaderDefines, ShaderLibrary};
use sheen::settings::{
    AdapterPreference, FinalizeSettings, HoleFillSettings, TextureResolution,
};

#[test]
fn defaults() {
    let settings = FinalizeSettings::default();

    assert_eq!(settings.resolution, TextureResolution::new(2048, 2048));
    assert!(settings.hole_fill.enabled);
    assert_eq!(settings.hole_fill.iterations_for(settings.resolution), 2048);
    assert!(settings.stream.max_running_threads >= 1);
    assert_eq!(settings.gpu.power_preference, AdapterPreference::HighPerformance);
    assert!(!settings.include_constant);
    assert!(settings.shader_root.is_none());
}

#[test]
fn partial_json_keeps_remaining_defaults() {
    let settings = FinalizeSettings::from_json_str(
        r#"{
            "resolution": { "width": 512, "height": 256 },
            "include_constant": true,
            "hole_fill": { "iterations": 16 },
            "gpu": { "power_preference": "low_power" },
            "basis": { "basis_count": 8 }
        }"#,
    )
    .unwrap();

    assert_eq!(settings.resolution, TextureResolution::new(512, 256));
    assert!(settings.include_constant);
    assert_eq!(
        settings.hole_fill,
        HoleFillSettings {
            iterations: Some(16),
            ..Default::default()
        }
    );
    assert_eq!(settings.gpu.power_preference, AdapterPreference::LowPower);
    assert!(!settings.gpu.force_fallback_adapter);
}

#[test]
fn builders_override_fields() {
    let settings = FinalizeSettings::default()
        .with_resolution((64, 32).into())
        .with_constant(true)
        .with_shader_root("/opt/shaders")
        .with_hole_fill(HoleFillSettings {
            enabled: false,
            ..Default::default()
        });

    assert_eq!(settings.resolution.max_dimension(), 64);
    assert_eq!(settings.resolution.texel_count(), 2048);
    assert!(settings.include_constant);
    assert!(!settings.hole_fill.enabled);
    assert_eq!(settings.shader_root.as_deref(), Some(std::path::Path::new("/opt/shaders")));
}

#[test]
fn loads_from_file() {
    let path = std::env::temp_dir().join(format!("sheen-settings-{}.json", uuid::Uuid::new_v4()));
    let written = FinalizeSettings::default().with_resolution(TextureResolution::new(128, 128));
    std::fs::write(&path, serde_json::to_string_pretty(&written).unwrap()).unwrap();

    let loaded = FinalizeSettings::from_json_file(&path).unwrap();
    assert_eq!(loaded, written);

    std::fs::remove_file(path).ok();
}

#[test]
fn bad_input_is_reported() {
    assert!(matches!(
        FinalizeSettings::from_json_str("{ \"resolution\": 12 }"),
        Err(SheenError::JsonError(_))
    ));

    let missing = std::env::temp_dir().join(format!("sheen-missing-{}.json", uuid::Uuid::new_v4()));
    assert!(matches!(
        FinalizeSettings::from_json_file(missing),
        Err(SheenError::IoError(_))
    ));
}

#[test]
fn adapter_preference_maps_to_wgpu() {
    assert_eq!(
        wgpu::PowerPreference::from(AdapterPreference::LowPower),
        wgpu::PowerPreference::LowPower
    );
    assert_eq!(
        wgpu::PowerPreference::from(AdapterPreference::None),
        wgpu::PowerPreference::None
    );
}

#[test]
fn shader_root_overrides_embedded_sources() {
    let root = std::env::temp_dir().join(format!("sheen-shaders-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("hole_fill.wgsl"), "// overridden {{ MARKER }}\n").unwrap();

    let settings = FinalizeSettings::default().with_shader_root(&root);
    let library = ShaderLibrary::from_settings(&settings).unwrap();
    let source = library
        .render("hole_fill", &ShaderDefines::new().set("MARKER", 7))
        .unwrap();
    assert!(source.starts_with("// overridden 7"));

    // Templates without an override still come from the embedded set.
    let embedded = library
        .render("estimate_diffuse", &ShaderDefines::new())
        .unwrap();
    assert!(embedded.contains("fn vs_main"));

    let default_library = ShaderLibrary::from_settings(&FinalizeSettings::default()).unwrap();
    let stock = default_library
        .render("hole_fill", &ShaderDefines::new().set("attachment_count", 2))
        .unwrap();
    assert!(!stock.contains("overridden"));
    assert!(stock.contains("var input1"));

    std::fs::remove_dir_all(root).ok();
}

//! Fixed viewer constants.
//!
//! There is no config file; everything the viewer does is determined by the
//! two asset paths and the values below.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AssetPaths {
    pub root: PathBuf,
    pub model: PathBuf,
    pub environment: PathBuf,
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self {
            root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets"),
            model: PathBuf::from("scene.gltf"),
            environment: PathBuf::from("envmaps").join("envmap.jpg"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct CameraSettings {
    pub position: [f32; 3],
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
}

/// Key light placed on a sphere around the origin.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct KeyLightSettings {
    pub color: u32,
    pub intensity: f32,
    pub radius: f32,
    pub phi: f32,
    pub theta: f32,
    pub shadow_map_size: u32,
    pub shadow_half_extent: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct AmbientLightSettings {
    pub color: u32,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct RendererSettings {
    pub pixel_ratio: f32,
    pub exposure: f32,
    pub output_gamma: f32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ViewerSettings {
    pub window_title: String,
    pub window_size: [u32; 2],
    pub assets: AssetPaths,
    pub camera: CameraSettings,
    pub model_scale: f32,
    /// Material name forced into alpha blending after load.
    pub transparent_material: String,
    pub key_light: KeyLightSettings,
    pub ambient_light: AmbientLightSettings,
    pub renderer: RendererSettings,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            window_title: "orbitview".to_string(),
            window_size: [1280, 720],
            assets: AssetPaths::default(),
            camera: CameraSettings {
                position: [0.0, 0.5, 1.0],
                fov_deg: 65.0,
                near: 0.1,
                far: 2000.0,
            },
            model_scale: 0.005,
            transparent_material: "LensesMat".to_string(),
            key_light: KeyLightSettings {
                color: 0xff3300,
                intensity: 0.3,
                radius: 100.0,
                phi: -1.31,
                theta: 4.08,
                shadow_map_size: 1024,
                shadow_half_extent: 50.0,
            },
            ambient_light: AmbientLightSettings {
                color: 0xffffff,
                intensity: 0.2,
            },
            renderer: RendererSettings {
                pixel_ratio: 1.0,
                exposure: 1.5,
                output_gamma: 2.2,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ViewerSettings;

    #[test]
    fn asset_paths_resolve_under_root() {
        let settings = ViewerSettings::default();
        let assets = &settings.assets;
        assert!(assets.root.join(&assets.model).ends_with("assets/scene.gltf"));
        assert!(assets
            .root
            .join(&assets.environment)
            .ends_with("assets/envmaps/envmap.jpg"));
    }

    #[test]
    fn settings_dump_as_json() {
        let json = serde_json::to_string(&ViewerSettings::default()).unwrap();
        assert!(json.contains("\"transparent_material\":\"LensesMat\""));
        assert!(json.contains("\"shadow_map_size\":1024"));
    }
}

mod gltf_import;

use crate::scene::Model;
use crate::settings::AssetPaths;
use image::RgbaImage;
use std::path::{Path, PathBuf};

/// Decoded equirectangular environment, RGBA8.
#[derive(Debug, Clone)]
pub struct EnvironmentImage(RgbaImage);

impl EnvironmentImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self(pixels)
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.0
    }

    #[cfg(test)]
    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }
}

/// Both startup assets. Only exists once both loads have succeeded.
#[derive(Debug)]
pub struct LoadedAssets {
    pub environment: EnvironmentImage,
    pub model: Model,
}

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read asset at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode environment image {path}: {source}")]
    DecodeImage {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to import glTF {path}: {source}")]
    ImportModel {
        path: String,
        #[source]
        source: gltf::Error,
    },
    #[error("glTF {path} contains no triangle meshes")]
    EmptyModel { path: String },
    #[error("environment image {path} has no pixels")]
    EmptyEnvironment { path: String },
    #[error("asset load task failed: {0}")]
    Join(String),
}

/// Where startup assets come from.
#[allow(async_fn_in_trait)]
pub trait AssetSource {
    async fn load_environment(&self, path: &Path) -> Result<EnvironmentImage, AssetError>;

    async fn load_model(&self, path: &Path) -> Result<Model, AssetError>;
}

/// Loads assets from disk relative to a root directory.
#[derive(Debug, Clone)]
pub struct FsAssetSource {
    root: PathBuf,
}

impl FsAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl AssetSource for FsAssetSource {
    async fn load_environment(&self, path: &Path) -> Result<EnvironmentImage, AssetError> {
        let full_path = self.resolve(path);
        let display = full_path.display().to_string();
        let bytes = tokio::fs::read(&full_path)
            .await
            .map_err(|source| AssetError::Read {
                path: display.clone(),
                source,
            })?;

        let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .map_err(|err| AssetError::Join(err.to_string()))?
            .map_err(|source| AssetError::DecodeImage {
                path: display.clone(),
                source,
            })?
            .to_rgba8();

        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(AssetError::EmptyEnvironment { path: display });
        }
        log::info!(
            "Loaded environment {} ({}x{})",
            display,
            decoded.width(),
            decoded.height()
        );
        Ok(EnvironmentImage::new(decoded))
    }

    async fn load_model(&self, path: &Path) -> Result<Model, AssetError> {
        let full_path = self.resolve(path);
        tokio::task::spawn_blocking(move || import_model(&full_path))
            .await
            .map_err(|err| AssetError::Join(err.to_string()))?
    }
}

fn import_model(path: &Path) -> Result<Model, AssetError> {
    let display = path.display().to_string();
    let (document, buffers, images) = gltf::import(path).map_err(|source| match source {
        gltf::Error::Io(source) => AssetError::Read {
            path: display.clone(),
            source,
        },
        source => AssetError::ImportModel {
            path: display.clone(),
            source,
        },
    })?;

    let model = gltf_import::build_model(&document, &buffers, &images);
    let mesh_nodes = model.mesh_count();
    if mesh_nodes == 0 {
        return Err(AssetError::EmptyModel { path: display });
    }
    log::info!(
        "Loaded model {} ({} mesh nodes, {} materials, {} textures)",
        display,
        mesh_nodes,
        model.materials.len(),
        model.textures.len()
    );
    Ok(model)
}

/// Runs both loads concurrently. The first failure wins; no partial result
/// is ever returned.
pub async fn load_scene_assets<S: AssetSource>(
    source: &S,
    paths: &AssetPaths,
) -> Result<LoadedAssets, AssetError> {
    let (environment, model) = tokio::try_join!(
        source.load_environment(&paths.environment),
        source.load_model(&paths.model),
    )?;
    Ok(LoadedAssets { environment, model })
}

#[cfg(test)]
pub(crate) use gltf_import::fixtures;

#[cfg(test)]
mod tests {
    use super::{load_scene_assets, AssetError, AssetSource, FsAssetSource};
    use crate::assets::fixtures::{scratch_dir, write_gltf, TriangleFixture};
    use crate::settings::AssetPaths;
    use image::{Rgba, RgbaImage};
    use std::path::{Path, PathBuf};

    fn write_environment(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn environment_is_decoded_to_rgba() {
        let dir = scratch_dir("env-decode");
        write_environment(&dir, "env.png", 64, 32);
        let source = FsAssetSource::new(&dir);
        let env = source.load_environment(Path::new("env.png")).await.unwrap();
        assert_eq!(env.dimensions(), (64, 32));
        assert_eq!(env.pixels().get_pixel(3, 3), &Rgba([10, 20, 30, 255]));
    }

    #[tokio::test]
    async fn missing_environment_reports_read_error() {
        let source = FsAssetSource::new(scratch_dir("env-missing"));
        let err = source
            .load_environment(Path::new("nope.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::Read { .. }));
    }

    #[tokio::test]
    async fn corrupt_environment_reports_decode_error() {
        let dir = scratch_dir("env-corrupt");
        std::fs::write(dir.join("env.jpg"), b"definitely not a jpeg").unwrap();
        let source = FsAssetSource::new(&dir);
        let err = source
            .load_environment(Path::new("env.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::DecodeImage { .. }));
    }

    #[tokio::test]
    async fn model_is_imported_from_disk() {
        let dir = scratch_dir("model-import");
        write_gltf(&dir, "scene.gltf", &TriangleFixture::single("LensesMat"));
        let source = FsAssetSource::new(&dir);
        let model = source.load_model(Path::new("scene.gltf")).await.unwrap();
        assert_eq!(model.mesh_count(), 1);
        assert_eq!(model.materials.len(), 1);
    }

    #[tokio::test]
    async fn model_without_meshes_is_rejected() {
        let dir = scratch_dir("model-empty");
        write_gltf(&dir, "scene.gltf", &TriangleFixture::empty());
        let source = FsAssetSource::new(&dir);
        let err = source.load_model(Path::new("scene.gltf")).await.unwrap_err();
        assert!(matches!(err, AssetError::EmptyModel { .. }));
    }

    #[tokio::test]
    async fn joined_load_returns_both_assets() {
        let dir = scratch_dir("joined-ok");
        std::fs::create_dir_all(dir.join("envmaps")).unwrap();
        write_environment(&dir, "envmaps/envmap.png", 16, 8);
        write_gltf(&dir, "scene.gltf", &TriangleFixture::single("Body"));
        let paths = AssetPaths {
            root: dir.clone(),
            model: PathBuf::from("scene.gltf"),
            environment: PathBuf::from("envmaps/envmap.png"),
        };

        let loaded = load_scene_assets(&FsAssetSource::new(&paths.root), &paths)
            .await
            .unwrap();
        assert_eq!(loaded.environment.dimensions(), (16, 8));
        assert_eq!(loaded.model.mesh_count(), 1);
    }

    #[tokio::test]
    async fn joined_load_fails_when_either_side_fails() {
        let dir = scratch_dir("joined-fail");
        write_gltf(&dir, "scene.gltf", &TriangleFixture::single("Body"));
        let paths = AssetPaths {
            root: dir.clone(),
            model: PathBuf::from("scene.gltf"),
            environment: PathBuf::from("envmaps/missing.jpg"),
        };
        let result = load_scene_assets(&FsAssetSource::new(&paths.root), &paths).await;
        assert!(matches!(result, Err(AssetError::Read { .. })));
    }
}

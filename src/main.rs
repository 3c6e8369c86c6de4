//! orbitview: an orbiting glTF viewer with an equirectangular environment.
//!
//! Loads `assets/scene.gltf` and `assets/envmaps/envmap.jpg`, lights the
//! model with a shadowed key light, and renders it with wgpu into a winit
//! window until closed.

mod app;
mod assets;
mod render;
mod scene;
mod settings;

fn main() {
    if let Err(err) = app::run() {
        log::error!("orbitview exited with error: {err}");
        std::process::exit(1);
    }
}

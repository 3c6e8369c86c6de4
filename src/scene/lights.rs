use crate::settings::{AmbientLightSettings, KeyLightSettings};
use glam::{Mat4, Vec3};

/// Orthographic volume the directional light renders its shadow map from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowFrustum {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    pub near: f32,
    pub far: f32,
}

impl ShadowFrustum {
    pub fn symmetric(half_extent: f32) -> Self {
        Self {
            left: -half_extent,
            right: half_extent,
            top: half_extent,
            bottom: -half_extent,
            near: 0.5,
            far: 500.0,
        }
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::orthographic_rh(
            self.left,
            self.right,
            self.bottom,
            self.top,
            self.near,
            self.far,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowConfig {
    pub map_size: [u32; 2],
    pub frustum: ShadowFrustum,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: [f32; 3],
    pub intensity: f32,
    pub position: Vec3,
    pub target: Vec3,
    pub shadow: Option<ShadowConfig>,
}

impl DirectionalLight {
    /// The fixed warm key light, aimed at `target` and casting shadows.
    pub fn key(settings: &KeyLightSettings, target: Vec3) -> Self {
        Self {
            color: rgb_from_hex(settings.color),
            intensity: settings.intensity,
            position: spherical_to_cartesian(settings.radius, settings.phi, settings.theta),
            target,
            shadow: Some(ShadowConfig {
                map_size: [settings.shadow_map_size, settings.shadow_map_size],
                frustum: ShadowFrustum::symmetric(settings.shadow_half_extent),
            }),
        }
    }

    /// Unit vector along which light travels.
    pub fn direction(&self) -> Vec3 {
        (self.target - self.position)
            .try_normalize()
            .unwrap_or(Vec3::NEG_Y)
    }

    pub fn shadow_view_projection(&self) -> Option<Mat4> {
        let shadow = self.shadow.as_ref()?;
        let direction = self.direction();
        let up = if direction.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_at_rh(self.position, self.target, up);
        Some(shadow.frustum.projection() * view)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: [f32; 3],
    pub intensity: f32,
}

impl AmbientLight {
    pub fn from_settings(settings: &AmbientLightSettings) -> Self {
        Self {
            color: rgb_from_hex(settings.color),
            intensity: settings.intensity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Directional(DirectionalLight),
    Ambient(AmbientLight),
}

/// Y-up spherical coordinates: `phi` is the polar angle from +Y, `theta` the
/// azimuth around Y measured from +Z.
pub fn spherical_to_cartesian(radius: f32, phi: f32, theta: f32) -> Vec3 {
    let sin_phi_radius = phi.sin() * radius;
    Vec3::new(
        sin_phi_radius * theta.sin(),
        phi.cos() * radius,
        sin_phi_radius * theta.cos(),
    )
}

pub fn rgb_from_hex(hex: u32) -> [f32; 3] {
    [
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
    ]
}

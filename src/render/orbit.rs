use super::camera::PerspectiveCamera;
use super::SurfaceId;
use glam::{Vec2, Vec3};
use std::f32::consts::PI;

const EPS: f32 = 1e-6;
const WHEEL_ZOOM_BASE: f32 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    None,
    Rotate,
    Pan,
    Dolly,
}

/// Orbits the camera around a target point.
///
/// Input handlers only accumulate deltas; [`OrbitController::update`] applies
/// them and is the only place the camera pose is written after construction.
/// Primary drag rotates, secondary drag pans, middle drag and the wheel dolly.
#[derive(Debug, Clone)]
pub struct OrbitController {
    surface: SurfaceId,
    target: Vec3,
    pub screen_space_panning: bool,
    pub rotate_speed: f32,
    pub pan_speed: f32,
    pub zoom_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    state: State,
    pointer: Vec2,
    // (theta, phi) in radians
    rotate_delta: Vec2,
    // pixels, y down
    pan_delta: Vec2,
    scale: f32,
    surface_height: f32,
}

impl OrbitController {
    pub fn new(surface: SurfaceId, target: Vec3) -> Self {
        Self {
            surface,
            target,
            screen_space_panning: true,
            rotate_speed: 1.0,
            pan_speed: 1.0,
            zoom_speed: 1.0,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            min_polar_angle: 0.0,
            max_polar_angle: PI,
            state: State::None,
            pointer: Vec2::ZERO,
            rotate_delta: Vec2::ZERO,
            pan_delta: Vec2::ZERO,
            scale: 1.0,
            surface_height: 0.0,
        }
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    #[cfg(test)]
    pub fn is_interacting(&self) -> bool {
        self.state != State::None
    }

    pub fn pointer_down(&mut self, button: PointerButton, position: Vec2) {
        self.state = match button {
            PointerButton::Primary => State::Rotate,
            PointerButton::Secondary => State::Pan,
            PointerButton::Middle => State::Dolly,
        };
        self.pointer = position;
    }

    /// `surface_height` is the output height in the same units as `position`.
    pub fn pointer_move(&mut self, position: Vec2, surface_height: f32) {
        let delta = position - self.pointer;
        self.pointer = position;
        if surface_height <= 0.0 {
            return;
        }
        self.surface_height = surface_height;

        match self.state {
            State::None => {}
            State::Rotate => {
                let per_pixel = 2.0 * PI * self.rotate_speed / surface_height;
                self.rotate_delta.x -= delta.x * per_pixel;
                self.rotate_delta.y -= delta.y * per_pixel;
            }
            State::Pan => self.pan_delta += delta * self.pan_speed,
            State::Dolly => {
                if delta.y > 0.0 {
                    self.dolly_out(self.zoom_scale(1.0));
                } else if delta.y < 0.0 {
                    self.dolly_in(self.zoom_scale(1.0));
                }
            }
        }
    }

    pub fn pointer_up(&mut self) {
        self.state = State::None;
    }

    /// Positive steps zoom in (scroll away from the user).
    pub fn wheel(&mut self, steps: f32) {
        if steps > 0.0 {
            self.dolly_in(self.zoom_scale(steps));
        } else if steps < 0.0 {
            self.dolly_out(self.zoom_scale(-steps));
        }
    }

    /// Applies pending input to the camera. Returns true when the pose moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        let previous = camera.position();
        let offset = previous - self.target;

        let mut radius = offset.length();
        let mut theta = offset.x.atan2(offset.z);
        let mut phi = if radius > 0.0 {
            (offset.y / radius).clamp(-1.0, 1.0).acos()
        } else {
            0.0
        };

        theta += self.rotate_delta.x;
        phi += self.rotate_delta.y;
        phi = phi
            .clamp(self.min_polar_angle, self.max_polar_angle)
            .clamp(EPS, PI - EPS);

        radius = (radius * self.scale).clamp(self.min_distance, self.max_distance);

        if self.pan_delta != Vec2::ZERO && self.surface_height > 0.0 {
            self.target += self.pan_offset(camera, offset.length());
        }

        let sin_phi_radius = phi.sin() * radius;
        let position = self.target
            + Vec3::new(
                sin_phi_radius * theta.sin(),
                phi.cos() * radius,
                sin_phi_radius * theta.cos(),
            );
        camera.look_from(position, self.target);

        self.rotate_delta = Vec2::ZERO;
        self.pan_delta = Vec2::ZERO;
        self.scale = 1.0;

        previous.distance_squared(position) > EPS
    }

    fn pan_offset(&self, camera: &PerspectiveCamera, distance: f32) -> Vec3 {
        // pixels to world units at the target plane
        let half_fov = (camera.fov_deg() * 0.5).to_radians();
        let world_per_pixel = 2.0 * distance * half_fov.tan() / self.surface_height;

        let (right, camera_up, _) = camera.basis();
        let up = if self.screen_space_panning {
            camera_up
        } else {
            camera.up().cross(right).normalize_or_zero()
        };
        -right * (self.pan_delta.x * world_per_pixel) + up * (self.pan_delta.y * world_per_pixel)
    }

    fn zoom_scale(&self, steps: f32) -> f32 {
        WHEEL_ZOOM_BASE.powf(self.zoom_speed * steps)
    }

    fn dolly_in(&mut self, factor: f32) {
        self.scale *= factor;
    }

    fn dolly_out(&mut self, factor: f32) {
        self.scale /= factor;
    }
}

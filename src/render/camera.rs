use crate::settings::CameraSettings;
use glam::{Mat4, Vec3};

/// Aspect ratio state; `Unset` until the first viewport sync.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aspect {
    Unset,
    Ratio(f32),
}

#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    position: Vec3,
    up: Vec3,
    fov_deg: f32,
    near: f32,
    far: f32,
    aspect: Aspect,
    focus: f32,
    view: Mat4,
    projection: Option<Mat4>,
}

impl PerspectiveCamera {
    pub fn new(settings: &CameraSettings) -> Self {
        let position = Vec3::from(settings.position);
        Self {
            position,
            up: Vec3::Y,
            fov_deg: settings.fov_deg,
            near: settings.near,
            far: settings.far,
            aspect: Aspect::Unset,
            focus: 10.0,
            view: Mat4::look_to_rh(position, Vec3::NEG_Z, Vec3::Y),
            projection: None,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn fov_deg(&self) -> f32 {
        self.fov_deg
    }

    pub fn aspect(&self) -> Aspect {
        self.aspect
    }

    pub fn focus(&self) -> f32 {
        self.focus
    }

    pub fn set_focus(&mut self, focus: f32) {
        self.focus = focus;
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    pub fn projection_matrix(&self) -> Option<Mat4> {
        self.projection
    }

    pub fn view_projection(&self) -> Option<Mat4> {
        self.projection.map(|projection| projection * self.view)
    }

    /// Camera-space basis in world coordinates: (right, up, backward).
    pub fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let world = self.view.inverse();
        (
            world.x_axis.truncate(),
            world.y_axis.truncate(),
            world.z_axis.truncate(),
        )
    }

    /// Recompute the projection from fov and aspect. No-op while aspect is unset.
    pub fn update_projection_matrix(&mut self) {
        if let Aspect::Ratio(aspect) = self.aspect {
            self.projection = Some(Mat4::perspective_rh(
                self.fov_deg.to_radians(),
                aspect,
                self.near,
                self.far,
            ));
        }
    }

    pub(in crate::render) fn set_aspect(&mut self, aspect: f32) {
        self.aspect = Aspect::Ratio(aspect);
    }

    /// Pose writes are reserved for the orbit controller.
    pub(in crate::render) fn look_from(&mut self, position: Vec3, target: Vec3) {
        self.position = position;
        self.view = Mat4::look_at_rh(position, target, self.up);
    }
}

#[cfg(test)]
mod tests {
    use super::{Aspect, PerspectiveCamera};
    use crate::settings::ViewerSettings;
    use glam::Vec3;

    fn camera() -> PerspectiveCamera {
        PerspectiveCamera::new(&ViewerSettings::default().camera)
    }

    #[test]
    fn new_camera_has_no_aspect_or_projection() {
        let camera = camera();
        assert_eq!(camera.aspect(), Aspect::Unset);
        assert!(camera.projection_matrix().is_none());
        assert!(camera.view_projection().is_none());
        assert_eq!(camera.position(), Vec3::new(0.0, 0.5, 1.0));
        assert_eq!(camera.fov_deg(), 65.0);
    }

    #[test]
    fn update_projection_is_noop_while_unset() {
        let mut camera = camera();
        camera.update_projection_matrix();
        assert!(camera.projection_matrix().is_none());
    }

    #[test]
    fn projection_tracks_aspect() {
        let mut camera = camera();
        camera.set_aspect(2.0);
        camera.update_projection_matrix();
        let projection = camera.projection_matrix().unwrap();
        // x scale = y scale / aspect
        assert!((projection.x_axis.x * 2.0 - projection.y_axis.y).abs() < 1e-5);
    }

    #[test]
    fn look_from_keeps_state_finite() {
        let mut camera = camera();
        camera.look_from(Vec3::new(3.0, 2.0, 1.0), Vec3::ZERO);
        let (right, up, back) = camera.basis();
        assert!(right.is_finite() && up.is_finite() && back.is_finite());
        assert!((back - Vec3::new(3.0, 2.0, 1.0).normalize()).length() < 1e-5);
    }
}

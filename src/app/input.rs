use crate::render::PointerButton;
use winit::event::{MouseButton, MouseScrollDelta};

/// Pixels of trackpad scroll that count as one wheel notch.
const PIXELS_PER_STEP: f64 = 100.0;

pub fn map_button(button: MouseButton) -> Option<PointerButton> {
    match button {
        MouseButton::Left => Some(PointerButton::Primary),
        MouseButton::Right => Some(PointerButton::Secondary),
        MouseButton::Middle => Some(PointerButton::Middle),
        _ => None,
    }
}

/// Wheel notches, positive when scrolling away from the user (zoom in).
pub fn wheel_steps(delta: MouseScrollDelta) -> f32 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => y,
        MouseScrollDelta::PixelDelta(position) => (position.y / PIXELS_PER_STEP) as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::{map_button, wheel_steps};
    use crate::render::PointerButton;
    use winit::dpi::PhysicalPosition;
    use winit::event::{MouseButton, MouseScrollDelta};

    #[test]
    fn buttons_map_to_orbit_gestures() {
        assert_eq!(map_button(MouseButton::Left), Some(PointerButton::Primary));
        assert_eq!(map_button(MouseButton::Right), Some(PointerButton::Secondary));
        assert_eq!(map_button(MouseButton::Middle), Some(PointerButton::Middle));
        assert_eq!(map_button(MouseButton::Back), None);
    }

    #[test]
    fn line_and_pixel_deltas_become_steps() {
        assert_eq!(wheel_steps(MouseScrollDelta::LineDelta(0.0, -2.0)), -2.0);
        let pixels = MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, 250.0));
        assert!((wheel_steps(pixels) - 2.5).abs() < 1e-6);
    }
}

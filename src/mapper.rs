//! Pixel-to-angle coordinate mapping.
//!
//! A detection's box center is normalized to `[-0.5, 0.5]` on each axis (x grows
//! to the right, y is inverted so "above center" is positive) and projected onto
//! the camera's field of view. Intermediate math is `f64`; the angle is truncated
//! toward zero only when the integer output is produced.

use std::str::FromStr;

use serde::Deserialize;

use crate::detect::BoundingBox;
use crate::error::DemoError;

/// How a normalized image offset becomes an angle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Projection {
    /// Angle proportional to pixel offset: `n * fov`.
    #[default]
    Linear,
    /// Pinhole camera: `atan(2 n tan(fov / 2))`. Requires `fov < 180`.
    Rectilinear,
}

impl Projection {
    /// Project a normalized offset `n` in `[-0.5, 0.5]` onto `fov_deg` degrees.
    pub fn project(self, n: f64, fov_deg: f64) -> f64 {
        match self {
            Projection::Linear => n * fov_deg,
            Projection::Rectilinear => {
                let half = (fov_deg / 2.0).to_radians();
                (2.0 * n * half.tan()).atan().to_degrees()
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Projection::Linear => "linear",
            Projection::Rectilinear => "rectilinear",
        }
    }
}

impl FromStr for Projection {
    type Err = DemoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Projection::Linear),
            "rectilinear" | "pinhole" => Ok(Projection::Rectilinear),
            other => Err(DemoError::configuration(format!(
                "unknown projection '{}'; expected linear or rectilinear",
                other
            ))),
        }
    }
}

/// Maps boxes into the angular coordinate system of one camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinateMapper {
    pub fov_w: u32,
    pub fov_h: u32,
    pub projection: Projection,
}

impl CoordinateMapper {
    pub fn new(fov_w: u32, fov_h: u32, projection: Projection) -> Self {
        Self {
            fov_w,
            fov_h,
            projection,
        }
    }

    pub fn map(&self, bbox: &BoundingBox, frame_width: u32, frame_height: u32) -> (i32, i32) {
        let (ax, ay) = self.map_angles(bbox, frame_width, frame_height);
        (ax as i32, ay as i32)
    }

    /// Untruncated angles in degrees.
    pub fn map_angles(&self, bbox: &BoundingBox, frame_width: u32, frame_height: u32) -> (f64, f64) {
        let (cx, cy) = bbox.center();
        let nx = normalize(cx, frame_width);
        let ny = -normalize(cy, frame_height);
        (
            self.projection.project(nx, self.fov_w as f64),
            self.projection.project(ny, self.fov_h as f64),
        )
    }
}

/// Map with the default linear projection.
pub fn map(
    bbox: &BoundingBox,
    frame_width: u32,
    frame_height: u32,
    fov_w: u32,
    fov_h: u32,
) -> (i32, i32) {
    CoordinateMapper::new(fov_w, fov_h, Projection::Linear).map(bbox, frame_width, frame_height)
}

fn normalize(pos: f64, extent: u32) -> f64 {
    if extent == 0 {
        return 0.0;
    }
    let extent = extent as f64;
    pos.clamp(0.0, extent) / extent - 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f32, y: f32) -> BoundingBox {
        BoundingBox::new(x, y, x, y)
    }

    #[test]
    fn frame_center_maps_to_origin() {
        assert_eq!(map(&point(320.0, 240.0), 640, 480, 90, 90), (0, 0));
        let rect = CoordinateMapper::new(70, 50, Projection::Rectilinear);
        assert_eq!(rect.map(&point(320.0, 240.0), 640, 480), (0, 0));
    }

    #[test]
    fn top_left_corner_is_left_and_up() {
        assert_eq!(map(&point(0.0, 0.0), 640, 480, 90, 90), (-45, 45));
        assert_eq!(map(&point(640.0, 480.0), 640, 480, 90, 90), (45, -45));
    }

    #[test]
    fn box_midpoint_is_used() {
        let bbox = BoundingBox::new(100.0, 100.0, 200.0, 200.0);
        // center (150, 150): nx = -0.265625, ny = 0.1875
        assert_eq!(map(&bbox, 640, 480, 90, 90), (-23, 16));
    }

    #[test]
    fn truncates_toward_zero() {
        let mapper = CoordinateMapper::new(90, 90, Projection::Linear);
        let (ax, ay) = mapper.map_angles(&point(100.0, 300.0), 640, 480);
        assert!((ax + 30.9375).abs() < 1e-9);
        assert!((ay + 11.25).abs() < 1e-9);
        assert_eq!(mapper.map(&point(100.0, 300.0), 640, 480), (-30, -11));
    }

    #[test]
    fn outputs_stay_within_half_fov() {
        for projection in [Projection::Linear, Projection::Rectilinear] {
            let mapper = CoordinateMapper::new(90, 60, projection);
            for x in (0..=640).step_by(40) {
                for y in (0..=480).step_by(40) {
                    let bbox = BoundingBox::new(x as f32, y as f32, 640.0, 480.0);
                    let (mx, my) = mapper.map(&bbox, 640, 480);
                    assert!((-45..=45).contains(&mx), "{:?} x={}", projection, mx);
                    assert!((-30..=30).contains(&my), "{:?} y={}", projection, my);
                }
            }
        }
    }

    #[test]
    fn centers_outside_the_frame_are_clamped() {
        let bbox = BoundingBox::new(700.0, -50.0, 900.0, -10.0);
        assert_eq!(map(&bbox, 640, 480, 90, 90), (45, 45));
    }

    #[test]
    fn rectilinear_reaches_half_fov_at_edges() {
        let edge = Projection::Rectilinear.project(0.5, 90.0);
        assert!((edge - 45.0).abs() < 1e-9);
        let quarter = Projection::Rectilinear.project(0.25, 90.0);
        // atan(0.5) in degrees, larger than the linear 22.5
        assert!((quarter - 26.565_051_177).abs() < 1e-6);
    }

    #[test]
    fn parses_projection_names() {
        assert_eq!("Linear".parse::<Projection>().unwrap(), Projection::Linear);
        assert_eq!(
            "pinhole".parse::<Projection>().unwrap(),
            Projection::Rectilinear
        );
        assert!("fisheye".parse::<Projection>().is_err());
    }

    #[test]
    fn zero_sized_frame_maps_to_origin() {
        assert_eq!(map(&point(10.0, 10.0), 0, 0, 90, 90), (0, 0));
    }
}

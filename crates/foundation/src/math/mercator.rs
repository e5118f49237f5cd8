//! Web Mercator projection for a flat, north-up map view.
//!
//! World pixel coordinates follow the slippy-map convention: the origin is the
//! north-west corner of the world square and `y` grows southwards. One world
//! square is `TILE_SIZE * 2^zoom` pixels wide.

use std::f64::consts::PI;

use super::Vec2;
use crate::bounds::GeoBounds;
use crate::viewport::{ContainerSize, Viewport};

/// Edge length of the world square in pixels at zoom 0.
pub const TILE_SIZE: f64 = 512.0;

/// Latitude where the Web Mercator square ends.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

pub fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * 2f64.powf(zoom)
}

/// Projects `[lng, lat]` (degrees) to world pixels at `zoom`.
pub fn project(lng_lat: [f64; 2], zoom: f64) -> Vec2 {
    let size = world_size(zoom);
    let lat = lng_lat[1].clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (lng_lat[0] + 180.0) / 360.0 * size;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * size;
    Vec2::new(x, y)
}

/// Inverse of [`project`].
pub fn unproject(world: Vec2, zoom: f64) -> [f64; 2] {
    let size = world_size(zoom);
    let lng = world.x / size * 360.0 - 180.0;
    let n = PI * (1.0 - 2.0 * world.y / size);
    let lat = n.sinh().atan().to_degrees();
    [lng, lat]
}

/// A viewport bound to a container size, able to convert between screen
/// pixels (origin top-left of the container) and geographic coordinates.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WebMercatorViewport {
    center: Vec2,
    zoom: f64,
    size: ContainerSize,
}

impl WebMercatorViewport {
    pub fn new(viewport: Viewport, size: ContainerSize) -> Self {
        Self {
            center: project([viewport.longitude, viewport.latitude], viewport.zoom),
            zoom: viewport.zoom,
            size,
        }
    }

    pub fn size(&self) -> ContainerSize {
        self.size
    }

    /// Screen pixel to `[lng, lat]`.
    pub fn unproject(&self, pixel: Vec2) -> [f64; 2] {
        let offset = Vec2::new(self.size.width / 2.0, self.size.height / 2.0);
        unproject(self.center + (pixel - offset), self.zoom)
    }

    /// `[lng, lat]` to screen pixel.
    pub fn project(&self, lng_lat: [f64; 2]) -> Vec2 {
        let offset = Vec2::new(self.size.width / 2.0, self.size.height / 2.0);
        project(lng_lat, self.zoom) - self.center + offset
    }

    /// Geographic rectangle covered by the container.
    ///
    /// Unprojects the top-left and bottom-right corners; the other two corners
    /// of a north-up Mercator view share their coordinates.
    pub fn bounds(&self) -> GeoBounds {
        let top_left = self.unproject(Vec2::new(0.0, 0.0));
        let bottom_right = self.unproject(Vec2::new(self.size.width, self.size.height));
        GeoBounds::from_corners(top_left, bottom_right)
    }
}

#[cfg(test)]
mod tests {
    use super::{WebMercatorViewport, project, unproject};
    use crate::math::Vec2;
    use crate::viewport::{ContainerSize, Viewport};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn project_unproject_round_trip() {
        let ll = [174.07, -39.059];
        let back = unproject(project(ll, 14.0), 14.0);
        assert_close(back[0], ll[0], 1e-9);
        assert_close(back[1], ll[1], 1e-9);
    }

    #[test]
    fn zoom_zero_world_spans_full_longitude() {
        let vp = WebMercatorViewport::new(
            Viewport::new(0.0, 0.0, 0.0),
            ContainerSize::new(512.0, 512.0),
        );
        let b = vp.bounds();
        assert_close(b.min_lng, -180.0, 1e-9);
        assert_close(b.max_lng, 180.0, 1e-9);
        assert_close(b.max_lat, super::MAX_LATITUDE, 1e-6);
    }

    #[test]
    fn container_center_is_viewport_center() {
        let vp = WebMercatorViewport::new(
            Viewport::new(-39.059, 174.07, 14.0),
            ContainerSize::new(800.0, 600.0),
        );
        let c = vp.unproject(Vec2::new(400.0, 300.0));
        assert_close(c[0], 174.07, 1e-9);
        assert_close(c[1], -39.059, 1e-9);
    }

    #[test]
    fn bounds_are_ordered_and_contain_center() {
        let vp = WebMercatorViewport::new(
            Viewport::new(-39.059, 174.07, 14.0),
            ContainerSize::new(1024.0, 768.0),
        );
        let b = vp.bounds();
        assert!(b.min_lng <= b.max_lng);
        assert!(b.min_lat <= b.max_lat);
        assert!(b.contains([174.07, -39.059]));
        // 1024 px at zoom 14 is 2^-14 * 2 worlds wide => 360 * 2 / 2^14 degrees.
        assert_close(b.max_lng - b.min_lng, 360.0 * 2.0 / 16384.0, 1e-9);
    }

    #[test]
    fn project_is_inverse_of_screen_unproject() {
        let vp = WebMercatorViewport::new(
            Viewport::new(-39.059, 174.07, 15.5),
            ContainerSize::new(640.0, 480.0),
        );
        let px = Vec2::new(12.5, 470.0);
        let back = vp.project(vp.unproject(px));
        assert_close(back.x, px.x, 1e-6);
        assert_close(back.y, px.y, 1e-6);
    }
}

use serde::{Deserialize, Serialize};

use crate::bounds::GeoBounds;
use crate::math::WebMercatorViewport;

/// Map camera: centre and zoom of a north-up Web Mercator view.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
}

/// Where the map opens when nothing else says otherwise.
pub const DEFAULT_VIEWPORT: Viewport = Viewport {
    latitude: -39.059,
    longitude: 174.07,
    zoom: 14.0,
};

impl Viewport {
    pub fn new(latitude: f64, longitude: f64, zoom: f64) -> Self {
        Self {
            latitude,
            longitude,
            zoom,
        }
    }

    /// Bounding box of this viewport inside a container of `size`.
    ///
    /// Returns `None` until the container has a measurable area, so callers
    /// can never issue a zero-area request.
    pub fn bounds(&self, size: ContainerSize) -> Option<GeoBounds> {
        if !size.is_measurable() {
            return None;
        }
        Some(WebMercatorViewport::new(*self, size).bounds())
    }
}

impl Default for Viewport {
    fn default() -> Self {
        DEFAULT_VIEWPORT
    }
}

/// Pixel size of the map container.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerSize {
    pub width: f64,
    pub height: f64,
}

impl ContainerSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_measurable(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::{ContainerSize, Viewport};

    #[test]
    fn no_bounds_without_measurable_container() {
        let vp = Viewport::default();
        assert!(vp.bounds(ContainerSize::new(0.0, 600.0)).is_none());
        assert!(vp.bounds(ContainerSize::new(800.0, 0.0)).is_none());
        assert!(vp.bounds(ContainerSize::default()).is_none());
    }

    #[test]
    fn bounds_once_measurable() {
        let b = Viewport::default()
            .bounds(ContainerSize::new(800.0, 600.0))
            .expect("bounds");
        assert!(b.contains([174.07, -39.059]));
        assert!(!b.is_empty());
    }
}

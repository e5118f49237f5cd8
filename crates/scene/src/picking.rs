use std::collections::HashSet;

use foundation::math::{Vec2, WebMercatorViewport};
use foundation::{ContainerSize, GeoBounds, Viewport};
use layers::features_in_bounds;
use streaming::Feature;

/// Geographic rectangle spanned by two screen corners.
///
/// `None` while the container has no area.
pub fn box_bounds(viewport: Viewport, size: ContainerSize, a: Vec2, b: Vec2) -> Option<GeoBounds> {
    if !size.is_measurable() {
        return None;
    }
    let view = WebMercatorViewport::new(viewport, size);
    Some(GeoBounds::from_corners(view.unproject(a), view.unproject(b)))
}

/// Names of the features selected by dragging a box from `a` to `b` (screen
/// pixels, origin top-left). Points match when inside the box, lines when any
/// vertex of any part is. Each name appears once, in feature order.
pub fn compute_box_selection(
    viewport: Viewport,
    size: ContainerSize,
    a: Vec2,
    b: Vec2,
    features: &[Feature],
) -> Vec<String> {
    let Some(bounds) = box_bounds(viewport, size, a, b) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    features_in_bounds(features, &bounds)
        .into_iter()
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}

//! Geometry tests over base-data features.

use foundation::GeoBounds;
use streaming::{Feature, Geometry, Position};

/// `true` if `geometry` touches `bounds`: a point lies inside, or any vertex
/// of a line (or of any part of a multi-line) lies inside.
///
/// Edges crossing the box with both ends outside do not count.
pub fn geometry_in_bounds(geometry: &Geometry, bounds: &GeoBounds) -> bool {
    let inside = |p: &Position| bounds.contains(p.0);
    match geometry {
        Geometry::Point { coordinates } => inside(coordinates),
        Geometry::MultiPoint { coordinates } | Geometry::LineString { coordinates } => {
            coordinates.iter().any(inside)
        }
        Geometry::MultiLineString { coordinates } => coordinates.iter().flatten().any(inside),
        Geometry::Other => false,
    }
}

/// Names of the features with a geometry inside `bounds`, in input order.
/// Features without a name are skipped.
pub fn features_in_bounds<'a>(features: &'a [Feature], bounds: &GeoBounds) -> Vec<&'a str> {
    features
        .iter()
        .filter(|f| {
            f.geometry
                .as_ref()
                .is_some_and(|g| geometry_in_bounds(g, bounds))
        })
        .filter_map(Feature::name)
        .collect()
}

#[cfg(test)]
mod tests {
    use foundation::GeoBounds;
    use serde_json::json;
    use streaming::{Feature, Geometry, Position};

    use super::{features_in_bounds, geometry_in_bounds};

    fn bounds() -> GeoBounds {
        GeoBounds::new(174.0, -40.0, 175.0, -39.0)
    }

    fn feature(geometry: serde_json::Value) -> Feature {
        serde_json::from_value(json!({
            "properties": {"name": geometry["type"]},
            "geometry": geometry,
        }))
        .expect("feature")
    }

    #[test]
    fn point_containment() {
        let inside = Geometry::Point {
            coordinates: Position([174.5, -39.5]),
        };
        let outside = Geometry::Point {
            coordinates: Position([176.0, -39.5]),
        };
        assert!(geometry_in_bounds(&inside, &bounds()));
        assert!(!geometry_in_bounds(&outside, &bounds()));
    }

    #[test]
    fn line_matches_on_any_vertex() {
        let line = Geometry::LineString {
            coordinates: vec![Position([173.0, -39.5]), Position([174.1, -39.5])],
        };
        let crossing = Geometry::LineString {
            coordinates: vec![Position([173.0, -39.5]), Position([176.0, -39.5])],
        };
        assert!(geometry_in_bounds(&line, &bounds()));
        assert!(!geometry_in_bounds(&crossing, &bounds()));
    }

    #[test]
    fn multi_line_matches_on_any_part() {
        let multi = Geometry::MultiLineString {
            coordinates: vec![
                vec![Position([170.0, -30.0]), Position([171.0, -30.0])],
                vec![Position([180.0, -30.0]), Position([174.9, -39.9])],
            ],
        };
        assert!(geometry_in_bounds(&multi, &bounds()));
    }

    #[test]
    fn names_in_input_order() {
        let features = vec![
            feature(json!({"type": "Point", "coordinates": [174.2, -39.2]})),
            feature(json!({"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]})),
            feature(json!({"type": "MultiLineString",
                           "coordinates": [[[0.0, 0.0]], [[174.3, -39.3]]]})),
        ];
        assert_eq!(
            features_in_bounds(&features, &bounds()),
            vec!["Point", "MultiLineString"]
        );
    }
}

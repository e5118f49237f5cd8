use serde::{Deserialize, Serialize};

/// Axis-aligned geographic rectangle in degrees.
///
/// Invariant: `min_lng <= max_lng` and `min_lat <= max_lat`. All constructors
/// normalise their input, so a value of this type always satisfies it.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

/// Attribute lookups fall back to this rectangle (New Zealand) until the map
/// has reported a viewport of its own.
pub const DEFAULT_ATTRIBUTE_BOUNDS: GeoBounds = GeoBounds {
    min_lng: 166.0,
    min_lat: -47.5,
    max_lng: 179.0,
    max_lat: -34.0,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundsParseError {
    WrongArity(usize),
    NotANumber(String),
}

impl std::fmt::Display for BoundsParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundsParseError::WrongArity(n) => {
                write!(f, "bounding box needs 4 comma-separated values, got {n}")
            }
            BoundsParseError::NotANumber(s) => write!(f, "bounding box value is not a number: {s}"),
        }
    }
}

impl std::error::Error for BoundsParseError {}

impl GeoBounds {
    pub fn new(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> Self {
        Self {
            min_lng: min_lng.min(max_lng),
            min_lat: min_lat.min(max_lat),
            max_lng: min_lng.max(max_lng),
            max_lat: min_lat.max(max_lat),
        }
    }

    /// Rectangle spanned by two `[lng, lat]` corners given in any order.
    pub fn from_corners(a: [f64; 2], b: [f64; 2]) -> Self {
        Self::new(a[0], a[1], b[0], b[1])
    }

    /// Inclusive containment test for a `[lng, lat]` point.
    pub fn contains(&self, lng_lat: [f64; 2]) -> bool {
        lng_lat[0] >= self.min_lng
            && lng_lat[0] <= self.max_lng
            && lng_lat[1] >= self.min_lat
            && lng_lat[1] <= self.max_lat
    }

    pub fn width(&self) -> f64 {
        self.max_lng - self.min_lng
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Wire form used by the query service: `minLng,minLat,maxLng,maxLat`.
    pub fn to_query_value(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lng, self.min_lat, self.max_lng, self.max_lat
        )
    }

    /// Parses the wire form produced by [`GeoBounds::to_query_value`].
    pub fn parse(s: &str) -> Result<Self, BoundsParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BoundsParseError::WrongArity(parts.len()));
        }
        let mut v = [0.0f64; 4];
        for (slot, part) in v.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| BoundsParseError::NotANumber((*part).to_string()))?;
        }
        Ok(Self::new(v[0], v[1], v[2], v[3]))
    }
}

#[cfg(test)]
mod tests {
    use super::{BoundsParseError, DEFAULT_ATTRIBUTE_BOUNDS, GeoBounds};

    #[test]
    fn normalises_corner_order() {
        let b = GeoBounds::from_corners([175.0, -38.0], [174.0, -39.0]);
        assert_eq!(b, GeoBounds::new(174.0, -39.0, 175.0, -38.0));
        assert!(b.min_lng <= b.max_lng && b.min_lat <= b.max_lat);
    }

    #[test]
    fn containment_is_inclusive() {
        let b = GeoBounds::new(0.0, 0.0, 1.0, 1.0);
        assert!(b.contains([0.0, 0.0]));
        assert!(b.contains([1.0, 0.5]));
        assert!(!b.contains([1.0001, 0.5]));
    }

    #[test]
    fn query_value_round_trips() {
        assert_eq!(
            DEFAULT_ATTRIBUTE_BOUNDS.to_query_value(),
            "166,-47.5,179,-34"
        );
        let parsed = GeoBounds::parse(&DEFAULT_ATTRIBUTE_BOUNDS.to_query_value()).unwrap();
        assert_eq!(parsed, DEFAULT_ATTRIBUTE_BOUNDS);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(
            GeoBounds::parse("1,2,3"),
            Err(BoundsParseError::WrongArity(3))
        );
        assert!(matches!(
            GeoBounds::parse("1,2,x,4"),
            Err(BoundsParseError::NotANumber(_))
        ));
    }
}

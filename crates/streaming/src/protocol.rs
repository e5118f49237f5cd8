//! Wire format of the remote query service.
//!
//! Every endpoint is a plain GET below one base URL. Requests that are scoped
//! by the location hierarchy append the canonical `gxp`/`substation`/`hv`/`dtx`
//! parameters last, via [`foundation::hierarchy_query_pairs`].

use std::collections::BTreeMap;

use foundation::{GeoBounds, HierarchyView, hierarchy_query_pairs};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FetchError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Geometry,
    ColumnValues,
    ColumnNames,
    DetailLevels,
    AllWithAttribute,
    ShortestPath,
    FloodFill,
    Attributes,
    Centroid,
    SearchComplete,
    Hierarchy,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Geometry => "geojson",
            Endpoint::ColumnValues => "column_unique_values",
            Endpoint::ColumnNames => "column_names",
            Endpoint::DetailLevels => "detail_levels",
            Endpoint::AllWithAttribute => "all_with_attribute",
            Endpoint::ShortestPath => "shortest_path",
            Endpoint::FloodFill => "flood_fill",
            Endpoint::Attributes => "attributes",
            Endpoint::Centroid => "centroid",
            Endpoint::SearchComplete => "search_complete",
            Endpoint::Hierarchy => "hierarchy",
        }
    }
}

/// Parses a service base URL, making sure relative endpoint paths resolve
/// underneath it (`http://host/api` and `http://host/api/` are equivalent).
pub fn parse_base_url(raw: &str) -> Result<Url, FetchError> {
    let mut url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(FetchError::InvalidUrl(format!("{raw}: not a base url")));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    Ok(url)
}

/// Full request URL: `base` + endpoint path + `params` + hierarchy filter.
pub fn endpoint_url(
    base: &Url,
    endpoint: Endpoint,
    params: &[(&str, &str)],
    hierarchy: Option<&HierarchyView>,
) -> Result<Url, FetchError> {
    let mut url = base
        .join(endpoint.path())
        .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
    let filter = hierarchy_query_pairs(hierarchy);
    if !params.is_empty() || !filter.is_empty() {
        let mut query = url.query_pairs_mut();
        query.extend_pairs(params.iter().copied());
        query.extend_pairs(filter);
    }
    Ok(url)
}

/// Base geometry for one viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryQuery {
    pub bounds: GeoBounds,
    pub zoom: f64,
    /// Colour column; empty for none.
    pub column: String,
    /// Level of detail; `None` lets the service choose from the zoom.
    pub detail: Option<String>,
    pub hierarchy: Option<HierarchyView>,
}

impl GeometryQuery {
    pub fn url(&self, base: &Url) -> Result<Url, FetchError> {
        let bbox = self.bounds.to_query_value();
        let zoom = self.zoom.to_string();
        let mut params = vec![
            ("bbox", bbox.as_str()),
            ("zoom", zoom.as_str()),
            ("column", self.column.as_str()),
        ];
        if let Some(detail) = &self.detail {
            params.push(("detail", detail.as_str()));
        }
        endpoint_url(base, Endpoint::Geometry, &params, self.hierarchy.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityKind {
    ShortestPath { from: String, to: String },
    FloodFill { node: String },
}

/// A shortest-path or flood-fill query. Node names are sent trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityRequest {
    pub kind: ConnectivityKind,
    pub excluded: Vec<String>,
    pub hierarchy: Option<HierarchyView>,
}

impl ConnectivityRequest {
    pub fn endpoint(&self) -> Endpoint {
        match self.kind {
            ConnectivityKind::ShortestPath { .. } => Endpoint::ShortestPath,
            ConnectivityKind::FloodFill { .. } => Endpoint::FloodFill,
        }
    }

    /// Non-blank exclusions, trimmed and comma-joined; `None` when there are
    /// none so the parameter is left out entirely.
    pub fn exclude_value(&self) -> Option<String> {
        let joined = self
            .excluded
            .iter()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        (!joined.is_empty()).then_some(joined)
    }

    pub fn url(&self, base: &Url) -> Result<Url, FetchError> {
        let mut params = match &self.kind {
            ConnectivityKind::ShortestPath { from, to } => {
                vec![("a", from.trim()), ("b", to.trim())]
            }
            ConnectivityKind::FloodFill { node } => vec![("node", node.trim())],
        };
        let exclude = self.exclude_value();
        if let Some(exclude) = &exclude {
            params.push(("exclude", exclude.as_str()));
        }
        endpoint_url(base, self.endpoint(), &params, self.hierarchy.as_ref())
    }
}

/// Distinct values of one column, for colour mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnValuesQuery {
    pub column: String,
    pub hierarchy: Option<HierarchyView>,
}

impl ColumnValuesQuery {
    pub fn url(&self, base: &Url) -> Result<Url, FetchError> {
        endpoint_url(
            base,
            Endpoint::ColumnValues,
            &[("column", self.column.as_str())],
            self.hierarchy.as_ref(),
        )
    }
}

/// Every feature whose `column` equals `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeFilterQuery {
    pub column: String,
    pub value: String,
    pub hierarchy: Option<HierarchyView>,
}

impl AttributeFilterQuery {
    pub fn url(&self, base: &Url) -> Result<Url, FetchError> {
        endpoint_url(
            base,
            Endpoint::AllWithAttribute,
            &[("column", self.column.as_str()), ("value", self.value.as_str())],
            self.hierarchy.as_ref(),
        )
    }
}

/// Attributes of one named feature, looked up inside `bounds`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeQuery {
    pub name: String,
    pub bounds: GeoBounds,
}

impl AttributeQuery {
    pub fn url(&self, base: &Url) -> Result<Url, FetchError> {
        let bbox = self.bounds.to_query_value();
        endpoint_url(
            base,
            Endpoint::Attributes,
            &[("name", self.name.as_str()), ("bbox", bbox.as_str())],
            None,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub input: String,
    pub hierarchy: Option<HierarchyView>,
}

impl SearchQuery {
    pub fn url(&self, base: &Url) -> Result<Url, FetchError> {
        endpoint_url(
            base,
            Endpoint::SearchComplete,
            &[("input", self.input.as_str())],
            self.hierarchy.as_ref(),
        )
    }
}

/// A GeoJSON feature collection as returned by the geometry endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

impl Feature {
    /// The feature's `name` property, if it is a string.
    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").and_then(Value::as_str)
    }
}

/// The geometry kinds the engine inspects; anything else is carried opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
    #[serde(other)]
    Other,
}

/// `[lng, lat]`, with any extra ordinates (altitude) ignored.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 2]")]
pub struct Position(pub [f64; 2]);

impl TryFrom<Vec<f64>> for Position {
    type Error = String;

    fn try_from(v: Vec<f64>) -> Result<Self, Self::Error> {
        match v.as_slice() {
            [lng, lat, ..] => Ok(Position([*lng, *lat])),
            _ => Err(format!("position needs 2 ordinates, got {}", v.len())),
        }
    }
}

impl From<Position> for [f64; 2] {
    fn from(p: Position) -> Self {
        p.0
    }
}

/// Flat key/value attribute record of one feature.
pub type AttributeRecord = BTreeMap<String, Value>;

/// A list of names, accepted either as a bare JSON array or wrapped as
/// `{"values": [...]}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NameList {
    Plain(Vec<String>),
    Wrapped { values: Vec<String> },
}

impl NameList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            NameList::Plain(v) | NameList::Wrapped { values: v } => v,
        }
    }
}

/// Centroid response: `[lng, lat]`, an empty array, or `null`.
pub fn decode_centroid(value: Value) -> Result<Option<[f64; 2]>, FetchError> {
    match value {
        Value::Null => Ok(None),
        Value::Array(items) if items.is_empty() => Ok(None),
        other => {
            let coords: Vec<f64> =
                serde_json::from_value(other).map_err(|e| FetchError::Decode(e.to_string()))?;
            Ok(Position::try_from(coords).ok().map(Into::into))
        }
    }
}

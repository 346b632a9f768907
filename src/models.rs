use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// One geometry feature: an opaque GeoJSON geometry plus its flat properties.
pub type GeometryRecord = geojson::Feature;

/// A flat attribute row: attribute name to scalar value.
pub type AttributeRecord = serde_json::Map<String, Value>;

/// Source payload formats understood by the format adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    GeoJson,
    TopoJson,
    Csv,
    OData,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::GeoJson => "geojson",
            SourceFormat::TopoJson => "topojson",
            SourceFormat::Csv => "csv",
            SourceFormat::OData => "odata",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "geojson" => Ok(SourceFormat::GeoJson),
            "topojson" => Ok(SourceFormat::TopoJson),
            "csv" => Ok(SourceFormat::Csv),
            "odata" => Ok(SourceFormat::OData),
            _ => Err(Error::InvalidFormat(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Geometry,
    Attribute,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Geometry => f.write_str("geometry"),
            RequestKind::Attribute => f.write_str("attribute"),
        }
    }
}

/// A named fetch scheduled on a [`crate::loader::Loader`].
///
/// `foreign_key` is only meaningful for attribute requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRequest {
    pub name: String,
    pub kind: RequestKind,
    pub format: SourceFormat,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
}

impl NamedRequest {
    pub fn geometry(name: impl Into<String>, format: SourceFormat, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RequestKind::Geometry,
            format,
            url: url.into(),
            foreign_key: None,
        }
    }

    pub fn attribute(
        name: impl Into<String>,
        format: SourceFormat,
        url: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: RequestKind::Attribute,
            format,
            url: url.into(),
            foreign_key: Some(foreign_key.into()),
        }
    }
}

/// How a map subject is symbolised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapMode {
    /// Proportional circles, area-true.
    PointSize,
    /// Choropleth.
    AreaValue,
    /// Plain labels, no scale.
    AreaLabel,
    /// Chorochromatic (nominal categories).
    AreaColour,
}

impl MapMode {
    pub fn is_numeric(&self) -> bool {
        matches!(self, MapMode::PointSize | MapMode::AreaValue)
    }
}

impl FromStr for MapMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "point_size" => Ok(MapMode::PointSize),
            "area_value" => Ok(MapMode::AreaValue),
            "area_label" => Ok(MapMode::AreaLabel),
            "area_colour" | "area_color" => Ok(MapMode::AreaColour),
            other => Err(Error::InvalidClassification(format!(
                "unknown map type [{}]",
                other
            ))),
        }
    }
}

/// Turn a scalar into a table key.
///
/// Strings are used as-is, numbers and booleans by their JSON text. `null`,
/// arrays and objects have no key.
pub fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Attribute rows keyed by their foreign-key value.
///
/// Backed by a `BTreeMap` so iteration (and everything derived from it, such
/// as first-seen category order) is reproducible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeTable {
    rows: BTreeMap<String, AttributeRecord>,
}

impl AttributeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row, returning the row it replaced if the key was present.
    pub fn insert(&mut self, key: impl Into<String>, record: AttributeRecord) -> Option<AttributeRecord> {
        self.rows.insert(key.into(), record)
    }

    pub fn get(&self, key: &str) -> Option<&AttributeRecord> {
        self.rows.get(key)
    }

    /// Literal field lookup: `table[key][attribute]`.
    pub fn value(&self, key: &str, attribute: &str) -> Option<&Value> {
        self.rows.get(key).and_then(|r| r.get(attribute))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.rows.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeRecord)> {
        self.rows.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, AttributeRecord)> for AttributeTable {
    fn from_iter<I: IntoIterator<Item = (String, AttributeRecord)>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// Normalised payload of one resolved request.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedData {
    Geometries(Vec<GeometryRecord>),
    Attributes(AttributeTable),
}

/// Snapshot handed to the completion handler of a loader session.
///
/// Failed requests have no entry in the data map; their names are listed in
/// `failed`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadResult {
    data: BTreeMap<String, LoadedData>,
    failed: BTreeSet<String>,
}

impl LoadResult {
    pub(crate) fn resolve(&mut self, name: String, data: LoadedData) {
        self.failed.remove(&name);
        self.data.insert(name, data);
    }

    pub(crate) fn fail(&mut self, name: String) {
        self.data.remove(&name);
        self.failed.insert(name);
    }

    pub fn get(&self, name: &str) -> Option<&LoadedData> {
        self.data.get(name)
    }

    pub fn geometries(&self, name: &str) -> Option<&[GeometryRecord]> {
        match self.data.get(name) {
            Some(LoadedData::Geometries(g)) => Some(g),
            _ => None,
        }
    }

    pub fn attributes(&self, name: &str) -> Option<&AttributeTable> {
        match self.data.get(name) {
            Some(LoadedData::Attributes(t)) => Some(t),
            _ => None,
        }
    }

    /// Take ownership of one entry.
    pub fn take(&mut self, name: &str) -> Option<LoadedData> {
        self.data.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(|k| k.as_str())
    }

    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.failed.iter().map(|k| k.as_str())
    }

    pub fn is_failed(&self, name: &str) -> bool {
        self.failed.contains(name)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

//! Format adapters: raw payload in, uniform shape out.
//!
//! | kind      | geojson | topojson | csv | odata |
//! |-----------|---------|----------|-----|-------|
//! | geometry  | yes     | yes      | no  | no    |
//! | attribute | yes     | yes      | yes | yes   |
//!
//! Geometry payloads become a list of features; attribute payloads become an
//! [`AttributeTable`] keyed by the foreign key. Adapters never report anything
//! themselves: rows without a key are counted in [`Decoded::missing_keys`] and
//! the loader decides what to tell the user.

use geojson::GeoJson;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{
    AttributeRecord, AttributeTable, GeometryRecord, LoadedData, NamedRequest, RequestKind,
    SourceFormat, key_of,
};
use crate::topojson::Topology;

/// Name of the topology object holding the map features.
pub const TOPOLOGY_OBJECT: &str = "geo";

/// Key used for rows without a foreign key under [`MissingKeyPolicy::KeepAsUndefined`].
pub const UNDEFINED_KEY: &str = "undefined";

/// What to do with attribute rows whose foreign key is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeyPolicy {
    /// Report and drop the row.
    #[default]
    Skip,
    /// Report and keep the row under the key `"undefined"`.
    KeepAsUndefined,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub data: LoadedData,
    /// Attribute rows that had no usable foreign-key value.
    pub missing_keys: usize,
}

/// Fail with `InvalidFormat` when `format` cannot produce `kind`.
pub fn check_supported(kind: RequestKind, format: SourceFormat) -> Result<()> {
    match (kind, format) {
        (RequestKind::Geometry, SourceFormat::GeoJson | SourceFormat::TopoJson) => Ok(()),
        (RequestKind::Attribute, _) => Ok(()),
        (RequestKind::Geometry, other) => Err(Error::InvalidFormat(other.to_string())),
    }
}

/// Decode the payload fetched for `request`.
pub fn decode(request: &NamedRequest, payload: &[u8], policy: MissingKeyPolicy) -> Result<Decoded> {
    check_supported(request.kind, request.format)?;
    let malformed = |detail: String| Error::Decode {
        url: request.url.clone(),
        format: request.format.to_string(),
        detail,
    };

    match request.kind {
        RequestKind::Geometry => {
            let features = match request.format {
                SourceFormat::GeoJson => geojson_features(payload).map_err(malformed)?,
                _ => topojson_features(payload).map_err(malformed)?,
            };
            Ok(Decoded {
                data: LoadedData::Geometries(features),
                missing_keys: 0,
            })
        }
        RequestKind::Attribute => {
            let fk = request.foreign_key.as_deref().unwrap_or("");
            let rows: Vec<Option<AttributeRecord>> = match request.format {
                SourceFormat::GeoJson => geojson_features(payload)
                    .map_err(malformed)?
                    .into_iter()
                    .map(|f| f.properties)
                    .collect(),
                SourceFormat::TopoJson => topojson_features(payload)
                    .map_err(malformed)?
                    .into_iter()
                    .map(|f| f.properties)
                    .collect(),
                SourceFormat::Csv => csv_rows(payload).map_err(malformed)?.into_iter().map(Some).collect(),
                SourceFormat::OData => odata_rows(payload).map_err(malformed)?.into_iter().map(Some).collect(),
            };
            let (table, missing_keys) = key_rows(rows, fk, policy);
            Ok(Decoded {
                data: LoadedData::Attributes(table),
                missing_keys,
            })
        }
    }
}

fn key_rows(
    rows: Vec<Option<AttributeRecord>>,
    fk: &str,
    policy: MissingKeyPolicy,
) -> (AttributeTable, usize) {
    let mut table = AttributeTable::new();
    let mut missing = 0;
    for row in rows {
        let key = row.as_ref().and_then(|r| r.get(fk)).and_then(key_of);
        match (key, row) {
            (Some(k), Some(r)) => {
                table.insert(k, r);
            }
            (_, row) => {
                missing += 1;
                if policy == MissingKeyPolicy::KeepAsUndefined {
                    table.insert(UNDEFINED_KEY, row.unwrap_or_default());
                }
            }
        }
    }
    (table, missing)
}

fn geojson_features(payload: &[u8]) -> std::result::Result<Vec<GeometryRecord>, String> {
    let text = std::str::from_utf8(payload).map_err(|e| e.to_string())?;
    match text.parse::<GeoJson>().map_err(|e| e.to_string())? {
        GeoJson::FeatureCollection(fc) => Ok(fc.features),
        GeoJson::Feature(f) => Ok(vec![f]),
        GeoJson::Geometry(_) => Err("expected a FeatureCollection, found a bare geometry".into()),
    }
}

fn topojson_features(payload: &[u8]) -> std::result::Result<Vec<GeometryRecord>, String> {
    Topology::from_slice(payload)?.features(TOPOLOGY_OBJECT)
}

/// Every field is kept as a string, the way a browser CSV parser hands them out.
fn csv_rows(payload: &[u8]) -> std::result::Result<Vec<AttributeRecord>, String> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(payload);
    let headers = rdr.headers().map_err(|e| e.to_string())?.clone();
    let mut out = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| e.to_string())?;
        let row: AttributeRecord = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
            .collect();
        out.push(row);
    }
    Ok(out)
}

/// OData v3 JSON: rows live in `value` (light) or `d.results` / `d` (verbose).
///
/// Fixed-width text columns come back space-padded, so trailing whitespace is
/// stripped from every string field.
fn odata_rows(payload: &[u8]) -> std::result::Result<Vec<AttributeRecord>, String> {
    #[derive(Deserialize)]
    struct Verbose {
        results: Vec<Value>,
    }

    let root: Value = serde_json::from_slice(payload).map_err(|e| e.to_string())?;
    let rows = match (root.get("value"), root.get("d")) {
        (Some(Value::Array(rows)), _) => rows.clone(),
        (_, Some(Value::Array(rows))) => rows.clone(),
        (_, Some(d)) => {
            serde_json::from_value::<Verbose>(d.clone())
                .map_err(|e| format!("bad d.results: {}", e))?
                .results
        }
        _ => return Err("missing \"value\" array".into()),
    };

    rows.into_iter()
        .map(|row| match row {
            Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| match v {
                    Value::String(s) => (k, Value::String(s.trim_end().to_string())),
                    other => (k, other),
                })
                .collect()),
            other => Err(format!("row is not an object: {}", other)),
        })
        .collect()
}

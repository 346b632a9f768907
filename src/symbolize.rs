//! Join geometries to attribute rows and turn each into a render-ready symbol.
//!
//! Every lookup is a literal field access: `feature.properties[fk]` gives the
//! key, `table[key][attribute]` the value.

use serde::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::models::{AttributeTable, GeometryRecord, MapMode, key_of};
use crate::notify::{MessageKind, Notify};
use crate::palette::Rgba;
use crate::stats::{Stats, to_number};

/// Drawing parameters for one feature. Neutral when key or value is missing:
/// radius 0, no fill, empty label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Symbol {
    pub key: Option<String>,
    pub value: Option<Value>,
    pub radius: f64,
    pub fill: Option<Rgba>,
    pub label: String,
}

/// Foreign-key value of a geometry feature.
pub fn feature_key(feature: &GeometryRecord, fk: &str) -> Option<String> {
    feature.properties.as_ref()?.get(fk).and_then(key_of)
}

/// The attribute value joined to `feature`, if both key and value exist.
pub fn attribute_value<'a>(
    feature: &GeometryRecord,
    table: &'a AttributeTable,
    fk: &str,
    attribute: &str,
) -> Option<&'a Value> {
    let key = feature_key(feature, fk)?;
    table.value(&key, attribute).filter(|v| !v.is_null())
}

fn display(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
        _ => String::new(),
    }
}

/// One symbol per feature, in feature order.
///
/// Features without a key or a value are counted and reported once as
/// `InvalidData`.
pub fn symbolize(
    features: &[GeometryRecord],
    table: &AttributeTable,
    fk: &str,
    attribute: &str,
    stats: &Stats,
    notifier: &dyn Notify,
) -> Vec<Symbol> {
    let mut unmatched = 0usize;
    let symbols: Vec<Symbol> = features
        .iter()
        .map(|feature| {
            let key = feature_key(feature, fk);
            let value = key
                .as_deref()
                .and_then(|k| table.value(k, attribute))
                .filter(|v| !v.is_null());
            if value.is_none() {
                unmatched += 1;
            }

            let mut symbol = Symbol {
                key,
                value: value.cloned(),
                radius: 0.0,
                fill: None,
                label: String::new(),
            };
            match stats.mode {
                MapMode::PointSize => {
                    if let (Some(scale), Some(v)) = (stats.size_scale(), to_number(value)) {
                        symbol.radius = scale.radius(v);
                    }
                }
                MapMode::AreaValue => {
                    symbol.fill = stats
                        .value_scale()
                        .zip(to_number(value))
                        .and_then(|(scale, v)| scale.color(v));
                }
                MapMode::AreaColour => {
                    symbol.fill = stats
                        .colour_scale()
                        .zip(value.and_then(key_of))
                        .and_then(|(scale, c)| scale.color(&c));
                }
                MapMode::AreaLabel => symbol.label = display(value),
            }
            symbol
        })
        .collect();

    if unmatched > 0 {
        notifier.report(&Error::InvalidData {
            attribute: attribute.to_string(),
            detail: format!(
                "{} of {} feature(s) have no key or value (FK={})",
                unmatched,
                features.len(),
                fk
            ),
        });
    }
    notifier.notify(MessageKind::Debug, "Created map symbolisation.");
    symbols
}

/// Tooltip text: `"<label>: <value> <unit>"`.
///
/// The label part is left out when the label attribute is the mapped
/// attribute itself.
pub fn info_text(
    feature: &GeometryRecord,
    table: &AttributeTable,
    fk: &str,
    label_attribute: &str,
    attribute: &str,
    unit: &str,
) -> String {
    let mut text = String::new();
    if label_attribute != attribute {
        text.push_str(&display(attribute_value(feature, table, fk, label_attribute)));
        text.push_str(": ");
    }
    text.push_str(&display(attribute_value(feature, table, fk, attribute)));
    if !unit.is_empty() {
        text.push(' ');
        text.push_str(unit);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttributeRecord;
    use crate::notify::CollectingNotifier;
    use crate::stats::Classifier;
    use std::sync::Arc;

    fn feature(code: &str) -> GeometryRecord {
        let mut props = serde_json::Map::new();
        props.insert("code".into(), Value::String(code.into()));
        GeometryRecord {
            bbox: None,
            geometry: None,
            id: None,
            properties: Some(props),
            foreign_members: None,
        }
    }

    fn row(name: &str, v: Value) -> AttributeRecord {
        let mut r = AttributeRecord::new();
        r.insert("name".into(), Value::String(name.into()));
        r.insert("v".into(), v);
        r
    }

    fn table() -> AttributeTable {
        [
            ("A".to_string(), row("Aa", serde_json::json!(4))),
            ("B".to_string(), row("Bb", serde_json::json!(16))),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn circles_follow_the_size_scale() {
        let notifier = Arc::new(CollectingNotifier::new());
        let stats = Classifier::new(notifier.clone()).compute_stats(&table(), "v", MapMode::PointSize, None);
        let features = vec![feature("A"), feature("B"), feature("Z")];
        let symbols = symbolize(&features, &table(), "code", "v", &stats, notifier.as_ref());
        assert!((symbols[1].radius - 20.0).abs() < 1e-9);
        assert!(symbols[0].radius > 0.0 && symbols[0].radius < symbols[1].radius);
        assert_eq!(symbols[2].radius, 0.0);
        assert_eq!(symbols[2].key.as_deref(), Some("Z"));
        let errors = notifier.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("1 of 3 feature(s)"));
    }

    #[test]
    fn label_maps_show_the_raw_value() {
        let notifier = CollectingNotifier::new();
        let stats = Classifier::new(Arc::new(CollectingNotifier::new()))
            .compute_stats(&table(), "name", MapMode::AreaLabel, None);
        let symbols = symbolize(&[feature("B")], &table(), "code", "name", &stats, &notifier);
        assert_eq!(symbols[0].label, "Bb");
        assert!(notifier.errors().is_empty());
    }

    #[test]
    fn tooltip_omits_label_when_it_is_the_mapped_attribute() {
        let t = table();
        assert_eq!(info_text(&feature("A"), &t, "code", "name", "v", "people"), "Aa: 4 people");
        assert_eq!(info_text(&feature("A"), &t, "code", "v", "v", "people"), "4 people");
        assert_eq!(info_text(&feature("Q"), &t, "code", "v", "v", ""), "");
    }
}

use std::collections::BTreeMap;

use natatlas::format::{MissingKeyPolicy, decode};
use natatlas::models::LoadedData;
use natatlas::{NamedRequest, SourceFormat};
use proptest::prelude::*;
use serde_json::{Value, json};

fn attribute_table(format: SourceFormat, payload: &[u8]) -> natatlas::AttributeTable {
    let request = NamedRequest::attribute("attrib", format, "mem://attrib", "code");
    match decode(&request, payload, MissingKeyPolicy::Skip).unwrap().data {
        LoadedData::Attributes(t) => t,
        other => panic!("expected attributes, got {:?}", other),
    }
}

fn rows() -> impl Strategy<Value = BTreeMap<String, i64>> {
    prop::collection::btree_map("[A-Z]{2}[0-9]{4}", -1_000_000i64..1_000_000, 1..40)
}

proptest! {
    #[test]
    fn csv_rows_appear_once_under_their_key(rows in rows()) {
        let mut payload = String::from("code,value\n");
        for (k, v) in &rows {
            payload.push_str(&format!("{},{}\n", k, v));
        }
        let table = attribute_table(SourceFormat::Csv, payload.as_bytes());
        prop_assert_eq!(table.len(), rows.len());
        for (k, v) in &rows {
            prop_assert_eq!(table.value(k, "code"), Some(&Value::String(k.clone())));
            prop_assert_eq!(table.value(k, "value"), Some(&Value::String(v.to_string())));
        }
    }

    #[test]
    fn geojson_properties_appear_once_under_their_key(rows in rows()) {
        let features: Vec<Value> = rows
            .iter()
            .map(|(k, v)| json!({
                "type": "Feature",
                "geometry": null,
                "properties": {"code": k, "value": v}
            }))
            .collect();
        let payload = json!({"type": "FeatureCollection", "features": features}).to_string();
        let table = attribute_table(SourceFormat::GeoJson, payload.as_bytes());
        prop_assert_eq!(table.len(), rows.len());
        for (k, v) in &rows {
            let row = table.get(k).unwrap();
            prop_assert_eq!(row.get("value"), Some(&json!(v)));
        }
    }

    #[test]
    fn odata_strings_lose_trailing_padding(rows in rows(), pad in 0usize..6) {
        let values: Vec<Value> = rows
            .iter()
            .map(|(k, v)| json!({
                "code": format!("{}{}", k, " ".repeat(pad)),
                "label": format!("{} ", v),
                "value": v
            }))
            .collect();
        let payload = json!({"odata.metadata": "x", "value": values}).to_string();
        let table = attribute_table(SourceFormat::OData, payload.as_bytes());
        prop_assert_eq!(table.len(), rows.len());
        for (k, v) in &rows {
            prop_assert_eq!(table.value(k, "code"), Some(&json!(k)));
            prop_assert_eq!(table.value(k, "label"), Some(&json!(v.to_string())));
            prop_assert_eq!(table.value(k, "value"), Some(&json!(v)));
        }
    }
}

#[test]
fn topojson_attributes_are_keyed_like_geojson() {
    let payload = json!({
        "type": "Topology",
        "objects": {"geo": {"type": "GeometryCollection", "geometries": [
            {"type": "Point", "coordinates": [0, 0], "properties": {"code": "GM0014", "v": 1}},
            {"type": "Point", "coordinates": [1, 1], "properties": {"code": "GM0034", "v": 2}}
        ]}},
        "arcs": []
    })
    .to_string();
    let table = attribute_table(SourceFormat::TopoJson, payload.as_bytes());
    assert_eq!(table.keys().collect::<Vec<_>>(), vec!["GM0014", "GM0034"]);
    assert_eq!(table.value("GM0034", "v"), Some(&json!(2)));
}

#[test]
fn keep_as_undefined_collects_short_rows_under_one_key() {
    let request = NamedRequest::attribute("attrib", SourceFormat::Csv, "mem://a", "code");
    let payload = b"v,code\n1,A\n2\n3\n";
    let decoded = decode(&request, payload, MissingKeyPolicy::KeepAsUndefined).unwrap();
    assert_eq!(decoded.missing_keys, 2);
    let LoadedData::Attributes(t) = decoded.data else { panic!() };
    assert_eq!(t.len(), 2);
    assert_eq!(t.value("undefined", "v"), Some(&json!("3")));
    assert_eq!(t.value("A", "v"), Some(&json!("1")));
}

//! TopoJSON to GeoJSON conversion.
//!
//! Only the parts a viewer needs: decode the shared arcs (delta-encoded when
//! the topology is quantized), stitch them into lines and rings, and turn one
//! named object into a list of GeoJSON features.

use std::collections::BTreeMap;

use geojson::feature::Id;
use geojson::{Feature, Geometry, Value as GeoValue};
use serde::Deserialize;
use serde_json::Value;

type Position = Vec<f64>;

#[derive(Debug, Clone, Deserialize)]
pub struct Transform {
    pub scale: [f64; 2],
    pub translate: [f64; 2],
}

impl Transform {
    fn apply(&self, p: &[f64]) -> Position {
        let mut out = p.to_vec();
        if out.len() >= 2 {
            out[0] = out[0] * self.scale[0] + self.translate[0];
            out[1] = out[1] * self.scale[1] + self.translate[1];
        }
        out
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Topology {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub transform: Option<Transform>,
    #[serde(default)]
    pub arcs: Vec<Vec<Vec<f64>>>,
    #[serde(default)]
    pub objects: BTreeMap<String, TopoGeometry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopoGeometry {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub arcs: Option<Value>,
    #[serde(default)]
    pub coordinates: Option<Value>,
    #[serde(default)]
    pub geometries: Vec<TopoGeometry>,
    #[serde(default)]
    pub properties: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    pub id: Option<Value>,
}

impl Topology {
    pub fn from_slice(payload: &[u8]) -> Result<Self, String> {
        let topo: Topology = serde_json::from_slice(payload).map_err(|e| e.to_string())?;
        if topo.kind != "Topology" {
            return Err(format!("expected type \"Topology\", found {:?}", topo.kind));
        }
        Ok(topo)
    }

    /// Absolute coordinates of every arc.
    fn decoded_arcs(&self) -> Vec<Vec<Position>> {
        self.arcs
            .iter()
            .map(|arc| match &self.transform {
                Some(t) => {
                    let (mut x, mut y) = (0.0, 0.0);
                    arc.iter()
                        .map(|p| {
                            let mut q = p.clone();
                            if q.len() >= 2 {
                                x += q[0];
                                y += q[1];
                                q[0] = x;
                                q[1] = y;
                            }
                            t.apply(&q)
                        })
                        .collect()
                }
                None => arc.clone(),
            })
            .collect()
    }

    /// Convert the object called `name` into GeoJSON features.
    ///
    /// A `GeometryCollection` yields one feature per member geometry; any
    /// other object yields a single feature.
    pub fn features(&self, name: &str) -> Result<Vec<Feature>, String> {
        let object = self
            .objects
            .get(name)
            .ok_or_else(|| format!("topology has no object named {:?}", name))?;
        let ctx = Decoder {
            arcs: self.decoded_arcs(),
            transform: self.transform.as_ref(),
        };
        if object.kind.as_deref() == Some("GeometryCollection") {
            object.geometries.iter().map(|g| ctx.feature(g)).collect()
        } else {
            Ok(vec![ctx.feature(object)?])
        }
    }
}

struct Decoder<'a> {
    arcs: Vec<Vec<Position>>,
    transform: Option<&'a Transform>,
}

fn parse<T: for<'de> Deserialize<'de>>(v: &Option<Value>, what: &str) -> Result<T, String> {
    let v = v.as_ref().ok_or_else(|| format!("missing {}", what))?;
    serde_json::from_value(v.clone()).map_err(|e| format!("bad {}: {}", what, e))
}

impl Decoder<'_> {
    fn feature(&self, g: &TopoGeometry) -> Result<Feature, String> {
        let id = match &g.id {
            Some(Value::String(s)) => Some(Id::String(s.clone())),
            Some(Value::Number(n)) => Some(Id::Number(n.clone())),
            _ => None,
        };
        Ok(Feature {
            bbox: None,
            geometry: self.geometry(g)?,
            id,
            properties: Some(g.properties.clone().unwrap_or_default()),
            foreign_members: None,
        })
    }

    fn geometry(&self, g: &TopoGeometry) -> Result<Option<Geometry>, String> {
        let kind = match g.kind.as_deref() {
            None => return Ok(None),
            Some(k) => k,
        };
        let value = match kind {
            "Point" => GeoValue::Point(self.point(&parse::<Vec<f64>>(&g.coordinates, "coordinates")?)),
            "MultiPoint" => GeoValue::MultiPoint(
                parse::<Vec<Vec<f64>>>(&g.coordinates, "coordinates")?
                    .iter()
                    .map(|p| self.point(p))
                    .collect(),
            ),
            "LineString" => GeoValue::LineString(self.line(&parse::<Vec<i64>>(&g.arcs, "arcs")?)?),
            "MultiLineString" => GeoValue::MultiLineString(
                parse::<Vec<Vec<i64>>>(&g.arcs, "arcs")?
                    .iter()
                    .map(|l| self.line(l))
                    .collect::<Result<_, _>>()?,
            ),
            "Polygon" => GeoValue::Polygon(self.polygon(&parse::<Vec<Vec<i64>>>(&g.arcs, "arcs")?)?),
            "MultiPolygon" => GeoValue::MultiPolygon(
                parse::<Vec<Vec<Vec<i64>>>>(&g.arcs, "arcs")?
                    .iter()
                    .map(|p| self.polygon(p))
                    .collect::<Result<_, _>>()?,
            ),
            "GeometryCollection" => GeoValue::GeometryCollection(
                g.geometries
                    .iter()
                    .filter_map(|m| self.geometry(m).transpose())
                    .collect::<Result<_, _>>()?,
            ),
            other => return Err(format!("unknown geometry type {:?}", other)),
        };
        Ok(Some(Geometry::new(value)))
    }

    fn point(&self, p: &[f64]) -> Position {
        match self.transform {
            Some(t) => t.apply(p),
            None => p.to_vec(),
        }
    }

    /// Stitch arcs end to end; a negative index `~i` walks arc `i` backwards.
    fn line(&self, indices: &[i64]) -> Result<Vec<Position>, String> {
        let mut points: Vec<Position> = Vec::new();
        for (k, &i) in indices.iter().enumerate() {
            let (idx, reverse) = if i < 0 { ((!i) as usize, true) } else { (i as usize, false) };
            let arc = self
                .arcs
                .get(idx)
                .ok_or_else(|| format!("arc index {} out of range", i))?;
            if k > 0 {
                points.pop();
            }
            if reverse {
                points.extend(arc.iter().rev().cloned());
            } else {
                points.extend(arc.iter().cloned());
            }
        }
        Ok(points)
    }

    fn ring(&self, indices: &[i64]) -> Result<Vec<Position>, String> {
        let mut points = self.line(indices)?;
        if let Some(first) = points.first().cloned() {
            while points.len() < 4 {
                points.push(first.clone());
            }
        }
        Ok(points)
    }

    fn polygon(&self, rings: &[Vec<i64>]) -> Result<Vec<Vec<Position>>, String> {
        rings.iter().map(|r| self.ring(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUANTIZED: &str = r#"{
      "type": "Topology",
      "transform": {"scale": [1, 1], "translate": [0, 0]},
      "objects": {
        "geo": {
          "type": "GeometryCollection",
          "geometries": [
            {"type": "Polygon", "arcs": [[0, 1]], "properties": {"code": "A"}, "id": 1},
            {"type": "Polygon", "arcs": [[-2, 2]], "properties": {"code": "B"}},
            {"type": null, "properties": {"code": "C"}}
          ]
        }
      },
      "arcs": [
        [[1, 0], [0, 1]],
        [[1, 1], [0, -1], [-1, 0]],
        [[1, 0], [1, 0], [0, 1], [-1, 0]]
      ]
    }"#;

    #[test]
    fn decodes_quantized_polygons_with_shared_arcs() {
        let topo = Topology::from_slice(QUANTIZED.as_bytes()).unwrap();
        let feats = topo.features("geo").unwrap();
        assert_eq!(feats.len(), 3);

        let a = feats[0].geometry.as_ref().unwrap();
        match &a.value {
            GeoValue::Polygon(rings) => {
                assert_eq!(
                    rings[0],
                    vec![vec![1.0, 0.0], vec![1.0, 1.0], vec![1.0, 0.0], vec![0.0, 0.0]]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(feats[0].id, Some(Id::Number(1.into())));

        // Arc 1 reversed then arc 2: starts where arc 1 ends.
        match &feats[1].geometry.as_ref().unwrap().value {
            GeoValue::Polygon(rings) => {
                assert_eq!(rings[0].first(), Some(&vec![0.0, 0.0]));
                assert_eq!(rings[0].len(), 6);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(feats[2].geometry.is_none());
        assert_eq!(
            feats[2].properties.as_ref().unwrap().get("code"),
            Some(&Value::String("C".into()))
        );
    }

    #[test]
    fn missing_object_and_wrong_type_are_errors() {
        let topo = Topology::from_slice(QUANTIZED.as_bytes()).unwrap();
        assert!(topo.features("counties").is_err());
        assert!(Topology::from_slice(br#"{"type":"FeatureCollection","features":[]}"#).is_err());
    }
}

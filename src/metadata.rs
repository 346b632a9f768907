//! Atlas metadata: the document describing every map the viewer can show.
//!
//! The hierarchy is group → subject → unit → date. A date names its geometry
//! and attribute sources by id, the foreign key joining them and the
//! attribute to map. The subject decides the map type and data unit.
//!
//! Human-readable texts are either a plain string or a list with one entry
//! per interface language (`["Bevolking", "Population"]`).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classification::ClassificationConfig;
use crate::error::{Error, Result};
use crate::models::{MapMode, NamedRequest, RequestKind, SourceFormat, key_of};

/// Name of the geometry request in a map session.
pub const GEOMETRY_REQUEST: &str = "geo";
/// Name of the attribute request in a map session.
pub const ATTRIBUTE_REQUEST: &str = "attrib";

/// Interface language, indexing into multilingual metadata texts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Nl,
    #[default]
    En,
}

impl Language {
    fn index(self) -> usize {
        match self {
            Language::Nl => 0,
            Language::En => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Localized {
    Plain(String),
    PerLanguage(Vec<String>),
}

impl Default for Localized {
    fn default() -> Self {
        Localized::Plain(String::new())
    }
}

impl Localized {
    /// Text in `lang`, falling back to the first entry.
    pub fn text(&self, lang: Language) -> &str {
        match self {
            Localized::Plain(s) => s,
            Localized::PerLanguage(v) => v
                .get(lang.index())
                .or_else(|| v.first())
                .map(|s| s.as_str())
                .unwrap_or(""),
        }
    }
}

/// Where a source lives and what it returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    #[serde(rename = "serviceURL")]
    pub service_url: String,
    #[serde(rename = "serviceOutputFormat")]
    pub output_format: String,
    /// Attribution shown in the legend footer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Localized>,
}

/// Sources keyed by id, or listed and addressed by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceTable {
    Keyed(BTreeMap<String, SourceDescriptor>),
    Listed(Vec<SourceDescriptor>),
}

impl Default for SourceTable {
    fn default() -> Self {
        SourceTable::Keyed(BTreeMap::new())
    }
}

impl SourceTable {
    pub fn get(&self, id: &str) -> Option<&SourceDescriptor> {
        match self {
            SourceTable::Keyed(m) => m.get(id),
            SourceTable::Listed(v) => id.parse::<usize>().ok().and_then(|i| v.get(i)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDate {
    #[serde(default)]
    pub date: Value,
    pub geo_data: Value,
    pub attrib_data: Value,
    #[serde(rename = "FK")]
    pub foreign_key: String,
    pub attrib: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapUnit {
    #[serde(default)]
    pub name: Localized,
    pub mapdates: Vec<MapDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSubject {
    #[serde(default)]
    pub name: Localized,
    pub maptype: String,
    #[serde(default)]
    pub data_unit: Localized,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<ClassificationConfig>,
    pub mapunits: Vec<MapUnit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapGroup {
    #[serde(default)]
    pub groupname: Localized,
    pub mapsubjects: Vec<MapSubject>,
}

/// The whole metadata document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtlasMetadata {
    #[serde(rename = "atlasName", default, skip_serializing_if = "Option::is_none")]
    pub atlas_name: Option<Localized>,
    #[serde(rename = "atlasCopyright", default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<Localized>,
    pub mapgroups: Vec<MapGroup>,
    #[serde(default)]
    pub geo_sources: SourceTable,
    #[serde(default)]
    pub attrib_sources: SourceTable,
}

/// A position in the group/subject/unit/date hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MapChoice {
    pub group: usize,
    pub subject: usize,
    pub unit: usize,
    pub date: usize,
}

impl MapChoice {
    pub fn new(group: usize, subject: usize, unit: usize, date: usize) -> Self {
        Self {
            group,
            subject,
            unit,
            date,
        }
    }
}

/// Everything needed to load and classify one map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapSelection {
    pub choice: MapChoice,
    pub group_name: Localized,
    pub subject_name: Localized,
    pub unit_name: Localized,
    pub date: Option<String>,
    pub mode: MapMode,
    pub data_unit: Localized,
    pub geometry_source: SourceDescriptor,
    pub attribute_source: SourceDescriptor,
    pub foreign_key: String,
    pub attribute: String,
    /// Attribute used as tooltip label; defaults to the mapped attribute.
    pub label: Option<String>,
    pub classification: Option<ClassificationConfig>,
}

impl AtlasMetadata {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        parse_document(bytes, "atlas metadata")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        parse_document(&bytes, &path.display().to_string())
    }

    /// Look up `choice` in the hierarchy and collect its parameters.
    pub fn resolve(&self, choice: MapChoice) -> Result<MapSelection> {
        let missing = || Error::NoMetadata {
            group: choice.group,
            subject: choice.subject,
            unit: choice.unit,
            date: choice.date,
        };
        let group = self.mapgroups.get(choice.group).ok_or_else(missing)?;
        let subject = group.mapsubjects.get(choice.subject).ok_or_else(missing)?;
        let unit = subject.mapunits.get(choice.unit).ok_or_else(missing)?;
        let date = unit.mapdates.get(choice.date).ok_or_else(missing)?;

        let mode: MapMode = subject.maptype.parse()?;
        let geometry_source = lookup(&self.geo_sources, &date.geo_data, RequestKind::Geometry)?;
        let attribute_source =
            lookup(&self.attrib_sources, &date.attrib_data, RequestKind::Attribute)?;

        Ok(MapSelection {
            choice,
            group_name: group.groupname.clone(),
            subject_name: subject.name.clone(),
            unit_name: unit.name.clone(),
            date: key_of(&date.date),
            mode,
            data_unit: subject.data_unit.clone(),
            geometry_source: geometry_source.clone(),
            attribute_source: attribute_source.clone(),
            foreign_key: date.foreign_key.clone(),
            attribute: date.attrib.clone(),
            label: date.label.clone(),
            classification: subject.classification.clone(),
        })
    }

    /// Every valid choice, in menu order.
    pub fn choices(&self) -> impl Iterator<Item = MapChoice> + '_ {
        self.mapgroups.iter().enumerate().flat_map(|(g, group)| {
            group.mapsubjects.iter().enumerate().flat_map(move |(s, subject)| {
                subject.mapunits.iter().enumerate().flat_map(move |(u, unit)| {
                    (0..unit.mapdates.len()).map(move |d| MapChoice::new(g, s, u, d))
                })
            })
        })
    }
}

fn lookup<'a>(table: &'a SourceTable, id: &Value, kind: RequestKind) -> Result<&'a SourceDescriptor> {
    let id = key_of(id).unwrap_or_default();
    table
        .get(&id)
        .ok_or(Error::UnknownSource { kind, id })
}

fn parse_document(bytes: &[u8], origin: &str) -> Result<AtlasMetadata> {
    serde_json::from_slice(bytes).map_err(|e| Error::Decode {
        url: origin.to_string(),
        format: "json".into(),
        detail: e.to_string(),
    })
}

impl MapSelection {
    pub fn geometry_request(&self) -> Result<NamedRequest> {
        let format: SourceFormat = self.geometry_source.output_format.parse()?;
        Ok(NamedRequest::geometry(
            GEOMETRY_REQUEST,
            format,
            self.geometry_source.service_url.clone(),
        ))
    }

    pub fn attribute_request(&self) -> Result<NamedRequest> {
        let format: SourceFormat = self.attribute_source.output_format.parse()?;
        Ok(NamedRequest::attribute(
            ATTRIBUTE_REQUEST,
            format,
            self.attribute_source.service_url.clone(),
            self.foreign_key.clone(),
        ))
    }

    /// The attribute shown before the value in tooltips.
    pub fn label_attribute(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> AtlasMetadata {
        let text = json!({
            "atlasName": ["Atlas", "Atlas"],
            "geo_sources": {
                "gem2016": {"serviceURL": "geo/gem_2016.topojson", "serviceOutputFormat": "topojson"}
            },
            "attrib_sources": {
                "cbs2016": {"serviceURL": "https://example.org/odata/Bevolking", "serviceOutputFormat": "OData"}
            },
            "mapgroups": [{
                "groupname": ["Bevolking", "Population"],
                "mapsubjects": [{
                    "name": ["Inwoners", "Inhabitants"],
                    "maptype": "point_size",
                    "data_unit": ["aantal", "count"],
                    "mapunits": [{
                        "name": ["gemeente", "municipality"],
                        "mapdates": [{
                            "date": 2016,
                            "geo_data": "gem2016",
                            "attrib_data": "cbs2016",
                            "FK": "GM_CODE",
                            "attrib": "Inwoners",
                            "label": "Naam"
                        }]
                    }]
                }, {
                    "name": "Bodem",
                    "maptype": "pie_chart",
                    "mapunits": [{"mapdates": [{
                        "geo_data": "gem2016", "attrib_data": "cbs2016",
                        "FK": "GM_CODE", "attrib": "Bodem"
                    }]}]
                }]
            }]
        })
        .to_string();
        AtlasMetadata::from_slice(text.as_bytes()).unwrap()
    }

    #[test]
    fn resolves_a_full_choice() {
        let sel = doc().resolve(MapChoice::new(0, 0, 0, 0)).unwrap();
        assert_eq!(sel.mode, MapMode::PointSize);
        assert_eq!(sel.date.as_deref(), Some("2016"));
        assert_eq!(sel.subject_name.text(Language::En), "Inhabitants");
        assert_eq!(sel.data_unit.text(Language::Nl), "aantal");
        assert_eq!(sel.label_attribute(), "Naam");

        let geo = sel.geometry_request().unwrap();
        assert_eq!(geo.name, GEOMETRY_REQUEST);
        assert_eq!(geo.format, SourceFormat::TopoJson);
        let attrib = sel.attribute_request().unwrap();
        assert_eq!(attrib.format, SourceFormat::OData);
        assert_eq!(attrib.foreign_key.as_deref(), Some("GM_CODE"));
    }

    #[test]
    fn missing_levels_name_all_four_indices() {
        let err = doc().resolve(MapChoice::new(0, 0, 3, 0)).unwrap_err();
        assert!(matches!(err, Error::NoMetadata { unit: 3, .. }));
        assert_eq!(err.to_string(), "no metadata for map [0,0,3,0]");
    }

    #[test]
    fn unknown_map_type_is_rejected() {
        let err = doc().resolve(MapChoice::new(0, 1, 0, 0)).unwrap_err();
        assert!(err.to_string().contains("pie_chart"));
    }

    #[test]
    fn listed_sources_are_addressed_by_index() {
        let mut md = doc();
        md.geo_sources = SourceTable::Listed(vec![SourceDescriptor {
            service_url: "a.geojson".into(),
            output_format: "geojson".into(),
            source: None,
        }]);
        md.mapgroups[0].mapsubjects[0].mapunits[0].mapdates[0].geo_data = json!(0);
        let sel = md.resolve(MapChoice::new(0, 0, 0, 0)).unwrap();
        assert_eq!(sel.geometry_source.service_url, "a.geojson");

        md.mapgroups[0].mapsubjects[0].mapunits[0].mapdates[0].geo_data = json!(7);
        let err = md.resolve(MapChoice::new(0, 0, 0, 0)).unwrap_err();
        assert!(matches!(err, Error::UnknownSource { kind: RequestKind::Geometry, .. }));
    }

    #[test]
    fn unreadable_documents_name_their_origin() {
        let err = AtlasMetadata::from_slice(b"{\"mapgroups\": 3}").unwrap_err();
        assert!(err.to_string().contains("atlas metadata"), "{}", err);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atlas.json");
        std::fs::write(&path, "not json").unwrap();
        let err = AtlasMetadata::from_path(&path).unwrap_err();
        assert!(matches!(err, Error::Decode { ref url, .. } if url.ends_with("atlas.json")));
        assert!(matches!(
            AtlasMetadata::from_path(&dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn choices_walk_the_hierarchy() {
        let all: Vec<_> = doc().choices().collect();
        assert_eq!(all, vec![MapChoice::new(0, 0, 0, 0), MapChoice::new(0, 1, 0, 0)]);
    }
}

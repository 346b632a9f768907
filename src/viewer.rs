//! One viewer session per map choice: resolve, load, classify, symbolise.
//!
//! A [`Viewer`] holds only its collaborators and settings. Every call to
//! [`Viewer::choose_map`] runs an independent loader session, so a slow,
//! superseded request cannot leak into the next map.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::classification::ClassificationDefaults;
use crate::format::MissingKeyPolicy;
use crate::legend::{Legend, build_legend};
use crate::loader::Loader;
use crate::metadata::{ATTRIBUTE_REQUEST, AtlasMetadata, GEOMETRY_REQUEST, Language, MapChoice, MapSelection};
use crate::models::{AttributeTable, GeometryRecord, LoadedData};
use crate::notify::{MessageKind, Notify};
use crate::stats::{Classifier, DEFAULT_MAX_CIRCLE_SIZE, Stats};
use crate::symbolize::{Symbol, info_text, symbolize};
use crate::transport::Fetch;

/// Viewer-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    /// Radius of the largest proportional circle.
    pub max_circle_size: f64,
    pub classification: ClassificationDefaults,
    pub missing_key_policy: MissingKeyPolicy,
    pub language: Language,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            max_circle_size: DEFAULT_MAX_CIRCLE_SIZE,
            classification: ClassificationDefaults::default(),
            missing_key_policy: MissingKeyPolicy::default(),
            language: Language::default(),
        }
    }
}

/// A loaded, classified and symbolised map, ready for a renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedMap {
    pub selection: MapSelection,
    #[serde(skip)]
    pub geometries: Vec<GeometryRecord>,
    #[serde(skip)]
    pub attributes: AttributeTable,
    pub stats: Stats,
    /// One per geometry, in geometry order.
    pub symbols: Vec<Symbol>,
    /// One per geometry, in geometry order.
    pub tooltips: Vec<String>,
    pub legend: Legend,
}

pub struct Viewer {
    transport: Arc<dyn Fetch>,
    notifier: Arc<dyn Notify>,
    settings: ViewerSettings,
}

impl Viewer {
    pub fn new(transport: Arc<dyn Fetch>, notifier: Arc<dyn Notify>) -> Self {
        Self {
            transport,
            notifier,
            settings: ViewerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ViewerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    /// A classifier configured from these settings.
    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.notifier.clone())
            .with_max_circle_size(self.settings.max_circle_size)
            .with_defaults(self.settings.classification.clone())
    }

    /// Resolve `choice`, load its two sources and build the map.
    ///
    /// Returns `None` when the choice does not resolve or either source
    /// failed; the reason has already been reported.
    pub async fn choose_map(&self, metadata: &AtlasMetadata, choice: MapChoice) -> Option<RenderedMap> {
        let selection = match metadata.resolve(choice) {
            Ok(s) => s,
            Err(err) => {
                self.notifier.report(&err);
                return None;
            }
        };

        let mut loader = Loader::new(self.transport.clone(), self.notifier.clone())
            .with_missing_key_policy(self.settings.missing_key_policy);
        let registered = loader
            .add_geometry_request(
                GEOMETRY_REQUEST,
                &selection.geometry_source.output_format,
                &selection.geometry_source.service_url,
            )
            .and_then(|l| {
                l.add_attribute_request(
                    ATTRIBUTE_REQUEST,
                    &selection.attribute_source.output_format,
                    &selection.attribute_source.service_url,
                    &selection.foreign_key,
                )
            });
        if let Err(err) = registered {
            self.notifier.report(&err);
            return None;
        }

        let mut data = loader.wait().await;
        let geometries = match data.take(GEOMETRY_REQUEST) {
            Some(LoadedData::Geometries(g)) => g,
            _ => return None,
        };
        let attributes = match data.take(ATTRIBUTE_REQUEST) {
            Some(LoadedData::Attributes(t)) => t,
            _ => return None,
        };

        Some(self.build(selection, geometries, attributes))
    }

    /// Classify and symbolise already loaded data.
    pub fn build(
        &self,
        selection: MapSelection,
        geometries: Vec<GeometryRecord>,
        attributes: AttributeTable,
    ) -> RenderedMap {
        let stats = self.classifier().compute_stats(
            &attributes,
            &selection.attribute,
            selection.mode,
            selection.classification.as_ref(),
        );
        let symbols = symbolize(
            &geometries,
            &attributes,
            &selection.foreign_key,
            &selection.attribute,
            &stats,
            self.notifier.as_ref(),
        );
        let unit = selection.data_unit.text(self.settings.language);
        let tooltips = geometries
            .iter()
            .map(|f| {
                info_text(
                    f,
                    &attributes,
                    &selection.foreign_key,
                    selection.label_attribute(),
                    &selection.attribute,
                    unit,
                )
            })
            .collect();
        let legend = build_legend(&stats, self.settings.max_circle_size);
        self.notifier.notify(MessageKind::Debug, "Created map.");

        RenderedMap {
            selection,
            geometries,
            attributes,
            stats,
            symbols,
            tooltips,
            legend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::notify::CollectingNotifier;
    use crate::transport::MemoryTransport;
    use serde_json::json;

    const GEO: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","geometry":null,"properties":{"code":"A"}},
        {"type":"Feature","geometry":null,"properties":{"code":"B"}},
        {"type":"Feature","geometry":null,"properties":{"code":"C"}}
    ]}"#;

    const CSV: &str = "code,name,pop\nA,Aa,100\nB,Bb,400\nC,Cc,1600\n";

    fn metadata(maptype: &str) -> AtlasMetadata {
        serde_json::from_value(json!({
            "geo_sources": {"g": {"serviceURL": "mem://geo", "serviceOutputFormat": "geojson"}},
            "attrib_sources": {"a": {"serviceURL": "mem://attrib", "serviceOutputFormat": "csv"}},
            "mapgroups": [{"mapsubjects": [{
                "maptype": maptype,
                "data_unit": ["inwoners", "inhabitants"],
                "mapunits": [{"mapdates": [{
                    "geo_data": "g", "attrib_data": "a", "FK": "code", "attrib": "pop", "label": "name"
                }]}]
            }]}]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn proportional_map_end_to_end() {
        let t = MemoryTransport::new()
            .with_payload("mem://geo", GEO)
            .with_payload("mem://attrib", CSV);
        let n = Arc::new(CollectingNotifier::new());
        let viewer = Viewer::new(Arc::new(t), n.clone());
        let map = viewer
            .choose_map(&metadata("point_size"), MapChoice::default())
            .await
            .unwrap();
        assert_eq!(map.symbols.len(), 3);
        assert!((map.symbols[2].radius - 20.0).abs() < 1e-9);
        assert_eq!(map.tooltips[0], "Aa: 100 inhabitants");
        assert_eq!(map.legend.len(), 4);
        assert!(n.errors().is_empty(), "{:?}", n.errors());
    }

    #[tokio::test]
    async fn failed_attribute_source_yields_no_map() {
        let t = MemoryTransport::new()
            .with_payload("mem://geo", GEO)
            .with_failure("mem://attrib", FetchError::network("TypeError", "Failed to fetch"));
        let n = Arc::new(CollectingNotifier::new());
        let viewer = Viewer::new(Arc::new(t), n.clone());
        assert!(viewer.choose_map(&metadata("area_value"), MapChoice::default()).await.is_none());
        assert_eq!(n.errors().len(), 1);
        assert!(n.errors()[0].contains("TypeError: Failed to fetch"));
    }

    #[tokio::test]
    async fn unknown_choice_is_reported() {
        let viewer = Viewer::new(Arc::new(MemoryTransport::new()), Arc::new(CollectingNotifier::new()));
        assert!(viewer.choose_map(&metadata("area_value"), MapChoice::new(0, 0, 0, 9)).await.is_none());
    }

    #[test]
    fn settings_fill_missing_fields_with_defaults() {
        let s: ViewerSettings = serde_json::from_value(json!({"max_circle_size": 35})).unwrap();
        assert_eq!(s.max_circle_size, 35.0);
        assert_eq!(s.classification.num_classes, 5);
        assert_eq!(s.missing_key_policy, MissingKeyPolicy::Skip);
    }
}

//! Map statistics: column extraction, data extent and scale construction.
//!
//! [`Classifier::compute_stats`] never fails. Data problems and bad
//! classification parameters are reported through the notifier and the
//! returned [`Stats`] simply carries no scale.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::classification::{
    ClassificationConfig, ClassificationDefaults, ClassificationMethod, EffectiveClassification,
    LabelFormat,
};
use crate::error::Error;
use crate::jenks::natural_breaks;
use crate::models::{AttributeTable, MapMode, key_of};
use crate::notify::{MessageKind, Notify};
use crate::palette::{self, Rgba};
use crate::scale::{OrdinalScale, QuantileScale, Scale, SizeScale};

/// Values at or below this are upstream "no data" markers.
pub const NO_DATA_THRESHOLD: f64 = -99_999_997.0;

/// Radius of the largest proportional circle, in pixels.
pub const DEFAULT_MAX_CIRCLE_SIZE: f64 = 20.0;

/// How many offending keys an `InvalidData` report names.
const SAMPLE_KEYS: usize = 3;

/// The extracted attribute column, in table key order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Column {
    /// Missing or non-numeric entries are `NaN`.
    Numeric(Vec<f64>),
    /// Missing entries are `Value::Null`.
    Categorical(Vec<Value>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the renderer and legend need for one map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub mode: MapMode,
    pub attribute: String,
    pub values: Column,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Class bounds of a choropleth: lower bound of every class, then the maximum.
    pub breaks: Option<Vec<f64>>,
    pub scale: Option<Scale>,
    #[serde(skip)]
    pub label_format: LabelFormat,
}

impl Stats {
    pub fn size_scale(&self) -> Option<&SizeScale> {
        match &self.scale {
            Some(Scale::Size(s)) => Some(s),
            _ => None,
        }
    }

    pub fn value_scale(&self) -> Option<&QuantileScale> {
        match &self.scale {
            Some(Scale::Value(s)) => Some(s),
            _ => None,
        }
    }

    pub fn colour_scale(&self) -> Option<&OrdinalScale> {
        match &self.scale {
            Some(Scale::Colour(s)) => Some(s),
            _ => None,
        }
    }
}

/// Coerce one attribute value to a number.
///
/// Numbers pass through, strings are parsed after trimming, booleans count as
/// 1 and 0. Empty strings, `null` and structured values are missing.
pub fn to_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                s.parse::<f64>().ok().filter(|v| v.is_finite())
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Computes [`Stats`] for one attribute of a joined table.
pub struct Classifier {
    notifier: Arc<dyn Notify>,
    max_circle_size: f64,
    defaults: ClassificationDefaults,
}

impl Classifier {
    pub fn new(notifier: Arc<dyn Notify>) -> Self {
        Self {
            notifier,
            max_circle_size: DEFAULT_MAX_CIRCLE_SIZE,
            defaults: ClassificationDefaults::default(),
        }
    }

    pub fn with_max_circle_size(mut self, max_circle_size: f64) -> Self {
        self.max_circle_size = max_circle_size;
        self
    }

    pub fn with_defaults(mut self, defaults: ClassificationDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Build the statistics and the mode's scale for `attribute`.
    ///
    /// ### Arguments
    /// - `table`: joined attribute rows; the column follows its key order.
    /// - `mode`: selects which scale (if any) is built.
    /// - `config`: classification parameters; `None` uses the defaults.
    ///
    /// Pure with respect to its inputs: `config` is only read.
    pub fn compute_stats(
        &self,
        table: &AttributeTable,
        attribute: &str,
        mode: MapMode,
        config: Option<&ClassificationConfig>,
    ) -> Stats {
        let values = self.extract(table, attribute, mode);
        let (min, max) = match &values {
            Column::Numeric(v) => extent(v),
            Column::Categorical(_) => (None, None),
        };
        let mut stats = Stats {
            mode,
            attribute: attribute.to_string(),
            values,
            min,
            max,
            breaks: None,
            scale: None,
            label_format: LabelFormat::default(),
        };

        match EffectiveClassification::derive(config, mode, &self.defaults) {
            Ok(effective) => {
                stats.label_format = effective.label_format;
                if let Err(err) = self.build_scale(&mut stats, &effective) {
                    self.notifier.report(&err);
                }
            }
            Err(err) => self.notifier.report(&err),
        }

        self.notifier
            .notify(MessageKind::Debug, "Calculated map statistics.");
        stats
    }

    fn extract(&self, table: &AttributeTable, attribute: &str, mode: MapMode) -> Column {
        let mut missing: Vec<&str> = Vec::new();
        let column = if mode.is_numeric() {
            Column::Numeric(
                table
                    .iter()
                    .map(|(key, row)| {
                        to_number(row.get(attribute)).unwrap_or_else(|| {
                            missing.push(key);
                            f64::NAN
                        })
                    })
                    .collect(),
            )
        } else {
            Column::Categorical(
                table
                    .iter()
                    .map(|(key, row)| match row.get(attribute) {
                        Some(v) if key_of(v).is_some() => v.clone(),
                        _ => {
                            missing.push(key);
                            Value::Null
                        }
                    })
                    .collect(),
            )
        };

        if !missing.is_empty() {
            let sample: Vec<&str> = missing.iter().take(SAMPLE_KEYS).copied().collect();
            let what = if mode.is_numeric() { "numeric" } else { "usable" };
            self.notifier.report(&Error::InvalidData {
                attribute: attribute.to_string(),
                detail: format!(
                    "{} of {} value(s) are missing or not {} (keys: {}{})",
                    missing.len(),
                    table.len(),
                    what,
                    sample.join(", "),
                    if missing.len() > SAMPLE_KEYS { ", ..." } else { "" }
                ),
            });
        }
        column
    }

    fn build_scale(
        &self,
        stats: &mut Stats,
        effective: &EffectiveClassification,
    ) -> Result<(), Error> {
        let attribute = stats.attribute.clone();
        let no_values = || Error::InvalidData {
            attribute: attribute.clone(),
            detail: "no values to classify".into(),
        };

        match stats.mode {
            MapMode::AreaLabel => Ok(()),
            MapMode::PointSize => {
                let (Some(min), Some(max)) = (stats.min, stats.max) else {
                    return Err(no_values());
                };
                let scale = SizeScale::new(min, max, self.max_circle_size).ok_or_else(|| {
                    Error::InvalidData {
                        attribute: attribute.clone(),
                        detail: format!("maximum {} is not positive, circles cannot be sized", max),
                    }
                })?;
                stats.scale = Some(Scale::Size(scale));
                Ok(())
            }
            MapMode::AreaValue => {
                let (Some(min), Some(max)) = (stats.min, stats.max) else {
                    return Err(no_values());
                };
                let n = effective.num_classes;
                let colours = palette::palette(&effective.palette, n)?;
                let (breaks, colours) = match effective.method {
                    ClassificationMethod::Manual => (effective.manual_breaks(min, max)?, colours),
                    ClassificationMethod::Jenks => {
                        let Column::Numeric(values) = &stats.values else {
                            return Err(no_values());
                        };
                        let data: Vec<f64> = values
                            .iter()
                            .copied()
                            .filter(|v| *v > NO_DATA_THRESHOLD)
                            .collect();
                        let nb = natural_breaks(&data, n).ok_or_else(no_values)?;
                        if nb.classes < n {
                            self.notifier.notify(
                                MessageKind::Info,
                                &format!(
                                    "Only {} distinct value(s) in {}; using {} class(es) instead of {}.",
                                    nb.classes, attribute, nb.classes, n
                                ),
                            );
                        }
                        let mut breaks = nb.breaks;
                        breaks[0] = breaks[0].min(min);
                        (breaks, sample_colours(colours, nb.classes))
                    }
                };
                stats.scale = Some(Scale::Value(QuantileScale::new(&breaks, colours)));
                stats.breaks = Some(breaks);
                Ok(())
            }
            MapMode::AreaColour => {
                let Column::Categorical(values) = &stats.values else {
                    return Err(no_values());
                };
                let colours = palette::palette(&effective.palette, effective.num_classes)?;
                let categories = values.iter().filter_map(key_of);
                stats.scale = Some(Scale::Colour(OrdinalScale::new(categories, colours)));
                Ok(())
            }
        }
    }
}

/// Finite extent of `values`; a minimum at or below the no-data threshold
/// becomes 0.
fn extent(values: &[f64]) -> (Option<f64>, Option<f64>) {
    let mut finite = values.iter().copied().filter(|v| v.is_finite());
    let Some(first) = finite.next() else {
        return (None, None);
    };
    let (min, max) = finite.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let min = if min <= NO_DATA_THRESHOLD { 0.0 } else { min };
    (Some(min), Some(max))
}

/// Pick `k` colours spread evenly over `colours`, keeping both ends.
fn sample_colours(colours: Vec<Rgba>, k: usize) -> Vec<Rgba> {
    let n = colours.len();
    if k >= n || n == 0 {
        return colours;
    }
    if k <= 1 {
        return vec![colours[n / 2]];
    }
    (0..k)
        .map(|i| colours[(i * (n - 1) + (k - 1) / 2) / (k - 1)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttributeRecord;
    use crate::notify::CollectingNotifier;
    use serde_json::json;

    fn table(attr: &str, values: &[Value]) -> AttributeTable {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut row = AttributeRecord::new();
                row.insert("code".into(), json!(format!("K{:02}", i)));
                row.insert(attr.into(), v.clone());
                (format!("K{:02}", i), row)
            })
            .collect()
    }

    fn classifier() -> (Arc<CollectingNotifier>, Classifier) {
        let n = Arc::new(CollectingNotifier::new());
        (n.clone(), Classifier::new(n))
    }

    #[test]
    fn coercion_follows_numeric_text_rules() {
        assert_eq!(to_number(Some(&json!(" 12.5 "))), Some(12.5));
        assert_eq!(to_number(Some(&json!(""))), None);
        assert_eq!(to_number(Some(&json!(null))), None);
        assert_eq!(to_number(Some(&json!("n/a"))), None);
        assert_eq!(to_number(Some(&json!("inf"))), None);
        assert_eq!(to_number(Some(&json!("-Infinity"))), None);
        assert_eq!(to_number(Some(&json!("NaN"))), None);
        assert_eq!(to_number(Some(&json!(true))), Some(1.0));
        assert_eq!(to_number(None), None);
    }

    #[test]
    fn infinite_text_is_reported_as_invalid_data() {
        let (n, c) = classifier();
        let t = table("v", &[json!("4"), json!("inf"), json!("16")]);
        let s = c.compute_stats(&t, "v", MapMode::PointSize, None);
        assert_eq!(s.max, Some(16.0));
        let errors = n.errors();
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(errors[0].contains("1 of 3"), "{}", errors[0]);
        assert!(matches!(&s.values, Column::Numeric(v) if v[1].is_nan()));
    }

    #[test]
    fn point_size_ignores_an_unsupported_label_format() {
        let (n, c) = classifier();
        let cfg: ClassificationConfig =
            serde_json::from_value(json!({"labelFormat": "%d"})).unwrap();
        let t = table("v", &[json!(4), json!(16)]);
        let s = c.compute_stats(&t, "v", MapMode::PointSize, Some(&cfg));
        assert!(s.size_scale().is_some());
        assert!(n.errors().is_empty(), "{:?}", n.errors());

        let s = c.compute_stats(&t, "v", MapMode::AreaValue, Some(&cfg));
        assert!(s.scale.is_none());
        assert_eq!(n.errors().len(), 1);
    }

    #[test]
    fn sentinel_minimum_becomes_zero() {
        let (_, c) = classifier();
        let t = table("v", &[json!(-99999999), json!(5), json!(10)]);
        let s = c.compute_stats(&t, "v", MapMode::AreaValue, None);
        assert_eq!(s.min, Some(0.0));
        assert_eq!(s.max, Some(10.0));
    }

    #[test]
    fn point_size_is_area_true() {
        let (_, c) = classifier();
        let t = table("v", &[json!(0), json!(4), json!(16)]);
        let s = c.compute_stats(&t, "v", MapMode::PointSize, None);
        let size = s.size_scale().unwrap();
        assert!((size.radius(16.0) - 20.0).abs() < 1e-9);
        assert!(size.radius(0.0) < size.radius(4.0) && size.radius(4.0) < size.radius(16.0));
        assert!(s.value_scale().is_none() && s.colour_scale().is_none());
    }

    #[test]
    fn non_numeric_rows_are_reported_once_and_kept() {
        let (n, c) = classifier();
        let t = table("v", &[json!("1"), json!(""), json!("x"), json!(3)]);
        let s = c.compute_stats(&t, "v", MapMode::PointSize, None);
        let Column::Numeric(v) = &s.values else { panic!() };
        assert_eq!(v.len(), 4);
        assert!(v[1].is_nan() && v[2].is_nan());
        let errors = n.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("2 of 4"), "{}", errors[0]);
        assert!(s.size_scale().is_some());
    }

    #[test]
    fn jenks_choropleth_uses_greens_by_default() {
        let (n, c) = classifier();
        let vals: Vec<Value> = [1, 2, 3, 10, 11, 12, 50, 51, 90, 95, 200]
            .iter()
            .map(|v| json!(v))
            .collect();
        let t = table("v", &vals);
        let s = c.compute_stats(&t, "v", MapMode::AreaValue, None);
        let breaks = s.breaks.clone().unwrap();
        assert_eq!(breaks.len(), 6);
        assert_eq!(breaks[0], 1.0);
        assert_eq!(breaks[5], 200.0);
        let q = s.value_scale().unwrap();
        assert_eq!(q.range(), palette::palette("Greens", 5).unwrap().as_slice());
        assert!(n.errors().is_empty());
        assert_eq!(n.of_kind(MessageKind::Debug), vec!["Calculated map statistics."]);
    }

    #[test]
    fn too_few_distinct_values_collapse_classes() {
        let (n, c) = classifier();
        let t = table("v", &[json!(1), json!(1), json!(7)]);
        let s = c.compute_stats(&t, "v", MapMode::AreaValue, None);
        let q = s.value_scale().unwrap();
        assert_eq!(q.range().len(), 2);
        assert_ne!(q.color(1.0), q.color(7.0));
        assert_eq!(n.of_kind(MessageKind::Info).len(), 1);
    }

    #[test]
    fn invalid_classification_leaves_scale_empty() {
        let (n, c) = classifier();
        let t = table("v", &[json!(2), json!(15), json!(30)]);
        let cfg: ClassificationConfig =
            serde_json::from_value(json!({"type": "manual", "classes": [0, 10, 20, 25]})).unwrap();
        let s = c.compute_stats(&t, "v", MapMode::AreaValue, Some(&cfg));
        assert!(s.scale.is_none());
        assert!(s.breaks.is_none());
        assert_eq!(s.max, Some(30.0));
        assert_eq!(n.errors().len(), 1);
        assert!(n.errors()[0].starts_with("invalid classification"));
    }

    #[test]
    fn repeated_calls_do_not_share_state() {
        let (_, c) = classifier();
        let cfg: ClassificationConfig =
            serde_json::from_value(json!({"type": "manual", "classes": ["dMin", 10, 20, "dMax"]}))
                .unwrap();
        let a = c.compute_stats(&table("v", &[json!(2), json!(30)]), "v", MapMode::AreaValue, Some(&cfg));
        let b = c.compute_stats(&table("v", &[json!(5), json!(40)]), "v", MapMode::AreaValue, Some(&cfg));
        assert_eq!(a.breaks, Some(vec![2.0, 10.0, 20.0, 30.0]));
        assert_eq!(b.breaks, Some(vec![5.0, 10.0, 20.0, 40.0]));
    }

    #[test]
    fn nominal_maps_colour_categories_in_table_order() {
        let (n, c) = classifier();
        let t = table("kind", &[json!("zand"), json!("klei"), json!("zand"), json!(null)]);
        let s = c.compute_stats(&t, "kind", MapMode::AreaColour, None);
        let o = s.colour_scale().unwrap();
        assert_eq!(o.domain(), &["zand", "klei"]);
        assert_eq!(o.range().len(), 25);
        assert_ne!(o.color("zand"), o.color("klei"));
        assert_eq!(n.errors().len(), 1);
        assert!(s.min.is_none());
    }

    #[test]
    fn label_maps_carry_only_the_column() {
        let (_, c) = classifier();
        let t = table("name", &[json!("Urk")]);
        let s = c.compute_stats(&t, "name", MapMode::AreaLabel, None);
        assert!(s.scale.is_none());
        assert_eq!(s.values, Column::Categorical(vec![json!("Urk")]));
    }

    #[test]
    fn colour_sampling_keeps_both_ends() {
        let greys: Vec<Rgba> = (0..5).map(|i| Rgba::rgb(i, i, i)).collect();
        let picked = sample_colours(greys.clone(), 3);
        assert_eq!(picked, vec![greys[0], greys[2], greys[4]]);
        assert_eq!(sample_colours(greys.clone(), 1), vec![greys[2]]);
        assert_eq!(sample_colours(greys.clone(), 5), greys);
    }
}

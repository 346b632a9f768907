//! Classification parameters and their validation.
//!
//! A [`ClassificationConfig`] is plain input data from the atlas metadata.
//! It is never modified: every classifier call derives an
//! [`EffectiveClassification`] from it (filling defaults, checking bounds)
//! and works on that copy, so one call cannot leak into the next.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::MapMode;
use crate::palette;

/// Class counts accepted for choropleth maps.
pub const VALUE_CLASS_RANGE: RangeInclusive<usize> = 3..=11;
/// Class counts accepted for chorochromatic maps.
pub const COLOUR_CLASS_RANGE: RangeInclusive<usize> = 3..=25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMethod {
    #[default]
    Jenks,
    Manual,
}

/// One entry of a manual break list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBreak", into = "RawBreak")]
pub enum ClassBreak {
    Value(f64),
    /// `"dMin"`: replaced by the data minimum.
    DataMin,
    /// `"dMax"`: replaced by the data maximum.
    DataMax,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawBreak {
    Number(f64),
    Text(String),
}

impl TryFrom<RawBreak> for ClassBreak {
    type Error = String;

    fn try_from(raw: RawBreak) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawBreak::Number(v) => Ok(ClassBreak::Value(v)),
            RawBreak::Text(s) => match s.trim() {
                "dMin" => Ok(ClassBreak::DataMin),
                "dMax" => Ok(ClassBreak::DataMax),
                other => other
                    .parse::<f64>()
                    .map(ClassBreak::Value)
                    .map_err(|_| format!("invalid class break {:?}", other)),
            },
        }
    }
}

impl From<ClassBreak> for RawBreak {
    fn from(b: ClassBreak) -> Self {
        match b {
            ClassBreak::Value(v) => RawBreak::Number(v),
            ClassBreak::DataMin => RawBreak::Text("dMin".into()),
            ClassBreak::DataMax => RawBreak::Text("dMax".into()),
        }
    }
}

impl ClassBreak {
    fn resolve(self, min: f64, max: f64) -> f64 {
        match self {
            ClassBreak::Value(v) => v,
            ClassBreak::DataMin => min,
            ClassBreak::DataMax => max,
        }
    }
}

/// Classification parameters as they appear in the metadata document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationConfig {
    #[serde(rename = "type", default)]
    pub method: ClassificationMethod,
    #[serde(
        default,
        alias = "numclasses",
        alias = "numClasses",
        deserialize_with = "de_class_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub num_classes: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<ClassBreak>,
    #[serde(default, alias = "paletteName", skip_serializing_if = "Option::is_none")]
    pub palette: Option<String>,
    #[serde(default, alias = "labelformat", alias = "labelFormat", skip_serializing_if = "Option::is_none")]
    pub label_format: Option<String>,
}

/// Serde helper: optional class count from a JSON number or a string.
fn de_class_count<'de, D>(deserializer: D) -> std::result::Result<Option<usize>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    struct CountVisitor;

    impl<'de> Visitor<'de> for CountVisitor {
        type Value = Option<usize>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "a string or integer class count")
        }

        fn visit_u64<E>(self, v: u64) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(v as usize))
        }

        fn visit_i64<E>(self, v: i64) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("negative class count"));
            }
            Ok(Some(v as usize))
        }

        fn visit_f64<E>(self, v: f64) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0.0 || v.fract() != 0.0 {
                return Err(E::custom("class count must be a whole number"));
            }
            Ok(Some(v as usize))
        }

        fn visit_str<E>(self, s: &str) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            s.trim().parse::<usize>().map(Some).map_err(E::custom)
        }

        fn visit_unit<E>(self) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_none<E>(self) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            deserializer.deserialize_any(CountVisitor)
        }
    }

    deserializer.deserialize_any(CountVisitor)
}

/// Fallbacks for parameters a [`ClassificationConfig`] leaves out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationDefaults {
    pub num_classes: usize,
    pub value_palette: String,
    pub colour_classes: usize,
    pub colour_palette: String,
    pub label_format: String,
}

impl Default for ClassificationDefaults {
    fn default() -> Self {
        Self {
            num_classes: 5,
            value_palette: "Greens".into(),
            colour_classes: 25,
            colour_palette: "Hues".into(),
            label_format: ".0f".into(),
        }
    }
}

/// Validated, immutable parameters for one classifier call.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveClassification {
    pub method: ClassificationMethod,
    pub num_classes: usize,
    pub classes: Vec<ClassBreak>,
    pub palette: String,
    pub label_format: LabelFormat,
}

impl EffectiveClassification {
    /// Fill in defaults and check everything that does not depend on data.
    pub fn derive(
        config: Option<&ClassificationConfig>,
        mode: MapMode,
        defaults: &ClassificationDefaults,
    ) -> Result<Self> {
        let empty = ClassificationConfig::default();
        let config = config.unwrap_or(&empty);
        let configured = config.label_format.as_deref();
        let label_format: LabelFormat = match mode {
            MapMode::AreaValue | MapMode::AreaColour => {
                configured.unwrap_or(&defaults.label_format).parse()?
            }
            // Unclassified maps keep their scale whatever the legend format says.
            MapMode::PointSize | MapMode::AreaLabel => match configured.map(str::parse::<LabelFormat>) {
                Some(Ok(format)) => format,
                _ => defaults.label_format.parse()?,
            },
        };

        let (num_classes, palette_name) = match mode {
            MapMode::AreaValue => {
                let manual_count = match config.method {
                    ClassificationMethod::Manual if !config.classes.is_empty() => {
                        Some(config.classes.len() - 1)
                    }
                    _ => None,
                };
                let n = config
                    .num_classes
                    .or(manual_count)
                    .unwrap_or(defaults.num_classes);
                check_count(n, &VALUE_CLASS_RANGE, "choropleth")?;
                if config.method == ClassificationMethod::Manual && config.classes.len() != n + 1 {
                    return Err(Error::InvalidClassification(format!(
                        "{} classes need {} breaks, got {}",
                        n,
                        n + 1,
                        config.classes.len()
                    )));
                }
                (n, config.palette.as_deref().unwrap_or(&defaults.value_palette))
            }
            MapMode::AreaColour => {
                let n = config.num_classes.unwrap_or(defaults.colour_classes);
                check_count(n, &COLOUR_CLASS_RANGE, "chorochromatic")?;
                (n, config.palette.as_deref().unwrap_or(&defaults.colour_palette))
            }
            MapMode::PointSize | MapMode::AreaLabel => (
                config.num_classes.unwrap_or(defaults.num_classes),
                config.palette.as_deref().unwrap_or(&defaults.value_palette),
            ),
        };

        if matches!(mode, MapMode::AreaValue | MapMode::AreaColour) {
            check_palette(palette_name, num_classes)?;
        }

        Ok(Self {
            method: config.method,
            num_classes,
            classes: config.classes.clone(),
            palette: palette_name.to_string(),
            label_format,
        })
    }

    /// Substitute `dMin`/`dMax` and check the manual break list against the
    /// data extent.
    pub fn manual_breaks(&self, min: f64, max: f64) -> Result<Vec<f64>> {
        let breaks: Vec<f64> = self.classes.iter().map(|b| b.resolve(min, max)).collect();
        if breaks.len() != self.num_classes + 1 {
            return Err(Error::InvalidClassification(format!(
                "{} classes need {} breaks, got {}",
                self.num_classes,
                self.num_classes + 1,
                breaks.len()
            )));
        }
        if breaks.iter().any(|b| !b.is_finite()) {
            return Err(Error::InvalidClassification(format!(
                "class breaks must be finite: {:?}",
                breaks
            )));
        }
        if breaks.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::InvalidClassification(format!(
                "class breaks are not ascending: {:?}",
                breaks
            )));
        }
        let (first, last) = (breaks[0], breaks[breaks.len() - 1]);
        if first > min {
            return Err(Error::InvalidClassification(format!(
                "first class break {} is above the data minimum {}",
                first, min
            )));
        }
        if last < max {
            return Err(Error::InvalidClassification(format!(
                "last class break {} is below the data maximum {}",
                last, max
            )));
        }
        Ok(breaks)
    }
}

fn check_count(n: usize, range: &RangeInclusive<usize>, what: &str) -> Result<()> {
    if range.contains(&n) {
        Ok(())
    } else {
        Err(Error::InvalidClassification(format!(
            "{} maps need {}-{} classes, got {}",
            what,
            range.start(),
            range.end(),
            n
        )))
    }
}

fn check_palette(name: &str, n: usize) -> Result<()> {
    match palette::sizes(name) {
        Some(sizes) if sizes.contains(&n) => Ok(()),
        Some(sizes) => Err(Error::InvalidClassification(format!(
            "palette {} has no {}-class variant (available: {}-{})",
            name,
            n,
            sizes.start(),
            sizes.end()
        ))),
        None => Err(Error::InvalidClassification(format!("unknown palette {:?}", name))),
    }
}

/// Fixed-point number format for legend labels: `.Nf` or `,.Nf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LabelFormat {
    pub decimals: usize,
    pub thousands: bool,
}

impl FromStr for LabelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (thousands, rest) = match s.strip_prefix(',') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        rest.strip_prefix('.')
            .and_then(|r| r.strip_suffix('f'))
            .and_then(|d| d.parse::<usize>().ok())
            .filter(|d| *d <= 20)
            .map(|decimals| LabelFormat {
                decimals,
                thousands,
            })
            .ok_or_else(|| Error::InvalidClassification(format!("unsupported label format {:?}", s)))
    }
}

impl fmt::Display for LabelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.thousands {
            f.write_str(",")?;
        }
        write!(f, ".{}f", self.decimals)
    }
}

impl LabelFormat {
    pub fn format(&self, value: f64) -> String {
        let plain = format!("{:.*}", self.decimals, value);
        if !self.thousands || !value.is_finite() {
            return plain;
        }
        let (sign, digits) = match plain.strip_prefix('-') {
            Some(d) => ("-", d),
            None => ("", plain.as_str()),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (digits, None),
        };
        let grouped = match int_part.parse::<u64>() {
            Ok(n) => n.to_formatted_string(&Locale::en),
            Err(_) => int_part.to_string(),
        };
        match frac_part {
            Some(f) => format!("{}{}.{}", sign, grouped, f),
            None => format!("{}{}", sign, grouped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manual(classes: serde_json::Value) -> ClassificationConfig {
        serde_json::from_value(json!({"type": "manual", "numclasses": "3", "classes": classes}))
            .unwrap()
    }

    #[test]
    fn config_accepts_metadata_spellings() {
        let c = manual(json!(["dMin", 10, "20", "dMax"]));
        assert_eq!(c.method, ClassificationMethod::Manual);
        assert_eq!(c.num_classes, Some(3));
        assert_eq!(
            c.classes,
            vec![
                ClassBreak::DataMin,
                ClassBreak::Value(10.0),
                ClassBreak::Value(20.0),
                ClassBreak::DataMax
            ]
        );
        let bad: std::result::Result<ClassificationConfig, _> =
            serde_json::from_value(json!({"classes": ["median"]}));
        assert!(bad.is_err());
    }

    #[test]
    fn manual_breaks_substitute_without_touching_the_config() {
        let c = manual(json!(["dMin", 10, 20, "dMax"]));
        let eff = EffectiveClassification::derive(
            Some(&c),
            MapMode::AreaValue,
            &ClassificationDefaults::default(),
        )
        .unwrap();
        assert_eq!(eff.manual_breaks(2.0, 30.0).unwrap(), vec![2.0, 10.0, 20.0, 30.0]);
        assert_eq!(eff.manual_breaks(1.0, 25.0).unwrap(), vec![1.0, 10.0, 20.0, 25.0]);
        assert_eq!(c.classes[0], ClassBreak::DataMin);
    }

    #[test]
    fn manual_breaks_must_cover_the_data() {
        let c = manual(json!([0, 10, 20, 25]));
        let eff = EffectiveClassification::derive(
            Some(&c),
            MapMode::AreaValue,
            &ClassificationDefaults::default(),
        )
        .unwrap();
        let err = eff.manual_breaks(2.0, 30.0).unwrap_err();
        assert!(matches!(err, Error::InvalidClassification(ref m) if m.contains("below the data maximum")));
        assert!(eff.manual_breaks(-1.0, 20.0).is_err());

        let unordered = manual(json!([0, 20, 10, 30]));
        let eff = EffectiveClassification::derive(
            Some(&unordered),
            MapMode::AreaValue,
            &ClassificationDefaults::default(),
        )
        .unwrap();
        assert!(eff.manual_breaks(0.0, 30.0).is_err());
    }

    #[test]
    fn class_counts_and_palettes_are_bounded_per_mode() {
        let d = ClassificationDefaults::default();
        let two = ClassificationConfig {
            num_classes: Some(2),
            ..Default::default()
        };
        assert!(EffectiveClassification::derive(Some(&two), MapMode::AreaValue, &d).is_err());

        let twelve = ClassificationConfig {
            num_classes: Some(12),
            ..Default::default()
        };
        assert!(EffectiveClassification::derive(Some(&twelve), MapMode::AreaValue, &d).is_err());
        let eff = EffectiveClassification::derive(Some(&twelve), MapMode::AreaColour, &d).unwrap();
        assert_eq!(eff.palette, "Hues");

        let eleven_greens = ClassificationConfig {
            num_classes: Some(11),
            palette: Some("Greens".into()),
            ..Default::default()
        };
        assert!(EffectiveClassification::derive(Some(&eleven_greens), MapMode::AreaValue, &d).is_err());

        let eff = EffectiveClassification::derive(None, MapMode::AreaColour, &d).unwrap();
        assert_eq!(eff.num_classes, 25);
        let eff = EffectiveClassification::derive(None, MapMode::AreaValue, &d).unwrap();
        assert_eq!((eff.num_classes, eff.palette.as_str()), (5, "Greens"));
    }

    #[test]
    fn manual_count_mismatch_is_rejected_up_front() {
        let c: ClassificationConfig = serde_json::from_value(
            json!({"type": "manual", "numClasses": 4, "classes": ["dMin", 10, "dMax"]}),
        )
        .unwrap();
        let err = EffectiveClassification::derive(
            Some(&c),
            MapMode::AreaValue,
            &ClassificationDefaults::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("need 5 breaks"));
    }

    #[test]
    fn label_formats() {
        let f: LabelFormat = ".0f".parse().unwrap();
        assert_eq!(f.format(1234.6), "1235");
        let f: LabelFormat = ",.1f".parse().unwrap();
        assert_eq!(f.format(-1234567.26), "-1,234,567.3");
        assert_eq!(f.to_string(), ",.1f");
        assert!("%d".parse::<LabelFormat>().is_err());
        assert!(".f".parse::<LabelFormat>().is_err());
    }
}

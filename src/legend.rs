//! Legend model derived from [`Stats`]. Nothing here draws.

use serde::Serialize;

use crate::models::MapMode;
use crate::palette::Rgba;
use crate::stats::Stats;

/// Number of circles in a size legend.
pub const SIZE_CELLS: usize = 4;

/// Separator between the bounds of a class label.
pub const LABEL_DELIMITER: &str = "–";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeCell {
    pub value: f64,
    pub radius: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassEntry {
    pub colour: Rgba,
    pub lower: f64,
    pub upper: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryEntry {
    pub colour: Rgba,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "entries", rename_all = "snake_case")]
pub enum Legend {
    Size(Vec<SizeCell>),
    Classes(Vec<ClassEntry>),
    Categories(Vec<CategoryEntry>),
    /// Label maps, and any map whose scale could not be built.
    Empty,
}

impl Legend {
    pub fn len(&self) -> usize {
        match self {
            Legend::Size(v) => v.len(),
            Legend::Classes(v) => v.len(),
            Legend::Categories(v) => v.len(),
            Legend::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the legend for `stats`.
///
/// The size legend spaces its cells evenly over `[0, max]` and sizes them
/// linearly up to `max_circle_size`.
pub fn build_legend(stats: &Stats, max_circle_size: f64) -> Legend {
    let fmt = stats.label_format;
    match stats.mode {
        MapMode::PointSize => {
            let Some(max) = stats.max.filter(|_| stats.size_scale().is_some()) else {
                return Legend::Empty;
            };
            let step = max / (SIZE_CELLS - 1) as f64;
            Legend::Size(
                (0..SIZE_CELLS)
                    .map(|i| {
                        let value = step * i as f64;
                        SizeCell {
                            value,
                            radius: value / max * max_circle_size,
                            label: fmt.format(value),
                        }
                    })
                    .collect(),
            )
        }
        MapMode::AreaValue => match stats.value_scale() {
            Some(scale) => Legend::Classes(
                scale
                    .range()
                    .iter()
                    .filter_map(|&colour| {
                        let (lower, upper) = scale.invert_extent(colour)?;
                        Some(ClassEntry {
                            colour,
                            lower,
                            upper,
                            label: format!("{}{}{}", fmt.format(lower), LABEL_DELIMITER, fmt.format(upper)),
                        })
                    })
                    .collect(),
            ),
            None => Legend::Empty,
        },
        MapMode::AreaColour => match stats.colour_scale() {
            Some(scale) => Legend::Categories(
                scale
                    .domain()
                    .iter()
                    .filter_map(|c| {
                        Some(CategoryEntry {
                            colour: scale.color(c)?,
                            label: c.clone(),
                        })
                    })
                    .collect(),
            ),
            None => Legend::Empty,
        },
        MapMode::AreaLabel => Legend::Empty,
    }
}

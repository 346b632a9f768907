//! Named colour palettes for classified maps.
//!
//! ColorBrewer schemes are stored per class count, exactly as published, so a
//! 5-class `Greens` is not the first five colours of the 9-class one.
//! Qualitative schemes are prefixes of their largest variant. `Hues` is
//! generated: `n` evenly spaced hues at fixed saturation and lightness.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

/// RGBA color representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque RGB color.
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Parse `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let h = hex.strip_prefix('#').unwrap_or(hex);
        if h.len() != 6 || !h.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&h[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Rgba {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

enum Scheme {
    /// One table per class count, starting at 3.
    PerSize(&'static [&'static [&'static str]]),
    /// Any prefix of at least three colours.
    Prefix(&'static [&'static str]),
    Generated { max: usize },
}

struct Entry {
    name: &'static str,
    scheme: Scheme,
}

const GREENS: &[&[&str]] = &[
    &["#e5f5e0", "#a1d99b", "#31a354"],
    &["#edf8e9", "#bae4b3", "#74c476", "#238b45"],
    &["#edf8e9", "#bae4b3", "#74c476", "#31a354", "#006d2c"],
    &["#edf8e9", "#c7e9c0", "#a1d99b", "#74c476", "#31a354", "#006d2c"],
    &["#edf8e9", "#c7e9c0", "#a1d99b", "#74c476", "#41ab5d", "#238b45", "#005a32"],
    &["#f7fcf5", "#e5f5e0", "#c7e9c0", "#a1d99b", "#74c476", "#41ab5d", "#238b45", "#005a32"],
    &["#f7fcf5", "#e5f5e0", "#c7e9c0", "#a1d99b", "#74c476", "#41ab5d", "#238b45", "#006d2c", "#00441b"],
];

const BLUES: &[&[&str]] = &[
    &["#deebf7", "#9ecae1", "#3182bd"],
    &["#eff3ff", "#bdd7e7", "#6baed6", "#2171b5"],
    &["#eff3ff", "#bdd7e7", "#6baed6", "#3182bd", "#08519c"],
    &["#eff3ff", "#c6dbef", "#9ecae1", "#6baed6", "#3182bd", "#08519c"],
    &["#eff3ff", "#c6dbef", "#9ecae1", "#6baed6", "#4292c6", "#2171b5", "#084594"],
    &["#f7fbff", "#deebf7", "#c6dbef", "#9ecae1", "#6baed6", "#4292c6", "#2171b5", "#084594"],
    &["#f7fbff", "#deebf7", "#c6dbef", "#9ecae1", "#6baed6", "#4292c6", "#2171b5", "#08519c", "#08306b"],
];

const SPECTRAL: &[&[&str]] = &[
    &["#fc8d59", "#ffffbf", "#99d594"],
    &["#d7191c", "#fdae61", "#abdda4", "#2b83ba"],
    &["#d7191c", "#fdae61", "#ffffbf", "#abdda4", "#2b83ba"],
    &["#d53e4f", "#fc8d59", "#fee08b", "#e6f598", "#99d594", "#3288bd"],
    &["#d53e4f", "#fc8d59", "#fee08b", "#ffffbf", "#e6f598", "#99d594", "#3288bd"],
    &["#d53e4f", "#f46d43", "#fdae61", "#fee08b", "#e6f598", "#abdda4", "#66c2a5", "#3288bd"],
    &["#d53e4f", "#f46d43", "#fdae61", "#fee08b", "#ffffbf", "#e6f598", "#abdda4", "#66c2a5", "#3288bd"],
    &["#9e0142", "#d53e4f", "#f46d43", "#fdae61", "#fee08b", "#e6f598", "#abdda4", "#66c2a5", "#3288bd", "#5e4fa2"],
    &["#9e0142", "#d53e4f", "#f46d43", "#fdae61", "#fee08b", "#ffffbf", "#e6f598", "#abdda4", "#66c2a5", "#3288bd", "#5e4fa2"],
];

const RDYLGN: &[&[&str]] = &[
    &["#fc8d59", "#ffffbf", "#91cf60"],
    &["#d7191c", "#fdae61", "#a6d96a", "#1a9641"],
    &["#d7191c", "#fdae61", "#ffffbf", "#a6d96a", "#1a9641"],
    &["#d73027", "#fc8d59", "#fee08b", "#d9ef8b", "#91cf60", "#1a9850"],
    &["#d73027", "#fc8d59", "#fee08b", "#ffffbf", "#d9ef8b", "#91cf60", "#1a9850"],
    &["#d73027", "#f46d43", "#fdae61", "#fee08b", "#d9ef8b", "#a6d96a", "#66bd63", "#1a9850"],
    &["#d73027", "#f46d43", "#fdae61", "#fee08b", "#ffffbf", "#d9ef8b", "#a6d96a", "#66bd63", "#1a9850"],
    &["#a50026", "#d73027", "#f46d43", "#fdae61", "#fee08b", "#d9ef8b", "#a6d96a", "#66bd63", "#1a9850", "#006837"],
    &["#a50026", "#d73027", "#f46d43", "#fdae61", "#fee08b", "#ffffbf", "#d9ef8b", "#a6d96a", "#66bd63", "#1a9850", "#006837"],
];

const SET3: &[&str] = &[
    "#8dd3c7", "#ffffb3", "#bebada", "#fb8072", "#80b1d3", "#fdb462", "#b3de69", "#fccde5",
    "#d9d9d9", "#bc80bd", "#ccebc5", "#ffed6f",
];

const PAIRED: &[&str] = &[
    "#a6cee3", "#1f78b4", "#b2df8a", "#33a02c", "#fb9a99", "#e31a1c", "#fdbf6f", "#ff7f00",
    "#cab2d6", "#6a3d9a", "#ffff99", "#b15928",
];

const REGISTRY: &[Entry] = &[
    Entry { name: "Greens", scheme: Scheme::PerSize(GREENS) },
    Entry { name: "Blues", scheme: Scheme::PerSize(BLUES) },
    Entry { name: "Spectral", scheme: Scheme::PerSize(SPECTRAL) },
    Entry { name: "RdYlGn", scheme: Scheme::PerSize(RDYLGN) },
    Entry { name: "Set3", scheme: Scheme::Prefix(SET3) },
    Entry { name: "Paired", scheme: Scheme::Prefix(PAIRED) },
    Entry { name: "Hues", scheme: Scheme::Generated { max: 25 } },
];

const MIN_SIZE: usize = 3;

fn lookup(name: &str) -> Option<&'static Entry> {
    REGISTRY.iter().find(|e| e.name.eq_ignore_ascii_case(name))
}

/// Palette names known to [`palette`].
pub fn names() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|e| e.name)
}

/// Class counts available for `name`, or `None` for an unknown palette.
pub fn sizes(name: &str) -> Option<RangeInclusive<usize>> {
    let entry = lookup(name)?;
    let max = match entry.scheme {
        Scheme::PerSize(tables) => MIN_SIZE + tables.len() - 1,
        Scheme::Prefix(colors) => colors.len(),
        Scheme::Generated { max } => max,
    };
    Some(MIN_SIZE..=max)
}

/// Exactly `size` colours of palette `name`.
pub fn palette(name: &str, size: usize) -> Result<Vec<Rgba>> {
    let entry = lookup(name)
        .ok_or_else(|| Error::InvalidClassification(format!("unknown palette {:?}", name)))?;
    let available = sizes(entry.name).unwrap_or(MIN_SIZE..=MIN_SIZE);
    if !available.contains(&size) {
        return Err(Error::InvalidClassification(format!(
            "palette {} has no {}-class variant (available: {}-{})",
            entry.name,
            size,
            available.start(),
            available.end()
        )));
    }
    let hex: Vec<&str> = match entry.scheme {
        Scheme::PerSize(tables) => tables[size - MIN_SIZE].to_vec(),
        Scheme::Prefix(colors) => colors[..size].to_vec(),
        Scheme::Generated { .. } => return Ok(hues(size)),
    };
    Ok(hex.into_iter().filter_map(Rgba::from_hex).collect())
}

fn hues(n: usize) -> Vec<Rgba> {
    (0..n)
        .map(|i| hsl_to_rgba(360.0 * i as f64 / n as f64, 0.60, 0.55))
        .collect()
}

// HSL -> RGB conversion (linear; sufficient for map fills)
fn hsl_to_rgba(h_deg: f64, s: f64, l: f64) -> Rgba {
    let h = (h_deg % 360.0) / 360.0;
    let s = s.clamp(0.0, 1.0);
    let l = l.clamp(0.0, 1.0);

    if s == 0.0 {
        let v = (l * 255.0).round() as u8;
        return Rgba::rgb(v, v, v);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    fn hue_to_rgb(p: f64, q: f64, mut t: f64) -> f64 {
        if t < 0.0 {
            t += 1.0;
        }
        if t > 1.0 {
            t -= 1.0;
        }
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 1.0 / 2.0 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    }

    let channel = |t: f64| (hue_to_rgb(p, q, t) * 255.0).round() as u8;
    Rgba::rgb(channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0))
}

//! natatlas
//!
//! Data side of a thematic-map viewer: load a geometry source and an
//! attribute source in parallel, join them on a foreign key, classify the
//! joined values and hand render-ready symbols and a legend model to a
//! drawing layer. Pairs with the `natatlas` CLI.
//!
//! ### Features
//! - GeoJSON, TopoJSON, CSV and OData v3 sources, fetched over HTTP or from disk
//! - One-shot completion barrier with per-request error isolation
//! - Proportional circles (area-true), Jenks or manual choropleths, nominal maps
//! - ColorBrewer palettes plus a generated hue palette for many categories
//!
//! ### Example
//! ```no_run
//! use std::sync::Arc;
//! use natatlas::{AtlasMetadata, HttpTransport, LogNotifier, MapChoice, Viewer};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let metadata = AtlasMetadata::from_path("atlas.json".as_ref())?;
//! let viewer = Viewer::new(Arc::new(HttpTransport::default()), Arc::new(LogNotifier));
//! if let Some(map) = viewer.choose_map(&metadata, MapChoice::new(0, 0, 0, 0)).await {
//!     println!("{} symbols, breaks {:?}", map.symbols.len(), map.stats.breaks);
//! }
//! # Ok(())
//! # }
//! ```

pub mod classification;
pub mod error;
pub mod format;
pub mod jenks;
pub mod legend;
pub mod loader;
pub mod metadata;
pub mod models;
pub mod notify;
pub mod palette;
pub mod scale;
pub mod stats;
pub mod symbolize;
pub mod topojson;
pub mod transport;
pub mod viewer;

pub use classification::{ClassBreak, ClassificationConfig, ClassificationMethod};
pub use error::{Error, FetchError, Result};
pub use loader::Loader;
pub use metadata::{AtlasMetadata, MapChoice, MapSelection};
pub use models::{AttributeTable, LoadResult, MapMode, NamedRequest, SourceFormat};
pub use notify::{CollectingNotifier, LogNotifier, MessageKind, Notify};
pub use stats::{Classifier, Stats};
pub use transport::{Fetch, HttpTransport, MemoryTransport};
pub use viewer::{RenderedMap, Viewer, ViewerSettings};

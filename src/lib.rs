//! DOM Minimap Engine
//!
//! A coordinate-mapping and synchronization engine for vertical minimaps of
//! tall scrollable regions. The crate renders a miniature proxy of a watched
//! region into a host-supplied surface, maps clicks on the proxy back to
//! scroll positions, and keeps a viewport indicator aligned with the real
//! scroll position while the underlying content mutates.
//!
//! # Design
//!
//! - **Adapter seams**: rasterization, mutation observation and the visual
//!   tree itself are consumed through small traits ([`snapshot::Rasterizer`],
//!   [`watcher::MutationSource`], [`host::Dom`]); backends are swappable.
//! - **Explicit lifecycle**: a minimap is `create()`d at most once and torn
//!   down with `destroy()`; misuse fails fast instead of corrupting state.
//! - **Coalesced refreshes**: bursts of content mutation settle into a
//!   single re-capture after a quiet period.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dom_minimap::{MapWidth, Minimap, MinimapConfig};
//! # use dom_minimap::host::Dom;
//! # use dom_minimap::snapshot::Rasterizer;
//! # use dom_minimap::watcher::MutationSource;
//!
//! # async fn run(
//! #     dom: Arc<dyn Dom>,
//! #     rasterizer: Arc<dyn Rasterizer>,
//! #     mutations: Arc<dyn MutationSource>,
//! # ) -> dom_minimap::Result<()> {
//! let mut config = MinimapConfig::new("#minimap", MapWidth::Px(180.0));
//! config.target = dom_minimap::TargetSpec::Selector(".grid".to_string());
//!
//! let minimap = Minimap::new(config, dom, rasterizer, mutations)?;
//! minimap.create().await?;
//! minimap.refresh()?;
//! minimap.destroy()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod geometry;
pub mod host;
pub mod indicator;
pub mod minimap;
pub mod scroll_into_view;
pub mod snapshot;
pub mod watcher;

pub use minimap::Minimap;

use host::{Dom, ElementHandle};
use std::sync::Arc;

/// Crate version, resolved from package metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimap width: absolute pixels or a percentage of the scroll region's
/// client width, resolved at capture time.
///
/// Parses from the forms hosts typically hand over: `180`, `"180"`, `"15%"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapWidth {
    Px(f64),
    Percent(f64),
}

impl MapWidth {
    /// Resolve to pixels against the scroll region's client width.
    pub fn resolve(&self, reference_width: f64) -> f64 {
        match self {
            MapWidth::Px(px) => *px,
            MapWidth::Percent(percent) => reference_width * percent / 100.0,
        }
    }
}

impl FromStr for MapWidth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(percent) = s.strip_suffix('%') {
            let value: f64 = percent
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid width percentage {s:?}")))?;
            return Ok(MapWidth::Percent(value));
        }
        let value: f64 = s
            .parse()
            .map_err(|_| Error::Config(format!("invalid width {s:?}")))?;
        Ok(MapWidth::Px(value))
    }
}

impl Serialize for MapWidth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            MapWidth::Px(px) => serializer.serialize_f64(*px),
            MapWidth::Percent(percent) => serializer.collect_str(&format_args!("{percent}%")),
        }
    }
}

impl<'de> Deserialize<'de> for MapWidth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct WidthVisitor;

        impl<'de> de::Visitor<'de> for WidthVisitor {
            type Value = MapWidth;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a pixel number or a percentage string")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<MapWidth, E> {
                Ok(MapWidth::Px(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<MapWidth, E> {
                Ok(MapWidth::Px(v as f64))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<MapWidth, E> {
                Ok(MapWidth::Px(v as f64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<MapWidth, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(WidthVisitor)
    }
}

/// The watched region: a selector, a concrete element, or the document body.
///
/// Resolved exactly once when the minimap is constructed; an unmatched
/// selector falls back to the body.
#[derive(Clone, Default)]
pub enum TargetSpec {
    Selector(String),
    Element(ElementHandle),
    #[default]
    Document,
}

impl TargetSpec {
    pub fn resolve(&self, dom: &Arc<dyn Dom>) -> ElementHandle {
        match self {
            TargetSpec::Selector(selector) => dom.query(selector).unwrap_or_else(|| dom.body()),
            TargetSpec::Element(element) => element.clone(),
            TargetSpec::Document => dom.body(),
        }
    }
}

impl fmt::Debug for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSpec::Selector(selector) => f.debug_tuple("Selector").field(selector).finish(),
            TargetSpec::Element(_) => f.write_str("Element(..)"),
            TargetSpec::Document => f.write_str("Document"),
        }
    }
}

impl Serialize for TargetSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            TargetSpec::Selector(selector) => serializer.serialize_str(selector),
            // Concrete elements and the body fallback have no portable form.
            TargetSpec::Element(_) | TargetSpec::Document => serializer.serialize_unit(),
        }
    }
}

impl<'de> Deserialize<'de> for TargetSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let selector = Option::<String>::deserialize(deserializer)?;
        Ok(match selector {
            Some(selector) => TargetSpec::Selector(selector),
            None => TargetSpec::Document,
        })
    }
}

/// Surface sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapStyles {
    /// Displayed minimap width; required.
    pub width: MapWidth,
    /// Maximum displayed height; unbounded when absent.
    #[serde(default)]
    pub height: Option<f64>,
}

/// Viewport-indicator options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollOptions {
    /// Enables the indicator and the indicator side of scroll sync.
    #[serde(default = "default_scroll_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub styles: IndicatorStyles,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            styles: IndicatorStyles::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorStyles {
    #[serde(default = "default_indicator_color")]
    pub background_color: String,
}

impl Default for IndicatorStyles {
    fn default() -> Self {
        Self {
            background_color: default_indicator_color(),
        }
    }
}

fn default_scroll_enabled() -> bool {
    true
}

fn default_indicator_color() -> String {
    "rgba(108, 117, 125, 0.3)".to_string()
}

/// Configuration for one minimap instance
///
/// Immutable after construction. The defaults watch the whole document body
/// with the indicator enabled.
///
/// # Examples
///
/// ```
/// let cfg = dom_minimap::MinimapConfig::new("#minimap", dom_minimap::MapWidth::Px(180.0));
/// assert!(cfg.scroll.enabled);
/// assert!(cfg.styles.height.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinimapConfig {
    /// Watched region, rendered into the snapshot.
    #[serde(default)]
    pub target: TargetSpec,
    /// Element whose scroll position drives the mapping; defaults to
    /// `target`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_target: Option<TargetSpec>,
    /// Selector for the pre-existing minimap surface element.
    pub container: String,
    pub styles: MapStyles,
    #[serde(default)]
    pub scroll: ScrollOptions,
}

impl MinimapConfig {
    pub fn new(container: &str, width: MapWidth) -> Self {
        Self {
            target: TargetSpec::Document,
            scroll_target: None,
            container: container.to_string(),
            styles: MapStyles {
                width,
                height: None,
            },
            scroll: ScrollOptions::default(),
        }
    }

    /// Parse a configuration from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid minimap options: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MinimapConfig::new("#minimap", MapWidth::Px(180.0));
        assert!(config.scroll.enabled);
        assert_eq!(
            config.scroll.styles.background_color,
            "rgba(108, 117, 125, 0.3)"
        );
        assert!(matches!(config.target, TargetSpec::Document));
        assert!(config.scroll_target.is_none());
    }

    #[test]
    fn map_width_parses_pixels_and_percentages() {
        assert_eq!("180".parse::<MapWidth>().unwrap(), MapWidth::Px(180.0));
        assert_eq!("15%".parse::<MapWidth>().unwrap(), MapWidth::Percent(15.0));
        assert!("wide".parse::<MapWidth>().is_err());
    }

    #[test]
    fn map_width_resolves_against_reference() {
        assert_eq!(MapWidth::Px(180.0).resolve(400.0), 180.0);
        assert_eq!(MapWidth::Percent(25.0).resolve(400.0), 100.0);
    }

    #[test]
    fn config_round_trips_through_json() {
        let json = r##"{
            "target": ".grid",
            "container": "#minimap",
            "styles": { "width": "15%", "height": 600.0 },
            "scroll": { "enabled": false, "styles": { "background_color": "#8884" } }
        }"##;
        let config = MinimapConfig::from_json(json).unwrap();
        assert!(matches!(&config.target, TargetSpec::Selector(s) if s == ".grid"));
        assert_eq!(config.styles.width, MapWidth::Percent(15.0));
        assert_eq!(config.styles.height, Some(600.0));
        assert!(!config.scroll.enabled);
        assert_eq!(config.scroll.styles.background_color, "#8884");

        let round_trip =
            MinimapConfig::from_json(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(round_trip.styles.width, MapWidth::Percent(15.0));
        assert!(!round_trip.scroll.enabled);
    }

    #[test]
    fn minimal_json_fills_defaults() {
        let json = r##"{ "container": "#minimap", "styles": { "width": 180 } }"##;
        let config = MinimapConfig::from_json(json).unwrap();
        assert!(matches!(config.target, TargetSpec::Document));
        assert_eq!(config.styles.width, MapWidth::Px(180.0));
        assert!(config.scroll.enabled);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            MinimapConfig::from_json("{").unwrap_err(),
            Error::Config(_)
        ));
    }
}

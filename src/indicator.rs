//! Viewport indicator: the rectangle mirroring the real viewport.

use std::sync::Arc;

use crate::geometry::{self, Placement};
use crate::host::{Dom, ElementHandle};

/// Class name carried by the indicator element, for host styling.
pub const INDICATOR_CLASS: &str = "dom-minimap-scroll";

pub struct ViewportIndicator {
    element: ElementHandle,
    height: f64,
}

impl ViewportIndicator {
    /// Build the indicator element and append it to the surface. Height is
    /// the minimap width scaled by the viewport's aspect ratio; degenerate
    /// regions get a zero-height indicator rather than an error.
    pub fn create(
        dom: &Arc<dyn Dom>,
        surface: &ElementHandle,
        scroll_target: &ElementHandle,
        map_width: f64,
        background_color: &str,
    ) -> Self {
        let metrics = scroll_target.scroll_metrics();
        let height = geometry::indicator_height(map_width, metrics.client_height, metrics.client_width)
            .unwrap_or(0.0);
        let element = dom.create_element(INDICATOR_CLASS);
        element.set_style("background-color", background_color);
        element.set_style("height", &format!("{height}px"));
        surface.append_child(element.clone());
        Self { element, height }
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Recompute and apply the indicator placement for the current scroll
    /// state. Degenerate or out-of-range positions leave the previous
    /// placement untouched.
    pub fn sync(&self, surface: &ElementHandle, scroll_target: &ElementHandle) {
        let plan = geometry::plan(
            scroll_target.scroll_metrics(),
            surface.scroll_metrics(),
            self.height,
        );
        match plan {
            Placement::Follow {
                surface_offset,
                indicator_top,
            } => {
                surface.scroll_to(surface_offset);
                self.element.set_style("top", &format!("{indicator_top}px"));
            }
            Placement::Move { indicator_top } => {
                self.element.set_style("top", &format!("{indicator_top}px"));
            }
            Placement::Hold | Placement::Skip => {}
        }
    }

    /// Detach the indicator from the surface.
    pub fn remove(&self, surface: &ElementHandle) {
        surface.remove_child(&self.element);
    }
}

//! Scroll the host document to bring an element into view.
//!
//! Companion navigation helpers for minimap hosts: align an element with the
//! top or bottom of the window, or center it, snapping to an edge when the
//! document is too short to center.

use std::sync::Arc;

use crate::host::{Dom, ElementHandle};

/// Where the element should land in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAlignment {
    Top,
    Bottom,
    Middle,
}

/// Absolute document coordinates of an element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementCoordinates {
    pub top: f64,
    pub bottom: f64,
}

pub fn element_coordinates(dom: &Arc<dyn Dom>, element: &ElementHandle) -> ElementCoordinates {
    let top = element.viewport_top() + dom.document_metrics().document_scroll_top;
    ElementCoordinates {
        top,
        bottom: top + element.scroll_metrics().client_height,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MiddlePlacement {
    SnapTop,
    SnapBottom,
    Center(f64),
}

/// Centering only works while a half-window of content exists on both sides;
/// otherwise snap to the nearer edge.
fn middle_placement(top: f64, window_height: f64, document_height: f64) -> MiddlePlacement {
    let half = window_height / 2.0;
    if top - half < 0.0 {
        MiddlePlacement::SnapTop
    } else if top + half > document_height {
        MiddlePlacement::SnapBottom
    } else {
        MiddlePlacement::Center(top - half)
    }
}

/// A scroll request: an optional element to focus first and an optional
/// explicit scroll anchor. The anchor wins when both are given.
#[derive(Default)]
pub struct ScrollToElement {
    pub focus: Option<ElementHandle>,
    pub scroll: Option<ElementHandle>,
    pub alignment: Option<ScrollAlignment>,
}

/// Scroll the document to the requested element. Returns `false` when the
/// request names no element at all.
pub fn scroll_document_to_element(dom: &Arc<dyn Dom>, request: &ScrollToElement) -> bool {
    let mut element = None;
    if let Some(focus) = &request.focus {
        focus.focus();
        element = Some(focus);
    }
    if let Some(scroll) = &request.scroll {
        element = Some(scroll);
    }
    let Some(element) = element else {
        return false;
    };

    match request.alignment.unwrap_or(ScrollAlignment::Top) {
        ScrollAlignment::Top => dom.scroll_into_view(element, true),
        ScrollAlignment::Bottom => dom.scroll_into_view(element, false),
        ScrollAlignment::Middle => {
            let metrics = dom.document_metrics();
            let coordinates = element_coordinates(dom, element);
            match middle_placement(coordinates.top, metrics.window_height, metrics.document_height)
            {
                MiddlePlacement::SnapTop => dom.scroll_into_view(element, true),
                MiddlePlacement::SnapBottom => dom.scroll_into_view(element, false),
                MiddlePlacement::Center(top) => dom.scroll_window_to(top),
            }
        }
    }
    true
}

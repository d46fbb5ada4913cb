//! Host visual-tree seam: elements, images, and the document surface.
//!
//! The minimap never manipulates a concrete DOM. Backends implement these
//! small purpose-built traits and the engine consumes them as primitives.
//! The `memory` feature ships an in-memory backend complete enough for the
//! test suite and the bundled demo.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Result;

#[cfg(feature = "memory")]
pub mod memory;

/// Shared handle to a host element.
pub type ElementHandle = Arc<dyn Element>;

/// Shared handle to a host image element.
pub type ImageHandle = Arc<dyn SnapshotImage>;

/// Event callback registered on an element or the window.
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Scroll-relevant metrics of an element.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    /// Total scrollable content extent.
    pub scroll_height: f64,
    /// Visible extent.
    pub client_height: f64,
    pub client_width: f64,
}

/// Computed box-model subset needed for available-height sizing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoxEdges {
    pub margin_top: f64,
    pub border_top: f64,
    pub padding_top: f64,
    pub padding_bottom: f64,
    /// Whether the element is sized under the content-box model.
    pub content_box: bool,
}

/// Window-level document metrics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DocumentMetrics {
    pub window_height: f64,
    pub document_height: f64,
    pub document_scroll_top: f64,
}

/// Intrinsic pixel size of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSize {
    pub width: f64,
    pub height: f64,
}

/// Kinds of events the engine subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Click,
    Scroll,
    Resize,
}

/// A dispatched host event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    /// Vertical offset of the event within the element, for clicks.
    pub offset_y: f64,
}

impl Event {
    pub fn click(offset_y: f64) -> Self {
        Self {
            kind: EventKind::Click,
            offset_y,
        }
    }

    pub fn scroll() -> Self {
        Self {
            kind: EventKind::Scroll,
            offset_y: 0.0,
        }
    }

    pub fn resize() -> Self {
        Self {
            kind: EventKind::Resize,
            offset_y: 0.0,
        }
    }
}

/// Token identifying one listener registration.
///
/// Removal goes through the exact token returned at registration time, so a
/// listener can never be "removed" with a freshly built closure that matches
/// nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

impl ListenerId {
    /// Allocate a process-unique listener token. Backends call this when
    /// registering.
    pub fn next() -> Self {
        ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A node in the host visual tree.
pub trait Element: Send + Sync {
    fn scroll_metrics(&self) -> ScrollMetrics;

    /// Scroll the element's own content to a vertical offset.
    fn scroll_to(&self, top: f64);

    fn set_style(&self, property: &str, value: &str);

    fn append_child(&self, child: ElementHandle);

    /// Detach a direct child, matched by handle identity.
    fn remove_child(&self, child: &ElementHandle);

    /// Top of the element's bounding box relative to the viewport.
    fn viewport_top(&self) -> f64;

    fn box_edges(&self) -> BoxEdges;

    fn focus(&self);

    fn add_listener(&self, kind: EventKind, handler: EventHandler) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);
}

/// An image element whose displayed height is always derived from its
/// natural aspect ratio.
pub trait SnapshotImage: Send + Sync {
    /// The image as a tree node, for insertion and removal.
    fn element(&self) -> ElementHandle;

    /// Assign the encoded source (a data URL).
    fn set_source(&self, data_url: &str);

    fn set_display_width(&self, width: f64);

    fn display_width(&self) -> f64;

    /// Displayed height; zero until the image has decoded.
    fn display_height(&self) -> f64;

    /// Natural dimensions, `None` until decode completes.
    fn natural_size(&self) -> Option<ImageSize>;

    /// Resolves once the image bytes have decoded and natural dimensions are
    /// known. Distinct from source assignment: layout-dependent sizing must
    /// wait for this.
    fn decoded(&self) -> BoxFuture<'static, Result<ImageSize>>;
}

/// The document surface: queries, node creation, window geometry and events.
pub trait Dom: Send + Sync {
    /// Resolve a selector to an element, if present.
    fn query(&self, selector: &str) -> Option<ElementHandle>;

    /// The document body.
    fn body(&self) -> ElementHandle;

    fn create_element(&self, class_name: &str) -> ElementHandle;

    fn create_image(&self) -> ImageHandle;

    fn document_metrics(&self) -> DocumentMetrics;

    /// Scroll the window to an absolute vertical offset.
    fn scroll_window_to(&self, top: f64);

    /// Scroll the window so `element` aligns with the top (or bottom) of the
    /// viewport.
    fn scroll_into_view(&self, element: &ElementHandle, align_top: bool);

    fn add_window_listener(&self, kind: EventKind, handler: EventHandler) -> ListenerId;

    fn remove_window_listener(&self, id: ListenerId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_ids_are_unique() {
        let a = ListenerId::next();
        let b = ListenerId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn event_constructors_tag_kinds() {
        assert_eq!(Event::click(12.0).kind, EventKind::Click);
        assert_eq!(Event::click(12.0).offset_y, 12.0);
        assert_eq!(Event::scroll().kind, EventKind::Scroll);
        assert_eq!(Event::resize().kind, EventKind::Resize);
    }
}

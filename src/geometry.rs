//! Pure mapping between real-scroll-space and minimap-space.
//!
//! All functions here are stateless and total: degenerate geometry (zero
//! heights, zero widths) yields `None` or a skip placement rather than NaN.
//! Callers apply the returned plan; nothing in this module touches the host.

use crate::host::ScrollMetrics;

/// Vertical position of the viewport indicator within the full rendered
/// minimap content, proportional to the real scroll position.
///
/// `None` when the scroll region reports no height.
pub fn indicator_top(scroll_top: f64, scroll_height: f64, map_scroll_height: f64) -> Option<f64> {
    if scroll_height <= 0.0 {
        return None;
    }
    Some(scroll_top / scroll_height * map_scroll_height)
}

/// How far the minimap surface itself must scroll so the region under the
/// real viewport stays visible when the rendered snapshot is taller than the
/// surface.
///
/// Maps the scrollable overflow of the real region onto the overflow of the
/// surface. `None` when the real region has no scrollable overflow.
pub fn surface_offset(
    scroll_top: f64,
    scroll_height: f64,
    client_height: f64,
    map_client_height: f64,
    map_scroll_height: f64,
) -> Option<f64> {
    let scroll_overflow = scroll_height - client_height;
    if scroll_overflow <= 0.0 {
        return None;
    }
    let map_overflow = map_scroll_height - map_client_height;
    Some(scroll_top * map_overflow / scroll_overflow)
}

/// Scroll position for the real region given a click at `offset_y` on the
/// minimap. The width ratio between the natural and displayed picture is the
/// overall scale factor, since the displayed height is always derived from
/// the natural aspect ratio.
pub fn click_target(offset_y: f64, natural_width: f64, display_width: f64) -> Option<f64> {
    if display_width <= 0.0 {
        return None;
    }
    Some(offset_y * natural_width / display_width)
}

/// Indicator height: the minimap width scaled by the real viewport's
/// height-to-width ratio.
pub fn indicator_height(map_width: f64, client_height: f64, client_width: f64) -> Option<f64> {
    if client_width <= 0.0 {
        return None;
    }
    Some(map_width * client_height / client_width)
}

/// One synchronization step, decided from current metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Snapshot taller than the surface: scroll the surface and place the
    /// indicator in visible coordinates.
    Follow {
        surface_offset: f64,
        indicator_top: f64,
    },
    /// Whole snapshot visible: move the indicator only.
    Move { indicator_top: f64 },
    /// The new position would pin the indicator past the bottom edge of the
    /// surface; keep the previous position.
    Hold,
    /// Degenerate geometry; nothing to apply.
    Skip,
}

/// Decide the placement for one refresh of the indicator.
///
/// `scroll` describes the real scroll region, `map` the minimap surface.
/// Branch selection depends only on whether the surface overflows
/// (`map.client_height < map.scroll_height`).
pub fn plan(scroll: ScrollMetrics, map: ScrollMetrics, indicator_height: f64) -> Placement {
    let top = match indicator_top(scroll.scroll_top, scroll.scroll_height, map.scroll_height) {
        Some(top) => top,
        None => return Placement::Skip,
    };

    if map.client_height < map.scroll_height {
        match surface_offset(
            scroll.scroll_top,
            scroll.scroll_height,
            scroll.client_height,
            map.client_height,
            map.scroll_height,
        ) {
            Some(offset) => Placement::Follow {
                surface_offset: offset,
                indicator_top: top - offset,
            },
            None => Placement::Skip,
        }
    } else if top + indicator_height < map.client_height {
        Placement::Move { indicator_top: top }
    } else {
        // Positions past the bottom edge are not applied. Kept for
        // compatibility with the reference behavior.
        Placement::Hold
    }
}

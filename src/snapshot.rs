//! Snapshot capture and surface sizing.
//!
//! A capture has two suspension points: the rasterizer producing encoded
//! bytes, and the image decode that makes natural dimensions available.
//! Other events may interleave with either and observe a stale (or absent)
//! snapshot.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::host::{Dom, ElementHandle, ImageHandle, ImageSize};
use crate::MapWidth;

/// External rasterization capability: renders the visual subtree rooted at
/// `target` into an encoded image (a data URL). May reject; the engine never
/// retries on its own.
pub trait Rasterizer: Send + Sync {
    fn capture(&self, target: &ElementHandle) -> BoxFuture<'static, Result<String>>;
}

/// A rendered snapshot of the watched region.
#[derive(Clone)]
pub struct Snapshot {
    image: ImageHandle,
    natural: ImageSize,
    fingerprint: String,
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("natural", &self.natural)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl Snapshot {
    pub fn image(&self) -> &ImageHandle {
        &self.image
    }

    pub fn natural_size(&self) -> ImageSize {
        self.natural
    }

    pub fn display_width(&self) -> f64 {
        self.image.display_width()
    }

    pub fn display_height(&self) -> f64 {
        self.image.display_height()
    }

    /// Hex sha-256 of the encoded payload. Stable across captures of
    /// unchanged content; used for diagnostics and golden assertions.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Owns the current snapshot of one minimap instance and replaces it on
/// demand.
#[derive(Clone)]
pub struct SnapshotManager {
    rasterizer: Arc<dyn Rasterizer>,
    width: MapWidth,
    max_height: f64,
    current: Arc<Mutex<Option<Snapshot>>>,
}

impl SnapshotManager {
    pub fn new(rasterizer: Arc<dyn Rasterizer>, width: MapWidth, max_height: Option<f64>) -> Self {
        Self {
            rasterizer,
            width,
            max_height: max_height.unwrap_or(f64::INFINITY),
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn current(&self) -> Option<Snapshot> {
        self.current.lock().unwrap().clone()
    }

    /// Capture a fresh snapshot of `target` and swap it into `surface`.
    ///
    /// The displayed width is resolved against the scroll region at call
    /// time. The superseded image is detached only after the new one has
    /// decoded, so a failed capture leaves the previous snapshot in place.
    pub async fn capture(
        &self,
        dom: &Arc<dyn Dom>,
        target: &ElementHandle,
        scroll_target: &ElementHandle,
        surface: &ElementHandle,
    ) -> Result<Snapshot> {
        let data_url = self.rasterizer.capture(target).await?;
        let fingerprint = hex::encode(Sha256::digest(data_url.as_bytes()));

        let image = dom.create_image();
        image.set_source(&data_url);
        let display_width = self.width.resolve(scroll_target.scroll_metrics().client_width);
        image.set_display_width(display_width);
        let natural = image.decoded().await?;

        if let Some(previous) = self.current.lock().unwrap().take() {
            if previous.fingerprint == fingerprint {
                log::debug!("snapshot content unchanged ({})", &fingerprint[..12]);
            }
            surface.remove_child(&previous.image.element());
        }
        surface.append_child(image.element());

        let display_height = image.display_height();
        self.fit_surface(dom, surface, display_height);
        log::debug!(
            "captured snapshot {}x{} displayed at {}x{}",
            natural.width,
            natural.height,
            display_width,
            display_height,
        );

        let snapshot = Snapshot {
            image,
            natural,
            fingerprint,
        };
        *self.current.lock().unwrap() = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Detach the current snapshot from `surface`, if any.
    pub fn clear(&self, surface: &ElementHandle) {
        if let Some(snapshot) = self.current.lock().unwrap().take() {
            surface.remove_child(&snapshot.image.element());
        }
    }

    /// Size the surface to the smallest of the configured maximum, the
    /// displayed snapshot height, and the height available below the
    /// surface's position in the window.
    fn fit_surface(&self, dom: &Arc<dyn Dom>, surface: &ElementHandle, display_height: f64) {
        let edges = surface.box_edges();
        let mut available =
            dom.document_metrics().window_height - surface.viewport_top() - edges.margin_top;
        if edges.content_box {
            available -= edges.border_top * 2.0 + edges.padding_top + edges.padding_bottom;
        }
        let height = self.max_height.min(display_height).min(available);
        surface.set_style("height", &format!("{height}px"));
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::host::memory::{MemoryDom, MemoryElement, MemoryRasterizer};
    use crate::host::{BoxEdges, ScrollMetrics};

    fn scroll_region(client_width: f64) -> Arc<MemoryElement> {
        let region = MemoryElement::new("grid");
        region.set_metrics(ScrollMetrics {
            scroll_top: 0.0,
            scroll_height: 2400.0,
            client_height: 600.0,
            client_width,
        });
        region
    }

    #[tokio::test]
    async fn capture_swaps_image_and_sizes_surface() {
        let dom = MemoryDom::new();
        dom.set_window(800.0, 2400.0);
        let dom: Arc<dyn Dom> = dom;
        let region = scroll_region(400.0);
        let target: ElementHandle = region.clone();
        let surface = MemoryElement::new("minimap");
        surface.set_viewport_top(100.0);
        surface.set_box_edges(BoxEdges {
            margin_top: 10.0,
            border_top: 2.0,
            padding_top: 5.0,
            padding_bottom: 5.0,
            content_box: true,
        });
        let surface_handle: ElementHandle = surface.clone();

        let rasterizer = MemoryRasterizer::new(400, 1200);
        let manager = SnapshotManager::new(rasterizer.clone(), MapWidth::Px(200.0), None);
        let snapshot = manager
            .capture(&dom, &target, &target, &surface_handle)
            .await
            .unwrap();

        assert_eq!(snapshot.natural_size().width, 400.0);
        assert_eq!(snapshot.display_width(), 200.0);
        assert_eq!(snapshot.display_height(), 600.0);
        assert_eq!(surface.child_count(), 1);
        // available = 800 - 100 - 10 - (2*2 + 5 + 5) = 676; displayed = 600.
        assert_eq!(surface.style("height").as_deref(), Some("600px"));

        // Recapture replaces the injected image instead of stacking.
        let second = manager
            .capture(&dom, &target, &target, &surface_handle)
            .await
            .unwrap();
        assert_eq!(surface.child_count(), 1);
        assert_eq!(second.fingerprint(), snapshot.fingerprint());
    }

    #[tokio::test]
    async fn capture_respects_available_height_and_max() {
        let dom = MemoryDom::new();
        dom.set_window(500.0, 2400.0);
        let dom: Arc<dyn Dom> = dom;
        let target: ElementHandle = scroll_region(400.0);
        let surface = MemoryElement::new("minimap");
        surface.set_viewport_top(200.0);
        let surface_handle: ElementHandle = surface.clone();

        let rasterizer = MemoryRasterizer::new(400, 1200);
        // Percentage width: 50% of the 400px scroll region.
        let manager = SnapshotManager::new(rasterizer, MapWidth::Percent(50.0), Some(450.0));
        let snapshot = manager
            .capture(&dom, &target, &target, &surface_handle)
            .await
            .unwrap();

        assert_eq!(snapshot.display_width(), 200.0);
        // border-box surface: available = 500 - 200 - 0 = 300.
        assert_eq!(surface.style("height").as_deref(), Some("300px"));
    }

    #[tokio::test]
    async fn failed_capture_keeps_previous_snapshot() {
        let dom = MemoryDom::new();
        let dom: Arc<dyn Dom> = dom;
        let target: ElementHandle = scroll_region(400.0);
        let surface = MemoryElement::new("minimap");
        let surface_handle: ElementHandle = surface.clone();

        let rasterizer = MemoryRasterizer::new(400, 1200);
        let manager = SnapshotManager::new(rasterizer.clone(), MapWidth::Px(200.0), None);
        manager
            .capture(&dom, &target, &target, &surface_handle)
            .await
            .unwrap();

        rasterizer.fail_next();
        let err = manager
            .capture(&dom, &target, &target, &surface_handle)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::Capture(_)));
        assert!(manager.current().is_some());
        assert_eq!(surface.child_count(), 1);
    }

    #[tokio::test]
    async fn clear_detaches_current_snapshot() {
        let dom = MemoryDom::new();
        let dom: Arc<dyn Dom> = dom;
        let target: ElementHandle = scroll_region(400.0);
        let surface = MemoryElement::new("minimap");
        let surface_handle: ElementHandle = surface.clone();

        let manager =
            SnapshotManager::new(MemoryRasterizer::new(400, 1200), MapWidth::Px(200.0), None);
        manager
            .capture(&dom, &target, &target, &surface_handle)
            .await
            .unwrap();
        manager.clear(&surface_handle);
        assert!(manager.current().is_none());
        assert_eq!(surface.child_count(), 0);
    }
}

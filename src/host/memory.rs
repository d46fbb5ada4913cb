//! In-memory host backend.
//!
//! Elements here do not run a layout engine: fixtures assign scroll metrics,
//! box edges and positions directly, the way the real host would compute
//! them. Images decode PNG-flavored data URLs produced by
//! [`fixture_data_url`]; only the IHDR dimensions are read, CRCs are not
//! verified.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::future::BoxFuture;

use crate::error::{Error, Result};
use crate::host::{
    BoxEdges, DocumentMetrics, Dom, Element, ElementHandle, Event, EventHandler, EventKind,
    ImageHandle, ImageSize, ListenerId, ScrollMetrics, SnapshotImage,
};
use crate::snapshot::Rasterizer;
use crate::watcher::{MutationHandler, MutationSource, MutationSubscription, ObserveOptions};

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Build a PNG-flavored data URL whose IHDR carries the given dimensions.
/// The CRC is left zeroed; [`MemoryImage`] does not verify it.
pub fn fixture_data_url(width: u32, height: u32) -> String {
    let mut bytes = Vec::with_capacity(33);
    bytes.extend_from_slice(b"\x89PNG\r\n\x1a\n");
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    format!("{DATA_URL_PREFIX}{}", STANDARD.encode(&bytes))
}

fn parse_png_dimensions(data_url: &str) -> Result<ImageSize> {
    let encoded = data_url
        .strip_prefix(DATA_URL_PREFIX)
        .ok_or_else(|| Error::Decode("unsupported image source".to_string()))?;
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| Error::Decode(format!("invalid base64 payload: {e}")))?;
    if bytes.len() < 24 || &bytes[0..8] != b"\x89PNG\r\n\x1a\n" {
        return Err(Error::Decode("not a PNG payload".to_string()));
    }
    let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
    if width == 0 || height == 0 {
        return Err(Error::Decode("zero-sized image".to_string()));
    }
    Ok(ImageSize {
        width: width as f64,
        height: height as f64,
    })
}

#[derive(Default)]
struct ElementState {
    styles: HashMap<String, String>,
    metrics: ScrollMetrics,
    edges: BoxEdges,
    viewport_top: f64,
    focused: bool,
    children: Vec<ElementHandle>,
}

/// An element with fixture-assigned geometry.
pub struct MemoryElement {
    class_name: String,
    state: Mutex<ElementState>,
    listeners: Mutex<Vec<(ListenerId, EventKind, EventHandler)>>,
}

impl MemoryElement {
    pub fn new(class_name: &str) -> Arc<Self> {
        Arc::new(Self {
            class_name: class_name.to_string(),
            state: Mutex::new(ElementState::default()),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn set_metrics(&self, metrics: ScrollMetrics) {
        self.state.lock().unwrap().metrics = metrics;
    }

    pub fn set_viewport_top(&self, top: f64) {
        self.state.lock().unwrap().viewport_top = top;
    }

    pub fn set_box_edges(&self, edges: BoxEdges) {
        self.state.lock().unwrap().edges = edges;
    }

    pub fn style(&self, property: &str) -> Option<String> {
        self.state.lock().unwrap().styles.get(property).cloned()
    }

    pub fn child_count(&self) -> usize {
        self.state.lock().unwrap().children.len()
    }

    pub fn children(&self) -> Vec<ElementHandle> {
        self.state.lock().unwrap().children.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn focused(&self) -> bool {
        self.state.lock().unwrap().focused
    }

    /// Fire an event at this element, as the host would.
    pub fn dispatch(&self, event: &Event) {
        let handlers: Vec<EventHandler> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, kind, _)| *kind == event.kind)
            .map(|(_, _, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(event);
        }
    }
}

impl Element for MemoryElement {
    fn scroll_metrics(&self) -> ScrollMetrics {
        self.state.lock().unwrap().metrics
    }

    fn scroll_to(&self, top: f64) {
        let mut state = self.state.lock().unwrap();
        let max = (state.metrics.scroll_height - state.metrics.client_height).max(0.0);
        state.metrics.scroll_top = top.clamp(0.0, max);
    }

    fn set_style(&self, property: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .styles
            .insert(property.to_string(), value.to_string());
    }

    fn append_child(&self, child: ElementHandle) {
        self.state.lock().unwrap().children.push(child);
    }

    fn remove_child(&self, child: &ElementHandle) {
        self.state
            .lock()
            .unwrap()
            .children
            .retain(|c| !Arc::ptr_eq(c, child));
    }

    fn viewport_top(&self) -> f64 {
        self.state.lock().unwrap().viewport_top
    }

    fn box_edges(&self) -> BoxEdges {
        self.state.lock().unwrap().edges
    }

    fn focus(&self) {
        self.state.lock().unwrap().focused = true;
    }

    fn add_listener(&self, kind: EventKind, handler: EventHandler) -> ListenerId {
        let id = ListenerId::next();
        self.listeners.lock().unwrap().push((id, kind, handler));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().unwrap().retain(|(lid, _, _)| *lid != id);
    }
}

struct ImageState {
    source: Option<String>,
    display_width: f64,
    natural: Option<ImageSize>,
}

/// An image element decoding fixture data URLs.
pub struct MemoryImage {
    element: Arc<MemoryElement>,
    state: Arc<Mutex<ImageState>>,
}

impl MemoryImage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            element: MemoryElement::new("img"),
            state: Arc::new(Mutex::new(ImageState {
                source: None,
                display_width: 0.0,
                natural: None,
            })),
        })
    }
}

impl SnapshotImage for MemoryImage {
    fn element(&self) -> ElementHandle {
        self.element.clone()
    }

    fn set_source(&self, data_url: &str) {
        self.state.lock().unwrap().source = Some(data_url.to_string());
    }

    fn set_display_width(&self, width: f64) {
        self.state.lock().unwrap().display_width = width;
    }

    fn display_width(&self) -> f64 {
        self.state.lock().unwrap().display_width
    }

    fn display_height(&self) -> f64 {
        let state = self.state.lock().unwrap();
        match state.natural {
            Some(natural) if natural.width > 0.0 => {
                state.display_width * natural.height / natural.width
            }
            _ => 0.0,
        }
    }

    fn natural_size(&self) -> Option<ImageSize> {
        self.state.lock().unwrap().natural
    }

    fn decoded(&self) -> BoxFuture<'static, Result<ImageSize>> {
        let state = self.state.clone();
        let element = self.element.clone();
        Box::pin(async move {
            // Decode happens off the assignment path, as in a real host.
            tokio::task::yield_now().await;
            let source = state
                .lock()
                .unwrap()
                .source
                .clone()
                .ok_or_else(|| Error::Decode("no source assigned".to_string()))?;
            let natural = parse_png_dimensions(&source)?;
            let (display_width, display_height) = {
                let mut state = state.lock().unwrap();
                state.natural = Some(natural);
                let width = state.display_width;
                (width, width * natural.height / natural.width)
            };
            element.set_metrics(ScrollMetrics {
                scroll_top: 0.0,
                scroll_height: display_height,
                client_height: display_height,
                client_width: display_width,
            });
            Ok(natural)
        })
    }
}

struct WindowState {
    height: f64,
    scroll_top: f64,
    document_height: f64,
}

/// The in-memory document surface.
pub struct MemoryDom {
    body: Arc<MemoryElement>,
    registry: Mutex<HashMap<String, ElementHandle>>,
    window: Mutex<WindowState>,
    window_listeners: Mutex<Vec<(ListenerId, EventKind, EventHandler)>>,
    created: Mutex<Vec<Arc<MemoryElement>>>,
}

impl MemoryDom {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            body: MemoryElement::new("body"),
            registry: Mutex::new(HashMap::new()),
            window: Mutex::new(WindowState {
                height: 800.0,
                scroll_top: 0.0,
                document_height: 800.0,
            }),
            window_listeners: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
        })
    }

    /// Make `element` resolvable through [`Dom::query`].
    pub fn register(&self, selector: &str, element: ElementHandle) {
        self.registry
            .lock()
            .unwrap()
            .insert(selector.to_string(), element);
    }

    pub fn set_window(&self, height: f64, document_height: f64) {
        let mut window = self.window.lock().unwrap();
        window.height = height;
        window.document_height = document_height;
    }

    pub fn window_scroll_top(&self) -> f64 {
        self.window.lock().unwrap().scroll_top
    }

    pub fn window_listener_count(&self) -> usize {
        self.window_listeners.lock().unwrap().len()
    }

    /// Fire a window-level event.
    pub fn dispatch_window(&self, event: &Event) {
        let handlers: Vec<EventHandler> = self
            .window_listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, kind, _)| *kind == event.kind)
            .map(|(_, _, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    /// First element created through [`Dom::create_element`] with the given
    /// class name, for assertions.
    pub fn created_with_class(&self, class_name: &str) -> Option<Arc<MemoryElement>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.class_name() == class_name)
            .cloned()
    }
}

impl Dom for MemoryDom {
    fn query(&self, selector: &str) -> Option<ElementHandle> {
        self.registry.lock().unwrap().get(selector).cloned()
    }

    fn body(&self) -> ElementHandle {
        self.body.clone()
    }

    fn create_element(&self, class_name: &str) -> ElementHandle {
        let element = MemoryElement::new(class_name);
        self.created.lock().unwrap().push(element.clone());
        element
    }

    fn create_image(&self) -> ImageHandle {
        MemoryImage::new()
    }

    fn document_metrics(&self) -> DocumentMetrics {
        let window = self.window.lock().unwrap();
        DocumentMetrics {
            window_height: window.height,
            document_height: window.document_height,
            document_scroll_top: window.scroll_top,
        }
    }

    fn scroll_window_to(&self, top: f64) {
        let mut window = self.window.lock().unwrap();
        let max = (window.document_height - window.height).max(0.0);
        window.scroll_top = top.clamp(0.0, max);
    }

    fn scroll_into_view(&self, element: &ElementHandle, align_top: bool) {
        let absolute_top = element.viewport_top() + self.window.lock().unwrap().scroll_top;
        let target = if align_top {
            absolute_top
        } else {
            absolute_top + element.scroll_metrics().client_height
                - self.window.lock().unwrap().height
        };
        self.scroll_window_to(target);
    }

    fn add_window_listener(&self, kind: EventKind, handler: EventHandler) -> ListenerId {
        let id = ListenerId::next();
        self.window_listeners.lock().unwrap().push((id, kind, handler));
        id
    }

    fn remove_window_listener(&self, id: ListenerId) {
        self.window_listeners
            .lock()
            .unwrap()
            .retain(|(lid, _, _)| *lid != id);
    }
}

/// Rasterizer returning fixture data URLs of a configurable natural size.
pub struct MemoryRasterizer {
    natural: Mutex<(u32, u32)>,
    fail_next: AtomicBool,
    captures: AtomicUsize,
}

impl MemoryRasterizer {
    pub fn new(natural_width: u32, natural_height: u32) -> Arc<Self> {
        Arc::new(Self {
            natural: Mutex::new((natural_width, natural_height)),
            fail_next: AtomicBool::new(false),
            captures: AtomicUsize::new(0),
        })
    }

    pub fn set_natural(&self, width: u32, height: u32) {
        *self.natural.lock().unwrap() = (width, height);
    }

    /// Make the next capture reject.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

impl Rasterizer for MemoryRasterizer {
    fn capture(&self, _target: &ElementHandle) -> BoxFuture<'static, Result<String>> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Box::pin(async {
                Err(Error::Capture("fixture rasterizer rejected".to_string()))
            });
        }
        let (width, height) = *self.natural.lock().unwrap();
        Box::pin(async move {
            tokio::task::yield_now().await;
            Ok(fixture_data_url(width, height))
        })
    }
}

struct MemoryObserver {
    target: ElementHandle,
    options: ObserveOptions,
    handler: MutationHandler,
    connected: Arc<AtomicBool>,
}

struct MemorySubscription {
    connected: Arc<AtomicBool>,
}

impl MutationSubscription for MemorySubscription {
    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Mutation source with a manual notification hook.
pub struct MemoryMutations {
    observers: Mutex<Vec<MemoryObserver>>,
}

impl MemoryMutations {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            observers: Mutex::new(Vec::new()),
        })
    }

    /// Report a batch of mutations on `target` to connected observers.
    pub fn notify(&self, target: &ElementHandle, batch: usize) {
        let handlers: Vec<MutationHandler> = self
            .observers
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.connected.load(Ordering::SeqCst) && Arc::ptr_eq(&o.target, target))
            .map(|o| o.handler.clone())
            .collect();
        for handler in handlers {
            handler(batch);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.connected.load(Ordering::SeqCst))
            .count()
    }

    pub fn observed_options(&self) -> Vec<ObserveOptions> {
        self.observers
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.connected.load(Ordering::SeqCst))
            .map(|o| o.options)
            .collect()
    }
}

impl MutationSource for MemoryMutations {
    fn observe(
        &self,
        target: &ElementHandle,
        options: ObserveOptions,
        handler: MutationHandler,
    ) -> Result<Box<dyn MutationSubscription>> {
        let connected = Arc::new(AtomicBool::new(true));
        self.observers.lock().unwrap().push(MemoryObserver {
            target: target.clone(),
            options,
            handler,
            connected: connected.clone(),
        });
        Ok(Box::new(MemorySubscription { connected }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_data_url_round_trips_dimensions() {
        let url = fixture_data_url(640, 1280);
        let size = parse_png_dimensions(&url).unwrap();
        assert_eq!(size.width, 640.0);
        assert_eq!(size.height, 1280.0);
    }

    #[test]
    fn parse_rejects_non_png_payloads() {
        assert!(parse_png_dimensions("data:text/plain;base64,aGk=").is_err());
        let garbage = format!("{DATA_URL_PREFIX}{}", STANDARD.encode(b"not a png"));
        assert!(parse_png_dimensions(&garbage).is_err());
    }

    #[test]
    fn element_scroll_clamps_to_overflow() {
        let element = MemoryElement::new("grid");
        element.set_metrics(ScrollMetrics {
            scroll_top: 0.0,
            scroll_height: 300.0,
            client_height: 200.0,
            client_width: 100.0,
        });
        element.scroll_to(500.0);
        assert_eq!(element.scroll_metrics().scroll_top, 100.0);
        element.scroll_to(-10.0);
        assert_eq!(element.scroll_metrics().scroll_top, 0.0);
    }

    #[test]
    fn listener_removal_uses_registration_token() {
        let element = MemoryElement::new("grid");
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in_handler = hits.clone();
        let id = element.add_listener(
            EventKind::Click,
            Arc::new(move |_| {
                hits_in_handler.fetch_add(1, Ordering::SeqCst);
            }),
        );
        element.dispatch(&Event::click(10.0));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        element.remove_listener(id);
        element.dispatch(&Event::click(10.0));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(element.listener_count(), 0);
    }

    #[tokio::test]
    async fn image_decode_reports_natural_size() {
        let image = MemoryImage::new();
        image.set_source(&fixture_data_url(400, 1200));
        image.set_display_width(200.0);
        let natural = image.decoded().await.unwrap();
        assert_eq!(natural.width, 400.0);
        assert_eq!(natural.height, 1200.0);
        assert_eq!(image.display_height(), 600.0);
    }

    #[tokio::test]
    async fn image_decode_without_source_fails() {
        let image = MemoryImage::new();
        assert!(image.decoded().await.is_err());
    }

    #[test]
    fn mutations_reach_matching_observers_until_disconnect() {
        let mutations = MemoryMutations::new();
        let grid: ElementHandle = MemoryElement::new("grid");
        let other: ElementHandle = MemoryElement::new("other");
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in_handler = hits.clone();
        let subscription = mutations
            .observe(
                &grid,
                ObserveOptions::default(),
                Arc::new(move |_| {
                    hits_in_handler.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        mutations.notify(&grid, 3);
        mutations.notify(&other, 3);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        subscription.disconnect();
        mutations.notify(&grid, 3);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(mutations.observer_count(), 0);
    }

    #[test]
    fn window_scroll_clamps_to_document() {
        let dom = MemoryDom::new();
        dom.set_window(600.0, 2000.0);
        dom.scroll_window_to(5000.0);
        assert_eq!(dom.window_scroll_top(), 1400.0);
    }
}

//! Minimap controller: configuration resolution, lifecycle, and wiring.
//!
//! The controller composes the snapshot manager, viewport indicator and
//! change watcher over one surface element. Lifecycle is an explicit tagged
//! state; operations outside their valid states fail fast with
//! [`Error::Lifecycle`] instead of corrupting wiring.

use std::sync::{Arc, Mutex, Weak};

use crate::error::{Error, Result};
use crate::geometry;
use crate::host::{Dom, ElementHandle, EventHandler, EventKind, ListenerId};
use crate::indicator::ViewportIndicator;
use crate::snapshot::{Rasterizer, SnapshotManager};
use crate::watcher::{ChangeWatcher, MutationSource, RefreshHandler};
use crate::{MapWidth, MinimapConfig};

type SharedCore = Arc<Mutex<Core>>;
type WeakCore = Weak<Mutex<Core>>;

/// Top-level minimap instance.
///
/// Constructed against a host document and the two external collaborators,
/// then driven through `create()` / `refresh()` / `destroy()`. One instance
/// owns its snapshot, indicator and subscriptions exclusively; independent
/// instances may watch overlapping regions without coordination.
pub struct Minimap {
    core: SharedCore,
}

impl std::fmt::Debug for Minimap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Minimap").finish_non_exhaustive()
    }
}

enum Lifecycle {
    Uninitialized,
    /// `create()` has claimed the instance and is suspended in capture.
    Creating { click: ListenerId },
    Created(Wiring),
    Destroyed,
}

/// Everything registered by a successful `create()`, torn down by
/// `destroy()` through the exact tokens stored here.
struct Wiring {
    click: ListenerId,
    window_scroll: Option<ListenerId>,
    window_resize: Option<ListenerId>,
    indicator: Option<ViewportIndicator>,
    watcher: ChangeWatcher,
    snapshots: SnapshotManager,
}

struct Core {
    dom: Arc<dyn Dom>,
    rasterizer: Arc<dyn Rasterizer>,
    mutations: Arc<dyn MutationSource>,
    target: ElementHandle,
    scroll_target: ElementHandle,
    surface: ElementHandle,
    width: MapWidth,
    max_height: Option<f64>,
    indicator_enabled: bool,
    indicator_color: String,
    state: Lifecycle,
}

impl Minimap {
    /// Resolve the configuration against the host document.
    ///
    /// The container selector must match an existing element; targets fall
    /// back to the document body, and the scroll target falls back to the
    /// resolved target. Resolution happens exactly once — later operations
    /// never re-interpret selectors.
    pub fn new(
        config: MinimapConfig,
        dom: Arc<dyn Dom>,
        rasterizer: Arc<dyn Rasterizer>,
        mutations: Arc<dyn MutationSource>,
    ) -> Result<Self> {
        let surface = dom.query(&config.container).ok_or_else(|| {
            Error::Config(format!(
                "container selector {:?} did not match any element",
                config.container
            ))
        })?;
        let target = config.target.resolve(&dom);
        let scroll_target = match &config.scroll_target {
            Some(spec) => spec.resolve(&dom),
            None => target.clone(),
        };

        Ok(Self {
            core: Arc::new(Mutex::new(Core {
                dom,
                rasterizer,
                mutations,
                target,
                scroll_target,
                surface,
                width: config.styles.width,
                max_height: config.styles.height,
                indicator_enabled: config.scroll.enabled,
                indicator_color: config.scroll.styles.background_color,
                state: Lifecycle::Uninitialized,
            })),
        })
    }

    /// Build the minimap: style the surface, wire the click mapping, capture
    /// the first snapshot, then attach the indicator and change watcher.
    ///
    /// Valid once per instance; a second call fails with
    /// [`Error::Lifecycle`]. Capture failures propagate and roll the
    /// instance back so `create()` may be retried.
    pub async fn create(&self) -> Result<()> {
        let weak = Arc::downgrade(&self.core);
        let (manager, dom, target, scroll_target, surface) = {
            let mut core = self.core.lock().unwrap();
            core.claim(&weak)?
        };

        // Suspended here; clicks and scrolls may arrive and observe the
        // absent snapshot.
        let captured = manager.capture(&dom, &target, &scroll_target, &surface).await;

        let mut core = self.core.lock().unwrap();
        match captured {
            Ok(_) => core.commit(manager, &weak),
            Err(err) => {
                core.abort();
                Err(err)
            }
        }
    }

    /// Tear the instance down: disconnect the watcher (cancelling any
    /// pending debounced refresh), remove all listeners and injected
    /// elements, release the surface.
    pub fn destroy(&self) -> Result<()> {
        self.core.lock().unwrap().destroy()
    }

    /// Recompute the indicator against the current scroll state. Does not
    /// force a new snapshot.
    pub fn refresh(&self) -> Result<()> {
        self.core.lock().unwrap().refresh()
    }

    /// The minimap surface element, while created.
    pub fn root(&self) -> Option<ElementHandle> {
        let core = self.core.lock().unwrap();
        match core.state {
            Lifecycle::Created(_) => Some(core.surface.clone()),
            _ => None,
        }
    }

    /// Crate version, resolved from package metadata.
    pub fn version(&self) -> &'static str {
        crate::VERSION
    }
}

impl Core {
    fn claim(
        &mut self,
        weak: &WeakCore,
    ) -> Result<(
        SnapshotManager,
        Arc<dyn Dom>,
        ElementHandle,
        ElementHandle,
        ElementHandle,
    )> {
        match self.state {
            Lifecycle::Uninitialized => {}
            Lifecycle::Creating { .. } => {
                return Err(Error::Lifecycle("create() already in progress".to_string()))
            }
            Lifecycle::Created(_) => {
                return Err(Error::Lifecycle(
                    "create() already called; destroy() first".to_string(),
                ))
            }
            Lifecycle::Destroyed => {
                return Err(Error::Lifecycle("create() on a destroyed minimap".to_string()))
            }
        }

        self.surface.set_style("overflow", "auto");
        let handler: EventHandler = {
            let weak = weak.clone();
            Arc::new(move |event| {
                if let Some(core) = weak.upgrade() {
                    core.lock().unwrap().handle_click(event.offset_y);
                }
            })
        };
        let click = self.surface.add_listener(EventKind::Click, handler);
        self.state = Lifecycle::Creating { click };

        let manager = SnapshotManager::new(self.rasterizer.clone(), self.width, self.max_height);
        Ok((
            manager,
            self.dom.clone(),
            self.target.clone(),
            self.scroll_target.clone(),
            self.surface.clone(),
        ))
    }

    fn commit(&mut self, manager: SnapshotManager, weak: &WeakCore) -> Result<()> {
        let click = match self.state {
            Lifecycle::Creating { click } => click,
            _ => return Err(Error::Lifecycle("create() was not in progress".to_string())),
        };

        let mut indicator = None;
        let mut window_scroll = None;
        let mut window_resize = None;
        if self.indicator_enabled {
            let map_width = self
                .width
                .resolve(self.scroll_target.scroll_metrics().client_width);
            indicator = Some(ViewportIndicator::create(
                &self.dom,
                &self.surface,
                &self.scroll_target,
                map_width,
                &self.indicator_color,
            ));
            let sync_handler: EventHandler = {
                let weak = weak.clone();
                Arc::new(move |_event| {
                    if let Some(core) = weak.upgrade() {
                        core.lock().unwrap().sync_indicator();
                    }
                })
            };
            window_scroll = Some(
                self.dom
                    .add_window_listener(EventKind::Scroll, sync_handler.clone()),
            );
            window_resize = Some(self.dom.add_window_listener(EventKind::Resize, sync_handler));
        }

        let mut watcher = ChangeWatcher::new();
        let on_settle: RefreshHandler = {
            let weak = weak.clone();
            Arc::new(move || {
                if let Some(core) = weak.upgrade() {
                    tokio::spawn(refresh_after_change(core));
                }
            })
        };
        if let Err(err) = watcher.subscribe(&self.mutations, &self.target, on_settle) {
            if let Some(indicator) = &indicator {
                indicator.remove(&self.surface);
            }
            if let Some(id) = window_scroll {
                self.dom.remove_window_listener(id);
            }
            if let Some(id) = window_resize {
                self.dom.remove_window_listener(id);
            }
            self.surface.remove_listener(click);
            manager.clear(&self.surface);
            self.state = Lifecycle::Uninitialized;
            return Err(err);
        }

        self.state = Lifecycle::Created(Wiring {
            click,
            window_scroll,
            window_resize,
            indicator,
            watcher,
            snapshots: manager,
        });
        self.sync_indicator();
        log::debug!("minimap created");
        Ok(())
    }

    fn abort(&mut self) {
        if let Lifecycle::Creating { click } = self.state {
            self.surface.remove_listener(click);
        }
        self.state = Lifecycle::Uninitialized;
    }

    fn destroy(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, Lifecycle::Destroyed) {
            Lifecycle::Created(mut wiring) => {
                wiring.watcher.disconnect();
                self.surface.remove_listener(wiring.click);
                if let Some(id) = wiring.window_scroll {
                    self.dom.remove_window_listener(id);
                }
                if let Some(id) = wiring.window_resize {
                    self.dom.remove_window_listener(id);
                }
                if let Some(indicator) = &wiring.indicator {
                    indicator.remove(&self.surface);
                }
                wiring.snapshots.clear(&self.surface);
                log::debug!("minimap destroyed");
                Ok(())
            }
            previous => {
                self.state = previous;
                Err(Error::Lifecycle(
                    "destroy() requires a created minimap".to_string(),
                ))
            }
        }
    }

    fn refresh(&self) -> Result<()> {
        match self.state {
            Lifecycle::Created(_) => {
                self.sync_indicator();
                Ok(())
            }
            _ => Err(Error::Lifecycle(
                "refresh() requires a created minimap".to_string(),
            )),
        }
    }

    fn sync_indicator(&self) {
        if let Lifecycle::Created(wiring) = &self.state {
            if let Some(indicator) = &wiring.indicator {
                indicator.sync(&self.surface, &self.scroll_target);
            }
        }
    }

    fn handle_click(&self, offset_y: f64) {
        let Lifecycle::Created(wiring) = &self.state else {
            return;
        };
        let Some(snapshot) = wiring.snapshots.current() else {
            return;
        };
        let natural = snapshot.natural_size();
        if let Some(top) = geometry::click_target(offset_y, natural.width, snapshot.display_width())
        {
            log::trace!("minimap click at {offset_y} scrolls target to {top}");
            self.scroll_target.scroll_to(top);
        }
    }
}

/// Debounce-settled refresh: re-capture the snapshot, then re-sync the
/// indicator. Runs detached; failures are logged since no caller exists.
async fn refresh_after_change(core: SharedCore) {
    let staged = {
        let core = core.lock().unwrap();
        match &core.state {
            Lifecycle::Created(wiring) => Some((
                wiring.snapshots.clone(),
                core.dom.clone(),
                core.target.clone(),
                core.scroll_target.clone(),
                core.surface.clone(),
            )),
            _ => None,
        }
    };
    let Some((manager, dom, target, scroll_target, surface)) = staged else {
        return;
    };

    match manager.capture(&dom, &target, &scroll_target, &surface).await {
        Ok(snapshot) => {
            log::trace!("refreshed snapshot {}", snapshot.fingerprint());
            let core = core.lock().unwrap();
            if matches!(core.state, Lifecycle::Created(_)) {
                core.sync_indicator();
            } else {
                // Destroyed while the capture was in flight.
                manager.clear(&surface);
            }
        }
        Err(err) => log::warn!("minimap refresh failed: {err}"),
    }
}

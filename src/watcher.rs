//! Subtree-change observation with trailing-edge coalescing.
//!
//! Content mutation can arrive at high frequency (typing, animation);
//! re-rasterizing per mutation would be prohibitive. Each notification batch
//! cancels the pending timer and reschedules it, so a burst settles into
//! exactly one refresh, one quiet period after the last mutation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::Result;
use crate::host::ElementHandle;

/// Callback invoked with the number of records in a mutation batch.
pub type MutationHandler = Arc<dyn Fn(usize) + Send + Sync>;

/// Callback invoked when a burst of mutations has settled.
pub type RefreshHandler = Arc<dyn Fn() + Send + Sync>;

/// What the mutation source should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveOptions {
    pub attributes: bool,
    pub character_data: bool,
    pub child_list: bool,
    pub subtree: bool,
}

impl Default for ObserveOptions {
    fn default() -> Self {
        Self {
            attributes: true,
            character_data: true,
            child_list: true,
            subtree: true,
        }
    }
}

/// An active observation that can be torn down.
pub trait MutationSubscription: Send + Sync {
    fn disconnect(&self);
}

/// External subtree-mutation primitive.
pub trait MutationSource: Send + Sync {
    fn observe(
        &self,
        target: &ElementHandle,
        options: ObserveOptions,
        handler: MutationHandler,
    ) -> Result<Box<dyn MutationSubscription>>;
}

/// Debounced adapter over a [`MutationSource`].
///
/// Owns a single pending-timer slot: scheduling always replaces the previous
/// timer, and [`ChangeWatcher::disconnect`] clears the slot so no refresh can
/// fire against a torn-down instance.
pub struct ChangeWatcher {
    quiet_period: Duration,
    pending: Arc<Mutex<Option<JoinHandle<()>>>>,
    subscription: Option<Box<dyn MutationSubscription>>,
}

impl ChangeWatcher {
    /// Quiet window after the last mutation before a refresh fires.
    pub const QUIET_PERIOD: Duration = Duration::from_millis(500);

    pub fn new() -> Self {
        Self::with_quiet_period(Self::QUIET_PERIOD)
    }

    pub fn with_quiet_period(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            pending: Arc::new(Mutex::new(None)),
            subscription: None,
        }
    }

    /// Observe `target` through `source`, invoking `on_settle` once per
    /// settled burst.
    pub fn subscribe(
        &mut self,
        source: &Arc<dyn MutationSource>,
        target: &ElementHandle,
        on_settle: RefreshHandler,
    ) -> Result<()> {
        let pending = self.pending.clone();
        let quiet_period = self.quiet_period;
        let handler: MutationHandler = Arc::new(move |batch| {
            log::trace!("mutation batch of {batch}, rescheduling refresh");
            let on_settle = on_settle.clone();
            let mut slot = pending.lock().unwrap();
            if let Some(timer) = slot.take() {
                timer.abort();
            }
            *slot = Some(tokio::spawn(async move {
                tokio::time::sleep(quiet_period).await;
                on_settle();
            }));
        });
        self.subscription = Some(source.observe(target, ObserveOptions::default(), handler)?);
        Ok(())
    }

    /// Stop observing and cancel any pending refresh.
    pub fn disconnect(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.disconnect();
        }
        if let Some(timer) = self.pending.lock().unwrap().take() {
            timer.abort();
        }
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct HandlerCell {
        handler: Mutex<Option<MutationHandler>>,
        disconnected: std::sync::atomic::AtomicBool,
    }

    /// Minimal source that hands the registered handler back to the test.
    struct TestSource {
        cell: Arc<HandlerCell>,
    }

    struct TestSubscription {
        cell: Arc<HandlerCell>,
    }

    impl MutationSubscription for TestSubscription {
        fn disconnect(&self) {
            self.cell.disconnected.store(true, Ordering::SeqCst);
        }
    }

    impl MutationSource for TestSource {
        fn observe(
            &self,
            _target: &ElementHandle,
            _options: ObserveOptions,
            handler: MutationHandler,
        ) -> Result<Box<dyn MutationSubscription>> {
            *self.cell.handler.lock().unwrap() = Some(handler);
            Ok(Box::new(TestSubscription {
                cell: self.cell.clone(),
            }))
        }
    }

    fn fixture() -> (Arc<dyn MutationSource>, Arc<HandlerCell>) {
        let cell = Arc::new(HandlerCell {
            handler: Mutex::new(None),
            disconnected: std::sync::atomic::AtomicBool::new(false),
        });
        (Arc::new(TestSource { cell: cell.clone() }), cell)
    }

    fn target() -> ElementHandle {
        struct Stub;
        impl crate::host::Element for Stub {
            fn scroll_metrics(&self) -> crate::host::ScrollMetrics {
                crate::host::ScrollMetrics::default()
            }
            fn scroll_to(&self, _top: f64) {}
            fn set_style(&self, _property: &str, _value: &str) {}
            fn append_child(&self, _child: ElementHandle) {}
            fn remove_child(&self, _child: &ElementHandle) {}
            fn viewport_top(&self) -> f64 {
                0.0
            }
            fn box_edges(&self) -> crate::host::BoxEdges {
                crate::host::BoxEdges::default()
            }
            fn focus(&self) {}
            fn add_listener(
                &self,
                _kind: crate::host::EventKind,
                _handler: crate::host::EventHandler,
            ) -> crate::host::ListenerId {
                crate::host::ListenerId::next()
            }
            fn remove_listener(&self, _id: crate::host::ListenerId) {}
        }
        Arc::new(Stub)
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_into_one_refresh() {
        let (source, cell) = fixture();
        let refreshes = Arc::new(AtomicUsize::new(0));
        let counter = refreshes.clone();
        let mut watcher = ChangeWatcher::new();
        watcher
            .subscribe(
                &source,
                &target(),
                Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        let handler = cell.handler.lock().unwrap().clone().unwrap();

        // Mutations at t=0, 100, 200.
        handler(1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        handler(1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        handler(1);

        // t=699: still inside the quiet window.
        tokio::time::sleep(Duration::from_millis(499)).await;
        settle().await;
        assert_eq!(refreshes.load(Ordering::SeqCst), 0);

        // t=701: exactly one refresh fired.
        tokio::time::sleep(Duration::from_millis(2)).await;
        settle().await;
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);

        // No trailing extras.
        tokio::time::sleep(Duration::from_millis(1000)).await;
        settle().await;
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_refresh() {
        let (source, cell) = fixture();
        let refreshes = Arc::new(AtomicUsize::new(0));
        let counter = refreshes.clone();
        let mut watcher = ChangeWatcher::new();
        watcher
            .subscribe(
                &source,
                &target(),
                Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        let handler = cell.handler.lock().unwrap().clone().unwrap();

        handler(1);
        watcher.disconnect();
        assert!(cell.disconnected.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        settle().await;
        assert_eq!(refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn each_settled_burst_refreshes_once() {
        let (source, cell) = fixture();
        let refreshes = Arc::new(AtomicUsize::new(0));
        let counter = refreshes.clone();
        let mut watcher = ChangeWatcher::with_quiet_period(Duration::from_millis(50));
        watcher
            .subscribe(
                &source,
                &target(),
                Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        let handler = cell.handler.lock().unwrap().clone().unwrap();

        handler(1);
        tokio::time::sleep(Duration::from_millis(60)).await;
        settle().await;
        handler(1);
        tokio::time::sleep(Duration::from_millis(60)).await;
        settle().await;
        assert_eq!(refreshes.load(Ordering::SeqCst), 2);
    }
}

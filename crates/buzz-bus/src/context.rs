//! # Execution Contexts
//!
//! A [`Context`] is one isolated participant in the hierarchy, e.g. one
//! embedded document. It owns a transport, knows its own identity and,
//! when nested, holds a handle to its parent.
//!
//! Contexts never look into each other. The only thing one context does to
//! another is post text into its transport, tagged with its own identity,
//! exactly as a host messaging API would.
//!
//! Per-context bus state (uplink guard, readiness) lives here and is driven
//! by [`crate::init`].

use crate::config::BusConfig;
use crate::relay::Uplink;
use crate::transport::{InMemoryTransport, Subscription, Transport};
use buzz_types::ContextId;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Init-once state of the bus machinery inside one context.
pub(crate) struct BusState {
    pub(crate) uplink_installed: AtomicBool,
    pub(crate) uplink: Mutex<Option<Uplink>>,
    pub(crate) ready_scheduled: AtomicBool,
    /// Bumped by every reset; a scheduled notification from an older
    /// generation is discarded. Scheduling and firing hold this lock.
    pub(crate) ready_generation: Mutex<u64>,
    pub(crate) ready: watch::Sender<bool>,
    pub(crate) ready_notifications: AtomicUsize,
    /// Parent link name announced by a downlink, written by the uplink.
    pub(crate) assigned_link: Arc<RwLock<Option<String>>>,
}

impl BusState {
    fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            uplink_installed: AtomicBool::new(false),
            uplink: Mutex::new(None),
            ready_scheduled: AtomicBool::new(false),
            ready_generation: Mutex::new(0),
            ready,
            ready_notifications: AtomicUsize::new(0),
            assigned_link: Arc::new(RwLock::new(None)),
        }
    }
}

/// One execution context of the hierarchy.
pub struct Context {
    id: ContextId,
    transport: Arc<dyn Transport>,
    parent: Option<Arc<Context>>,
    config: BusConfig,
    pub(crate) bus_state: BusState,
}

impl Context {
    /// Create a top-level context with default configuration.
    pub fn root() -> Arc<Self> {
        Self::root_with_config(BusConfig::default())
    }

    /// Create a top-level context.
    pub fn root_with_config(config: BusConfig) -> Arc<Self> {
        let transport = Arc::new(InMemoryTransport::with_capacity(config.channel_capacity));
        Self::with_transport(transport, None, config)
    }

    /// Create a context nested inside `parent`, inheriting its configuration.
    pub fn nested(parent: &Arc<Context>) -> Arc<Self> {
        let config = parent.config.clone();
        let transport = Arc::new(InMemoryTransport::with_capacity(config.channel_capacity));
        Self::with_transport(transport, Some(Arc::clone(parent)), config)
    }

    /// Create a context over a host-provided transport.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        parent: Option<Arc<Context>>,
        config: BusConfig,
    ) -> Arc<Self> {
        let context = Arc::new(Self {
            id: ContextId::new(),
            transport,
            parent,
            config,
            bus_state: BusState::new(),
        });
        debug!(
            context = %context.id,
            nested = context.is_nested(),
            "Context created"
        );
        context
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn parent(&self) -> Option<&Arc<Context>> {
        self.parent.as_ref()
    }

    /// True for every context except the top of the hierarchy.
    pub fn is_nested(&self) -> bool {
        self.parent.is_some()
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Listen to everything posted into this context.
    pub fn subscribe(&self) -> Subscription {
        self.transport.subscribe()
    }

    /// Broadcast `text` inside this context, as this context.
    pub fn post(&self, text: String) -> usize {
        self.transport.post(text, self.id)
    }

    /// Post `text` into `target`'s transport, tagged with this context's id.
    pub fn post_to(&self, target: &Context, text: String) -> usize {
        target.transport.post(text, self.id)
    }

    /// Whether the readiness signal has fired.
    pub fn is_ready(&self) -> bool {
        *self.bus_state.ready.borrow()
    }

    /// Wait until the readiness signal fires.
    pub async fn wait_ready(&self) {
        let mut receiver = self.bus_state.ready.subscribe();
        // The sender lives as long as `self`, so this only ends on `true`.
        let _ = receiver.wait_for(|ready| *ready).await;
    }

    /// How many times readiness fired since creation or the last reset.
    pub fn ready_notifications(&self) -> usize {
        self.bus_state.ready_notifications.load(Ordering::SeqCst)
    }

    /// Whether an uplink is currently installed.
    pub fn has_uplink(&self) -> bool {
        self.bus_state.uplink.lock().is_some()
    }

    /// Link name a parent downlink bridges this context to, once announced.
    pub fn assigned_link(&self) -> Option<String> {
        self.bus_state.assigned_link.read().clone()
    }

    /// Tear down the init-once state so `init` runs from scratch.
    ///
    /// Intended for tests; connectors already attached keep working.
    pub fn reset_bus_state(&self) {
        let uplink = self.bus_state.uplink.lock().take();
        drop(uplink);
        self.bus_state.uplink_installed.store(false, Ordering::SeqCst);
        {
            let mut generation = self.bus_state.ready_generation.lock();
            *generation += 1;
            self.bus_state.ready_scheduled.store(false, Ordering::SeqCst);
            self.bus_state.ready_notifications.store(0, Ordering::SeqCst);
            self.bus_state.ready.send_replace(false);
        }
        *self.bus_state.assigned_link.write() = None;
        debug!(context = %self.id, "Bus state reset");
    }

    /// Claim the readiness notification for the current generation.
    ///
    /// Returns the generation to fire with, or `None` if one is already
    /// scheduled.
    pub(crate) fn schedule_ready(&self) -> Option<u64> {
        let generation = self.bus_state.ready_generation.lock();
        if self.bus_state.ready_scheduled.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(*generation)
        }
    }

    pub(crate) fn fire_ready(&self, scheduled: u64) {
        let generation = self.bus_state.ready_generation.lock();
        if *generation != scheduled {
            debug!(context = %self.id, "Discarding readiness from before reset");
            return;
        }
        self.bus_state.ready.send_replace(true);
        self.bus_state
            .ready_notifications
            .fetch_add(1, Ordering::SeqCst);
        info!(context = %self.id, "Bus ready");
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("parent", &self.parent.as_ref().map(|p| p.id))
            .field("ready", &self.is_ready())
            .finish()
    }
}

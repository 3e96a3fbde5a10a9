//! Per-context bus initialization.
//!
//! [`init`] is the single entry point that turns a context into a bus
//! participant. It is idempotent: however often it runs for a context, that
//! context gets at most one uplink and one readiness notification.
//! [`Context::reset_bus_state`] undoes both for tests.

use crate::context::Context;
use crate::relay::Uplink;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Initialize the bus machinery of `context`.
///
/// - Nested contexts get an uplink to their parent, installed once.
/// - The readiness signal fires once, after the calling task yields.
///
/// Must be called from within a Tokio runtime.
pub fn init(context: &Arc<Context>) {
    if let Some(parent) = context.parent() {
        if !context
            .bus_state
            .uplink_installed
            .swap(true, Ordering::SeqCst)
        {
            let uplink = Uplink::install(context, parent);
            *context.bus_state.uplink.lock() = Some(uplink);
        } else {
            debug!(context = %context.id(), "Uplink already installed");
        }
    }

    if let Some(generation) = context.schedule_ready() {
        let context = Arc::clone(context);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            context.fire_ready(generation);
        });
    }
}

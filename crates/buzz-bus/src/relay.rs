//! # Relays
//!
//! Uplink and downlink bridge a parent context's bus and a child context's
//! root link, so connectors never learn about nesting.
//!
//! ```text
//!   parent context                          child context
//!  ┌──────────────────────────┐            ┌──────────────────────────┐
//!  │ connector (link "foo")   │            │ connector (root link)    │
//!  │          ▲   │           │            │         │   ▲            │
//!  │          │   ▼           │  link=root │         ▼   │            │
//!  │        Downlink ─────────┼──────────▶ │      (broadcast)         │
//!  │ link=foo ▲               │            │         │                │
//!  │ relayed  │  link=uplink  │            │         ▼                │
//!  │          └───────────────┼─────────── │       Uplink             │
//!  └──────────────────────────┘            └──────────────────────────┘
//! ```
//!
//! - **Uplink** (child side): local root-link traffic is re-tagged with the
//!   reserved `uplink` link and posted to the parent.
//! - **Downlink** (parent side): `uplink` traffic from the child becomes
//!   bridged-link traffic in the parent (marked `relayed`, extensions merged);
//!   the parent's own bridged-link traffic goes down to the child on the root
//!   link.
//!
//! The source identity on every delivery keeps the two directions apart:
//! the uplink ignores what its parent posted, the downlink only takes
//! `uplink` traffic from its own child. Downward traffic is whatever the
//! parent context posted itself or received from its own parent.
//!
//! A downlink on a named link announces that name to the child with a
//! `rename-buzz-link` notice. An uplink installed later asks for it again
//! with `request-buzz-link`, so `init` and `Downlink::install` may run in
//! either order.

use crate::codec;
use crate::context::Context;
use crate::transport::Subscription;
use buzz_telemetry::metrics::relay_direction;
use buzz_telemetry::BUS_MESSAGES_RELAYED;
use buzz_types::{ContextId, ControlNotice, Envelope, ROOT_LINK, UPLINK_LINK};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Child-side relay forwarding root-link traffic to the parent.
///
/// Installed by [`crate::init`], at most once per context.
pub struct Uplink {
    child: ContextId,
    parent: ContextId,
    listener: JoinHandle<()>,
}

impl Uplink {
    pub(crate) fn install(child: &Arc<Context>, parent: &Arc<Context>) -> Self {
        info!(
            child = %child.id(),
            parent = %parent.id(),
            "Installing uplink"
        );

        let subscription = child.subscribe();
        let listener = tokio::spawn(run_uplink(
            subscription,
            child.id(),
            Arc::clone(parent),
            Arc::clone(&child.bus_state.assigned_link),
        ));

        // A downlink installed before us announced its link to nobody.
        match codec::encode_notice(&ControlNotice::request_link()) {
            Ok(text) => {
                child.post_to(parent, text);
            }
            Err(e) => warn!(error = %e, "Failed to encode link request"),
        }

        Self {
            child: child.id(),
            parent: parent.id(),
            listener,
        }
    }

    pub fn child(&self) -> ContextId {
        self.child
    }

    pub fn parent(&self) -> ContextId {
        self.parent
    }
}

impl Drop for Uplink {
    fn drop(&mut self) {
        self.listener.abort();
        debug!(child = %self.child, "Uplink removed");
    }
}

async fn run_uplink(
    mut subscription: Subscription,
    child_id: ContextId,
    parent: Arc<Context>,
    assigned_link: Arc<RwLock<Option<String>>>,
) {
    let parent_id = parent.id();

    while let Some(delivery) = subscription.recv().await {
        if delivery.source == parent_id {
            // Traffic from above is the downlink's business, except for the
            // link announcement.
            if let Some(notice) = codec::decode_notice(&delivery.text) {
                if notice.is_rename() {
                    debug!(child = %child_id, link = %notice.link, "Parent assigned link");
                    *assigned_link.write() = Some(notice.link);
                }
            }
            continue;
        }

        let Ok(mut envelope) = codec::decode(&delivery.text) else {
            continue;
        };
        if envelope.link != ROOT_LINK {
            continue;
        }

        envelope.link = UPLINK_LINK.to_string();
        match codec::encode(&envelope) {
            Ok(text) => {
                // Posted into the parent, tagged as coming from the child.
                parent.transport().post(text, child_id);
                BUS_MESSAGES_RELAYED
                    .with_label_values(&[relay_direction::UPLINK])
                    .inc();
                trace!(
                    child = %child_id,
                    message_id = %envelope.message_id,
                    "Forwarded to parent"
                );
            }
            Err(e) => warn!(error = %e, "Uplink failed to encode envelope"),
        }
    }
}

/// Downlink construction options.
#[derive(Debug, Clone, Default)]
pub struct DownlinkOptions {
    /// Parent link the child's root link is bridged to. Defaults to the
    /// root link.
    pub link: Option<String>,
    /// Fields merged into the payload of every message relayed upward.
    pub extensions: Map<String, Value>,
}

impl DownlinkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    #[must_use]
    pub fn extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }
}

/// Parent-side relay bound to one child context.
pub struct Downlink {
    link: String,
    parent: ContextId,
    child: ContextId,
    listener: JoinHandle<()>,
}

struct DownlinkRoute {
    link: String,
    extensions: Map<String, Value>,
    parent: Arc<Context>,
    child: Arc<Context>,
}

impl Downlink {
    /// Bridge `child`'s root link to `options.link` of `parent`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn install(parent: &Arc<Context>, child: &Arc<Context>, options: DownlinkOptions) -> Self {
        let link = options.link.unwrap_or_else(|| ROOT_LINK.to_string());
        info!(
            parent = %parent.id(),
            child = %child.id(),
            link = %link,
            "Installing downlink"
        );

        let subscription = parent.subscribe();
        let route = DownlinkRoute {
            link: link.clone(),
            extensions: options.extensions,
            parent: Arc::clone(parent),
            child: Arc::clone(child),
        };
        // Reaches the child's uplink if it is already installed; a later
        // uplink asks again.
        route.announce_link();
        let listener = tokio::spawn(run_downlink(subscription, route));

        Self {
            link,
            parent: parent.id(),
            child: child.id(),
            listener,
        }
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn parent(&self) -> ContextId {
        self.parent
    }

    pub fn child(&self) -> ContextId {
        self.child
    }
}

impl Drop for Downlink {
    fn drop(&mut self) {
        self.listener.abort();
        debug!(child = %self.child, link = %self.link, "Downlink removed");
    }
}

async fn run_downlink(mut subscription: Subscription, route: DownlinkRoute) {
    let parent_id = route.parent.id();
    let child_id = route.child.id();
    // Traffic our parent context relayed down into us continues downward,
    // so replies cross any number of levels.
    let grandparent_id = route.parent.parent().map(|p| p.id());

    while let Some(delivery) = subscription.recv().await {
        if delivery.source == parent_id || Some(delivery.source) == grandparent_id {
            // Link announcements are addressed to one context only.
            if codec::decode_notice(&delivery.text).is_some() {
                continue;
            }
            let Ok(envelope) = codec::decode(&delivery.text) else {
                continue;
            };
            if envelope.link == route.link && !envelope.is_relayed() {
                route.relay_down(envelope);
            }
        } else if delivery.source == child_id {
            if let Some(notice) = codec::decode_notice(&delivery.text) {
                if notice.is_request() {
                    route.announce_link();
                }
                continue;
            }
            let Ok(envelope) = codec::decode(&delivery.text) else {
                continue;
            };
            if envelope.link == UPLINK_LINK {
                route.relay_up(envelope);
            }
        }
    }
}

impl DownlinkRoute {
    /// Tell the child which link it is bridged to. Nothing to say for the
    /// root link.
    fn announce_link(&self) {
        if self.link == ROOT_LINK {
            return;
        }
        match codec::encode_notice(&ControlNotice::rename_link(self.link.clone())) {
            Ok(text) => {
                self.parent.post_to(&self.child, text);
            }
            Err(e) => warn!(error = %e, "Failed to encode link announcement"),
        }
    }

    /// Parent → child: bridged link becomes the child's root link.
    fn relay_down(&self, mut envelope: Envelope) {
        envelope.link = ROOT_LINK.to_string();
        match codec::encode(&envelope) {
            Ok(text) => {
                self.parent.post_to(&self.child, text);
                BUS_MESSAGES_RELAYED
                    .with_label_values(&[relay_direction::DOWNLINK_DOWN])
                    .inc();
                trace!(
                    link = %self.link,
                    message_id = %envelope.message_id,
                    "Forwarded to child"
                );
            }
            Err(e) => warn!(error = %e, "Downlink failed to encode envelope"),
        }
    }

    /// Child → parent: `uplink` traffic becomes bridged-link traffic.
    fn relay_up(&self, mut envelope: Envelope) {
        envelope.link = self.link.clone();
        envelope.relayed = Some(true);
        if !envelope.merge_into_payload(&self.extensions) {
            debug!(
                message_id = %envelope.message_id,
                "Payload is not an object, extensions skipped"
            );
        }
        match codec::encode(&envelope) {
            Ok(text) => {
                self.parent.post(text);
                BUS_MESSAGES_RELAYED
                    .with_label_values(&[relay_direction::DOWNLINK_UP])
                    .inc();
                trace!(
                    link = %self.link,
                    message_id = %envelope.message_id,
                    "Rebroadcast in parent"
                );
            }
            Err(e) => warn!(error = %e, "Downlink failed to encode envelope"),
        }
    }
}

//! # Connector
//!
//! The node-local bus participant.
//!
//! A connector joins exactly one link of its context. It:
//! - filters broadcasts by link, sender and receiver ([`EnvelopeFilter`]),
//! - dispatches accepted envelopes to the handler registered for their type,
//! - correlates `response` envelopes with its outstanding calls,
//! - answers `has-capability` queries for the types it handles.
//!
//! Nothing here knows about relays or nesting depth: a connector in a leaf
//! context talks to an ancestor exactly as it talks to a sibling.
//!
//! ## Lifecycle
//!
//! [`Connector::new`] subscribes to the context transport and spawns one
//! listener task; all dispatch for the connector happens on it. Dropping the
//! connector aborts the task and releases the subscription.

use crate::capability::{CapabilityHandler, CapabilityRegistry};
use crate::codec;
use crate::context::Context;
use crate::filter::EnvelopeFilter;
use crate::message::Message;
use crate::pending::{Continuation, PendingCalls};
use crate::transport::Subscription;
use buzz_telemetry::metrics::drop_reason;
use buzz_telemetry::{BUS_MESSAGES_DISPATCHED, BUS_MESSAGES_DROPPED, BUS_MESSAGES_SENT};
use buzz_types::{
    generate_id, BusError, ConnectorId, Envelope, EnvelopeFields, MessageId, MessageType,
    ROOT_LINK, UPLINK_LINK,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Construction options.
#[derive(Debug, Clone, Default)]
pub struct ConnectorOptions {
    /// Display name sent as `senderName`. Defaults to the identity.
    pub name: Option<String>,
    /// Link to join. Defaults to the root link.
    pub link: Option<String>,
    /// Program identifier of the embedding application.
    pub identifier: Option<String>,
    /// Default timeout for calls. Falls back to the context configuration.
    pub call_timeout: Option<Duration>,
}

impl ConnectorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    #[must_use]
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

/// Answer to a `has-capability` query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityAck {
    pub uid: ConnectorId,
    pub name: String,
}

impl CapabilityAck {
    /// Read the acknowledgement carried by a response message.
    pub fn from_message(message: &Message) -> Option<Self> {
        serde_json::from_value(message.payload().clone()).ok()
    }
}

pub(crate) struct ConnectorInner {
    uid: ConnectorId,
    name: String,
    identifier: String,
    link: String,
    filter: EnvelopeFilter,
    context: Arc<Context>,
    capabilities: RwLock<CapabilityRegistry>,
    pending: PendingCalls,
    call_timeout: Option<Duration>,
}

impl ConnectorInner {
    pub(crate) fn uid(&self) -> &ConnectorId {
        &self.uid
    }

    fn build_envelope(
        &self,
        message_type: &MessageType,
        fields: EnvelopeFields,
        payload: Value,
    ) -> Envelope {
        let mut envelope = Envelope::new(
            self.link.clone(),
            message_type,
            self.uid.clone(),
            self.name.clone(),
            payload,
        );
        envelope.apply_fields(fields);
        envelope
    }

    fn broadcast(&self, envelope: &Envelope) {
        match codec::encode(envelope) {
            Ok(text) => {
                let listeners = self.context.post(text);
                BUS_MESSAGES_SENT.inc();
                debug!(
                    link = %envelope.link,
                    message_type = %envelope.message_type,
                    message_id = %envelope.message_id,
                    sender = %self.uid,
                    listeners = listeners,
                    "Message sent"
                );
            }
            Err(e) => {
                warn!(
                    message_id = %envelope.message_id,
                    error = %e,
                    "Failed to encode envelope, message not sent"
                );
            }
        }
    }

    pub(crate) fn send_message(
        &self,
        message_type: &MessageType,
        fields: EnvelopeFields,
        payload: Value,
    ) -> MessageId {
        let envelope = self.build_envelope(message_type, fields, payload);
        self.broadcast(&envelope);
        envelope.message_id
    }

    /// Register the continuation before broadcasting: on a multi-threaded
    /// runtime the response can arrive before `broadcast` returns.
    fn call_with(
        &self,
        message_type: &MessageType,
        fields: EnvelopeFields,
        payload: Value,
        continuation: Continuation,
        timeout: Option<Duration>,
    ) -> MessageId {
        let envelope = self.build_envelope(message_type, fields, payload);
        self.pending.register(
            envelope.message_id.clone(),
            message_type.as_str(),
            continuation,
            timeout,
        );
        self.broadcast(&envelope);
        envelope.message_id
    }

    pub(crate) fn has_capability(&self, name: &str) -> bool {
        self.capabilities.read().contains(name)
    }

    fn dispatch(self: &Arc<Self>, text: &str) {
        let envelope = match codec::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                BUS_MESSAGES_DROPPED
                    .with_label_values(&[drop_reason::MALFORMED])
                    .inc();
                trace!(connector = %self.uid, error = %e, "Ignoring foreign traffic");
                return;
            }
        };

        if !self.filter.matches(&envelope) {
            BUS_MESSAGES_DROPPED
                .with_label_values(&[drop_reason::UNROUTABLE])
                .inc();
            return;
        }

        let message_type = envelope.kind();
        // Clone the handler out so it may register capabilities itself.
        let handler = self.capabilities.read().lookup(&message_type);
        match handler {
            Some(handler) => {
                BUS_MESSAGES_DISPATCHED.inc();
                trace!(
                    connector = %self.uid,
                    message_type = %message_type,
                    message_id = %envelope.message_id,
                    "Dispatching"
                );
                handler.handle(Message::new(Arc::clone(self), envelope));
            }
            None => {
                BUS_MESSAGES_DROPPED
                    .with_label_values(&[drop_reason::UNHANDLED])
                    .inc();
                trace!(
                    connector = %self.uid,
                    message_type = %message_type,
                    "No capability registered"
                );
            }
        }
    }
}

/// Built-in `has-capability` handler.
fn answer_capability_query(message: Message) {
    let Some(capability) = message.payload().get("capability").and_then(Value::as_str) else {
        return;
    };
    let connector = Arc::clone(message.connector());
    if connector.has_capability(capability) {
        message.reply(json!({
            "uid": connector.uid,
            "name": connector.name,
        }));
    }
}

/// Built-in `response` handler.
fn complete_pending_call(message: Message) {
    let connector = Arc::clone(message.connector());
    connector.pending.complete(message);
}

async fn listen(inner: Arc<ConnectorInner>, mut subscription: Subscription, sweep: Duration) {
    let mut sweep = tokio::time::interval(sweep);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            delivery = subscription.recv() => match delivery {
                Some(delivery) => inner.dispatch(&delivery.text),
                None => {
                    debug!(connector = %inner.uid, "Transport closed, connector stops listening");
                    break;
                }
            },
            _ = sweep.tick() => {
                inner.pending.remove_expired();
            }
        }
    }
}

/// A bus participant bound to one link of one context.
pub struct Connector {
    inner: Arc<ConnectorInner>,
    listener: JoinHandle<()>,
}

impl Connector {
    /// Join `context`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(context: &Arc<Context>, options: ConnectorOptions) -> Self {
        let uid = ConnectorId::generate();
        let link = options.link.unwrap_or_else(|| ROOT_LINK.to_string());
        if link == UPLINK_LINK {
            warn!(connector = %uid, "Connector joined the reserved uplink link");
        }

        let mut capabilities = CapabilityRegistry::new();
        capabilities.register(MessageType::HasCapability, Arc::new(answer_capability_query));
        capabilities.register(MessageType::Response, Arc::new(complete_pending_call));

        let inner = Arc::new(ConnectorInner {
            name: options.name.unwrap_or_else(|| uid.to_string()),
            identifier: options.identifier.unwrap_or_else(generate_id),
            filter: EnvelopeFilter::new(link.clone(), uid.clone()),
            link,
            uid,
            capabilities: RwLock::new(capabilities),
            pending: PendingCalls::new(),
            call_timeout: options.call_timeout.or(context.config().call_timeout),
            context: Arc::clone(context),
        });

        // Subscribe before returning so nothing posted afterwards is missed.
        let subscription = context.subscribe();
        let listener = tokio::spawn(listen(
            Arc::clone(&inner),
            subscription,
            context.config().sweep_interval,
        ));

        debug!(
            connector = %inner.uid,
            name = %inner.name,
            link = %inner.link,
            context = %context.id(),
            "Connector attached"
        );

        Self { inner, listener }
    }

    pub fn uid(&self) -> &ConnectorId {
        &self.inner.uid
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    pub fn link(&self) -> &str {
        &self.inner.link
    }

    /// Register `handler` for `message_type`, replacing any earlier one.
    pub fn add_capability<H>(&self, message_type: impl Into<MessageType>, handler: H)
    where
        H: CapabilityHandler + 'static,
    {
        let message_type = message_type.into().normalized();
        if message_type.is_reserved() {
            warn!(
                connector = %self.inner.uid,
                message_type = %message_type,
                "Overriding a protocol capability"
            );
        }
        self.inner
            .capabilities
            .write()
            .register(message_type, Arc::new(handler));
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.inner.has_capability(name)
    }

    /// Broadcast a message. Fire-and-forget.
    pub fn send_message(
        &self,
        message_type: impl Into<MessageType>,
        fields: EnvelopeFields,
        payload: Value,
    ) -> MessageId {
        self.inner
            .send_message(&message_type.into(), fields, payload)
    }

    /// Broadcast a message and run `callback` on its first response.
    ///
    /// Uses the connector's default timeout; without one the call stays
    /// registered until answered or cancelled.
    pub fn call<F>(
        &self,
        message_type: impl Into<MessageType>,
        fields: EnvelopeFields,
        payload: Value,
        callback: F,
    ) -> MessageId
    where
        F: FnOnce(Message) + Send + 'static,
    {
        self.inner.call_with(
            &message_type.into(),
            fields,
            payload,
            Continuation::Callback(Box::new(callback)),
            self.inner.call_timeout,
        )
    }

    /// Like [`Connector::call`], evicting the call once `timeout` elapses.
    /// An evicted callback is dropped without being invoked.
    pub fn call_with_timeout<F>(
        &self,
        message_type: impl Into<MessageType>,
        fields: EnvelopeFields,
        payload: Value,
        timeout: Duration,
        callback: F,
    ) -> MessageId
    where
        F: FnOnce(Message) + Send + 'static,
    {
        self.inner.call_with(
            &message_type.into(),
            fields,
            payload,
            Continuation::Callback(Box::new(callback)),
            Some(timeout),
        )
    }

    /// Broadcast a message and wait for its first response.
    ///
    /// # Errors
    ///
    /// - `BusError::Timeout` - the connector's default timeout elapsed
    /// - `BusError::Cancelled` - the call was cancelled meanwhile
    pub async fn call_async(
        &self,
        message_type: impl Into<MessageType>,
        fields: EnvelopeFields,
        payload: Value,
    ) -> Result<Message, BusError> {
        self.await_response(message_type.into(), fields, payload, self.inner.call_timeout)
            .await
    }

    /// [`Connector::call_async`] with an explicit timeout.
    pub async fn call_async_with_timeout(
        &self,
        message_type: impl Into<MessageType>,
        fields: EnvelopeFields,
        payload: Value,
        timeout: Duration,
    ) -> Result<Message, BusError> {
        self.await_response(message_type.into(), fields, payload, Some(timeout))
            .await
    }

    async fn await_response(
        &self,
        message_type: MessageType,
        fields: EnvelopeFields,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<Message, BusError> {
        let (tx, rx) = oneshot::channel();
        // The awaiting side owns the deadline; the store never evicts it.
        let message_id = self.inner.call_with(
            &message_type,
            fields,
            payload,
            Continuation::Channel(tx),
            None,
        );

        let cancelled = || BusError::Cancelled {
            message_id: message_id.clone(),
        };

        match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(result) => result.map_err(|_| cancelled()),
                Err(_) => {
                    self.inner.pending.expire(&message_id);
                    Err(BusError::Timeout {
                        message_id: message_id.clone(),
                        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    })
                }
            },
            None => rx.await.map_err(|_| cancelled()),
        }
    }

    /// Ask peers on this link whether they handle `capability`.
    ///
    /// `callback` receives the first acknowledgement (payload `{uid, name}`);
    /// later ones are dropped. Nothing happens if no peer supports it.
    pub fn query_capability<F>(&self, capability: &str, callback: F) -> MessageId
    where
        F: FnOnce(Message) + Send + 'static,
    {
        self.call(
            MessageType::HasCapability,
            EnvelopeFields::new(),
            json!({ "capability": capability }),
            callback,
        )
    }

    /// Ask peers on this link whether they handle `capability`, collecting
    /// every acknowledgement until the returned discovery is dropped.
    pub fn discover(&self, capability: &str) -> CapabilityDiscovery {
        let (tx, rx) = mpsc::unbounded_channel();
        let message_id = self.inner.call_with(
            &MessageType::HasCapability,
            EnvelopeFields::new(),
            json!({ "capability": capability }),
            Continuation::Collector(tx),
            None,
        );
        CapabilityDiscovery {
            message_id,
            receiver: rx,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Withdraw a pending call. Returns false if it was already answered,
    /// evicted or never existed.
    pub fn cancel_call(&self, message_id: &MessageId) -> bool {
        self.inner.pending.cancel(message_id)
    }

    /// Whether `message_id` still waits for a response.
    pub fn is_pending(&self, message_id: &MessageId) -> bool {
        self.inner.pending.is_pending(message_id)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.pending_count()
    }

    pub fn pending_stats(&self) -> &crate::pending::PendingStats {
        self.inner.pending.stats()
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.listener.abort();
        debug!(connector = %self.inner.uid, "Connector detached");
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("uid", &self.inner.uid)
            .field("name", &self.inner.name)
            .field("link", &self.inner.link)
            .finish()
    }
}

/// Fan-in capability query.
///
/// Yields one [`CapabilityAck`] per answering peer. The underlying pending
/// call is closed when this value is dropped or [`close`](Self::close)d.
pub struct CapabilityDiscovery {
    message_id: MessageId,
    receiver: mpsc::UnboundedReceiver<Message>,
    inner: Arc<ConnectorInner>,
}

impl CapabilityDiscovery {
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Next acknowledgement. Returns `None` once closed.
    pub async fn next(&mut self) -> Option<CapabilityAck> {
        while let Some(message) = self.receiver.recv().await {
            if let Some(ack) = CapabilityAck::from_message(&message) {
                return Some(ack);
            }
        }
        None
    }

    /// Collect acknowledgements arriving within `window`, then close.
    pub async fn collect_for(mut self, window: Duration) -> Vec<CapabilityAck> {
        let mut acks = Vec::new();
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                ack = self.next() => match ack {
                    Some(ack) => acks.push(ack),
                    None => break,
                },
            }
        }
        acks
    }

    /// Stop collecting.
    pub fn close(self) {}
}

impl Drop for CapabilityDiscovery {
    fn drop(&mut self) {
        self.inner.pending.cancel(&self.message_id);
    }
}

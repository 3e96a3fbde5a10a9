//! Shared setup for the integration flows.

use buzz_bus::{init, Connector, ConnectorOptions, Context, Downlink, DownlinkOptions, Message};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};

/// Upper bound for anything that should arrive.
pub const WAIT: Duration = Duration::from_millis(500);

/// How long to listen before concluding nothing arrives.
pub const QUIET: Duration = Duration::from_millis(100);

/// Link the host side bridges the embedded context to.
pub const HOST_LINK: &str = "editor";

/// Handler forwarding every message it receives to a channel.
pub fn recorder() -> (
    impl Fn(Message) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Message>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |message: Message| {
            let _ = tx.send(message);
        },
        rx,
    )
}

/// Receive within [`WAIT`], panicking otherwise.
pub async fn expect_message(rx: &mut mpsc::UnboundedReceiver<Message>) -> Message {
    timeout(WAIT, rx.recv())
        .await
        .expect("timeout waiting for message")
        .expect("channel closed")
}

/// Assert nothing arrives within [`QUIET`].
pub async fn expect_silence(rx: &mut mpsc::UnboundedReceiver<Message>) {
    assert!(
        timeout(QUIET, rx.recv()).await.is_err(),
        "unexpected message delivered"
    );
}

/// Poll `condition` until it holds or [`WAIT`] elapses.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// A host context with one embedded child bridged to [`HOST_LINK`].
pub struct Embedding {
    pub host: Arc<Context>,
    pub embedded: Arc<Context>,
    pub downlink: Downlink,
}

impl Embedding {
    pub fn new() -> Self {
        Self::with_options(
            DownlinkOptions::new()
                .link(HOST_LINK)
                .extension("frame", json!("editor-frame")),
        )
    }

    pub fn with_options(options: DownlinkOptions) -> Self {
        let host = Context::root();
        let embedded = Context::nested(&host);
        init(&embedded);
        let downlink = Downlink::install(&host, &embedded, options);
        Self {
            host,
            embedded,
            downlink,
        }
    }

    /// Connector in the host on the bridged link.
    pub fn host_connector(&self, name: &str) -> Connector {
        Connector::new(
            &self.host,
            ConnectorOptions::new().name(name).link(self.downlink.link()),
        )
    }

    /// Connector in the embedded context on its root link.
    pub fn embedded_connector(&self, name: &str) -> Connector {
        Connector::new(&self.embedded, ConnectorOptions::new().name(name))
    }
}

//! # Capability Discovery Flows
//!
//! `has-capability` queries answered by peers in the same context and by
//! peers on the far side of a relay.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::*;
    use buzz_bus::{CapabilityAck, Connector, ConnectorOptions, Message};
    use serde_json::json;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_query_answered_across_relay() {
        let embedding = Embedding::new();
        let host = embedding.host_connector("printer");
        host.add_capability("print", |_message: Message| {});
        let guest = embedding.embedded_connector("guest");

        let (tx, rx) = oneshot::channel();
        guest.query_capability("print", move |message: Message| {
            let _ = tx.send(message);
        });

        let answer = timeout(WAIT, rx)
            .await
            .expect("timeout waiting for ack")
            .expect("ack");
        let ack = CapabilityAck::from_message(&answer).expect("ack payload");
        assert_eq!(&ack.uid, host.uid());
        assert_eq!(ack.name, "printer");
    }

    #[tokio::test]
    async fn test_unsupported_capability_stays_unanswered() {
        let embedding = Embedding::new();
        let host = embedding.host_connector("printer");
        host.add_capability("print", |_message: Message| {});
        let guest = embedding.embedded_connector("guest");

        let (tx, rx) = oneshot::channel::<Message>();
        let id = guest.query_capability("scan", move |message: Message| {
            let _ = tx.send(message);
        });

        assert!(timeout(QUIET, rx).await.is_err());
        assert!(guest.is_pending(&id));
        assert!(guest.cancel_call(&id));
        assert!(!guest.is_pending(&id));
    }

    #[tokio::test]
    async fn test_discover_collects_local_and_relayed_peers() {
        let embedding = Embedding::new();
        let remote_a = embedding.host_connector("remote-a");
        remote_a.add_capability("print", |_message: Message| {});
        let remote_b = embedding.host_connector("remote-b");
        remote_b.add_capability("print", |_message: Message| {});
        let remote_no = embedding.host_connector("remote-no");
        remote_no.add_capability("scan", |_message: Message| {});
        let local = embedding.embedded_connector("local");
        local.add_capability("print", |_message: Message| {});
        let guest = embedding.embedded_connector("guest");

        let acks = guest.discover("print").collect_for(QUIET * 2).await;

        let mut names: Vec<_> = acks.into_iter().map(|ack| ack.name).collect();
        names.sort();
        assert_eq!(names, vec!["local", "remote-a", "remote-b"]);
        assert_eq!(guest.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_capability_added_later_is_discoverable() {
        let embedding = Embedding::new();
        let host = embedding.host_connector("late");
        let guest = embedding.embedded_connector("guest");

        let before = guest.discover("export").collect_for(QUIET).await;
        assert!(before.is_empty());

        host.add_capability("export", |_message: Message| {});
        let after = guest.discover("export").collect_for(QUIET * 2).await;
        assert_eq!(after.len(), 1);
        assert_eq!(&after[0].uid, host.uid());
    }

    #[tokio::test]
    async fn test_query_from_host_reaches_embedded_peer() {
        let embedding = Embedding::new();
        let guest = embedding.embedded_connector("editor-plugin");
        guest.add_capability("spellcheck", |_message: Message| {});
        let host = embedding.host_connector("host");

        let mut discovery = host.discover("spellcheck");
        let ack = timeout(WAIT, discovery.next())
            .await
            .expect("timeout waiting for ack")
            .expect("ack");

        assert_eq!(&ack.uid, guest.uid());
        assert_eq!(ack.name, "editor-plugin");
    }

    #[tokio::test]
    async fn test_reserved_capabilities_are_advertised() {
        let embedding = Embedding::new();
        let host = embedding.host_connector("host");
        let guest = embedding.embedded_connector("guest");

        let acks = guest.discover("response").collect_for(QUIET * 2).await;

        assert!(acks.iter().any(|ack| &ack.uid == host.uid()));
    }
}

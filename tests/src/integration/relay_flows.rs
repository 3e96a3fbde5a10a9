//! # Relay Flows
//!
//! Connectors in nested contexts talk to each other through uplink/downlink
//! pairs without knowing the hierarchy.
//!
//! ## Flows Tested
//!
//! 1. **Embedded → host**: root-link traffic surfaces on the bridged link,
//!    marked relayed, with the downlink's extensions merged in
//! 2. **Host → embedded**: bridged-link traffic arrives on the root link
//! 3. **Round trips**: calls and replies cross one and two boundaries
//! 4. **Isolation**: other links, siblings and the reserved uplink link stay
//!    out of each other's way

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::*;
    use buzz_bus::codec;
    use buzz_bus::{
        init, Connector, ConnectorOptions, Context, Downlink, DownlinkOptions, EnvelopeFields,
        Message, ROOT_LINK, UPLINK_LINK,
    };
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::sleep;

    // =========================================================================
    // EMBEDDED → HOST
    // =========================================================================

    #[tokio::test]
    async fn test_embedded_message_reaches_host_link() {
        let embedding = Embedding::new();
        let host = embedding.host_connector("host");
        let guest = embedding.embedded_connector("guest");
        let (handler, mut rx) = recorder();
        host.add_capability("print", handler);

        let id = guest.send_message("print", EnvelopeFields::new(), json!({"pages": 3}));

        let message = expect_message(&mut rx).await;
        let envelope = message.envelope();
        assert_eq!(envelope.link, HOST_LINK);
        assert!(envelope.is_relayed());
        assert_eq!(envelope.message_id, id);
        assert_eq!(envelope.sender, *guest.uid());
        assert_eq!(envelope.sender_name, "guest");
        assert_eq!(
            message.payload(),
            &json!({"pages": 3, "frame": "editor-frame"})
        );
    }

    #[tokio::test]
    async fn test_extensions_overwrite_payload_keys() {
        let embedding = Embedding::new();
        let host = embedding.host_connector("host");
        let guest = embedding.embedded_connector("guest");
        let (handler, mut rx) = recorder();
        host.add_capability("print", handler);

        guest.send_message(
            "print",
            EnvelopeFields::new(),
            json!({"frame": "spoofed", "pages": 1}),
        );

        let message = expect_message(&mut rx).await;
        assert_eq!(message.payload()["frame"], json!("editor-frame"));
        assert_eq!(message.payload()["pages"], json!(1));
    }

    #[tokio::test]
    async fn test_non_object_payload_relayed_unchanged() {
        let embedding = Embedding::new();
        let host = embedding.host_connector("host");
        let guest = embedding.embedded_connector("guest");
        let (handler, mut rx) = recorder();
        host.add_capability("lines", handler);

        guest.send_message("lines", EnvelopeFields::new(), json!(["a", "b"]));

        let message = expect_message(&mut rx).await;
        assert_eq!(message.payload(), &json!(["a", "b"]));
        assert!(message.envelope().is_relayed());
    }

    #[tokio::test]
    async fn test_null_payload_becomes_extensions() {
        let embedding = Embedding::new();
        let host = embedding.host_connector("host");
        let guest = embedding.embedded_connector("guest");
        let (handler, mut rx) = recorder();
        host.add_capability("ping", handler);

        guest.send_message("ping", EnvelopeFields::new(), serde_json::Value::Null);

        let message = expect_message(&mut rx).await;
        assert_eq!(message.payload(), &json!({"frame": "editor-frame"}));
    }

    // =========================================================================
    // HOST → EMBEDDED
    // =========================================================================

    #[tokio::test]
    async fn test_host_message_reaches_embedded_root_link() {
        let embedding = Embedding::new();
        let host = embedding.host_connector("host");
        let guest = embedding.embedded_connector("guest");
        let (handler, mut rx) = recorder();
        guest.add_capability("refresh", handler);

        host.send_message("refresh", EnvelopeFields::new(), json!({"full": true}));

        let message = expect_message(&mut rx).await;
        assert_eq!(message.envelope().link, ROOT_LINK);
        assert!(!message.envelope().is_relayed());
        assert_eq!(message.sender(), host.uid());
        assert_eq!(message.payload(), &json!({"full": true}));
    }

    #[tokio::test]
    async fn test_host_traffic_on_other_links_stays_up() {
        let embedding = Embedding::new();
        let elsewhere = Connector::new(&embedding.host, ConnectorOptions::new().link("viewer"));
        let guest = embedding.embedded_connector("guest");
        let (handler, mut rx) = recorder();
        guest.add_capability("refresh", handler);

        elsewhere.send_message("refresh", EnvelopeFields::new(), json!({}));

        expect_silence(&mut rx).await;
    }

    // =========================================================================
    // ROUND TRIPS
    // =========================================================================

    #[tokio::test]
    async fn test_call_from_embedded_answered_by_host() {
        let embedding = Embedding::new();
        let host = embedding.host_connector("host");
        host.add_capability("lookup", |message: Message| {
            let key = message.payload()["key"].clone();
            message.reply(json!({"key": key, "found": true}));
        });
        let guest = embedding.embedded_connector("guest");

        let response = guest
            .call_async_with_timeout("lookup", EnvelopeFields::new(), json!({"key": "k1"}), WAIT)
            .await
            .expect("response");

        assert_eq!(response.payload(), &json!({"key": "k1", "found": true}));
        assert_eq!(response.sender(), host.uid());
        assert_eq!(response.envelope().receiver.as_ref(), Some(guest.uid()));
        assert_eq!(guest.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_call_from_host_answered_by_embedded() {
        let embedding = Embedding::new();
        let guest = embedding.embedded_connector("guest");
        guest.add_capability("selection", |message: Message| {
            message.reply(json!({"text": "hello"}));
        });
        let host = embedding.host_connector("host");

        let response = host
            .call_async_with_timeout("selection", EnvelopeFields::new(), json!({}), WAIT)
            .await
            .expect("response");

        // Responses travelling up get the extensions like everything else.
        assert_eq!(
            response.payload(),
            &json!({"text": "hello", "frame": "editor-frame"})
        );
        assert!(response.envelope().is_relayed());
    }

    #[tokio::test]
    async fn test_round_trip_across_two_boundaries() {
        let top = Context::root();
        let middle = Context::nested(&top);
        let leaf = Context::nested(&middle);
        init(&middle);
        init(&leaf);
        let _upper = Downlink::install(
            &top,
            &middle,
            DownlinkOptions::new().link("app").extension("via", json!("middle")),
        );
        let _lower = Downlink::install(&middle, &leaf, DownlinkOptions::new());

        let service = Connector::new(&top, ConnectorOptions::new().name("service").link("app"));
        let (handler, mut seen) = recorder();
        service.add_capability("echo", move |message: Message| {
            message.reply(message.payload().clone());
            handler(message);
        });
        let client = Connector::new(&leaf, ConnectorOptions::new().name("client"));

        let response = client
            .call_async_with_timeout("echo", EnvelopeFields::new(), json!({"n": 1}), WAIT)
            .await
            .expect("response");

        assert_eq!(response.payload(), &json!({"n": 1, "via": "middle"}));
        let request = expect_message(&mut seen).await;
        assert_eq!(request.envelope().link, "app");
        assert_eq!(request.sender(), client.uid());
    }

    #[tokio::test]
    async fn test_middle_context_sees_leaf_traffic_on_root_link() {
        let top = Context::root();
        let middle = Context::nested(&top);
        let leaf = Context::nested(&middle);
        init(&middle);
        init(&leaf);
        let _lower = Downlink::install(&middle, &leaf, DownlinkOptions::new());

        let observer = Connector::new(&middle, ConnectorOptions::new());
        let (handler, mut rx) = recorder();
        observer.add_capability("status", handler);
        let client = Connector::new(&leaf, ConnectorOptions::new());

        client.send_message("status", EnvelopeFields::new(), json!({"ok": true}));

        let message = expect_message(&mut rx).await;
        assert_eq!(message.envelope().link, ROOT_LINK);
        assert!(message.envelope().is_relayed());
    }

    // =========================================================================
    // ISOLATION
    // =========================================================================

    #[tokio::test]
    async fn test_other_host_links_do_not_see_embedded_traffic() {
        let embedding = Embedding::new();
        let bystander = Connector::new(&embedding.host, ConnectorOptions::new().link("viewer"));
        let (handler, mut rx) = recorder();
        bystander.add_capability("print", handler);
        let guest = embedding.embedded_connector("guest");

        guest.send_message("print", EnvelopeFields::new(), json!({}));

        expect_silence(&mut rx).await;
    }

    #[tokio::test]
    async fn test_embedded_named_link_is_not_relayed() {
        let embedding = Embedding::new();
        let host = embedding.host_connector("host");
        let (handler, mut rx) = recorder();
        host.add_capability("print", handler);
        let local_only = Connector::new(
            &embedding.embedded,
            ConnectorOptions::new().link("internal"),
        );

        local_only.send_message("print", EnvelopeFields::new(), json!({}));

        expect_silence(&mut rx).await;
    }

    #[tokio::test]
    async fn test_relayed_traffic_not_echoed_to_siblings() {
        let host = Context::root();
        let first = Context::nested(&host);
        let second = Context::nested(&host);
        init(&first);
        init(&second);
        let _a = Downlink::install(&host, &first, DownlinkOptions::new().link("shared"));
        let _b = Downlink::install(&host, &second, DownlinkOptions::new().link("shared"));

        let hub = Connector::new(&host, ConnectorOptions::new().link("shared"));
        let (hub_handler, mut hub_rx) = recorder();
        hub.add_capability("note", hub_handler);
        let sibling = Connector::new(&second, ConnectorOptions::new());
        let (sibling_handler, mut sibling_rx) = recorder();
        sibling.add_capability("note", sibling_handler);
        let author = Connector::new(&first, ConnectorOptions::new());

        author.send_message("note", EnvelopeFields::new(), json!({}));

        expect_message(&mut hub_rx).await;
        expect_silence(&mut sibling_rx).await;
    }

    #[tokio::test]
    async fn test_repeated_init_forwards_exactly_one_copy() {
        let host = Context::root();
        let embedded = Context::nested(&host);
        init(&embedded);
        init(&embedded);
        init(&embedded);
        let mut host_traffic = host.subscribe();
        let guest = Connector::new(&embedded, ConnectorOptions::new());

        let id = guest.send_message("print", EnvelopeFields::new(), json!({}));
        sleep(QUIET).await;

        let mut copies = 0;
        while let Ok(Some(delivery)) = host_traffic.try_recv() {
            let Ok(envelope) = codec::decode(&delivery.text) else {
                continue;
            };
            if envelope.message_id == id {
                assert_eq!(envelope.link, UPLINK_LINK);
                assert_eq!(delivery.source, embedded.id());
                copies += 1;
            }
        }
        assert_eq!(copies, 1);
    }

    #[tokio::test]
    async fn test_uplink_ignores_traffic_from_parent() {
        let embedding = Embedding::with_options(DownlinkOptions::new());
        let mut host_traffic = embedding.host.subscribe();
        let host = Connector::new(&embedding.host, ConnectorOptions::new());

        let id = host.send_message("print", EnvelopeFields::new(), json!({}));
        sleep(QUIET).await;

        // Only the original post: nothing bounced back from the child.
        let mut seen = 0;
        while let Ok(Some(delivery)) = host_traffic.try_recv() {
            if let Ok(envelope) = codec::decode(&delivery.text) {
                if envelope.message_id == id {
                    seen += 1;
                }
            }
        }
        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn test_no_uplink_without_init() {
        let host = Context::root();
        let embedded = Context::nested(&host);
        let _downlink = Downlink::install(&host, &embedded, DownlinkOptions::new().link("x"));
        let listener = Connector::new(&host, ConnectorOptions::new().link("x"));
        let (handler, mut rx) = recorder();
        listener.add_capability("print", handler);
        let guest = Connector::new(&embedded, ConnectorOptions::new());

        guest.send_message("print", EnvelopeFields::new(), json!({}));

        expect_silence(&mut rx).await;
    }

    #[tokio::test]
    async fn test_dropped_downlink_stops_relaying() {
        let embedding = Embedding::new();
        let host = embedding.host_connector("host");
        let (handler, mut rx) = recorder();
        host.add_capability("print", handler);
        let guest = embedding.embedded_connector("guest");

        let Embedding { downlink, .. } = embedding;
        drop(downlink);
        sleep(Duration::from_millis(10)).await;

        guest.send_message("print", EnvelopeFields::new(), json!({}));
        expect_silence(&mut rx).await;
    }

    // =========================================================================
    // LINK ANNOUNCEMENT
    // =========================================================================

    #[tokio::test]
    async fn test_named_downlink_announces_link() {
        let embedding = Embedding::new();
        let embedded = embedding.embedded.clone();

        assert!(eventually(|| embedded.assigned_link().as_deref() == Some(HOST_LINK)).await);
    }

    #[tokio::test]
    async fn test_init_after_downlink_still_learns_link() {
        let host = Context::root();
        let embedded = Context::nested(&host);
        let _downlink = Downlink::install(&host, &embedded, DownlinkOptions::new().link("late"));
        sleep(Duration::from_millis(10)).await;
        assert_eq!(embedded.assigned_link(), None);

        init(&embedded);

        assert!(eventually(|| embedded.assigned_link().as_deref() == Some("late")).await);
    }

    #[tokio::test]
    async fn test_root_downlink_announces_nothing() {
        let embedding = Embedding::with_options(DownlinkOptions::new());
        sleep(QUIET).await;
        assert_eq!(embedding.embedded.assigned_link(), None);
    }
}

//! Node-to-node routing, correlation, and timeout behavior.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{client, client_with_timeout, start_hub};
use samcore::Packet;
use serde_json::json;

#[tokio::test]
async fn test_echo_round_trip_preserves_correlation() {
    let tmp = tempfile::TempDir::new().unwrap();
    let hub = start_hub(tmp.path()).await;

    let bob = client(tmp.path(), "bob");
    bob.add_api_call("echo", |mut packet, client| async move {
        packet.result = packet.args.clone();
        let _ = client.send_return(packet);
    });
    bob.run().await.unwrap();

    let alice = client(tmp.path(), "alice");
    alice.run().await.unwrap();

    let args = json!({"n": 7, "nested": {"deep": [1, 2, 3]}});
    let reply = alice.call_api("bob", "echo", args.clone()).await.unwrap();

    assert!(reply.status);
    assert_eq!(reply.result, args, "handler echoes args into result");
    assert_eq!(reply.receiver, "bob");
    assert_eq!(reply.api_call, "echo");
    assert_eq!(reply.sender, "alice");
    assert!(reply.return_code.is_some());

    hub.stop().await;
}

#[tokio::test]
async fn test_out_of_order_replies_resolve_correct_callers() {
    let tmp = tempfile::TempDir::new().unwrap();
    let hub = start_hub(tmp.path()).await;

    // Bob stashes three requests, then answers them second, first, third.
    // Each reply carries its own returnCode in the result so the callers
    // can prove they got the right packet back.
    let stash: Arc<Mutex<Vec<Packet>>> = Arc::new(Mutex::new(Vec::new()));
    let bob = client(tmp.path(), "bob");
    {
        let stash = Arc::clone(&stash);
        bob.add_api_call("slow", move |packet, client| {
            let stash = Arc::clone(&stash);
            async move {
                let mut stash = stash.lock().unwrap();
                stash.push(packet);
                if stash.len() == 3 {
                    for index in [1, 0, 2] {
                        let mut reply = stash[index].clone();
                        reply.result = json!(reply.return_code);
                        let _ = client.send_return(reply);
                    }
                }
            }
        });
    }
    bob.run().await.unwrap();

    let alice = client(tmp.path(), "alice");
    alice.run().await.unwrap();

    let (r1, r2, r3) = tokio::join!(
        alice.call_api("bob", "slow", json!({"seq": 1})),
        alice.call_api("bob", "slow", json!({"seq": 2})),
        alice.call_api("bob", "slow", json!({"seq": 3})),
    );

    for (reply, seq) in [(r1.unwrap(), 1), (r2.unwrap(), 2), (r3.unwrap(), 3)] {
        assert!(reply.status);
        assert_eq!(
            reply.result,
            json!(reply.return_code),
            "caller {seq} resolved with someone else's reply"
        );
        assert_eq!(reply.args["seq"], json!(seq));
    }

    hub.stop().await;
}

#[tokio::test]
async fn test_receiver_observes_same_sender_calls_in_order() {
    let tmp = tempfile::TempDir::new().unwrap();
    let hub = start_hub(tmp.path()).await;

    let observed: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let bob = client(tmp.path(), "bob");
    {
        let observed = Arc::clone(&observed);
        bob.add_api_call("record", move |packet, client| {
            let observed = Arc::clone(&observed);
            async move {
                observed
                    .lock()
                    .unwrap()
                    .push(packet.args["seq"].as_i64().unwrap());
                let _ = client.send_return(packet);
            }
        });
    }
    bob.run().await.unwrap();

    let alice = client(tmp.path(), "alice");
    alice.run().await.unwrap();

    for seq in 0..10i64 {
        let reply = alice
            .call_api("bob", "record", json!({"seq": seq}))
            .await
            .unwrap();
        assert!(reply.status);
    }

    assert_eq!(*observed.lock().unwrap(), (0..10).collect::<Vec<_>>());

    hub.stop().await;
}

#[tokio::test]
async fn test_unknown_receiver_yields_routing_error() {
    let tmp = tempfile::TempDir::new().unwrap();
    let hub = start_hub(tmp.path()).await;

    let alice = client(tmp.path(), "alice");
    alice.run().await.unwrap();

    let reply = alice.call_api("carol", "anything", json!({})).await.unwrap();
    assert!(!reply.status);
    assert_eq!(
        reply.error_message.as_deref(),
        Some("Node \"carol\" does not exist!")
    );

    hub.stop().await;
}

#[tokio::test]
async fn test_silent_receiver_times_out_with_synthetic_packet() {
    let tmp = tempfile::TempDir::new().unwrap();
    let hub = start_hub(tmp.path()).await;

    // Bob registers the API but never replies.
    let bob = client(tmp.path(), "bob");
    bob.add_api_call("never", |_packet, _client| async {});
    bob.run().await.unwrap();

    let alice = client_with_timeout(tmp.path(), "alice", Some(Duration::from_millis(300)));
    alice.run().await.unwrap();

    let reply = alice.call_api("bob", "never", json!({})).await.unwrap();
    assert!(!reply.status);
    assert_eq!(reply.error_message.as_deref(), Some("API Timeout!"));
    assert_eq!(reply.receiver, "bob");
    assert_eq!(reply.api_call, "never");

    // The connection is still healthy after a timeout.
    let reply = alice
        .call_api("samcore", "helloWorld", json!({"text": "still here"}))
        .await
        .unwrap();
    assert!(reply.status);

    hub.stop().await;
}

#[tokio::test]
async fn test_no_timeout_call_against_silent_receiver_never_resolves() {
    let tmp = tempfile::TempDir::new().unwrap();
    let hub = start_hub(tmp.path()).await;

    let bob = client(tmp.path(), "bob");
    bob.add_api_call("never", |_packet, _client| async {});
    bob.run().await.unwrap();

    let alice = client_with_timeout(tmp.path(), "alice", None);
    alice.run().await.unwrap();

    let pending = alice.call_api("bob", "never", json!({}));
    let outcome = tokio::time::timeout(Duration::from_millis(300), pending).await;
    assert!(outcome.is_err(), "call without a deadline must stay pending");

    hub.stop().await;
}

#[tokio::test]
async fn test_late_reply_after_timeout_is_dropped() {
    let tmp = tempfile::TempDir::new().unwrap();
    let hub = start_hub(tmp.path()).await;

    // Bob replies only after the caller's deadline has fired.
    let bob = client(tmp.path(), "bob");
    bob.add_api_call("tardy", |mut packet, client| async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        packet.result = json!("too late");
        let _ = client.send_return(packet);
    });
    bob.run().await.unwrap();

    let alice = client_with_timeout(tmp.path(), "alice", Some(Duration::from_millis(100)));
    alice.run().await.unwrap();

    let reply = alice.call_api("bob", "tardy", json!({})).await.unwrap();
    assert_eq!(reply.error_message.as_deref(), Some("API Timeout!"));

    // Give the tardy reply time to arrive; it must be silently dropped and
    // must not corrupt the next call.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let reply = alice
        .call_api("samcore", "doesNodeExist", json!({"name": "bob"}))
        .await
        .unwrap();
    assert!(reply.status);
    assert_eq!(reply.result, json!(true));

    hub.stop().await;
}

#[tokio::test]
async fn test_error_replies_propagate_from_handlers() {
    let tmp = tempfile::TempDir::new().unwrap();
    let hub = start_hub(tmp.path()).await;

    let bob = client(tmp.path(), "bob");
    bob.add_api_call("validate", |mut packet, client| async move {
        if !packet.check_args(&["value"]) {
            let _ = client.send_error(packet, None);
            return;
        }
        packet.result = json!("ok");
        let _ = client.send_return(packet);
    });
    bob.run().await.unwrap();

    let alice = client(tmp.path(), "alice");
    alice.run().await.unwrap();

    let reply = alice.call_api("bob", "validate", json!({})).await.unwrap();
    assert!(!reply.status);
    assert_eq!(
        reply.error_message.as_deref(),
        Some("value argument not included!")
    );

    let reply = alice
        .call_api("bob", "validate", json!({"value": 1}))
        .await
        .unwrap();
    assert!(reply.status);
    assert_eq!(reply.result, json!("ok"));

    hub.stop().await;
}

#[tokio::test]
async fn test_handlers_can_call_out_mid_request() {
    let tmp = tempfile::TempDir::new().unwrap();
    let hub = start_hub(tmp.path()).await;

    // Bob's handler consults the hub before replying — a suspension point
    // inside a handler must not deadlock the client.
    let bob = client(tmp.path(), "bob");
    bob.add_api_call("whoami", |mut packet, client| async move {
        let lookup = client
            .call_api("samcore", "doesNodeExist", json!({"name": packet.sender}))
            .await;
        packet.result = match lookup {
            Ok(reply) => reply.result,
            Err(_) => json!(false),
        };
        let _ = client.send_return(packet);
    });
    bob.run().await.unwrap();

    let alice = client(tmp.path(), "alice");
    alice.run().await.unwrap();

    let reply = alice.call_api("bob", "whoami", json!({})).await.unwrap();
    assert!(reply.status);
    assert_eq!(reply.result, json!(true));

    hub.stop().await;
}

#[tokio::test]
async fn test_reconnecting_name_replaces_prior_connection() {
    let tmp = tempfile::TempDir::new().unwrap();
    let hub = start_hub(tmp.path()).await;

    let first = client(tmp.path(), "bob");
    first.run().await.unwrap();

    // A second client claims the same name; the registry must point at it.
    let second = client(tmp.path(), "bob");
    second.add_api_call("which", |mut packet, client| async move {
        packet.result = json!("second");
        let _ = client.send_return(packet);
    });
    second.run().await.unwrap();

    let alice = client(tmp.path(), "alice");
    alice.run().await.unwrap();

    let reply = alice.call_api("bob", "which", json!({})).await.unwrap();
    assert!(reply.status);
    assert_eq!(reply.result, json!("second"));

    hub.stop().await;
}

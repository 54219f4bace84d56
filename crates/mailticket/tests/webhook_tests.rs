//! Notification endpoint: handshake, authentication, dispatch and
//! deduplication, driven end to end through the router.

mod common;

use std::time::Duration;

use axum::http::{Method, StatusCode};
use common::harness::{envelope, notification};
use common::TestApp;

#[tokio::test]
async fn test_validation_handshake_echoes_token() {
    let app = TestApp::new();

    let response = app.notify("?validationToken=abc%20123", "").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("text/plain")));
    assert_eq!(response.text, "abc 123");
    assert_eq!(app.graph.fetch_count(), 0);

    let tickets = app.request(Method::GET, "/api/tickets", None).await.json();
    assert_eq!(tickets["total"], 0);
}

#[tokio::test]
async fn test_batch_with_forged_entry() {
    let app = TestApp::new();
    let subscription = app.subscribe().await;
    let secret = subscription.client_state.expose().to_string();
    app.graph
        .add_message("msg-1", "alice@example.com", "Login broken", "I cannot log in.");
    app.graph
        .add_message("msg-2", "bob@example.com", "Invoice", "Please resend my invoice.");
    app.graph
        .add_message("msg-3", "mallory@example.com", "Forged", "Should never be read.");

    let body = envelope(vec![
        notification(&subscription.id, &secret, "msg-1"),
        notification(&subscription.id, &secret, "msg-2"),
        notification(&subscription.id, "wrong-secret", "msg-3"),
    ]);
    let response = app.notify("", body).await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    let ack = response.json();
    assert_eq!(ack["status"], "accepted");
    assert_eq!(ack["received"], 3);
    assert_eq!(ack["scheduled"], 2);
    assert_eq!(ack["discarded"], 1);

    app.wait_for_runs(2).await;
    let tickets = app.request(Method::GET, "/api/tickets", None).await.json();
    assert_eq!(tickets["total"], 2);
    let senders: Vec<&str> = tickets["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["sender_email"].as_str().unwrap())
        .collect();
    assert!(!senders.contains(&"mallory@example.com"));
    assert_eq!(app.graph.fetch_count(), 2);
    assert_eq!(app.sender.sent().len(), 2);
}

#[tokio::test]
async fn test_unknown_subscription_is_discarded() {
    let app = TestApp::new();
    app.graph.add_message("msg-1", "alice@example.com", "Hi", "Hello");

    let response = app
        .notify("", envelope(vec![notification("sub-unknown", "x", "msg-1")]))
        .await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    let ack = response.json();
    assert_eq!(ack["scheduled"], 0);
    assert_eq!(ack["discarded"], 1);
    assert_eq!(app.graph.fetch_count(), 0);
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let app = TestApp::new();

    let response = app.notify("", "{not json").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.json()["detail"].is_string());
}

#[tokio::test]
async fn test_duplicate_notifications_create_one_ticket() {
    let app = TestApp::new();
    app.analyzer.set_delay(Duration::from_millis(300));
    let subscription = app.subscribe().await;
    let secret = subscription.client_state.expose().to_string();
    app.graph
        .add_message("msg-dup", "carol@example.com", "Help", "Printer on fire.");
    let body = envelope(vec![notification(&subscription.id, &secret, "msg-dup")]);

    let first = app.notify("", body.clone()).await.json();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = app.notify("", body.clone()).await.json();

    assert_eq!(first["scheduled"], 1);
    assert_eq!(second["scheduled"], 0);
    assert_eq!(second["duplicates"], 1);

    app.wait_for_runs(1).await;

    // Redelivery after completion is answered from the processed record.
    let third = app.notify("", body).await.json();
    assert_eq!(third["duplicates"], 1);

    let tickets = app.request(Method::GET, "/api/tickets", None).await.json();
    assert_eq!(tickets["total"], 1);
    assert_eq!(tickets["items"][0]["ticket_number"], "TKT-000001");
    assert_eq!(app.analyzer.calls(), 1);
}

#[tokio::test]
async fn test_resent_copy_is_not_fetched_again() {
    let app = TestApp::new();
    let subscription = app.subscribe().await;
    let secret = subscription.client_state.expose().to_string();
    app.graph
        .add_message("msg-orig", "erin@example.com", "Outage", "The portal is down.");
    app.graph
        .add_message("msg-copy", "erin@example.com", "Outage", "The portal is down.");

    app.notify("", envelope(vec![notification(&subscription.id, &secret, "msg-orig")]))
        .await;
    app.wait_for_runs(1).await;
    let copy = envelope(vec![notification(&subscription.id, &secret, "msg-copy")]);
    let ack = app.notify("", copy.clone()).await.json();
    assert_eq!(ack["scheduled"], 1);
    app.wait_for_runs(2).await;
    assert_eq!(app.graph.fetch_count(), 2);

    let again = app.notify("", copy).await.json();
    assert_eq!(again["scheduled"], 0);
    assert_eq!(again["duplicates"], 1);
    assert_eq!(app.graph.fetch_count(), 2);

    let tickets = app.request(Method::GET, "/api/tickets", None).await.json();
    assert_eq!(tickets["total"], 1);
    assert_eq!(app.analyzer.calls(), 1);
}

#[tokio::test]
async fn test_analysis_failure_degrades_ticket() {
    let app = TestApp::new();
    app.analyzer.set_failing(true);
    let subscription = app.subscribe().await;
    let secret = subscription.client_state.expose().to_string();
    app.graph
        .add_message("msg-1", "dave@example.com", "Refund", "Where is my refund?");

    let ack = app
        .notify("", envelope(vec![notification(&subscription.id, &secret, "msg-1")]))
        .await
        .json();
    assert_eq!(ack["scheduled"], 1);
    app.wait_for_runs(1).await;

    let ticket = app
        .request(Method::GET, "/api/tickets/TKT-000001", None)
        .await
        .json();
    assert_eq!(ticket["analysis_degraded"], true);
    assert_eq!(ticket["priority"], "Medium");
    assert!(ticket["summary"].is_null());
    assert_eq!(ticket["status"], "open");
    assert_eq!(app.sender.sent(), vec!["TKT-000001".to_string()]);
}

#[tokio::test]
async fn test_deleted_message_is_skipped() {
    let app = TestApp::new();
    let subscription = app.subscribe().await;
    let secret = subscription.client_state.expose().to_string();

    let ack = app
        .notify("", envelope(vec![notification(&subscription.id, &secret, "msg-gone")]))
        .await
        .json();
    assert_eq!(ack["scheduled"], 1);
    app.wait_for_runs(1).await;

    let stats = app.state.dispatcher.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 0);
    let tickets = app.request(Method::GET, "/api/tickets", None).await.json();
    assert_eq!(tickets["total"], 0);
}

#[tokio::test]
async fn test_non_created_change_is_ignored() {
    let app = TestApp::new();
    let subscription = app.subscribe().await;
    let secret = subscription.client_state.expose().to_string();
    let mut entry = notification(&subscription.id, &secret, "msg-1");
    entry["changeType"] = "updated".into();

    let ack = app.notify("", envelope(vec![entry])).await.json();

    assert_eq!(ack["ignored"], 1);
    assert_eq!(ack["scheduled"], 0);
}

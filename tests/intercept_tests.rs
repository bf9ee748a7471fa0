//! Integration tests for response classification and signal delivery.

mod common;

use common::{TestEnv, all_tasks, all_tasks_body, update_task};
use normcache::{DetectionMode, FetchPolicy, ResponseInterceptor, Signal};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

// =============================================================================
// Concrete classification cases, both modes
// =============================================================================

#[test]
fn test_conflict_body_classifies_as_conflict() {
    let body =
        br#"{"data":null,"errors":[{"message":"VoyagerConflict: task 1 changed on server"}]}"#;
    for mode in [DetectionMode::Structured, DetectionMode::LegacySubstring] {
        let interceptor = ResponseInterceptor::new(mode);
        assert_eq!(interceptor.classify(body), Signal::Conflict, "mode {:?}", mode);
    }
}

#[test]
fn test_mutation_success_body() {
    let body = br#"{"msg":"","operationType":"mutation","success":true}"#;
    for mode in [DetectionMode::Structured, DetectionMode::LegacySubstring] {
        let interceptor = ResponseInterceptor::new(mode);
        assert_eq!(interceptor.classify(body), Signal::MutationSuccess, "mode {:?}", mode);
    }
}

#[test]
fn test_query_success_body() {
    let body = br#"{"msg":"","operationType":"query","success":true}"#;
    for mode in [DetectionMode::Structured, DetectionMode::LegacySubstring] {
        let interceptor = ResponseInterceptor::new(mode);
        assert_eq!(interceptor.classify(body), Signal::QuerySuccess, "mode {:?}", mode);
    }
}

#[test]
fn test_plain_data_body_is_neutral() {
    let body = br#"{"data":{"allTasks":[{"__typename":"Task","id":"1","title":"Buy milk"}]}}"#;
    for mode in [DetectionMode::Structured, DetectionMode::LegacySubstring] {
        let interceptor = ResponseInterceptor::new(mode);
        assert_eq!(interceptor.classify(body), Signal::Neutral, "mode {:?}", mode);
    }
}

// =============================================================================
// Signal delivery through the client
// =============================================================================

#[tokio::test]
async fn test_conflict_signal_reaches_subscriber() {
    let env = TestEnv::new();
    let (tx, rx) = mpsc::channel();
    env.client.subscribe(Box::new(move |signal| {
        let _ = tx.send(signal);
    }));

    env.respond(r#"{"data":null,"errors":[{"message":"VoyagerConflict: stale write"}]}"#);

    let response = env
        .client
        .execute(&update_task("Rename", &["__typename", "id", "title"]))
        .await
        .unwrap();

    assert_eq!(response.signal, Signal::Conflict);
    assert_eq!(rx.try_recv().unwrap(), Signal::Conflict);
}

#[tokio::test]
async fn test_every_response_notifies_subscribers() {
    let env = TestEnv::with_fetch_policy(FetchPolicy::NetworkOnly);
    let seen = Arc::new(AtomicUsize::new(0));
    {
        let seen = Arc::clone(&seen);
        env.client.subscribe(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
    }

    env.respond_json(&all_tasks_body(&[("1", "Buy milk", "open")]));
    env.respond_json(&all_tasks_body(&[("1", "Buy milk", "open")]));

    env.client.execute(&all_tasks()).await.unwrap();
    env.client.execute(&all_tasks()).await.unwrap();

    // Neutral classifications are still delivered
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cache_hit_emits_no_signal() {
    let env = TestEnv::new();
    let seen = Arc::new(AtomicUsize::new(0));
    {
        let seen = Arc::clone(&seen);
        env.client.subscribe(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
    }

    env.respond_json(&all_tasks_body(&[("1", "Buy milk", "open")]));

    env.client.execute(&all_tasks()).await.unwrap();
    let hit = env.client.execute(&all_tasks()).await.unwrap();

    assert!(hit.from_cache);
    // Only the network response went through the interceptor
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_legacy_mode_through_client() {
    let env = TestEnv::with_detection(DetectionMode::LegacySubstring);
    env.respond(r#"{"msg":"","operationType":"mutation","success":true,"data":{"updateTask":null}}"#);

    let response = env
        .client
        .execute(&update_task("Close", &["__typename", "id", "status"]))
        .await
        .unwrap();

    assert_eq!(response.signal, Signal::MutationSuccess);
}

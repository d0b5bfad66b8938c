//! PostgreSQL store behaviour
//!
//! Run with `DATABASE_URL` pointing at a scratch database and `--ignored`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::database::{DatabaseConfig, init_pool};

use dispatch::{
    device::DeviceId,
    error::TokenRejection,
    models::{AuthorizationToken, Command, CommandAction, CommandStatus, TokenState},
    store::{ConsumeOutcome, DispatchStore, PgStore},
};

async fn store() -> PgStore {
    let config = DatabaseConfig::from_env().unwrap();
    let pool = init_pool(&config).await.unwrap();
    let store = PgStore::new(pool);
    store.migrate().await.unwrap();
    store
}

/// A locker id no other test run uses
fn fresh_device() -> DeviceId {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    DeviceId::parse(&format!("LOCKER_T{}", &suffix[..12])).unwrap()
}

#[tokio::test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_concurrent_consume_has_one_winner() {
    let store = Arc::new(store().await);
    let device = fresh_device();
    let token = AuthorizationToken::issue(device.clone(), None, 60_000, Utc::now());
    store.insert_token(&token).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let code = token.code.clone();
        handles.push(tokio::spawn(async move {
            store.consume_token(&code, Utc::now()).await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            ConsumeOutcome::Consumed { .. } => winners += 1,
            ConsumeOutcome::Rejected(rejection) => {
                assert_eq!(rejection, TokenRejection::AlreadyUsed)
            }
        }
    }
    assert_eq!(winners, 1);

    let stored = store.find_token(&token.code).await.unwrap().unwrap();
    assert_eq!(stored.state, TokenState::Consumed);
    assert!(stored.consumed_at.is_some());

    let command = store.next_pending_command(&device).await.unwrap().unwrap();
    assert_eq!(command.origin_token_id, Some(token.id));
    let now = Utc::now();
    store.acknowledge_command(command.id, true, now).await.unwrap();
    assert!(store.next_pending_command(&device).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_expired_and_unknown_codes() {
    let store = store().await;
    let issued_at = Utc::now() - Duration::minutes(5);
    let token = AuthorizationToken::issue(fresh_device(), None, 1_000, issued_at);
    store.insert_token(&token).await.unwrap();

    let outcome = store.consume_token(&token.code, Utc::now()).await.unwrap();
    assert!(matches!(
        outcome,
        ConsumeOutcome::Rejected(TokenRejection::Expired)
    ));

    let outcome = store.consume_token("never-issued", Utc::now()).await.unwrap();
    assert!(matches!(
        outcome,
        ConsumeOutcome::Rejected(TokenRejection::NotFound)
    ));
}

#[tokio::test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_queue_order_and_repeat_ack() {
    let store = store().await;
    let device = fresh_device();
    let now = Utc::now();

    // Same timestamp on purpose; insertion order decides
    let first = Command::pending(device.clone(), CommandAction::Open, None, now);
    let second = Command::pending(device.clone(), CommandAction::Close, None, now);
    store.enqueue_command(&first).await.unwrap();
    store.enqueue_command(&second).await.unwrap();

    let next = store.next_pending_command(&device).await.unwrap().unwrap();
    assert_eq!(next.id, first.id);

    let outcome = store
        .acknowledge_command(first.id, false, now)
        .await
        .unwrap()
        .unwrap();
    assert!(!outcome.was_repeat());
    assert_eq!(outcome.command().status, CommandStatus::Delivered);

    let later = now + Duration::seconds(10);
    let outcome = store
        .acknowledge_command(first.id, true, later)
        .await
        .unwrap()
        .unwrap();
    assert!(outcome.was_repeat());
    assert_eq!(outcome.command().ack_success, Some(false));

    let next = store.next_pending_command(&device).await.unwrap().unwrap();
    assert_eq!(next.id, second.id);

    assert!(
        store
            .acknowledge_command(uuid::Uuid::new_v4(), true, now)
            .await
            .unwrap()
            .is_none()
    );
}

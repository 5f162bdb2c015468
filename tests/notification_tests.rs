mod common;

use async_trait::async_trait;
use common::*;
use entity_registry::prelude::*;
use entity_registry::{Broker, BrokerError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_create_publishes_type_id_and_scope_topics() {
    let fx = fixture().await;
    let mut branch = Branch::named("Harbour");
    fx.branches.create(&mut branch, &Preload::Default).await.unwrap();
    fx.broker.wait_for(1, WAIT).await;

    let mut bank = Bank::new("Pier", Some(branch.audit.id), 4);
    fx.banks.create(&mut bank, &Preload::Default).await.unwrap();

    let delivered = fx.broker.wait_for(2, WAIT).await;
    assert_eq!(delivered.len(), 2);
    let message = &delivered[1];
    assert_eq!(
        message.topics,
        vec![
            "bank.create".to_string(),
            format!("bank.create.{}", bank.audit.id),
            format!("bank.create.branch.{}", branch.audit.id),
        ]
    );

    // The payload is the projection of the reloaded entity, relation included.
    let expected = serde_json::to_value(fx.banks.to_model(Some(&bank))).unwrap();
    assert_eq!(message.payload, expected);
    assert_eq!(message.payload["branch_name"], "Harbour");
}

#[tokio::test]
async fn test_scope_topic_is_skipped_without_a_key() {
    let fx = fixture().await;
    let mut bank = Bank::new("Loose", None, 0);
    fx.banks.create(&mut bank, &Preload::Default).await.unwrap();

    let delivered = fx.broker.wait_for(1, WAIT).await;
    assert_eq!(delivered[0].topics.len(), 2);
    assert_eq!(fx.broker.published_to("bank.create").len(), 1);
}

#[tokio::test]
async fn test_update_and_delete_publish_their_own_actions() {
    let fx = fixture().await;
    let mut bank = Bank::new("Mutable", None, 1);
    fx.banks.create(&mut bank, &Preload::Default).await.unwrap();
    let id = bank.audit.id;

    let mut patch = Bank::new("Mutated", None, 0);
    fx.banks.update_by_id(id, &mut patch, &Preload::None).await.unwrap();
    fx.banks.delete(id, None).await.unwrap();

    fx.broker.wait_for(3, WAIT).await;
    let updated = fx.broker.published_to(&format!("bank.update.{}", id));
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].payload["name"], "Mutated");

    let deleted = fx.broker.published_to("bank.delete");
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].payload["deleted"], true);
    assert!(deleted[0].topics.contains(&format!("bank.delete.{}", id)));
}

#[tokio::test]
async fn test_hard_delete_publishes_delete() {
    let fx = fixture().await;
    let mut branch = Branch::named("Temporary");
    fx.branches.create(&mut branch, &Preload::Default).await.unwrap();
    fx.branches.hard_delete(branch.audit.id).await.unwrap();

    fx.broker.wait_for(2, WAIT).await;
    let deleted = fx.broker.published_to(&format!("branch.delete.{}", branch.audit.id));
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].payload["name"], "Temporary");
}

#[tokio::test]
async fn test_nothing_is_published_before_commit() {
    let fx = fixture().await;
    let tx = fx.db.begin();
    let mut bank = Bank::new("Pending", None, 0);
    fx.banks.create_tx(&tx, &mut bank, &Preload::Default).await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(fx.broker.published().is_empty());

    tx.commit().await.unwrap();
    assert_eq!(fx.broker.wait_for(1, WAIT).await.len(), 1);
}

#[tokio::test]
async fn test_payload_reflects_state_at_commit() {
    let fx = fixture().await;
    let tx = fx.db.begin();
    let mut bank = Bank::new("Draft", None, 1);
    fx.banks.create_tx(&tx, &mut bank, &Preload::Default).await.unwrap();
    let id = bank.audit.id;

    let mut patch = Bank::new("Final", None, 0);
    fx.banks
        .update_by_id_tx(&tx, id, &mut patch, &Preload::None)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    fx.broker.wait_for(2, WAIT).await;
    let created = fx.broker.published_to(&format!("bank.create.{}", id));
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].payload["name"], "Final");
    let updated = fx.broker.published_to(&format!("bank.update.{}", id));
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].payload["name"], "Final");

    let stored = fx.banks.get_by_id(id, &Preload::Default).await.unwrap();
    let expected = serde_json::to_value(fx.banks.to_model(Some(&stored))).unwrap();
    assert_eq!(created[0].payload, expected);
}

#[tokio::test]
async fn test_rollback_and_drop_discard_notifications() {
    let fx = fixture().await;

    let tx = fx.db.begin();
    let mut rolled = Bank::new("Rolled", None, 0);
    fx.banks.create_tx(&tx, &mut rolled, &Preload::Default).await.unwrap();
    tx.rollback().await.unwrap();

    {
        let tx = fx.db.begin();
        let mut dropped = Bank::new("Dropped", None, 0);
        fx.banks.create_tx(&tx, &mut dropped, &Preload::Default).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fx.broker.published().is_empty());
    assert_eq!(fx.banks.count(&Filter::all()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_write_publishes_nothing() {
    let fx = fixture().await;
    let mut first = Bank::new("First", None, 0);
    first.audit.id = uuid::Uuid::new_v4();
    let mut second = Bank::new("Second", None, 0);
    second.audit.id = first.audit.id;
    let mut banks = vec![first, second];
    let err = fx.banks.create_many(&mut banks, &Preload::Default).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Store);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fx.broker.published().is_empty());
}

#[tokio::test]
async fn test_registry_without_topics_is_silent() {
    let fx = fixture().await;
    let mut ledger = Ledger::new("Quiet", 1);
    fx.ledgers.create(&mut ledger, &Preload::Default).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fx.broker.published().is_empty());
}

#[tokio::test]
async fn test_subscribers_receive_deliveries() {
    let fx = fixture().await;
    let mut receiver = fx.broker.subscribe();

    let mut branch = Branch::named("Streamed");
    fx.branches.create(&mut branch, &Preload::Default).await.unwrap();

    let delivery = tokio::time::timeout(WAIT, receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.topics[0], "branch.create");
}

struct FailingBroker {
    attempts: AtomicUsize,
}

#[async_trait]
impl Broker for FailingBroker {
    async fn dispatch(
        &self,
        _topics: &[String],
        _payload: &serde_json::Value,
    ) -> std::result::Result<(), BrokerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(BrokerError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn test_dispatch_failure_does_not_fail_the_write() {
    let broker = Arc::new(FailingBroker {
        attempts: AtomicUsize::new(0),
    });
    let fx = fixture_with_broker(broker.clone()).await;

    let mut bank = Bank::new("Resilient", None, 2);
    fx.banks.create(&mut bank, &Preload::Default).await.unwrap();
    assert!(fx.banks.exists_by_id(bank.audit.id).await.unwrap());

    for _ in 0..100 {
        if broker.attempts.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(broker.attempts.load(Ordering::SeqCst), 1);
}

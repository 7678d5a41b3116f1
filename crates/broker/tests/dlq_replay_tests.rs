// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Relay Contributors
//
// DLQ reading, replay, schema validation and role enforcement

use relay_broker::{
    BrokerError, DlqReason, MessageMetadata, PublishOptions, TopicConfig, TopicRegistry,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

#[tokio::test]
async fn test_publish_without_consumers_dead_letters() {
    let registry = TopicRegistry::in_memory();
    let topic = registry.create("t", TopicConfig::default()).await.unwrap();
    let producer = topic.create_producer().await;

    let results = producer
        .publish(vec![json!("void")], &PublishOptions::new())
        .await
        .unwrap();
    assert!(results[0].is_ok());

    let dlq = topic.create_dlq_consumer().await;
    let entry = dlq.reader().await.unwrap().next().await.unwrap();
    assert_eq!(entry.reason, DlqReason::NoConsumers);
    assert_eq!(entry.payload, json!("void"));
}

#[tokio::test]
async fn test_replay_removes_handled_entries() {
    let registry = TopicRegistry::in_memory();
    let topic = registry.create("t", TopicConfig::default()).await.unwrap();
    let producer = topic.create_producer().await;

    // Three messages dead-letter while no consumer exists
    producer
        .publish(vec![json!(1), json!(2), json!(3)], &PublishOptions::new())
        .await
        .unwrap();
    assert_eq!(topic.stats().await.dlq_messages, 3);

    let dlq = topic.create_dlq_consumer().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let collected = Arc::clone(&seen);
    let replayed = dlq
        .replay(
            move |payload, _meta| {
                let collected = Arc::clone(&collected);
                async move {
                    collected.lock().await.push(payload);
                    Ok(())
                }
            },
            None::<fn(&MessageMetadata, DlqReason) -> bool>,
        )
        .await
        .unwrap();

    assert_eq!(replayed, 3);
    assert_eq!(topic.stats().await.dlq_messages, 0);
    assert_eq!(seen.lock().await.len(), 3);
}

#[tokio::test]
async fn test_replay_with_filter_touches_matching_entries_only() {
    let registry = TopicRegistry::in_memory();
    let topic = registry.create("t", TopicConfig::default()).await.unwrap();
    let producer = topic.create_producer().await;

    let results = producer
        .publish(vec![json!(1), json!(2)], &PublishOptions::new())
        .await
        .unwrap();
    let keep = *results[0].as_ref().unwrap();

    let dlq = topic.create_dlq_consumer().await;
    let replayed = dlq
        .replay(
            |_payload, _meta| async move { Ok(()) },
            Some(move |meta: &MessageMetadata, _reason: DlqReason| meta.id != keep),
        )
        .await
        .unwrap();

    assert_eq!(replayed, 1);
    assert_eq!(topic.stats().await.dlq_messages, 1);
}

#[tokio::test]
async fn test_schema_validation_partial_batch() {
    let registry = TopicRegistry::in_memory();
    registry
        .schemas()
        .register(
            "order",
            &json!({
                "type": "object",
                "properties": { "id": { "type": "integer" } },
                "required": ["id"]
            }),
        )
        .await
        .unwrap();

    let config = TopicConfig {
        schema: Some("order".to_string()),
        ..Default::default()
    };
    let topic = registry.create("orders", config).await.unwrap();
    let consumer = topic.create_consumer(Default::default()).await;
    let producer = topic.create_producer().await;

    // One invalid payload fails alone; the batch continues
    let results = producer
        .publish(
            vec![json!({"id": 1}), json!({"nope": true}), json!({"id": 2})],
            &PublishOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(BrokerError::Validation(_))));
    assert!(results[2].is_ok());

    // The rejected payload is inspectable through the DLQ
    let dlq = topic.create_dlq_consumer().await;
    let entry = dlq.reader().await.unwrap().next().await.unwrap();
    assert_eq!(entry.reason, DlqReason::Validation);

    // Valid messages flow normally
    let first = consumer.consume(true).await.unwrap().unwrap();
    assert_eq!(first.payload, json!({"id": 1}));
}

#[tokio::test]
async fn test_role_enforcement() {
    let registry = TopicRegistry::in_memory();
    let topic = registry.create("t", TopicConfig::default()).await.unwrap();
    let producer = topic.create_producer().await;
    let consumer = topic.create_consumer(Default::default()).await;

    // A producer id cannot consume
    assert!(matches!(
        topic.consume(producer.id(), false).await,
        Err(BrokerError::TypeMismatch(_))
    ));
    // A consumer id cannot publish
    assert!(matches!(
        topic
            .publish(consumer.id(), vec![json!(1)], &PublishOptions::new())
            .await,
        Err(BrokerError::TypeMismatch(_))
    ));
    // A consumer id cannot open a DLQ reader
    assert!(matches!(
        topic.create_dlq_reader(consumer.id()).await,
        Err(BrokerError::TypeMismatch(_))
    ));
    // Unknown ids are NotFound
    assert!(matches!(
        topic.consume(4242, false).await,
        Err(BrokerError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_message_size_and_capacity_admission() {
    let registry = TopicRegistry::in_memory();
    let config = TopicConfig {
        max_message_size: Some(16),
        max_size_bytes: Some(64),
        ..Default::default()
    };
    let topic = registry.create("t", config).await.unwrap();
    let _consumer = topic.create_consumer(Default::default()).await;
    let producer = topic.create_producer().await;

    // Oversize message
    let big = json!("a-very-long-payload-exceeding-the-limit");
    let results = producer
        .publish(vec![big], &PublishOptions::new())
        .await
        .unwrap();
    assert!(matches!(results[0], Err(BrokerError::InvalidArgument(_))));

    // Cumulative capacity: small messages admit until lifetime bytes cross
    // the cap, and the cap never frees on consume
    let mut admitted = 0;
    for i in 0..20 {
        let results = producer
            .publish(vec![json!(format!("m-{:04}", i))], &PublishOptions::new())
            .await
            .unwrap();
        if results[0].is_ok() {
            admitted += 1;
        }
    }
    assert!(admitted > 0);
    assert!(admitted < 20);
}

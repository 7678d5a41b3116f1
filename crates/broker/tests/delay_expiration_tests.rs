// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Relay Contributors
//
// Delayed delivery and TTL expiration

use relay_broker::{DlqReason, PublishOptions, TopicConfig, TopicRegistry};
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test]
async fn test_delayed_message_is_invisible_until_due() {
    let registry = TopicRegistry::in_memory();
    let topic = registry.create("t", TopicConfig::default()).await.unwrap();
    let consumer = topic.create_consumer(Default::default()).await;
    let producer = topic.create_producer().await;

    producer
        .publish(vec![json!("later")], &PublishOptions::new().ttd_ms(200))
        .await
        .unwrap();

    // Before the delay elapses: parked, not queued
    assert!(consumer.consume(false).await.unwrap().is_none());
    let stats = topic.stats().await;
    assert_eq!(stats.delayed_messages, 1);
    assert_eq!(stats.queued_messages, 0);

    sleep(Duration::from_millis(350)).await;

    let message = consumer.consume(false).await.unwrap().unwrap();
    assert_eq!(message.payload, json!("later"));
    assert_eq!(message.metadata.need_acks, 1);
    consumer.ack(Some(message.metadata.id)).await.unwrap();

    let meta = topic
        .get_metadata(message.metadata.id)
        .await
        .unwrap()
        .unwrap();
    assert!(meta.consumed_at.is_some());
    assert_eq!(topic.stats().await.delayed_messages, 0);
}

#[tokio::test]
async fn test_earlier_delay_rearms_the_timer() {
    let registry = TopicRegistry::in_memory();
    let topic = registry.create("t", TopicConfig::default()).await.unwrap();
    let consumer = topic.create_consumer(Default::default()).await;
    let producer = topic.create_producer().await;

    producer
        .publish(vec![json!("slow")], &PublishOptions::new().ttd_ms(5_000))
        .await
        .unwrap();
    producer
        .publish(vec![json!("fast")], &PublishOptions::new().ttd_ms(100))
        .await
        .unwrap();

    sleep(Duration::from_millis(250)).await;

    // Only the earlier message is released
    let message = consumer.consume(true).await.unwrap().unwrap();
    assert_eq!(message.payload, json!("fast"));
    assert!(consumer.consume(true).await.unwrap().is_none());
    assert_eq!(topic.stats().await.delayed_messages, 1);
}

#[tokio::test]
async fn test_ttl_expiry_in_queue_dead_letters_unseen() {
    let registry = TopicRegistry::in_memory();
    let topic = registry.create("t", TopicConfig::default()).await.unwrap();
    let consumer = topic.create_consumer(Default::default()).await;
    let producer = topic.create_producer().await;

    let results = producer
        .publish(vec![json!("stale")], &PublishOptions::new().ttl_ms(50))
        .await
        .unwrap();
    let id = *results[0].as_ref().unwrap();

    // Nobody polls while the TTL lapses
    sleep(Duration::from_millis(120)).await;

    assert!(consumer.consume(false).await.unwrap().is_none());

    let stats = topic.stats().await;
    assert_eq!(stats.dlq_messages, 1);
    assert_eq!(stats.queued_messages, 0);
    assert_eq!(stats.pending_acks, 0);

    // Awaited acks are zeroed
    let meta = topic.get_metadata(id).await.unwrap().unwrap();
    assert_eq!(meta.need_acks, 0);
    assert!(meta.consumed_at.is_none());

    let dlq = topic.create_dlq_consumer().await;
    let reader = dlq.reader().await.unwrap();
    let entry = reader.next().await.unwrap();
    assert_eq!(entry.metadata.id, id);
    assert_eq!(entry.reason, DlqReason::Expired);
}

#[tokio::test]
async fn test_delay_outliving_ttl_expires_at_publish() {
    let registry = TopicRegistry::in_memory();
    let topic = registry.create("t", TopicConfig::default()).await.unwrap();
    let _consumer = topic.create_consumer(Default::default()).await;
    let producer = topic.create_producer().await;

    let results = producer
        .publish(
            vec![json!("doomed")],
            &PublishOptions::new().ttl_ms(100).ttd_ms(200),
        )
        .await
        .unwrap();
    assert!(results[0].is_ok());

    let stats = topic.stats().await;
    assert_eq!(stats.dlq_messages, 1);
    assert_eq!(stats.delayed_messages, 0);
    assert_eq!(stats.queued_messages, 0);
}

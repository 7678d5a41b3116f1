// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Relay Contributors
//
// Conservation accounting and subscription lifecycle

use relay_broker::{
    ClientActivity, ClientStatus, DlqReason, PublishOptions, SubscriptionOptions, TopicConfig,
    TopicRegistry,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test]
async fn test_every_published_message_is_accounted_for() {
    let registry = TopicRegistry::in_memory();
    let topic = registry.create("t", TopicConfig::default()).await.unwrap();
    let consumer = topic.create_consumer(Default::default()).await;
    let producer = topic.create_producer().await;

    // Two consumed and acked
    let mut completed = Vec::new();
    for i in 0..2 {
        let results = producer
            .publish(vec![json!({"n": i})], &PublishOptions::new())
            .await
            .unwrap();
        completed.push(*results[0].as_ref().unwrap());
    }
    for _ in 0..2 {
        let message = consumer.consume(false).await.unwrap().unwrap();
        consumer.ack(Some(message.metadata.id)).await.unwrap();
    }

    // One consumed but left pending
    producer
        .publish(vec![json!("pending")], &PublishOptions::new())
        .await
        .unwrap();
    consumer.consume(false).await.unwrap().unwrap();

    // One parked in the delayed queue
    producer
        .publish(vec![json!("parked")], &PublishOptions::new().ttd_ms(60_000))
        .await
        .unwrap();

    // One expired on arrival
    producer
        .publish(vec![json!("dead")], &PublishOptions::new().ttl_ms(0))
        .await
        .unwrap();

    // One still queued
    producer
        .publish(vec![json!("waiting")], &PublishOptions::new())
        .await
        .unwrap();

    let stats = topic.stats().await;
    assert_eq!(stats.metrics.messages_published, 6);

    let consumed = {
        let mut consumed = 0;
        for id in &completed {
            if topic
                .get_metadata(*id)
                .await
                .unwrap()
                .unwrap()
                .consumed_at
                .is_some()
            {
                consumed += 1;
            }
        }
        consumed
    };

    // published = consumed + dlq + delayed + queued + pending
    assert_eq!(consumed, 2);
    assert_eq!(stats.dlq_messages, 1);
    assert_eq!(stats.delayed_messages, 1);
    assert_eq!(stats.queued_messages, 1);
    assert_eq!(stats.pending_acks, 1);
    assert_eq!(
        stats.metrics.messages_published as usize,
        consumed
            + stats.dlq_messages
            + stats.delayed_messages
            + stats.queued_messages as usize
            + stats.pending_acks
    );
}

#[tokio::test]
async fn test_fanout_with_all_consumers_lagging_dead_letters() {
    let registry = TopicRegistry::in_memory();
    let topic = registry.create("t", TopicConfig::default()).await.unwrap();
    let consumer = topic.create_consumer(Default::default()).await;
    let producer = topic.create_producer().await;

    // The only consumer reports lagging and drops out of the fan-out set
    topic
        .record_client_activity(
            consumer.id(),
            ClientActivity {
                status: Some(ClientStatus::Lagging),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let results = producer
        .publish(vec![json!("nowhere")], &PublishOptions::new())
        .await
        .unwrap();
    assert!(results[0].is_ok());

    // The message must not vanish: published = consumed + dlq + delayed
    // + queued + pending still balances, with the message in the DLQ
    let stats = topic.stats().await;
    assert_eq!(stats.metrics.messages_published, 1);
    assert_eq!(stats.dlq_messages, 1);
    assert_eq!(stats.queued_messages, 0);
    assert_eq!(stats.delayed_messages, 0);
    assert_eq!(stats.pending_acks, 0);

    let dlq = topic.create_dlq_consumer().await;
    let entry = dlq.reader().await.unwrap().next().await.unwrap();
    assert_eq!(entry.reason, DlqReason::NoConsumers);
    assert_eq!(entry.payload, json!("nowhere"));
}

#[tokio::test]
async fn test_subscription_delivers_and_unsubscribes_cleanly() {
    let registry = TopicRegistry::in_memory();
    let topic = registry.create("t", TopicConfig::default()).await.unwrap();
    let consumer = topic.create_consumer(Default::default()).await;
    let producer = topic.create_producer().await;

    let handled = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&handled);
    let errored = Arc::clone(&errors);

    let subscription = consumer.subscribe(
        SubscriptionOptions {
            poll_interval_ms: 10,
            ..Default::default()
        },
        move |_payload, _meta| {
            let counted = Arc::clone(&counted);
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        },
        move |_err| {
            errored.fetch_add(1, Ordering::SeqCst);
        },
    );

    producer
        .publish(vec![json!(1), json!(2), json!(3)], &PublishOptions::new())
        .await
        .unwrap();

    sleep(Duration::from_millis(300)).await;
    assert_eq!(handled.load(Ordering::SeqCst), 3);
    assert_eq!(errors.load(Ordering::SeqCst), 0);

    // Handler acked each delivery, so nothing is pending
    assert_eq!(topic.stats().await.pending_acks, 0);

    // Clean stop, no error callback
    subscription.unsubscribe().await;
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_subscription_handler_failure_requeues() {
    let registry = TopicRegistry::in_memory();
    let config = TopicConfig {
        max_delivery_attempts: Some(2),
        ..Default::default()
    };
    let topic = registry.create("t", config).await.unwrap();
    let consumer = topic.create_consumer(Default::default()).await;
    let producer = topic.create_producer().await;

    let attempts_seen = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&attempts_seen);

    let subscription = consumer.subscribe(
        SubscriptionOptions {
            poll_interval_ms: 10,
            ..Default::default()
        },
        move |_payload, _meta| {
            let counted = Arc::clone(&counted);
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Err(relay_broker::BrokerError::Internal("handler broke".into()))
            }
        },
        |_err| {},
    );

    producer
        .publish(vec![json!("poison")], &PublishOptions::new())
        .await
        .unwrap();

    sleep(Duration::from_millis(400)).await;
    subscription.unsubscribe().await;

    // Delivered, nacked, redelivered, then dead-lettered by the attempts
    // check: exactly two handler invocations
    assert_eq!(attempts_seen.load(Ordering::SeqCst), 2);
    assert_eq!(topic.stats().await.dlq_messages, 1);
    assert_eq!(topic.stats().await.queued_messages, 0);
}

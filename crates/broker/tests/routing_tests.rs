// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Relay Contributors
//
// Routing-key filtering and correlation-id stickiness

use relay_broker::{ConsumerOptions, PublishOptions, TopicConfig, TopicRegistry};
use serde_json::json;
use std::collections::HashMap;

fn keys(keys: &[&str]) -> ConsumerOptions {
    ConsumerOptions {
        routing_keys: Some(keys.iter().map(|k| k.to_string()).collect()),
    }
}

#[tokio::test]
async fn test_routing_key_reaches_binded_and_unsubscribed_only() {
    let registry = TopicRegistry::in_memory();
    let topic = registry.create("t", TopicConfig::default()).await.unwrap();

    let red = topic.create_consumer(keys(&["red"])).await;
    let blue = topic.create_consumer(keys(&["blue"])).await;
    let open = topic.create_consumer(Default::default()).await;
    let producer = topic.create_producer().await;

    producer
        .publish(vec![json!("paint")], &PublishOptions::new().routing_key("red"))
        .await
        .unwrap();

    let to_red = red.consume(false).await.unwrap().unwrap();
    assert_eq!(to_red.metadata.need_acks, 2);
    assert_eq!(to_red.metadata.routing_key.as_deref(), Some("red"));

    let to_open = open.consume(false).await.unwrap().unwrap();
    assert_eq!(to_open.payload, json!("paint"));

    assert!(blue.consume(false).await.unwrap().is_none());
}

#[tokio::test]
async fn test_correlation_ids_stick_and_redistribute_on_removal() {
    let registry = TopicRegistry::in_memory();
    let topic = registry.create("t", TopicConfig::default()).await.unwrap();

    let consumers = [
        topic.create_consumer(Default::default()).await,
        topic.create_consumer(Default::default()).await,
        topic.create_consumer(Default::default()).await,
    ];
    let producer = topic.create_producer().await;

    async fn publish_round(producer: &relay_broker::Producer) {
        for i in 0..300u32 {
            let opts = PublishOptions::new().correlation_id(format!("user-{}", i % 10));
            producer.publish(vec![json!(i)], &opts).await.unwrap();
        }
    }
    publish_round(&producer).await;

    // Drain every consumer, recording which one owns each correlation id
    let mut owners: HashMap<String, u32> = HashMap::new();
    for consumer in &consumers {
        while let Some(message) = consumer.consume(true).await.unwrap() {
            let correlation = message.metadata.correlation_id.unwrap();
            let previous = owners.insert(correlation.clone(), consumer.id());
            if let Some(previous) = previous {
                assert_eq!(previous, consumer.id(), "{} moved consumers", correlation);
            }
        }
    }
    assert_eq!(owners.len(), 10);

    // Remove one consumer that owns at least one correlation id
    let victim = *owners.values().next().unwrap();
    topic.delete_client(victim).await.unwrap();

    publish_round(&producer).await;

    let mut owners_after: HashMap<String, u32> = HashMap::new();
    for consumer in consumers.iter().filter(|c| c.id() != victim) {
        while let Some(message) = consumer.consume(true).await.unwrap() {
            let correlation = message.metadata.correlation_id.unwrap();
            owners_after.insert(correlation, consumer.id());
        }
    }
    assert_eq!(owners_after.len(), 10);

    for (correlation, owner) in &owners_after {
        assert_ne!(*owner, victim);
        // Ids the survivors already owned must not move
        if owners[correlation] != victim {
            assert_eq!(owners[correlation], *owner, "{} moved", correlation);
        }
    }
}

#[tokio::test]
async fn test_unroutable_key_dead_letters() {
    let registry = TopicRegistry::in_memory();
    let topic = registry.create("t", TopicConfig::default()).await.unwrap();
    let _red = topic.create_consumer(keys(&["red"])).await;
    let producer = topic.create_producer().await;

    let results = producer
        .publish(
            vec![json!("nowhere")],
            &PublishOptions::new().routing_key("green"),
        )
        .await
        .unwrap();
    assert!(results[0].is_ok());

    let stats = topic.stats().await;
    assert_eq!(stats.dlq_messages, 1);
    assert_eq!(stats.queued_messages, 0);
}

#[tokio::test]
async fn test_correlation_honors_routing_key_first() {
    let registry = TopicRegistry::in_memory();
    let topic = registry.create("t", TopicConfig::default()).await.unwrap();

    let _open_a = topic.create_consumer(Default::default()).await;
    let _open_b = topic.create_consumer(Default::default()).await;
    let red = topic.create_consumer(keys(&["red"])).await;
    let producer = topic.create_producer().await;

    // Key first, hash second: every red message lands on the binded
    // consumer regardless of its correlation id
    for i in 0..20 {
        let opts = PublishOptions::new()
            .correlation_id(format!("user-{}", i))
            .routing_key("red");
        producer.publish(vec![json!(i)], &opts).await.unwrap();
    }

    let mut delivered = 0;
    while red.consume(true).await.unwrap().is_some() {
        delivered += 1;
    }
    assert_eq!(delivered, 20);
}

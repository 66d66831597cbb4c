#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hub::{memory_pair, message_types, Envelope, Hub, HubError, Topic};
use serde_json::json;

use common::{start_hub, test_config, wait_until};

const CHURNERS: usize = 8;
const ROUNDS: usize = 25;

/// Connect, subscribe everywhere, then leave one way or another.
async fn churn(hub: Hub, worker: usize) -> Result<(), HubError> {
    for round in 0..ROUNDS {
        let (conn, peer) = memory_pair();
        let id = hub.connect(conn, Some(format!("churn-{worker}"))).await?;
        for topic in Topic::ALL {
            // Publishers may evict the session before it finishes subscribing.
            let _ = hub.subscribe(id, topic);
        }
        tokio::task::yield_now().await;

        if round % 2 == 0 {
            hub.unregister(id).await?;
            for topic in Topic::ALL {
                assert!(!hub.is_subscribed(id, topic), "{id} still on {topic} after unregister");
            }
            assert!(hub.session_topics(id).is_none());
        }
        // Otherwise the read loop notices the peer is gone and tears the
        // session down.
        drop(peer);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_topic_membership_survives_churn() -> Result<(), Box<dyn Error>> {
    let hub = start_hub(test_config().with_outbound_capacity(4)).await?;
    let stop = Arc::new(AtomicBool::new(false));

    let mut publishers = Vec::new();
    for _ in 0..2 {
        let hub = hub.clone();
        let stop = stop.clone();
        publishers.push(tokio::spawn(async move {
            let envelope = Envelope::new(message_types::METRICS_UPDATE, json!({ "cpu": 0.5 }));
            while !stop.load(Ordering::Relaxed) {
                for topic in Topic::ALL {
                    hub.broadcast_to_topic(topic, &envelope);
                }
                hub.broadcast("cluster_heartbeat", json!({}));
                tokio::task::yield_now().await;
            }
        }));
    }

    let churners: Vec<_> = (0..CHURNERS)
        .map(|worker| tokio::spawn(churn(hub.clone(), worker)))
        .collect();
    for churner in churners {
        churner.await??;
    }

    stop.store(true, Ordering::Relaxed);
    for publisher in publishers {
        publisher.await?;
    }

    assert!(wait_until(|| hub.session_count() == 0).await);
    let stats = hub.stats();
    assert_eq!(stats.active_connections, 0);
    assert_eq!(stats.total_connections, (CHURNERS * ROUNDS) as u64);
    for topic in Topic::ALL {
        assert!(hub.subscriber_count(topic) as u64 <= stats.active_connections);
    }
    assert_eq!(stats.topics_count, 0);
    assert!(hub.active_topics().is_empty());

    // Nothing is left behind for a newcomer to trip over.
    let (conn, mut peer) = memory_pair();
    let id = hub.connect(conn, None).await?;
    hub.subscribe(id, Topic::Jobs)?;
    assert_eq!(hub.subscriber_count(Topic::Jobs), 1);
    let welcome = tokio::time::timeout(Duration::from_secs(5), peer.next_message()).await?;
    assert_eq!(welcome.ok_or("closed")?["type"], message_types::WELCOME);
    Ok(())
}

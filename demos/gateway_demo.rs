//! Live demo of the inference admission gate.
//!
//! Simulates an LLM gateway under mixed load: a handful of streaming users
//! (RT) and batch summarizers (BE) contend for two execution slots, with
//! preemption enabled, guaranteed BE bandwidth, and a periodic status and
//! leak sweep.
//!
//! Run with:
//!   cargo run --example gateway_demo

use std::time::Duration;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::RngExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use inference_gate::{GateConfig, HybridPrioritySemaphore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present (not required)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inference_gate=info,gateway_demo=info".into()),
        )
        .init();

    // Env-driven config with demo-friendly overrides: short aging windows so
    // promotion and guaranteed bandwidth fire within the run.
    let config = GateConfig {
        total_slots: 2,
        rt_reserved_slots: 1,
        aging_threshold_secs: 2.0,
        aging_boost: 30.0,
        promotion_threshold_secs: 6.0,
        preemption_enabled: true,
        guaranteed_be_ratio: 3,
        ..GateConfig::from_env()
    };
    let gate = HybridPrioritySemaphore::new(config)?;

    let mut workers = Vec::new();
    for user in 0..3usize {
        workers.push(tokio::spawn(stream_user(gate.clone(), user)));
    }
    for worker in 0..2usize {
        workers.push(tokio::spawn(batch_worker(gate.clone(), worker)));
    }

    // The gateway's monitoring loop: status snapshot + leak sweep.
    let monitor_gate = gate.clone();
    let monitor = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(2));
        loop {
            interval.tick().await;
            let status = monitor_gate.queue_status().await;
            info!(
                status = %serde_json::to_string(&status).unwrap_or_default(),
                "gate status"
            );
            for leak in monitor_gate.check_leaks().await {
                warn!(
                    slot_id = leak.slot_id,
                    held_for_seconds = leak.held_for_seconds,
                    context = leak.context,
                    "slot held suspiciously long"
                );
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(12)).await;

    monitor.abort();
    for worker in &workers {
        worker.abort();
    }

    let status = gate.queue_status().await;
    info!(
        available = status.available_slots,
        acquired = status.acquired_slots,
        "demo finished"
    );
    Ok(())
}

/// Interactive streaming user: frequent short requests, RT class.
async fn stream_user(gate: HybridPrioritySemaphore, user: usize) {
    let mut rng: StdRng = rand::make_rng();
    loop {
        tokio::time::sleep(Duration::from_millis(rng.random_range(200..=900))).await;

        let grant = match gate.acquire(true).await {
            Ok(grant) => grant,
            Err(err) => {
                warn!(user, error = %err, "stream rejected");
                continue;
            }
        };
        info!(
            user,
            waited_ms = (grant.wait_seconds * 1000.0) as u64,
            "stream admitted"
        );

        // Token generation.
        tokio::time::sleep(Duration::from_millis(rng.random_range(300..=800))).await;
        gate.release(true, Some(grant.slot_id)).await;
    }
}

/// Batch summarizer: long-running BE work that honors preemption.
async fn batch_worker(gate: HybridPrioritySemaphore, worker: usize) {
    let mut rng: StdRng = rand::make_rng();
    loop {
        tokio::time::sleep(Duration::from_millis(rng.random_range(100..=400))).await;

        let grant = match gate.acquire(false).await {
            Ok(grant) => grant,
            Err(err) => {
                warn!(worker, error = %err, "batch rejected");
                continue;
            }
        };
        info!(
            worker,
            waited_ms = (grant.wait_seconds * 1000.0) as u64,
            "batch admitted"
        );

        let task_id = format!("batch-{worker}-{}", grant.slot_id);
        let cancel = CancellationToken::new();
        gate.register_active_request(&task_id, cancel.clone(), false)
            .await;

        let work = Duration::from_millis(rng.random_range(1500..=4000));
        tokio::select! {
            _ = cancel.cancelled() => {
                warn!(worker, task_id = %task_id, "batch preempted, retrying later");
            }
            _ = tokio::time::sleep(work) => {
                info!(worker, task_id = %task_id, "batch finished");
            }
        }

        gate.unregister_active_request(&task_id).await;
        gate.release(false, Some(grant.slot_id)).await;
    }
}

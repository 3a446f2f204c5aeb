//! rebound demo - 動作確認用のデモ
//!
//! 1. workers contend for one `SemaphoreLock` through `LockCoordinator`
//! 2. a consumer with a failing handler goes through the dead-letter
//!    round trip on `InMemoryBroker` until the fallback parks the message
//!
//! Usage: `rebound-cli [config.json]` (RUST_LOG=debug for attempt-level logs)

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use rebound_core::domain::{Decision, Delivery, ErrorKind};
use rebound_core::impls::{InMemoryBroker, SemaphoreLock};
use rebound_core::ports::DeliveryChannel;
use rebound_core::{CoordinatorConfig, LockCoordinator, RedeliveryCoordinator, RetryRoute};

const WORKERS: usize = 4;
const ROUNDS_PER_WORKER: u32 = 5;
const GRACE: Duration = Duration::from_secs(30);

/// Counters shared by the workers. `entries` is only written under the lock.
#[derive(Default)]
struct Ledger {
    entries: AtomicU64,
    exhausted: AtomicU64,
}

/// Worker group handle.
/// - `request_shutdown()` interrupts workers waiting for the lock
/// - `join()` waits for the workers, interrupting stragglers after a grace period
struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    fn spawn(n: usize, lock: Arc<SemaphoreLock>, coordinator: LockCoordinator, ledger: Arc<Ledger>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let coordinator = coordinator.with_interrupt(shutdown_rx);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let lock = Arc::clone(&lock);
            let ledger = Arc::clone(&ledger);
            let coordinator = coordinator.clone();

            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, &lock, &coordinator, &ledger).await;
            }));
        }

        Self { shutdown_tx, joins }
    }

    /// Interrupt workers that are still waiting for the lock.
    fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for every worker; once `grace` has passed, interrupt the rest.
    async fn join(mut self, grace: Duration) {
        let interrupt = tokio::time::sleep(grace);
        tokio::pin!(interrupt);

        for mut join in std::mem::take(&mut self.joins) {
            let joined = tokio::select! {
                joined = &mut join => joined,
                _ = &mut interrupt, if !*self.shutdown_tx.borrow() => {
                    warn!("grace period over; interrupting lock waits");
                    self.request_shutdown();
                    join.await
                }
            };
            if let Err(e) = joined {
                warn!(error = %e, "worker task failed");
            }
        }
    }
}

async fn worker_loop(worker_id: usize, lock: &SemaphoreLock, coordinator: &LockCoordinator, ledger: &Ledger) {
    for round in 0..ROUNDS_PER_WORKER {
        let result = coordinator
            .run_exclusive(lock, || async {
                // critical section: read-modify-write with a pause in between
                let seen = ledger.entries.load(Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                ledger.entries.store(seen + 1, Ordering::SeqCst);
                Ok::<_, std::convert::Infallible>(seen + 1)
            })
            .await;

        match result {
            Ok(entry) => info!(worker_id, round, entry, "ledger entry written"),
            Err(err) if err.kind() == ErrorKind::RetryExhausted => {
                ledger.exhausted.fetch_add(1, Ordering::SeqCst);
                warn!(worker_id, round, "gave up on the lock this round");
            }
            Err(err) if err.kind() == ErrorKind::InterruptedDuringAcquire => break,
            Err(err) => warn!(worker_id, round, error = %err, "round failed"),
        }
    }
}

/// Fails every message whose body is `poison`.
fn handle(message: &Delivery) -> Result<(), String> {
    if message.body() == b"poison" {
        return Err("cannot process poison message".to_string());
    }
    Ok(())
}

async fn consume(
    broker: &InMemoryBroker,
    coordinator: &RedeliveryCoordinator,
    route: &RetryRoute,
) -> Result<Vec<serde_json::Value>, Box<dyn Error>> {
    let parked = AtomicU64::new(0);
    let mut resolutions = Vec::new();

    while let Some(message) = broker.next_delivery().await {
        if let Err(reason) = handle(&message) {
            warn!(tag = %message.tag(), %reason, "handler failed");
            let resolution = coordinator
                .retry_or_else(broker, broker, &message, route, || async {
                    parked.fetch_add(1, Ordering::SeqCst);
                    info!(tag = %message.tag(), "retries exhausted; message parked");
                    Ok::<_, std::convert::Infallible>(())
                })
                .await?;

            if let Decision::Republish { destination, .. } = &resolution.decision {
                broker.expire(destination, "orders.delay").await;
            }
            resolutions.push(json!({
                "tag": message.tag(),
                "attempts": coordinator.record(&message).attempt_count,
                "resolution": serde_json::to_value(&resolution)?,
            }));
        } else {
            broker.ack(message.tag(), false).await?;
            info!(tag = %message.tag(), "processed");
        }
    }

    info!(parked = parked.load(Ordering::SeqCst), "consumer drained");
    Ok(resolutions)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => CoordinatorConfig::from_path(path)?,
        None => CoordinatorConfig::default(),
    };
    info!(lock_policy = %config.lock, "starting");

    // (A) lock contention
    let lock = Arc::new(SemaphoreLock::new());
    let ledger = Arc::new(Ledger::default());
    let group = WorkerGroup::spawn(WORKERS, Arc::clone(&lock), config.lock_coordinator(), Arc::clone(&ledger));
    group.join(GRACE).await;

    let lock_summary = json!({
        "entries": ledger.entries.load(Ordering::SeqCst),
        "exhausted_rounds": ledger.exhausted.load(Ordering::SeqCst),
        "grants": lock.grants(),
        "releases": lock.releases(),
    });

    // (B) dead-letter round trip
    let broker = InMemoryBroker::new();
    broker.enqueue("orders", "orders.created", b"hello".to_vec()).await;
    broker.enqueue("orders", "orders.created", b"poison".to_vec()).await;

    let coordinator = config.redelivery_coordinator();
    let route = RetryRoute::to("orders.retry");
    let resolutions = consume(&broker, &coordinator, &route).await?;

    let summary = json!({
        "lock": lock_summary,
        "redelivery": resolutions,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

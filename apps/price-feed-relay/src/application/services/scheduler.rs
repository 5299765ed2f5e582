//! Publish Scheduler
//!
//! A fixed-period loop that turns the current price cache into a ledger
//! record. Each cycle:
//!
//! 1. snapshots the cache,
//! 2. encodes the snapshot with the current Unix timestamp,
//! 3. assigns a record id from the current time in milliseconds,
//! 4. submits the record,
//! 5. waits (bounded by `receipt_timeout`) for the confirmation,
//! 6. logs the outcome,
//! 7. sleeps `interval` and starts over.
//!
//! Cycles never overlap: the next snapshot is taken only after the previous
//! cycle finished. A failed cycle is logged and skipped; the loop always
//! continues until the cancellation token fires.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::clock::Clock;
use super::registrar::SchemaRegistrar;
use crate::application::ports::{
    LedgerError, LedgerPort, NoopMetrics, Receipt, RecordSubmission, RelayMetrics, TxHash,
};
use crate::domain::prices::PriceCache;
use crate::domain::record::{EncodeError, Record, RecordId, RecordIdGenerator};
use crate::domain::schema::{FieldSchema, SchemaId};

// =============================================================================
// Configuration
// =============================================================================

/// Timing configuration for the publish loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pause between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Delay before the first cycle.
    pub initial_delay: Duration,
    /// Upper bound on the wait for a submission receipt.
    pub receipt_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            initial_delay: Duration::from_secs(5),
            receipt_timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// A record confirmed on the ledger.
#[derive(Debug, Clone)]
pub struct PublishedRecord {
    /// The submitted record.
    pub record: Record,
    /// Submission transaction.
    pub tx_hash: TxHash,
    /// Confirmation receipt.
    pub receipt: Receipt,
}

/// Why a publish cycle failed.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The snapshot could not be encoded.
    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),
    /// The ledger rejected the submission.
    #[error("submission failed: {0}")]
    Submit(#[source] LedgerError),
    /// Waiting for the receipt failed.
    #[error("receipt wait failed for {tx_hash}: {source}")]
    Receipt {
        /// Submitted transaction.
        tx_hash: TxHash,
        /// Underlying error.
        #[source]
        source: LedgerError,
    },
    /// No receipt within the configured bound.
    #[error("no receipt for {tx_hash} within {timeout:?}")]
    ReceiptTimeout {
        /// Submitted transaction.
        tx_hash: TxHash,
        /// Configured bound.
        timeout: Duration,
    },
    /// The transaction was mined but reverted.
    #[error("submission {0} reverted")]
    Reverted(TxHash),
}

impl PublishError {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Encode(_) => "encode",
            Self::Submit(_) => "submit",
            Self::Receipt { .. } => "receipt",
            Self::ReceiptTimeout { .. } => "receipt_timeout",
            Self::Reverted(_) => "reverted",
        }
    }
}

/// Result of one scheduler tick.
#[derive(Debug)]
pub enum PublishCycleOutcome {
    /// Record submitted and confirmed.
    Confirmed(Box<PublishedRecord>),
    /// The cycle failed; the next cycle runs as usual.
    Failed(PublishError),
}

impl PublishCycleOutcome {
    /// Whether the cycle confirmed a record.
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Publish counters shared with the health endpoint.
#[derive(Debug, Default)]
pub struct PublishStats {
    confirmed: AtomicU64,
    failed: AtomicU64,
    last_failed: AtomicBool,
    last_record_id: RwLock<Option<RecordId>>,
    last_error: RwLock<Option<String>>,
}

impl PublishStats {
    /// Create empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Confirmed cycles.
    #[must_use]
    pub fn confirmed(&self) -> u64 {
        self.confirmed.load(Ordering::Relaxed)
    }

    /// Failed cycles.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Whether the most recent cycle failed.
    #[must_use]
    pub fn last_cycle_failed(&self) -> bool {
        self.last_failed.load(Ordering::Relaxed)
    }

    /// Id of the last confirmed record.
    #[must_use]
    pub fn last_record_id(&self) -> Option<RecordId> {
        *self.last_record_id.read()
    }

    /// Message of the most recent failure.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn record(&self, outcome: &PublishCycleOutcome) {
        match outcome {
            PublishCycleOutcome::Confirmed(published) => {
                self.confirmed.fetch_add(1, Ordering::Relaxed);
                self.last_failed.store(false, Ordering::Relaxed);
                *self.last_record_id.write() = Some(published.record.id);
            }
            PublishCycleOutcome::Failed(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.last_failed.store(true, Ordering::Relaxed);
                *self.last_error.write() = Some(e.to_string());
            }
        }
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Periodic publisher of price records.
pub struct PublishScheduler {
    config: SchedulerConfig,
    cache: Arc<PriceCache>,
    schema: Arc<FieldSchema>,
    schema_id: SchemaId,
    registrar: Arc<SchemaRegistrar>,
    ledger: Arc<dyn LedgerPort>,
    clock: Arc<dyn Clock>,
    ids: Mutex<RecordIdGenerator>,
    stats: Arc<PublishStats>,
    metrics: Arc<dyn RelayMetrics>,
}

impl PublishScheduler {
    /// Create a scheduler.
    #[must_use]
    pub fn new(
        config: SchedulerConfig,
        cache: Arc<PriceCache>,
        schema: Arc<FieldSchema>,
        registrar: Arc<SchemaRegistrar>,
        ledger: Arc<dyn LedgerPort>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let schema_id = schema.id();
        Self {
            config,
            cache,
            schema,
            schema_id,
            registrar,
            ledger,
            clock,
            ids: Mutex::new(RecordIdGenerator::new()),
            stats: Arc::new(PublishStats::new()),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Report cycle outcomes and durations to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn RelayMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Shared publish statistics.
    #[must_use]
    pub fn stats(&self) -> Arc<PublishStats> {
        Arc::clone(&self.stats)
    }

    /// Run cycles until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            interval_ms = self.config.interval.as_millis(),
            initial_delay_ms = self.config.initial_delay.as_millis(),
            schema_id = %self.schema_id,
            "Publish scheduler started"
        );

        if !sleep_or_cancel(self.config.initial_delay, &cancel).await {
            tracing::info!("Publish scheduler cancelled before first cycle");
            return;
        }

        loop {
            let tick = async {
                self.registrar.ensure_registered().await;
                self.run_cycle().await
            };

            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Publish scheduler cancelled during cycle");
                    return;
                }
                outcome = tick => log_outcome(&outcome),
            }

            if !sleep_or_cancel(self.config.interval, &cancel).await {
                tracing::info!("Publish scheduler stopped");
                return;
            }
        }
    }

    /// Execute one publish cycle.
    pub async fn run_cycle(&self) -> PublishCycleOutcome {
        let started = Instant::now();
        let outcome = match self.publish().await {
            Ok(published) => PublishCycleOutcome::Confirmed(Box::new(published)),
            Err(e) => PublishCycleOutcome::Failed(e),
        };

        self.stats.record(&outcome);
        let label = match &outcome {
            PublishCycleOutcome::Confirmed(_) => "confirmed",
            PublishCycleOutcome::Failed(e) => e.label(),
        };
        self.metrics.publish_cycle(label, started.elapsed());
        outcome
    }

    async fn publish(&self) -> Result<PublishedRecord, PublishError> {
        let snapshot = self.cache.snapshot();
        let timestamp = self.clock.unix_seconds();
        let id = self.ids.lock().next_id(self.clock.unix_millis());

        let record = Record::build(id, &self.schema, self.schema_id, &snapshot, timestamp)?;
        let submission = RecordSubmission::from(&record);

        let tx_hash = self
            .ledger
            .submit_records(std::slice::from_ref(&submission))
            .await
            .map_err(PublishError::Submit)?;

        let receipt = match tokio::time::timeout(
            self.config.receipt_timeout,
            self.ledger.wait_for_receipt(&tx_hash),
        )
        .await
        {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(source)) => return Err(PublishError::Receipt { tx_hash, source }),
            Err(_) => {
                return Err(PublishError::ReceiptTimeout {
                    tx_hash,
                    timeout: self.config.receipt_timeout,
                });
            }
        };

        if !receipt.success {
            return Err(PublishError::Reverted(tx_hash));
        }

        Ok(PublishedRecord {
            record,
            tx_hash,
            receipt,
        })
    }
}

/// Sleep for `duration`; returns `false` if cancelled first.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

fn log_outcome(outcome: &PublishCycleOutcome) {
    match outcome {
        PublishCycleOutcome::Confirmed(published) => {
            let prices: Vec<String> = published
                .record
                .prices
                .iter()
                .map(|(symbol, value)| format!("{symbol}={value}"))
                .collect();
            tracing::info!(
                record_id = %published.record.id,
                timestamp = published.record.timestamp,
                tx_hash = %published.tx_hash,
                block = published.receipt.block_number,
                prices = %prices.join(","),
                "Stored prices on-chain"
            );
        }
        PublishCycleOutcome::Failed(e) => {
            tracing::warn!(error = %e, kind = e.label(), "Publish cycle failed, skipping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{LedgerErrorKind, MockLedgerPort};
    use crate::application::services::clock::ManualClock;
    use crate::domain::record::{Word, decode};
    use crate::domain::symbols::TrackedSymbols;

    struct Fixture {
        cache: Arc<PriceCache>,
        schema: Arc<FieldSchema>,
        clock: Arc<ManualClock>,
    }

    fn fixture(symbols: &[&str]) -> Fixture {
        let tracked = Arc::new(TrackedSymbols::new(symbols).unwrap());
        Fixture {
            cache: Arc::new(PriceCache::new(Arc::clone(&tracked))),
            schema: Arc::new(FieldSchema::for_symbols(&tracked)),
            clock: Arc::new(ManualClock::at_millis(1_700_000_000_000)),
        }
    }

    fn scheduler(fx: &Fixture, ledger: MockLedgerPort) -> PublishScheduler {
        let ledger: Arc<dyn LedgerPort> = Arc::new(ledger);
        let registrar = Arc::new(SchemaRegistrar::new(
            Arc::clone(&ledger),
            &fx.schema,
            "test",
            Duration::from_secs(1),
        ));
        PublishScheduler::new(
            SchedulerConfig {
                interval: Duration::from_secs(5),
                initial_delay: Duration::from_secs(5),
                receipt_timeout: Duration::from_secs(2),
            },
            Arc::clone(&fx.cache),
            Arc::clone(&fx.schema),
            registrar,
            ledger,
            Arc::clone(&fx.clock) as Arc<dyn Clock>,
        )
    }

    fn ok_receipt(hash: &TxHash) -> Receipt {
        Receipt {
            tx_hash: hash.clone(),
            block_number: 1,
            success: true,
        }
    }

    #[tokio::test]
    async fn cycle_submits_encoded_snapshot() {
        let fx = fixture(&["BTC", "ETH"]);
        fx.cache.set("BTC", 50_000.123_456);
        fx.cache.set("ETH", 3000.0);

        let schema = Arc::clone(&fx.schema);
        let mut ledger = MockLedgerPort::new();
        ledger
            .expect_submit_records()
            .times(1)
            .withf(move |records| {
                let decoded = decode(&schema, &records[0].payload).unwrap();
                records.len() == 1
                    && records[0].schema_id == schema.id()
                    && records[0].id.millis() == Some(1_700_000_000_000)
                    && decoded.values()
                        == vec![
                            Word::from(50_000_123_455_999_997_640_704_u128),
                            Word::from(3_000_000_000_000_000_000_000_u128),
                            Word::from(1_700_000_000_u64),
                        ]
            })
            .returning(|_| Ok(TxHash("0x01".to_string())));
        ledger
            .expect_wait_for_receipt()
            .returning(|hash| Ok(ok_receipt(hash)));

        let scheduler = scheduler(&fx, ledger);
        let outcome = scheduler.run_cycle().await;

        assert!(outcome.is_confirmed());
        assert_eq!(scheduler.stats().confirmed(), 1);
        assert_eq!(
            scheduler.stats().last_record_id().and_then(|id| id.millis()),
            Some(1_700_000_000_000)
        );
    }

    #[tokio::test]
    async fn failed_submission_does_not_stop_next_cycle() {
        let fx = fixture(&["BTC"]);
        fx.cache.set("BTC", 1.5);

        let mut ledger = MockLedgerPort::new();
        let mut calls = 0;
        ledger.expect_submit_records().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(LedgerError::new(LedgerErrorKind::Transport, "timeout"))
            } else {
                Ok(TxHash("0x02".to_string()))
            }
        });
        ledger
            .expect_wait_for_receipt()
            .times(1)
            .returning(|hash| Ok(ok_receipt(hash)));

        let scheduler = scheduler(&fx, ledger);

        let first = scheduler.run_cycle().await;
        assert!(matches!(first, PublishCycleOutcome::Failed(PublishError::Submit(_))));
        assert_eq!(fx.cache.get("BTC"), 1.5);

        fx.clock.advance_millis(5_000);
        let second = scheduler.run_cycle().await;
        assert!(second.is_confirmed());

        let stats = scheduler.stats();
        assert_eq!((stats.confirmed(), stats.failed()), (1, 1));
        assert!(stats.last_error().unwrap().contains("submission failed"));
    }

    #[tokio::test]
    async fn reverted_submission_is_a_failure() {
        let fx = fixture(&["BTC"]);
        let mut ledger = MockLedgerPort::new();
        ledger
            .expect_submit_records()
            .returning(|_| Ok(TxHash("0x03".to_string())));
        ledger.expect_wait_for_receipt().returning(|hash| {
            Ok(Receipt {
                tx_hash: hash.clone(),
                block_number: 9,
                success: false,
            })
        });

        let outcome = scheduler(&fx, ledger).run_cycle().await;
        assert!(matches!(
            outcome,
            PublishCycleOutcome::Failed(PublishError::Reverted(_))
        ));
    }

    #[derive(Debug, Default)]
    struct CycleLabels(Mutex<Vec<String>>);

    impl RelayMetrics for CycleLabels {
        fn publish_cycle(&self, outcome: &str, _elapsed: Duration) {
            self.0.lock().push(outcome.to_string());
        }
    }

    #[tokio::test]
    async fn cycle_outcomes_reach_the_metrics_sink() {
        let fx = fixture(&["BTC"]);
        let mut ledger = MockLedgerPort::new();
        let mut calls = 0;
        ledger.expect_submit_records().returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(TxHash("0x06".to_string()))
            } else {
                Err(LedgerError::new(LedgerErrorKind::Rejected, "nonce too low"))
            }
        });
        ledger
            .expect_wait_for_receipt()
            .returning(|hash| Ok(ok_receipt(hash)));

        let labels = Arc::new(CycleLabels::default());
        let scheduler =
            scheduler(&fx, ledger).with_metrics(Arc::clone(&labels) as Arc<dyn RelayMetrics>);
        scheduler.run_cycle().await;
        scheduler.run_cycle().await;

        assert_eq!(*labels.0.lock(), vec!["confirmed", "submit"]);
    }

    #[tokio::test]
    async fn record_ids_differ_even_without_clock_progress() {
        let fx = fixture(&["BTC"]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut ledger = MockLedgerPort::new();
        ledger.expect_submit_records().returning(move |records| {
            sink.lock().push(records[0].id);
            Ok(TxHash("0x04".to_string()))
        });
        ledger
            .expect_wait_for_receipt()
            .returning(|hash| Ok(ok_receipt(hash)));

        let scheduler = scheduler(&fx, ledger);
        scheduler.run_cycle().await;
        scheduler.run_cycle().await;

        let ids = seen.lock();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_waits_initial_delay_and_stops_on_cancel() {
        let fx = fixture(&["BTC"]);
        let mut ledger = MockLedgerPort::new();
        ledger
            .expect_register_schema()
            .returning(|_| Err(LedgerError::new(LedgerErrorKind::AlreadyRegistered, "exists")));
        ledger
            .expect_submit_records()
            .times(2)
            .returning(|_| Ok(TxHash("0x05".to_string())));
        ledger
            .expect_wait_for_receipt()
            .returning(|hash| Ok(ok_receipt(hash)));

        let scheduler = Arc::new(scheduler(&fx, ledger));
        let stats = scheduler.stats();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&scheduler).run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(stats.confirmed(), 0);

        // First cycle at 5s, second at 10s.
        tokio::time::sleep(Duration::from_millis(5_200)).await;
        assert_eq!(stats.confirmed(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }
}

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use crate::{
    db::{Database, MoveRecord, WeightRecord},
    error::{MoveError, RejectReason, ScanRejection},
    moves::{MoveApplier, MoveOutcome},
    scan::{
        source::{InFlightScans, RawScan},
        Admission, Debouncer, ScanClassifier, ScanEvent, ScanKind,
    },
    settings::StationConfig,
};

use super::state::{Correlation, CorrelationEngine, PairingSnapshot};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notifications for the presenter.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StationEvent {
    ScanRejected {
        reason: ScanRejection,
    },
    PairingStarted {
        kind: ScanKind,
        code: String,
    },
    PairingTimeout {
        kind: ScanKind,
        code: String,
    },
    PairingCancelled {
        kind: ScanKind,
        code: String,
    },
    MoveApplied {
        record: MoveRecord,
    },
    MoveUnchanged {
        #[serde(rename = "spoolId")]
        spool_id: String,
        #[serde(rename = "locationId")]
        location_id: String,
    },
    MoveRejected {
        reason: RejectReason,
    },
    RegistryFailure {
        message: String,
    },
}

impl StationEvent {
    fn timed_out(event: ScanEvent) -> Self {
        StationEvent::PairingTimeout {
            kind: event.kind,
            code: event.code,
        }
    }

    fn from_outcome(outcome: &MoveOutcome) -> Self {
        match outcome {
            MoveOutcome::Applied(record) => StationEvent::MoveApplied {
                record: record.clone(),
            },
            MoveOutcome::Unchanged {
                spool_id,
                location_id,
            } => StationEvent::MoveUnchanged {
                spool_id: spool_id.clone(),
                location_id: location_id.clone(),
            },
        }
    }

    fn from_error(err: &MoveError) -> Self {
        match err {
            MoveError::Rejected(reason) => StationEvent::MoveRejected {
                reason: reason.clone(),
            },
            MoveError::Registry(source) => StationEvent::RegistryFailure {
                message: format!("{source:#}"),
            },
        }
    }
}

struct Pipeline {
    classifier: ScanClassifier,
    debouncer: Debouncer,
    engine: CorrelationEngine,
    /// Last admitted spool scan; the target of `!weigh <grams>` and `!open`.
    current_spool: Option<String>,
}

/// Owns the scan pipeline for the life of the process.
///
/// The pipeline lock is held from classification through the registry commit, so
/// scans are handled strictly one at a time in arrival order.
#[derive(Clone)]
pub struct StationController {
    pipeline: Arc<Mutex<Pipeline>>,
    applier: MoveApplier,
    db: Database,
    events: broadcast::Sender<StationEvent>,
    in_flight: InFlightScans,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
}

impl StationController {
    pub fn new(config: &StationConfig, db: Database) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            pipeline: Arc::new(Mutex::new(Pipeline {
                classifier: ScanClassifier::new(config),
                debouncer: Debouncer::new(config.quiet_period()),
                engine: CorrelationEngine::new(config.pair_window()),
                current_spool: None,
            })),
            applier: MoveApplier::new(db.clone(), config.provisioning()),
            db,
            events,
            in_flight: InFlightScans::default(),
            ticker: Arc::new(Mutex::new(None)),
            tick_interval: config.tick_interval(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StationEvent> {
        self.events.subscribe()
    }

    #[cfg(test)]
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn in_flight(&self) -> &InFlightScans {
        &self.in_flight
    }

    /// Stamps a payload read from the scanner; hand the result to `handle_scan`.
    pub fn capture(&self, payload: impl Into<String>) -> RawScan {
        self.in_flight.capture(payload)
    }

    /// Current pairing state. A scan whose window has run out is expired first.
    pub async fn snapshot(&self) -> PairingSnapshot {
        let now = Instant::now();
        self.expire_pending(now).await;
        self.pipeline.lock().await.engine.snapshot(now)
    }

    pub async fn current_spool(&self) -> Option<String> {
        self.pipeline.lock().await.current_spool.clone()
    }

    /// Runs one raw payload through classify → debounce → correlate → apply.
    ///
    /// Returns the notifications it produced (also broadcast to subscribers). A
    /// registry failure is returned as an error after the pairing state is reset.
    pub async fn handle_scan(
        &self,
        raw_payload: &str,
        observed_at: Instant,
        captured_at: DateTime<Utc>,
    ) -> Result<Vec<StationEvent>> {
        let mut pipeline = self.pipeline.lock().await;
        self.in_flight.settle(observed_at);
        let mut produced = Vec::new();

        let event = match pipeline
            .classifier
            .classify(raw_payload, observed_at, captured_at)
        {
            Ok(event) => event,
            Err(reason) => {
                warn!("Ignoring scan: {reason}");
                produced.push(StationEvent::ScanRejected { reason });
                return Ok(self.publish(produced));
            }
        };

        let event = match pipeline.debouncer.admit(event) {
            Admission::Admitted(event) => event,
            Admission::Suppressed(event) => {
                debug!("Suppressed repeat scan of {}", event.code);
                return Ok(produced);
            }
        };

        if event.kind == ScanKind::Spool {
            if let Err(err) = self
                .applier
                .provision_scanned_spool(&event.code, event.captured_at)
                .await
            {
                error!("Registering scanned spool {} failed: {err:#}", event.code);
                pipeline.engine.cancel();
                produced.push(StationEvent::RegistryFailure {
                    message: format!("{err:#}"),
                });
                self.publish(produced);
                return Err(err);
            }
            pipeline.current_spool = Some(event.code.clone());
        }

        let observation = pipeline.engine.observe(event);

        if let Some(expired) = observation.expired {
            info!("Pairing window missed for {} {}", expired.kind.as_str(), expired.code);
            produced.push(StationEvent::timed_out(expired));
        }

        let intent = match observation.correlation {
            Correlation::Pending { event, replaced } => {
                if let Some(replaced) = replaced {
                    info!("{} {} replaced by {}", event.kind.as_str(), replaced.code, event.code);
                }
                produced.push(StationEvent::PairingStarted {
                    kind: event.kind,
                    code: event.code,
                });
                return Ok(self.publish(produced));
            }
            Correlation::Paired(intent) => intent,
        };

        info!(
            "Paired {} with {}",
            intent.spool_id,
            pipeline
                .classifier
                .location_name(&intent.location_id)
                .unwrap_or(&intent.location_id)
        );

        match self.applier.apply(&intent).await {
            Ok(outcome) => {
                produced.push(StationEvent::from_outcome(&outcome));
                Ok(self.publish(produced))
            }
            Err(err @ MoveError::Rejected(_)) => {
                produced.push(StationEvent::from_error(&err));
                Ok(self.publish(produced))
            }
            Err(err) => {
                error!("Move of {} to {} failed: {err}", intent.spool_id, intent.location_id);
                pipeline.engine.cancel();
                produced.push(StationEvent::from_error(&err));
                self.publish(produced);
                Err(anyhow!(err))
            }
        }
    }

    /// Periodic passive expiry. Never judged later than the oldest captured scan
    /// still waiting to be handled.
    pub async fn expire_pending(&self, now: Instant) -> Option<StationEvent> {
        let mut pipeline = self.pipeline.lock().await;
        let horizon = self.in_flight.horizon(now);
        let expired = pipeline.engine.expire(horizon)?;
        drop(pipeline);
        info!("Pairing window expired for {} {}", expired.kind.as_str(), expired.code);
        self.publish_one(StationEvent::timed_out(expired))
    }

    /// Operator "cancel pairing". Returns `None` when nothing was pending.
    pub async fn cancel_pairing(&self) -> Option<StationEvent> {
        let cancelled = self.pipeline.lock().await.engine.cancel()?;
        info!("Pairing cancelled for {} {}", cancelled.kind.as_str(), cancelled.code);
        self.publish_one(StationEvent::PairingCancelled {
            kind: cancelled.kind,
            code: cancelled.code,
        })
    }

    /// Manual location change from the presenter; bypasses the pairing window.
    pub async fn manual_set_location(
        &self,
        spool_id: &str,
        location_id: &str,
    ) -> Result<MoveOutcome, MoveError> {
        let result = self.applier.apply_manual(spool_id, location_id).await;
        match &result {
            Ok(outcome) => {
                self.publish_one(StationEvent::from_outcome(outcome));
            }
            Err(err) => {
                self.publish_one(StationEvent::from_error(err));
            }
        }
        result
    }

    pub async fn manual_set_weight(&self, spool_id: &str, weight_grams: f64) -> Result<WeightRecord> {
        let record = self
            .db
            .set_spool_weight(spool_id, weight_grams, Utc::now())
            .await?;
        info!("Weighed {}: {:.0} g", record.spool_id, record.weight_grams);
        Ok(record)
    }

    pub async fn start_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let controller = self.clone();
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                controller.expire_pending(Instant::now()).await;
            }
        });

        *ticker_guard = Some(handle);
    }

    /// Stops the ticker and forgets in-flight pairing state; nothing is persisted.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }

        let mut pipeline = self.pipeline.lock().await;
        if let Some(discarded) = pipeline.engine.cancel() {
            info!("Discarding pending {} scan {} on shutdown", discarded.kind.as_str(), discarded.code);
        }
        pipeline.debouncer.clear();
        pipeline.current_spool = None;
    }

    fn publish(&self, events: Vec<StationEvent>) -> Vec<StationEvent> {
        for event in &events {
            // No subscribers is fine; the caller still gets the events back.
            let _ = self.events.send(event.clone());
        }
        events
    }

    fn publish_one(&self, event: StationEvent) -> Option<StationEvent> {
        let _ = self.events.send(event.clone());
        Some(event)
    }
}

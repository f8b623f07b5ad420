use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::pairing::StationController;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// A decoded payload as delivered by the scanner, stamped on arrival.
#[derive(Debug, Clone)]
pub struct RawScan {
    pub payload: String,
    pub observed_at: Instant,
    pub captured_at: DateTime<Utc>,
}

impl RawScan {
    pub fn now(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            observed_at: Instant::now(),
            captured_at: Utc::now(),
        }
    }
}

/// Capture stamps of scans read from the scanner but not yet handled.
///
/// Passive expiry never looks past the oldest of these, so a complement waiting in
/// the channel is judged by its capture time exactly as the lazy path would.
#[derive(Debug, Clone, Default)]
pub struct InFlightScans {
    stamps: Arc<Mutex<VecDeque<Instant>>>,
}

impl InFlightScans {
    /// Stamps a payload and records it in one step, so no expiry horizon can be
    /// computed between the two.
    pub fn capture(&self, payload: impl Into<String>) -> RawScan {
        let mut stamps = self.stamps();
        let scan = RawScan::now(payload);
        stamps.push_back(scan.observed_at);
        scan
    }

    #[cfg(test)]
    pub fn capture_at(&self, payload: impl Into<String>, observed_at: Instant) -> RawScan {
        self.stamps().push_back(observed_at);
        RawScan {
            payload: payload.into(),
            observed_at,
            captured_at: Utc::now(),
        }
    }

    /// Marks a captured scan as taken up by the pipeline. Unknown stamps are ignored.
    pub fn settle(&self, observed_at: Instant) {
        let mut stamps = self.stamps();
        if let Some(index) = stamps.iter().position(|stamp| *stamp == observed_at) {
            stamps.remove(index);
        }
    }

    /// The latest time passive expiry may use at `now`.
    pub fn horizon(&self, now: Instant) -> Instant {
        self.stamps()
            .iter()
            .copied()
            .min()
            .map_or(now, |oldest| oldest.min(now))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.stamps().len()
    }

    fn stamps(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        match self.stamps.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Single consumer of the scan channel. Each scan is fully handled, registry
/// commit included, before the next one is taken off the channel.
pub async fn scan_loop(
    mut scans: mpsc::Receiver<RawScan>,
    controller: StationController,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            received = scans.recv() => {
                let Some(scan) = received else {
                    log_info!("scan source closed");
                    break;
                };

                match controller
                    .handle_scan(&scan.payload, scan.observed_at, scan.captured_at)
                    .await
                {
                    Ok(events) if events.is_empty() => {}
                    Ok(events) => log_info!("scan handled with {} notification(s)", events.len()),
                    Err(err) => log_error!("scan of '{}' failed: {err:#}", scan.payload),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("scan loop shutting down");
                break;
            }
        }
    }
}

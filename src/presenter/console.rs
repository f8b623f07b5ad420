use std::sync::Arc;

use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::{broadcast, mpsc},
};
use tokio_util::sync::CancellationToken;

use crate::{pairing::StationEvent, scan::source::RawScan, AppState};

use super::{
    commands::{self, CommandReply},
    render,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Lines starting with this are operator commands rather than scans.
pub const COMMAND_PREFIX: char = '!';

/// Reads the keyboard-wedge scanner (or a typing operator) line by line.
///
/// Scans go to the scan channel untouched; commands are run inline. Returns on
/// end of input, `!quit`, or cancellation.
pub async fn input_loop<R>(
    reader: R,
    scans: mpsc::Sender<RawScan>,
    state: Arc<AppState>,
    cancel_token: CancellationToken,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = cancel_token.cancelled() => {
                log_info!("input loop cancelled");
                break;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                log_info!("input closed");
                break;
            }
            Err(err) => {
                log_warn!("failed to read input: {err}");
                break;
            }
        };

        if let Some(command) = line.trim_start().strip_prefix(COMMAND_PREFIX) {
            match commands::dispatch(&state, command).await {
                CommandReply::Message(text) => println!("{text}"),
                CommandReply::Quit => {
                    log_info!("quit requested");
                    break;
                }
            }
            continue;
        }

        let scan = state.controller.capture(line);
        let observed_at = scan.observed_at;
        if scans.send(scan).await.is_err() {
            state.controller.in_flight().settle(observed_at);
            log_warn!("scan loop is gone, stopping input");
            break;
        }
    }
}

/// Prints every station notification until cancelled.
pub async fn render_loop(
    mut events: broadcast::Receiver<StationEvent>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            received = events.recv() => match received {
                Ok(event) => println!("{}", render::describe_event(&event)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log_warn!("presenter fell behind, {skipped} notification(s) dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = cancel_token.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::Database, pairing::StationController, settings::StationConfig};

    async fn state() -> (tempfile::TempDir, Arc<AppState>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = StationConfig::default();
        let db = Database::new(dir.path().join("registry.sqlite3")).expect("open");
        db.seed_locations(config.location_seeds()).await.expect("seed");
        let controller = StationController::new(&config, db.clone());
        (
            dir,
            Arc::new(AppState {
                db,
                controller,
                config,
            }),
        )
    }

    #[tokio::test]
    async fn scans_are_forwarded_and_commands_are_not() {
        let (_dir, state) = state().await;
        let (tx, mut rx) = mpsc::channel(8);
        let input: &[u8] = b"fs://spool/a\n!status\n  fs://loc/dryer\n";

        input_loop(input, tx, state, CancellationToken::new()).await;

        assert_eq!(rx.recv().await.expect("first").payload, "fs://spool/a");
        assert_eq!(rx.recv().await.expect("second").payload, "  fs://loc/dryer");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn forwarded_scans_hold_back_passive_expiry() {
        let (_dir, state) = state().await;
        let (tx, mut rx) = mpsc::channel(8);
        let input: &[u8] = b"fs://loc/dryer\n";

        input_loop(input, tx, state.clone(), CancellationToken::new()).await;

        let scan = rx.recv().await.expect("scan");
        let in_flight = state.controller.in_flight();
        assert_eq!(in_flight.len(), 1);
        let later = scan.observed_at + std::time::Duration::from_secs(60);
        assert_eq!(in_flight.horizon(later), scan.observed_at);
    }

    #[tokio::test]
    async fn quit_stops_reading() {
        let (_dir, state) = state().await;
        let (tx, mut rx) = mpsc::channel(8);
        let input: &[u8] = b"!quit\nfs://spool/a\n";

        input_loop(input, tx, state, CancellationToken::new()).await;

        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn render_loop_stops_when_sender_drops() {
        let (tx, rx) = broadcast::channel(4);
        let task = tokio::spawn(render_loop(rx, CancellationToken::new()));
        tx.send(StationEvent::RegistryFailure {
            message: "disk full".into(),
        })
        .expect("send");
        drop(tx);
        task.await.expect("render loop joins");
    }
}

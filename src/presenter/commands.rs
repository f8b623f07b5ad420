//! Operator commands issued from the presenter. Each one bypasses quick-pair and
//! talks to the controller or registry directly.

use anyhow::{anyhow, bail, Result};

use crate::{
    db::{MoveRecord, Spool, SpoolInput, WeightRecord},
    link_out,
    moves::MoveOutcome,
    pairing::PairingSnapshot,
    AppState,
};

use super::render;

const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    CancelPairing,
    PairingStatus,
    ManualSetLocation { spool_id: String, location_id: String },
    /// `None` targets the last scanned spool.
    ManualSetWeight { spool_id: Option<String>, weight_grams: f64 },
    RegisterSpool(SpoolInput),
    RenameLocation { location_id: String, label: String },
    ArchiveSpool { spool_id: String },
    ShowSpool { spool_id: String },
    MoveHistory { spool_id: String },
    WeightLog { spool_id: String },
    SpoolsAt { location_id: String },
    ShowLocations,
    OpenProfile { spool_id: Option<String> },
    Help,
    Quit,
}

pub enum CommandReply {
    Message(String),
    Quit,
}

pub const HELP: &str = "\
!cancel                              drop the pending scan
!status                              show the pairing window
!move <spool> <location>             set a spool's location
!weigh [spool] <grams>               record a weighing (default: last scanned spool)
!register <spool> | name | material | color
!rename <location> <label>           relabel a location
!archive <spool>                     retire a spool
!spool <spool>                       show a spool
!history <spool>                     recent moves of a spool
!weights <spool>                     weighings of a spool
!at <location>                       spools stored at a location
!locations                           list location codes
!open [spool]                        open the spool's profile page
!quit                                exit";

impl OperatorCommand {
    /// Parses a command line with its `!` prefix already stripped.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "cancel" => OperatorCommand::CancelPairing,
            "status" => OperatorCommand::PairingStatus,
            "move" => {
                let (spool_id, location_id) = two_args(rest, "move <spool> <location>")?;
                OperatorCommand::ManualSetLocation {
                    spool_id,
                    location_id,
                }
            }
            "weigh" => {
                let args = rest.split_whitespace().collect::<Vec<_>>();
                let (spool_id, grams) = match args.as_slice() {
                    [grams] => (None, *grams),
                    [spool_id, grams] => (Some(spool_id.to_string()), *grams),
                    _ => bail!("usage: weigh [spool] <grams>"),
                };
                let weight_grams = grams
                    .parse::<f64>()
                    .map_err(|_| anyhow!("'{grams}' is not a weight in grams"))?;
                OperatorCommand::ManualSetWeight {
                    spool_id,
                    weight_grams,
                }
            }
            "register" => OperatorCommand::RegisterSpool(parse_registration(rest)?),
            "rename" => {
                let (location_id, label) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("usage: rename <location> <label>"))?;
                OperatorCommand::RenameLocation {
                    location_id: location_id.to_string(),
                    label: label.trim().to_string(),
                }
            }
            "archive" => OperatorCommand::ArchiveSpool {
                spool_id: one_arg(rest, "archive <spool>")?,
            },
            "spool" => OperatorCommand::ShowSpool {
                spool_id: one_arg(rest, "spool <spool>")?,
            },
            "history" => OperatorCommand::MoveHistory {
                spool_id: one_arg(rest, "history <spool>")?,
            },
            "weights" => OperatorCommand::WeightLog {
                spool_id: one_arg(rest, "weights <spool>")?,
            },
            "at" => OperatorCommand::SpoolsAt {
                location_id: one_arg(rest, "at <location>")?,
            },
            "locations" => OperatorCommand::ShowLocations,
            "open" => OperatorCommand::OpenProfile {
                spool_id: match rest {
                    "" => None,
                    _ => Some(one_arg(rest, "open [spool]")?),
                },
            },
            "help" | "?" => OperatorCommand::Help,
            "quit" | "exit" => OperatorCommand::Quit,
            other => bail!("unknown command '{other}', try !help"),
        };

        Ok(command)
    }
}

fn one_arg(rest: &str, usage: &str) -> Result<String> {
    match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
        [arg] => Ok(arg.to_string()),
        _ => bail!("usage: {usage}"),
    }
}

fn two_args(rest: &str, usage: &str) -> Result<(String, String)> {
    match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
        [first, second] => Ok((first.to_string(), second.to_string())),
        _ => bail!("usage: {usage}"),
    }
}

// `<spool> | name | material | color`; blank fields are left unchanged.
fn parse_registration(rest: &str) -> Result<SpoolInput> {
    let mut fields = rest.split('|').map(str::trim);
    let id = fields
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("usage: register <spool> | name | material | color"))?;
    let mut optional = || {
        fields
            .next()
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    Ok(SpoolInput {
        id: id.to_string(),
        name: optional(),
        material: optional(),
        color: optional(),
    })
}

/// An explicit spool, else the spool scanned last.
async fn target_spool(state: &AppState, spool_id: Option<String>) -> Result<String, String> {
    match spool_id {
        Some(spool_id) => Ok(spool_id),
        None => state
            .controller
            .current_spool()
            .await
            .ok_or_else(|| "No spool scanned yet".to_string()),
    }
}

pub async fn cancel_pairing(state: &AppState) -> Result<String, String> {
    Ok(match state.controller.cancel_pairing().await {
        Some(event) => render::describe_event(&event),
        None => "Nothing to cancel".to_string(),
    })
}

pub async fn get_pairing_state(state: &AppState) -> Result<PairingSnapshot, String> {
    Ok(state.controller.snapshot().await)
}

pub async fn manual_set_location(
    state: &AppState,
    spool_id: &str,
    location_id: &str,
) -> Result<MoveOutcome, String> {
    state
        .controller
        .manual_set_location(spool_id, location_id)
        .await
        .map_err(|e| e.to_string())
}

pub async fn manual_set_weight(
    state: &AppState,
    spool_id: &str,
    weight_grams: f64,
) -> Result<WeightRecord, String> {
    state
        .controller
        .manual_set_weight(spool_id, weight_grams)
        .await
        .map_err(|e| e.to_string())
}

pub async fn register_spool(state: &AppState, input: SpoolInput) -> Result<Spool, String> {
    state.db.register_spool(input).await.map_err(|e| e.to_string())
}

pub async fn archive_spool(state: &AppState, spool_id: &str) -> Result<Spool, String> {
    state.db.archive_spool(spool_id).await.map_err(|e| e.to_string())
}

pub async fn get_spool(state: &AppState, spool_id: &str) -> Result<Spool, String> {
    state
        .db
        .get_spool(spool_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("No spool {spool_id}"))
}

pub async fn get_move_history(state: &AppState, spool_id: &str) -> Result<Vec<MoveRecord>, String> {
    state
        .db
        .move_history(spool_id, HISTORY_LIMIT)
        .await
        .map_err(|e| e.to_string())
}

/// Runs a parsed command and renders its result for the console.
pub async fn execute(state: &AppState, command: OperatorCommand) -> Result<CommandReply, String> {
    let message = match command {
        OperatorCommand::CancelPairing => cancel_pairing(state).await?,
        OperatorCommand::PairingStatus => {
            render::describe_snapshot(&get_pairing_state(state).await?)
        }
        OperatorCommand::ManualSetLocation {
            spool_id,
            location_id,
        } => match manual_set_location(state, &spool_id, &location_id).await? {
            MoveOutcome::Applied(record) => format!("Moved: {}", render::describe_move(&record)),
            MoveOutcome::Unchanged { .. } => format!("{spool_id} is already at {location_id}"),
        },
        OperatorCommand::ManualSetWeight {
            spool_id,
            weight_grams,
        } => {
            let spool_id = target_spool(state, spool_id).await?;
            let record = manual_set_weight(state, &spool_id, weight_grams).await?;
            format!("Weight updated: {} = {:.0} g", record.spool_id, record.weight_grams)
        }
        OperatorCommand::RegisterSpool(input) => {
            render::describe_spool(&register_spool(state, input).await?)
        }
        OperatorCommand::RenameLocation { location_id, label } => {
            let location = state
                .db
                .rename_location(&location_id, label)
                .await
                .map_err(|e| e.to_string())?;
            format!("{} is now labelled {}", location.id, location.label)
        }
        OperatorCommand::ArchiveSpool { spool_id } => {
            render::describe_spool(&archive_spool(state, &spool_id).await?)
        }
        OperatorCommand::ShowSpool { spool_id } => {
            render::describe_spool(&get_spool(state, &spool_id).await?)
        }
        OperatorCommand::MoveHistory { spool_id } => {
            let history = get_move_history(state, &spool_id).await?;
            if history.is_empty() {
                format!("No moves recorded for {spool_id}")
            } else {
                history
                    .iter()
                    .map(render::describe_move)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        OperatorCommand::WeightLog { spool_id } => {
            let history = state
                .db
                .weight_history(&spool_id)
                .await
                .map_err(|e| e.to_string())?;
            render::describe_weights(&spool_id, &history)
        }
        OperatorCommand::SpoolsAt { location_id } => {
            let location = state
                .db
                .get_location(&location_id)
                .await
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("No location {location_id}"))?;
            let spools = state
                .db
                .list_spools_at(&location_id)
                .await
                .map_err(|e| e.to_string())?;
            if spools.is_empty() {
                format!("Nothing stored at {}", location.label)
            } else {
                spools
                    .iter()
                    .map(render::describe_spool)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        OperatorCommand::ShowLocations => {
            let locations = state.db.list_locations().await.map_err(|e| e.to_string())?;
            render::describe_locations(&locations)
        }
        OperatorCommand::OpenProfile { spool_id } => {
            let spool_id = target_spool(state, spool_id).await?;
            let spool = get_spool(state, &spool_id).await?;
            link_out::open_profile(&spool.id, state.config.browser.as_deref())
                .map_err(|e| e.to_string())?;
            format!("Opening {}", spool.id)
        }
        OperatorCommand::Help => HELP.to_string(),
        OperatorCommand::Quit => return Ok(CommandReply::Quit),
    };

    Ok(CommandReply::Message(message))
}

/// Parses and runs one console line; errors become the reply text.
pub async fn dispatch(state: &AppState, line: &str) -> CommandReply {
    let command = match OperatorCommand::parse(line) {
        Ok(command) => command,
        Err(err) => return CommandReply::Message(format!("x {err}")),
    };

    match execute(state, command).await {
        Ok(reply) => reply,
        Err(message) => CommandReply::Message(format!("x {message}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use chrono::Utc;

    use super::*;
    use crate::{db::Database, pairing::StationController, settings::StationConfig};

    fn parse(line: &str) -> OperatorCommand {
        OperatorCommand::parse(line).expect("parses")
    }

    async fn state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = StationConfig::default();
        let db = Database::new(dir.path().join("registry.sqlite3")).expect("open");
        db.seed_locations(config.location_seeds()).await.expect("seed");
        let controller = StationController::new(&config, db.clone());
        (
            dir,
            AppState {
                db,
                controller,
                config,
            },
        )
    }

    fn message(reply: CommandReply) -> String {
        match reply {
            CommandReply::Message(text) => text,
            CommandReply::Quit => panic!("unexpected quit"),
        }
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse("cancel"), OperatorCommand::CancelPairing);
        assert_eq!(parse("  STATUS "), OperatorCommand::PairingStatus);
        assert_eq!(
            parse("move fs://spool/a fs://loc/ams-1"),
            OperatorCommand::ManualSetLocation {
                spool_id: "fs://spool/a".into(),
                location_id: "fs://loc/ams-1".into(),
            }
        );
        assert_eq!(
            parse("weigh fs://spool/a 812.5"),
            OperatorCommand::ManualSetWeight {
                spool_id: Some("fs://spool/a".into()),
                weight_grams: 812.5,
            }
        );
        assert_eq!(
            parse("weigh 640"),
            OperatorCommand::ManualSetWeight {
                spool_id: None,
                weight_grams: 640.0,
            }
        );
        assert_eq!(parse("open"), OperatorCommand::OpenProfile { spool_id: None });
        assert_eq!(
            parse("open fs://spool/a"),
            OperatorCommand::OpenProfile {
                spool_id: Some("fs://spool/a".into())
            }
        );
        assert_eq!(
            parse("rename fs://loc/dryer Sunlu S2 Dryer"),
            OperatorCommand::RenameLocation {
                location_id: "fs://loc/dryer".into(),
                label: "Sunlu S2 Dryer".into(),
            }
        );
        assert_eq!(parse("quit"), OperatorCommand::Quit);
    }

    #[test]
    fn registration_skips_blank_fields() {
        assert_eq!(
            parse("register fs://spool/a | Galaxy Black |  | #111111"),
            OperatorCommand::RegisterSpool(SpoolInput {
                id: "fs://spool/a".into(),
                name: Some("Galaxy Black".into()),
                material: None,
                color: Some("#111111".into()),
            })
        );
        assert_eq!(
            parse("register fs://spool/b"),
            OperatorCommand::RegisterSpool(SpoolInput {
                id: "fs://spool/b".into(),
                ..Default::default()
            })
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(OperatorCommand::parse("teleport").is_err());
        assert!(OperatorCommand::parse("move fs://spool/a").is_err());
        assert!(OperatorCommand::parse("weigh fs://spool/a heavy").is_err());
        assert!(OperatorCommand::parse("weigh").is_err());
        assert!(OperatorCommand::parse("open fs://spool/a fs://spool/b").is_err());
        assert!(OperatorCommand::parse("register").is_err());
        assert!(OperatorCommand::parse("rename fs://loc/dryer").is_err());
    }

    #[tokio::test]
    async fn cancel_via_console_drops_pending_scan() {
        let (_dir, state) = state().await;
        state
            .controller
            .handle_scan("fs://spool/a", Instant::now(), Utc::now())
            .await
            .expect("scan");

        let reply = message(dispatch(&state, "cancel").await);
        assert!(reply.starts_with("Pairing cancelled"), "{reply}");
        assert_eq!(message(dispatch(&state, "cancel").await), "Nothing to cancel");
        assert_eq!(message(dispatch(&state, "status").await), "Ready. Scan a spool.");
    }

    #[tokio::test]
    async fn register_weigh_and_move_from_console() {
        let (_dir, state) = state().await;

        message(dispatch(&state, "register fs://spool/a | Galaxy Black | PLA").await);
        let reply = message(dispatch(&state, "weigh fs://spool/a 750").await);
        assert_eq!(reply, "Weight updated: fs://spool/a = 750 g");

        let reply = message(dispatch(&state, "move fs://spool/a fs://loc/dryer").await);
        assert!(reply.starts_with("Moved: fs://spool/a -- -> fs://loc/dryer [manual]"), "{reply}");

        let reply = message(dispatch(&state, "move fs://spool/a fs://loc/dryer").await);
        assert_eq!(reply, "fs://spool/a is already at fs://loc/dryer");

        let history = message(dispatch(&state, "history fs://spool/a").await);
        assert_eq!(history.lines().count(), 1);

        let stored = message(dispatch(&state, "at fs://loc/dryer").await);
        assert!(stored.starts_with("Galaxy Black | Weight: 750 g"), "{stored}");
        assert_eq!(
            message(dispatch(&state, "at fs://loc/ams-1").await),
            "Nothing stored at AMS Slot 1"
        );
        assert_eq!(
            message(dispatch(&state, "at fs://loc/attic").await),
            "x No location fs://loc/attic"
        );

        let weights = message(dispatch(&state, "weights fs://spool/a").await);
        assert!(weights.ends_with("750 g"), "{weights}");
    }

    #[tokio::test]
    async fn weigh_without_spool_uses_last_scan() {
        let (_dir, state) = state().await;
        assert_eq!(
            message(dispatch(&state, "weigh 750").await),
            "x No spool scanned yet"
        );
        assert_eq!(message(dispatch(&state, "open").await), "x No spool scanned yet");

        state
            .controller
            .handle_scan("fs://spool/pla-red", Instant::now(), Utc::now())
            .await
            .expect("scan");

        let reply = message(dispatch(&state, "weigh 750").await);
        assert_eq!(reply, "Weight updated: fs://spool/pla-red = 750 g");
        let weights = message(dispatch(&state, "weights fs://spool/pla-red").await);
        assert!(weights.ends_with("750 g"), "{weights}");
    }

    #[tokio::test]
    async fn errors_are_reported_not_raised() {
        let (_dir, state) = state().await;

        let reply = message(dispatch(&state, "move fs://spool/missing fs://loc/dryer").await);
        assert!(reply.starts_with("x move rejected"), "{reply}");

        let reply = message(dispatch(&state, "spool fs://spool/missing").await);
        assert_eq!(reply, "x No spool fs://spool/missing");

        assert!(matches!(dispatch(&state, "quit").await, CommandReply::Quit));
    }
}

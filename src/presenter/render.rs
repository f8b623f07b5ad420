use crate::{
    db::{Location, MoveRecord, Spool, WeightRecord},
    error::RejectReason,
    pairing::{PairingSnapshot, StationEvent},
    scan::ScanKind,
};

pub fn describe_event(event: &StationEvent) -> String {
    match event {
        StationEvent::ScanRejected { reason } => format!("? Ignored scan ({reason})"),
        StationEvent::PairingStarted { kind, code } => match kind {
            ScanKind::Spool => format!("Spool scanned: {code}. Scan a location to move it."),
            ScanKind::Location => format!("Location scanned: {code}. Scan a spool to move it."),
        },
        StationEvent::PairingTimeout { kind, code } => {
            format!("Pairing window missed for {} {code}", kind.as_str())
        }
        StationEvent::PairingCancelled { kind, code } => {
            format!("Pairing cancelled ({} {code})", kind.as_str())
        }
        StationEvent::MoveApplied { record } => format!("Moved: {}", describe_move(record)),
        StationEvent::MoveUnchanged {
            spool_id,
            location_id,
        } => format!("{spool_id} is already at {location_id}"),
        StationEvent::MoveRejected { reason } => format!("x Move rejected: {}", describe_rejection(reason)),
        StationEvent::RegistryFailure { message } => {
            format!("x Could not save the move, scan both codes again ({message})")
        }
    }
}

fn describe_rejection(reason: &RejectReason) -> String {
    match reason {
        RejectReason::UnknownSpool(id) => format!("spool {id} is not registered"),
        RejectReason::UnknownLocation(id) => format!("location {id} is not configured"),
        RejectReason::ArchivedSpool(id) => format!("spool {id} is archived"),
    }
}

pub fn describe_move(record: &MoveRecord) -> String {
    format!(
        "{} {} -> {} [{}] at {}",
        record.spool_id,
        record.from_location_id.as_deref().unwrap_or("--"),
        record.to_location_id,
        record.source.as_str(),
        record.at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

pub fn describe_spool(spool: &Spool) -> String {
    let weight = spool
        .weight_grams
        .map(|w| format!("{w:.0} g"))
        .unwrap_or_else(|| "-- g".to_string());
    let mut line = format!(
        "{} | Weight: {weight} | Location: {} | Updated: {}",
        spool.display_name(),
        spool.current_location_id.as_deref().unwrap_or("--"),
        spool.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(material) = &spool.material {
        line.push_str(&format!(" | {material}"));
    }
    if spool.provisional {
        line.push_str(" | provisional");
    }
    if spool.is_archived() {
        line.push_str(" | archived");
    }
    line
}

pub fn describe_weights(spool_id: &str, history: &[WeightRecord]) -> String {
    if history.is_empty() {
        return format!("No weighings recorded for {spool_id}");
    }
    history
        .iter()
        .map(|record| {
            format!(
                "{}  {:.0} g",
                record.at.format("%Y-%m-%d %H:%M:%S UTC"),
                record.weight_grams
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn describe_locations(locations: &[Location]) -> String {
    if locations.is_empty() {
        return "(No locations configured yet)".to_string();
    }
    locations
        .iter()
        .map(|loc| format!("{}: {}", loc.label, loc.id))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn describe_snapshot(snapshot: &PairingSnapshot) -> String {
    match snapshot {
        PairingSnapshot::Idle => "Ready. Scan a spool.".to_string(),
        PairingSnapshot::Pending {
            kind,
            code,
            remaining_ms,
        } => format!(
            "Waiting for a {} to pair with {code} ({:.1}s left)",
            kind.complement().as_str(),
            *remaining_ms as f64 / 1000.0
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_snapshot_names_the_missing_kind() {
        let text = describe_snapshot(&PairingSnapshot::Pending {
            kind: ScanKind::Spool,
            code: "fs://spool/a".into(),
            remaining_ms: 6500,
        });
        assert_eq!(text, "Waiting for a location to pair with fs://spool/a (6.5s left)");
    }

    #[test]
    fn empty_location_list_has_placeholder() {
        assert_eq!(describe_locations(&[]), "(No locations configured yet)");
    }
}

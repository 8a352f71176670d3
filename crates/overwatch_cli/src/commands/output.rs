//! Event rendering.

use clap::ValueEnum;
use overwatch_core::AuditEvent;

/// How events are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// One aligned line per event.
    Text,
    /// One JSON object per line.
    Json,
}

/// Renders one event as a single line.
pub fn render(event: &AuditEvent, format: Format) -> Result<String, serde_json::Error> {
    match format {
        Format::Json => serde_json::to_string(event),
        Format::Text => Ok(format!("{:<14} {}", event.name(), details(event))),
    }
}

fn details(event: &AuditEvent) -> String {
    match event {
        AuditEvent::CaughtUp { db, couch, seq } => format!("{db} {couch} seq={seq}"),
        AuditEvent::AuditStarted { db } | AuditEvent::Live { db } => db.clone(),
        AuditEvent::ProcessedChange { db, couch, rev, id } => {
            format!("{db} {couch} {id}@{}", rev.as_deref().unwrap_or("?"))
        }
        AuditEvent::ExpectationSet { db, couch, rev, id } => format!("{db} {couch} {id}@{rev}"),
        AuditEvent::Fulfilled {
            db,
            couch,
            rev,
            id,
            reason,
        } => format!("{db} {couch} {id}@{rev} ({reason})"),
        AuditEvent::Unfulfilled {
            error,
            db,
            target,
            source,
            id,
            rev,
        } => format!("{db} {source} -> {target} {id}@{rev}: {error}"),
        AuditEvent::Error { cause } => cause.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overwatch_core::{FulfillReason, ReplicationFailure, Sequence};

    fn unfulfilled() -> AuditEvent {
        AuditEvent::Unfulfilled {
            error: ReplicationFailure::NotReplicated,
            db: "users".into(),
            target: "http://s2:5984".into(),
            source: "http://hub:5984".into(),
            id: "doc1".into(),
            rev: "1-a".into(),
        }
    }

    #[test]
    fn text_lines() {
        let caught_up = AuditEvent::CaughtUp {
            db: "users".into(),
            couch: "http://hub:5984".into(),
            seq: Sequence::Number(12),
        };
        assert_eq!(
            render(&caught_up, Format::Text).unwrap(),
            "catchUp        users http://hub:5984 seq=12"
        );
        assert_eq!(
            render(&unfulfilled(), Format::Text).unwrap(),
            "unfulfilled    users http://hub:5984 -> http://s2:5984 doc1@1-a: failed to replicate in a timely manner"
        );
    }

    #[test]
    fn json_lines() {
        let line = render(&unfulfilled(), Format::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "unfulfilled");
        assert_eq!(value["error"], "failed to replicate in a timely manner");
        assert_eq!(value["target"], "http://s2:5984");

        let fulfilled = AuditEvent::Fulfilled {
            db: "users".into(),
            couch: "http://s1:5984".into(),
            rev: "1-a".into(),
            id: "doc1".into(),
            reason: FulfillReason::Replicated,
        };
        let value: serde_json::Value =
            serde_json::from_str(&render(&fulfilled, Format::Json).unwrap()).unwrap();
        assert_eq!(value["event"], "fulfilled");
        assert!(!line.contains('\n'));
    }
}

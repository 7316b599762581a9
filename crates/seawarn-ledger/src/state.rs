use chrono::{DateTime, Utc};
use seawarn_common::types::{CanonicalEvent, Channel, DeliveryStatus, EventKind};

/// One outbound delivery attempt as tracked by the ledger.
///
/// The record is storage-agnostic; the persistence layer maps it to and
/// from its table row. Timestamps are per lifecycle state so skipped
/// intermediate states can be synthesized when events arrive out of
/// order.
#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    pub id: String,
    pub alert_id: String,
    pub step_index: i32,
    pub contact_id: String,
    pub channel: Channel,
    pub address: String,
    /// Assigned when the provider accepts the dispatch. Webhook events
    /// correlate by `(channel, provider_message_id)`.
    pub provider_message_id: Option<String>,
    pub status: DeliveryStatus,
    pub queued_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// Set when the record takes the failed/bounced side exit.
    pub closed_at: Option<DateTime<Utc>>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Unmapped provider events, keyed by event kind.
    pub metadata: Option<serde_json::Value>,
}

impl DeliveryRecord {
    pub fn new(
        id: impl Into<String>,
        alert_id: impl Into<String>,
        step_index: i32,
        contact_id: impl Into<String>,
        channel: Channel,
        address: impl Into<String>,
        queued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            alert_id: alert_id.into(),
            step_index,
            contact_id: contact_id.into(),
            channel,
            address: address.into(),
            provider_message_id: None,
            status: DeliveryStatus::Queued,
            queued_at,
            sent_at: None,
            delivered_at: None,
            read_at: None,
            acknowledged_at: None,
            closed_at: None,
            error_code: None,
            error_message: None,
            metadata: None,
        }
    }
}

/// Outcome of folding one event into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Status moved forward (or took a side exit).
    Advanced {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
    /// Status unchanged but the record gained information (a backfilled
    /// timestamp or unmapped-event metadata).
    MetadataOnly,
    /// Duplicate or stale event; the record already holds everything it
    /// carries.
    NoOp,
    /// The record is terminal; the event is discarded.
    Frozen,
}

/// Folds a normalized provider event into a delivery record.
///
/// Transitions are monotonic joins over the forward lifecycle: an event
/// whose target state ranks at or below the current state never moves
/// the status, and a terminal record never changes at all. When an
/// event skips intermediate states (a `read` arriving before
/// `delivered` was seen), the skipped timestamps are synthesized from
/// the event's timestamp so the row always tells a consistent story.
pub fn apply_event(record: &mut DeliveryRecord, event: &CanonicalEvent) -> Transition {
    if record.status.is_terminal() {
        return Transition::Frozen;
    }

    match &event.kind {
        EventKind::Other(kind) => stash_unmapped(record, kind, event),
        EventKind::Failed => side_exit(record, DeliveryStatus::Failed, event),
        EventKind::Bounced => side_exit(record, DeliveryStatus::Bounced, event),
        EventKind::Sent => advance(record, DeliveryStatus::Sent, event),
        EventKind::Delivered => advance(record, DeliveryStatus::Delivered, event),
        EventKind::Read => advance(record, DeliveryStatus::Read, event),
    }
}

/// Records a human acknowledgement.
///
/// An operator pressing the button is ground truth, so acknowledgement
/// wins over every prior state including the failed/bounced side exits.
/// Idempotent: acknowledging an acknowledged record is a no-op.
pub fn acknowledge(record: &mut DeliveryRecord, at: DateTime<Utc>) -> Transition {
    if record.status == DeliveryStatus::Acknowledged {
        return Transition::NoOp;
    }
    let from = record.status;
    record.status = DeliveryStatus::Acknowledged;
    record.acknowledged_at = Some(at);
    Transition::Advanced {
        from,
        to: DeliveryStatus::Acknowledged,
    }
}

/// Records that the provider accepted the dispatch and assigned an ID.
///
/// A delivery webhook can never outrun this call (events correlate by
/// the ID assigned here), but the join is still guarded so a repeated
/// call cannot regress the record.
pub fn record_dispatch(record: &mut DeliveryRecord, provider_message_id: &str, at: DateTime<Utc>) -> Transition {
    if record.status.is_terminal() {
        return Transition::Frozen;
    }
    record.provider_message_id = Some(provider_message_id.to_string());
    if DeliveryStatus::Sent.rank() > record.status.rank() {
        let from = record.status;
        record.status = DeliveryStatus::Sent;
        record.sent_at.get_or_insert(at);
        Transition::Advanced {
            from,
            to: DeliveryStatus::Sent,
        }
    } else {
        Transition::NoOp
    }
}

/// Records a dispatch failure (provider rejected the attempt outright).
pub fn record_dispatch_failure(record: &mut DeliveryRecord, message: &str, at: DateTime<Utc>) -> Transition {
    if record.status.is_terminal() {
        return Transition::Frozen;
    }
    let from = record.status;
    record.status = DeliveryStatus::Failed;
    record.closed_at = Some(at);
    record.error_message = Some(message.to_string());
    Transition::Advanced {
        from,
        to: DeliveryStatus::Failed,
    }
}

fn advance(record: &mut DeliveryRecord, target: DeliveryStatus, event: &CanonicalEvent) -> Transition {
    if target.rank() > record.status.rank() {
        let from = record.status;
        // Synthesize timestamps for every state the event skipped over.
        if target.rank() >= DeliveryStatus::Sent.rank() {
            record.sent_at.get_or_insert(event.timestamp);
        }
        if target.rank() >= DeliveryStatus::Delivered.rank() {
            record.delivered_at.get_or_insert(event.timestamp);
        }
        if target.rank() >= DeliveryStatus::Read.rank() {
            record.read_at.get_or_insert(event.timestamp);
        }
        record.status = target;
        Transition::Advanced { from, to: target }
    } else {
        // A stale event can still carry the real timestamp for a state
        // that was synthesized or never reported.
        let slot = match target {
            DeliveryStatus::Sent => &mut record.sent_at,
            DeliveryStatus::Delivered => &mut record.delivered_at,
            DeliveryStatus::Read => &mut record.read_at,
            _ => return Transition::NoOp,
        };
        if slot.is_none() {
            *slot = Some(event.timestamp);
            Transition::MetadataOnly
        } else {
            Transition::NoOp
        }
    }
}

fn side_exit(record: &mut DeliveryRecord, target: DeliveryStatus, event: &CanonicalEvent) -> Transition {
    let from = record.status;
    record.status = target;
    record.closed_at = Some(event.timestamp);
    if let Some(err) = &event.error {
        record.error_code = err.code.clone();
        record.error_message = Some(err.message.clone());
    }
    Transition::Advanced { from, to: target }
}

fn stash_unmapped(record: &mut DeliveryRecord, kind: &str, event: &CanonicalEvent) -> Transition {
    let meta = record
        .metadata
        .get_or_insert_with(|| serde_json::Value::Object(Default::default()));
    if let Some(obj) = meta.as_object_mut() {
        obj.insert(
            kind.to_string(),
            serde_json::json!({
                "timestamp": event.timestamp,
                "extra": event.extra,
            }),
        );
    }
    Transition::MetadataOnly
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use seawarn_common::types::EventError;

    fn record() -> DeliveryRecord {
        DeliveryRecord::new("att-1", "alert-1", 0, "contact-1", Channel::Sms, "+15550001", ts(0))
    }

    fn ts(offset: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + offset, 0).unwrap()
    }

    fn event(kind: EventKind, offset: i64) -> CanonicalEvent {
        CanonicalEvent::new("gw-1", kind, ts(offset))
    }

    #[test]
    fn forward_events_advance_in_order() {
        let mut rec = record();
        assert_eq!(
            apply_event(&mut rec, &event(EventKind::Sent, 1)),
            Transition::Advanced {
                from: DeliveryStatus::Queued,
                to: DeliveryStatus::Sent
            }
        );
        assert_eq!(
            apply_event(&mut rec, &event(EventKind::Delivered, 2)),
            Transition::Advanced {
                from: DeliveryStatus::Sent,
                to: DeliveryStatus::Delivered
            }
        );
        assert_eq!(rec.sent_at, Some(ts(1)));
        assert_eq!(rec.delivered_at, Some(ts(2)));
    }

    #[test]
    fn read_before_delivered_synthesizes_skipped_timestamps() {
        let mut rec = record();
        apply_event(&mut rec, &event(EventKind::Read, 5));
        assert_eq!(rec.status, DeliveryStatus::Read);
        assert_eq!(rec.sent_at, Some(ts(5)));
        assert_eq!(rec.delivered_at, Some(ts(5)));
        assert_eq!(rec.read_at, Some(ts(5)));

        // The straggler carries the true delivered time; status must not
        // move but the synthesized timestamp is not overwritten either,
        // because it was already set.
        assert_eq!(
            apply_event(&mut rec, &event(EventKind::Delivered, 3)),
            Transition::NoOp
        );
        assert_eq!(rec.status, DeliveryStatus::Read);
    }

    #[test]
    fn stale_event_backfills_missing_timestamp() {
        let mut rec = record();
        apply_event(&mut rec, &event(EventKind::Sent, 1));
        rec.delivered_at = None;
        rec.status = DeliveryStatus::Read;
        rec.read_at = Some(ts(4));

        assert_eq!(
            apply_event(&mut rec, &event(EventKind::Delivered, 3)),
            Transition::MetadataOnly
        );
        assert_eq!(rec.delivered_at, Some(ts(3)));
        assert_eq!(rec.status, DeliveryStatus::Read);
    }

    #[test]
    fn duplicate_event_is_noop() {
        let mut rec = record();
        apply_event(&mut rec, &event(EventKind::Delivered, 2));
        assert_eq!(
            apply_event(&mut rec, &event(EventKind::Delivered, 2)),
            Transition::NoOp
        );
    }

    #[test]
    fn terminal_record_is_frozen() {
        let mut rec = record();
        acknowledge(&mut rec, ts(9));
        assert_eq!(
            apply_event(&mut rec, &event(EventKind::Delivered, 10)),
            Transition::Frozen
        );
        assert_eq!(rec.status, DeliveryStatus::Acknowledged);
    }

    #[test]
    fn failure_records_error_detail() {
        let mut rec = record();
        let mut ev = event(EventKind::Failed, 3);
        ev.error = Some(EventError {
            code: Some("E30006".to_string()),
            message: "destination unreachable".to_string(),
        });
        apply_event(&mut rec, &ev);
        assert_eq!(rec.status, DeliveryStatus::Failed);
        assert_eq!(rec.closed_at, Some(ts(3)));
        assert_eq!(rec.error_code.as_deref(), Some("E30006"));
        assert_eq!(rec.error_message.as_deref(), Some("destination unreachable"));
    }

    #[test]
    fn acknowledge_is_idempotent_and_dominates() {
        let mut rec = record();
        apply_event(&mut rec, &event(EventKind::Failed, 3));
        assert_eq!(
            acknowledge(&mut rec, ts(8)),
            Transition::Advanced {
                from: DeliveryStatus::Failed,
                to: DeliveryStatus::Acknowledged
            }
        );
        assert_eq!(acknowledge(&mut rec, ts(9)), Transition::NoOp);
        assert_eq!(rec.acknowledged_at, Some(ts(8)));
    }

    #[test]
    fn unmapped_event_lands_in_metadata() {
        let mut rec = record();
        let mut ev = event(EventKind::Other("clicked".to_string()), 6);
        ev.extra = Some(serde_json::json!({"url": "https://example.com/ack"}));
        assert_eq!(apply_event(&mut rec, &ev), Transition::MetadataOnly);
        assert_eq!(rec.status, DeliveryStatus::Queued);
        let meta = rec.metadata.unwrap();
        assert!(meta.get("clicked").is_some());
    }

    #[test]
    fn record_dispatch_assigns_id_once() {
        let mut rec = record();
        assert_eq!(
            record_dispatch(&mut rec, "gw-1", ts(1)),
            Transition::Advanced {
                from: DeliveryStatus::Queued,
                to: DeliveryStatus::Sent
            }
        );
        // A delivered webhook landing between dispatch and the engine's
        // bookkeeping must not be undone.
        apply_event(&mut rec, &event(EventKind::Delivered, 2));
        assert_eq!(record_dispatch(&mut rec, "gw-1", ts(1)), Transition::NoOp);
        assert_eq!(rec.status, DeliveryStatus::Delivered);
    }
}

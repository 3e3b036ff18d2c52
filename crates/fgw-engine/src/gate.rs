//! The notification gate. Three monotonic flags per merged record decide
//! whether each event class fires; because the flags persist with the
//! snapshot, re-running the pipeline never re-fires a notification that was
//! already decided, across process restarts included.

use chrono::{DateTime, Duration, Utc};
use fgw_core::{DiffResult, EventKind, NotificationEvent, Snapshot};

const URGENT_WINDOW_HOURS: i64 = 24;

/// Evaluate every record in `snapshot` against `now` and the run's diff,
/// emitting at most one event per (id, class) over the record's lifetime.
/// Flags are flipped on the snapshot in place; the caller persists it.
pub fn evaluate_gate(
    snapshot: &mut Snapshot,
    diff: &DiffResult,
    now: DateTime<Utc>,
) -> Vec<NotificationEvent> {
    let mut events = Vec::new();

    for (id, game) in snapshot.games.iter_mut() {
        if diff.added.contains(id) && !game.flags.new_notified {
            game.flags.new_notified = true;
            events.push(NotificationEvent::for_game(EventKind::NewOffer, game));
        }

        let Some(expiry) = game.expiry_at else {
            // No parseable expiry: never urgent, never reminded.
            continue;
        };

        if !game.flags.urgent_notified
            && now < expiry
            && expiry - now <= Duration::hours(URGENT_WINDOW_HOURS)
        {
            game.flags.urgent_notified = true;
            events.push(NotificationEvent::for_game(EventKind::ExpiringSoon, game));
        }

        if !game.flags.reminder_sent && expiry.date_naive() == now.date_naive() {
            game.flags.reminder_sent = true;
            events.push(NotificationEvent::for_game(EventKind::ExpiresToday, game));
        }
    }

    events
}

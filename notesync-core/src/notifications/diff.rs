use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::Notification;
use crate::notes::{parse_timestamp, Note, UserId};

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationCheck {
    /// Notifications produced by this check, in feed order.
    pub added: Vec<Notification>,
    /// `added` followed by the previous list minus any id collisions.
    pub notifications: Vec<Notification>,
    pub last_checked: DateTime<Utc>,
}

/// Diffs a feed snapshot against what the viewer has already been notified about.
///
/// A note produces a notification when it was written by someone else, has no
/// notification yet, and is strictly newer than `last_checked`. The mark moves
/// to `now` only if something was found, never backwards.
pub fn check_for_new_notifications(
    all_notes: &[Note],
    current_user_id: Option<UserId>,
    last_checked: DateTime<Utc>,
    existing: &[Notification],
    now: DateTime<Utc>,
) -> NotificationCheck {
    let mut seen: HashSet<_> = existing.iter().map(|n| n.id).collect();

    let added: Vec<Notification> = all_notes
        .iter()
        .filter(|note| !note.is_owned_by(current_user_id))
        .filter(|note| parse_timestamp(&note.timestamp).is_some_and(|ts| ts > last_checked))
        .filter(|note| seen.insert(note.id))
        .map(Notification::from)
        .collect();

    if added.is_empty() {
        return NotificationCheck {
            added,
            notifications: existing.to_vec(),
            last_checked,
        };
    }

    let added_ids: HashSet<_> = added.iter().map(|n| n.id).collect();
    let notifications = added
        .iter()
        .cloned()
        .chain(existing.iter().filter(|n| !added_ids.contains(&n.id)).cloned())
        .collect();

    NotificationCheck {
        added,
        notifications,
        last_checked: last_checked.max(now),
    }
}

pub fn mark_all_notifications_read(existing: &[Notification]) -> Vec<Notification> {
    existing
        .iter()
        .map(|n| Notification {
            read: true,
            ..n.clone()
        })
        .collect()
}

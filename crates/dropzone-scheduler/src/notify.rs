//! Engine notifications.
//!
//! Sinks are called synchronously from inside the engine and must never
//! block. Anything slow belongs behind a channel.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Something the dispatcher should see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    CountdownStarted {
        student_id: String,
        student_name: String,
        delay_secs: u64,
    },
    CountdownCancelled {
        student_id: String,
    },
    AssignmentCommitted {
        assignment_id: String,
        student_name: String,
        instructor_id: String,
        load_id: Option<String>,
    },
    AssignmentAborted {
        student_id: String,
        reason: String,
    },
    AssignmentReverted {
        assignment_id: String,
    },
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::CountdownStarted {
                student_id,
                student_name,
                delay_secs,
            } => info!(%student_id, %student_name, delay_secs, "auto-assign countdown started"),
            Notification::CountdownCancelled { student_id } => {
                info!(%student_id, "auto-assign countdown cancelled")
            }
            Notification::AssignmentCommitted {
                assignment_id,
                student_name,
                instructor_id,
                load_id,
            } => info!(
                %assignment_id,
                %student_name,
                %instructor_id,
                load_id = load_id.as_deref().unwrap_or("-"),
                "assignment committed"
            ),
            Notification::AssignmentAborted { student_id, reason } => {
                warn!(%student_id, %reason, "assignment aborted")
            }
            Notification::AssignmentReverted { assignment_id } => {
                info!(%assignment_id, "assignment reverted")
            }
        }
    }
}

/// Fans notifications out to any number of subscribers.
///
/// Sending never blocks; lagging receivers lose the oldest messages.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl NotificationSink for BroadcastNotifier {
    fn notify(&self, notification: Notification) {
        // No receivers is fine.
        let _ = self.tx.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_delivers_to_subscribers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.notify(Notification::CountdownCancelled {
            student_id: "s1".to_string(),
        });

        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::CountdownCancelled {
                student_id: "s1".to_string()
            }
        );
    }

    #[test]
    fn broadcast_without_subscribers_does_not_panic() {
        BroadcastNotifier::new(1).notify(Notification::AssignmentReverted {
            assignment_id: "a1".to_string(),
        });
    }

    #[test]
    fn notification_json_is_tagged() {
        let json = serde_json::to_value(Notification::AssignmentAborted {
            student_id: "s1".to_string(),
            reason: "no load".to_string(),
        })
        .unwrap();
        assert_eq!(json["event"], "assignment_aborted");
    }
}

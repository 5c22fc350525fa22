//! Task transitions as room broadcasts.

use std::sync::Arc;

use relay_core::{RoomKey, Task};
use relay_tasks::TaskNotifier;
use tracing::debug;

use crate::protocol::OutboundEvent;
use crate::rooms::RoomBroadcaster;

/// Publishes `task_update` to the task's user room and, when set, its
/// session room. A connection in both gets one copy.
pub struct RoomNotifier {
    rooms: Arc<RoomBroadcaster>,
}

impl RoomNotifier {
    /// Notifier publishing through `rooms`.
    pub fn new(rooms: Arc<RoomBroadcaster>) -> Self {
        Self { rooms }
    }
}

impl TaskNotifier for RoomNotifier {
    fn task_changed(&self, task: &Task) {
        let targets: Vec<RoomKey> = std::iter::once(RoomKey::user(&task.user_id))
            .chain(task.session_id.as_ref().map(RoomKey::session))
            .collect();
        let delivered = self
            .rooms
            .publish_many(&targets, &OutboundEvent::task_snapshot(task), None);
        debug!(task_id = %task.id, status = %task.status, delivered, "task transition published");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{ConnectionId, SessionId, TaskId, TaskType, UserId};
    use serde_json::{Value, json};

    use crate::outbox::Outbox;

    #[test]
    fn publishes_to_user_and_session_once() {
        let rooms = Arc::new(RoomBroadcaster::new());
        let (outbox, mut rx) = Outbox::channel(8);
        let id = ConnectionId::from("c1");
        rooms.attach(id.clone(), Arc::new(outbox));
        let _ = rooms.join(&id, RoomKey::user(&UserId::from("u1")));
        let _ = rooms.join(&id, RoomKey::session(&SessionId::from("s1")));

        let mut task = Task::pending(
            TaskId::from("t1"),
            TaskType::Custom,
            UserId::from("u1"),
            json!({}),
        )
        .with_session(SessionId::from("s1"));
        let _ = task.start();
        let _ = task.fail("boom");

        RoomNotifier::new(Arc::clone(&rooms)).task_changed(&task);

        let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["event"], "task_update");
        assert_eq!(frame["data"]["taskId"], "t1");
        assert_eq!(frame["data"]["status"], "failed");
        assert_eq!(frame["data"]["error"], "boom");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn nobody_listening_is_fine() {
        let rooms = Arc::new(RoomBroadcaster::new());
        let task = Task::pending(
            TaskId::from("t1"),
            TaskType::Custom,
            UserId::from("u1"),
            json!({}),
        );
        RoomNotifier::new(rooms).task_changed(&task);
    }
}

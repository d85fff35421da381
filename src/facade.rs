//! Scoped client facades.
//!
//! Thin domain vocabularies over the generic client: pure composition of
//! `send` and `subscribe_scoped`, with no connection state of their own.
//! They work before the connection opens — messages queue for replay and
//! subscriptions are effective immediately.

use crate::client::RealtimeClient;
use crate::dispatch::{EventHandler, Subscription};
use crate::message::OutboundMessage;

/// Project-collaboration vocabulary: presence and content locking.
#[derive(Clone)]
pub struct ProjectCollaboration {
    client: RealtimeClient,
}

impl ProjectCollaboration {
    pub fn new(client: &RealtimeClient) -> Self {
        Self {
            client: client.clone(),
        }
    }

    /// Join a project and receive its events (presence, locks, updates).
    pub fn join(&self, project_id: &str, handler: EventHandler) -> Subscription {
        self.client.send(
            OutboundMessage::new("join_project").with_field("project_id", project_id),
        );
        self.client.subscribe_scoped(project_id, handler)
    }

    /// Leave a project. Cancel the subscription returned by [`join`]
    /// separately.
    ///
    /// [`join`]: Self::join
    pub fn leave(&self, project_id: &str) -> bool {
        self.client.send(
            OutboundMessage::new("leave_project").with_field("project_id", project_id),
        )
    }

    /// Request an edit lock on a content item.
    pub fn lock_content(&self, content_id: &str) -> bool {
        self.client.send(
            OutboundMessage::new("lock_content").with_field("content_id", content_id),
        )
    }

    /// Release an edit lock.
    pub fn unlock_content(&self, content_id: &str) -> bool {
        self.client.send(
            OutboundMessage::new("unlock_content").with_field("content_id", content_id),
        )
    }
}

/// Content-generation task vocabulary: progress tracking.
#[derive(Clone)]
pub struct GenerationTasks {
    client: RealtimeClient,
}

impl GenerationTasks {
    pub fn new(client: &RealtimeClient) -> Self {
        Self {
            client: client.clone(),
        }
    }

    /// Watch a generation task: progress, completion and failure events for
    /// `task_id` are delivered to `handler`.
    pub fn watch(&self, task_id: &str, handler: EventHandler) -> Subscription {
        self.client
            .send(OutboundMessage::new("watch_task").with_field("task_id", task_id));
        self.client.subscribe_scoped(task_id, handler)
    }

    /// Stop watching a task. Cancel the subscription returned by [`watch`]
    /// separately.
    ///
    /// [`watch`]: Self::watch
    pub fn unwatch(&self, task_id: &str) -> bool {
        self.client
            .send(OutboundMessage::new("unwatch_task").with_field("task_id", task_id))
    }
}

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use praxis_core::{Field, Handle, Message, Promise};

/// Outcome of one action handler invocation. `Pending` leaves the
/// action live; the handler (or whoever it handed the [`ActionHandle`]
/// to) completes it later and the owning agent's sweep picks it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionStatus {
    Pending,
    Success,
    Fail,
}

#[derive(Clone, Default)]
struct CompletionCell {
    inner: Arc<Mutex<ActionStatus>>,
}

impl Default for ActionStatus {
    fn default() -> Self {
        ActionStatus::Pending
    }
}

/// Identifies a live action invocation and carries its completion cell.
/// Cloneable so a handler returning `Pending` can stash it and finish
/// the action from a later tick.
#[derive(Clone)]
pub struct ActionHandle {
    pub action: String,
    pub goal: Handle,
    cell: CompletionCell,
}

impl ActionHandle {
    pub fn new(action: impl Into<String>, goal: Handle) -> Self {
        Self {
            action: action.into(),
            goal,
            cell: CompletionCell::default(),
        }
    }

    pub fn succeed(&self) {
        *self.cell.inner.lock() = ActionStatus::Success;
    }

    pub fn fail(&self) {
        *self.cell.inner.lock() = ActionStatus::Fail;
    }

    pub fn status(&self) -> ActionStatus {
        *self.cell.inner.lock()
    }

    /// Record the handler's immediate return value. A terminal status
    /// is sticky; a later `Pending` write never resurrects the action.
    pub fn record(&self, status: ActionStatus) {
        if status != ActionStatus::Pending {
            *self.cell.inner.lock() = status;
        }
    }
}

impl fmt::Debug for ActionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionHandle")
            .field("action", &self.action)
            .field("goal", &self.goal)
            .field("status", &self.status())
            .finish()
    }
}

/// The capabilities an action or message handler gets over its agent.
/// Everything here queues an event: writes are observed on the next
/// tick, never within the current one.
pub trait AgentOps {
    fn handle(&self) -> &Handle;

    /// Shared reference to a local beliefset.
    fn belief(&self, name: &str) -> Option<Arc<Message>>;

    fn resource_level(&self, name: &str) -> Option<i64>;

    /// Queue a percept against a beliefset field of this agent.
    fn post_percept(&mut self, beliefset: &str, field: &str, value: Field);

    /// Queue a percept that sets a resource level directly.
    fn post_resource_percept(&mut self, resource: &str, value: i64);

    /// Queue a message to another agent (or this one).
    fn send_message(&mut self, recipient: &Handle, message: Message);

    /// Queue a goal pursue on this agent.
    fn pursue(&mut self, goal: &str, persistent: bool, parameters: Option<Message>) -> Promise;

    /// Queue a stop of this agent.
    fn stop(&mut self);

    /// Mark the current schedule for a forced replan.
    fn force_reschedule(&mut self);
}

/// An action handler: `(agent, request, reply, handle) -> status`.
pub type ActionHandler =
    Arc<dyn Fn(&mut dyn AgentOps, &Message, &mut Message, &ActionHandle) -> ActionStatus + Send + Sync>;

/// Legacy direct message handler, invoked inline instead of storing the
/// message into the belief context.
pub type MessageHandler = Arc<dyn Fn(&mut dyn AgentOps, &Message) + Send + Sync>;

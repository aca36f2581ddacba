use std::fmt;
use std::sync::Arc;

use praxis_core::{DropMode, Field, Handle, Message, Promise, UniqueId};
use praxis_model::ActionHandle;

/// Every state transition of an agent is driven by exactly one of
/// these. Events are tagged unions dispatched by variant; there is no
/// open event hierarchy.
#[derive(Debug)]
pub enum EventBody {
    Timer(TimerEvent),
    Control(ControlCommand),
    Message(MessageEvent),
    Tactic(TacticEvent),
    Action(ActionEvent),
    ActionComplete(ActionCompleteEvent),
    Percept(PerceptEvent),
    Pursue(PursueEvent),
    Drop(DropEvent),
    Schedule,
    Auction(AuctionEvent),
    Delegation(DelegationEvent),
    ShareBeliefSet(ShareBeliefSetEvent),
    Register(RegisterEvent),
}

impl EventBody {
    pub fn tag(&self) -> &'static str {
        match self {
            EventBody::Timer(_) => "TIMER",
            EventBody::Control(_) => "CONTROL",
            EventBody::Message(_) => "MESSAGE",
            EventBody::Tactic(_) => "TACTIC",
            EventBody::Action(_) => "ACTION",
            EventBody::ActionComplete(_) => "ACTION_COMPLETE",
            EventBody::Percept(_) => "PERCEPT",
            EventBody::Pursue(_) => "PURSUE",
            EventBody::Drop(_) => "DROP",
            EventBody::Schedule => "SCHEDULE",
            EventBody::Auction(_) => "AUCTION",
            EventBody::Delegation(_) => "DELEGATION",
            EventBody::ShareBeliefSet(_) => "SHARE_BELIEFSET",
            EventBody::Register(_) => "REGISTER",
        }
    }
}

/// Common envelope shared by every event.
pub struct Event {
    pub event_id: UniqueId,
    pub caller: Option<Handle>,
    pub recipient: Option<Handle>,
    pub reason: String,
    pub broadcast_to_bus: bool,
    pub body: EventBody,
}

impl Event {
    pub fn new(body: EventBody) -> Self {
        Self {
            event_id: UniqueId::random(),
            caller: None,
            recipient: None,
            reason: String::new(),
            broadcast_to_bus: true,
            body,
        }
    }

    pub fn with_id(mut self, id: UniqueId) -> Self {
        self.event_id = id;
        self
    }

    pub fn to(mut self, recipient: Handle) -> Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn from(mut self, caller: Handle) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn quiet(mut self) -> Self {
        self.broadcast_to_bus = false;
        self
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("tag", &self.body.tag())
            .field("event_id", &self.event_id)
            .field("caller", &self.caller)
            .field("recipient", &self.recipient)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
    Pause,
}

/// A sleep task in flight. The event is retained on the agent's timer
/// heap until the deadline passes.
#[derive(Debug, Clone)]
pub struct TimerEvent {
    pub duration_ms: u64,
    pub submitted_ms: u64,
    pub goal: Handle,
    pub plan: String,
    pub intention_id: UniqueId,
    pub task_id: UniqueId,
}

#[derive(Debug)]
pub struct MessageEvent {
    pub message: Arc<Message>,
    /// Legacy path: deliver straight to a registered message handler
    /// instead of the belief context.
    pub deprecated_direct: bool,
}

#[derive(Debug)]
pub struct TacticEvent {
    /// Tactic to select. A handle with a nil id selects by name.
    pub handle: Handle,
}

/// An action invocation travelling to its handler (local agent or an
/// attached service).
#[derive(Debug)]
pub struct ActionEvent {
    pub action: String,
    pub request: Message,
    pub reply: Message,
    pub goal: Handle,
    pub plan: String,
    pub intention_id: UniqueId,
    pub task_id: UniqueId,
    pub resource_locks: Vec<String>,
    pub handle: ActionHandle,
}

#[derive(Debug)]
pub struct ActionCompleteEvent {
    pub action: String,
    pub intention_id: UniqueId,
    pub task_id: UniqueId,
    pub success: bool,
    pub reply: Message,
}

/// External update to a single belief field (message field or resource
/// level).
#[derive(Debug)]
pub struct PerceptEvent {
    pub name: String,
    pub is_message: bool,
    pub field: String,
    pub value: Field,
}

pub struct PursueEvent {
    pub goal: String,
    pub parameters: Option<Arc<Message>>,
    pub persistent: bool,
    pub parent_intention_id: Option<UniqueId>,
    pub parent_task_id: Option<UniqueId>,
    pub promise: Promise,
}

impl fmt::Debug for PursueEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PursueEvent")
            .field("goal", &self.goal)
            .field("persistent", &self.persistent)
            .field("parent_intention_id", &self.parent_intention_id)
            .finish()
    }
}

#[derive(Debug)]
pub struct DropEvent {
    pub goal: Handle,
    pub mode: DropMode,
}

#[derive(Debug, Clone)]
pub struct AuctionBid {
    pub bidder: Handle,
    pub score: f32,
}

/// Collected bids returned to the schedule that requested them.
#[derive(Debug)]
pub struct AuctionEvent {
    pub goal: Handle,
    pub schedule_id: UniqueId,
    pub bids: Vec<AuctionBid>,
    pub missing_bids: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationStatus {
    Pending,
    Success,
    Fail,
}

/// Two-phase delegation: `analyse == true` asks a candidate member to
/// simulate the goal and bid; `analyse == false` hands the goal to the
/// elected winner. A non-`Pending` status marks the event as a reply
/// on its way back to the team.
#[derive(Debug)]
pub struct DelegationEvent {
    pub goal: Handle,
    pub parameters: Option<Arc<Message>>,
    pub analyse: bool,
    pub team: Handle,
    pub schedule_id: UniqueId,
    pub status: DelegationStatus,
    pub score: f32,
}

#[derive(Debug)]
pub struct ShareBeliefSetEvent {
    pub beliefset: Arc<Message>,
    pub owner_id: UniqueId,
    pub owner_name: String,
}

/// Registration of a remote BDI entity. Agents never handle this; it
/// is forwarded to the engine.
#[derive(Debug)]
pub struct RegisterEvent {
    pub kind: String,
    pub name: String,
}

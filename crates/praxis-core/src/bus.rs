use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::id::{Handle, UniqueId};
use crate::message::{Field, Message};
use crate::promise::GoalResult;

/// How a goal is removed: Normal lets the current task reach a
/// cancellation point and runs conclude-phase teardown; Force discards
/// the intention without it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DropMode {
    Normal,
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BdiLogLevel {
    Normal,
    Important,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BdiLogHeader {
    pub agent: String,
    pub agent_id: UniqueId,
    pub level: BdiLogLevel,
    pub timestamp_ms: u64,
}

/// BDI reasoning trace entries mirrored onto the bus for listening
/// tooling. The core emits these best-effort; a lossy or absent adapter
/// never blocks progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BdiLog {
    GoalStarted {
        goal: String,
        goal_id: UniqueId,
    },
    GoalFinished {
        goal: String,
        goal_id: UniqueId,
        result: GoalResult,
        reason: String,
    },
    SubGoalStarted {
        goal: String,
        goal_id: UniqueId,
        intention_id: UniqueId,
        task_id: UniqueId,
    },
    SubGoalFinished {
        goal: String,
        goal_id: UniqueId,
        intention_id: UniqueId,
        task_id: UniqueId,
        result: GoalResult,
        reason: String,
    },
    ActionStarted {
        goal: String,
        goal_id: UniqueId,
        intention_id: UniqueId,
        plan: String,
        task_id: UniqueId,
        action: String,
    },
    ActionFinished {
        goal: String,
        goal_id: UniqueId,
        intention_id: UniqueId,
        plan: String,
        task_id: UniqueId,
        action: String,
        success: bool,
    },
    SleepStarted {
        goal: String,
        goal_id: UniqueId,
        intention_id: UniqueId,
        plan: String,
        task_id: UniqueId,
        duration_ms: u64,
    },
    SleepFinished {
        goal: String,
        goal_id: UniqueId,
        intention_id: UniqueId,
        plan: String,
        task_id: UniqueId,
    },
}

/// Payload variants the core mirrors onto the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "payload", rename_all = "snake_case")]
pub enum BusPayload {
    Percept {
        beliefset: String,
        field: String,
        value: Field,
    },
    Message {
        message: Message,
    },
    Pursue {
        goal: String,
        goal_id: UniqueId,
        persistent: bool,
        parameters: Option<Message>,
    },
    Drop {
        goal: String,
        goal_id: UniqueId,
        mode: DropMode,
        reason: String,
    },
    ShareBeliefSet {
        beliefset: Message,
        owner_id: UniqueId,
        owner_name: String,
    },
    BdiLog {
        header: BdiLogHeader,
        entry: BdiLog,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEnvelope {
    pub sender: Handle,
    pub recipient: Handle,
    pub event_id: UniqueId,
    pub payload: BusPayload,
}

/// Opaque sink for protocol events. Sends are best-effort: adapters
/// must not block, and the core never retries.
pub trait BusAdapter: Send + Sync {
    fn send(&self, envelope: BusEnvelope);
}

/// Records every envelope; the test suites assert against it.
#[derive(Default)]
pub struct MemoryBus {
    events: Mutex<Vec<BusEnvelope>>,
}

impl MemoryBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<BusEnvelope> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<BusEnvelope> {
        std::mem::take(&mut self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Count of BDI log entries matching a predicate.
    pub fn count_logs(&self, predicate: impl Fn(&BdiLog) -> bool) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|envelope| match &envelope.payload {
                BusPayload::BdiLog { entry, .. } => predicate(entry),
                _ => false,
            })
            .count()
    }
}

impl BusAdapter for MemoryBus {
    fn send(&self, envelope: BusEnvelope) {
        self.events.lock().push(envelope);
    }
}

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use praxis_core::{Handle, UniqueId};
use praxis_model::{AgentTemplate, ServiceTemplate};

use crate::event::Event;

/// What a directory entry fronts. Templates ride along so peers can
/// reason about each other (a team checks a member's plan library when
/// collecting delegate candidates) without reaching into live state.
#[derive(Clone)]
pub enum MailboxKind {
    Agent { template: Arc<AgentTemplate> },
    Service { template: Arc<ServiceTemplate> },
    Engine,
}

/// The per-agent inbound event queue. This is the only mutable surface
/// shared between threads: foreign callers and the engine router push
/// here, the owner drains one batch per tick. Events pushed during a
/// tick are not observed until the next one.
#[derive(Clone)]
pub struct Mailbox {
    pub handle: Handle,
    pub kind: MailboxKind,
    queue: Arc<Mutex<VecDeque<Event>>>,
}

impl Mailbox {
    pub fn new(handle: Handle, kind: MailboxKind) -> Self {
        Self {
            handle,
            kind,
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn push(&self, event: Event) {
        self.queue.lock().push_back(event);
    }

    pub fn drain(&self) -> Vec<Event> {
        self.queue.lock().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn agent_template(&self) -> Option<Arc<AgentTemplate>> {
        match &self.kind {
            MailboxKind::Agent { template } => Some(Arc::clone(template)),
            _ => None,
        }
    }
}

/// Shared directory of every mailbox the engine owns, keyed by entity
/// id. Agents hold a clone to route events to peers; external
/// `AgentHandle`s hold one to publish API calls.
pub type Directory = Arc<DashMap<UniqueId, Mailbox>>;

/// Routes an event to its recipient's mailbox, best-effort. Messages to
/// departed entities are dropped with a log line, never an error.
pub fn route(directory: &Directory, recipient: &Handle, event: Event) {
    match directory.get(&recipient.id) {
        Some(mailbox) => mailbox.push(event),
        None => {
            debug!(recipient = %recipient, tag = event.body.tag(), "dropping event for unknown recipient");
        }
    }
}

/// Wakes the engine's background loop when work arrives so an idle
/// engine does not sit out a full tick interval.
#[derive(Default)]
pub struct Notifier {
    flag: Mutex<bool>,
    condvar: Condvar,
}

impl Notifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notify(&self) {
        let mut flag = self.flag.lock();
        *flag = true;
        self.condvar.notify_all();
    }

    /// Wait until notified or the timeout elapses; clears the flag.
    pub fn wait_timeout(&self, timeout: Duration) {
        let mut flag = self.flag.lock();
        if !*flag {
            let _ = self.condvar.wait_for(&mut flag, timeout);
        }
        *flag = false;
    }
}

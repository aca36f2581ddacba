use std::sync::Arc;

use tracing::{debug, warn};

use praxis_core::{
    BdiLog, BdiLogHeader, BdiLogLevel, BusAdapter, BusEnvelope, BusPayload, Field, Handle, Message,
    Promise, UniqueId,
};
use praxis_model::{ActionStatus, AgentOps, ServiceTemplate};

use crate::event::{ActionCompleteEvent, ActionEvent, Event, EventBody};
use crate::routing::{route, Directory, Mailbox};

/// A service: a detached bundle of action handlers agents can attach
/// to. Services dispatch the actions agents forward to them and report
/// completions back to the owning intention. When a service handles an
/// action it also owns the bus mirror for it.
pub struct Service {
    handle: Handle,
    template: Arc<ServiceTemplate>,
    directory: Directory,
    mailbox: Mailbox,
    bus: Option<Arc<dyn BusAdapter>>,
    current_actions: Vec<(ActionEvent, Handle)>,
    now_ms: u64,
}

impl Service {
    pub fn new(
        handle: Handle,
        template: Arc<ServiceTemplate>,
        directory: Directory,
        mailbox: Mailbox,
        bus: Option<Arc<dyn BusAdapter>>,
    ) -> Self {
        Self {
            handle,
            template,
            directory,
            mailbox,
            bus,
            current_actions: Vec::new(),
            now_ms: 0,
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn template(&self) -> &Arc<ServiceTemplate> {
        &self.template
    }

    pub fn is_idle(&self) -> bool {
        self.mailbox.is_empty() && self.current_actions.is_empty()
    }

    fn bdi_log(&self, entry: BdiLog) {
        if let Some(bus) = &self.bus {
            bus.send(BusEnvelope {
                sender: self.handle.clone(),
                recipient: self.handle.clone(),
                event_id: UniqueId::random(),
                payload: BusPayload::BdiLog {
                    header: BdiLogHeader {
                        agent: self.handle.name.clone(),
                        agent_id: self.handle.id,
                        level: BdiLogLevel::Normal,
                        timestamp_ms: self.now_ms,
                    },
                    entry,
                },
            });
        }
    }

    pub fn dispatch(&mut self, event: Event, now_ms: u64) {
        self.now_ms = now_ms;
        let caller = event.caller.clone();
        match event.body {
            EventBody::Action(mut ev) => {
                let Some(caller) = caller else {
                    warn!(service = %self.handle, action = %ev.action, "action forwarded without a caller");
                    return;
                };
                let Some(handler) = self.template.action_handler(&ev.action).cloned() else {
                    warn!(service = %self.handle, action = %ev.action, "service cannot handle forwarded action");
                    self.report(&caller, ev, false);
                    return;
                };

                self.bdi_log(BdiLog::ActionStarted {
                    goal: ev.goal.name.clone(),
                    goal_id: ev.goal.id,
                    intention_id: ev.intention_id,
                    plan: ev.plan.clone(),
                    task_id: ev.task_id,
                    action: ev.action.clone(),
                });

                let request = std::mem::replace(&mut ev.request, Message::new(""));
                let mut reply = std::mem::replace(&mut ev.reply, Message::new(""));
                let status = handler(self, &request, &mut reply, &ev.handle);
                ev.request = request;
                ev.reply = reply;
                ev.handle.record(status);

                if ev.handle.status() == ActionStatus::Pending {
                    self.current_actions.push((ev, caller));
                } else {
                    let success = ev.handle.status() == ActionStatus::Success;
                    self.report(&caller, ev, success);
                }
            }
            other => {
                debug!(service = %self.handle, tag = other.tag(), "service ignoring event");
            }
        }
    }

    /// Sweep actions whose handlers finished asynchronously.
    pub fn run(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        let actions = std::mem::take(&mut self.current_actions);
        for (ev, caller) in actions {
            match ev.handle.status() {
                ActionStatus::Pending => self.current_actions.push((ev, caller)),
                status => {
                    let success = status == ActionStatus::Success;
                    self.report(&caller, ev, success);
                }
            }
        }
    }

    fn report(&mut self, caller: &Handle, ev: ActionEvent, success: bool) {
        self.bdi_log(BdiLog::ActionFinished {
            goal: ev.goal.name.clone(),
            goal_id: ev.goal.id,
            intention_id: ev.intention_id,
            plan: ev.plan.clone(),
            task_id: ev.task_id,
            action: ev.action.clone(),
            success,
        });
        let event = Event::new(EventBody::ActionComplete(ActionCompleteEvent {
            action: ev.action,
            intention_id: ev.intention_id,
            task_id: ev.task_id,
            success,
            reply: ev.reply,
        }))
        .from(self.handle.clone())
        .to(caller.clone())
        .quiet();
        route(&self.directory, caller, event);
    }
}

/// Services expose the same handler-facing surface as agents, but most
/// of it is inert: a service has no beliefs, desires or schedule.
impl AgentOps for Service {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    fn belief(&self, _name: &str) -> Option<Arc<Message>> {
        None
    }

    fn resource_level(&self, _name: &str) -> Option<i64> {
        None
    }

    fn post_percept(&mut self, beliefset: &str, _field: &str, _value: Field) {
        warn!(service = %self.handle, beliefset, "services hold no beliefs; percept dropped");
    }

    fn post_resource_percept(&mut self, resource: &str, _value: i64) {
        warn!(service = %self.handle, resource, "services hold no resources; percept dropped");
    }

    fn send_message(&mut self, recipient: &Handle, message: Message) {
        let event = Event::new(EventBody::Message(crate::event::MessageEvent {
            message: Arc::new(message),
            deprecated_direct: false,
        }))
        .from(self.handle.clone())
        .to(recipient.clone());
        route(&self.directory, recipient, event);
    }

    fn pursue(&mut self, goal: &str, _persistent: bool, _parameters: Option<Message>) -> Promise {
        warn!(service = %self.handle, goal, "services cannot pursue goals");
        Promise::new()
    }

    fn stop(&mut self) {
        warn!(service = %self.handle, "services are stopped by the engine, not by handlers");
    }

    fn force_reschedule(&mut self) {}
}

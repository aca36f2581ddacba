use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use praxis_core::{
    BdiLog, BdiLogHeader, BdiLogLevel, BeliefContext, BusAdapter, BusEnvelope, BusPayload,
    DropMode, Field, GoalResult, Handle, Message, Promise, TimerQueue, UniqueId,
};
use praxis_model::{
    ActionHandle, AgentOps, AgentTemplate, ModelRegistry, Plan, PlanSelectionPolicy,
    ServiceTemplate, Tactic, FAILED_COST,
};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::event::{
    ActionCompleteEvent, ActionEvent, AuctionBid, AuctionEvent, ControlCommand, DelegationEvent,
    DelegationStatus, DropEvent, Event, EventBody, MessageEvent, PerceptEvent, PursueEvent,
    ShareBeliefSetEvent, TimerEvent,
};
use crate::executor::{ExecutorEffect, IntentionExecutor, RunningState};
use crate::routing::{route, Directory, Mailbox};
use crate::schedule::{Schedule, ScheduleDesire, ScheduleRequest, ScheduledIntention};

/// Replan triggers, a bitset. A subset of the flags preempts an
/// in-flight search; the rest defer the replan to the next idle
/// transition so rapid percept streams cannot live-lock planning.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleDirty(u16);

impl ScheduleDirty {
    pub const AGENT_STARTED: u16 = 1 << 0;
    pub const MESSAGE: u16 = 1 << 1;
    pub const PERCEPT: u16 = 1 << 2;
    pub const GOAL_ADDED: u16 = 1 << 3;
    pub const GOAL_REMOVED: u16 = 1 << 4;
    pub const MEMBER_REMOVED: u16 = 1 << 5;
    pub const TACTICS_CHANGED: u16 = 1 << 6;
    pub const FORCE: u16 = 1 << 7;

    pub const PREEMPT: u16 = Self::GOAL_REMOVED | Self::MEMBER_REMOVED | Self::FORCE;

    pub fn set(&mut self, flag: u16) {
        self.0 |= flag;
    }

    pub fn any(&self, mask: u16) -> bool {
        self.0 & mask != 0
    }

    pub fn is_clear(&self) -> bool {
        self.0 == 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        for (flag, name) in [
            (Self::AGENT_STARTED, "agent-started"),
            (Self::MESSAGE, "message"),
            (Self::PERCEPT, "percept"),
            (Self::GOAL_ADDED, "goal-added"),
            (Self::GOAL_REMOVED, "goal-removed"),
            (Self::MEMBER_REMOVED, "member-removed"),
            (Self::TACTICS_CHANGED, "tactics-changed"),
            (Self::FORCE, "force"),
        ] {
            if self.any(flag) {
                parts.push(name);
            }
        }
        parts.join(";")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Stopped,
    Running,
    Paused,
    Stopping,
}

#[derive(Debug, Clone, Copy)]
pub struct DesireParent {
    pub intention_id: UniqueId,
    pub task_id: UniqueId,
}

/// A goal instance this agent has adopted.
pub struct DesireState {
    pub id: UniqueId,
    pub handle: Handle,
    pub goal: Arc<praxis_model::Goal>,
    pub parameters: Option<Arc<Message>>,
    pub persistent: bool,
    pub delegated: bool,
    pub parent: Option<DesireParent>,
    pub promise: Promise,
    pub failed_plans: Vec<String>,
    pub attempts: usize,
    /// A persistent desire parks here after success until beliefs move
    /// again; without this latch a completed maintenance goal would
    /// re-run every idle tick.
    pub dormant: bool,
}

struct CurrentAuction {
    goal: Handle,
    schedule_id: UniqueId,
    expiry_ms: u64,
    expected: usize,
    candidates: Vec<Handle>,
    bids: Vec<AuctionBid>,
}

impl CurrentAuction {
    fn finished(&self, now_ms: u64) -> bool {
        now_ms >= self.expiry_ms || self.bids.len() >= self.expected
    }
}

/// A delegation analysis in progress: the sandbox schedule simulates
/// the delegated goal against clones of this agent's desires without
/// touching the live schedule.
struct DelegationBacklogEntry {
    caller: Handle,
    team: Handle,
    goal: Handle,
    delegator_schedule_id: UniqueId,
    already_executing: bool,
    invalid: bool,
    schedule: Option<Schedule>,
}

/// A BDI agent: belief context, desires, executor, schedule, and the
/// event dispatcher that is the sole mutator of all of it. Teams and
/// proxies are agents with capability flags set.
pub struct Agent {
    handle: Handle,
    template: Arc<AgentTemplate>,
    registry: Arc<ModelRegistry>,
    config: EngineConfig,
    state: AgentState,
    context: BeliefContext,
    desires: Vec<DesireState>,
    executor: IntentionExecutor,
    schedule: Option<Schedule>,
    dirty: ScheduleDirty,
    timers: TimerQueue<TimerEvent>,
    current_actions: Vec<ActionEvent>,
    current_auctions: Vec<CurrentAuction>,
    delegation_backlog: Vec<DelegationBacklogEntry>,
    tactics: HashMap<String, Arc<Tactic>>,
    attached_services: Vec<(Handle, Arc<ServiceTemplate>)>,
    team_members: Vec<Handle>,
    team_memberships: Vec<Handle>,
    last_dirtied_ms: u64,
    last_shared_ms: u64,
    backlog_count: u64,
    backlog_warned: bool,
    directory: Directory,
    mailbox: Mailbox,
    engine_handle: Handle,
    bus: Option<Arc<dyn BusAdapter>>,
    now_ms: u64,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        handle: Handle,
        template: Arc<AgentTemplate>,
        registry: Arc<ModelRegistry>,
        config: EngineConfig,
        directory: Directory,
        mailbox: Mailbox,
        engine_handle: Handle,
        bus: Option<Arc<dyn BusAdapter>>,
    ) -> Self {
        let mut context = BeliefContext::new();
        for schema_name in template.beliefs() {
            match registry.schema(schema_name) {
                Some(schema) => context.add_message(Arc::new(schema.instantiate())),
                None => warn!(agent = %handle, schema = %schema_name, "declared beliefset has no registered schema"),
            }
        }
        for resource_name in template.resources() {
            match registry.resource_def(resource_name) {
                Some(def) => context.add_resource(def.instantiate()),
                None => warn!(agent = %handle, resource = %resource_name, "declared resource is not registered"),
            }
        }

        Self {
            handle,
            template,
            registry,
            config,
            state: AgentState::Stopped,
            context,
            desires: Vec::new(),
            executor: IntentionExecutor::new(),
            schedule: None,
            dirty: ScheduleDirty::default(),
            timers: TimerQueue::new(),
            current_actions: Vec::new(),
            current_auctions: Vec::new(),
            delegation_backlog: Vec::new(),
            tactics: HashMap::new(),
            attached_services: Vec::new(),
            team_members: Vec::new(),
            team_memberships: Vec::new(),
            last_dirtied_ms: 0,
            last_shared_ms: 0,
            backlog_count: 0,
            backlog_warned: false,
            directory,
            mailbox,
            engine_handle,
            bus,
            now_ms: 0,
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn running(&self) -> bool {
        self.state == AgentState::Running
    }

    pub fn stopped(&self) -> bool {
        self.state == AgentState::Stopped
    }

    pub fn is_team(&self) -> bool {
        self.template.is_team()
    }

    pub fn running_state(&self) -> RunningState {
        self.executor.running_state()
    }

    pub fn desires(&self) -> Vec<Handle> {
        self.desires.iter().map(|d| d.handle.clone()).collect()
    }

    pub fn has_desire(&self, id: UniqueId) -> bool {
        self.desires.iter().any(|d| d.id == id)
    }

    pub fn intentions(&self) -> Vec<Handle> {
        self.executor
            .intentions()
            .map(|i| Handle::new(i.plan_name(), i.id))
            .collect()
    }

    pub fn current_tactic(&self, goal: &str) -> Option<&Arc<Tactic>> {
        self.tactics.get(goal)
    }

    pub fn members(&self) -> &[Handle] {
        &self.team_members
    }

    /// Shared reference to a local beliefset.
    pub fn belief(&self, schema: &str) -> Option<Arc<Message>> {
        self.context.message(schema)
    }

    pub fn resource(&self, name: &str) -> Option<i64> {
        self.context.resource(name).map(|r| r.current())
    }

    /// Beliefsets received from teammates for a schema, by owner.
    pub fn shared_beliefs(&self, schema: &str) -> Vec<(UniqueId, Arc<Message>)> {
        self.context
            .shared(schema)
            .iter()
            .map(|entry| (entry.owner_id, Arc::clone(&entry.beliefset)))
            .collect()
    }

    /// Whether any events are queued for this agent.
    pub fn has_events(&self) -> bool {
        !self.mailbox.is_empty()
    }

    /// No pending work of any kind. The engine's run-until-idle loop
    /// keys off this. Stopped and paused agents count as idle; their
    /// backlogged events wait for a resume.
    pub fn is_idle(&self) -> bool {
        match self.state {
            AgentState::Stopped | AgentState::Paused => true,
            AgentState::Stopping => false,
            AgentState::Running => {
                self.mailbox.is_empty()
                    && self.executor.done()
                    && self.schedule.is_none()
                    && self.timers.is_empty()
                    && self.current_actions.is_empty()
                    && self.current_auctions.is_empty()
                    && self.delegation_backlog.is_empty()
                    && self.dirty.is_clear()
                    && self.desires.iter().all(|d| d.dormant)
            }
        }
    }

    fn post_self(&self, event: Event) {
        self.mailbox.push(event);
    }

    fn bdi_header(&self) -> BdiLogHeader {
        BdiLogHeader {
            agent: self.handle.name.clone(),
            agent_id: self.handle.id,
            level: BdiLogLevel::Normal,
            timestamp_ms: self.now_ms,
        }
    }

    fn bdi_log(&self, entry: BdiLog) {
        if let Some(bus) = &self.bus {
            bus.send(BusEnvelope {
                sender: self.handle.clone(),
                recipient: self.handle.clone(),
                event_id: UniqueId::random(),
                payload: BusPayload::BdiLog {
                    header: self.bdi_header(),
                    entry,
                },
            });
        }
    }

    /// Mirror events that might have been routed purely locally onto
    /// the bus so listening tooling sees them.
    fn mirror(&self, event: &Event) {
        let Some(bus) = &self.bus else { return };
        if !event.broadcast_to_bus {
            return;
        }
        let payload = match &event.body {
            EventBody::Message(ev) => BusPayload::Message {
                message: (*ev.message).clone(),
            },
            EventBody::Percept(ev) if ev.is_message => BusPayload::Percept {
                beliefset: ev.name.clone(),
                field: ev.field.clone(),
                value: ev.value.clone(),
            },
            EventBody::Pursue(ev) => BusPayload::Pursue {
                goal: ev.goal.clone(),
                goal_id: event.event_id,
                persistent: ev.persistent,
                parameters: ev.parameters.as_deref().cloned(),
            },
            EventBody::Drop(ev) => BusPayload::Drop {
                goal: ev.goal.name.clone(),
                goal_id: ev.goal.id,
                mode: ev.mode,
                reason: event.reason.clone(),
            },
            EventBody::ShareBeliefSet(ev) => BusPayload::ShareBeliefSet {
                beliefset: (*ev.beliefset).clone(),
                owner_id: ev.owner_id,
                owner_name: ev.owner_name.clone(),
            },
            _ => return,
        };
        bus.send(BusEnvelope {
            sender: event.caller.clone().unwrap_or_else(|| self.handle.clone()),
            recipient: event
                .recipient
                .clone()
                .unwrap_or_else(|| self.handle.clone()),
            event_id: event.event_id,
            payload,
        });
    }

    // ------------------------------------------------------------------
    // Event dispatch
    // ------------------------------------------------------------------

    /// Sole serial mutator of agent state: translate one event into a
    /// state transition. Events for other agents are rewritten and
    /// routed onward without further processing.
    pub fn dispatch(&mut self, mut event: Event, now_ms: u64) {
        self.now_ms = now_ms;

        if let Some(recipient) = event.recipient.clone() {
            if recipient.id != self.handle.id {
                event.caller = Some(self.handle.clone());
                route(&self.directory, &recipient, event);
                return;
            }
        }

        if !matches!(event.body, EventBody::Control(_)) && self.state != AgentState::Running {
            self.backlog_count += 1;
        }

        if self.template.is_proxy() {
            // Proxies only relay onto the bus; the real instance lives
            // elsewhere.
            self.mirror(&event);
            return;
        }

        match &event.body {
            EventBody::Message(_)
            | EventBody::Percept(_)
            | EventBody::Pursue(_)
            | EventBody::Drop(_)
            | EventBody::ShareBeliefSet(_) => self.mirror(&event),
            _ => {}
        }

        let event_id = event.event_id;
        let caller = event.caller.clone();
        let reason = event.reason.clone();

        match event.body {
            EventBody::Timer(mut ev) => {
                ev.submitted_ms = now_ms;
                self.bdi_log(BdiLog::SleepStarted {
                    goal: ev.goal.name.clone(),
                    goal_id: ev.goal.id,
                    intention_id: ev.intention_id,
                    plan: ev.plan.clone(),
                    task_id: ev.task_id,
                    duration_ms: ev.duration_ms,
                });
                let due = now_ms + ev.duration_ms;
                self.timers.push(due, ev);
            }

            EventBody::Control(command) => self.handle_control(command),

            EventBody::Message(ev) => self.handle_message(ev),

            EventBody::Tactic(ev) => {
                if self.set_tactic_internal(&ev.handle) {
                    self.dirty.set(ScheduleDirty::TACTICS_CHANGED);
                }
            }

            EventBody::Action(ev) => self.handle_action(ev),

            EventBody::ActionComplete(ev) => {
                if !self
                    .executor
                    .on_action_complete(ev.intention_id, ev.task_id, ev.success)
                {
                    warn!(
                        agent = %self.handle,
                        action = %ev.action,
                        task = %ev.task_id,
                        "action completed but associated task no longer exists"
                    );
                }
            }

            EventBody::Percept(ev) => self.handle_percept(ev),

            EventBody::Pursue(ev) => self.handle_pursue(event_id, ev),

            EventBody::Drop(ev) => self.handle_drop(&ev.goal, ev.mode, &reason),

            EventBody::Schedule => {
                warn!(agent = %self.handle, "re-schedule event not handled by the agent");
            }

            EventBody::Auction(ev) => self.handle_auction(ev),

            EventBody::Delegation(ev) => self.handle_delegation(caller, ev),

            EventBody::ShareBeliefSet(ev) => {
                self.context
                    .upsert_shared(ev.owner_id, &ev.owner_name, ev.beliefset, now_ms);
                // The shared beliefset may influence goals in flight.
                self.dirty.set(ScheduleDirty::PERCEPT);
            }

            EventBody::Register(ev) => {
                debug!(agent = %self.handle, kind = %ev.kind, name = %ev.name, "forwarding registration to the engine");
                let engine = self.engine_handle.clone();
                let forwarded = Event::new(EventBody::Register(ev))
                    .from(self.handle.clone())
                    .to(engine.clone());
                route(&self.directory, &engine, forwarded);
            }
        }
    }

    fn handle_control(&mut self, command: ControlCommand) {
        let prev = self.state;
        match command {
            ControlCommand::Start => {
                if matches!(self.state, AgentState::Stopped | AgentState::Paused) {
                    self.state = AgentState::Running;
                }
            }
            ControlCommand::Pause => {
                if self.state == AgentState::Running {
                    self.state = AgentState::Paused;
                }
            }
            ControlCommand::Stop => {
                if matches!(self.state, AgentState::Running | AgentState::Paused) {
                    self.state = AgentState::Stopping;
                }
            }
        }

        if prev == self.state {
            return;
        }

        debug!(agent = %self.handle, ?prev, state = ?self.state, "control transition");
        match self.state {
            AgentState::Running => {
                self.dirty.set(ScheduleDirty::AGENT_STARTED);
                self.executor.resume();
            }
            AgentState::Paused => {
                self.backlog_warned = false;
                self.backlog_count = 0;
            }
            AgentState::Stopping => {
                self.executor.stop();
                for desire in &self.desires {
                    self.post_self(
                        Event::new(EventBody::Drop(DropEvent {
                            goal: desire.handle.clone(),
                            mode: DropMode::Force,
                        }))
                        .reason(format!("agent '{}' stopping", self.handle.name))
                        .quiet(),
                    );
                }
            }
            AgentState::Stopped => {
                self.backlog_warned = false;
                self.backlog_count = 0;
            }
        }
    }

    fn handle_message(&mut self, ev: MessageEvent) {
        let schema = ev.message.schema().to_string();
        if ev.deprecated_direct {
            match self.template.message_handler(&schema).cloned() {
                Some(handler) => {
                    let message = Arc::clone(&ev.message);
                    handler(self, &message);
                }
                None => warn!(agent = %self.handle, message = %schema, "message is not handled by the agent"),
            }
            return;
        }

        if self.context.has_message(&schema) {
            self.context.add_message(ev.message);
            self.dirty.set(ScheduleDirty::MESSAGE);
            self.last_dirtied_ms = self.now_ms;
        } else {
            debug!(agent = %self.handle, message = %schema, "message received for undeclared beliefset");
        }
    }

    fn handle_percept(&mut self, ev: PerceptEvent) {
        let handled = if ev.is_message {
            let applied = self
                .context
                .set_message_field(&ev.name, &ev.field, ev.value.clone());
            if !applied {
                debug!(agent = %self.handle, beliefset = %ev.name, field = %ev.field, "percept references a missing beliefset or field");
            }
            applied
        } else {
            match (self.context.resource_mut(&ev.name), ev.value.as_i64()) {
                (Some(resource), Some(value)) => {
                    resource.set(value);
                    true
                }
                _ => {
                    debug!(agent = %self.handle, resource = %ev.name, "resource percept references an unknown resource");
                    false
                }
            }
        };

        if handled {
            self.dirty.set(ScheduleDirty::PERCEPT);
            self.last_dirtied_ms = self.now_ms;
        }
    }

    fn handle_action(&mut self, mut ev: ActionEvent) {
        match self.template.action_handler(&ev.action).cloned() {
            Some(handler) => {
                self.bdi_log(BdiLog::ActionStarted {
                    goal: ev.goal.name.clone(),
                    goal_id: ev.goal.id,
                    intention_id: ev.intention_id,
                    plan: ev.plan.clone(),
                    task_id: ev.task_id,
                    action: ev.action.clone(),
                });

                self.context.lock_resources(&ev.resource_locks);
                debug_assert!(
                    self.context.resource_violation().is_none(),
                    "resources were not locked and unlocked in tandem"
                );
                if let Some(resource) = self.context.resource_violation() {
                    error!(agent = %self.handle, error = %EngineError::ResourceViolation(resource.to_string()), "resource out of range while locking for an action");
                }

                let request = std::mem::replace(&mut ev.request, Message::new(""));
                let mut reply = std::mem::replace(&mut ev.reply, Message::new(""));
                let status = handler(self, &request, &mut reply, &ev.handle);
                ev.request = request;
                ev.reply = reply;
                ev.handle.record(status);

                // Fast-track: finalize immediately when the handler is
                // already done, instead of waiting for the next sweep.
                if ev.handle.status() != praxis_model::ActionStatus::Pending {
                    self.complete_action(ev);
                } else {
                    self.current_actions.push(ev);
                }
            }
            None => {
                let service = self
                    .attached_services
                    .iter()
                    .find(|(_, template)| template.handles_action(&ev.action))
                    .map(|(handle, _)| handle.clone());
                match service {
                    Some(service) => {
                        debug!(agent = %self.handle, action = %ev.action, service = %service, "forwarding action to attached service");
                        let event = Event::new(EventBody::Action(ev))
                            .from(self.handle.clone())
                            .to(service.clone());
                        route(&self.directory, &service, event);
                    }
                    None => {
                        warn!(agent = %self.handle, error = %EngineError::UnhandledAction(ev.action.clone()), "action fails the intention");
                        self.post_self(
                            Event::new(EventBody::ActionComplete(ActionCompleteEvent {
                                action: ev.action,
                                intention_id: ev.intention_id,
                                task_id: ev.task_id,
                                success: false,
                                reply: ev.reply,
                            }))
                            .quiet(),
                        );
                    }
                }
            }
        }
    }

    fn complete_action(&mut self, ev: ActionEvent) {
        let success = ev.handle.status() == praxis_model::ActionStatus::Success;
        self.context.unlock_resources(&ev.resource_locks);
        self.bdi_log(BdiLog::ActionFinished {
            goal: ev.goal.name.clone(),
            goal_id: ev.goal.id,
            intention_id: ev.intention_id,
            plan: ev.plan.clone(),
            task_id: ev.task_id,
            action: ev.action.clone(),
            success,
        });
        self.post_self(
            Event::new(EventBody::ActionComplete(ActionCompleteEvent {
                action: ev.action,
                intention_id: ev.intention_id,
                task_id: ev.task_id,
                success,
                reply: ev.reply,
            }))
            .quiet(),
        );
    }

    // ------------------------------------------------------------------
    // Pursue
    // ------------------------------------------------------------------

    fn handle_pursue(&mut self, event_id: UniqueId, ev: PursueEvent) {
        // Merge by id: a re-pursue of the same desire adopts the new
        // promise and parameters. The earlier promise never fires.
        if let Some(desire) = self.desires.iter_mut().find(|d| d.id == event_id) {
            debug!(agent = %self.handle, goal = %desire.handle, "goal pursue with same id, merging");
            desire.promise = ev.promise;
            desire.parameters = ev.parameters;
            if desire.dormant {
                desire.dormant = false;
                self.dirty.set(ScheduleDirty::GOAL_ADDED);
            }
            return;
        }

        // Merge repeated persistent root goals.
        if ev.persistent {
            if let Some(desire) = self.desires.iter_mut().find(|d| {
                d.handle.name == ev.goal
                    && (d.parameters.is_none() || d.parameters.as_deref() == ev.parameters.as_deref())
            }) {
                debug!(agent = %self.handle, goal = %ev.goal, "dropping duplicate persistent goal");
                desire.promise = ev.promise;
                if desire.dormant {
                    desire.dormant = false;
                    self.dirty.set(ScheduleDirty::GOAL_ADDED);
                }
                return;
            }
        }

        let label = if ev.parent_intention_id.is_some() {
            "sub-goal"
        } else {
            "goal"
        };

        if let Err(problem) = self.validate_goal_parameters(&ev.goal, ev.parameters.as_deref()) {
            warn!(agent = %self.handle, goal = %ev.goal, %problem, "{label} pursue rejected");
            return;
        }
        let goal = self
            .registry
            .goal(&ev.goal)
            .expect("goal validated above");

        let delegated = self
            .registry
            .plans_for_goal(&ev.goal, self.template.plans())
            .is_empty();

        let parent = ev.parent_intention_id.and_then(|intention_id| {
            let task_id = ev.parent_task_id?;
            self.executor.record_sub_goal(intention_id, event_id);
            Some(DesireParent {
                intention_id,
                task_id,
            })
        });

        let handle = Handle::new(ev.goal.clone(), event_id);
        debug!(agent = %self.handle, desire = %handle, persistent = ev.persistent, "{label} pursue");

        match &parent {
            Some(parent) => self.bdi_log(BdiLog::SubGoalStarted {
                goal: handle.name.clone(),
                goal_id: handle.id,
                intention_id: parent.intention_id,
                task_id: parent.task_id,
            }),
            None => self.bdi_log(BdiLog::GoalStarted {
                goal: handle.name.clone(),
                goal_id: handle.id,
            }),
        }

        self.desires.push(DesireState {
            id: event_id,
            handle,
            goal,
            parameters: ev.parameters,
            persistent: ev.persistent,
            delegated,
            parent,
            promise: ev.promise,
            failed_plans: Vec::new(),
            attempts: 0,
            dormant: false,
        });
        self.dirty.set(ScheduleDirty::GOAL_ADDED);
    }

    fn validate_goal_parameters(
        &self,
        goal_name: &str,
        parameters: Option<&Message>,
    ) -> crate::error::Result<()> {
        let Some(goal) = self.registry.goal(goal_name) else {
            return Err(EngineError::Validation(format!("unknown goal '{goal_name}'")));
        };

        match (goal.message_schema(), parameters) {
            (None, None) => Ok(()),
            (Some(schema), None) => Err(EngineError::Validation(format!(
                "goal requires a '{schema}' message"
            ))),
            (None, Some(msg)) => Err(EngineError::Validation(format!(
                "goal does not accept a message but '{}' was supplied",
                msg.schema()
            ))),
            (Some(schema_name), Some(msg)) => {
                if schema_name != msg.schema() {
                    return Err(EngineError::Validation(format!(
                        "message schema '{}' does not match the goal's '{schema_name}'",
                        msg.schema()
                    )));
                }
                let Some(schema) = self.registry.schema(schema_name) else {
                    return Err(EngineError::Validation(format!(
                        "message schema '{schema_name}' is not registered"
                    )));
                };
                schema.verify(msg).map_err(EngineError::from)?;
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Drop
    // ------------------------------------------------------------------

    fn handle_drop(&mut self, goal: &Handle, mode: DropMode, reason: &str) {
        if !goal.id.valid() {
            debug!(agent = %self.handle, goal = %goal.name, "drop received with invalid id");
            return;
        }

        // Recursively drop sub-goal intentions first so every sub-goal
        // finishes before the parent's FINISHED log.
        let mut stack = Vec::new();
        if self.executor.find_by_desire(goal.id).is_some() {
            stack.push(goal.id);
        }
        while let Some(desire_id) = stack.pop() {
            let subs = self
                .executor
                .find_by_desire(desire_id)
                .map(|i| i.sub_goal_desire_ids.clone())
                .unwrap_or_default();
            for sub_id in subs {
                if self.executor.find_by_desire(sub_id).is_some() {
                    stack.push(sub_id);
                }
                debug!(agent = %self.handle, sub_goal = %sub_id, "dropping sub-goal");
                if !self.executor.internal_drop(sub_id, mode, reason) {
                    // Never formed an intention; finish it directly.
                    self.finish_desire(sub_id, GoalResult::Dropped, reason);
                }
            }
        }

        if self.has_desire(goal.id) {
            debug!(agent = %self.handle, goal = %goal, "dropping goal");
            if !self.executor.internal_drop(goal.id, mode, reason) {
                self.finish_desire(goal.id, GoalResult::Dropped, reason);
            }
        }
    }

    /// Terminal bookkeeping for one desire: bus log, promise, parent
    /// notification, removal. Fires at most once per desire.
    fn finish_desire(&mut self, desire_id: UniqueId, result: GoalResult, reason: &str) {
        let Some(pos) = self.desires.iter().position(|d| d.id == desire_id) else {
            return;
        };
        let desire = self.desires.remove(pos);
        self.dirty.set(ScheduleDirty::GOAL_REMOVED);

        match &desire.parent {
            Some(parent) => self.bdi_log(BdiLog::SubGoalFinished {
                goal: desire.handle.name.clone(),
                goal_id: desire.handle.id,
                intention_id: parent.intention_id,
                task_id: parent.task_id,
                result,
                reason: reason.to_string(),
            }),
            None => self.bdi_log(BdiLog::GoalFinished {
                goal: desire.handle.name.clone(),
                goal_id: desire.handle.id,
                result,
                reason: reason.to_string(),
            }),
        }

        desire.promise.complete(result);

        if let Some(parent) = desire.parent {
            self.executor
                .on_subgoal_complete(parent.intention_id, parent.task_id, result);
        }
    }

    // ------------------------------------------------------------------
    // Auctions & delegation
    // ------------------------------------------------------------------

    fn handle_auction(&mut self, ev: AuctionEvent) {
        debug!(agent = %self.handle, goal = %ev.goal, bids = ev.bids.len(), missing = ev.missing_bids, "processing auction");
        if let Some(schedule) = self.schedule.as_mut() {
            if schedule.id() == ev.schedule_id {
                if self.dirty.any(ScheduleDirty::PREEMPT) {
                    debug!(agent = %self.handle, reason = %self.dirty.describe(), "auction blocked by dirty schedule");
                } else {
                    schedule.process_auction(&ev);
                }
                return;
            }
        }
        for entry in &mut self.delegation_backlog {
            if let Some(schedule) = entry.schedule.as_mut() {
                if schedule.id() == ev.schedule_id {
                    schedule.process_auction(&ev);
                    return;
                }
            }
        }
        debug!(agent = %self.handle, schedule = %ev.schedule_id, "auction for a schedule that no longer exists");
    }

    fn handle_delegation(&mut self, caller: Option<Handle>, ev: DelegationEvent) {
        if ev.status != DelegationStatus::Pending {
            self.handle_delegation_reply(caller, ev);
            return;
        }

        if ev.analyse {
            let Some(caller) = caller else {
                warn!(agent = %self.handle, goal = %ev.goal, "analyse delegation without a caller");
                return;
            };
            debug!(agent = %self.handle, goal = %ev.goal, team = %ev.team, "analysing delegated goal");

            let mut entry = DelegationBacklogEntry {
                caller,
                team: ev.team.clone(),
                goal: ev.goal.clone(),
                delegator_schedule_id: ev.schedule_id,
                already_executing: false,
                invalid: false,
                schedule: None,
            };

            if self.has_desire(ev.goal.id) {
                entry.already_executing = true;
            } else if let Err(problem) =
                self.validate_goal_parameters(&ev.goal.name, ev.parameters.as_deref())
            {
                // Delegation inputs are untrusted; the pursue checks
                // apply verbatim.
                warn!(agent = %self.handle, goal = %ev.goal, %problem, "delegation analyse rejected");
                entry.invalid = true;
            } else {
                entry.schedule = Some(self.build_sandbox_schedule(&entry, &ev));
            }

            self.delegation_backlog.push(entry);
            return;
        }

        // This agent won the auction: run the goal and thread the
        // result back to the team.
        debug!(agent = %self.handle, goal = %ev.goal, team = %ev.team, "executing delegated goal");
        let reply_to = caller.unwrap_or_else(|| ev.team.clone());
        let promise = Promise::new();
        let directory = Arc::clone(&self.directory);
        let me = self.handle.clone();
        let goal = ev.goal.clone();
        let team = ev.team.clone();
        let schedule_id = ev.schedule_id;
        promise.on_result(move |result| {
            let status = match result {
                GoalResult::Success => DelegationStatus::Success,
                GoalResult::Fail | GoalResult::Dropped => DelegationStatus::Fail,
            };
            let reply = Event::new(EventBody::Delegation(DelegationEvent {
                goal: goal.clone(),
                parameters: None,
                analyse: false,
                team,
                schedule_id,
                status,
                score: 0.0,
            }))
            .from(me)
            .to(reply_to.clone());
            route(&directory, &reply_to, reply);
        });

        self.post_self(
            Event::new(EventBody::Pursue(PursueEvent {
                goal: ev.goal.name.clone(),
                parameters: ev.parameters,
                persistent: false,
                parent_intention_id: None,
                parent_task_id: None,
                promise,
            }))
            .with_id(ev.goal.id)
            .quiet(),
        );
    }

    fn handle_delegation_reply(&mut self, caller: Option<Handle>, ev: DelegationEvent) {
        if ev.analyse {
            // A bid came back from a candidate member.
            let Some(caller) = caller else {
                warn!(agent = %self.handle, goal = %ev.goal, "auction bid without a caller");
                return;
            };
            let now = self.now_ms;
            for auction in &mut self.current_auctions {
                if auction.goal.id != ev.goal.id || auction.schedule_id != ev.schedule_id {
                    continue;
                }
                if !auction.candidates.iter().any(|c| c.id == caller.id) {
                    debug!(agent = %self.handle, bidder = %caller, "bid from outside the candidate set dropped");
                    break;
                }
                if auction.bids.iter().any(|bid| bid.bidder.id == caller.id) {
                    debug!(agent = %self.handle, bidder = %caller, "duplicate auction bid ignored");
                    break;
                }
                if auction.finished(now) {
                    debug!(agent = %self.handle, bidder = %caller, "bid arrived after expiry, ignored");
                    break;
                }
                auction.bids.push(AuctionBid {
                    bidder: caller.clone(),
                    score: match ev.status {
                        DelegationStatus::Success => ev.score,
                        _ => FAILED_COST,
                    },
                });
                break;
            }
        } else {
            // The elected delegate reports the goal's outcome.
            debug!(agent = %self.handle, goal = %ev.goal, status = ?ev.status, "delegated goal reported back");
            self.executor
                .on_delegation_complete(ev.goal.id, ev.status == DelegationStatus::Success);
            let effects = self.executor.take_pending_conclusions();
            self.apply_executor_effects(effects);
        }
    }

    fn build_sandbox_schedule(
        &self,
        entry: &DelegationBacklogEntry,
        ev: &DelegationEvent,
    ) -> Schedule {
        let mut desires: Vec<ScheduleDesire> = self
            .desires
            .iter()
            .filter(|d| !d.dormant)
            .map(|d| self.schedule_desire_from(d))
            .collect();

        let goal = self
            .registry
            .goal(&ev.goal.name)
            .expect("validated before sandboxing");
        let plans = self.candidate_plans(&ev.goal.name, &[], 0);
        let candidates = if plans.is_empty() {
            self.delegates_for(&ev.goal.name)
        } else {
            Vec::new()
        };
        desires.push(ScheduleDesire {
            desire_id: ev.goal.id,
            handle: ev.goal.clone(),
            goal,
            parameters: ev.parameters.clone(),
            plans,
            policy: self.policy_for(&ev.goal.name),
            candidates,
        });

        let mut schedule = Schedule::new(self.context.clone(), desires);
        schedule.delegator = Some(entry.caller.clone());
        schedule.delegator_schedule_id = Some(ev.schedule_id);
        schedule
    }

    // ------------------------------------------------------------------
    // Planning
    // ------------------------------------------------------------------

    fn policy_for(&self, goal: &str) -> PlanSelectionPolicy {
        self.tactics
            .get(goal)
            .map(|t| t.policy())
            .unwrap_or_default()
    }

    /// The plan candidates for a goal, ordered by the current tactic
    /// and pruned/rotated by the selection policy.
    fn candidate_plans(&self, goal: &str, failed: &[String], attempts: usize) -> Vec<Arc<Plan>> {
        let mut plans: Vec<Arc<Plan>> = match self.tactics.get(goal) {
            Some(tactic) if !tactic.plans().is_empty() => tactic
                .plans()
                .iter()
                .filter(|name| self.template.plans().iter().any(|p| p == *name))
                .filter_map(|name| self.registry.plan(name))
                .filter(|plan| plan.handles() == goal)
                .collect(),
            _ => self.registry.plans_for_goal(goal, self.template.plans()),
        };

        match self.policy_for(goal) {
            PlanSelectionPolicy::Exclude => {
                plans.retain(|plan| !failed.iter().any(|f| f == plan.name()));
            }
            PlanSelectionPolicy::RoundRobin => {
                if !plans.is_empty() {
                    let len = plans.len();
                    plans.rotate_left(attempts % len);
                }
            }
            PlanSelectionPolicy::Strict => {}
        }
        plans
    }

    fn schedule_desire_from(&self, desire: &DesireState) -> ScheduleDesire {
        let plans = self.candidate_plans(&desire.handle.name, &desire.failed_plans, desire.attempts);
        let candidates = if plans.is_empty() {
            self.delegates_for(&desire.handle.name)
        } else {
            Vec::new()
        };
        ScheduleDesire {
            desire_id: desire.id,
            handle: desire.handle.clone(),
            goal: Arc::clone(&desire.goal),
            parameters: desire.parameters.clone(),
            plans,
            policy: self.policy_for(&desire.handle.name),
            candidates,
        }
    }

    /// Members this team could delegate a goal to: any member with a
    /// plan for it, or a member team (which will auction it onward).
    fn delegates_for(&self, goal: &str) -> Vec<Handle> {
        if !self.template.is_team() {
            return Vec::new();
        }
        self.team_members
            .iter()
            .filter(|member| {
                self.directory
                    .get(&member.id)
                    .and_then(|mailbox| mailbox.agent_template())
                    .map(|template| {
                        template.is_team()
                            || !self
                                .registry
                                .plans_for_goal(goal, template.plans())
                                .is_empty()
                    })
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    fn desire_eval_ctx(&self, desire: &DesireState) -> BeliefContext {
        let mut ctx = self.context.clone();
        match &desire.parameters {
            Some(parameters) => ctx.set_goal_context(Arc::clone(parameters)),
            None => ctx.clear_goal_context(),
        }
        ctx
    }

    /// Filter desires down to the active goals worth planning for,
    /// queueing drops for the ones that can no longer be achieved.
    fn activate_goals(&mut self) -> Vec<usize> {
        let mut active = Vec::new();
        for idx in 0..self.desires.len() {
            let desire = &self.desires[idx];
            if desire.dormant {
                continue;
            }

            let ctx = self.desire_eval_ctx(desire);
            let drop_reason = if desire.goal.should_drop(&ctx) {
                Some("the drop condition is active".to_string())
            } else if !desire.persistent
                && !desire.delegated
                && desire.goal.satisfied(&ctx)
            {
                Some("the goal is already satisfied".to_string())
            } else if !desire.persistent && !desire.delegated && !desire.goal.pre_ok(&ctx) {
                Some("the goal precondition is no longer valid".to_string())
            } else if self
                .registry
                .plans_for_goal(&desire.handle.name, self.template.plans())
                .is_empty()
                && self.delegates_for(&desire.handle.name).is_empty()
            {
                Some("this agent has no plans or delegates to achieve the goal".to_string())
            } else {
                None
            };

            if let Some(why) = drop_reason {
                let reason = format!(
                    "{} cannot achieve {}: {}",
                    self.handle, self.desires[idx].handle, why
                );
                debug!(agent = %self.handle, goal = %self.desires[idx].handle, %why, "dropping unachievable goal");
                let goal = self.desires[idx].handle.clone();
                self.post_self(
                    Event::new(EventBody::Drop(DropEvent {
                        goal,
                        mode: DropMode::Normal,
                    }))
                    .reason(reason)
                    .quiet(),
                );
                continue;
            }

            if self.executor.force_dropping(self.desires[idx].id) {
                continue;
            }

            active.push(idx);
        }
        active
    }

    fn maybe_replan(&mut self) {
        let replan = match &self.schedule {
            Some(schedule) if !schedule.is_finished() => {
                if self.dirty.any(ScheduleDirty::PREEMPT) {
                    debug!(agent = %self.handle, reason = %self.dirty.describe(), "preempting dirty in-flight schedule");
                    true
                } else {
                    false
                }
            }
            Some(_) => false,
            None => {
                if !self.dirty.is_clear() {
                    true
                } else {
                    // Idle replan: finished intentions free the executor
                    // while awake desires still want scheduling.
                    self.executor.done() && self.desires.iter().any(|d| !d.dormant)
                }
            }
        };

        if !replan {
            return;
        }

        // Any belief or lifecycle movement re-activates parked
        // persistent desires.
        if !self.dirty.is_clear() {
            for desire in &mut self.desires {
                desire.dormant = false;
            }
        }

        let active = self.activate_goals();
        let desires: Vec<ScheduleDesire> = active
            .iter()
            .map(|idx| self.schedule_desire_from(&self.desires[*idx]))
            .collect();
        trace!(agent = %self.handle, goals = desires.len(), "planning a new schedule");
        self.schedule = Some(Schedule::new(self.context.clone(), desires));
        self.dirty.clear();

        // Auctions belonging to a discarded schedule expire naturally.
        self.current_auctions.retain(|auction| {
            self.schedule
                .as_ref()
                .map(|s| s.id() == auction.schedule_id)
                .unwrap_or(false)
                || self
                    .delegation_backlog
                    .iter()
                    .any(|entry| {
                        entry
                            .schedule
                            .as_ref()
                            .map(|s| s.id() == auction.schedule_id)
                            .unwrap_or(false)
                    })
        });
    }

    fn advance_schedule(&mut self) {
        let Some(mut schedule) = self.schedule.take() else {
            return;
        };
        let requests = schedule.advance(self.config.max_schedule_iterations);
        self.handle_schedule_requests(requests);

        if schedule.is_finished() {
            let intentions: Vec<ScheduledIntention> = schedule.intentions();
            trace!(agent = %self.handle, intentions = intentions.len(), "handing schedule to the executor");
            let effects = self.executor.set_schedule(intentions);
            self.apply_executor_effects(effects);
        } else {
            self.schedule = Some(schedule);
        }
    }

    fn handle_schedule_requests(&mut self, requests: Vec<ScheduleRequest>) {
        for request in requests {
            match request {
                ScheduleRequest::StartAuction {
                    schedule_id,
                    goal,
                    parameters,
                    candidates,
                } => {
                    debug!(agent = %self.handle, goal = %goal, candidates = candidates.len(), "starting delegation auction");
                    for candidate in &candidates {
                        let event = Event::new(EventBody::Delegation(DelegationEvent {
                            goal: goal.clone(),
                            parameters: parameters.clone(),
                            analyse: true,
                            team: self.handle.clone(),
                            schedule_id,
                            status: DelegationStatus::Pending,
                            score: 0.0,
                        }))
                        .from(self.handle.clone())
                        .to(candidate.clone());
                        route(&self.directory, candidate, event);
                    }
                    self.current_auctions.push(CurrentAuction {
                        goal,
                        schedule_id,
                        expiry_ms: self.now_ms + self.config.auction_window_ms,
                        expected: candidates.len(),
                        candidates,
                        bids: Vec::new(),
                    });
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// One iteration of the BDI reasoning loop. Cooperative: returns
    /// promptly, never blocks.
    pub fn run(&mut self, now_ms: u64) {
        self.now_ms = now_ms;

        if !matches!(self.state, AgentState::Running | AgentState::Stopping) {
            if self.backlog_count > 0 && !self.backlog_warned {
                self.backlog_warned = true;
                warn!(agent = %self.handle, events = self.backlog_count, "stopped agent received events");
            }
            return;
        }

        if self.state != AgentState::Stopping {
            self.process_delegation_backlog();
            self.process_current_auctions();
            self.process_current_actions();
            self.process_shared_beliefs();
            self.maybe_replan();
            self.advance_schedule();
            self.fire_timers();
        }

        self.tick_executor();

        if self.state == AgentState::Stopping
            && self.executor.done()
            && self.desires.is_empty()
            && self.mailbox.is_empty()
        {
            debug!(agent = %self.handle, "agent stopped");
            self.state = AgentState::Stopped;
            self.backlog_warned = false;
            self.backlog_count = 0;
        }
    }

    fn tick_executor(&mut self) {
        let mut executor = std::mem::take(&mut self.executor);
        let mut effects = executor.take_pending_conclusions();

        let context = self.context.clone();
        let parameters: HashMap<UniqueId, Option<Arc<Message>>> = self
            .desires
            .iter()
            .map(|d| (d.id, d.parameters.clone()))
            .collect();

        effects.extend(executor.tick(&mut |desire_id| {
            parameters.get(&desire_id).map(|params| {
                let mut ctx = context.clone();
                if let Some(params) = params {
                    ctx.set_goal_context(Arc::clone(params));
                }
                ctx
            })
        }));

        self.executor = executor;
        self.apply_executor_effects(effects);
    }

    fn apply_executor_effects(&mut self, effects: Vec<ExecutorEffect>) {
        for effect in effects {
            match effect {
                ExecutorEffect::RaiseAction {
                    intention_id,
                    task_id,
                    action,
                    goal,
                    plan,
                } => {
                    let desire = self.desires.iter().find(|d| d.id == goal.id);
                    let request = desire
                        .and_then(|d| d.parameters.as_deref().cloned())
                        .unwrap_or_else(|| Message::new(action.clone()));
                    let locks = self
                        .registry
                        .plan(&plan)
                        .map(|p| p.locks().to_vec())
                        .unwrap_or_default();
                    let handle = ActionHandle::new(action.clone(), goal.clone());
                    self.post_self(
                        Event::new(EventBody::Action(ActionEvent {
                            reply: Message::new(format!("{action}.reply")),
                            request,
                            action,
                            goal,
                            plan,
                            intention_id,
                            task_id,
                            resource_locks: locks,
                            handle,
                        }))
                        .quiet(),
                    );
                }

                ExecutorEffect::StartTimer {
                    intention_id,
                    task_id,
                    duration_ms,
                    goal,
                    plan,
                } => {
                    self.post_self(
                        Event::new(EventBody::Timer(TimerEvent {
                            duration_ms,
                            submitted_ms: 0,
                            goal,
                            plan,
                            intention_id,
                            task_id,
                        }))
                        .quiet(),
                    );
                }

                ExecutorEffect::PursueSubGoal {
                    intention_id,
                    task_id,
                    goal,
                    parameters,
                } => {
                    self.post_self(
                        Event::new(EventBody::Pursue(PursueEvent {
                            goal,
                            parameters: parameters.map(Arc::new),
                            persistent: false,
                            parent_intention_id: Some(intention_id),
                            parent_task_id: Some(task_id),
                            promise: Promise::new(),
                        }))
                        .quiet(),
                    );
                }

                ExecutorEffect::SendDelegation {
                    intention_id: _,
                    goal,
                    delegate,
                } => {
                    let parameters = self
                        .desires
                        .iter()
                        .find(|d| d.id == goal.id)
                        .and_then(|d| d.parameters.clone());
                    let event = Event::new(EventBody::Delegation(DelegationEvent {
                        goal,
                        parameters,
                        analyse: false,
                        team: self.handle.clone(),
                        schedule_id: UniqueId::nil(),
                        status: DelegationStatus::Pending,
                        score: 0.0,
                    }))
                    .from(self.handle.clone())
                    .to(delegate.clone());
                    route(&self.directory, &delegate, event);
                }

                ExecutorEffect::DropSubGoal { desire_id, reason } => {
                    if let Some(desire) = self.desires.iter().find(|d| d.id == desire_id) {
                        let goal = desire.handle.clone();
                        self.post_self(
                            Event::new(EventBody::Drop(DropEvent {
                                goal,
                                mode: DropMode::Force,
                            }))
                            .reason(reason)
                            .quiet(),
                        );
                    }
                }

                ExecutorEffect::IntentionConcluded {
                    intention_id: _,
                    desire_id,
                    plan,
                    result,
                    reason,
                } => self.handle_conclusion(desire_id, plan, result, &reason),
            }
        }
    }

    fn handle_conclusion(
        &mut self,
        desire_id: UniqueId,
        plan: Option<String>,
        result: GoalResult,
        reason: &str,
    ) {
        let Some(pos) = self.desires.iter().position(|d| d.id == desire_id) else {
            return;
        };

        match result {
            GoalResult::Success => {
                if self.desires[pos].persistent {
                    let handle = self.desires[pos].handle.clone();
                    let parent = self.desires[pos].parent;
                    {
                        let desire = &mut self.desires[pos];
                        desire.dormant = true;
                        desire.failed_plans.clear();
                        desire.attempts = 0;
                        desire.promise.complete(GoalResult::Success);
                    }
                    match parent {
                        Some(parent) => {
                            self.bdi_log(BdiLog::SubGoalFinished {
                                goal: handle.name.clone(),
                                goal_id: handle.id,
                                intention_id: parent.intention_id,
                                task_id: parent.task_id,
                                result,
                                reason: String::new(),
                            });
                            self.executor.on_subgoal_complete(
                                parent.intention_id,
                                parent.task_id,
                                result,
                            );
                        }
                        None => self.bdi_log(BdiLog::GoalFinished {
                            goal: handle.name.clone(),
                            goal_id: handle.id,
                            result,
                            reason: String::new(),
                        }),
                    }
                } else {
                    self.finish_desire(desire_id, GoalResult::Success, reason);
                }
            }

            GoalResult::Fail => {
                if let Some(plan) = plan {
                    self.desires[pos].failed_plans.push(plan);
                }
                self.desires[pos].attempts += 1;

                let desire = &self.desires[pos];
                let retry = !desire.delegated
                    && !self
                        .candidate_plans(&desire.handle.name, &desire.failed_plans, desire.attempts)
                        .is_empty();
                if retry {
                    debug!(agent = %self.handle, goal = %desire.handle, attempts = desire.attempts, "plan failed, goal stays for retry");
                } else {
                    self.finish_desire(desire_id, GoalResult::Fail, "no plans remaining");
                }
            }

            GoalResult::Dropped => self.finish_desire(desire_id, GoalResult::Dropped, reason),
        }
    }

    fn process_delegation_backlog(&mut self) {
        if self.delegation_backlog.is_empty() {
            return;
        }

        let entries = std::mem::take(&mut self.delegation_backlog);
        let mut kept = Vec::new();
        for mut entry in entries {
            let outcome = if entry.already_executing {
                // Identical goal already running here: same work, no
                // extra cost.
                Some((DelegationStatus::Success, 0.0))
            } else if entry.invalid {
                Some((DelegationStatus::Fail, FAILED_COST))
            } else {
                let schedule = entry.schedule.as_mut().expect("sandbox entries carry a schedule");
                let requests = schedule.advance(self.config.max_schedule_iterations);
                let finished = schedule.is_finished();
                let cost = schedule.best_cost();
                self.handle_schedule_requests(requests);
                if finished {
                    if cost >= FAILED_COST {
                        Some((DelegationStatus::Fail, FAILED_COST))
                    } else {
                        Some((DelegationStatus::Success, cost))
                    }
                } else {
                    None
                }
            };

            match outcome {
                Some((status, score)) => {
                    debug!(agent = %self.handle, goal = %entry.goal, ?status, score, "delegation analysis finished, returning bid");
                    let reply = Event::new(EventBody::Delegation(DelegationEvent {
                        goal: entry.goal.clone(),
                        parameters: None,
                        analyse: true,
                        team: entry.team.clone(),
                        schedule_id: entry.delegator_schedule_id,
                        status,
                        score,
                    }))
                    .from(self.handle.clone())
                    .to(entry.caller.clone());
                    route(&self.directory, &entry.caller, reply);
                }
                None => kept.push(entry),
            }
        }
        self.delegation_backlog = kept;
    }

    fn process_current_auctions(&mut self) {
        let now = self.now_ms;
        let auctions = std::mem::take(&mut self.current_auctions);
        for auction in auctions {
            if auction.finished(now) {
                let missing = auction.expected.saturating_sub(auction.bids.len());
                self.post_self(
                    Event::new(EventBody::Auction(AuctionEvent {
                        goal: auction.goal,
                        schedule_id: auction.schedule_id,
                        bids: auction.bids,
                        missing_bids: missing as u16,
                    }))
                    .quiet(),
                );
            } else {
                self.current_auctions.push(auction);
            }
        }
    }

    fn process_current_actions(&mut self) {
        let actions = std::mem::take(&mut self.current_actions);
        for action in actions {
            if action.handle.status() != praxis_model::ActionStatus::Pending {
                self.complete_action(action);
            } else {
                self.current_actions.push(action);
            }
        }
    }

    /// Rate-limited belief sharing: push owned beliefsets up to teams
    /// (writer roles), and fan received beliefsets out to members
    /// (reader roles). An idle executor flushes the final delta even
    /// inside the rate window.
    fn process_shared_beliefs(&mut self) {
        let since_share = self.last_dirtied_ms.saturating_sub(self.last_shared_ms);
        let share = !self.template.roles().is_empty()
            && !self.team_memberships.is_empty()
            && (since_share >= self.config.share_interval_ms
                || (self.executor.done() && since_share != 0));

        if share {
            self.last_shared_ms = self.last_dirtied_ms;
            let messages: Vec<Arc<Message>> =
                self.context.messages().map(|(_, m)| Arc::clone(m)).collect();
            for message in messages {
                for role_name in self.template.roles() {
                    let Some(role) = self.registry.role(role_name) else {
                        error!(agent = %self.handle, role = %role_name, "role does not exist in the registry");
                        continue;
                    };
                    if !role.can_write_to_team(message.schema()) {
                        continue;
                    }
                    for team in &self.team_memberships {
                        let event = Event::new(EventBody::ShareBeliefSet(ShareBeliefSetEvent {
                            beliefset: Arc::clone(&message),
                            owner_id: self.handle.id,
                            owner_name: self.handle.name.clone(),
                        }))
                        .from(self.handle.clone())
                        .to(team.clone());
                        route(&self.directory, team, event);
                    }
                    // One writing role suffices.
                    break;
                }
            }
        }

        if self.template.is_team() {
            let mut relays = Vec::new();
            for (schema, entries) in self.context.shared_mut() {
                for entry in entries {
                    if entry.last_updated_ms == entry.prev_last_updated_ms {
                        continue;
                    }
                    entry.prev_last_updated_ms = entry.last_updated_ms;
                    relays.push((
                        schema.clone(),
                        entry.owner_id,
                        entry.owner_name.clone(),
                        Arc::clone(&entry.beliefset),
                    ));
                }
            }

            for (schema, owner_id, owner_name, beliefset) in relays {
                for member in &self.team_members {
                    if member.id == owner_id {
                        // Never echo a beliefset back to its originator.
                        continue;
                    }
                    let Some(mailbox) = self.directory.get(&member.id) else {
                        continue;
                    };
                    let Some(template) = mailbox.agent_template() else {
                        continue;
                    };
                    let readable = template.roles().iter().any(|role_name| {
                        self.registry
                            .role(role_name)
                            .map(|role| role.can_read_from_team(&schema))
                            .unwrap_or(false)
                    });
                    if readable {
                        mailbox.push(
                            Event::new(EventBody::ShareBeliefSet(ShareBeliefSetEvent {
                                beliefset: Arc::clone(&beliefset),
                                owner_id,
                                owner_name: owner_name.clone(),
                            }))
                            .from(self.handle.clone())
                            .to(member.clone()),
                        );
                    }
                }
            }
        }
    }

    fn fire_timers(&mut self) {
        while let Some(timer) = self.timers.pop_due(self.now_ms) {
            if !self.executor.on_timer_fired(timer.intention_id, timer.task_id) {
                debug!(agent = %self.handle, task = %timer.task_id, "timer fired for a task that no longer exists");
            }
            self.bdi_log(BdiLog::SleepFinished {
                goal: timer.goal.name.clone(),
                goal_id: timer.goal.id,
                intention_id: timer.intention_id,
                plan: timer.plan.clone(),
                task_id: timer.task_id,
            });
        }
    }

    // ------------------------------------------------------------------
    // Engine-facing management
    // ------------------------------------------------------------------

    fn set_tactic_internal(&mut self, handle: &Handle) -> bool {
        let Some(tactic) = self.registry.tactic(&handle.name) else {
            warn!(agent = %self.handle, tactic = %handle.name, "unknown tactic");
            return false;
        };
        if handle.id.valid() && tactic.id() != handle.id {
            warn!(agent = %self.handle, tactic = %handle.name, "tactic handle does not match the registered tactic");
            return false;
        }

        let goal = tactic.goal().to_string();
        for desire in &mut self.desires {
            if desire.handle.name == goal {
                desire.failed_plans.clear();
                desire.attempts = 0;
            }
        }
        debug!(agent = %self.handle, tactic = %handle.name, goal = %goal, "tactic selected");
        self.tactics.insert(goal, tactic);
        true
    }

    /// Attach a service instance. One service per template type; a
    /// conflicting attachment is refused unless `force` replaces it.
    pub fn attach_service(
        &mut self,
        service: Handle,
        template: Arc<ServiceTemplate>,
        force: bool,
    ) -> bool {
        let directory = Arc::clone(&self.directory);
        self.attached_services.retain(|(handle, _)| {
            let alive = directory.contains_key(&handle.id);
            if !alive {
                warn!(agent = %self.handle, service = %handle, "pruning attached service that no longer exists");
            }
            alive
        });

        let mut replace = None;
        let mut ok = true;
        for (idx, (handle, attached)) in self.attached_services.iter().enumerate() {
            if attached.name() == template.name() {
                if handle.id == service.id {
                    warn!(agent = %self.handle, service = %service, "service is already attached");
                    ok = false;
                } else if force {
                    replace = Some(idx);
                } else {
                    warn!(
                        agent = %self.handle,
                        attached = %handle,
                        requested = %service,
                        "a different instance of this service type is already attached"
                    );
                    ok = false;
                }
            } else if handle.name == service.name && handle.id != service.id {
                warn!(agent = %self.handle, service = %service, "duplicate service name across different template types");
            }
        }

        if ok {
            if let Some(idx) = replace {
                let (removed, _) = self.attached_services.remove(idx);
                debug!(agent = %self.handle, replaced = %removed, with = %service, "force-replacing attached service");
            }
            self.attached_services.push((service, template));
        }
        ok
    }

    pub fn detach_service(&mut self, service: &Handle) -> bool {
        let before = self.attached_services.len();
        self.attached_services.retain(|(handle, _)| handle != service);
        before != self.attached_services.len()
    }

    pub fn add_member(&mut self, member: Handle) -> bool {
        if self.team_members.iter().any(|m| m.id == member.id) {
            warn!(team = %self.handle, member = %member, "agent is already a member of this team");
            return false;
        }
        self.team_members.push(member);
        // New delegate options deserve a replan at the next idle point.
        self.dirty.set(ScheduleDirty::PERCEPT);
        true
    }

    pub fn remove_member(&mut self, member: &Handle) -> bool {
        let before = self.team_members.len();
        self.team_members.retain(|m| m.id != member.id);
        if self.team_members.len() != before {
            self.dirty.set(ScheduleDirty::MEMBER_REMOVED);
            true
        } else {
            false
        }
    }

    pub fn add_membership(&mut self, team: Handle) {
        if !self.team_memberships.iter().any(|t| t.id == team.id) {
            self.team_memberships.push(team);
        }
    }

    pub fn remove_membership(&mut self, team: &Handle) {
        self.team_memberships.retain(|t| t.id != team.id);
    }
}

impl AgentOps for Agent {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    fn belief(&self, name: &str) -> Option<Arc<Message>> {
        self.context.message(name)
    }

    fn resource_level(&self, name: &str) -> Option<i64> {
        self.context.resource(name).map(|r| r.current())
    }

    fn post_percept(&mut self, beliefset: &str, field: &str, value: Field) {
        self.post_self(Event::new(EventBody::Percept(PerceptEvent {
            name: beliefset.to_string(),
            is_message: true,
            field: field.to_string(),
            value,
        })));
    }

    fn post_resource_percept(&mut self, resource: &str, value: i64) {
        self.post_self(
            Event::new(EventBody::Percept(PerceptEvent {
                name: resource.to_string(),
                is_message: false,
                field: String::new(),
                value: Field::I64(value),
            }))
            .quiet(),
        );
    }

    fn send_message(&mut self, recipient: &Handle, message: Message) {
        let event = Event::new(EventBody::Message(MessageEvent {
            message: Arc::new(message),
            deprecated_direct: false,
        }))
        .from(self.handle.clone())
        .to(recipient.clone());
        if recipient.id == self.handle.id {
            self.post_self(event);
        } else {
            route(&self.directory, recipient, event);
        }
    }

    fn pursue(&mut self, goal: &str, persistent: bool, parameters: Option<Message>) -> Promise {
        let promise = Promise::new();
        self.post_self(Event::new(EventBody::Pursue(PursueEvent {
            goal: goal.to_string(),
            parameters: parameters.map(Arc::new),
            persistent,
            parent_intention_id: None,
            parent_task_id: None,
            promise: promise.clone(),
        })));
        promise
    }

    fn stop(&mut self) {
        self.post_self(Event::new(EventBody::Control(ControlCommand::Stop)).quiet());
    }

    fn force_reschedule(&mut self) {
        self.dirty.set(ScheduleDirty::FORCE);
    }
}

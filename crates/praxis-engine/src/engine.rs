use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, error, info, warn};

use praxis_core::{BusAdapter, Clock, Field, Handle, Message, Promise, UniqueId};
use praxis_model::ModelRegistry;

use crate::agent::{Agent, AgentState};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::event::{
    ControlCommand, Event, EventBody, MessageEvent, PerceptEvent, PursueEvent, TacticEvent,
};
use crate::executor::RunningState;
use crate::routing::{Directory, Mailbox, MailboxKind, Notifier};
use crate::service::Service;

/// Result of `Agent::pursue`: the desire's handle and the promise that
/// fires once with its terminal result.
pub struct GoalPursue {
    pub handle: Handle,
    pub promise: Promise,
}

/// External reference to an agent owned by the engine. All operations
/// publish events onto the agent's mailbox; they take effect when the
/// engine next polls. Cheap to clone, safe to use from other threads.
#[derive(Clone)]
pub struct AgentHandle {
    handle: Handle,
    mailbox: Option<Mailbox>,
    notifier: Arc<Notifier>,
}

impl AgentHandle {
    fn invalid(name: &str, notifier: Arc<Notifier>) -> Self {
        Self {
            handle: Handle::invalid(name),
            mailbox: None,
            notifier,
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn valid(&self) -> bool {
        self.handle.valid() && self.mailbox.is_some()
    }

    fn push(&self, event: Event) {
        match &self.mailbox {
            Some(mailbox) => {
                mailbox.push(event);
                self.notifier.notify();
            }
            None => warn!(agent = %self.handle.name, "operation on an invalid agent handle ignored"),
        }
    }

    pub fn start(&self) {
        self.push(Event::new(EventBody::Control(ControlCommand::Start)).quiet());
    }

    pub fn stop(&self) {
        self.push(Event::new(EventBody::Control(ControlCommand::Stop)).quiet());
    }

    pub fn pause(&self) {
        self.push(Event::new(EventBody::Control(ControlCommand::Pause)).quiet());
    }

    pub fn pursue(&self, goal: &str, persistent: bool) -> GoalPursue {
        self.pursue_with(goal, persistent, None, None)
    }

    /// Pursue with explicit parameters and/or desire id. Re-using an id
    /// merges into the existing desire, which adopts this promise (the
    /// previous one is dropped unfired).
    pub fn pursue_with(
        &self,
        goal: &str,
        persistent: bool,
        parameters: Option<Message>,
        id: Option<UniqueId>,
    ) -> GoalPursue {
        let desire_id = id.unwrap_or_else(UniqueId::random);
        let promise = Promise::new();
        self.push(
            Event::new(EventBody::Pursue(PursueEvent {
                goal: goal.to_string(),
                parameters: parameters.map(Arc::new),
                persistent,
                parent_intention_id: None,
                parent_task_id: None,
                promise: promise.clone(),
            }))
            .with_id(desire_id)
            .from(self.handle.clone()),
        );
        GoalPursue {
            handle: Handle::new(goal, desire_id),
            promise,
        }
    }

    pub fn send_message(&self, message: Message) {
        self.push(
            Event::new(EventBody::Message(MessageEvent {
                message: Arc::new(message),
                deprecated_direct: false,
            }))
            .to(self.handle.clone()),
        );
    }

    /// Legacy path: deliver a message straight to a registered handler
    /// instead of the belief context.
    pub fn send_message_to_handler(&self, message: Message) {
        self.push(
            Event::new(EventBody::Message(MessageEvent {
                message: Arc::new(message),
                deprecated_direct: true,
            }))
            .to(self.handle.clone())
            .quiet(),
        );
    }

    pub fn post_percept(&self, beliefset: &str, field: &str, value: Field) {
        self.push(Event::new(EventBody::Percept(PerceptEvent {
            name: beliefset.to_string(),
            is_message: true,
            field: field.to_string(),
            value,
        })));
    }

    pub fn post_resource_percept(&self, resource: &str, value: i64) {
        self.push(
            Event::new(EventBody::Percept(PerceptEvent {
                name: resource.to_string(),
                is_message: false,
                field: String::new(),
                value: Field::I64(value),
            }))
            .quiet(),
        );
    }

    /// Select a tactic by name; takes effect on the next poll.
    pub fn select_tactic(&self, tactic: &str) {
        self.push(
            Event::new(EventBody::Tactic(TacticEvent {
                handle: Handle::invalid(tactic),
            }))
            .quiet(),
        );
    }

    pub fn set_tactic(&self, tactic: Handle) {
        self.push(Event::new(EventBody::Tactic(TacticEvent { handle: tactic })).quiet());
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollResult {
    pub clock_ms: u64,
    pub events_dispatched: usize,
    pub agents_running: usize,
    pub agents_executing: usize,
}

/// Owns every agent and service, routes events between them, and
/// drives their cooperative ticks from a single thread (`poll`) or a
/// background loop (`start`).
pub struct Engine {
    handle: Handle,
    registry: Arc<ModelRegistry>,
    config: EngineConfig,
    clock: Clock,
    agents: HashMap<UniqueId, Agent>,
    services: HashMap<UniqueId, Service>,
    order: Vec<UniqueId>,
    directory: Directory,
    engine_mailbox: Mailbox,
    bus: Option<Arc<dyn BusAdapter>>,
    critical: Option<String>,
    notifier: Arc<Notifier>,
    last_poll: Option<Instant>,
}

impl Engine {
    pub fn new(registry: ModelRegistry) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    pub fn with_config(registry: ModelRegistry, config: EngineConfig) -> Self {
        let handle = Handle::random("engine");
        let directory: Directory = Arc::new(DashMap::new());
        let engine_mailbox = Mailbox::new(handle.clone(), MailboxKind::Engine);
        directory.insert(handle.id, engine_mailbox.clone());
        Self {
            handle,
            registry: Arc::new(registry),
            config,
            clock: Clock::new(),
            agents: HashMap::new(),
            services: HashMap::new(),
            order: Vec::new(),
            directory,
            engine_mailbox,
            bus: None,
            critical: None,
            notifier: Notifier::new(),
            last_poll: None,
        }
    }

    /// Attach a bus adapter. Must happen before agents are created;
    /// agents capture the adapter at construction.
    pub fn with_bus(mut self, bus: Arc<dyn BusAdapter>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Non-zero when a critical bootstrap error was recorded; `start`
    /// refuses to run in that case.
    pub fn status(&self) -> i32 {
        i32::from(self.critical.is_some())
    }

    /// Instantiate an agent from a committed template. An unknown
    /// template yields an invalid handle and raises the critical error
    /// flag.
    pub fn create_agent(&mut self, template_name: &str, name: &str) -> AgentHandle {
        let Some(template) = self.registry.agent_template(template_name) else {
            error!(template = %template_name, agent = %name, "cannot create agent from unknown template");
            self.critical = Some(format!("unknown agent template '{template_name}'"));
            return AgentHandle::invalid(name, Arc::clone(&self.notifier));
        };

        let handle = Handle::random(name);
        let mailbox = Mailbox::new(
            handle.clone(),
            MailboxKind::Agent {
                template: Arc::clone(&template),
            },
        );
        self.directory.insert(handle.id, mailbox.clone());

        let initial_goals: Vec<String> = template.initial_goals().to_vec();
        let agent = Agent::new(
            handle.clone(),
            template,
            Arc::clone(&self.registry),
            self.config.clone(),
            Arc::clone(&self.directory),
            mailbox.clone(),
            self.handle.clone(),
            self.bus.clone(),
        );

        info!(agent = %handle, template = %template_name, "agent created");
        self.agents.insert(handle.id, agent);
        self.order.push(handle.id);

        let api = AgentHandle {
            handle,
            mailbox: Some(mailbox),
            notifier: Arc::clone(&self.notifier),
        };
        for goal in initial_goals {
            api.pursue(&goal, true);
        }
        api
    }

    /// Instantiate a service from a committed template.
    pub fn create_service(&mut self, template_name: &str, name: &str) -> Handle {
        let Some(template) = self.registry.service_template(template_name) else {
            warn!(template = %template_name, service = %name, "cannot create service from unknown template");
            return Handle::invalid(name);
        };

        let handle = Handle::random(name);
        let mailbox = Mailbox::new(
            handle.clone(),
            MailboxKind::Service {
                template: Arc::clone(&template),
            },
        );
        self.directory.insert(handle.id, mailbox.clone());
        let service = Service::new(
            handle.clone(),
            template,
            Arc::clone(&self.directory),
            mailbox,
            self.bus.clone(),
        );
        info!(service = %handle, template = %template_name, "service created");
        self.services.insert(handle.id, service);
        self.order.push(handle.id);
        handle
    }

    pub fn agent_api(&self, handle: &Handle) -> Option<AgentHandle> {
        let mailbox = self.directory.get(&handle.id).map(|r| r.value().clone())?;
        Some(AgentHandle {
            handle: handle.clone(),
            mailbox: Some(mailbox),
            notifier: Arc::clone(&self.notifier),
        })
    }

    pub fn agent_state(&self, handle: &Handle) -> Option<AgentState> {
        self.agents.get(&handle.id).map(Agent::state)
    }

    pub fn agent_running(&self, handle: &Handle) -> bool {
        self.agents
            .get(&handle.id)
            .map(Agent::running)
            .unwrap_or(false)
    }

    pub fn agent_stopped(&self, handle: &Handle) -> bool {
        self.agents
            .get(&handle.id)
            .map(Agent::stopped)
            .unwrap_or(false)
    }

    pub fn desires(&self, handle: &Handle) -> Vec<Handle> {
        self.agents
            .get(&handle.id)
            .map(Agent::desires)
            .unwrap_or_default()
    }

    pub fn intentions(&self, handle: &Handle) -> Vec<Handle> {
        self.agents
            .get(&handle.id)
            .map(Agent::intentions)
            .unwrap_or_default()
    }

    pub fn running_state(&self, handle: &Handle) -> Option<RunningState> {
        self.agents.get(&handle.id).map(Agent::running_state)
    }

    pub fn belief(&self, handle: &Handle, schema: &str) -> Option<Message> {
        self.agents
            .get(&handle.id)
            .and_then(|a| a.belief(schema))
            .map(|m| (*m).clone())
    }

    pub fn resource(&self, handle: &Handle, name: &str) -> Option<i64> {
        self.agents.get(&handle.id).and_then(|a| a.resource(name))
    }

    pub fn shared_beliefs(&self, handle: &Handle, schema: &str) -> Vec<(UniqueId, Message)> {
        self.agents
            .get(&handle.id)
            .map(|a| {
                a.shared_beliefs(schema)
                    .into_iter()
                    .map(|(owner, msg)| (owner, (*msg).clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_events(&self, handle: &Handle) -> bool {
        self.agents
            .get(&handle.id)
            .map(Agent::has_events)
            .unwrap_or(false)
    }

    /// Attach a service instance to an agent. False when either side is
    /// unknown, the service is already attached, or a same-template
    /// conflict exists and `force` is not set.
    pub fn attach_service(&mut self, agent: &Handle, service: &Handle, force: bool) -> bool {
        let Some(template) = self.services.get(&service.id).map(|s| Arc::clone(s.template()))
        else {
            warn!(agent = %agent, service = %service, "service to attach no longer exists");
            return false;
        };
        match self.agents.get_mut(&agent.id) {
            Some(target) => target.attach_service(service.clone(), template, force),
            None => {
                warn!(agent = %agent, "cannot attach service to unknown agent");
                false
            }
        }
    }

    pub fn detach_service(&mut self, agent: &Handle, service: &Handle) -> bool {
        self.agents
            .get_mut(&agent.id)
            .map(|a| a.detach_service(service))
            .unwrap_or(false)
    }

    /// Enrol a member agent into a team. Both sides are linked; the
    /// membership gates shared-belief flow and delegation.
    pub fn add_team_member(&mut self, team: &Handle, member: &Handle) -> bool {
        if !self.agents.contains_key(&member.id) {
            warn!(team = %team, member = %member, "cannot enrol unknown member");
            return false;
        }
        let Some(team_agent) = self.agents.get_mut(&team.id) else {
            warn!(team = %team, "cannot enrol member into unknown team");
            return false;
        };
        if !team_agent.is_team() {
            warn!(team = %team, "agent is not a team");
            return false;
        }
        if !team_agent.add_member(member.clone()) {
            return false;
        }
        self.agents
            .get_mut(&member.id)
            .expect("member checked above")
            .add_membership(team.clone());
        true
    }

    pub fn remove_team_member(&mut self, team: &Handle, member: &Handle) -> bool {
        let removed = self
            .agents
            .get_mut(&team.id)
            .map(|t| t.remove_member(member))
            .unwrap_or(false);
        if removed {
            if let Some(member_agent) = self.agents.get_mut(&member.id) {
                member_agent.remove_membership(team);
            }
        }
        removed
    }

    /// Raise a drop for a live desire. No-op returning false when the
    /// agent or the desire does not exist.
    pub fn drop_goal(&mut self, agent: &Handle, goal: &Handle, reason: &str) -> bool {
        let Some(target) = self.agents.get(&agent.id) else {
            return false;
        };
        if !goal.valid() || !target.has_desire(goal.id) {
            return false;
        }
        let event = Event::new(EventBody::Drop(crate::event::DropEvent {
            goal: goal.clone(),
            mode: praxis_core::DropMode::Force,
        }))
        .reason(if reason.is_empty() {
            format!("{} dropping goal {}", agent.name, goal)
        } else {
            reason.to_string()
        });
        if let Some(mailbox) = self.directory.get(&agent.id) {
            mailbox.push(event);
        }
        self.notifier.notify();
        true
    }

    /// One cooperative iteration: route queued events, then tick every
    /// agent and service. `dt_ms` advances the internal clock; omit it
    /// to track wall-clock time.
    pub fn poll(&mut self, dt_ms: Option<u64>) -> PollResult {
        let dt = dt_ms.unwrap_or_else(|| {
            self.last_poll
                .map(|t| t.elapsed().as_millis() as u64)
                .unwrap_or(0)
        });
        self.last_poll = Some(Instant::now());
        self.clock.advance(dt);
        let now = self.clock.now_ms();

        for event in self.engine_mailbox.drain() {
            match event.body {
                EventBody::Register(ev) => {
                    warn!(kind = %ev.kind, name = %ev.name, "dynamic registration reached the engine; remote entities are managed out-of-band");
                }
                other => {
                    debug!(tag = other.tag(), "engine dropping unroutable event");
                }
            }
        }

        // Snapshot every queue before dispatching: events raised during
        // this poll are observed on the next one, never within it.
        let batches: Vec<(UniqueId, Vec<Event>)> = self
            .order
            .iter()
            .filter_map(|id| self.directory.get(id).map(|mb| (*id, mb.drain())))
            .collect();

        let mut dispatched = 0;
        for (id, batch) in batches {
            dispatched += batch.len();
            if let Some(agent) = self.agents.get_mut(&id) {
                for event in batch {
                    agent.dispatch(event, now);
                }
                agent.run(now);
            } else if let Some(service) = self.services.get_mut(&id) {
                for event in batch {
                    service.dispatch(event, now);
                }
                service.run(now);
            }
        }

        PollResult {
            clock_ms: now,
            events_dispatched: dispatched,
            agents_running: self.agents.values().filter(|a| a.running()).count(),
            agents_executing: self
                .agents
                .values()
                .filter(|a| a.running_state() == RunningState::Executing)
                .count(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.engine_mailbox.is_empty()
            && self.agents.values().all(Agent::is_idle)
            && self.services.values().all(Service::is_idle)
    }

    /// Poll until every agent and service is idle. Intended for batch
    /// runs and tests; a model with perpetually active desires will not
    /// return.
    pub fn execute(&mut self) -> PollResult {
        let mut result = self.poll(Some(self.config.tick_interval_ms));
        while !self.is_idle() {
            result = self.poll(Some(self.config.tick_interval_ms));
        }
        result
    }

    /// Run the engine on a background thread until stopped. Refuses to
    /// start while the critical error flag is raised, handing the
    /// engine back for inspection.
    #[allow(clippy::result_large_err)]
    pub fn start(self) -> std::result::Result<EngineHandle, (Engine, EngineError)> {
        if let Some(reason) = self.critical.clone() {
            error!(%reason, "engine refusing to start");
            return Err((self, EngineError::CriticalBootstrap(reason)));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let notifier = Arc::clone(&self.notifier);
        let tick = Duration::from_millis(self.config.tick_interval_ms.max(1));

        let join = std::thread::spawn(move || {
            let mut engine = self;
            info!("engine background loop started");
            while !stop_flag.load(Ordering::Relaxed) {
                engine.poll(None);
                engine.notifier_wait(tick);
            }
            info!("engine background loop stopped");
            engine
        });

        Ok(EngineHandle {
            join,
            stop,
            notifier,
        })
    }

    fn notifier_wait(&self, tick: Duration) {
        self.notifier.wait_timeout(tick);
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("agents", &self.agents.len())
            .field("services", &self.services.len())
            .field("clock_ms", &self.clock.now_ms())
            .field("critical", &self.critical)
            .finish()
    }
}

/// Controls a backgrounded engine. Stopping hands the engine back.
pub struct EngineHandle {
    join: JoinHandle<Engine>,
    stop: Arc<AtomicBool>,
    notifier: Arc<Notifier>,
}

impl EngineHandle {
    pub fn stop(self) -> Engine {
        self.stop.store(true, Ordering::Relaxed);
        self.notifier.notify();
        self.join.join().expect("engine thread panicked")
    }
}

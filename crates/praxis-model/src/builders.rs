use std::collections::HashMap;
use std::sync::Arc;

use praxis_core::{BeliefContext, Field, FieldKind, Handle, Message, MessageSchema, SchemaField};
use tracing::warn;

use crate::action::{ActionHandle, ActionHandler, ActionStatus, AgentOps, MessageHandler};
use crate::body::{BodyBuilder, TaskNode};
use crate::error::Result;
use crate::goal::Goal;
use crate::plan::Plan;
use crate::registry::{ModelRegistry, ResourceDef};
use crate::role::Role;
use crate::tactic::{PlanSelectionPolicy, Tactic};
use crate::template::{AgentTemplate, ServiceTemplate};

/// Start declaring a goal template.
pub fn goal(name: impl Into<String>) -> GoalBuilder {
    GoalBuilder {
        name: name.into(),
        message_schema: None,
        pre: None,
        satisfied: None,
        should_drop: None,
        heuristic: None,
    }
}

pub struct GoalBuilder {
    name: String,
    message_schema: Option<String>,
    pre: Option<Arc<dyn Fn(&BeliefContext) -> bool + Send + Sync>>,
    satisfied: Option<Arc<dyn Fn(&BeliefContext) -> bool + Send + Sync>>,
    should_drop: Option<Arc<dyn Fn(&BeliefContext) -> bool + Send + Sync>>,
    heuristic: Option<Arc<dyn Fn(&BeliefContext) -> f32 + Send + Sync>>,
}

impl GoalBuilder {
    /// Require pursues of this goal to carry a message of this schema.
    pub fn message(mut self, schema: impl Into<String>) -> Self {
        self.message_schema = Some(schema.into());
        self
    }

    pub fn pre(mut self, f: impl Fn(&BeliefContext) -> bool + Send + Sync + 'static) -> Self {
        self.pre = Some(Arc::new(f));
        self
    }

    pub fn satisfied(
        mut self,
        f: impl Fn(&BeliefContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.satisfied = Some(Arc::new(f));
        self
    }

    pub fn drop_when(
        mut self,
        f: impl Fn(&BeliefContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_drop = Some(Arc::new(f));
        self
    }

    pub fn heuristic(
        mut self,
        f: impl Fn(&BeliefContext) -> f32 + Send + Sync + 'static,
    ) -> Self {
        self.heuristic = Some(Arc::new(f));
        self
    }

    pub fn commit(self, registry: &mut ModelRegistry) -> Result<()> {
        registry.register_goal(Goal::new(
            self.name,
            self.message_schema,
            self.pre,
            self.satisfied,
            self.should_drop,
            self.heuristic,
        ))
    }
}

/// Start declaring a plan.
pub fn plan(name: impl Into<String>) -> PlanBuilder {
    PlanBuilder {
        name: name.into(),
        handles: None,
        pre: None,
        effects: None,
        cost: None,
        locks: Vec::new(),
        body: None,
    }
}

pub struct PlanBuilder {
    name: String,
    handles: Option<String>,
    pre: Option<Arc<dyn Fn(&BeliefContext) -> bool + Send + Sync>>,
    effects: Option<Arc<dyn Fn(&mut BeliefContext) + Send + Sync>>,
    cost: Option<Arc<dyn Fn(&BeliefContext) -> f32 + Send + Sync>>,
    locks: Vec<String>,
    body: Option<TaskNode>,
}

impl PlanBuilder {
    pub fn handles(mut self, goal: impl Into<String>) -> Self {
        self.handles = Some(goal.into());
        self
    }

    pub fn pre(mut self, f: impl Fn(&BeliefContext) -> bool + Send + Sync + 'static) -> Self {
        self.pre = Some(Arc::new(f));
        self
    }

    /// Simulated effects applied to the projected context during
    /// search. Hypothetical only: never raises percepts.
    pub fn effects(mut self, f: impl Fn(&mut BeliefContext) + Send + Sync + 'static) -> Self {
        self.effects = Some(Arc::new(f));
        self
    }

    pub fn cost(mut self, f: impl Fn(&BeliefContext) -> f32 + Send + Sync + 'static) -> Self {
        self.cost = Some(Arc::new(f));
        self
    }

    /// Declare a resource this plan locks exclusively while executing.
    pub fn lock(mut self, resource: impl Into<String>) -> Self {
        self.locks.push(resource.into());
        self
    }

    pub fn body(mut self, body: BodyBuilder) -> Self {
        self.body = Some(body.build());
        self
    }

    pub fn commit(self, registry: &mut ModelRegistry) -> Result<()> {
        let handles = self.handles.unwrap_or_default();
        let body = self.body.unwrap_or(TaskNode::Sequence(Vec::new()));
        registry.register_plan(Plan::new(
            self.name, handles, self.pre, self.effects, self.cost, self.locks, body,
        ))
    }
}

/// Start declaring a tactic for a goal.
pub fn tactic(name: impl Into<String>) -> TacticBuilder {
    TacticBuilder {
        name: name.into(),
        goal: None,
        plans: Vec::new(),
        policy: PlanSelectionPolicy::default(),
    }
}

pub struct TacticBuilder {
    name: String,
    goal: Option<String>,
    plans: Vec<String>,
    policy: PlanSelectionPolicy,
}

impl TacticBuilder {
    pub fn goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = Some(goal.into());
        self
    }

    pub fn plans<I, S>(mut self, plans: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plans = plans.into_iter().map(Into::into).collect();
        self
    }

    pub fn policy(mut self, policy: PlanSelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Commit and return the tactic's handle for `set_tactic`.
    pub fn commit(self, registry: &mut ModelRegistry) -> Result<Handle> {
        let goal = self.goal.unwrap_or_default();
        let plans: Vec<String> = self
            .plans
            .into_iter()
            .filter(|name| match registry.plan(name) {
                Some(plan) if plan.handles() == goal => true,
                Some(_) => {
                    warn!(tactic = %self.name, plan = %name, "tactic lists a plan that does not handle its goal; ignored");
                    false
                }
                None => {
                    warn!(tactic = %self.name, plan = %name, "tactic lists an unknown plan; ignored");
                    false
                }
            })
            .collect();
        let tactic = Tactic::new(self.name, goal, plans, self.policy);
        let handle = tactic.handle();
        registry.register_tactic(tactic)?;
        Ok(handle)
    }
}

/// Start declaring a role.
pub fn role(name: impl Into<String>) -> RoleBuilder {
    RoleBuilder {
        name: name.into(),
        reads: Vec::new(),
        writes: Vec::new(),
    }
}

pub struct RoleBuilder {
    name: String,
    reads: Vec<String>,
    writes: Vec<String>,
}

impl RoleBuilder {
    pub fn reads(mut self, schema: impl Into<String>) -> Self {
        self.reads.push(schema.into());
        self
    }

    pub fn writes(mut self, schema: impl Into<String>) -> Self {
        self.writes.push(schema.into());
        self
    }

    pub fn commit(self, registry: &mut ModelRegistry) -> Result<()> {
        registry.register_role(Role::new(self.name, self.reads, self.writes))
    }
}

/// Start declaring a bounded resource.
pub fn resource(name: impl Into<String>) -> ResourceBuilder {
    ResourceBuilder {
        name: name.into(),
        min: 0,
        max: i64::MAX,
    }
}

pub struct ResourceBuilder {
    name: String,
    min: i64,
    max: i64,
}

impl ResourceBuilder {
    pub fn min(mut self, min: i64) -> Self {
        self.min = min;
        self
    }

    pub fn max(mut self, max: i64) -> Self {
        self.max = max;
        self
    }

    pub fn commit(self, registry: &mut ModelRegistry) -> Result<()> {
        registry.register_resource(ResourceDef {
            name: self.name,
            min: self.min,
            max: self.max,
        })
    }
}

/// Start declaring a message schema.
pub fn message_schema(name: impl Into<String>) -> MessageSchemaBuilder {
    MessageSchemaBuilder {
        name: name.into(),
        fields: Vec::new(),
    }
}

pub struct MessageSchemaBuilder {
    name: String,
    fields: Vec<SchemaField>,
}

impl MessageSchemaBuilder {
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(SchemaField {
            name: name.into(),
            kind,
            default: None,
        });
        self
    }

    pub fn field_with_default(mut self, name: impl Into<String>, default: Field) -> Self {
        self.fields.push(SchemaField {
            name: name.into(),
            kind: default.kind(),
            default: Some(default),
        });
        self
    }

    pub fn commit(self, registry: &mut ModelRegistry) -> Result<()> {
        registry.register_schema(MessageSchema::new(self.name, self.fields))
    }
}

/// Start declaring an agent template.
pub fn agent(name: impl Into<String>) -> AgentTemplateBuilder {
    AgentTemplateBuilder {
        name: name.into(),
        plans: Vec::new(),
        roles: Vec::new(),
        beliefs: Vec::new(),
        resources: Vec::new(),
        action_handlers: HashMap::new(),
        message_handlers: HashMap::new(),
        initial_goals: Vec::new(),
        is_team: false,
        is_proxy: false,
    }
}

/// Start declaring a team template: an agent that can delegate goals to
/// its members.
pub fn team(name: impl Into<String>) -> AgentTemplateBuilder {
    let mut builder = agent(name);
    builder.is_team = true;
    builder
}

pub struct AgentTemplateBuilder {
    name: String,
    plans: Vec<String>,
    roles: Vec<String>,
    beliefs: Vec<String>,
    resources: Vec<String>,
    action_handlers: HashMap<String, ActionHandler>,
    message_handlers: HashMap<String, MessageHandler>,
    initial_goals: Vec<String>,
    is_team: bool,
    is_proxy: bool,
}

impl AgentTemplateBuilder {
    pub fn plan(mut self, name: impl Into<String>) -> Self {
        self.plans.push(name.into());
        self
    }

    pub fn plans<I, S>(mut self, plans: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plans.extend(plans.into_iter().map(Into::into));
        self
    }

    pub fn role(mut self, name: impl Into<String>) -> Self {
        self.roles.push(name.into());
        self
    }

    /// Declare a beliefset schema held by instances of this template.
    pub fn belief_name(mut self, schema: impl Into<String>) -> Self {
        self.beliefs.push(schema.into());
        self
    }

    pub fn resource(mut self, name: impl Into<String>) -> Self {
        self.resources.push(name.into());
        self
    }

    pub fn handle_action(
        mut self,
        action: impl Into<String>,
        handler: impl Fn(&mut dyn AgentOps, &Message, &mut Message, &ActionHandle) -> ActionStatus
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.action_handlers
            .insert(action.into(), Arc::new(handler));
        self
    }

    pub fn handle_message(
        mut self,
        schema: impl Into<String>,
        handler: impl Fn(&mut dyn AgentOps, &Message) + Send + Sync + 'static,
    ) -> Self {
        self.message_handlers
            .insert(schema.into(), Arc::new(handler));
        self
    }

    /// A goal every instance pursues (persistently) at creation.
    pub fn initial_goal(mut self, goal: impl Into<String>) -> Self {
        self.initial_goals.push(goal.into());
        self
    }

    pub fn proxy(mut self) -> Self {
        self.is_proxy = true;
        self
    }

    pub fn commit(self, registry: &mut ModelRegistry) -> Result<()> {
        registry.register_agent_template(AgentTemplate::new(
            self.name,
            self.plans,
            self.roles,
            self.beliefs,
            self.resources,
            self.action_handlers,
            self.message_handlers,
            self.initial_goals,
            self.is_team,
            self.is_proxy,
        ))
    }
}

/// Start declaring a service template.
pub fn service(name: impl Into<String>) -> ServiceTemplateBuilder {
    ServiceTemplateBuilder {
        name: name.into(),
        action_handlers: HashMap::new(),
    }
}

pub struct ServiceTemplateBuilder {
    name: String,
    action_handlers: HashMap<String, ActionHandler>,
}

impl ServiceTemplateBuilder {
    pub fn handle_action(
        mut self,
        action: impl Into<String>,
        handler: impl Fn(&mut dyn AgentOps, &Message, &mut Message, &ActionHandle) -> ActionStatus
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.action_handlers
            .insert(action.into(), Arc::new(handler));
        self
    }

    pub fn commit(self, registry: &mut ModelRegistry) -> Result<()> {
        registry.register_service_template(ServiceTemplate::new(self.name, self.action_handlers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::body;

    #[test]
    fn tactic_filters_foreign_plans() {
        let mut registry = ModelRegistry::new();
        goal("Patrol").commit(&mut registry).unwrap();
        goal("Refuel").commit(&mut registry).unwrap();
        plan("Walk")
            .handles("Patrol")
            .body(body().action("Step"))
            .commit(&mut registry)
            .unwrap();
        plan("Pump")
            .handles("Refuel")
            .body(body().action("Fill"))
            .commit(&mut registry)
            .unwrap();

        let handle = tactic("CarefulPatrol")
            .goal("Patrol")
            .plans(["Walk", "Pump", "Imaginary"])
            .commit(&mut registry)
            .unwrap();
        assert!(handle.valid());

        let committed = registry.tactic("CarefulPatrol").unwrap();
        assert_eq!(committed.plans(), ["Walk".to_string()]);
    }

    #[test]
    fn agent_template_collects_handlers() {
        let mut registry = ModelRegistry::new();
        goal("Patrol").commit(&mut registry).unwrap();
        plan("Walk")
            .handles("Patrol")
            .body(body().action("Step"))
            .commit(&mut registry)
            .unwrap();

        agent("Scout")
            .plan("Walk")
            .belief_name("Position")
            .handle_action("Step", |_, _, _, _| ActionStatus::Success)
            .initial_goal("Patrol")
            .commit(&mut registry)
            .unwrap();

        let template = registry.agent_template("Scout").unwrap();
        assert!(template.handles_action("Step"));
        assert!(template.declares_belief("Position"));
        assert_eq!(template.initial_goals(), ["Patrol".to_string()]);
        assert!(!template.is_team());
    }
}

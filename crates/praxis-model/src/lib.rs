pub mod action;
pub mod body;
pub mod builders;
pub mod error;
pub mod goal;
pub mod plan;
pub mod registry;
pub mod role;
pub mod tactic;
pub mod template;

pub use action::{ActionHandle, ActionHandler, ActionStatus, AgentOps, MessageHandler};
pub use body::{body, BodyBuilder, GoalParams, TaskNode};
pub use builders::{
    agent, goal, message_schema, plan, resource, role, service, tactic, team, AgentTemplateBuilder,
    GoalBuilder, MessageSchemaBuilder, PlanBuilder, ResourceBuilder, RoleBuilder,
    ServiceTemplateBuilder, TacticBuilder,
};
pub use error::{ModelError, Result};
pub use goal::{BeliefQuery, Goal, Heuristic};
pub use plan::{Plan, PlanCost, PlanEffects, FAILED_COST};
pub use registry::{ModelRegistry, ResourceDef};
pub use role::Role;
pub use tactic::{PlanSelectionPolicy, Tactic};
pub use template::{AgentTemplate, ServiceTemplate};

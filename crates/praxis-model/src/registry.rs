use std::collections::BTreeMap;
use std::sync::Arc;

use praxis_core::{MessageSchema, Resource};

use crate::error::{ModelError, Result};
use crate::goal::Goal;
use crate::plan::Plan;
use crate::role::Role;
use crate::tactic::Tactic;
use crate::template::{AgentTemplate, ServiceTemplate};

/// Declaration of a bounded resource; instances are stamped into agent
/// belief contexts at creation.
#[derive(Debug, Clone)]
pub struct ResourceDef {
    pub name: String,
    pub min: i64,
    pub max: i64,
}

impl ResourceDef {
    pub fn instantiate(&self) -> Resource {
        Resource::new(self.name.clone(), self.min, self.max)
    }
}

/// The catalogue of committed definitions. Builders write into it; the
/// engine takes it behind an `Arc` at construction, after which it is
/// immutable. Registries are engine-scoped so tests can sandbox their
/// own models.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    goals: BTreeMap<String, Arc<Goal>>,
    plans: BTreeMap<String, Arc<Plan>>,
    plan_order: Vec<String>,
    tactics: BTreeMap<String, Arc<Tactic>>,
    roles: BTreeMap<String, Arc<Role>>,
    resources: BTreeMap<String, ResourceDef>,
    schemas: BTreeMap<String, Arc<MessageSchema>>,
    agent_templates: BTreeMap<String, Arc<AgentTemplate>>,
    service_templates: BTreeMap<String, Arc<ServiceTemplate>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn reject_duplicate(exists: bool, kind: &'static str, name: &str) -> Result<()> {
        if exists {
            return Err(ModelError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn register_goal(&mut self, goal: Goal) -> Result<()> {
        Self::reject_duplicate(self.goals.contains_key(goal.name()), "goal", goal.name())?;
        self.goals.insert(goal.name().to_string(), Arc::new(goal));
        Ok(())
    }

    pub(crate) fn register_plan(&mut self, plan: Plan) -> Result<()> {
        Self::reject_duplicate(self.plans.contains_key(plan.name()), "plan", plan.name())?;
        if !self.goals.contains_key(plan.handles()) {
            return Err(ModelError::UnknownReference {
                kind: "goal",
                name: plan.handles().to_string(),
                referrer: format!("plan '{}'", plan.name()),
            });
        }
        self.plan_order.push(plan.name().to_string());
        self.plans.insert(plan.name().to_string(), Arc::new(plan));
        Ok(())
    }

    pub(crate) fn register_tactic(&mut self, tactic: Tactic) -> Result<()> {
        Self::reject_duplicate(
            self.tactics.contains_key(tactic.name()),
            "tactic",
            tactic.name(),
        )?;
        if !self.goals.contains_key(tactic.goal()) {
            return Err(ModelError::UnknownReference {
                kind: "goal",
                name: tactic.goal().to_string(),
                referrer: format!("tactic '{}'", tactic.name()),
            });
        }
        self.tactics
            .insert(tactic.name().to_string(), Arc::new(tactic));
        Ok(())
    }

    pub(crate) fn register_role(&mut self, role: Role) -> Result<()> {
        Self::reject_duplicate(self.roles.contains_key(role.name()), "role", role.name())?;
        self.roles.insert(role.name().to_string(), Arc::new(role));
        Ok(())
    }

    pub(crate) fn register_resource(&mut self, def: ResourceDef) -> Result<()> {
        Self::reject_duplicate(
            self.resources.contains_key(&def.name),
            "resource",
            &def.name,
        )?;
        self.resources.insert(def.name.clone(), def);
        Ok(())
    }

    pub(crate) fn register_schema(&mut self, schema: MessageSchema) -> Result<()> {
        // Schema names are globally unique across the registry.
        Self::reject_duplicate(
            self.schemas.contains_key(schema.name()),
            "message schema",
            schema.name(),
        )?;
        self.schemas
            .insert(schema.name().to_string(), Arc::new(schema));
        Ok(())
    }

    pub(crate) fn register_agent_template(&mut self, template: AgentTemplate) -> Result<()> {
        Self::reject_duplicate(
            self.agent_templates.contains_key(template.name()),
            "agent template",
            template.name(),
        )?;
        self.agent_templates
            .insert(template.name().to_string(), Arc::new(template));
        Ok(())
    }

    pub(crate) fn register_service_template(&mut self, template: ServiceTemplate) -> Result<()> {
        Self::reject_duplicate(
            self.service_templates.contains_key(template.name()),
            "service template",
            template.name(),
        )?;
        self.service_templates
            .insert(template.name().to_string(), Arc::new(template));
        Ok(())
    }

    pub fn goal(&self, name: &str) -> Option<Arc<Goal>> {
        self.goals.get(name).cloned()
    }

    pub fn plan(&self, name: &str) -> Option<Arc<Plan>> {
        self.plans.get(name).cloned()
    }

    pub fn tactic(&self, name: &str) -> Option<Arc<Tactic>> {
        self.tactics.get(name).cloned()
    }

    pub fn role(&self, name: &str) -> Option<Arc<Role>> {
        self.roles.get(name).cloned()
    }

    pub fn resource_def(&self, name: &str) -> Option<&ResourceDef> {
        self.resources.get(name)
    }

    pub fn schema(&self, name: &str) -> Option<Arc<MessageSchema>> {
        self.schemas.get(name).cloned()
    }

    pub fn agent_template(&self, name: &str) -> Option<Arc<AgentTemplate>> {
        self.agent_templates.get(name).cloned()
    }

    pub fn service_template(&self, name: &str) -> Option<Arc<ServiceTemplate>> {
        self.service_templates.get(name).cloned()
    }

    /// Plans handling `goal` drawn from `library` (an agent's plan
    /// list), in registration order.
    pub fn plans_for_goal(&self, goal: &str, library: &[String]) -> Vec<Arc<Plan>> {
        self.plan_order
            .iter()
            .filter(|name| library.iter().any(|l| l == *name))
            .filter_map(|name| self.plans.get(name))
            .filter(|plan| plan.handles() == goal)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{goal, plan};
    use crate::body::body;

    #[test]
    fn duplicate_names_rejected() {
        let mut registry = ModelRegistry::new();
        goal("Patrol").commit(&mut registry).unwrap();
        assert!(goal("Patrol").commit(&mut registry).is_err());
    }

    #[test]
    fn plan_requires_known_goal() {
        let mut registry = ModelRegistry::new();
        let result = plan("Wander")
            .handles("Nowhere")
            .body(body().action("Step"))
            .commit(&mut registry);
        assert!(result.is_err());
    }

    #[test]
    fn plans_for_goal_respects_library_and_order() {
        let mut registry = ModelRegistry::new();
        goal("Patrol").commit(&mut registry).unwrap();
        plan("ByFoot")
            .handles("Patrol")
            .body(body().action("Walk"))
            .commit(&mut registry)
            .unwrap();
        plan("ByAir")
            .handles("Patrol")
            .body(body().action("Fly"))
            .commit(&mut registry)
            .unwrap();

        let library = vec!["ByAir".to_string(), "ByFoot".to_string()];
        let plans = registry.plans_for_goal("Patrol", &library);
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].name(), "ByFoot");

        let narrow = vec!["ByAir".to_string()];
        let plans = registry.plans_for_goal("Patrol", &narrow);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].name(), "ByAir");
    }
}

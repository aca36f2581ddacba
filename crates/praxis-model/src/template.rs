use std::collections::HashMap;
use std::fmt;

use crate::action::{ActionHandler, MessageHandler};

/// The immutable description an agent instance is stamped from:
/// its plan library, roles, declared beliefsets and resources, handler
/// table, and the goals it pursues the moment it is created.
///
/// Agents, teams and proxies are one record distinguished by capability
/// flags rather than an inheritance hierarchy.
#[derive(Clone, Default)]
pub struct AgentTemplate {
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

impl AgentTemplate {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
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
    ) -> Self {
        Self {
            name,
            plans,
            roles,
            beliefs,
            resources,
            action_handlers,
            message_handlers,
            initial_goals,
            is_team,
            is_proxy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plans(&self) -> &[String] {
        &self.plans
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn beliefs(&self) -> &[String] {
        &self.beliefs
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    pub fn initial_goals(&self) -> &[String] {
        &self.initial_goals
    }

    pub fn is_team(&self) -> bool {
        self.is_team
    }

    pub fn is_proxy(&self) -> bool {
        self.is_proxy
    }

    pub fn action_handler(&self, action: &str) -> Option<&ActionHandler> {
        self.action_handlers.get(action)
    }

    pub fn handles_action(&self, action: &str) -> bool {
        self.action_handlers.contains_key(action)
    }

    pub fn message_handler(&self, schema: &str) -> Option<&MessageHandler> {
        self.message_handlers.get(schema)
    }

    pub fn declares_belief(&self, schema: &str) -> bool {
        self.beliefs.iter().any(|s| s == schema)
    }
}

impl fmt::Debug for AgentTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentTemplate")
            .field("name", &self.name)
            .field("plans", &self.plans)
            .field("roles", &self.roles)
            .field("beliefs", &self.beliefs)
            .field("is_team", &self.is_team)
            .field("is_proxy", &self.is_proxy)
            .finish()
    }
}

/// A service template: a named bundle of action handlers that can be
/// attached to agents. One service instance per template type may be
/// attached to an agent at a time.
#[derive(Clone, Default)]
pub struct ServiceTemplate {
    name: String,
    action_handlers: HashMap<String, ActionHandler>,
}

impl ServiceTemplate {
    pub(crate) fn new(name: String, action_handlers: HashMap<String, ActionHandler>) -> Self {
        Self {
            name,
            action_handlers,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action_handler(&self, action: &str) -> Option<&ActionHandler> {
        self.action_handlers.get(action)
    }

    pub fn handles_action(&self, action: &str) -> bool {
        self.action_handlers.contains_key(action)
    }
}

impl fmt::Debug for ServiceTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceTemplate")
            .field("name", &self.name)
            .field(
                "actions",
                &self.action_handlers.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

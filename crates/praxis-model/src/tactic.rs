use serde::{Deserialize, Serialize};

use praxis_core::{Handle, UniqueId};

/// How the scheduler orders plan candidates for a goal and whether a
/// failed plan may be retried within the same pursuit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSelectionPolicy {
    /// A plan that failed is never tried again for the current desire;
    /// the desire fails once every candidate is excluded.
    #[default]
    Exclude,
    /// The starting index rotates across attempts; retries are
    /// unbounded.
    RoundRobin,
    /// One fixed order on every attempt; retries are unbounded.
    Strict,
}

/// Plan-selection behaviour scoped to one goal. An empty plan list
/// means "every plan that handles the goal, in registration order".
#[derive(Debug, Clone)]
pub struct Tactic {
    id: UniqueId,
    name: String,
    goal: String,
    plans: Vec<String>,
    policy: PlanSelectionPolicy,
}

impl Tactic {
    pub(crate) fn new(
        name: String,
        goal: String,
        plans: Vec<String>,
        policy: PlanSelectionPolicy,
    ) -> Self {
        Self {
            id: UniqueId::random(),
            name,
            goal,
            plans,
            policy,
        }
    }

    pub fn id(&self) -> UniqueId {
        self.id
    }

    pub fn handle(&self) -> Handle {
        Handle::new(self.name.clone(), self.id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn plans(&self) -> &[String] {
        &self.plans
    }

    pub fn policy(&self) -> PlanSelectionPolicy {
        self.policy
    }
}

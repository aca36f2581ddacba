use std::fmt;
use std::sync::Arc;

use praxis_core::BeliefContext;

use crate::body::TaskNode;
use crate::goal::BeliefQuery;

/// Sentinel returned by cost functions (and schedules) for an
/// infeasible choice. Any node reaching this cost is closed.
pub const FAILED_COST: f32 = f32::MAX;

/// Simulated plan effects applied to a projected context during search.
/// Effects are hypothetical: they never raise percept events.
pub type PlanEffects = Arc<dyn Fn(&mut BeliefContext) + Send + Sync>;

/// Cost of running the plan under a projected context.
pub type PlanCost = Arc<dyn Fn(&BeliefContext) -> f32 + Send + Sync>;

/// A plan handles exactly one goal. The body is the task tree executed
/// when the scheduler commits the plan into an intention.
#[derive(Clone)]
pub struct Plan {
    name: String,
    handles: String,
    pre: Option<BeliefQuery>,
    effects: Option<PlanEffects>,
    cost: Option<PlanCost>,
    locks: Vec<String>,
    body: Arc<TaskNode>,
}

impl Plan {
    pub(crate) fn new(
        name: String,
        handles: String,
        pre: Option<BeliefQuery>,
        effects: Option<PlanEffects>,
        cost: Option<PlanCost>,
        locks: Vec<String>,
        body: TaskNode,
    ) -> Self {
        Self {
            name,
            handles,
            pre,
            effects,
            cost,
            locks,
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The goal this plan achieves.
    pub fn handles(&self) -> &str {
        &self.handles
    }

    pub fn locks(&self) -> &[String] {
        &self.locks
    }

    pub fn body(&self) -> &Arc<TaskNode> {
        &self.body
    }

    pub fn pre_ok(&self, ctx: &BeliefContext) -> bool {
        self.pre.as_ref().map(|f| f(ctx)).unwrap_or(true)
    }

    pub fn apply_effects(&self, ctx: &mut BeliefContext) {
        if let Some(effects) = &self.effects {
            effects(ctx);
        }
    }

    /// Plan cost under a projected context; unit cost by default.
    pub fn cost(&self, ctx: &BeliefContext) -> f32 {
        self.cost.as_ref().map(|f| f(ctx)).unwrap_or(1.0)
    }
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("name", &self.name)
            .field("handles", &self.handles)
            .field("locks", &self.locks)
            .field("pre", &self.pre.is_some())
            .field("effects", &self.effects.is_some())
            .finish()
    }
}

use std::fmt;
use std::sync::Arc;

use praxis_core::BeliefContext;

/// Predicate over an agent's projected or live beliefs.
pub type BeliefQuery = Arc<dyn Fn(&BeliefContext) -> bool + Send + Sync>;

/// Admissible under-estimate of the remaining cost to achieve a goal.
pub type Heuristic = Arc<dyn Fn(&BeliefContext) -> f32 + Send + Sync>;

/// An immutable goal template. Desires are instantiated from these at
/// pursue time; the closures are evaluated against the desire's belief
/// context (goal parameters included).
#[derive(Clone)]
pub struct Goal {
    name: String,
    message_schema: Option<String>,
    pre: Option<BeliefQuery>,
    satisfied: Option<BeliefQuery>,
    should_drop: Option<BeliefQuery>,
    heuristic: Option<Heuristic>,
}

impl Goal {
    pub(crate) fn new(
        name: String,
        message_schema: Option<String>,
        pre: Option<BeliefQuery>,
        satisfied: Option<BeliefQuery>,
        should_drop: Option<BeliefQuery>,
        heuristic: Option<Heuristic>,
    ) -> Self {
        Self {
            name,
            message_schema,
            pre,
            satisfied,
            should_drop,
            heuristic,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message_schema(&self) -> Option<&str> {
        self.message_schema.as_deref()
    }

    /// Goal precondition; vacuously true when unspecified.
    pub fn pre_ok(&self, ctx: &BeliefContext) -> bool {
        self.pre.as_ref().map(|f| f(ctx)).unwrap_or(true)
    }

    pub fn satisfied(&self, ctx: &BeliefContext) -> bool {
        self.satisfied.as_ref().map(|f| f(ctx)).unwrap_or(false)
    }

    pub fn should_drop(&self, ctx: &BeliefContext) -> bool {
        self.should_drop.as_ref().map(|f| f(ctx)).unwrap_or(false)
    }

    pub fn heuristic(&self, ctx: &BeliefContext) -> f32 {
        self.heuristic
            .as_ref()
            .map(|f| f(ctx).max(0.0))
            .unwrap_or(0.0)
    }
}

impl fmt::Debug for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Goal")
            .field("name", &self.name)
            .field("message_schema", &self.message_schema)
            .field("pre", &self.pre.is_some())
            .field("satisfied", &self.satisfied.is_some())
            .field("should_drop", &self.should_drop.is_some())
            .finish()
    }
}

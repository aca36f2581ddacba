use std::fmt;
use std::sync::Arc;

use praxis_core::{BeliefContext, Message};

use crate::goal::BeliefQuery;

/// Computes the parameters for a sub-goal pursue from the pursuing
/// intention's belief context.
pub type GoalParams = Arc<dyn Fn(&BeliefContext) -> Message + Send + Sync>;

/// A node in a plan body. Bodies are explicit task trees advanced one
/// step per tick by the intention executor; leaves either complete
/// immediately or suspend until a completion event arrives (action
/// replies, timer expiry, sub-goal finish).
#[derive(Clone)]
pub enum TaskNode {
    /// Invoke an action handler (local or via an attached service).
    Action { action: String },
    /// Suspend the branch for a duration of engine time.
    Sleep { duration_ms: u64 },
    /// Pursue a sub-goal and wait for its terminal result.
    Goal {
        goal: String,
        parameters: Option<GoalParams>,
    },
    /// Evaluate the predicate once on entry and run one branch.
    Cond {
        pred: BeliefQuery,
        on_true: Box<TaskNode>,
        on_false: Box<TaskNode>,
    },
    /// Children run one after another; the first failure fails the node.
    Sequence(Vec<TaskNode>),
    /// Children advance together; any failure fails the node.
    Parallel(Vec<TaskNode>),
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskNode::Action { action } => write!(f, "Action({action})"),
            TaskNode::Sleep { duration_ms } => write!(f, "Sleep({duration_ms}ms)"),
            TaskNode::Goal { goal, .. } => write!(f, "Goal({goal})"),
            TaskNode::Cond {
                on_true, on_false, ..
            } => write!(f, "Cond({on_true:?}, {on_false:?})"),
            TaskNode::Sequence(children) => f.debug_tuple("Sequence").field(children).finish(),
            TaskNode::Parallel(children) => f.debug_tuple("Parallel").field(children).finish(),
        }
    }
}

/// Chainable builder for plan bodies, mirroring the coroutine-style
/// authoring surface. `body().action("TakeOff").sleep(500).goal("Cruise")`
/// builds a three-step sequence.
#[derive(Default)]
pub struct BodyBuilder {
    steps: Vec<TaskNode>,
}

pub fn body() -> BodyBuilder {
    BodyBuilder::default()
}

impl BodyBuilder {
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.steps.push(TaskNode::Action {
            action: action.into(),
        });
        self
    }

    pub fn sleep(mut self, duration_ms: u64) -> Self {
        self.steps.push(TaskNode::Sleep { duration_ms });
        self
    }

    pub fn goal(mut self, goal: impl Into<String>) -> Self {
        self.steps.push(TaskNode::Goal {
            goal: goal.into(),
            parameters: None,
        });
        self
    }

    pub fn goal_with(
        mut self,
        goal: impl Into<String>,
        parameters: impl Fn(&BeliefContext) -> Message + Send + Sync + 'static,
    ) -> Self {
        self.steps.push(TaskNode::Goal {
            goal: goal.into(),
            parameters: Some(Arc::new(parameters)),
        });
        self
    }

    pub fn cond(
        mut self,
        pred: impl Fn(&BeliefContext) -> bool + Send + Sync + 'static,
        on_true: BodyBuilder,
        on_false: BodyBuilder,
    ) -> Self {
        self.steps.push(TaskNode::Cond {
            pred: Arc::new(pred),
            on_true: Box::new(on_true.build()),
            on_false: Box::new(on_false.build()),
        });
        self
    }

    pub fn parallel(mut self, branches: Vec<BodyBuilder>) -> Self {
        self.steps.push(TaskNode::Parallel(
            branches.into_iter().map(BodyBuilder::build).collect(),
        ));
        self
    }

    pub fn build(self) -> TaskNode {
        TaskNode::Sequence(self.steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_sequence() {
        let node = body().action("A").sleep(10).goal("G").build();
        match node {
            TaskNode::Sequence(steps) => {
                assert_eq!(steps.len(), 3);
                assert!(matches!(&steps[0], TaskNode::Action { action } if action == "A"));
                assert!(matches!(&steps[1], TaskNode::Sleep { duration_ms: 10 }));
                assert!(matches!(&steps[2], TaskNode::Goal { goal, .. } if goal == "G"));
            }
            other => panic!("expected sequence, got {other:?}"),
        }
    }

    #[test]
    fn parallel_branches_nest() {
        let node = body()
            .parallel(vec![body().action("A"), body().action("B")])
            .build();
        match node {
            TaskNode::Sequence(steps) => match &steps[0] {
                TaskNode::Parallel(branches) => assert_eq!(branches.len(), 2),
                other => panic!("expected parallel, got {other:?}"),
            },
            other => panic!("expected sequence, got {other:?}"),
        }
    }
}

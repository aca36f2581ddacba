use tracing::{debug, trace, warn};

use praxis_core::{BeliefContext, DropMode, GoalResult, Handle, Message, UniqueId};
use praxis_model::{GoalParams, TaskNode};

use crate::schedule::{IntentionChoice, ScheduledIntention};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentionState {
    Waiting,
    Starting,
    Executing,
    Concluding,
    Done,
    Dropping,
    ForceDropping,
}

/// Observable executor activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningState {
    Idle,
    Executing,
    BusyWaitingOnExecutor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskStatus {
    Idle,
    Pending,
    Success,
    Fail,
}

impl TaskStatus {
    fn terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Fail)
    }
}

enum FlatKind {
    Action { action: String },
    Sleep { duration_ms: u64 },
    Goal { goal: String, parameters: Option<GoalParams> },
    Cond { pred: praxis_model::BeliefQuery },
    Sequence,
    Parallel,
}

struct FlatTask {
    task_id: UniqueId,
    kind: FlatKind,
    children: Vec<usize>,
    status: TaskStatus,
    /// Chosen branch of a Cond once its predicate has been evaluated.
    chosen: Option<usize>,
}

fn flatten(node: &TaskNode, tasks: &mut Vec<FlatTask>) -> usize {
    let slot = tasks.len();
    tasks.push(FlatTask {
        task_id: UniqueId::random(),
        kind: FlatKind::Sequence,
        children: Vec::new(),
        status: TaskStatus::Idle,
        chosen: None,
    });

    match node {
        TaskNode::Action { action } => {
            tasks[slot].kind = FlatKind::Action {
                action: action.clone(),
            };
        }
        TaskNode::Sleep { duration_ms } => {
            tasks[slot].kind = FlatKind::Sleep {
                duration_ms: *duration_ms,
            };
        }
        TaskNode::Goal { goal, parameters } => {
            tasks[slot].kind = FlatKind::Goal {
                goal: goal.clone(),
                parameters: parameters.clone(),
            };
        }
        TaskNode::Cond {
            pred,
            on_true,
            on_false,
        } => {
            tasks[slot].kind = FlatKind::Cond { pred: pred.clone() };
            let t = flatten(on_true, tasks);
            let f = flatten(on_false, tasks);
            tasks[slot].children = vec![t, f];
        }
        TaskNode::Sequence(children) => {
            tasks[slot].kind = FlatKind::Sequence;
            let indices: Vec<usize> = children.iter().map(|c| flatten(c, tasks)).collect();
            tasks[slot].children = indices;
        }
        TaskNode::Parallel(children) => {
            tasks[slot].kind = FlatKind::Parallel;
            let indices: Vec<usize> = children.iter().map(|c| flatten(c, tasks)).collect();
            tasks[slot].children = indices;
        }
    }
    slot
}

/// A committed desire being executed: one plan body (or one delegation)
/// as a per-tick task interpretation.
pub struct Intention {
    pub id: UniqueId,
    pub desire_id: UniqueId,
    pub desire_handle: Handle,
    pub choice: IntentionChoice,
    pub state: IntentionState,
    tasks: Vec<FlatTask>,
    root: usize,
    pub sub_goal_desire_ids: Vec<UniqueId>,
    pub drop_reason: String,
    delegation_sent: bool,
}

impl Intention {
    fn new(scheduled: ScheduledIntention) -> Self {
        let mut tasks = Vec::new();
        let root = match &scheduled.choice {
            IntentionChoice::Local { plan, .. } => flatten(plan.body(), &mut tasks),
            IntentionChoice::Delegated { .. } => 0,
        };
        Self {
            id: UniqueId::random(),
            desire_id: scheduled.desire_id,
            desire_handle: scheduled.handle,
            choice: scheduled.choice,
            state: IntentionState::Waiting,
            tasks,
            root,
            sub_goal_desire_ids: Vec::new(),
            drop_reason: String::new(),
            delegation_sent: false,
        }
    }

    pub fn plan_name(&self) -> &str {
        self.choice.plan_name().unwrap_or("<delegated>")
    }

    fn live(&self) -> bool {
        self.state != IntentionState::Done
    }
}

/// What the executor asks its agent to do. The executor mutates only
/// its own intentions; raising events, bus logs and desire bookkeeping
/// stay with the dispatcher.
pub enum ExecutorEffect {
    RaiseAction {
        intention_id: UniqueId,
        task_id: UniqueId,
        action: String,
        goal: Handle,
        plan: String,
    },
    StartTimer {
        intention_id: UniqueId,
        task_id: UniqueId,
        duration_ms: u64,
        goal: Handle,
        plan: String,
    },
    PursueSubGoal {
        intention_id: UniqueId,
        task_id: UniqueId,
        goal: String,
        parameters: Option<Message>,
    },
    SendDelegation {
        intention_id: UniqueId,
        goal: Handle,
        delegate: Handle,
    },
    /// Drop an orphaned sub-goal desire of a replaced intention.
    DropSubGoal {
        desire_id: UniqueId,
        reason: String,
    },
    IntentionConcluded {
        intention_id: UniqueId,
        desire_id: UniqueId,
        /// The plan that ran, when the intention was local.
        plan: Option<String>,
        result: GoalResult,
        reason: String,
    },
}

/// Runs one intention per scheduled desire, advancing ready tasks each
/// tick. Task leaves suspend on their completion events; composites
/// derive status from children.
#[derive(Default)]
pub struct IntentionExecutor {
    intentions: Vec<Intention>,
    stopping: bool,
    pending_conclusions: Vec<ExecutorEffect>,
}

impl IntentionExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intentions(&self) -> impl Iterator<Item = &Intention> {
        self.intentions.iter().filter(|i| i.live())
    }

    pub fn find_by_desire(&self, desire_id: UniqueId) -> Option<&Intention> {
        self.intentions
            .iter()
            .find(|i| i.live() && i.desire_id == desire_id)
    }

    pub fn find_by_desire_mut(&mut self, desire_id: UniqueId) -> Option<&mut Intention> {
        self.intentions
            .iter_mut()
            .find(|i| i.live() && i.desire_id == desire_id)
    }

    fn find_by_id_mut(&mut self, intention_id: UniqueId) -> Option<&mut Intention> {
        self.intentions
            .iter_mut()
            .find(|i| i.live() && i.id == intention_id)
    }

    pub fn record_sub_goal(&mut self, intention_id: UniqueId, desire_id: UniqueId) {
        if let Some(intention) = self.find_by_id_mut(intention_id) {
            intention.sub_goal_desire_ids.push(desire_id);
        }
    }

    pub fn done(&self) -> bool {
        !self.intentions.iter().any(Intention::live)
    }

    pub fn running_state(&self) -> RunningState {
        if self.done() {
            RunningState::Idle
        } else if self.stopping {
            RunningState::BusyWaitingOnExecutor
        } else {
            RunningState::Executing
        }
    }

    /// Stop starting new work; live intentions drain via the drop
    /// protocol driven by the agent.
    pub fn stop(&mut self) {
        self.stopping = true;
    }

    pub fn resume(&mut self) {
        self.stopping = false;
    }

    /// Install a finished schedule's intention list. Running intentions
    /// keep executing untouched when the schedule re-picked the same
    /// choice for their desire; a different choice silently replaces
    /// the old intention (its sub-goals are handed back for dropping).
    pub fn set_schedule(&mut self, scheduled: Vec<ScheduledIntention>) -> Vec<ExecutorEffect> {
        let mut effects = Vec::new();
        for entry in scheduled {
            match self.find_by_desire_mut(entry.desire_id) {
                Some(existing) => {
                    let same = match (&existing.choice, &entry.choice) {
                        (
                            IntentionChoice::Local { plan: a, .. },
                            IntentionChoice::Local { plan: b, .. },
                        ) => a.name() == b.name(),
                        (
                            IntentionChoice::Delegated { delegate: a },
                            IntentionChoice::Delegated { delegate: b },
                        ) => a == b,
                        _ => false,
                    };
                    if same {
                        continue;
                    }

                    debug!(
                        desire = %existing.desire_handle,
                        old_plan = existing.plan_name(),
                        new_plan = entry.choice.plan_name().unwrap_or("<delegated>"),
                        "replacing intention after replan"
                    );
                    let orphans = std::mem::take(&mut existing.sub_goal_desire_ids);
                    existing.state = IntentionState::Done;
                    for desire_id in orphans {
                        effects.push(ExecutorEffect::DropSubGoal {
                            desire_id,
                            reason: "parent intention replaced by a new schedule".to_string(),
                        });
                    }
                    self.intentions.push(Intention::new(entry));
                }
                None => self.intentions.push(Intention::new(entry)),
            }
        }
        effects
    }

    /// One step of every live intention.
    pub fn tick(
        &mut self,
        ctx_of: &mut dyn FnMut(UniqueId) -> Option<BeliefContext>,
    ) -> Vec<ExecutorEffect> {
        let mut effects = Vec::new();

        // Dropping intentions conclude first, children before parents
        // (children are later insertions), so a sub-goal's FINISHED log
        // always precedes its parent's.
        for idx in (0..self.intentions.len()).rev() {
            if matches!(
                self.intentions[idx].state,
                IntentionState::Dropping | IntentionState::ForceDropping
            ) {
                self.conclude(idx, GoalResult::Dropped, &mut effects);
            }
        }

        for idx in 0..self.intentions.len() {
            if !self.intentions[idx].live() {
                continue;
            }
            match self.intentions[idx].state {
                IntentionState::Waiting => {
                    self.intentions[idx].state = IntentionState::Starting;
                    self.start(idx, ctx_of, &mut effects);
                }
                IntentionState::Starting => self.start(idx, ctx_of, &mut effects),
                IntentionState::Executing => self.advance_intention(idx, ctx_of, &mut effects),
                IntentionState::Concluding
                | IntentionState::Done
                | IntentionState::Dropping
                | IntentionState::ForceDropping => {}
            }
        }

        self.intentions.retain(Intention::live);
        effects
    }

    fn start(
        &mut self,
        idx: usize,
        ctx_of: &mut dyn FnMut(UniqueId) -> Option<BeliefContext>,
        effects: &mut Vec<ExecutorEffect>,
    ) {
        let delegate = match &self.intentions[idx].choice {
            IntentionChoice::Local { .. } => None,
            IntentionChoice::Delegated { delegate } => Some(delegate.clone()),
        };

        match delegate {
            None => {
                self.intentions[idx].state = IntentionState::Executing;
                self.advance_intention(idx, ctx_of, effects);
            }
            Some(delegate) => {
                if !self.intentions[idx].delegation_sent {
                    effects.push(ExecutorEffect::SendDelegation {
                        intention_id: self.intentions[idx].id,
                        goal: self.intentions[idx].desire_handle.clone(),
                        delegate,
                    });
                    self.intentions[idx].delegation_sent = true;
                }
                self.intentions[idx].state = IntentionState::Executing;
            }
        }
    }

    fn advance_intention(
        &mut self,
        idx: usize,
        ctx_of: &mut dyn FnMut(UniqueId) -> Option<BeliefContext>,
        effects: &mut Vec<ExecutorEffect>,
    ) {
        if matches!(self.intentions[idx].choice, IntentionChoice::Delegated { .. }) {
            // Waiting on the delegate's report.
            return;
        }

        let root = self.intentions[idx].root;
        let status = self.advance_task(idx, root, ctx_of, effects);
        match status {
            TaskStatus::Success => self.conclude(idx, GoalResult::Success, effects),
            TaskStatus::Fail => self.conclude(idx, GoalResult::Fail, effects),
            TaskStatus::Idle | TaskStatus::Pending => {}
        }
    }

    fn advance_task(
        &mut self,
        idx: usize,
        task: usize,
        ctx_of: &mut dyn FnMut(UniqueId) -> Option<BeliefContext>,
        effects: &mut Vec<ExecutorEffect>,
    ) -> TaskStatus {
        let current = self.intentions[idx].tasks[task].status;
        if current.terminal() {
            return current;
        }

        // Snapshot the leaf payload first; the recursion below needs
        // the intention mutably.
        enum Step {
            RaiseAction(String),
            StartTimer(u64),
            PursueSubGoal(String, Option<GoalParams>),
            EnterCond(praxis_model::BeliefQuery),
            Descend(usize),
            RunSequence(Vec<usize>),
            RunParallel(Vec<usize>),
            StayPending,
        }

        let step = {
            let flat = &self.intentions[idx].tasks[task];
            match &flat.kind {
                FlatKind::Action { action } if current == TaskStatus::Idle => {
                    Step::RaiseAction(action.clone())
                }
                FlatKind::Sleep { duration_ms } if current == TaskStatus::Idle => {
                    Step::StartTimer(*duration_ms)
                }
                FlatKind::Goal { goal, parameters } if current == TaskStatus::Idle => {
                    Step::PursueSubGoal(goal.clone(), parameters.clone())
                }
                FlatKind::Action { .. } | FlatKind::Sleep { .. } | FlatKind::Goal { .. } => {
                    Step::StayPending
                }
                FlatKind::Cond { pred } => match flat.chosen {
                    Some(chosen) => Step::Descend(flat.children[chosen]),
                    None => Step::EnterCond(pred.clone()),
                },
                FlatKind::Sequence => Step::RunSequence(flat.children.clone()),
                FlatKind::Parallel => Step::RunParallel(flat.children.clone()),
            }
        };

        let intention_id = self.intentions[idx].id;
        let desire_id = self.intentions[idx].desire_id;
        let task_id = self.intentions[idx].tasks[task].task_id;

        let status = match step {
            Step::RaiseAction(action) => {
                effects.push(ExecutorEffect::RaiseAction {
                    intention_id,
                    task_id,
                    action,
                    goal: self.intentions[idx].desire_handle.clone(),
                    plan: self.intentions[idx].plan_name().to_string(),
                });
                TaskStatus::Pending
            }
            Step::StartTimer(duration_ms) => {
                effects.push(ExecutorEffect::StartTimer {
                    intention_id,
                    task_id,
                    duration_ms,
                    goal: self.intentions[idx].desire_handle.clone(),
                    plan: self.intentions[idx].plan_name().to_string(),
                });
                TaskStatus::Pending
            }
            Step::PursueSubGoal(goal, parameters) => {
                let parameters =
                    parameters.and_then(|f| ctx_of(desire_id).map(|ctx| f(&ctx)));
                effects.push(ExecutorEffect::PursueSubGoal {
                    intention_id,
                    task_id,
                    goal,
                    parameters,
                });
                TaskStatus::Pending
            }
            Step::StayPending => TaskStatus::Pending,
            Step::EnterCond(pred) => {
                let holds = ctx_of(desire_id).map(|ctx| pred(&ctx)).unwrap_or(false);
                let chosen = if holds { 0 } else { 1 };
                self.intentions[idx].tasks[task].chosen = Some(chosen);
                let child = self.intentions[idx].tasks[task].children[chosen];
                self.advance_task(idx, child, ctx_of, effects)
            }
            Step::Descend(child) => self.advance_task(idx, child, ctx_of, effects),
            Step::RunSequence(children) => {
                let mut status = TaskStatus::Success;
                for child in children {
                    match self.advance_task(idx, child, ctx_of, effects) {
                        TaskStatus::Success => continue,
                        other => {
                            status = other;
                            break;
                        }
                    }
                }
                status
            }
            Step::RunParallel(children) => {
                let mut all_done = true;
                let mut failed = false;
                for child in children {
                    match self.advance_task(idx, child, ctx_of, effects) {
                        TaskStatus::Fail => failed = true,
                        TaskStatus::Success => {}
                        _ => all_done = false,
                    }
                }
                if failed {
                    TaskStatus::Fail
                } else if all_done {
                    TaskStatus::Success
                } else {
                    TaskStatus::Pending
                }
            }
        };

        self.intentions[idx].tasks[task].status = status;
        status
    }

    fn conclude(&mut self, idx: usize, result: GoalResult, effects: &mut Vec<ExecutorEffect>) {
        let intention = &mut self.intentions[idx];
        intention.state = IntentionState::Concluding;
        trace!(desire = %intention.desire_handle, plan = intention.plan_name(), %result, "intention concluding");
        effects.push(ExecutorEffect::IntentionConcluded {
            intention_id: intention.id,
            desire_id: intention.desire_id,
            plan: intention.choice.plan_name().map(str::to_string),
            result,
            reason: intention.drop_reason.clone(),
        });
        intention.state = IntentionState::Done;
    }

    /// Mark the intention executing `desire_id` for dropping. Returns
    /// false when no live intention exists for it (the caller then
    /// finishes the desire directly).
    pub fn internal_drop(&mut self, desire_id: UniqueId, mode: DropMode, reason: &str) -> bool {
        match self.find_by_desire_mut(desire_id) {
            Some(intention) => {
                intention.drop_reason = reason.to_string();
                intention.state = match mode {
                    DropMode::Normal => IntentionState::Dropping,
                    DropMode::Force => IntentionState::ForceDropping,
                };
                true
            }
            None => false,
        }
    }

    /// Whether the intention for a desire is being force-dropped (such
    /// desires sit out goal activation).
    pub fn force_dropping(&self, desire_id: UniqueId) -> bool {
        self.find_by_desire(desire_id)
            .map(|i| i.state == IntentionState::ForceDropping)
            .unwrap_or(false)
    }

    fn complete_leaf(&mut self, intention_id: UniqueId, task_id: UniqueId, success: bool) -> bool {
        let Some(intention) = self.find_by_id_mut(intention_id) else {
            return false;
        };
        let Some(task) = intention
            .tasks
            .iter_mut()
            .find(|t| t.task_id == task_id && t.status == TaskStatus::Pending)
        else {
            return false;
        };
        task.status = if success {
            TaskStatus::Success
        } else {
            TaskStatus::Fail
        };
        true
    }

    pub fn on_action_complete(
        &mut self,
        intention_id: UniqueId,
        task_id: UniqueId,
        success: bool,
    ) -> bool {
        self.complete_leaf(intention_id, task_id, success)
    }

    pub fn on_timer_fired(&mut self, intention_id: UniqueId, task_id: UniqueId) -> bool {
        self.complete_leaf(intention_id, task_id, true)
    }

    pub fn on_subgoal_complete(
        &mut self,
        intention_id: UniqueId,
        task_id: UniqueId,
        result: GoalResult,
    ) -> bool {
        self.complete_leaf(intention_id, task_id, result == GoalResult::Success)
    }

    /// Report from the delegate executing a delegated goal.
    pub fn on_delegation_complete(&mut self, desire_id: UniqueId, success: bool) -> bool {
        let Some(idx) = self
            .intentions
            .iter()
            .position(|i| i.live() && i.desire_id == desire_id)
        else {
            warn!(desire = %desire_id, "delegation completed but intention is gone");
            return false;
        };
        if !matches!(self.intentions[idx].choice, IntentionChoice::Delegated { .. }) {
            return false;
        }

        let mut effects = Vec::new();
        self.conclude(
            idx,
            if success {
                GoalResult::Success
            } else {
                GoalResult::Fail
            },
            &mut effects,
        );
        self.pending_conclusions.extend(effects);
        true
    }

    /// Conclusions produced outside `tick` (delegation reports land in
    /// the dispatcher); drained by the agent right after dispatch.
    pub fn take_pending_conclusions(&mut self) -> Vec<ExecutorEffect> {
        std::mem::take(&mut self.pending_conclusions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use praxis_core::BeliefContext;
    use praxis_model::builders::{goal, plan};
    use praxis_model::{body, ModelRegistry};

    fn scheduled(registry: &ModelRegistry, goal_name: &str, plan_name: &str) -> ScheduledIntention {
        let desire_id = UniqueId::random();
        ScheduledIntention {
            desire_id,
            handle: Handle::new(goal_name, desire_id),
            choice: IntentionChoice::Local {
                plan: registry.plan(plan_name).unwrap(),
                selection: 0,
            },
        }
    }

    fn no_ctx(_: UniqueId) -> Option<BeliefContext> {
        Some(BeliefContext::new())
    }

    #[test]
    fn sequence_raises_one_leaf_at_a_time() {
        let mut registry = ModelRegistry::new();
        goal("Patrol").commit(&mut registry).unwrap();
        plan("TwoSteps")
            .handles("Patrol")
            .body(body::body().action("First").action("Second"))
            .commit(&mut registry)
            .unwrap();

        let mut executor = IntentionExecutor::new();
        executor.set_schedule(vec![scheduled(&registry, "Patrol", "TwoSteps")]);

        let effects = executor.tick(&mut no_ctx);
        let (intention_id, task_id) = match effects.as_slice() {
            [ExecutorEffect::RaiseAction {
                intention_id,
                task_id,
                action,
                ..
            }] => {
                assert_eq!(action, "First");
                (*intention_id, *task_id)
            }
            other => panic!("expected one raised action, got {} effects", other.len()),
        };

        // Still waiting: re-ticking raises nothing new.
        assert!(executor.tick(&mut no_ctx).is_empty());
        assert_eq!(executor.running_state(), RunningState::Executing);

        assert!(executor.on_action_complete(intention_id, task_id, true));
        let effects = executor.tick(&mut no_ctx);
        assert!(matches!(
            effects.as_slice(),
            [ExecutorEffect::RaiseAction { action, .. }] if action == "Second"
        ));
    }

    #[test]
    fn sequence_failure_concludes_the_intention() {
        let mut registry = ModelRegistry::new();
        goal("Patrol").commit(&mut registry).unwrap();
        plan("OneStep")
            .handles("Patrol")
            .body(body::body().action("Only"))
            .commit(&mut registry)
            .unwrap();

        let mut executor = IntentionExecutor::new();
        executor.set_schedule(vec![scheduled(&registry, "Patrol", "OneStep")]);

        let effects = executor.tick(&mut no_ctx);
        let (intention_id, task_id) = match effects.as_slice() {
            [ExecutorEffect::RaiseAction {
                intention_id,
                task_id,
                ..
            }] => (*intention_id, *task_id),
            _ => panic!("expected one raised action"),
        };

        executor.on_action_complete(intention_id, task_id, false);
        let effects = executor.tick(&mut no_ctx);
        assert!(matches!(
            effects.as_slice(),
            [ExecutorEffect::IntentionConcluded {
                result: GoalResult::Fail,
                ..
            }]
        ));
        assert!(executor.done());
    }

    #[test]
    fn parallel_branches_advance_together() {
        let mut registry = ModelRegistry::new();
        goal("Patrol").commit(&mut registry).unwrap();
        plan("Fork")
            .handles("Patrol")
            .body(body::body().parallel(vec![
                body::body().action("Left"),
                body::body().action("Right"),
            ]))
            .commit(&mut registry)
            .unwrap();

        let mut executor = IntentionExecutor::new();
        executor.set_schedule(vec![scheduled(&registry, "Patrol", "Fork")]);

        let effects = executor.tick(&mut no_ctx);
        assert_eq!(effects.len(), 2, "both branches raise their action");

        let raised: Vec<(UniqueId, UniqueId)> = effects
            .iter()
            .map(|e| match e {
                ExecutorEffect::RaiseAction {
                    intention_id,
                    task_id,
                    ..
                } => (*intention_id, *task_id),
                _ => panic!("expected raised actions"),
            })
            .collect();

        for (intention_id, task_id) in &raised {
            executor.on_action_complete(*intention_id, *task_id, true);
        }
        let effects = executor.tick(&mut no_ctx);
        assert!(matches!(
            effects.as_slice(),
            [ExecutorEffect::IntentionConcluded {
                result: GoalResult::Success,
                ..
            }]
        ));
    }

    #[test]
    fn internal_drop_concludes_with_dropped() {
        let mut registry = ModelRegistry::new();
        goal("Patrol").commit(&mut registry).unwrap();
        plan("Long")
            .handles("Patrol")
            .body(body::body().sleep(60_000))
            .commit(&mut registry)
            .unwrap();

        let mut executor = IntentionExecutor::new();
        let entry = scheduled(&registry, "Patrol", "Long");
        let desire_id = entry.desire_id;
        executor.set_schedule(vec![entry]);
        executor.tick(&mut no_ctx);

        assert!(!executor.internal_drop(UniqueId::random(), DropMode::Normal, "not ours"));
        assert!(executor.internal_drop(desire_id, DropMode::Normal, "changed our mind"));

        let effects = executor.tick(&mut no_ctx);
        assert!(matches!(
            effects.as_slice(),
            [ExecutorEffect::IntentionConcluded {
                result: GoalResult::Dropped,
                ..
            }]
        ));
        assert!(executor.done());
        assert_eq!(executor.running_state(), RunningState::Idle);
    }
}

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use tracing::{debug, trace};

use praxis_core::{BeliefContext, Handle, Message, UniqueId};
use praxis_model::{Goal, Plan, PlanSelectionPolicy, FAILED_COST};

use crate::event::{AuctionBid, AuctionEvent};

/// One desire as seen by a schedule: an isolated clone of everything
/// the search needs, so a schedule (in particular a delegation sandbox)
/// can outlive the agent's live desire set.
pub struct ScheduleDesire {
    pub desire_id: UniqueId,
    pub handle: Handle,
    pub goal: Arc<Goal>,
    pub parameters: Option<Arc<Message>>,
    /// Tactic-filtered plan candidates, already ordered and pruned by
    /// the selection policy and this desire's plan history.
    pub plans: Vec<Arc<Plan>>,
    pub policy: PlanSelectionPolicy,
    /// Delegate candidates when the desire has no local plans.
    pub candidates: Vec<Handle>,
}

impl ScheduleDesire {
    fn delegated(&self) -> bool {
        self.plans.is_empty()
    }
}

/// The winning choice for one desire in a finished schedule.
#[derive(Debug, Clone)]
pub enum IntentionChoice {
    Local { plan: Arc<Plan>, selection: usize },
    Delegated { delegate: Handle },
}

impl IntentionChoice {
    pub fn plan_name(&self) -> Option<&str> {
        match self {
            IntentionChoice::Local { plan, .. } => Some(plan.name()),
            IntentionChoice::Delegated { .. } => None,
        }
    }
}

/// One entry of the ordered intention list a finished schedule hands
/// to the executor.
#[derive(Debug, Clone)]
pub struct ScheduledIntention {
    pub desire_id: UniqueId,
    pub handle: Handle,
    pub choice: IntentionChoice,
}

/// Side effects the schedule asks its owning agent to perform. The
/// search itself never touches mailboxes or the bus.
pub enum ScheduleRequest {
    StartAuction {
        schedule_id: UniqueId,
        goal: Handle,
        parameters: Option<Arc<Message>>,
        candidates: Vec<Handle>,
    },
}

struct SearchNode {
    parent: Option<usize>,
    /// Number of desires scheduled along the path ending here.
    depth: usize,
    choice: Option<(usize, IntentionChoice)>,
    cost: f32,
    heuristic: f32,
    context: BeliefContext,
    locks: Vec<String>,
}

/// Open-set entry. The heap pops the lowest f first; ties break on the
/// plan selection index under the tactic, then desire insertion order,
/// then node sequence, which makes the optimal finished node
/// reproducible for identical inputs.
struct OpenEntry {
    f: f32,
    selection: usize,
    desire_order: usize,
    seq: u64,
    node: usize,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for OpenEntry {}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: invert so the best entry pops first.
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.selection.cmp(&self.selection))
            .then_with(|| other.desire_order.cmp(&self.desire_order))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

enum AuctionState {
    Requested,
    Resolved(Vec<AuctionBid>),
}

/// A* search over sequences of `(desire, plan)` choices. Desires are
/// scheduled in insertion order; branching happens over the plan
/// candidates of each desire. Delegated desires move their node into
/// the pending-auction set until bids arrive.
pub struct Schedule {
    id: UniqueId,
    desires: Vec<ScheduleDesire>,
    nodes: Vec<SearchNode>,
    open: BinaryHeap<OpenEntry>,
    /// Nodes parked on an unresolved auction, keyed by desire index.
    pending: Vec<(usize, usize)>,
    auctions: HashMap<usize, AuctionState>,
    seq: u64,
    best: Option<usize>,
    finished: bool,
    closed: usize,
    /// Set on sandbox schedules built for a delegation analysis.
    pub delegator: Option<Handle>,
    pub delegator_schedule_id: Option<UniqueId>,
}

impl Schedule {
    pub fn new(context: BeliefContext, desires: Vec<ScheduleDesire>) -> Self {
        let root = SearchNode {
            parent: None,
            depth: 0,
            choice: None,
            cost: 0.0,
            heuristic: 0.0,
            context,
            locks: Vec::new(),
        };
        let mut schedule = Self {
            id: UniqueId::random(),
            desires,
            nodes: vec![root],
            open: BinaryHeap::new(),
            pending: Vec::new(),
            auctions: HashMap::new(),
            seq: 0,
            best: None,
            finished: false,
            closed: 0,
            delegator: None,
            delegator_schedule_id: None,
        };
        if schedule.desires.is_empty() {
            schedule.best = Some(0);
            schedule.finished = true;
        } else {
            schedule.push_open(0, 0, 0);
        }
        schedule
    }

    pub fn id(&self) -> UniqueId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Cost of the optimal finished node, or the failure sentinel when
    /// the search exhausted without covering every desire.
    pub fn best_cost(&self) -> f32 {
        match self.best {
            Some(node) => self.nodes[node].cost,
            None => FAILED_COST,
        }
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn closed_count(&self) -> usize {
        self.closed
    }

    fn push_open(&mut self, node: usize, selection: usize, desire_order: usize) {
        let entry = OpenEntry {
            f: self.nodes[node].cost + self.nodes[node].heuristic,
            selection,
            desire_order,
            seq: self.seq,
            node,
        };
        self.seq += 1;
        self.open.push(entry);
    }

    /// Run up to `max_iterations` expansion steps. Returns auction
    /// requests for the owning agent to raise. Planning for a branch
    /// pauses (without consuming iterations) while its auction is out.
    pub fn advance(&mut self, max_iterations: usize) -> Vec<ScheduleRequest> {
        let mut requests = Vec::new();
        for _ in 0..max_iterations {
            if self.finished {
                break;
            }
            let Some(entry) = self.open.pop() else {
                if self.pending.is_empty() {
                    debug!(schedule = %self.id, closed = self.closed, "search exhausted without covering all desires");
                    self.finished = true;
                }
                break;
            };

            let node = entry.node;
            if self.nodes[node].depth == self.desires.len() {
                self.best = Some(node);
                self.finished = true;
                trace!(schedule = %self.id, cost = self.nodes[node].cost, "schedule finished");
                break;
            }

            let desire_idx = self.nodes[node].depth;
            self.expand(node, desire_idx, &mut requests);
        }
        requests
    }

    fn expand(&mut self, node: usize, desire_idx: usize, requests: &mut Vec<ScheduleRequest>) {
        if self.desires[desire_idx].delegated() {
            self.expand_delegated(node, desire_idx, requests);
            return;
        }

        let mut produced = 0usize;
        for selection in 0..self.desires[desire_idx].plans.len() {
            let desire = &self.desires[desire_idx];
            let plan = Arc::clone(&desire.plans[selection]);

            // Evaluate the plan under this node's projection with the
            // desire's own goal parameters in scope.
            let mut ctx = self.nodes[node].context.clone();
            if let Some(parameters) = &desire.parameters {
                ctx.set_goal_context(Arc::clone(parameters));
            }

            if !plan.pre_ok(&ctx) {
                continue;
            }

            let cost = plan.cost(&ctx);
            if cost >= FAILED_COST {
                self.closed += 1;
                continue;
            }

            // Deconflict: an exclusive resource may not be locked twice
            // along one path, nor taken while a running intention holds
            // it.
            let double_locked = plan.locks().iter().any(|lock| {
                self.nodes[node].locks.contains(lock)
                    || ctx.resource(lock).map(|r| r.locked()).unwrap_or(false)
            });
            if double_locked {
                self.closed += 1;
                continue;
            }

            plan.apply_effects(&mut ctx);
            if let Some(resource) = ctx.resource_violation() {
                trace!(schedule = %self.id, plan = plan.name(), resource, "effects violate resource range");
                self.closed += 1;
                continue;
            }
            ctx.clear_goal_context();

            let mut locks = self.nodes[node].locks.clone();
            locks.extend(plan.locks().iter().cloned());

            let heuristic = self.remaining_heuristic(desire_idx + 1, &ctx);
            if heuristic >= FAILED_COST {
                self.closed += 1;
                continue;
            }

            let child = SearchNode {
                parent: Some(node),
                depth: desire_idx + 1,
                choice: Some((
                    desire_idx,
                    IntentionChoice::Local {
                        plan: Arc::clone(&plan),
                        selection,
                    },
                )),
                cost: self.nodes[node].cost + cost,
                heuristic,
                context: ctx,
                locks,
            };
            let child_idx = self.nodes.len();
            self.nodes.push(child);
            self.push_open(child_idx, selection, desire_idx);
            produced += 1;
        }

        if produced == 0 {
            self.closed += 1;
        }
    }

    fn expand_delegated(
        &mut self,
        node: usize,
        desire_idx: usize,
        requests: &mut Vec<ScheduleRequest>,
    ) {
        if self.desires[desire_idx].candidates.is_empty() {
            self.closed += 1;
            return;
        }

        let resolved = match self.auctions.get(&desire_idx) {
            Some(AuctionState::Resolved(bids)) => Some(bids.clone()),
            Some(AuctionState::Requested) => {
                self.pending.push((node, desire_idx));
                return;
            }
            None => None,
        };

        match resolved {
            Some(bids) => self.bind_bid(node, desire_idx, &bids),
            None => {
                self.auctions.insert(desire_idx, AuctionState::Requested);
                self.pending.push((node, desire_idx));
                let desire = &self.desires[desire_idx];
                requests.push(ScheduleRequest::StartAuction {
                    schedule_id: self.id,
                    goal: desire.handle.clone(),
                    parameters: desire.parameters.clone(),
                    candidates: desire.candidates.clone(),
                });
            }
        }
    }

    /// Bind the best bid into a child of `node` and promote it back to
    /// the open set. The lowest score wins; ties go to the lexically
    /// smallest member name.
    fn bind_bid(&mut self, node: usize, desire_idx: usize, bids: &[AuctionBid]) {
        let winner = bids
            .iter()
            .filter(|bid| bid.score < FAILED_COST)
            .min_by(|a, b| {
                a.score
                    .total_cmp(&b.score)
                    .then_with(|| a.bidder.name.cmp(&b.bidder.name))
            });

        let Some(winner) = winner else {
            debug!(schedule = %self.id, goal = %self.desires[desire_idx].handle, "no viable bids; branch closed");
            self.closed += 1;
            return;
        };

        let ctx = self.nodes[node].context.clone();
        let heuristic = self.remaining_heuristic(desire_idx + 1, &ctx);
        if heuristic >= FAILED_COST {
            self.closed += 1;
            return;
        }

        let child = SearchNode {
            parent: Some(node),
            depth: desire_idx + 1,
            choice: Some((
                desire_idx,
                IntentionChoice::Delegated {
                    delegate: winner.bidder.clone(),
                },
            )),
            cost: self.nodes[node].cost + winner.score,
            heuristic,
            context: ctx,
            locks: self.nodes[node].locks.clone(),
        };
        let child_idx = self.nodes.len();
        self.nodes.push(child);
        self.push_open(child_idx, 0, desire_idx);
    }

    /// Admissible estimate for the desires not yet covered: their own
    /// heuristic closure (zero by default), or the failure sentinel for
    /// a desire that has neither plans nor delegates.
    fn remaining_heuristic(&self, from: usize, ctx: &BeliefContext) -> f32 {
        let mut total = 0.0;
        for desire in &self.desires[from..] {
            if desire.delegated() && desire.candidates.is_empty() {
                return FAILED_COST;
            }
            total += desire.goal.heuristic(ctx);
        }
        total
    }

    /// Merge returned bids into every branch parked on this goal's
    /// auction.
    pub fn process_auction(&mut self, event: &AuctionEvent) {
        let Some(desire_idx) = self
            .desires
            .iter()
            .position(|desire| desire.handle.id == event.goal.id)
        else {
            debug!(schedule = %self.id, goal = %event.goal, "auction for goal not in schedule");
            return;
        };

        self.auctions
            .insert(desire_idx, AuctionState::Resolved(event.bids.clone()));

        let woken: Vec<usize> = self
            .pending
            .iter()
            .filter(|(_, idx)| *idx == desire_idx)
            .map(|(node, _)| *node)
            .collect();
        self.pending.retain(|(_, idx)| *idx != desire_idx);

        for node in woken {
            self.bind_bid(node, desire_idx, &event.bids);
        }

        if self.open.is_empty() && self.pending.is_empty() && !self.finished {
            self.finished = true;
        }
    }

    /// The ordered intention list of the optimal finished node. Empty
    /// when the search failed to cover the desires. A final deconflict
    /// pass asserts the lock invariant held along the chosen path.
    pub fn intentions(&self) -> Vec<ScheduledIntention> {
        let Some(mut node) = self.best else {
            return Vec::new();
        };

        let mut reversed = Vec::new();
        while let Some(parent) = self.nodes[node].parent {
            if let Some((desire_idx, choice)) = &self.nodes[node].choice {
                reversed.push((*desire_idx, choice.clone()));
            }
            node = parent;
        }
        reversed.reverse();

        debug_assert!(
            {
                let mut seen: Vec<&str> = Vec::new();
                reversed.iter().all(|(_, choice)| match choice {
                    IntentionChoice::Local { plan, .. } => plan.locks().iter().all(|lock| {
                        let fresh = !seen.contains(&lock.as_str());
                        seen.push(lock);
                        fresh
                    }),
                    IntentionChoice::Delegated { .. } => true,
                })
            },
            "finished schedule double-locks an exclusive resource"
        );

        reversed
            .into_iter()
            .map(|(desire_idx, choice)| {
                let desire = &self.desires[desire_idx];
                ScheduledIntention {
                    desire_id: desire.desire_id,
                    handle: desire.handle.clone(),
                    choice,
                }
            })
            .collect()
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{CoreError, Result};
use crate::id::UniqueId;
use crate::message::{Field, Message};
use crate::resource::Resource;

/// A beliefset received from a teammate, tagged with its owner and the
/// engine clock at the time of the upsert. `prev_last_updated_ms` is the
/// relay watermark: the team forwards an entry to its members only when
/// the two timestamps differ.
#[derive(Debug, Clone)]
pub struct SharedBeliefSet {
    pub owner_id: UniqueId,
    pub owner_name: String,
    pub beliefset: Arc<Message>,
    pub last_updated_ms: u64,
    pub prev_last_updated_ms: u64,
}

/// Per-agent belief state: local beliefsets keyed by schema name,
/// named resources, the parameters of the goal currently being pursued,
/// and beliefsets shared in by teammates.
///
/// The context is a value type. The scheduler clones it to project
/// hypothetical plan effects without touching live agent state, and a
/// desire snapshots it at creation.
#[derive(Debug, Default, Clone)]
pub struct BeliefContext {
    messages: BTreeMap<String, Arc<Message>>,
    resources: BTreeMap<String, Resource>,
    goal_context: Option<Arc<Message>>,
    shared: BTreeMap<String, Vec<SharedBeliefSet>>,
}

impl BeliefContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a beliefset by its schema name.
    pub fn add_message(&mut self, msg: Arc<Message>) {
        self.messages.insert(msg.schema().to_string(), msg);
    }

    /// Shared reference to a beliefset, if held.
    pub fn message(&self, name: &str) -> Option<Arc<Message>> {
        self.messages.get(name).cloned()
    }

    pub fn has_message(&self, name: &str) -> bool {
        self.messages.contains_key(name)
    }

    pub fn messages(&self) -> impl Iterator<Item = (&String, &Arc<Message>)> {
        self.messages.iter()
    }

    /// Apply a percept-style field write to a held beliefset. Copy-on-
    /// write: retained snapshots elsewhere keep the old value.
    pub fn set_message_field(&mut self, name: &str, field: &str, value: Field) -> bool {
        match self.messages.get_mut(name) {
            Some(msg) => Arc::make_mut(msg).set_field(field, value),
            None => false,
        }
    }

    pub fn add_resource(&mut self, resource: Resource) {
        self.resources.insert(resource.name().to_string(), resource);
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    pub fn resource_mut(&mut self, name: &str) -> Option<&mut Resource> {
        self.resources.get_mut(name)
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Consume units of a resource without clamping. Plan effect
    /// closures use this so the scheduler can observe overdraw.
    pub fn consume_resource(&mut self, name: &str, amount: i64) -> Result<()> {
        let resource = self
            .resources
            .get_mut(name)
            .ok_or_else(|| CoreError::UnknownResource(name.to_string()))?;
        resource.consume(amount);
        Ok(())
    }

    pub fn lock_resources(&mut self, names: &[String]) {
        for name in names {
            if let Some(resource) = self.resources.get_mut(name) {
                resource.lock();
            }
        }
    }

    pub fn unlock_resources(&mut self, names: &[String]) {
        for name in names {
            if let Some(resource) = self.resources.get_mut(name) {
                resource.unlock();
            }
        }
    }

    /// Name of the first resource outside its declared range, if any.
    pub fn resource_violation(&self) -> Option<&str> {
        self.resources
            .values()
            .find(|r| r.violated())
            .map(|r| r.name())
    }

    pub fn set_goal_context(&mut self, parameters: Arc<Message>) {
        self.goal_context = Some(parameters);
    }

    pub fn clear_goal_context(&mut self) {
        self.goal_context = None;
    }

    pub fn goal_context(&self) -> Option<&Arc<Message>> {
        self.goal_context.as_ref()
    }

    /// Convenience lookup spanning the goal context first, then local
    /// beliefsets.
    pub fn bool_belief(&self, message: &str, field: &str) -> Option<bool> {
        self.field(message, field).and_then(|f| f.as_bool())
    }

    pub fn i64_belief(&self, message: &str, field: &str) -> Option<i64> {
        self.field(message, field).and_then(|f| f.as_i64())
    }

    fn field(&self, message: &str, field: &str) -> Option<Field> {
        if let Some(goal) = &self.goal_context {
            if goal.schema() == message {
                return goal.field(field).cloned();
            }
        }
        self.messages
            .get(message)
            .and_then(|msg| msg.field(field).cloned())
    }

    /// Upsert a teammate's beliefset. Never records the holder itself as
    /// an owner; callers enforce that by construction (the relay skips
    /// echoing to the originator).
    pub fn upsert_shared(
        &mut self,
        owner_id: UniqueId,
        owner_name: &str,
        beliefset: Arc<Message>,
        now_ms: u64,
    ) {
        let list = self
            .shared
            .entry(beliefset.schema().to_string())
            .or_default();
        match list.iter_mut().find(|entry| entry.owner_id == owner_id) {
            Some(entry) => {
                entry.beliefset = beliefset;
                entry.last_updated_ms = now_ms;
            }
            None => {
                debug!(owner = %owner_name, schema = %beliefset.schema(), "first shared beliefset from owner");
                list.push(SharedBeliefSet {
                    owner_id,
                    owner_name: owner_name.to_string(),
                    beliefset,
                    last_updated_ms: now_ms,
                    prev_last_updated_ms: 0,
                });
            }
        }
    }

    pub fn shared(&self, schema: &str) -> &[SharedBeliefSet] {
        self.shared.get(schema).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn shared_mut(
        &mut self,
    ) -> impl Iterator<Item = (&String, &mut Vec<SharedBeliefSet>)> {
        self.shared.iter_mut()
    }

    pub fn shared_owners(&self) -> Vec<UniqueId> {
        self.shared
            .values()
            .flat_map(|list| list.iter().map(|entry| entry.owner_id))
            .collect()
    }
}

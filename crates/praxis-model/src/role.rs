use serde::{Deserialize, Serialize};

/// Grants a team member read and/or write access to beliefset schemas
/// flowing between it and its teams. The shared-belief relay consults
/// roles on both legs: a member writes up only what some role allows,
/// and a team fans out only to members with a reading role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    name: String,
    reads: Vec<String>,
    writes: Vec<String>,
}

impl Role {
    pub(crate) fn new(name: String, reads: Vec<String>, writes: Vec<String>) -> Self {
        Self {
            name,
            reads,
            writes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn can_read_from_team(&self, schema: &str) -> bool {
        self.reads.iter().any(|s| s == schema)
    }

    pub fn can_write_to_team(&self, schema: &str) -> bool {
        self.writes.iter().any(|s| s == schema)
    }
}

use serde::{Deserialize, Serialize};
use tracing::error;

/// A bounded integer resource with a lock count. Intentions lock their
/// declared resources while executing; the scheduler projects locks and
/// consumption during search to deconflict candidate plans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    name: String,
    min: i64,
    max: i64,
    current: i64,
    lock_count: u32,
}

impl Resource {
    pub fn new(name: impl Into<String>, min: i64, max: i64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            name: name.into(),
            min,
            max,
            current: max,
            lock_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn current(&self) -> i64 {
        self.current
    }

    pub fn locked(&self) -> bool {
        self.lock_count > 0
    }

    pub fn lock_count(&self) -> u32 {
        self.lock_count
    }

    /// Set the level, clamped into `[min, max]`. Percepts land here.
    pub fn set(&mut self, value: i64) {
        self.current = value.clamp(self.min, self.max);
    }

    /// Consume without clamping; used by hypothetical plan effects so
    /// that overdraw is observable as a violation during deconfliction.
    pub fn consume(&mut self, amount: i64) {
        self.current -= amount;
    }

    pub fn lock(&mut self) {
        self.lock_count += 1;
    }

    /// Unbalanced unlocks are a programmer bug: fatal in debug builds,
    /// clamped in release.
    pub fn unlock(&mut self) {
        debug_assert!(
            self.lock_count > 0,
            "resource '{}' unlocked more times than locked",
            self.name
        );
        if self.lock_count == 0 {
            error!(resource = %self.name, "unbalanced resource unlock");
            return;
        }
        self.lock_count -= 1;
    }

    pub fn violated(&self) -> bool {
        self.current < self.min || self.current > self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_max() {
        let r = Resource::new("fuel", 0, 100);
        assert_eq!(r.current(), 100);
        assert!(!r.violated());
    }

    #[test]
    fn set_clamps() {
        let mut r = Resource::new("fuel", 0, 100);
        r.set(150);
        assert_eq!(r.current(), 100);
        r.set(-10);
        assert_eq!(r.current(), 0);
    }

    #[test]
    fn consume_can_violate() {
        let mut r = Resource::new("fuel", 10, 100);
        r.consume(95);
        assert_eq!(r.current(), 5);
        assert!(r.violated());
    }

    #[test]
    fn lock_unlock_balance() {
        let mut r = Resource::new("arm", 0, 1);
        r.lock();
        r.lock();
        assert!(r.locked());
        r.unlock();
        r.unlock();
        assert!(!r.locked());
    }
}

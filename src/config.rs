use crate::identifier::CollisionPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Ledger file used when no path is given.
pub const DEFAULT_LEDGER_FILE: &str = "blockchain_data.json";

/// How long a writer waits for another writer's lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for opening a ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Path of the JSON ledger file.
    pub path: PathBuf,
    /// Whether new public ids are checked against existing ones.
    pub collision_policy: CollisionPolicy,
    pub lock_timeout: Duration,
}

impl LedgerConfig {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_LEDGER_FILE),
            collision_policy: CollisionPolicy::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = LedgerConfig::default();
        assert_eq!(cfg.path, PathBuf::from("blockchain_data.json"));
        assert_eq!(cfg.collision_policy, CollisionPolicy::Check);
        assert_eq!(cfg.lock_timeout, DEFAULT_LOCK_TIMEOUT);
    }

    #[test]
    fn builder_overrides() {
        let cfg = LedgerConfig::new(Path::new("/tmp/l.json"))
            .with_collision_policy(CollisionPolicy::Unchecked)
            .with_lock_timeout(Duration::from_millis(10));
        assert_eq!(cfg.path, PathBuf::from("/tmp/l.json"));
        assert_eq!(cfg.collision_policy, CollisionPolicy::Unchecked);
        assert_eq!(cfg.lock_timeout, Duration::from_millis(10));
    }
}

//! Startup configuration and the runtime config store.
//!
//! Two distinct pieces of state live here, and they have very different
//! lifetimes:
//!
//! - [`StaticConfig`] is resolved once from the environment at startup and
//!   never changes — the per-family backend URLs, the event-bus endpoint,
//!   the listen port. There is no hot-reload: a restart is required to
//!   repoint a backend.
//! - [`RuntimeConfig`] (component C1 in the design) is the single piece of
//!   process-wide mutable state: per-family weights and the traffic lock.
//!   It is read on every request and written only from the admin API.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::AppError;

/// The two service families this gateway knows how to shadow.
pub const FAMILIES: [&str; 2] = ["python", "php"];

/// Legacy/modern base URLs for one service family.
#[derive(Debug, Clone)]
pub struct FamilyTargets {
    pub legacy_url: String,
    pub modern_url: String,
}

/// Resolved at startup from the environment; immutable for the life of the process.
#[derive(Debug, Clone)]
pub struct StaticConfig {
    pub families: HashMap<String, FamilyTargets>,
    pub kafka_bootstrap_servers: Option<String>,
    pub port: u16,
}

impl StaticConfig {
    /// Load configuration from the process environment.
    ///
    /// `LEGACY_PYTHON_URL` / `MODERN_PYTHON_URL` and `LEGACY_PHP_URL` /
    /// `MODERN_GO_URL` are read per `spec.md` §6's named configuration
    /// inputs. A family is only registered if *both* of its URLs are
    /// present — a half-configured family would make every request to it
    /// fail at call time instead of at startup, so it is rejected eagerly.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut families = HashMap::new();

        if let (Ok(legacy), Ok(modern)) = (
            std::env::var("LEGACY_PYTHON_URL"),
            std::env::var("MODERN_PYTHON_URL"),
        ) {
            families.insert(
                "python".to_string(),
                FamilyTargets {
                    legacy_url: legacy,
                    modern_url: modern,
                },
            );
        }

        if let (Ok(legacy), Ok(modern)) = (
            std::env::var("LEGACY_PHP_URL"),
            std::env::var("MODERN_GO_URL"),
        ) {
            families.insert(
                "php".to_string(),
                FamilyTargets {
                    legacy_url: legacy,
                    modern_url: modern,
                },
            );
        }

        anyhow::ensure!(
            !families.is_empty(),
            "no service family is fully configured — set LEGACY_PYTHON_URL+MODERN_PYTHON_URL \
             and/or LEGACY_PHP_URL+MODERN_GO_URL"
        );

        let kafka_bootstrap_servers = std::env::var("KAFKA_BOOTSTRAP_SERVERS").ok();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8082);

        Ok(Self {
            families,
            kafka_bootstrap_servers,
            port,
        })
    }

    pub fn family(&self, name: &str) -> Option<&FamilyTargets> {
        self.families.get(name)
    }
}

/// The mutable fields guarded by [`RuntimeConfig`]'s lock.
#[derive(Debug, Clone)]
struct ConfigState {
    weights: HashMap<String, f64>,
    traffic_locked: bool,
}

impl Default for ConfigState {
    /// Fail safe: a freshly started gateway serves only from legacy until an
    /// operator explicitly opens traffic up. See `spec.md` §4.1 "Defaults".
    fn default() -> Self {
        Self {
            weights: FAMILIES.iter().map(|f| (f.to_string(), 0.0)).collect(),
            traffic_locked: true,
        }
    }
}

/// Component C1 — the thread-safe holder of per-service weights and the
/// global traffic lock.
///
/// Reads take a shared lock and never block other reads; writes are
/// exclusive. The lock is held only for the duration of the read/write
/// itself, never across an `.await` — the same discipline the teacher's
/// `RouterState::config()` uses for its swappable `Arc<Config>`.
pub struct RuntimeConfig {
    state: std::sync::RwLock<ConfigState>,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self {
            state: std::sync::RwLock::new(ConfigState::default()),
        }
    }

    /// Read the current weight for `family`. Returns `None` for an unknown family.
    pub fn weight(&self, family: &str) -> Option<f64> {
        self.state
            .read()
            .expect("runtime config lock poisoned")
            .weights
            .get(family)
            .copied()
    }

    /// Set the weight for `family`. No clamping is performed here — the
    /// caller (the admin HTTP layer) is responsible for rejecting
    /// out-of-range values before they reach this store.
    pub fn set_weight(&self, family: &str, weight: f64) -> Result<(), AppError> {
        let mut state = self.state.write().expect("runtime config lock poisoned");
        match state.weights.get_mut(family) {
            Some(slot) => {
                *slot = weight;
                Ok(())
            }
            None => Err(AppError::UnknownService),
        }
    }

    pub fn traffic_locked(&self) -> bool {
        self.state.read().expect("runtime config lock poisoned").traffic_locked
    }

    pub fn set_traffic_locked(&self, locked: bool) {
        self.state.write().expect("runtime config lock poisoned").traffic_locked = locked;
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Migration status derived from a family's weight, per `spec.md` §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Pending,
    InProgress,
    Complete,
}

impl MigrationStatus {
    pub fn from_weight(weight: f64) -> Self {
        if weight >= 1.0 {
            Self::Complete
        } else if weight > 0.0 {
            Self::InProgress
        } else {
            Self::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_safe() {
        let cfg = RuntimeConfig::new();
        assert!(cfg.traffic_locked());
        assert_eq!(cfg.weight("python"), Some(0.0));
        assert_eq!(cfg.weight("php"), Some(0.0));
    }

    #[test]
    fn set_weight_unknown_family_errors() {
        let cfg = RuntimeConfig::new();
        let err = cfg.set_weight("ruby", 0.5).unwrap_err();
        assert!(matches!(err, AppError::UnknownService));
    }

    #[test]
    fn set_weight_round_trips() {
        let cfg = RuntimeConfig::new();
        cfg.set_weight("python", 0.42).unwrap();
        assert_eq!(cfg.weight("python"), Some(0.42));
    }

    #[test]
    fn traffic_lock_round_trips() {
        let cfg = RuntimeConfig::new();
        cfg.set_traffic_locked(false);
        assert!(!cfg.traffic_locked());
        cfg.set_traffic_locked(true);
        assert!(cfg.traffic_locked());
    }

    #[test]
    fn migration_status_boundaries() {
        assert_eq!(MigrationStatus::from_weight(0.0), MigrationStatus::Pending);
        assert_eq!(MigrationStatus::from_weight(0.4), MigrationStatus::InProgress);
        assert_eq!(MigrationStatus::from_weight(1.0), MigrationStatus::Complete);
    }

    #[test]
    fn concurrent_reads_do_not_block_each_other() {
        use std::sync::Arc;
        let cfg = Arc::new(RuntimeConfig::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cfg = Arc::clone(&cfg);
                std::thread::spawn(move || cfg.weight("python"))
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), Some(0.0));
        }
    }
}

//! Serde-deserializable configuration, so embedding applications can load
//! bus and parallel-action settings from their own config files.

use serde::Deserialize;
use uuid::Uuid;

/// Configuration for an `EventBus`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BusConfig {
    /// Fixed identity for the bus. If absent, one is lazily generated
    /// (UUIDv7, time-ordered) on first access to `EventBus::id`.
    pub id: Option<Uuid>,
}

/// Configuration for a `ParallelAction`.
#[derive(Debug, Clone, Deserialize)]
pub struct ParallelConfig {
    /// Number of lanes (`N`). Must be greater than zero.
    pub pool_size: usize,
    /// Aggregate downstream capacity to distribute across lanes.
    pub capacity: i64,
    /// Per-lane guard slots subtracted from the aggregate before dividing.
    #[serde(default = "default_reserved_slots")]
    pub reserved_slots: i64,
}

fn default_reserved_slots() -> i64 {
    32
}

impl ParallelConfig {
    /// Build a config with the default reservation guard.
    pub fn new(pool_size: usize, capacity: i64) -> Self {
        Self {
            pool_size,
            capacity,
            reserved_slots: default_reserved_slots(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_config_defaults_reserved_slots() {
        let json = r#"{"pool_size": 4, "capacity": 1024}"#;
        let cfg: ParallelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.reserved_slots, 32);
    }

    #[test]
    fn bus_config_defaults_to_no_fixed_id() {
        let cfg: BusConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.id.is_none());
    }
}

use std::env;

use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenerConfig {
    /// Upper bound on the capacity reserved up front for a full flatten.
    pub initial_capacity: usize,
    /// Deepest nesting accepted before the hierarchy is reported as corrupt.
    /// `None` only bounds depth by the store's node count.
    pub max_depth: Option<usize>,
    /// Check that every visited child names the node that listed it as its parent.
    pub verify_parents: bool,
}

impl Default for FlattenerConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 1024,
            max_depth: None,
            verify_parents: true,
        }
    }
}

impl FlattenerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(capacity_str) = env::var("HIERFLAT_INITIAL_CAPACITY") {
            if let Ok(capacity) = capacity_str.parse::<usize>() {
                config.initial_capacity = capacity;
            } else {
                warn!(
                    value = %capacity_str,
                    default = config.initial_capacity,
                    "Invalid HIERFLAT_INITIAL_CAPACITY, using default"
                );
            }
        }

        if let Ok(depth_str) = env::var("HIERFLAT_MAX_DEPTH") {
            match depth_str.to_lowercase().as_str() {
                "" | "none" | "unbounded" => config.max_depth = None,
                s => {
                    if let Ok(depth) = s.parse::<usize>() {
                        config.max_depth = Some(depth);
                    } else {
                        warn!(
                            value = %depth_str,
                            "Invalid HIERFLAT_MAX_DEPTH, leaving depth unbounded"
                        );
                    }
                }
            }
        }

        if let Ok(verify_str) = env::var("HIERFLAT_VERIFY_PARENTS") {
            config.verify_parents = match verify_str.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    warn!(
                        value = %verify_str,
                        default = config.verify_parents,
                        "Invalid HIERFLAT_VERIFY_PARENTS, using default"
                    );
                    config.verify_parents
                }
            };
        }

        config
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_verify_parents(mut self, verify_parents: bool) -> Self {
        self.verify_parents = verify_parents;
        self
    }
}

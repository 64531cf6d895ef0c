//! Settings for a physics world.

use crate::physics::collision::broadphase::DEFAULT_MARGIN;

/// Order in which a body resolves the collisions it found in one step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum ResolveOrder {
    /// Earliest time of impact first, so the first surface hit is handled first.
    #[default]
    EarliestFirst,
    LatestFirst,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Timestep must be positive and finite, got {0}")]
    InvalidTimestep(f64),
    #[error("Worker thread count must be at least 1")]
    ZeroThreads,
    #[error("Broad phase margin must be non-negative and finite, got {0}")]
    InvalidMargin(f64),
}

/// Configuration of a [`Physics`][crate::Physics] world.
///
/// With the `serde-types` feature this can be loaded from any serde format,
/// missing fields taking their default values.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct PhysicsConfig {
    /// Number of worker threads. `None` uses the available parallelism.
    pub threads: Option<usize>,
    /// Length of one step in seconds.
    pub timestep: f64,
    /// Send broad phase bounds and contact points to the debug sink.
    pub collision_debug: bool,
    /// Collision layers declared up front, in ID order.
    pub layers: Vec<String>,
    pub broad_phase_margin: f64,
    pub resolve_order: ResolveOrder,
    /// Integrate angular velocity into rotation.
    pub angular_integration: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        PhysicsConfig {
            threads: None,
            timestep: 1.0 / 60.0,
            collision_debug: false,
            layers: vec!["default".to_string()],
            broad_phase_margin: DEFAULT_MARGIN,
            resolve_order: ResolveOrder::default(),
            angular_integration: false,
        }
    }
}

impl PhysicsConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_timestep(mut self, timestep: f64) -> Self {
        self.timestep = timestep;
        self
    }

    pub fn with_collision_debug(mut self, enabled: bool) -> Self {
        self.collision_debug = enabled;
        self
    }

    /// Declare additional layers after the ones already configured.
    pub fn with_layers<S: Into<String>>(mut self, layers: impl IntoIterator<Item = S>) -> Self {
        self.layers.extend(layers.into_iter().map(Into::into));
        self
    }

    pub fn with_broad_phase_margin(mut self, margin: f64) -> Self {
        self.broad_phase_margin = margin;
        self
    }

    pub fn with_resolve_order(mut self, order: ResolveOrder) -> Self {
        self.resolve_order = order;
        self
    }

    pub fn with_angular_integration(mut self, enabled: bool) -> Self {
        self.angular_integration = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(ConfigError::InvalidTimestep(self.timestep));
        }
        if self.threads == Some(0) {
            return Err(ConfigError::ZeroThreads);
        }
        if !(self.broad_phase_margin.is_finite() && self.broad_phase_margin >= 0.0) {
            return Err(ConfigError::InvalidMargin(self.broad_phase_margin));
        }
        Ok(())
    }

    /// The number of workers this config will start.
    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PhysicsConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.layers, ["default"]);
        assert!(config.thread_count() >= 1);
    }

    #[test]
    fn validation() {
        let base = PhysicsConfig::default();
        assert_eq!(
            base.clone().with_timestep(0.0).validate(),
            Err(ConfigError::InvalidTimestep(0.0))
        );
        assert_eq!(
            base.clone().with_threads(0).validate(),
            Err(ConfigError::ZeroThreads)
        );
        assert_eq!(
            base.with_broad_phase_margin(-1.0).validate(),
            Err(ConfigError::InvalidMargin(-1.0))
        );
    }

    #[cfg(feature = "serde-types")]
    #[test]
    fn parse_from_ron() {
        let config: PhysicsConfig = ron::from_str(
            r#"(
                threads: Some(2),
                layers: ["default", "player", "bullets"],
                resolve_order: LatestFirst,
                collision_debug: true,
            )"#,
        )
        .unwrap();
        assert_eq!(config.thread_count(), 2);
        assert_eq!(config.resolve_order, ResolveOrder::LatestFirst);
        assert!(config.collision_debug);
        assert_eq!(config.timestep, 1.0 / 60.0);
        assert_eq!(config.broad_phase_margin, DEFAULT_MARGIN);
        itertools::assert_equal(&config.layers, ["default", "player", "bullets"].iter());
    }
}

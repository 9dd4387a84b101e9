/*
 * Copyright (C) 2023 Asim Ihsan
 * SPDX-License-Identifier: AGPL-3.0-only
 *
 * This program is free software: you can redistribute it and/or modify it under
 * the terms of the GNU Affero General Public License as published by the Free
 * Software Foundation, version 3.
 *
 * This program is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A
 * PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License along
 * with this program. If not, see <https://www.gnu.org/licenses/>
 */

//! Simulation parameters.

use serde::{Deserialize, Serialize};

/// Configuration error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A placement rate is not a fraction.
    #[error("{name} must be within [0, 1], got {value}")]
    RateOutOfRange {
        /// Which rate.
        name: &'static str,
        /// The offending value.
        value: f64,
    },

    /// The grid needs at least one cell inside the border.
    #[error("grid must be at least 3x3, got {width}x{height}")]
    GridTooSmall {
        /// Requested width.
        width: i32,
        /// Requested height.
        height: i32,
    },

    /// There must be at least one roomba.
    #[error("at least one roomba is required")]
    NoAgents,

    /// The step budget must allow at least one tick.
    #[error("max_steps must be positive")]
    NoSteps,
}

/// How roombas deal with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Coordination {
    /// Every roomba works alone with its own station. No occupancy checks, no communication.
    #[default]
    Solo,

    /// Roombas share stations, wait for busy ones and swap maps when they meet.
    Cooperative,
}

impl Coordination {
    /// Extra ticks of battery kept in reserve on top of the distance to the nearest station.
    pub fn safety_margin(self) -> i32 {
        match self {
            Coordination::Solo => 5,
            Coordination::Cooperative => 10,
        }
    }
}

impl std::fmt::Display for Coordination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Coordination::Solo => write!(f, "solo"),
            Coordination::Cooperative => write!(f, "cooperative"),
        }
    }
}

/// Parameters of a randomly generated world and of the run over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of roombas, each spawned on its own station.
    pub num_agents: usize,
    /// Fraction of the interior covered by obstacles.
    pub rate_obstacles: f64,
    /// Fraction of the interior covered by trash.
    pub rate_trash: f64,
    /// Tick budget.
    pub max_steps: u32,
    /// Grid width, border included.
    pub width: i32,
    /// Grid height, border included.
    pub height: i32,
    /// Seed of the run's random source.
    pub seed: u64,
    /// Single-agent or multi-agent behaviour.
    pub coordination: Coordination,
}

impl SimulationConfig {
    fn interior_cells(&self) -> usize {
        ((self.width - 2).max(0) * (self.height - 2).max(0)) as usize
    }

    /// Interior obstacles to place, rounded down.
    pub fn num_obstacles(&self) -> usize {
        (self.rate_obstacles * self.interior_cells() as f64) as usize
    }

    /// Trash pieces to place, rounded down.
    pub fn num_trash(&self) -> usize {
        (self.rate_trash * self.interior_cells() as f64) as usize
    }

    /// Check the parameters without building anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("rate_obstacles", self.rate_obstacles),
            ("rate_trash", self.rate_trash),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::RateOutOfRange { name, value });
            }
        }
        if self.width < 3 || self.height < 3 {
            return Err(ConfigError::GridTooSmall {
                width: self.width,
                height: self.height,
            });
        }
        if self.num_agents == 0 {
            return Err(ConfigError::NoAgents);
        }
        if self.max_steps == 0 {
            return Err(ConfigError::NoSteps);
        }
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_agents: 1,
            rate_obstacles: 0.1,
            rate_trash: 0.2,
            max_steps: 3000,
            width: 8,
            height: 8,
            seed: 42,
            coordination: Coordination::Solo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_counts() {
        let config = SimulationConfig::default();
        assert_eq!(config.num_obstacles(), 3);
        assert_eq!(config.num_trash(), 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_safety_margins() {
        assert_eq!(Coordination::Solo.safety_margin(), 5);
        assert_eq!(Coordination::Cooperative.safety_margin(), 10);
    }

    #[test]
    fn test_rate_out_of_range() {
        let config = SimulationConfig {
            rate_trash: 1.5,
            ..SimulationConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::RateOutOfRange {
                name: "rate_trash",
                value: 1.5
            })
        );
    }

    #[test]
    fn test_grid_too_small() {
        let config = SimulationConfig {
            width: 2,
            ..SimulationConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::GridTooSmall {
                width: 2,
                height: 8
            })
        );
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"num_agents": 3, "coordination": "cooperative"}"#)
                .expect("parse");
        assert_eq!(config.num_agents, 3);
        assert_eq!(config.coordination, Coordination::Cooperative);
        assert_eq!(config.width, 8);
        assert_eq!(config.max_steps, 3000);
    }
}

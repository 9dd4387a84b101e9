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

#![warn(missing_docs)]

//! Roomba cleaning-robot simulation.
//!
//! PEAS - Performance, Environment, Action, Sensing
//!
//! - Performance: share of the initial trash collected, battery left, steps taken.
//! - Environment: a bounded grid with border and interior obstacles, trash and charging stations.
//! - Actuators: move to one of the 8 neighbouring cells, clean the current cell, recharge.
//! - Sensors: the current cell and its 8 neighbours, plus whatever a peer shares when adjacent.
//!
//! The [`Model`] owns the grid and every agent. Each tick it draws a fresh activation order from
//! its seeded random source and lets every live [`Roomba`] step once. A roomba only knows its own
//! position and refers to peers by [`RoombaKey`].
//!
//! See:
//! -  Chapter 2: Intelligent Agents, page 40

pub mod agent;
pub mod config;
pub mod metrics;
pub mod model;

pub use agent::{Roomba, State, Vitality};
pub use config::{ConfigError, Coordination, SimulationConfig};
pub use metrics::{DataCollector, RoombaSummary, Snapshot};
pub use model::{Model, ModelError};

pub use grid_world::{Coordinate, Occupant, Rng};

slotmap::new_key_type! {
    /// Handle of a roomba inside the [`Model`].
    pub struct RoombaKey;
}

/// The grid type every roomba lives in.
pub type World = grid_world::Grid<RoombaKey>;

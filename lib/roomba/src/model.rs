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

//! The simulation clock: world building, the per-tick scheduler and the stop condition.

use std::cell::{Ref, RefCell, RefMut};

use grid_world::{shuffle, GridError};
use rand::SeedableRng;
use tracing::{debug, info};

use crate::agent::{Roster, StepContext};
use crate::metrics::{collected_pct, mean};
use crate::{
    ConfigError, Coordinate, DataCollector, Occupant, Rng, Roomba, RoombaKey, RoombaSummary,
    SimulationConfig, Snapshot, Vitality, World,
};

/// Why a model could not be built.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// Bad parameters.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The world could not hold what was asked of it.
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// A running simulation. Owns the grid, every roomba and the random source.
#[derive(Debug)]
pub struct Model {
    config: SimulationConfig,
    grid: World,
    roombas: Roster,
    rng: Rng,
    initial_trash: usize,
    tick: u32,
    running: bool,
    collector: DataCollector,
}

impl Model {
    /// Build a random world from `config`.
    ///
    /// Placement order is fixed: border, one station per roomba, interior obstacles, trash. Every
    /// sample comes from the cells left empty by the previous stage, so the seed alone decides
    /// the world.
    pub fn new(config: SimulationConfig) -> Result<Self, ModelError> {
        config.validate()?;
        let mut rng = Rng::seed_from_u64(config.seed);
        let mut grid = World::new(config.width, config.height)?;
        grid.add_border_obstacles();

        let spawns = grid.random_empty_cells(config.num_agents, &mut rng)?;
        for &spawn in &spawns {
            grid.place(spawn, Occupant::Station)?;
        }
        for cell in grid.random_empty_cells(config.num_obstacles(), &mut rng)? {
            grid.place(cell, Occupant::Obstacle)?;
        }
        for cell in grid.random_empty_cells(config.num_trash(), &mut rng)? {
            grid.place(cell, Occupant::Trash)?;
        }

        Self::assemble(config, grid, &spawns, rng)
    }

    /// Build a model over a hand-made grid. Each spawn gets a station, unless it already has one,
    /// and a roomba. Only `max_steps`, `seed` and `coordination` of `config` are used.
    pub fn with_layout(
        config: SimulationConfig,
        grid: World,
        spawns: &[Coordinate],
    ) -> Result<Self, ModelError> {
        if spawns.is_empty() {
            return Err(ConfigError::NoAgents.into());
        }
        if config.max_steps == 0 {
            return Err(ConfigError::NoSteps.into());
        }
        let mut grid = grid;
        for &spawn in spawns {
            if !grid.has_station(spawn) {
                grid.place(spawn, Occupant::Station)?;
            }
        }
        let rng = Rng::seed_from_u64(config.seed);
        Self::assemble(config, grid, spawns, rng)
    }

    fn assemble(
        config: SimulationConfig,
        mut grid: World,
        spawns: &[Coordinate],
        rng: Rng,
    ) -> Result<Self, ModelError> {
        let mut roombas = Roster::with_key();
        for &spawn in spawns {
            let key = roombas.insert(RefCell::new(Roomba::new(spawn)));
            grid.place(spawn, Occupant::Roomba(key))?;
        }
        grid.add_visited_markers();
        for &spawn in spawns {
            grid.mark_visited(spawn);
        }

        let initial_trash = grid.count_trash();
        debug!(
            width = grid.width(),
            height = grid.height(),
            roombas = roombas.len(),
            trash = initial_trash,
            coordination = %config.coordination,
            "world ready"
        );
        let mut model = Self {
            config,
            grid,
            roombas,
            rng,
            initial_trash,
            tick: 0,
            running: true,
            collector: DataCollector::new(),
        };
        model.collect();
        Ok(model)
    }

    /// Advance one tick: every live roomba steps once, in a fresh random order. Roombas that run
    /// dry are removed before the next one steps. Does nothing once the model has stopped.
    pub fn step(&mut self) {
        if !self.running {
            return;
        }
        self.tick += 1;

        let mut order: Vec<RoombaKey> = self.roombas.keys().collect();
        shuffle(&mut order, &mut self.rng);
        for key in order {
            let Some(cell) = self.roombas.get(key) else {
                continue;
            };
            let vitality = {
                let mut roomba = cell.borrow_mut();
                let mut ctx = StepContext {
                    key,
                    grid: &mut self.grid,
                    peers: &self.roombas,
                    rng: &mut self.rng,
                    coordination: self.config.coordination,
                };
                roomba.step(&mut ctx)
            };
            if vitality == Vitality::Depleted {
                self.remove(key);
            }
        }

        self.collect();
        if self.grid.count_trash() == 0 || self.tick >= self.config.max_steps {
            self.running = false;
            self.report();
        }
    }

    /// Step until the model stops, handing every snapshot to `on_snapshot`, the initial one
    /// included when nothing has run yet.
    pub fn run_with<F>(&mut self, mut on_snapshot: F)
    where
        F: FnMut(&Snapshot),
    {
        if self.tick == 0 {
            if let Some(first) = self.collector.latest() {
                on_snapshot(first);
            }
        }
        while self.running {
            self.step();
            if let Some(latest) = self.collector.latest() {
                on_snapshot(latest);
            }
        }
    }

    /// Step until the model stops.
    pub fn run(&mut self) {
        self.run_with(|_| {});
    }

    fn remove(&mut self, key: RoombaKey) {
        if let Some(cell) = self.roombas.remove(key) {
            let roomba = cell.into_inner();
            self.grid.remove_roomba(key, roomba.position());
            debug!(
                ?key,
                position = %roomba.position(),
                steps = roomba.steps_taken(),
                trash_cleaned = roomba.trash_cleaned(),
                tick = self.tick,
                "battery depleted, roomba removed"
            );
        }
    }

    fn collect(&mut self) {
        let snapshot = Snapshot {
            tick: self.tick,
            battery_pct: mean(self.roombas.values().map(|r| r.borrow().battery())),
            trash_collected_pct: collected_pct(self.initial_trash, self.grid.count_trash()),
            roombas_alive: self.roombas.len(),
            mean_steps: mean(self.roombas.values().map(|r| r.borrow().steps_taken())),
        };
        self.collector.record(snapshot);
    }

    fn report(&self) {
        if let Some(last) = self.collector.latest() {
            info!(
                tick = last.tick,
                trash_collected_pct = last.trash_collected_pct,
                battery_pct = last.battery_pct,
                roombas_alive = last.roombas_alive,
                mean_steps = last.mean_steps,
                "simulation finished"
            );
        }
        for summary in self.roomba_summaries() {
            info!(
                key = ?summary.key,
                position = %summary.position,
                battery = summary.battery,
                steps = summary.steps,
                trash_cleaned = summary.trash_cleaned,
                state = %summary.state,
                "roomba"
            );
        }
        debug!("final grid\n{}", self.grid);
    }

    /// Parameters the model was built with.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Ticks completed.
    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// False once all trash is gone or the tick budget is spent.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The world.
    pub fn grid(&self) -> &World {
        &self.grid
    }

    /// A live roomba.
    pub fn roomba(&self, key: RoombaKey) -> Option<Ref<'_, Roomba>> {
        self.roombas.get(key).map(|cell| cell.borrow())
    }

    /// A live roomba, for adjusting it between ticks.
    pub fn roomba_mut(&self, key: RoombaKey) -> Option<RefMut<'_, Roomba>> {
        self.roombas.get(key).map(|cell| cell.borrow_mut())
    }

    /// Handles of the live roombas.
    pub fn roomba_keys(&self) -> impl Iterator<Item = RoombaKey> + '_ {
        self.roombas.keys()
    }

    /// Trash on the grid at creation.
    pub fn initial_trash(&self) -> usize {
        self.initial_trash
    }

    /// Trash still on the grid.
    pub fn remaining_trash(&self) -> usize {
        self.grid.count_trash()
    }

    /// Collected snapshots.
    pub fn collector(&self) -> &DataCollector {
        &self.collector
    }

    /// Most recent snapshot.
    pub fn latest(&self) -> Option<&Snapshot> {
        self.collector.latest()
    }

    /// One line per live roomba.
    pub fn roomba_summaries(&self) -> Vec<RoombaSummary> {
        self.roombas
            .iter()
            .map(|(key, cell)| cell.borrow().summary(key))
            .collect()
    }
}

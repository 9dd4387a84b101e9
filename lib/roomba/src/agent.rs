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

//! The roomba's per-tick decision loop.
//!
//! A roomba is a model-based reflex agent: it senses its own cell and the 8 cells around it and
//! keeps private state about what it has seen (visited cells, remembered trash, known stations,
//! a planned way home). Every tick runs two phases:
//!
//! 1. assess: an `idle` roomba checks its battery and becomes `ready` or `returning`, a `waiting`
//!    roomba looks for a free neighbouring station.
//! 2. act: `returning` walks the planned path home, `recharging` charges, `ready` talks to a
//!    neighbour, cleans, or moves.
//!
//! Each phase returns the next [`State`] instead of writing it and reading it back.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};

use grid_world::{Coordinate, HashSet, Rng};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use tracing::{debug, trace};

use crate::metrics::RoombaSummary;
use crate::{Coordination, RoombaKey, World};

/// Full battery.
pub const BATTERY_CAPACITY: i32 = 100;
/// Battery gained per tick on a station.
pub const RECHARGE_RATE: i32 = 5;
/// Ticks after an exchange during which a roomba will not exchange again.
pub const INFO_COOLDOWN: u32 = 5;

/// Every roomba of a model, by handle.
pub type Roster = SlotMap<RoombaKey, RefCell<Roomba>>;

/// Roomba state. Only `idle`, `waiting` and `recharging` survive from one tick to the next, the
/// others are passed through within a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum State {
    /// Nothing decided yet.
    Idle,
    /// Enough battery to keep working.
    Ready,
    /// Heading back to a station.
    Returning,
    /// Charging on a station.
    Recharging,
    /// Next to a station that another roomba is charging on.
    Waiting,
    /// Stepping into a neighbouring cell.
    Moving,
    /// Picking up trash.
    Cleaning,
    /// Picking the next cell.
    CheckObstacles,
    /// Swapping maps with a neighbour.
    Communicating,
    /// Looking for trash underfoot.
    CheckTrash,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            State::Idle => "idle",
            State::Ready => "ready",
            State::Returning => "returning",
            State::Recharging => "recharging",
            State::Waiting => "waiting",
            State::Moving => "moving",
            State::Cleaning => "cleaning",
            State::CheckObstacles => "checkObstacles",
            State::Communicating => "communicating",
            State::CheckTrash => "checkTrash",
        };
        write!(f, "{}", name)
    }
}

/// Whether a roomba survived its step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vitality {
    /// Battery left, keeps going.
    Alive,
    /// Battery ran out during this step. The model removes the roomba.
    Depleted,
}

/// Everything a roomba may touch while it steps.
pub struct StepContext<'a> {
    /// Handle of the roomba that is stepping.
    pub key: RoombaKey,
    /// The shared world.
    pub grid: &'a mut World,
    /// All roombas. The stepping one is mutably borrowed and must not be borrowed again.
    pub peers: &'a Roster,
    /// The run's random source.
    pub rng: &'a mut Rng,
    /// Single-agent or multi-agent rules.
    pub coordination: Coordination,
}

/// A cleaning robot.
#[derive(Debug, Clone)]
pub struct Roomba {
    position: Coordinate,
    state: State,
    battery: i32,
    has_battery: bool,
    visited_cells: HashSet<Coordinate>,
    known_trash: BTreeSet<Coordinate>,
    path_back_to_station: VecDeque<Coordinate>,
    distance_to_station: Option<i32>,
    station_cells: Vec<Coordinate>,
    has_info: bool,
    info_timer: u32,
    steps_taken: u32,
    trash_cleaned: u32,
    trail: Vec<State>,
}

impl Roomba {
    /// A fully charged roomba standing on its own station.
    pub fn new(position: Coordinate) -> Self {
        let mut visited_cells = HashSet::default();
        visited_cells.insert(position);
        Self {
            position,
            state: State::Idle,
            battery: BATTERY_CAPACITY,
            has_battery: true,
            visited_cells,
            known_trash: BTreeSet::new(),
            path_back_to_station: VecDeque::new(),
            distance_to_station: Some(0),
            station_cells: vec![position],
            has_info: false,
            info_timer: 0,
            steps_taken: 0,
            trash_cleaned: 0,
            trail: Vec::new(),
        }
    }

    /// Current cell.
    pub fn position(&self) -> Coordinate {
        self.position
    }

    /// State at the end of the last step.
    pub fn state(&self) -> State {
        self.state
    }

    /// Battery left, within `[0, BATTERY_CAPACITY]`.
    pub fn battery(&self) -> i32 {
        self.battery
    }

    /// Overwrite the battery level, clamped to `[0, BATTERY_CAPACITY]`.
    pub fn set_battery(&mut self, battery: i32) {
        self.battery = battery.clamp(0, BATTERY_CAPACITY);
    }

    /// False from the moment the roomba decides to head home until it is fully charged again.
    pub fn has_battery(&self) -> bool {
        self.has_battery
    }

    /// Cells this roomba has entered, or learned about from a peer.
    pub fn visited_cells(&self) -> &HashSet<Coordinate> {
        &self.visited_cells
    }

    /// Trash seen on the way home and left for later.
    pub fn known_trash(&self) -> &BTreeSet<Coordinate> {
        &self.known_trash
    }

    /// Remaining steps of the planned way home.
    pub fn path_back_to_station(&self) -> &VecDeque<Coordinate> {
        &self.path_back_to_station
    }

    /// Chebyshev distance to the nearest known station at the last check, `None` if none is known.
    pub fn distance_to_station(&self) -> Option<i32> {
        self.distance_to_station
    }

    /// Stations this roomba knows about, its own first.
    pub fn station_cells(&self) -> &[Coordinate] {
        &self.station_cells
    }

    /// True while the exchange cooldown runs.
    pub fn has_info(&self) -> bool {
        self.has_info
    }

    /// Ticks left on the exchange cooldown.
    pub fn info_timer(&self) -> u32 {
        self.info_timer
    }

    /// Cells moved so far.
    pub fn steps_taken(&self) -> u32 {
        self.steps_taken
    }

    /// Trash pieces collected so far.
    pub fn trash_cleaned(&self) -> u32 {
        self.trash_cleaned
    }

    /// States passed through during the last step, starting with the state it began in.
    pub fn trail(&self) -> &[State] {
        &self.trail
    }

    /// Report line for this roomba.
    pub fn summary(&self, key: RoombaKey) -> RoombaSummary {
        RoombaSummary {
            key,
            position: self.position,
            battery: self.battery,
            steps: self.steps_taken,
            trash_cleaned: self.trash_cleaned,
            state: self.state,
        }
    }

    /// Run one tick. Costs one unit of battery unless the roomba ends the tick charging or
    /// waiting for a station.
    pub fn step(&mut self, ctx: &mut StepContext<'_>) -> Vitality {
        let _span = tracing::trace_span!("roomba", key = ?ctx.key).entered();
        self.trail.clear();
        self.trail.push(self.state);
        self.cool_down();

        let assessed = match self.state {
            State::Idle => self.check_battery(ctx.coordination.safety_margin()),
            State::Waiting => self.check_station(ctx),
            other => other,
        };
        let next = match assessed {
            State::Returning => self.return_to_station(ctx),
            State::Recharging => self.recharge(),
            State::Ready => self.explore(ctx),
            other => other,
        };
        self.state = next;

        if !matches!(next, State::Recharging | State::Waiting) {
            self.battery -= 1;
        }
        if self.battery <= 0 {
            self.battery = 0;
            return Vitality::Depleted;
        }
        Vitality::Alive
    }

    /// Merge a peer's map into ours: visited cells and known stations.
    pub fn exchange_info(&mut self, peer: &Roomba) {
        self.visited_cells.extend(peer.visited_cells.iter().copied());
        for station in &peer.station_cells {
            if !self.station_cells.contains(station) {
                self.station_cells.push(*station);
            }
        }
        self.has_info = true;
        self.info_timer = INFO_COOLDOWN;
    }

    fn enter(&mut self, state: State) -> State {
        trace!(%state, position = %self.position, battery = self.battery);
        self.trail.push(state);
        state
    }

    fn cool_down(&mut self) {
        if self.info_timer > 0 {
            self.info_timer -= 1;
            if self.info_timer == 0 {
                self.has_info = false;
            }
        }
    }

    // Chebyshev distance is a cheap stand-in for the real path length.
    pub(crate) fn check_battery(&mut self, margin: i32) -> State {
        self.distance_to_station =
            nearest(self.position, self.station_cells.iter().copied()).map(|(_, d)| d);
        match self.distance_to_station {
            Some(distance) if self.battery > distance + margin => {
                self.path_back_to_station.clear();
                self.enter(State::Ready)
            }
            _ => {
                self.has_battery = false;
                self.enter(State::Returning)
            }
        }
    }

    fn check_station(&mut self, ctx: &mut StepContext<'_>) -> State {
        let view: &StepContext<'_> = ctx;
        let free_station = view
            .grid
            .neighbors(self.position)
            .filter(|&c| view.grid.has_station(c))
            .find(|&c| !station_occupied(c, view));
        let Some(station) = free_station else {
            return State::Waiting;
        };
        if !self.station_cells.contains(&station) {
            debug!(%station, "found an unknown station");
            self.station_cells.push(station);
        }
        self.move_to(station, ctx)
    }

    pub(crate) fn recharge(&mut self) -> State {
        self.battery = (self.battery + RECHARGE_RATE).min(BATTERY_CAPACITY);
        if self.battery >= BATTERY_CAPACITY {
            self.has_battery = true;
            self.enter(State::Idle)
        } else {
            State::Recharging
        }
    }

    fn return_to_station(&mut self, ctx: &mut StepContext<'_>) -> State {
        // Trash on the way home is only remembered, never picked up.
        if ctx.grid.has_trash(self.position) && self.known_trash.insert(self.position) {
            debug!(position = %self.position, "remembering trash for later");
        }

        if self.station_cells.contains(&self.position) && !station_occupied(self.position, ctx) {
            self.path_back_to_station.clear();
            return self.enter(State::Recharging);
        }

        match self.next_return_step(ctx) {
            Some(next) => {
                self.enter(State::Moving);
                self.move_to(next, ctx)
            }
            None => self.enter(State::Idle),
        }
    }

    fn next_return_step(&mut self, ctx: &StepContext<'_>) -> Option<Coordinate> {
        if self.path_back_to_station.is_empty() {
            self.plan_return_path(ctx);
        }
        self.path_back_to_station.pop_front()
    }

    // Try free stations nearest first until one can be reached.
    fn plan_return_path(&mut self, ctx: &StepContext<'_>) {
        let mut free: Vec<(i32, Coordinate)> = self
            .station_cells
            .iter()
            .copied()
            .filter(|&s| !station_occupied(s, ctx))
            .map(|s| (self.position.chebyshev(s), s))
            .collect();
        free.sort_unstable();
        if free.is_empty() {
            debug!("no free station known");
            return;
        }

        for (distance, station) in free {
            let path = grid_search::find_path(self.position, station, &*ctx.grid);
            if !path.is_empty() {
                self.distance_to_station = Some(distance);
                self.path_back_to_station = path.into();
                return;
            }
        }
        debug!(position = %self.position, "no reachable station");
    }

    fn explore(&mut self, ctx: &mut StepContext<'_>) -> State {
        if ctx.coordination == Coordination::Cooperative && !self.has_info {
            let peers = ctx.peers;
            let peer = find_peer(self.position, ctx)
                .and_then(|key| peers.get(key).map(|cell| (key, cell)));
            if let Some((key, cell)) = peer {
                if let Ok(peer) = cell.try_borrow() {
                    self.enter(State::Communicating);
                    self.exchange_info(&peer);
                    debug!(
                        peer = ?key,
                        stations = self.station_cells.len(),
                        visited = self.visited_cells.len(),
                        "exchanged maps"
                    );
                    return self.enter(State::Idle);
                }
            }
        }

        self.enter(State::CheckTrash);
        if ctx.grid.has_trash(self.position) {
            self.enter(State::Cleaning);
            self.clean(ctx);
            return self.enter(State::Idle);
        }

        self.enter(State::CheckObstacles);
        match self.choose_next_cell(ctx) {
            Some(next) => {
                self.enter(State::Moving);
                self.move_to(next, ctx)
            }
            None => self.enter(State::Idle),
        }
    }

    fn clean(&mut self, ctx: &mut StepContext<'_>) {
        if ctx.grid.remove_trash(self.position) {
            self.trash_cleaned += 1;
            self.known_trash.remove(&self.position);
            debug!(position = %self.position, total = self.trash_cleaned, "cleaned trash");
        }
    }

    // Visible trash first, then unseen cells next door, then remembered trash, then the nearest
    // unseen cell anywhere, then any open neighbour.
    fn choose_next_cell(&mut self, ctx: &mut StepContext<'_>) -> Option<Coordinate> {
        let candidates: Vec<Coordinate> = ctx
            .grid
            .neighbors(self.position)
            .filter(|&c| !ctx.grid.is_obstacle(c))
            .collect();

        let with_trash: Vec<Coordinate> = candidates
            .iter()
            .copied()
            .filter(|&c| ctx.grid.has_trash(c))
            .collect();
        if let Some(&next) = with_trash.choose(&mut *ctx.rng) {
            return Some(next);
        }

        let unvisited: Vec<Coordinate> = candidates
            .iter()
            .copied()
            .filter(|c| !self.visited_cells.contains(c))
            .collect();
        if let Some(&next) = unvisited.choose(&mut *ctx.rng) {
            return Some(next);
        }

        if let Some(next) = self.step_towards_known_trash(ctx) {
            return Some(next);
        }

        let path =
            grid_search::find_nearest_unvisited(self.position, &self.visited_cells, &*ctx.grid);
        if let Some(&next) = path.first() {
            return Some(next);
        }

        candidates.choose(&mut *ctx.rng).copied()
    }

    fn step_towards_known_trash(&mut self, ctx: &StepContext<'_>) -> Option<Coordinate> {
        let (target, _) = nearest(self.position, self.known_trash.iter().copied())?;
        self.known_trash.remove(&target);
        grid_search::find_path(self.position, target, &*ctx.grid)
            .first()
            .copied()
    }

    fn move_to(&mut self, destination: Coordinate, ctx: &mut StepContext<'_>) -> State {
        let needs_charge = !self.has_battery && self.station_cells.contains(&destination);
        if needs_charge && station_occupied(destination, ctx) {
            debug!(station = %destination, "station busy, waiting");
            self.path_back_to_station.clear();
            return self.enter(State::Waiting);
        }

        if let Err(err) = ctx.grid.move_roomba(ctx.key, self.position, destination) {
            debug!(%err, "move rejected");
            self.path_back_to_station.clear();
            return self.enter(State::Idle);
        }
        self.position = destination;
        self.visited_cells.insert(destination);
        self.steps_taken += 1;
        ctx.grid.mark_visited(destination);

        if needs_charge {
            self.path_back_to_station.clear();
            self.enter(State::Recharging)
        } else {
            self.enter(State::Idle)
        }
    }
}

#[cfg(test)]
impl Roomba {
    pub(crate) fn set_station_cells(&mut self, stations: Vec<Coordinate>) {
        self.station_cells = stations;
    }
}

/// Closest candidate by Chebyshev distance. Ties go to the earliest candidate.
fn nearest(
    from: Coordinate,
    candidates: impl IntoIterator<Item = Coordinate>,
) -> Option<(Coordinate, i32)> {
    candidates
        .into_iter()
        .map(|c| (c, from.chebyshev(c)))
        .min_by_key(|&(_, d)| d)
}

// A station counts as busy while another roomba is charging on it. Solo roombas never check.
fn station_occupied(station: Coordinate, ctx: &StepContext<'_>) -> bool {
    if ctx.coordination == Coordination::Solo {
        return false;
    }
    let Some(cell) = ctx.grid.cell(station) else {
        return false;
    };
    cell.roombas().filter(|&k| k != ctx.key).any(|k| {
        ctx.peers
            .get(k)
            .and_then(|peer| peer.try_borrow().ok())
            .map_or(false, |peer| peer.state == State::Recharging)
    })
}

fn find_peer(position: Coordinate, ctx: &StepContext<'_>) -> Option<RoombaKey> {
    ctx.grid
        .neighborhood(position)
        .flat_map(|cell| cell.roombas())
        .find(|&k| k != ctx.key)
}

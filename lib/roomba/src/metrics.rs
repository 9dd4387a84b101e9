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

//! Per-tick model reporters.

use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::{Coordinate, RoombaKey, State};

/// What the data collector records once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Ticks completed so far. The snapshot taken right after world creation has tick 0.
    pub tick: u32,
    /// Mean battery of the live roombas, 0 when none are left.
    pub battery_pct: f64,
    /// Share of the initial trash collected, 100 when the world started clean.
    pub trash_collected_pct: f64,
    /// Roombas still running.
    pub roombas_alive: usize,
    /// Mean steps taken by the live roombas, 0 when none are left.
    pub mean_steps: f64,
}

/// Final state of one roomba, for reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoombaSummary {
    /// Handle inside the model.
    pub key: RoombaKey,
    /// Where it stands.
    pub position: Coordinate,
    /// Battery left.
    pub battery: i32,
    /// Cells moved.
    pub steps: u32,
    /// Trash pieces collected.
    pub trash_cleaned: u32,
    /// State at the end of its last step.
    pub state: State,
}

/// Arithmetic mean, 0 for an empty input.
pub fn mean<T: ToPrimitive>(values: impl IntoIterator<Item = T>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .filter_map(|v| v.to_f64())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Share of `initial` that is no longer `remaining`, in percent.
pub fn collected_pct(initial: usize, remaining: usize) -> f64 {
    if initial == 0 {
        return 100.0;
    }
    initial.saturating_sub(remaining) as f64 / initial as f64 * 100.0
}

/// History of snapshots, oldest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataCollector {
    history: Vec<Snapshot>,
}

impl DataCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot.
    pub fn record(&mut self, snapshot: Snapshot) {
        self.history.push(snapshot);
    }

    /// Most recent snapshot.
    pub fn latest(&self) -> Option<&Snapshot> {
        self.history.last()
    }

    /// Every snapshot so far.
    pub fn history(&self) -> &[Snapshot] {
        &self.history
    }

    /// History as a pretty-printed JSON array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.history)
    }
}

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

//! Discrete, bounded, non-wrapping grid world.
//!
//! The grid owns every cell and every cell owns its occupants. Agents never hold a cell, they hold
//! a [`Coordinate`] and ask the grid what lives there. Agent occupants are referred to by a
//! caller-chosen handle type `K` (for example a slotmap key), so the grid never owns agents either.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Random source shared by every seeded operation in a simulation run.
pub type Rng = rand_pcg::Pcg64;
/// Hash set with a fixed hasher so iteration order only depends on insertion history.
pub type HashSet<T> = rustc_hash::FxHashSet<T>;
/// Hash map with a fixed hasher.
pub type HashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// Grid error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    /// Width and height must both be positive.
    #[error("invalid grid dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: i32,
        /// Requested height.
        height: i32,
    },

    /// Coordinate lies outside the grid.
    #[error("coordinate out of bounds: {0}")]
    OutOfBounds(Coordinate),

    /// Only obstacles may be stacked onto an obstacle cell.
    #[error("cell is blocked by an obstacle: {0}")]
    Blocked(Coordinate),

    /// Asked for more empty cells than the grid has.
    #[error("not enough empty cells: requested {requested}, available {available}")]
    NotEnoughEmptyCells {
        /// Number of cells asked for.
        requested: usize,
        /// Number of empty cells left.
        available: usize,
    },
}

/// Integer cell coordinate. `x` grows to the right, `y` grows downwards.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Coordinate {
    /// Column.
    pub x: i32,

    /// Row.
    pub y: i32,
}

impl Coordinate {
    /// Create a new coordinate.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// `|dx| + |dy|`.
    pub fn manhattan(&self, other: Coordinate) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// `max(|dx|, |dy|)`, the number of king moves between two cells on an open grid.
    pub fn chebyshev(&self, other: Coordinate) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for Coordinate {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

// Moore neighborhood, scanned column by column.
const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Something that sits in a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occupant<K> {
    /// Blocks traversal. Permanent.
    Obstacle,

    /// Dirt waiting to be collected. Removed when cleaned.
    Trash,

    /// Charging location. Permanent.
    Station,

    /// Passive flag recording whether any agent has ever entered the cell.
    VisitedMarker {
        /// Set the first time an agent enters the cell.
        visited: bool,
    },

    /// A mobile agent, referred to by its handle.
    Roomba(K),
}

/// One grid cell and everything in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell<K> {
    coordinate: Coordinate,
    occupants: Vec<Occupant<K>>,
}

impl<K: Copy + Eq> Cell<K> {
    fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            occupants: Vec::new(),
        }
    }

    /// Position of this cell.
    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    /// Everything in this cell, in placement order.
    pub fn occupants(&self) -> &[Occupant<K>] {
        &self.occupants
    }

    /// True if nothing at all has been placed here.
    pub fn is_empty(&self) -> bool {
        self.occupants.is_empty()
    }

    /// True if the cell holds an obstacle.
    pub fn has_obstacle(&self) -> bool {
        self.occupants.iter().any(|o| matches!(o, Occupant::Obstacle))
    }

    /// True if the cell holds uncollected trash.
    pub fn has_trash(&self) -> bool {
        self.occupants.iter().any(|o| matches!(o, Occupant::Trash))
    }

    /// True if the cell holds a charging station.
    pub fn has_station(&self) -> bool {
        self.occupants.iter().any(|o| matches!(o, Occupant::Station))
    }

    /// True once an agent has entered the cell.
    pub fn visited(&self) -> bool {
        self.occupants
            .iter()
            .any(|o| matches!(o, Occupant::VisitedMarker { visited: true }))
    }

    /// Handles of the agents standing in this cell.
    pub fn roombas(&self) -> impl Iterator<Item = K> + '_ {
        self.occupants.iter().filter_map(|o| match o {
            Occupant::Roomba(key) => Some(*key),
            _ => None,
        })
    }
}

/// Bounded rectangular grid of cells, 8-connected, non-wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid<K> {
    width: i32,
    height: i32,
    cells: Vec<Cell<K>>,
}

impl<K: Copy + Eq> Grid<K> {
    /// Create a grid with every cell empty.
    pub fn new(width: i32, height: i32) -> Result<Self, GridError> {
        if width <= 0 || height <= 0 {
            return Err(GridError::InvalidDimensions { width, height });
        }
        let cells = (0..height)
            .flat_map(|y| (0..width).map(move |x| Cell::new(Coordinate::new(x, y))))
            .collect();
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Width of the grid.
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Height of the grid.
    pub fn height(&self) -> i32 {
        self.height
    }

    /// True if the coordinate lies inside the grid.
    pub fn contains(&self, coordinate: Coordinate) -> bool {
        (0..self.width).contains(&coordinate.x) && (0..self.height).contains(&coordinate.y)
    }

    fn index(&self, coordinate: Coordinate) -> Option<usize> {
        if self.contains(coordinate) {
            Some((coordinate.y * self.width + coordinate.x) as usize)
        } else {
            None
        }
    }

    /// Get a cell, or `None` outside the grid.
    pub fn cell(&self, coordinate: Coordinate) -> Option<&Cell<K>> {
        let i = self.index(coordinate)?;
        Some(&self.cells[i])
    }

    /// Get a cell, or an error outside the grid.
    pub fn cell_at(&self, coordinate: Coordinate) -> Result<&Cell<K>, GridError> {
        self.cell(coordinate).ok_or(GridError::OutOfBounds(coordinate))
    }

    fn cell_mut(&mut self, coordinate: Coordinate) -> Option<&mut Cell<K>> {
        let i = self.index(coordinate)?;
        Some(&mut self.cells[i])
    }

    /// All cells, row by row.
    pub fn cells(&self) -> impl Iterator<Item = &Cell<K>> + '_ {
        self.cells.iter()
    }

    /// In-bounds coordinates of the 8-neighborhood, excluding the cell itself.
    pub fn neighbors(&self, coordinate: Coordinate) -> impl Iterator<Item = Coordinate> + '_ {
        NEIGHBOR_OFFSETS
            .iter()
            .map(move |&(dx, dy)| Coordinate::new(coordinate.x + dx, coordinate.y + dy))
            .filter(move |c| self.contains(*c))
    }

    /// Cells of the 8-neighborhood.
    pub fn neighborhood(&self, coordinate: Coordinate) -> impl Iterator<Item = &Cell<K>> + '_ {
        self.neighbors(coordinate).filter_map(move |c| self.cell(c))
    }

    /// True if the cell holds an obstacle. Coordinates outside the grid count as blocked.
    pub fn is_obstacle(&self, coordinate: Coordinate) -> bool {
        self.cell(coordinate).map_or(true, Cell::has_obstacle)
    }

    /// True if the cell holds trash.
    pub fn has_trash(&self, coordinate: Coordinate) -> bool {
        self.cell(coordinate).map_or(false, Cell::has_trash)
    }

    /// True if the cell holds a station.
    pub fn has_station(&self, coordinate: Coordinate) -> bool {
        self.cell(coordinate).map_or(false, Cell::has_station)
    }

    /// Put an occupant into a cell. Only obstacles may go onto an obstacle cell.
    pub fn place(&mut self, coordinate: Coordinate, occupant: Occupant<K>) -> Result<(), GridError> {
        let cell = self
            .cell_mut(coordinate)
            .ok_or(GridError::OutOfBounds(coordinate))?;
        if cell.has_obstacle() && occupant != Occupant::Obstacle {
            return Err(GridError::Blocked(coordinate));
        }
        cell.occupants.push(occupant);
        Ok(())
    }

    /// Surround the grid with obstacles.
    pub fn add_border_obstacles(&mut self) {
        for cell in self.cells.iter_mut() {
            let Coordinate { x, y } = cell.coordinate;
            let on_border = x == 0 || y == 0 || x == self.width - 1 || y == self.height - 1;
            if on_border && !cell.has_obstacle() {
                cell.occupants.push(Occupant::Obstacle);
            }
        }
    }

    /// Give every cell an unvisited marker. Cells that already carry one are left alone.
    pub fn add_visited_markers(&mut self) {
        for cell in self.cells.iter_mut() {
            let has_marker = cell
                .occupants
                .iter()
                .any(|o| matches!(o, Occupant::VisitedMarker { .. }));
            if !has_marker {
                cell.occupants.push(Occupant::VisitedMarker { visited: false });
            }
        }
    }

    /// Flip the visited marker of a cell. Returns false if the cell has no marker.
    pub fn mark_visited(&mut self, coordinate: Coordinate) -> bool {
        let Some(cell) = self.cell_mut(coordinate) else {
            return false;
        };
        let mut marked = false;
        for occupant in cell.occupants.iter_mut() {
            if let Occupant::VisitedMarker { visited } = occupant {
                *visited = true;
                marked = true;
            }
        }
        marked
    }

    /// Remove one piece of trash from a cell. Returns false if there was none.
    pub fn remove_trash(&mut self, coordinate: Coordinate) -> bool {
        let Some(cell) = self.cell_mut(coordinate) else {
            return false;
        };
        match cell
            .occupants
            .iter()
            .position(|o| matches!(o, Occupant::Trash))
        {
            Some(i) => {
                cell.occupants.remove(i);
                true
            }
            None => false,
        }
    }

    /// Take an agent out of a cell. Returns false if it was not there.
    pub fn remove_roomba(&mut self, key: K, coordinate: Coordinate) -> bool {
        let Some(cell) = self.cell_mut(coordinate) else {
            return false;
        };
        match cell
            .occupants
            .iter()
            .position(|o| *o == Occupant::Roomba(key))
        {
            Some(i) => {
                cell.occupants.remove(i);
                true
            }
            None => false,
        }
    }

    /// Move an agent between two cells.
    pub fn move_roomba(
        &mut self,
        key: K,
        from: Coordinate,
        to: Coordinate,
    ) -> Result<(), GridError> {
        if !self.contains(to) {
            return Err(GridError::OutOfBounds(to));
        }
        if self.is_obstacle(to) {
            return Err(GridError::Blocked(to));
        }
        self.remove_roomba(key, from);
        self.place(to, Occupant::Roomba(key))
    }

    /// Number of trash pieces left anywhere on the grid.
    pub fn count_trash(&self) -> usize {
        self.cells
            .iter()
            .flat_map(|c| c.occupants.iter())
            .filter(|o| matches!(o, Occupant::Trash))
            .count()
    }

    /// Coordinates of cells with nothing in them, row by row.
    pub fn empty_cells(&self) -> Vec<Coordinate> {
        self.cells
            .iter()
            .filter(|c| c.is_empty())
            .map(|c| c.coordinate)
            .collect()
    }

    /// Uniformly sample `k` distinct empty cells.
    pub fn random_empty_cells(&self, k: usize, rng: &mut Rng) -> Result<Vec<Coordinate>, GridError> {
        let empties = self.empty_cells();
        if k > empties.len() {
            return Err(GridError::NotEnoughEmptyCells {
                requested: k,
                available: empties.len(),
            });
        }
        Ok(empties.choose_multiple(rng, k).copied().collect())
    }
}

/// Seeded in-place permutation, used to draw the agent activation order of a tick.
pub fn shuffle<T>(items: &mut [T], rng: &mut Rng) {
    items.shuffle(rng);
}

// print one character per cell, obstacles first, then agents, stations, trash and visited cells.
impl<K: Copy + Eq> std::fmt::Display for Grid<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = String::with_capacity(((self.width + 1) * self.height) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let c = match self.cell(Coordinate::new(x, y)) {
                    Some(cell) if cell.has_obstacle() => '#',
                    Some(cell) if cell.roombas().next().is_some() => 'R',
                    Some(cell) if cell.has_station() => 'S',
                    Some(cell) if cell.has_trash() => '*',
                    Some(cell) if cell.visited() => '.',
                    _ => ' ',
                };
                s.push(c);
            }
            if y < self.height - 1 {
                s.push('\n');
            }
        }
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;

    use super::*;
    use super::Rng;

    type TestGrid = Grid<u32>;

    #[test]
    fn test_grid_rejects_non_positive_dimensions() {
        assert_eq!(
            TestGrid::new(0, 5),
            Err(GridError::InvalidDimensions {
                width: 0,
                height: 5
            })
        );
    }

    #[test]
    fn test_grid_starts_empty() {
        let grid = TestGrid::new(4, 3).expect("grid");
        assert_eq!(grid.empty_cells().len(), 12);
        assert_eq!(grid.count_trash(), 0);
        assert!(grid.cells().all(Cell::is_empty));
    }

    #[test]
    fn test_corner_has_three_neighbors_and_middle_has_eight() {
        let grid = TestGrid::new(5, 5).expect("grid");
        assert_eq!(grid.neighbors(Coordinate::new(0, 0)).count(), 3);
        assert_eq!(grid.neighbors(Coordinate::new(4, 2)).count(), 5);
        let middle: Vec<Coordinate> = grid.neighbors(Coordinate::new(2, 2)).collect();
        assert_eq!(middle.len(), 8);
        assert!(!middle.contains(&Coordinate::new(2, 2)));
    }

    #[test]
    fn test_border_obstacles() {
        let mut grid = TestGrid::new(5, 4).expect("grid");
        grid.add_border_obstacles();
        let blocked = grid.cells().filter(|c| c.has_obstacle()).count();
        assert_eq!(blocked, 5 * 4 - 3 * 2);
        assert!(grid.is_obstacle(Coordinate::new(0, 2)));
        assert!(!grid.is_obstacle(Coordinate::new(2, 2)));
        assert!(grid.is_obstacle(Coordinate::new(-1, 2)), "outside counts as blocked");
    }

    #[test]
    fn test_cannot_place_trash_on_obstacle() {
        let mut grid = TestGrid::new(3, 3).expect("grid");
        grid.add_border_obstacles();
        assert_eq!(
            grid.place(Coordinate::new(0, 0), Occupant::Trash),
            Err(GridError::Blocked(Coordinate::new(0, 0)))
        );
        assert_eq!(
            grid.place(Coordinate::new(3, 0), Occupant::Trash),
            Err(GridError::OutOfBounds(Coordinate::new(3, 0)))
        );
    }

    #[test]
    fn test_trash_is_removed_once() {
        let mut grid = TestGrid::new(3, 3).expect("grid");
        let c = Coordinate::new(1, 1);
        grid.place(c, Occupant::Trash).expect("place");
        assert!(grid.has_trash(c));
        assert!(grid.remove_trash(c));
        assert!(!grid.remove_trash(c));
        assert_eq!(grid.count_trash(), 0);
    }

    #[test]
    fn test_move_roomba_and_mark_visited() {
        let mut grid = TestGrid::new(3, 3).expect("grid");
        let from = Coordinate::new(0, 0);
        let to = Coordinate::new(1, 1);
        grid.place(from, Occupant::Roomba(7)).expect("place");
        grid.add_visited_markers();
        grid.move_roomba(7, from, to).expect("move");
        assert!(grid.mark_visited(to));

        let cell = grid.cell_at(to).expect("cell");
        assert_eq!(cell.roombas().collect::<Vec<_>>(), vec![7]);
        assert!(cell.visited());
        assert_eq!(grid.cell_at(from).expect("cell").roombas().count(), 0);
        assert!(!grid.cell_at(from).expect("cell").visited());
    }

    #[test]
    fn test_move_into_obstacle_leaves_roomba_in_place() {
        let mut grid = TestGrid::new(3, 3).expect("grid");
        grid.add_border_obstacles();
        let from = Coordinate::new(1, 1);
        grid.place(from, Occupant::Roomba(7)).expect("place");
        assert_eq!(
            grid.move_roomba(7, from, Coordinate::new(0, 1)),
            Err(GridError::Blocked(Coordinate::new(0, 1)))
        );
        assert_eq!(grid.cell_at(from).expect("cell").roombas().count(), 1);
    }

    #[test]
    fn test_display() {
        let mut grid = TestGrid::new(4, 3).expect("grid");
        grid.add_border_obstacles();
        grid.place(Coordinate::new(1, 1), Occupant::Station).expect("place");
        grid.place(Coordinate::new(2, 1), Occupant::Trash).expect("place");
        assert_eq!(format!("{}", grid), "####\n#S*#\n####");
    }

    #[test]
    fn test_not_enough_empty_cells() {
        let mut grid = TestGrid::new(3, 3).expect("grid");
        grid.add_border_obstacles();
        let mut rng = Rng::seed_from_u64(42);
        assert_eq!(
            grid.random_empty_cells(2, &mut rng),
            Err(GridError::NotEnoughEmptyCells {
                requested: 2,
                available: 1
            })
        );
    }

    proptest! {
        #[test]
        fn test_random_empty_cells_are_distinct_and_empty(
            width in 3..12i32,
            height in 3..12i32,
            seed in any::<u64>(),
            fraction in 0.0..1.0f64,
        ) {
            let mut grid = TestGrid::new(width, height).expect("grid");
            grid.add_border_obstacles();
            let available = grid.empty_cells().len();
            let k = (available as f64 * fraction) as usize;
            let mut rng = Rng::seed_from_u64(seed);
            let picked = grid.random_empty_cells(k, &mut rng).expect("sample");

            prop_assert_eq!(picked.len(), k);
            let distinct: HashSet<Coordinate> = picked.iter().copied().collect();
            prop_assert_eq!(distinct.len(), k);
            for c in picked {
                prop_assert!(grid.cell_at(c).expect("cell").is_empty());
            }
        }

        #[test]
        fn test_same_seed_same_sample(seed in any::<u64>()) {
            let grid = TestGrid::new(8, 8).expect("grid");
            let first = grid.random_empty_cells(10, &mut Rng::seed_from_u64(seed)).expect("sample");
            let second = grid.random_empty_cells(10, &mut Rng::seed_from_u64(seed)).expect("sample");
            prop_assert_eq!(first, second);
        }
    }
}

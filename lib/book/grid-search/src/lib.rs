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

//! Uninformed and informed grid search.
//!
//! See Chapter 3: Solving Problems by Searching. Breadth-first search (page 95) finds the nearest
//! cell matching a goal test, A* (page 103) finds a path to a known goal cell. Both are stateless
//! and only need a [`Walkable`] view of the world.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use grid_world::{Coordinate, Grid, HashMap, HashSet};

/// Traversal view of a grid. Steps cost 1, blocked cells are not part of the graph.
pub trait Walkable {
    /// True if an agent may stand on this cell.
    fn is_walkable(&self, node: Coordinate) -> bool;

    /// Walkable cells one step away from `node`.
    fn walkable_neighbors(&self, node: Coordinate) -> Vec<Coordinate>;
}

impl<K: Copy + Eq> Walkable for Grid<K> {
    fn is_walkable(&self, node: Coordinate) -> bool {
        !self.is_obstacle(node)
    }

    fn walkable_neighbors(&self, node: Coordinate) -> Vec<Coordinate> {
        self.neighbors(node)
            .filter(|c| !self.is_obstacle(*c))
            .collect()
    }
}

/// find_path is A* with unit step costs and a Manhattan distance heuristic.
///
/// Returns the cells after `start` up to and including `goal`. The result is empty both when
/// `start == goal` (already there) and when `goal` cannot be reached; callers tell the two apart
/// by comparing `start` and `goal`.
///
/// Every node is expanded at most once. A node that is already settled is never re-enqueued, even
/// if a path of equal or lower cost to it shows up later. Frontier ties on `f` are broken by the
/// smaller coordinate, so the search is fully deterministic.
///
/// Note that on an 8-connected grid Manhattan distance can overestimate, so around obstacles the
/// returned path is not always the shortest one. On an open grid it is.
pub fn find_path<G: Walkable + ?Sized>(start: Coordinate, goal: Coordinate, graph: &G) -> Vec<Coordinate> {
    if start == goal || !graph.is_walkable(goal) {
        return Vec::new();
    }

    let mut frontier = BinaryHeap::new();
    let mut cost_so_far: HashMap<Coordinate, i32> = HashMap::default();
    let mut came_from: HashMap<Coordinate, Coordinate> = HashMap::default();
    let mut settled: HashSet<Coordinate> = HashSet::default();

    cost_so_far.insert(start, 0);
    frontier.push(Reverse((start.manhattan(goal), start)));

    while let Some(Reverse((_, current))) = frontier.pop() {
        if !settled.insert(current) {
            continue;
        }
        if current == goal {
            return reconstruct_path(&came_from, start, goal);
        }

        let Some(&current_cost) = cost_so_far.get(&current) else {
            continue;
        };
        for neighbor in graph.walkable_neighbors(current) {
            if settled.contains(&neighbor) {
                continue;
            }
            let new_cost = current_cost + 1;
            let improves = cost_so_far
                .get(&neighbor)
                .map_or(true, |&known| new_cost < known);
            if improves {
                cost_so_far.insert(neighbor, new_cost);
                came_from.insert(neighbor, current);
                frontier.push(Reverse((new_cost + neighbor.manhattan(goal), neighbor)));
            }
        }
    }

    Vec::new()
}

// walk the parent links back from goal, then flip them around. start is not included.
fn reconstruct_path(
    came_from: &HashMap<Coordinate, Coordinate>,
    start: Coordinate,
    goal: Coordinate,
) -> Vec<Coordinate> {
    let mut path = Vec::new();
    let mut current = goal;
    while current != start {
        path.push(current);
        match came_from.get(&current) {
            Some(&parent) => current = parent,
            None => return Vec::new(),
        }
    }
    path.reverse();
    path
}

/// Breadth-first search from `start` over walkable cells for the closest cell not in `visited`.
///
/// `start` itself is tested first, so an agent standing on an unvisited cell finds itself.
pub fn nearest_unvisited<G: Walkable + ?Sized>(
    start: Coordinate,
    visited: &HashSet<Coordinate>,
    graph: &G,
) -> Option<Coordinate> {
    let mut seen: HashSet<Coordinate> = HashSet::default();
    let mut queue = VecDeque::new();
    seen.insert(start);
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        if graph.is_walkable(current) && !visited.contains(&current) {
            return Some(current);
        }
        for neighbor in graph.walkable_neighbors(current) {
            if seen.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }
    }
    None
}

/// Path to the closest cell outside `visited`, see [`nearest_unvisited`] and [`find_path`].
///
/// Empty when every reachable cell has been visited.
pub fn find_nearest_unvisited<G: Walkable + ?Sized>(
    start: Coordinate,
    visited: &HashSet<Coordinate>,
    graph: &G,
) -> Vec<Coordinate> {
    match nearest_unvisited(start, visited, graph) {
        Some(target) => find_path(start, target, graph),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use grid_world::{Occupant, Rng};
    use proptest::prelude::*;
    use rand::Rng as _;
    use rand::SeedableRng;

    use super::*;

    type TestGrid = Grid<u32>;

    fn walled(width: i32, height: i32) -> TestGrid {
        let mut grid = TestGrid::new(width, height).expect("grid");
        grid.add_border_obstacles();
        grid
    }

    fn with_obstacles(mut grid: TestGrid, obstacles: &[(i32, i32)]) -> TestGrid {
        for &c in obstacles {
            grid.place(c.into(), Occupant::Obstacle).expect("place");
        }
        grid
    }

    // Flood fill ground truth: step counts from start to every reachable cell.
    fn flood_fill(grid: &TestGrid, start: Coordinate) -> HashMap<Coordinate, usize> {
        let mut distances = HashMap::default();
        let mut queue = VecDeque::new();
        distances.insert(start, 0);
        queue.push_back(start);
        while let Some(current) = queue.pop_front() {
            let d = distances[&current];
            for n in grid.walkable_neighbors(current) {
                if !distances.contains_key(&n) {
                    distances.insert(n, d + 1);
                    queue.push_back(n);
                }
            }
        }
        distances
    }

    fn assert_valid_path(grid: &TestGrid, start: Coordinate, goal: Coordinate, path: &[Coordinate]) {
        assert_eq!(path.last(), Some(&goal));
        let mut previous = start;
        for &step in path {
            assert!(previous.chebyshev(step) == 1, "{} -> {} is not one step", previous, step);
            assert!(!grid.is_obstacle(step), "{} is blocked", step);
            previous = step;
        }
    }

    fn random_layout(width: i32, height: i32, density: f64, seed: u64) -> TestGrid {
        let mut grid = walled(width, height);
        let mut rng = Rng::seed_from_u64(seed);
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                if rng.gen_bool(density) {
                    grid.place(Coordinate::new(x, y), Occupant::Obstacle).expect("place");
                }
            }
        }
        grid
    }

    #[test]
    fn test_find_path_start_equals_goal_is_empty() {
        let grid = walled(6, 6);
        let c = Coordinate::new(2, 2);
        assert!(find_path(c, c, &grid).is_empty());
    }

    #[test]
    fn test_find_path_straight_line() {
        let grid = walled(8, 5);
        let path = find_path(Coordinate::new(1, 2), Coordinate::new(5, 2), &grid);
        assert_eq!(
            path,
            vec![
                Coordinate::new(2, 2),
                Coordinate::new(3, 2),
                Coordinate::new(4, 2),
                Coordinate::new(5, 2),
            ]
        );
    }

    #[test]
    fn test_find_path_takes_diagonals() {
        let grid = walled(10, 10);
        let path = find_path(Coordinate::new(1, 1), Coordinate::new(4, 4), &grid);
        assert_eq!(
            path,
            vec![
                Coordinate::new(2, 2),
                Coordinate::new(3, 3),
                Coordinate::new(4, 4),
            ]
        );
    }

    #[test]
    fn test_find_path_goes_around_wall() {
        // A wall at x = 3 with a single gap at the bottom.
        let grid = with_obstacles(walled(7, 7), &[(3, 1), (3, 2), (3, 3), (3, 4)]);
        let start = Coordinate::new(1, 1);
        let goal = Coordinate::new(5, 1);
        let path = find_path(start, goal, &grid);
        assert!(path.contains(&Coordinate::new(3, 5)), "path: {:?}", path);
        assert_valid_path(&grid, start, goal, &path);
    }

    #[test]
    fn test_find_path_to_obstacle_is_empty() {
        let grid = with_obstacles(walled(6, 6), &[(3, 3)]);
        assert!(find_path(Coordinate::new(1, 1), Coordinate::new(3, 3), &grid).is_empty());
    }

    #[test]
    fn test_find_path_enclosed_goal_is_empty() {
        let grid = with_obstacles(
            walled(7, 7),
            &[(3, 3), (3, 4), (3, 5), (4, 3), (5, 3), (5, 4), (5, 5), (4, 5)],
        );
        assert!(find_path(Coordinate::new(1, 1), Coordinate::new(4, 4), &grid).is_empty());
    }

    #[test]
    fn test_nearest_unvisited_picks_closest() {
        let grid = walled(8, 8);
        let mut visited: HashSet<Coordinate> = HashSet::default();
        for y in 1..7 {
            for x in 1..7 {
                visited.insert(Coordinate::new(x, y));
            }
        }
        visited.remove(&Coordinate::new(6, 6));
        visited.remove(&Coordinate::new(3, 1));

        let start = Coordinate::new(1, 1);
        assert_eq!(
            nearest_unvisited(start, &visited, &grid),
            Some(Coordinate::new(3, 1))
        );
        let path = find_nearest_unvisited(start, &visited, &grid);
        assert_eq!(path.len(), 2);
        assert_eq!(path.last(), Some(&Coordinate::new(3, 1)));
    }

    #[test]
    fn test_nearest_unvisited_all_visited_is_empty() {
        let grid = walled(5, 5);
        let visited: HashSet<Coordinate> = grid
            .cells()
            .map(|c| c.coordinate())
            .filter(|c| !grid.is_obstacle(*c))
            .collect();
        let start = Coordinate::new(2, 2);
        assert_eq!(nearest_unvisited(start, &visited, &grid), None);
        assert!(find_nearest_unvisited(start, &visited, &grid).is_empty());
    }

    #[test]
    fn test_nearest_unvisited_ignores_unreachable_cells() {
        // (5, 1)..(5, 5) are cut off by a wall at x = 4.
        let grid = with_obstacles(
            walled(7, 7),
            &[(4, 1), (4, 2), (4, 3), (4, 4), (4, 5)],
        );
        let visited: HashSet<Coordinate> = (1..4)
            .flat_map(|x| (1..6).map(move |y| Coordinate::new(x, y)))
            .collect();
        assert_eq!(nearest_unvisited(Coordinate::new(1, 1), &visited, &grid), None);
    }

    proptest! {
        #[test]
        fn test_open_grid_path_is_optimal(
            width in 3..16i32,
            height in 3..16i32,
            sx in 0..100i32, sy in 0..100i32,
            gx in 0..100i32, gy in 0..100i32,
        ) {
            let grid = walled(width, height);
            let start = Coordinate::new(1 + sx % (width - 2), 1 + sy % (height - 2));
            let goal = Coordinate::new(1 + gx % (width - 2), 1 + gy % (height - 2));
            let path = find_path(start, goal, &grid);

            prop_assert_eq!(path.len() as i32, start.chebyshev(goal));
            if start != goal {
                assert_valid_path(&grid, start, goal, &path);
            }
        }

        #[test]
        fn test_path_exists_iff_flood_fill_reaches_goal(
            width in 3..14i32,
            height in 3..14i32,
            seed in any::<u64>(),
            density in 0.0..0.5f64,
            sx in 0..100i32, sy in 0..100i32,
            gx in 0..100i32, gy in 0..100i32,
        ) {
            let grid = random_layout(width, height, density, seed);
            let start = Coordinate::new(1 + sx % (width - 2), 1 + sy % (height - 2));
            let goal = Coordinate::new(1 + gx % (width - 2), 1 + gy % (height - 2));
            let path = find_path(start, goal, &grid);

            let reachable = flood_fill(&grid, start);
            let expect_path = start != goal && !grid.is_obstacle(goal) && reachable.contains_key(&goal);
            prop_assert_eq!(!path.is_empty(), expect_path);
            if expect_path {
                assert_valid_path(&grid, start, goal, &path);
                prop_assert!(path.len() >= reachable[&goal]);
            }
        }

        #[test]
        fn test_nearest_unvisited_matches_breadth_first_distance(
            width in 3..12i32,
            height in 3..12i32,
            seed in any::<u64>(),
            sx in 0..100i32, sy in 0..100i32,
        ) {
            let grid = random_layout(width, height, 0.25, seed);
            let start = Coordinate::new(1 + sx % (width - 2), 1 + sy % (height - 2));
            let reachable = flood_fill(&grid, start);

            // Everything within two steps counts as visited.
            let visited: HashSet<Coordinate> = reachable
                .iter()
                .filter(|(_, &d)| d <= 2)
                .map(|(&c, _)| c)
                .collect();
            match nearest_unvisited(start, &visited, &grid) {
                Some(target) => prop_assert_eq!(reachable[&target], 3),
                None => prop_assert!(reachable.values().all(|&d| d <= 2)),
            }
        }
    }
}

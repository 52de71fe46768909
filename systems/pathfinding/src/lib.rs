#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Grid route planner offering A*, Dijkstra and breadth-first search.
//!
//! The planner reads the walkable flags through a [`GridView`] and never
//! touches world state. A [`TerrainMap`] can scale the cost of entering
//! individual cells. Scratch buffers live inside [`Pathfinder`] and are
//! reset at the start of every search, so one planner can serve any number
//! of queries without reallocating.

mod render;
mod terrain;

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, VecDeque},
    fmt,
    str::FromStr,
};

use glam::Vec2;
use warband_core::{CellCoord, CellMapping, GridView, RouteError};

pub use render::render_ascii;
pub use terrain::{InvalidTerrainCost, TerrainMap};

const ORTHOGONAL_COST: f32 = 1.0;
const DIAGONAL_COST: f32 = std::f32::consts::SQRT_2;

/// Search strategy used to plan a route.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SearchAlgorithm {
    /// Heuristic search with a Manhattan estimate over eight neighbours.
    #[default]
    AStar,
    /// Uniform-cost search over eight neighbours.
    Dijkstra,
    /// Unweighted search over the four orthogonal neighbours.
    BreadthFirst,
}

impl SearchAlgorithm {
    /// Every algorithm in declaration order.
    pub const ALL: [SearchAlgorithm; 3] = [
        SearchAlgorithm::AStar,
        SearchAlgorithm::Dijkstra,
        SearchAlgorithm::BreadthFirst,
    ];

    /// Short lowercase name used on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            SearchAlgorithm::AStar => "astar",
            SearchAlgorithm::Dijkstra => "dijkstra",
            SearchAlgorithm::BreadthFirst => "bfs",
        }
    }
}

impl fmt::Display for SearchAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when an algorithm name is not recognised.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown search algorithm `{0}`")]
pub struct ParseAlgorithmError(String);

impl FromStr for SearchAlgorithm {
    type Err = ParseAlgorithmError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "astar" | "a_star" | "a*" => Ok(SearchAlgorithm::AStar),
            "dijkstra" => Ok(SearchAlgorithm::Dijkstra),
            "bfs" | "breadth_first" => Ok(SearchAlgorithm::BreadthFirst),
            _ => Err(ParseAlgorithmError(value.to_owned())),
        }
    }
}

/// Route produced by a successful search.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedRoute {
    cells: Vec<CellCoord>,
    waypoints: Vec<Vec2>,
    cost: f32,
}

impl PlannedRoute {
    /// Cells visited from start to goal, both included.
    #[must_use]
    pub fn cells(&self) -> &[CellCoord] {
        &self.cells
    }

    /// World-space centers of the visited cells.
    #[must_use]
    pub fn waypoints(&self) -> &[Vec2] {
        &self.waypoints
    }

    /// Sum of edge costs along the route, in cells, scaled by terrain when
    /// the route was planned with a [`TerrainMap`].
    #[must_use]
    pub const fn cost(&self) -> f32 {
        self.cost
    }

    /// Consumes the route, yielding its waypoints.
    #[must_use]
    pub fn into_waypoints(self) -> Vec<Vec2> {
        self.waypoints
    }
}

/// Reusable route planner.
#[derive(Debug, Default)]
pub struct Pathfinder {
    workspace: SearchWorkspace,
}

impl Pathfinder {
    /// Creates a planner with empty scratch buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Plans a route and returns its waypoints.
    ///
    /// Any failure yields an empty sequence; use [`Pathfinder::plan`] to learn
    /// why.
    pub fn find_path(
        &mut self,
        grid: &GridView<'_>,
        start: Vec2,
        end: Vec2,
        algorithm: SearchAlgorithm,
    ) -> Vec<Vec2> {
        match self.plan(grid, start, end, algorithm) {
            Ok(route) => route.into_waypoints(),
            Err(error) => {
                log::debug!("{algorithm} from {start} to {end} failed: {error}");
                Vec::new()
            }
        }
    }

    /// Plans a route between two world-space points.
    pub fn plan(
        &mut self,
        grid: &GridView<'_>,
        start: Vec2,
        end: Vec2,
        algorithm: SearchAlgorithm,
    ) -> Result<PlannedRoute, RouteError> {
        self.search(grid, None, start, end, algorithm)
    }

    /// Like [`Pathfinder::find_path`], weighting steps by `terrain`.
    pub fn find_path_with_terrain(
        &mut self,
        grid: &GridView<'_>,
        terrain: &TerrainMap,
        start: Vec2,
        end: Vec2,
        algorithm: SearchAlgorithm,
    ) -> Vec<Vec2> {
        match self.search(grid, Some(terrain), start, end, algorithm) {
            Ok(route) => route.into_waypoints(),
            Err(error) => {
                log::debug!("{algorithm} over terrain from {start} to {end} failed: {error}");
                Vec::new()
            }
        }
    }

    /// Like [`Pathfinder::plan`], multiplying every step by the terrain
    /// cost of the cell it enters.
    ///
    /// Breadth-first search counts steps only and ignores terrain when
    /// choosing the route, though the reported cost still includes it.
    pub fn plan_with_terrain(
        &mut self,
        grid: &GridView<'_>,
        terrain: &TerrainMap,
        start: Vec2,
        end: Vec2,
        algorithm: SearchAlgorithm,
    ) -> Result<PlannedRoute, RouteError> {
        self.search(grid, Some(terrain), start, end, algorithm)
    }

    fn search(
        &mut self,
        grid: &GridView<'_>,
        terrain: Option<&TerrainMap>,
        start: Vec2,
        end: Vec2,
        algorithm: SearchAlgorithm,
    ) -> Result<PlannedRoute, RouteError> {
        let start_cell = grid
            .world_to_cell(start)
            .ok_or(RouteError::StartOutOfBounds)?;
        let goal_cell = grid.world_to_cell(end).ok_or(RouteError::EndOutOfBounds)?;
        if !grid.is_walkable(start_cell) {
            return Err(RouteError::StartBlocked);
        }
        if !grid.is_walkable(goal_cell) {
            return Err(RouteError::EndBlocked);
        }

        let mapping = grid.mapping();
        self.workspace.prepare(mapping.cell_count());
        let cells = match algorithm {
            SearchAlgorithm::AStar => {
                self.workspace
                    .best_first(grid, terrain, start_cell, goal_cell, true)
            }
            SearchAlgorithm::Dijkstra => {
                self.workspace
                    .best_first(grid, terrain, start_cell, goal_cell, false)
            }
            SearchAlgorithm::BreadthFirst => {
                self.workspace.breadth_first(grid, start_cell, goal_cell)
            }
        }
        .ok_or(RouteError::Unreachable)?;

        let cost = route_cost(&cells, terrain);
        let waypoints = cells
            .iter()
            .map(|cell| mapping.cell_to_world(*cell))
            .collect();
        log::trace!(
            "{algorithm} planned {} cells at cost {cost:.3}",
            cells.len()
        );
        Ok(PlannedRoute {
            cells,
            waypoints,
            cost,
        })
    }
}

#[derive(Debug, Default)]
struct SearchWorkspace {
    cost: Vec<f32>,
    parent: Vec<Option<usize>>,
    closed: Vec<bool>,
    open: BinaryHeap<OpenEntry>,
    frontier: VecDeque<usize>,
    sequence: u64,
}

impl SearchWorkspace {
    fn prepare(&mut self, cell_count: usize) {
        self.cost.clear();
        self.cost.resize(cell_count, f32::INFINITY);
        self.parent.clear();
        self.parent.resize(cell_count, None);
        self.closed.clear();
        self.closed.resize(cell_count, false);
        self.open.clear();
        self.frontier.clear();
        self.sequence = 0;
    }

    fn push(&mut self, index: usize, cell: CellCoord, priority: f32) {
        self.open.push(OpenEntry {
            priority,
            sequence: self.sequence,
            index,
            cell,
        });
        self.sequence += 1;
    }

    fn best_first(
        &mut self,
        grid: &GridView<'_>,
        terrain: Option<&TerrainMap>,
        start: CellCoord,
        goal: CellCoord,
        use_heuristic: bool,
    ) -> Option<Vec<CellCoord>> {
        let mapping = grid.mapping();
        let start_index = mapping.index(start)?;
        let goal_index = mapping.index(goal)?;
        let estimate = |cell: CellCoord| {
            if use_heuristic {
                cell.manhattan_distance(goal) as f32
            } else {
                0.0
            }
        };

        self.cost[start_index] = 0.0;
        self.push(start_index, start, estimate(start));

        while let Some(entry) = self.open.pop() {
            let current = entry.index;
            if self.closed[current] {
                continue;
            }
            if current == goal_index {
                return Some(self.reconstruct(mapping, goal_index));
            }
            self.closed[current] = true;

            let base = self.cost[current];
            for neighbor in grid.neighbors(entry.cell, true) {
                let Some(next) = mapping.index(neighbor) else {
                    continue;
                };
                if self.closed[next] {
                    continue;
                }
                let tentative = base + weighted_step_cost(terrain, entry.cell, neighbor);
                if tentative < self.cost[next] {
                    self.cost[next] = tentative;
                    self.parent[next] = Some(current);
                    self.push(next, neighbor, tentative + estimate(neighbor));
                }
            }
        }

        None
    }

    fn breadth_first(
        &mut self,
        grid: &GridView<'_>,
        start: CellCoord,
        goal: CellCoord,
    ) -> Option<Vec<CellCoord>> {
        let mapping = grid.mapping();
        let start_index = mapping.index(start)?;
        let goal_index = mapping.index(goal)?;

        self.closed[start_index] = true;
        self.frontier.push_back(start_index);

        while let Some(current) = self.frontier.pop_front() {
            if current == goal_index {
                return Some(self.reconstruct(mapping, goal_index));
            }
            let Some(cell) = mapping.cell_at_index(current) else {
                continue;
            };
            for neighbor in grid.neighbors(cell, false) {
                let Some(next) = mapping.index(neighbor) else {
                    continue;
                };
                if self.closed[next] {
                    continue;
                }
                self.closed[next] = true;
                self.parent[next] = Some(current);
                self.frontier.push_back(next);
            }
        }

        None
    }

    fn reconstruct(&self, mapping: CellMapping, goal: usize) -> Vec<CellCoord> {
        let mut cells = Vec::new();
        let mut cursor = Some(goal);
        while let Some(index) = cursor {
            if let Some(cell) = mapping.cell_at_index(index) {
                cells.push(cell);
            }
            cursor = self.parent[index];
        }
        cells.reverse();
        cells
    }
}

/// Min-heap entry ordered by priority, then by insertion sequence.
#[derive(Clone, Copy, Debug)]
struct OpenEntry {
    priority: f32,
    sequence: u64,
    index: usize,
    cell: CellCoord,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

fn step_cost(from: CellCoord, to: CellCoord) -> f32 {
    if from.is_diagonal_to(to) {
        DIAGONAL_COST
    } else {
        ORTHOGONAL_COST
    }
}

fn weighted_step_cost(terrain: Option<&TerrainMap>, from: CellCoord, to: CellCoord) -> f32 {
    let multiplier = terrain.map_or(1.0, |terrain| terrain.multiplier_at(to));
    step_cost(from, to) * multiplier
}

fn route_cost(cells: &[CellCoord], terrain: Option<&TerrainMap>) -> f32 {
    cells
        .windows(2)
        .map(|pair| weighted_step_cost(terrain, pair[0], pair[1]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_grid(columns: u32, rows: u32) -> (CellMapping, Vec<bool>) {
        let mapping = CellMapping::new(columns, rows, 1.0);
        (mapping, vec![true; mapping.cell_count()])
    }

    #[test]
    fn heap_pops_lowest_priority_then_oldest() {
        let mut heap = BinaryHeap::new();
        let cell = CellCoord::new(0, 0);
        for (sequence, priority) in [(0, 2.0), (1, 1.0), (2, 1.0)] {
            heap.push(OpenEntry {
                priority,
                sequence,
                index: sequence as usize,
                cell,
            });
        }
        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|entry| entry.sequence)).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn start_equal_to_goal_yields_single_waypoint() {
        let (mapping, walkable) = open_grid(4, 4);
        let grid = GridView::new(mapping, &walkable);
        let mut pathfinder = Pathfinder::new();
        for algorithm in SearchAlgorithm::ALL {
            let route = pathfinder
                .plan(&grid, Vec2::new(1.2, 1.7), Vec2::new(1.9, 1.1), algorithm)
                .expect("route");
            assert_eq!(route.cells(), &[CellCoord::new(1, 1)]);
            assert_eq!(route.waypoints(), &[Vec2::new(1.5, 1.5)]);
            assert_eq!(route.cost(), 0.0);
        }
    }

    #[test]
    fn diagonal_route_costs_root_two_per_step() {
        let (mapping, walkable) = open_grid(5, 5);
        let grid = GridView::new(mapping, &walkable);
        let mut pathfinder = Pathfinder::new();
        let route = pathfinder
            .plan(&grid, Vec2::new(0.5, 0.5), Vec2::new(3.5, 3.5), SearchAlgorithm::AStar)
            .expect("route");
        assert_eq!(route.cells().len(), 4);
        assert!((route.cost() - 3.0 * DIAGONAL_COST).abs() < 1e-5);
    }

    #[test]
    fn failures_report_their_cause() {
        let (mapping, mut walkable) = open_grid(3, 3);
        walkable[mapping.index(CellCoord::new(2, 2)).expect("in range")] = false;
        walkable[mapping.index(CellCoord::new(0, 0)).expect("in range")] = false;
        let grid = GridView::new(mapping, &walkable);
        let mut pathfinder = Pathfinder::new();
        let inside = Vec2::new(1.5, 1.5);

        let plan = |pathfinder: &mut Pathfinder, start, end| {
            pathfinder.plan(&grid, start, end, SearchAlgorithm::AStar)
        };
        assert_eq!(
            plan(&mut pathfinder, Vec2::new(-1.0, 0.5), inside),
            Err(RouteError::StartOutOfBounds)
        );
        assert_eq!(
            plan(&mut pathfinder, inside, Vec2::new(3.5, 0.5)),
            Err(RouteError::EndOutOfBounds)
        );
        assert_eq!(
            plan(&mut pathfinder, Vec2::new(0.5, 0.5), inside),
            Err(RouteError::StartBlocked)
        );
        assert_eq!(
            plan(&mut pathfinder, inside, Vec2::new(2.5, 2.5)),
            Err(RouteError::EndBlocked)
        );
    }

    #[test]
    fn walled_off_goal_is_unreachable_and_soft_fails() {
        let (mapping, mut walkable) = open_grid(5, 1);
        walkable[mapping.index(CellCoord::new(2, 0)).expect("in range")] = false;
        let grid = GridView::new(mapping, &walkable);
        let mut pathfinder = Pathfinder::new();
        for algorithm in SearchAlgorithm::ALL {
            assert_eq!(
                pathfinder.plan(&grid, Vec2::new(0.5, 0.5), Vec2::new(4.5, 0.5), algorithm),
                Err(RouteError::Unreachable)
            );
            assert!(pathfinder
                .find_path(&grid, Vec2::new(0.5, 0.5), Vec2::new(4.5, 0.5), algorithm)
                .is_empty());
        }
    }

    #[test]
    fn costly_terrain_pushes_route_aside() {
        let (mapping, walkable) = open_grid(5, 3);
        let grid = GridView::new(mapping, &walkable);
        let mut terrain = TerrainMap::new();
        terrain.set_terrain_cost("marsh", 10.0).expect("valid cost");
        for column in 1..=3 {
            let _ = terrain.paint(CellCoord::new(column, 1), "marsh");
        }
        let start = Vec2::new(0.5, 1.5);
        let end = Vec2::new(4.5, 1.5);
        let mut pathfinder = Pathfinder::new();

        let straight = pathfinder
            .plan(&grid, start, end, SearchAlgorithm::Dijkstra)
            .expect("route");
        assert_eq!(straight.cells().len(), 5);
        assert!((straight.cost() - 4.0).abs() < 1e-5);

        let detour = pathfinder
            .plan_with_terrain(&grid, &terrain, start, end, SearchAlgorithm::Dijkstra)
            .expect("route");
        assert!(detour.cells().iter().all(|cell| terrain.terrain_at(*cell).is_none()));
        assert!((detour.cost() - (2.0 + 2.0 * DIAGONAL_COST)).abs() < 1e-5);

        let heuristic = pathfinder
            .plan_with_terrain(&grid, &terrain, start, end, SearchAlgorithm::AStar)
            .expect("route");
        assert!(heuristic.cells().iter().all(|cell| terrain.terrain_at(*cell).is_none()));
    }

    #[test]
    fn empty_terrain_plans_like_plain_search() {
        let (mapping, mut walkable) = open_grid(6, 6);
        walkable[mapping.index(CellCoord::new(2, 2)).expect("in range")] = false;
        let grid = GridView::new(mapping, &walkable);
        let terrain = TerrainMap::new();
        let mut pathfinder = Pathfinder::new();
        for algorithm in SearchAlgorithm::ALL {
            let plain = pathfinder.plan(&grid, Vec2::splat(0.5), Vec2::splat(5.5), algorithm);
            let weighted = pathfinder.plan_with_terrain(
                &grid,
                &terrain,
                Vec2::splat(0.5),
                Vec2::splat(5.5),
                algorithm,
            );
            assert_eq!(plain, weighted);
        }
    }

    #[test]
    fn algorithm_names_parse_back() {
        for algorithm in SearchAlgorithm::ALL {
            assert_eq!(algorithm.name().parse::<SearchAlgorithm>(), Ok(algorithm));
        }
        assert!("greedy".parse::<SearchAlgorithm>().is_err());
    }
}

#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Warband simulation.
//!
//! This crate defines the value types that connect the authoritative world,
//! the pure systems and the adapters: cell coordinates and the single
//! world-to-cell mapping, read-only grid views, unit and formation handles,
//! the unit catalog, formation geometry, movement states, and the [`Event`]
//! values the world broadcasts after every mutation. Nothing in here owns
//! simulation state.

mod catalog;
mod error;
mod formation;

use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

pub use catalog::{UnitCatalog, UnitStats};
pub use error::{CommandError, PlacementError, RouteError};
pub use formation::{FormationKind, FormationLayout, ParseFormationKindError};

slotmap::new_key_type! {
    /// Generation-checked handle that identifies a unit.
    pub struct UnitId;

    /// Generation-checked handle that identifies a formation.
    pub struct FormationId;
}

/// Neighbour offsets in search order: orthogonal first, diagonals after.
const NEIGHBOR_OFFSETS: [(i64, i64); 8] = [
    (0, 1),
    (1, 0),
    (0, -1),
    (-1, 0),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Location of a single grid cell expressed as column and row coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    column: u32,
    row: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Computes the Manhattan distance between two cell coordinates.
    #[must_use]
    pub fn manhattan_distance(self, other: CellCoord) -> u32 {
        self.column.abs_diff(other.column) + self.row.abs_diff(other.row)
    }

    /// Reports whether two cells differ along both axes.
    #[must_use]
    pub fn is_diagonal_to(self, other: CellCoord) -> bool {
        self.column != other.column && self.row != other.row
    }
}

/// The one conversion between world space and grid cells.
///
/// Every component that needs to know which cell a point falls into goes
/// through this mapping, so the pathfinder and the collision index always
/// agree. Points map by flooring, which keeps negative coordinates outside
/// the grid instead of folding them onto column or row zero.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellMapping {
    columns: u32,
    rows: u32,
    cell_size: f32,
}

impl CellMapping {
    /// Creates a mapping for a grid of the provided dimensions.
    #[must_use]
    pub const fn new(columns: u32, rows: u32, cell_size: f32) -> Self {
        Self {
            columns,
            rows,
            cell_size,
        }
    }

    /// Number of columns covered by the mapping.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of rows covered by the mapping.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Side length of a single square cell in world units.
    #[must_use]
    pub const fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Total number of cells covered by the mapping.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        usize::try_from(u64::from(self.columns) * u64::from(self.rows)).unwrap_or(0)
    }

    /// Reports whether the cell lies inside the grid.
    #[must_use]
    pub const fn contains(&self, cell: CellCoord) -> bool {
        cell.column < self.columns && cell.row < self.rows
    }

    /// Dense row-major index of the cell, if it lies inside the grid.
    #[must_use]
    pub fn index(&self, cell: CellCoord) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        let row = usize::try_from(cell.row).ok()?;
        let column = usize::try_from(cell.column).ok()?;
        let width = usize::try_from(self.columns).ok()?;
        row.checked_mul(width)?.checked_add(column)
    }

    /// Inverse of [`CellMapping::index`].
    #[must_use]
    pub fn cell_at_index(&self, index: usize) -> Option<CellCoord> {
        let width = usize::try_from(self.columns).ok()?;
        if width == 0 || index >= self.cell_count() {
            return None;
        }
        let column = u32::try_from(index % width).ok()?;
        let row = u32::try_from(index / width).ok()?;
        Some(CellCoord::new(column, row))
    }

    /// Resolves signed coordinates into a cell inside the grid.
    #[must_use]
    pub fn cell_at(&self, column: i64, row: i64) -> Option<CellCoord> {
        let cell = CellCoord::new(u32::try_from(column).ok()?, u32::try_from(row).ok()?);
        self.contains(cell).then_some(cell)
    }

    /// Converts a world-space point into the cell containing it.
    #[must_use]
    pub fn world_to_cell(&self, position: Vec2) -> Option<CellCoord> {
        let column = (position.x / self.cell_size).floor();
        let row = (position.y / self.cell_size).floor();
        if !column.is_finite() || !row.is_finite() {
            return None;
        }
        self.cell_at(column as i64, row as i64)
    }

    /// World-space center of the provided cell.
    #[must_use]
    pub fn cell_to_world(&self, cell: CellCoord) -> Vec2 {
        Vec2::new(
            (cell.column as f32 + 0.5) * self.cell_size,
            (cell.row as f32 + 0.5) * self.cell_size,
        )
    }

    /// Rasterizes an axis-aligned footprint centered on `position`.
    ///
    /// The lower edge is floored and the upper edge ceiled, and the result
    /// always spans at least one cell per axis.
    #[must_use]
    pub fn footprint(&self, position: Vec2, size: Vec2) -> Footprint {
        let half = size.abs() * 0.5;
        let min = (position - half) / self.cell_size;
        let max = (position + half) / self.cell_size;

        let min_column = min.x.floor() as i64;
        let min_row = min.y.floor() as i64;
        let end_column = (max.x.ceil() as i64).max(min_column + 1);
        let end_row = (max.y.ceil() as i64).max(min_row + 1);

        Footprint {
            min_column,
            min_row,
            end_column,
            end_row,
        }
    }
}

/// Rasterized cell bounds of a unit footprint. The end bounds are exclusive.
///
/// Bounds are signed because a footprint may hang off the grid edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Footprint {
    min_column: i64,
    min_row: i64,
    end_column: i64,
    end_row: i64,
}

impl Footprint {
    /// Iterates the signed `(column, row)` pairs covered by the footprint.
    pub fn cells(&self) -> impl Iterator<Item = (i64, i64)> {
        let Footprint {
            min_column,
            min_row,
            end_column,
            end_row,
        } = *self;
        (min_row..end_row).flat_map(move |row| (min_column..end_column).map(move |col| (col, row)))
    }

    /// Reports whether the footprint covers the signed coordinates.
    #[must_use]
    pub const fn covers(&self, column: i64, row: i64) -> bool {
        column >= self.min_column
            && column < self.end_column
            && row >= self.min_row
            && row < self.end_row
    }

    /// Number of cells covered by the footprint.
    #[must_use]
    pub fn cell_count(&self) -> u64 {
        (self.end_column - self.min_column).unsigned_abs()
            * (self.end_row - self.min_row).unsigned_abs()
    }
}

/// Read-only view over the walkable flags of the spatial grid.
#[derive(Clone, Copy, Debug)]
pub struct GridView<'a> {
    mapping: CellMapping,
    walkable: &'a [bool],
}

impl<'a> GridView<'a> {
    /// Captures a view backed by a dense row-major walkable slice.
    #[must_use]
    pub fn new(mapping: CellMapping, walkable: &'a [bool]) -> Self {
        Self { mapping, walkable }
    }

    /// Mapping used to translate between world space and cells.
    #[must_use]
    pub const fn mapping(&self) -> CellMapping {
        self.mapping
    }

    /// Dimensions of the grid expressed as `(columns, rows)`.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.mapping.columns, self.mapping.rows)
    }

    /// Reports whether the cell exists and can be traversed.
    #[must_use]
    pub fn is_walkable(&self, cell: CellCoord) -> bool {
        self.mapping
            .index(cell)
            .and_then(|index| self.walkable.get(index))
            .copied()
            .unwrap_or(false)
    }

    /// Walkable neighbours of `cell`, orthogonal first and diagonals after.
    ///
    /// Diagonal steps are offered even when both orthogonal cells beside
    /// them are blocked.
    pub fn neighbors(
        &self,
        cell: CellCoord,
        allow_diagonal: bool,
    ) -> impl Iterator<Item = CellCoord> + 'a {
        let view = *self;
        let count = if allow_diagonal { 8 } else { 4 };
        NEIGHBOR_OFFSETS
            .iter()
            .take(count)
            .filter_map(move |&(column_offset, row_offset)| {
                let neighbor = view.mapping.cell_at(
                    i64::from(cell.column) + column_offset,
                    i64::from(cell.row) + row_offset,
                )?;
                view.is_walkable(neighbor).then_some(neighbor)
            })
    }

    /// Converts a world-space point into the cell containing it.
    #[must_use]
    pub fn world_to_cell(&self, position: Vec2) -> Option<CellCoord> {
        self.mapping.world_to_cell(position)
    }

    /// World-space center of the provided cell.
    #[must_use]
    pub fn cell_to_world(&self, cell: CellCoord) -> Vec2 {
        self.mapping.cell_to_world(cell)
    }
}

/// Name of the army a unit fights for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArmyId(String);

impl ArmyId {
    /// Creates a new army identifier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrowed form of the army name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArmyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for ArmyId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Movement state tracked for every commanded unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MovementState {
    /// Unit holds its position.
    #[default]
    Idle,
    /// Unit follows a planned route toward a target.
    Moving,
    /// Unit steers directly toward its formation anchor.
    Forming,
    /// Reserved for combat collaborators. The movement controller never enters it.
    Attacking,
    /// Unit could neither follow nor replan its route.
    Stuck,
}

/// Reason a movement command finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandOutcome {
    /// Unit reached the end of its route or its formation anchor.
    Arrived,
    /// Command was stopped, replaced, or abandoned by stuck recovery.
    Cancelled,
}

/// Immutable representation of a single unit used for queries and instancing.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitSnapshot {
    /// Handle of the unit.
    pub id: UnitId,
    /// Catalog key the unit was created from.
    pub unit_type: String,
    /// Current world-space position of the unit center.
    pub position: Vec2,
    /// Width and height of the unit footprint.
    pub size: Vec2,
    /// Army the unit belongs to.
    pub army: ArmyId,
    /// Formation that lists the unit as a member, if any.
    pub formation: Option<FormationId>,
}

/// Read-only snapshot describing all units in the world.
#[derive(Clone, Debug, Default)]
pub struct UnitView {
    snapshots: Vec<UnitSnapshot>,
}

impl UnitView {
    /// Creates a new unit view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<UnitSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured unit snapshots in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &UnitSnapshot> {
        self.snapshots.iter()
    }

    /// Number of captured snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Reports whether the view holds no snapshots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Consumes the view, yielding the underlying snapshots.
    #[must_use]
    pub fn into_vec(self) -> Vec<UnitSnapshot> {
        self.snapshots
    }
}

/// Events broadcast by the world and the systems after state changes.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Confirms that a unit was created and registered.
    UnitPlaced {
        /// Handle assigned to the new unit.
        unit: UnitId,
        /// Position the unit was registered at.
        position: Vec2,
    },
    /// Confirms that a unit was destroyed.
    UnitRemoved {
        /// Handle of the removed unit.
        unit: UnitId,
    },
    /// Reports that a unit was teleported to a new position.
    UnitRelocated {
        /// Handle of the relocated unit.
        unit: UnitId,
        /// Position before the relocation.
        from: Vec2,
        /// Position after the relocation.
        to: Vec2,
    },
    /// Reports that a unit took one steering step.
    UnitAdvanced {
        /// Handle of the unit that moved.
        unit: UnitId,
        /// Position before the step.
        from: Vec2,
        /// Position after the step.
        to: Vec2,
    },
    /// Reports that a unit was moved without a free spot and holds no footprint.
    FootprintLost {
        /// Handle of the unregistered unit.
        unit: UnitId,
    },
    /// Reports that a unit completed its route or reached its anchor.
    UnitArrived {
        /// Handle of the unit that arrived.
        unit: UnitId,
    },
    /// Reports that a unit entered the stuck state.
    UnitStuck {
        /// Handle of the stuck unit.
        unit: UnitId,
    },
    /// Reports that a stuck unit was moved to a free spot.
    UnitRecovered {
        /// Handle of the recovered unit.
        unit: UnitId,
        /// Position the unit was moved to.
        position: Vec2,
    },
    /// Reports that a unit's route was recomputed after a blocked step.
    RouteReplanned {
        /// Handle of the rerouted unit.
        unit: UnitId,
        /// Number of waypoints in the new route.
        waypoints: usize,
    },
    /// Confirms that a formation was created.
    FormationCreated {
        /// Handle of the new formation.
        formation: FormationId,
    },
    /// Reports that a formation was translated to a new center.
    FormationMoved {
        /// Handle of the moved formation.
        formation: FormationId,
        /// Center after the move.
        center: Vec2,
    },
    /// Confirms that a formation record was dissolved.
    FormationDisbanded {
        /// Handle of the dissolved formation.
        formation: FormationId,
    },
    /// Reports that a cell's walkable flag changed.
    ObstacleChanged {
        /// Cell that changed.
        cell: CellCoord,
        /// Whether the cell is now blocked.
        blocked: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_to_cell_round_trips_cell_centers() {
        let mapping = CellMapping::new(6, 4, 2.0);
        for index in 0..mapping.cell_count() {
            let cell = mapping.cell_at_index(index).expect("index in range");
            let center = mapping.cell_to_world(cell);
            assert_eq!(mapping.world_to_cell(center), Some(cell));
            assert_eq!(mapping.index(cell), Some(index));
        }
    }

    #[test]
    fn world_to_cell_rejects_points_outside_grid() {
        let mapping = CellMapping::new(3, 3, 1.0);
        assert_eq!(mapping.world_to_cell(Vec2::new(-0.2, 0.5)), None);
        assert_eq!(mapping.world_to_cell(Vec2::new(0.5, 3.0)), None);
        assert_eq!(mapping.world_to_cell(Vec2::new(f32::NAN, 0.5)), None);
        assert_eq!(
            mapping.world_to_cell(Vec2::new(2.99, 0.0)),
            Some(CellCoord::new(2, 0))
        );
    }

    #[test]
    fn footprint_spans_at_least_one_cell() {
        let mapping = CellMapping::new(10, 10, 1.0);
        let point = mapping.footprint(Vec2::new(3.5, 3.5), Vec2::ZERO);
        assert_eq!(point.cells().collect::<Vec<_>>(), vec![(3, 3)]);

        let centered = mapping.footprint(Vec2::new(0.5, 0.5), Vec2::splat(1.0));
        assert_eq!(centered.cell_count(), 1);

        let straddling = mapping.footprint(Vec2::new(10.0, 10.0), Vec2::splat(1.0));
        assert_eq!(
            straddling.cells().collect::<Vec<_>>(),
            vec![(9, 9), (10, 9), (9, 10), (10, 10)]
        );
    }

    #[test]
    fn footprint_floors_negative_edges() {
        let mapping = CellMapping::new(4, 4, 1.0);
        let footprint = mapping.footprint(Vec2::new(0.2, 0.5), Vec2::new(0.8, 0.2));
        assert!(footprint.covers(-1, 0));
        assert!(footprint.covers(0, 0));
        assert!(!footprint.covers(1, 0));
    }

    #[test]
    fn neighbors_follow_search_order_and_skip_blocked_cells() {
        let mapping = CellMapping::new(3, 3, 1.0);
        let mut walkable = vec![true; 9];
        walkable[mapping.index(CellCoord::new(2, 1)).expect("in range")] = false;
        let view = GridView::new(mapping, &walkable);

        let orthogonal: Vec<_> = view.neighbors(CellCoord::new(1, 1), false).collect();
        assert_eq!(
            orthogonal,
            vec![
                CellCoord::new(1, 2),
                CellCoord::new(1, 0),
                CellCoord::new(0, 1),
            ]
        );

        let all: Vec<_> = view.neighbors(CellCoord::new(1, 1), true).collect();
        assert_eq!(all.len(), 7);
        assert_eq!(all[3], CellCoord::new(2, 2));

        let corner: Vec<_> = view.neighbors(CellCoord::new(0, 0), true).collect();
        assert_eq!(
            corner,
            vec![
                CellCoord::new(0, 1),
                CellCoord::new(1, 0),
                CellCoord::new(1, 1),
            ]
        );
    }

    #[test]
    fn grid_view_treats_missing_cells_as_blocked() {
        let walkable = vec![true; 4];
        let view = GridView::new(CellMapping::new(2, 2, 1.0), &walkable);
        assert!(view.is_walkable(CellCoord::new(1, 1)));
        assert!(!view.is_walkable(CellCoord::new(2, 0)));
    }

    #[test]
    fn unit_view_orders_snapshots_by_id() {
        let mut keys: slotmap::SlotMap<UnitId, ()> = slotmap::SlotMap::with_key();
        let first = keys.insert(());
        let second = keys.insert(());
        let snapshot = |id| UnitSnapshot {
            id,
            unit_type: "warrior".to_owned(),
            position: Vec2::ZERO,
            size: Vec2::ONE,
            army: ArmyId::from("army_1"),
            formation: None,
        };

        let view = UnitView::from_snapshots(vec![snapshot(second), snapshot(first)]);
        let ids: Vec<_> = view.iter().map(|snapshot| snapshot.id).collect();
        assert_eq!(ids, vec![first, second]);
    }
}

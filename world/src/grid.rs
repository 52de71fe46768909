//! Walkable cell matrix backing route planning.

use warband_core::{CellCoord, CellMapping, GridView};

/// Fixed-size matrix of walkable flags.
#[derive(Clone, Debug)]
pub struct Grid {
    mapping: CellMapping,
    walkable: Vec<bool>,
    obstacles: usize,
}

impl Grid {
    /// Creates a grid where every cell is walkable.
    #[must_use]
    pub fn new(mapping: CellMapping) -> Self {
        Self {
            mapping,
            walkable: vec![true; mapping.cell_count()],
            obstacles: 0,
        }
    }

    /// Mapping between world space and the grid's cells.
    #[must_use]
    pub const fn mapping(&self) -> CellMapping {
        self.mapping
    }

    /// Number of columns and rows.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.mapping.columns(), self.mapping.rows())
    }

    /// Side length of one cell in world units.
    #[must_use]
    pub fn cell_size(&self) -> f32 {
        self.mapping.cell_size()
    }

    /// Reports whether the cell exists and can be traversed.
    #[must_use]
    pub fn is_walkable(&self, cell: CellCoord) -> bool {
        self.view().is_walkable(cell)
    }

    /// Number of cells currently flagged as obstacles.
    #[must_use]
    pub const fn obstacle_count(&self) -> usize {
        self.obstacles
    }

    /// Read-only view used by route planners.
    #[must_use]
    pub fn view(&self) -> GridView<'_> {
        GridView::new(self.mapping, &self.walkable)
    }

    /// Flips the walkable flag of a cell. Returns whether anything changed.
    pub(crate) fn set_obstacle(&mut self, cell: CellCoord, blocked: bool) -> bool {
        let Some(slot) = self
            .mapping
            .index(cell)
            .and_then(|index| self.walkable.get_mut(index))
        else {
            return false;
        };

        if *slot == !blocked {
            return false;
        }

        *slot = !blocked;
        if blocked {
            self.obstacles += 1;
        } else {
            self.obstacles = self.obstacles.saturating_sub(1);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggling_obstacles_tracks_count() {
        let mut grid = Grid::new(CellMapping::new(4, 4, 1.0));
        let cell = CellCoord::new(2, 3);

        assert!(grid.set_obstacle(cell, true));
        assert!(!grid.set_obstacle(cell, true));
        assert!(!grid.is_walkable(cell));
        assert_eq!(grid.obstacle_count(), 1);

        assert!(grid.set_obstacle(cell, false));
        assert!(grid.is_walkable(cell));
        assert_eq!(grid.obstacle_count(), 0);
    }

    #[test]
    fn out_of_range_obstacles_are_ignored() {
        let mut grid = Grid::new(CellMapping::new(2, 3, 0.5));
        assert_eq!(grid.dimensions(), (2, 3));
        assert_eq!(grid.cell_size(), 0.5);
        assert!(!grid.set_obstacle(CellCoord::new(5, 0), true));
        assert_eq!(grid.obstacle_count(), 0);
    }
}

//! Text rendering of the grid with a route drawn on top.

use glam::Vec2;
use warband_core::{CellCoord, GridView};

/// Draws the grid as text, highest row first.
///
/// `S` marks the first waypoint, `E` the last, `*` the ones in between,
/// `#` blocked cells and `.` everything else.
#[must_use]
pub fn render_ascii(grid: &GridView<'_>, route: &[Vec2]) -> String {
    let (columns, rows) = grid.dimensions();
    let cells: Vec<CellCoord> = route
        .iter()
        .filter_map(|point| grid.world_to_cell(*point))
        .collect();
    let start = cells.first().copied();
    let end = cells.last().copied();

    let capacity = usize::try_from(u64::from(columns + 1) * u64::from(rows)).unwrap_or(0);
    let mut output = String::with_capacity(capacity);
    for row in (0..rows).rev() {
        for column in 0..columns {
            let cell = CellCoord::new(column, row);
            let glyph = if start == Some(cell) {
                'S'
            } else if end == Some(cell) {
                'E'
            } else if cells.contains(&cell) {
                '*'
            } else if !grid.is_walkable(cell) {
                '#'
            } else {
                '.'
            };
            output.push(glyph);
        }
        output.push('\n');
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use warband_core::CellMapping;

    #[test]
    fn draws_route_over_obstacles() {
        let mapping = CellMapping::new(4, 3, 1.0);
        let mut walkable = vec![true; mapping.cell_count()];
        walkable[mapping.index(CellCoord::new(1, 1)).expect("in range")] = false;
        let grid = GridView::new(mapping, &walkable);
        let route = [
            Vec2::new(0.5, 0.5),
            Vec2::new(1.5, 0.5),
            Vec2::new(2.5, 0.5),
            Vec2::new(3.5, 1.5),
        ];

        assert_eq!(render_ascii(&grid, &route), "....\n.#.E\nS**.\n");
    }

    #[test]
    fn empty_route_draws_bare_grid() {
        let mapping = CellMapping::new(2, 2, 1.0);
        let walkable = vec![true, false, true, true];
        let grid = GridView::new(mapping, &walkable);
        assert_eq!(render_ascii(&grid, &[]), "..\n.#\n");
    }
}

//! Per-cell terrain types and the cost multiplier each type applies to
//! route steps entering it.

use std::collections::BTreeMap;

use warband_core::CellCoord;

const NEUTRAL_MULTIPLIER: f32 = 1.0;

/// Error returned when a terrain cost multiplier is zero, negative or not
/// finite.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("terrain `{terrain}` needs a positive finite cost multiplier, got {multiplier}")]
pub struct InvalidTerrainCost {
    terrain: String,
    multiplier: f32,
}

/// Terrain painted onto grid cells plus the cost table for each terrain type.
///
/// Cells without terrain, and terrain types without a cost entry, cost the
/// plain step cost.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TerrainMap {
    costs: BTreeMap<String, f32>,
    cells: BTreeMap<CellCoord, String>,
}

impl TerrainMap {
    /// Creates a map with no terrain and no costs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the multiplier applied to steps entering `terrain` cells.
    pub fn set_terrain_cost(
        &mut self,
        terrain: impl Into<String>,
        multiplier: f32,
    ) -> Result<(), InvalidTerrainCost> {
        let terrain = terrain.into();
        if !(multiplier.is_finite() && multiplier > 0.0) {
            return Err(InvalidTerrainCost {
                terrain,
                multiplier,
            });
        }
        let _ = self.costs.insert(terrain, multiplier);
        Ok(())
    }

    /// Multiplier of the terrain type, `1.0` when none was set.
    #[must_use]
    pub fn terrain_cost(&self, terrain: &str) -> f32 {
        self.costs.get(terrain).copied().unwrap_or(NEUTRAL_MULTIPLIER)
    }

    /// Assigns `terrain` to the cell, returning the terrain it replaced.
    pub fn paint(&mut self, cell: CellCoord, terrain: impl Into<String>) -> Option<String> {
        self.cells.insert(cell, terrain.into())
    }

    /// Removes the cell's terrain, returning it.
    pub fn clear(&mut self, cell: CellCoord) -> Option<String> {
        self.cells.remove(&cell)
    }

    /// Terrain assigned to the cell.
    #[must_use]
    pub fn terrain_at(&self, cell: CellCoord) -> Option<&str> {
        self.cells.get(&cell).map(String::as_str)
    }

    /// Multiplier applied to a step entering the cell.
    #[must_use]
    pub fn multiplier_at(&self, cell: CellCoord) -> f32 {
        self.terrain_at(cell)
            .map_or(NEUTRAL_MULTIPLIER, |terrain| self.terrain_cost(terrain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpainted_and_unpriced_cells_are_neutral() {
        let mut terrain = TerrainMap::new();
        let cell = CellCoord::new(2, 1);
        assert_eq!(terrain.multiplier_at(cell), 1.0);

        assert_eq!(terrain.paint(cell, "forest"), None);
        assert_eq!(terrain.multiplier_at(cell), 1.0);

        terrain.set_terrain_cost("forest", 2.5).expect("valid cost");
        assert_eq!(terrain.multiplier_at(cell), 2.5);
        assert_eq!(terrain.paint(cell, "road").as_deref(), Some("forest"));
        assert_eq!(terrain.multiplier_at(cell), 1.0);
        assert_eq!(terrain.clear(cell).as_deref(), Some("road"));
        assert_eq!(terrain.terrain_at(cell), None);
    }

    #[test]
    fn degenerate_costs_are_rejected() {
        let mut terrain = TerrainMap::new();
        for multiplier in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            assert!(terrain.set_terrain_cost("marsh", multiplier).is_err());
        }
        assert_eq!(terrain.terrain_cost("marsh"), 1.0);
    }
}

//! Rasterized occupancy index used to keep unit footprints apart.

use std::{
    collections::{HashMap, HashSet},
    f32::consts::TAU,
};

use glam::Vec2;
use rand::Rng;
use warband_core::{CellCoord, CellMapping, Footprint, UnitId};

/// Occupancy of grid cells by unit footprints and static obstacles.
///
/// Cells are reference counted so overlapping registrations release
/// correctly. Cells outside the grid always count as blocked.
#[derive(Clone, Debug)]
pub struct CollisionIndex {
    mapping: CellMapping,
    search_radius: f32,
    occupied: HashMap<CellCoord, u32>,
    blocked: HashSet<CellCoord>,
    registered: HashMap<UnitId, Footprint>,
}

impl CollisionIndex {
    /// Creates an empty index over the mapped grid.
    #[must_use]
    pub fn new(mapping: CellMapping, search_radius: f32) -> Self {
        Self {
            mapping,
            search_radius,
            occupied: HashMap::new(),
            blocked: HashSet::new(),
            registered: HashMap::new(),
        }
    }

    /// Radius sampled by [`CollisionIndex::find_free_nearby`].
    #[must_use]
    pub const fn search_radius(&self) -> f32 {
        self.search_radius
    }

    /// Registers the footprint of a unit, replacing any earlier registration.
    pub fn add(&mut self, unit: UnitId, position: Vec2, size: Vec2) {
        let _ = self.remove(unit);

        let footprint = self.mapping.footprint(position, size);
        for (column, row) in footprint.cells() {
            if let Some(cell) = self.mapping.cell_at(column, row) {
                *self.occupied.entry(cell).or_insert(0) += 1;
            }
        }
        let _ = self.registered.insert(unit, footprint);
    }

    /// Releases exactly the cells remembered for the unit.
    ///
    /// Returns `false` when the unit held no registration.
    pub fn remove(&mut self, unit: UnitId) -> bool {
        let Some(footprint) = self.registered.remove(&unit) else {
            return false;
        };

        for (column, row) in footprint.cells() {
            let Some(cell) = self.mapping.cell_at(column, row) else {
                continue;
            };
            if let Some(count) = self.occupied.get_mut(&cell) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    let _ = self.occupied.remove(&cell);
                }
            }
        }
        true
    }

    /// Reports whether a footprint at `position` would touch anything.
    #[must_use]
    pub fn check(&self, position: Vec2, size: Vec2) -> bool {
        self.collides(position, size, None)
    }

    /// Like [`CollisionIndex::check`] but ignores the unit's own registration.
    #[must_use]
    pub fn check_excluding(&self, position: Vec2, size: Vec2, unit: UnitId) -> bool {
        self.collides(position, size, self.registered.get(&unit))
    }

    fn collides(&self, position: Vec2, size: Vec2, own: Option<&Footprint>) -> bool {
        self.mapping
            .footprint(position, size)
            .cells()
            .any(|(column, row)| {
                let Some(cell) = self.mapping.cell_at(column, row) else {
                    return true;
                };
                if self.blocked.contains(&cell) {
                    return true;
                }
                let count = self.occupied.get(&cell).copied().unwrap_or(0);
                let own_share = own.map_or(0, |footprint| u32::from(footprint.covers(column, row)));
                count > own_share
            })
    }

    /// Samples up to `max_attempts` points around `center` and returns the
    /// first one whose footprint is free.
    pub fn find_free_nearby<R: Rng + ?Sized>(
        &self,
        center: Vec2,
        size: Vec2,
        max_attempts: u32,
        rng: &mut R,
    ) -> Option<Vec2> {
        for _ in 0..max_attempts {
            let angle = rng.gen_range(0.0..TAU);
            let distance = if self.search_radius > 0.0 {
                rng.gen_range(0.0..self.search_radius)
            } else {
                0.0
            };
            let candidate = center + Vec2::from_angle(angle) * distance;
            if !self.check(candidate, size) {
                return Some(candidate);
            }
        }
        None
    }

    /// Marks a cell as permanently blocked or clears the mark.
    pub fn set_blocked(&mut self, cell: CellCoord, blocked: bool) {
        if !self.mapping.contains(cell) {
            return;
        }
        let _ = if blocked {
            self.blocked.insert(cell)
        } else {
            self.blocked.remove(&cell)
        };
    }

    /// Reports whether the unit currently holds a registration.
    #[must_use]
    pub fn is_registered(&self, unit: UnitId) -> bool {
        self.registered.contains_key(&unit)
    }

    /// Rasterized bounds remembered for the unit.
    #[must_use]
    pub fn footprint_of(&self, unit: UnitId) -> Option<Footprint> {
        self.registered.get(&unit).copied()
    }

    /// Occupied cells with their reference counts, sorted by cell.
    #[must_use]
    pub fn occupied_cells(&self) -> Vec<(CellCoord, u32)> {
        let mut cells: Vec<_> = self
            .occupied
            .iter()
            .map(|(cell, count)| (*cell, *count))
            .collect();
        cells.sort_unstable();
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use slotmap::SlotMap;

    fn ids(count: usize) -> Vec<UnitId> {
        let mut keys: SlotMap<UnitId, ()> = SlotMap::with_key();
        (0..count).map(|_| keys.insert(())).collect()
    }

    fn index() -> CollisionIndex {
        CollisionIndex::new(CellMapping::new(10, 10, 1.0), 5.0)
    }

    #[test]
    fn add_then_remove_restores_occupancy() {
        let units = ids(2);
        let mut index = index();
        index.add(units[0], Vec2::new(2.5, 2.5), Vec2::ONE);
        let before = index.occupied_cells();

        index.add(units[1], Vec2::new(3.0, 3.0), Vec2::ONE);
        assert_eq!(
            index.occupied_cells().iter().find(|(cell, _)| *cell == CellCoord::new(2, 2)),
            Some(&(CellCoord::new(2, 2), 2))
        );

        assert!(index.remove(units[1]));
        assert_eq!(index.occupied_cells(), before);
        assert!(!index.remove(units[1]));
    }

    #[test]
    fn re_adding_replaces_previous_registration() {
        let units = ids(1);
        let mut index = index();
        index.add(units[0], Vec2::new(1.5, 1.5), Vec2::ONE);
        index.add(units[0], Vec2::new(6.5, 6.5), Vec2::ONE);
        assert_eq!(index.occupied_cells(), vec![(CellCoord::new(6, 6), 1)]);
    }

    #[test]
    fn check_sees_units_obstacles_and_grid_edges() {
        let units = ids(1);
        let mut index = index();
        index.add(units[0], Vec2::new(4.5, 4.5), Vec2::ONE);
        index.set_blocked(CellCoord::new(7, 7), true);

        assert!(index.check(Vec2::new(4.5, 4.5), Vec2::splat(0.5)));
        assert!(index.check(Vec2::new(7.5, 7.5), Vec2::splat(0.5)));
        assert!(index.check(Vec2::new(0.1, 5.5), Vec2::splat(0.5)));
        assert!(!index.check(Vec2::new(1.5, 1.5), Vec2::ONE));

        index.set_blocked(CellCoord::new(7, 7), false);
        assert!(!index.check(Vec2::new(7.5, 7.5), Vec2::splat(0.5)));
    }

    #[test]
    fn check_excluding_ignores_only_own_footprint() {
        let units = ids(2);
        let mut index = index();
        index.add(units[0], Vec2::new(4.5, 4.5), Vec2::ONE);
        assert!(!index.check_excluding(Vec2::new(4.7, 4.5), Vec2::splat(0.2), units[0]));

        index.add(units[1], Vec2::new(4.5, 4.5), Vec2::ONE);
        assert!(index.check_excluding(Vec2::new(4.7, 4.5), Vec2::splat(0.2), units[0]));
    }

    #[test]
    fn find_free_nearby_returns_unoccupied_point() {
        let units = ids(1);
        let mut index = index();
        index.add(units[0], Vec2::new(5.0, 5.0), Vec2::splat(2.0));
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        let found = index
            .find_free_nearby(Vec2::new(5.0, 5.0), Vec2::ONE, 100, &mut rng)
            .expect("free point within radius");
        assert!(!index.check(found, Vec2::ONE));
        assert!(found.distance(Vec2::new(5.0, 5.0)) < 5.0);
    }

    #[test]
    fn find_free_nearby_gives_up_when_everything_is_taken() {
        let mut index = CollisionIndex::new(CellMapping::new(1, 1, 1.0), 3.0);
        index.set_blocked(CellCoord::new(0, 0), true);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(
            index.find_free_nearby(Vec2::splat(0.5), Vec2::splat(0.1), 50, &mut rng),
            None
        );
    }

    proptest::proptest! {
        #[test]
        fn removing_a_footprint_restores_occupancy(
            placed in proptest::collection::vec((0.0f32..10.0, 0.0f32..10.0, 0.1f32..3.0), 0..6),
            extra in (0.0f32..10.0, 0.0f32..10.0, 0.1f32..3.0),
        ) {
            let units = ids(placed.len() + 1);
            let mut index = index();
            for (unit, (x, y, side)) in units.iter().zip(&placed) {
                index.add(*unit, Vec2::new(*x, *y), Vec2::splat(*side));
            }
            let before = index.occupied_cells();

            let newcomer = units[placed.len()];
            index.add(newcomer, Vec2::new(extra.0, extra.1), Vec2::splat(extra.2));
            proptest::prop_assert!(index.remove(newcomer));
            proptest::prop_assert_eq!(index.occupied_cells(), before);
        }
    }
}

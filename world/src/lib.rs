#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state for the Warband simulation.
//!
//! The world owns the walkable grid, the collision index, and the unit and
//! formation arenas. Every mutation goes through a method on [`World`] that
//! keeps the collision index in step with unit positions and reports what
//! happened as [`Event`] values. Systems read state through [`query`].

mod collision;
mod formation;
mod grid;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use slotmap::SlotMap;
use warband_core::{
    ArmyId, CellCoord, CellMapping, Event, FormationId, FormationKind, FormationLayout,
    PlacementError, UnitCatalog, UnitId, UnitStats,
};

pub use collision::CollisionIndex;
pub use formation::Formation;
pub use grid::Grid;

const DEFAULT_PLACEMENT_SEED: u64 = 0x5eed_a11c_e0f0_2b1d;
const DEFAULT_SEARCH_RADIUS: f32 = 5.0;
const DEFAULT_MAX_ATTEMPTS: u32 = 100;

const DEFAULT_GRID_COLUMNS: u32 = 64;
const DEFAULT_GRID_ROWS: u32 = 64;
const DEFAULT_CELL_SIZE: f32 = 1.0;

/// Tuning for free-position searches.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacementConfig {
    /// Radius sampled around a requested point when it is occupied.
    pub search_radius: f32,
    /// Samples drawn per search before giving up.
    pub max_attempts: u32,
    /// Seed of the generator that drives every randomized placement.
    pub seed: u64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            search_radius: DEFAULT_SEARCH_RADIUS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            seed: DEFAULT_PLACEMENT_SEED,
        }
    }
}

/// Dimensions of the world and placement tuning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldConfig {
    /// Number of grid columns.
    pub columns: u32,
    /// Number of grid rows.
    pub rows: u32,
    /// Side length of one cell in world units.
    pub cell_size: f32,
    /// Free-position search tuning.
    pub placement: PlacementConfig,
}

impl WorldConfig {
    /// Configuration for a grid of the given size with default placement tuning.
    #[must_use]
    pub fn new(columns: u32, rows: u32, cell_size: f32) -> Self {
        Self {
            columns,
            rows,
            cell_size,
            placement: PlacementConfig::default(),
        }
    }

    /// Overrides the placement tuning.
    #[must_use]
    pub fn with_placement(mut self, placement: PlacementConfig) -> Self {
        self.placement = placement;
        self
    }

    fn mapping(&self) -> CellMapping {
        CellMapping::new(self.columns, self.rows, self.cell_size)
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self::new(DEFAULT_GRID_COLUMNS, DEFAULT_GRID_ROWS, DEFAULT_CELL_SIZE)
    }
}

/// A single agent placed in the world.
#[derive(Clone, Debug)]
pub struct Unit {
    unit_type: String,
    position: Vec2,
    stats: UnitStats,
    army: ArmyId,
}

impl Unit {
    /// Catalog key the unit was created from.
    #[must_use]
    pub fn unit_type(&self) -> &str {
        &self.unit_type
    }

    /// World-space position of the unit center.
    #[must_use]
    pub const fn position(&self) -> Vec2 {
        self.position
    }

    /// Width and height of the unit footprint.
    #[must_use]
    pub const fn size(&self) -> Vec2 {
        self.stats.size
    }

    /// Travel speed in world units per second.
    #[must_use]
    pub const fn speed(&self) -> f32 {
        self.stats.speed
    }

    /// Full stats copied from the catalog at creation.
    #[must_use]
    pub const fn stats(&self) -> &UnitStats {
        &self.stats
    }

    /// Army the unit fights for.
    #[must_use]
    pub const fn army(&self) -> &ArmyId {
        &self.army
    }
}

/// Represents the authoritative Warband world state.
#[derive(Debug)]
pub struct World {
    grid: Grid,
    collision: CollisionIndex,
    units: SlotMap<UnitId, Unit>,
    formations: SlotMap<FormationId, Formation>,
    catalog: UnitCatalog,
    placement: PlacementConfig,
    rng: ChaCha8Rng,
}

impl World {
    /// Creates an empty world backed by the provided unit catalog.
    #[must_use]
    pub fn new(config: WorldConfig, catalog: UnitCatalog) -> Self {
        let mapping = config.mapping();
        Self {
            grid: Grid::new(mapping),
            collision: CollisionIndex::new(mapping, config.placement.search_radius),
            units: SlotMap::with_key(),
            formations: SlotMap::with_key(),
            catalog,
            placement: config.placement,
            rng: ChaCha8Rng::seed_from_u64(config.placement.seed),
        }
    }

    /// Marks a cell as an obstacle or clears it. Out-of-range cells are ignored.
    pub fn set_obstacle(&mut self, cell: CellCoord, blocked: bool, out: &mut Vec<Event>) {
        if !self.grid.set_obstacle(cell, blocked) {
            return;
        }
        self.collision.set_blocked(cell, blocked);
        out.push(Event::ObstacleChanged { cell, blocked });
    }

    /// Creates a unit of a catalog type at `position`.
    ///
    /// When the footprint collides, one free-position search around the
    /// requested point is attempted before giving up.
    pub fn create_unit(
        &mut self,
        unit_type: &str,
        position: Vec2,
        army: &ArmyId,
        formation: Option<FormationId>,
        out: &mut Vec<Event>,
    ) -> Result<UnitId, PlacementError> {
        let stats = self
            .catalog
            .get(unit_type)
            .cloned()
            .ok_or_else(|| PlacementError::UnknownUnitType(unit_type.to_owned()))?;
        if let Some(formation) = formation {
            if !self.formations.contains_key(formation) {
                return Err(PlacementError::UnknownFormation);
            }
        }

        let position = if self.collision.check(position, stats.size) {
            let Some(alternative) = self.find_free_nearby(position, stats.size) else {
                log::debug!("no free position for {unit_type} near {position}");
                return Err(PlacementError::NoFreePosition);
            };
            log::trace!("{unit_type} moved from {position} to free spot {alternative}");
            alternative
        } else {
            position
        };

        let size = stats.size;
        let unit = self.units.insert(Unit {
            unit_type: unit_type.to_owned(),
            position,
            stats,
            army: army.clone(),
        });
        self.collision.add(unit, position, size);
        if let Some(record) = formation.and_then(|id| self.formations.get_mut(id)) {
            record.push_member(unit);
        }

        out.push(Event::UnitPlaced { unit, position });
        Ok(unit)
    }

    /// Creates an empty formation record. Names must be unique.
    pub fn create_formation(
        &mut self,
        name: &str,
        kind: FormationKind,
        center: Vec2,
        spacing: f32,
        rotation: f32,
        out: &mut Vec<Event>,
    ) -> Result<FormationId, PlacementError> {
        if query::formation_by_name(self, name).is_some() {
            return Err(PlacementError::DuplicateFormationName(name.to_owned()));
        }

        let layout = FormationLayout::new(kind, center, spacing)
            .with_rotation(rotation)
            .with_seed(self.rng.gen());
        let formation = self
            .formations
            .insert(Formation::new(name.to_owned(), layout));
        out.push(Event::FormationCreated { formation });
        Ok(formation)
    }

    /// Dissolves a formation record. Its units stay in the world.
    pub fn disband_formation(
        &mut self,
        formation: FormationId,
        out: &mut Vec<Event>,
    ) -> Result<Vec<UnitId>, PlacementError> {
        let record = self
            .formations
            .remove(formation)
            .ok_or(PlacementError::UnknownFormation)?;
        out.push(Event::FormationDisbanded { formation });
        Ok(record.members().to_vec())
    }

    /// Creates one unit per slot of the formation's layout.
    ///
    /// Slots without a free position are skipped.
    pub fn place_units_in_formation(
        &mut self,
        formation: FormationId,
        unit_type: &str,
        count: usize,
        army: &ArmyId,
        out: &mut Vec<Event>,
    ) -> Result<Vec<UnitId>, PlacementError> {
        let slots = self.formation_slots(formation, count)?;
        self.place_units_at(formation, unit_type, &slots, army, out)
    }

    /// Creates one unit at each of the given slots, adding them to the formation.
    ///
    /// Slots without a free position are skipped.
    pub fn place_units_at(
        &mut self,
        formation: FormationId,
        unit_type: &str,
        slots: &[Vec2],
        army: &ArmyId,
        out: &mut Vec<Event>,
    ) -> Result<Vec<UnitId>, PlacementError> {
        if self.catalog.get(unit_type).is_none() {
            return Err(PlacementError::UnknownUnitType(unit_type.to_owned()));
        }
        if !self.formations.contains_key(formation) {
            return Err(PlacementError::UnknownFormation);
        }

        let mut placed = Vec::with_capacity(slots.len());
        for &slot in slots {
            match self.create_unit(unit_type, slot, army, Some(formation), out) {
                Ok(unit) => placed.push(unit),
                Err(PlacementError::NoFreePosition) => {
                    log::debug!("skipping formation slot at {slot}");
                }
                Err(error) => return Err(error),
            }
        }
        Ok(placed)
    }

    /// Slot positions the formation's layout produces for `count` members.
    pub fn formation_slots(
        &self,
        formation: FormationId,
        count: usize,
    ) -> Result<Vec<Vec2>, PlacementError> {
        self.formations
            .get(formation)
            .map(|record| record.layout().positions(count))
            .ok_or(PlacementError::UnknownFormation)
    }

    /// Translates a formation and every member by the same offset.
    ///
    /// Members whose translated spot is taken try a free-position search.
    /// A member that finds nothing keeps its old position but holds no
    /// footprint until it is moved again.
    pub fn move_formation(
        &mut self,
        formation: FormationId,
        new_center: Vec2,
        out: &mut Vec<Event>,
    ) -> Result<(), PlacementError> {
        let record = self
            .formations
            .get_mut(formation)
            .ok_or(PlacementError::UnknownFormation)?;
        let offset = new_center - record.center();
        record.set_center(new_center);
        let members = record.members().to_vec();

        for member in members {
            let Some((from, size)) = self.units.get(member).map(|unit| (unit.position, unit.size()))
            else {
                continue;
            };
            let _ = self.collision.remove(member);

            let translated = from + offset;
            let destination = if self.collision.check(translated, size) {
                self.find_free_nearby(translated, size)
            } else {
                Some(translated)
            };

            let Some(to) = destination else {
                log::warn!("formation member {member:?} has no free spot near {translated}");
                out.push(Event::FootprintLost { unit: member });
                continue;
            };

            if let Some(unit) = self.units.get_mut(member) {
                unit.position = to;
            }
            self.collision.add(member, to, size);
            out.push(Event::UnitRelocated {
                unit: member,
                from,
                to,
            });
        }

        out.push(Event::FormationMoved {
            formation,
            center: new_center,
        });
        Ok(())
    }

    /// Destroys a unit, releasing its footprint and formation slot.
    pub fn remove_unit(&mut self, unit: UnitId, out: &mut Vec<Event>) -> Result<(), PlacementError> {
        let _ = self
            .units
            .remove(unit)
            .ok_or(PlacementError::UnknownUnit)?;
        let _ = self.collision.remove(unit);
        for (_, formation) in self.formations.iter_mut() {
            let _ = formation.remove_member(unit);
        }
        out.push(Event::UnitRemoved { unit });
        Ok(())
    }

    /// Teleports a unit and re-registers its footprint without a collision check.
    pub fn relocate_unit(
        &mut self,
        unit: UnitId,
        position: Vec2,
        out: &mut Vec<Event>,
    ) -> Result<(), PlacementError> {
        let from = self.reposition(unit, position)?;
        out.push(Event::UnitRelocated {
            unit,
            from,
            to: position,
        });
        Ok(())
    }

    /// Moves a unit by one steering step and re-registers its footprint.
    ///
    /// Callers are expected to have checked the destination already.
    pub fn step_unit(
        &mut self,
        unit: UnitId,
        position: Vec2,
        out: &mut Vec<Event>,
    ) -> Result<(), PlacementError> {
        let from = self.reposition(unit, position)?;
        out.push(Event::UnitAdvanced {
            unit,
            from,
            to: position,
        });
        Ok(())
    }

    fn reposition(&mut self, unit: UnitId, position: Vec2) -> Result<Vec2, PlacementError> {
        let record = self.units.get_mut(unit).ok_or(PlacementError::UnknownUnit)?;
        let from = record.position;
        record.position = position;
        let size = record.size();
        let _ = self.collision.remove(unit);
        self.collision.add(unit, position, size);
        Ok(from)
    }

    /// Reports whether a footprint of `size` fits at `position`.
    #[must_use]
    pub fn validate_placement(&self, position: Vec2, size: Vec2) -> bool {
        !self.collision.check(position, size)
    }

    /// Runs up to `count` independent free-position searches around `center`.
    pub fn placement_suggestions(&mut self, center: Vec2, size: Vec2, count: usize) -> Vec<Vec2> {
        (0..count)
            .filter_map(|_| self.find_free_nearby(center, size))
            .collect()
    }

    /// Samples the configured radius around `center` for a free footprint.
    pub fn find_free_nearby(&mut self, center: Vec2, size: Vec2) -> Option<Vec2> {
        self.collision
            .find_free_nearby(center, size, self.placement.max_attempts, &mut self.rng)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default(), UnitCatalog::standard())
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use glam::Vec2;
    use warband_core::{
        ArmyId, FormationId, GridView, UnitCatalog, UnitId, UnitSnapshot, UnitView,
    };

    use super::{CollisionIndex, Formation, Grid, PlacementConfig, Unit, World};

    /// Provides read-only access to the walkable grid.
    #[must_use]
    pub fn grid(world: &World) -> &Grid {
        &world.grid
    }

    /// Captures a read-only view of the walkable flags for route planning.
    #[must_use]
    pub fn grid_view(world: &World) -> GridView<'_> {
        world.grid.view()
    }

    /// Provides read-only access to the collision index.
    #[must_use]
    pub fn collision(world: &World) -> &CollisionIndex {
        &world.collision
    }

    /// Catalog the world creates units from.
    #[must_use]
    pub fn catalog(world: &World) -> &UnitCatalog {
        &world.catalog
    }

    /// Placement tuning the world was created with.
    #[must_use]
    pub fn placement_config(world: &World) -> PlacementConfig {
        world.placement
    }

    /// Looks up a unit by handle.
    #[must_use]
    pub fn unit(world: &World, unit: UnitId) -> Option<&Unit> {
        world.units.get(unit)
    }

    /// Current position of a unit, polled by renderers once per frame.
    #[must_use]
    pub fn unit_position(world: &World, unit: UnitId) -> Option<Vec2> {
        world.units.get(unit).map(Unit::position)
    }

    /// Number of units alive in the world.
    #[must_use]
    pub fn unit_count(world: &World) -> usize {
        world.units.len()
    }

    /// Looks up a formation by handle.
    #[must_use]
    pub fn formation(world: &World, formation: FormationId) -> Option<&Formation> {
        world.formations.get(formation)
    }

    /// Finds the formation registered under `name`.
    #[must_use]
    pub fn formation_by_name(world: &World, name: &str) -> Option<FormationId> {
        world
            .formations
            .iter()
            .find(|(_, formation)| formation.name() == name)
            .map(|(id, _)| id)
    }

    /// Handles of every formation in creation-slot order.
    #[must_use]
    pub fn formation_ids(world: &World) -> Vec<FormationId> {
        world.formations.keys().collect()
    }

    /// Formation that lists the unit as a member.
    #[must_use]
    pub fn formation_of(world: &World, unit: UnitId) -> Option<FormationId> {
        world
            .formations
            .iter()
            .find(|(_, formation)| formation.contains(unit))
            .map(|(id, _)| id)
    }

    /// Members of a formation in slot order. Unknown formations have none.
    #[must_use]
    pub fn formation_units(world: &World, formation: FormationId) -> Vec<UnitId> {
        world
            .formations
            .get(formation)
            .map(|record| record.members().to_vec())
            .unwrap_or_default()
    }

    /// Units whose center lies inside the inclusive rectangle.
    #[must_use]
    pub fn units_in_area(world: &World, min: Vec2, max: Vec2) -> Vec<UnitId> {
        world
            .units
            .iter()
            .filter(|(_, unit)| {
                let position = unit.position;
                position.cmpge(min).all() && position.cmple(max).all()
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Units fighting for the army.
    #[must_use]
    pub fn units_by_army(world: &World, army: &ArmyId) -> Vec<UnitId> {
        world
            .units
            .iter()
            .filter(|(_, unit)| unit.army == *army)
            .map(|(id, _)| id)
            .collect()
    }

    /// Reports whether the unit's footprint would collide at `position`,
    /// ignoring the unit's own registration. Unknown units always collide.
    #[must_use]
    pub fn footprint_blocked(world: &World, unit: UnitId, position: Vec2) -> bool {
        world.units.get(unit).map_or(true, |record| {
            world
                .collision
                .check_excluding(position, record.size(), unit)
        })
    }

    /// Walkable flags in row-major order with every cell held by another
    /// unit's footprint cleared. Cells held only by `unit` stay walkable.
    #[must_use]
    pub fn walkable_around(world: &World, unit: UnitId) -> Vec<bool> {
        let view = world.grid.view();
        let mapping = view.mapping();
        let mut walkable: Vec<bool> = (0..mapping.cell_count())
            .map(|index| {
                mapping
                    .cell_at_index(index)
                    .map_or(false, |cell| view.is_walkable(cell))
            })
            .collect();

        let own = world.collision.footprint_of(unit);
        for (cell, count) in world.collision.occupied_cells() {
            let own_share = own.map_or(false, |footprint| {
                footprint.covers(i64::from(cell.column()), i64::from(cell.row()))
            });
            if count <= u32::from(own_share) {
                continue;
            }
            if let Some(flag) = mapping.index(cell).and_then(|index| walkable.get_mut(index)) {
                *flag = false;
            }
        }
        walkable
    }

    /// Captures a read-only snapshot of every unit for instancing.
    #[must_use]
    pub fn unit_view(world: &World) -> UnitView {
        let snapshots = world
            .units
            .iter()
            .map(|(id, unit)| UnitSnapshot {
                id,
                unit_type: unit.unit_type.clone(),
                position: unit.position,
                size: unit.size(),
                army: unit.army.clone(),
                formation: formation_of(world, id),
            })
            .collect();
        UnitView::from_snapshots(snapshots)
    }
}

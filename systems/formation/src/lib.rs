#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Formation-level orders layered on top of the movement controller.
//!
//! The controller creates mixed formations, walks a formation's center along
//! an A* route one waypoint at a time, and sends stragglers back to their
//! slots.

use std::collections::{BTreeMap, VecDeque};

use glam::Vec2;
use warband_core::{ArmyId, CommandError, Event, FormationId, FormationKind, PlacementError};
use warband_system_movement::MovementController;
use warband_system_pathfinding::{Pathfinder, SearchAlgorithm};
use warband_world::{query, World};

const DEFAULT_SLOT_TOLERANCE: f32 = 0.5;
const NAME_PREFIX: &str = "formation";

/// Issues formation-wide orders and feeds queued center waypoints to the
/// movement controller.
#[derive(Debug)]
pub struct FormationController {
    pathfinder: Pathfinder,
    slot_tolerance: f32,
    plans: BTreeMap<FormationId, VecDeque<Vec2>>,
    next_name: u64,
}

impl FormationController {
    /// Creates a controller that reissues members farther than
    /// `slot_tolerance` from their slot.
    #[must_use]
    pub fn new(slot_tolerance: f32) -> Self {
        Self {
            pathfinder: Pathfinder::new(),
            slot_tolerance,
            plans: BTreeMap::new(),
            next_name: 1,
        }
    }

    /// Distance from its slot at which a member is sent back.
    #[must_use]
    pub const fn slot_tolerance(&self) -> f32 {
        self.slot_tolerance
    }

    /// Creates a formation under a generated name and fills it with each
    /// group of units in turn.
    ///
    /// Slots are shared across groups in order. Returns `None`, leaving no
    /// formation behind, when not a single unit could be placed.
    pub fn create_formation_at(
        &mut self,
        world: &mut World,
        kind: FormationKind,
        center: Vec2,
        groups: &[(&str, usize)],
        army: &ArmyId,
        spacing: f32,
        out: &mut Vec<Event>,
    ) -> Result<Option<FormationId>, PlacementError> {
        for (unit_type, _) in groups {
            if query::catalog(world).get(unit_type).is_none() {
                return Err(PlacementError::UnknownUnitType((*unit_type).to_owned()));
            }
        }

        let name = self.generate_name(world);
        let formation = world.create_formation(&name, kind, center, spacing, 0.0, out)?;
        let total: usize = groups.iter().map(|(_, count)| count).sum();
        let slots = world.formation_slots(formation, total)?;

        let mut placed = 0;
        let mut offset = 0;
        for (unit_type, count) in groups {
            let end = (offset + count).min(slots.len());
            let group_slots = slots.get(offset..end).unwrap_or_default();
            placed += world
                .place_units_at(formation, unit_type, group_slots, army, out)?
                .len();
            offset = end;
        }

        if placed == 0 {
            log::debug!("{name} placed no units at {center}; disbanding");
            let _ = world.disband_formation(formation, out)?;
            return Ok(None);
        }
        log::debug!("{name} created with {placed} of {total} units");
        Ok(Some(formation))
    }

    fn generate_name(&mut self, world: &World) -> String {
        loop {
            let name = format!("{NAME_PREFIX}_{}", self.next_name);
            self.next_name += 1;
            if query::formation_by_name(world, &name).is_none() {
                return name;
            }
        }
    }

    /// Plans an A* route for the formation center and queues its waypoints.
    ///
    /// Any queued route for the formation is replaced. Returns the number of
    /// queued waypoints.
    pub fn move_formation_with_pathfinding(
        &mut self,
        world: &World,
        formation: FormationId,
        target: Vec2,
    ) -> Result<usize, CommandError> {
        let center = query::formation(world, formation)
            .ok_or(CommandError::UnknownFormation)?
            .center();
        let route = self.pathfinder.plan(
            &query::grid_view(world),
            center,
            target,
            SearchAlgorithm::AStar,
        )?;

        let mut waypoints: VecDeque<Vec2> = route.into_waypoints().into_iter().skip(1).collect();
        match waypoints.back_mut() {
            Some(last) => *last = target,
            None => waypoints.push_back(target),
        }
        let queued = waypoints.len();
        let _ = self.plans.insert(formation, waypoints);
        Ok(queued)
    }

    /// Waypoints still queued for the formation.
    #[must_use]
    pub fn pending_waypoints(&self, formation: FormationId) -> usize {
        self.plans.get(&formation).map_or(0, VecDeque::len)
    }

    /// Drops the formation's queued route. Returns whether one was queued.
    pub fn cancel(&mut self, formation: FormationId) -> bool {
        self.plans.remove(&formation).is_some()
    }

    /// Moves every formation with a queued route to its next waypoint once
    /// none of its members is still moving or forming.
    pub fn update(
        &mut self,
        world: &mut World,
        movement: &mut MovementController,
        out: &mut Vec<Event>,
    ) {
        let planned: Vec<FormationId> = self.plans.keys().copied().collect();
        for formation in planned {
            if query::formation(world, formation).is_none() {
                log::debug!("dropping route of disbanded formation {formation:?}");
                let _ = self.plans.remove(&formation);
                continue;
            }
            let busy = query::formation_units(world, formation)
                .into_iter()
                .any(|member| movement.is_moving(member));
            if busy {
                continue;
            }

            let Some(queue) = self.plans.get_mut(&formation) else {
                continue;
            };
            let Some(waypoint) = queue.pop_front() else {
                let _ = self.plans.remove(&formation);
                continue;
            };
            let finished = queue.is_empty();

            if let Err(error) = movement.move_formation_to(world, formation, waypoint, out) {
                log::debug!("formation {formation:?} route abandoned: {error}");
                let _ = self.plans.remove(&formation);
                continue;
            }
            if finished {
                let _ = self.plans.remove(&formation);
            }
        }
    }

    /// Sends every member farther than the slot tolerance back to its slot.
    ///
    /// Returns how many members were given a new route. Members without a
    /// route to their slot are left alone.
    pub fn maintain_formation(
        &self,
        world: &World,
        movement: &mut MovementController,
        formation: FormationId,
    ) -> Result<usize, CommandError> {
        let record = query::formation(world, formation).ok_or(CommandError::UnknownFormation)?;
        let mut reissued = 0;
        for (member, slot) in record.members().iter().zip(record.slots()) {
            let Some(position) = query::unit_position(world, *member) else {
                continue;
            };
            if position.distance(slot) <= self.slot_tolerance {
                continue;
            }
            match movement.move_unit_to(world, *member, slot) {
                Ok(()) => reissued += 1,
                Err(error) => log::debug!("{member:?} cannot return to slot {slot}: {error}"),
            }
        }
        Ok(reissued)
    }
}

impl Default for FormationController {
    fn default() -> Self {
        Self::new(DEFAULT_SLOT_TOLERANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_skip_taken_ones() {
        let mut world = World::default();
        let mut events = Vec::new();
        let _ = world
            .create_formation("formation_1", FormationKind::Line, Vec2::ONE, 1.0, 0.0, &mut events)
            .expect("formation");
        let mut controller = FormationController::default();

        assert_eq!(controller.generate_name(&world), "formation_2");
        assert_eq!(controller.generate_name(&world), "formation_3");
    }

    #[test]
    fn unknown_formation_is_rejected() {
        let mut world = World::default();
        let mut events = Vec::new();
        let formation = world
            .create_formation("f", FormationKind::Circle, Vec2::splat(8.0), 2.0, 0.0, &mut events)
            .expect("formation");
        let _ = world.disband_formation(formation, &mut events).expect("disband");

        let mut controller = FormationController::default();
        let mut movement = MovementController::default();
        assert_eq!(
            controller.move_formation_with_pathfinding(&world, formation, Vec2::ONE),
            Err(CommandError::UnknownFormation)
        );
        assert_eq!(
            controller.maintain_formation(&world, &mut movement, formation),
            Err(CommandError::UnknownFormation)
        );
    }
}

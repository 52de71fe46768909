use std::time::Duration;

use glam::Vec2;
use warband_core::{
    ArmyId, CellCoord, CommandError, Event, FormationKind, MovementState, PlacementError,
    RouteError, UnitCatalog,
};
use warband_system_formation::FormationController;
use warband_system_movement::{FormingAnchor, MovementConfig, MovementController};
use warband_world::{query, World, WorldConfig};

const TICK: Duration = Duration::from_millis(50);

fn world(columns: u32, rows: u32) -> World {
    World::new(WorldConfig::new(columns, rows, 1.0), UnitCatalog::standard())
}

fn slot_anchored() -> MovementController {
    MovementController::new(MovementConfig {
        forming_anchor: FormingAnchor::Slot,
        ..MovementConfig::default()
    })
}

#[test]
fn mixed_groups_fill_slots_in_order() {
    let mut world = world(20, 20);
    let mut events = Vec::new();
    let mut controller = FormationController::default();

    let formation = controller
        .create_formation_at(
            &mut world,
            FormationKind::Line,
            Vec2::new(10.5, 10.5),
            &[("warrior", 3), ("archer", 2)],
            &ArmyId::from("red"),
            2.0,
            &mut events,
        )
        .expect("known unit types")
        .expect("open ground has room");

    let record = query::formation(&world, formation).expect("formation exists");
    assert_eq!(record.name(), "formation_1");

    let members = query::formation_units(&world, formation);
    let types: Vec<&str> = members
        .iter()
        .map(|member| query::unit(&world, *member).expect("member exists").unit_type())
        .collect();
    assert_eq!(types, ["warrior", "warrior", "warrior", "archer", "archer"]);

    for (member, slot) in members.iter().zip(record.slots()) {
        assert_eq!(query::unit_position(&world, *member), Some(slot));
    }
}

#[test]
fn unknown_group_type_creates_nothing() {
    let mut world = world(20, 20);
    let mut events = Vec::new();
    let mut controller = FormationController::default();

    let result = controller.create_formation_at(
        &mut world,
        FormationKind::Square,
        Vec2::splat(10.0),
        &[("warrior", 2), ("dragon", 1)],
        &ArmyId::from("red"),
        2.0,
        &mut events,
    );

    assert_eq!(result, Err(PlacementError::UnknownUnitType("dragon".to_owned())));
    assert!(query::formation_ids(&world).is_empty());
    assert_eq!(query::unit_count(&world), 0);
}

#[test]
fn formation_without_room_is_disbanded() {
    let mut world = world(10, 10);
    let mut events = Vec::new();
    let mut controller = FormationController::default();

    let result = controller.create_formation_at(
        &mut world,
        FormationKind::Circle,
        Vec2::splat(100.0),
        &[("warrior", 4)],
        &ArmyId::from("red"),
        1.5,
        &mut events,
    );

    assert_eq!(result, Ok(None));
    assert!(query::formation_ids(&world).is_empty());
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::FormationDisbanded { .. })));
}

#[test]
fn formation_walks_around_wall_one_waypoint_at_a_time() {
    let mut world = world(20, 10);
    let mut events = Vec::new();
    for row in 0..8 {
        world.set_obstacle(CellCoord::new(10, row), true, &mut events);
    }
    let mut controller = FormationController::default();
    let mut movement = slot_anchored();
    let formation = controller
        .create_formation_at(
            &mut world,
            FormationKind::Line,
            Vec2::new(4.5, 4.5),
            &[("warrior", 1)],
            &ArmyId::from("red"),
            1.0,
            &mut events,
        )
        .expect("known unit type")
        .expect("room for scout");

    let target = Vec2::new(15.5, 4.5);
    let queued = controller
        .move_formation_with_pathfinding(&world, formation, target)
        .expect("route around the wall");
    assert!(queued >= 11);
    events.clear();

    for _ in 0..200 {
        controller.update(&mut world, &mut movement, &mut events);
        movement.update(&mut world, TICK, &mut events);
    }

    assert_eq!(controller.pending_waypoints(formation), 0);
    let record = query::formation(&world, formation).expect("formation exists");
    assert_eq!(record.center(), target);

    let grid = query::grid_view(&world);
    let centers: Vec<Vec2> = events
        .iter()
        .filter_map(|event| match event {
            Event::FormationMoved { center, .. } => Some(*center),
            _ => None,
        })
        .collect();
    assert_eq!(centers.len(), queued);
    for center in centers {
        let cell = grid.world_to_cell(center).expect("center inside grid");
        assert!(grid.is_walkable(cell), "center crossed the wall at {center}");
    }
}

#[test]
fn queue_waits_for_members_to_settle() {
    let mut world = world(20, 10);
    let mut events = Vec::new();
    let mut controller = FormationController::default();
    let mut movement = slot_anchored();
    let formation = controller
        .create_formation_at(
            &mut world,
            FormationKind::Line,
            Vec2::new(2.5, 2.5),
            &[("warrior", 1)],
            &ArmyId::from("red"),
            1.0,
            &mut events,
        )
        .expect("known unit type")
        .expect("room for scout");
    let member = query::formation_units(&world, formation)[0];

    let queued = controller
        .move_formation_with_pathfinding(&world, formation, Vec2::new(6.5, 2.5))
        .expect("open route");
    assert_eq!(queued, 4);

    controller.update(&mut world, &mut movement, &mut events);
    assert_eq!(movement.unit_state(member), MovementState::Forming);
    assert_eq!(controller.pending_waypoints(formation), 3);

    controller.update(&mut world, &mut movement, &mut events);
    assert_eq!(controller.pending_waypoints(formation), 3);

    movement.update(&mut world, TICK, &mut events);
    assert!(!movement.is_moving(member));
    controller.update(&mut world, &mut movement, &mut events);
    assert_eq!(controller.pending_waypoints(formation), 2);
}

#[test]
fn blocked_target_is_rejected() {
    let mut world = world(10, 10);
    let mut events = Vec::new();
    world.set_obstacle(CellCoord::new(8, 8), true, &mut events);
    let mut controller = FormationController::default();
    let formation = controller
        .create_formation_at(
            &mut world,
            FormationKind::Wedge,
            Vec2::new(3.5, 3.5),
            &[("archer", 3)],
            &ArmyId::from("blue"),
            1.5,
            &mut events,
        )
        .expect("known unit type")
        .expect("room for archers");

    assert_eq!(
        controller.move_formation_with_pathfinding(&world, formation, Vec2::new(8.5, 8.5)),
        Err(CommandError::Route(RouteError::EndBlocked))
    );
    assert_eq!(controller.pending_waypoints(formation), 0);
}

#[test]
fn straggler_is_sent_back_to_its_slot() {
    let mut world = world(20, 20);
    let mut events = Vec::new();
    let mut controller = FormationController::default();
    let formation = controller
        .create_formation_at(
            &mut world,
            FormationKind::Line,
            Vec2::new(10.5, 10.5),
            &[("warrior", 3)],
            &ArmyId::from("red"),
            2.0,
            &mut events,
        )
        .expect("known unit type")
        .expect("room for line");
    let mut movement = MovementController::default();

    let members = query::formation_units(&world, formation);
    let straggler = members[0];
    let slot = query::formation(&world, formation)
        .and_then(|record| record.slot_of(straggler))
        .expect("straggler has a slot");
    assert_eq!(slot, Vec2::new(8.5, 10.5));
    world
        .relocate_unit(straggler, Vec2::new(2.5, 10.5), &mut events)
        .expect("relocate");

    assert_eq!(controller.maintain_formation(&world, &mut movement, formation), Ok(1));
    assert_eq!(movement.unit_state(straggler), MovementState::Moving);
    for member in &members[1..] {
        assert_eq!(movement.unit_state(*member), MovementState::Idle);
    }

    for _ in 0..400 {
        movement.update(&mut world, TICK, &mut events);
    }

    let position = query::unit_position(&world, straggler).expect("straggler exists");
    assert!(position.distance(slot) <= controller.slot_tolerance());
    assert_eq!(controller.maintain_formation(&world, &mut movement, formation), Ok(0));
}

#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a headless Warband skirmish.

mod catalog;

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use glam::Vec2;
use warband_core::{ArmyId, CellCoord, Event, FormationKind, UnitCatalog};
use warband_system_formation::FormationController;
use warband_system_movement::{MovementConfig, MovementController};
use warband_system_pathfinding::{render_ascii, Pathfinder, SearchAlgorithm, TerrainMap};
use warband_world::{query, PlacementConfig, World, WorldConfig};

const MIN_GRID_EXTENT: u32 = 8;
const GATE_HEIGHT: u32 = 3;
const MARSH: &str = "marsh";

/// Runs a scripted skirmish between two formations and reports unit positions.
#[derive(Debug, Parser)]
#[command(name = "warband", version)]
struct Args {
    /// Number of simulation steps to run.
    #[arg(long, default_value_t = 600)]
    ticks: u32,
    /// Simulated milliseconds per step.
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,
    /// Seed for placement sampling; a fixed default keeps runs reproducible.
    #[arg(long)]
    seed: Option<u64>,
    /// Grid columns.
    #[arg(long, default_value_t = 32)]
    columns: u32,
    /// Grid rows.
    #[arg(long, default_value_t = 20)]
    rows: u32,
    /// TOML unit catalog. The built-in warrior, archer and mage are used when omitted.
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Algorithm used for the route preview.
    #[arg(long, default_value_t = SearchAlgorithm::AStar)]
    algorithm: SearchAlgorithm,
    /// Cost multiplier of the marsh band the route preview avoids.
    #[arg(long, default_value_t = 3.0)]
    marsh_cost: f32,
    /// Layout of the attacking formation.
    #[arg(long, default_value_t = FormationKind::Wedge)]
    formation: FormationKind,
    /// Steps between position reports. Zero reports only the final state.
    #[arg(long, default_value_t = 100)]
    report_every: u32,
}

/// Entry point for the Warband command-line interface.
fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    if args.columns < MIN_GRID_EXTENT || args.rows < MIN_GRID_EXTENT {
        bail!(
            "grid must be at least {MIN_GRID_EXTENT}x{MIN_GRID_EXTENT}, got {}x{}",
            args.columns,
            args.rows
        );
    }

    let catalog = match &args.catalog {
        Some(path) => catalog::load_catalog(path)?,
        None => UnitCatalog::standard(),
    };
    run(&args, catalog)
}

fn run(args: &Args, catalog: UnitCatalog) -> Result<()> {
    let mut placement = PlacementConfig::default();
    if let Some(seed) = args.seed {
        placement.seed = seed;
    }
    let config = WorldConfig::new(args.columns, args.rows, 1.0).with_placement(placement);
    let mut world = World::new(config, catalog);
    let mut events = Vec::new();

    let wall = args.columns / 2;
    for row in 0..args.rows - GATE_HEIGHT {
        world.set_obstacle(CellCoord::new(wall, row), true, &mut events);
    }

    let mut formations = FormationController::default();
    let mut movement = MovementController::new(MovementConfig::default());
    let red_army = ArmyId::from("red");
    let blue_army = ArmyId::from("blue");

    let red_center = cell_center(&world, args.columns / 5, args.rows / 2);
    let red = formations
        .create_formation_at(
            &mut world,
            args.formation,
            red_center,
            &[("warrior", 4), ("archer", 2)],
            &red_army,
            1.5,
            &mut events,
        )
        .context("catalog must define warrior and archer units")?
        .context("no room for the red formation")?;

    let blue_center = cell_center(&world, args.columns * 4 / 5, args.rows / 2);
    let blue = formations
        .create_formation_at(
            &mut world,
            FormationKind::Line,
            blue_center,
            &[("mage", 3)],
            &blue_army,
            2.0,
            &mut events,
        )
        .context("catalog must define mage units")?
        .context("no room for the blue formation")?;

    let mut terrain = TerrainMap::new();
    terrain
        .set_terrain_cost(MARSH, args.marsh_cost)
        .context("invalid --marsh-cost")?;
    let marsh = args.columns / 3;
    for row in args.rows / 4..args.rows {
        let _ = terrain.paint(CellCoord::new(marsh, row), MARSH);
    }

    let red_target = cell_center(&world, args.columns * 3 / 4, args.rows / 4);
    let preview = Pathfinder::new().find_path_with_terrain(
        &query::grid_view(&world),
        &terrain,
        red_center,
        red_target,
        args.algorithm,
    );
    println!(
        "{} route for the red formation: {} waypoints",
        args.algorithm,
        preview.len()
    );
    print!("{}", render_ascii(&query::grid_view(&world), &preview));

    let queued = formations
        .move_formation_with_pathfinding(&world, red, red_target)
        .context("red formation cannot reach its target")?;
    log::info!("red formation queued {queued} waypoints toward {red_target}");

    let blue_target = cell_center(&world, args.columns / 4, args.rows * 4 / 5);
    for (index, unit) in query::formation_units(&world, blue).into_iter().enumerate() {
        let target = blue_target + Vec2::new(index as f32 * 2.0, 0.0);
        if let Err(error) = movement.move_unit_to(&world, unit, target) {
            log::warn!("mage {unit:?} stays put: {error}");
        }
    }

    let dt = Duration::from_millis(args.tick_ms);
    let mut regrouped = false;
    for step in 1..=args.ticks {
        formations.update(&mut world, &mut movement, &mut events);
        movement.update(&mut world, dt, &mut events);

        if !regrouped && formations.pending_waypoints(red) == 0 {
            let reissued = formations
                .maintain_formation(&world, &mut movement, red)
                .context("red formation vanished")?;
            log::info!("red formation reached its target; {reissued} members regrouping");
            regrouped = true;
        }
        if args.report_every > 0 && step % args.report_every == 0 {
            report(&world, &movement);
        }
    }

    report(&world, &movement);
    summarize(&events);
    Ok(())
}

fn cell_center(world: &World, column: u32, row: u32) -> Vec2 {
    query::grid_view(world).cell_to_world(CellCoord::new(column, row))
}

fn report(world: &World, movement: &MovementController) {
    println!("t={:.2}s", movement.clock().as_secs_f32());
    for snapshot in query::unit_view(world).iter() {
        println!(
            "  {:<8} {:<5} ({:6.2}, {:6.2}) {:?}",
            snapshot.unit_type,
            snapshot.army,
            snapshot.position.x,
            snapshot.position.y,
            movement.unit_state(snapshot.id)
        );
    }
}

fn summarize(events: &[Event]) {
    let mut tally: BTreeMap<&'static str, usize> = BTreeMap::new();
    for event in events {
        *tally.entry(event_name(event)).or_default() += 1;
    }
    println!("events:");
    for (name, count) in tally {
        println!("  {name:<18} {count}");
    }
}

fn event_name(event: &Event) -> &'static str {
    match event {
        Event::UnitPlaced { .. } => "unit_placed",
        Event::UnitRemoved { .. } => "unit_removed",
        Event::UnitRelocated { .. } => "unit_relocated",
        Event::UnitAdvanced { .. } => "unit_advanced",
        Event::FootprintLost { .. } => "footprint_lost",
        Event::UnitArrived { .. } => "unit_arrived",
        Event::UnitStuck { .. } => "unit_stuck",
        Event::UnitRecovered { .. } => "unit_recovered",
        Event::RouteReplanned { .. } => "route_replanned",
        Event::FormationCreated { .. } => "formation_created",
        Event::FormationMoved { .. } => "formation_moved",
        Event::FormationDisbanded { .. } => "formation_disbanded",
        Event::ObstacleChanged { .. } => "obstacle_changed",
    }
}

#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Tick-driven movement controller that steers units along planned routes.
//!
//! Every commanded unit carries an order with its own small state machine:
//! `Moving` units follow an A* route cell center by cell center, `Forming`
//! units steer straight at their
//! formation anchor, and `Stuck` units wait for the stuck threshold before
//! being moved to a nearby free spot. Time is simulated; the controller only
//! advances when [`MovementController::update`] is called.

use std::{collections::BTreeMap, fmt, time::Duration};

use glam::Vec2;
use warband_core::{
    CellCoord, CommandError, CommandOutcome, Event, FormationId, GridView, MovementState, UnitId,
};
use warband_system_pathfinding::{Pathfinder, SearchAlgorithm};
use warband_world::{query, World};

const DEFAULT_ARRIVAL_TOLERANCE: f32 = 0.5;
const DEFAULT_STUCK_THRESHOLD: Duration = Duration::from_secs(5);
const DEFAULT_RECOVERY_SUGGESTIONS: usize = 3;
const MIN_STEP_DISTANCE: f32 = 0.01;

/// Callback invoked once when a movement command finishes.
pub type CompletionHook = Box<dyn FnMut(UnitId, CommandOutcome)>;

/// Point a `Forming` unit steers toward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FormingAnchor {
    /// Every member steers toward the formation center.
    #[default]
    Center,
    /// Every member steers toward its own layout slot.
    Slot,
}

/// Tuning for the movement controller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MovementConfig {
    /// Factor applied to every unit's catalog speed.
    pub speed_multiplier: f32,
    /// Distance at which a waypoint or anchor counts as reached.
    pub arrival_tolerance: f32,
    /// Simulated time without progress before a unit counts as stuck, and
    /// between recovery attempts.
    pub stuck_threshold: Duration,
    /// Free-position suggestions sampled per recovery attempt.
    pub recovery_suggestions: usize,
    /// Point forming units steer toward.
    pub forming_anchor: FormingAnchor,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            arrival_tolerance: DEFAULT_ARRIVAL_TOLERANCE,
            stuck_threshold: DEFAULT_STUCK_THRESHOLD,
            recovery_suggestions: DEFAULT_RECOVERY_SUGGESTIONS,
            forming_anchor: FormingAnchor::Center,
        }
    }
}

/// Drives commanded units one tick at a time.
#[derive(Debug, Default)]
pub struct MovementController {
    config: MovementConfig,
    pathfinder: Pathfinder,
    orders: BTreeMap<UnitId, Order>,
    clock: Duration,
}

impl MovementController {
    /// Creates a controller with the provided tuning.
    #[must_use]
    pub fn new(config: MovementConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Tuning the controller runs with.
    #[must_use]
    pub const fn config(&self) -> &MovementConfig {
        &self.config
    }

    /// Simulated time accumulated by [`MovementController::update`].
    #[must_use]
    pub const fn clock(&self) -> Duration {
        self.clock
    }

    /// Plans a route to `target` and starts moving the unit along it.
    ///
    /// Any earlier command for the unit is replaced. When no route exists
    /// the unit keeps its current command.
    pub fn move_unit_to(
        &mut self,
        world: &World,
        unit: UnitId,
        target: Vec2,
    ) -> Result<(), CommandError> {
        self.command_unit(world, unit, target, None)
    }

    /// Like [`MovementController::move_unit_to`], calling `hook` once the
    /// command finishes.
    pub fn move_unit_to_with_hook<F>(
        &mut self,
        world: &World,
        unit: UnitId,
        target: Vec2,
        hook: F,
    ) -> Result<(), CommandError>
    where
        F: FnMut(UnitId, CommandOutcome) + 'static,
    {
        self.command_unit(world, unit, target, Some(Box::new(hook)))
    }

    fn command_unit(
        &mut self,
        world: &World,
        unit: UnitId,
        target: Vec2,
        hook: Option<CompletionHook>,
    ) -> Result<(), CommandError> {
        let position = query::unit_position(world, unit).ok_or(CommandError::UnknownUnit)?;
        if !self.can_move(world, unit) {
            return Err(CommandError::Immobile);
        }
        let grid = query::grid_view(world);
        let route = self
            .pathfinder
            .plan(&grid, position, target, SearchAlgorithm::AStar)?;

        let mut order = Order::new(MovementState::Moving, self.clock, hook);
        order.follow(corner_safe_waypoints(&grid, route.cells()), target);
        self.replace_order(unit, order);
        Ok(())
    }

    fn can_move(&self, world: &World, unit: UnitId) -> bool {
        query::unit(world, unit)
            .map_or(false, |record| record.speed() * self.config.speed_multiplier > 0.0)
    }

    /// Moves a formation to `target` at once and sets every member forming.
    ///
    /// Members that cannot move keep wherever the formation move left them
    /// and receive no order.
    pub fn move_formation_to(
        &mut self,
        world: &mut World,
        formation: FormationId,
        target: Vec2,
        out: &mut Vec<Event>,
    ) -> Result<(), CommandError> {
        world.move_formation(formation, target, out)?;
        for member in query::formation_units(world, formation) {
            if !self.can_move(world, member) {
                log::debug!("{member:?} cannot move and stays out of the formation order");
                continue;
            }
            let mut order = Order::new(MovementState::Forming, self.clock, None);
            order.formation = Some(formation);
            self.replace_order(member, order);
        }
        Ok(())
    }

    fn replace_order(&mut self, unit: UnitId, order: Order) {
        if let Some(previous) = self.orders.insert(unit, order) {
            previous.finish(unit, CommandOutcome::Cancelled);
        }
    }

    /// Cancels the unit's command. Returns whether one was active.
    pub fn stop_unit(&mut self, unit: UnitId) -> bool {
        match self.orders.remove(&unit) {
            Some(order) => {
                order.finish(unit, CommandOutcome::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Cancels the commands of every member. Returns how many were active.
    pub fn stop_formation(
        &mut self,
        world: &World,
        formation: FormationId,
    ) -> Result<usize, CommandError> {
        let record = query::formation(world, formation).ok_or(CommandError::UnknownFormation)?;
        let mut stopped = 0;
        for member in record.members() {
            if self.stop_unit(*member) {
                stopped += 1;
            }
        }
        Ok(stopped)
    }

    /// Movement state of the unit. Units without a command are idle.
    #[must_use]
    pub fn unit_state(&self, unit: UnitId) -> MovementState {
        self.orders
            .get(&unit)
            .map_or(MovementState::Idle, |order| order.state)
    }

    /// Waypoints the unit has not reached yet.
    #[must_use]
    pub fn remaining_path(&self, unit: UnitId) -> &[Vec2] {
        self.orders
            .get(&unit)
            .map(Order::remaining)
            .unwrap_or_default()
    }

    /// Reports whether the unit is following a route or forming up.
    #[must_use]
    pub fn is_moving(&self, unit: UnitId) -> bool {
        matches!(
            self.unit_state(unit),
            MovementState::Moving | MovementState::Forming
        )
    }

    /// Advances every commanded unit by `dt` of simulated time.
    pub fn update(&mut self, world: &mut World, dt: Duration, out: &mut Vec<Event>) {
        self.clock = self.clock.saturating_add(dt);
        let commanded: Vec<UnitId> = self.orders.keys().copied().collect();

        for unit in commanded {
            let Some(mut order) = self.orders.remove(&unit) else {
                continue;
            };
            let Some((position, speed)) =
                query::unit(world, unit).map(|record| (record.position(), record.speed()))
            else {
                order.finish(unit, CommandOutcome::Cancelled);
                continue;
            };
            let reach = speed * self.config.speed_multiplier * dt.as_secs_f32();

            let progress = match order.state {
                MovementState::Moving => {
                    self.advance_moving(world, unit, &mut order, position, reach, out)
                }
                MovementState::Forming => {
                    self.advance_forming(world, unit, &mut order, position, reach, out)
                }
                MovementState::Stuck => self.recover(world, unit, &mut order, position, out),
                MovementState::Idle | MovementState::Attacking => Progress::Continue,
            };

            match progress {
                Progress::Continue => {
                    let _ = self.orders.insert(unit, order);
                }
                Progress::Finished(outcome) => {
                    if outcome == CommandOutcome::Arrived {
                        out.push(Event::UnitArrived { unit });
                    }
                    order.finish(unit, outcome);
                }
            }
        }
    }

    fn advance_moving(
        &mut self,
        world: &mut World,
        unit: UnitId,
        order: &mut Order,
        position: Vec2,
        reach: f32,
        out: &mut Vec<Event>,
    ) -> Progress {
        let tolerance = self.config.arrival_tolerance;
        order.skip_reached_waypoints(position);

        let Some(next) = order.next_waypoint() else {
            return Progress::Finished(CommandOutcome::Arrived);
        };
        if order.on_last_waypoint() && position.distance(next) <= tolerance {
            return Progress::Finished(CommandOutcome::Arrived);
        }

        self.step_toward(world, unit, order, position, next, reach, out);
        self.watch_progress(unit, order, out);
        Progress::Continue
    }

    fn advance_forming(
        &mut self,
        world: &mut World,
        unit: UnitId,
        order: &mut Order,
        position: Vec2,
        reach: f32,
        out: &mut Vec<Event>,
    ) -> Progress {
        let Some(anchor) = order
            .formation
            .and_then(|formation| self.anchor(world, unit, formation))
        else {
            return Progress::Finished(CommandOutcome::Cancelled);
        };
        if position.distance(anchor) <= self.config.arrival_tolerance {
            return Progress::Finished(CommandOutcome::Arrived);
        }

        order.target = anchor;
        self.step_toward(world, unit, order, position, anchor, reach, out);
        self.watch_progress(unit, order, out);
        Progress::Continue
    }

    fn anchor(&self, world: &World, unit: UnitId, formation: FormationId) -> Option<Vec2> {
        let record = query::formation(world, formation)?;
        match self.config.forming_anchor {
            FormingAnchor::Center => Some(record.center()),
            FormingAnchor::Slot => record.slot_of(unit).or(Some(record.center())),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn step_toward(
        &mut self,
        world: &mut World,
        unit: UnitId,
        order: &mut Order,
        position: Vec2,
        destination: Vec2,
        reach: f32,
        out: &mut Vec<Event>,
    ) {
        if reach <= 0.0 {
            return;
        }
        let delta = destination - position;
        let distance = delta.length();
        if distance < MIN_STEP_DISTANCE {
            order.advance_cursor();
            return;
        }

        let candidate = if reach >= distance {
            destination
        } else {
            position + delta / distance * reach
        };
        if query::footprint_blocked(world, unit, candidate) {
            self.replan(world, unit, order, position, out);
            return;
        }

        match world.step_unit(unit, candidate, out) {
            Ok(()) => order.last_progress = self.clock,
            Err(error) => log::debug!("step for {unit:?} rejected: {error}"),
        }
    }

    fn replan(
        &mut self,
        world: &World,
        unit: UnitId,
        order: &mut Order,
        position: Vec2,
        out: &mut Vec<Event>,
    ) {
        let grid = query::grid_view(world);
        let mapping = grid.mapping();
        let mut walkable = query::walkable_around(world, unit);
        for cell in [position, order.target]
            .into_iter()
            .filter_map(|point| grid.world_to_cell(point))
            .filter(|cell| grid.is_walkable(*cell))
        {
            if let Some(flag) = mapping.index(cell).and_then(|index| walkable.get_mut(index)) {
                *flag = true;
            }
        }
        let detour = GridView::new(mapping, &walkable);

        match self
            .pathfinder
            .plan(&detour, position, order.target, SearchAlgorithm::AStar)
        {
            Ok(route) => {
                let waypoints = corner_safe_waypoints(&detour, route.cells());
                out.push(Event::RouteReplanned {
                    unit,
                    waypoints: waypoints.len(),
                });
                order.follow(waypoints, order.target);
                order.state = MovementState::Moving;
            }
            Err(error) => {
                log::debug!("{unit:?} blocked at {position} and cannot replan: {error}");
                order.state = MovementState::Stuck;
                out.push(Event::UnitStuck { unit });
            }
        }
    }

    fn watch_progress(&self, unit: UnitId, order: &mut Order, out: &mut Vec<Event>) {
        if order.state == MovementState::Stuck {
            return;
        }
        if self.clock.saturating_sub(order.last_progress) >= self.config.stuck_threshold {
            log::debug!("{unit:?} made no progress for {:?}", self.config.stuck_threshold);
            order.state = MovementState::Stuck;
            out.push(Event::UnitStuck { unit });
        }
    }

    fn recover(
        &mut self,
        world: &mut World,
        unit: UnitId,
        order: &mut Order,
        position: Vec2,
        out: &mut Vec<Event>,
    ) -> Progress {
        if self.clock.saturating_sub(order.last_progress) < self.config.stuck_threshold {
            return Progress::Continue;
        }
        let Some(size) = query::unit(world, unit).map(|record| record.size()) else {
            return Progress::Finished(CommandOutcome::Cancelled);
        };

        let closest = world
            .placement_suggestions(position, size, self.config.recovery_suggestions)
            .into_iter()
            .min_by(|a, b| a.distance(position).total_cmp(&b.distance(position)));

        let Some(spot) = closest else {
            log::trace!("{unit:?} found no free spot near {position}");
            order.last_progress = self.clock;
            return Progress::Continue;
        };

        if let Err(error) = world.relocate_unit(unit, spot, out) {
            log::debug!("recovery of {unit:?} rejected: {error}");
            return Progress::Finished(CommandOutcome::Cancelled);
        }
        out.push(Event::UnitRecovered {
            unit,
            position: spot,
        });
        Progress::Finished(CommandOutcome::Cancelled)
    }
}

/// Cell centers along `cells`, with an orthogonal stop inserted before any
/// diagonal step that would brush a blocked corner.
fn corner_safe_waypoints(grid: &GridView<'_>, cells: &[CellCoord]) -> Vec<Vec2> {
    let mut waypoints: Vec<Vec2> = cells
        .first()
        .map(|cell| grid.cell_to_world(*cell))
        .into_iter()
        .collect();
    for pair in cells.windows(2) {
        if let Some(corner) = detour_corner(grid, pair[0], pair[1]) {
            waypoints.push(grid.cell_to_world(corner));
        }
        waypoints.push(grid.cell_to_world(pair[1]));
    }
    waypoints
}

/// The open side cell of a diagonal step whose other side cell is blocked.
/// Orthogonal steps and diagonals with both sides open or both blocked need
/// no stop.
fn detour_corner(grid: &GridView<'_>, from: CellCoord, to: CellCoord) -> Option<CellCoord> {
    if !from.is_diagonal_to(to) {
        return None;
    }
    let across = CellCoord::new(to.column(), from.row());
    let along = CellCoord::new(from.column(), to.row());
    match (grid.is_walkable(across), grid.is_walkable(along)) {
        (true, false) => Some(across),
        (false, true) => Some(along),
        _ => None,
    }
}

enum Progress {
    Continue,
    Finished(CommandOutcome),
}

struct Order {
    state: MovementState,
    route: Vec<Vec2>,
    cursor: usize,
    target: Vec2,
    formation: Option<FormationId>,
    last_progress: Duration,
    hook: Option<CompletionHook>,
}

impl Order {
    fn new(state: MovementState, now: Duration, hook: Option<CompletionHook>) -> Self {
        Self {
            state,
            route: Vec::new(),
            cursor: 0,
            target: Vec2::ZERO,
            formation: None,
            last_progress: now,
            hook,
        }
    }

    fn follow(&mut self, route: Vec<Vec2>, target: Vec2) {
        self.route = route;
        self.cursor = 0;
        self.target = target;
    }

    fn remaining(&self) -> &[Vec2] {
        self.route.get(self.cursor..).unwrap_or(&[])
    }

    fn next_waypoint(&self) -> Option<Vec2> {
        self.route.get(self.cursor).copied()
    }

    fn on_last_waypoint(&self) -> bool {
        self.cursor + 1 >= self.route.len()
    }

    fn advance_cursor(&mut self) {
        if !self.on_last_waypoint() {
            self.cursor += 1;
        }
    }

    /// Drops waypoints the unit is standing on. The last waypoint is never
    /// dropped.
    fn skip_reached_waypoints(&mut self, position: Vec2) {
        while let Some(current) = self.next_waypoint() {
            if self.on_last_waypoint() || position.distance(current) >= MIN_STEP_DISTANCE {
                break;
            }
            self.cursor += 1;
        }
    }

    fn finish(self, unit: UnitId, outcome: CommandOutcome) {
        if let Some(mut hook) = self.hook {
            hook(unit, outcome);
        }
    }
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Order")
            .field("state", &self.state)
            .field("route", &self.route)
            .field("cursor", &self.cursor)
            .field("target", &self.target)
            .field("formation", &self.formation)
            .field("last_progress", &self.last_progress)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

//! Task scheduling and arena simulation core shared across the TankBots
//! workspace.
//!
//! Robots execute an ordered queue of timed tasks. Tasks only write intents;
//! the arena integrates intents into position and heading once per tick and
//! keeps every robot inside the safe rectangle, raising [`ArenaEvent`]s when
//! the boundary clamp intervenes.

use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

new_key_type! {
    /// Stable handle for robots backed by a generational slot map.
    pub struct RobotId;
}

/// Convenience alias for associating side data with robots.
pub type RobotMap<T> = SecondaryMap<RobotId, T>;

/// High level simulation clock (ticks processed since boot).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The tick before any stepping has happened.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Translation intent written by move tasks and consumed by the arena
/// integrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Movement {
    #[default]
    None,
    Forward,
    Backward,
}

/// Rotation intent shared by hull and turret turning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Turn {
    #[default]
    None,
    Left,
    Right,
}

/// Events the arena raises against an individual robot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ArenaEvent {
    /// The boundary clamp moved the robot back inside the safe rectangle.
    HitWall,
}

/// A robot's currently desired actions, written by its active task and read
/// by the arena's integration step each tick.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Intents {
    pub movement: Movement,
    pub turn: Turn,
    pub turret_turn: Turn,
}

impl Intents {
    /// Reset every intent to its idle value.
    ///
    /// Needed after clearing a robot's queue mid-task: an interrupted task
    /// never gets the completing call that would reset its own intent.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Axis-aligned integer position in arena units.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Combined kinematic snapshot read by rendering layers after each tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pose {
    pub position: Position,
    /// Hull heading in degrees; 0 points up, positive degrees turn clockwise.
    pub heading: i32,
    /// Turret heading in degrees, same convention as the hull.
    pub turret: i32,
}

/// Scheduling state of a task across advance calls.
///
/// The deadline is anchored to the first advance, never to construction, so
/// a task's duration measures time spent at the front of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskPhase {
    Unstarted,
    Running { deadline: Instant },
    Completed,
}

/// Behavior variants a task applies to its robot's intents while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskKind {
    /// Drive the hull forward or backward.
    Move { direction: Movement },
    /// Rotate the hull left or right.
    Rotate { direction: Turn },
    /// Rotate the turret left or right.
    TurretRotate { direction: Turn },
    /// Cancel movement and hull rotation immediately.
    Stop,
}

/// A time-bounded unit of robot behavior.
///
/// Every advance while the task runs re-applies its intent; the call that
/// observes the deadline resets that intent and reports completion by
/// returning `false`. A completed task never reports activity again, and a
/// task dropped before its first advance has had no effect at all.
#[derive(Debug, Clone)]
pub struct Task {
    kind: TaskKind,
    duration: Duration,
    phase: TaskPhase,
}

impl Task {
    const fn new(kind: TaskKind, duration: Duration) -> Self {
        Self {
            kind,
            duration,
            phase: TaskPhase::Unstarted,
        }
    }

    /// Drive forward for `duration`.
    #[must_use]
    pub const fn forward(duration: Duration) -> Self {
        Self::new(
            TaskKind::Move {
                direction: Movement::Forward,
            },
            duration,
        )
    }

    /// Drive backward for `duration`.
    #[must_use]
    pub const fn backward(duration: Duration) -> Self {
        Self::new(
            TaskKind::Move {
                direction: Movement::Backward,
            },
            duration,
        )
    }

    /// Rotate the hull in `direction` for `duration`.
    #[must_use]
    pub const fn rotate(direction: Turn, duration: Duration) -> Self {
        Self::new(TaskKind::Rotate { direction }, duration)
    }

    /// Rotate the turret in `direction` for `duration`.
    #[must_use]
    pub const fn rotate_turret(direction: Turn, duration: Duration) -> Self {
        Self::new(TaskKind::TurretRotate { direction }, duration)
    }

    /// Single-shot task that cancels movement and hull rotation.
    ///
    /// Leaves the turret intent untouched; use [`Intents::clear`] for a
    /// full reset.
    #[must_use]
    pub const fn stop() -> Self {
        Self::new(TaskKind::Stop, Duration::ZERO)
    }

    /// Whether the task has received its first advance.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        !matches!(self.phase, TaskPhase::Unstarted)
    }

    /// Whether the task has reported completion.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.phase, TaskPhase::Completed)
    }

    /// Drive the task as part of one simulation tick.
    ///
    /// The first call anchors the deadline at `now + duration`. Returns
    /// `true` while the task stays active; the caller must discard the task
    /// once it returns `false`.
    pub fn advance(&mut self, intents: &mut Intents, now: Instant) -> bool {
        let deadline = match self.phase {
            TaskPhase::Completed => return false,
            TaskPhase::Unstarted => now + self.duration,
            TaskPhase::Running { deadline } => deadline,
        };
        if matches!(self.kind, TaskKind::Stop) {
            intents.movement = Movement::None;
            intents.turn = Turn::None;
            self.phase = TaskPhase::Completed;
            return false;
        }
        if now < deadline {
            self.phase = TaskPhase::Running { deadline };
            self.apply(intents);
            true
        } else {
            self.reset(intents);
            self.phase = TaskPhase::Completed;
            false
        }
    }

    fn apply(&self, intents: &mut Intents) {
        match self.kind {
            TaskKind::Move { direction } => intents.movement = direction,
            TaskKind::Rotate { direction } => intents.turn = direction,
            TaskKind::TurretRotate { direction } => intents.turret_turn = direction,
            TaskKind::Stop => {}
        }
    }

    fn reset(&self, intents: &mut Intents) {
        match self.kind {
            TaskKind::Move { .. } => intents.movement = Movement::None,
            TaskKind::Rotate { .. } => intents.turn = Turn::None,
            TaskKind::TurretRotate { .. } => intents.turret_turn = Turn::None,
            TaskKind::Stop => {}
        }
    }
}

/// A scripted arena participant owning its pose, intents, and task queue.
///
/// Exactly one task (the queue front) receives advance calls; the queue
/// shrinks only when that task reports completion. A robot whose queue has
/// drained stays in the arena and simply idles.
#[derive(Debug)]
pub struct Robot {
    name: String,
    position: Position,
    heading: i32,
    turret: i32,
    intents: Intents,
    tasks: VecDeque<Task>,
}

impl Robot {
    /// Create an idle robot with an empty task queue at the origin.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: Position::default(),
            heading: 0,
            turret: 0,
            intents: Intents::default(),
            tasks: VecDeque::new(),
        }
    }

    /// Create a robot pre-seeded with a task script.
    #[must_use]
    pub fn with_tasks(name: impl Into<String>, tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut robot = Self::new(name);
        robot.tasks.extend(tasks);
        robot
    }

    /// The robot's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a task to the back of the queue.
    pub fn push_task(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    /// Drop every queued task, including the active front.
    ///
    /// Intents already applied by an interrupted task stay set; pair with
    /// [`Intents::clear`] for a full halt.
    pub fn clear_tasks(&mut self) {
        self.tasks.clear();
    }

    /// Number of queued tasks, counting the active front.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the robot has no scheduled work.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drive the front task as part of one simulation tick.
    ///
    /// Returns `true` when scheduled work happened this call, including the
    /// call that completes a task, and `false` when the queue is empty. A
    /// completed task's successor starts on the next call, never this one,
    /// so its deadline is anchored to its own first advance.
    pub fn advance(&mut self, now: Instant) -> bool {
        let Some(task) = self.tasks.front_mut() else {
            return false;
        };
        if !task.advance(&mut self.intents, now) {
            self.tasks.pop_front();
        }
        true
    }

    /// Current position in arena units.
    #[must_use]
    pub const fn position(&self) -> Position {
        self.position
    }

    /// Place the robot; the arena also calls this when integrating movement.
    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    /// Hull heading in degrees (0 = up, clockwise positive, unnormalized).
    #[must_use]
    pub const fn heading(&self) -> i32 {
        self.heading
    }

    /// Set the hull heading in degrees.
    pub fn set_heading(&mut self, degrees: i32) {
        self.heading = degrees;
    }

    /// Turret heading in degrees.
    #[must_use]
    pub const fn turret_heading(&self) -> i32 {
        self.turret
    }

    /// Set the turret heading in degrees.
    pub fn set_turret_heading(&mut self, degrees: i32) {
        self.turret = degrees;
    }

    /// The current intent set.
    #[must_use]
    pub const fn intents(&self) -> &Intents {
        &self.intents
    }

    /// Mutable access to the intent set.
    #[must_use]
    pub fn intents_mut(&mut self) -> &mut Intents {
        &mut self.intents
    }

    /// Snapshot of the full kinematic state.
    #[must_use]
    pub const fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            heading: self.heading,
            turret: self.turret,
        }
    }
}

impl fmt::Display for Robot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pos=({}, {}) heading={} turret={}",
            self.name, self.position.x, self.position.y, self.heading, self.turret
        )
    }
}

/// Per-robot reaction hook invoked by the arena when an event occurs.
///
/// Handlers may mutate the robot's task queue and intents; the core only
/// guarantees delivery (at most one [`ArenaEvent::HitWall`] per robot per
/// tick) and prescribes no reaction. Robots without a handler ignore
/// events.
pub trait EventHandler: Send {
    fn on_event(&mut self, event: ArenaEvent, robot: &mut Robot);
}

/// Errors that can occur when constructing an arena.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Static configuration for an arena.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Width of the arena in arena units.
    pub width: u32,
    /// Height of the arena in arena units.
    pub height: u32,
    /// Inset on every side defining the safe rectangle robots stay within.
    pub safety_margin: u32,
    /// Distance a moving robot covers per tick.
    pub walk_step: u32,
    /// Degrees a turning hull or turret sweeps per tick.
    pub angle_step: u32,
    /// Optional RNG seed for reproducible spawn placement.
    pub rng_seed: Option<u64>,
    /// Maximum number of recent tick summaries retained in memory; 0
    /// disables summary recording.
    pub history_capacity: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 1280,
            safety_margin: 100,
            walk_step: 10,
            angle_step: 1,
            rng_seed: None,
            history_capacity: 256,
        }
    }
}

impl ArenaConfig {
    /// Validates the configuration ahead of arena construction.
    fn validate(&self) -> Result<(), ArenaError> {
        if self.width == 0 || self.height == 0 {
            return Err(ArenaError::InvalidConfig(
                "arena dimensions must be non-zero",
            ));
        }
        if self.width > i32::MAX as u32 || self.height > i32::MAX as u32 {
            return Err(ArenaError::InvalidConfig(
                "arena dimensions must fit in i32 coordinates",
            ));
        }
        if u64::from(self.width) <= 2 * u64::from(self.safety_margin)
            || u64::from(self.height) <= 2 * u64::from(self.safety_margin)
        {
            return Err(ArenaError::InvalidConfig(
                "arena dimensions must exceed twice the safety margin",
            ));
        }
        if self.walk_step == 0 {
            return Err(ArenaError::InvalidConfig("walk_step must be non-zero"));
        }
        if self.walk_step > i32::MAX as u32 {
            return Err(ArenaError::InvalidConfig("walk_step must fit in i32"));
        }
        if self.angle_step == 0 {
            return Err(ArenaError::InvalidConfig("angle_step must be non-zero"));
        }
        if self.angle_step > i32::MAX as u32 {
            return Err(ArenaError::InvalidConfig("angle_step must fit in i32"));
        }
        Ok(())
    }

    /// Returns the configured RNG, seeding from entropy when no seed is set.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// Per-tick accounting recorded into the arena's history ring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: Tick,
    /// Robots in the arena when the tick ran.
    pub robot_count: usize,
    /// Robots that performed scheduled work this tick.
    pub busy_robots: usize,
    /// Robots the boundary clamp pushed back inside the safe rectangle.
    pub wall_hits: usize,
}

/// Aggregate simulation state: robot membership, bounds, and the tick loop.
///
/// Robots are iterated in insertion order, which is also the order external
/// consumers observe through [`Arena::robots`].
pub struct Arena {
    config: ArenaConfig,
    tick: Tick,
    rng: SmallRng,
    robots: SlotMap<RobotId, Robot>,
    handlers: RobotMap<Box<dyn EventHandler>>,
    order: Vec<RobotId>,
    history: VecDeque<TickSummary>,
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("robot_count", &self.order.len())
            .finish()
    }
}

impl Arena {
    /// Instantiate an arena from the supplied configuration.
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        config.validate()?;
        let rng = config.seeded_rng();
        let history_capacity = config.history_capacity;
        Ok(Self {
            config,
            tick: Tick::zero(),
            rng,
            robots: SlotMap::with_key(),
            handlers: RobotMap::new(),
            order: Vec::new(),
            history: VecDeque::with_capacity(history_capacity),
        })
    }

    /// Returns an immutable reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Arena dimensions as `(width, height)`.
    #[must_use]
    pub const fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Number of robots in the arena.
    #[must_use]
    pub fn robot_count(&self) -> usize {
        self.order.len()
    }

    /// Returns true if `id` refers to a robot in this arena.
    #[must_use]
    pub fn contains(&self, id: RobotId) -> bool {
        self.robots.contains_key(id)
    }

    /// Add `robot`, assigning a uniformly random position inside the safe
    /// rectangle, and return its handle. Membership is add-only.
    pub fn add(&mut self, mut robot: Robot) -> RobotId {
        let margin = self.config.safety_margin as i32;
        let max_x = self.config.width as i32 - margin;
        let max_y = self.config.height as i32 - margin;
        robot.set_position(Position::new(
            self.rng.random_range(margin..=max_x),
            self.rng.random_range(margin..=max_y),
        ));
        let id = self.robots.insert(robot);
        self.order.push(id);
        id
    }

    /// Add `robot` and register `handler` for its events in one call.
    pub fn add_with_handler(&mut self, robot: Robot, handler: Box<dyn EventHandler>) -> RobotId {
        let id = self.add(robot);
        self.handlers.insert(id, handler);
        id
    }

    /// Register (or replace) the event handler for `id`.
    ///
    /// Returns `true` on success, `false` when `id` is not a live robot.
    pub fn set_handler(&mut self, id: RobotId, handler: Box<dyn EventHandler>) -> bool {
        if !self.robots.contains_key(id) {
            return false;
        }
        self.handlers.insert(id, handler);
        true
    }

    /// Borrow a robot by handle.
    #[must_use]
    pub fn robot(&self, id: RobotId) -> Option<&Robot> {
        self.robots.get(id)
    }

    /// Mutably borrow a robot by handle.
    #[must_use]
    pub fn robot_mut(&mut self, id: RobotId) -> Option<&mut Robot> {
        self.robots.get_mut(id)
    }

    /// Iterate robots in insertion order (the external read-only view).
    pub fn robots(&self) -> impl Iterator<Item = (RobotId, &Robot)> {
        self.order
            .iter()
            .filter_map(|&id| self.robots.get(id).map(|robot| (id, robot)))
    }

    /// Iterate robot handles in insertion order.
    pub fn robot_ids(&self) -> impl Iterator<Item = RobotId> + '_ {
        self.order.iter().copied()
    }

    /// Execute one tick against the current wall clock.
    ///
    /// Returns `true` while any robot still has scheduled work; drivers
    /// stop ticking once this reports `false`.
    pub fn step(&mut self) -> bool {
        self.step_at(Instant::now())
    }

    /// Execute one tick as if the wall clock read `now`.
    ///
    /// Every robot and task deadline in the tick is evaluated against the
    /// same instant. Tests drive this directly with synthetic clocks; task
    /// durations are wall-clock spans, so behavior timing is independent of
    /// how often the driver ticks. Headings accumulate unnormalized and
    /// wrap at the i32 boundary.
    pub fn step_at(&mut self, now: Instant) -> bool {
        let margin = i64::from(self.config.safety_margin);
        let max_x = i64::from(self.config.width) - margin;
        let max_y = i64::from(self.config.height) - margin;
        let walk_step = self.config.walk_step as f32;
        let angle_step = self.config.angle_step as i32;

        let mut busy_robots = 0usize;
        let mut wall_hits = 0usize;

        for &id in &self.order {
            let Some(robot) = self.robots.get_mut(id) else {
                continue;
            };
            if robot.advance(now) {
                busy_robots += 1;
            }

            // 0 degrees points up (negative y); positive degrees turn
            // clockwise, so the direction vector comes from heading - 90.
            let radians = (robot.heading().wrapping_sub(90) as f32).to_radians();
            // Movement integrates in i64; the clamp result always fits
            // back into i32 coordinates.
            let step_x = (walk_step * radians.cos()) as i64;
            let step_y = (walk_step * radians.sin()) as i64;

            let position = robot.position();
            let (mut x, mut y) = (i64::from(position.x), i64::from(position.y));
            match robot.intents().movement {
                Movement::Forward => {
                    x += step_x;
                    y += step_y;
                }
                Movement::Backward => {
                    x -= step_x;
                    y -= step_y;
                }
                Movement::None => {}
            }

            let clamped = Position::new(
                x.clamp(margin, max_x) as i32,
                y.clamp(margin, max_y) as i32,
            );
            robot.set_position(clamped);
            if i64::from(clamped.x) != x || i64::from(clamped.y) != y {
                wall_hits += 1;
                if let Some(handler) = self.handlers.get_mut(id) {
                    handler.on_event(ArenaEvent::HitWall, robot);
                }
            }

            match robot.intents().turn {
                Turn::Left => robot.set_heading(robot.heading().wrapping_sub(angle_step)),
                Turn::Right => robot.set_heading(robot.heading().wrapping_add(angle_step)),
                Turn::None => {}
            }
            match robot.intents().turret_turn {
                Turn::Left => {
                    robot.set_turret_heading(robot.turret_heading().wrapping_sub(angle_step));
                }
                Turn::Right => {
                    robot.set_turret_heading(robot.turret_heading().wrapping_add(angle_step));
                }
                Turn::None => {}
            }
        }

        self.tick = self.tick.next();
        self.record_summary(busy_robots, wall_hits);
        busy_robots > 0
    }

    fn record_summary(&mut self, busy_robots: usize, wall_hits: usize) {
        if self.config.history_capacity == 0 {
            return;
        }
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(TickSummary {
            tick: self.tick,
            robot_count: self.order.len(),
            busy_robots,
            wall_hits,
        });
    }

    /// Iterate over retained tick summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }
}

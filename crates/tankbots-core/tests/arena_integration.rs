//! End-to-end scenarios driving the arena tick loop with synthetic clocks.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tankbots_core::{
    Arena, ArenaConfig, ArenaEvent, EventHandler, Movement, Pose, Position, Robot, Task, Tick,
    Turn,
};

const TICK_INTERVAL: Duration = Duration::from_millis(100);

fn seeded_config(seed: u64) -> ArenaConfig {
    ArenaConfig {
        rng_seed: Some(seed),
        ..ArenaConfig::default()
    }
}

#[derive(Default)]
struct RecordingHandler {
    events: Arc<Mutex<Vec<ArenaEvent>>>,
}

impl EventHandler for RecordingHandler {
    fn on_event(&mut self, event: ArenaEvent, _robot: &mut Robot) {
        self.events.lock().expect("events mutex").push(event);
    }
}

#[test]
fn timed_move_spans_ticks_until_wall_clock_deadline() {
    let mut arena = Arena::new(seeded_config(11)).expect("arena");
    let id = arena.add(Robot::with_tasks(
        "runner",
        [Task::forward(Duration::from_millis(1000))],
    ));
    arena
        .robot_mut(id)
        .expect("robot")
        .set_position(Position::new(640, 640));

    let start = Instant::now();

    // Ticks 1 through 10 all fall before the deadline; each keeps the
    // forward intent applied and walks one step up.
    for tick in 0..10u32 {
        assert!(
            arena.step_at(start + TICK_INTERVAL * tick),
            "tick {} should report pending work",
            tick + 1
        );
    }
    {
        let robot = arena.robot(id).expect("robot");
        assert_eq!(robot.position(), Position::new(640, 540));
        assert_eq!(robot.task_count(), 1);
        assert_eq!(robot.intents().movement, Movement::Forward);
    }

    // Tick 11 observes the deadline: the task resets its intent, reports
    // completion, and is discarded without moving the robot further.
    assert!(arena.step_at(start + TICK_INTERVAL * 10));
    let robot = arena.robot(id).expect("robot");
    assert_eq!(robot.position(), Position::new(640, 540));
    assert!(robot.is_idle());
    assert_eq!(robot.intents().movement, Movement::None);

    // With the queue drained the arena reports no pending work.
    assert!(!arena.step_at(start + TICK_INTERVAL * 11));
    assert_eq!(arena.tick(), Tick(12));
}

#[test]
fn backward_drive_clamps_to_margin_and_raises_one_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let mut arena = Arena::new(seeded_config(12)).expect("arena");
    let id = arena.add_with_handler(
        Robot::with_tasks("edge", [Task::backward(Duration::from_secs(5))]),
        Box::new(RecordingHandler {
            events: Arc::clone(&events),
        }),
    );
    arena
        .robot_mut(id)
        .expect("robot")
        .set_position(Position::new(50, 640));

    assert!(arena.step_at(Instant::now()));

    // Heading 0 walks up, so backward drive pushes y down the screen while
    // the x clamp pulls the robot back to the margin.
    let robot = arena.robot(id).expect("robot");
    assert_eq!(robot.position(), Position::new(100, 650));
    assert_eq!(
        events.lock().expect("events").as_slice(),
        &[ArenaEvent::HitWall]
    );
}

fn patrol_robot() -> Robot {
    Robot::with_tasks(
        "patrol",
        [
            Task::forward(Duration::from_millis(400)),
            Task::rotate(Turn::Left, Duration::from_millis(300)),
            Task::rotate_turret(Turn::Right, Duration::from_millis(200)),
            Task::forward(Duration::from_millis(200)),
            Task::stop(),
        ],
    )
}

#[test]
fn scripted_patrol_is_deterministic_and_drains() {
    let run = |seed: u64| -> Vec<Pose> {
        let mut arena = Arena::new(seeded_config(seed)).expect("arena");
        let id = arena.add(patrol_robot());
        arena
            .robot_mut(id)
            .expect("robot")
            .set_position(Position::new(640, 640));

        let start = Instant::now();
        let mut poses = Vec::new();
        for tick in 0..32u32 {
            arena.step_at(start + TICK_INTERVAL * tick);
            poses.push(arena.robot(id).expect("robot").pose());
        }
        poses
    };

    let poses = run(99);
    assert_eq!(poses, run(99));

    // The script turns the hull 3 degrees left and the turret 2 right, and
    // the second leg walks along the slightly rotated heading.
    let last = poses.last().expect("poses");
    assert_eq!(last.heading, -3);
    assert_eq!(last.turret, 2);
    assert_eq!(last.position, Position::new(640, 582));
}

#[test]
fn arena_with_only_idle_robots_reports_no_pending_work() {
    let mut arena = Arena::new(seeded_config(13)).expect("arena");
    arena.add(Robot::new("sentry"));
    arena.add(Robot::new("watcher"));

    assert!(!arena.step_at(Instant::now()));

    let summary = arena.history().last().expect("summary");
    assert_eq!(summary.tick, Tick(1));
    assert_eq!(summary.robot_count, 2);
    assert_eq!(summary.busy_robots, 0);
    assert_eq!(summary.wall_hits, 0);
}

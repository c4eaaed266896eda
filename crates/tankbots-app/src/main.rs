//! Headless driver that runs a scripted arena until every task queue drains.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use tankbots_core::{Arena, ArenaConfig, ArenaEvent, EventHandler, Robot, Task, Turn};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Cadence of the driver loop. Task durations are wall-clock spans, so a
/// one-second task covers roughly ten of these ticks.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    init_tracing();

    let mut arena = bootstrap_arena()?;
    let (width, height) = arena.size();
    info!(
        width,
        height,
        robots = arena.robot_count(),
        "starting arena simulation"
    );

    loop {
        let busy = arena.step();
        for (_, robot) in arena.robots() {
            debug!(tick = arena.tick().0, %robot, "pose");
        }
        if !busy {
            break;
        }
        thread::sleep(TICK_INTERVAL);
    }

    if let Some(summary) = arena.history().last() {
        info!(
            tick = summary.tick.0,
            robots = summary.robot_count,
            "simulation drained, all task queues empty"
        );
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn bootstrap_arena() -> Result<Arena> {
    let config = ArenaConfig {
        rng_seed: Some(0xB075),
        ..ArenaConfig::default()
    };
    let mut arena = Arena::new(config)?;
    arena.add_with_handler(patrol_robot(), Box::new(WallRetreat));
    arena.add(Robot::new("sentry"));
    Ok(arena)
}

/// The demo route: two driving legs joined by slow hull and turret sweeps.
fn patrol_robot() -> Robot {
    Robot::with_tasks(
        "patrol",
        [
            Task::forward(Duration::from_secs(1)),
            Task::rotate(Turn::Left, Duration::from_secs(3)),
            Task::rotate_turret(Turn::Right, Duration::from_secs(3)),
            Task::forward(Duration::from_secs(1)),
            Task::rotate(Turn::Left, Duration::from_secs(5)),
            Task::forward(Duration::from_secs(3)),
        ],
    )
}

/// Abandons the current route on wall contact and backs away briefly so the
/// queue can drain instead of grinding against the boundary.
struct WallRetreat;

impl EventHandler for WallRetreat {
    fn on_event(&mut self, event: ArenaEvent, robot: &mut Robot) {
        match event {
            ArenaEvent::HitWall => {
                warn!(robot = robot.name(), "wall contact, abandoning route");
                robot.clear_tasks();
                robot.intents_mut().clear();
                robot.push_task(Task::backward(Duration::from_millis(500)));
            }
        }
    }
}

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::time::{Duration, Instant};
use tankbots_core::{Arena, ArenaConfig, Robot, Task, Turn};

fn populated_arena(robots: usize) -> Arena {
    let config = ArenaConfig {
        rng_seed: Some(0xB075),
        history_capacity: 0,
        ..ArenaConfig::default()
    };
    let mut arena = Arena::new(config).expect("bench arena config");
    for index in 0..robots {
        arena.add(Robot::with_tasks(
            format!("bot-{index}"),
            [
                Task::forward(Duration::from_secs(30)),
                Task::rotate(Turn::Right, Duration::from_secs(30)),
            ],
        ));
    }
    arena
}

fn bench_arena_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("arena_step");
    group.sample_size(30);
    group.measurement_time(Duration::from_secs(5));

    let steps = 64u32;
    let interval = Duration::from_millis(100);
    for &robots in &[16usize, 128, 1024] {
        group.bench_function(format!("steps{steps}_robots{robots}"), |b| {
            b.iter_batched(
                || populated_arena(robots),
                |mut arena| {
                    let start = Instant::now();
                    for tick in 0..steps {
                        arena.step_at(start + interval * tick);
                    }
                    arena
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_arena_steps);
criterion_main!(benches);

//! # chase
//!
//! A hunter and a handful of targets live on a number line. Every tick the
//! hunter steps towards the nearest target, targets step away from the
//! hunter until they reach the edge of their range, and any target the hunter
//! reaches is removed from the world.
//!
//! ```text
//! RUST_LOG=chase=debug,tickworld=debug cargo run -p chase -- --targets 5
//! ```

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tickworld::{
    ArgValue, Component, Entity, Query, RuntimeConfig, ScheduleEnd, System, Trigger, World,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chase", about = "Hunter/target chase on a number line")]
struct Args {
    /// Number of targets to spawn
    #[arg(short, long, default_value_t = 3)]
    targets: usize,

    /// Number of ticks to simulate
    #[arg(long, default_value_t = 60)]
    ticks: usize,

    /// Milliseconds between ticks
    #[arg(short, long, default_value_t = 20)]
    period_ms: u64,

    /// Targets cannot flee past this distance from the origin
    #[arg(short, long, default_value_t = 25)]
    range: i64,

    /// Worker threads for the runtime (defaults to TICKWORLD_WORKER_THREADS)
    #[arg(short, long)]
    workers: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position(i64);
impl Component for Position {}

#[derive(Debug, Clone, Copy)]
struct Speed(i64);
impl Component for Speed {}

#[derive(Debug, Clone, Copy)]
struct Range(i64);
impl Component for Range {}

#[derive(Debug, Clone, Copy)]
struct Hunter;
impl Component for Hunter {}

#[derive(Debug, Clone, Copy)]
struct Target;
impl Component for Target {}

/// Step the hunter towards the closest target.
fn chase(
    _: Hunter,
    pos: Position,
    speed: Speed,
    targets: Query<(Entity, Target, Position)>,
) -> Position {
    let nearest = targets
        .iter()
        .map(|(_, (_, _, target))| target)
        .min_by_key(|target| (target.0 - pos.0).abs());
    match nearest {
        Some(target) => {
            let gap = target.0 - pos.0;
            Position(pos.0 + gap.signum() * gap.abs().min(speed.0))
        }
        None => pos,
    }
}

/// Step a target away from the hunter, failing once it is cornered.
fn flee(
    _: Target,
    pos: Position,
    range: Range,
    hunters: Query<(Hunter, Position)>,
) -> Result<Position> {
    let Some((_, hunter)) = hunters.first().into_item() else {
        return Ok(pos);
    };
    let step = if pos.0 >= hunter.0 { 1 } else { -1 };
    let next = pos.0 + step;
    if next.abs() > range.0 {
        anyhow::bail!("cornered at {}", pos.0);
    }
    Ok(Position(next))
}

/// Remove targets the hunter has reached.
fn capture(id: Entity, _: Target, pos: Position, hunters: Query<(Hunter, Position)>, world: World) {
    let caught = hunters
        .iter()
        .any(|(_, (_, hunter))| (hunter.0 - pos.0).abs() <= 1);
    if caught && world.remove_object(id) {
        info!(target_entity = %id, at = pos.0, "target caught");
    }
}

/// Log the starting layout.
fn census(id: Entity, pos: Position, _: Target) {
    info!(target_entity = %id, at = pos.0, "target ready");
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("chase=info".parse()?))
        .init();

    let args = Args::parse();
    let world = World::new();

    let hunter = world.spawn((Hunter, Position(0), Speed(2)));
    for i in 0..args.targets {
        let offset = 3 * (i as i64 + 1);
        let start = if i % 2 == 0 { offset } else { -offset };
        world.spawn((Target, Position(start), Range(args.range)));
    }
    info!(%hunter, targets = args.targets, "world populated");

    world.set_error_handler(|name: &str, values: &[ArgValue], err: &anyhow::Error| {
        let at = values.iter().find_map(|arg| arg.downcast_ref::<Position>());
        warn!(system = name, position = ?at, %err, "system error");
    });

    let period = Duration::from_millis(args.period_ms);
    world.add_system(System::new(census));
    world.add_system(System::new(chase).with_trigger(Trigger::ticks(period, args.ticks)));
    world.add_system(System::new(flee).with_trigger(Trigger::ticks(period, args.ticks)));
    world.add_system(System::new(capture).with_trigger(Trigger::ticks(period, args.ticks)));

    let config = match args.workers {
        Some(workers) => RuntimeConfig::from_env().with_worker_threads(workers),
        None => RuntimeConfig::from_env(),
    };
    let report = world.run_blocking(&config)?;

    for outcome in &report.outcomes {
        match &outcome.end {
            ScheduleEnd::Panicked(message) => {
                warn!(system = %outcome.name, panic = %message, "system panicked");
            }
            end => info!(
                system = %outcome.name,
                ticks = outcome.ticks,
                invocations = outcome.invocations,
                errors = outcome.errors,
                ?end,
                "schedule finished"
            ),
        }
    }

    let remaining = world.len().saturating_sub(1);
    info!(remaining, "chase over");
    Ok(())
}

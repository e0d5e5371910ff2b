//! One sweep of one system over the world.

use std::time::SystemTime;

use tracing::{debug, warn};

use crate::error::SignatureError;
use crate::param::ArgValue;
use crate::system::System;
use crate::world::World;

/// Everything shared by the invocations of a single sweep.
pub(crate) struct Tick<'a> {
    pub world: &'a World,
    pub now: SystemTime,
}

/// What happened when a system was matched against one object.
pub(crate) enum EntityOutcome {
    /// A component parameter was missing.
    Skipped,
    /// A parameter could not be built at all.
    Invalid(SignatureError),
    /// The system ran; `written` values were stored back.
    Invoked { written: usize },
    /// The system ran and returned an error. Values returned next to the
    /// error were still written.
    Failed {
        args: Vec<ArgValue>,
        error: anyhow::Error,
        written: usize,
    },
}

/// Counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Objects the system was invoked on.
    pub matched: usize,
    /// Objects lacking a required component.
    pub skipped: usize,
    /// Objects passed over because a parameter was malformed.
    pub invalid: usize,
    /// Invocations that returned an error.
    pub errors: usize,
    /// Component values written back.
    pub written: usize,
}

/// Run `system` on every object of `world` at timestamp `now`.
///
/// The object list is snapshotted once; objects removed during the sweep are
/// passed over, objects added during it are not visited.
pub(crate) fn sweep(world: &World, system: &System, now: SystemTime) -> SweepStats {
    let snapshot = world.snapshot();
    let tick = Tick { world, now };
    let mut stats = SweepStats::default();

    for object in snapshot.iter() {
        if !world.contains(object.entity()) {
            continue;
        }
        match system.run_on(&tick, object) {
            EntityOutcome::Skipped => stats.skipped += 1,
            EntityOutcome::Invalid(err) => {
                stats.invalid += 1;
                warn!(
                    system = system.name(),
                    entity = %object.entity(),
                    error = %err,
                    "skipping entity"
                );
            }
            EntityOutcome::Invoked { written } => {
                stats.matched += 1;
                stats.written += written;
            }
            EntityOutcome::Failed {
                args,
                error,
                written,
            } => {
                stats.matched += 1;
                stats.errors += 1;
                stats.written += written;
                world.report_system_error(system.name(), &args, &error);
            }
        }
    }

    debug!(
        system = system.name(),
        objects = snapshot.len(),
        matched = stats.matched,
        skipped = stats.skipped,
        errors = stats.errors,
        "sweep complete"
    );
    stats
}

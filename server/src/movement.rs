//! Movement resolver: walks sprites towards their destination one tick at a
//! time, sliding along an axis when the direct step is blocked.

use crate::error::StepError;
use crate::hooks::HookRegistry;
use crate::map::Map;
use crate::step::StepContext;
use shared::{angle, distance, project, ObjectId};

/// Remaining distance below which a sprite counts as arrived.
pub const ARRIVAL_EPSILON: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// No destination.
    Idle,
    Moved,
    /// Placed on (or within a step of) the destination, which is cleared.
    Arrived,
    /// Every candidate was illegal; destination cleared, position unchanged.
    Blocked,
}

pub fn install(hooks: &mut HookRegistry) {
    hooks.movement("stepMoveTowardDestination", step_move);
}

fn step_move(ctx: &mut StepContext<'_>, sprite: ObjectId) -> Result<(), StepError> {
    move_sprite(ctx.map, sprite, ctx.clock.per_tick(1.0));
    Ok(())
}

/// Advances one sprite by at most `speed * seconds_per_tick`.
pub fn move_sprite(map: &mut Map, id: ObjectId, seconds_per_tick: f32) -> MoveOutcome {
    let Some(obj) = map.object(id) else {
        return MoveOutcome::Idle;
    };
    let Some(target) = obj.move_target else {
        return MoveOutcome::Idle;
    };
    let (ax, ay) = (obj.anchor_x, obj.anchor_y);
    let step = target.speed * seconds_per_tick;

    let to_go = distance(ax, ay, target.dest_x, target.dest_y);
    if step <= 0.0 || to_go < ARRIVAL_EPSILON {
        map.stop_object(id);
        return MoveOutcome::Arrived;
    }

    let heading = angle(ax, ay, target.dest_x, target.dest_y);
    // never overshoot the destination
    let (nx, ny) = project(ax, ay, heading, step.min(to_go));

    let legal = |x: f32, y: f32| {
        if target.ignore_bounds {
            map.within_extent(x, y)
        } else {
            map.is_in_bounds(x, y)
        }
    };

    let candidate = if legal(nx, ny) {
        Some((nx, ny))
    } else if nx != ax && legal(nx, ay) {
        Some((nx, ay))
    } else if ny != ay && legal(ax, ny) {
        Some((ax, ny))
    } else {
        None
    };

    let turned = match map.object_mut(id) {
        Some(obj) => obj.direction.replace(heading) != Some(heading),
        None => false,
    };

    let Some((cx, cy)) = candidate else {
        map.stop_object(id);
        // facing is sent to clients
        if turned {
            map.mark_changed();
        }
        return MoveOutcome::Blocked;
    };

    let remaining = distance(cx, cy, target.dest_x, target.dest_y);
    map.set_location_by_anchor(id, cx, cy);
    if remaining < ARRIVAL_EPSILON || remaining < step {
        map.stop_object(id);
        MoveOutcome::Arrived
    } else {
        MoveOutcome::Moved
    }
}

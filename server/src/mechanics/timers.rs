//! Scheduled layer visibility and object expiry.

use crate::error::StepError;
use crate::hooks::{HookRegistry, InitContext, Phase};
use crate::step::StepContext;
use log::debug;
use shared::{ObjectId, TimedField};

pub fn install(hooks: &mut HookRegistry) {
    hooks.init("initTimers", init_timers);
    hooks.map_start("stepMapStartLayerTimers", step_layer_timers);
    hooks.map_start("stepMapStartObjectTimers", step_object_timers);
}

/// Timers settle before any other map start hook looks at the map.
fn init_timers(ctx: &mut InitContext<'_>) -> Result<(), StepError> {
    ctx.set_hook_priority(Phase::MapStart, "stepMapStartLayerTimers", 10);
    ctx.set_hook_priority(Phase::MapStart, "stepMapStartObjectTimers", 10);
    Ok(())
}

fn step_layer_timers(ctx: &mut StepContext<'_>) -> Result<(), StepError> {
    let now = ctx.clock.now;
    let due: Vec<(String, bool)> = ctx
        .map
        .layers()
        .iter()
        .flat_map(|layer| {
            let show = layer.show_after.filter(|at| *at <= now).map(|_| true);
            let hide = layer.hide_after.filter(|at| *at <= now).map(|_| false);
            show.into_iter()
                .chain(hide)
                .map(move |visible| (layer.name.clone(), visible))
        })
        .collect();

    for (name, visible) in due {
        ctx.map.set_layer_visible(&name, visible);
        ctx.map.schedule_layer(&name, visible, None);
        debug!("Map '{}': layer '{}' visible={}", ctx.map.name, name, visible);
    }
    Ok(())
}

fn step_object_timers(ctx: &mut StepContext<'_>) -> Result<(), StepError> {
    let now = ctx.clock.now;
    let expired: Vec<ObjectId> = ctx
        .map
        .objects()
        .filter(|obj| {
            obj.expires
                .get(&TimedField::Object)
                .map_or(false, |at| *at <= now)
        })
        .map(|obj| obj.id)
        .collect();

    for id in expired {
        if let Some(gone) = ctx.map.take_object(id) {
            debug!("Map '{}': {} expired", ctx.map.name, gone.object.describe());
        }
    }
    Ok(())
}

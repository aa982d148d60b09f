//! Respawn points saved by touching a zone, restored by hazards.

use crate::error::StepError;
use crate::hooks::HookRegistry;
use crate::step::{StepContext, TriggerFlow};
use log::debug;
use shared::{ObjectId, RespawnPoint};

pub fn install(hooks: &mut HookRegistry) {
    hooks
        .trigger("saveRespawnPoint", trigger_save_respawn_point)
        .priority(50);
}

fn trigger_save_respawn_point(
    ctx: &mut StepContext<'_>,
    _trigger: ObjectId,
    sprite: ObjectId,
) -> Result<TriggerFlow, StepError> {
    let map_name = ctx.map.name.clone();
    if let Some(obj) = ctx.map.object_mut(sprite) {
        obj.respawn = Some(RespawnPoint {
            map_name,
            x: obj.anchor_x,
            y: obj.anchor_y,
        });
    }
    Ok(TriggerFlow::Continue)
}

/// Sends `sprite` back to its saved respawn point. Returns whether it moved;
/// sprites that never saved one stay put.
pub fn respawn(ctx: &mut StepContext<'_>, sprite: ObjectId) -> Result<bool, StepError> {
    let Some(point) = ctx.map.object(sprite).and_then(|s| s.respawn.clone()) else {
        return Ok(false);
    };
    debug!(
        "Respawning {:?} at '{}' ({}, {})",
        sprite, point.map_name, point.x, point.y
    );
    ctx.relocate(sprite, &point.map_name, point.x, point.y)?;
    Ok(true)
}

//! Speed zones scale the speed of sprites moving through them.
//!
//! The zone is re-applied every tick the sprite's anchor is inside it and
//! undone at sprite end, so leaving the zone restores the exact original
//! speed. Overlapping zones multiply.

use super::required_f32;
use crate::error::StepError;
use crate::hooks::HookRegistry;
use crate::step::{StepContext, TriggerFlow};
use shared::ObjectId;

pub fn install(hooks: &mut HookRegistry) {
    hooks
        .trigger("speedMultiplier", trigger_speed_multiplier)
        .priority(40);
    hooks.sprite_end("stepSpriteEndRestoreSpeed", restore_speed);
}

fn trigger_speed_multiplier(
    ctx: &mut StepContext<'_>,
    trigger: ObjectId,
    sprite: ObjectId,
) -> Result<TriggerFlow, StepError> {
    let zone = ctx
        .map
        .object(trigger)
        .ok_or_else(|| StepError::MissingObject(trigger, ctx.map.name.clone()))?;
    let multiplier = required_f32(zone, "speedMultiplier")?;

    let Some(obj) = ctx.map.object_mut(sprite) else {
        return Ok(TriggerFlow::Continue);
    };
    // saws keep their pace; thrown things fly at a fixed speed
    if obj.kind == "saw" {
        return Ok(TriggerFlow::Continue);
    }
    if let Some(target) = obj.move_target.as_mut().filter(|t| !t.ignore_bounds) {
        obj.normal_speed.get_or_insert(target.speed);
        target.speed *= multiplier;
    }
    Ok(TriggerFlow::Continue)
}

fn restore_speed(ctx: &mut StepContext<'_>, sprite: ObjectId) -> Result<(), StepError> {
    if let Some(obj) = ctx.map.object_mut(sprite) {
        if let Some(normal) = obj.normal_speed.take() {
            if let Some(target) = obj.move_target.as_mut() {
                target.speed = normal;
            }
        }
    }
    Ok(())
}

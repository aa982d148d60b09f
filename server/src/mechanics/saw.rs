//! Saws patrol between `minX` and `maxX` and send anything they touch back to
//! its respawn point. A `stopSaw` zone freezes the named saw while occupied.

use super::respawn::respawn;
use super::{required_f32, required_str, sprites_become_triggers};
use crate::error::StepError;
use crate::hooks::{HookRegistry, InitContext};
use crate::map::{ObjectList, ObjectQuery};
use crate::step::{StepContext, TriggerFlow};
use shared::{MoveTarget, ObjectId};

pub const DEFAULT_SAW_FRAMES: u32 = 5;

pub fn install(hooks: &mut HookRegistry) {
    hooks.init("initSaws", init_saws);
    hooks.sprite_start("stepSpriteStartSaw", step_saw);
    hooks.trigger("saw", trigger_saw).priority(20);
    hooks.trigger("stopSaw", trigger_stop_saw).priority(50);
    hooks.sprite_end("stepSpriteEndResumeSaw", resume_saw);
}

fn init_saws(ctx: &mut InitContext<'_>) -> Result<(), StepError> {
    sprites_become_triggers(ctx, "saw");
    Ok(())
}

fn is_saw(ctx: &StepContext<'_>, id: ObjectId) -> bool {
    ctx.map.object(id).map_or(false, |o| o.kind == "saw")
}

/// Turns a stopped saw around and spins its blade one frame.
fn step_saw(ctx: &mut StepContext<'_>, sprite: ObjectId) -> Result<(), StepError> {
    if !is_saw(ctx, sprite) {
        return Ok(());
    }
    let map_name = ctx.map.name.clone();
    let saw = ctx
        .map
        .object_mut(sprite)
        .ok_or(StepError::MissingObject(sprite, map_name))?;

    if saw.move_target.is_none() && saw.paused_move.is_none() {
        let speed = required_f32(saw, "speed")?;
        let min_x = required_f32(saw, "minX")?;
        let max_x = required_f32(saw, "maxX")?;
        let dest_x = if speed > 0.0 { max_x } else { min_x };
        saw.move_target = Some(MoveTarget::new(dest_x, saw.anchor_y, speed.abs()));
        // next time it stops it heads the other way
        saw.set_property("speed", f64::from(-speed));
    }

    let frames = saw
        .prop_f32("frames")
        .map_or(DEFAULT_SAW_FRAMES, |f| (f as u32).max(1));
    let Some(tile) = saw.tile.as_ref() else {
        return Ok(());
    };
    let tileset = tile.tileset.clone();
    let tile_number = (tile.tile_number + 1) % frames;

    let gid = ctx.map.find_gid(&tileset, tile_number);
    if let Some(tile) = ctx.map.object_mut(sprite).and_then(|s| s.tile.as_mut()) {
        tile.tile_number = tile_number;
        if let Some(gid) = gid {
            tile.gid = gid;
        }
    }
    ctx.map.mark_changed();
    Ok(())
}

fn trigger_saw(
    ctx: &mut StepContext<'_>,
    _trigger: ObjectId,
    sprite: ObjectId,
) -> Result<TriggerFlow, StepError> {
    if is_saw(ctx, sprite) {
        return Ok(TriggerFlow::Continue);
    }
    if respawn(ctx, sprite)? {
        Ok(TriggerFlow::Stop)
    } else {
        Ok(TriggerFlow::Continue)
    }
}

fn trigger_stop_saw(
    ctx: &mut StepContext<'_>,
    trigger: ObjectId,
    _sprite: ObjectId,
) -> Result<TriggerFlow, StepError> {
    let zone = ctx
        .map
        .object(trigger)
        .ok_or_else(|| StepError::MissingObject(trigger, ctx.map.name.clone()))?;
    let saw_name = required_str(zone, "sawName")?;
    let found = ctx.map.find_object(
        &ObjectQuery::new()
            .named(saw_name)
            .of_kind("saw")
            .in_list(ObjectList::Sprites),
    );
    let Some(saw) = found.and_then(|id| ctx.map.object_mut(id)) else {
        return Ok(TriggerFlow::Continue);
    };
    if let Some(target) = saw.move_target.take() {
        saw.paused_move = Some(target);
    }
    Ok(TriggerFlow::Continue)
}

fn resume_saw(ctx: &mut StepContext<'_>, sprite: ObjectId) -> Result<(), StepError> {
    if let Some(obj) = ctx.map.object_mut(sprite) {
        if let Some(target) = obj.paused_move.take() {
            obj.move_target = Some(target);
        }
    }
    Ok(())
}

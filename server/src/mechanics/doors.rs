//! Map doors, locked doors and portkeys.

use super::actions::TOUCH_TEXT_PRIORITY;
use super::{required_str, sprites_become_triggers};
use crate::error::StepError;
use crate::hooks::{HookRegistry, InitContext};
use crate::step::{StepContext, TextSlot, TriggerFlow};
use log::{info, warn};
use shared::ObjectId;

pub const LOCKED_TEXT: &str = "The door is locked.";
pub const LOCKED_SPEECH_PRIORITY: i32 = 10;

pub fn install(hooks: &mut HookRegistry) {
    hooks.init("initPortkeys", init_portkeys);
    hooks.trigger("mapDoor", trigger_map_door).priority(10);
    hooks.trigger("portkey", trigger_portkey).priority(10);
    hooks.trigger("lockedMapDoor", trigger_locked_map_door).priority(15);
}

fn init_portkeys(ctx: &mut InitContext<'_>) -> Result<(), StepError> {
    sprites_become_triggers(ctx, "portkey");
    Ok(())
}

/// Sends the sprite to reference `destReference` on `destMapName` (this map
/// when absent) and stops all further triggers for it this tick.
pub fn trigger_map_door(
    ctx: &mut StepContext<'_>,
    trigger: ObjectId,
    sprite: ObjectId,
) -> Result<TriggerFlow, StepError> {
    let door = ctx
        .map
        .object(trigger)
        .ok_or_else(|| StepError::MissingObject(trigger, ctx.map.name.clone()))?;
    let reference = required_str(door, "destReference")?.to_string();
    let dest_map = door
        .prop_str("destMapName")
        .unwrap_or(&ctx.map.name)
        .to_string();

    let dest = ctx
        .map_named(&dest_map)
        .ok_or_else(|| StepError::UnknownMap(dest_map.clone()))?;
    let (ax, ay) = dest
        .find_reference(&reference)
        .map(|r| (r.anchor_x, r.anchor_y))
        .ok_or_else(|| StepError::ReferenceNotFound {
            map: dest_map.clone(),
            reference: reference.clone(),
        })?;

    ctx.relocate(sprite, &dest_map, ax, ay)?;
    Ok(TriggerFlow::Stop)
}

/// Opens when touched by a sprite holding the item named by `unlocks`:
/// becomes a plain map door and swaps the closed/open door layers.
fn trigger_locked_map_door(
    ctx: &mut StepContext<'_>,
    trigger: ObjectId,
    sprite: ObjectId,
) -> Result<TriggerFlow, StepError> {
    let door = ctx
        .map
        .object(trigger)
        .ok_or_else(|| StepError::MissingObject(trigger, ctx.map.name.clone()))?;
    let key = required_str(door, "unlocks")?.to_string();
    let closed_layer = door.prop_str("closedLayer").unwrap_or("doorClosed").to_string();
    let open_layer = door.prop_str("openLayer").unwrap_or("doorOpen").to_string();
    let locked_text = door.prop_str("lockedText").unwrap_or(LOCKED_TEXT).to_string();

    let held = ctx
        .map
        .object(sprite)
        .and_then(|s| s.holding.as_ref())
        .map(|h| h.name.clone());

    if held.as_deref() != Some(key.as_str()) {
        ctx.offer_text(sprite, TextSlot::Speech, LOCKED_SPEECH_PRIORITY, locked_text);
        return Ok(TriggerFlow::Continue);
    }

    if let Some(door) = ctx.map.object_mut(trigger) {
        door.kind = "mapDoor".to_string();
    }
    for (layer, visible) in [(&closed_layer, false), (&open_layer, true)] {
        if !ctx.map.set_layer_visible(layer, visible) {
            warn!("Map '{}' has no door layer '{}'", ctx.map.name, layer);
        }
    }
    ctx.map.mark_changed();
    info!("Map '{}': door {:?} unlocked with {}", ctx.map.name, trigger, key);
    Ok(TriggerFlow::Continue)
}

fn trigger_portkey(
    ctx: &mut StepContext<'_>,
    trigger: ObjectId,
    sprite: ObjectId,
) -> Result<TriggerFlow, StepError> {
    let Some((action, is_player)) = ctx.map.object(sprite).map(|s| (s.action, s.is_player())) else {
        return Ok(TriggerFlow::Continue);
    };
    if action {
        if let Some(obj) = ctx.map.object_mut(sprite) {
            obj.action = false;
        }
        return trigger_map_door(ctx, trigger, sprite);
    }
    if is_player {
        let name = ctx.map.object(trigger).map(|t| t.name.clone()).unwrap_or_default();
        ctx.offer_text(
            sprite,
            TextSlot::Action,
            TOUCH_TEXT_PRIORITY,
            format!("Available Action: Touch {}", name),
        );
    }
    Ok(TriggerFlow::Continue)
}

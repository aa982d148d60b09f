//! Pick up, use, throw and drop.
//!
//! A player's action request is consumed by at most one mechanic per tick:
//! picking up (trigger), using (trigger), throwing and dropping (sprite end),
//! in that order. Whatever is left is cleared at the end of the tick. The
//! action text offered to the player follows the same order, so the hint
//! always names the action that would run.

use super::{doors, required_f32, sprites_become_triggers, switches};
use crate::error::StepError;
use crate::hooks::{HookRegistry, InitContext};
use crate::map::{Detached, Map, ObjectList, ObjectQuery};
use crate::step::{StepContext, TextSlot, TriggerFlow};
use log::{debug, warn};
use shared::{MoveTarget, ObjectId};

pub const PICK_UP_TEXT_PRIORITY: i32 = 10;
pub const TOUCH_TEXT_PRIORITY: i32 = 15;
pub const USE_TEXT_PRIORITY: i32 = 20;
pub const THROW_TEXT_PRIORITY: i32 = 25;
pub const DROP_TEXT_PRIORITY: i32 = 30;

/// Pixels per second of a thrown item.
pub const THROW_SPEED: f32 = 360.0;

pub fn install(hooks: &mut HookRegistry) {
    hooks.init("initHoldables", init_holdables);
    hooks.trigger("holdable", trigger_holdable).priority(20);
    hooks.trigger("useable", trigger_useable).priority(30);
    hooks.sprite_end("stepSpriteEndThrow", step_throw).priority(10);
    hooks.sprite_end("stepSpriteEndDrop", step_drop).priority(20);
    hooks.sprite_end("stepSpriteEndClearAction", step_clear_action).priority(90);
}

fn init_holdables(ctx: &mut InitContext<'_>) -> Result<(), StepError> {
    sprites_become_triggers(ctx, "holdable");
    sprites_become_triggers(ctx, "useable");
    Ok(())
}

struct Actor {
    action: bool,
    is_player: bool,
    holding: Option<String>,
    anchor: (f32, f32),
}

fn actor(map: &Map, id: ObjectId) -> Option<Actor> {
    map.object(id).map(|obj| Actor {
        action: obj.action,
        is_player: obj.is_player(),
        holding: obj.holding.as_ref().map(|h| h.name.clone()),
        anchor: (obj.anchor_x, obj.anchor_y),
    })
}

fn consume_action(map: &mut Map, id: ObjectId) {
    if let Some(obj) = map.object_mut(id) {
        obj.action = false;
    }
}

fn object_name(map: &Map, id: ObjectId) -> String {
    map.object(id).map(|o| o.name.clone()).unwrap_or_default()
}

/// Moves `item` off the map into `holder`'s hands.
pub fn pick_up(map: &mut Map, holder: ObjectId, item: ObjectId) -> bool {
    if !map.contains(holder) || holder == item {
        return false;
    }
    let Some(Detached { mut object, .. }) = map.take_object(item) else {
        return false;
    };
    object.stop();
    object.action_text = None;
    object.speech_text = None;
    debug!("{:?} picked up {}", holder, object.describe());
    if let Some(obj) = map.object_mut(holder) {
        obj.holding = Some(Box::new(object));
    }
    map.mark_changed();
    true
}

/// Puts whatever `holder` carries down at its anchor, as a sprite and a trigger.
pub fn drop_held(map: &mut Map, holder: ObjectId) -> Option<ObjectId> {
    let (mut item, ax, ay) = {
        let obj = map.object_mut(holder)?;
        let item = obj.holding.take()?;
        (*item, obj.anchor_x, obj.anchor_y)
    };
    map.place_by_anchor(&mut item, ax, ay);
    item.stop();
    let id = map.add_object(item, ObjectList::Sprites);
    map.add_to_list(id, ObjectList::Triggers);
    Some(id)
}

fn trigger_holdable(
    ctx: &mut StepContext<'_>,
    trigger: ObjectId,
    sprite: ObjectId,
) -> Result<TriggerFlow, StepError> {
    let Some(actor) = actor(ctx.map, sprite) else {
        return Ok(TriggerFlow::Continue);
    };
    if actor.holding.is_some() {
        return Ok(TriggerFlow::Continue);
    }
    if actor.action {
        if pick_up(ctx.map, sprite, trigger) {
            consume_action(ctx.map, sprite);
        }
    } else if actor.is_player {
        let text = format!("Available Action: Pick Up {}", object_name(ctx.map, trigger));
        ctx.offer_text(sprite, TextSlot::Action, PICK_UP_TEXT_PRIORITY, text);
    }
    Ok(TriggerFlow::Continue)
}

fn trigger_useable(
    ctx: &mut StepContext<'_>,
    trigger: ObjectId,
    sprite: ObjectId,
) -> Result<TriggerFlow, StepError> {
    let Some(actor) = actor(ctx.map, sprite) else {
        return Ok(TriggerFlow::Continue);
    };
    if !actor.action {
        if actor.is_player {
            let text = format!("Available Action: Use {}", object_name(ctx.map, trigger));
            ctx.offer_text(sprite, TextSlot::Action, USE_TEXT_PRIORITY, text);
        }
        return Ok(TriggerFlow::Continue);
    }

    consume_action(ctx.map, sprite);
    let effect = ctx
        .map
        .object(trigger)
        .and_then(|o| o.prop_str("trigger"))
        .map(str::to_string);
    match effect.as_deref() {
        Some("mapDoor") => doors::trigger_map_door(ctx, trigger, sprite),
        Some("cycle") => {
            switches::cycle_state(ctx, trigger)?;
            Ok(TriggerFlow::Continue)
        }
        Some(other) => {
            warn!("Useable {:?} names unsupported trigger '{}'", trigger, other);
            Ok(TriggerFlow::Continue)
        }
        None => Ok(TriggerFlow::Continue),
    }
}

fn step_throw(ctx: &mut StepContext<'_>, sprite: ObjectId) -> Result<(), StepError> {
    let Some(actor) = actor(ctx.map, sprite) else {
        return Ok(());
    };
    let Some(held) = actor.holding else {
        return Ok(());
    };
    let (ax, ay) = actor.anchor;
    let Some(area) = ctx.map.find_object(
        &ObjectQuery::new()
            .at(ax, ay)
            .of_kind("throwArea")
            .in_list(ObjectList::Reference),
    ) else {
        return Ok(());
    };

    if !actor.action {
        if actor.is_player {
            let text = format!("Available Action: Throw {}", held);
            ctx.offer_text(sprite, TextSlot::Action, THROW_TEXT_PRIORITY, text);
        }
        return Ok(());
    }

    let (dx, dy) = match ctx.map.object(area) {
        Some(area) => (required_f32(area, "deltaX")?, required_f32(area, "deltaY")?),
        None => return Ok(()),
    };
    consume_action(ctx.map, sprite);
    if let Some(item) = drop_held(ctx.map, sprite) {
        ctx.map.set_destination(
            item,
            MoveTarget {
                dest_x: ax + dx,
                dest_y: ay + dy,
                speed: THROW_SPEED,
                ignore_bounds: true,
            },
        );
        debug!("{:?} threw {}", sprite, held);
    }
    Ok(())
}

fn step_drop(ctx: &mut StepContext<'_>, sprite: ObjectId) -> Result<(), StepError> {
    let Some(actor) = actor(ctx.map, sprite) else {
        return Ok(());
    };
    let Some(held) = actor.holding else {
        return Ok(());
    };
    if actor.action {
        consume_action(ctx.map, sprite);
        drop_held(ctx.map, sprite);
    } else if actor.is_player {
        let text = format!("Available Action: Drop {}", held);
        ctx.offer_text(sprite, TextSlot::Action, DROP_TEXT_PRIORITY, text);
    }
    Ok(())
}

fn step_clear_action(ctx: &mut StepContext<'_>, sprite: ObjectId) -> Result<(), StepError> {
    if let Some(obj) = ctx.map.object_mut(sprite) {
        if obj.action {
            obj.action = false;
            debug!("{:?}: nothing to do with the action request", sprite);
        }
    }
    Ok(())
}

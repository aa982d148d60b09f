//! Area speech hints.
//!
//! A reference region with `hintText` makes players standing in it say that
//! text. A region naming an `item` talks to players who are not holding that
//! item; any other region only talks to empty-handed players. With a
//! `pendingLayer` (optionally `map/layer`) the region switches to `doneText`
//! once that layer is hidden.

use super::switches::Target;
use crate::error::StepError;
use crate::hooks::HookRegistry;
use crate::map::{ObjectList, ObjectQuery};
use crate::step::{StepContext, TextSlot};
use shared::ObjectId;

/// Locked doors (10) speak over area hints.
pub const AREA_HINT_SPEECH_PRIORITY: i32 = 20;

pub fn install(hooks: &mut HookRegistry) {
    hooks.sprite_end("stepSpriteEndAreaHints", step_area_hints).priority(50);
}

fn layer_pending(ctx: &StepContext<'_>, spec: &str) -> bool {
    let Some(target) = Target::parse(spec) else {
        return true;
    };
    let map_name = target.map.as_deref().unwrap_or(&ctx.map.name);
    ctx.map_named(map_name)
        .and_then(|map| map.layer_visible(&target.name))
        .unwrap_or(true)
}

fn step_area_hints(ctx: &mut StepContext<'_>, sprite: ObjectId) -> Result<(), StepError> {
    let Some(obj) = ctx.map.object(sprite).filter(|o| o.is_player()) else {
        return Ok(());
    };
    let held = obj.holding.as_ref().map(|h| h.name.clone());
    let areas = ctx.map.find_all(
        &ObjectQuery::new()
            .at(obj.anchor_x, obj.anchor_y)
            .in_list(ObjectList::Reference),
    );

    let mut hint = None;
    for id in areas {
        let Some(area) = ctx.map.object(id) else {
            continue;
        };
        let Some(text) = area.prop_str("hintText") else {
            continue;
        };
        let applies = match area.prop_str("item") {
            Some(item) => held.as_deref() != Some(item),
            None => held.is_none(),
        };
        if !applies {
            continue;
        }
        let done = area
            .prop_str("pendingLayer")
            .is_some_and(|layer| !layer_pending(ctx, layer));
        let text = if done {
            area.prop_str("doneText").unwrap_or(text)
        } else {
            text
        };
        hint = Some(text.to_string());
        break;
    }

    if let Some(text) = hint {
        ctx.offer_text(sprite, TextSlot::Speech, AREA_HINT_SPEECH_PRIORITY, text);
    }
    Ok(())
}

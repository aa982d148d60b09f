//! Pop-up text: overlay text shown while a player stands in a zone.

use super::required_str;
use crate::error::StepError;
use crate::hooks::HookRegistry;
use crate::map::{ObjectList, ObjectQuery};
use crate::step::{StepContext, TriggerFlow};
use log::warn;
use shared::{GameObject, ObjectId, TextSpec};

pub const DEFAULT_TEXT_COLOR: &str = "#00ff00";
pub const DEFAULT_TEXT_SIZE: u32 = 16;

pub fn install(hooks: &mut HookRegistry) {
    hooks.map_start("stepMapStartPopUpText", clear_overlay);
    hooks.trigger("popUpText", trigger_pop_up_text).priority(90);
}

/// Pop-ups only live for the tick they were raised in.
fn clear_overlay(ctx: &mut StepContext<'_>) -> Result<(), StepError> {
    let stale = ctx.map.find_all(
        &ObjectQuery::new()
            .of_kind("popUpText")
            .in_list(ObjectList::Overlay),
    );
    for id in stale {
        ctx.map.remove_object(id, ObjectList::Overlay);
    }
    Ok(())
}

fn trigger_pop_up_text(
    ctx: &mut StepContext<'_>,
    trigger: ObjectId,
    sprite: ObjectId,
) -> Result<TriggerFlow, StepError> {
    if !ctx.map.object(sprite).map_or(false, |s| s.is_player()) {
        return Ok(TriggerFlow::Continue);
    }
    let zone = ctx
        .map
        .object(trigger)
        .ok_or_else(|| StepError::MissingObject(trigger, ctx.map.name.clone()))?;
    let reference = required_str(zone, "textReference")?;
    let spec = TextSpec {
        text: required_str(zone, "text")?.to_string(),
        color: zone
            .prop_str("textColor")
            .unwrap_or(DEFAULT_TEXT_COLOR)
            .to_string(),
        size: zone
            .prop_f32("textSize")
            .map_or(DEFAULT_TEXT_SIZE, |s| s.max(1.0) as u32),
    };

    let Some(anchor) = ctx.map.find_reference(reference) else {
        warn!(
            "Map '{}': pop-up text reference '{}' not found",
            ctx.map.name, reference
        );
        return Ok(TriggerFlow::Continue);
    };
    let mut overlay = GameObject::new(
        &anchor.name,
        "popUpText",
        anchor.x,
        anchor.y,
        anchor.width,
        anchor.height,
    );
    overlay.anchor_x = anchor.anchor_x;
    overlay.anchor_y = anchor.anchor_y;
    overlay.text = Some(spec);

    ctx.map.add_object(overlay, ObjectList::Overlay);
    Ok(TriggerFlow::Continue)
}

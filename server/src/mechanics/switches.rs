//! Switches: author-defined effects that flip layers and bring stored
//! regions into play, possibly on other maps.
//!
//! An effect list is a comma separated property value such as
//! `"hide:rockOnStairs, show:under/rockOffStairs, enable:ladderDoor"`. A
//! target written `map/name` acts on another map. `enable` and `disable` act
//! on reference objects that carry a `restoreTo` list name: enabling adds the
//! object to that list, disabling takes it out again. The object never leaves
//! the reference list, so it can be toggled any number of times. A stored
//! object with `enabled = true` starts in its list.
//!
//! Two mechanics fire effect lists:
//!
//! - `itemArea` references run `effects` when a sprite holding `item` acts
//!   inside them. They may also use a named useable remotely (`uses`) and
//!   may destroy the item (`consumesItem`).
//! - useables with `trigger = "cycle"` step through `states` states. Entering
//!   state N runs the `stateN` effects and advances the tile by one frame.

use super::required_f32;
use crate::error::StepError;
use crate::hooks::{HookRegistry, InitContext};
use crate::map::{Map, ObjectList, ObjectQuery};
use crate::step::{StepContext, TextSlot};
use log::{error, info, warn};
use shared::{GameObject, ObjectId};

/// Lower than every other action hint: an item area takes precedence.
pub const ITEM_AREA_TEXT_PRIORITY: i32 = 5;

pub fn install(hooks: &mut HookRegistry) {
    hooks.init("initStoredObjects", init_stored_objects);
    hooks.sprite_start("stepSpriteStartItemArea", step_item_area).priority(5);
}

/// An object on some map, `map/name` or just `name` for the current map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub map: Option<String>,
    pub name: String,
}

impl Target {
    pub fn parse(text: &str) -> Option<Target> {
        let text = text.trim();
        let (map, name) = match text.split_once('/') {
            Some((map, name)) => (Some(map.trim().to_string()), name.trim()),
            None => (None, text),
        };
        if name.is_empty() || map.as_deref() == Some("") {
            return None;
        }
        Some(Target {
            map,
            name: name.to_string(),
        })
    }

    fn map_name<'m>(&'m self, current: &'m str) -> &'m str {
        self.map.as_deref().unwrap_or(current)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Show(Target),
    Hide(Target),
    Enable(Target),
    Disable(Target),
}

impl Effect {
    fn target(&self) -> &Target {
        match self {
            Effect::Show(t) | Effect::Hide(t) | Effect::Enable(t) | Effect::Disable(t) => t,
        }
    }
}

pub fn parse_effects(spec: &str) -> Result<Vec<Effect>, String> {
    let mut effects = Vec::new();
    for item in spec.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let (verb, target) = item
            .split_once(':')
            .ok_or_else(|| format!("'{}' is not verb:target", item))?;
        let target = Target::parse(target).ok_or_else(|| format!("'{}' has no target", item))?;
        let effect = match verb.trim() {
            "show" => Effect::Show(target),
            "hide" => Effect::Hide(target),
            "enable" => Effect::Enable(target),
            "disable" => Effect::Disable(target),
            other => return Err(format!("unknown effect '{}'", other)),
        };
        effects.push(effect);
    }
    Ok(effects)
}

/// Effects stored under `key`; none when the property is absent.
pub fn effects_of(obj: &GameObject, key: &str) -> Result<Vec<Effect>, StepError> {
    match obj.prop_str(key) {
        Some(spec) => parse_effects(spec).map_err(|reason| StepError::InvalidProperty {
            object: obj.describe(),
            property: key.to_string(),
            reason,
        }),
        None => Ok(Vec::new()),
    }
}

fn restore_list(obj: &GameObject) -> Result<ObjectList, StepError> {
    let invalid = |reason: &str| StepError::InvalidProperty {
        object: obj.describe(),
        property: "restoreTo".to_string(),
        reason: reason.to_string(),
    };
    let name = obj.prop_str("restoreTo").ok_or_else(|| invalid("missing"))?;
    match ObjectList::from_name(name) {
        Some(ObjectList::Reference) => Err(invalid("cannot be the reference list")),
        Some(list) => Ok(list),
        None => Err(invalid("unknown list")),
    }
}

fn toggle_stored(map: &mut Map, name: &str, enable: bool) -> Result<(), StepError> {
    let (id, list) = match map.find_reference(name) {
        Some(obj) => (obj.id, restore_list(obj)?),
        None => {
            return Err(StepError::ReferenceNotFound {
                map: map.name.clone(),
                reference: name.to_string(),
            })
        }
    };
    if enable {
        map.add_to_list(id, list);
    } else {
        map.remove_object(id, list);
    }
    Ok(())
}

fn apply_effect(ctx: &mut StepContext<'_>, effect: &Effect) -> Result<(), StepError> {
    let target = effect.target();
    let current = ctx.map.name.clone();
    let map_name = target.map_name(&current).to_string();
    let map = ctx
        .map_named_mut(&map_name)
        .ok_or_else(|| StepError::UnknownMap(map_name.clone()))?;

    match effect {
        Effect::Show(t) | Effect::Hide(t) => {
            if !map.set_layer_visible(&t.name, matches!(effect, Effect::Show(_))) {
                warn!("Map '{}' has no layer '{}'", map_name, t.name);
            }
            Ok(())
        }
        Effect::Enable(t) => toggle_stored(map, &t.name, true),
        Effect::Disable(t) => toggle_stored(map, &t.name, false),
    }
}

/// Applies every effect in order. A failing effect is logged and the rest
/// still run.
pub fn apply_effects(ctx: &mut StepContext<'_>, effects: &[Effect]) {
    for effect in effects {
        if let Err(e) = apply_effect(ctx, effect) {
            error!("Map '{}': effect {:?} failed: {}", ctx.map.name, effect, e);
        }
    }
}

fn init_stored_objects(ctx: &mut InitContext<'_>) -> Result<(), StepError> {
    let stored: Vec<_> = ctx
        .map
        .objects_in(ObjectList::Reference)
        .filter(|obj| obj.property("restoreTo").is_some())
        .map(|obj| {
            let enabled = obj
                .property("enabled")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            (obj.id, restore_list(obj), enabled)
        })
        .collect();

    for (id, list, enabled) in stored {
        match list {
            Ok(list) if enabled => {
                ctx.map.add_to_list(id, list);
            }
            Ok(_) => {}
            Err(e) => warn!("Map '{}': {}", ctx.map.name, e),
        }
    }
    Ok(())
}

/// Advances a cycling useable to its next state and runs that state's
/// effects. Returns the new state.
pub fn cycle_state(ctx: &mut StepContext<'_>, id: ObjectId) -> Result<u32, StepError> {
    let obj = ctx
        .map
        .object(id)
        .ok_or_else(|| StepError::MissingObject(id, ctx.map.name.clone()))?;
    let states = required_f32(obj, "states")?;
    if states < 1.0 {
        return Err(StepError::InvalidProperty {
            object: obj.describe(),
            property: "states".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    let states = states as u32;
    let current = obj.prop_f32("state").unwrap_or(0.0).max(0.0) as u32 % states;
    let next = (current + 1) % states;
    let effects = effects_of(obj, &format!("state{}", next))?;

    let frame = obj.tile.as_ref().and_then(|tile| {
        let number = tile.tile_number.saturating_sub(current) + next;
        ctx.map
            .find_gid(&tile.tileset, number)
            .map(|gid| (number, gid))
    });

    if let Some(obj) = ctx.map.object_mut(id) {
        obj.set_property("state", i64::from(next));
        if let (Some(tile), Some((number, gid))) = (obj.tile.as_mut(), frame) {
            tile.tile_number = number;
            tile.gid = gid;
        }
    }
    ctx.map.mark_changed();
    info!("Map '{}': {:?} switched to state {}", ctx.map.name, id, next);

    apply_effects(ctx, &effects);
    Ok(next)
}

struct AreaUse {
    area: ObjectId,
    item: String,
    verb: String,
}

fn item_area_for(map: &Map, sprite: ObjectId) -> Option<AreaUse> {
    let obj = map.object(sprite)?;
    let held = obj.holding.as_ref()?.name.clone();
    let area = map
        .find_all(
            &ObjectQuery::new()
                .at(obj.anchor_x, obj.anchor_y)
                .of_kind("itemArea")
                .in_list(ObjectList::Reference),
        )
        .into_iter()
        .find(|id| map.object(*id).and_then(|a| a.prop_str("item")) == Some(held.as_str()))?;
    let verb = map
        .object(area)
        .and_then(|a| a.prop_str("verb"))
        .unwrap_or("Use")
        .to_string();
    Some(AreaUse { area, item: held, verb })
}

fn step_item_area(ctx: &mut StepContext<'_>, sprite: ObjectId) -> Result<(), StepError> {
    let Some(found) = item_area_for(ctx.map, sprite) else {
        return Ok(());
    };
    let Some((action, is_player)) = ctx.map.object(sprite).map(|s| (s.action, s.is_player())) else {
        return Ok(());
    };

    if !action {
        if is_player {
            let text = format!("Available Action: {} {}.", found.verb, found.item);
            ctx.offer_text(sprite, TextSlot::Action, ITEM_AREA_TEXT_PRIORITY, text);
        }
        return Ok(());
    }

    let area = ctx
        .map
        .object(found.area)
        .ok_or_else(|| StepError::MissingObject(found.area, ctx.map.name.clone()))?;
    let effects = effects_of(area, "effects")?;
    let uses = area.prop_str("uses").map(str::to_string);
    let consumes = area
        .property("consumesItem")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    if let Some(obj) = ctx.map.object_mut(sprite) {
        obj.action = false;
        if consumes {
            obj.holding = None;
        }
    }
    ctx.map.mark_changed();
    info!(
        "Map '{}': {:?} used {} in area {:?}",
        ctx.map.name, sprite, found.item, found.area
    );

    apply_effects(ctx, &effects);

    if let Some(name) = uses {
        let useable = ctx
            .map
            .find_object(
                &ObjectQuery::new()
                    .named(&name)
                    .of_kind("useable")
                    .in_list(ObjectList::Triggers),
            )
            .ok_or_else(|| StepError::ReferenceNotFound {
                map: ctx.map.name.clone(),
                reference: name.clone(),
            })?;
        cycle_state(ctx, useable)?;
    }
    Ok(())
}

//! Game mechanics built purely from hooks.
//!
//! Each submodule exposes an `install` function that registers its hooks on a
//! [`HookRegistry`]. [`standard`] lists every mechanic the server ships with;
//! maps built from it get all of them.

pub mod actions;
pub mod chicken;
pub mod doors;
pub mod hints;
pub mod popup;
pub mod respawn;
pub mod saw;
pub mod speed;
pub mod switches;
pub mod text;
pub mod timers;

use crate::error::StepError;
use crate::hooks::{Installer, InitContext};
use crate::map::ObjectList;
use shared::GameObject;

/// Every built-in mechanic, movement included, in installation order.
pub fn standard() -> Vec<Installer> {
    vec![
        crate::movement::install,
        timers::install,
        text::install,
        popup::install,
        doors::install,
        actions::install,
        switches::install,
        hints::install,
        saw::install,
        speed::install,
        respawn::install,
        chicken::install,
    ]
}

pub(crate) fn required_str<'o>(obj: &'o GameObject, key: &str) -> Result<&'o str, StepError> {
    obj.prop_str(key).ok_or_else(|| missing(obj, key))
}

pub(crate) fn required_f32(obj: &GameObject, key: &str) -> Result<f32, StepError> {
    obj.prop_f32(key).ok_or_else(|| missing(obj, key))
}

fn missing(obj: &GameObject, key: &str) -> StepError {
    StepError::MissingProperty {
        object: obj.describe(),
        property: key.to_string(),
    }
}

/// Makes every sprite of `kind` react to other sprites as a trigger too.
pub(crate) fn sprites_become_triggers(ctx: &mut InitContext<'_>, kind: &str) {
    let ids: Vec<_> = ctx
        .map
        .objects_in(ObjectList::Sprites)
        .filter(|obj| obj.kind == kind)
        .map(|obj| obj.id)
        .collect();
    for id in ids {
        ctx.map.add_to_list(id, ObjectList::Triggers);
    }
}

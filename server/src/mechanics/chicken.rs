//! Chickens wander after the nearest player.

use crate::error::StepError;
use crate::hooks::HookRegistry;
use crate::map::ObjectList;
use crate::step::StepContext;
use shared::{distance, MoveTarget, ObjectId};

pub const CHICKEN_SPEED: f32 = 10.0;
/// Chickens stop once they are this close to a player.
pub const CHICKEN_FOLLOW_DISTANCE: f32 = 50.0;

pub fn install(hooks: &mut HookRegistry) {
    hooks.sprite_start("stepSpriteStartChicken", step_chicken);
}

fn step_chicken(ctx: &mut StepContext<'_>, sprite: ObjectId) -> Result<(), StepError> {
    let Some(chicken) = ctx.map.object(sprite) else {
        return Ok(());
    };
    if chicken.name != "chicken" {
        return Ok(());
    }
    // in flight
    if chicken.move_target.map_or(false, |t| t.ignore_bounds) {
        return Ok(());
    }

    let (cx, cy) = (chicken.anchor_x, chicken.anchor_y);
    let nearest = ctx
        .map
        .objects_in(ObjectList::Sprites)
        .filter(|o| o.is_player())
        .map(|p| (distance(cx, cy, p.anchor_x, p.anchor_y), p.anchor_x, p.anchor_y))
        .min_by(|a, b| a.0.total_cmp(&b.0));

    match nearest {
        Some((d, px, py)) if d > CHICKEN_FOLLOW_DISTANCE => {
            ctx.map
                .set_destination(sprite, MoveTarget::new(px, py, CHICKEN_SPEED));
        }
        _ => ctx.map.stop_object(sprite),
    }
    Ok(())
}

//! Speech and label text expiry.

use crate::error::StepError;
use crate::hooks::{HookRegistry, InitContext, Phase};
use crate::map::ObjectList;
use crate::step::StepContext;
use shared::TimedField;

pub fn install(hooks: &mut HookRegistry) {
    hooks.init("initTextTimers", init_text_timers);
    hooks.map_start("stepMapStartTextTimers", step_text_timers);
}

fn init_text_timers(ctx: &mut InitContext<'_>) -> Result<(), StepError> {
    ctx.set_hook_priority(Phase::MapStart, "stepMapStartTextTimers", 10);
    Ok(())
}

fn step_text_timers(ctx: &mut StepContext<'_>) -> Result<(), StepError> {
    let now = ctx.clock.now;
    let mut changed = false;

    for id in ctx.map.list(ObjectList::Sprites).to_vec() {
        let Some(obj) = ctx.map.object_mut(id) else {
            continue;
        };
        for field in [TimedField::SpeechText, TimedField::LabelText] {
            let due = obj.expires.get(&field).map_or(false, |at| *at <= now);
            if !due {
                continue;
            }
            obj.expires.remove(&field);
            let slot = match field {
                TimedField::SpeechText => &mut obj.speech_text,
                _ => &mut obj.label_text,
            };
            changed |= slot.take().is_some();
        }
    }

    if changed {
        ctx.map.mark_changed();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mechanics::standard;
    use crate::mechanics::testing::{map, player, tick};
    use crate::step::SPEECH_TEXT_SECONDS;
    use crate::world::World;

    #[test]
    fn test_speech_text_expires() {
        let mut m = map("start");
        let p = player(&mut m, 100.0, 100.0);
        {
            let obj = m.object_mut(p).unwrap();
            obj.speech_text = Some("hi".to_string());
            obj.expire_at(TimedField::SpeechText, 1.0 + SPEECH_TEXT_SECONDS);
        }
        m.install(&standard());
        m.clear_changed();
        let mut world = World::new("demo");

        tick(&mut m, &mut world, 3.9);
        assert_eq!(m.object(p).unwrap().speech_text.as_deref(), Some("hi"));

        tick(&mut m, &mut world, 4.0);
        let obj = m.object(p).unwrap();
        assert_eq!(obj.speech_text, None);
        assert!(!obj.expires.contains_key(&TimedField::SpeechText));
        assert!(m.changed());
    }

    #[test]
    fn test_label_text_expires() {
        let mut m = map("start");
        let p = player(&mut m, 100.0, 100.0);
        {
            let obj = m.object_mut(p).unwrap();
            obj.label_text = Some("alice".to_string());
            obj.expire_at(TimedField::LabelText, 2.0);
        }
        m.install(&standard());
        let mut world = World::new("demo");

        tick(&mut m, &mut world, 1.0);
        assert_eq!(m.object(p).unwrap().label_text.as_deref(), Some("alice"));
        tick(&mut m, &mut world, 2.0);
        assert_eq!(m.object(p).unwrap().label_text, None);
    }
}

//! One simulation tick of one map.
//!
//! Phases run strictly in order, each over every sprite before the next
//! begins: map start, sprite start, trigger dispatch, move, sprite end, text
//! resolution, map end. Hook failures are logged and the tick carries on.

use crate::error::StepError;
use crate::hooks::{trigger_handler_name, Hook, HookTable, SpriteHook};
use crate::map::{transfer_object, Map, ObjectList, ObjectQuery};
use crate::world::World;
use log::{debug, error};
use shared::{ObjectId, TimedField};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// How long resolved speech text stays up after its last offer.
pub const SPEECH_TEXT_SECONDS: f64 = 3.0;

/// Returned by trigger handlers. `Stop` suppresses every remaining trigger
/// for the same sprite this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerFlow {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clock {
    /// Game time in seconds.
    pub now: f64,
    /// Steps per second.
    pub tick_rate: u32,
}

impl Clock {
    pub fn new(now: f64, tick_rate: u32) -> Self {
        Self { now, tick_rate }
    }

    /// Converts a per-second quantity to a per-tick one.
    pub fn per_tick(&self, per_second: f32) -> f32 {
        per_second / self.tick_rate.max(1) as f32
    }
}

/// Single-slot player text fields arbitrated once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextSlot {
    Action,
    Speech,
}

#[derive(Debug, Clone)]
struct TextOffer {
    priority: i32,
    text: String,
}

/// Everything a hook can reach while its map steps.
///
/// The stepping map is detached from the world for the duration of the tick,
/// so `map` and `world` never alias. Door-style mechanics use
/// [`StepContext::relocate`] to move objects between them.
pub struct StepContext<'a> {
    pub map: &'a mut Map,
    pub clock: Clock,
    world: &'a mut World,
    offers: HashMap<(ObjectId, TextSlot), TextOffer>,
}

impl<'a> StepContext<'a> {
    pub fn new(map: &'a mut Map, world: &'a mut World, clock: Clock) -> Self {
        Self {
            map,
            clock,
            world,
            offers: HashMap::new(),
        }
    }

    pub fn map_named(&self, name: &str) -> Option<&Map> {
        if name == self.map.name {
            Some(&*self.map)
        } else {
            self.world.map(name)
        }
    }

    /// Mutable access to any map, the stepping one included.
    pub fn map_named_mut(&mut self, name: &str) -> Option<&mut Map> {
        if name == self.map.name {
            Some(&mut *self.map)
        } else {
            self.world.map_mut(name)
        }
    }

    /// Offers text for a sprite's slot. After sprite end the lowest priority
    /// offer wins; on a tie the first offer stands.
    pub fn offer_text(&mut self, sprite: ObjectId, slot: TextSlot, priority: i32, text: String) {
        match self.offers.entry((sprite, slot)) {
            Entry::Vacant(entry) => {
                entry.insert(TextOffer { priority, text });
            }
            Entry::Occupied(mut entry) => {
                if priority < entry.get().priority {
                    entry.insert(TextOffer { priority, text });
                }
            }
        }
    }

    /// Moves `id` so its anchor sits at `(anchor_x, anchor_y)` on `dest_map`
    /// and stops it. Crossing maps transfers ownership of the object.
    pub fn relocate(
        &mut self,
        id: ObjectId,
        dest_map: &str,
        anchor_x: f32,
        anchor_y: f32,
    ) -> Result<(), StepError> {
        if dest_map == self.map.name {
            if !self.map.set_location_by_anchor(id, anchor_x, anchor_y) {
                return Err(StepError::MissingObject(id, self.map.name.clone()));
            }
            self.map.stop_object(id);
            return Ok(());
        }

        let dest = self
            .world
            .map_mut(dest_map)
            .ok_or_else(|| StepError::UnknownMap(dest_map.to_string()))?;
        transfer_object(self.map, dest, id)?;
        dest.set_location_by_anchor(id, anchor_x, anchor_y);
        dest.stop_object(id);
        debug!("Moved {:?} from '{}' to '{}'", id, self.map.name, dest_map);
        Ok(())
    }

    fn run_sprite_phase(&mut self, hooks: &[Hook<SpriteHook>]) {
        if hooks.is_empty() {
            return;
        }
        // each hook sees every sprite before the next hook starts
        for hook in hooks {
            for sprite in self.map.list(ObjectList::Sprites).to_vec() {
                // earlier sprites may have removed or transferred this one
                if !self.map.in_list(sprite, ObjectList::Sprites) {
                    continue;
                }
                if let Err(e) = (hook.run)(self, sprite) {
                    error!("Map '{}': {} failed for {:?}: {}", self.map.name, hook.name, sprite, e);
                }
            }
        }
    }

    fn resolve_text(&mut self) {
        if self.offers.is_empty() && !self.any_action_text() {
            return;
        }
        let now = self.clock.now;
        let mut changed = false;

        for sprite in self.map.list(ObjectList::Sprites).to_vec() {
            let action = self.offers.remove(&(sprite, TextSlot::Action));
            let speech = self.offers.remove(&(sprite, TextSlot::Speech));
            let Some(obj) = self.map.object_mut(sprite) else {
                continue;
            };
            if !obj.is_player() {
                continue;
            }

            obj.action_text = action.map(|offer| offer.text);

            if let Some(offer) = speech {
                if obj.speech_text.as_deref() != Some(offer.text.as_str()) {
                    obj.speech_text = Some(offer.text);
                    changed = true;
                }
                obj.expire_at(TimedField::SpeechText, now + SPEECH_TEXT_SECONDS);
            }
        }

        if !self.offers.is_empty() {
            debug!(
                "Map '{}': dropped {} text offers for non-player or departed sprites",
                self.map.name,
                self.offers.len()
            );
            self.offers.clear();
        }
        if changed {
            self.map.mark_changed();
        }
    }

    fn any_action_text(&self) -> bool {
        self.map
            .objects_in(ObjectList::Sprites)
            .any(|obj| obj.action_text.is_some())
    }
}

/// Runs every trigger containing `sprite`'s anchor against it, in handler
/// priority order, until a handler returns [`TriggerFlow::Stop`].
pub fn dispatch_triggers(ctx: &mut StepContext<'_>, hooks: &HookTable, sprite: ObjectId) {
    let Some((ax, ay)) = ctx.map.object(sprite).map(|o| (o.anchor_x, o.anchor_y)) else {
        return;
    };

    let found = ctx.map.find_all(
        &ObjectQuery::new()
            .at(ax, ay)
            .in_list(ObjectList::Triggers)
            .excluding(sprite),
    );

    let mut candidates = Vec::with_capacity(found.len());
    for trigger in found {
        let Some(kind) = ctx.map.object(trigger).map(|t| t.kind.clone()) else {
            continue;
        };
        let name = trigger_handler_name(&kind);
        match hooks.trigger(&name) {
            Some(handler) => candidates.push((handler.priority, &handler.name, handler.run, trigger)),
            None => error!(
                "Map '{}': no handler {} for trigger type '{}', trigger skipped",
                ctx.map.name, name, kind
            ),
        }
    }
    candidates.sort_by_key(|(priority, ..)| *priority);

    for (_, name, run, trigger) in candidates {
        if !ctx.map.contains(sprite) {
            break;
        }
        if !ctx.map.in_list(trigger, ObjectList::Triggers) {
            continue;
        }
        match run(ctx, trigger, sprite) {
            Ok(TriggerFlow::Stop) => break,
            Ok(TriggerFlow::Continue) => {}
            Err(e) => error!(
                "Map '{}': {} failed for {:?} on {:?}: {}",
                ctx.map.name, name, sprite, trigger, e
            ),
        }
    }
}

/// Advances `map` by one tick. `world` holds every other map.
pub fn step_map(map: &mut Map, world: &mut World, clock: Clock) {
    let hooks = map.hooks();
    let mut ctx = StepContext::new(map, world, clock);

    for hook in hooks.map_start() {
        if let Err(e) = (hook.run)(&mut ctx) {
            error!("Map '{}': {} failed: {}", ctx.map.name, hook.name, e);
        }
    }

    ctx.run_sprite_phase(hooks.sprite_start());

    for sprite in ctx.map.list(ObjectList::Sprites).to_vec() {
        if ctx.map.in_list(sprite, ObjectList::Sprites) {
            dispatch_triggers(&mut ctx, &hooks, sprite);
        }
    }

    ctx.run_sprite_phase(hooks.movement());
    ctx.run_sprite_phase(hooks.sprite_end());
    ctx.resolve_text();

    for hook in hooks.map_end() {
        if let Err(e) = (hook.run)(&mut ctx) {
            error!("Map '{}': {} failed: {}", ctx.map.name, hook.name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookRegistry;
    use crate::map::TileGrid;
    use shared::{GameObject, MoveTarget};

    fn grid() -> TileGrid {
        TileGrid {
            width: 20,
            height: 20,
            tile_width: 32,
            tile_height: 32,
        }
    }

    fn player(name: &str, x: f32, y: f32) -> GameObject {
        GameObject::new(name, "player", x, y, 32.0, 32.0)
    }

    fn zone(kind: &str) -> GameObject {
        GameObject::new(kind, kind, 0.0, 0.0, 100.0, 100.0)
    }

    fn count(ctx: &mut StepContext<'_>, id: ObjectId, key: &str) {
        if let Some(obj) = ctx.map.object_mut(id) {
            let n = obj.prop_f32(key).unwrap_or(0.0);
            obj.set_property(key, (n + 1.0) as f64);
        }
    }

    fn trigger_first(ctx: &mut StepContext<'_>, _t: ObjectId, s: ObjectId) -> Result<TriggerFlow, StepError> {
        count(ctx, s, "first");
        Ok(TriggerFlow::Stop)
    }

    fn trigger_second(ctx: &mut StepContext<'_>, _t: ObjectId, s: ObjectId) -> Result<TriggerFlow, StepError> {
        count(ctx, s, "second");
        Ok(TriggerFlow::Continue)
    }

    fn trigger_failing(_ctx: &mut StepContext<'_>, t: ObjectId, _s: ObjectId) -> Result<TriggerFlow, StepError> {
        Err(StepError::MissingProperty {
            object: format!("{:?}", t),
            property: "x".to_string(),
        })
    }

    fn install_stop(hooks: &mut HookRegistry) {
        hooks.trigger("first", trigger_first).priority(10);
        hooks.trigger("second", trigger_second).priority(90);
        hooks.trigger("failing", trigger_failing).priority(5);
    }

    fn set_dest(ctx: &mut StepContext<'_>, id: ObjectId) -> Result<(), StepError> {
        ctx.map.set_destination(id, MoveTarget::new(500.0, 500.0, 60.0));
        Ok(())
    }

    fn check_all_have_dest(ctx: &mut StepContext<'_>, id: ObjectId) -> Result<(), StepError> {
        let all = ctx
            .map
            .objects_in(ObjectList::Sprites)
            .all(|obj| obj.move_target.is_some());
        if all {
            count(ctx, id, "sawAll");
        }
        Ok(())
    }

    fn install_phases(hooks: &mut HookRegistry) {
        hooks.sprite_start("stepSpriteStartDest", set_dest);
        hooks.movement("stepMoveCheck", check_all_have_dest);
    }

    fn run(map: &mut Map) {
        let mut world = World::new("test");
        step_map(map, &mut world, Clock::new(0.0, 30));
    }

    #[test]
    fn test_stop_suppresses_lower_priority_triggers() {
        let mut map = Map::new("m", grid());
        let p = map.add_object(player("p", 10.0, 10.0), ObjectList::Sprites);
        map.add_object(zone("second"), ObjectList::Triggers);
        map.add_object(zone("first"), ObjectList::Triggers);
        map.install(&[install_stop]);

        run(&mut map);
        let obj = map.object(p).unwrap();
        assert_eq!(obj.prop_f32("first"), Some(1.0));
        assert_eq!(obj.prop_f32("second"), None);
    }

    #[test]
    fn test_failing_and_unknown_handlers_do_not_block_others() {
        let mut map = Map::new("m", grid());
        let p = map.add_object(player("p", 10.0, 10.0), ObjectList::Sprites);
        map.add_object(zone("failing"), ObjectList::Triggers);
        map.add_object(zone("nobodyHandlesThis"), ObjectList::Triggers);
        map.add_object(zone("second"), ObjectList::Triggers);
        map.install(&[install_stop]);

        run(&mut map);
        assert_eq!(map.object(p).unwrap().prop_f32("second"), Some(1.0));
    }

    #[test]
    fn test_sprite_is_not_its_own_trigger() {
        let mut map = Map::new("m", grid());
        let s = map.add_object(zone("second"), ObjectList::Sprites);
        map.add_to_list(s, ObjectList::Triggers);
        map.install(&[install_stop]);

        run(&mut map);
        assert_eq!(map.object(s).unwrap().prop_f32("second"), None);
    }

    #[test]
    fn test_anchor_outside_trigger_does_not_dispatch() {
        let mut map = Map::new("m", grid());
        // bounds overlap the zone but the anchor (centre) does not
        let p = map.add_object(player("p", 90.0, 90.0), ObjectList::Sprites);
        map.add_object(zone("second"), ObjectList::Triggers);
        map.install(&[install_stop]);

        run(&mut map);
        assert_eq!(map.object(p).unwrap().prop_f32("second"), None);
    }

    #[test]
    fn test_phases_run_breadth_first() {
        let mut map = Map::new("m", grid());
        let a = map.add_object(player("a", 10.0, 10.0), ObjectList::Sprites);
        let b = map.add_object(player("b", 200.0, 10.0), ObjectList::Sprites);
        map.install(&[install_phases]);

        run(&mut map);
        assert_eq!(map.object(a).unwrap().prop_f32("sawAll"), Some(1.0));
        assert_eq!(map.object(b).unwrap().prop_f32("sawAll"), Some(1.0));
    }

    fn mark_early(ctx: &mut StepContext<'_>, id: ObjectId) -> Result<(), StepError> {
        count(ctx, id, "early");
        Ok(())
    }

    fn check_all_marked(ctx: &mut StepContext<'_>, id: ObjectId) -> Result<(), StepError> {
        let all = ctx
            .map
            .objects_in(ObjectList::Sprites)
            .all(|obj| obj.prop_f32("early").is_some());
        if all {
            count(ctx, id, "sawAllEarly");
        }
        Ok(())
    }

    fn install_same_phase(hooks: &mut HookRegistry) {
        hooks.sprite_start("stepSpriteStartLate", check_all_marked).priority(90);
        hooks.sprite_start("stepSpriteStartEarly", mark_early).priority(10);
    }

    #[test]
    fn test_hooks_in_a_phase_cover_every_sprite_in_priority_order() {
        let mut map = Map::new("m", grid());
        let a = map.add_object(player("a", 10.0, 10.0), ObjectList::Sprites);
        let b = map.add_object(player("b", 200.0, 10.0), ObjectList::Sprites);
        map.install(&[install_same_phase]);

        run(&mut map);
        assert_eq!(map.object(a).unwrap().prop_f32("sawAllEarly"), Some(1.0));
        assert_eq!(map.object(b).unwrap().prop_f32("sawAllEarly"), Some(1.0));
    }

    fn offer_low(ctx: &mut StepContext<'_>, id: ObjectId) -> Result<(), StepError> {
        ctx.offer_text(id, TextSlot::Action, 30, "Drop".to_string());
        ctx.offer_text(id, TextSlot::Speech, 10, "first".to_string());
        Ok(())
    }

    fn offer_high(ctx: &mut StepContext<'_>, id: ObjectId) -> Result<(), StepError> {
        ctx.offer_text(id, TextSlot::Action, 10, "Pick Up".to_string());
        ctx.offer_text(id, TextSlot::Speech, 10, "second".to_string());
        Ok(())
    }

    fn install_text(hooks: &mut HookRegistry) {
        hooks.sprite_start("stepSpriteStartLow", offer_low);
        hooks.sprite_end("stepSpriteEndHigh", offer_high);
    }

    #[test]
    fn test_text_arbitration() {
        let mut map = Map::new("m", grid());
        let p = map.add_object(player("p", 10.0, 10.0), ObjectList::Sprites);
        let rock = map.add_object(GameObject::new("rock", "rock", 300.0, 300.0, 8.0, 8.0), ObjectList::Sprites);
        map.install(&[install_text]);
        map.clear_changed();

        let mut world = World::new("test");
        step_map(&mut map, &mut world, Clock::new(100.0, 30));

        let obj = map.object(p).unwrap();
        assert_eq!(obj.action_text.as_deref(), Some("Pick Up"));
        assert_eq!(obj.speech_text.as_deref(), Some("first"));
        assert_eq!(
            obj.expires.get(&TimedField::SpeechText),
            Some(&(100.0 + SPEECH_TEXT_SECONDS))
        );
        assert!(map.changed());

        let other = map.object(rock).unwrap();
        assert_eq!(other.action_text, None);
        assert_eq!(other.speech_text, None);
    }

    #[test]
    fn test_action_text_clears_without_offers() {
        let mut map = Map::new("m", grid());
        let mut p = player("p", 10.0, 10.0);
        p.action_text = Some("stale".to_string());
        p.speech_text = Some("still here".to_string());
        let id = map.add_object(p, ObjectList::Sprites);
        map.install(&[]);

        run(&mut map);
        let obj = map.object(id).unwrap();
        assert_eq!(obj.action_text, None);
        assert_eq!(obj.speech_text.as_deref(), Some("still here"));
    }

    #[test]
    fn test_relocate_across_maps() {
        let mut world = World::new("test");
        world.insert_map(Map::new("other", grid()));

        let mut map = Map::new("m", grid());
        let p = map.add_object(player("p", 10.0, 10.0), ObjectList::Sprites);
        map.set_destination(p, MoveTarget::new(400.0, 400.0, 120.0));

        {
            let mut ctx = StepContext::new(&mut map, &mut world, Clock::new(0.0, 30));
            ctx.relocate(p, "other", 64.0, 64.0).unwrap();
            assert!(ctx.relocate(p, "other", 0.0, 0.0).is_err());
            assert!(matches!(
                ctx.relocate(p, "missing", 0.0, 0.0),
                Err(StepError::UnknownMap(_))
            ));
        }

        assert!(!map.contains(p));
        let moved = world.map("other").unwrap().object(p).unwrap();
        assert_eq!(moved.anchor_x, 64.0);
        assert_eq!(moved.map_name, "other");
        assert!(!moved.is_moving());
    }

    #[test]
    fn test_clock_per_tick() {
        let clock = Clock::new(0.0, 30);
        assert_eq!(clock.per_tick(120.0), 4.0);
        assert_eq!(Clock::new(0.0, 0).per_tick(5.0), 5.0);
    }
}

//! Behavior registry: mechanics register their hooks here, the map freezes
//! them into a fixed execution order.
//!
//! A mechanic is a plain function taking `&mut HookRegistry` (an
//! [`Installer`]) that registers lifecycle hooks and trigger handlers by name.
//! Building the registry for a map happens in two passes:
//!
//! 1. every `init` hook runs once, in name order, and may override the
//!    priority of any hook through [`InitContext::set_hook_priority`];
//! 2. the phase hooks are resolved and stably sorted by ascending priority.
//!
//! The resulting [`HookTable`] is immutable for the lifetime of the map.

use crate::error::StepError;
use crate::map::Map;
use crate::step::{StepContext, TriggerFlow};
use log::{error, info, warn};
use shared::ObjectId;
use std::collections::{HashMap, HashSet};

/// Priority given to hooks that neither register nor receive one.
pub const DEFAULT_PRIORITY: i32 = 50;

pub type InitHook = fn(&mut InitContext<'_>) -> Result<(), StepError>;
pub type MapHook = fn(&mut StepContext<'_>) -> Result<(), StepError>;
pub type SpriteHook = fn(&mut StepContext<'_>, ObjectId) -> Result<(), StepError>;
/// Called as `handler(ctx, trigger, sprite)`.
pub type TriggerHandler =
    fn(&mut StepContext<'_>, ObjectId, ObjectId) -> Result<TriggerFlow, StepError>;

/// Registers one mechanic's hooks.
pub type Installer = fn(&mut HookRegistry);

/// Lifecycle phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    MapStart,
    SpriteStart,
    Trigger,
    Move,
    SpriteEnd,
    MapEnd,
}

impl Phase {
    pub const ORDER: [Phase; 6] = [
        Phase::MapStart,
        Phase::SpriteStart,
        Phase::Trigger,
        Phase::Move,
        Phase::SpriteEnd,
        Phase::MapEnd,
    ];

    /// Every hook name in a phase must start with this.
    pub fn prefix(self) -> &'static str {
        match self {
            Phase::MapStart => "stepMapStart",
            Phase::SpriteStart => "stepSpriteStart",
            Phase::Trigger => "trigger",
            Phase::Move => "stepMove",
            Phase::SpriteEnd => "stepSpriteEnd",
            Phase::MapEnd => "stepMapEnd",
        }
    }
}

/// Handler name for a trigger type: `"mapDoor"` becomes `"triggerMapDoor"`.
pub fn trigger_handler_name(trigger_type: &str) -> String {
    let mut chars = trigger_type.chars();
    match chars.next() {
        Some(first) => format!("trigger{}{}", first.to_uppercase(), chars.as_str()),
        None => "trigger".to_string(),
    }
}

#[derive(Clone, Copy)]
enum HookFn {
    Map(MapHook),
    Sprite(SpriteHook),
    Trigger(TriggerHandler),
}

/// A registration in progress; returned by the registry so callers can
/// chain a priority.
pub struct Registration {
    phase: Phase,
    name: String,
    priority: Option<i32>,
    run: HookFn,
}

impl Registration {
    pub fn priority(&mut self, priority: i32) -> &mut Self {
        self.priority = Some(priority);
        self
    }
}

/// Priority overrides collected while `init` hooks run.
#[derive(Debug, Default)]
pub struct PriorityTable {
    overrides: HashMap<(Phase, String), i32>,
}

impl PriorityTable {
    pub fn set(&mut self, phase: Phase, name: &str, priority: i32) {
        self.overrides.insert((phase, name.to_string()), priority);
    }

    pub fn get(&self, phase: Phase, name: &str) -> Option<i32> {
        self.overrides.get(&(phase, name.to_string())).copied()
    }
}

/// What an `init` hook can touch: the fully loaded map and the priority table.
pub struct InitContext<'a> {
    pub map: &'a mut Map,
    priorities: &'a mut PriorityTable,
}

impl<'a> InitContext<'a> {
    pub fn set_hook_priority(&mut self, phase: Phase, name: &str, priority: i32) {
        self.priorities.set(phase, name, priority);
    }

    /// Priority for a trigger type rather than a handler name.
    pub fn set_trigger_priority(&mut self, trigger_type: &str, priority: i32) {
        let name = trigger_handler_name(trigger_type);
        self.priorities.set(Phase::Trigger, &name, priority);
    }
}

#[derive(Default)]
pub struct HookRegistry {
    init: Vec<(String, InitHook)>,
    hooks: Vec<Registration>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self, name: &str, hook: InitHook) {
        self.init.push((name.to_string(), hook));
    }

    fn push(&mut self, phase: Phase, name: String, run: HookFn) -> &mut Registration {
        self.hooks.push(Registration {
            phase,
            name,
            priority: None,
            run,
        });
        let last = self.hooks.len() - 1;
        &mut self.hooks[last]
    }

    pub fn map_start(&mut self, name: &str, hook: MapHook) -> &mut Registration {
        self.push(Phase::MapStart, name.to_string(), HookFn::Map(hook))
    }

    pub fn sprite_start(&mut self, name: &str, hook: SpriteHook) -> &mut Registration {
        self.push(Phase::SpriteStart, name.to_string(), HookFn::Sprite(hook))
    }

    /// Registers the handler for triggers whose `type` is `trigger_type`.
    pub fn trigger(&mut self, trigger_type: &str, handler: TriggerHandler) -> &mut Registration {
        let name = trigger_handler_name(trigger_type);
        self.push(Phase::Trigger, name, HookFn::Trigger(handler))
    }

    pub fn movement(&mut self, name: &str, hook: SpriteHook) -> &mut Registration {
        self.push(Phase::Move, name.to_string(), HookFn::Sprite(hook))
    }

    pub fn sprite_end(&mut self, name: &str, hook: SpriteHook) -> &mut Registration {
        self.push(Phase::SpriteEnd, name.to_string(), HookFn::Sprite(hook))
    }

    pub fn map_end(&mut self, name: &str, hook: MapHook) -> &mut Registration {
        self.push(Phase::MapEnd, name.to_string(), HookFn::Map(hook))
    }

    /// Runs the `init` hooks against `map`, then freezes the phase order.
    pub fn build(mut self, map: &mut Map) -> HookTable {
        let mut priorities = PriorityTable::default();

        self.init.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, hook) in &self.init {
            let mut ctx = InitContext {
                map: &mut *map,
                priorities: &mut priorities,
            };
            if let Err(e) = hook(&mut ctx) {
                error!("Map '{}': init hook {} failed: {}", map.name, name, e);
            }
        }

        let table = self.freeze(&priorities, &map.name);
        table.log_order(&map.name);
        table
    }

    fn freeze(self, priorities: &PriorityTable, map_name: &str) -> HookTable {
        let mut table = HookTable::default();
        let mut seen: HashSet<(Phase, String)> = HashSet::new();

        for reg in self.hooks {
            if !reg.name.starts_with(reg.phase.prefix()) || reg.name == reg.phase.prefix() {
                error!(
                    "Map '{}': hook '{}' does not follow the {} naming rule, skipped",
                    map_name,
                    reg.name,
                    reg.phase.prefix()
                );
                continue;
            }
            if !seen.insert((reg.phase, reg.name.clone())) {
                warn!(
                    "Map '{}': duplicate hook '{}' ignored, keeping the first registration",
                    map_name, reg.name
                );
                continue;
            }

            let priority = priorities
                .get(reg.phase, &reg.name)
                .or(reg.priority)
                .unwrap_or(DEFAULT_PRIORITY);

            match (reg.phase, reg.run) {
                (Phase::MapStart, HookFn::Map(run)) => table.map_start.push(Hook::new(reg.name, priority, run)),
                (Phase::MapEnd, HookFn::Map(run)) => table.map_end.push(Hook::new(reg.name, priority, run)),
                (Phase::SpriteStart, HookFn::Sprite(run)) => {
                    table.sprite_start.push(Hook::new(reg.name, priority, run))
                }
                (Phase::Move, HookFn::Sprite(run)) => table.movement.push(Hook::new(reg.name, priority, run)),
                (Phase::SpriteEnd, HookFn::Sprite(run)) => {
                    table.sprite_end.push(Hook::new(reg.name, priority, run))
                }
                (Phase::Trigger, HookFn::Trigger(run)) => {
                    table
                        .triggers
                        .insert(reg.name.clone(), Hook::new(reg.name, priority, run));
                }
                (phase, _) => error!(
                    "Map '{}': hook '{}' has the wrong signature for phase {:?}",
                    map_name, reg.name, phase
                ),
            }
        }

        for (phase, name) in priorities.overrides.keys() {
            if !seen.contains(&(*phase, name.clone())) {
                warn!(
                    "Map '{}': priority set for unknown hook '{}'",
                    map_name, name
                );
            }
        }

        // stable: equal priorities keep registration order
        table.map_start.sort_by_key(|h| h.priority);
        table.sprite_start.sort_by_key(|h| h.priority);
        table.movement.sort_by_key(|h| h.priority);
        table.sprite_end.sort_by_key(|h| h.priority);
        table.map_end.sort_by_key(|h| h.priority);
        table
    }
}

#[derive(Clone)]
pub struct Hook<F> {
    pub name: String,
    pub priority: i32,
    pub run: F,
}

impl<F> Hook<F> {
    fn new(name: String, priority: i32, run: F) -> Self {
        Self {
            name,
            priority,
            run,
        }
    }
}

/// Frozen, priority-sorted hooks of one map.
#[derive(Default)]
pub struct HookTable {
    map_start: Vec<Hook<MapHook>>,
    sprite_start: Vec<Hook<SpriteHook>>,
    movement: Vec<Hook<SpriteHook>>,
    sprite_end: Vec<Hook<SpriteHook>>,
    map_end: Vec<Hook<MapHook>>,
    triggers: HashMap<String, Hook<TriggerHandler>>,
}

impl HookTable {
    pub fn map_start(&self) -> &[Hook<MapHook>] {
        &self.map_start
    }

    pub fn sprite_start(&self) -> &[Hook<SpriteHook>] {
        &self.sprite_start
    }

    pub fn movement(&self) -> &[Hook<SpriteHook>] {
        &self.movement
    }

    pub fn sprite_end(&self) -> &[Hook<SpriteHook>] {
        &self.sprite_end
    }

    pub fn map_end(&self) -> &[Hook<MapHook>] {
        &self.map_end
    }

    /// Looks up a trigger handler by handler name (see [`trigger_handler_name`]).
    pub fn trigger(&self, handler_name: &str) -> Option<&Hook<TriggerHandler>> {
        self.triggers.get(handler_name)
    }

    /// `(name, priority)` pairs of a phase in execution order. Trigger
    /// handlers are listed by ascending priority, then name.
    pub fn order(&self, phase: Phase) -> Vec<(&str, i32)> {
        fn pairs<F>(hooks: &[Hook<F>]) -> Vec<(&str, i32)> {
            hooks.iter().map(|h| (h.name.as_str(), h.priority)).collect()
        }
        match phase {
            Phase::MapStart => pairs(&self.map_start),
            Phase::SpriteStart => pairs(&self.sprite_start),
            Phase::Move => pairs(&self.movement),
            Phase::SpriteEnd => pairs(&self.sprite_end),
            Phase::MapEnd => pairs(&self.map_end),
            Phase::Trigger => {
                let mut handlers: Vec<(&str, i32)> = self
                    .triggers
                    .values()
                    .map(|h| (h.name.as_str(), h.priority))
                    .collect();
                handlers.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(b.0)));
                handlers
            }
        }
    }

    fn log_order(&self, map_name: &str) {
        for phase in Phase::ORDER {
            let order = self.order(phase);
            if order.is_empty() {
                continue;
            }
            let listed: Vec<String> = order
                .iter()
                .map(|(name, priority)| format!("{}/{}", name, priority))
                .collect();
            info!(
                "Map '{}' {} hooks: {}",
                map_name,
                phase.prefix(),
                listed.join(", ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::TileGrid;

    fn noop_map(_ctx: &mut StepContext<'_>) -> Result<(), StepError> {
        Ok(())
    }

    fn noop_sprite(_ctx: &mut StepContext<'_>, _id: ObjectId) -> Result<(), StepError> {
        Ok(())
    }

    fn noop_trigger(
        _ctx: &mut StepContext<'_>,
        _trigger: ObjectId,
        _sprite: ObjectId,
    ) -> Result<TriggerFlow, StepError> {
        Ok(TriggerFlow::Continue)
    }

    fn raise_timers(ctx: &mut InitContext<'_>) -> Result<(), StepError> {
        ctx.set_hook_priority(Phase::MapStart, "stepMapStartTimers", 10);
        Ok(())
    }

    fn failing_init(_ctx: &mut InitContext<'_>) -> Result<(), StepError> {
        Err(StepError::UnknownMap("nowhere".to_string()))
    }

    fn map() -> Map {
        Map::new(
            "test",
            TileGrid {
                width: 4,
                height: 4,
                tile_width: 16,
                tile_height: 16,
            },
        )
    }

    fn install_sample(hooks: &mut HookRegistry) {
        hooks.map_start("stepMapStartOverlay", noop_map);
        hooks.map_start("stepMapStartTimers", noop_map);
        hooks.map_start("stepMapStartEarly", noop_map).priority(20);
        hooks.sprite_end("stepSpriteEndB", noop_sprite);
        hooks.sprite_end("stepSpriteEndA", noop_sprite);
        hooks.trigger("mapDoor", noop_trigger).priority(10);
        hooks.trigger("popUpText", noop_trigger).priority(90);
        hooks.trigger("speedMultiplier", noop_trigger);
        hooks.init("initTimers", raise_timers);
    }

    #[test]
    fn test_trigger_handler_name() {
        assert_eq!(trigger_handler_name("mapDoor"), "triggerMapDoor");
        assert_eq!(trigger_handler_name("saw"), "triggerSaw");
        assert_eq!(trigger_handler_name(""), "trigger");
    }

    #[test]
    fn test_init_override_beats_registered_priority() {
        let mut m = map();
        m.install(&[install_sample]);
        let hooks = m.hooks();

        assert_eq!(
            hooks.order(Phase::MapStart),
            vec![
                ("stepMapStartTimers", 10),
                ("stepMapStartEarly", 20),
                ("stepMapStartOverlay", 50)
            ]
        );
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let mut m = map();
        m.install(&[install_sample]);
        assert_eq!(
            m.hooks().order(Phase::SpriteEnd),
            vec![("stepSpriteEndB", 50), ("stepSpriteEndA", 50)]
        );
    }

    #[test]
    fn test_order_is_identical_across_constructions() {
        let mut first = map();
        first.install(&[install_sample]);
        for _ in 0..10 {
            let mut again = map();
            again.install(&[install_sample]);
            for phase in Phase::ORDER {
                assert_eq!(first.hooks().order(phase), again.hooks().order(phase));
            }
        }
    }

    #[test]
    fn test_trigger_priorities() {
        let mut m = map();
        m.install(&[install_sample]);
        let hooks = m.hooks();
        assert_eq!(hooks.trigger("triggerMapDoor").map(|h| h.priority), Some(10));
        assert_eq!(
            hooks.trigger("triggerSpeedMultiplier").map(|h| h.priority),
            Some(DEFAULT_PRIORITY)
        );
        assert!(hooks.trigger("triggerUnknown").is_none());
        assert_eq!(
            hooks.order(Phase::Trigger),
            vec![
                ("triggerMapDoor", 10),
                ("triggerSpeedMultiplier", 50),
                ("triggerPopUpText", 90)
            ]
        );
    }

    #[test]
    fn test_misnamed_and_duplicate_hooks_are_skipped() {
        fn install_bad(hooks: &mut HookRegistry) {
            hooks.map_start("stepMapEndWrongPhase", noop_map);
            hooks.map_start("stepMapStart", noop_map);
            hooks.sprite_start("stepSpriteStartDup", noop_sprite).priority(5);
            hooks.sprite_start("stepSpriteStartDup", noop_sprite).priority(1);
        }
        let mut m = map();
        m.install(&[install_bad]);
        let hooks = m.hooks();
        assert!(hooks.map_start().is_empty());
        assert_eq!(
            hooks.order(Phase::SpriteStart),
            vec![("stepSpriteStartDup", 5)]
        );
    }

    #[test]
    fn test_failing_init_does_not_abort_build() {
        fn install(hooks: &mut HookRegistry) {
            hooks.init("initBroken", failing_init);
            hooks.movement("stepMoveNothing", noop_sprite);
        }
        let mut m = map();
        m.install(&[install]);
        assert_eq!(m.hooks().order(Phase::Move), vec![("stepMoveNothing", 50)]);
    }

    #[test]
    fn test_init_hooks_run_in_name_order() {
        fn second(ctx: &mut InitContext<'_>) -> Result<(), StepError> {
            ctx.set_hook_priority(Phase::MapEnd, "stepMapEndWatch", 2);
            Ok(())
        }
        fn first(ctx: &mut InitContext<'_>) -> Result<(), StepError> {
            ctx.set_hook_priority(Phase::MapEnd, "stepMapEndWatch", 1);
            Ok(())
        }
        fn install(hooks: &mut HookRegistry) {
            hooks.init("initB", second);
            hooks.init("initA", first);
            hooks.map_end("stepMapEndWatch", noop_map);
        }
        let mut m = map();
        m.install(&[install]);
        // initB runs last, so its override stands
        assert_eq!(m.hooks().order(Phase::MapEnd), vec![("stepMapEndWatch", 2)]);
    }
}

//! Registry of every map in a game and the single owner of their objects

use crate::error::StepError;
use crate::map::{transfer_object, Map, ObjectList};
use crate::step::{step_map, Clock};
use log::warn;
use shared::{GameObject, ObjectId};
use std::collections::{BTreeMap, BTreeSet};

/// All maps of one game, keyed and iterated by name.
///
/// Each object lives on exactly one map at a time. Moving it between maps
/// goes through [`World::transfer`] or [`crate::step::StepContext::relocate`],
/// both of which move the value out of one store and into the other.
pub struct World {
    pub game: String,
    maps: BTreeMap<String, Map>,
}

impl World {
    pub fn new(game: &str) -> Self {
        Self {
            game: game.to_string(),
            maps: BTreeMap::new(),
        }
    }

    /// Adds a map, returning any map it replaced.
    pub fn insert_map(&mut self, map: Map) -> Option<Map> {
        self.maps.insert(map.name.clone(), map)
    }

    pub fn map(&self, name: &str) -> Option<&Map> {
        self.maps.get(name)
    }

    pub fn map_mut(&mut self, name: &str) -> Option<&mut Map> {
        self.maps.get_mut(name)
    }

    pub fn maps(&self) -> impl Iterator<Item = &Map> + '_ {
        self.maps.values()
    }

    pub fn map_names(&self) -> Vec<String> {
        self.maps.keys().cloned().collect()
    }

    /// The map name after `current` in name order, wrapping around.
    pub fn next_map_name(&self, current: &str) -> Option<String> {
        self.maps
            .range::<str, _>((std::ops::Bound::Excluded(current), std::ops::Bound::Unbounded))
            .next()
            .or_else(|| self.maps.iter().next())
            .map(|(name, _)| name.clone())
    }

    /// Name of the map currently holding `id`.
    pub fn locate(&self, id: ObjectId) -> Option<&str> {
        self.maps
            .values()
            .find(|map| map.contains(id))
            .map(|map| map.name.as_str())
    }

    pub fn object(&self, id: ObjectId) -> Option<&GameObject> {
        self.maps.values().find_map(|map| map.object(id))
    }

    /// The map holding `id`, for mutation through its own API.
    pub fn map_of_mut(&mut self, id: ObjectId) -> Option<&mut Map> {
        self.maps.values_mut().find(|map| map.contains(id))
    }

    /// Moves an object to another map, keeping its list memberships.
    pub fn transfer(&mut self, id: ObjectId, to: &str) -> Result<(), StepError> {
        let from = self
            .locate(id)
            .map(str::to_string)
            .ok_or_else(|| StepError::MissingObject(id, to.to_string()))?;
        if from == to {
            return Ok(());
        }
        if !self.maps.contains_key(to) {
            return Err(StepError::UnknownMap(to.to_string()));
        }

        let Some(mut source) = self.maps.remove(&from) else {
            return Err(StepError::UnknownMap(from));
        };
        let result = match self.maps.get_mut(to) {
            Some(dest) => transfer_object(&mut source, dest, id),
            None => Err(StepError::UnknownMap(to.to_string())),
        };
        self.maps.insert(from, source);
        result
    }

    /// Steps the named maps in name order. Each map is detached while it
    /// steps so its hooks can reach the others.
    pub fn step(&mut self, active: &BTreeSet<String>, clock: Clock) {
        for name in active {
            let Some(mut map) = self.maps.remove(name) else {
                warn!("Cannot step unknown map '{}'", name);
                continue;
            };
            step_map(&mut map, self, clock);
            self.maps.insert(name.clone(), map);
        }
    }

    pub fn clear_changed(&mut self) {
        for map in self.maps.values_mut() {
            map.clear_changed();
        }
    }

    /// Every `player` sprite, by map name then list order. These are the
    /// slots joining players take over.
    pub fn player_slots(&self) -> Vec<ObjectId> {
        self.maps
            .values()
            .flat_map(|map| map.objects_in(ObjectList::Sprites))
            .filter(|obj| obj.is_player())
            .map(|obj| obj.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::TileGrid;

    fn map(name: &str) -> Map {
        Map::new(
            name,
            TileGrid {
                width: 8,
                height: 8,
                tile_width: 32,
                tile_height: 32,
            },
        )
    }

    #[test]
    fn test_transfer_moves_single_owner() {
        let mut world = World::new("demo");
        let mut start = map("start");
        let id = start.add_object(GameObject::new("p", "player", 0.0, 0.0, 32.0, 32.0), ObjectList::Sprites);
        world.insert_map(start);
        world.insert_map(map("under"));

        world.transfer(id, "under").unwrap();
        assert_eq!(world.locate(id), Some("under"));
        assert!(!world.map("start").unwrap().contains(id));
        assert_eq!(world.object(id).unwrap().map_name, "under");

        assert!(matches!(world.transfer(id, "nowhere"), Err(StepError::UnknownMap(_))));
        assert_eq!(world.locate(id), Some("under"));
        assert!(world.map("start").is_some());
        assert!(world.transfer(id, "under").is_ok());
    }

    #[test]
    fn test_player_slots_in_map_order() {
        let mut world = World::new("demo");
        let mut b = map("b");
        let p2 = b.add_object(GameObject::new("p2", "player", 0.0, 0.0, 32.0, 32.0), ObjectList::Sprites);
        b.add_object(GameObject::new("rock", "rock", 0.0, 0.0, 32.0, 32.0), ObjectList::Sprites);
        let mut a = map("a");
        let p1 = a.add_object(GameObject::new("p1", "player", 0.0, 0.0, 32.0, 32.0), ObjectList::Sprites);
        world.insert_map(b);
        world.insert_map(a);

        assert_eq!(world.player_slots(), vec![p1, p2]);
    }

    #[test]
    fn test_next_map_name_wraps() {
        let mut world = World::new("demo");
        world.insert_map(map("a"));
        world.insert_map(map("b"));
        world.insert_map(map("c"));

        assert_eq!(world.next_map_name("a").as_deref(), Some("b"));
        assert_eq!(world.next_map_name("c").as_deref(), Some("a"));
        assert_eq!(World::new("x").next_map_name("a"), None);
    }

    #[test]
    fn test_step_skips_unknown_and_restores_maps() {
        let mut world = World::new("demo");
        world.insert_map(map("a"));
        let active: BTreeSet<String> = ["a".to_string(), "ghost".to_string()].into_iter().collect();

        world.step(&active, Clock::new(0.0, 30));
        assert_eq!(world.map_names(), vec!["a".to_string()]);
    }

    #[test]
    fn test_clear_changed() {
        let mut world = World::new("demo");
        let mut a = map("a");
        a.mark_changed();
        world.insert_map(a);
        world.clear_changed();
        assert!(!world.map("a").unwrap().changed());
    }
}

//! Spatial object model: one tile map, its layers and its object lists

use crate::error::StepError;
use crate::hooks::{HookRegistry, HookTable, Installer};
use log::warn;
use serde::Deserialize;
use shared::{GameObject, MoveTarget, ObjectId, Rect};
use std::collections::HashMap;
use std::sync::Arc;

/// Upper bound on layers so the visibility mask fits a `u64`.
pub const MAX_LAYERS: usize = 64;

/// The semantically typed lists an object can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectList {
    #[default]
    Sprites,
    Triggers,
    Reference,
    InBounds,
    OutOfBounds,
    Overlay,
}

impl ObjectList {
    pub const ALL: [ObjectList; 6] = [
        ObjectList::Sprites,
        ObjectList::Triggers,
        ObjectList::Reference,
        ObjectList::InBounds,
        ObjectList::OutOfBounds,
        ObjectList::Overlay,
    ];

    /// Inverse of [`ObjectList::name`].
    pub fn from_name(name: &str) -> Option<ObjectList> {
        ObjectList::ALL.into_iter().find(|list| list.name() == name)
    }

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ObjectList::Sprites => "sprites",
            ObjectList::Triggers => "triggers",
            ObjectList::Reference => "reference",
            ObjectList::InBounds => "inBounds",
            ObjectList::OutOfBounds => "outOfBounds",
            ObjectList::Overlay => "overlay",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tileset {
    pub name: String,
    pub tile_count: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Anchor offset from a tile's top-left; defaults to the tile centre.
    #[serde(default)]
    pub anchor_x: Option<f32>,
    #[serde(default)]
    pub anchor_y: Option<f32>,
}

impl Tileset {
    pub fn anchor_offset(&self) -> (f32, f32) {
        (
            self.anchor_x.unwrap_or(self.tile_width as f32 / 2.0),
            self.anchor_y.unwrap_or(self.tile_height as f32 / 2.0),
        )
    }
}

/// A tileset registered on a map, numbered from `first_gid`.
#[derive(Debug, Clone)]
pub struct MapTileset {
    pub first_gid: u32,
    pub tileset: Arc<Tileset>,
}

impl MapTileset {
    /// One past the last gid of this tileset. Wider than `u32` so that
    /// untrusted counts cannot wrap.
    pub fn end_gid(&self) -> u64 {
        u64::from(self.first_gid) + u64::from(self.tileset.tile_count)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub visible: bool,
    pub show_after: Option<f64>,
    pub hide_after: Option<f64>,
}

impl Layer {
    pub fn new(name: &str, visible: bool) -> Self {
        Self {
            name: name.to_string(),
            visible,
            show_after: None,
            hide_after: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
}

/// Filters for [`Map::find_object`] and [`Map::find_all`].
///
/// Point filters test the object's bounding rectangle, not its anchor, so a
/// point query answers "what occupies this pixel".
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectQuery<'a> {
    pub point: Option<(f32, f32)>,
    pub name: Option<&'a str>,
    pub kind: Option<&'a str>,
    pub list: ObjectList,
    pub exclude: Option<ObjectId>,
}

impl<'a> ObjectQuery<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.point = Some((x, y));
        self
    }

    pub fn named(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn of_kind(mut self, kind: &'a str) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn in_list(mut self, list: ObjectList) -> Self {
        self.list = list;
        self
    }

    pub fn excluding(mut self, id: ObjectId) -> Self {
        self.exclude = Some(id);
        self
    }

    pub fn matches(&self, obj: &GameObject) -> bool {
        if self.exclude == Some(obj.id) {
            return false;
        }
        if let Some(name) = self.name {
            if obj.name != name {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if obj.kind != kind {
                return false;
            }
        }
        if let Some((x, y)) = self.point {
            if !obj.bounds().contains(x, y) {
                return false;
            }
        }
        true
    }
}

/// An object lifted out of a map together with the lists it belonged to.
#[derive(Debug, Clone)]
pub struct Detached {
    pub object: GameObject,
    pub lists: Vec<ObjectList>,
}

/// A tile map and everything living on it.
///
/// Objects are stored once, keyed by id; the lists hold ids. An object stays
/// in the store for as long as at least one list references it. Every
/// mutation a client could observe sets the `changed` flag, which the
/// broadcast loop reads and clears.
pub struct Map {
    pub name: String,
    pub grid: TileGrid,
    layers: Vec<Layer>,
    tilesets: Vec<MapTileset>,
    objects: HashMap<ObjectId, GameObject>,
    lists: [Vec<ObjectId>; 6],
    changed: bool,
    hooks: Arc<HookTable>,
}

impl Map {
    pub fn new(name: &str, grid: TileGrid) -> Self {
        Self {
            name: name.to_string(),
            grid,
            layers: Vec::new(),
            tilesets: Vec::new(),
            objects: HashMap::new(),
            lists: Default::default(),
            changed: false,
            hooks: Arc::new(HookTable::default()),
        }
    }

    /// Runs every installer, then the `init` hooks, then freezes the hook
    /// order for the lifetime of this map.
    pub fn install(&mut self, installers: &[Installer]) {
        let mut registry = HookRegistry::new();
        for install in installers {
            install(&mut registry);
        }
        let table = registry.build(self);
        self.hooks = Arc::new(table);
    }

    pub fn hooks(&self) -> Arc<HookTable> {
        Arc::clone(&self.hooks)
    }

    pub fn pixel_width(&self) -> f32 {
        self.grid.width as f32 * self.grid.tile_width as f32
    }

    pub fn pixel_height(&self) -> f32 {
        self.grid.height as f32 * self.grid.tile_height as f32
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    pub fn clear_changed(&mut self) {
        self.changed = false;
    }

    // ---- tilesets ----

    pub fn add_tileset(&mut self, first_gid: u32, tileset: Arc<Tileset>) {
        self.tilesets.push(MapTileset { first_gid, tileset });
        self.tilesets.sort_by_key(|t| t.first_gid);
    }

    pub fn tileset(&self, name: &str) -> Option<&MapTileset> {
        self.tilesets.iter().find(|t| t.tileset.name == name)
    }

    /// Resolves a map-local gid to `(tileset name, tile number)`.
    pub fn find_tile(&self, gid: u32) -> Option<(&str, u32)> {
        self.tilesets
            .iter()
            .rev()
            .find(|t| t.first_gid <= gid && u64::from(gid) < t.end_gid())
            .map(|t| (t.tileset.name.as_str(), gid - t.first_gid))
    }

    pub fn find_gid(&self, tileset: &str, tile_number: u32) -> Option<u32> {
        self.tileset(tileset)
            .filter(|t| tile_number < t.tileset.tile_count)
            .and_then(|t| t.first_gid.checked_add(tile_number))
    }

    fn restamp_gid(&self, obj: &mut GameObject) {
        if let Some(tile) = obj.tile.as_mut() {
            match self.find_gid(&tile.tileset, tile.tile_number) {
                Some(gid) => tile.gid = gid,
                None => warn!(
                    "Map '{}' has no tileset '{}' for tile {}",
                    self.name, tile.tileset, tile.tile_number
                ),
            }
        }
        if let Some(held) = obj.holding.as_deref_mut() {
            self.restamp_gid(held);
        }
    }

    // ---- layers ----

    pub fn add_layer(&mut self, layer: Layer) -> bool {
        if self.layers.len() >= MAX_LAYERS {
            warn!("Map '{}' cannot hold layer '{}'", self.name, layer.name);
            return false;
        }
        self.layers.push(layer);
        self.changed = true;
        true
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_visible(&self, name: &str) -> Option<bool> {
        self.layers.iter().find(|l| l.name == name).map(|l| l.visible)
    }

    /// Returns false when no layer has that name.
    pub fn set_layer_visible(&mut self, name: &str, visible: bool) -> bool {
        match self.layers.iter_mut().find(|l| l.name == name) {
            Some(layer) => {
                if layer.visible != visible {
                    layer.visible = visible;
                    self.changed = true;
                }
                true
            }
            None => false,
        }
    }

    /// Sets (or with `None` clears) the time at which a layer becomes
    /// visible (`visible = true`) or hidden.
    pub fn schedule_layer(&mut self, name: &str, visible: bool, at: Option<f64>) -> bool {
        match self.layers.iter_mut().find(|l| l.name == name) {
            Some(layer) => {
                if visible {
                    layer.show_after = at;
                } else {
                    layer.hide_after = at;
                }
                true
            }
            None => false,
        }
    }

    /// Bit `i` is set when layer `i` is visible.
    pub fn visibility_mask(&self) -> u64 {
        self.layers
            .iter()
            .enumerate()
            .filter(|(_, l)| l.visible)
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }

    // ---- objects and lists ----

    pub fn object(&self, id: ObjectId) -> Option<&GameObject> {
        self.objects.get(&id)
    }

    /// Direct access for fields outside the spatial model. Callers that
    /// change something clients render must call [`Map::mark_changed`].
    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut GameObject> {
        self.objects.get_mut(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn list(&self, list: ObjectList) -> &[ObjectId] {
        &self.lists[list.index()]
    }

    pub fn in_list(&self, id: ObjectId, list: ObjectList) -> bool {
        self.list(list).contains(&id)
    }

    /// Objects of a list in list order.
    pub fn objects_in(&self, list: ObjectList) -> impl Iterator<Item = &GameObject> + '_ {
        self.list(list).iter().filter_map(|id| self.objects.get(id))
    }

    /// Every stored object, in no particular order.
    pub fn objects(&self) -> impl Iterator<Item = &GameObject> + '_ {
        self.objects.values()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Stores `obj` on this map and appends it to `list`.
    pub fn add_object(&mut self, mut obj: GameObject, list: ObjectList) -> ObjectId {
        obj.map_name = self.name.clone();
        self.restamp_gid(&mut obj);
        let id = obj.id;
        self.objects.insert(id, obj);
        let ids = &mut self.lists[list.index()];
        if !ids.contains(&id) {
            ids.push(id);
        }
        self.changed = true;
        id
    }

    /// Adds an object already on this map to one more list.
    pub fn add_to_list(&mut self, id: ObjectId, list: ObjectList) -> bool {
        if !self.objects.contains_key(&id) {
            return false;
        }
        let ids = &mut self.lists[list.index()];
        if !ids.contains(&id) {
            ids.push(id);
            self.changed = true;
        }
        true
    }

    /// Removes `id` from `list`. An object left in no list is dropped.
    pub fn remove_object(&mut self, id: ObjectId, list: ObjectList) -> bool {
        let ids = &mut self.lists[list.index()];
        let Some(pos) = ids.iter().position(|other| *other == id) else {
            return false;
        };
        ids.remove(pos);
        if !ObjectList::ALL.iter().any(|l| self.in_list(id, *l)) {
            self.objects.remove(&id);
        }
        self.changed = true;
        true
    }

    /// Lifts an object out of every list it is in.
    pub fn take_object(&mut self, id: ObjectId) -> Option<Detached> {
        let object = self.objects.remove(&id)?;
        let mut lists = Vec::new();
        for list in ObjectList::ALL {
            let ids = &mut self.lists[list.index()];
            if let Some(pos) = ids.iter().position(|other| *other == id) {
                ids.remove(pos);
                lists.push(list);
            }
        }
        self.changed = true;
        Some(Detached { object, lists })
    }

    /// Puts a detached object back into the same lists on this map.
    pub fn insert_object(&mut self, detached: Detached) -> ObjectId {
        let Detached { object, mut lists } = detached;
        if lists.is_empty() {
            lists.push(ObjectList::Sprites);
        }
        let id = self.add_object(object, lists[0]);
        for list in &lists[1..] {
            self.add_to_list(id, *list);
        }
        id
    }

    pub fn find_object(&self, query: &ObjectQuery<'_>) -> Option<ObjectId> {
        self.list(query.list)
            .iter()
            .copied()
            .find(|id| self.objects.get(id).is_some_and(|obj| query.matches(obj)))
    }

    pub fn find_all(&self, query: &ObjectQuery<'_>) -> Vec<ObjectId> {
        self.list(query.list)
            .iter()
            .copied()
            .filter(|id| self.objects.get(id).is_some_and(|obj| query.matches(obj)))
            .collect()
    }

    pub fn find_reference(&self, name: &str) -> Option<&GameObject> {
        self.find_object(&ObjectQuery::new().named(name).in_list(ObjectList::Reference))
            .and_then(|id| self.object(id))
    }

    // ---- location ----

    fn anchor_offset(&self, obj: &GameObject) -> (f32, f32) {
        if let Some(tile) = &obj.tile {
            match self.tileset(&tile.tileset) {
                Some(t) => return t.tileset.anchor_offset(),
                None => warn!(
                    "{} uses tileset '{}' which map '{}' does not have, anchoring at centre",
                    obj.describe(),
                    tile.tileset,
                    self.name
                ),
            }
        }
        (obj.width / 2.0, obj.height / 2.0)
    }

    /// Positions an object that is not (yet) stored on this map.
    pub fn place_by_top_left(&self, obj: &mut GameObject, x: f32, y: f32) {
        let (ox, oy) = self.anchor_offset(obj);
        obj.x = x;
        obj.y = y;
        obj.anchor_x = x + ox;
        obj.anchor_y = y + oy;
    }

    pub fn place_by_anchor(&self, obj: &mut GameObject, anchor_x: f32, anchor_y: f32) {
        let (ox, oy) = self.anchor_offset(obj);
        obj.anchor_x = anchor_x;
        obj.anchor_y = anchor_y;
        obj.x = anchor_x - ox;
        obj.y = anchor_y - oy;
    }

    pub fn set_location_by_top_left(&mut self, id: ObjectId, x: f32, y: f32) -> bool {
        let Some((ox, oy)) = self.objects.get(&id).map(|obj| self.anchor_offset(obj)) else {
            return false;
        };
        if let Some(obj) = self.objects.get_mut(&id) {
            obj.x = x;
            obj.y = y;
            obj.anchor_x = x + ox;
            obj.anchor_y = y + oy;
            self.changed = true;
        }
        true
    }

    pub fn set_location_by_anchor(&mut self, id: ObjectId, anchor_x: f32, anchor_y: f32) -> bool {
        let Some((ox, oy)) = self.objects.get(&id).map(|obj| self.anchor_offset(obj)) else {
            return false;
        };
        if let Some(obj) = self.objects.get_mut(&id) {
            obj.anchor_x = anchor_x;
            obj.anchor_y = anchor_y;
            obj.x = anchor_x - ox;
            obj.y = anchor_y - oy;
            self.changed = true;
        }
        true
    }

    pub fn set_destination(&mut self, id: ObjectId, target: MoveTarget) -> bool {
        match self.objects.get_mut(&id) {
            Some(obj) => {
                obj.move_target = Some(target);
                true
            }
            None => false,
        }
    }

    pub fn stop_object(&mut self, id: ObjectId) {
        if let Some(obj) = self.objects.get_mut(&id) {
            obj.stop();
        }
    }

    // ---- bounds ----

    pub fn within_extent(&self, x: f32, y: f32) -> bool {
        Rect::new(0.0, 0.0, self.pixel_width(), self.pixel_height()).contains(x, y)
    }

    /// A point is legal when it is on the map and either inside an in-bounds
    /// region or outside every out-of-bounds region.
    pub fn is_in_bounds(&self, x: f32, y: f32) -> bool {
        if !self.within_extent(x, y) {
            return false;
        }
        let in_region = |list| self.objects_in(list).any(|obj| obj.bounds().contains(x, y));
        in_region(ObjectList::InBounds) || !in_region(ObjectList::OutOfBounds)
    }
}

/// Moves an object, with its list memberships, from one map to another.
pub fn transfer_object(from: &mut Map, to: &mut Map, id: ObjectId) -> Result<(), StepError> {
    let detached = from
        .take_object(id)
        .ok_or_else(|| StepError::MissingObject(id, from.name.clone()))?;
    to.insert_object(detached);
    Ok(())
}

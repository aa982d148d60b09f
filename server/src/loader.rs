//! Reads a world description (JSON) and builds ready-to-step maps
//!
//! Positions in the file are top-left corners in pixels. Tile objects name
//! their tile by map-local `gid`; width and height default to the tile size.

use crate::error::LoadError;
use crate::hooks::Installer;
use crate::map::{Layer, Map, ObjectList, TileGrid, Tileset, MAX_LAYERS};
use crate::world::World;
use log::info;
use serde::Deserialize;
use shared::{GameObject, Properties, TileRef};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct WorldData {
    pub game: String,
    #[serde(default)]
    pub tilesets: Vec<Tileset>,
    pub maps: Vec<MapData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapData {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    #[serde(default)]
    pub layers: Vec<LayerData>,
    #[serde(default)]
    pub tilesets: Vec<MapTilesetData>,
    #[serde(default)]
    pub sprites: Vec<ObjectData>,
    #[serde(default)]
    pub triggers: Vec<ObjectData>,
    #[serde(default)]
    pub reference: Vec<ObjectData>,
    #[serde(default)]
    pub in_bounds: Vec<ObjectData>,
    #[serde(default)]
    pub out_of_bounds: Vec<ObjectData>,
    #[serde(default)]
    pub overlay: Vec<ObjectData>,
}

#[derive(Debug, Deserialize)]
pub struct LayerData {
    pub name: String,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
}

fn visible_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapTilesetData {
    pub first_gid: u32,
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ObjectData {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    #[serde(default)]
    pub gid: Option<u32>,
    #[serde(default)]
    pub properties: Properties,
}

pub fn load_world(path: &Path, installers: &[Installer]) -> Result<World, LoadError> {
    let json = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let world = parse_world(&json, installers)?;
    info!(
        "Loaded game '{}' from {} with maps {:?}",
        world.game,
        path.display(),
        world.map_names()
    );
    Ok(world)
}

pub fn parse_world(json: &str, installers: &[Installer]) -> Result<World, LoadError> {
    let data: WorldData = serde_json::from_str(json)?;
    let tilesets: HashMap<String, Arc<Tileset>> = data
        .tilesets
        .into_iter()
        .map(|t| (t.name.clone(), Arc::new(t)))
        .collect();

    let mut world = World::new(&data.game);
    for map_data in data.maps {
        let name = map_data.name.clone();
        let map = build_map(map_data, &tilesets, installers)?;
        if world.insert_map(map).is_some() {
            return Err(LoadError::DuplicateMap(name));
        }
    }
    Ok(world)
}

/// Builds one map: tilesets, layers, objects, then hook installation.
pub fn build_map(
    data: MapData,
    tilesets: &HashMap<String, Arc<Tileset>>,
    installers: &[Installer],
) -> Result<Map, LoadError> {
    if data.layers.len() > MAX_LAYERS {
        return Err(LoadError::TooManyLayers {
            map: data.name,
            count: data.layers.len(),
        });
    }

    let mut map = Map::new(
        &data.name,
        TileGrid {
            width: data.width,
            height: data.height,
            tile_width: data.tile_width,
            tile_height: data.tile_height,
        },
    );

    for registered in &data.tilesets {
        let tileset = tilesets
            .get(&registered.name)
            .ok_or_else(|| LoadError::UnknownTileset {
                map: data.name.clone(),
                tileset: registered.name.clone(),
            })?;
        map.add_tileset(registered.first_gid, Arc::clone(tileset));
    }

    for layer in &data.layers {
        map.add_layer(Layer::new(&layer.name, layer.visible));
    }

    let lists = [
        (data.sprites, ObjectList::Sprites),
        (data.triggers, ObjectList::Triggers),
        (data.reference, ObjectList::Reference),
        (data.in_bounds, ObjectList::InBounds),
        (data.out_of_bounds, ObjectList::OutOfBounds),
        (data.overlay, ObjectList::Overlay),
    ];
    for (objects, list) in lists {
        for object in objects {
            let obj = build_object(&map, object)?;
            map.add_object(obj, list);
        }
    }

    map.install(installers);
    map.clear_changed();
    Ok(map)
}

fn build_object(map: &Map, data: ObjectData) -> Result<GameObject, LoadError> {
    let mut obj = GameObject::new(&data.name, &data.kind, data.x, data.y, data.width, data.height);
    obj.properties = data.properties;

    if let Some(gid) = data.gid {
        let (tileset, tile_number) = map.find_tile(gid).ok_or_else(|| LoadError::UnknownGid {
            map: map.name.clone(),
            gid,
        })?;
        if let Some(registered) = map.tileset(tileset) {
            if obj.width == 0.0 {
                obj.width = registered.tileset.tile_width as f32;
            }
            if obj.height == 0.0 {
                obj.height = registered.tileset.tile_height as f32;
            }
        }
        obj.tile = Some(TileRef {
            tileset: tileset.to_string(),
            tile_number,
            gid,
        });
    }

    map.place_by_top_left(&mut obj, data.x, data.y);
    Ok(obj)
}

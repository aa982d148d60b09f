//! Game object model shared by the server engine and anything that renders it.

use crate::geometry::Rect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a game object. Stays the same when the object
/// moves between lists or maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl ObjectId {
    pub fn next() -> Self {
        ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Free-form property value attached to an object by the world author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PropertyValue {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            PropertyValue::Int(v) => Some(*v as f32),
            PropertyValue::Float(v) => Some(*v as f32),
            PropertyValue::Text(s) => s.trim().parse().ok(),
            PropertyValue::Bool(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

/// Tile backing for an object drawn from a tileset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRef {
    pub tileset: String,
    /// Tile index relative to the tileset.
    pub tile_number: u32,
    /// Map-local gid; re-derived whenever the object changes maps.
    pub gid: u32,
}

/// Pending movement. Destination and speed are always set and cleared together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveTarget {
    pub dest_x: f32,
    pub dest_y: f32,
    /// Pixels per second.
    pub speed: f32,
    /// Skip in/out-of-bounds regions; the map extent still applies.
    pub ignore_bounds: bool,
}

impl MoveTarget {
    pub fn new(dest_x: f32, dest_y: f32, speed: f32) -> Self {
        Self {
            dest_x,
            dest_y,
            speed,
            ignore_bounds: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespawnPoint {
    pub map_name: String,
    pub x: f32,
    pub y: f32,
}

/// Text drawn in place of a tile, e.g. an overlay pop-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpec {
    pub text: String,
    pub color: String,
    pub size: u32,
}

/// Fields that can be scheduled to disappear at a given game time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimedField {
    /// The whole object is deleted from its map.
    Object,
    SpeechText,
    LabelText,
}

/// A sprite, trigger, reference point, region or overlay item.
///
/// Geometry is stored twice: the top-left `x, y` of the bounding box and the
/// anchor point used for every containment and movement calculation. The
/// owning map keeps the two in sync; use its location setters rather than
/// writing either pair directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameObject {
    pub id: ObjectId,
    pub name: String,
    pub kind: String,
    pub map_name: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub anchor_x: f32,
    pub anchor_y: f32,
    pub tile: Option<TileRef>,
    #[serde(skip)]
    pub properties: Properties,

    pub player_number: Option<u32>,
    pub label_text: Option<String>,
    pub action_text: Option<String>,
    pub speech_text: Option<String>,
    pub text: Option<TextSpec>,
    /// Last heading in radians, kept after arrival.
    pub direction: Option<f32>,
    pub move_target: Option<MoveTarget>,
    pub holding: Option<Box<GameObject>>,

    /// Pending action request from the controlling player.
    #[serde(skip)]
    pub action: bool,
    #[serde(skip)]
    pub respawn: Option<RespawnPoint>,
    /// Speed cached while a speed zone scales `move_target.speed`.
    #[serde(skip)]
    pub normal_speed: Option<f32>,
    /// Movement parked by a stop region.
    #[serde(skip)]
    pub paused_move: Option<MoveTarget>,
    #[serde(skip)]
    pub expires: BTreeMap<TimedField, f64>,
}

impl GameObject {
    /// Creates a shape object with a fresh id and a rect-centre anchor.
    pub fn new(name: &str, kind: &str, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            id: ObjectId::next(),
            name: name.to_string(),
            kind: kind.to_string(),
            map_name: String::new(),
            x,
            y,
            width,
            height,
            anchor_x: x + width / 2.0,
            anchor_y: y + height / 2.0,
            tile: None,
            properties: Properties::new(),
            player_number: None,
            label_text: None,
            action_text: None,
            speech_text: None,
            text: None,
            direction: None,
            move_target: None,
            holding: None,
            action: false,
            respawn: None,
            normal_speed: None,
            paused_move: None,
            expires: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn with_tile(mut self, tile: TileRef) -> Self {
        self.tile = Some(tile);
        self
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn is_player(&self) -> bool {
        self.kind == "player"
    }

    pub fn is_moving(&self) -> bool {
        self.move_target.is_some()
    }

    pub fn stop(&mut self) {
        self.move_target = None;
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.property(key).and_then(PropertyValue::as_str)
    }

    pub fn prop_f32(&self, key: &str) -> Option<f32> {
        self.property(key).and_then(PropertyValue::as_f32)
    }

    pub fn set_property(&mut self, key: &str, value: impl Into<PropertyValue>) {
        self.properties.insert(key.to_string(), value.into());
    }

    /// Schedules `field` to be cleared once game time reaches `at`.
    pub fn expire_at(&mut self, field: TimedField, at: f64) {
        self.expires.insert(field, at);
    }

    /// Short human description for log lines.
    pub fn describe(&self) -> String {
        format!(
            "{} '{}' ({:?}) on map '{}'",
            if self.kind.is_empty() { "object" } else { &self.kind },
            self.name,
            self.id,
            self.map_name
        )
    }
}

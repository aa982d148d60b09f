pub mod geometry;
pub mod object;

pub use geometry::{angle, distance, normalize_angle, project, Rect};
pub use object::{
    GameObject, MoveTarget, ObjectId, Properties, PropertyValue, RespawnPoint, TextSpec,
    TileRef, TimedField,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TICK_RATE: u32 = 30;
pub const DEFAULT_MOVE_SPEED: f32 = 120.0;
pub const DEFAULT_PORT: u16 = 20000;
/// Largest payload a single UDP datagram can carry.
pub const MAX_PACKET_SIZE: usize = 65_507;
pub const MIN_NAME_LEN: usize = 1;
pub const MAX_NAME_LEN: usize = 16;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    JoinRequest {
        game: String,
        display_name: String,
    },
    PlayerMove {
        dest_x: f32,
        dest_y: f32,
    },
    PlayerAction,
    Leave,
    TestPlayerJump {
        x: f32,
        y: f32,
    },
    TestPlayerNextMap,

    JoinReply {
        player_number: u32,
        server_sec: f64,
        test_mode: bool,
    },
    Step {
        game_sec: f64,
        map_name: String,
        layer_visibility: u64,
        sprites: Vec<GameObject>,
        overlay: Vec<GameObject>,
        action_text: Option<String>,
    },
    Error {
        result: String,
    },
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum PacketError {
    #[error("{field} must be {min} to {max} characters long, got {len}")]
    FieldLength {
        field: &'static str,
        len: usize,
        min: usize,
        max: usize,
    },
    #[error("{field} must be a finite number")]
    NonFinite { field: &'static str },
}

fn check_len(field: &'static str, value: &str) -> Result<(), PacketError> {
    let len = value.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return Err(PacketError::FieldLength {
            field,
            len,
            min: MIN_NAME_LEN,
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}

fn check_finite(field: &'static str, value: f32) -> Result<(), PacketError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PacketError::NonFinite { field })
    }
}

impl Packet {
    /// Rejects client packets whose fields the server must not trust.
    pub fn validate(&self) -> Result<(), PacketError> {
        match self {
            Packet::JoinRequest { game, display_name } => {
                check_len("game", game)?;
                check_len("playerDisplayName", display_name)
            }
            Packet::PlayerMove { dest_x, dest_y } => {
                check_finite("moveDestX", *dest_x)?;
                check_finite("moveDestY", *dest_y)
            }
            Packet::TestPlayerJump { x, y } => {
                check_finite("x", *x)?;
                check_finite("y", *y)
            }
            _ => Ok(()),
        }
    }

    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::JoinRequest { .. } => "joinRequest",
            Packet::PlayerMove { .. } => "playerMove",
            Packet::PlayerAction => "playerAction",
            Packet::Leave => "leave",
            Packet::TestPlayerJump { .. } => "testPlayerJump",
            Packet::TestPlayerNextMap => "testPlayerNextMap",
            Packet::JoinReply { .. } => "joinReply",
            Packet::Step { .. } => "step",
            Packet::Error { .. } => "error",
            Packet::Disconnected { .. } => "disconnected",
        }
    }
}

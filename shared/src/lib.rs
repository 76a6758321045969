use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub const WORLD_WIDTH: f32 = 2048.0;
pub const WORLD_HEIGHT: f32 = 2048.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Digest of an image blob's text, used to key decoded images and textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobKey(pub u64);

impl BlobKey {
    pub fn digest(bytes: &[u8]) -> Self {
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        BlobKey(hasher.finish())
    }
}

/// Encoded sprite frame as sent by the server: base64 image data,
/// optionally wrapped in a `data:` URL.
///
/// Cloning is cheap; the text is shared and its digest computed once.
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ImageBlob {
    data: Arc<str>,
    key: BlobKey,
}

impl ImageBlob {
    pub fn new(data: impl Into<String>) -> Self {
        let data: String = data.into();
        let key = BlobKey::digest(data.as_bytes());
        Self {
            data: Arc::from(data),
            key,
        }
    }

    pub fn key(&self) -> BlobKey {
        self.key
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// The base64 payload with any `data:<mime>;base64,` header removed.
    pub fn payload(&self) -> &str {
        let data = self.data.trim();
        if data.starts_with("data:") {
            match data.find(',') {
                Some(comma) => &data[comma + 1..],
                None => "",
            }
        } else {
            data
        }
    }
}

impl From<String> for ImageBlob {
    fn from(data: String) -> Self {
        ImageBlob::new(data)
    }
}

impl From<ImageBlob> for String {
    fn from(blob: ImageBlob) -> Self {
        blob.data.to_string()
    }
}

impl PartialEq for ImageBlob {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.data == other.data
    }
}

impl fmt::Debug for ImageBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBlob")
            .field("key", &self.key)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Directional sprite sequences shared by every player using the avatar.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AvatarDefinition {
    pub name: String,
    #[serde(default)]
    pub frames: HashMap<Direction, Vec<ImageBlob>>,
}

impl AvatarDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frames: HashMap::new(),
        }
    }

    pub fn with_frames(mut self, direction: Direction, frames: Vec<ImageBlob>) -> Self {
        self.frames.insert(direction, frames);
        self
    }

    /// Frame for `direction` at `animation_frame`, wrapping past the end of
    /// the sequence. `None` when the direction has no frames.
    pub fn frame(&self, direction: Direction, animation_frame: u32) -> Option<&ImageBlob> {
        let sequence = self.frames.get(&direction)?;
        if sequence.is_empty() {
            return None;
        }
        sequence.get(animation_frame as usize % sequence.len())
    }

    pub fn blobs(&self) -> impl Iterator<Item = &ImageBlob> {
        self.frames.values().flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    #[serde(default)]
    pub id: String,
    pub x: f32,
    pub y: f32,
    #[serde(default, alias = "direction")]
    pub facing: Direction,
    #[serde(default, alias = "avatar")]
    pub avatar_ref: String,
    #[serde(default)]
    pub animation_frame: u32,
    #[serde(default, alias = "username")]
    pub display_name: String,
}

impl Player {
    pub fn new(id: impl Into<String>, x: f32, y: f32) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            x,
            y,
            facing: Direction::Down,
            avatar_ref: String::new(),
            animation_frame: 0,
        }
    }

    pub fn with_avatar(mut self, avatar_ref: impl Into<String>) -> Self {
        self.avatar_ref = avatar_ref.into();
        self
    }

    pub fn with_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn facing(mut self, direction: Direction, animation_frame: u32) -> Self {
        self.facing = direction;
        self.animation_frame = animation_frame;
        self
    }
}

/// Messages sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinGame { username: String },
    Move { direction: Direction },
    Stop,
}

impl ClientMessage {
    pub fn action(&self) -> &'static str {
        match self {
            ClientMessage::JoinGame { .. } => "join_game",
            ClientMessage::Move { .. } => "move",
            ClientMessage::Stop => "stop",
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Messages pushed by the server. Actions this client does not know decode
/// to [`ServerMessage::Unknown`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerMessage {
    JoinGame {
        success: bool,
        #[serde(rename = "playerId", default)]
        player_id: Option<String>,
        #[serde(default)]
        players: HashMap<String, Player>,
        #[serde(default)]
        avatars: HashMap<String, AvatarDefinition>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    PlayersMoved {
        players: HashMap<String, Player>,
    },
    PlayerJoined {
        player: Player,
        avatar: AvatarDefinition,
    },
    PlayerLeft {
        #[serde(rename = "playerId")]
        player_id: String,
    },
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn action(&self) -> &'static str {
        match self {
            ServerMessage::JoinGame { .. } => "join_game",
            ServerMessage::PlayersMoved { .. } => "players_moved",
            ServerMessage::PlayerJoined { .. } => "player_joined",
            ServerMessage::PlayerLeft { .. } => "player_left",
            ServerMessage::Unknown => "unknown",
        }
    }
}

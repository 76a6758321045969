//! Keyboard sampling and the intents it turns into

use crate::network::Outbound;
use log::{debug, warn};
use macroquad::prelude::{is_key_down, KeyCode};
use shared::{ClientMessage, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEdge {
    Pressed(Direction),
    Released(Direction),
}

/// What releasing a direction key does while another one is still held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReleaseBehavior {
    /// Any release sends `stop`, even if another direction is held.
    #[default]
    StopOnAnyRelease,
    /// Resume the most recently pressed direction still held; `stop` only
    /// when none is left.
    ResumeHeld,
}

/// Turns press/release edges into `move`/`stop` intents.
pub struct IntentDispatcher {
    // Press order, most recent last.
    held: Vec<Direction>,
    release: ReleaseBehavior,
}

impl IntentDispatcher {
    pub fn new(release: ReleaseBehavior) -> Self {
        Self {
            held: Vec::with_capacity(Direction::ALL.len()),
            release,
        }
    }

    pub fn held(&self) -> &[Direction] {
        &self.held
    }

    /// The intent an edge produces, if any. Repeated presses of a held key
    /// produce nothing.
    pub fn intent_for(&mut self, edge: KeyEdge) -> Option<ClientMessage> {
        match edge {
            KeyEdge::Pressed(direction) => {
                if self.held.contains(&direction) {
                    return None;
                }
                self.held.push(direction);
                Some(ClientMessage::Move { direction })
            }
            KeyEdge::Released(direction) => {
                let was_held = self.held.contains(&direction);
                self.held.retain(|held| *held != direction);

                match self.release {
                    ReleaseBehavior::StopOnAnyRelease => Some(ClientMessage::Stop),
                    ReleaseBehavior::ResumeHeld if !was_held => None,
                    ReleaseBehavior::ResumeHeld => Some(match self.held.last() {
                        Some(&direction) => ClientMessage::Move { direction },
                        None => ClientMessage::Stop,
                    }),
                }
            }
        }
    }

    /// Sends the intent for `edge` when the connection is open. Intents
    /// produced while closed are dropped. Returns what was sent.
    pub fn dispatch(&mut self, edge: KeyEdge, outbound: &dyn Outbound) -> Option<ClientMessage> {
        let message = self.intent_for(edge)?;
        if !outbound.is_open() {
            debug!("Dropping {} while disconnected", message.action());
            return None;
        }

        match outbound.send(message.clone()) {
            Ok(()) => Some(message),
            Err(e) => {
                warn!("Failed to send {}: {}", message.action(), e);
                None
            }
        }
    }
}

impl Default for IntentDispatcher {
    fn default() -> Self {
        Self::new(ReleaseBehavior::default())
    }
}

const BINDINGS: [(Direction, [KeyCode; 2]); 4] = [
    (Direction::Up, [KeyCode::W, KeyCode::Up]),
    (Direction::Down, [KeyCode::S, KeyCode::Down]),
    (Direction::Left, [KeyCode::A, KeyCode::Left]),
    (Direction::Right, [KeyCode::D, KeyCode::Right]),
];

/// Samples WASD and the arrow keys each frame and reports edges.
#[derive(Default)]
pub struct KeyboardInput {
    // Previous frame key states for edge detection
    was_down: [bool; 4],
}

impl KeyboardInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll(&mut self) -> Vec<KeyEdge> {
        let mut down = [false; 4];
        for (slot, (_, keys)) in down.iter_mut().zip(BINDINGS.iter()) {
            *slot = keys.iter().any(|key| is_key_down(*key));
        }
        self.update(down)
    }

    /// Edges between the previous sample and `down`, indexed like
    /// [`Direction::ALL`].
    pub fn update(&mut self, down: [bool; 4]) -> Vec<KeyEdge> {
        let mut edges = Vec::new();
        for (i, (direction, _)) in BINDINGS.iter().enumerate() {
            match (self.was_down[i], down[i]) {
                (false, true) => edges.push(KeyEdge::Pressed(*direction)),
                (true, false) => edges.push(KeyEdge::Released(*direction)),
                _ => {}
            }
        }
        self.was_down = down;
        edges
    }
}

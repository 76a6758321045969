//! Local mirror of the server's world state
//!
//! [`WorldState::apply_message`] is the only way the mirror changes. The
//! server is authoritative: a `players_moved` delta replaces each listed
//! player wholesale, and a join snapshot replaces everything.

use log::{debug, info, warn};
use shared::{AvatarDefinition, Player, ServerMessage};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconciliationError {
    #[error("join rejected by server: {0}")]
    JoinRejected(String),
    #[error("join accepted without a player id")]
    MissingPlayerId,
    #[error("server assigned player id {assigned} but this session already plays {current}")]
    LocalPlayerReassigned { current: String, assigned: String },
}

/// What a successfully applied message changed.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub changed: bool,
    /// The local player was part of the update, so the camera should follow.
    pub local_player_moved: bool,
    /// A join snapshot replaced the whole mirror.
    pub resynced: bool,
    /// Avatar definitions introduced by this message, for sprite prefetch.
    pub new_avatars: Vec<Arc<AvatarDefinition>>,
}

/// Read-only view handed to the renderer.
#[derive(Debug, Clone, Copy)]
pub struct WorldSnapshot<'a> {
    pub players: &'a HashMap<String, Player>,
    pub avatars: &'a HashMap<String, Arc<AvatarDefinition>>,
    pub local_player_id: Option<&'a str>,
}

#[derive(Debug, Default)]
pub struct WorldState {
    players: HashMap<String, Player>,
    avatars: HashMap<String, Arc<AvatarDefinition>>,
    local_player_id: Option<String>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_message(
        &mut self,
        message: ServerMessage,
    ) -> Result<ApplyOutcome, ReconciliationError> {
        match message {
            ServerMessage::JoinGame {
                success,
                player_id,
                players,
                avatars,
                error,
            } => self.apply_join(success, player_id, players, avatars, error),

            ServerMessage::PlayersMoved { players } => Ok(self.apply_moves(players)),

            ServerMessage::PlayerJoined { mut player, avatar } => {
                let key = if avatar.name.is_empty() {
                    player.avatar_ref.clone()
                } else {
                    avatar.name.clone()
                };
                if player.avatar_ref.is_empty() {
                    player.avatar_ref = key.clone();
                }

                info!("{} joined as {}", player.display_name, player.id);
                let avatar = Arc::new(avatar);
                self.avatars.insert(key, Arc::clone(&avatar));

                let local_player_moved = self.is_local(&player.id);
                self.players.insert(player.id.clone(), player);

                Ok(ApplyOutcome {
                    changed: true,
                    local_player_moved,
                    new_avatars: vec![avatar],
                    ..ApplyOutcome::default()
                })
            }

            ServerMessage::PlayerLeft { player_id } => {
                let removed = self.players.remove(&player_id);
                match &removed {
                    Some(player) => info!("{} ({}) left", player.display_name, player_id),
                    None => debug!("Ignoring departure of unknown player {}", player_id),
                }
                if removed.is_some() && self.is_local(&player_id) {
                    warn!("Server removed the local player {}", player_id);
                }

                Ok(ApplyOutcome {
                    changed: removed.is_some(),
                    ..ApplyOutcome::default()
                })
            }

            ServerMessage::Unknown => {
                debug!("Ignoring message with unknown action");
                Ok(ApplyOutcome::default())
            }
        }
    }

    fn apply_join(
        &mut self,
        success: bool,
        player_id: Option<String>,
        players: HashMap<String, Player>,
        avatars: HashMap<String, AvatarDefinition>,
        error: Option<String>,
    ) -> Result<ApplyOutcome, ReconciliationError> {
        if !success {
            return Err(ReconciliationError::JoinRejected(
                error.unwrap_or_else(|| "no reason given".to_string()),
            ));
        }

        let player_id = player_id.ok_or(ReconciliationError::MissingPlayerId)?;
        if let Some(current) = &self.local_player_id {
            if *current != player_id {
                return Err(ReconciliationError::LocalPlayerReassigned {
                    current: current.clone(),
                    assigned: player_id,
                });
            }
        }

        self.players = players
            .into_iter()
            .map(|(id, mut player)| {
                player.id = id.clone();
                (id, player)
            })
            .collect();
        self.avatars = avatars
            .into_iter()
            .map(|(name, avatar)| (name, Arc::new(avatar)))
            .collect();

        info!(
            "Joined as {} with {} players and {} avatars",
            player_id,
            self.players.len(),
            self.avatars.len()
        );

        let local_player_moved = self.players.contains_key(&player_id);
        self.local_player_id = Some(player_id);

        Ok(ApplyOutcome {
            changed: true,
            local_player_moved,
            resynced: true,
            new_avatars: self.avatars.values().cloned().collect(),
        })
    }

    fn apply_moves(&mut self, players: HashMap<String, Player>) -> ApplyOutcome {
        let mut outcome = ApplyOutcome {
            changed: !players.is_empty(),
            ..ApplyOutcome::default()
        };

        debug!("Reconciling {} moved players", players.len());
        for (id, mut player) in players {
            if self.is_local(&id) {
                outcome.local_player_moved = true;
            }
            player.id = id.clone();
            self.players.insert(id, player);
        }

        outcome
    }

    fn is_local(&self, id: &str) -> bool {
        self.local_player_id.as_deref() == Some(id)
    }

    /// Forgets the local player id when the connection that assigned it
    /// closes. Players stay visible until the next join snapshot.
    pub fn end_session(&mut self) {
        if let Some(id) = self.local_player_id.take() {
            debug!("Session for {} ended", id);
        }
    }

    pub fn snapshot(&self) -> WorldSnapshot<'_> {
        WorldSnapshot {
            players: &self.players,
            avatars: &self.avatars,
            local_player_id: self.local_player_id.as_deref(),
        }
    }

    pub fn local_player_id(&self) -> Option<&str> {
        self.local_player_id.as_deref()
    }

    pub fn local_player(&self) -> Option<&Player> {
        self.players.get(self.local_player_id.as_deref()?)
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn avatar(&self, name: &str) -> Option<&Arc<AvatarDefinition>> {
        self.avatars.get(name)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}

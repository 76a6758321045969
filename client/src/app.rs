//! Ties the session, world mirror, camera and renderer together
//!
//! Everything here runs on the game thread. Transport events are drained by
//! the caller and handed in one at a time; a message that changes the world
//! is rendered before [`GameClient::handle_session_event`] returns.

use crate::game::{ReconciliationError, WorldState};
use crate::input::{IntentDispatcher, KeyEdge, ReleaseBehavior};
use crate::network::{Outbound, SessionEvent};
use crate::rendering::{RenderStats, Renderer, Surface, WorldMap};
use crate::sprites::SpriteCache;
use crate::viewport::{Viewport, ViewportController};
use log::{debug, error, info, warn};
use shared::ClientMessage;

pub struct GameClient {
    world: WorldState,
    camera: ViewportController,
    renderer: Renderer,
    map: WorldMap,
    intents: IntentDispatcher,
    last_stats: RenderStats,
}

impl GameClient {
    pub fn new(
        map: WorldMap,
        sprites: SpriteCache,
        surface_size: (f32, f32),
        release: ReleaseBehavior,
    ) -> Self {
        let camera = ViewportController::new(surface_size, map.size());
        Self {
            world: WorldState::new(),
            camera,
            renderer: Renderer::new(sprites),
            map,
            intents: IntentDispatcher::new(release),
            last_stats: RenderStats::default(),
        }
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn viewport(&self) -> Viewport {
        self.camera.viewport()
    }

    pub fn last_stats(&self) -> RenderStats {
        self.last_stats
    }

    /// Applies one transport event. Returns whether the surface was redrawn.
    /// A rejected join leaves the world untouched and is returned as an error.
    pub fn handle_session_event(
        &mut self,
        event: SessionEvent,
        surface: &mut dyn Surface,
    ) -> Result<bool, ReconciliationError> {
        match event {
            SessionEvent::Connecting { attempt } => {
                debug!("Connecting (attempt {})", attempt);
                Ok(false)
            }
            SessionEvent::Opened => {
                info!("Connected, waiting for join snapshot");
                Ok(false)
            }
            SessionEvent::ConnectTimeout(waited) => {
                error!("Connection not open after {:?}, still trying", waited);
                Ok(false)
            }
            SessionEvent::Closed {
                reason,
                reconnect_in,
                ..
            } => {
                match reconnect_in {
                    Some(delay) => warn!("Disconnected ({}), reconnecting in {:?}", reason, delay),
                    None => error!("Disconnected ({}), giving up", reason),
                }
                self.world.end_session();
                Ok(false)
            }
            SessionEvent::Message(message) => {
                let action = message.action();
                let outcome = self.world.apply_message(message)?;

                if outcome.local_player_moved {
                    self.camera.follow(self.world.local_player());
                } else if outcome.resynced {
                    self.camera.reset();
                }

                let rendered = if outcome.changed {
                    self.redraw(surface);
                    true
                } else {
                    debug!("{} changed nothing", action);
                    false
                };

                // Frames the render just used were decoded on the spot; the
                // loader only picks up what is still unseen.
                for avatar in &outcome.new_avatars {
                    self.renderer.sprites().prefetch(avatar);
                }
                Ok(rendered)
            }
        }
    }

    /// Sends the intent for a key edge if the connection is open.
    pub fn handle_key_edge(
        &mut self,
        edge: KeyEdge,
        outbound: &dyn Outbound,
    ) -> Option<ClientMessage> {
        self.intents.dispatch(edge, outbound)
    }

    /// Picks up a new surface size. Returns whether it changed, in which case
    /// the camera is recomputed and the frame redrawn.
    pub fn on_surface_resized(&mut self, surface: &mut dyn Surface) -> bool {
        let (width, height) = surface.size();
        if !self.camera.resize(width, height, self.world.local_player()) {
            return false;
        }

        debug!("Surface resized to {}x{}", width, height);
        self.redraw(surface);
        true
    }

    /// Stores sprites decoded in the background since the last call and
    /// redraws when any landed. Returns whether the surface was redrawn.
    pub fn poll_sprites(&mut self, surface: &mut dyn Surface) -> bool {
        let landed = self.renderer.sprites().poll_loaded();
        if landed == 0 {
            return false;
        }

        debug!("{} sprites decoded in the background", landed);
        self.redraw(surface);
        true
    }

    pub fn redraw(&mut self, surface: &mut dyn Surface) -> RenderStats {
        let viewport = self.camera.viewport();
        self.last_stats = self
            .renderer
            .render(surface, &self.map, self.world.snapshot(), &viewport);
        self.last_stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::TransportError;
    use crate::sprites::test_support::png_blob;
    use crate::sprites::SpriteImage;
    use assert_approx_eq::assert_approx_eq;
    use macroquad::math::Rect;
    use shared::{AvatarDefinition, Direction, Player, ServerMessage};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::runtime::Handle;

    #[derive(Default)]
    struct CountingSurface {
        width: f32,
        height: f32,
        frames: usize,
        images: usize,
        labels: Vec<String>,
    }

    impl CountingSurface {
        fn new(width: f32, height: f32) -> Self {
            Self {
                width,
                height,
                ..Self::default()
            }
        }
    }

    impl Surface for CountingSurface {
        fn size(&self) -> (f32, f32) {
            (self.width, self.height)
        }

        fn clear(&mut self) {
            self.frames += 1;
            self.images = 0;
            self.labels.clear();
        }

        fn draw_image(&mut self, _image: &SpriteImage, _source: Rect, _dest: Rect) {
            self.images += 1;
        }

        fn draw_label(&mut self, text: &str, _center_x: f32, _baseline_y: f32) {
            self.labels.push(text.to_string());
        }
    }

    struct FakeOutbound {
        open: bool,
        sent: RefCell<Vec<ClientMessage>>,
    }

    impl Outbound for FakeOutbound {
        fn is_open(&self) -> bool {
            self.open
        }

        fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
            self.sent.borrow_mut().push(message);
            Ok(())
        }
    }

    fn client() -> GameClient {
        GameClient::new(
            WorldMap::new(2048.0, 2048.0),
            SpriteCache::new(),
            (800.0, 600.0),
            ReleaseBehavior::default(),
        )
    }

    fn join(id: &str, players: Vec<Player>) -> SessionEvent {
        let avatar = AvatarDefinition::new("hero")
            .with_frames(Direction::Down, vec![png_blob(8, 8, [200, 10, 10, 255])]);
        SessionEvent::Message(ServerMessage::JoinGame {
            success: true,
            player_id: Some(id.to_string()),
            players: players.into_iter().map(|p| (p.id.clone(), p)).collect(),
            avatars: [("hero".to_string(), avatar)].into_iter().collect(),
            error: None,
        })
    }

    fn moved(players: Vec<Player>) -> SessionEvent {
        SessionEvent::Message(ServerMessage::PlayersMoved {
            players: players.into_iter().map(|p| (p.id.clone(), p)).collect(),
        })
    }

    fn hero(id: &str, x: f32, y: f32) -> Player {
        Player::new(id, x, y).with_avatar("hero")
    }

    #[test]
    fn test_join_renders_centered_on_local_player() {
        let mut client = client();
        let mut surface = CountingSurface::new(800.0, 600.0);

        let rendered = client
            .handle_session_event(join("me", vec![hero("me", 1024.0, 1024.0)]), &mut surface)
            .unwrap();

        assert!(rendered);
        assert_eq!(surface.frames, 1);
        assert_eq!(surface.images, 1);
        assert_eq!(surface.labels, vec!["me".to_string()]);
        assert_approx_eq!(client.viewport().x, 624.0);
        assert_approx_eq!(client.viewport().y, 724.0);
        assert_eq!(client.last_stats().drawn, 1);
    }

    #[test]
    fn test_camera_only_follows_local_player() {
        let mut client = client();
        let mut surface = CountingSurface::new(800.0, 600.0);
        client
            .handle_session_event(
                join("me", vec![hero("me", 1024.0, 1024.0), hero("p2", 900.0, 900.0)]),
                &mut surface,
            )
            .unwrap();

        let rendered = client
            .handle_session_event(moved(vec![hero("p2", 950.0, 900.0)]), &mut surface)
            .unwrap();
        assert!(rendered);
        assert_approx_eq!(client.viewport().x, 624.0);

        client
            .handle_session_event(moved(vec![hero("me", 10.0, 10.0)]), &mut surface)
            .unwrap();
        assert_approx_eq!(client.viewport().x, 0.0);
        assert_approx_eq!(client.viewport().y, 0.0);
        assert_eq!(surface.frames, 3);
    }

    #[test]
    fn test_rejected_join_is_surfaced_without_rendering() {
        let mut client = client();
        let mut surface = CountingSurface::new(800.0, 600.0);

        let result = client.handle_session_event(
            SessionEvent::Message(ServerMessage::JoinGame {
                success: false,
                player_id: None,
                players: HashMap::new(),
                avatars: HashMap::new(),
                error: Some("name taken".to_string()),
            }),
            &mut surface,
        );

        assert_eq!(
            result,
            Err(ReconciliationError::JoinRejected("name taken".to_string()))
        );
        assert_eq!(surface.frames, 0);
        assert_eq!(client.world().player_count(), 0);
    }

    #[test]
    fn test_unknown_message_does_not_render() {
        let mut client = client();
        let mut surface = CountingSurface::new(800.0, 600.0);

        let rendered = client
            .handle_session_event(SessionEvent::Message(ServerMessage::Unknown), &mut surface)
            .unwrap();
        assert!(!rendered);
        assert_eq!(surface.frames, 0);
    }

    #[test]
    fn test_reconnect_accepts_a_new_player_id() {
        let mut client = client();
        let mut surface = CountingSurface::new(800.0, 600.0);
        client
            .handle_session_event(join("me", vec![hero("me", 100.0, 100.0)]), &mut surface)
            .unwrap();

        client
            .handle_session_event(
                SessionEvent::Closed {
                    reason: "stream ended".to_string(),
                    attempts: 1,
                    reconnect_in: Some(Duration::from_secs(3)),
                },
                &mut surface,
            )
            .unwrap();
        assert_eq!(client.world().local_player_id(), None);
        // Players stay on screen until the next snapshot.
        assert_eq!(client.world().player_count(), 1);

        client
            .handle_session_event(join("me-2", vec![hero("me-2", 100.0, 100.0)]), &mut surface)
            .unwrap();
        assert_eq!(client.world().local_player_id(), Some("me-2"));
        assert_eq!(client.world().player_count(), 1);
    }

    #[tokio::test]
    async fn test_join_draws_new_avatar_with_background_loader() {
        let walk = vec![
            png_blob(8, 8, [200, 10, 10, 255]),
            png_blob(8, 8, [10, 200, 10, 255]),
        ];
        let avatar = AvatarDefinition::new("hero").with_frames(Direction::Down, walk.clone());
        let mut client = GameClient::new(
            WorldMap::new(2048.0, 2048.0),
            SpriteCache::with_loader(Handle::current()),
            (800.0, 600.0),
            ReleaseBehavior::default(),
        );
        let mut surface = CountingSurface::new(800.0, 600.0);

        let rendered = client
            .handle_session_event(
                SessionEvent::Message(ServerMessage::JoinGame {
                    success: true,
                    player_id: Some("me".to_string()),
                    players: [("me".to_string(), hero("me", 1024.0, 1024.0))]
                        .into_iter()
                        .collect(),
                    avatars: [("hero".to_string(), avatar)].into_iter().collect(),
                    error: None,
                }),
                &mut surface,
            )
            .unwrap();

        assert!(rendered);
        assert_eq!(client.last_stats().drawn, 1);
        assert_eq!(client.last_stats().skipped, 0);
        assert_eq!(surface.images, 1);

        // The unused second frame goes to the loader; its arrival redraws.
        let mut redrawn = false;
        for _ in 0..200 {
            if client.poll_sprites(&mut surface) {
                redrawn = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(redrawn);
        assert_eq!(surface.frames, 2);
        assert_eq!(surface.images, 1);
        assert!(!client.poll_sprites(&mut surface));
    }

    #[test]
    fn test_join_without_local_player_resets_camera() {
        let mut client = client();
        let mut surface = CountingSurface::new(800.0, 600.0);
        client
            .handle_session_event(join("me", vec![hero("me", 1024.0, 1024.0)]), &mut surface)
            .unwrap();
        assert_approx_eq!(client.viewport().x, 624.0);

        client
            .handle_session_event(
                SessionEvent::Closed {
                    reason: "stream ended".to_string(),
                    attempts: 1,
                    reconnect_in: Some(Duration::from_secs(3)),
                },
                &mut surface,
            )
            .unwrap();
        client
            .handle_session_event(join("me-2", vec![hero("other", 1500.0, 1500.0)]), &mut surface)
            .unwrap();

        assert_eq!(client.world().local_player_id(), Some("me-2"));
        assert_approx_eq!(client.viewport().x, 0.0);
        assert_approx_eq!(client.viewport().y, 0.0);
    }

    #[test]
    fn test_resize_refollows_and_redraws() {
        let mut client = client();
        let mut surface = CountingSurface::new(800.0, 600.0);
        client
            .handle_session_event(join("me", vec![hero("me", 1024.0, 1024.0)]), &mut surface)
            .unwrap();

        assert!(!client.on_surface_resized(&mut surface));

        surface.width = 400.0;
        surface.height = 400.0;
        assert!(client.on_surface_resized(&mut surface));
        assert_eq!(surface.frames, 2);
        assert_approx_eq!(client.viewport().x, 824.0);
        assert_approx_eq!(client.viewport().y, 824.0);
    }

    #[test]
    fn test_key_edges_follow_connection() {
        let mut client = client();
        let closed = FakeOutbound {
            open: false,
            sent: RefCell::new(Vec::new()),
        };
        assert_eq!(
            client.handle_key_edge(KeyEdge::Pressed(Direction::Left), &closed),
            None
        );

        let open = FakeOutbound {
            open: true,
            sent: RefCell::new(Vec::new()),
        };
        assert_eq!(
            client.handle_key_edge(KeyEdge::Released(Direction::Left), &open),
            Some(ClientMessage::Stop)
        );
        assert_eq!(*open.sent.borrow(), vec![ClientMessage::Stop]);
    }
}

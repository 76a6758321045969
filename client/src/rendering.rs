//! Draws the world through a [`Surface`]: background sampled by the
//! viewport, then every visible player's current animation frame and name.
//!
//! Rendering never fails as a whole. A player whose avatar, direction or
//! frame image cannot be resolved is skipped and counted in [`RenderStats`].

use crate::game::WorldSnapshot;
use crate::sprites::{SpriteCache, SpriteImage};
use crate::viewport::Viewport;
use log::debug;
use macroquad::math::Rect;
use shared::{AvatarDefinition, Player};
use std::collections::HashMap;
use std::sync::Arc;

/// Longest side of a drawn sprite, in pixels.
pub const SPRITE_MAX_SIZE: f32 = 32.0;
/// How far off-surface a player may stand and still be drawn.
pub const CULL_MARGIN: f32 = 50.0;
/// Gap between the top of a sprite and its name's baseline.
pub const LABEL_GAP: f32 = 4.0;

/// Something that can show pixels: a window, or a recorder in tests.
pub trait Surface {
    fn size(&self) -> (f32, f32);
    fn clear(&mut self);
    /// Draws the `source` region of `image` (in image pixels) stretched over
    /// `dest` (in surface pixels).
    fn draw_image(&mut self, image: &SpriteImage, source: Rect, dest: Rect);
    /// Outlined text centered on `center_x`, baseline at `baseline_y`.
    fn draw_label(&mut self, text: &str, center_x: f32, baseline_y: f32);
}

/// Fixed world bounds and the picture painted under everything.
#[derive(Debug, Clone)]
pub struct WorldMap {
    pub width: f32,
    pub height: f32,
    pub background: Option<SpriteImage>,
}

impl WorldMap {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            background: None,
        }
    }

    pub fn with_background(mut self, background: SpriteImage) -> Self {
        self.background = Some(background);
        self
    }

    pub fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RenderStats {
    pub drawn: usize,
    pub culled: usize,
    pub skipped: usize,
}

pub struct Renderer {
    sprites: SpriteCache,
}

impl Renderer {
    pub fn new(sprites: SpriteCache) -> Self {
        Self { sprites }
    }

    pub fn sprites(&mut self) -> &mut SpriteCache {
        &mut self.sprites
    }

    /// Redraws the whole surface. Avatar and frame data are looked up from
    /// `snapshot` on every call, never remembered between calls.
    pub fn render(
        &mut self,
        surface: &mut dyn Surface,
        world: &WorldMap,
        snapshot: WorldSnapshot<'_>,
        viewport: &Viewport,
    ) -> RenderStats {
        let mut stats = RenderStats::default();

        surface.clear();
        draw_background(surface, world, viewport);

        let (surface_width, surface_height) = surface.size();
        let mut visible = Vec::with_capacity(snapshot.players.len());
        for player in snapshot.players.values() {
            let (screen_x, screen_y) = viewport.to_screen(player.x, player.y);
            if is_culled(screen_x, screen_y, surface_width, surface_height) {
                stats.culled += 1;
                continue;
            }
            visible.push((player, screen_x, screen_y));
        }

        // Lower on screen draws later, so it overlaps what stands behind it.
        visible.sort_by(|(a, ..), (b, ..)| a.y.total_cmp(&b.y).then_with(|| a.id.cmp(&b.id)));

        for (player, screen_x, screen_y) in visible {
            match self.resolve_frame(player, snapshot.avatars) {
                Some(image) => {
                    if draw_player(surface, &image, player, screen_x, screen_y) {
                        stats.drawn += 1;
                    } else {
                        stats.skipped += 1;
                    }
                }
                None => stats.skipped += 1,
            }
        }

        debug!(
            "Rendered {} players ({} culled, {} skipped)",
            stats.drawn, stats.culled, stats.skipped
        );
        stats
    }

    fn resolve_frame(
        &mut self,
        player: &Player,
        avatars: &HashMap<String, Arc<AvatarDefinition>>,
    ) -> Option<SpriteImage> {
        let avatar = avatars.get(&player.avatar_ref)?;
        let blob = avatar.frame(player.facing, player.animation_frame)?;
        self.sprites.resolve(blob)
    }
}

fn is_culled(screen_x: f32, screen_y: f32, surface_width: f32, surface_height: f32) -> bool {
    screen_x < -CULL_MARGIN
        || screen_y < -CULL_MARGIN
        || screen_x > surface_width + CULL_MARGIN
        || screen_y > surface_height + CULL_MARGIN
}

fn draw_background(surface: &mut dyn Surface, world: &WorldMap, viewport: &Viewport) {
    let Some(background) = &world.background else {
        return;
    };
    if world.width <= 0.0 || world.height <= 0.0 {
        return;
    }

    let scale_x = background.width() as f32 / world.width;
    let scale_y = background.height() as f32 / world.height;
    let source = Rect::new(
        viewport.x * scale_x,
        viewport.y * scale_y,
        viewport.width * scale_x,
        viewport.height * scale_y,
    );
    let (surface_width, surface_height) = surface.size();
    surface.draw_image(
        background,
        source,
        Rect::new(0.0, 0.0, surface_width, surface_height),
    );
}

/// Where a frame lands: scaled so its longest side is [`SPRITE_MAX_SIZE`],
/// bottom-center on the player's screen position.
pub fn sprite_rect(image: &SpriteImage, screen_x: f32, screen_y: f32) -> Option<Rect> {
    let (width, height) = (image.width() as f32, image.height() as f32);
    if width <= 0.0 || height <= 0.0 {
        return None;
    }

    let scale = SPRITE_MAX_SIZE / width.max(height);
    let (width, height) = (width * scale, height * scale);
    Some(Rect::new(screen_x - width / 2.0, screen_y - height, width, height))
}

fn draw_player(
    surface: &mut dyn Surface,
    image: &SpriteImage,
    player: &Player,
    screen_x: f32,
    screen_y: f32,
) -> bool {
    let Some(dest) = sprite_rect(image, screen_x, screen_y) else {
        return false;
    };

    let source = Rect::new(0.0, 0.0, image.width() as f32, image.height() as f32);
    surface.draw_image(image, source, dest);

    if !player.display_name.is_empty() {
        surface.draw_label(&player.display_name, screen_x, dest.y - LABEL_GAP);
    }
    true
}

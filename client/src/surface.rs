//! macroquad window as a render [`Surface`], plus the status overlay

use crate::network::ConnectionState;
use crate::rendering::Surface;
use crate::sprites::SpriteImage;
use macroquad::prelude::*;
use shared::BlobKey;
use std::collections::HashMap;

const BACKDROP: Color = Color::new(0.1, 0.1, 0.1, 1.0);
const LABEL_SIZE: u16 = 16;
const OUTLINE: [(f32, f32); 8] = [
    (-1.0, -1.0),
    (0.0, -1.0),
    (1.0, -1.0),
    (-1.0, 0.0),
    (1.0, 0.0),
    (-1.0, 1.0),
    (0.0, 1.0),
    (1.0, 1.0),
];

/// Draws into the macroquad window. GPU textures are created the first
/// time an image is drawn and reused by blob key afterwards.
#[derive(Default)]
pub struct MacroquadSurface {
    textures: HashMap<BlobKey, Texture2D>,
}

impl MacroquadSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    fn texture(&mut self, image: &SpriteImage) -> Option<Texture2D> {
        if let Some(texture) = self.textures.get(&image.key()) {
            return Some(texture.clone());
        }

        let width = u16::try_from(image.width()).ok()?;
        let height = u16::try_from(image.height()).ok()?;
        let texture = Texture2D::from_rgba8(width, height, image.pixels().as_raw());
        texture.set_filter(FilterMode::Nearest);
        self.textures.insert(image.key(), texture.clone());
        Some(texture)
    }

    /// Connection light and player count in the top-left corner.
    pub fn draw_status(&self, state: ConnectionState, player_count: usize) {
        let y_start = 10.0;

        let (color, label) = match state {
            ConnectionState::Open => (GREEN, "CON".to_string()),
            ConnectionState::Connecting { attempt: 0 } => (YELLOW, "...".to_string()),
            ConnectionState::Connecting { attempt } => (YELLOW, format!("RETRY {}", attempt)),
            ConnectionState::Closed { .. } => (RED, "OFF".to_string()),
        };
        draw_rectangle(10.0, y_start, 8.0, 8.0, color);
        draw_rectangle_lines(10.0, y_start, 8.0, 8.0, 1.0, WHITE);
        draw_text(&label, 22.0, y_start + 8.0, 12.0, WHITE);

        let player_y = y_start + 15.0;
        for i in 0..player_count.min(8) {
            draw_rectangle(
                10.0 + (i as f32) * 4.0,
                player_y,
                3.0,
                3.0,
                Color::from_rgba(0, 170, 255, 255),
            );
        }
        let player_text = format!("{} players", player_count);
        draw_text(&player_text, 45.0, player_y + 3.0, 12.0, WHITE);
    }
}

impl Surface for MacroquadSurface {
    fn size(&self) -> (f32, f32) {
        (screen_width(), screen_height())
    }

    fn clear(&mut self) {
        clear_background(BACKDROP);
    }

    fn draw_image(&mut self, image: &SpriteImage, source: Rect, dest: Rect) {
        let Some(texture) = self.texture(image) else {
            return;
        };

        draw_texture_ex(
            &texture,
            dest.x,
            dest.y,
            WHITE,
            DrawTextureParams {
                dest_size: Some(vec2(dest.w, dest.h)),
                source: Some(source),
                ..Default::default()
            },
        );
    }

    fn draw_label(&mut self, text: &str, center_x: f32, baseline_y: f32) {
        let dimensions = measure_text(text, None, LABEL_SIZE, 1.0);
        let x = center_x - dimensions.width / 2.0;
        let size = LABEL_SIZE as f32;

        for (dx, dy) in OUTLINE {
            draw_text(text, x + dx, baseline_y + dy, size, BLACK);
        }
        draw_text(text, x, baseline_y, size, WHITE);
    }
}

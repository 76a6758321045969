//! Camera rectangle that follows the local player

use shared::Player;

/// Camera rectangle in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }

    pub fn to_screen(&self, world_x: f32, world_y: f32) -> (f32, f32) {
        (world_x - self.x, world_y - self.y)
    }
}

/// Centers a `surface`-sized camera on `player`, clamped so it never leaves
/// the world. When the surface is larger than the world the camera pins to
/// the origin and shows past the far edge.
pub fn compute_viewport(player: &Player, surface: (f32, f32), world: (f32, f32)) -> Viewport {
    let (surface_width, surface_height) = surface;
    let (world_width, world_height) = world;

    Viewport {
        x: clamp_axis(player.x - surface_width / 2.0, world_width - surface_width),
        y: clamp_axis(player.y - surface_height / 2.0, world_height - surface_height),
        width: surface_width,
        height: surface_height,
    }
}

// f32::clamp panics when max < min, which happens for oversized surfaces.
fn clamp_axis(value: f32, max: f32) -> f32 {
    value.min(max).max(0.0)
}

pub struct ViewportController {
    viewport: Viewport,
    world: (f32, f32),
}

impl ViewportController {
    pub fn new(surface: (f32, f32), world: (f32, f32)) -> Self {
        Self {
            viewport: Viewport::new(surface.0, surface.1),
            world,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn surface_size(&self) -> (f32, f32) {
        (self.viewport.width, self.viewport.height)
    }

    /// Recenters on the local player. Without one the camera keeps its
    /// current position.
    pub fn follow(&mut self, player: Option<&Player>) {
        if let Some(player) = player {
            self.viewport = compute_viewport(player, self.surface_size(), self.world);
        }
    }

    /// Back to the world origin, for when no local player is known.
    pub fn reset(&mut self) {
        self.viewport.x = 0.0;
        self.viewport.y = 0.0;
    }

    /// Returns true when the size actually changed.
    pub fn resize(&mut self, width: f32, height: f32, player: Option<&Player>) -> bool {
        if (width, height) == self.surface_size() {
            return false;
        }

        self.viewport.width = width;
        self.viewport.height = height;
        match player {
            Some(player) => self.follow(Some(player)),
            None => {
                self.viewport.x = clamp_axis(self.viewport.x, self.world.0 - width);
                self.viewport.y = clamp_axis(self.viewport.y, self.world.1 - height);
            }
        }
        true
    }
}

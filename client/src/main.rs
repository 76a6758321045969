use clap::Parser;
use client::app::GameClient;
use client::config::Args;
use client::input::KeyboardInput;
use client::network::TransportSession;
use client::rendering::{Surface, WorldMap};
use client::sprites::{SpriteCache, SpriteImage};
use client::surface::MacroquadSurface;
use log::{error, info, warn};
use macroquad::prelude::{is_key_pressed, next_frame, Conf, KeyCode};

fn window_conf() -> Conf {
    let config = Args::parse().into_config();
    Conf {
        window_title: format!("Overworld - {}", config.username),
        window_width: config.window_size.0 as i32,
        window_height: config.window_size.1 as i32,
        window_resizable: true,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Args::parse().into_config();

    info!("Starting client...");
    info!("Connecting to: {} as {}", config.server, config.username);
    info!("Controls: WASD or arrow keys to move, Escape to quit");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("transport")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return;
        }
    };

    let mut map = WorldMap::new(config.world_size.0, config.world_size.1);
    match SpriteImage::open(&config.background) {
        Ok(background) => map = map.with_background(background),
        Err(e) => warn!(
            "Background {} unavailable, drawing without it: {}",
            config.background.display(),
            e
        ),
    }

    let mut surface = MacroquadSurface::new();
    let mut session = TransportSession::spawn(runtime.handle(), config.transport());
    let mut game = GameClient::new(
        map,
        SpriteCache::with_loader(runtime.handle().clone()),
        surface.size(),
        config.release,
    );
    let mut keyboard = KeyboardInput::new();

    loop {
        if is_key_pressed(KeyCode::Escape) {
            info!("Quitting");
            break;
        }

        let mut rendered = game.on_surface_resized(&mut surface);
        rendered |= game.poll_sprites(&mut surface);

        for event in session.poll_events() {
            match game.handle_session_event(event, &mut surface) {
                Ok(drawn) => rendered |= drawn,
                Err(e) => error!("{}", e),
            }
        }

        for edge in keyboard.poll() {
            game.handle_key_edge(edge, &session);
        }

        // The window is cleared every frame, so draw even without changes.
        if !rendered {
            game.redraw(&mut surface);
        }
        surface.draw_status(session.state(), game.world().player_count());

        next_frame().await;
    }

    drop(session);
    runtime.shutdown_timeout(std::time::Duration::from_secs(1));
}

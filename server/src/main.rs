//! Hunt Game Server
//!
//! Runs the live hunting loop and answers AFK settlement requests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info};

use hunt_server::afk::AfkService;
use hunt_server::clock::SystemClock;
use hunt_server::config::ServerConfig;
use hunt_server::ledger::{LevelingService, LocalLeveling, RewardLedger};
use hunt_server::network::Server;
use hunt_server::persistence;
use hunt_server::world::{load_world, GameWorld};

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::load();

    info!("Starting Hunt Server...");
    info!("Tick rate: {} Hz", config.tick_rate);
    info!("Listening on port {}", config.port);

    let (zones, templates) = load_world(&config.world_file);
    let zones = Arc::new(zones);
    let templates = Arc::new(templates);

    let backends = persistence::connect(&config.database_url, &config.redis_url).await;

    // Postgres levels characters inside a row lock; otherwise read-modify-write
    let leveling: Arc<dyn LevelingService> = match &backends.database {
        Some(db) => Arc::new(db.clone()),
        None => Arc::new(LocalLeveling::new(backends.store.clone())),
    };
    let ledger = Arc::new(RewardLedger::new(backends.store.clone(), leveling));
    let handle = persistence::spawn_writer(backends.store.clone(), ledger.clone());

    let afk = Arc::new(AfkService::new(
        backends.store.clone(),
        ledger,
        zones.clone(),
        templates.clone(),
        Arc::new(SystemClock),
        config.afk.clone(),
    ));

    let mut world = GameWorld::new(zones, templates, config.seed);

    let mut server = match Server::new(
        config.port,
        backends.database,
        backends.store,
        afk,
        handle.clone(),
    )
    .await
    {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to start server: {}", e);
            return;
        }
    };

    let tick_duration = Duration::from_secs_f64(1.0 / config.tick_rate.max(1) as f64);
    let started = Instant::now();
    let mut last_tick = Instant::now();

    // Timer for periodic saves
    let mut last_save = Instant::now();
    let save_interval = Duration::from_secs(config.save_interval_secs);

    info!("Server started successfully!");

    loop {
        let tick_start = Instant::now();
        let now_ms = started.elapsed().as_millis() as u64;

        server.process_incoming(&mut world, now_ms).await;

        let delta = last_tick.elapsed().as_secs_f32();
        last_tick = Instant::now();
        let output = world.tick(now_ms, delta);

        for reward in &output.rewards {
            handle.apply_reward(reward.character_id, reward.batch.clone());
        }
        server.queue_tick_output(&output, &world);

        server.broadcast_world_state(&world).await;
        server.process_outgoing().await;

        if last_save.elapsed() >= save_interval {
            server.save_all_players(&world);
            info!("Periodic save complete");
            last_save = Instant::now();
        }

        let elapsed = tick_start.elapsed();
        if elapsed < tick_duration {
            tokio::time::sleep(tick_duration - elapsed).await;
        }
    }
}

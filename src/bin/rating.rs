// Standalone rating pass, spawned detached by the API process or run by
// hand. Exits 1 when another instance already holds the lock.

use std::time::Instant;

use rechub::config::AppConfig;
use rechub::rating::{self, RatingLock};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env();
    rechub::init_tracing(&config);

    let mut lock = RatingLock::new(&config);
    match lock.acquire() {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!("Only one rating calculator may run at a time, exiting");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("Could not acquire the rating lock: {}", e);
            std::process::exit(1);
        }
    }

    let started = Instant::now();
    loop {
        // This run discharges any pending schedule request; a request that
        // arrives while the pass runs triggers exactly one more pass.
        lock.discharge_schedule();

        if let Err(e) = rating::run_pass(&config).await {
            tracing::error!("Rating pass failed: {}", e);
            break;
        }

        if !lock.scheduled() {
            break;
        }
        tracing::info!("Schedule sentinel present, running another pass");
    }
    lock.release();

    tracing::info!("Rating calculated, duration: {:.2}s", started.elapsed().as_secs_f64());
}

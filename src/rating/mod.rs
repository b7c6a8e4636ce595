pub mod engine;
pub mod lock;

pub use engine::EloEngine;
pub use lock::RatingLock;

use crate::config::AppConfig;
use crate::db::cache::Cacher;
use crate::db::stats::{
    DEFAULT_HOMEPAGE_GLIMIT, DEFAULT_HOMEPAGE_PDAYS, DEFAULT_HOMEPAGE_PLIMIT, gen_homepage_data,
    homepage_cache_key,
};
use crate::errors::AppError;

/// One complete rating pass plus its cache side effects.
///
/// Opens its own pool (the pass runs in a separate OS process), replaces the
/// ratings table, purges the response cache and re-primes the default
/// homepage aggregate.
pub async fn run_pass(config: &AppConfig) -> Result<(), AppError> {
    let pool = crate::db::connect(config).await?;

    let mut engine = EloEngine::new(pool.clone(), config.rating.k_factor);
    engine
        .update_ratings(config.rating.duration_threshold, config.rating.batch_size)
        .await?;

    let cacher = Cacher::new(pool.clone());
    cacher.purge().await?;
    let body = gen_homepage_data(
        &pool,
        DEFAULT_HOMEPAGE_GLIMIT,
        DEFAULT_HOMEPAGE_PLIMIT,
        DEFAULT_HOMEPAGE_PDAYS,
    )
    .await?;
    cacher
        .set(
            &homepage_cache_key(
                DEFAULT_HOMEPAGE_GLIMIT,
                DEFAULT_HOMEPAGE_PLIMIT,
                DEFAULT_HOMEPAGE_PDAYS,
            ),
            &body,
        )
        .await?;

    pool.close().await;
    Ok(())
}

// Read-only API routes.

use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};

use crate::{
    http::handlers::{
        game::{
            get_game_detail, get_latest_games, get_option_stats, get_random_games,
            post_search_games,
        },
        player::{
            get_active_players, get_latest_players, get_player_friends, get_player_profile,
            get_player_recent_games, get_random_players, search_player_name,
        },
        rating::{
            get_player_page, get_rating_stats, get_rating_status, get_rating_table,
            search_rating_name,
        },
        stats::{get_homepage, get_total_stats},
    },
    middleware::{ApiRateLimit, rate_limit_middleware},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/game/detail", get(get_game_detail))
        .route("/game/random", get(get_random_games))
        .route("/game/latest", get(get_latest_games))
        .route("/game/optionstats", get(get_option_stats))
        .route("/game/search", post(post_search_games))
        .route("/player/random", get(get_random_players))
        .route("/player/latest", get(get_latest_players))
        .route("/player/active", get(get_active_players))
        .route("/player/friends", get(get_player_friends))
        .route("/player/profile", get(get_player_profile))
        .route("/player/recent_games", get(get_player_recent_games))
        .route("/player/searchname", get(search_player_name))
        .route("/rating/table", get(get_rating_table))
        .route("/rating/stats", get(get_rating_stats))
        .route("/rating/status", get(get_rating_status))
        .route("/rating/playerpage", get(get_player_page))
        .route("/rating/searchname", get(search_rating_name))
        .route("/stats/total", get(get_total_stats))
        .route("/shortcut/homepage", get(get_homepage))
        .layer(from_fn(rate_limit_middleware::<ApiRateLimit>))
}

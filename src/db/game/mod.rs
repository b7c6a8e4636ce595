pub mod delete;
pub mod read;
pub mod search;
pub mod write;

pub use write::{AddGameStatus, add_game, save_game};

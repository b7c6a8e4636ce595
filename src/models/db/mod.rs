pub mod chat;
pub mod file;
pub mod game;
pub mod player;
pub mod rating;

pub use chat::Chat;
pub use file::RecordFile;
pub use game::Game;
pub use player::Player;
pub use rating::Rating;

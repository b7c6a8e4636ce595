pub mod read;
pub mod replace;

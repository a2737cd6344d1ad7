pub mod actions;
pub mod counters;
pub mod db;
pub mod directory;
pub mod memories;
pub mod messages;
pub mod models;
pub mod schema;
pub mod sessions;
pub mod settings;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub mod access;
pub mod achievements;
pub mod db;
pub mod error;
pub mod format;
pub mod model;
pub mod repo;
pub mod session;
pub mod standings;
pub mod store;

pub use error::{Error, Result};

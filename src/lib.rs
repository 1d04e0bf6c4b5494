pub mod api;
pub mod cli;
pub mod compensation;
pub mod entity;
pub mod error;
pub mod seed;
pub mod store;

pub use error::{ArboreaError, Result};
pub use store::Store;

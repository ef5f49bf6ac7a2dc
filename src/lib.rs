pub mod clock;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod services;
pub mod srs;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, Result};

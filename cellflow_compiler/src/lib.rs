//! Conversion between action graphs and generated Python programs, plus
//! inspection of object-type sources.

pub mod config;
pub mod emit;
pub mod error;
pub mod inspect;
pub mod naming;
pub mod recover;
pub mod resources;

pub use config::*;
pub use emit::*;
pub use error::*;
pub use inspect::*;
pub use naming::*;
pub use recover::*;
pub use resources::*;

#[cfg(test)]
mod fixtures;

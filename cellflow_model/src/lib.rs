//! Action graph, scene and object-type catalog shared by the compiler and the
//! command-line front end.

pub mod cache;
pub mod error;
pub mod object_type;
pub mod project;
pub mod scene;

pub use cache::*;
pub use error::*;
pub use object_type::*;
pub use project::*;
pub use scene::*;

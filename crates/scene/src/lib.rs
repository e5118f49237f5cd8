//! Stores of the map viewer's query engine and the [`Engine`] that wires
//! them together.

pub mod colouring;
pub mod connectivity;
pub mod engine;
pub mod hierarchy;
pub mod picking;
pub mod search;
pub mod selection;
pub mod tree;
pub mod url_state;
pub mod viewport;

#[cfg(test)]
mod testing;

pub use colouring::*;
pub use connectivity::*;
pub use engine::*;
pub use hierarchy::*;
pub use picking::*;
pub use search::*;
pub use selection::*;
pub use tree::*;
pub use url_state::*;
pub use viewport::*;

pub mod bounds;
pub mod hierarchy;
pub mod math;
pub mod viewport;

// Foundation crate: small, well-tested primitives only.
pub use bounds::*;
pub use hierarchy::*;
pub use viewport::*;

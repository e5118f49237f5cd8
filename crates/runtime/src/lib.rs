pub mod event_bus;
pub mod timing;

pub use event_bus::*;
pub use timing::*;

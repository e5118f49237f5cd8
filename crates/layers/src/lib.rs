pub mod symbology;
pub mod vector;

pub use symbology::*;
pub use vector::*;

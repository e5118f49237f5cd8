pub mod error;
pub mod gate;
pub mod protocol;
pub mod request;
pub mod service;

pub use error::*;
pub use gate::*;
pub use protocol::*;
pub use request::*;
pub use service::*;

pub use reqwest::Url;

pub mod error;
pub mod protocol;
pub mod service;
pub mod types;

pub use error::RequestError;
pub use service::RequestService;

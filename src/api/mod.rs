pub mod gateway;
pub mod request;
pub mod response;

pub use gateway::{Evaluated, Gateway};
pub use request::CheckRequest;
pub use response::{CheckResponse, ErrorResponse, HealthResponse, ReadyResponse};

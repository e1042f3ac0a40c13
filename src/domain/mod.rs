//! Domain layer types: request identity and response provenance.

pub mod request;
pub mod response;

pub use request::RequestIdentity;
pub use response::{ORIGIN_HEADER, ResponseOrigin, is_network_error, network_error_response};

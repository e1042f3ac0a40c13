//! Application services: the network primitive seam and the interceptor.

pub mod error;
pub mod fetch;
pub mod interceptor;

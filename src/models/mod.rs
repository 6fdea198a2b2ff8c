// Data models for outbound calls and their results

pub mod envelope;
pub mod response;

pub use envelope::{Method, RequestEnvelope};
pub use response::{empty_result, synthetic_payload, TransportResponse};

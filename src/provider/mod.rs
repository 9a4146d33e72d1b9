pub mod api_types;
mod http;

pub use http::{HttpTransport, Transport, TransportResponse};

//! Control-plane gateways.

pub mod http;

pub use http::HttpProvider;

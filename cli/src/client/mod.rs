//! HTTP clients for the authorization server and protected APIs.

pub mod api;
pub mod http;
pub mod middleware;

pub use api::ApiClient;

//! HTTP API: routing, tenant context and request/response mapping over the document
//! services.

pub mod app;
pub mod context;
pub mod middleware;

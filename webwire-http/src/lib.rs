//! HTTP wire layer: command routes, the transport abstraction and the
//! executor that speaks both WebDriver dialects.

pub mod client;
pub mod executor;
pub mod routes;

pub use client::{ClientConfig, HttpClient, HttpMethod, ReqwestClient, WireRequest, WireResponse};
pub use executor::WireExecutor;
pub use routes::{build_path, standard_routes, CommandRoute};

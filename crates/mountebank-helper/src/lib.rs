//! Helpers for driving [Mountebank](http://www.mbtest.org) from Rust tests.
//!
//! Describe routes, post them as an imposter, tweak individual responses
//! while a test runs, and clean up afterwards.
//!
//! # Example
//!
//! ```no_run
//! use mountebank_helper::{Imposter, ImposterOptions, Route, RouteKey, RouteResponse};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mountebank_helper::MbError> {
//!     let mut imposter = Imposter::new(ImposterOptions::new(3000))?;
//!     imposter.add_route(Route::new(
//!         "/pets/123",
//!         "GET",
//!         RouteResponse::new(200)
//!             .with_header("Content-Type", "application/json")
//!             .with_body(r#"{"name":"Rex"}"#),
//!     ))?;
//!
//!     let response = imposter.post_to_mountebank().await?;
//!     assert!(response.is_created());
//!
//!     imposter
//!         .update_response_code(404, &RouteKey::new("/pets/123", "GET"))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod imposter;
pub mod route;
pub mod server;
pub mod types;

pub use client::{MbResponse, MountebankClient};
pub use config::{ImposterFile, MountebankConfig};
pub use error::{MbError, Result};
pub use imposter::{Imposter, ImposterOptions, ResponseUpdate};
pub use route::{Route, RouteKey, RouteResponse};
pub use server::{start_mb_server, MbServer, MbServerOptions};
pub use types::{
    ImposterDefinition, ImposterDetail, ImpostersResponse, IsResponse, Predicate, Protocol,
    RequestFields, Stub, StubResponse,
};

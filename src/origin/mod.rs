//! Gate-protected origin server.
//!
//! # Data Flow
//! ```text
//! edge request
//!     → TraceLayer → request id → timeout
//!     → gate middleware (400 / 401 / 500 short-circuit)
//!     → business router (untouched request)
//! ```

pub mod server;
pub mod tls;

pub use server::{hello_router, OriginServer};
pub use tls::load_tls_config;

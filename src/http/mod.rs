//! HTTP front end.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout layers)
//!     → dispatch.rs (select instance, forward, record latency)
//!     → forward.rs (rewrite URI, send upstream)
//!     → upstream response back to the client
//! ```

pub mod dispatch;
pub mod forward;
pub mod request;
pub mod server;

pub use dispatch::Dispatcher;
pub use forward::{ForwardError, Forwarder, HyperForwarder};
pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::LoadBalancerServer;

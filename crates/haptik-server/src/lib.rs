//! Protocol server core.
//!
//! A [`Server`] owns one connection session: it enforces the handshake state
//! machine, resolves incoming messages through the [`DispatchTable`], routes
//! device commands to per-device protocol adapters, and classifies every
//! failure into a protocol-visible `Error` response. Each submitted message
//! receives exactly one correlated response.

pub mod dispatch;
pub mod error;
pub mod scanning;
pub mod server;

pub use dispatch::{DispatchTable, Handler};
pub use error::{Result, ServerError};
pub use scanning::{ManagerRegistry, ScanError, SubtypeManager};
pub use server::{Server, ServerConfig};

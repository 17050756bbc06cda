//! Device layer: transports, feature descriptors, and protocol adapters.
//!
//! A [`ProtocolAdapter`] owns all mutable state for one connected device and
//! translates generic protocol commands into raw transport writes, driven by
//! a cancellable periodic update task.

pub mod adapter;
pub mod cueme;
pub mod descriptor;
pub mod error;
pub mod transport;

pub use adapter::{MessagePrecondition, ProtocolAdapter};
pub use cueme::CuemeAdapter;
pub use descriptor::{DescriptorTable, FeatureDescriptor};
pub use error::{DeviceError, Result};
pub use transport::{DeviceTransport, TransportError};

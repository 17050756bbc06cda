use std::collections::HashMap;

use async_trait::async_trait;
use haptik_proto::{Message, MessageKind};

use crate::error::Result;

/// Precondition checked by the dispatch layer before a command reaches the
/// adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessagePrecondition {
    /// For per-feature commands: the device's feature count. Commands with
    /// more entries than this are rejected before dispatch.
    pub feature_count: Option<usize>,
}

impl MessagePrecondition {
    pub fn with_feature_count(count: usize) -> Self {
        Self {
            feature_count: Some(count),
        }
    }
}

/// Per-connected-device protocol adapter.
///
/// An adapter owns all mutable state for one device: its feature-speed
/// vector, the round-robin active index, and the armed/disarmed periodic
/// update task. Command handling and the periodic task are serialized per
/// device; different devices proceed fully independently.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// Display name from the device's feature descriptor.
    fn display_name(&self) -> &str;

    /// Message kinds this adapter accepts, with their dispatch preconditions.
    ///
    /// Built once at construction and looked up by kind at dispatch time.
    fn accepted_messages(&self) -> &HashMap<MessageKind, MessagePrecondition>;

    /// Handle one generic device command; returns the protocol response.
    async fn handle_message(&self, message: &Message) -> Result<Message>;

    /// Owner-initiated teardown. Cancels the adapter's scope, aborting any
    /// in-flight write and stopping the periodic task. Idempotent.
    fn teardown(&self);
}

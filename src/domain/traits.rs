//! # Domain Traits
//!
//! Abstract interfaces for the chat transport and the outbound HTTP layer.
//! Allows for pluggable implementations in the Infrastructure layer and test doubles in tests.

use crate::domain::errors::TransportError;
use crate::domain::types::{HttpResponse, RequestDescriptor};
use async_trait::async_trait;

/// Abstract interface for a Chat Provider (e.g., Matrix, Console)
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send a message to the room
    async fn send_message(&self, content: &str) -> Result<String, String>;

    /// Send a notification (not tracked/editable)
    async fn send_notification(&self, content: &str) -> Result<(), String>;

    /// Send a typing indicator
    async fn typing(&self, active: bool) -> Result<(), String>;

    /// Get the current room ID
    fn room_id(&self) -> String;
}

/// Executes a single attempt of a request. Retries, timeouts and permits are the dispatcher's job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError>;
}

//! # Status Command
//!
//! Handles `!status`: request slot usage and commands in flight.

use crate::application::invocations::InvocationRegistry;
use crate::application::postman::PostmanService;
use crate::domain::traits::ChatProvider;
use anyhow::Result;

pub async fn handle_status(
    service: &PostmanService,
    registry: &InvocationRegistry,
    chat: &impl ChatProvider,
) -> Result<()> {
    let limiter = service.limiter();
    let msg = crate::strings::messages::status_report(
        limiter.capacity(),
        limiter.available(),
        registry.in_flight(),
    );
    chat.send_message(&msg).await.map(|_| ()).map_err(|e| anyhow::anyhow!(e))
}

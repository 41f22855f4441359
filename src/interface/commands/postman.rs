//! # Postman Command
//!
//! Handles `!postman <method> <url> [params...]`.
//! Registers the invocation so it can be cancelled, shows a typing notice while the request runs,
//! and sends the rendered output in chunks that fit one chat message.

use crate::application::invocations::InvocationRegistry;
use crate::application::postman::PostmanService;
use crate::domain::traits::ChatProvider;
use crate::strings::messages;
use anyhow::Result;

pub async fn handle_postman(
    service: &PostmanService,
    registry: &InvocationRegistry,
    chat: &impl ChatProvider,
    args: &str,
    invocation_id: &str,
    max_message_len: usize,
) -> Result<()> {
    if args.trim().is_empty() {
        chat.send_notification(&messages::missing_arguments())
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        return Ok(());
    }

    let (cancel, _guard) = registry.register(invocation_id);

    // Typing notices are cosmetic; a failure here must not stop the request.
    if let Err(e) = chat.typing(true).await {
        tracing::debug!("Failed to start typing notice: {}", e);
    }
    let output = service.execute(args, cancel).await;
    if let Err(e) = chat.typing(false).await {
        tracing::debug!("Failed to stop typing notice: {}", e);
    }

    for chunk in output.chunks(max_message_len) {
        chat.send_message(&chunk).await.map_err(|e| anyhow::anyhow!(e))?;
    }
    Ok(())
}

//! # Command Router
//!
//! Routes incoming messages to the appropriate command handler (in `interface/commands`).
//! It strips the command prefix (e.g., `!postman`) and dispatches with the necessary context.
//! Anything that is not a known command is ignored.

use anyhow::Result;
use std::collections::HashSet;

use crate::application::invocations::InvocationRegistry;
use crate::application::postman::PostmanService;
use crate::domain::config::SystemConfig;
use crate::domain::traits::ChatProvider;
use crate::interface::commands;

pub struct CommandRouter {
    prefix: String,
    ignored_rooms: HashSet<String>,
    max_message_len: usize,
    postman: PostmanService,
    registry: InvocationRegistry,
}

impl CommandRouter {
    pub fn new(
        system: &SystemConfig,
        max_message_len: usize,
        postman: PostmanService,
        registry: InvocationRegistry,
    ) -> Self {
        Self {
            prefix: system.command_prefix.clone(),
            ignored_rooms: system.ignored_rooms.iter().cloned().collect(),
            max_message_len,
            postman,
            registry,
        }
    }

    pub fn registry(&self) -> &InvocationRegistry {
        &self.registry
    }

    /// `invocation_id` identifies the command message so it can be cancelled later.
    pub async fn route<C>(&self, chat: &C, message: &str, sender: &str, invocation_id: &str) -> Result<()>
    where
        C: ChatProvider,
    {
        if self.ignored_rooms.contains(&chat.room_id()) {
            return Ok(());
        }

        let Some(command) = message.trim().strip_prefix(self.prefix.as_str()) else {
            return Ok(());
        };
        let (cmd, args) = match command.split_once(char::is_whitespace) {
            Some((cmd, args)) => (cmd, args.trim()),
            None => (command, ""),
        };
        let cmd = cmd.to_ascii_lowercase();

        // Arguments can carry credentials; only the command name is logged.
        tracing::info!("Router dispatching cmd='{}' sender='{}'", cmd, sender);

        match cmd.as_str() {
            "postman" => {
                commands::postman::handle_postman(
                    &self.postman,
                    &self.registry,
                    chat,
                    args,
                    invocation_id,
                    self.max_message_len,
                )
                .await
            }
            "help" => commands::help::handle_help(chat).await,
            "status" => commands::status::handle_status(&self.postman, &self.registry, chat).await,
            _ => Ok(()),
        }
    }
}

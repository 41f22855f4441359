//! # Main Entry Point
//!
//! Wires the layers together:
//! - Domain: Configuration and Types
//! - Infrastructure: Matrix, HTTP transport
//! - Application: Postman engine, Router
//! - Interface: Command Handlers
//!
//! `serve` (the default) runs the Matrix bot; `run` executes one command line locally.

mod application;
mod domain;
mod infrastructure;
mod interface;
mod strings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use matrix_sdk::{
    Client,
    config::SyncSettings,
    room::Room,
    ruma::events::room::{
        member::{MembershipState, StrippedRoomMemberEvent},
        message::{MessageType, SyncRoomMessageEvent},
        redaction::SyncRoomRedactionEvent,
    },
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing_appender::non_blocking::WorkerGuard;

use crate::application::invocations::InvocationRegistry;
use crate::application::limiter::ConcurrencyLimiter;
use crate::application::postman::PostmanService;
use crate::application::router::CommandRouter;
use crate::domain::config::AppConfig;
use crate::infrastructure::http::ReqwestTransport;
use crate::infrastructure::matrix::MatrixService;
use crate::strings::logs;

/// How long shutdown waits for cancelled commands to report back.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "postman-bot", version, about = "Chat-driven API request bot")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "data/config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to Matrix and answer commands (default)
    Serve,
    /// Execute one command line locally and print the rendered output
    Run {
        /// e.g. get https://api.example.com/data "key:value"
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        line: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load Configuration
    let config = AppConfig::load_or_default(&cli.config)?;

    // 2. Logging Setup (stdout stays clean for `run`)
    let console = !matches!(cli.command, Some(Command::Run { .. }));
    let _log_guard = init_logging(&config.system.log_dir, console)?;
    tracing::info!("{}", logs::config_loaded(&cli.config.display().to_string()));

    // 3. Request Engine. The limiter is created once and shared by every room and user.
    let limiter = ConcurrencyLimiter::new(config.postman.max_concurrent);
    let transport = Arc::new(ReqwestTransport::from_config(&config.postman)?);
    let service = PostmanService::from_config(&config.postman, transport, limiter);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Run { line } => run_once(&service, &line).await,
        Command::Serve => serve(config, service).await,
    }
}

fn init_logging(log_dir: &str, console: bool) -> Result<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let dir = Path::new(log_dir);
    fs::create_dir_all(dir).with_context(|| format!("Failed to create log directory {log_dir}"))?;

    // Clear previous session log
    let log_path = dir.join("session.log");
    if log_path.exists() {
        let _ = fs::remove_file(&log_path);
    }

    let file_appender = tracing_appender::rolling::never(dir, "session.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(
            "info,matrix_sdk=warn,matrix_sdk_base=warn,matrix_sdk_crypto=error,ruma=warn,hyper=warn,hyper_util=warn,reqwest=warn",
        )
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);
    let console_layer = console.then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stdout));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(guard)
}

/// The shell already split the line; words that contained whitespace get their quotes back.
fn join_command_line(words: &[String]) -> String {
    words
        .iter()
        .map(|word| {
            if word.contains(char::is_whitespace) {
                format!("\"{}\"", word.replace('\\', "\\\\").replace('"', "\\\""))
            } else {
                word.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

async fn run_once(service: &PostmanService, words: &[String]) -> Result<()> {
    let registry = InvocationRegistry::new();
    let (cancel, _guard) = registry.register("cli");

    let ctrl_registry = registry.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_registry.cancel_all();
        }
    });

    let output = service.execute(&join_command_line(words), cancel).await;
    println!("{output}");
    Ok(())
}

async fn serve(config: AppConfig, service: PostmanService) -> Result<()> {
    let matrix = config
        .services
        .matrix
        .clone()
        .context("services.matrix must be configured to serve")?;

    // 4. Matrix Setup
    let client = Client::builder()
        .homeserver_url(&matrix.homeserver)
        .build()
        .await
        .context("Failed to build Matrix client")?;

    client
        .matrix_auth()
        .login_username(&matrix.username, &matrix.password)
        .send()
        .await
        .context("Matrix login failed")?;
    tracing::info!("{} ({})", logs::LOGIN_SUCCESS, matrix.username);

    if let Some(name) = &matrix.display_name {
        tracing::info!("{}", logs::setting_display_name(name));
        if let Err(e) = client.account().set_display_name(Some(name.as_str())).await {
            tracing::warn!("{}", logs::set_display_name_fail(&e.to_string()));
        }
    }

    let registry = InvocationRegistry::new();
    let router = Arc::new(CommandRouter::new(
        &config.system,
        config.postman.max_message_len,
        service,
        registry.clone(),
    ));

    // 5. Event Handlers
    let start_time = SystemTime::now();
    let loop_router = router.clone();
    client.add_event_handler(move |ev: SyncRoomMessageEvent, room: Room| {
        let router = loop_router.clone();
        async move {
            let Some(original_msg) = ev.as_original() else {
                return;
            };

            // Ignore events older than start_time
            let ts = ev.origin_server_ts();
            let event_time = UNIX_EPOCH + Duration::from_millis(ts.get().into());
            if event_time < start_time {
                return;
            }
            if original_msg.sender == room.own_user_id() {
                return;
            }
            let MessageType::Text(text_content) = &original_msg.content.msgtype else {
                return;
            };

            let body = text_content.body.clone();
            let sender = original_msg.sender.to_string();
            let event_id = original_msg.event_id.to_string();
            let chat = MatrixService::new(room);

            // Each command is its own task so a slow request never blocks the sync loop.
            tokio::spawn(async move {
                if let Err(e) = router.route(&chat, &body, &sender, &event_id).await {
                    tracing::error!("Failed to route message: {}", e);
                }
            });
        }
    });

    // Redacting a command message cancels it.
    let redaction_registry = registry.clone();
    client.add_event_handler(move |ev: SyncRoomRedactionEvent| {
        let registry = redaction_registry.clone();
        async move {
            let Some(original) = ev.as_original() else {
                return;
            };
            let target = original.content.redacts.clone().or_else(|| original.redacts.clone());
            if let Some(event_id) = target {
                if registry.cancel(event_id.as_str()) {
                    tracing::info!("{}", logs::invocation_cancelled(event_id.as_str()));
                }
            }
        }
    });

    // Handle Invites
    client.add_event_handler(|ev: StrippedRoomMemberEvent, room: Room| async move {
        if ev.content.membership == MembershipState::Invite {
            tracing::info!("{}", logs::invite_received(room.room_id().as_str()));
            match room.join().await {
                Ok(_) => tracing::info!("{}", logs::JOIN_INVITE_SUCCESS),
                Err(e) => tracing::warn!("{}", logs::join_invite_fail(&e.to_string())),
            }
        }
    });

    // 6. Sync until Ctrl-C
    tracing::info!("{}", logs::SYNC_LOOP_START);
    tokio::select! {
        res = client.sync(SyncSettings::default()) => {
            res.map_err(|e| anyhow::anyhow!(logs::sync_loop_fail(&e.to_string())))?;
        }
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                tracing::info!("{}", logs::shutdown(registry.in_flight()));
                registry.cancel_all();
                let drained = async {
                    while registry.in_flight() > 0 {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                };
                let _ = tokio::time::timeout(SHUTDOWN_GRACE, drained).await;
            }
            Err(e) => tracing::error!("{}", logs::shutdown_fail(&e.to_string())),
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_serve() {
        let cli = Cli::try_parse_from(["postman-bot"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("data/config.yaml"));
    }

    #[test]
    fn test_run_collects_command_line() {
        let cli = Cli::try_parse_from([
            "postman-bot",
            "--config",
            "other.yaml",
            "run",
            "get",
            "https://api.example.com",
            "q:two words",
            "--raw",
        ])
        .unwrap();
        let Some(Command::Run { line }) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(cli.config, PathBuf::from("other.yaml"));
        assert_eq!(
            join_command_line(&line),
            r#"get https://api.example.com "q:two words" --raw"#
        );
    }
}

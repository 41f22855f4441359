//! # Log Lines
//!
//! Log message templates for the chat shell. Engine logs stay next to their code.

pub fn config_loaded(path: &str) -> String {
    format!("Loaded configuration from {path}")
}

pub const LOGIN_SUCCESS: &str = "Logged in successfully!";

pub fn setting_display_name(name: &str) -> String {
    format!("Setting display name to: {name}")
}

pub fn set_display_name_fail(err: &str) -> String {
    format!("Failed to set display name: {err}")
}

pub const SYNC_LOOP_START: &str = "Starting sync loop...";

pub fn sync_loop_fail(err: &str) -> String {
    format!("Sync loop failed: {err}")
}

pub fn shutdown(in_flight: usize) -> String {
    format!("Shutting down, cancelling {in_flight} command(s) in flight...")
}

pub fn shutdown_fail(err: &str) -> String {
    format!("Unable to listen for shutdown signal: {err}")
}

pub fn invite_received(room_id: &str) -> String {
    format!("💌 Received invite for room {room_id:?}")
}

pub fn join_invite_fail(err: &str) -> String {
    format!("Failed to join room after invite: {err}")
}

pub const JOIN_INVITE_SUCCESS: &str = "✅ Successfully joined room!";

pub fn invocation_cancelled(event_id: &str) -> String {
    format!("Cancelled command {event_id} after its message was redacted")
}

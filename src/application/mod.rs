//! # Application Layer
//!
//! Contains the request engine and the orchestration around it:
//! tokenizing and building requests, dispatching them under the concurrency and retry policy,
//! rendering results, and routing chat commands.

pub mod builder;
pub mod dispatcher;
pub mod invocations;
pub mod limiter;
pub mod postman;
pub mod redact;
pub mod renderer;
pub mod retry;
pub mod router;
pub mod target;
pub mod tokenizer;

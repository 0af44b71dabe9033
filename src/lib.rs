pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;

#[cfg(test)]
mod testing;

pub use cli::{Command, CommandError, prompt};
pub use client::{DEFAULT_AUTH_KIND, HandlerSocket};
pub use config::ClientConfig;
pub use error::{HsError, Result};
pub use protocol::{Execute, IndexId, Modification, Operation, Operator, Response, Value};

//! Downstream event dispatch
//!
//! Decoded dispatch events leave the pump here. The dispatcher runs each one
//! on its own task under a concurrency bound; the registry routes events and
//! `!commands` to the handlers registered at startup.

mod builtin;
mod dispatcher;
mod event;
mod registry;

pub use builtin::{builtin_commands, HelpCommand, PingCommand};
pub use dispatcher::Dispatcher;
pub use event::{DispatchEvent, EventHandler, HandlerError};
pub use registry::{Command, CommandContext, CommandHandler, EventRegistry, Replier};

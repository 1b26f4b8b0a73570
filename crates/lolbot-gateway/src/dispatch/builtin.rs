//! Built-in commands

use super::{Command, CommandContext, CommandHandler, HandlerError};
use async_trait::async_trait;

/// Placeholder in help texts for the command prefix
const PREFIX_PLACEHOLDER: &str = "{cc}";

/// The commands every bot carries
pub fn builtin_commands() -> Vec<Command> {
    vec![
        Command::new("help", HelpCommand)
            .help("For help with a particular command, type _{cc}help command_."),
        Command::new("ping", PingCommand).help("Replies with a pong"),
    ]
}

/// `!help [command]`
pub struct HelpCommand;

impl HelpCommand {
    /// Build the reply for `args` against the registered commands
    pub fn render(ctx: &CommandContext<'_>) -> String {
        let mut reply = match ctx.args().split_whitespace().next() {
            Some(topic) => match ctx.help_for(&topic.to_lowercase()) {
                Some("") => "No help available".to_string(),
                Some(help) => help.to_string(),
                None => "Unknown command".to_string(),
            },
            None => {
                let listing = ctx.keywords().collect::<Vec<_>>().join(", {cc}");
                format!(
                    "Available commands: {{cc}}{listing}. For help with a particular command, type {{cc}}help command"
                )
            }
        };

        if !reply.ends_with('.') {
            reply.push('.');
        }
        reply.replace(PREFIX_PLACEHOLDER, ctx.prefix())
    }
}

#[async_trait]
impl CommandHandler for HelpCommand {
    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), HandlerError> {
        ctx.reply(&Self::render(ctx)).await
    }
}

/// `!ping [text]` answers `!pong [text]`
pub struct PingCommand;

#[async_trait]
impl CommandHandler for PingCommand {
    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), HandlerError> {
        let reply = if ctx.args().is_empty() {
            format!("{}pong", ctx.prefix())
        } else {
            format!("{}pong {}", ctx.prefix(), ctx.args())
        };
        tracing::debug!(reply = %reply, "Answering ping");
        ctx.reply(&reply).await
    }
}

//! Handler and command registry
//!
//! Built once at startup and installed as the pump's single downstream
//! handler. Routes every event to the handlers registered for its type and
//! turns `MESSAGE_CREATE` events that start with the command prefix into
//! command invocations.

use super::{DispatchEvent, EventHandler, HandlerError};
use crate::rest::RestError;
use async_trait::async_trait;
use lolbot_common::CommandConfig;
use lolbot_core::Snowflake;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Event type carrying chat messages
pub const MESSAGE_CREATE: &str = "MESSAGE_CREATE";

/// Reply sent to non-admins invoking an admin-only command
pub const NOT_AUTHORISED: &str = "Sorry, only authorised users can do this";

/// Sends chat messages back to a channel
#[async_trait]
pub trait Replier: Send + Sync + 'static {
    async fn reply(&self, channel_id: Snowflake, content: &str) -> Result<(), RestError>;
}

/// Everything a command handler gets to see
pub struct CommandContext<'a> {
    event: &'a DispatchEvent,
    keyword: &'a str,
    args: &'a str,
    prefix: &'a str,
    replier: &'a dyn Replier,
    catalog: &'a BTreeMap<String, String>,
}

impl<'a> CommandContext<'a> {
    pub fn event(&self) -> &'a DispatchEvent {
        self.event
    }

    /// The lower-cased keyword that selected this command
    pub fn keyword(&self) -> &'a str {
        self.keyword
    }

    /// Text after the keyword, trimmed
    pub fn args(&self) -> &'a str {
        self.args
    }

    pub fn prefix(&self) -> &'a str {
        self.prefix
    }

    /// Every registered keyword, aliases included, sorted
    pub fn keywords(&self) -> impl Iterator<Item = &'a str> {
        self.catalog.keys().map(String::as_str)
    }

    /// Help text of a keyword; `Some("")` when registered without help
    pub fn help_for(&self, keyword: &str) -> Option<&'a str> {
        self.catalog.get(keyword).map(String::as_str)
    }

    /// Reply in the channel the command came from
    pub async fn reply(&self, content: &str) -> Result<(), HandlerError> {
        reply_to(self.event, self.replier, content).await
    }
}

async fn reply_to(
    event: &DispatchEvent,
    replier: &dyn Replier,
    content: &str,
) -> Result<(), HandlerError> {
    let channel_id = event
        .channel_id()
        .ok_or(HandlerError::MissingField("channel_id"))?;
    replier.reply(channel_id, content).await?;
    Ok(())
}

/// A `!keyword` handler
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), HandlerError>;
}

/// A registered command
#[derive(Clone)]
pub struct Command {
    keyword: String,
    aliases: Vec<String>,
    help: String,
    admin_only: bool,
    handler: Arc<dyn CommandHandler>,
}

impl Command {
    pub fn new(keyword: impl Into<String>, handler: impl CommandHandler) -> Self {
        Self {
            keyword: keyword.into().to_lowercase(),
            aliases: Vec::new(),
            help: String::new(),
            admin_only: false,
            handler: Arc::new(handler),
        }
    }

    /// Additional keyword for the same handler
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into().to_lowercase());
        self
    }

    /// Help text; `{cc}` is replaced by the command prefix when shown
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    /// Restrict the command to configured admins
    pub fn admin_only(mut self) -> Self {
        self.admin_only = true;
        self
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn is_admin_only(&self) -> bool {
        self.admin_only
    }

    fn keywords(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.keyword.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("keyword", &self.keyword)
            .field("aliases", &self.aliases)
            .field("admin_only", &self.admin_only)
            .finish()
    }
}

/// Explicit registry of event handlers and commands
pub struct EventRegistry {
    prefix: String,
    respond_to_bots: bool,
    admins: HashSet<Snowflake>,
    replier: Arc<dyn Replier>,
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    any: Vec<Arc<dyn EventHandler>>,
    commands: HashMap<String, Arc<Command>>,
    catalog: BTreeMap<String, String>,
}

impl EventRegistry {
    pub fn new(config: &CommandConfig, replier: Arc<dyn Replier>) -> Self {
        Self {
            prefix: config.prefix.clone(),
            respond_to_bots: config.respond_to_bots,
            admins: config.admins.iter().copied().collect(),
            replier,
            handlers: HashMap::new(),
            any: Vec::new(),
            commands: HashMap::new(),
            catalog: BTreeMap::new(),
        }
    }

    /// Register `help` and `ping`
    pub fn with_builtins(mut self) -> Self {
        for command in super::builtin_commands() {
            self = self.command(command);
        }
        self
    }

    /// Handle every event of `event_type`
    pub fn on(mut self, event_type: impl Into<String>, handler: impl EventHandler) -> Self {
        let event_type = event_type.into();
        tracing::debug!(event_type = %event_type, "Registered event handler");
        self.handlers
            .entry(event_type)
            .or_default()
            .push(Arc::new(handler));
        self
    }

    /// Handle every event
    pub fn on_any(mut self, handler: impl EventHandler) -> Self {
        self.any.push(Arc::new(handler));
        self
    }

    /// Register a command under its keyword and aliases
    ///
    /// A later registration of the same keyword replaces the earlier one.
    pub fn command(mut self, command: Command) -> Self {
        let command = Arc::new(command);
        for keyword in command.keywords() {
            if self
                .commands
                .insert(keyword.to_string(), Arc::clone(&command))
                .is_some()
            {
                tracing::warn!(keyword = %keyword, "Command registered twice, replacing");
            }
            self.catalog.insert(keyword.to_string(), command.help.clone());
        }
        tracing::info!(keyword = %command.keyword, "Loaded command");
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn has_command(&self, keyword: &str) -> bool {
        self.commands.contains_key(keyword)
    }

    /// Split `content` at the first space into a lower-cased keyword and
    /// the verbatim rest
    ///
    /// `None` when the prefix is missing or nothing follows it.
    pub fn parse_command<'c>(&self, content: &'c str) -> Option<(String, &'c str)> {
        let rest = content.strip_prefix(self.prefix.as_str())?;
        let (word, args) = rest.split_once(' ').unwrap_or((rest, ""));
        if word.is_empty() {
            return None;
        }
        Some((word.to_lowercase(), args))
    }

    async fn route_command(&self, event: &DispatchEvent) -> Result<(), HandlerError> {
        if !event.is(MESSAGE_CREATE) {
            return Ok(());
        }
        let Some(content) = event.content() else {
            return Ok(());
        };
        if !content.starts_with(self.prefix.as_str()) {
            return Ok(());
        }
        if event.author_is_bot() && !self.respond_to_bots {
            tracing::trace!("Ignoring command from bot account");
            return Ok(());
        }
        let Some((keyword, args)) = self.parse_command(content) else {
            return Ok(());
        };

        let Some(command) = self.commands.get(&keyword) else {
            let reply = format!("Unknown command: _{}{}_.", self.prefix, keyword);
            return reply_to(event, self.replier.as_ref(), &reply).await;
        };

        if command.admin_only && !event.author_id().is_some_and(|id| self.admins.contains(&id)) {
            tracing::info!(keyword = %keyword, author = ?event.author_id(), "Refused admin command");
            return reply_to(event, self.replier.as_ref(), NOT_AUTHORISED).await;
        }

        tracing::debug!(keyword = %keyword, "Running command");
        let ctx = CommandContext {
            event,
            keyword: &keyword,
            args,
            prefix: &self.prefix,
            replier: self.replier.as_ref(),
            catalog: &self.catalog,
        };
        command.handler.run(&ctx).await
    }
}

#[async_trait]
impl EventHandler for EventRegistry {
    async fn handle(&self, event: &DispatchEvent) -> Result<(), HandlerError> {
        let mut first_error = None;

        let typed = self.handlers.get(&event.event_type).into_iter().flatten();
        for handler in typed.chain(self.any.iter()) {
            if let Err(e) = handler.handle(event).await {
                tracing::warn!(event_type = %event.event_type, error = %e, "Handler failed");
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.route_command(event).await {
            first_error.get_or_insert(e);
        }

        first_error.map_or(Ok(()), Err)
    }
}

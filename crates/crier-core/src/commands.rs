//! Slash-command interpretation for admin and subscriber conversations.
//!
//! Parsing is a pure function into closed command enums; dispatch mutates
//! the store through its named update operations or invokes the broadcaster.
//! The `handled` return tells the caller whether the input was consumed as a
//! command; unhandled text is ordinary content.

use crate::broadcaster::Broadcaster;
use crate::error::EngineError;
use crate::traits::{DeliveryTransport, Store};
use crier_model::{ModerationEntry, ModerationState};
use std::sync::Arc;
use tracing::{debug, warn};

/// Number of posts replayed by `/prev`.
const PREV_LIMIT: u32 = 5;

const ADMIN_HELP: &str = "List of available commands:\n\
    `/welcome <text>` Set **welcome text** for new subscribers\n\
    `/intro <url-or-text>` Set **intro picture** (URL) or welcome text\n\
    `/mute` **Mute** subscriber activity notifications\n\
    `/unmute` **Unmute** subscriber activity notifications\n\
    `/allow @<handle>` Add handle to the **allow list**\n\
    `/block @<handle>` Add handle to the **block list**\n\
    `/public` Clear both lists. Anybody can join\n\
    `/curl` Show a `curl` command for broadcasting\n\
    `/stats` Show **statistics**: subscribers, messages, posts";

const SUBSCRIBER_HELP: &str = "List of available commands:\n\
    `/prev` Show 5 previous posts\n\
    `/mute` Mute all new posts\n\
    `/unmute` Resume posts in this channel";

/// A parsed admin command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Help,
    /// Set the welcome text.
    Welcome(String),
    /// Set the intro picture when URL-shaped, welcome text otherwise.
    Intro(String),
    Mute,
    Unmute,
    /// Add a handle to the allow list.
    Allow(String),
    /// Add a handle to the block list.
    Block(String),
    /// Clear both moderation lists.
    Public,
    Stats,
    /// Render an example publish command embedding the channel token.
    Curl,
    /// Any other `/`-prefixed input.
    Unknown(String),
}

impl AdminCommand {
    /// Parse one admin input line. Returns `None` when the line is not a
    /// command at all.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('/') {
            return None;
        }
        let (verb, rest) = split_verb(line);
        Some(match verb.to_ascii_lowercase().as_str() {
            "/help" => Self::Help,
            "/welcome" => Self::Welcome(rest.to_string()),
            "/intro" => Self::Intro(rest.to_string()),
            "/mute" => Self::Mute,
            "/unmute" => Self::Unmute,
            "/allow" => match parse_handle(rest) {
                Some(handle) => Self::Allow(handle),
                None => Self::Unknown(line.to_string()),
            },
            "/block" => match parse_handle(rest) {
                Some(handle) => Self::Block(handle),
                None => Self::Unknown(line.to_string()),
            },
            "/public" => Self::Public,
            "/stats" => Self::Stats,
            "/curl" => Self::Curl,
            _ => Self::Unknown(line.to_string()),
        })
    }
}

/// A parsed subscriber command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriberCommand {
    Help,
    /// Replay the last few missed posts.
    Prev,
    Mute,
    Unmute,
    /// Any other `/`-prefixed input.
    Unknown(String),
}

impl SubscriberCommand {
    /// Parse one subscriber input line. Returns `None` when the line is not
    /// a command at all.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('/') {
            return None;
        }
        Some(match line.to_ascii_lowercase().as_str() {
            "/help" => Self::Help,
            "/prev" => Self::Prev,
            "/mute" => Self::Mute,
            "/unmute" => Self::Unmute,
            _ => Self::Unknown(line.to_string()),
        })
    }
}

fn split_verb(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    }
}

/// Moderated handles are stored lowercase without the leading `@`.
fn parse_handle(rest: &str) -> Option<String> {
    let handle = rest.strip_prefix('@')?.trim().to_ascii_lowercase();
    if handle.is_empty() {
        return None;
    }
    Some(handle)
}

/// Executes parsed commands against the store and the broadcaster.
pub struct Commander {
    store: Arc<dyn Store>,
    transport: Arc<dyn DeliveryTransport>,
    broadcaster: Arc<Broadcaster>,
    /// Public host rendered into the `/curl` example.
    public_host: String,
}

impl Commander {
    /// Create a commander.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn DeliveryTransport>,
        broadcaster: Arc<Broadcaster>,
        public_host: impl Into<String>,
    ) -> Self {
        Self {
            store,
            transport,
            broadcaster,
            public_host: public_host.into(),
        }
    }

    /// Interpret one line from the admin conversation.
    ///
    /// Returns `true` when the line was consumed as a command; the caller
    /// must not also broadcast it. Lines from anyone but the channel admin
    /// are never treated as admin commands.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ChannelNotFound`] for unknown channels and
    /// [`EngineError::Store`] on persistence failures.
    pub async fn handle_admin(
        &self,
        channel_name: &str,
        sender: &str,
        line: &str,
    ) -> Result<bool, EngineError> {
        let Some(command) = AdminCommand::parse(line) else {
            return Ok(false);
        };
        let channel = self
            .store
            .channel(channel_name)
            .await?
            .ok_or_else(|| EngineError::ChannelNotFound(channel_name.to_string()))?;
        if channel.admin_id.as_deref() != Some(sender) {
            return Ok(false);
        }
        debug!(channel = %channel_name, command = ?command, "admin command");

        match command {
            AdminCommand::Help => self.reply(sender, ADMIN_HELP).await,
            AdminCommand::Welcome(text) => {
                self.store.set_welcome_text(channel_name, &text).await?;
                self.reply(sender, "Updated `welcome text`").await;
            }
            AdminCommand::Intro(value) => {
                if value.starts_with("http") {
                    self.store.set_intro_media(channel_name, &value).await?;
                    self.reply(sender, "Updated `intro picture`").await;
                } else {
                    self.store.set_welcome_text(channel_name, &value).await?;
                    self.reply(sender, "Updated `intro text`").await;
                }
            }
            AdminCommand::Mute => {
                self.store.set_channel_muted(channel_name, true).await?;
                self.reply(
                    sender,
                    "You won't receive info about subscribers' activity anymore. \
                     Type `/unmute` to resume",
                )
                .await;
            }
            AdminCommand::Unmute => {
                self.store.set_channel_muted(channel_name, false).await?;
                self.reply(sender, "Resumed. Type `/mute` to mute").await;
            }
            AdminCommand::Allow(handle) => {
                self.store
                    .upsert_moderation(&ModerationEntry {
                        channel: channel_name.to_string(),
                        handle: handle.clone(),
                        state: ModerationState::Allow,
                    })
                    .await?;
                self.reply(sender, &format!("@{handle} added to the allow list"))
                    .await;
            }
            AdminCommand::Block(handle) => {
                self.store
                    .upsert_moderation(&ModerationEntry {
                        channel: channel_name.to_string(),
                        handle: handle.clone(),
                        state: ModerationState::Block,
                    })
                    .await?;
                self.reply(sender, &format!("@{handle} added to the block list"))
                    .await;
            }
            AdminCommand::Public => {
                self.store.clear_moderation(channel_name).await?;
                self.reply(sender, "Channel made **public** again").await;
            }
            AdminCommand::Stats => {
                let subscribers = self.store.count_subscribers(channel_name).await?;
                let messages = self.store.count_inbound(channel_name).await?;
                let posts = self.store.count_broadcasts(channel_name).await?;
                let stats = format!(
                    "```\nSubscribers: {subscribers}\nMessages:    {messages}\nPosts:       {posts}\n```"
                );
                self.reply(sender, &stats).await;
            }
            AdminCommand::Curl => {
                let example =
                    serde_json::json!({ "kind": "text", "body": "Hi there!" }).to_string();
                let curl = format!(
                    "```\ncurl -ikXPOST https://{host}/channels/{name}/broadcast -d'{example}' \
                     -H'Authorization:{token}' -H'Content-Type:application/json'\n```",
                    host = self.public_host,
                    name = channel.name,
                    token = channel.token,
                );
                self.reply(sender, &curl).await;
            }
            AdminCommand::Unknown(input) => {
                self.reply(sender, &format!("Unknown command: `{input}`"))
                    .await;
            }
        }
        Ok(true)
    }

    /// Interpret one line from a subscriber conversation.
    ///
    /// Returns `true` when the line was consumed as a command; unhandled
    /// text is ordinary content for the caller to forward.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SubscriberNotFound`] when `/prev` is invoked
    /// for an unknown bot id and [`EngineError::Store`] on persistence
    /// failures.
    pub async fn handle_subscriber(&self, bot_id: &str, line: &str) -> Result<bool, EngineError> {
        let Some(command) = SubscriberCommand::parse(line) else {
            return Ok(false);
        };
        debug!(bot = %bot_id, command = ?command, "subscriber command");

        match command {
            SubscriberCommand::Help => self.reply(bot_id, SUBSCRIBER_HELP).await,
            SubscriberCommand::Prev => {
                self.broadcaster.catch_up(bot_id, PREV_LIMIT).await?;
            }
            SubscriberCommand::Mute => {
                self.store.set_subscriber_muted(bot_id, true).await?;
                self.reply(
                    bot_id,
                    "You won't receive posts here anymore. Type `/unmute` to resume",
                )
                .await;
            }
            SubscriberCommand::Unmute => {
                self.store.set_subscriber_muted(bot_id, false).await?;
                self.reply(bot_id, "Posts resumed").await;
            }
            SubscriberCommand::Unknown(input) => {
                self.reply(bot_id, &format!("Unknown command: `{input}`"))
                    .await;
            }
        }
        Ok(true)
    }

    /// Best-effort command reply.
    async fn reply(&self, to: &str, text: &str) {
        if let Err(e) = self.transport.send_text(to, text).await {
            warn!(recipient = %to, error = %e, "command reply failed");
        }
    }
}

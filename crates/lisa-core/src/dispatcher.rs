//! Routes inbound events: XP bookkeeping, group bookkeeping, command lookup,
//! authorization and failure containment.

use std::{future::Future, panic::AssertUnwindSafe, sync::Arc};

use chrono::Utc;
use futures::FutureExt;

use crate::{
    commands::{CallbackContext, CommandContext, CommandDescriptor, CommandRegistry},
    config::Config,
    domain::{ChatId, Sender, UserId},
    errors::Error,
    leveling::XpLedger,
    logging::panic_message,
    messaging::{
        port::MessagingPort,
        types::{
            CallbackAnswer, CallbackQuery, ChatInfo, InboundEvent, IncomingMessage, MemberLeft,
            MembersJoined, SendOptions,
        },
    },
    ports::Store,
    security::{is_chat_admin, is_owner},
    Result,
};

pub const OWNER_ONLY_NOTICE: &str =
    "🚫 Oopsie! This command is for the cool kids (bot owners) only! 🚫";
pub const ADMIN_ONLY_NOTICE: &str = "🚫 Sorry bestie! This command is for admins only! 🚫";
pub const APOLOGY: &str = "💔 Oopsie woopsie! Something went wrong! 💔";

/// Separator between command name and arguments in callback payloads.
pub const CALLBACK_DELIMITER: char = ':';

#[derive(Clone, Debug)]
pub struct DispatchSettings {
    pub owner_ids: Vec<i64>,
    pub prefix: char,
    pub xp_per_message: u64,
}

impl DispatchSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            owner_ids: cfg.owner_ids.clone(),
            prefix: cfg.command_prefix,
            xp_per_message: cfg.xp_per_message,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    OwnerOnly,
    AdminOnly,
}

impl Rejection {
    pub fn notice(self) -> &'static str {
        match self {
            Rejection::OwnerOnly => OWNER_ONLY_NOTICE,
            Rejection::AdminOnly => ADMIN_ONLY_NOTICE,
        }
    }
}

/// Terminal state of a message event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    NotACommand,
    UnknownCommand(String),
    Rejected { command: String, reason: Rejection },
    Executed(String),
    Failed(String),
}

/// Terminal state of a callback event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    Handled(String),
    Unhandled,
    Failed(String),
}

/// A prefixed command split into name and positional args.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
}

/// `"/Help@my_bot  fun"` → `help` + `["fun"]`. `None` if the text is not a
/// command invocation.
pub fn parse_command(text: &str, prefix: char) -> Option<ParsedCommand> {
    let rest = text.strip_prefix(prefix)?;
    let mut tokens = rest.split_whitespace();
    let first = tokens.next()?;
    let name = first.split('@').next().unwrap_or("").to_lowercase();
    if name.is_empty() {
        return None;
    }
    Some(ParsedCommand {
        name,
        args: tokens.map(str::to_string).collect(),
    })
}

/// `"rank:top:-100"` → `rank` + `["top", "-100"]`.
pub fn parse_callback_data(data: &str) -> (String, Vec<String>) {
    let mut parts = data.split(CALLBACK_DELIMITER);
    let name = parts.next().unwrap_or("").trim().to_lowercase();
    (name, parts.map(str::to_string).collect())
}

pub fn level_up_text(name: &str, level: u32) -> String {
    format!(
        "🎊 OMG! OMG! OMG! 🎊\n✨ {name} just reached Level {level}! ✨\n🌟 You're absolutely SLAYING IT! 🌟"
    )
}

pub fn welcome_text(name: &str, group: &str, member_count: Option<u32>) -> String {
    match member_count {
        Some(n) => format!("👋 Welcome {name} to {group}! You are member #{n}. 🎉"),
        None => format!("👋 Welcome {name} to {group}! 🎉"),
    }
}

pub fn goodbye_text(name: &str, group: &str, member_count: Option<u32>) -> String {
    match member_count {
        Some(n) => format!("👋 {name} left {group}. We are now {n} members."),
        None => format!("👋 {name} left {group}."),
    }
}

pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    ledger: XpLedger,
    store: Arc<dyn Store>,
    messenger: Arc<dyn MessagingPort>,
    owner_ids: Vec<i64>,
    prefix: char,
    bot_id: Option<UserId>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CommandRegistry>,
        store: Arc<dyn Store>,
        messenger: Arc<dyn MessagingPort>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            ledger: XpLedger::new(store.clone(), settings.xp_per_message),
            registry,
            store,
            messenger,
            owner_ids: settings.owner_ids,
            prefix: settings.prefix,
            bot_id: None,
        }
    }

    /// The bot's own user id, used to recognise "the bot was removed" events.
    pub fn with_bot_id(mut self, bot_id: UserId) -> Self {
        self.bot_id = Some(bot_id);
        self
    }

    /// Entry point for every inbound event. Never fails.
    pub async fn handle(&self, event: InboundEvent) {
        match event {
            InboundEvent::Message(msg) => {
                let outcome = self.handle_message(&msg).await;
                tracing::debug!(chat_id = msg.chat.id.0, ?outcome, "message dispatched");
            }
            InboundEvent::Callback(q) => {
                let outcome = self.handle_callback(&q).await;
                tracing::debug!(callback_id = %q.callback_id, ?outcome, "callback dispatched");
            }
            InboundEvent::MembersJoined(ev) => self.handle_members_joined(&ev).await,
            InboundEvent::MemberLeft(ev) => self.handle_member_left(&ev).await,
        }
    }

    pub async fn handle_message(&self, msg: &IncomingMessage) -> DispatchOutcome {
        let name = msg.from.display_name();
        tracing::info!(
            chat_id = msg.chat.id.0,
            chat_type = msg.chat.kind.as_str(),
            user = %name,
            "{}",
            msg.text.as_deref().unwrap_or("Non-text message")
        );

        self.track_activity(&msg.chat, &msg.from).await;

        let Some(parsed) = msg
            .text
            .as_deref()
            .and_then(|t| parse_command(t, self.prefix))
        else {
            return DispatchOutcome::NotACommand;
        };

        let Some(descriptor) = self.registry.get(&parsed.name) else {
            return DispatchOutcome::UnknownCommand(parsed.name);
        };

        if let Some(reason) = self.authorize(descriptor, msg).await {
            tracing::warn!(
                command = %parsed.name,
                user_id = msg.from.id.0,
                ?reason,
                "command rejected"
            );
            self.send(msg.chat.id, reason.notice(), "rejection notice").await;
            return DispatchOutcome::Rejected {
                command: parsed.name,
                reason,
            };
        }

        let ctx = CommandContext {
            messenger: self.messenger.as_ref(),
            store: self.store.as_ref(),
            registry: &self.registry,
            message: msg,
            prefix: self.prefix,
        };

        match contain_panic(descriptor.handler.execute(&ctx, &parsed.args)).await {
            Ok(()) => DispatchOutcome::Executed(parsed.name),
            Err(e) => {
                tracing::error!(command = %parsed.name, chat_id = msg.chat.id.0, "error executing command: {e}");
                self.send(msg.chat.id, APOLOGY, "apology").await;
                DispatchOutcome::Failed(parsed.name)
            }
        }
    }

    pub async fn handle_callback(&self, q: &CallbackQuery) -> CallbackOutcome {
        let (name, args) = parse_callback_data(&q.data);

        let Some(descriptor) = self
            .registry
            .get(&name)
            .filter(|d| d.supports_callback())
        else {
            // Clear the client's loading spinner; nothing else to do.
            if let Err(e) = self
                .messenger
                .answer_callback_query(&q.callback_id, CallbackAnswer::empty())
                .await
            {
                tracing::warn!(callback_id = %q.callback_id, "failed to answer callback: {e}");
            }
            return CallbackOutcome::Unhandled;
        };

        tracing::info!(
            user = %q.from.display_name(),
            data = %q.data,
            "callback"
        );

        let ctx = CallbackContext {
            messenger: self.messenger.as_ref(),
            store: self.store.as_ref(),
            registry: &self.registry,
            query: q,
        };

        match contain_panic(descriptor.handler.handle_callback(&ctx, &args)).await {
            Ok(()) => CallbackOutcome::Handled(name),
            Err(e) => {
                tracing::error!(command = %name, "error handling callback query: {e}");
                if let Err(e) = self
                    .messenger
                    .answer_callback_query(&q.callback_id, CallbackAnswer::alert(APOLOGY))
                    .await
                {
                    tracing::error!("error sending callback error message: {e}");
                }
                CallbackOutcome::Failed(name)
            }
        }
    }

    pub async fn handle_members_joined(&self, ev: &MembersJoined) {
        if let Some(from) = &ev.from {
            self.track_activity(&ev.chat, from).await;
        }

        let group = ev.chat.title_or_default();
        let count = self.member_count(ev.chat.id).await;

        for member in &ev.members {
            if Some(member.id) == self.bot_id {
                continue;
            }
            let text = welcome_text(&member.display_name(), &group, count);
            self.send(ev.chat.id, &text, "welcome").await;
        }
    }

    pub async fn handle_member_left(&self, ev: &MemberLeft) {
        if Some(ev.member.id) == self.bot_id {
            let kicked_by = ev
                .from
                .as_ref()
                .map(|s| s.display_name())
                .unwrap_or_else(|| "Unknown user".to_string());
            tracing::warn!(
                group_id = ev.chat.id.0,
                group = %ev.chat.title_or_default(),
                %kicked_by,
                "bot removed from group"
            );
            if let Err(e) = self
                .store
                .mark_group_inactive(ev.chat.id, &kicked_by, Utc::now())
                .await
            {
                tracing::error!(group_id = ev.chat.id.0, "error updating group after being kicked: {e}");
            }
            return;
        }

        if let Some(from) = &ev.from {
            self.track_activity(&ev.chat, from).await;
        }

        let count = self.member_count(ev.chat.id).await;
        let text = goodbye_text(&ev.member.display_name(), &ev.chat.title_or_default(), count);
        self.send(ev.chat.id, &text, "goodbye").await;
    }

    /// XP award for the sender plus group bookkeeping. Runs for every
    /// user-authored update, service messages included.
    async fn track_activity(&self, chat: &ChatInfo, from: &Sender) {
        self.award_xp(chat, from).await;
        if chat.kind.is_group() {
            self.record_group_activity(chat, from).await;
        }
    }

    async fn award_xp(&self, chat: &ChatInfo, from: &Sender) {
        let name = from.display_name();
        match self.ledger.update_user_xp(from.id, &name).await {
            Ok(change) if change.level_increased => {
                let text = level_up_text(&name, change.new_level);
                self.send(chat.id, &text, "level up").await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(user_id = from.id.0, "failed to update xp: {e}");
            }
        }
    }

    async fn record_group_activity(&self, chat: &ChatInfo, from: &Sender) {
        let title = chat.title_or_default();
        if let Err(e) = self.store.upsert_group(chat.id, &title).await {
            tracing::error!(group_id = chat.id.0, "failed to record group: {e}");
        }
        if let Err(e) = self.store.set_user_group(from.id, chat.id).await {
            tracing::error!(user_id = from.id.0, "failed to record user group: {e}");
        }
    }

    /// Owner gate first, then admin gate. `None` means allowed.
    async fn authorize(&self, descriptor: &CommandDescriptor, msg: &IncomingMessage) -> Option<Rejection> {
        if descriptor.meta.owner_only && !is_owner(msg.from.id, &self.owner_ids) {
            return Some(Rejection::OwnerOnly);
        }
        if descriptor.meta.admin_only
            && !is_chat_admin(self.messenger.as_ref(), &msg.chat, msg.from.id).await
        {
            return Some(Rejection::AdminOnly);
        }
        None
    }

    async fn member_count(&self, chat_id: ChatId) -> Option<u32> {
        match self.messenger.get_chat_member_count(chat_id).await {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!(chat_id = chat_id.0, "failed to get member count: {e}");
                None
            }
        }
    }

    async fn send(&self, chat_id: ChatId, text: &str, what: &str) {
        if let Err(e) = self
            .messenger
            .send_message(chat_id, text, SendOptions::default())
            .await
        {
            tracing::error!(chat_id = chat_id.0, "error sending {what} message: {e}");
        }
    }
}

/// Turns a panicking handler into an ordinary `Err`.
async fn contain_panic<F>(handler: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    AssertUnwindSafe(handler)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| {
            Err(Error::Command(format!(
                "handler panicked: {}",
                panic_message(payload.as_ref())
            )))
        })
}

//! Command descriptors and the registry the dispatcher routes into.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use async_trait::async_trait;

use crate::{
    domain::ChatId,
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{CallbackAnswer, CallbackQuery, IncomingMessage, SendOptions},
    },
    ports::Store,
    Result,
};

/// Static metadata of a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandMeta {
    pub name: String,
    pub category: String,
    pub description: String,
    pub guide: String,
    pub owner_only: bool,
    pub admin_only: bool,
}

impl CommandMeta {
    pub fn new(name: &str, category: &str, description: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            category: category.to_string(),
            description: description.to_string(),
            guide: String::new(),
            owner_only: false,
            admin_only: false,
        }
    }

    pub fn guide(mut self, guide: &str) -> Self {
        self.guide = guide.to_string();
        self
    }

    pub fn owner_only(mut self) -> Self {
        self.owner_only = true;
        self
    }

    pub fn admin_only(mut self) -> Self {
        self.admin_only = true;
        self
    }
}

/// What a command handler gets to work with for a message invocation.
pub struct CommandContext<'a> {
    pub messenger: &'a dyn MessagingPort,
    pub store: &'a dyn Store,
    pub registry: &'a CommandRegistry,
    pub message: &'a IncomingMessage,
    pub prefix: char,
}

impl CommandContext<'_> {
    pub fn chat_id(&self) -> ChatId {
        self.message.chat.id
    }

    pub async fn reply(&self, text: &str) -> Result<()> {
        self.reply_with(text, SendOptions::default()).await
    }

    pub async fn reply_html(&self, html: &str) -> Result<()> {
        self.reply_with(html, SendOptions::html()).await
    }

    pub async fn reply_with(&self, text: &str, options: SendOptions) -> Result<()> {
        self.messenger
            .send_message(self.chat_id(), text, options)
            .await
            .map(|_| ())
    }
}

/// What a command handler gets for a callback query routed to it.
pub struct CallbackContext<'a> {
    pub messenger: &'a dyn MessagingPort,
    pub store: &'a dyn Store,
    pub registry: &'a CommandRegistry,
    pub query: &'a CallbackQuery,
}

impl CallbackContext<'_> {
    pub async fn answer(&self, answer: CallbackAnswer) -> Result<()> {
        self.messenger
            .answer_callback_query(&self.query.callback_id, answer)
            .await
    }
}

/// A command handler.
///
/// `execute` is required. Callback handling is opt-in: a command that sends
/// inline buttons overrides both `supports_callback` and `handle_callback`.
#[async_trait]
pub trait Command: Send + Sync {
    fn meta(&self) -> CommandMeta;

    async fn execute(&self, ctx: &CommandContext<'_>, args: &[String]) -> Result<()>;

    fn supports_callback(&self) -> bool {
        false
    }

    async fn handle_callback(&self, ctx: &CallbackContext<'_>, args: &[String]) -> Result<()> {
        let _ = (ctx, args);
        Err(Error::Command(format!(
            "{} does not handle callbacks",
            self.meta().name
        )))
    }
}

/// Registry entry: metadata snapshot plus the handler.
#[derive(Clone)]
pub struct CommandDescriptor {
    pub meta: CommandMeta,
    pub handler: Arc<dyn Command>,
}

impl CommandDescriptor {
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn supports_callback(&self) -> bool {
        self.handler.supports_callback()
    }
}

impl std::fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("meta", &self.meta)
            .field("supports_callback", &self.supports_callback())
            .finish()
    }
}

/// What to do when two handlers claim the same name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// Refuse to build the registry.
    #[default]
    FailFast,
    /// Later registrations replace earlier ones.
    LastWins,
}

/// Name → descriptor mapping. Built once, read-only afterwards.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, CommandDescriptor>,
}

impl CommandRegistry {
    /// Build the registry from a set of handlers, in load order.
    pub fn load<I>(source: I, policy: CollisionPolicy) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<dyn Command>>,
    {
        let mut commands = BTreeMap::new();
        for handler in source {
            let meta = handler.meta();
            let name = meta.name.trim().to_lowercase();
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                return Err(Error::Config(format!(
                    "invalid command name {:?}",
                    meta.name
                )));
            }

            let descriptor = CommandDescriptor {
                meta: CommandMeta { name: name.clone(), ..meta },
                handler,
            };
            if commands.insert(name.clone(), descriptor).is_some() {
                match policy {
                    CollisionPolicy::FailFast => {
                        return Err(Error::Config(format!("duplicate command name: {name}")));
                    }
                    CollisionPolicy::LastWins => {
                        tracing::warn!(command = %name, "duplicate command name, last registration wins");
                    }
                }
            }
        }

        tracing::info!(count = commands.len(), "command registry loaded");
        Ok(Self { commands })
    }

    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Descriptors sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.commands.values()
    }

    /// Distinct categories of registered commands, sorted.
    pub fn categories(&self) -> Vec<String> {
        self.commands
            .values()
            .map(|d| d.meta.category.clone())
            .filter(|c| !c.trim().is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Commands whose category matches `category` case-insensitively.
    pub fn in_category(&self, category: &str) -> Vec<&CommandDescriptor> {
        self.commands
            .values()
            .filter(|d| d.meta.category.eq_ignore_ascii_case(category))
            .collect()
    }

    /// Command names containing `term`.
    pub fn similar(&self, term: &str) -> Vec<&str> {
        let term = term.to_lowercase();
        self.commands
            .keys()
            .filter(|name| name.contains(&term))
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        meta: CommandMeta,
    }

    impl Named {
        fn new(name: &str, category: &str, description: &str) -> Arc<dyn Command> {
            Arc::new(Self {
                meta: CommandMeta::new(name, category, description),
            })
        }
    }

    #[async_trait]
    impl Command for Named {
        fn meta(&self) -> CommandMeta {
            self.meta.clone()
        }

        async fn execute(&self, _ctx: &CommandContext<'_>, _args: &[String]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn names_are_case_folded() {
        let reg = CommandRegistry::load(
            vec![Named::new("Help", "Utility", "help")],
            CollisionPolicy::FailFast,
        )
        .unwrap();
        assert!(reg.get("help").is_some());
        assert!(reg.get("HELP").is_some());
        assert_eq!(reg.get("help").unwrap().name(), "help");
    }

    #[test]
    fn duplicate_names_fail_fast_by_default() {
        let err = CommandRegistry::load(
            vec![
                Named::new("ping", "Utility", "first"),
                Named::new("PING", "Utility", "second"),
            ],
            CollisionPolicy::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate command name: ping"));
    }

    #[test]
    fn last_wins_keeps_the_later_registration() {
        let reg = CommandRegistry::load(
            vec![
                Named::new("ping", "Utility", "first"),
                Named::new("ping", "Fun", "second"),
            ],
            CollisionPolicy::LastWins,
        )
        .unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("ping").unwrap().meta.description, "second");
    }

    #[test]
    fn rejects_blank_or_spaced_names() {
        assert!(CommandRegistry::load(vec![Named::new(" ", "x", "y")], CollisionPolicy::FailFast).is_err());
        assert!(
            CommandRegistry::load(vec![Named::new("two words", "x", "y")], CollisionPolicy::FailFast)
                .is_err()
        );
    }

    #[test]
    fn category_queries() {
        let reg = CommandRegistry::load(
            vec![
                Named::new("help", "Utility", ""),
                Named::new("info", "Utility", ""),
                Named::new("lisa", "Fun", ""),
            ],
            CollisionPolicy::FailFast,
        )
        .unwrap();
        assert_eq!(reg.categories(), vec!["Fun", "Utility"]);
        assert_eq!(reg.in_category("utility").len(), 2);
        assert!(reg.in_category("admin").is_empty());
        assert_eq!(reg.similar("li"), vec!["lisa"]);
    }

    #[test]
    fn callbacks_are_opt_in() {
        let reg = CommandRegistry::load(vec![Named::new("help", "Utility", "")], CollisionPolicy::FailFast)
            .unwrap();
        assert!(!reg.get("help").unwrap().supports_callback());
    }
}

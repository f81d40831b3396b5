use async_trait::async_trait;

use lisa_core::{
    commands::{Command, CommandContext, CommandDescriptor, CommandMeta, CommandRegistry},
    formatting::{capitalize, escape_html},
    Result,
};

/// `/help`, `/help <category>`, `/help <command>`.
pub struct HelpCommand;

#[async_trait]
impl Command for HelpCommand {
    fn meta(&self) -> CommandMeta {
        CommandMeta::new(
            "help",
            "Utility",
            "Show all commands or info about a specific command",
        )
        .guide("Use /help for all commands, /help <category> for category commands, or /help <command> for specific info")
    }

    async fn execute(&self, ctx: &CommandContext<'_>, args: &[String]) -> Result<()> {
        let html = match args.first() {
            None => render_categories(ctx.registry, ctx.prefix),
            Some(term) => render_lookup(ctx.registry, ctx.prefix, term),
        };
        ctx.reply_html(&html).await
    }
}

pub fn render_categories(registry: &CommandRegistry, prefix: char) -> String {
    let mut categories = registry.categories();
    if categories.is_empty() {
        categories.push("Uncategorized".to_string());
    }

    let mut out = String::from("<b>Command Categories:</b>\n\n");
    for category in &categories {
        out.push_str(&format!(
            "{prefix}help {} - {} commands\n",
            escape_html(&category.to_lowercase()),
            escape_html(category)
        ));
    }
    out.push_str(&format!(
        "\nUse {prefix}help &lt;category&gt; to see commands in a specific category."
    ));
    out.push_str(&format!(
        "\nUse {prefix}help &lt;command&gt; for more information on a specific command."
    ));
    out.push_str(&format!("\n\nTotal commands: {}", registry.len()));
    out
}

pub fn render_lookup(registry: &CommandRegistry, prefix: char, term: &str) -> String {
    let term = term.to_lowercase();

    let in_category = registry.in_category(&term);
    if !in_category.is_empty() {
        return render_category(registry, prefix, &term, &in_category);
    }

    if let Some(descriptor) = registry.get(&term) {
        return render_command(registry, prefix, descriptor);
    }

    let mut out = format!(
        "Command {prefix}{} not found. Use {prefix}help to see all available categories.",
        escape_html(&term)
    );
    let similar = registry.similar(&term);
    if !similar.is_empty() {
        out.push_str("\n\nDid you mean:");
        for name in similar {
            out.push_str(&format!("\n{prefix}{}", escape_html(name)));
        }
    }
    out.push_str(&format!("\n\nTotal commands: {}", registry.len()));
    out
}

fn render_category(
    registry: &CommandRegistry,
    prefix: char,
    category: &str,
    commands: &[&CommandDescriptor],
) -> String {
    let mut out = format!("<b>{} Commands:</b>\n\n", escape_html(&capitalize(category)));
    for d in commands {
        out.push_str(&format!(
            "{prefix}{} - {}\n",
            escape_html(d.name()),
            escape_html(or_default(&d.meta.description, "No description available"))
        ));
    }
    out.push_str(&format!(
        "\nUse {prefix}help &lt;command&gt; for more information on a specific command."
    ));
    out.push_str(&format!(
        "\n\nTotal {} commands: {}",
        escape_html(category),
        commands.len()
    ));
    out.push_str(&format!("\nTotal commands: {}", registry.len()));
    out
}

fn render_command(registry: &CommandRegistry, prefix: char, d: &CommandDescriptor) -> String {
    let meta = &d.meta;
    format!(
        "<b>{prefix}{}</b>\n\nDescription: {}\nCategory: {}\nUsage: {}\nAdmin Only: {}\nOwner Only: {}\n\nTotal commands: {}",
        escape_html(&meta.name),
        escape_html(or_default(&meta.description, "No description available")),
        escape_html(or_default(&meta.category, "Uncategorized")),
        escape_html(or_default(&meta.guide, "No usage guide available")),
        yes_no(meta.admin_only),
        yes_no(meta.owner_only),
        registry.len()
    )
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "Yes"
    } else {
        "No"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lisa_core::{
        commands::CollisionPolicy,
        dispatcher::{DispatchOutcome, DispatchSettings, Dispatcher},
        domain::ChatId,
        memory_store::InMemoryStore,
        messaging::types::ParseMode,
        testing::{private_chat, sender, text_message, RecordingMessenger},
    };

    use super::*;

    struct Stub(CommandMeta);

    #[async_trait]
    impl Command for Stub {
        fn meta(&self) -> CommandMeta {
            self.0.clone()
        }

        async fn execute(&self, _ctx: &CommandContext<'_>, _args: &[String]) -> Result<()> {
            Ok(())
        }
    }

    fn registry() -> CommandRegistry {
        let commands: Vec<Arc<dyn Command>> = vec![
            Arc::new(HelpCommand),
            Arc::new(Stub(CommandMeta::new("info", "Utility", "Show developer information and bot stats."))),
            Arc::new(Stub(
                CommandMeta::new("lisa", "Fun", "Chat with Lisa AI")
                    .guide("Use /lisa followed by your message"),
            )),
        ];
        CommandRegistry::load(commands, CollisionPolicy::FailFast).unwrap()
    }

    #[test]
    fn category_listing_names_exactly_the_registered_categories() {
        let out = render_categories(&registry(), '/');
        assert!(out.contains("/help fun - Fun commands"));
        assert!(out.contains("/help utility - Utility commands"));
        assert_eq!(out.matches(" commands\n").count(), 2);
        assert!(out.ends_with("Total commands: 3"));
    }

    #[test]
    fn category_lookup_lists_its_commands() {
        let out = render_lookup(&registry(), '/', "UTILITY");
        assert!(out.starts_with("<b>Utility Commands:</b>"));
        assert!(out.contains("/help - Show all commands"));
        assert!(out.contains("/info - Show developer information and bot stats."));
        assert!(!out.contains("/lisa"));
        assert!(out.contains("Total utility commands: 2"));
    }

    #[test]
    fn command_lookup_shows_details() {
        let out = render_lookup(&registry(), '/', "lisa");
        assert!(out.starts_with("<b>/lisa</b>"));
        assert!(out.contains("Category: Fun"));
        assert!(out.contains("Usage: Use /lisa followed by your message"));
        assert!(out.contains("Admin Only: No"));
        assert!(out.contains("Owner Only: No"));
    }

    #[test]
    fn unknown_term_suggests_similar_commands() {
        let out = render_lookup(&registry(), '/', "li");
        assert!(out.starts_with("Command /li not found."));
        assert!(out.contains("Did you mean:\n/lisa"));

        let none = render_lookup(&registry(), '/', "zzz");
        assert!(!none.contains("Did you mean"));
    }

    #[test]
    fn user_input_is_escaped() {
        let out = render_lookup(&registry(), '/', "<b>");
        assert!(out.contains("&lt;b&gt;"));
    }

    #[tokio::test]
    async fn execute_replies_with_html() {
        let registry = registry();
        let messenger = RecordingMessenger::new();
        let store = InMemoryStore::new();
        let message = text_message(private_chat(5), sender(5, "u"), "/help");
        let ctx = CommandContext {
            messenger: &messenger,
            store: &store,
            registry: &registry,
            message: &message,
            prefix: '/',
        };

        HelpCommand.execute(&ctx, &[]).await.unwrap();

        let sent = messenger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, ChatId(5));
        assert_eq!(sent[0].options.parse_mode, Some(ParseMode::Html));
        assert!(sent[0].text.starts_with("<b>Command Categories:</b>"));
    }

    #[tokio::test]
    async fn help_through_dispatcher_lists_fun_and_utility() {
        let messenger = Arc::new(RecordingMessenger::new());
        let dispatcher = Dispatcher::new(
            Arc::new(registry()),
            Arc::new(InMemoryStore::new()),
            messenger.clone(),
            DispatchSettings {
                owner_ids: vec![1],
                prefix: '/',
                xp_per_message: 10,
            },
        );

        let outcome = dispatcher
            .handle_message(&text_message(private_chat(5), sender(5, "u"), "/help"))
            .await;

        assert_eq!(outcome, DispatchOutcome::Executed("help".to_string()));
        let texts = messenger.texts_for(ChatId(5));
        assert_eq!(texts.len(), 1);
        let categories: Vec<&str> = texts[0]
            .lines()
            .filter_map(|line| line.strip_suffix(" commands"))
            .filter_map(|line| line.split(" - ").nth(1))
            .collect();
        assert_eq!(categories, vec!["Fun", "Utility"]);
    }
}

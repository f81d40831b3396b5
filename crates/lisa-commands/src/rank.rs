use async_trait::async_trait;

use lisa_core::{
    commands::{CallbackContext, Command, CommandContext, CommandMeta},
    domain::ChatId,
    errors::Error,
    formatting::escape_html,
    leveling::LevelProgress,
    messaging::types::{CallbackAnswer, InlineButton, InlineKeyboard, SendOptions},
    ports::UserRecord,
    Result,
};

pub const LEADERBOARD_SIZE: usize = 10;
pub const LEADERBOARD_CALLBACK: &str = "rank:top";

/// `/rank`: the caller's XP and level, with a leaderboard button.
pub struct RankCommand;

#[async_trait]
impl Command for RankCommand {
    fn meta(&self) -> CommandMeta {
        CommandMeta::new("rank", "Leveling", "Show your XP and level")
            .guide("Use /rank, then tap Leaderboard to see the top members")
    }

    async fn execute(&self, ctx: &CommandContext<'_>, _args: &[String]) -> Result<()> {
        let user = ctx.store.get_user(ctx.message.from.id).await?;
        let xp = user.as_ref().map(|u| u.xp).unwrap_or(0);
        let html = render_rank(&ctx.message.from.display_name(), xp);
        let keyboard = InlineKeyboard::new(vec![vec![InlineButton::callback(
            "🏆 Leaderboard",
            LEADERBOARD_CALLBACK,
        )]]);
        ctx.reply_with(&html, SendOptions::html().with_keyboard(keyboard))
            .await
    }

    fn supports_callback(&self) -> bool {
        true
    }

    async fn handle_callback(&self, ctx: &CallbackContext<'_>, args: &[String]) -> Result<()> {
        match args.first().map(String::as_str) {
            Some("top") => {}
            other => {
                return Err(Error::Command(format!("unknown rank action: {other:?}")));
            }
        }

        let query = ctx.query;
        let group = match query.chat.as_ref().filter(|c| c.kind.is_group()) {
            Some(chat) => Some((chat.id, chat.title_or_default())),
            None => ctx
                .store
                .get_user(query.from.id)
                .await?
                .and_then(|u| u.group_id)
                .map(|id| (id, "your group".to_string())),
        };

        let Some((group_id, group_name)) = group else {
            return ctx
                .answer(CallbackAnswer::alert(
                    "Chat in a group first to appear on a leaderboard!",
                ))
                .await;
        };

        let users = ctx
            .store
            .top_users_in_group(group_id, LEADERBOARD_SIZE)
            .await?;
        // Private chats share the user's id.
        let target = query
            .chat
            .as_ref()
            .map(|c| c.id)
            .unwrap_or(ChatId(query.from.id.0));

        ctx.messenger
            .send_message(target, &render_leaderboard(&group_name, &users), SendOptions::html())
            .await?;
        ctx.answer(CallbackAnswer::empty()).await
    }
}

pub fn render_rank(name: &str, xp: u64) -> String {
    let progress = LevelProgress::for_xp(xp);
    format!(
        "<b>⭐ {}</b>\nLevel: {}\nXP: {}\nNext level in: {} XP",
        escape_html(name),
        progress.level,
        xp,
        progress.xp_to_next()
    )
}

pub fn render_leaderboard(group_name: &str, users: &[UserRecord]) -> String {
    let mut out = format!("<b>🏆 Leaderboard for {}</b>\n\n", escape_html(group_name));
    if users.is_empty() {
        out.push_str("No activity yet.");
        return out;
    }
    let lines = users
        .iter()
        .enumerate()
        .map(|(i, u)| {
            format!(
                "{}. {} (Level {}): {} XP",
                i + 1,
                escape_html(&u.display_name),
                u.level(),
                u.xp
            )
        })
        .collect::<Vec<_>>();
    out.push_str(&lines.join("\n"));
    out
}

#[cfg(test)]
mod tests {
    use lisa_core::{
        commands::{CollisionPolicy, CommandRegistry},
        domain::UserId,
        memory_store::InMemoryStore,
        messaging::types::{ButtonAction, CallbackQuery},
        ports::Store,
        testing::{group_chat, private_chat, sender, text_message, RecordingMessenger},
    };

    use super::*;

    fn empty_registry() -> CommandRegistry {
        CommandRegistry::load(Vec::new(), CollisionPolicy::FailFast).unwrap()
    }

    #[test]
    fn rank_shows_level_and_remaining_xp() {
        assert_eq!(
            render_rank("lisa", 60),
            "<b>⭐ lisa</b>\nLevel: 2\nXP: 60\nNext level in: 140 XP"
        );
    }

    #[tokio::test]
    async fn execute_attaches_leaderboard_button() {
        let messenger = RecordingMessenger::new();
        let store = InMemoryStore::new();
        store.add_user_xp(UserId(5), "u", 10).await.unwrap();
        let registry = empty_registry();
        let message = text_message(private_chat(5), sender(5, "u"), "/rank");
        let ctx = CommandContext {
            messenger: &messenger,
            store: &store,
            registry: &registry,
            message: &message,
            prefix: '/',
        };

        RankCommand.execute(&ctx, &[]).await.unwrap();

        let sent = messenger.sent();
        assert!(sent[0].text.contains("XP: 10"));
        let keyboard = sent[0].options.keyboard.as_ref().unwrap();
        assert_eq!(
            keyboard.rows[0][0].action,
            ButtonAction::Callback(LEADERBOARD_CALLBACK.to_string())
        );
    }

    #[tokio::test]
    async fn leaderboard_callback_in_group_lists_top_users() {
        let messenger = RecordingMessenger::new();
        let store = InMemoryStore::new();
        for (id, xp) in [(1, 30), (2, 80)] {
            store.add_user_xp(UserId(id), &format!("u{id}"), xp).await.unwrap();
            store.set_user_group(UserId(id), ChatId(-100)).await.unwrap();
        }
        let registry = empty_registry();
        let query = CallbackQuery {
            callback_id: "cb".to_string(),
            from: sender(1, "u1"),
            chat: Some(group_chat(-100, "Fans")),
            data: LEADERBOARD_CALLBACK.to_string(),
        };
        let ctx = CallbackContext {
            messenger: &messenger,
            store: &store,
            registry: &registry,
            query: &query,
        };

        RankCommand
            .handle_callback(&ctx, &["top".to_string()])
            .await
            .unwrap();

        assert_eq!(
            messenger.texts_for(ChatId(-100)),
            vec!["<b>🏆 Leaderboard for Fans</b>\n\n1. u2 (Level 2): 80 XP\n2. u1 (Level 1): 30 XP"]
        );
        assert_eq!(messenger.answers(), vec![("cb".to_string(), CallbackAnswer::empty())]);
    }

    #[tokio::test]
    async fn leaderboard_without_any_group_alerts() {
        let messenger = RecordingMessenger::new();
        let store = InMemoryStore::new();
        let registry = empty_registry();
        let query = CallbackQuery {
            callback_id: "cb".to_string(),
            from: sender(1, "u1"),
            chat: Some(private_chat(1)),
            data: LEADERBOARD_CALLBACK.to_string(),
        };
        let ctx = CallbackContext {
            messenger: &messenger,
            store: &store,
            registry: &registry,
            query: &query,
        };

        RankCommand
            .handle_callback(&ctx, &["top".to_string()])
            .await
            .unwrap();

        assert!(messenger.sent().is_empty());
        assert!(messenger.answers()[0].1.show_alert);
    }

    #[tokio::test]
    async fn unknown_action_is_an_error() {
        let messenger = RecordingMessenger::new();
        let store = InMemoryStore::new();
        let registry = empty_registry();
        let query = CallbackQuery {
            callback_id: "cb".to_string(),
            from: sender(1, "u1"),
            chat: None,
            data: "rank:nope".to_string(),
        };
        let ctx = CallbackContext {
            messenger: &messenger,
            store: &store,
            registry: &registry,
            query: &query,
        };

        assert!(RankCommand
            .handle_callback(&ctx, &["nope".to_string()])
            .await
            .is_err());
    }
}

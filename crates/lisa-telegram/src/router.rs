use std::sync::Arc;

use teloxide::{dispatching::Dispatcher as TgDispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;

use lisa_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use lisa_core::{
    commands::{CollisionPolicy, Command, CommandRegistry},
    config::Config,
    dispatcher::{DispatchSettings, Dispatcher},
    domain::UserId,
    messaging::port::MessagingPort,
    ports::Store,
    scheduler::WeeklyReporter,
};

use crate::{convert, TelegramMessenger};

/// Wire the bot together and long-poll until Ctrl-C.
///
/// `build_commands` receives the reporter so owner commands can trigger it.
pub async fn run_polling<F>(
    cfg: Arc<Config>,
    store: Arc<dyn Store>,
    build_commands: F,
) -> anyhow::Result<()>
where
    F: FnOnce(Arc<WeeklyReporter>) -> lisa_core::Result<Vec<Arc<dyn Command>>>,
{
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let bot_id = match bot.get_me().await {
        Ok(me) => {
            tracing::info!(username = %me.username(), "{} started", cfg.bot_name);
            Some(UserId(me.id.0 as i64))
        }
        Err(e) => {
            tracing::warn!("failed to fetch bot identity: {e}");
            None
        }
    };
    tracing::info!(owners = cfg.owner_ids.len(), prefix = %cfg.command_prefix, "configuration loaded");

    // Throttle outbound calls; the adapter still retries once on 429 RetryAfter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let reporter = Arc::new(WeeklyReporter::new(
        store.clone(),
        messenger.clone(),
        cfg.report_top_n,
        &cfg.report_cron,
    )?);
    let registry = Arc::new(CommandRegistry::load(
        build_commands(reporter.clone())?,
        CollisionPolicy::FailFast,
    )?);

    let mut dispatcher = Dispatcher::new(
        registry,
        store,
        messenger,
        DispatchSettings::from_config(&cfg),
    );
    if let Some(id) = bot_id {
        dispatcher = dispatcher.with_bot_id(id);
    }
    let dispatcher = Arc::new(dispatcher);

    let cancel = CancellationToken::new();
    if let Some(next) = reporter.next_run() {
        tracing::info!(next = %next, "weekly report scheduled");
    }
    let reporter_task = reporter.start(cancel.clone());

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(Update::filter_message().endpoint(handle_message));

    TgDispatcher::builder(bot, handler)
        .dependencies(dptree::deps![dispatcher])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("shutting down");
    cancel.cancel();
    if let Err(e) = reporter_task.await {
        tracing::warn!("reporter task ended abnormally: {e}");
    }

    Ok(())
}

async fn handle_message(msg: Message, dispatcher: Arc<Dispatcher>) -> ResponseResult<()> {
    if let Some(event) = convert::event_from_message(&msg) {
        dispatcher.handle(event).await;
    }
    Ok(())
}

async fn handle_callback(q: CallbackQuery, dispatcher: Arc<Dispatcher>) -> ResponseResult<()> {
    dispatcher.handle(convert::event_from_callback(&q)).await;
    Ok(())
}

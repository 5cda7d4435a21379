mod config;
mod keyword;

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ChatKind;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use config::Config;
use keyword::allowlist::AllowListWatcher;
use keyword::{AllowList, IncomingMessage, KeywordEngine, TelegramClient, TriggerRepository};

struct BotState {
    engine: KeywordEngine,
    telegram: TelegramClient,
    /// Stops the allow-list reload task when the bot shuts down.
    _watcher: AllowListWatcher,
}

impl BotState {
    async fn new(config: &Config, bot: &Bot) -> Result<Self, keyword::store::StoreError> {
        let allow_list = Arc::new(AllowList::open(&config.allowed_groups_file).await?);
        info!("Allowed groups: {:?}", allow_list.list().await);

        let watcher = allow_list.clone().watch(config.reload_interval);
        info!(
            "Watching {:?} every {}s",
            allow_list.path(),
            config.reload_interval.as_secs()
        );

        let triggers = TriggerRepository::new(&config.triggers_dir);
        let engine = KeywordEngine::new(allow_list, triggers);

        Ok(Self {
            engine,
            telegram: TelegramClient::new(bot.clone(), config.dry_run),
            _watcher: watcher,
        })
    }
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "keyword-reply.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("keyword-reply.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting keyword-reply...");
    info!("Loaded config from {config_path}");
    if config.dry_run {
        info!("DRY RUN mode enabled");
    }

    let state = match BotState::new(&config, &bot).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to open allow-list: {e}");
            std::process::exit(1);
        }
    };

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_new_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_new_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    // Only group chats have an allow-list entry to check against.
    if !matches!(msg.chat.kind, ChatKind::Public(_)) {
        return Ok(());
    }

    let Some(incoming) = telegram_to_incoming(&msg) else {
        return Ok(());
    };

    match state.engine.handle(&incoming).await {
        Ok(Some(reply)) => {
            state
                .telegram
                .send_reply(msg.chat.id.0, &reply, Some(msg.id.0 as i64))
                .await;
        }
        Ok(None) => {}
        Err(e) => error!("Failed to handle message {} in {}: {e}", msg.id.0, msg.chat.id.0),
    }

    Ok(())
}

/// Convert a Telegram message into the engine's inbound form.
///
/// Photos contribute the file id of their largest size; the caption stands in
/// for the text.
fn telegram_to_incoming(msg: &Message) -> Option<IncomingMessage> {
    let user = msg.from.as_ref()?;
    let text = msg.text().or(msg.caption()).unwrap_or("").to_string();

    let mut incoming = IncomingMessage::text(msg.chat.id.0.to_string(), user.id.0.to_string(), text);
    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        incoming = incoming.with_image(photo.file.id.0.clone());
    }

    if incoming.parts.is_empty() {
        return None;
    }
    Some(incoming)
}

use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::info;

use paperboy_core::{audit::AuditLogger, config::Config, flow::PrintFlow, spooler::PrintSpooler};

use crate::{handlers, TelegramFileFetcher, TelegramMessenger};

#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<PrintFlow>,
    pub fetcher: TelegramFileFetcher,
    /// Bot username without the leading `@`.
    pub bot_username: String,
}

pub async fn run_polling(
    cfg: Arc<Config>,
    spooler: Arc<dyn PrintSpooler>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let me = bot.get_me().await?;
    let bot_username = me.username().to_string();
    info!(
        bot = %bot_username,
        cups_server = %cfg.cups_server,
        "paperboy started"
    );

    let audit = AuditLogger::new(cfg.audit_log_path.clone(), cfg.audit_log_json);
    if let Some(path) = audit.path() {
        info!(path = %path.display(), "audit log enabled");
    }

    let messenger = Arc::new(TelegramMessenger::new(bot.clone()));
    let flow = Arc::new(PrintFlow::new(&cfg, spooler, messenger, audit));

    let state = Arc::new(AppState {
        flow,
        fetcher: TelegramFileFetcher::new(bot.clone()),
        bot_username,
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

use std::sync::Arc;

use paperboy_core::config::Config;
use paperboy_ipp::IppSpooler;

#[tokio::main]
async fn main() -> Result<(), paperboy_core::Error> {
    paperboy_core::logging::init("paperboy")?;

    let cfg = Arc::new(Config::load()?);

    let spooler = Arc::new(IppSpooler::new(
        &cfg.cups_server,
        cfg.cups_user.clone(),
        cfg.ipp_timeout,
    )?);
    tracing::info!(uri = spooler.base_uri(), "using CUPS server");

    paperboy_telegram::router::run_polling(cfg, spooler)
        .await
        .map_err(|e| paperboy_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}

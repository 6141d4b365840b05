use std::sync::Arc;

use tracing::info;

use telemirror_core::{
    config::Config,
    dispatcher::MirrorDispatcher,
    messaging::{port::RelayPort, throttled::ThrottledRelay},
    router::MirrorRouter,
    store::{IdentityStore, JsonFileStore, MemoryStore},
};
use telemirror_telegram::TelegramRelay;

#[tokio::main]
async fn main() -> Result<(), telemirror_core::Error> {
    telemirror_core::logging::init("telemirror")?;

    let cfg = Arc::new(Config::load()?);

    let store: Arc<dyn IdentityStore> = if cfg.use_memory_db {
        info!("using in-memory identity store");
        Arc::new(MemoryStore::new())
    } else {
        info!(path = %cfg.database_path.display(), "using file identity store");
        Arc::new(JsonFileStore::open(&cfg.database_path)?)
    };

    // Rate-limit the raw Bot API relay; RetryAfter is still retried inside it.
    let raw_relay: Arc<dyn RelayPort> =
        Arc::new(TelegramRelay::from_token(cfg.telegram_bot_token.clone()));
    let relay: Arc<dyn RelayPort> = Arc::new(ThrottledRelay::new(raw_relay, cfg.throttle()));

    let router = Arc::new(MirrorRouter::new(cfg.mirror_mapping.clone()));
    let dispatcher = Arc::new(MirrorDispatcher::new(
        router,
        cfg.build_filter(),
        relay,
        store,
    ));

    telemirror_telegram::router::run_polling(cfg, dispatcher)
        .await
        .map_err(|e| telemirror_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}

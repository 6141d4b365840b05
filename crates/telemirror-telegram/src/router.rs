use std::{sync::Arc, time::Duration};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{info, warn};

use telemirror_core::{
    config::Config,
    dispatcher::MirrorDispatcher,
    messaging::types::{EventKind, MirrorEvent},
};

use crate::handlers::{self, album::AlbumBuffer};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<MirrorDispatcher>,
    pub albums: Arc<AlbumBuffer>,
}

impl AppState {
    pub fn new(dispatcher: Arc<MirrorDispatcher>, album_timeout: Duration) -> Self {
        let flush_to = dispatcher.clone();
        let albums = AlbumBuffer::new(
            album_timeout,
            Arc::new(move |chat_id, messages| {
                flush_to.spawn(MirrorEvent::Album { chat_id, messages });
            }),
        );
        Self { dispatcher, albums }
    }
}

pub async fn run_polling(cfg: Arc<Config>, dispatcher: Arc<MirrorDispatcher>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "telemirror started"),
        Err(e) => warn!(error = %e, "get_me failed"),
    }
    let sources: Vec<i64> = dispatcher
        .router()
        .source_chats()
        .iter()
        .map(|c| c.0)
        .collect();
    info!(?sources, "mirroring source chats");

    let subs = cfg.subscriptions();
    if subs.enabled(EventKind::MessageDeleted) {
        // The Bot API never reports deletions.
        info!("delete mirroring unavailable over the Bot API; deletions are not relayed");
    }

    let state = Arc::new(AppState::new(dispatcher, cfg.album_timeout));

    let mut handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_new))
        .branch(Update::filter_channel_post().endpoint(handlers::handle_new));
    if subs.enabled(EventKind::MessageEdited) {
        handler = handler
            .branch(Update::filter_edited_message().endpoint(handlers::handle_edited))
            .branch(Update::filter_edited_channel_post().endpoint(handlers::handle_edited));
    } else {
        info!("edit mirroring disabled");
    }

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("telemirror stopped");
    Ok(())
}

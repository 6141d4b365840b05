use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    messaging::{
        port::RelayPort,
        types::{IncomingMessage, MediaRef, NewPoll},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* relay calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls per target chat (Telegram 1 msg/sec style limits).
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// RelayPort decorator that rate-limits outbound calls.
///
/// Fan-out to many targets bursts quickly; this spaces the calls out so the
/// platform's flood control is hit less often. It does not guarantee zero 429s.
pub struct ThrottledRelay {
    inner: Arc<dyn RelayPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<i64, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledRelay {
    pub fn new(inner: Arc<dyn RelayPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, chat_id: i64) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        map.entry(chat_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle_chat(&self, chat_id: ChatId) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = {
            let lim = self.limiter_for_chat(chat_id.0).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(chat_wait);
        if wait > Duration::ZERO {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl RelayPort for ThrottledRelay {
    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &IncomingMessage,
    ) -> Result<Option<MessageRef>> {
        self.throttle_chat(chat_id).await;
        self.inner.send_message(chat_id, message).await
    }

    async fn send_poll(&self, chat_id: ChatId, poll: &NewPoll) -> Result<Option<MessageRef>> {
        self.throttle_chat(chat_id).await;
        self.inner.send_poll(chat_id, poll).await
    }

    async fn send_album(
        &self,
        chat_id: ChatId,
        captions: &[String],
        files: &[MediaRef],
    ) -> Result<Option<Vec<MessageRef>>> {
        self.throttle_chat(chat_id).await;
        self.inner.send_album(chat_id, captions, files).await
    }

    async fn edit_message(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.throttle_chat(msg.chat_id).await;
        self.inner.edit_message(msg, text).await
    }

    async fn delete_messages(&self, chat_id: ChatId, ids: &[MessageId]) -> Result<()> {
        self.throttle_chat(chat_id).await;
        self.inner.delete_messages(chat_id, ids).await
    }
}

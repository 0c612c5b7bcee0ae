//! The fan-out delivery engine.
//!
//! One publisher per channel; the broadcaster persists each post before any
//! delivery is attempted, then dispatches to every live subscriber across a
//! bounded worker pool. Per-recipient failures are contained: they are
//! logged, counted, and never disturb sibling deliveries. Catch-up replay is
//! the one strictly ordered path.

use crate::cache::PreviewCache;
use crate::error::EngineError;
use crate::traits::{
    BatchForwarder, DeliveryError, DeliveryTransport, PreviewResolver, Store,
};
use crier_model::{now_secs, BatchOutcome, Channel, Content, InboundMessage, LinkPreview, Subscriber};
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shortest elapsed time used for throughput accounting. Guards the
/// division when a fan-out completes within the clock's resolution.
const MIN_ELAPSED_SECS: f64 = 0.001;

/// Broadcaster configuration.
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Size of the process-wide delivery worker pool, shared by all
    /// channels.
    pub fanout_workers: usize,
    /// Delay between consecutive messages of one catch-up replay.
    pub catchup_pacing: Duration,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            fanout_workers: 20,
            catchup_pacing: Duration::from_millis(500),
        }
    }
}

/// Aggregate outcome of one fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryReport {
    /// Recipients resolved at dispatch time.
    pub attempted: usize,
    /// Successful deliveries.
    pub delivered: usize,
    /// Failed deliveries, timeouts and gone recipients included.
    pub failed: usize,
    /// Wall-clock duration of the fan-out.
    pub elapsed_ms: u64,
}

impl DeliveryReport {
    /// Delivered messages per second.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        let secs = (self.elapsed_ms as f64 / 1000.0).max(MIN_ELAPSED_SECS);
        self.delivered as f64 / secs
    }

    /// Human-readable summary, sent to the admin after each publish.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Delivered: {}, failed: {} in: {:.2} sec, avg: {:.2} msg/sec",
            self.delivered,
            self.failed,
            self.elapsed_ms as f64 / 1000.0,
            self.throughput()
        )
    }
}

/// One delivery operation, applied per recipient by the fan-out pool.
type DeliveryOp = Arc<
    dyn Fn(Arc<dyn DeliveryTransport>, String) -> BoxFuture<'static, Result<(), DeliveryError>>
        + Send
        + Sync,
>;

/// How recipients of a publish are dispatched.
enum Dispatch {
    /// Deliver to each recipient from this process.
    Direct,
    /// Partition recipients into fixed-size batches and forward each batch
    /// to a sibling node for local delivery there.
    Batched {
        forwarder: Arc<dyn BatchForwarder>,
        batch_size: usize,
    },
}

/// The fan-out delivery engine.
///
/// Holds no durable state of its own: everything lives in the store, plus a
/// rebuildable in-memory preview cache and the bounded worker pool.
pub struct Broadcaster {
    store: Arc<dyn Store>,
    transport: Arc<dyn DeliveryTransport>,
    previews: PreviewCache,
    dispatch: Dispatch,
    pool: Arc<Semaphore>,
    config: BroadcasterConfig,
}

impl Broadcaster {
    /// Create a broadcaster with default configuration and direct dispatch.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn DeliveryTransport>,
        resolver: Arc<dyn PreviewResolver>,
    ) -> Self {
        Self::with_config(store, transport, resolver, BroadcasterConfig::default())
    }

    /// Create a broadcaster with custom configuration.
    #[must_use]
    pub fn with_config(
        store: Arc<dyn Store>,
        transport: Arc<dyn DeliveryTransport>,
        resolver: Arc<dyn PreviewResolver>,
        config: BroadcasterConfig,
    ) -> Self {
        let pool = Arc::new(Semaphore::new(config.fanout_workers.max(1)));
        Self {
            store,
            transport,
            previews: PreviewCache::new(resolver),
            dispatch: Dispatch::Direct,
            pool,
            config,
        }
    }

    /// Switch to batched dispatch across sibling nodes.
    ///
    /// Direct per-recipient dispatch stays the default; batching is a
    /// horizontal-scaling optimization, not a correctness requirement.
    #[must_use]
    pub fn batched(mut self, forwarder: Arc<dyn BatchForwarder>, batch_size: usize) -> Self {
        self.dispatch = Dispatch::Batched {
            forwarder,
            batch_size: batch_size.max(1),
        };
        self
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &BroadcasterConfig {
        &self.config
    }

    /// Publish content into a channel, generating a fresh message id.
    ///
    /// # Errors
    ///
    /// See [`Broadcaster::publish_with_id`].
    pub async fn publish(
        &self,
        channel_name: &str,
        content: Content,
    ) -> Result<DeliveryReport, EngineError> {
        self.publish_with_id(channel_name, Uuid::new_v4(), content)
            .await
    }

    /// Publish content into a channel under a caller-supplied message id.
    ///
    /// The broadcast row is persisted before any delivery is attempted, so a
    /// crash mid-fan-out never loses the post from history or catch-up.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ChannelNotFound`] for unknown channels,
    /// [`EngineError::NotActivated`] while the channel has no admin, and
    /// [`EngineError::Store`] when persisting the broadcast fails. Delivery
    /// failures never error; they are aggregated into the report.
    pub async fn publish_with_id(
        &self,
        channel_name: &str,
        message_id: Uuid,
        content: Content,
    ) -> Result<DeliveryReport, EngineError> {
        let channel = self
            .store
            .channel(channel_name)
            .await?
            .ok_or_else(|| EngineError::ChannelNotFound(channel_name.to_string()))?;
        let Some(admin_id) = channel.admin_id.clone() else {
            return Err(EngineError::NotActivated(channel.name));
        };

        // Synchronous by design: every recipient must see the same resolution.
        let preview = match &content {
            Content::Link { url } => self.previews.resolve(url).await,
            _ => None,
        };

        let broadcast = self
            .store
            .insert_broadcast(channel_name, message_id, &content)
            .await?;

        let recipients = self.recipient_ids(&channel).await?;
        debug!(
            channel = %channel_name,
            id = broadcast.id,
            kind = content.kind(),
            recipients = recipients.len(),
            "dispatching broadcast"
        );

        let content = Arc::new(content);
        let report = match &self.dispatch {
            Dispatch::Direct => {
                self.fan(
                    recipients,
                    Some(broadcast.id),
                    content_op(Arc::clone(&content), preview),
                )
                .await
            }
            Dispatch::Batched {
                forwarder,
                batch_size,
            } => {
                self.fan_batched(Arc::clone(forwarder), *batch_size, recipients, &content)
                    .await
            }
        };

        info!(
            channel = %channel_name,
            id = broadcast.id,
            delivered = report.delivered,
            failed = report.failed,
            elapsed_ms = report.elapsed_ms,
            "broadcast complete"
        );
        self.notify_admin(&admin_id, &report.summary()).await;

        Ok(report)
    }

    /// Retract a published broadcast.
    ///
    /// Tombstones the matching broadcast row, then fans a delete instruction
    /// to current recipients with the same isolated dispatch as a publish.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BroadcastNotFound`] when no broadcast with
    /// this message id exists in the channel.
    pub async fn retract(
        &self,
        channel_name: &str,
        message_id: Uuid,
    ) -> Result<DeliveryReport, EngineError> {
        let channel = self
            .store
            .channel(channel_name)
            .await?
            .ok_or_else(|| EngineError::ChannelNotFound(channel_name.to_string()))?;

        if !self
            .store
            .tombstone_broadcast(channel_name, message_id)
            .await?
        {
            return Err(EngineError::BroadcastNotFound(message_id));
        }
        info!(channel = %channel_name, %message_id, "broadcast retracted");

        let recipients = self.recipient_ids(&channel).await?;
        let op: DeliveryOp = Arc::new(move |transport, bot_id| {
            Box::pin(async move { transport.delete_message(&bot_id, message_id).await })
        });
        Ok(self.fan(recipients, None, op).await)
    }

    /// Replay missed broadcasts to one subscriber, oldest first.
    ///
    /// The cursor is advanced *before* delivery starts: a crash mid-replay
    /// must not flood the subscriber with duplicates on retry (at-most-once
    /// catch-up). Replay runs on the calling task, strictly in order, with a
    /// fixed pacing delay between messages.
    ///
    /// Returns the number of broadcasts delivered. `limit == 0` is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SubscriberNotFound`] for unknown bot ids and
    /// [`EngineError::Store`] on persistence failures.
    pub async fn catch_up(&self, bot_id: &str, limit: u32) -> Result<usize, EngineError> {
        if limit == 0 {
            return Ok(0);
        }
        let subscriber = self
            .store
            .subscriber(bot_id)
            .await?
            .ok_or_else(|| EngineError::SubscriberNotFound(bot_id.to_string()))?;

        let pending = self
            .store
            .broadcasts_after(&subscriber.channel, subscriber.cursor, limit)
            .await?;
        let Some(newest) = pending.last() else {
            return Ok(0);
        };
        self.store.set_cursor(bot_id, newest.id).await?;

        let mut sent = 0;
        for (i, broadcast) in pending.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.catchup_pacing).await;
            }
            let preview = match &broadcast.content {
                Content::Link { url } => self.previews.resolve(url).await,
                _ => None,
            };
            match dispatch_content(
                self.transport.as_ref(),
                bot_id,
                &broadcast.content,
                preview.as_ref(),
            )
            .await
            {
                Ok(()) => sent += 1,
                Err(DeliveryError::Gone) => {
                    info!(bot = %bot_id, "recipient gone during catch-up, dropping subscription");
                    if let Err(e) = self.store.remove_subscriber(bot_id).await {
                        warn!(bot = %bot_id, error = %e, "failed to drop gone subscriber");
                    }
                    break;
                }
                Err(e) => {
                    warn!(bot = %bot_id, id = broadcast.id, error = %e, "catch-up delivery failed");
                }
            }
        }
        debug!(bot = %bot_id, sent, cursor = newest.id, "catch-up complete");
        Ok(sent)
    }

    /// Deliver one forwarded batch locally, under the same per-recipient
    /// isolation rules as a publish. Used by the batch receiving endpoint.
    pub async fn deliver_batch(&self, recipients: &[String], content: &Content) -> BatchOutcome {
        let preview = match content {
            Content::Link { url } => self.previews.resolve(url).await,
            _ => None,
        };
        let op = content_op(Arc::new(content.clone()), preview);
        let report = self.fan(recipients.to_vec(), None, op).await;
        BatchOutcome {
            delivered: report.delivered,
            failed: report.failed,
        }
    }

    /// Log subscriber-authored content and forward it to the admin.
    ///
    /// The inbound log is always appended; the forward is skipped while the
    /// channel is muted and is best-effort otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ChannelNotFound`] for unknown channels and
    /// [`EngineError::Store`] when the log append fails.
    pub async fn forward_inbound(
        &self,
        channel_name: &str,
        sender: &Subscriber,
        content: &Content,
    ) -> Result<(), EngineError> {
        let channel = self
            .store
            .channel(channel_name)
            .await?
            .ok_or_else(|| EngineError::ChannelNotFound(channel_name.to_string()))?;

        let (body, mime) = match content {
            Content::Text { body } => (Some(body.clone()), "text/plain".to_string()),
            Content::Link { url } => (Some(url.clone()), "text/plain".to_string()),
            other => (
                None,
                other
                    .asset()
                    .map(|a| a.mime.clone())
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
            ),
        };
        self.store
            .append_inbound(&InboundMessage {
                channel: channel.name.clone(),
                bot_id: sender.bot_id.clone(),
                user_id: sender.origin_id.clone(),
                body,
                mime,
                created_at: now_secs(),
            })
            .await?;

        if channel.muted {
            return Ok(());
        }
        let Some(admin_id) = &channel.admin_id else {
            return Ok(());
        };

        match content {
            Content::Text { body } => {
                self.notify_admin(admin_id, &format!("**@{}** wrote: _{}_", sender.handle, body))
                    .await;
            }
            Content::Link { url } => {
                self.notify_admin(admin_id, &format!("**@{}** wrote: _{}_", sender.handle, url))
                    .await;
            }
            other => {
                self.notify_admin(admin_id, &format!("**@{}** has sent:", sender.handle))
                    .await;
                if let Some(asset) = other.asset() {
                    if let Err(e) = self.transport.send_asset(admin_id, asset).await {
                        warn!(channel = %channel.name, error = %e, "inbound asset forward failed");
                    }
                }
            }
        }
        Ok(())
    }

    /// Send a membership event ping ("joined", "left", "liked") to the
    /// admin, unless the channel is muted.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ChannelNotFound`] for unknown channels.
    pub async fn announce(&self, channel_name: &str, text: &str) -> Result<(), EngineError> {
        let channel = self
            .store
            .channel(channel_name)
            .await?
            .ok_or_else(|| EngineError::ChannelNotFound(channel_name.to_string()))?;
        if channel.muted {
            return Ok(());
        }
        if let Some(admin_id) = &channel.admin_id {
            self.notify_admin(admin_id, text).await;
        }
        Ok(())
    }

    /// Greet a conversation that just opened.
    ///
    /// The admin gets the control-conversation banner; subscribers get the
    /// intro picture (when configured) and the welcome text.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ChannelNotFound`] for unknown channels.
    pub async fn send_intro(&self, channel_name: &str, bot_id: &str) -> Result<(), EngineError> {
        let channel = self
            .store
            .channel(channel_name)
            .await?
            .ok_or_else(|| EngineError::ChannelNotFound(channel_name.to_string()))?;

        if channel.admin_id.as_deref() == Some(bot_id) {
            let banner = format!(
                "This is the admin conversation for **{0}**.\n\
                 Use it to broadcast into the channel; don't leave or delete it.\n\
                 Type `/help` for commands",
                channel.name
            );
            self.notify_admin(bot_id, &banner).await;
            return Ok(());
        }

        if let Some(url) = &channel.intro_media_url {
            if let Some(preview) = self.previews.resolve(url).await {
                if let Some(image) = &preview.image {
                    if let Err(e) = self.transport.send_asset(bot_id, image).await {
                        warn!(bot = %bot_id, error = %e, "intro picture delivery failed");
                    }
                }
            }
        }
        let label = channel
            .welcome_text
            .clone()
            .unwrap_or_else(|| format!("This is the **{}** channel", channel.name));
        if let Err(e) = self
            .transport
            .send_text(bot_id, &format!("{label}\nType `/help` for commands"))
            .await
        {
            warn!(bot = %bot_id, error = %e, "intro delivery failed");
        }
        Ok(())
    }

    /// Live recipients of a channel: non-muted subscribers minus the admin.
    async fn recipient_ids(&self, channel: &Channel) -> Result<Vec<String>, EngineError> {
        let admin = channel.admin_id.clone().unwrap_or_default();
        Ok(self
            .store
            .subscribers(&channel.name)
            .await?
            .into_iter()
            .filter(|s| !s.muted && s.bot_id != admin)
            .map(|s| s.bot_id)
            .collect())
    }

    /// Run one delivery operation against every recipient on the bounded
    /// pool and aggregate the outcome.
    ///
    /// Successful deliveries advance the recipient's cursor to `advance_to`;
    /// gone recipients are dropped from the subscriber table. One task's
    /// failure or panic never disturbs its siblings.
    async fn fan(
        &self,
        recipients: Vec<String>,
        advance_to: Option<i64>,
        op: DeliveryOp,
    ) -> DeliveryReport {
        let attempted = recipients.len();
        if attempted == 0 {
            return DeliveryReport::default();
        }

        let delivered = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let started = Instant::now();

        let mut tasks = Vec::with_capacity(attempted);
        for bot_id in recipients {
            let pool = Arc::clone(&self.pool);
            let op = Arc::clone(&op);
            let store = Arc::clone(&self.store);
            let transport = Arc::clone(&self.transport);
            let delivered = Arc::clone(&delivered);
            let failed = Arc::clone(&failed);
            tasks.push(tokio::spawn(async move {
                let Ok(_permit) = pool.acquire_owned().await else {
                    failed.fetch_add(1, Ordering::Relaxed);
                    return;
                };
                match op(transport, bot_id.clone()).await {
                    Ok(()) => {
                        delivered.fetch_add(1, Ordering::Relaxed);
                        if let Some(cursor) = advance_to {
                            if let Err(e) = store.set_cursor(&bot_id, cursor).await {
                                warn!(bot = %bot_id, error = %e, "cursor update failed");
                            }
                        }
                    }
                    Err(DeliveryError::Gone) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        info!(bot = %bot_id, "recipient gone, dropping subscription");
                        if let Err(e) = store.remove_subscriber(&bot_id).await {
                            warn!(bot = %bot_id, error = %e, "failed to drop gone subscriber");
                        }
                    }
                    Err(e) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        warn!(bot = %bot_id, error = %e, "delivery failed");
                    }
                }
            }));
        }

        for task in tasks {
            // A panicked delivery task counts as one failed recipient.
            if task.await.is_err() {
                failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        DeliveryReport {
            attempted,
            delivered: delivered.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Partition recipients into batches and forward each to a sibling
    /// node, parallelized on the same bounded pool.
    async fn fan_batched(
        &self,
        forwarder: Arc<dyn BatchForwarder>,
        batch_size: usize,
        recipients: Vec<String>,
        content: &Arc<Content>,
    ) -> DeliveryReport {
        let attempted = recipients.len();
        if attempted == 0 {
            return DeliveryReport::default();
        }

        let delivered = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let started = Instant::now();

        let mut tasks = Vec::new();
        for chunk in recipients.chunks(batch_size.max(1)) {
            let chunk = chunk.to_vec();
            let chunk_len = chunk.len();
            let pool = Arc::clone(&self.pool);
            let forwarder = Arc::clone(&forwarder);
            let content = Arc::clone(content);
            let delivered = Arc::clone(&delivered);
            let failed = Arc::clone(&failed);
            tasks.push((
                chunk_len,
                tokio::spawn(async move {
                    let Ok(_permit) = pool.acquire_owned().await else {
                        failed.fetch_add(chunk.len(), Ordering::Relaxed);
                        return;
                    };
                    match forwarder.forward(&chunk, &content).await {
                        Ok(outcome) => {
                            delivered.fetch_add(outcome.delivered, Ordering::Relaxed);
                            failed.fetch_add(outcome.failed, Ordering::Relaxed);
                        }
                        Err(e) => {
                            failed.fetch_add(chunk.len(), Ordering::Relaxed);
                            warn!(batch = chunk.len(), error = %e, "batch forward failed");
                        }
                    }
                }),
            ));
        }

        for (chunk_len, task) in tasks {
            if task.await.is_err() {
                failed.fetch_add(chunk_len, Ordering::Relaxed);
            }
        }

        DeliveryReport {
            attempted,
            delivered: delivered.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Best-effort text to the admin conversation. Failures are logged and
    /// never propagate.
    async fn notify_admin(&self, admin_id: &str, text: &str) {
        if let Err(e) = self.transport.send_text(admin_id, text).await {
            warn!(admin = %admin_id, error = %e, "admin notification failed");
        }
    }
}

/// Delivery operation that dispatches one resolved content item.
fn content_op(content: Arc<Content>, preview: Option<LinkPreview>) -> DeliveryOp {
    let preview = Arc::new(preview);
    Arc::new(move |transport, bot_id| {
        let content = Arc::clone(&content);
        let preview = Arc::clone(&preview);
        Box::pin(async move {
            dispatch_content(transport.as_ref(), &bot_id, &content, (*preview).as_ref()).await
        })
    })
}

/// The single dispatch point from the content union onto the transport.
async fn dispatch_content(
    transport: &dyn DeliveryTransport,
    recipient: &str,
    content: &Content,
    preview: Option<&LinkPreview>,
) -> Result<(), DeliveryError> {
    match content {
        Content::Text { body } => transport.send_text(recipient, body).await,
        Content::Image { asset, .. }
        | Content::Audio { asset, .. }
        | Content::Video { asset, .. } => transport.send_asset(recipient, asset).await,
        Content::Link { url } => {
            let title = preview.map_or(url.as_str(), |p| p.title.as_str());
            let image = preview.and_then(|p| p.image.as_ref());
            transport.send_link_preview(recipient, url, title, image).await
        }
    }
}

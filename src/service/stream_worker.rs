use crate::bus::EVENT_FIELD;
use crate::config::AppConfig;
use crate::domain::events::InvalidFact;
use crate::service::order_placed_consumer::{ConsumeError, HandleOutcome, OrderPlacedConsumer};
use anyhow::Result;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamReadReply};
use std::time::{Duration, Instant};

const MAX_CLAIM_PAGES: usize = 20;

/// One consumer-group slot on the inbound order stream.
///
/// Entries are acknowledged only once the consumer returns an outcome. Anything
/// left unacknowledged stays in this consumer's pending list; the list is re-read
/// (from id `0`) once `retry_backoff` has passed, while new entries keep flowing
/// in between. Entries idle under other consumer names are taken over with
/// `XAUTOCLAIM` every `claim_interval`.
#[derive(Clone)]
pub struct StreamWorker {
    pub consumer: OrderPlacedConsumer,
    pub redis_client: redis::Client,
    pub stream_key: String,
    pub group: String,
    pub consumer_name: String,
    pub dead_letter_stream: String,
    pub batch_size: usize,
    pub block_ms: usize,
    pub retry_backoff: Duration,
    pub claim_idle: Duration,
    pub claim_interval: Duration,
}

/// What the transport does with one stream entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Ack,
    DeadLetter(InvalidFact),
    Retry(ConsumeError),
}

pub fn disposition(outcome: Result<HandleOutcome, ConsumeError>) -> Disposition {
    match outcome {
        Ok(HandleOutcome::Rejected(invalid)) => Disposition::DeadLetter(invalid),
        Ok(HandleOutcome::Processed(_))
        | Ok(HandleOutcome::AlreadyProcessed)
        | Ok(HandleOutcome::Republished(_)) => Disposition::Ack,
        Err(e) => Disposition::Retry(e),
    }
}

pub fn entry_payload(entry: &StreamId) -> Option<String> {
    entry
        .map
        .get(EVENT_FIELD)
        .and_then(|v| redis::from_redis_value::<String>(v).ok())
}

/// Runs the consumer on a raw entry payload. A missing payload is dead-lettered.
pub async fn dispose(consumer: &OrderPlacedConsumer, raw: Option<&str>) -> Disposition {
    let outcome = match raw {
        Some(payload) => consumer.handle_payload(payload).await,
        None => Ok(HandleOutcome::Rejected(InvalidFact::MissingPayload)),
    };
    disposition(outcome)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub acked: usize,
    pub dead_lettered: usize,
    pub left_pending: usize,
}

impl TickReport {
    fn is_empty(&self) -> bool {
        self.acked + self.dead_lettered + self.left_pending == 0
    }

    /// When the pending list should next be re-read. New entries are read on
    /// every tick regardless of this deadline.
    pub fn next_backlog_due(&self, current: Instant, now: Instant, backoff: Duration) -> Instant {
        if self.left_pending > 0 {
            now + backoff
        } else {
            current
        }
    }
}

impl StreamWorker {
    pub fn for_slot(cfg: &AppConfig, consumer: OrderPlacedConsumer, redis_client: redis::Client, slot: usize) -> Self {
        Self {
            consumer,
            redis_client,
            stream_key: cfg.order_placed_stream.clone(),
            group: cfg.order_placed_group.clone(),
            consumer_name: format!("{}-{}", cfg.consumer_name, slot),
            dead_letter_stream: cfg.dead_letter_stream.clone(),
            batch_size: 50,
            block_ms: 2000,
            retry_backoff: Duration::from_millis(cfg.retry_backoff_ms),
            claim_idle: Duration::from_millis(cfg.claim_idle_ms),
            claim_interval: Duration::from_millis(cfg.claim_interval_ms),
        }
    }

    /// Creates the consumer group (and the stream) if it does not exist yet.
    pub async fn ensure_group(&self) -> Result<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let created: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(_) => {
                tracing::info!("created consumer group {} on {}", self.group, self.stream_key);
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn run(self) {
        tracing::info!(consumer = %self.consumer_name, stream = %self.stream_key, "order placed worker started");
        let mut backlog_due = Instant::now();
        let mut claim_due = Instant::now();

        loop {
            if Instant::now() >= claim_due {
                match self.claim_idle_entries().await {
                    Ok(0) => {}
                    Ok(claimed) => {
                        tracing::info!(consumer = %self.consumer_name, claimed, "claimed idle order placed entries");
                        backlog_due = Instant::now();
                    }
                    Err(err) => {
                        tracing::error!(consumer = %self.consumer_name, "xautoclaim failed: {}", err);
                    }
                }
                claim_due = Instant::now() + self.claim_interval;
            }

            let read_backlog = Instant::now() >= backlog_due;
            match self.tick(read_backlog).await {
                Ok(report) => {
                    if !report.is_empty() {
                        tracing::info!(
                            consumer = %self.consumer_name,
                            acked = report.acked,
                            dead_lettered = report.dead_lettered,
                            left_pending = report.left_pending,
                            "order placed batch handled"
                        );
                    }
                    backlog_due = report.next_backlog_due(backlog_due, Instant::now(), self.retry_backoff);
                }
                Err(err) => {
                    tracing::error!(consumer = %self.consumer_name, "order placed worker error: {}", err);
                    tokio::time::sleep(self.retry_backoff).await;
                }
            }
        }
    }

    async fn tick(&self, read_backlog: bool) -> Result<TickReport> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let mut report = TickReport::default();

        if read_backlog {
            // Page through the whole pending list so failing entries at its
            // head cannot hide the ones after them.
            let mut from = "0".to_string();
            loop {
                let page = self.read(&mut conn, &from, None).await?;
                let Some(last_id) = last_entry_id(&page) else {
                    break;
                };
                self.process_reply(&mut conn, page, &mut report).await?;
                from = last_id;
            }
        }

        let fresh = self.read(&mut conn, ">", Some(self.block_ms)).await?;
        self.process_reply(&mut conn, fresh, &mut report).await?;
        Ok(report)
    }

    /// Moves entries idle longer than `claim_idle` from any consumer in the
    /// group into this consumer's pending list. Needs Redis 6.2+.
    async fn claim_idle_entries(&self) -> Result<usize> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let mut cursor = "0-0".to_string();
        let mut claimed = 0;

        for _ in 0..MAX_CLAIM_PAGES {
            let reply: Vec<redis::Value> = redis::cmd("XAUTOCLAIM")
                .arg(&self.stream_key)
                .arg(&self.group)
                .arg(&self.consumer_name)
                .arg(self.claim_idle.as_millis() as u64)
                .arg(&cursor)
                .arg("COUNT")
                .arg(self.batch_size)
                .arg("JUSTID")
                .query_async(&mut conn)
                .await?;

            let next: Option<String> = reply.first().map(redis::from_redis_value).transpose()?;
            let ids: Option<Vec<String>> = reply.get(1).map(redis::from_redis_value).transpose()?;
            claimed += ids.map(|ids| ids.len()).unwrap_or(0);

            match next {
                Some(next) if next != "0-0" => cursor = next,
                _ => break,
            }
        }
        Ok(claimed)
    }

    async fn read(&self, conn: &mut MultiplexedConnection, from: &str, block_ms: Option<usize>) -> Result<StreamReadReply> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer_name)
            .arg("COUNT")
            .arg(self.batch_size);
        if let Some(ms) = block_ms {
            cmd.arg("BLOCK").arg(ms);
        }
        cmd.arg("STREAMS").arg(&self.stream_key).arg(from);

        let reply: Option<StreamReadReply> = cmd.query_async(conn).await?;
        Ok(reply.unwrap_or(StreamReadReply { keys: vec![] }))
    }

    async fn process_reply(
        &self,
        conn: &mut MultiplexedConnection,
        reply: StreamReadReply,
        report: &mut TickReport,
    ) -> Result<()> {
        for stream in reply.keys {
            for entry in stream.ids {
                self.process_entry(conn, &entry, report).await?;
            }
        }
        Ok(())
    }

    async fn process_entry(
        &self,
        conn: &mut MultiplexedConnection,
        entry: &StreamId,
        report: &mut TickReport,
    ) -> Result<()> {
        let raw = entry_payload(entry);

        match dispose(&self.consumer, raw.as_deref()).await {
            Disposition::DeadLetter(invalid) => {
                self.dead_letter(conn, &entry.id, raw.as_deref(), &invalid).await?;
                self.ack(conn, &entry.id).await?;
                report.dead_lettered += 1;
            }
            Disposition::Ack => {
                self.ack(conn, &entry.id).await?;
                report.acked += 1;
            }
            Disposition::Retry(e) => {
                tracing::warn!(entry_id = %entry.id, "leaving order placed entry pending: {}", e);
                report.left_pending += 1;
            }
        }
        Ok(())
    }

    async fn ack(&self, conn: &mut MultiplexedConnection, entry_id: &str) -> Result<()> {
        let _: i64 = redis::cmd("XACK")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(entry_id)
            .query_async(conn)
            .await?;
        Ok(())
    }

    async fn dead_letter(
        &self,
        conn: &mut MultiplexedConnection,
        entry_id: &str,
        raw: Option<&str>,
        invalid: &InvalidFact,
    ) -> Result<()> {
        let _: String = redis::cmd("XADD")
            .arg(&self.dead_letter_stream)
            .arg("*")
            .arg(EVENT_FIELD)
            .arg(raw.unwrap_or(""))
            .arg("reason")
            .arg(invalid.reason_code())
            .arg("detail")
            .arg(invalid.to_string())
            .arg("source_id")
            .arg(entry_id)
            .query_async(conn)
            .await?;

        tracing::warn!(entry_id = %entry_id, reason = invalid.reason_code(), "dead-lettered order placed entry");
        Ok(())
    }
}

fn last_entry_id(reply: &StreamReadReply) -> Option<String> {
    reply
        .keys
        .iter()
        .filter_map(|k| k.ids.last())
        .map(|entry| entry.id.clone())
        .last()
}

//! Fire-and-forget side-effect boundary.
//!
//! The orchestrator enqueues events onto a non-blocking channel; a worker
//! task drains them into the proxy pool's scoring path, the selector
//! healing collaborator, and the telemetry sink. A slow or failing
//! consumer can never stall or fail a scrape.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::proxy::{ProxyOutcome, ProxyPool, UsageContext};
use crate::request::FetchEngine;
use crate::result::SelectorSignal;
use crate::Result;

/// Telemetry for one logical fetch attempt within a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptTelemetry {
    pub url: String,
    pub engine: FetchEngine,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Error message when the attempt failed.
    pub error: Option<String>,
}

/// Telemetry for one completed scrape request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeTelemetry {
    pub url: String,
    pub engine: FetchEngine,
    pub success: bool,
    pub attempts: u32,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub tenant_id: Option<String>,
}

/// Receives selector hit/miss signals. The healing subsystem that
/// consumes them to propose replacement selectors is an external
/// collaborator; this crate only produces the signals.
#[async_trait]
pub trait SelectorHealer: Send + Sync {
    /// Records one selector signal. Errors are swallowed by the caller.
    async fn record(&self, signal: SelectorSignal) -> Result<()>;
}

/// Receives per-attempt and per-request telemetry. Failures in this path
/// are swallowed by the caller.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Records one fetch attempt.
    async fn record_attempt(&self, attempt: AttemptTelemetry) -> Result<()>;

    /// Records one completed request.
    async fn record_scrape(&self, telemetry: ScrapeTelemetry) -> Result<()>;
}

/// Default healer that logs signals.
#[derive(Default)]
pub struct LoggingHealer;

#[async_trait]
impl SelectorHealer for LoggingHealer {
    async fn record(&self, signal: SelectorSignal) -> Result<()> {
        debug!(
            url = %signal.url,
            field = %signal.field,
            selector = %signal.selector,
            matched = signal.matched,
            "Selector signal"
        );
        Ok(())
    }
}

/// Default telemetry sink that logs events.
#[derive(Default)]
pub struct LoggingTelemetry;

#[async_trait]
impl TelemetrySink for LoggingTelemetry {
    async fn record_attempt(&self, attempt: AttemptTelemetry) -> Result<()> {
        debug!(
            url = %attempt.url,
            engine = %attempt.engine,
            attempt = attempt.attempt,
            error = attempt.error.as_deref().unwrap_or("none"),
            "Fetch attempt"
        );
        Ok(())
    }

    async fn record_scrape(&self, telemetry: ScrapeTelemetry) -> Result<()> {
        debug!(
            url = %telemetry.url,
            engine = %telemetry.engine,
            success = telemetry.success,
            attempts = telemetry.attempts,
            latency_ms = telemetry.latency_ms,
            "Scrape finished"
        );
        Ok(())
    }
}

/// An event crossing the fire-and-forget boundary.
#[derive(Debug)]
pub enum FeedbackEvent {
    /// A proxy usage outcome to fold into the pool's scores.
    ProxyUsage {
        proxy_id: String,
        outcome: ProxyOutcome,
        context: UsageContext,
    },
    /// A selector hit/miss signal for the healing collaborator.
    Selector(SelectorSignal),
    /// One fetch attempt.
    Attempt(AttemptTelemetry),
    /// One completed request.
    Scrape(ScrapeTelemetry),
}

/// Non-blocking sender side of the side-effect channel.
#[derive(Clone)]
pub struct FeedbackBus {
    tx: mpsc::UnboundedSender<FeedbackEvent>,
}

impl FeedbackBus {
    /// Spawns the consumer worker and returns the bus.
    pub fn new(
        pool: Option<Arc<ProxyPool>>,
        healer: Arc<dyn SelectorHealer>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<FeedbackEvent>();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    FeedbackEvent::ProxyUsage {
                        proxy_id,
                        outcome,
                        context,
                    } => {
                        if let Some(ref pool) = pool {
                            pool.report(&proxy_id, outcome, context).await;
                        }
                    }
                    FeedbackEvent::Selector(signal) => {
                        if let Err(e) = healer.record(signal).await {
                            warn!("Selector healer write failed: {}", e);
                        }
                    }
                    FeedbackEvent::Attempt(attempt) => {
                        if let Err(e) = telemetry.record_attempt(attempt).await {
                            warn!("Attempt telemetry write failed: {}", e);
                        }
                    }
                    FeedbackEvent::Scrape(telemetry_event) => {
                        if let Err(e) = telemetry.record_scrape(telemetry_event).await {
                            warn!("Scrape telemetry write failed: {}", e);
                        }
                    }
                }
            }
            debug!("Feedback worker exited");
        });

        Self { tx }
    }

    /// Enqueues an event without waiting for it to be consumed.
    pub fn send(&self, event: FeedbackEvent) {
        if self.tx.send(event).is_err() {
            warn!("Feedback worker gone, dropping event");
        }
    }
}

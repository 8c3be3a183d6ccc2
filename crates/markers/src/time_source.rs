//! Current playback position for VOD and live players.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::OverlayConfig;
use crate::dhms::parse_dhms;
use crate::error::{MarkerError, Result};
use crate::page::{
    DiagnosticsReadout, PageMode, PlayerPage, STATS_CLOSE_SEQUENCE, STATS_OPEN_SEQUENCE,
    click_in_order,
};

/// Produces the viewer's playback position in seconds.
#[async_trait]
pub trait TimeSource: Send + Sync {
    async fn current_seconds(&self) -> Result<f64>;
}

/// Reads the elapsed-time display of a seekable video.
pub struct VodTimeSource {
    page: Arc<dyn PlayerPage>,
}

impl VodTimeSource {
    pub fn new(page: Arc<dyn PlayerPage>) -> Self {
        Self { page }
    }
}

#[async_trait]
impl TimeSource for VodTimeSource {
    async fn current_seconds(&self) -> Result<f64> {
        let text = self
            .page
            .elapsed_time_text()
            .await
            .ok_or(MarkerError::MissingElement {
                element: "elapsed time",
            })?;
        parse_dhms(&text)
    }
}

#[derive(Debug, Clone, Copy)]
struct DelayMeasurement {
    taken_at: Instant,
    delay_seconds: f64,
}

/// Estimates the buffered position of a live stream.
///
/// The live clock shows broadcaster time. The viewer trails it by the stream
/// latency plus the client buffer, both read from the player's stats overlay.
/// That measurement is cached for `delay_cache`.
pub struct LiveTimeSource {
    page: Arc<dyn PlayerPage>,
    cache: Mutex<Option<DelayMeasurement>>,
    cache_for: Duration,
    attempts: u32,
    click_poll: Duration,
    click_attempts: u32,
}

impl LiveTimeSource {
    pub fn new(page: Arc<dyn PlayerPage>, config: &OverlayConfig) -> Self {
        Self {
            page,
            cache: Mutex::new(None),
            cache_for: config.delay_cache(),
            attempts: config.diagnostics_attempts,
            click_poll: config.click_poll(),
            click_attempts: config.click_attempts,
        }
    }

    /// Latency plus buffer size, measured at most once per cache window.
    pub async fn delay_seconds(&self) -> Result<f64> {
        let mut cache = self.cache.lock().await;
        if let Some(measurement) = *cache {
            if measurement.taken_at.elapsed() < self.cache_for {
                return Ok(measurement.delay_seconds);
            }
        }

        let delay_seconds = self.measure_delay().await?;
        *cache = Some(DelayMeasurement {
            taken_at: Instant::now(),
            delay_seconds,
        });
        Ok(delay_seconds)
    }

    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    async fn measure_delay(&self) -> Result<f64> {
        let mut reveals = 0;
        loop {
            if let Some(readout) = self.page.diagnostics().await {
                let delay = readout_delay(&readout)?;
                debug!(delay, reveals, "live delay measured");
                if reveals > 0 {
                    self.hide_diagnostics();
                }
                return Ok(delay);
            }

            if reveals == self.attempts {
                warn!(attempts = self.attempts, "player diagnostics never appeared");
                return Err(MarkerError::DiagnosticsUnavailable {
                    attempts: self.attempts,
                });
            }
            reveals += 1;

            match click_in_order(
                self.page.as_ref(),
                &STATS_OPEN_SEQUENCE,
                self.click_poll,
                self.click_attempts,
            )
            .await
            {
                Ok(()) => tokio::time::sleep(self.click_poll).await,
                Err(error) => warn!(attempt = reveals, error = %error, "revealing diagnostics failed"),
            }
        }
    }

    // Closing the overlay again does not hold up the caller.
    fn hide_diagnostics(&self) {
        let page = self.page.clone();
        let poll = self.click_poll;
        let attempts = self.click_attempts;
        tokio::spawn(async move {
            if let Err(error) = click_in_order(page.as_ref(), &STATS_CLOSE_SEQUENCE, poll, attempts).await {
                warn!(error = %error, "hiding diagnostics failed");
            }
        });
    }
}

#[async_trait]
impl TimeSource for LiveTimeSource {
    async fn current_seconds(&self) -> Result<f64> {
        let started = Instant::now();
        let delay = self.delay_seconds().await?;
        let step = started.elapsed();

        let text = self
            .page
            .live_clock_text()
            .await
            .ok_or(MarkerError::MissingElement {
                element: "live clock",
            })?;
        let clock = parse_dhms(&text)?;

        let seconds = clock - delay - step.as_secs_f64();
        debug!(clock, delay, step_ms = step.as_millis() as u64, seconds, "live position");
        Ok(seconds.max(0.0))
    }
}

/// The time source matching the page's player.
pub enum PlaybackClock {
    Vod(VodTimeSource),
    Live(LiveTimeSource),
}

impl PlaybackClock {
    /// `None` for pages without a player.
    pub fn for_mode(mode: PageMode, page: Arc<dyn PlayerPage>, config: &OverlayConfig) -> Option<Self> {
        match mode {
            PageMode::Vod => Some(Self::Vod(VodTimeSource::new(page))),
            PageMode::Live => Some(Self::Live(LiveTimeSource::new(page, config))),
            PageMode::Other => None,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }
}

#[async_trait]
impl TimeSource for PlaybackClock {
    async fn current_seconds(&self) -> Result<f64> {
        match self {
            Self::Vod(source) => source.current_seconds().await,
            Self::Live(source) => source.current_seconds().await,
        }
    }
}

fn readout_delay(readout: &DiagnosticsReadout) -> Result<f64> {
    Ok(leading_number(&readout.latency, "latency readout")?
        + leading_number(&readout.buffer, "buffer readout")?)
}

/// First numeric token of a readout such as `"2.31 sec."`.
fn leading_number(text: &str, context: &'static str) -> Result<f64> {
    text.split_whitespace()
        .find_map(|token| {
            token
                .trim_end_matches(|c: char| !c.is_ascii_digit())
                .parse::<f64>()
                .ok()
        })
        .filter(|value| value.is_finite() && *value >= 0.0)
        .ok_or_else(|| MarkerError::Parse {
            context,
            value: text.to_string(),
        })
}

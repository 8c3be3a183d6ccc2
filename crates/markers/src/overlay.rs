//! Incremental rendering of the marker list, seekbar dots and active marker.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::dhms::{dhms_places, seconds_to_dhms};
use crate::error::Result;
use crate::marker::{Marker, index_at_or_before};
use crate::page::{ListItem, OverlaySurface, PlayerPage, SeekbarDot, SeekbarSurface};
use crate::store::{ChangeHandler, MarkerStore};
use crate::time_source::TimeSource;

/// Element-level changes made by one render pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RenderStats {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

impl RenderStats {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Reconciles the list panel with the store.
///
/// The Nth row is reused for the Nth marker and only fields that differ are
/// written, so scroll position and focus survive updates.
pub struct OverlayRenderer {
    surface: Arc<dyn OverlaySurface>,
    min_places: usize,
}

impl OverlayRenderer {
    pub fn new(surface: Arc<dyn OverlaySurface>, min_places: usize) -> Self {
        Self {
            surface,
            min_places,
        }
    }

    /// Renders `markers`, which must already be sorted.
    ///
    /// A hidden list has no rows and is left alone.
    pub fn render(&self, markers: &[Marker]) -> RenderStats {
        let mut stats = RenderStats::default();
        if !self.surface.list_visible() {
            return stats;
        }

        // Every row uses as many DHMS places as the longest one needs.
        let places = markers
            .iter()
            .map(|marker| dhms_places(marker.seconds, self.min_places))
            .max()
            .unwrap_or(self.min_places);

        for (index, marker) in markers.iter().enumerate() {
            let wanted = ListItem {
                seconds: marker.seconds,
                time_label: seconds_to_dhms(marker.seconds, places),
                name: marker.name.clone(),
            };

            match self.surface.item(index) {
                Some(existing) => {
                    let mut changed = false;
                    if existing.seconds != wanted.seconds {
                        self.surface.set_item_seconds(index, wanted.seconds);
                        changed = true;
                    }
                    if existing.time_label != wanted.time_label {
                        self.surface.set_time_label(index, &wanted.time_label);
                        changed = true;
                    }
                    if existing.name != wanted.name {
                        self.surface.set_name(index, &wanted.name);
                        changed = true;
                    }
                    if changed {
                        stats.updated += 1;
                    }
                }
                None => {
                    self.surface.push_item(wanted);
                    stats.created += 1;
                }
            }
        }

        let existing = self.surface.item_count();
        if existing > markers.len() {
            stats.removed = existing - markers.len();
            self.surface.truncate(markers.len());
            if self
                .surface
                .highlighted()
                .is_some_and(|index| index >= markers.len())
            {
                self.surface.set_highlighted(None);
            }
        }

        trace!(?stats, "marker list rendered");
        stats
    }

    /// Moves the highlight without touching any row.
    pub fn highlight(&self, index: Option<usize>) {
        if self.surface.highlighted() != index {
            self.surface.set_highlighted(index);
        }
    }

    pub fn show(&self, markers: &[Marker]) -> RenderStats {
        self.surface.set_list_visible(true);
        self.render(markers)
    }

    /// Hides the list and drops its rows.
    pub fn hide(&self) {
        self.surface.set_highlighted(None);
        self.surface.truncate(0);
        self.surface.set_list_visible(false);
    }

}

#[async_trait]
impl ChangeHandler for OverlayRenderer {
    fn name(&self) -> &str {
        "marker list"
    }

    async fn on_change(&self, markers: &[Marker]) -> Result<()> {
        self.render(markers);
        Ok(())
    }
}

/// Places one dot per marker along a VOD seekbar.
pub struct SeekbarRenderer {
    surface: Arc<dyn SeekbarSurface>,
    page: Arc<dyn PlayerPage>,
}

impl SeekbarRenderer {
    pub fn new(surface: Arc<dyn SeekbarSurface>, page: Arc<dyn PlayerPage>) -> Self {
        Self { surface, page }
    }

    pub async fn render(&self, markers: &[Marker]) -> RenderStats {
        let mut stats = RenderStats::default();
        let duration = self
            .page
            .duration_seconds()
            .await
            .filter(|duration| duration.is_finite() && *duration > 0.0);
        let Some(duration) = duration else {
            stats.removed = self.surface.dot_count();
            self.surface.truncate_dots(0);
            return stats;
        };

        for (index, marker) in markers.iter().enumerate() {
            let wanted = SeekbarDot {
                fraction: (marker.seconds / duration).clamp(0.0, 1.0),
                title: marker.name.clone(),
            };
            match self.surface.dot(index) {
                Some(existing) if existing == wanted => {}
                Some(_) => {
                    self.surface.set_dot(index, wanted);
                    stats.updated += 1;
                }
                None => {
                    self.surface.push_dot(wanted);
                    stats.created += 1;
                }
            }
        }

        let existing = self.surface.dot_count();
        if existing > markers.len() {
            stats.removed = existing - markers.len();
            self.surface.truncate_dots(markers.len());
        }
        stats
    }

    pub fn clear(&self) {
        self.surface.truncate_dots(0);
    }
}

#[async_trait]
impl ChangeHandler for SeekbarRenderer {
    fn name(&self) -> &str {
        "seekbar"
    }

    async fn on_change(&self, markers: &[Marker]) -> Result<()> {
        self.render(markers).await;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LabelState {
    seconds: Option<f64>,
    hovered: bool,
}

/// The current-marker label beside the player controls.
///
/// The tracker rewrites it on every tick unless a seekbar hover holds it.
pub struct MarkerLabel {
    surface: Arc<dyn OverlaySurface>,
    state: Mutex<LabelState>,
}

impl MarkerLabel {
    pub fn new(surface: Arc<dyn OverlaySurface>) -> Self {
        Self {
            surface,
            state: Mutex::new(LabelState::default()),
        }
    }

    /// Shows the marker playback is in. Returns `false` while hovered.
    pub fn follow(&self, marker: Option<&Marker>) -> bool {
        let mut state = self.lock();
        if state.hovered {
            return false;
        }
        self.write(&mut state, marker);
        true
    }

    /// Shows `marker` and holds the label until [`Self::release`].
    ///
    /// Pointing at a spot before the first marker keeps the current text.
    pub fn hover(&self, marker: Option<&Marker>) {
        let mut state = self.lock();
        state.hovered = true;
        if let Some(marker) = marker.filter(|marker| state.seconds != Some(marker.seconds)) {
            self.write(&mut state, Some(marker));
        }
    }

    pub fn release(&self) {
        self.lock().hovered = false;
    }

    pub fn is_hovered(&self) -> bool {
        self.lock().hovered
    }

    /// Time of the marker the label names.
    pub fn seconds(&self) -> Option<f64> {
        self.lock().seconds
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        *state = LabelState::default();
        self.surface.set_current_marker_label(None);
    }

    fn write(&self, state: &mut LabelState, marker: Option<&Marker>) {
        state.seconds = marker.map(|marker| marker.seconds);
        self.surface
            .set_current_marker_label(marker.map(|marker| marker.name.as_str()));
    }

    fn lock(&self) -> MutexGuard<'_, LabelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Follows playback and highlights the marker being watched.
pub struct ActiveMarkerTracker {
    store: MarkerStore,
    clock: Arc<dyn TimeSource>,
    renderer: Arc<OverlayRenderer>,
    label: Arc<MarkerLabel>,
    period: Duration,
}

impl ActiveMarkerTracker {
    pub fn new(
        store: MarkerStore,
        clock: Arc<dyn TimeSource>,
        renderer: Arc<OverlayRenderer>,
        label: Arc<MarkerLabel>,
        period: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            renderer,
            label,
            period,
        }
    }

    /// One highlight update. Returns the active index.
    ///
    /// Does nothing once `cancel` fired, even if the time read was in flight.
    pub async fn tick(&self, cancel: &CancellationToken) -> Result<Option<usize>> {
        let seconds = self.clock.current_seconds().await?;
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let markers = self.store.snapshot();
        let index = index_at_or_before(&markers, seconds);
        self.renderer.highlight(index);
        self.label.follow(index.and_then(|index| markers.get(index)));
        Ok(index)
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if let Err(error) = self.tick(&cancel).await {
                    debug!(error = %error, "playback position unavailable");
                }
            }
            debug!("active marker tracker stopped");
        })
    }
}

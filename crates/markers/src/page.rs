//! Seams to the host player page and the user-facing services around it.
//!
//! Nothing in this crate touches a document directly; a browser binding (or a
//! test fake) implements these traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{MarkerError, Result};
use crate::storage::KeyValueStore;

/// What kind of player the page currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMode {
    Vod,
    Live,
    Other,
}

impl PageMode {
    pub fn has_player(self) -> bool {
        matches!(self, Self::Vod | Self::Live)
    }
}

/// Player controls that have to be clicked through to reach the diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageControl {
    SettingsButton,
    AdvancedMenu,
    VideoStatsToggle,
}

impl PageControl {
    pub fn label(self) -> &'static str {
        match self {
            Self::SettingsButton => "settings button",
            Self::AdvancedMenu => "advanced menu",
            Self::VideoStatsToggle => "video stats toggle",
        }
    }
}

/// Order that opens the video stats overlay. Leaves the settings menu open.
pub const STATS_OPEN_SEQUENCE: [PageControl; 3] = [
    PageControl::SettingsButton,
    PageControl::AdvancedMenu,
    PageControl::VideoStatsToggle,
];

/// Closes the stats overlay from the menu the open sequence left behind,
/// then closes that menu.
pub const STATS_CLOSE_SEQUENCE: [PageControl; 2] =
    [PageControl::VideoStatsToggle, PageControl::SettingsButton];

/// Raw latency and buffer readouts from the stats overlay, e.g. `"2.31 sec."`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsReadout {
    pub latency: String,
    pub buffer: String,
}

/// Read-mostly view of the host player page.
#[async_trait]
pub trait PlayerPage: Send + Sync {
    async fn mode(&self) -> PageMode;

    /// Current page location, compared between polls to detect navigation.
    async fn location(&self) -> String;

    async fn document_ready(&self) -> bool;

    async fn player_controls_present(&self) -> bool;

    async fn advertisement_active(&self) -> bool;

    /// Elapsed-time display of a VOD player, e.g. `"1:02:05"`.
    async fn elapsed_time_text(&self) -> Option<String>;

    /// Broadcast clock of a live player.
    async fn live_clock_text(&self) -> Option<String>;

    /// `None` while the stats overlay is not showing.
    async fn diagnostics(&self) -> Option<DiagnosticsReadout>;

    async fn duration_seconds(&self) -> Option<f64>;

    /// Clicks `control`, returning `false` when it is not on the page.
    async fn click(&self, control: PageControl) -> bool;

    async fn seek(&self, seconds: f64);
}

/// One row of the rendered marker list.
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub seconds: f64,
    pub time_label: String,
    pub name: String,
}

/// The marker list panel and the active-marker label beside the controls.
pub trait OverlaySurface: Send + Sync {
    fn item_count(&self) -> usize;

    fn item(&self, index: usize) -> Option<ListItem>;

    fn push_item(&self, item: ListItem);

    fn set_item_seconds(&self, index: usize, seconds: f64);

    fn set_time_label(&self, index: usize, label: &str);

    fn set_name(&self, index: usize, name: &str);

    fn truncate(&self, len: usize);

    fn highlighted(&self) -> Option<usize>;

    fn set_highlighted(&self, index: Option<usize>);

    fn set_list_visible(&self, visible: bool);

    fn list_visible(&self) -> bool;

    fn set_current_marker_label(&self, name: Option<&str>);
}

/// One dot on the seekbar.
#[derive(Debug, Clone, PartialEq)]
pub struct SeekbarDot {
    /// Position along the bar in `0.0..=1.0`.
    pub fraction: f64,
    pub title: String,
}

pub trait SeekbarSurface: Send + Sync {
    fn dot_count(&self) -> usize;

    fn dot(&self, index: usize) -> Option<SeekbarDot>;

    fn push_dot(&self, dot: SeekbarDot);

    fn set_dot(&self, index: usize, dot: SeekbarDot);

    fn truncate_dots(&self, len: usize);
}

/// Modal dialogs. `None` always means the user dismissed the dialog.
#[async_trait]
pub trait Dialogs: Send + Sync {
    async fn prompt(&self, message: &str, seed: &str) -> Option<String>;

    async fn alert(&self, message: &str);

    /// `options` are `(key, label)` pairs; returns the chosen key.
    async fn choose(&self, message: &str, options: &[(String, String)]) -> Option<String>;
}

#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn write_text(&self, text: &str) -> Result<()>;
}

/// Resolves the page's video to a stable id.
#[async_trait]
pub trait VideoIdentity: Send + Sync {
    /// `None` means unknown; callers skip persistence rather than guess a key.
    async fn video_id(&self, prompt_if_missing: bool) -> Option<String>;
}

/// Everything the overlay needs from its host, bundled for installation.
#[derive(Clone)]
pub struct HostServices {
    pub page: Arc<dyn PlayerPage>,
    pub overlay: Arc<dyn OverlaySurface>,
    /// Absent when the host has no seekbar to decorate.
    pub seekbar: Option<Arc<dyn SeekbarSurface>>,
    pub dialogs: Arc<dyn Dialogs>,
    pub clipboard: Arc<dyn Clipboard>,
    pub identity: Arc<dyn VideoIdentity>,
    pub storage: Arc<dyn KeyValueStore>,
}

/// Clicks each control in turn, waiting up to `attempts * poll` for each one
/// to appear.
pub async fn click_in_order(
    page: &dyn PlayerPage,
    controls: &[PageControl],
    poll: Duration,
    attempts: u32,
) -> Result<()> {
    for &control in controls {
        let mut clicked = false;
        for _ in 0..attempts.max(1) {
            if page.click(control).await {
                clicked = true;
                break;
            }
            tokio::time::sleep(poll).await;
        }
        if !clicked {
            return Err(MarkerError::MissingElement {
                element: control.label(),
            });
        }
        debug!(control = control.label(), "clicked");
    }
    Ok(())
}

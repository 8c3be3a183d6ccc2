//! User-triggered marker operations.
//!
//! A dismissed dialog is never an error: the action returns `Ok(None)` or
//! `Ok(false)` and the store is left untouched.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::dhms::share_link;
use crate::error::{MarkerError, Result};
use crate::format::{FormatterRegistry, MarkerFormatter};
use crate::marker::Marker;
use crate::overlay::{MarkerLabel, OverlayRenderer};
use crate::page::{HostServices, PageMode};
use crate::session::{CancelTicket, Session};
use crate::storage::MarkerStorage;
use crate::store::MarkerStore;
use crate::time_source::TimeSource;

pub const EXPORTED_MESSAGE: &str = "Exported to Clipboard!";

/// Installation state the actions operate on.
pub struct ActionContext {
    pub store: MarkerStore,
    pub session: Arc<Session>,
    pub clock: Arc<dyn TimeSource>,
    pub mode: PageMode,
    pub renderer: Arc<OverlayRenderer>,
    pub label: Arc<MarkerLabel>,
    pub registry: Arc<FormatterRegistry>,
    pub storage: MarkerStorage,
    pub share_base_url: String,
}

pub struct MarkerActions {
    host: HostServices,
    cx: ActionContext,
    list_ticket: Mutex<Option<CancelTicket>>,
}

impl MarkerActions {
    pub fn new(host: HostServices, cx: ActionContext) -> Self {
        Self {
            host,
            cx,
            list_ticket: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &MarkerStore {
        &self.cx.store
    }

    /// Adds a marker at the current playback position.
    ///
    /// A name starting with `t+N` or `t-N` moves the marker by N seconds. On
    /// live pages the new marker's share link is copied as well.
    pub async fn add_marker_here(&self) -> Result<Option<Marker>> {
        let now = self.cx.clock.current_seconds().await?;
        let Some(text) = self.host.dialogs.prompt("Marker name", "").await else {
            return Ok(None);
        };
        if text.trim().is_empty() {
            return Ok(None);
        }

        let (offset, name) = split_time_offset(&text);
        let marker = Marker::new((now + offset).max(0.0), name);
        self.cx.store.add(marker.clone()).await?;
        info!(seconds = marker.seconds, name = %marker.name, "marker added");

        if self.cx.mode == PageMode::Live {
            if let Some(video_id) = self.cx.session.video_id(false).await {
                let link = share_link(&self.cx.share_base_url, &video_id, marker.seconds);
                self.host.clipboard.write_text(&link).await?;
            }
        }
        Ok(Some(marker))
    }

    pub async fn edit_seconds(&self, at: f64) -> Result<bool> {
        let formatter = self.formatter()?;
        let seed = formatter.serialize_seconds(at);
        let Some(text) = self.host.dialogs.prompt("Edit time", &seed).await else {
            return Ok(false);
        };
        let seconds = formatter.deserialize_seconds(&text)?;
        self.cx.store.edit_seconds(at, seconds).await?;
        Ok(true)
    }

    pub async fn edit_name(&self, at: f64) -> Result<bool> {
        let marker = self.marker_at(at)?;
        let formatter = self.formatter()?;
        let seed = formatter.serialize_name(&marker.name);
        let Some(text) = self.host.dialogs.prompt("Edit name", &seed).await else {
            return Ok(false);
        };
        let Some(name) = formatter.deserialize_name(&text) else {
            return Ok(false);
        };
        self.cx.store.edit_name(at, name).await?;
        Ok(true)
    }

    /// Edits one marker as serialized text.
    pub async fn edit_marker(&self, at: f64) -> Result<bool> {
        let marker = self.marker_at(at)?;
        let formatter = self.formatter()?;
        let seed = formatter.serialize_all(std::slice::from_ref(&marker))?;
        let Some(text) = self.host.dialogs.prompt("Edit marker", &seed).await else {
            return Ok(false);
        };

        let mut parsed = formatter.deserialize_all(&text)?;
        if parsed.len() > 1 {
            return Err(MarkerError::Parse {
                context: "single marker",
                value: text,
            });
        }
        let Some(replacement) = parsed.pop() else {
            return Ok(false);
        };
        self.cx.store.replace_one(at, replacement).await?;
        Ok(true)
    }

    /// Edits the whole list as serialized text.
    ///
    /// Text that parses to no markers is treated as nothing to apply.
    pub async fn edit_all(&self) -> Result<bool> {
        let formatter = self.formatter()?;
        let seed = formatter.serialize_all(&self.cx.store.snapshot())?;
        let Some(text) = self.host.dialogs.prompt("Edit all markers", &seed).await else {
            return Ok(false);
        };

        let parsed = formatter.deserialize_all(&text)?;
        if parsed.is_empty() {
            debug!("edited text holds no markers");
            return Ok(false);
        }
        self.cx.store.replace_all(parsed).await?;
        Ok(true)
    }

    pub async fn delete(&self, at: f64) -> Result<Marker> {
        let removed = self.cx.store.remove_by_time(at).await?;
        info!(seconds = removed.seconds, "marker deleted");
        Ok(removed)
    }

    /// Moves a marker by `delta` seconds; VOD players follow it.
    pub async fn nudge(&self, at: f64, delta: f64) -> Result<f64> {
        let seconds = self.cx.store.shift(at, delta).await?;
        if self.cx.mode == PageMode::Vod {
            self.host.page.seek(seconds).await;
        }
        Ok(seconds)
    }

    pub async fn seek_to(&self, at: f64) -> Result<()> {
        let marker = self.marker_at(at)?;
        self.host.page.seek(marker.seconds).await;
        Ok(())
    }

    /// Names the marker under the pointer at `fraction` of a VOD seekbar.
    ///
    /// The label keeps that name until [`Self::leave_seekbar`].
    pub async fn hover_seekbar(&self, fraction: f64) -> Option<Marker> {
        if !self.pointer_enabled() {
            return None;
        }
        let duration = self
            .host
            .page
            .duration_seconds()
            .await
            .filter(|duration| duration.is_finite() && *duration > 0.0)?;

        let marker = self
            .cx
            .store
            .locate_at_or_before(fraction.clamp(0.0, 1.0) * duration);
        self.cx.label.hover(marker.as_ref());
        marker
    }

    /// Hands the label back to the playback tracker.
    pub fn leave_seekbar(&self) {
        self.cx.label.release();
    }

    /// Steps a VOD player by one second in the wheel's direction.
    pub async fn wheel_seekbar(&self, delta: f64) -> Result<Option<f64>> {
        if !self.pointer_enabled() {
            return Ok(None);
        }
        let now = self.cx.clock.current_seconds().await?;
        let target = (now + delta.clamp(-1.0, 1.0)).max(0.0);
        self.host.page.seek(target).await;
        Ok(Some(target))
    }

    /// Seeks a VOD player to the marker the label currently names.
    pub async fn seek_to_labelled_marker(&self) -> Option<f64> {
        if !self.pointer_enabled() {
            return None;
        }
        let seconds = self.cx.label.seconds()?;
        self.host.page.seek(seconds).await;
        Some(seconds)
    }

    /// Copies every marker, serialized with the selected formatter.
    pub async fn export(&self) -> Result<String> {
        let text = self.formatter()?.serialize_all(&self.cx.store.snapshot())?;
        self.host.clipboard.write_text(&text).await?;
        self.host.dialogs.alert(EXPORTED_MESSAGE).await;
        Ok(text)
    }

    /// Copies a link that opens the video at the marker.
    pub async fn share(&self, at: f64) -> Result<Option<String>> {
        let marker = self.marker_at(at)?;
        let Some(video_id) = self.cx.session.video_id(true).await else {
            return Ok(None);
        };
        let link = share_link(&self.cx.share_base_url, &video_id, marker.seconds);
        self.host.clipboard.write_text(&link).await?;
        Ok(Some(link))
    }

    /// Lets the user pick the formatter used for editing and export.
    pub async fn choose_formatter(&self) -> Result<Option<String>> {
        let options: Vec<(String, String)> = self
            .cx
            .registry
            .names()
            .into_iter()
            .map(|name| (name.to_string(), name.to_string()))
            .collect();
        let Some(choice) = self.host.dialogs.choose("Formatter", &options).await else {
            return Ok(None);
        };
        self.cx.registry.get(&choice)?;
        self.cx.storage.set_preferred_formatter(&choice)?;
        Ok(Some(choice))
    }

    /// Shows the list; the topmost cancel key press hides it again.
    pub fn show_list(&self) {
        if self.host.overlay.list_visible() {
            return;
        }
        self.cx.renderer.show(&self.cx.store.snapshot());

        let renderer = self.cx.renderer.clone();
        let ticket = self.cx.session.cancel_stack().push(move || renderer.hide());
        *self.lock_ticket() = Some(ticket);
    }

    pub fn hide_list(&self) {
        if let Some(ticket) = self.lock_ticket().take() {
            self.cx.session.cancel_stack().remove(ticket);
        }
        self.cx.renderer.hide();
    }

    pub fn toggle_list(&self) {
        if self.host.overlay.list_visible() {
            self.hide_list();
        } else {
            self.show_list();
        }
    }

    /// Re-runs the change handlers, e.g. after the host resized.
    pub async fn refresh(&self) -> Result<()> {
        self.cx.store.refresh().await
    }

    fn pointer_enabled(&self) -> bool {
        self.cx.mode == PageMode::Vod && !self.cx.session.is_shut_down()
    }

    fn formatter(&self) -> Result<Arc<dyn MarkerFormatter>> {
        self.cx.registry.currently_selected(&self.cx.storage)
    }

    fn marker_at(&self, at: f64) -> Result<Marker> {
        self.cx
            .store
            .get(at)
            .ok_or(MarkerError::MarkerNotFound { seconds: at })
    }

    fn lock_ticket(&self) -> std::sync::MutexGuard<'_, Option<CancelTicket>> {
        self.list_ticket.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Splits a leading `t+N` / `t-N` offset off a marker name.
fn split_time_offset(text: &str) -> (f64, &str) {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix('t') else {
        return (0.0, trimmed);
    };
    let sign = match rest.chars().next() {
        Some('+') => 1.0,
        Some('-') => -1.0,
        _ => return (0.0, trimmed),
    };

    let digits = &rest[1..];
    let end = digits
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(digits.len());
    match digits[..end].parse::<f64>() {
        Ok(offset) => (sign * offset, digits[end..].trim()),
        Err(_) => (0.0, trimmed),
    }
}

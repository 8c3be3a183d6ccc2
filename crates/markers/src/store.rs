//! The in-memory marker list and its change fan-out.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{MarkerError, Result};
use crate::marker::{Marker, index_at_or_before, sort_markers, validate_seconds};

/// Reacts to a committed change of the marker list.
///
/// Handlers receive the sorted list as it stood right after the mutation.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn on_change(&self, markers: &[Marker]) -> Result<()>;
}

struct StoreInner {
    markers: Mutex<Vec<Marker>>,
    handlers: Mutex<Vec<Arc<dyn ChangeHandler>>>,
    // Held from the start of a mutation until the last handler returns.
    mutation: tokio::sync::Mutex<()>,
}

/// Sorted, duplicate-free marker list for one installation.
///
/// Cloning is cheap and every clone addresses the same list. Markers are
/// addressed by `seconds`, which the store keeps unique.
#[derive(Clone)]
pub struct MarkerStore {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for MarkerStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerStore")
            .field("markers", &self.snapshot())
            .field("handlers", &self.handler_names())
            .finish()
    }
}

impl MarkerStore {
    /// Builds a store from loaded markers, sorting them.
    pub fn new(markers: Vec<Marker>) -> Result<Self> {
        let markers = normalize(markers)?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                markers: Mutex::new(markers),
                handlers: Mutex::new(Vec::new()),
                mutation: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Appends a handler; handlers run in registration order.
    pub fn register_handler(&self, handler: Arc<dyn ChangeHandler>) {
        debug!(handler = handler.name(), "change handler registered");
        self.lock_handlers().push(handler);
    }

    pub fn clear_handlers(&self) {
        self.lock_handlers().clear();
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.lock_handlers()
            .iter()
            .map(|handler| handler.name().to_string())
            .collect()
    }

    /// Sorted copy of the current list.
    pub fn snapshot(&self) -> Vec<Marker> {
        self.lock_markers().clone()
    }

    pub fn len(&self) -> usize {
        self.lock_markers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_markers().is_empty()
    }

    /// The marker at exactly `seconds`.
    pub fn get(&self, seconds: f64) -> Option<Marker> {
        self.lock_markers()
            .iter()
            .find(|marker| marker.seconds == seconds)
            .cloned()
    }

    /// The marker with the greatest `seconds <= at`.
    ///
    /// # Example
    /// ```
    /// use markers::{Marker, MarkerStore};
    ///
    /// let store = MarkerStore::new(vec![
    ///     Marker::new(10.0, "a"),
    ///     Marker::new(50.0, "b"),
    ///     Marker::new(120.0, "c"),
    /// ])
    /// .expect("valid markers");
    /// assert_eq!(store.locate_at_or_before(49.0).map(|m| m.seconds), Some(10.0));
    /// assert_eq!(store.locate_at_or_before(50.0).map(|m| m.seconds), Some(50.0));
    /// assert!(store.locate_at_or_before(5.0).is_none());
    /// ```
    pub fn locate_at_or_before(&self, at: f64) -> Option<Marker> {
        let markers = self.lock_markers();
        index_at_or_before(&markers, at).map(|index| markers[index].clone())
    }

    /// Sorted position of the marker `locate_at_or_before` would return.
    pub fn locate_index(&self, at: f64) -> Option<usize> {
        index_at_or_before(&self.lock_markers(), at)
    }

    pub async fn add(&self, marker: Marker) -> Result<()> {
        let seconds = marker.seconds;
        self.mutate("add", |markers| {
            validate_seconds(marker.seconds)?;
            ensure_free(markers, marker.seconds)?;
            markers.push(marker);
            Ok(())
        })
        .await?;
        debug!(seconds, "marker added");
        Ok(())
    }

    /// Removes and returns the marker at exactly `seconds`.
    pub async fn remove_by_time(&self, seconds: f64) -> Result<Marker> {
        self.mutate("remove", |markers| {
            let index = position(markers, seconds)?;
            Ok(markers.remove(index))
        })
        .await
    }

    /// Moves the marker at `at` to `new_seconds`.
    pub async fn edit_seconds(&self, at: f64, new_seconds: f64) -> Result<()> {
        self.mutate("edit seconds", |markers| {
            let index = position(markers, at)?;
            validate_seconds(new_seconds)?;
            if new_seconds != at {
                ensure_free(markers, new_seconds)?;
            }
            markers[index].seconds = new_seconds;
            Ok(())
        })
        .await
    }

    pub async fn edit_name(&self, at: f64, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.mutate("edit name", |markers| {
            let index = position(markers, at)?;
            markers[index].name = name;
            Ok(())
        })
        .await
    }

    /// Swaps the marker at `at` for `replacement`, which may carry a new time.
    pub async fn replace_one(&self, at: f64, replacement: Marker) -> Result<()> {
        self.mutate("replace", |markers| {
            let index = position(markers, at)?;
            validate_seconds(replacement.seconds)?;
            if replacement.seconds != at {
                ensure_free(markers, replacement.seconds)?;
            }
            markers[index] = replacement;
            Ok(())
        })
        .await
    }

    /// Moves the marker at `at` by `delta` seconds and returns its new time.
    pub async fn shift(&self, at: f64, delta: f64) -> Result<f64> {
        let target = at + delta;
        self.edit_seconds(at, target).await?;
        Ok(target)
    }

    pub async fn replace_all(&self, markers: Vec<Marker>) -> Result<()> {
        let replacement = normalize(markers)?;
        let count = replacement.len();
        self.mutate("replace all", |markers| {
            *markers = replacement;
            Ok(())
        })
        .await?;
        debug!(count, "markers replaced");
        Ok(())
    }

    /// Runs every change handler against the unchanged list.
    pub async fn refresh(&self) -> Result<()> {
        let _guard = self.inner.mutation.lock().await;
        let snapshot = self.snapshot();
        self.notify(&snapshot).await
    }

    async fn mutate<T>(
        &self,
        operation: &'static str,
        apply: impl FnOnce(&mut Vec<Marker>) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.inner.mutation.lock().await;

        let (value, snapshot) = {
            let mut markers = self.lock_markers();
            let mut working = markers.clone();
            let value = apply(&mut working).inspect_err(|error| {
                warn!(operation, error = %error, "marker mutation rejected");
            })?;
            sort_markers(&mut working);
            *markers = working;
            (value, markers.clone())
        };

        self.notify(&snapshot).await?;
        Ok(value)
    }

    async fn notify(&self, snapshot: &[Marker]) -> Result<()> {
        let handlers = self.lock_handlers().clone();
        for handler in handlers {
            if let Err(error) = handler.on_change(snapshot).await {
                warn!(handler = handler.name(), error = %error, "change handler failed");
                return Err(error);
            }
        }
        Ok(())
    }

    fn lock_markers(&self) -> std::sync::MutexGuard<'_, Vec<Marker>> {
        self.inner
            .markers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_handlers(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn ChangeHandler>>> {
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn normalize(mut markers: Vec<Marker>) -> Result<Vec<Marker>> {
    for marker in &markers {
        validate_seconds(marker.seconds)?;
    }
    sort_markers(&mut markers);
    if let Some(pair) = markers
        .windows(2)
        .find(|pair| pair[0].seconds == pair[1].seconds)
    {
        return Err(MarkerError::DuplicateMarker {
            seconds: pair[0].seconds,
        });
    }
    Ok(markers)
}

fn position(markers: &[Marker], seconds: f64) -> Result<usize> {
    markers
        .iter()
        .position(|marker| marker.seconds == seconds)
        .ok_or(MarkerError::MarkerNotFound { seconds })
}

fn ensure_free(markers: &[Marker], seconds: f64) -> Result<()> {
    if markers.iter().any(|marker| marker.seconds == seconds) {
        return Err(MarkerError::DuplicateMarker { seconds });
    }
    Ok(())
}

//! Installing, watching and tearing down the overlay on a host page.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::actions::{ActionContext, MarkerActions};
use crate::config::OverlayConfig;
use crate::error::Result;
use crate::format::FormatterRegistry;
use crate::marker::Marker;
use crate::overlay::{ActiveMarkerTracker, MarkerLabel, OverlayRenderer, SeekbarRenderer};
use crate::page::{HostServices, PageMode, PlayerPage};
use crate::retry::{Readiness, poll_until};
use crate::session::Session;
use crate::storage::MarkerStorage;
use crate::store::{ChangeHandler, MarkerStore};
use crate::time_source::{PlaybackClock, TimeSource};

type TeardownStep = Pin<Box<dyn Future<Output = ()> + Send>>;
type ReinstallPredicate = Box<dyn FnMut() -> bool + Send>;
type ReinstallPredicates = Arc<Mutex<Vec<ReinstallPredicate>>>;

#[derive(Default)]
struct TeardownSteps {
    done: bool,
    steps: Vec<(&'static str, TeardownStep)>,
}

/// Ordered cleanup steps registered by each piece as it installs.
///
/// Steps run once, in registration order. A step added after the teardown
/// already ran is executed immediately, so a half-finished install still
/// cleans up after itself.
#[derive(Default)]
pub struct Teardown {
    inner: Mutex<TeardownSteps>,
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Teardown")
            .field("done", &inner.done)
            .field(
                "steps",
                &inner.steps.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Teardown {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add<F>(&self, name: &'static str, step: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        {
            let mut inner = self.lock();
            if !inner.done {
                inner.steps.push((name, Box::pin(step)));
                return;
            }
        }
        debug!(step = name, "teardown step added after uninstall, running now");
        step.await;
    }

    /// Runs every pending step. Later calls do nothing.
    pub async fn run(&self) {
        let steps = {
            let mut inner = self.lock();
            inner.done = true;
            std::mem::take(&mut inner.steps)
        };
        for (name, step) in steps {
            debug!(step = name, "teardown step");
            step.await;
        }
    }

    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TeardownSteps> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninstalled,
    Installing,
    Installed,
    /// Setup hit a fatal error. Only the navigation watcher is left running.
    Failed,
    Uninstalling,
}

/// How a call to [`LifecycleController::install`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Overlay, tracker and handlers are live.
    Installed,
    /// The page has no player; waiting for one to appear.
    NoPlayer,
    /// Another install or an uninstall superseded this one.
    Superseded,
}

/// Why the overlay should be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReinstallReason {
    Navigation { from: String, to: String },
    PlayerAppeared,
    Predicate,
    Requested,
}

/// One attempt at putting the overlay on the page.
pub struct Installation {
    session: Arc<Session>,
    teardown: Teardown,
    state: Mutex<LifecycleState>,
    actions: OnceLock<Arc<MarkerActions>>,
}

impl Installation {
    fn new(session: Session) -> Self {
        Self {
            session: Arc::new(session),
            teardown: Teardown::new(),
            state: Mutex::new(LifecycleState::Installing),
            actions: OnceLock::new(),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn actions(&self) -> Option<Arc<MarkerActions>> {
        self.actions.get().cloned()
    }

    fn set_state(&self, state: LifecycleState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    async fn shut_down(&self) {
        self.set_state(LifecycleState::Uninstalling);
        self.session.close();
        self.teardown.run().await;
        self.set_state(LifecycleState::Uninstalled);
    }
}

/// Writes the list back to storage after every change.
struct PersistenceHandler {
    storage: MarkerStorage,
    registry: Arc<FormatterRegistry>,
    session: Arc<Session>,
}

#[async_trait]
impl ChangeHandler for PersistenceHandler {
    fn name(&self) -> &str {
        "persistence"
    }

    async fn on_change(&self, markers: &[Marker]) -> Result<()> {
        let Some(video_id) = self.session.video_id(false).await else {
            debug!("video id unknown, markers not saved");
            return Ok(());
        };
        self.storage.save_markers(&video_id, &self.registry, markers)
    }
}

/// Keeps at most one overlay installed and rebuilds it when the page moves on.
pub struct LifecycleController {
    host: HostServices,
    config: OverlayConfig,
    registry: Arc<FormatterRegistry>,
    current: tokio::sync::Mutex<Option<Arc<Installation>>>,
    reinstall_tx: mpsc::UnboundedSender<ReinstallReason>,
    reinstall_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ReinstallReason>>,
    predicates: ReinstallPredicates,
}

impl LifecycleController {
    pub fn new(host: HostServices, config: OverlayConfig, registry: Arc<FormatterRegistry>) -> Self {
        let (reinstall_tx, reinstall_rx) = mpsc::unbounded_channel();
        Self {
            host,
            config,
            registry,
            current: tokio::sync::Mutex::new(None),
            reinstall_tx,
            reinstall_rx: tokio::sync::Mutex::new(reinstall_rx),
            predicates: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn state(&self) -> LifecycleState {
        self.current
            .lock()
            .await
            .as_ref()
            .map_or(LifecycleState::Uninstalled, |installation| installation.state())
    }

    pub async fn installation(&self) -> Option<Arc<Installation>> {
        self.current.lock().await.clone()
    }

    pub async fn actions(&self) -> Option<Arc<MarkerActions>> {
        self.current
            .lock()
            .await
            .as_ref()
            .and_then(|installation| installation.actions())
    }

    /// Asks [`run`](Self::run) to rebuild the overlay.
    pub fn request_reinstall(&self) {
        let _ = self.reinstall_tx.send(ReinstallReason::Requested);
    }

    /// Registers a one-shot reinstall condition.
    ///
    /// The navigation watcher evaluates it on every poll and drops it the
    /// first time it returns `true`.
    pub fn reinstall_when(&self, predicate: impl FnMut() -> bool + Send + 'static) {
        self.predicates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(predicate));
    }

    /// Uninstalls whatever is installed, then installs afresh.
    ///
    /// Waits without a deadline for the page to become ready. A fatal setup
    /// error is reported to the user and returned; the navigation watcher is
    /// kept so leaving the page still triggers a reinstall.
    pub async fn install(&self) -> Result<InstallOutcome> {
        let installation = {
            let mut current = self.current.lock().await;
            if let Some(previous) = current.take() {
                previous.shut_down().await;
            }
            let installation = Arc::new(Installation::new(Session::new(
                self.host.identity.clone(),
            )));
            *current = Some(installation.clone());
            installation
        };
        info!("installing overlay");

        match self.setup(&installation).await {
            Ok(outcome) => {
                if outcome != InstallOutcome::Superseded {
                    installation.set_state(LifecycleState::Installed);
                    info!(?outcome, "overlay installed");
                }
                Ok(outcome)
            }
            Err(setup_error) => {
                if !installation.session.is_shut_down() {
                    installation.set_state(LifecycleState::Failed);
                }
                error!(error = %setup_error, "overlay installation failed");
                Err(setup_error)
            }
        }
    }

    /// Tears the current installation down. Safe to call repeatedly.
    pub async fn uninstall(&self) {
        let mut current = self.current.lock().await;
        if let Some(installation) = current.take() {
            info!("uninstalling overlay");
            installation.shut_down().await;
        }
    }

    /// Installs, then reinstalls on every reinstall signal until `shutdown`.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut reinstall_rx = self.reinstall_rx.lock().await;
        if let Err(install_error) = self.install().await {
            warn!(error = %install_error, "initial install failed");
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                reason = reinstall_rx.recv() => {
                    let Some(reason) = reason else { break };
                    info!(?reason, "reinstalling overlay");
                    if let Err(install_error) = self.install().await {
                        warn!(error = %install_error, "reinstall failed");
                    }
                }
            }
        }
        self.uninstall().await;
    }

    async fn setup(&self, installation: &Arc<Installation>) -> Result<InstallOutcome> {
        let page = self.host.page.clone();
        let session = installation.session.clone();
        let cancel = session.shutdown_token();
        let teardown = &installation.teardown;

        let document_ready = poll_until(
            || {
                let page = page.clone();
                async move { Readiness::from(page.document_ready().await) }
            },
            self.config.setup_poll(),
            self.config.setup_poll(),
            &cancel,
        )
        .await;
        if !document_ready {
            return Ok(InstallOutcome::Superseded);
        }

        let mode = page.mode().await;
        let watcher_cancel = cancel.child_token();
        let watcher = spawn_navigation_watcher(
            page.clone(),
            self.config.navigation_poll(),
            !mode.has_player(),
            self.predicates.clone(),
            self.reinstall_tx.clone(),
            watcher_cancel.clone(),
        )
        .await;
        teardown
            .add("navigation watcher", stop_task(watcher_cancel, watcher))
            .await;

        let Some(clock) = PlaybackClock::for_mode(mode, page.clone(), &self.config) else {
            info!("no player on page, waiting for one");
            return Ok(InstallOutcome::NoPlayer);
        };

        let storage = MarkerStorage::new(self.host.storage.clone(), &self.config);
        let markers = match session.video_id(false).await {
            Some(video_id) => self.load_markers(&storage, &video_id).await?,
            None => Vec::new(),
        };

        let player_ready = poll_until(
            || {
                let page = page.clone();
                async move {
                    if page.advertisement_active().await {
                        Readiness::Backoff
                    } else {
                        Readiness::from(page.player_controls_present().await)
                    }
                }
            },
            self.config.setup_poll(),
            self.config.advertisement_backoff(),
            &cancel,
        )
        .await;
        if !player_ready {
            return Ok(InstallOutcome::Superseded);
        }

        let store = match MarkerStore::new(markers) {
            Ok(store) => store,
            Err(load_error) => {
                self.host
                    .dialogs
                    .alert(&format!("Stored markers could not be loaded: {load_error}"))
                    .await;
                return Err(load_error);
            }
        };

        store.register_handler(Arc::new(PersistenceHandler {
            storage: storage.clone(),
            registry: self.registry.clone(),
            session: session.clone(),
        }));

        let renderer = Arc::new(OverlayRenderer::new(
            self.host.overlay.clone(),
            self.config.minimal_min_places,
        ));
        store.register_handler(renderer.clone());
        {
            let renderer = renderer.clone();
            let store = store.clone();
            teardown
                .add("marker list", async move {
                    store.clear_handlers();
                    renderer.hide();
                })
                .await;
        }

        let seekbar = match (&self.host.seekbar, mode) {
            (Some(surface), PageMode::Vod) => {
                let seekbar = Arc::new(SeekbarRenderer::new(surface.clone(), page.clone()));
                store.register_handler(seekbar.clone());
                let cleanup = seekbar.clone();
                teardown
                    .add("seekbar dots", async move { cleanup.clear() })
                    .await;
                Some(seekbar)
            }
            _ => None,
        };

        let clock: Arc<dyn TimeSource> = Arc::new(clock);
        let label = Arc::new(MarkerLabel::new(self.host.overlay.clone()));
        let tracker_cancel = cancel.child_token();
        let tracker = ActiveMarkerTracker::new(
            store.clone(),
            clock.clone(),
            renderer.clone(),
            label.clone(),
            self.config.highlight_poll(),
        )
        .spawn(tracker_cancel.clone());
        teardown
            .add("active marker tracker", stop_task(tracker_cancel, tracker))
            .await;
        {
            let label = label.clone();
            teardown
                .add("current marker label", async move { label.clear() })
                .await;
        }

        if !store.is_empty() {
            let snapshot = store.snapshot();
            renderer.render(&snapshot);
            if let Some(seekbar) = &seekbar {
                seekbar.render(&snapshot).await;
            }
        }

        let actions = MarkerActions::new(
            self.host.clone(),
            ActionContext {
                store,
                session: session.clone(),
                clock,
                mode,
                renderer,
                label,
                registry: self.registry.clone(),
                storage,
                share_base_url: self.config.share_base_url.clone(),
            },
        );
        let _ = installation.actions.set(Arc::new(actions));

        if cancel.is_cancelled() {
            return Ok(InstallOutcome::Superseded);
        }
        Ok(InstallOutcome::Installed)
    }

    async fn load_markers(&self, storage: &MarkerStorage, video_id: &str) -> Result<Vec<Marker>> {
        match storage.load_markers(video_id, &self.registry) {
            Ok(markers) => {
                debug!(video_id, count = markers.len(), "markers loaded");
                Ok(markers)
            }
            Err(load_error) => {
                self.host
                    .dialogs
                    .alert(&format!("Stored markers could not be loaded: {load_error}"))
                    .await;
                Err(load_error)
            }
        }
    }
}

/// Polls the page location, the registered predicates and, on pages without
/// a player, the page mode.
///
/// Sends one reinstall signal and stops.
async fn spawn_navigation_watcher(
    page: Arc<dyn PlayerPage>,
    period: std::time::Duration,
    wait_for_player: bool,
    predicates: ReinstallPredicates,
    reinstall: mpsc::UnboundedSender<ReinstallReason>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let initial = page.location().await;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let location = page.location().await;
            if location != initial {
                debug!(from = %initial, to = %location, "navigation detected");
                let _ = reinstall.send(ReinstallReason::Navigation {
                    from: initial,
                    to: location,
                });
                return;
            }

            if take_fired_predicate(&predicates) {
                debug!("reinstall predicate fired");
                let _ = reinstall.send(ReinstallReason::Predicate);
                return;
            }

            if wait_for_player && page.mode().await.has_player() {
                debug!("player appeared");
                let _ = reinstall.send(ReinstallReason::PlayerAppeared);
                return;
            }
        }
    })
}

fn take_fired_predicate(predicates: &Mutex<Vec<ReinstallPredicate>>) -> bool {
    let mut predicates = predicates.lock().unwrap_or_else(PoisonError::into_inner);
    match predicates.iter_mut().position(|predicate| predicate()) {
        Some(index) => {
            drop(predicates.remove(index));
            true
        }
        None => false,
    }
}

async fn stop_task(cancel: CancellationToken, task: JoinHandle<()>) {
    cancel.cancel();
    if let Err(join_error) = task.await {
        if join_error.is_panic() {
            warn!(error = %join_error, "background task panicked");
        }
    }
}

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use markers::page::{DiagnosticsReadout, ListItem, SeekbarDot};
use markers::{
    Clipboard, Dialogs, FormatterRegistry, HostServices, KeyValueStore, LifecycleController,
    MemoryStore, OverlayConfig, OverlaySurface, PageControl, PageMode, PersistedRecord,
    PlayerPage, Result, SeekbarSurface, VideoIdentity,
};

pub struct PageState {
    pub mode: PageMode,
    pub location: String,
    pub document_ready: bool,
    pub controls_present: bool,
    pub advertisement: bool,
    pub elapsed: Option<String>,
    pub live_clock: Option<String>,
    pub stats_visible: bool,
    pub stats_clickable: bool,
    pub menu_open: bool,
    pub advanced_open: bool,
    pub readout: DiagnosticsReadout,
    pub duration: Option<f64>,
    pub clicks: Vec<PageControl>,
    pub seeks: Vec<f64>,
}

pub struct FakePage(Mutex<PageState>);

impl FakePage {
    pub fn new(mode: PageMode) -> Arc<Self> {
        Arc::new(Self(Mutex::new(PageState {
            mode,
            location: String::from("https://www.twitch.tv/videos/1"),
            document_ready: true,
            controls_present: true,
            advertisement: false,
            elapsed: Some(String::from("00:00")),
            live_clock: Some(String::from("00:00")),
            stats_visible: false,
            stats_clickable: true,
            menu_open: false,
            advanced_open: false,
            readout: DiagnosticsReadout {
                latency: String::from("2.0 sec."),
                buffer: String::from("3.0 sec."),
            },
            duration: Some(1_000.0),
            clicks: Vec::new(),
            seeks: Vec::new(),
        })))
    }

    pub fn state(&self) -> MutexGuard<'_, PageState> {
        self.0.lock().expect("page lock")
    }

    pub fn settings_clicks(&self) -> usize {
        self.state()
            .clicks
            .iter()
            .filter(|control| **control == PageControl::SettingsButton)
            .count()
    }
}

#[async_trait]
impl PlayerPage for FakePage {
    async fn mode(&self) -> PageMode {
        self.state().mode
    }

    async fn location(&self) -> String {
        self.state().location.clone()
    }

    async fn document_ready(&self) -> bool {
        self.state().document_ready
    }

    async fn player_controls_present(&self) -> bool {
        self.state().controls_present
    }

    async fn advertisement_active(&self) -> bool {
        self.state().advertisement
    }

    async fn elapsed_time_text(&self) -> Option<String> {
        self.state().elapsed.clone()
    }

    async fn live_clock_text(&self) -> Option<String> {
        self.state().live_clock.clone()
    }

    async fn diagnostics(&self) -> Option<DiagnosticsReadout> {
        let state = self.state();
        state.stats_visible.then(|| state.readout.clone())
    }

    async fn duration_seconds(&self) -> Option<f64> {
        self.state().duration
    }

    async fn click(&self, control: PageControl) -> bool {
        let mut state = self.state();
        if !state.stats_clickable {
            return false;
        }
        // The advanced entry and the stats toggle only exist inside the open menu.
        match control {
            PageControl::SettingsButton => {
                state.menu_open = !state.menu_open;
                state.advanced_open = false;
            }
            PageControl::AdvancedMenu if state.menu_open => state.advanced_open = true,
            PageControl::VideoStatsToggle if state.advanced_open => {
                state.stats_visible = !state.stats_visible;
            }
            _ => return false,
        }
        state.clicks.push(control);
        true
    }

    async fn seek(&self, seconds: f64) {
        self.state().seeks.push(seconds);
    }
}

#[derive(Default)]
pub struct OverlayState {
    pub items: Vec<ListItem>,
    pub highlighted: Option<usize>,
    pub visible: bool,
    pub label: Option<String>,
}

#[derive(Default)]
pub struct FakeOverlay(Mutex<OverlayState>);

impl FakeOverlay {
    pub fn state(&self) -> MutexGuard<'_, OverlayState> {
        self.0.lock().expect("overlay lock")
    }

    pub fn names(&self) -> Vec<String> {
        self.state().items.iter().map(|item| item.name.clone()).collect()
    }
}

impl OverlaySurface for FakeOverlay {
    fn item_count(&self) -> usize {
        self.state().items.len()
    }

    fn item(&self, index: usize) -> Option<ListItem> {
        self.state().items.get(index).cloned()
    }

    fn push_item(&self, item: ListItem) {
        self.state().items.push(item);
    }

    fn set_item_seconds(&self, index: usize, seconds: f64) {
        self.state().items[index].seconds = seconds;
    }

    fn set_time_label(&self, index: usize, label: &str) {
        self.state().items[index].time_label = label.to_string();
    }

    fn set_name(&self, index: usize, name: &str) {
        self.state().items[index].name = name.to_string();
    }

    fn truncate(&self, len: usize) {
        self.state().items.truncate(len);
    }

    fn highlighted(&self) -> Option<usize> {
        self.state().highlighted
    }

    fn set_highlighted(&self, index: Option<usize>) {
        self.state().highlighted = index;
    }

    fn set_list_visible(&self, visible: bool) {
        self.state().visible = visible;
    }

    fn list_visible(&self) -> bool {
        self.state().visible
    }

    fn set_current_marker_label(&self, name: Option<&str>) {
        self.state().label = name.map(str::to_string);
    }
}

#[derive(Default)]
pub struct FakeSeekbar(Mutex<Vec<SeekbarDot>>);

impl FakeSeekbar {
    pub fn dots(&self) -> Vec<SeekbarDot> {
        self.0.lock().expect("seekbar lock").clone()
    }
}

impl SeekbarSurface for FakeSeekbar {
    fn dot_count(&self) -> usize {
        self.0.lock().expect("seekbar lock").len()
    }

    fn dot(&self, index: usize) -> Option<SeekbarDot> {
        self.0.lock().expect("seekbar lock").get(index).cloned()
    }

    fn push_dot(&self, dot: SeekbarDot) {
        self.0.lock().expect("seekbar lock").push(dot);
    }

    fn set_dot(&self, index: usize, dot: SeekbarDot) {
        self.0.lock().expect("seekbar lock")[index] = dot;
    }

    fn truncate_dots(&self, len: usize) {
        self.0.lock().expect("seekbar lock").truncate(len);
    }
}

#[derive(Default)]
pub struct DialogState {
    pub answers: VecDeque<Option<String>>,
    pub prompts: Vec<(String, String)>,
    pub alerts: Vec<String>,
    pub choices: VecDeque<Option<String>>,
}

#[derive(Default)]
pub struct FakeDialogs(Mutex<DialogState>);

impl FakeDialogs {
    pub fn state(&self) -> MutexGuard<'_, DialogState> {
        self.0.lock().expect("dialog lock")
    }

    pub fn answer(&self, answer: Option<&str>) {
        self.state().answers.push_back(answer.map(str::to_string));
    }
}

#[async_trait]
impl Dialogs for FakeDialogs {
    async fn prompt(&self, message: &str, seed: &str) -> Option<String> {
        let mut state = self.state();
        state.prompts.push((message.to_string(), seed.to_string()));
        state.answers.pop_front().flatten()
    }

    async fn alert(&self, message: &str) {
        self.state().alerts.push(message.to_string());
    }

    async fn choose(&self, _message: &str, _options: &[(String, String)]) -> Option<String> {
        self.state().choices.pop_front().flatten()
    }
}

#[derive(Default)]
pub struct FakeClipboard(Mutex<Vec<String>>);

impl FakeClipboard {
    pub fn texts(&self) -> Vec<String> {
        self.0.lock().expect("clipboard lock").clone()
    }
}

#[async_trait]
impl Clipboard for FakeClipboard {
    async fn write_text(&self, text: &str) -> Result<()> {
        self.0.lock().expect("clipboard lock").push(text.to_string());
        Ok(())
    }
}

pub struct FakeIdentity(pub Option<String>);

#[async_trait]
impl VideoIdentity for FakeIdentity {
    async fn video_id(&self, _prompt_if_missing: bool) -> Option<String> {
        self.0.clone()
    }
}

pub struct Harness {
    pub page: Arc<FakePage>,
    pub overlay: Arc<FakeOverlay>,
    pub seekbar: Arc<FakeSeekbar>,
    pub dialogs: Arc<FakeDialogs>,
    pub clipboard: Arc<FakeClipboard>,
    pub storage: Arc<MemoryStore>,
    pub host: HostServices,
}

impl Harness {
    pub fn new(mode: PageMode, video_id: Option<&str>) -> Self {
        let page = FakePage::new(mode);
        let overlay = Arc::new(FakeOverlay::default());
        let seekbar = Arc::new(FakeSeekbar::default());
        let dialogs = Arc::new(FakeDialogs::default());
        let clipboard = Arc::new(FakeClipboard::default());
        let storage = Arc::new(MemoryStore::new());
        let host = HostServices {
            page: page.clone(),
            overlay: overlay.clone(),
            seekbar: Some(seekbar.clone()),
            dialogs: dialogs.clone(),
            clipboard: clipboard.clone(),
            identity: Arc::new(FakeIdentity(video_id.map(str::to_string))),
            storage: storage.clone(),
        };
        Self {
            page,
            overlay,
            seekbar,
            dialogs,
            clipboard,
            storage,
            host,
        }
    }

    pub fn vod() -> Self {
        Self::new(PageMode::Vod, Some("v1"))
    }

    pub fn seed(&self, video_id: &str, formatter: &str, content: &str) {
        let record = PersistedRecord {
            formatter: formatter.to_string(),
            content: content.to_string(),
        };
        self.storage
            .set(
                &format!("r2_twitch_user_markers_{video_id}"),
                &serde_json::to_string(&record).expect("record json"),
            )
            .expect("seed record");
    }

    pub fn record(&self, video_id: &str) -> Option<PersistedRecord> {
        self.storage
            .get(&format!("r2_twitch_user_markers_{video_id}"))
            .expect("read record")
            .map(|raw| serde_json::from_str(&raw).expect("record json"))
    }

    pub fn controller(&self) -> LifecycleController {
        let config = OverlayConfig::default();
        let registry = Arc::new(FormatterRegistry::with_builtin(config.minimal_min_places));
        LifecycleController::new(self.host.clone(), config, registry)
    }
}

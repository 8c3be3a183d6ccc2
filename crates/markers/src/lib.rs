//! UI-agnostic core of the video marker overlay.

pub mod actions;
pub mod config;
pub mod dhms;
pub mod error;
pub mod format;
pub mod lifecycle;
pub mod marker;
pub mod overlay;
pub mod page;
pub mod retry;
pub mod session;
pub mod storage;
pub mod store;
pub mod time_source;

pub use actions::{ActionContext, MarkerActions};
pub use config::OverlayConfig;
pub use error::{ErrorClass, MarkerError, Result};
pub use format::{FormatterRegistry, JsonFormatter, MarkerFormatter, MinimalFormatter};
pub use lifecycle::{
    InstallOutcome, Installation, LifecycleController, LifecycleState, ReinstallReason, Teardown,
};
pub use marker::Marker;
pub use overlay::{
    ActiveMarkerTracker, MarkerLabel, OverlayRenderer, RenderStats, SeekbarRenderer,
};
pub use page::{
    Clipboard, Dialogs, HostServices, OverlaySurface, PageControl, PageMode, PlayerPage,
    SeekbarSurface, VideoIdentity,
};
pub use session::{CancelStack, CancelTicket, Session};
pub use storage::{JsonFileStore, KeyValueStore, MarkerStorage, MemoryStore, PersistedRecord};
pub use store::{ChangeHandler, MarkerStore};
pub use time_source::{LiveTimeSource, PlaybackClock, TimeSource, VodTimeSource};

pub mod aux_sync;
pub mod client;
pub mod coalescer;
pub mod config;
pub mod error;
pub mod hub;
pub mod mirror;
pub mod requests;
pub mod supervisor;
pub mod transition;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use aux_sync::{AuxToggle, AuxiliarySourceSync};
pub use client::{ObsApi, ObsClient, ObsEvent, EVENT_CAP};
pub use coalescer::NotificationCoalescer;
pub use config::{guard_volume_db, HubConfig, TimetablePolarity};
pub use error::HubError;
pub use hub::{HubSnapshot, ObsHub};
pub use mirror::{RemoteStateMirror, Role, Scene, SceneView, TrackedSource};
pub use supervisor::{ConnectionState, ConnectionSupervisor};
pub use transition::{plan_crossfade, TransitionScheduler};

/// Shared state stays usable after a panicking holder; every writer leaves it
/// consistent between statements.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

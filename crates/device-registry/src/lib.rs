//! device-registry: alias registry and live-session reconciler for brewing hardware

mod types;
pub use types::*;

mod error;
pub use error::{Action, RegistryError, Result, StoreError};

mod session;
pub use session::{BrewSession, FermSession, ISpindelSession, Session, StillSession, TiltSession};

mod registry;
pub use registry::{ActiveSessions, Located, SessionRegistry};

mod storage;
pub use storage::{ConfigStorage, YamlFile};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::MemoryStorage;

mod store;
pub use store::{ConfigCache, ConfigStore};

mod request;
pub use request::{resolve_type, DeviceForm, DeviceRequest};

mod stats;
pub use stats::{ArchiveStats, DeviceStats, LastSession, NoStats, SessionKind, StatsCollector};

mod metrics;
pub use metrics::{MetricsHub, RegistryMetrics};

mod reconciler;
pub use reconciler::{DeviceAction, DeviceReconciler, DevicesView, Reply};

//! Keeps the persisted alias mapping and the live session registries in step.
//!
//! Every mutation writes the configuration first and only touches the session
//! registries once that write has landed. A failed write therefore leaves
//! both sides exactly as they were.

use crate::error::{Action, RegistryError, Result};
use crate::metrics::MetricsHub;
use crate::registry::ActiveSessions;
use crate::request::DeviceRequest;
use crate::session::{BrewSession, FermSession, ISpindelSession, Session, StillSession, TiltSession};
use crate::stats::{DeviceStats, NoStats, StatsCollector};
use crate::storage::ConfigStorage;
use crate::store::ConfigStore;
use crate::types::{AliasMapping, DeviceFamily, DeviceType, MergedView};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// What the device page renders.
#[derive(Debug, Clone, Serialize)]
pub struct DevicesView<'a> {
    pub aliases: MergedView,
    pub active_sessions: &'a ActiveSessions,
    pub machine_stats: BTreeMap<String, DeviceStats>,
}

/// Result of [`DeviceReconciler::apply`].
#[derive(Debug)]
pub enum Reply<'a> {
    View(DevicesView<'a>),
    NoContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAction {
    Register(DeviceRequest),
    Update(DeviceRequest),
    Delete {
        uid: String,
        device_type: Option<DeviceType>,
    },
}

pub struct DeviceReconciler<B> {
    store: ConfigStore<B>,
    sessions: ActiveSessions,
    stats: Box<dyn StatsCollector + Send + Sync>,
    metrics: Option<MetricsHub>,
}

impl<B: ConfigStorage> DeviceReconciler<B> {
    pub fn new(store: ConfigStore<B>, sessions: ActiveSessions) -> Self {
        Self {
            store,
            sessions,
            stats: Box::new(NoStats),
            metrics: None,
        }
    }

    /// Reconciler whose sessions mirror the aliases currently in the store.
    pub fn bootstrap(store: ConfigStore<B>) -> Self {
        let mut sessions = ActiveSessions::new();
        sessions.seed(&store.cached().aliases);
        Self::new(store, sessions)
    }

    pub fn with_stats(mut self, stats: impl StatsCollector + Send + Sync + 'static) -> Self {
        self.stats = Box::new(stats);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsHub) -> Self {
        metrics
            .dev
            .devices_registered
            .set(gauge_value(self.sessions.claimed_count()));
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &ConfigStore<B> {
        &self.store
    }

    pub fn sessions(&self) -> &ActiveSessions {
        &self.sessions
    }

    pub fn apply(&mut self, action: DeviceAction) -> Result<Reply<'_>> {
        match action {
            DeviceAction::Register(req) => self.register(req).map(Reply::View),
            DeviceAction::Update(req) => self.update(req).map(Reply::View),
            DeviceAction::Delete { uid, device_type } => {
                self.delete(&uid, device_type)?;
                Ok(Reply::NoContent)
            }
        }
    }

    /// Current merged aliases and sessions, plus brew machine statistics when
    /// a collector reports them.
    pub fn view(&self) -> DevicesView<'_> {
        let machine_stats = self
            .sessions
            .brew
            .iter()
            .filter_map(|(uid, s)| {
                self.stats
                    .device_stats(uid, s.device_type)
                    .map(|stats| (uid.to_string(), stats))
            })
            .collect();
        DevicesView {
            aliases: self.store.cached().aliases.merged_view(),
            active_sessions: &self.sessions,
            machine_stats,
        }
    }

    /// Register a new device, or claim a placeholder session with no alias.
    pub fn register(&mut self, req: DeviceRequest) -> Result<DevicesView<'_>> {
        debug!(
            machine_type = %req.device_type,
            uid = %req.uid,
            alias = %req.alias,
            ip_addr = ?req.ip_addr,
            "register device"
        );
        if let Err(e) = req.validate() {
            error!("{e}");
            return Err(e);
        }
        if self.sessions.is_claimed(&req.uid) {
            let e = RegistryError::Conflict(req.uid.clone());
            error!("{e}");
            return Err(e);
        }

        let ty = req.device_type;
        self.persist(Action::Register, &req.uid, |aliases| {
            aliases.insert(ty, &req.uid, &req.alias);
        })?;

        let uid = req.uid.as_str();
        match ty.family() {
            DeviceFamily::Brew => {
                let s = self.sessions.brew.upsert(uid, || BrewSession::new(ty));
                s.reclassify(ty);
                s.needs_firmware_sync = s.has_alt_firmware;
                s.set_alias(&req.alias);
            }
            DeviceFamily::Still => {
                let s = self.sessions.still.upsert(uid, || StillSession::new(uid));
                s.set_alias(&req.alias);
                s.ip_address = req.ip_addr.clone();
            }
            family @ (DeviceFamily::Ferm | DeviceFamily::ISpindel | DeviceFamily::Tilt) => {
                self.set_plain_alias(family, uid, &req.alias);
            }
        }
        self.refresh_gauge();
        info!(uid, machine_type = %ty, "device registered");
        Ok(self.view())
    }

    /// Change the alias (and for brew machines the firmware variant) of a
    /// registered device. An empty alias removes the device.
    pub fn update(&mut self, req: DeviceRequest) -> Result<DevicesView<'_>> {
        debug!(
            machine_type = %req.device_type,
            uid = %req.uid,
            alias = %req.alias,
            ip_addr = ?req.ip_addr,
            "update device"
        );
        let Some(current) = self.sessions.locate(&req.uid) else {
            let e = RegistryError::NotFound(req.uid.clone());
            error!("{e}");
            return Err(e);
        };
        let (current_family, current_type) = (current.family, current.device_type);

        let ty = req.device_type;
        if ty.family() != current_family {
            let e = RegistryError::Validation(format!(
                "Product ID {} is a {current_family} device and cannot become {ty}",
                req.uid
            ));
            error!("{e}");
            return Err(e);
        }

        if req.alias.is_empty() {
            self.remove(Action::Update, &req.uid, Some(ty))?;
            return Ok(self.view());
        }

        self.persist(Action::Update, &req.uid, |aliases| {
            clear_buckets(aliases, &req.uid, &[current_type, ty]);
            aliases.insert(ty, &req.uid, &req.alias);
        })?;

        let uid = req.uid.as_str();
        match current_family {
            DeviceFamily::Brew => {
                let s = self.sessions.brew.upsert(uid, || BrewSession::new(current_type));
                let flipped = s.reclassify(ty);
                s.needs_firmware_sync = flipped;
                s.set_alias(&req.alias);
                if flipped {
                    info!(uid, has_alt_firmware = s.has_alt_firmware, "firmware change pending");
                }
            }
            DeviceFamily::Still => {
                let s = self.sessions.still.upsert(uid, || StillSession::new(uid));
                s.set_alias(&req.alias);
                s.ip_address = req.ip_addr.clone();
            }
            family @ (DeviceFamily::Ferm | DeviceFamily::ISpindel | DeviceFamily::Tilt) => {
                self.set_plain_alias(family, uid, &req.alias);
            }
        }
        self.refresh_gauge();
        info!(uid, machine_type = %ty, "device updated");
        Ok(self.view())
    }

    /// Forget a device. Deleting an unknown uid succeeds without effect.
    ///
    /// Without a device type the type of the live session is used; with
    /// neither, the uid is cleared from every bucket. A device type from a
    /// different family than the live session is rejected before any write.
    pub fn delete(&mut self, uid: &str, device_type: Option<DeviceType>) -> Result<()> {
        debug!(uid, machine_type = ?device_type, "delete device");
        self.remove(Action::Delete, uid, device_type)
    }

    fn remove(&mut self, action: Action, uid: &str, device_type: Option<DeviceType>) -> Result<()> {
        let current = self.sessions.locate(uid).map(|l| (l.family, l.device_type));
        if let (Some(ty), Some((current_family, _))) = (device_type, current) {
            if ty.family() != current_family {
                let e = RegistryError::Validation(format!(
                    "Product ID {uid} is a {current_family} device, not {ty}"
                ));
                error!("{e}");
                return Err(e);
            }
        }
        let types: Vec<DeviceType> = device_type
            .into_iter()
            .chain(current.map(|(_, ty)| ty))
            .collect();

        self.persist(action, uid, |aliases| {
            if types.is_empty() {
                aliases.remove_everywhere(uid);
            } else {
                clear_buckets(aliases, uid, &types);
            }
        })?;

        let family = device_type
            .map(DeviceType::family)
            .or(current.map(|(family, _)| family));
        let removed = family.is_some_and(|f| self.sessions.remove(f, uid));
        self.refresh_gauge();
        if removed {
            info!(uid, "device removed");
        } else {
            debug!(uid, "no session to remove");
        }
        Ok(())
    }

    fn set_plain_alias(&mut self, family: DeviceFamily, uid: &str, alias: &str) {
        match family {
            DeviceFamily::Ferm => self.sessions.ferm.upsert(uid, FermSession::default).set_alias(alias),
            DeviceFamily::ISpindel => self
                .sessions
                .ispindel
                .upsert(uid, ISpindelSession::default)
                .set_alias(alias),
            DeviceFamily::Tilt => self.sessions.tilt.upsert(uid, TiltSession::default).set_alias(alias),
            // callers handle the families with extra fields
            DeviceFamily::Brew | DeviceFamily::Still => {}
        }
    }

    fn persist<F>(&self, action: Action, uid: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut AliasMapping),
    {
        match self.store.rewrite(mutate) {
            Ok(_) => {
                if let Some(m) = &self.metrics {
                    m.dev.config_writes.inc();
                }
                Ok(())
            }
            Err(source) => {
                if let Some(m) = &self.metrics {
                    m.dev.config_write_failures.inc();
                }
                error!(uid, %action, error = %source, "configuration not updated");
                Err(RegistryError::Persistence {
                    uid: uid.to_string(),
                    action,
                    source,
                })
            }
        }
    }

    fn refresh_gauge(&self) {
        if let Some(m) = &self.metrics {
            m.dev
                .devices_registered
                .set(gauge_value(self.sessions.claimed_count()));
        }
    }
}

/// Remove `uid` from each listed bucket, and from both halves of the
/// PicoBrewC pair when either half is listed.
fn clear_buckets(aliases: &mut AliasMapping, uid: &str, types: &[DeviceType]) {
    for ty in types {
        if ty.is_classic_pair() {
            aliases.remove(DeviceType::PicoBrewC, uid);
            aliases.remove(DeviceType::PicoBrewCAlt, uid);
        } else {
            aliases.remove(*ty, uid);
        }
    }
}

fn gauge_value(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::mock::MemoryStorage;
    use crate::stats::{LastSession, SessionKind};
    use crate::storage::YamlFile;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use std::sync::Arc;

    const EMPTY: &str = "aliases: {}\n";

    fn reconciler(doc: &str) -> (Arc<MemoryStorage>, DeviceReconciler<Arc<MemoryStorage>>) {
        let backend = Arc::new(MemoryStorage::new(doc));
        let store = ConfigStore::open(Arc::clone(&backend)).unwrap();
        (backend, DeviceReconciler::bootstrap(store))
    }

    fn stored(r: &DeviceReconciler<Arc<MemoryStorage>>, ty: DeviceType, uid: &str) -> Option<String> {
        r.store()
            .load()
            .unwrap()
            .aliases
            .alias(ty, uid)
            .map(str::to_string)
    }

    fn req(ty: DeviceType, uid: &str, alias: &str) -> DeviceRequest {
        DeviceRequest::new(ty, uid, alias)
    }

    #[test]
    fn test_register_fresh_device() {
        let (_, mut r) = reconciler(EMPTY);
        r.register(req(DeviceType::PicoFerm, "F1", "Conical")).unwrap();

        assert!(r.sessions().is_registered_anywhere("F1"));
        assert_eq!(stored(&r, DeviceType::PicoFerm, "F1").as_deref(), Some("Conical"));
        assert_eq!(r.sessions().ferm.get("F1").unwrap().alias, "Conical");
    }

    #[test]
    fn test_register_into_null_bucket() {
        let (_, mut r) = reconciler("aliases:\n  Tilt:\n");
        r.register(req(DeviceType::Tilt, "T1", "Red")).unwrap();
        assert_eq!(stored(&r, DeviceType::Tilt, "T1").as_deref(), Some("Red"));
    }

    #[test]
    fn test_register_rejects_missing_fields_without_writing() {
        let (backend, mut r) = reconciler(EMPTY);
        let err = r.register(req(DeviceType::Tilt, " ", "")).unwrap_err();
        assert_eq!(err.to_string(), "Machine/Product ID and Alias are required");
        assert!(matches!(
            r.register(req(DeviceType::Tilt, "T1", "")),
            Err(RegistryError::Validation(_))
        ));
        assert_eq!(backend.writes(), 0);
        assert!(!r.sessions().is_registered_anywhere("T1"));
    }

    #[test]
    fn test_duplicate_register_conflicts_and_changes_nothing() {
        let (backend, mut r) = reconciler(EMPTY);
        r.register(req(DeviceType::ISpindel, "I1", "Spindel")).unwrap();
        let doc = backend.contents();
        let sessions = r.sessions().clone();

        let err = r.register(req(DeviceType::Tilt, "I1", "Other")).unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(ref uid) if uid == "I1"));
        assert_eq!(backend.contents(), doc);
        assert_eq!(r.sessions(), &sessions);
    }

    #[test]
    fn test_placeholder_session_can_be_claimed() {
        let backend = Arc::new(MemoryStorage::new(EMPTY));
        let store = ConfigStore::open(Arc::clone(&backend)).unwrap();
        let mut sessions = ActiveSessions::new();
        sessions.tilt.upsert("X1", TiltSession::default);
        let mut r = DeviceReconciler::new(store, sessions);

        r.register(req(DeviceType::PicoFerm, "X1", "Claimed")).unwrap();
        assert_eq!(r.sessions().ferm.get("X1").unwrap().alias, "Claimed");
        assert_eq!(stored(&r, DeviceType::PicoFerm, "X1").as_deref(), Some("Claimed"));
    }

    fn with_brew_placeholder(uid: &str) -> (Arc<MemoryStorage>, DeviceReconciler<Arc<MemoryStorage>>) {
        let backend = Arc::new(MemoryStorage::new(EMPTY));
        let store = ConfigStore::open(Arc::clone(&backend)).unwrap();
        let mut sessions = ActiveSessions::new();
        sessions.brew.upsert(uid, || BrewSession::new(DeviceType::Zymatic));
        (backend, DeviceReconciler::new(store, sessions))
    }

    #[test]
    fn test_claim_behind_placeholder_still_conflicts() {
        let (backend, mut r) = with_brew_placeholder("X");
        r.register(req(DeviceType::Tilt, "X", "Red")).unwrap();
        let doc = backend.contents();
        let sessions = r.sessions().clone();

        let err = r.register(req(DeviceType::PicoStill, "X", "Blue")).unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(ref uid) if uid == "X"));
        assert_eq!(backend.contents(), doc);
        assert_eq!(r.sessions(), &sessions);
        assert!(!r.sessions().still.contains("X"));
        assert_eq!(stored(&r, DeviceType::PicoStill, "X"), None);
    }

    #[test]
    fn test_update_and_delete_target_claimed_session_over_placeholder() {
        let (_, mut r) = with_brew_placeholder("X");
        r.register(req(DeviceType::Tilt, "X", "Red")).unwrap();

        r.update(req(DeviceType::Tilt, "X", "Green")).unwrap();
        assert_eq!(r.sessions().tilt.get("X").unwrap().alias, "Green");
        assert_eq!(stored(&r, DeviceType::Tilt, "X").as_deref(), Some("Green"));

        r.delete("X", None).unwrap();
        assert!(!r.sessions().tilt.contains("X"));
        assert_eq!(stored(&r, DeviceType::Tilt, "X"), None);
        assert!(r.sessions().brew.contains("X"));
    }

    #[test]
    fn test_delete_with_type_from_other_family_is_rejected() {
        let (backend, mut r) = reconciler("aliases:\n  PicoStill:\n    S1: Kitchen\n");
        let doc = backend.contents();

        let err = r.delete("S1", Some(DeviceType::Tilt)).unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
        assert_eq!(backend.writes(), 0);
        assert_eq!(backend.contents(), doc);
        assert_eq!(r.sessions().still.get("S1").unwrap().alias, "Kitchen");
        assert_eq!(stored(&r, DeviceType::PicoStill, "S1").as_deref(), Some("Kitchen"));
    }

    #[test]
    fn test_write_fault_leaves_store_and_sessions() {
        let (backend, mut r) = reconciler("aliases:\n  PicoStill:\n    S1: Kitchen Still\n");
        let doc = backend.contents();
        let sessions = r.sessions().clone();
        backend.fail_writes(true);

        let err = r.register(req(DeviceType::Tilt, "T1", "Red")).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Persistence {
                action: Action::Register,
                source: StoreError::Write(_),
                ..
            }
        ));
        assert_eq!(err.uid(), Some("T1"));
        assert!(r.update(req(DeviceType::PicoStill, "S1", "Garage")).is_err());
        assert!(r.delete("S1", None).is_err());

        assert_eq!(backend.contents(), doc);
        assert_eq!(r.sessions(), &sessions);
        assert_eq!(
            r.store().cached().aliases.alias(DeviceType::PicoStill, "S1"),
            Some("Kitchen Still")
        );
    }

    /// Writes part of the document next to the target, then fails.
    struct TornWrite(YamlFile);

    impl ConfigStorage for TornWrite {
        fn location(&self) -> &Path {
            self.0.location()
        }

        fn read(&self) -> std::result::Result<String, StoreError> {
            self.0.read()
        }

        fn replace(&self, contents: &str) -> std::result::Result<(), StoreError> {
            let dir = self.0.location().parent().unwrap();
            let mut tmp = tempfile::NamedTempFile::new_in(dir).unwrap();
            tmp.write_all(&contents.as_bytes()[..contents.len() / 2]).unwrap();
            Err(StoreError::Write("disk full".to_string()))
        }
    }

    #[test]
    fn test_torn_write_keeps_file_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let original = "# brew server\naliases:\n  PicoFerm:\n    F1: Conical\nport: 80\n";
        fs::write(&path, original).unwrap();

        let store = ConfigStore::open(TornWrite(YamlFile::new(&path))).unwrap();
        let mut r = DeviceReconciler::bootstrap(store);
        let sessions = r.sessions().clone();

        assert!(r.register(req(DeviceType::PicoStill, "S1", "Still")).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        assert_eq!(r.sessions(), &sessions);
    }

    #[test]
    fn test_update_toggles_alt_firmware_bucket_and_sync_flag() {
        let (_, mut r) = reconciler(EMPTY);
        r.register(req(DeviceType::PicoBrewC, "P1", "Pico C")).unwrap();
        assert!(!r.sessions().brew.get("P1").unwrap().needs_firmware_sync);

        let alt = req(DeviceType::PicoBrewC, "P1", "Pico C").with_alt_firmware(true);
        r.update(alt.clone()).unwrap();
        assert_eq!(stored(&r, DeviceType::PicoBrewC, "P1"), None);
        assert_eq!(stored(&r, DeviceType::PicoBrewCAlt, "P1").as_deref(), Some("Pico C"));
        let s = r.sessions().brew.get("P1").unwrap();
        assert!(s.has_alt_firmware);
        assert!(s.needs_firmware_sync);

        r.update(alt).unwrap();
        assert!(!r.sessions().brew.get("P1").unwrap().needs_firmware_sync);

        r.update(req(DeviceType::PicoBrewC, "P1", "Pico C")).unwrap();
        assert_eq!(stored(&r, DeviceType::PicoBrewC, "P1").as_deref(), Some("Pico C"));
        assert_eq!(stored(&r, DeviceType::PicoBrewCAlt, "P1"), None);
        let s = r.sessions().brew.get("P1").unwrap();
        assert!(!s.has_alt_firmware);
        assert!(s.needs_firmware_sync);
    }

    #[test]
    fn test_register_with_alt_firmware_needs_sync() {
        let (_, mut r) = reconciler(EMPTY);
        r.register(req(DeviceType::PicoBrew, "P2", "Alt").with_alt_firmware(true))
            .unwrap();
        let s = r.sessions().brew.get("P2").unwrap();
        assert_eq!(s.device_type, DeviceType::PicoBrewCAlt);
        assert!(s.is_pico);
        assert!(s.needs_firmware_sync);
        assert_eq!(stored(&r, DeviceType::PicoBrewCAlt, "P2").as_deref(), Some("Alt"));
    }

    #[test]
    fn test_update_within_brew_family_moves_bucket() {
        let (_, mut r) = reconciler(EMPTY);
        r.register(req(DeviceType::Zymatic, "Z1", "Old")).unwrap();
        r.update(req(DeviceType::ZSeries, "Z1", "New")).unwrap();
        assert_eq!(stored(&r, DeviceType::Zymatic, "Z1"), None);
        assert_eq!(stored(&r, DeviceType::ZSeries, "Z1").as_deref(), Some("New"));
        assert!(!r.sessions().brew.get("Z1").unwrap().is_pico);
    }

    #[test]
    fn test_update_unknown_uid_not_found() {
        let (backend, mut r) = reconciler(EMPTY);
        let err = r.update(req(DeviceType::Tilt, "T9", "Nope")).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(ref uid) if uid == "T9"));
        assert_eq!(backend.writes(), 0);
    }

    #[test]
    fn test_update_cannot_cross_families() {
        let (backend, mut r) = reconciler("aliases:\n  PicoStill:\n    S1: Kitchen\n");
        let err = r.update(req(DeviceType::PicoFerm, "S1", "Ferm")).unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
        assert_eq!(backend.writes(), 0);
        assert!(r.sessions().still.contains("S1"));
    }

    #[test]
    fn test_update_with_empty_alias_removes() {
        let (_, mut r) = reconciler("aliases:\n  Tilt:\n    T1: Red\n");
        let view = r.update(req(DeviceType::Tilt, "T1", "")).unwrap();
        assert!(!view.active_sessions.tilt.contains("T1"));
        assert_eq!(stored(&r, DeviceType::Tilt, "T1"), None);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (backend, mut r) = reconciler("aliases:\n  PicoStill:\n    S1: Kitchen\n");
        r.delete("S1", Some(DeviceType::PicoStill)).unwrap();
        assert!(!r.sessions().still.contains("S1"));
        assert_eq!(stored(&r, DeviceType::PicoStill, "S1"), None);
        let writes = backend.writes();

        r.delete("S1", Some(DeviceType::PicoStill)).unwrap();
        assert_eq!(backend.writes(), writes + 1);
        assert_eq!(stored(&r, DeviceType::PicoStill, "S1"), None);
    }

    #[test]
    fn test_delete_classic_clears_both_buckets() {
        let doc = "aliases:\n  PicoBrewC:\n    P1: a\n  PicoBrewC_Alt:\n    P1: b\n";
        let (_, mut r) = reconciler(doc);
        r.delete("P1", Some(DeviceType::PicoBrewC)).unwrap();
        assert_eq!(stored(&r, DeviceType::PicoBrewC, "P1"), None);
        assert_eq!(stored(&r, DeviceType::PicoBrewCAlt, "P1"), None);
        assert!(!r.sessions().brew.contains("P1"));
    }

    #[test]
    fn test_merged_view_leaves_store_untouched() {
        let doc = "aliases:\n  PicoBrewC:\n    A: x\n  PicoBrewC_Alt:\n    B: y\n";
        let (backend, r) = reconciler(doc);
        let view = r.view();
        let classic = view.aliases.bucket(DeviceType::PicoBrewC).unwrap();
        assert_eq!(classic.len(), 2);
        assert!(!view.aliases.contains_type(DeviceType::PicoBrewCAlt));
        assert_eq!(backend.contents(), doc);
        assert!(r.store().cached().aliases.bucket(DeviceType::PicoBrewCAlt).is_some());
    }

    struct FixedStats;

    impl StatsCollector for FixedStats {
        fn device_stats(&self, uid: &str, _device_type: DeviceType) -> Option<DeviceStats> {
            Some(DeviceStats {
                last_session: Some(LastSession {
                    kind: SessionKind::Brew,
                    name: format!("{uid} batch"),
                }),
                dirty_sessions_since_clean: 2,
                total_sessions: 7,
            })
        }
    }

    #[test]
    fn test_view_reports_brew_stats_only() {
        let doc = "aliases:\n  PicoBrew:\n    P1: Pico\n  Tilt:\n    T1: Red\n";
        let (_, r) = reconciler(doc);
        let r = r.with_stats(FixedStats);
        let view = r.view();
        assert_eq!(view.machine_stats.len(), 1);
        assert_eq!(view.machine_stats["P1"].total_sessions, 7);
    }

    #[test]
    fn test_view_without_collector_has_no_stats() {
        let (_, r) = reconciler("aliases:\n  PicoBrew:\n    P1: Pico\n");
        assert!(r.view().machine_stats.is_empty());
        let json = serde_json::to_value(r.view()).unwrap();
        assert_eq!(json["machine_stats"], serde_json::json!({}));
    }

    #[test]
    fn test_metrics_follow_mutations() {
        let (backend, r) = reconciler(EMPTY);
        let hub = MetricsHub::new().unwrap();
        let mut r = r.with_metrics(hub.clone());

        r.register(req(DeviceType::Tilt, "T1", "Red")).unwrap();
        assert_eq!(hub.dev.devices_registered.get(), 1);
        backend.fail_writes(true);
        assert!(r.register(req(DeviceType::Tilt, "T2", "Blue")).is_err());
        assert_eq!(hub.dev.config_writes.get(), 1);
        assert_eq!(hub.dev.config_write_failures.get(), 1);
    }

    #[test]
    fn test_still_lifecycle_end_to_end() {
        let (_, mut r) = reconciler(EMPTY);

        let reply = r
            .apply(DeviceAction::Register(
                req(DeviceType::PicoStill, "S1", "Kitchen Still").with_ip(Some("10.0.0.5")),
            ))
            .unwrap();
        assert!(matches!(reply, Reply::View(_)));
        assert_eq!(stored(&r, DeviceType::PicoStill, "S1").as_deref(), Some("Kitchen Still"));
        let s = r.sessions().still.get("S1").unwrap();
        assert_eq!(s.alias, "Kitchen Still");
        assert_eq!(s.ip_address.as_deref(), Some("10.0.0.5"));

        r.apply(DeviceAction::Update(
            req(DeviceType::PicoStill, "S1", "Garage Still").with_ip(Some("10.0.0.9")),
        ))
        .unwrap();
        assert_eq!(stored(&r, DeviceType::PicoStill, "S1").as_deref(), Some("Garage Still"));
        assert_eq!(
            r.sessions().still.get("S1").unwrap().ip_address.as_deref(),
            Some("10.0.0.9")
        );

        let reply = r
            .apply(DeviceAction::Delete {
                uid: "S1".into(),
                device_type: None,
            })
            .unwrap();
        assert!(matches!(reply, Reply::NoContent));
        assert_eq!(stored(&r, DeviceType::PicoStill, "S1"), None);
        assert!(!r.sessions().still.contains("S1"));
    }
}

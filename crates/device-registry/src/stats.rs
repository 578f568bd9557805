//! Per-device session statistics shown next to the alias table.

use crate::types::DeviceType;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use time::macros::format_description;
use time::PrimitiveDateTime;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Brew,
    Clean,
    Rinse,
}

impl SessionKind {
    fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("clean") {
            SessionKind::Clean
        } else if lower.contains("rinse") {
            SessionKind::Rinse
        } else {
            SessionKind::Brew
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastSession {
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceStats {
    pub last_session: Option<LastSession>,
    pub dirty_sessions_since_clean: u32,
    pub total_sessions: usize,
}

/// Source of device statistics. Read-only from the registry's point of view.
///
/// `None` means the collector has nothing to say about the device, and the
/// device is left out of the view's `machine_stats`.
pub trait StatsCollector {
    fn device_stats(&self, uid: &str, device_type: DeviceType) -> Option<DeviceStats>;
}

/// Reports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStats;

impl StatsCollector for NoStats {
    fn device_stats(&self, _uid: &str, _device_type: DeviceType) -> Option<DeviceStats> {
        None
    }
}

/// Scans a directory of archived sessions named `<YYYYMMDD_HHMMSS>#<uid>#<name>.json`.
#[derive(Debug, Clone)]
pub struct ArchiveStats {
    dir: PathBuf,
}

struct ArchivedSession {
    started: PrimitiveDateTime,
    name: String,
    kind: SessionKind,
}

impl ArchiveStats {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn sessions_for(&self, uid: &str) -> Vec<ArchivedSession> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "session archive unreadable");
                return Vec::new();
            }
        };
        let mut out: Vec<ArchivedSession> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| parse_archive_name(&entry.file_name().to_string_lossy(), uid))
            .collect();
        out.sort_by_key(|s| s.started);
        out
    }
}

fn parse_archive_name(file_name: &str, uid: &str) -> Option<ArchivedSession> {
    let stem = file_name.strip_suffix(".json")?;
    let mut parts = stem.splitn(3, '#');
    let stamp = parts.next()?;
    if parts.next()? != uid {
        return None;
    }
    let name = parts.next()?.to_string();
    let fmt = format_description!("[year][month][day]_[hour][minute][second]");
    let started = PrimitiveDateTime::parse(stamp, &fmt).ok()?;
    Some(ArchivedSession {
        started,
        kind: SessionKind::from_name(&name),
        name,
    })
}

impl StatsCollector for ArchiveStats {
    fn device_stats(&self, uid: &str, _device_type: DeviceType) -> Option<DeviceStats> {
        let sessions = self.sessions_for(uid);
        let since_clean = sessions
            .iter()
            .rposition(|s| s.kind == SessionKind::Clean)
            .map_or(&sessions[..], |i| &sessions[i + 1..]);
        let dirty = since_clean
            .iter()
            .filter(|s| s.kind == SessionKind::Brew)
            .count();
        Some(DeviceStats {
            last_session: sessions.last().map(|s| LastSession {
                kind: s.kind,
                name: s.name.clone(),
            }),
            dirty_sessions_since_clean: u32::try_from(dirty).unwrap_or(u32::MAX),
            total_sessions: sessions.len(),
        })
    }
}

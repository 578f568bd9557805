use crate::session::{BrewSession, FermSession, ISpindelSession, Session, StillSession, TiltSession};
use crate::types::{AliasMapping, DeviceFamily, DeviceType};
use serde::Serialize;
use std::collections::BTreeMap;

/// In-memory sessions of one device family, keyed by hardware uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SessionRegistry<S> {
    sessions: BTreeMap<String, S>,
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self {
            sessions: BTreeMap::new(),
        }
    }
}

impl<S: Session> SessionRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.sessions.contains_key(uid)
    }

    pub fn get(&self, uid: &str) -> Option<&S> {
        self.sessions.get(uid)
    }

    pub fn get_mut(&mut self, uid: &str) -> Option<&mut S> {
        self.sessions.get_mut(uid)
    }

    /// Existing session for `uid`, or a new one built by `factory`.
    ///
    /// An existing session is never replaced; callers update its fields.
    pub fn upsert(&mut self, uid: &str, factory: impl FnOnce() -> S) -> &mut S {
        self.sessions.entry(uid.to_string()).or_insert_with(factory)
    }

    pub fn delete(&mut self, uid: &str) -> Option<S> {
        self.sessions.remove(uid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &S)> {
        self.sessions.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn claimed(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| !s.alias().is_empty())
            .count()
    }
}

/// Where a uid currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located<'a> {
    pub family: DeviceFamily,
    pub device_type: DeviceType,
    pub alias: &'a str,
}

fn locate_in<'a, S: Session>(reg: &'a SessionRegistry<S>, uid: &str) -> Option<Located<'a>> {
    reg.get(uid).map(|s| Located {
        family: S::FAMILY,
        device_type: s.device_type(),
        alias: s.alias(),
    })
}

/// The five family registries of the running process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActiveSessions {
    pub brew: SessionRegistry<BrewSession>,
    pub ferm: SessionRegistry<FermSession>,
    #[serde(rename = "iSpindel")]
    pub ispindel: SessionRegistry<ISpindelSession>,
    pub tilt: SessionRegistry<TiltSession>,
    pub still: SessionRegistry<StillSession>,
}

impl ActiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, family: DeviceFamily, uid: &str) -> bool {
        match family {
            DeviceFamily::Brew => self.brew.contains(uid),
            DeviceFamily::Ferm => self.ferm.contains(uid),
            DeviceFamily::ISpindel => self.ispindel.contains(uid),
            DeviceFamily::Tilt => self.tilt.contains(uid),
            DeviceFamily::Still => self.still.contains(uid),
        }
    }

    pub fn is_registered_anywhere(&self, uid: &str) -> bool {
        DeviceFamily::ALL.into_iter().any(|f| self.contains(f, uid))
    }

    /// Every family holding `uid`, in brew, ferm, iSpindel, tilt, still order.
    pub fn locate_all(&self, uid: &str) -> impl Iterator<Item = Located<'_>> {
        [
            locate_in(&self.brew, uid),
            locate_in(&self.ferm, uid),
            locate_in(&self.ispindel, uid),
            locate_in(&self.tilt, uid),
            locate_in(&self.still, uid),
        ]
        .into_iter()
        .flatten()
    }

    /// The session that owns `uid`: the one carrying an alias if any family
    /// has claimed it, otherwise the first placeholder.
    pub fn locate(&self, uid: &str) -> Option<Located<'_>> {
        let mut first = None;
        for loc in self.locate_all(uid) {
            if !loc.alias.is_empty() {
                return Some(loc);
            }
            first = first.or(Some(loc));
        }
        first
    }

    /// True when some family holds `uid` under a non-empty alias. Sessions
    /// with an empty alias are placeholders and may be claimed.
    pub fn is_claimed(&self, uid: &str) -> bool {
        self.locate_all(uid).any(|l| !l.alias.is_empty())
    }

    pub fn remove(&mut self, family: DeviceFamily, uid: &str) -> bool {
        match family {
            DeviceFamily::Brew => self.brew.delete(uid).is_some(),
            DeviceFamily::Ferm => self.ferm.delete(uid).is_some(),
            DeviceFamily::ISpindel => self.ispindel.delete(uid).is_some(),
            DeviceFamily::Tilt => self.tilt.delete(uid).is_some(),
            DeviceFamily::Still => self.still.delete(uid).is_some(),
        }
    }

    /// Number of sessions carrying a non-empty alias across all families.
    pub fn claimed_count(&self) -> usize {
        self.brew.claimed()
            + self.ferm.claimed()
            + self.ispindel.claimed()
            + self.tilt.claimed()
            + self.still.claimed()
    }

    /// Create a session for every configured alias that has none yet.
    pub fn seed(&mut self, aliases: &AliasMapping) {
        for (ty, uid, alias) in aliases.entries() {
            match ty.family() {
                DeviceFamily::Brew => {
                    let s = self.brew.upsert(uid, || BrewSession::new(ty));
                    s.reclassify(ty);
                    s.set_alias(alias);
                }
                DeviceFamily::Ferm => self.ferm.upsert(uid, FermSession::default).set_alias(alias),
                DeviceFamily::ISpindel => self
                    .ispindel
                    .upsert(uid, ISpindelSession::default)
                    .set_alias(alias),
                DeviceFamily::Tilt => self.tilt.upsert(uid, TiltSession::default).set_alias(alias),
                DeviceFamily::Still => self
                    .still
                    .upsert(uid, || StillSession::new(uid))
                    .set_alias(alias),
            }
        }
        tracing::debug!(sessions = self.claimed_count(), "seeded sessions from aliases");
    }
}

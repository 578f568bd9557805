use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Hardware classification of a registered device.
///
/// The serialized form is the bucket name used in the `aliases` section of the
/// server configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    #[serde(rename = "Zymatic")]
    Zymatic,
    #[serde(rename = "ZSeries")]
    ZSeries,
    #[serde(rename = "PicoBrew")]
    PicoBrew,
    #[serde(rename = "PicoBrewC")]
    PicoBrewC,
    #[serde(rename = "PicoBrewC_Alt")]
    PicoBrewCAlt,
    #[serde(rename = "PicoFerm")]
    PicoFerm,
    #[serde(rename = "iSpindel")]
    ISpindel,
    #[serde(rename = "Tilt")]
    Tilt,
    #[serde(rename = "PicoStill")]
    PicoStill,
}

impl DeviceType {
    pub const ALL: [DeviceType; 9] = [
        DeviceType::Zymatic,
        DeviceType::ZSeries,
        DeviceType::PicoBrew,
        DeviceType::PicoBrewC,
        DeviceType::PicoBrewCAlt,
        DeviceType::PicoFerm,
        DeviceType::ISpindel,
        DeviceType::Tilt,
        DeviceType::PicoStill,
    ];

    /// Bucket name in the persisted alias mapping.
    pub fn bucket_name(self) -> &'static str {
        match self {
            DeviceType::Zymatic => "Zymatic",
            DeviceType::ZSeries => "ZSeries",
            DeviceType::PicoBrew => "PicoBrew",
            DeviceType::PicoBrewC => "PicoBrewC",
            DeviceType::PicoBrewCAlt => "PicoBrewC_Alt",
            DeviceType::PicoFerm => "PicoFerm",
            DeviceType::ISpindel => "iSpindel",
            DeviceType::Tilt => "Tilt",
            DeviceType::PicoStill => "PicoStill",
        }
    }

    pub fn family(self) -> DeviceFamily {
        match self {
            DeviceType::Zymatic
            | DeviceType::ZSeries
            | DeviceType::PicoBrew
            | DeviceType::PicoBrewC
            | DeviceType::PicoBrewCAlt => DeviceFamily::Brew,
            DeviceType::PicoFerm => DeviceFamily::Ferm,
            DeviceType::ISpindel => DeviceFamily::ISpindel,
            DeviceType::Tilt => DeviceFamily::Tilt,
            DeviceType::PicoStill => DeviceFamily::Still,
        }
    }

    pub fn is_pico(self) -> bool {
        matches!(
            self,
            DeviceType::PicoBrew | DeviceType::PicoBrewC | DeviceType::PicoBrewCAlt
        )
    }

    pub fn has_alt_firmware(self) -> bool {
        self == DeviceType::PicoBrewCAlt
    }

    /// PicoBrewC and its alternate-firmware variant share one display bucket.
    pub fn is_classic_pair(self) -> bool {
        matches!(self, DeviceType::PicoBrewC | DeviceType::PicoBrewCAlt)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.bucket_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown machine type: {0}")]
pub struct UnknownDeviceType(pub String);

impl FromStr for DeviceType {
    type Err = UnknownDeviceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceType::ALL
            .into_iter()
            .find(|t| t.bucket_name() == s)
            .ok_or_else(|| UnknownDeviceType(s.to_string()))
    }
}

/// The five in-memory session families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceFamily {
    Brew,
    Ferm,
    #[serde(rename = "iSpindel")]
    ISpindel,
    Tilt,
    Still,
}

impl DeviceFamily {
    pub const ALL: [DeviceFamily; 5] = [
        DeviceFamily::Brew,
        DeviceFamily::Ferm,
        DeviceFamily::ISpindel,
        DeviceFamily::Tilt,
        DeviceFamily::Still,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceFamily::Brew => "brew",
            DeviceFamily::Ferm => "ferm",
            DeviceFamily::ISpindel => "iSpindel",
            DeviceFamily::Tilt => "tilt",
            DeviceFamily::Still => "still",
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// uid -> alias
pub type AliasBucket = BTreeMap<String, String>;

/// Persisted device aliases grouped by device type.
///
/// A bucket may be missing, `null` or a mapping; missing and `null` behave
/// like an empty bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasMapping(BTreeMap<DeviceType, Option<AliasBucket>>);

impl AliasMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(&self, ty: DeviceType) -> Option<&AliasBucket> {
        self.0.get(&ty).and_then(Option::as_ref)
    }

    /// Bucket for `ty`, created empty when absent or `null`.
    pub fn bucket_mut(&mut self, ty: DeviceType) -> &mut AliasBucket {
        self.0.entry(ty).or_default().get_or_insert_with(AliasBucket::new)
    }

    pub fn alias(&self, ty: DeviceType, uid: &str) -> Option<&str> {
        self.bucket(ty).and_then(|b| b.get(uid)).map(String::as_str)
    }

    pub fn insert(&mut self, ty: DeviceType, uid: &str, alias: &str) {
        self.bucket_mut(ty).insert(uid.to_string(), alias.to_string());
    }

    /// Remove `uid` from the `ty` bucket. Returns the previous alias, if any.
    pub fn remove(&mut self, ty: DeviceType, uid: &str) -> Option<String> {
        self.0
            .get_mut(&ty)
            .and_then(Option::as_mut)
            .and_then(|b| b.remove(uid))
    }

    pub fn remove_everywhere(&mut self, uid: &str) -> usize {
        DeviceType::ALL
            .into_iter()
            .filter_map(|ty| self.remove(ty, uid))
            .count()
    }

    /// Every (type, uid, alias) entry in bucket order.
    pub fn entries(&self) -> impl Iterator<Item = (DeviceType, &str, &str)> + '_ {
        self.0.iter().flat_map(|(ty, bucket)| {
            bucket
                .iter()
                .flatten()
                .map(move |(uid, alias)| (*ty, uid.as_str(), alias.as_str()))
        })
    }

    /// Display projection folding `PicoBrewC_Alt` into `PicoBrewC`.
    ///
    /// Never persisted; `self` is left as is.
    pub fn merged_view(&self) -> MergedView {
        let mut merged: BTreeMap<DeviceType, AliasBucket> = self
            .0
            .iter()
            .filter(|(ty, _)| **ty != DeviceType::PicoBrewCAlt)
            .map(|(ty, bucket)| (*ty, bucket.clone().unwrap_or_default()))
            .collect();
        if let Some(alt) = self.bucket(DeviceType::PicoBrewCAlt) {
            if !alt.is_empty() {
                merged
                    .entry(DeviceType::PicoBrewC)
                    .or_default()
                    .extend(alt.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        MergedView(merged)
    }
}

/// Read-only display form of an [`AliasMapping`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MergedView(BTreeMap<DeviceType, AliasBucket>);

impl MergedView {
    pub fn bucket(&self, ty: DeviceType) -> Option<&AliasBucket> {
        self.0.get(&ty)
    }

    pub fn contains_type(&self, ty: DeviceType) -> bool {
        self.0.contains_key(&ty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeviceType, &AliasBucket)> {
        self.0.iter()
    }
}

/// Whole server configuration file. Keys other than `aliases` are carried
/// through rewrites untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub aliases: AliasMapping,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

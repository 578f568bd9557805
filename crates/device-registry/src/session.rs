//! Live session objects, one struct per device family.
//!
//! Only the fields the registry reconciles are modelled here; the brewing
//! process state each session drives lives elsewhere.

use crate::types::{DeviceFamily, DeviceType};
use serde::Serialize;

/// Fields shared by every family's session.
pub trait Session {
    const FAMILY: DeviceFamily;

    fn alias(&self) -> &str;

    fn set_alias(&mut self, alias: &str);

    fn device_type(&self) -> DeviceType;
}

/// Brew controllers (Zymatic, Z series and the PicoBrew line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrewSession {
    pub alias: String,
    pub device_type: DeviceType,
    pub is_pico: bool,
    pub has_alt_firmware: bool,
    pub needs_firmware_sync: bool,
}

impl BrewSession {
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            alias: String::new(),
            device_type,
            is_pico: device_type.is_pico(),
            has_alt_firmware: device_type.has_alt_firmware(),
            needs_firmware_sync: false,
        }
    }

    /// Reclassify the session. Returns whether the alt firmware flag flipped.
    pub fn reclassify(&mut self, device_type: DeviceType) -> bool {
        let prev_alt = self.has_alt_firmware;
        self.device_type = device_type;
        self.is_pico = device_type.is_pico();
        self.has_alt_firmware = device_type.has_alt_firmware();
        prev_alt != self.has_alt_firmware
    }
}

impl Session for BrewSession {
    const FAMILY: DeviceFamily = DeviceFamily::Brew;

    fn alias(&self) -> &str {
        &self.alias
    }

    fn set_alias(&mut self, alias: &str) {
        self.alias = alias.to_string();
    }

    fn device_type(&self) -> DeviceType {
        self.device_type
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FermSession {
    pub alias: String,
}

impl Session for FermSession {
    const FAMILY: DeviceFamily = DeviceFamily::Ferm;

    fn alias(&self) -> &str {
        &self.alias
    }

    fn set_alias(&mut self, alias: &str) {
        self.alias = alias.to_string();
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::PicoFerm
    }
}

/// iSpindel gravity sensor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ISpindelSession {
    pub alias: String,
}

impl Session for ISpindelSession {
    const FAMILY: DeviceFamily = DeviceFamily::ISpindel;

    fn alias(&self) -> &str {
        &self.alias
    }

    fn set_alias(&mut self, alias: &str) {
        self.alias = alias.to_string();
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::ISpindel
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TiltSession {
    pub alias: String,
}

impl Session for TiltSession {
    const FAMILY: DeviceFamily = DeviceFamily::Tilt;

    fn alias(&self) -> &str {
        &self.alias
    }

    fn set_alias(&mut self, alias: &str) {
        self.alias = alias.to_string();
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Tilt
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StillSession {
    pub uid: String,
    pub alias: String,
    pub ip_address: Option<String>,
}

impl StillSession {
    pub fn new(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            alias: String::new(),
            ip_address: None,
        }
    }
}

impl Session for StillSession {
    const FAMILY: DeviceFamily = DeviceFamily::Still;

    fn alias(&self) -> &str {
        &self.alias
    }

    fn set_alias(&mut self, alias: &str) {
        self.alias = alias.to_string();
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::PicoStill
    }
}

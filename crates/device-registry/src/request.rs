use crate::error::{RegistryError, Result};
use crate::types::DeviceType;
use serde::{Deserialize, Deserializer};

/// Inbound device form as posted by the operator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceForm {
    #[serde(default)]
    pub machine_type: Option<String>,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub ip_addr: Option<String>,
    #[serde(default, deserialize_with = "truthy")]
    pub alt_firmware: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
    Text(String),
}

fn truthy<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    Ok(match Option::<Flag>::deserialize(d)? {
        None => false,
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(n)) => n != 0,
        Some(Flag::Text(s)) => !s.is_empty(),
    })
}

impl DeviceForm {
    fn device_type(&self) -> Result<Option<DeviceType>> {
        self.machine_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<DeviceType>()
                    .map_err(|e| RegistryError::Validation(e.to_string()))
            })
            .transpose()
    }

    fn required_type(&self) -> Result<DeviceType> {
        self.device_type()?
            .ok_or_else(|| RegistryError::Validation("Machine type is required".to_string()))
    }

    /// Request for registering the device named by the form's uid.
    pub fn into_register(self) -> Result<DeviceRequest> {
        let ty = self.required_type()?;
        Ok(DeviceRequest::new(ty, &self.uid, &self.alias)
            .with_ip(self.ip_addr.as_deref())
            .with_alt_firmware(self.alt_firmware))
    }

    /// Request for updating `uid`; the form's own uid field is ignored.
    pub fn into_update(self, uid: &str) -> Result<DeviceRequest> {
        let ty = self.required_type()?;
        Ok(DeviceRequest::new(ty, uid, &self.alias)
            .with_ip(self.ip_addr.as_deref())
            .with_alt_firmware(self.alt_firmware))
    }

    /// Device type a delete of `uid` applies to, when the form names one.
    pub fn delete_type(&self) -> Result<Option<DeviceType>> {
        let ty = self.device_type()?;
        Ok(ty.map(|t| resolve_type(t, self.alt_firmware)))
    }
}

/// Alternate firmware always files the device under `PicoBrewC_Alt`.
pub fn resolve_type(requested: DeviceType, alt_firmware: bool) -> DeviceType {
    if alt_firmware {
        DeviceType::PicoBrewCAlt
    } else {
        requested
    }
}

/// A register or update request with its device type already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequest {
    pub device_type: DeviceType,
    pub uid: String,
    pub alias: String,
    pub ip_addr: Option<String>,
}

impl DeviceRequest {
    pub fn new(device_type: DeviceType, uid: &str, alias: &str) -> Self {
        Self {
            device_type,
            uid: uid.trim().to_string(),
            alias: alias.trim().to_string(),
            ip_addr: None,
        }
    }

    pub fn with_ip(mut self, ip: Option<&str>) -> Self {
        self.ip_addr = ip.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        self
    }

    pub fn with_alt_firmware(mut self, alt_firmware: bool) -> Self {
        self.device_type = resolve_type(self.device_type, alt_firmware);
        self
    }

    /// Both uid and alias must be non-empty.
    pub fn validate(&self) -> Result<()> {
        let msg = match (self.uid.is_empty(), self.alias.is_empty()) {
            (false, false) => return Ok(()),
            (true, true) => "Machine/Product ID and Alias are required",
            (true, false) => "Machine/Product ID is required",
            (false, true) => "Alias is required",
        };
        Err(RegistryError::Validation(msg.to_string()))
    }
}

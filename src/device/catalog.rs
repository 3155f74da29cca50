use serde::{Deserialize, Serialize};

use super::{DeviceError, Result};

/// One selectable inhaler model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InhalerDevice {
    pub name: String,
    /// Pa^0.5·s·L⁻¹
    pub resistance: f64,
}

/// Immutable table of inhaler resistances, built once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<InhalerDevice>", into = "Vec<InhalerDevice>")]
pub struct InhalerCatalog {
    devices: Vec<InhalerDevice>,
}

impl InhalerCatalog {
    pub fn new(devices: Vec<InhalerDevice>) -> Result<Self> {
        if devices.is_empty() {
            return Err(DeviceError::EmptyCatalog);
        }
        for device in &devices {
            if !device.resistance.is_finite() || device.resistance <= 0.0 {
                return Err(DeviceError::InvalidResistance {
                    name: device.name.clone(),
                    resistance: device.resistance,
                });
            }
        }
        Ok(Self { devices })
    }

    /// The three reference inhalers shipped with the logger.
    pub fn builtin() -> Self {
        let devices = [("Inhaler A", 1.0), ("Inhaler B", 1.2), ("Inhaler C", 1.5)]
            .into_iter()
            .map(|(name, resistance)| InhalerDevice { name: name.to_string(), resistance })
            .collect();
        Self { devices }
    }

    pub fn get(&self, name: &str) -> Option<&InhalerDevice> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn resistance(&self, name: &str) -> Result<f64> {
        self.get(name)
            .map(|d| d.resistance)
            .ok_or_else(|| DeviceError::UnknownInhaler(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|d| d.name.as_str())
    }

    pub fn devices(&self) -> &[InhalerDevice] {
        &self.devices
    }
}

impl Default for InhalerCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TryFrom<Vec<InhalerDevice>> for InhalerCatalog {
    type Error = DeviceError;

    fn try_from(devices: Vec<InhalerDevice>) -> Result<Self> {
        Self::new(devices)
    }
}

impl From<InhalerCatalog> for Vec<InhalerDevice> {
    fn from(catalog: InhalerCatalog) -> Self {
        catalog.devices
    }
}

pub mod catalog;
pub mod flow;
pub mod manager;
pub mod models;

pub use catalog::{InhalerCatalog, InhalerDevice};
pub use flow::{flow_rate_lpm, ConversionError};
pub use manager::DeviceManager;
pub use models::*;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Unknown inhaler: {0}")]
    UnknownInhaler(String),

    #[error("Inhaler catalog is empty")]
    EmptyCatalog,

    #[error("Inhaler {name} has invalid resistance {resistance}")]
    InvalidResistance { name: String, resistance: f64 },

    #[error("Device already connected")]
    AlreadyConnected,

    #[error("Device not connected")]
    NotConnected,

    #[error("Serial communication error: {0}")]
    SerialError(#[from] crate::serial::SerialError),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, DeviceError>;

pub mod monitor;
pub mod reader;
pub mod store;
pub mod types;

pub use monitor::{AcquisitionMonitor, MonitorStatus};
pub use reader::AcquisitionLoop;
pub use store::TimeSeriesStore;
pub use types::*;

use tokio::time::Duration;

// The sensor streams roughly every 140ms; poll faster than that.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub mod attraction;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod history;

pub use attraction::{AttractionField, AttractionSignal};
pub use coordinator::{PressureCoordinator, RegionHandle, RegionPressureSnapshot};
pub use driver::{DriverConfig, PressureDriver};
pub use error::PressureError;
pub use history::SignalHistory;

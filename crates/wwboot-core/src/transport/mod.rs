//! Transport layer module.

pub mod mock;
pub mod nusb;
pub mod traits;

pub use mock::MockTransport;
pub use self::nusb::NusbTransport;
pub use traits::{HidTransport, ReportFraming, TransportError};

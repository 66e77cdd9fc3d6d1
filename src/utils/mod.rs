pub mod clock;
pub mod hashing;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};

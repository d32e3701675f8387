pub mod clock;
pub mod coding;
pub mod status;

pub use clock::{Clock, ManualClock, SystemClock};
pub use status::{Code, Result, Status};

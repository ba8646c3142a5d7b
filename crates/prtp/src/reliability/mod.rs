pub mod congestion;
pub mod receive_window;
pub mod send_window;

pub use congestion::{CongestionController, CongestionState};
pub use receive_window::{Delivery, ReceiveWindow};
pub use send_window::{AckOutcome, SendWindow};

pub mod connection;
pub mod consts;
pub mod error;
pub mod receiver;
pub mod reliability;
pub mod segment;
pub mod sender;
pub mod transport;

pub use error::{PrtpError, Result};

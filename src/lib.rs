//! Connection quality measurement against the Yandex Internetometer backend.
//!
//! The interesting part lives in [`speedtest`]: a pool of HTTP workers moving
//! bytes for a fixed window while a shared atomic counter keeps the total.

pub mod error;
pub mod output;
pub mod provider;
pub mod settings;
pub mod speedtest;

pub use error::{Result, SpeedTestError};
pub use settings::Settings;

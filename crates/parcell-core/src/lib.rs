pub mod config;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{ParcellError, Result};
pub use event::StatusBus;
pub use types::*;

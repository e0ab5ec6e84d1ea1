mod config;
mod core;
mod errors;
mod events;
mod settings;

pub use config::*;
pub use core::*;
pub use errors::*;
pub use events::*;
pub use settings::*;

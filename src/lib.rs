pub mod core;
pub mod goals;
pub mod main_module;
pub mod project;

pub use crate::core::config::AppConfig;
pub use crate::core::shared::state::AppState;

mod loader;
mod types;
pub mod validation;

pub use loader::{load_config_from_env, load_config_from_file, load_config_from_file_with_profile, ENV_PREFIX};
pub use types::*;

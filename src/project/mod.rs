pub mod config_store;
pub mod detector;

pub use config_store::{ConfigManager, ConfigScope, YamlConfigManager};
pub use detector::{FsProjectDetector, ProjectDetector, ProjectInfo, ProjectSize};

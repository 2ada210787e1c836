pub mod compatibility;
pub mod probe;

pub use compatibility::{CompatibilityGuide, CompatibilityResolver, InstallationMethod, VENV_DIR};
pub use probe::{InterpreterProbe, PlatformProbe, PlatformSnapshot, PythonVersion, StaticProbe};

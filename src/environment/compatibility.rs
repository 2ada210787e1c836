use serde::{Deserialize, Serialize};

use super::probe::PlatformSnapshot;
use crate::config::{CompatibilityPolicy, Settings};

pub const METHOD_UV: &str = "uv";
pub const METHOD_VENV: &str = "venv";
pub const METHOD_PIP: &str = "pip";
/// venv 方法在项目根目录下创建的虚拟环境目录
pub const VENV_DIR: &str = ".serena-venv";

/// 一种安装策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationMethod {
    pub method: String,
    pub description: String,
    pub command: String,
    /// 仅适用于特定操作系统族（windows / unix）时设置
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
}

impl InstallationMethod {
    pub fn new(method: &str, description: &str, command: impl Into<String>) -> Self {
        Self {
            method: method.to_string(),
            description: description.to_string(),
            command: command.into(),
            os: None,
        }
    }

    pub fn for_os(mut self, os: &str) -> Self {
        self.os = Some(os.to_string());
        self
    }
}

/// 兼容性检查结果和安装指南
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityGuide {
    pub python_version: String,
    pub recommended_version: String,
    pub compatible: bool,
    pub current_platform: String,
    pub installation_methods: Vec<InstallationMethod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// 根据平台快照计算兼容性与安装方法，纯函数，不访问系统
#[derive(Debug, Clone)]
pub struct CompatibilityResolver {
    policy: CompatibilityPolicy,
    package: String,
    git_source: String,
}

impl Default for CompatibilityResolver {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl CompatibilityResolver {
    pub fn new(policy: CompatibilityPolicy, package: &str, git_source: &str) -> Self {
        Self {
            policy,
            package: package.to_string(),
            git_source: git_source.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.policy.clone(), &settings.package, &settings.git_source)
    }

    pub fn policy(&self) -> &CompatibilityPolicy {
        &self.policy
    }

    pub fn is_compatible(&self, snapshot: &PlatformSnapshot) -> bool {
        let version = snapshot.python_version;
        self.policy.accepts(version.major, version.minor)
    }

    pub fn resolve(&self, snapshot: &PlatformSnapshot) -> CompatibilityGuide {
        let compatible = self.is_compatible(snapshot);
        let mut warnings = Vec::new();

        if !compatible {
            warnings.push(format!(
                "Python {} may not be supported by Serena yet; install Python {} exactly \
                 (for example `uv python install {}`) or use the uv method, which pins a supported interpreter",
                snapshot.python_version,
                self.policy.describe(),
                self.policy.preferred(),
            ));
        }

        if snapshot.is_windows() {
            warnings.push(
                "On Windows, re-run the installation from an elevated (Administrator) shell if it fails with permission errors"
                    .to_string(),
            );
        }

        CompatibilityGuide {
            python_version: snapshot.python_version.to_string(),
            recommended_version: self.policy.describe(),
            compatible,
            current_platform: snapshot.describe(),
            installation_methods: self.installation_methods(snapshot, compatible),
            warnings,
        }
    }

    fn installation_methods(&self, snapshot: &PlatformSnapshot, compatible: bool) -> Vec<InstallationMethod> {
        let uv = self.uv_method(compatible);
        let pip = self.pip_method(snapshot);

        if snapshot.in_isolated_env {
            // 已在隔离环境中，直接安装到当前环境即可
            vec![pip, uv]
        } else {
            vec![uv, self.venv_method(snapshot, compatible), pip]
        }
    }

    fn uv_method(&self, compatible: bool) -> InstallationMethod {
        let command = if compatible {
            format!("uv tool install --force --from {} {}", self.git_source, self.package)
        } else {
            format!(
                "uv tool install --force --python {} --from {} {}",
                self.policy.preferred(),
                self.git_source,
                self.package
            )
        };

        InstallationMethod::new(
            METHOD_UV,
            "Isolated tool install via uv; leaves the current Python environment untouched",
            command,
        )
    }

    fn venv_method(&self, snapshot: &PlatformSnapshot, compatible: bool) -> InstallationMethod {
        let python = if compatible {
            snapshot.interpreter_path.clone()
        } else if snapshot.is_windows() {
            format!("py -{}", self.policy.preferred())
        } else {
            format!("python{}", self.policy.preferred())
        };

        if snapshot.is_windows() {
            InstallationMethod::new(
                METHOD_VENV,
                "Dedicated virtual environment in the project's .serena-venv",
                format!(
                    "{} -m venv {venv} && {venv}\\Scripts\\python -m pip install --upgrade {}",
                    quote(&python),
                    self.package,
                    venv = VENV_DIR
                ),
            )
            .for_os("windows")
        } else {
            InstallationMethod::new(
                METHOD_VENV,
                "Dedicated virtual environment in the project's .serena-venv",
                format!(
                    "{} -m venv {venv} && {venv}/bin/python -m pip install --upgrade {}",
                    quote(&python),
                    self.package,
                    venv = VENV_DIR
                ),
            )
            .for_os("unix")
        }
    }

    fn pip_method(&self, snapshot: &PlatformSnapshot) -> InstallationMethod {
        let description = if snapshot.in_isolated_env {
            "Install into the active virtual environment with pip"
        } else {
            "Install directly with pip into the current interpreter"
        };

        InstallationMethod::new(
            METHOD_PIP,
            description,
            format!("{} -m pip install --upgrade {}", quote(&snapshot.interpreter_path), self.package),
        )
    }
}

/// 含空格的路径加引号；`py -3.11` 这类启动器写法保持原样
fn quote(path: &str) -> String {
    if path.contains(' ') && !path.starts_with("py -") {
        format!("\"{}\"", path)
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::probe::PythonVersion;

    fn snapshot(minor: u32) -> PlatformSnapshot {
        PlatformSnapshot::new("linux", "x86_64", PythonVersion::new(3, minor, 0))
            .with_interpreter("/usr/bin/python3")
    }

    #[test]
    fn test_default_ordering() {
        let guide = CompatibilityResolver::default().resolve(&snapshot(11));
        let order: Vec<&str> = guide.installation_methods.iter().map(|m| m.method.as_str()).collect();
        assert_eq!(order, vec![METHOD_UV, METHOD_VENV, METHOD_PIP]);
        assert_eq!(guide.installation_methods[1].os.as_deref(), Some("unix"));
    }

    #[test]
    fn test_isolated_env_promotes_pip() {
        let guide = CompatibilityResolver::default().resolve(&snapshot(12).isolated(true));
        let order: Vec<&str> = guide.installation_methods.iter().map(|m| m.method.as_str()).collect();
        assert_eq!(order, vec![METHOD_PIP, METHOD_UV]);
    }

    #[test]
    fn test_incompatible_pins_interpreter() {
        let guide = CompatibilityResolver::default().resolve(&snapshot(13));
        assert!(!guide.compatible);
        assert!(guide.installation_methods[0].command.contains("--python 3.11"));
        assert!(guide.installation_methods[1].command.starts_with("python3.11 -m venv"));
        assert!(guide.warnings[0].contains("3.13.0"));
    }

    #[test]
    fn test_windows_caveat_and_venv_layout() {
        let snap = PlatformSnapshot::new("windows", "AMD64", PythonVersion::new(3, 11, 4))
            .with_interpreter("C:\\Program Files\\Python311\\python.exe");
        let guide = CompatibilityResolver::default().resolve(&snap);

        assert!(guide.compatible);
        assert_eq!(guide.warnings.len(), 1);
        let venv = &guide.installation_methods[1];
        assert_eq!(venv.os.as_deref(), Some("windows"));
        assert!(venv.command.starts_with("\"C:\\Program Files\\Python311\\python.exe\""));
        assert!(venv.command.contains(".serena-venv\\Scripts\\python"));
    }

    #[test]
    fn test_custom_policy() {
        let policy = CompatibilityPolicy::parse("3.13").unwrap();
        let resolver = CompatibilityResolver::new(policy, "serena-agent", "git+https://example.invalid/serena");
        assert!(resolver.resolve(&snapshot(13)).compatible);
        assert!(!resolver.resolve(&snapshot(11)).compatible);
    }

    #[test]
    fn test_warnings_omitted_from_json_when_empty() {
        let guide = CompatibilityResolver::default().resolve(&snapshot(11));
        let value = serde_json::to_value(&guide).unwrap();
        assert!(value.get("warnings").is_none());
        assert!(value["installation_methods"][0].get("os").is_none());
        assert_eq!(value["recommended_version"], "3.11 or 3.12");
    }
}

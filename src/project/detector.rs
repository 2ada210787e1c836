use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::config_store::project_config_path;

/// 项目根目录标记文件，按优先级排列
const PROJECT_MARKERS: &[(&str, &str)] = &[
    ("pyproject.toml", "python"),
    ("setup.py", "python"),
    ("requirements.txt", "python"),
    ("package.json", "node"),
    ("Cargo.toml", "rust"),
    ("go.mod", "go"),
    ("pom.xml", "java"),
    ("build.gradle", "java"),
    (".git", "generic"),
];

const SKIPPED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    ".venv",
    "venv",
    crate::environment::VENV_DIR,
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    "dist",
    "build",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSize {
    pub total_files: usize,
    pub total_size_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub project_type: String,
    pub languages: BTreeSet<String>,
    pub size: ProjectSize,
    /// 项目中存在 `.serena/` 目录
    pub has_serena: bool,
    /// 项目中存在 serena-cli 的项目配置
    #[serde(alias = "has_panda_config")]
    pub has_cli_config: bool,
}

/// 项目检测
pub trait ProjectDetector: Send + Sync {
    fn detect_current_project(&self) -> Option<PathBuf>;

    /// 路径不存在或不是目录时返回 `None`
    fn get_project_info(&self, path: &Path) -> Result<Option<ProjectInfo>>;
}

/// 基于文件系统的项目检测器
#[derive(Debug, Clone)]
pub struct FsProjectDetector {
    start_dir: Option<PathBuf>,
    max_depth: usize,
}

impl Default for FsProjectDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl FsProjectDetector {
    pub fn new() -> Self {
        Self {
            start_dir: None,
            max_depth: 12,
        }
    }

    /// 从指定目录而不是当前工作目录开始向上查找
    pub fn starting_at(dir: impl Into<PathBuf>) -> Self {
        Self {
            start_dir: Some(dir.into()),
            ..Self::new()
        }
    }

    fn extension_languages() -> &'static HashMap<&'static str, &'static str> {
        static TABLE: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
        TABLE.get_or_init(|| {
            HashMap::from([
                ("py", "python"),
                ("pyi", "python"),
                ("js", "javascript"),
                ("mjs", "javascript"),
                ("jsx", "javascript"),
                ("ts", "typescript"),
                ("tsx", "typescript"),
                ("rs", "rust"),
                ("go", "go"),
                ("java", "java"),
                ("kt", "kotlin"),
                ("cs", "csharp"),
                ("cpp", "cpp"),
                ("cc", "cpp"),
                ("hpp", "cpp"),
                ("c", "c"),
                ("h", "c"),
                ("rb", "ruby"),
                ("php", "php"),
                ("swift", "swift"),
                ("dart", "dart"),
            ])
        })
    }

    fn find_marker(dir: &Path) -> Option<&'static str> {
        PROJECT_MARKERS
            .iter()
            .find(|(marker, _)| dir.join(marker).exists())
            .map(|(_, project_type)| *project_type)
    }

    fn project_name(path: &Path) -> String {
        let fallback = || {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string())
        };

        if let Ok(content) = fs::read_to_string(path.join("pyproject.toml")) {
            if let Ok(doc) = content.parse::<toml::Table>() {
                let name = doc
                    .get("project")
                    .and_then(|p| p.get("name"))
                    .or_else(|| doc.get("tool").and_then(|t| t.get("poetry")).and_then(|p| p.get("name")))
                    .and_then(|n| n.as_str());
                if let Some(name) = name {
                    return name.to_string();
                }
            }
        }

        if let Ok(content) = fs::read_to_string(path.join("Cargo.toml")) {
            if let Ok(doc) = content.parse::<toml::Table>() {
                if let Some(name) = doc.get("package").and_then(|p| p.get("name")).and_then(|n| n.as_str()) {
                    return name.to_string();
                }
            }
        }

        if let Ok(content) = fs::read_to_string(path.join("package.json")) {
            if let Ok(doc) = serde_json::from_str::<serde_json::Value>(&content) {
                if let Some(name) = doc.get("name").and_then(|n| n.as_str()) {
                    return name.to_string();
                }
            }
        }

        fallback()
    }

    fn is_skipped(entry: &walkdir::DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .map(|name| SKIPPED_DIRS.contains(&name))
                .unwrap_or(false)
    }
}

impl ProjectDetector for FsProjectDetector {
    fn detect_current_project(&self) -> Option<PathBuf> {
        let start = match &self.start_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().ok()?,
        };
        let start = start.canonicalize().unwrap_or(start);

        for dir in start.ancestors() {
            if let Some(project_type) = Self::find_marker(dir) {
                debug!("🔍 检测到 {} 项目: {}", project_type, dir.display());
                return Some(dir.to_path_buf());
            }
        }

        debug!("未在 {} 及其父目录中找到项目标记", start.display());
        None
    }

    fn get_project_info(&self, path: &Path) -> Result<Option<ProjectInfo>> {
        if !path.is_dir() {
            return Ok(None);
        }
        let root = path.canonicalize()?;

        let mut languages = BTreeSet::new();
        let mut total_files = 0usize;
        let mut total_bytes = 0u64;

        let walker = WalkDir::new(&root)
            .max_depth(self.max_depth)
            .into_iter()
            .filter_entry(|e| !Self::is_skipped(e));

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            total_files += 1;
            total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);

            if let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) {
                if let Some(language) = Self::extension_languages().get(ext.to_ascii_lowercase().as_str()) {
                    languages.insert(language.to_string());
                }
            }
        }

        let total_size_mb = (total_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;
        let info = ProjectInfo {
            name: Self::project_name(&root),
            project_type: Self::find_marker(&root).unwrap_or("generic").to_string(),
            languages,
            size: ProjectSize {
                total_files,
                total_size_mb,
            },
            has_serena: root.join(".serena").is_dir(),
            has_cli_config: project_config_path(&root).is_file(),
            path: root,
        };

        info!(
            "📁 项目 {} ({}): {} 个文件, {} MB",
            info.name, info.project_type, info.size.total_files, info.size.total_size_mb
        );
        Ok(Some(info))
    }
}

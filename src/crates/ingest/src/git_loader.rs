//! Shallow-clone a GitHub repository, classify its files, and pick the
//! subset most worth feeding into the Graph Builder.
//!
//! Ported verbatim (rules, weights, and ignore lists) from
//! `original_source/backend/git_loader.py`'s `GitHubLoader`.

use crate::error::{IngestError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const IGNORE_DIRS: &[&str] = &[".git", "__pycache__", "node_modules", "venv", ".idea", ".vscode", "dist", "build"];
const TREE_IGNORE_DIRS: &[&str] =
    &[".git", "__pycache__", "node_modules", "venv", ".idea", ".vscode", "dist", "build", "coverage", "target"];
const TREE_IGNORE_EXTS: &[&str] = &["png", "jpg", "jpeg", "gif", "ico", "svg", "pyc", "class", "exe", "dll", "so"];

const SOURCE_CODE_EXTS: &[&str] = &[
    "py", "java", "c", "cpp", "h", "hpp", "cs", "go", "rs", "js", "jsx", "ts", "tsx", "php", "rb", "swift", "kt",
    "scala", "lua", "pl", "sh", "bat",
];
const CONFIGURATION_EXTS: &[&str] = &[
    "json", "yaml", "yml", "toml", "ini", "cfg", "conf", "env", "gitignore", "dockerignore", "xml", "gradle",
    "properties", "cmake",
];
const DOCUMENTATION_EXTS: &[&str] = &["md", "markdown", "rst", "txt", "pdf", "doc", "docx"];

const CONFIGURATION_FILENAMES: &[&str] = &[
    "dockerfile", "makefile", "cmakelists.txt", "requirements.txt", "package.json", "tsconfig.json", "pom.xml",
    "setup.py", "go.mod", "go.sum",
];
const DOCUMENTATION_NAME_KEYWORDS: &[&str] = &["readme", "license", "contributing", "changelog", "authors", "faq", "notice"];

const HIGH_WEIGHT_KEYWORDS: &[&str] =
    &["core", "main", "app", "server", "api", "service", "model", "controller", "router", "utils", "lib", "src"];
const LOW_WEIGHT_KEYWORDS: &[&str] = &["test", "demo", "example", "sample", "doc", "mock", "bench"];
const CORE_FILENAMES: &[&str] = &["main.py", "app.py", "index.js", "server.go", "application.java", "api.py"];
const CORE_EXTS: &[&str] = &["py", "js", "ts", "java", "go"];

/// File classification buckets produced by [`classify_files`].
#[derive(Debug, Default, Clone)]
pub struct ClassifiedFiles {
    pub documentation: Vec<PathBuf>,
    pub configuration: Vec<PathBuf>,
    pub source_code: Vec<PathBuf>,
    pub others: Vec<PathBuf>,
}

/// Shallow-clones repositories under `base_dir` and classifies/selects
/// their files for ingestion.
pub struct GitLoader {
    base_dir: PathBuf,
}

impl GitLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn repo_name(repo_url: &str) -> String {
        repo_url.trim_end_matches('/').rsplit('/').next().unwrap_or(repo_url).trim_end_matches(".git").to_string()
    }

    /// Shallow-clone `repo_url` (depth 1) into `base_dir/<repo_name>`,
    /// removing any existing clone first when `force_update` is set.
    pub async fn clone_repo(&self, repo_url: &str, force_update: bool) -> Result<PathBuf> {
        let target = self.base_dir.join(Self::repo_name(repo_url));

        if target.exists() {
            if force_update {
                tokio::fs::remove_dir_all(&target).await?;
            } else {
                return Ok(target);
            }
        }

        let status = tokio::process::Command::new("git")
            .args(["clone", "--depth", "1", repo_url, target.to_str().unwrap_or_default()])
            .status()
            .await
            .map_err(|e| IngestError::Process(e.to_string()))?;

        if !status.success() {
            return Err(IngestError::Process(format!("git clone failed for {}", repo_url)));
        }

        Ok(target)
    }

    /// Walk `repo_path`, classifying every file per the extension/filename
    /// rules above, skipping [`IGNORE_DIRS`].
    pub fn classify_files(&self, repo_path: &Path) -> Result<ClassifiedFiles> {
        let mut classified = ClassifiedFiles::default();
        self.walk(repo_path, &mut classified)?;
        Ok(classified)
    }

    fn walk(&self, dir: &Path, out: &mut ClassifiedFiles) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if IGNORE_DIRS.contains(&name.as_ref()) {
                    continue;
                }
                self.walk(&path, out)?;
                continue;
            }

            classify_one(&path, out);
        }
        Ok(())
    }

    /// Render a compact, emoji-prefixed directory tree of `repo_path`, used
    /// to orient the Graph Builder's backbone-extraction prompt when the
    /// corpus originates from a cloned repository.
    pub fn generate_tree_structure(&self, repo_path: &Path) -> Result<String> {
        let mut lines = Vec::new();
        self.render_tree(repo_path, repo_path, 0, &mut lines)?;
        Ok(lines.join("\n"))
    }

    fn render_tree(&self, start: &Path, dir: &Path, level: usize, out: &mut Vec<String>) -> Result<()> {
        let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or(".");
        if level == 0 {
            out.push(format!("\u{1F4E6} {}", name));
        } else {
            let indent = "\u{2502}   ".repeat(level.saturating_sub(1));
            out.push(format!("{}\u{251C}\u{2500}\u{2500} \u{1F4C2} {}/", indent, name));
        }

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                let dir_name = entry.file_name();
                if !IGNORE_DIRS.iter().chain(TREE_IGNORE_DIRS).any(|d| *d == dir_name.to_string_lossy()) {
                    dirs.push(path);
                }
            } else {
                files.push(path);
            }
        }
        dirs.sort();
        files.sort();

        let sub_indent = "\u{2502}   ".repeat(level) + "\u{251C}\u{2500}\u{2500} ";
        for file in &files {
            let ext = file.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
            if TREE_IGNORE_EXTS.contains(&ext.as_str()) {
                continue;
            }
            let file_name = file.file_name().and_then(|n| n.to_str()).unwrap_or("");
            out.push(format!("{}\u{1F4C4} {}", sub_indent, file_name));
        }

        for subdir in &dirs {
            self.render_tree(start, subdir, level + 1, out)?;
        }
        Ok(())
    }

    /// Score and select the top `max_files` source files most worth
    /// feeding into ingestion, then re-sort alphabetically for readability.
    pub fn smart_select_files(&self, file_paths: &[PathBuf], max_files: usize) -> Vec<PathBuf> {
        let mut scored: Vec<(f32, &PathBuf)> = file_paths.iter().map(|p| (score_file(p), p)).collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut selected: Vec<PathBuf> = scored.into_iter().take(max_files).map(|(_, p)| p.clone()).collect();
        selected.sort();
        selected
    }
}

fn classify_one(path: &Path, out: &mut ClassifiedFiles) {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_lowercase();
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    let stem: &str = file_name.rsplit_once('.').map(|(s, _)| s).unwrap_or(&file_name);

    if CONFIGURATION_FILENAMES.contains(&file_name.as_str()) {
        out.configuration.push(path.to_path_buf());
        return;
    }
    if DOCUMENTATION_NAME_KEYWORDS.iter().any(|kw| stem.contains(kw)) {
        out.documentation.push(path.to_path_buf());
        return;
    }

    if SOURCE_CODE_EXTS.contains(&ext.as_str()) {
        out.source_code.push(path.to_path_buf());
    } else if CONFIGURATION_EXTS.contains(&ext.as_str()) {
        out.configuration.push(path.to_path_buf());
    } else if DOCUMENTATION_EXTS.contains(&ext.as_str()) {
        out.documentation.push(path.to_path_buf());
    } else {
        out.others.push(path.to_path_buf());
    }
}

fn score_file(path: &Path) -> f32 {
    let lower_path = path.to_string_lossy().to_lowercase();
    let depth = path.components().count() as f32;

    let mut score = -depth * 0.1;

    for kw in HIGH_WEIGHT_KEYWORDS {
        if lower_path.contains(kw) {
            score += 5.0;
        }
    }
    for kw in LOW_WEIGHT_KEYWORDS {
        if lower_path.contains(kw) {
            score -= 10.0;
        }
    }

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    if CORE_EXTS.contains(&ext.as_str()) {
        score += 2.0;
    }

    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_lowercase();
    if CORE_FILENAMES.contains(&file_name.as_str()) {
        score += 10.0;
    }

    score
}

#[allow(dead_code)]
fn unique<T: Eq + std::hash::Hash + Clone>(items: &[T]) -> Vec<T> {
    let set: HashSet<&T> = items.iter().collect();
    set.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_name_strips_git_suffix() {
        assert_eq!(GitLoader::repo_name("https://github.com/acme/widgets.git"), "widgets");
        assert_eq!(GitLoader::repo_name("https://github.com/acme/widgets/"), "widgets");
    }

    #[test]
    fn test_classify_one_filename_rules_take_priority_over_extension() {
        let mut out = ClassifiedFiles::default();
        classify_one(Path::new("setup.py"), &mut out);
        assert_eq!(out.configuration.len(), 1);
        assert!(out.source_code.is_empty());
    }

    #[test]
    fn test_classify_one_readme_is_documentation() {
        let mut out = ClassifiedFiles::default();
        classify_one(Path::new("README.md"), &mut out);
        assert_eq!(out.documentation.len(), 1);
    }

    #[test]
    fn test_classify_one_by_extension() {
        let mut out = ClassifiedFiles::default();
        classify_one(Path::new("src/lib.rs"), &mut out);
        assert_eq!(out.source_code.len(), 1);
    }

    #[test]
    fn test_score_file_penalizes_test_directories() {
        let core = score_file(Path::new("src/core/api.py"));
        let test = score_file(Path::new("tests/test_api.py"));
        assert!(core > test);
    }

    #[test]
    fn test_score_file_bonuses_entrypoint_filenames() {
        let entry_point = score_file(Path::new("app.py"));
        let other = score_file(Path::new("helpers.py"));
        assert!(entry_point > other);
    }

    #[test]
    fn test_smart_select_files_resorts_alphabetically() {
        let loader = GitLoader::new(std::env::temp_dir().join("git-loader-test")).unwrap();
        let files = vec![PathBuf::from("z_app.py"), PathBuf::from("a_test_helper.py")];
        let selected = loader.smart_select_files(&files, 2);
        assert_eq!(selected, vec![PathBuf::from("a_test_helper.py"), PathBuf::from("z_app.py")]);
    }
}

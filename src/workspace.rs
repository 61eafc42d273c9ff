//! Project workspace search.
//!
//! A workspace is a directory whose immediate children are projects. Text
//! search walks every project, restricted to configured file extensions,
//! and reports line hits with surrounding context. The overview detects a
//! project's technologies from well-known marker files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use walkdir::{DirEntry, WalkDir};

use crate::config::WorkspaceConfig;
use crate::error::IndexError;
use crate::extract::{context_window, SCAN_CONTEXT_LINES};

/// Directories never descended into.
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "target", "dist", "build"];

/// Marker file → technology. Several markers may map to one technology.
const TECH_MARKERS: &[(&str, &str)] = &[
    ("Cargo.toml", "Rust"),
    ("package.json", "Node.js"),
    ("tsconfig.json", "TypeScript"),
    ("pyproject.toml", "Python"),
    ("requirements.txt", "Python"),
    ("setup.py", "Python"),
    ("go.mod", "Go"),
    ("pom.xml", "Java"),
    ("build.gradle", "Java"),
    ("Gemfile", "Ruby"),
    ("Dockerfile", "Docker"),
    ("docker-compose.yml", "Docker"),
    ("firebase.json", "Firebase"),
];

const README_NAMES: &[&str] = &["README.md", "readme.md", "README.txt", "README"];
const README_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceHit {
    pub project: String,
    /// Path relative to the project directory.
    pub path: String,
    /// 1-based.
    pub line_number: usize,
    pub line: String,
    pub context: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectOverview {
    pub name: String,
    pub path: PathBuf,
    pub technologies: Vec<String>,
    pub entries: Vec<String>,
    pub file_counts: BTreeMap<String, usize>,
    pub total_files: usize,
    pub readme_excerpt: Option<String>,
}

pub struct Workspace {
    root: PathBuf,
    file_types: Vec<String>,
    max_file_bytes: u64,
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry.depth() > 0
        && SKIP_DIRS
            .iter()
            .any(|skip| entry.file_name().to_string_lossy() == *skip)
}

fn build_globset(file_types: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for ext in file_types {
        let ext = ext.trim_start_matches('.');
        builder.add(Glob::new(&format!("**/*.{}", ext))?);
    }
    Ok(builder.build()?)
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, config: &WorkspaceConfig) -> Self {
        Self {
            root: root.into(),
            file_types: config.file_types.clone(),
            max_file_bytes: config.max_file_bytes,
        }
    }

    /// The workspace from config, if a projects root is set.
    pub fn from_config(config: &WorkspaceConfig) -> Option<Self> {
        config
            .projects_root
            .as_ref()
            .map(|root| Self::new(root.clone(), config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dirs(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            bail!("Workspace root does not exist: {}", self.root.display());
        }
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter(|path| {
                path.file_name()
                    .is_some_and(|n| !n.to_string_lossy().starts_with('.'))
            })
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    /// Case-insensitive line search across every project.
    ///
    /// `file_types` overrides the configured extensions when given.
    pub fn search_projects(
        &self,
        query: &str,
        file_types: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<WorkspaceHit>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(IndexError::InvalidQuery("query must not be empty".to_string()).into());
        }

        let globs = build_globset(file_types.unwrap_or(&self.file_types))?;
        let mut hits = Vec::new();

        for project_dir in self.project_dirs()? {
            let project = project_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let walker = WalkDir::new(&project_dir)
                .into_iter()
                .filter_entry(|e| !is_skipped(e));
            for entry in walker {
                let Ok(entry) = entry else { continue };
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                let relative = path.strip_prefix(&project_dir).unwrap_or(path);
                let rel_str = relative.to_string_lossy().to_string();
                if !globs.is_match(&rel_str) {
                    continue;
                }
                if entry.metadata().map(|m| m.len()).unwrap_or(u64::MAX) > self.max_file_bytes {
                    continue;
                }
                let Ok(body) = std::fs::read_to_string(path) else {
                    continue;
                };

                let lines: Vec<&str> = body.lines().collect();
                for (i, line) in lines.iter().enumerate() {
                    if !line.to_lowercase().contains(&needle) {
                        continue;
                    }
                    hits.push(WorkspaceHit {
                        project: project.clone(),
                        path: rel_str.clone(),
                        line_number: i + 1,
                        line: line.trim().to_string(),
                        context: context_window(&lines, i, SCAN_CONTEXT_LINES),
                    });
                    if hits.len() >= limit {
                        return Ok(hits);
                    }
                }
            }
        }

        Ok(hits)
    }

    /// Technologies, layout, and README excerpt of one project.
    pub fn project_overview(&self, name: &str) -> Result<ProjectOverview> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(IndexError::InvalidQuery(format!("invalid project name: '{}'", name)).into());
        }
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Err(IndexError::not_found("project", name).into());
        }

        let mut technologies: Vec<String> = Vec::new();
        for (marker, tech) in TECH_MARKERS {
            if dir.join(marker).exists() && !technologies.iter().any(|t| t == tech) {
                technologies.push(tech.to_string());
            }
        }

        let mut entries: Vec<String> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| {
                let mut name = entry.file_name().to_string_lossy().to_string();
                if entry.path().is_dir() {
                    name.push('/');
                }
                name
            })
            .collect();
        entries.sort();

        let mut file_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut total_files = 0;
        let walker = WalkDir::new(&dir)
            .into_iter()
            .filter_entry(|e| !is_skipped(e));
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            total_files += 1;
            let ext = entry
                .path()
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_else(|| "(none)".to_string());
            *file_counts.entry(ext).or_insert(0) += 1;
        }

        let readme_excerpt = README_NAMES
            .iter()
            .map(|n| dir.join(n))
            .find(|p| p.is_file())
            .and_then(|p| std::fs::read_to_string(p).ok())
            .map(|body| body.chars().take(README_EXCERPT_CHARS).collect::<String>())
            .map(|excerpt| excerpt.trim().to_string());

        Ok(ProjectOverview {
            name: name.to_string(),
            path: dir,
            technologies,
            entries,
            file_counts,
            total_files,
            readme_excerpt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Workspace) {
        let tmp = TempDir::new().unwrap();
        let api = tmp.path().join("api");
        std::fs::create_dir_all(api.join("src")).unwrap();
        std::fs::create_dir_all(api.join("target")).unwrap();
        std::fs::write(api.join("Cargo.toml"), "[package]\nname = \"api\"\n").unwrap();
        std::fs::write(api.join("README.md"), "# API\n\nServes the site backend.").unwrap();
        std::fs::write(
            api.join("src").join("main.rs"),
            "fn main() {\n    let port = 8080;\n    serve(port);\n}\n",
        )
        .unwrap();
        std::fs::write(api.join("target").join("gen.rs"), "let port = 1;\n").unwrap();

        let web = tmp.path().join("web");
        std::fs::create_dir_all(&web).unwrap();
        std::fs::write(web.join("package.json"), "{}").unwrap();
        std::fs::write(web.join("tsconfig.json"), "{}").unwrap();
        std::fs::write(web.join("app.ts"), "const PORT = 3000;\n").unwrap();
        std::fs::write(web.join("notes.txt"), "port notes\n").unwrap();

        let ws = Workspace::new(tmp.path(), &WorkspaceConfig::default());
        (tmp, ws)
    }

    #[test]
    fn search_is_case_insensitive_and_skips_build_dirs() {
        let (_tmp, ws) = workspace();
        let hits = ws.search_projects("PORT", None, 50).unwrap();

        let locations: Vec<(String, String, usize)> = hits
            .iter()
            .map(|h| (h.project.clone(), h.path.clone(), h.line_number))
            .collect();
        assert!(locations.contains(&("api".into(), "src/main.rs".into(), 2)));
        assert!(locations.contains(&("web".into(), "app.ts".into(), 1)));
        assert!(hits.iter().all(|h| !h.path.starts_with("target")));
        assert!(hits.iter().all(|h| h.path != "notes.txt"));

        let main_hit = hits.iter().find(|h| h.line_number == 2).unwrap();
        assert_eq!(
            main_hit.context,
            "fn main() {\n    let port = 8080;\n    serve(port);\n}"
        );
    }

    #[test]
    fn file_type_override_and_limit() {
        let (_tmp, ws) = workspace();
        let hits = ws
            .search_projects("port", Some(&["txt".to_string()]), 50)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "notes.txt");

        assert_eq!(ws.search_projects("port", None, 1).unwrap().len(), 1);
    }

    #[test]
    fn overview_detects_technologies() {
        let (_tmp, ws) = workspace();
        let api = ws.project_overview("api").unwrap();
        assert_eq!(api.technologies, vec!["Rust"]);
        assert!(api.entries.contains(&"src/".to_string()));
        assert_eq!(api.file_counts.get("rs"), Some(&1));
        assert!(api.readme_excerpt.unwrap().contains("site backend"));

        let web = ws.project_overview("web").unwrap();
        assert_eq!(web.technologies, vec!["Node.js", "TypeScript"]);
        assert!(web.readme_excerpt.is_none());
    }

    #[test]
    fn missing_project_is_not_found() {
        let (_tmp, ws) = workspace();
        let err = ws.project_overview("nope").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::NotFound { .. })
        ));
        assert!(ws.project_overview("../etc").is_err());
    }
}

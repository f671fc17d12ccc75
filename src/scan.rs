use std::fs;
use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::debug;

use crate::config::ScanConfig;
use crate::error::TestError;

/// Compiled include/exclude filters for walking source directories.
#[derive(Debug, Clone)]
pub struct SourceFilter {
    include: GlobSet,
    exclude: GlobSet,
    use_gitignore: bool,
}

impl SourceFilter {
    pub fn from_config(config: &ScanConfig, source: Option<&Path>) -> Result<Self, TestError> {
        Ok(Self {
            include: compile_globset(&config.include, source)?,
            exclude: compile_globset(&config.exclude, source)?,
            use_gitignore: config.use_gitignore,
        })
    }
}

fn config_error(source: Option<&Path>, message: String) -> TestError {
    TestError::Config {
        path: source.map(Path::to_path_buf),
        message,
    }
}

pub fn compile_globset(patterns: &[String], source: Option<&Path>) -> Result<GlobSet, TestError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|err| config_error(source, format!("invalid glob {pattern}: {err}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|err| config_error(source, format!("cannot build glob set: {err}")))
}

fn build_gitignore(dir: &Path) -> Result<Gitignore, TestError> {
    let mut builder = GitignoreBuilder::new(dir);
    let gitignore = dir.join(".gitignore");
    if gitignore.exists() {
        if let Some(err) = builder.add(&gitignore) {
            return Err(config_error(
                Some(&gitignore),
                format!("cannot parse .gitignore: {err}"),
            ));
        }
    }
    builder
        .build()
        .map_err(|err| config_error(Some(&gitignore), format!("cannot parse .gitignore: {err}")))
}

/// Expands the command line paths into the source files to test. Files are taken as
/// given; directories are walked and filtered. The result is sorted and free of
/// duplicates.
pub fn collect_sources(paths: &[PathBuf], filter: &SourceFilter) -> Result<Vec<PathBuf>, TestError> {
    let mut out = Vec::new();
    for path in paths {
        let meta = fs::metadata(path).map_err(|source| TestError::Io {
            path: path.clone(),
            source,
        })?;
        if meta.is_dir() {
            out.extend(scan_dir(path, filter)?);
        } else {
            out.push(path.clone());
        }
    }
    out.sort();
    out.dedup();
    if out.is_empty() {
        return Err(TestError::Io {
            path: paths.first().cloned().unwrap_or_default(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no source files matched the scan filters",
            ),
        });
    }
    debug!(files = out.len(), "collected sources");
    Ok(out)
}

pub fn scan_dir(dir: &Path, filter: &SourceFilter) -> Result<Vec<PathBuf>, TestError> {
    let gitignore = if filter.use_gitignore {
        Some(build_gitignore(dir)?)
    } else {
        None
    };
    let mut files = Vec::new();
    collect_files_recursive(dir, &mut files);

    let mut out = Vec::new();
    for file in files {
        let Ok(rel) = file.strip_prefix(dir) else {
            continue;
        };
        let rel_posix = to_posix_path(rel);
        if !filter.include.is_match(&rel_posix) || filter.exclude.is_match(&rel_posix) {
            continue;
        }
        if let Some(gitignore) = &gitignore {
            if gitignore
                .matched_path_or_any_parents(rel, false)
                .is_ignore()
            {
                continue;
            }
        }
        out.push(file);
    }
    out.sort();
    Ok(out)
}

fn collect_files_recursive(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_dir() {
            if path
                .file_name()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s == ".git")
            {
                continue;
            }
            collect_files_recursive(&path, out);
        } else if meta.is_file() {
            out.push(path);
        }
    }
}

fn to_posix_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

//! File listing without content scanning.
use regex::Regex;
use tracing::{debug, info};

use crate::config::WalkConfig;
use crate::errors::{SearchError, SearchResult};
use crate::results::{FileInfo, FileListing};
use crate::sort::sort;
use crate::walker::{FileWalker, WalkedFile};

/// Lists the paths of every file under the configured roots
pub fn files(config: &WalkConfig) -> SearchResult<Vec<String>> {
    Ok(list_files(config)?.files)
}

/// Lists every file under the configured roots with its metadata
pub fn files_with_info(config: &WalkConfig) -> SearchResult<Vec<FileInfo>> {
    Ok(list_files_with_info(config)?.files)
}

/// Like [`files`], but also reports the entries that were skipped
pub fn list_files(config: &WalkConfig) -> SearchResult<FileListing<String>> {
    info!("Listing files under {} roots", config.paths.len());
    let walker = FileWalker::new(config)?;
    let (walked, diagnostics) = walker.collect();
    let files = sort(walked, config.sort)
        .into_iter()
        .map(|f| f.display)
        .collect::<Vec<_>>();
    info!("Listed {} files", files.len());
    Ok(FileListing { files, diagnostics })
}

/// Like [`files_with_info`], but also reports the entries that were skipped
pub fn list_files_with_info(config: &WalkConfig) -> SearchResult<FileListing<FileInfo>> {
    info!("Listing files with metadata under {} roots", config.paths.len());
    let walker = FileWalker::new(config)?.with_metadata(true);
    let (walked, diagnostics) = walker.collect();
    let files = walked
        .into_iter()
        .filter_map(|f| f.info)
        .collect::<Vec<_>>();
    let files = sort(files, config.sort);
    info!("Listed {} files", files.len());
    Ok(FileListing { files, diagnostics })
}

/// Finds files whose name matches `name_pattern`.
///
/// The pattern is a regex tested against the file name only, not the full
/// path. Each entry of `exclude_globs` is added after the configured globs
/// as an exclude, so it wins over any earlier include.
pub fn find_files(
    name_pattern: &str,
    exclude_globs: &[String],
    config: &WalkConfig,
) -> SearchResult<FileListing<String>> {
    info!(
        "Finding files named like {:?} under {} roots",
        name_pattern,
        config.paths.len()
    );
    let name_regex =
        Regex::new(name_pattern).map_err(|e| SearchError::invalid_pattern(name_pattern, e))?;

    let mut config = config.clone();
    config.globs.extend(exclude_globs.iter().map(|glob| {
        if glob.starts_with('!') {
            glob.clone()
        } else {
            format!("!{glob}")
        }
    }));
    debug!("Effective globs: {:?}", config.globs);

    let walker = FileWalker::new(&config)?;
    let (walked, diagnostics) = walker.collect();
    let matching: Vec<WalkedFile> = walked
        .into_iter()
        .filter(|f| {
            f.path
                .file_name()
                .is_some_and(|name| name_regex.is_match(&name.to_string_lossy()))
        })
        .collect();

    let files = sort(matching, config.sort)
        .into_iter()
        .map(|f| f.display)
        .collect::<Vec<_>>();
    info!("Found {} files", files.len());
    Ok(FileListing { files, diagnostics })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DiagnosticKind;
    use crate::results::FileKind;
    use crate::sort::SortMode;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn make_tree(root: &Path, files: &[&str]) {
        for file in files {
            let path = root.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "content\n").unwrap();
        }
    }

    fn relative(root: &Path, paths: Vec<String>) -> Vec<String> {
        let prefix = format!("{}/", root.to_string_lossy());
        paths
            .into_iter()
            .map(|p| p.strip_prefix(&prefix).unwrap_or(&p).to_string())
            .collect()
    }

    #[test]
    fn test_files_sorted_by_path() {
        let dir = tempdir().unwrap();
        make_tree(dir.path(), &["src/b.rs", "src/a.rs", "README.md"]);

        let config = WalkConfig::new([dir.path()])
            .globs(["*.rs"])
            .sort(SortMode::path());
        let listed = relative(dir.path(), files(&config).unwrap());
        assert_eq!(listed, vec!["src/a.rs", "src/b.rs"]);

        let config = config.sort(SortMode::path().reversed());
        let listed = relative(dir.path(), files(&config).unwrap());
        assert_eq!(listed, vec!["src/b.rs", "src/a.rs"]);
    }

    #[test]
    fn test_files_is_idempotent() {
        let dir = tempdir().unwrap();
        make_tree(dir.path(), &["x/1.txt", "x/2.txt", "y/3.txt", "4.txt"]);
        let config = WalkConfig::new([dir.path()]).sort(SortMode::path());
        assert_eq!(files(&config).unwrap(), files(&config).unwrap());
    }

    #[test]
    fn test_files_with_info() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "abc").unwrap();
        fs::write(dir.path().join("b.txt"), "abcdef").unwrap();

        let config = WalkConfig::new([dir.path()]).sort(SortMode::path());
        let infos = files_with_info(&config).unwrap();
        assert_eq!(infos.len(), 2);
        assert!(infos[0].path.ends_with("a.txt"));
        assert_eq!(infos[0].size, 3);
        assert_eq!(infos[1].size, 6);
        assert!(infos.iter().all(|i| i.kind == FileKind::File));
    }

    #[test]
    fn test_listing_reports_missing_roots() {
        let dir = tempdir().unwrap();
        make_tree(dir.path(), &["a.txt"]);
        let config = WalkConfig::new([dir.path().to_path_buf(), dir.path().join("gone")]);
        let listing = list_files(&config).unwrap();
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.diagnostics[0].kind, DiagnosticKind::RootNotFound);
    }

    #[test]
    fn test_find_files_by_name() {
        let dir = tempdir().unwrap();
        make_tree(
            dir.path(),
            &["src/main.rs", "src/lib.rs", "target/main.rs", "docs/main.md"],
        );

        let config = WalkConfig::new([dir.path()]).sort(SortMode::path());
        let found = find_files(r"^main\.", &[], &config).unwrap();
        assert_eq!(
            relative(dir.path(), found.files),
            vec!["docs/main.md", "src/main.rs", "target/main.rs"]
        );

        let found = find_files(r"^main\.", &["target/".to_string()], &config).unwrap();
        assert_eq!(
            relative(dir.path(), found.files),
            vec!["docs/main.md", "src/main.rs"]
        );
    }

    #[test]
    fn test_find_files_rejects_bad_regex() {
        let config = WalkConfig::new(["."]);
        let err = find_files("main(", &[], &config).unwrap_err();
        assert!(matches!(err, SearchError::InvalidPattern { .. }));
    }

    #[test]
    fn test_empty_paths_list_nothing() {
        let config = WalkConfig::new(Vec::<std::path::PathBuf>::new());
        assert!(files(&config).unwrap().is_empty());
        assert!(files_with_info(&config).unwrap().is_empty());
    }
}

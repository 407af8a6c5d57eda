use filerelay_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the config file to load.
///
/// Priority:
/// 1. `--config` flag / `FILERELAY_CONFIG` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `filerelay.yaml`
/// 3. None: built-in defaults plus flags and environment
pub fn resolve_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    let cwd = std::env::current_dir().ok()?;
    find_upward(&cwd)
}

fn find_upward(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = paths::config_path(&dir);
        if candidate.is_file() {
            return Some(candidate);
        }
        match dir.parent() {
            Some(p) => dir = p.to_path_buf(),
            None => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_config_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.yaml");
        assert_eq!(resolve_config(Some(&path)), Some(path));
    }

    #[test]
    fn finds_config_in_ancestor() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("filerelay.yaml"), "{}").unwrap();
        let deep = dir.path().join("a/b");
        std::fs::create_dir_all(&deep).unwrap();
        assert_eq!(
            find_upward(&deep),
            Some(dir.path().join("filerelay.yaml"))
        );
    }

    #[test]
    fn ignores_directory_named_like_config() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("filerelay.yaml")).unwrap();
        let found = find_upward(dir.path());
        assert_ne!(found, Some(dir.path().join("filerelay.yaml")));
    }
}

//! Path resolution for tool arguments
//!
//! Checks are purely lexical and run before any filesystem access, so a
//! rejected path never causes a mutation.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PathError {
    #[error("Path is empty")]
    Empty,

    #[error("Path traversal not allowed: {0}")]
    Traversal(String),

    #[error("Home directory paths not allowed: {0}")]
    HomeDirectory(String),

    #[error("Path must be relative to the project: {0}")]
    NotRelative(String),
}

fn check_lexical(raw: &str) -> Result<&Path, PathError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PathError::Empty);
    }
    if trimmed.starts_with('~') {
        return Err(PathError::HomeDirectory(raw.to_string()));
    }

    let path = Path::new(trimmed);
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(PathError::Traversal(raw.to_string()));
    }
    Ok(path)
}

/// Resolves a workspace-level path argument such as `projectDir`
///
/// Relative paths are joined onto `workspace_root`; absolute paths are
/// accepted as given.
///
/// # Examples
///
/// ```
/// use akashic_mcp::tools::paths::resolve_workspace_path;
/// use std::path::{Path, PathBuf};
///
/// let root = Path::new("/work");
/// assert_eq!(
///     resolve_workspace_path(root, "games/demo").unwrap(),
///     PathBuf::from("/work/games/demo")
/// );
/// assert!(resolve_workspace_path(root, "../../etc/passwd").is_err());
/// ```
pub fn resolve_workspace_path(workspace_root: &Path, raw: &str) -> Result<PathBuf, PathError> {
    let path = check_lexical(raw)?;
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(workspace_root.join(path))
    }
}

/// Resolves a file addressed inside a project; must be relative
pub fn resolve_project_path(project_dir: &Path, raw: &str) -> Result<PathBuf, PathError> {
    let path = check_lexical(raw)?;
    if path.is_absolute() {
        return Err(PathError::NotRelative(raw.to_string()));
    }
    Ok(project_dir.join(path))
}

/// Rejects traversal in values that are handed to external commands
pub fn check_relative_pattern(raw: &str) -> Result<(), PathError> {
    let path = check_lexical(raw)?;
    if path.is_absolute() {
        return Err(PathError::NotRelative(raw.to_string()));
    }
    Ok(())
}

/// `path` relative to `base`, with `/` separators, for display
pub fn display_relative(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_parent_traversal() {
        let root = Path::new("/work");
        for raw in ["../../etc/passwd", "a/../../b", "..", "/abs/../etc"] {
            assert!(
                matches!(resolve_workspace_path(root, raw), Err(PathError::Traversal(_))),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_rejects_home_and_empty() {
        let root = Path::new("/work");
        assert!(matches!(
            resolve_workspace_path(root, "~/games"),
            Err(PathError::HomeDirectory(_))
        ));
        assert_eq!(resolve_workspace_path(root, "  "), Err(PathError::Empty));
    }

    #[test]
    fn test_absolute_workspace_paths_are_kept() {
        let root = Path::new("/work");
        assert_eq!(
            resolve_workspace_path(root, "/srv/game").unwrap(),
            PathBuf::from("/srv/game")
        );
    }

    #[test]
    fn test_project_paths_must_be_relative() {
        let project = Path::new("/work/demo");
        assert_eq!(
            resolve_project_path(project, "script/main.js").unwrap(),
            PathBuf::from("/work/demo/script/main.js")
        );
        assert!(matches!(
            resolve_project_path(project, "/etc/hosts"),
            Err(PathError::NotRelative(_))
        ));
        assert!(check_relative_pattern("script/**/*.js").is_ok());
        assert!(check_relative_pattern("../**/*.js").is_err());
    }

    #[test]
    fn test_display_relative_uses_forward_slashes() {
        let base = Path::new("/work/demo");
        assert_eq!(
            display_relative(base, Path::new("/work/demo/script/main.js")),
            "script/main.js"
        );
    }
}

//! List tool — directory listing with name globs, depth limits and
//! hidden-entry filtering.

use std::fs::{self, Metadata};
use std::path::Path;

use chrono::{DateTime, Local, SecondsFormat};
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ToolError, ToolResult};

use super::{ToolArguments, ToolCallResult, ToolDefinition};

pub const LIST_FILES: &str = "list_files";

#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// File or directory to list.
    pub path: String,
    /// Glob matched against entry names (not paths).
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub show_hidden: bool,
    /// Depth limit for recursive listings; immediate children are depth 1.
    #[serde(default)]
    pub max_depth: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub modified: String,
}

#[derive(Debug, Serialize)]
struct Listing {
    files: Vec<FileEntry>,
}

pub fn tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: LIST_FILES.to_owned(),
        description: "List files and directories with optional filtering. Parameters: path, pattern \
            (glob on names), recursive, show_hidden, max_depth"
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory or file path to list"
                },
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern matched against entry names (e.g. \"*.rs\")"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Descend into subdirectories (default: false)"
                },
                "show_hidden": {
                    "type": "boolean",
                    "description": "Include entries whose name starts with '.' (default: false)"
                },
                "max_depth": {
                    "type": "integer",
                    "description": "Maximum depth for recursive listing (1 = immediate children)",
                    "minimum": 1
                }
            },
            "required": ["path"]
        }),
    }
}

struct Walk {
    matcher: Option<GlobMatcher>,
    show_hidden: bool,
    max_depth: Option<usize>,
}

impl Walk {
    fn from_params(params: &ListParams) -> ToolResult<Self> {
        let max_depth = match params.max_depth {
            None => None,
            Some(depth) if depth < 1 => {
                return Err(ToolError::invalid_arguments(format!(
                    "invalid max_depth: must be >= 1, got {depth}"
                )));
            }
            Some(depth) => Some(usize::try_from(depth).unwrap_or(usize::MAX)),
        };
        let matcher = match params.pattern.as_deref() {
            None | Some("") => None,
            Some(pattern) => Some(
                Glob::new(pattern)
                    .map_err(|source| ToolError::InvalidGlob {
                        pattern: pattern.to_owned(),
                        source,
                    })?
                    .compile_matcher(),
            ),
        };
        Ok(Self {
            matcher,
            show_hidden: params.show_hidden,
            max_depth: if params.recursive { max_depth } else { Some(1) },
        })
    }

    /// Visit `dir` (at `depth`), pushing entries in name order depth-first.
    fn visit(&self, dir: &Path, depth: usize, out: &mut Vec<FileEntry>) -> std::io::Result<()> {
        let mut entries: Vec<_> = fs::read_dir(dir)?.filter_map(Result::ok).collect();
        entries.sort_by_key(fs::DirEntry::file_name);

        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.show_hidden && name.starts_with('.') {
                continue;
            }
            // Does not follow symlinks.
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            let is_dir = meta.is_dir();
            if self.matcher.as_ref().is_none_or(|m| m.is_match(&name)) {
                out.push(file_entry(name, &meta));
            }
            if is_dir && self.max_depth.is_none_or(|max| depth < max) {
                // Unreadable subdirectories are skipped.
                let _ = self.visit(&entry.path(), depth + 1, out);
            }
        }
        Ok(())
    }
}

fn file_entry(name: String, meta: &Metadata) -> FileEntry {
    let modified = meta
        .modified()
        .map(|t| DateTime::<Local>::from(t).to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default();
    if meta.is_dir() {
        FileEntry {
            name,
            kind: "directory",
            size: None,
            modified,
        }
    } else {
        FileEntry {
            name,
            kind: "file",
            size: Some(meta.len()),
            modified,
        }
    }
}

/// List `path` according to the parameters.
pub fn list(path: &Path, params: &ListParams) -> ToolResult<Vec<FileEntry>> {
    let walk = Walk::from_params(params)?;
    let meta =
        fs::metadata(path).map_err(|e| ToolError::io("Failed to access path", path, e))?;

    if !meta.is_dir() {
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        return Ok(vec![file_entry(name, &meta)]);
    }

    let mut files = Vec::new();
    walk.visit(path, 1, &mut files)
        .map_err(|e| ToolError::io("Failed to read directory", path, e))?;
    Ok(files)
}

pub async fn execute(workspace: &Path, arguments: &ToolArguments) -> ToolResult<ToolCallResult> {
    let params: ListParams = arguments.parse()?;
    let path = super::resolve_path(workspace, &params.path)?;

    let root = path.clone();
    let files = super::blocking(move || list(&root, &params)).await?;
    debug!(path = %path.display(), files = files.len(), "list_files completed");

    let text = serde_json::to_string(&Listing { files })?;
    Ok(ToolCallResult::text(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(path: &Path) -> ListParams {
        ListParams {
            path: path.to_string_lossy().into_owned(),
            pattern: None,
            recursive: false,
            show_hidden: false,
            max_depth: None,
        }
    }

    fn names(entries: &[FileEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("src/nested")).expect("mkdir");
        fs::create_dir_all(root.join(".git")).expect("mkdir");
        fs::write(root.join("b.txt"), "bb").expect("write");
        fs::write(root.join("a.rs"), "a").expect("write");
        fs::write(root.join(".hidden"), "").expect("write");
        fs::write(root.join(".git/config"), "").expect("write");
        fs::write(root.join("src/lib.rs"), "").expect("write");
        fs::write(root.join("src/nested/deep.rs"), "").expect("write");
        dir
    }

    #[test]
    fn test_flat_listing_is_sorted_and_skips_hidden() {
        let dir = fixture();
        let entries = list(dir.path(), &params(dir.path())).expect("list");
        assert_eq!(names(&entries), ["a.rs", "b.txt", "src"]);
        assert_eq!(entries[1].kind, "file");
        assert_eq!(entries[1].size, Some(2));
        assert_eq!(entries[2].kind, "directory");
        assert_eq!(entries[2].size, None);
    }

    #[test]
    fn test_recursive_depth_first() {
        let dir = fixture();
        let p = ListParams {
            recursive: true,
            ..params(dir.path())
        };
        let entries = list(dir.path(), &p).expect("list");
        assert_eq!(
            names(&entries),
            ["a.rs", "b.txt", "src", "lib.rs", "nested", "deep.rs"]
        );
    }

    #[test]
    fn test_max_depth_and_pattern() {
        let dir = fixture();
        let p = ListParams {
            recursive: true,
            max_depth: Some(2),
            pattern: Some("*.rs".to_owned()),
            ..params(dir.path())
        };
        let entries = list(dir.path(), &p).expect("list");
        assert_eq!(names(&entries), ["a.rs", "lib.rs"]);
    }

    #[test]
    fn test_show_hidden_descends_hidden_dirs() {
        let dir = fixture();
        let p = ListParams {
            recursive: true,
            show_hidden: true,
            pattern: Some("config".to_owned()),
            ..params(dir.path())
        };
        let entries = list(dir.path(), &p).expect("list");
        assert_eq!(names(&entries), ["config"]);
    }

    #[test]
    fn test_file_path_lists_itself() {
        let dir = fixture();
        let file = dir.path().join("b.txt");
        let entries = list(&file, &params(&file)).expect("list");
        assert_eq!(names(&entries), ["b.txt"]);
        assert!(!entries[0].modified.is_empty());
    }

    #[test]
    fn test_invalid_arguments() {
        let dir = fixture();
        let bad_depth = ListParams {
            max_depth: Some(0),
            ..params(dir.path())
        };
        assert!(matches!(
            list(dir.path(), &bad_depth),
            Err(ToolError::InvalidArguments { .. })
        ));
        let bad_glob = ListParams {
            pattern: Some("[".to_owned()),
            ..params(dir.path())
        };
        assert!(matches!(
            list(dir.path(), &bad_glob),
            Err(ToolError::InvalidGlob { .. })
        ));
        assert!(matches!(
            list(&dir.path().join("missing"), &params(dir.path())),
            Err(ToolError::Io { .. })
        ));
    }
}

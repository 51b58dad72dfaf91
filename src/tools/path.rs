//! Path containment for tool arguments.
//!
//! Every path the model supplies must land inside the session working
//! directory. Resolution removes `.` and `..` lexically and then follows
//! symlinks through the deepest existing ancestor, so neither dot-dot
//! traversal nor a planted link can reach outside the sandbox.

use std::path::{Component, Path, PathBuf};

use crate::error::{AgentError, Result};

/// Resolve `raw` against `workdir`, requiring the result to stay inside.
///
/// Works for paths that do not exist yet (write targets): the missing
/// suffix is re-appended after the existing ancestor is canonicalized.
pub fn resolve_in_workdir(raw: &str, workdir: &Path) -> Result<PathBuf> {
    let workdir = workdir
        .canonicalize()
        .map_err(|e| AgentError::Config(format!("workdir unavailable: {}", e)))?;

    let candidate = Path::new(raw);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        workdir.join(candidate)
    };
    let normalized = normalize(&joined);

    // Canonicalize the deepest existing ancestor so symlinks are followed,
    // then restore the not-yet-existing suffix.
    let mut existing = normalized.clone();
    let mut missing = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => {
                missing.push(name.to_os_string());
                if !existing.pop() {
                    break;
                }
            }
            None => break,
        }
    }

    let mut resolved = existing
        .canonicalize()
        .map_err(|e| AgentError::Tool(format!("cannot resolve '{}': {}", raw, e)))?;
    for part in missing.iter().rev() {
        resolved.push(part);
    }

    if !resolved.starts_with(&workdir) {
        return Err(AgentError::PathTraversal(raw.to_string()));
    }
    Ok(resolved)
}

/// Lexical normalization: drop `.`, resolve `..` against the prefix.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

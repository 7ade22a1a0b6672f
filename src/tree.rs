//! Directory view of the flat table. An entry named `"dir/sub"` is a child of
//! the directory entry `"dir"`; nothing on disk records the nesting.

use super::*;
use error::{Result, VolumeError};
use layout::FileEntry;

/// Entry name of `name` inside `dir` (`None` is the root).
pub fn child_name(dir: Option<&str>, name: &str) -> Result<String> {
    if name.is_empty() || name.contains('/') || name.contains('\0') {
        return Err(VolumeError::InvalidName(name.to_string()));
    }
    let full = match dir {
        Some(dir) => format!("{}/{}", dir, name),
        None => name.to_string(),
    };
    // refused, never cut
    if full.len() > MAX_NAME_LEN {
        return Err(VolumeError::NameTooLong(full));
    }
    Ok(full)
}

/// Directory holding `name`, `None` for the root.
pub fn parent_name(name: &str) -> Option<&str> {
    name.rsplit_once('/').map(|(dir, _)| dir)
}

/// Direct children of `dir` (`None` is the root) with their short names.
pub fn children<'a>(
    entries: &'a [FileEntry],
    dir: Option<&str>,
) -> impl Iterator<Item = (&'a FileEntry, &'a str)> {
    let prefix = dir.map(|d| format!("{}/", d)).unwrap_or_default();
    entries.iter().filter_map(move |e| {
        let rest = e.name.strip_prefix(prefix.as_str())?;
        if rest.is_empty() || rest.contains('/') {
            None
        } else {
            Some((e, rest))
        }
    })
}

/// Whether any entry lives anywhere under `dir`.
pub fn has_children(entries: &[FileEntry], dir: &str) -> bool {
    let prefix = format!("{}/", dir);
    entries.iter().any(|e| e.name.starts_with(&prefix))
}

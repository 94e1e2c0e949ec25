//! Shared infrastructure-file filter.
//!
//! Applied to both the remote listing and the local replica scan so that VCS
//! metadata, editor droppings and tether's own temp files never enter a diff.

/// Directory names whose whole subtree is ignored.
const IGNORED_DIRS: &[&str] = &[".git", ".tether", ".idea", ".vscode", "node_modules"];

/// File names ignored wherever they appear.
const IGNORED_FILES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini", ".clasp.json"];

/// Suffixes of transient files.
const IGNORED_SUFFIXES: &[&str] = &[".tether.tmp", ".tmp", ".swp", "~"];

/// `true` if `filename` stays inside the replica root when joined onto it:
/// relative, `/`-separated, with no empty, `.` or `..` segments and no
/// backslashes.
pub fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains('\\')
        && filename
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..")
}

/// `true` if `filename` (a `/`-separated replica path) is infrastructure and
/// must be excluded from sync.
pub fn is_infrastructure(filename: &str) -> bool {
    let mut components = filename.split('/').peekable();
    while let Some(component) = components.next() {
        let is_last = components.peek().is_none();
        if !is_last && IGNORED_DIRS.contains(&component) {
            return true;
        }
        if is_last {
            if IGNORED_FILES.contains(&component) || IGNORED_DIRS.contains(&component) {
                return true;
            }
            if IGNORED_SUFFIXES.iter().any(|s| component.ends_with(s)) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vcs_and_tool_dirs_are_ignored() {
        assert!(is_infrastructure(".git/config"));
        assert!(is_infrastructure("node_modules/x/index.js"));
        assert!(is_infrastructure("src/.vscode/settings.json"));
    }

    #[test]
    fn system_and_temp_files_are_ignored() {
        assert!(is_infrastructure(".DS_Store"));
        assert!(is_infrastructure("lib/Thumbs.db"));
        assert!(is_infrastructure("Code.js.tether.tmp"));
        assert!(is_infrastructure("Code.js~"));
    }

    #[test]
    fn escaping_names_are_unsafe() {
        for name in ["../escaped.js", "/etc/passwd.js", "lib/../../x.js", "./Code.js", "lib//x.js", "lib\\x.js", ""] {
            assert!(!is_safe_filename(name), "{name:?} should be unsafe");
        }
        assert!(is_safe_filename("Code.js"));
        assert!(is_safe_filename("ui/Sidebar.html"));
        assert!(is_safe_filename("lib/v1..2.js"));
    }

    #[test]
    fn source_files_pass() {
        assert!(!is_infrastructure("Code.js"));
        assert!(!is_infrastructure("appsscript.json"));
        assert!(!is_infrastructure("ui/Sidebar.html"));
        assert!(!is_infrastructure("git/helpers.js"));
    }
}

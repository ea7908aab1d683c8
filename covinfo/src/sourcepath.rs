//! Canonical resolution of source file names mentioned in a note file.
//!
//! Note files record source names the way the compiler saw them, which is
//! usually relative to the compilation directory. Two spellings of the same
//! file must land in the same report record, so every name is resolved
//! against the note file's own directory and textually collapsed before it
//! is used as a key.

use std::path::Path;

/// The name used when a function or line carries no source file at all.
pub const UNKNOWN_SOURCE: &str = "<unknown>";

/// Resolves a source file name against the directory of the note file that
/// mentioned it, then collapses `/X/../` segments until none remain.
///
/// The collapse is purely textual; the filesystem is never consulted, so
/// dangling paths canonicalize the same way as real ones.
pub fn canonical_source_path(file_name: Option<&str>, note_file: &Path) -> String {
    let file_name = match file_name {
        Some(name) => name,
        None => return UNKNOWN_SOURCE.to_owned(),
    };

    let mut filename = if file_name.starts_with('/') {
        file_name.to_owned()
    } else {
        // only for relative paths: prepend the note file's directory.
        let note = note_file.to_string_lossy();
        match note.rfind('/') {
            Some(position) => format!("{}{}", &note[..position + 1], file_name),
            None => file_name.to_owned(),
        }
    };

    // Reduce the path.
    while let Some(found) = filename.find("/../") {
        match filename[..found].rfind('/') {
            Some(before) => filename.replace_range(before..found + 3, ""),
            None => break,
        }
    }

    filename
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn absolute_paths_keep_their_root() {
        let note = Path::new("obj/unit.gcno");
        assert_eq!(canonical_source_path(Some("/src/main.c"), note), "/src/main.c");
    }

    #[test]
    fn relative_paths_join_the_note_directory() {
        let note = Path::new("/build/obj/unit.gcno");
        assert_eq!(canonical_source_path(Some("main.c"), note), "/build/obj/main.c");
        assert_eq!(canonical_source_path(Some("../src/main.c"), note), "/build/src/main.c");
    }

    #[test]
    fn parent_segments_collapse_repeatedly() {
        let note = Path::new("/b/unit.gcno");
        assert_eq!(canonical_source_path(Some("x/y/../../src/m.c"), note), "/b/src/m.c");
        assert_eq!(canonical_source_path(Some("/a/b/../c/d/../e.c"), note), "/a/c/e.c");
    }

    #[test]
    fn inserted_detours_are_identity() {
        // canonical(P with X/.. spliced in) == canonical(P)
        let note = Path::new("/build/unit.gcno");
        let plain = canonical_source_path(Some("/usr/include/sys/types.h"), note);
        for detoured in &[
            "/usr/X/../include/sys/types.h",
            "/usr/include/X/../sys/Y/../types.h",
            "/usr/a/../b/../include/sys/types.h",
        ] {
            assert_eq!(canonical_source_path(Some(detoured), note), plain);
        }
    }

    #[test]
    fn unresolvable_parent_stops_quietly() {
        let note = Path::new("unit.gcno");
        assert_eq!(canonical_source_path(Some("../m.c"), note), "../m.c");
    }

    #[test]
    fn missing_name_is_unknown() {
        assert_eq!(canonical_source_path(None, Path::new("u.gcno")), UNKNOWN_SOURCE);
    }
}

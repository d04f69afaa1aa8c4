//! Skills reference loading.
//!
//! Skills are flat `.md` files in an agent's workspace `skills/` directory,
//! concatenated into a single reference block appended to the prompt.

use std::path::Path;

/// Read every top-level `.md` file in `dir` into one reference block.
///
/// Each file contributes `\n\n## Skill: <stem>\n\n<content>`. Files are
/// taken in name order. Subdirectories and other extensions are ignored; a
/// missing directory yields the empty string.
#[must_use]
pub fn read_skills(dir: &Path) -> String {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return String::new();
    };

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".md"))
        .collect();
    names.sort();

    let mut out = String::new();
    for name in names {
        let Ok(content) = std::fs::read_to_string(dir.join(&name)) else {
            continue;
        };
        let stem = name.trim_end_matches(".md");
        out.push_str(&format!("\n\n## Skill: {stem}\n\n{content}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_markdown_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("beta.md"), "beta content").unwrap();
        std::fs::write(dir.path().join("alpha.md"), "alpha content").unwrap();

        let out = read_skills(dir.path());
        let alpha = out.find("## Skill: alpha").unwrap();
        let beta = out.find("## Skill: beta").unwrap();
        assert!(alpha < beta);
        assert!(out.contains("alpha content"));
        assert!(out.contains("beta content"));
    }

    #[test]
    fn ignores_other_extensions_and_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "should be ignored").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/deep.md"), "should be ignored").unwrap();
        std::fs::write(dir.path().join("real.md"), "kept").unwrap();

        let out = read_skills(dir.path());
        assert!(out.contains("## Skill: real"));
        assert!(!out.contains("should be ignored"));
    }

    #[test]
    fn missing_directory_yields_empty() {
        assert_eq!(read_skills(Path::new("/nonexistent/skills")), "");
    }

    #[test]
    fn directory_without_markdown_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.json"), "{}").unwrap();
        assert_eq!(read_skills(dir.path()), "");
    }
}

//! Presentation helpers for the status/logs/responses subcommands.

use std::path::Path;

/// Count `.task` files in an inbox; unreadable directories count zero.
pub fn count_pending(inbox: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(inbox) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with(".task"))
        .count()
}

/// One status line: `name`, unit state, pending count.
pub fn format_status_line(name: &str, state: &str, pending: usize) -> String {
    format!("{name:<20} {state}  ({pending} pending)\n")
}

/// The last `n` lines of `data`, after trimming surrounding whitespace.
pub fn tail_lines(data: &str, n: usize) -> Vec<&str> {
    let trimmed = data.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let lines: Vec<&str> = trimmed.split('\n').collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].to_vec()
}

/// A response block: header plus content truncated to `max_len` bytes.
pub fn format_response(name: &str, filename: &str, content: &str, max_len: usize) -> String {
    let header = format!("=== {name}: {filename} ===\n");
    if content.len() > max_len {
        let mut end = max_len;
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        format!("{header}{}\n... (truncated)", &content[..end])
    } else {
        format!("{header}{content}")
    }
}

/// The lexicographically last `.response` entry of an already-sorted list.
pub fn latest_response<'a>(files: &'a [String]) -> Option<&'a str> {
    files
        .iter()
        .rev()
        .find(|f| f.ends_with(".response"))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_pending_ignores_non_tasks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.task"), "a").unwrap();
        std::fs::write(dir.path().join("b.task"), "b").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        assert_eq!(count_pending(dir.path()), 2);
        assert_eq!(count_pending(Path::new("/nonexistent")), 0);
    }

    #[test]
    fn status_line_layout() {
        assert_eq!(
            format_status_line("concierge", "active", 3),
            "concierge            active  (3 pending)\n"
        );
    }

    #[test]
    fn tail_lines_returns_the_suffix() {
        assert_eq!(tail_lines("a\nb\nc\n", 2), vec!["b", "c"]);
        assert_eq!(tail_lines("a\nb", 5), vec!["a", "b"]);
        assert!(tail_lines("   \n  ", 3).is_empty());
        assert!(tail_lines("", 3).is_empty());
    }

    #[test]
    fn response_block_truncates() {
        let short = format_response("scout", "x.response", "hi", 500);
        assert_eq!(short, "=== scout: x.response ===\nhi");

        let long = format_response("scout", "x.response", &"y".repeat(600), 500);
        assert!(long.ends_with("... (truncated)"));
        assert!(long.contains(&"y".repeat(500)));
        assert!(!long.contains(&"y".repeat(501)));
    }

    #[test]
    fn latest_response_picks_last_matching() {
        let files = vec![
            "001.response".to_string(),
            "002.response".to_string(),
            "zzz.txt".to_string(),
        ];
        assert_eq!(latest_response(&files), Some("002.response"));
        assert_eq!(latest_response(&["a.txt".to_string()]), None);
    }
}

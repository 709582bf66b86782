//! Decides whether the difference between two normalized patch files is
//! cosmetic (blob-hash drift, line-number drift in a hunk header) or a
//! genuine content change.
//!
//! Grounded on the behavior pinned by the original implementation's
//! `test_meaningful_diff` unit tests: an `index <sha>..<sha> <mode>` line
//! changing only its hashes is not meaningful, but a changed mode bit is;
//! a `@@ ... @@` hunk header changing only its line numbers is not
//! meaningful.

/// Returns `true` if `old` and `new` differ in a way that isn't explained
/// away by hash or line-number drift alone.
pub fn meaningful_diff(old: &str, new: &str) -> bool {
    if old == new {
        return false;
    }
    let patch = diffy::create_patch(old, new);
    for hunk in patch.hunks() {
        let mut deleted = Vec::new();
        let mut inserted = Vec::new();
        for line in hunk.lines() {
            match line {
                diffy::Line::Context(_) => {}
                diffy::Line::Delete(text) => deleted.push(trim_nl(text)),
                diffy::Line::Insert(text) => inserted.push(trim_nl(text)),
            }
        }
        // A hunk whose deletions don't line up one-for-one with insertions
        // actually added or removed lines, which is always meaningful.
        if deleted.len() != inserted.len() {
            return true;
        }
        for (old_line, new_line) in deleted.iter().zip(inserted.iter()) {
            if old_line == new_line {
                continue;
            }
            if is_index_line(old_line) && is_index_line(new_line) {
                if index_mode(old_line) == index_mode(new_line) {
                    continue;
                }
                return true;
            }
            if is_hunk_header(old_line) && is_hunk_header(new_line) {
                continue;
            }
            return true;
        }
    }
    false
}

fn trim_nl(text: &str) -> &str {
    text.strip_suffix('\n').unwrap_or(text)
}

fn is_index_line(line: &str) -> bool {
    line.starts_with("index ") && line.contains("..")
}

fn is_hunk_header(line: &str) -> bool {
    line.starts_with("@@ -")
}

/// The trailing mode token of an `index <old>..<new> <mode>` line, if any.
fn index_mode(line: &str) -> Option<&str> {
    line.split_whitespace().nth(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_only_index_change_is_not_meaningful() {
        let old = "index aaaaaaa..bbbbbbb 100644\n--- a/foo\n+++ b/foo\n@@ -1,3 +1,3 @@\n context\n";
        let new = "index ccccccc..ddddddd 100644\n--- a/foo\n+++ b/foo\n@@ -1,3 +1,3 @@\n context\n";
        assert!(!meaningful_diff(old, new));
    }

    #[test]
    fn line_number_only_hunk_header_change_is_not_meaningful() {
        let old = "index aaaaaaa..bbbbbbb 100644\n--- a/foo\n+++ b/foo\n@@ -1,3 +1,3 @@\n context\n";
        let new = "index aaaaaaa..bbbbbbb 100644\n--- a/foo\n+++ b/foo\n@@ -10,3 +10,3 @@\n context\n";
        assert!(!meaningful_diff(old, new));
    }

    #[test]
    fn permissions_change_is_meaningful() {
        let old = "index aaaaaaa..bbbbbbb 100644\n--- a/foo\n+++ b/foo\n@@ -1,3 +1,3 @@\n context\n";
        let new = "index aaaaaaa..bbbbbbb 100744\n--- a/foo\n+++ b/foo\n@@ -1,3 +1,3 @@\n context\n";
        assert!(meaningful_diff(old, new));
    }

    #[test]
    fn body_change_is_meaningful() {
        let old = "index aaaaaaa..bbbbbbb 100644\n--- a/foo\n+++ b/foo\n@@ -1,3 +1,3 @@\n-old\n+context\n";
        let new = "index aaaaaaa..bbbbbbb 100644\n--- a/foo\n+++ b/foo\n@@ -1,3 +1,3 @@\n-new\n+context\n";
        assert!(meaningful_diff(old, new));
    }

    #[test]
    fn identical_bodies_are_not_meaningful() {
        let body = "index aaaaaaa..bbbbbbb 100644\n--- a/foo\n+++ b/foo\n";
        assert!(!meaningful_diff(body, body));
    }
}

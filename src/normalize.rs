//! Deterministic rewriting of a raw `git format-patch` mbox so that
//! regenerating an unchanged patch yields byte-identical output.
//!
//! Four passes, applied in order: replace the `From <sha>` header's hash
//! with a literal token, strip the in-repo `Ply-Patch:` annotation, collapse
//! a doubled blank line before the first `diff --git`, and pin the trailing
//! git-version signature line to a fixed string.

use crate::error::NormalizeError;
use crate::utils::SimpleParser;
use bstr::{BStr, BString, ByteSlice};

/// The hash placeholder written into the `From` header of every normalized
/// patch. The working-repo commit hash would otherwise change on every
/// resave, making an unchanged patch diff against its own history.
pub const FROM_SHA1_VALUE: &str = "ply";

/// The version string written onto the trailing signature line regardless
/// of which `git` version actually produced the patch.
pub const PATCH_GIT_VERSION: &str = "2.43.0";

pub fn normalize(raw: &[u8]) -> Result<BString, NormalizeError> {
    let raw = BStr::new(raw);
    let mut parser = SimpleParser::new(raw);

    let from_line = parser.pop().map_err(|_| NormalizeError::MissingFromHeader)?;
    if !from_line.starts_with(b"From ") {
        return Err(NormalizeError::MissingFromHeader);
    }
    let rest_of_header = from_line
        .splitn(3, |&b| b == b' ')
        .nth(2)
        .unwrap_or_default();
    let mut out = BString::from(format!("From {FROM_SHA1_VALUE} "));
    out.extend_from_slice(rest_of_header);
    out.push(b'\n');

    let mut body: Vec<&BStr> = Vec::new();
    loop {
        match parser.pop() {
            Ok(line) => {
                if line.contains_str("Ply-Patch:") {
                    continue;
                }
                body.push(line);
            }
            Err(_) => break,
        }
    }

    let diff_start = body
        .iter()
        .position(|line| line.starts_with(b"diff --git"))
        .ok_or(NormalizeError::MissingDiffLine)?;
    if diff_start >= 2 && body[diff_start - 1].is_empty() && body[diff_start - 2].is_empty() {
        body.remove(diff_start - 1);
    }

    let version_line_idx = body
        .iter()
        .enumerate()
        .rev()
        .find(|(_, line)| !line.is_empty())
        .filter(|(_, line)| is_version_line(line))
        .map(|(idx, _)| idx);
    if let Some(idx) = version_line_idx {
        body[idx] = BStr::new(PATCH_GIT_VERSION.as_bytes());
    }

    for line in body {
        out.extend_from_slice(line);
        out.push(b'\n');
    }
    Ok(out)
}

fn is_version_line(line: &BStr) -> bool {
    let mut chars = line.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => {}
        _ => return false,
    }
    line.chars().next_back() != Some('.')
        && line
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c.is_ascii_alphanumeric() || c == '-')
}

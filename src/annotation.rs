//! Parsing of the two commit-message annotations Ply recognizes:
//! `Ply-Patch: <name>` and `Ply-Based-On: <hash>`.

use nom::bytes::complete::{tag, take_while1};
use nom::combinator::rest;
use nom::sequence::{preceded, terminated};
use nom::IResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    Patch,
    BasedOn,
}

fn annotation_keyword(input: &str) -> IResult<&str, AnnotationKind> {
    let (input, kind) = take_while1(|c: char| c.is_alphanumeric() || c == '-')(input)?;
    let kind = match kind {
        "Ply-Patch" => AnnotationKind::Patch,
        "Ply-Based-On" => AnnotationKind::BasedOn,
        _ => return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))),
    };
    Ok((input, kind))
}

fn annotation_line(input: &str) -> IResult<&str, (AnnotationKind, &str)> {
    let (input, kind) = annotation_keyword(input)?;
    let (input, value) = preceded(terminated(tag(":"), tag(" ")), rest)(input)?;
    Ok((input, (kind, value)))
}

/// Find the last line in `commit_msg` carrying a `Ply-Patch:` annotation
/// and return its value. `None` if no such line exists.
pub fn patch_annotation(commit_msg: &str) -> Option<String> {
    find_annotation(commit_msg, AnnotationKind::Patch)
}

/// Find the last line in `commit_msg` carrying a `Ply-Based-On:`
/// annotation and return its value. `None` if no such line exists.
pub fn based_on_annotation(commit_msg: &str) -> Option<String> {
    find_annotation(commit_msg, AnnotationKind::BasedOn)
}

fn find_annotation(commit_msg: &str, wanted: AnnotationKind) -> Option<String> {
    commit_msg.lines().rev().find_map(|line| {
        let (_, (kind, value)) = annotation_line(line.trim()).ok()?;
        (kind == wanted).then(|| value.trim().to_string())
    })
}

/// Append a `Ply-Patch: <name>` annotation to a commit message, preceded
/// by a blank line as the convention requires.
pub fn with_patch_annotation(commit_msg: &str, patch_name: &str) -> String {
    format!("{}\n\nPly-Patch: {}", commit_msg.trim_end(), patch_name)
}

/// Append a `Ply-Based-On: <hash>` annotation to a commit message.
pub fn with_based_on_annotation(commit_msg: &str, hash: &str) -> String {
    format!("{}\n\nPly-Based-On: {}", commit_msg.trim_end(), hash)
}

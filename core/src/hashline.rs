//! Content-hash line decoration and the hash-anchored line editor (§4.3.3).

use serde::Deserialize;
use serde::Serialize;
use sha1::Digest;
use sha1::Sha1;

/// First 7 hex chars of the SHA-1 digest of the trimmed line.
pub fn line_hash(line: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(line.trim().as_bytes());
    let digest = hasher.finalize();
    let hex = hex_encode(&digest);
    hex[..7].to_string()
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

/// A single hashline edit operation, as emitted by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HashlineOp {
    ReplaceLine { r#ref: String, content: String },
    InsertAfter { r#ref: String, content: String },
    InsertBefore { r#ref: String, content: String },
    DeleteLine { r#ref: String },
}

impl HashlineOp {
    fn ref_prefix(&self) -> &str {
        match self {
            HashlineOp::ReplaceLine { r#ref, .. }
            | HashlineOp::InsertAfter { r#ref, .. }
            | HashlineOp::InsertBefore { r#ref, .. }
            | HashlineOp::DeleteLine { r#ref } => r#ref,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpFailure {
    pub index: usize,
    pub reason: String,
}

/// Applies `ops` in order against `content`, recomputing every line hash
/// between ops (prior ops may have shifted lines). Returns the new content
/// on success, or the full list of per-op failures (zero matches or
/// ambiguous matches) without mutating anything the caller can observe.
pub fn apply_hashline_ops(content: &str, ops: &[HashlineOp]) -> Result<String, Vec<OpFailure>> {
    let mut lines: Vec<String> = split_keep_trailing_newline(content);
    let mut failures = Vec::new();

    for (index, op) in ops.iter().enumerate() {
        let hashes: Vec<String> = lines.iter().map(|l| line_hash(l)).collect();
        let matches: Vec<usize> = hashes
            .iter()
            .enumerate()
            .filter(|(_, h)| h.starts_with(op.ref_prefix()))
            .map(|(i, _)| i)
            .collect();

        match matches.len() {
            0 => failures.push(OpFailure {
                index,
                reason: format!("no line matches ref {:?}", op.ref_prefix()),
            }),
            1 => {
                let i = matches[0];
                match op {
                    HashlineOp::ReplaceLine { content, .. } => lines[i] = content.clone(),
                    HashlineOp::InsertAfter { content, .. } => lines.insert(i + 1, content.clone()),
                    HashlineOp::InsertBefore { content, .. } => lines.insert(i, content.clone()),
                    HashlineOp::DeleteLine { .. } => {
                        lines.remove(i);
                    }
                }
            }
            _ => failures.push(OpFailure {
                index,
                reason: format!(
                    "ref {:?} is ambiguous: {} lines match",
                    op.ref_prefix(),
                    matches.len()
                ),
            }),
        }
    }

    if !failures.is_empty() {
        return Err(failures);
    }
    Ok(lines.join("\n"))
}

/// Splits on `\n` while preserving whether the original content ended in a
/// trailing newline, the way §4.3.7 describes for chunk reconstruction: we
/// simply drop the final empty string produced by `split` unless the
/// content genuinely ended in `\n`, in which case we keep line count exact.
fn split_keep_trailing_newline(content: &str) -> Vec<String> {
    let mut parts: Vec<String> = content.split('\n').map(str::to_string).collect();
    if content.ends_with('\n') {
        parts.pop();
    }
    parts
}

/// Language-agnostic regex over common declaration keywords, used to list
/// structural signatures beyond a truncated read (§4.3.1).
pub fn structural_signatures(content: &str) -> Vec<String> {
    let re = regex_lite::Regex::new(
        r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:fn|function|def|class|interface|type|struct|enum|trait|impl)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("static regex is valid");
    re.captures_iter(content)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// A bounded unified diff between `before` and `after`, truncated to
/// `max_lines` lines of diff output (used to attach a compact diff preview
/// to `edit_file` results and to cap the diff sent to the Auditor).
pub fn bounded_diff(before: &str, after: &str, max_lines: usize) -> String {
    let diff = similar::TextDiff::from_lines(before, after);
    let mut out = String::new();
    let mut lines = 0usize;
    for change in diff.iter_all_changes() {
        if lines >= max_lines {
            out.push_str("... (diff truncated)\n");
            break;
        }
        let sign = match change.tag() {
            similar::ChangeTag::Delete => "-",
            similar::ChangeTag::Insert => "+",
            similar::ChangeTag::Equal => " ",
        };
        out.push_str(sign);
        out.push_str(&change.to_string());
        lines += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_hash_is_stable_and_trims_whitespace() {
        assert_eq!(line_hash("line 1"), line_hash("  line 1  "));
        assert_eq!(line_hash("line 1").len(), 7);
    }

    #[test]
    fn replace_line_applies_by_hash_prefix() {
        let content = "line 1\nline 2";
        let r#ref = line_hash("line 1")[..7].to_string();
        let ops = vec![HashlineOp::ReplaceLine { r#ref, content: "LINE ONE".into() }];
        let result = apply_hashline_ops(content, &ops).unwrap();
        assert_eq!(result, "LINE ONE\nline 2");
    }

    #[test]
    fn zero_matches_fails_without_mutating() {
        let ops = vec![HashlineOp::ReplaceLine { r#ref: "zzzzzzz".into(), content: "x".into() }];
        let err = apply_hashline_ops("a\nb", &ops).unwrap_err();
        assert_eq!(err.len(), 1);
    }

    #[test]
    fn ambiguous_match_fails() {
        let content = "dup\ndup";
        let r#ref = line_hash("dup");
        let ops = vec![HashlineOp::ReplaceLine { r#ref, content: "x".into() }];
        let err = apply_hashline_ops(content, &ops).unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err[0].reason.contains("ambiguous"));
    }

    #[test]
    fn hash_recomputed_between_ops_survives_line_shift() {
        let content = "a\nb\nc";
        let ops = vec![
            HashlineOp::InsertAfter { r#ref: line_hash("a"), content: "inserted".into() },
            HashlineOp::ReplaceLine { r#ref: line_hash("c"), content: "C".into() },
        ];
        let result = apply_hashline_ops(content, &ops).unwrap();
        assert_eq!(result, "a\ninserted\nb\nC");
    }

    #[test]
    fn structural_signatures_finds_function_and_class_names() {
        let sigs = structural_signatures("pub fn foo() {}\nclass Bar {}\ndef baz():\n");
        assert_eq!(sigs, vec!["foo", "Bar", "baz"]);
    }
}

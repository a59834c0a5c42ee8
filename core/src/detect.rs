//! Tool-call extraction from a completed assistant turn (§4.3, Design
//! Notes: "must be implemented as an explicit state machine over
//! {outside, in-string, escape, depth tracking}; regex-only approaches miss
//! nested objects").

use push_protocol::ToolCall;
use push_protocol::ToolName;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Outside,
    InString,
    Escape,
}

/// Brace-balanced extraction of every top-level `{...}` span in `s`, respecting
/// string/escape state so a brace inside a string literal never affects
/// depth (P5).
pub fn extract_json_objects(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut mode = Mode::Outside;
    let mut depth: i32 = 0;
    let mut start: usize = 0;
    let mut prev_mode_before_escape = Mode::Outside;

    let chars: Vec<(usize, char)> = s.char_indices().collect();
    for &(idx, c) in &chars {
        match mode {
            Mode::Escape => {
                mode = prev_mode_before_escape;
            }
            Mode::InString => {
                if c == '\\' {
                    prev_mode_before_escape = Mode::InString;
                    mode = Mode::Escape;
                } else if c == '"' {
                    mode = Mode::Outside;
                }
            }
            Mode::Outside => match c {
                '"' => mode = Mode::InString,
                '{' => {
                    if depth == 0 {
                        start = idx;
                    }
                    depth += 1;
                }
                '}' => {
                    if depth > 0 {
                        depth -= 1;
                        if depth == 0 {
                            let end = idx + c.len_utf8();
                            out.push(s[start..end].to_string());
                        }
                    }
                }
                _ => {}
            },
        }
    }
    out
}

fn extract_fenced_json_blocks(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = s;
    while let Some(fence_start) = rest.find("```") {
        let after_fence = &rest[fence_start + 3..];
        let lang_end = after_fence.find('\n').unwrap_or(0);
        let lang = after_fence[..lang_end].trim();
        let body_start = lang_end + 1;
        if let Some(close_rel) = after_fence[body_start..].find("```") {
            let body = &after_fence[body_start..body_start + close_rel];
            if lang.is_empty() || lang.eq_ignore_ascii_case("json") {
                out.push(body.trim().to_string());
            }
            rest = &after_fence[body_start + close_rel + 3..];
        } else {
            break;
        }
    }
    out
}

fn parse_tool_call(candidate: &str) -> Option<ToolCall> {
    let value: serde_json::Value = serde_json::from_str(candidate).ok()?;
    let obj = value.as_object()?;
    let tool_name = obj.get("tool")?.as_str()?;
    let tool = ToolName::from_name_or_alias(tool_name)?;
    let args = obj.get("args").cloned().unwrap_or(serde_json::json!({}));
    Some(ToolCall { tool, args })
}

/// Scans a completed assistant turn for the first well-formed, validated
/// tool call: fenced ```json blocks first, then bare top-level JSON objects,
/// both in document order. Later candidates in the same turn are ignored.
pub fn find_tool_call(turn_text: &str) -> Option<ToolCall> {
    for candidate in extract_fenced_json_blocks(turn_text) {
        if let Some(call) = parse_tool_call(&candidate) {
            return Some(call);
        }
    }
    for candidate in extract_json_objects(turn_text) {
        if let Some(call) = parse_tool_call(&candidate) {
            return Some(call);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_top_level_object() {
        let objs = extract_json_objects(r#"prefix {"a": 1} suffix"#);
        assert_eq!(objs, vec![r#"{"a": 1}"#.to_string()]);
    }

    #[test]
    fn ignores_braces_inside_string_literals() {
        let objs = extract_json_objects(r#"{"a": "} not a close {"}"#);
        assert_eq!(objs.len(), 1);
        assert!(serde_json::from_str::<serde_json::Value>(&objs[0]).is_ok());
    }

    #[test]
    fn handles_escaped_quotes_inside_strings() {
        let objs = extract_json_objects(r#"{"a": "she said \"hi\" {not a brace}"}"#);
        assert_eq!(objs.len(), 1);
    }

    #[test]
    fn nested_objects_are_captured_as_one_span() {
        let objs = extract_json_objects(r#"{"tool": "exec", "args": {"command": "ls"}}"#);
        assert_eq!(objs.len(), 1);
        let v: serde_json::Value = serde_json::from_str(&objs[0]).unwrap();
        assert_eq!(v["args"]["command"], "ls");
    }

    #[test]
    fn fenced_json_block_is_detected_over_bare_json() {
        let text = "here is my call\n```json\n{\"tool\": \"exec\", \"args\": {\"command\": \"echo hi\"}}\n```\n";
        let call = find_tool_call(text).unwrap();
        assert_eq!(call.tool, ToolName::Exec);
    }

    #[test]
    fn first_well_formed_call_wins_later_blocks_ignored() {
        let text = r#"{"tool": "exec", "args": {"command": "first"}} then {"tool": "search", "args": {"query": "second"}}"#;
        let call = find_tool_call(text).unwrap();
        assert_eq!(call.tool, ToolName::Exec);
        assert_eq!(call.args["command"], "first");
    }

    #[test]
    fn unknown_tool_name_is_skipped_in_favor_of_next_candidate() {
        let text = r#"{"tool": "not_a_real_tool", "args": {}} {"tool": "diff", "args": {}}"#;
        let call = find_tool_call(text).unwrap();
        assert_eq!(call.tool, ToolName::Diff);
    }

    #[test]
    fn plain_prose_with_no_json_yields_no_call() {
        assert!(find_tool_call("just some regular assistant text.").is_none());
    }
}

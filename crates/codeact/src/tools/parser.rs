//! Extract tool calls from free-form model text
//!
//! A small tokenizer walks the text once, left to right. Three productions
//! are recognized and never overlap: once a span is consumed by one, the
//! others do not see it.
//!
//! 1. Fenced code blocks tagged with a language (```` ```python ````).
//! 2. `<request_user_input>prompt</request_user_input>`.
//! 3. A JSON object `{"code": ..., "language": ...}`, either after the
//!    `<tool_call>` delimiter or bare in the prose.
//!
//! Anything malformed is skipped without error.

use serde::Deserialize;
use std::borrow::Cow;

use super::{ToolCall, ToolKind};

pub const USER_INPUT_OPEN: &str = "<request_user_input>";
pub const USER_INPUT_CLOSE: &str = "</request_user_input>";
pub const TOOL_CALL_OPEN: &str = "<tool_call>";
pub const TOOL_CALL_CLOSE: &str = "</tool_call>";

const FENCE: &str = "```";

/// Parse every tool call in `text`, in order of appearance
pub fn parse_tool_calls(text: &str) -> Vec<ToolCall> {
    Tokenizer::new(text).filter_map(Token::into_call).collect()
}

/// A recognized production, borrowing from the source text where it can
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Code { kind: ToolKind, body: Cow<'a, str> },
    UserInput(&'a str),
    /// A balanced `{...}` span that still has to be decoded
    Json(&'a str),
}

#[derive(Debug, Deserialize)]
struct CodePayload {
    code: String,
    #[serde(default)]
    language: Option<String>,
}

impl<'a> Token<'a> {
    fn into_call(self) -> Option<ToolCall> {
        match self {
            Token::Code { kind, body } => {
                let body = normalize_body(&body);
                (!body.is_empty()).then(|| ToolCall::new(kind, body))
            }
            Token::UserInput(prompt) => {
                let prompt = prompt.trim();
                (!prompt.is_empty()).then(|| ToolCall::new(ToolKind::UserInput, prompt))
            }
            Token::Json(raw) => {
                let payload = decode_payload(raw)?;
                let kind = payload
                    .language
                    .as_deref()
                    .and_then(ToolKind::from_language)
                    .unwrap_or(ToolKind::Bash);
                let code = normalize_body(&payload.code);
                (!code.is_empty()).then(|| ToolCall::new(kind, code))
            }
        }
    }
}

fn decode_payload(raw: &str) -> Option<CodePayload> {
    serde_json::from_str::<CodePayload>(raw).ok()
}

/// Drop leading blank lines and trailing whitespace, keep indentation
fn normalize_body(body: &str) -> &str {
    let body = body.trim_end();
    let mut start = 0;
    for line in body.split_inclusive('\n') {
        if line.trim().is_empty() {
            start += line.len();
        } else {
            break;
        }
    }
    &body[start..]
}

/// Closing fence in `region`: a line holding only ``` after at most
/// `indent + 3` spaces. Returns the body length and the length of the
/// fence on the closing line.
fn find_close(region: &str, indent: usize) -> Option<(usize, usize)> {
    let mut offset = 0;
    for line in region.split_inclusive('\n') {
        let content = line.trim_end_matches(|c| c == '\n' || c == '\r');
        let stripped = content.trim_start_matches(|c| c == ' ' || c == '\t');
        let lead = content.len() - stripped.len();
        if lead <= indent + 3 && stripped.starts_with(FENCE) && stripped[FENCE.len()..].trim().is_empty() {
            return Some((offset, lead + FENCE.len()));
        }
        offset += line.len();
    }
    None
}

/// Remove up to `indent` leading blanks from every line
fn dedent(body: &str, indent: usize) -> Cow<'_, str> {
    if indent == 0 {
        return Cow::Borrowed(body);
    }
    Cow::Owned(
        body.split_inclusive('\n')
            .map(|line| {
                let strip = line
                    .bytes()
                    .take(indent)
                    .take_while(|b| *b == b' ' || *b == b'\t')
                    .count();
                &line[strip..]
            })
            .collect(),
    )
}

/// Byte offset of the `}` closing the object that starts at `s[0]`
fn matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

struct Tokenizer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    /// Step over one character
    fn bump(&mut self) {
        if let Some(c) = self.rest().chars().next() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Blanks before `pos` on its line, or 0 when other text precedes it
    fn line_indent(&self) -> usize {
        let line_start = self.text[..self.pos].rfind('\n').map_or(0, |i| i + 1);
        let prefix = &self.text[line_start..self.pos];
        if prefix.chars().all(|c| c == ' ' || c == '\t') {
            prefix.len()
        } else {
            0
        }
    }

    /// Fenced block at `pos`. `None` means the span was consumed without a token.
    fn fence(&mut self) -> Option<Token<'a>> {
        let indent = self.line_indent();
        let after_open = &self.rest()[FENCE.len()..];

        let line_end = after_open.find('\n');
        let info = &after_open[..line_end.unwrap_or(after_open.len())];
        if let Some(close) = info.find(FENCE) {
            // Inline ```...``` on a single line
            self.pos += FENCE.len() + close + FENCE.len();
            return None;
        }

        let Some(newline) = line_end else {
            // Unterminated, nothing after it can be trusted
            self.pos = self.text.len();
            return None;
        };

        let tag = info.split_whitespace().next().unwrap_or("").to_lowercase();
        let body_start = FENCE.len() + newline + 1;
        let body_region = &self.rest()[body_start..];

        let Some((body_len, close_len)) = find_close(body_region, indent) else {
            self.pos = self.text.len();
            return None;
        };

        let body = &body_region[..body_len];
        self.pos += body_start + body_len + close_len;

        if let Some(kind) = ToolKind::from_language(&tag) {
            return Some(Token::Code {
                kind,
                body: dedent(body, indent),
            });
        }
        if tag == "json" {
            let trimmed = body.trim();
            if trimmed.starts_with('{') {
                return Some(Token::Json(trimmed));
            }
        }
        None
    }

    fn user_input(&mut self) -> Option<Token<'a>> {
        let start = self.pos + USER_INPUT_OPEN.len();
        match self.text[start..].find(USER_INPUT_CLOSE) {
            Some(len) => {
                self.pos = start + len + USER_INPUT_CLOSE.len();
                Some(Token::UserInput(&self.text[start..start + len]))
            }
            None => {
                self.pos = start;
                None
            }
        }
    }

    fn delimited_json(&mut self) -> Option<Token<'a>> {
        self.pos += TOOL_CALL_OPEN.len();
        self.skip_whitespace();

        let rest = self.rest();
        if !rest.starts_with('{') {
            return None;
        }
        let end = matching_brace(rest)?;
        let raw = &rest[..=end];
        self.pos += end + 1;

        let after = self.rest();
        let trimmed = after.trim_start();
        if trimmed.starts_with(TOOL_CALL_CLOSE) {
            self.pos += after.len() - trimmed.len() + TOOL_CALL_CLOSE.len();
        }

        Some(Token::Json(raw))
    }

    fn bare_json(&mut self) -> Option<Token<'a>> {
        let rest = self.rest();
        let Some(end) = matching_brace(rest) else {
            self.bump();
            return None;
        };

        let raw = &rest[..=end];
        self.pos += end + 1;
        decode_payload(raw).map(|_| Token::Json(raw))
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.text.len() {
            let rest = self.rest();
            let Some(offset) = rest.find(|c: char| matches!(c, '`' | '<' | '{')) else {
                self.pos = self.text.len();
                break;
            };
            self.pos += offset;
            let rest = self.rest();

            let token = if rest.starts_with(FENCE) {
                self.fence()
            } else if rest.starts_with(USER_INPUT_OPEN) {
                self.user_input()
            } else if rest.starts_with(TOOL_CALL_OPEN) {
                self.delimited_json()
            } else if rest.starts_with('{') {
                self.bare_json()
            } else {
                self.bump();
                None
            };

            if token.is_some() {
                return token;
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(calls: &[ToolCall]) -> Vec<ToolKind> {
        calls.iter().map(|c| c.kind).collect()
    }

    #[test]
    fn test_single_bash_block() {
        let calls = parse_tool_calls("```bash\necho hi\n```");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, ToolKind::Bash);
        assert_eq!(calls[0].payload, "echo hi");
    }

    #[test]
    fn test_order_follows_text() {
        let text = "First:\n```python\nprint('a')\n```\nThen:\n```bash\nls -la\n```\n";
        let calls = parse_tool_calls(text);
        assert_eq!(kinds(&calls), vec![ToolKind::Python, ToolKind::Bash]);
        assert_eq!(calls[0].payload, "print('a')");
        assert_eq!(calls[1].payload, "ls -la");
    }

    #[test]
    fn test_js_tag_normalized() {
        let calls = parse_tool_calls("```js\nconsole.log(2+2)\n```");
        assert_eq!(kinds(&calls), vec![ToolKind::JavaScript]);
    }

    #[test]
    fn test_indentation_preserved() {
        let text = "```python\n\nfor i in range(2):\n    print(i)\n\n```";
        let calls = parse_tool_calls(text);
        assert_eq!(calls[0].payload, "for i in range(2):\n    print(i)");
    }

    #[test]
    fn test_untagged_and_unknown_fences_are_inert() {
        let text = "```\nplain\n```\n```text\n{\"code\": \"rm -rf /\"}\n```";
        assert!(parse_tool_calls(text).is_empty());
    }

    #[test]
    fn test_unterminated_fence_dropped() {
        assert!(parse_tool_calls("```bash\necho never closed").is_empty());
    }

    #[test]
    fn test_inline_fence_ignored() {
        assert!(parse_tool_calls("use ```ls``` to list").is_empty());
    }

    #[test]
    fn test_user_input_marker() {
        let text = "I need a name.\n<request_user_input> What should the file be called? </request_user_input>";
        let calls = parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, ToolKind::UserInput);
        assert_eq!(calls[0].payload, "What should the file be called?");
    }

    #[test]
    fn test_unclosed_user_input_dropped() {
        assert!(parse_tool_calls("<request_user_input>hello").is_empty());
    }

    #[test]
    fn test_delimited_json_defaults_to_bash() {
        let text = r#"<tool_call>{"code": "ls"}</tool_call>"#;
        let calls = parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, ToolKind::Bash);
        assert_eq!(calls[0].payload, "ls");
    }

    #[test]
    fn test_unknown_language_falls_back_to_bash() {
        let text = r#"<tool_call> {"code": "puts 1", "language": "ruby"}"#;
        assert_eq!(kinds(&parse_tool_calls(text)), vec![ToolKind::Bash]);
    }

    #[test]
    fn test_bare_json_object() {
        let text = r#"Running: {"code": "print(1)", "language": "python"} now"#;
        let calls = parse_tool_calls(text);
        assert_eq!(kinds(&calls), vec![ToolKind::Python]);
        assert_eq!(calls[0].payload, "print(1)");
    }

    #[test]
    fn test_json_fence_is_shape_three() {
        let text = "```json\n{\"code\": \"console.log(1)\", \"language\": \"javascript\"}\n```";
        assert_eq!(kinds(&parse_tool_calls(text)), vec![ToolKind::JavaScript]);
    }

    #[test]
    fn test_malformed_json_dropped_silently() {
        let text = r#"<tool_call>{"code": "ls", "language": }</tool_call> and {"code": "#;
        assert!(parse_tool_calls(text).is_empty());
    }

    #[test]
    fn test_braces_in_prose_and_strings() {
        let text = r#"A set {1, 2} and {"code": "echo '}' done"}"#;
        let calls = parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].payload, "echo '}' done");
    }

    #[test]
    fn test_json_inside_code_block_not_double_counted() {
        let text = "```python\nimport json\nprint(json.dumps({\"code\": \"x\"}))\n```";
        let calls = parse_tool_calls(text);
        assert_eq!(kinds(&calls), vec![ToolKind::Python]);
    }

    #[test]
    fn test_mixed_shapes_keep_order() {
        let text = "Héllo ✓\n<tool_call>{\"code\": \"pwd\"}</tool_call>\n```python\nprint(1)\n```\n<request_user_input>ok?</request_user_input>";
        let calls = parse_tool_calls(text);
        assert_eq!(kinds(&calls), vec![ToolKind::Bash, ToolKind::Python, ToolKind::UserInput]);
    }

    #[test]
    fn test_empty_blocks_produce_nothing() {
        assert!(parse_tool_calls("```bash\n```").is_empty());
        assert!(parse_tool_calls("<request_user_input>  </request_user_input>").is_empty());
        assert!(parse_tool_calls(r#"{"code": ""}"#).is_empty());
    }

    #[test]
    fn test_fences_indented_in_a_list() {
        let text = "1. List files:\n   ```bash\n   ls\n   ```\n2. Then:\n   ```python\n   for i in range(2):\n       print(i)\n   ```\n";
        let calls = parse_tool_calls(text);
        assert_eq!(kinds(&calls), vec![ToolKind::Bash, ToolKind::Python]);
        assert_eq!(calls[0].payload, "ls");
        assert_eq!(calls[1].payload, "for i in range(2):\n    print(i)");
    }

    #[test]
    fn test_fence_text_inside_body_is_not_a_close() {
        let text = "```bash\necho '``` not a close'\n```";
        let calls = parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].payload, "echo '``` not a close'");
    }

    #[test]
    fn test_plain_text_has_no_calls() {
        assert!(parse_tool_calls("The answer is 4. TASK_COMPLETE").is_empty());
    }
}

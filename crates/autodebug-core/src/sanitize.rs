//! Normalisation of proposed code into runnable source text.

/// Generic markdown fence.
pub const GENERIC_FENCE: &str = "```";

/// Language-tagged fence stripped by [`sanitize`].
pub const PYTHON_FENCE: &str = "```python";

/// Clean a candidate code block using the default `python` fence tag.
pub fn sanitize(code: &str) -> String {
    sanitize_with_fence(code, PYTHON_FENCE)
}

/// Clean a candidate code block.
///
/// 1. Remove every `language_fence`, then every generic fence.
/// 2. Drop whitespace-only lines at both ends (interior blanks are kept).
/// 3. Expand tabs to four spaces.
/// 4. Rejoin with `\n`.
///
/// Idempotent: after one pass no run of three backticks is left and both
/// ends already hold content.
pub fn sanitize_with_fence(code: &str, language_fence: &str) -> String {
    let mut text = code.to_string();
    if language_fence.starts_with(GENERIC_FENCE) && language_fence.len() > GENERIC_FENCE.len() {
        text = text.replace(language_fence, "");
    }
    let text = text.replace(GENERIC_FENCE, "");

    let lines: Vec<&str> = text.split('\n').collect();
    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(start, |i| i + 1);

    lines[start..end]
        .iter()
        .map(|l| l.replace('\t', "    "))
        .collect::<Vec<_>>()
        .join("\n")
}

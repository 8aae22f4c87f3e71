//! JSON decoding with readable errors for payloads we don't control.

use serde::de::DeserializeOwned;

/// Decode failure with the serde path and a snippet around the bad column.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}{summary} (line {line} col {column})\n{snippet}", path_prefix(.path))]
pub struct JsonError {
    pub path: String,
    pub summary: String,
    pub line: usize,
    pub column: usize,
    pub snippet: String,
}

fn path_prefix(path: &str) -> String {
    if path.is_empty() || path == "." {
        String::new()
    } else {
        format!("at path '{path}': ")
    }
}

/// Parse `body`, reporting where and why decoding failed.
pub fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, JsonError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|err| {
        let inner = err.inner();
        let (line, column) = (inner.line(), inner.column());
        let message = inner.to_string();
        let location = format!(" at line {line} column {column}");
        let message = message.strip_suffix(&location).unwrap_or(&message);

        JsonError {
            path: err.path().to_string(),
            summary: summarize(message),
            line,
            column,
            snippet: snippet(body, line, column, 24),
        }
    })
}

/// "invalid type: null, expected a string" -> "expected a string, got null".
fn summarize(message: &str) -> String {
    if let Some(rest) = message.strip_prefix("invalid type: ")
        && let Some((actual, expected)) = rest.split_once(", expected ")
    {
        return format!("expected {}, got {actual}", expected.trim());
    }
    message.to_owned()
}

fn snippet(body: &str, line: usize, column: usize, width: usize) -> String {
    let text = body.lines().nth(line.saturating_sub(1)).unwrap_or("");
    if text.is_empty() {
        return "(empty line)".to_owned();
    }
    let chars: Vec<char> = text.chars().collect();
    let at = column.saturating_sub(1).min(chars.len());
    let start = at.saturating_sub(width / 2);
    let end = (at + width / 2).min(chars.len());
    let slice: String = chars[start..end].iter().collect();
    format!("...{slice}...\n   {}^", " ".repeat(at - start))
}

//! Read tool — file reading with encodings, line ranges and line filters.

use std::path::Path;

use encoding_rs::{ISO_8859_15, UTF_16BE, UTF_16LE, WINDOWS_1251, WINDOWS_1252};
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ToolError, ToolResult};

use super::{ToolArguments, ToolCallResult, ToolDefinition};

pub const READ_FILE: &str = "read_file";
pub const VIEW: &str = "view";

/// Parameters for the read tool.
#[derive(Debug, Default, Deserialize)]
pub struct ReadParams {
    /// Path to the file to read.
    pub filename: String,
    /// First line to return (1-based).
    #[serde(default)]
    pub start_line: Option<i64>,
    /// Last line to return (1-based, inclusive).
    #[serde(default)]
    pub end_line: Option<i64>,
    /// Source encoding (default: utf-8).
    #[serde(default)]
    pub encoding: Option<String>,
    /// Prefix each line with its number.
    #[serde(default)]
    pub line_numbers: bool,
    /// Drop whitespace-only lines.
    #[serde(default)]
    pub skip_empty: bool,
    /// Maximum number of lines to return.
    #[serde(default)]
    pub max_lines: Option<i64>,
    /// Keep only lines matching this regex.
    #[serde(default)]
    pub pattern: Option<String>,
}

pub fn tool_definition(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_owned(),
        description: description.to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "Path to the file"
                },
                "start_line": {
                    "type": "integer",
                    "description": "First line to read (1-based)",
                    "minimum": 1
                },
                "end_line": {
                    "type": "integer",
                    "description": "Last line to read (1-based, inclusive)",
                    "minimum": 1
                },
                "encoding": {
                    "type": "string",
                    "description": "File encoding: utf-8 (default), utf-16, utf-16be, utf-16le, windows-1251, iso-8859-1, iso-8859-15, windows-1252"
                },
                "line_numbers": {
                    "type": "boolean",
                    "description": "Prefix each line with its line number"
                },
                "skip_empty": {
                    "type": "boolean",
                    "description": "Skip empty and whitespace-only lines"
                },
                "max_lines": {
                    "type": "integer",
                    "description": "Maximum number of lines to return",
                    "minimum": 1
                },
                "pattern": {
                    "type": "string",
                    "description": "Regular expression; only matching lines are returned"
                }
            },
            "required": ["filename"]
        }),
    }
}

impl ReadParams {
    fn validate(&self) -> ToolResult<Option<Regex>> {
        if let Some(start) = self.start_line {
            if start < 1 {
                return Err(ToolError::invalid_arguments(format!(
                    "invalid start_line: must be >= 1, got {start}"
                )));
            }
            if let Some(end) = self.end_line {
                if end < start {
                    return Err(ToolError::invalid_arguments(format!(
                        "invalid line range: end_line ({end}) must be >= start_line ({start})"
                    )));
                }
            }
        }
        if let Some(max) = self.max_lines {
            if max < 1 {
                return Err(ToolError::invalid_arguments(format!(
                    "invalid max_lines: must be > 0, got {max}"
                )));
            }
        }
        self.pattern
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ToolError::InvalidPattern {
                    pattern: pattern.to_owned(),
                    source,
                })
            })
            .transpose()
    }
}

/// Execute the read tool.
pub async fn execute(workspace: &Path, arguments: &ToolArguments) -> ToolResult<ToolCallResult> {
    let params: ReadParams = arguments.parse()?;
    let pattern = params.validate()?;
    let path = super::resolve_path(workspace, &params.filename)?;

    let data = tokio::fs::read(&path)
        .await
        .map_err(|e| ToolError::io("Failed to read file", &path, e))?;
    let text = decode_content(&data, params.encoding.as_deref().unwrap_or("utf-8"))?;
    let output = render(&text, &params, pattern.as_ref());

    debug!(path = %path.display(), bytes = output.len(), "read_file completed");
    Ok(ToolCallResult::text(output))
}

/// Decode raw file bytes using the named encoding.
pub fn decode_content(data: &[u8], encoding: &str) -> ToolResult<String> {
    let text = match encoding.to_ascii_lowercase().as_str() {
        "" | "utf-8" | "utf8" => String::from_utf8_lossy(data).into_owned(),
        // BOM decides the byte order; little-endian without one.
        "utf-16" | "utf16" => UTF_16LE.decode(data).0.into_owned(),
        "utf-16be" | "utf16be" => UTF_16BE.decode_without_bom_handling(data).0.into_owned(),
        "utf-16le" | "utf16le" => UTF_16LE.decode_without_bom_handling(data).0.into_owned(),
        "windows-1251" | "windows1251" | "cp1251" => {
            WINDOWS_1251.decode_without_bom_handling(data).0.into_owned()
        }
        // encoding_rs treats the latin1 label as windows-1252; map bytes directly instead.
        "iso-8859-1" | "iso8859-1" | "latin1" => data.iter().map(|&b| char::from(b)).collect(),
        "iso-8859-15" | "iso8859-15" | "latin9" => {
            ISO_8859_15.decode_without_bom_handling(data).0.into_owned()
        }
        "windows-1252" | "windows1252" | "cp1252" => {
            WINDOWS_1252.decode_without_bom_handling(data).0.into_owned()
        }
        _ => {
            return Err(ToolError::UnsupportedEncoding {
                name: encoding.to_owned(),
            });
        }
    };
    Ok(text)
}

/// Apply range, pattern, `skip_empty`, `max_lines` and numbering to `text`.
///
/// A trailing line terminator does not count as an extra empty line; the
/// output ends with `\n` when the input did and anything was selected.
fn render(text: &str, params: &ReadParams, pattern: Option<&Regex>) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let ends_with_newline = normalized.ends_with('\n');
    let body = normalized.strip_suffix('\n').unwrap_or(&normalized);
    let lines: Vec<&str> = if normalized.is_empty() {
        Vec::new()
    } else {
        body.split('\n').collect()
    };

    let total = lines.len();
    let start = params
        .start_line
        .map_or(0, |s| usize::try_from(s - 1).unwrap_or(usize::MAX));
    let end = params
        .end_line
        .map_or(total, |e| usize::try_from(e).unwrap_or(0).min(total));
    if start >= total || end <= start {
        return String::new();
    }

    let mut selected: Vec<(usize, &str)> = lines[start..end]
        .iter()
        .enumerate()
        .map(|(i, line)| (start + i + 1, *line))
        .filter(|(_, line)| pattern.is_none_or(|re| re.is_match(line)))
        .filter(|(_, line)| !params.skip_empty || !line.trim().is_empty())
        .collect();
    if let Some(max) = params.max_lines {
        selected.truncate(usize::try_from(max).unwrap_or(usize::MAX));
    }
    if selected.is_empty() {
        return String::new();
    }

    let width = selected
        .iter()
        .map(|(n, _)| *n)
        .max()
        .unwrap_or(0)
        .to_string()
        .len();
    let mut output = selected
        .iter()
        .map(|(n, line)| {
            if params.line_numbers {
                format!("{n:>width$}: {line}")
            } else {
                (*line).to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    if ends_with_newline {
        output.push('\n');
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ReadParams {
        ReadParams::default()
    }

    #[test]
    fn test_whole_file_round_trips() {
        assert_eq!(render("a\nb\n", &params(), None), "a\nb\n");
        assert_eq!(render("a\nb", &params(), None), "a\nb");
        assert_eq!(render("", &params(), None), "");
        // Trailing blank lines survive.
        assert_eq!(render("a\n\n", &params(), None), "a\n\n");
        assert_eq!(render("\n", &params(), None), "\n");
    }

    #[test]
    fn test_crlf_is_normalized() {
        assert_eq!(render("a\r\nb\rc\r\n", &params(), None), "a\nb\nc\n");
    }

    #[test]
    fn test_line_range() {
        let text = "Line 1\nLine 2\nLine 3\nLine 4\nLine 5";
        let p = ReadParams {
            start_line: Some(2),
            end_line: Some(4),
            ..params()
        };
        assert_eq!(render(text, &p, None), "Line 2\nLine 3\nLine 4");

        let beyond = ReadParams {
            start_line: Some(10),
            ..params()
        };
        assert_eq!(render(text, &beyond, None), "");
    }

    #[test]
    fn test_numbering_uses_original_line_numbers() {
        let text: String = (1..=12).map(|i| format!("l{i}\n")).collect();
        let p = ReadParams {
            start_line: Some(8),
            end_line: Some(10),
            line_numbers: true,
            ..params()
        };
        assert_eq!(render(&text, &p, None), " 8: l8\n 9: l9\n10: l10\n");
    }

    #[test]
    fn test_pattern_skip_empty_and_max_lines() {
        let text = "error: a\ninfo: b\n\n   \nerror: c\nerror: d\n";
        let re = Regex::new("error").expect("regex");
        let p = ReadParams {
            max_lines: Some(2),
            line_numbers: true,
            ..params()
        };
        assert_eq!(render(text, &p, Some(&re)), "1: error: a\n5: error: c\n");

        let p = ReadParams {
            skip_empty: true,
            ..params()
        };
        assert_eq!(
            render(text, &p, None),
            "error: a\ninfo: b\nerror: c\nerror: d\n"
        );
    }

    #[test]
    fn test_validation() {
        let bad_start = ReadParams {
            start_line: Some(0),
            ..params()
        };
        assert!(bad_start.validate().is_err());

        let bad_range = ReadParams {
            start_line: Some(4),
            end_line: Some(2),
            ..params()
        };
        assert!(bad_range.validate().is_err());

        let bad_max = ReadParams {
            max_lines: Some(0),
            ..params()
        };
        assert!(bad_max.validate().is_err());

        let bad_regex = ReadParams {
            pattern: Some("(".to_owned()),
            ..params()
        };
        assert!(matches!(
            bad_regex.validate(),
            Err(ToolError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_decode_legacy_encodings() {
        assert_eq!(
            decode_content(&[0xcf, 0xf0, 0xe8, 0xe2, 0xe5, 0xf2], "windows-1251").expect("decode"),
            "Привет"
        );
        assert_eq!(decode_content(&[0x63, 0x61, 0x66, 0xe9], "latin1").expect("decode"), "café");
        assert_eq!(decode_content(&[0xa4], "iso-8859-15").expect("decode"), "€");
        assert_eq!(
            decode_content(&[0xff, 0xfe, b'h', 0, b'i', 0], "utf-16").expect("decode"),
            "hi"
        );
        assert_eq!(
            decode_content(&[0, b'h', 0, b'i'], "UTF-16BE").expect("decode"),
            "hi"
        );
        assert!(matches!(
            decode_content(b"x", "ebcdic"),
            Err(ToolError::UnsupportedEncoding { .. })
        ));
    }
}

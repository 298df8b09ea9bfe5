//! Relay response text.
//!
//! A response is zero or more lines, each ending in `\n`; the stream adds
//! the NUL terminator. Failures are a single line starting with
//! [`ERROR_MARKER`].

use std::fmt::Display;

use crate::error::{RelayError, Result};

/// Prefix of every error line.
pub const ERROR_MARKER: &str = "error - ";

/// Body of a successful command without data.
pub const OK: &str = "ok\n";

/// Render data lines.
pub fn lines<I, T>(items: I) -> String
where
    I: IntoIterator<Item = T>,
    T: Display,
{
    items.into_iter().map(|item| format!("{item}\n")).collect()
}

/// Render one numeric value so the client recovers it exactly.
pub fn number(value: f64) -> String {
    format!("{value}\n")
}

/// Render a failure as an error line.
pub fn error(message: impl Display) -> String {
    // Multi-line error chains must stay on one line.
    let text = message.to_string().replace('\n', " ");
    format!("{ERROR_MARKER}{text}\n")
}

/// Space-separated lowercase hex bytes.
pub fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3 + 1);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out.push('\n');
    out
}

/// Split a response into data lines, or surface the daemon's error.
///
/// Any response mentioning an error counts as one, whether or not it
/// carries the marker.
pub fn parse(response: &str) -> Result<Vec<String>> {
    if response.contains("error") {
        let line = response.lines().next().unwrap_or_default();
        let message = match line.find(ERROR_MARKER) {
            Some(at) => &line[at + ERROR_MARKER.len()..],
            None => line,
        };
        return Err(RelayError::Remote(message.trim().to_string()));
    }
    Ok(response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Parse space-separated hex bytes.
pub fn parse_hex_bytes(line: &str) -> Option<Vec<u8>> {
    line.split_whitespace()
        .map(|byte| u8::from_str_radix(byte, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_round_trip_exactly() {
        let value = 0.1 + 0.2;
        let text = number(value);
        assert_eq!(text.trim().parse::<f64>().unwrap(), value);
        assert_eq!(number(25.0), "25\n");
        assert_eq!(number(-1.0), "-1\n");
    }

    #[test]
    fn error_lines_carry_marker() {
        let line = error("no board selected");
        assert_eq!(line, "error - no board selected\n");
        assert!(matches!(parse(&line), Err(RelayError::Remote(m)) if m == "no board selected"));
        assert_eq!(error("a\nb"), "error - a b\n");
    }

    #[test]
    fn prefixed_error_text_is_still_an_error() {
        let reply = "vbias daemon error - reset failed for board at 9f\n";
        assert!(matches!(
            parse(reply),
            Err(RelayError::Remote(m)) if m == "reset failed for board at 9f"
        ));
    }

    #[test]
    fn data_lines_split() {
        assert_eq!(parse("9f 00:1a:2b:3c:4d:9f\na0 00:1a:2b:3c:4d:a0\n").unwrap().len(), 2);
        assert!(parse("").unwrap().is_empty());
        assert_eq!(parse(OK).unwrap(), vec!["ok"]);
    }

    #[test]
    fn hex_dump() {
        let text = hex_bytes(&[0x00, 0x1a, 0xff]);
        assert_eq!(text, "00 1a ff\n");
        assert_eq!(parse_hex_bytes(text.trim()).unwrap(), vec![0x00, 0x1a, 0xff]);
        assert!(parse_hex_bytes("00 zz").is_none());
    }

    #[test]
    fn lines_render_each_item() {
        assert_eq!(lines(["a", "b"]), "a\nb\n");
        assert_eq!(lines(Vec::<String>::new()), "");
    }
}

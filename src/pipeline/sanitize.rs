//! Text cleanup for report bodies.
//!
//! Two passes run on every model response before it reaches the writer:
//!
//! 1. [`clean_response`] fixes model quirks without touching content
//!    (wrapping code fences, CRLF, trailing spaces, runs of blank lines,
//!    invisible Unicode).
//! 2. [`sanitize_for_report`] maps the text onto what the report font can
//!    encode. Anything outside printable WinAnsi becomes `?`.
//!
//! Both passes are pure and deterministic, and applying either twice gives
//! the same result as applying it once.

use once_cell::sync::Lazy;
use regex::Regex;

/// Character substituted for anything the report font cannot encode.
pub const PLACEHOLDER: char = '?';

/// Apply the cleanup rules, then sanitize for the report encoding.
pub fn prepare_body(raw: &str) -> String {
    sanitize_for_report(&clean_response(raw))
}

/// Whether a response carries no visible text once cleaned.
pub fn is_blank_response(raw: &str) -> bool {
    prepare_body(raw).trim().is_empty()
}

/// Remove formatting artefacts vision models add around their answer.
///
/// Rules (applied in order):
/// 1. Strip an outer code fence (```` ``` ```` or ```` ```markdown ````)
/// 2. Normalise line endings (CRLF/CR → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to one blank line
/// 6. Trim leading/trailing blank lines
pub fn clean_response(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

/// Map text onto the report's single-byte encoding.
///
/// Tabs expand to four spaces and carriage returns are dropped; newline
/// survives; anything with a WinAnsi code survives (printable ASCII,
/// Latin-1 and the typographic marks in 0x80–0x9F); every other character,
/// including control characters, becomes [`PLACEHOLDER`].
pub fn sanitize_for_report(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\n' => out.push('\n'),
            '\t' => out.push_str("    "),
            '\r' => {}
            c if winansi_byte(c).is_some() => out.push(c),
            _ => out.push(PLACEHOLDER),
        }
    }
    out
}

/// WinAnsi code of a printable character, if the encoding has one.
pub fn winansi_byte(c: char) -> Option<u8> {
    let byte = match c {
        ' '..='~' | '\u{A0}'..='\u{FF}' => return u8::try_from(u32::from(c)).ok(),
        '\u{20AC}' => 0x80, // €
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85, // …
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95, // •
        '\u{2013}' => 0x96, // –
        '\u{2014}' => 0x97, // —
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => return None,
    };
    Some(byte)
}

/// Encode sanitized text as WinAnsi bytes.
///
/// Anything without a WinAnsi code is written as the placeholder byte.
pub fn to_winansi_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| winansi_byte(c).unwrap_or(PLACEHOLDER as u8))
        .collect()
}

// ── Rule 1: Strip outer fences ───────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_outer_fence("```markdown\n- a\n- b\n```"), "- a\n- b");
        assert_eq!(strip_outer_fence("```\n- a\n```"), "- a");
        assert_eq!(strip_outer_fence("- a\n- b"), "- a\n- b");
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        assert_eq!(
            remove_invisible_chars("gap\u{200B} 3\u{FEFF}mm\u{00AD}"),
            "gap 3mm"
        );
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn clean_response_full_pipeline() {
        let raw = "```\r\n- Clearance: 12 mm   \r\n\r\n\r\n\r\n- Datum A\u{200B}\r\n```";
        assert_eq!(clean_response(raw), "- Clearance: 12 mm\n\n- Datum A");
    }

    #[test]
    fn sanitize_replaces_unsupported_characters() {
        let s = sanitize_for_report("Ø 12 mm ± 0.1 → datum 🔧\tok");
        assert_eq!(s, "Ø 12 mm ± 0.1 ? datum ?    ok");
    }

    #[test]
    fn sanitize_replaces_control_characters() {
        assert_eq!(sanitize_for_report("a\u{0007}b\u{0085}c\r\n"), "a?b?c\n");
    }

    #[test]
    fn typographic_marks_keep_their_winansi_codes() {
        let s = sanitize_for_report("• Bolt – M8 — “torque” 25 N·m …");
        assert_eq!(s, "• Bolt – M8 — “torque” 25 N·m …");
        let bytes = to_winansi_bytes("•–—“”’€");
        assert_eq!(bytes, vec![0x95, 0x96, 0x97, 0x93, 0x94, 0x92, 0x80]);
    }

    #[test]
    fn c1_controls_are_not_winansi() {
        assert_eq!(winansi_byte('\u{0095}'), None);
        assert_eq!(sanitize_for_report("a\u{0095}b"), "a?b");
    }

    #[test]
    fn sanitize_is_deterministic_and_idempotent() {
        let input = "Bolt ⌀8 — torque 25 N·m ✓\r\n“quoted”";
        let first = sanitize_for_report(input);
        let second = sanitize_for_report(input);
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_eq!(sanitize_for_report(&first), first);
    }

    #[test]
    fn prepare_body_is_idempotent() {
        let input = "```\n- ⌀ 20 mm\n\n\n\n- 5°\n```";
        let once = prepare_body(input);
        assert_eq!(prepare_body(&once), once);
    }

    #[test]
    fn winansi_bytes_are_single_byte() {
        let text = sanitize_for_report("5° ± é");
        let bytes = to_winansi_bytes(&text);
        assert_eq!(bytes, vec![b'5', 0xB0, b' ', 0xB1, b' ', 0xE9]);
    }
}

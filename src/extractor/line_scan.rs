//! Line-oriented scan of `go build`'s combined stdout/stderr: interleaved
//! assembly (from `-S`) and build diagnostics (from `-gcflags -m=2`).

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{Diagnostic, Mapping, Range};

static ASSEMBLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\t(\S+) \d+ \(([^:]+):(\d+)\)\t(.*)$").unwrap());
static MESSAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?):(\d+):(\d+): (.*)$").unwrap());
static CAN_INLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^can inline (\w+) with cost (\d+)").unwrap());
static CANNOT_INLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^cannot inline (\w+): (.*)$").unwrap());
static INLINING_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^inlining call to (\w+)").unwrap());
static HEAP_ESCAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+) escapes to heap:").unwrap());

const MAIN_FILENAME: &str = "./main.go";

pub fn scan(source_code: &str, build_output: &[u8]) -> (String, Vec<Mapping>, Vec<Diagnostic>) {
    let source_lines: Vec<&str> = source_code.lines().collect();
    let text = String::from_utf8_lossy(build_output);

    let mut assembly = String::new();
    let mut mapping: Vec<Mapping> = Vec::new();
    let mut diagnostics = Vec::new();
    let mut assembly_line = 0usize;

    for line in text.lines() {
        if line.is_empty() || line.starts_with('#') || line.contains(" STEXT ") {
            continue;
        }

        if let Some(caps) = ASSEMBLY_RE.captures(line) {
            let addr = &caps[1];
            let file = &caps[2];
            let src_line: usize = caps[3].parse().unwrap_or(0);
            let code = caps[4].replace('\t', " ");

            assembly.push_str(addr);
            assembly.push('\t');
            assembly.push_str(&code);
            assembly.push('\n');
            assembly_line += 1;

            if file == MAIN_FILENAME || file == "main.go" {
                match mapping.last_mut() {
                    Some(last) if last.source_line == src_line => {
                        last.assembly_end = assembly_line;
                    }
                    _ => mapping.push(Mapping {
                        source_line: src_line,
                        assembly_start: assembly_line,
                        assembly_end: assembly_line,
                    }),
                }
            }
            continue;
        }

        if let Some(caps) = MESSAGE_RE.captures(line) {
            let file = &caps[1];
            let src_line: usize = caps[2].parse().unwrap_or(0);
            let col: usize = caps[3].parse().unwrap_or(0);
            let text = &caps[4];

            if file != MAIN_FILENAME {
                continue;
            }
            let leading_spaces = text.chars().take_while(|&c| c == ' ').count();
            if leading_spaces / 2 != 0 {
                continue;
            }

            diagnostics.extend(extract_diagnostic(&source_lines, src_line, col, text));
        }
    }

    (assembly, mapping, diagnostics)
}

fn extract_diagnostic(
    source_lines: &[&str],
    line: usize,
    col: usize,
    text: &str,
) -> Vec<Diagnostic> {
    if let Some(caps) = CAN_INLINE_RE.captures(text) {
        let name = caps[1].to_string();
        let cost: i64 = caps[2].parse().unwrap_or(0);
        let range = name_range(source_lines, line, col, name.len());
        return vec![Diagnostic::InliningAnalysis { name, can_inline: true, reason: None, cost, range }];
    }
    if let Some(caps) = CANNOT_INLINE_RE.captures(text) {
        let name = caps[1].to_string();
        let reason = caps[2].to_string();
        let range = name_range(source_lines, line, col, name.len());
        return vec![Diagnostic::InliningAnalysis {
            name,
            can_inline: false,
            reason: Some(reason),
            cost: 0,
            range,
        }];
    }
    if let Some(caps) = INLINING_CALL_RE.captures(text) {
        let name = caps[1].to_string();
        let range = inlined_call_range(source_lines, line, col, &name);
        return vec![Diagnostic::InlinedCall { name, range }];
    }
    if let Some(caps) = HEAP_ESCAPE_RE.captures(text) {
        let name = caps[1].to_string();
        return heap_escapes(source_lines, line, col, &name, text);
    }
    Vec::new()
}

fn source_line(source_lines: &[&str], line: usize) -> &str {
    source_lines.get(line.saturating_sub(1)).copied().unwrap_or("")
}

/// Converts a 1-based byte column on `line` to a 1-based code-point column.
fn byte_col_to_char_col(line: &str, byte_col: usize) -> usize {
    let mut idx = byte_col.saturating_sub(1).min(line.len());
    while idx > 0 && !line.is_char_boundary(idx) {
        idx -= 1;
    }
    line[..idx].chars().count() + 1
}

/// Builds a `[start, start+len)` code-point range on a single line, given a
/// 1-based byte start column.
fn byte_range(line: &str, start_byte_col: usize, len_bytes: usize) -> Range {
    let start = byte_col_to_char_col(line, start_byte_col);
    let end = byte_col_to_char_col(line, start_byte_col + len_bytes);
    Range::at(0, start, end)
}

fn name_range(source_lines: &[&str], line: usize, col: usize, name_len: usize) -> Range {
    let src = source_line(source_lines, line);
    let mut r = byte_range(src, col, name_len);
    r.start.line = line;
    r.end.line = line;
    r
}

/// Fixes up the inlining-call-site column: the toolchain reports the
/// column one past the callee identifier; we want the identifier itself.
/// If `line[..COL-1]` ends with `NAME`, the range is `len(NAME)` columns
/// ending at `COL`. Otherwise we walk backward from `COL-1` (inclusive)
/// over the trailing letter run and use that length instead.
fn inlined_call_range(source_lines: &[&str], line: usize, col: usize, name: &str) -> Range {
    let src = source_line(source_lines, line);
    let bytes = src.as_bytes();
    let excl_end = col.saturating_sub(1).min(bytes.len());
    let before = &bytes[..excl_end];

    let len = if before.ends_with(name.as_bytes()) {
        name.len()
    } else {
        let start_idx = col.saturating_sub(1);
        let mut n = 0;
        if start_idx < bytes.len() {
            let mut i = start_idx;
            while (bytes[i] as char).is_ascii_alphabetic() {
                n += 1;
                if i == 0 {
                    break;
                }
                i -= 1;
            }
        }
        n
    };

    let start_col = col.saturating_sub(len);
    let mut r = byte_range(src, start_col, len);
    r.start.line = line;
    r.end.line = line;
    r
}

fn heap_escapes(source_lines: &[&str], line: usize, col: usize, name: &str, text: &str) -> Vec<Diagnostic> {
    let src = source_line(source_lines, line);
    let at = col.saturating_sub(1).min(src.len());

    let mut out = vec![if src.as_bytes()[at..].starts_with(name.as_bytes()) {
        Diagnostic::HeapEscape {
            name: Some(name.to_string()),
            message: None,
            range: name_range(source_lines, line, col, name.len()),
        }
    } else if let Some(pos) = src.find(name) {
        Diagnostic::HeapEscape {
            name: Some(name.to_string()),
            message: None,
            range: name_range(source_lines, line, pos + 1, name.len()),
        }
    } else {
        Diagnostic::HeapEscape {
            name: None,
            message: Some(text.to_string()),
            range: name_range(source_lines, line, col, 0),
        }
    }];

    // Off-by-one observed on toolchains before 1.20: if the name also
    // starts one byte further in, the toolchain emitted both positions.
    let shifted = col; // col is 1-based; col (not col-1) is the 0-based "+1" position
    if shifted < src.len() && src.as_bytes()[shifted..].starts_with(name.as_bytes()) {
        out.push(Diagnostic::HeapEscape {
            name: Some(name.to_string()),
            message: None,
            range: name_range(source_lines, line, col + 1, 0),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_consecutive_assembly_lines_into_one_mapping() {
        let source = "package main\n\nfunc main() {\n\tprintln(1)\n}\n";
        let build_output = "\t0x0000 00000 (./main.go:4)\tTEXT\tmain.main(SB), 24\n\
                             \t0x0004 00004 (./main.go:4)\tMOVQ\tAX, (SP)\n\
                             \t0x0008 00008 (./main.go:5)\tRET\t\n";
        let (assembly, mapping, _) = scan(source, build_output.as_bytes());
        assert_eq!(assembly.lines().count(), 3);
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping[0].source_line, 4);
        assert_eq!(mapping[0].assembly_start, 1);
        assert_eq!(mapping[0].assembly_end, 2);
        assert_eq!(mapping[1].source_line, 5);
        assert_eq!(mapping[1].assembly_start, 3);
    }

    #[test]
    fn skips_blank_comment_and_stext_lines() {
        let source = "package main\n";
        let build_output = "\n# command-line-arguments\nsomething STEXT noise\n";
        let (assembly, mapping, diagnostics) = scan(source, build_output.as_bytes());
        assert!(assembly.is_empty());
        assert!(mapping.is_empty());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn extracts_can_inline_diagnostic() {
        let source = "package main\n\nfunc add(a, b int) int {\n\treturn a + b\n}\n";
        let build_output = "./main.go:3:6: can inline add with cost 5\n";
        let (_, _, diagnostics) = scan(source, build_output.as_bytes());
        assert_eq!(diagnostics.len(), 1);
        match &diagnostics[0] {
            Diagnostic::InliningAnalysis { name, can_inline, cost, .. } => {
                assert_eq!(name, "add");
                assert!(can_inline);
                assert_eq!(*cost, 5);
            }
            other => panic!("unexpected diagnostic: {other:?}"),
        }
    }

    #[test]
    fn extracts_cannot_inline_with_reason() {
        let source = "package main\n\nfunc rec(n int) int {\n\tif n == 0 { return 0 }\n\treturn rec(n-1)\n}\n";
        let build_output = "./main.go:3:6: cannot inline rec: recursive\n";
        let (_, _, diagnostics) = scan(source, build_output.as_bytes());
        match &diagnostics[0] {
            Diagnostic::InliningAnalysis { name, can_inline, reason, .. } => {
                assert_eq!(name, "rec");
                assert!(!can_inline);
                assert_eq!(reason.as_deref(), Some("recursive"));
            }
            other => panic!("unexpected diagnostic: {other:?}"),
        }
    }

    #[test]
    fn extracts_inlined_call_with_column_fixup() {
        let source = "package main\nfunc f(x int) int { return x+1 }\nfunc main(){ _ = f(2) }\n";
        let build_output = "./main.go:3:18: inlining call to f\n";
        let (_, _, diagnostics) = scan(source, build_output.as_bytes());
        assert_eq!(diagnostics.len(), 1);
        match &diagnostics[0] {
            Diagnostic::InlinedCall { name, range } => {
                assert_eq!(name, "f");
                assert_eq!(range.start.line, 3);
                assert_eq!(range.start.column, 17);
                assert_eq!(range.end.column, 18);
            }
            other => panic!("unexpected diagnostic: {other:?}"),
        }
    }

    #[test]
    fn discards_nested_notes() {
        let source = "package main\n";
        let build_output = "./main.go:3:6:   inlining call to foo\n";
        let (_, _, diagnostics) = scan(source, build_output.as_bytes());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn ignores_messages_outside_main_go() {
        let source = "package main\n";
        let build_output = "./other.go:3:6: can inline add with cost 5\n";
        let (_, _, diagnostics) = scan(source, build_output.as_bytes());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn heap_escape_falls_back_to_message_when_name_not_on_line() {
        let source = "package main\n\nfunc f() {\n}\n";
        let build_output = "./main.go:3:1: ptr escapes to heap:\n";
        let (_, _, diagnostics) = scan(source, build_output.as_bytes());
        match &diagnostics[0] {
            Diagnostic::HeapEscape { name, message, .. } => {
                assert!(name.is_none());
                assert!(message.is_some());
            }
            other => panic!("unexpected diagnostic: {other:?}"),
        }
    }
}

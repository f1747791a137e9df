//! Unified-diff parser.
//!
//! Turns the patch text of one revision transition into [`FileDiff`] records.
//! Both `git diff` output (with `diff --git` and extended headers) and plain
//! `diff -u` output are accepted. Hunk bodies are only counted, never kept:
//! the locator needs the `@@` ranges, not the changed text.

use crate::error::ParseError;
use crate::types::{EditHunk, FileDiff};

const DEV_NULL: &str = "/dev/null";

/// Lines still owed by the hunk body currently being read.
#[derive(Debug, Clone, Copy)]
struct Remaining {
    old: u32,
    new: u32,
}

impl Remaining {
    fn is_done(&self) -> bool {
        self.old == 0 && self.new == 0
    }
}

/// Parses the patch text of a single revision transition.
///
/// An empty diff yields an empty vec. Text before the first file header
/// (e.g. a commit message) is ignored.
///
/// # Errors
///
/// Returns `ParseError` for an unparseable `@@` header, a hunk before any file
/// header, a `+++` line without its `---` line, or a hunk body that does not
/// match the counts in its header.
pub fn parse_diff(text: &str) -> Result<Vec<FileDiff>, ParseError> {
    let mut files: Vec<FileDiff> = Vec::new();
    let mut current: Option<FileDiff> = None;
    // True between a file header and that file's first hunk.
    let mut in_header = false;
    let mut in_binary = false;
    let mut body: Option<Remaining> = None;
    let mut last_line = 0;

    for (idx, line) in text.lines().enumerate() {
        let lineno = idx + 1;
        last_line = lineno;

        if let Some(remaining) = body.as_mut() {
            consume_body_line(remaining, line, lineno)?;
            if remaining.is_done() {
                body = None;
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("diff --git ") {
            files.extend(current.take());
            let (old, new) = split_git_header(rest)
                .ok_or_else(|| ParseError::new(lineno, format!("bad file header: {line}")))?;
            current = Some(FileDiff {
                old_name: Some(old),
                new_name: Some(new),
                ..FileDiff::default()
            });
            in_header = true;
            in_binary = false;
            continue;
        }

        if in_binary {
            continue;
        }

        if line.starts_with("@@") {
            let file = current
                .as_mut()
                .ok_or_else(|| ParseError::new(lineno, "hunk header before any file header"))?;
            let hunk = parse_hunk_header(line)
                .ok_or_else(|| ParseError::new(lineno, format!("bad hunk header: {line}")))?;
            let remaining = Remaining { old: hunk.old_lines, new: hunk.new_lines };
            file.hunks.push(hunk);
            in_header = false;
            if !remaining.is_done() {
                body = Some(remaining);
            }
            continue;
        }

        if let Some(path) = line.strip_prefix("--- ") {
            if !in_header {
                // Plain unified diff: `---` opens the next file.
                files.extend(current.take());
                current = Some(FileDiff::default());
                in_header = true;
            }
            if let Some(file) = current.as_mut() {
                file.old_name = parse_path(path, "a/")
                    .map_err(|e| ParseError::new(lineno, e))?;
            }
            continue;
        }

        if let Some(path) = line.strip_prefix("+++ ") {
            let file = current
                .as_mut()
                .filter(|_| in_header)
                .ok_or_else(|| ParseError::new(lineno, "`+++` line without a file header"))?;
            file.new_name = parse_path(path, "b/").map_err(|e| ParseError::new(lineno, e))?;
            continue;
        }

        let Some(file) = current.as_mut() else {
            continue;
        };

        if in_header {
            apply_extended_header(file, line, &mut in_binary)
                .map_err(|e| ParseError::new(lineno, e))?;
        } else if line.starts_with('\\') {
            // `\ No newline at end of file` trails the last body line.
        } else if line.starts_with([' ', '+', '-']) {
            return Err(ParseError::new(lineno, "hunk body longer than its header declares"));
        }
    }

    if let Some(remaining) = body {
        return Err(ParseError::new(
            last_line,
            format!(
                "diff ends inside a hunk ({} old and {} new lines missing)",
                remaining.old, remaining.new
            ),
        ));
    }

    files.extend(current);
    Ok(files)
}

fn consume_body_line(remaining: &mut Remaining, line: &str, lineno: usize) -> Result<(), ParseError> {
    let (old, new) = match line.as_bytes().first() {
        // Some tools strip the single space of an empty context line.
        None | Some(b' ') => (true, true),
        Some(b'-') => (true, false),
        Some(b'+') => (false, true),
        Some(b'\\') => return Ok(()),
        Some(_) => {
            return Err(ParseError::new(
                lineno,
                format!(
                    "unexpected line inside hunk ({} old and {} new lines outstanding)",
                    remaining.old, remaining.new
                ),
            ))
        }
    };
    if (old && remaining.old == 0) || (new && remaining.new == 0) {
        return Err(ParseError::new(lineno, "hunk body longer than its header declares"));
    }
    if old {
        remaining.old -= 1;
    }
    if new {
        remaining.new -= 1;
    }
    Ok(())
}

/// Handles git's extended header lines between `diff --git` and the first hunk.
fn apply_extended_header(file: &mut FileDiff, line: &str, in_binary: &mut bool) -> Result<(), String> {
    if let Some(name) = line.strip_prefix("rename from ") {
        file.old_name = Some(unquote_path(name)?);
    } else if let Some(name) = line.strip_prefix("rename to ") {
        file.new_name = Some(unquote_path(name)?);
    } else if let Some(name) = line.strip_prefix("copy from ") {
        file.old_name = Some(unquote_path(name)?);
        file.is_copy = true;
    } else if let Some(name) = line.strip_prefix("copy to ") {
        file.new_name = Some(unquote_path(name)?);
        file.is_copy = true;
    } else if line.starts_with("new file mode") {
        file.old_name = None;
    } else if line.starts_with("deleted file mode") {
        file.new_name = None;
    } else if line.starts_with("Binary files ") || line == "GIT binary patch" {
        file.is_binary = true;
        *in_binary = line == "GIT binary patch";
    }
    // index, old/new mode, (dis)similarity index: nothing to record.
    Ok(())
}

/// Parses `@@ -a[,b] +c[,d] @@ [section]`.
fn parse_hunk_header(line: &str) -> Option<EditHunk> {
    let rest = line.strip_prefix("@@ ")?;
    let end = rest.find(" @@")?;
    let mut ranges = rest[..end].split_whitespace();
    let (old_start, old_lines) = parse_range(ranges.next()?.strip_prefix('-')?)?;
    let (new_start, new_lines) = parse_range(ranges.next()?.strip_prefix('+')?)?;
    if ranges.next().is_some() {
        return None;
    }
    Some(EditHunk { old_start, old_lines, new_start, new_lines })
}

/// Parses `start[,count]`; a missing count means one line.
fn parse_range(range: &str) -> Option<(u32, u32)> {
    match range.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

/// Parses the path of a `---`/`+++` line, dropping `prefix` and any
/// tab-separated timestamp. `/dev/null` maps to `None`.
fn parse_path(raw: &str, prefix: &str) -> Result<Option<String>, String> {
    let raw = if raw.starts_with('"') {
        raw
    } else {
        raw.split('\t').next().unwrap_or(raw).trim_end()
    };
    let path = unquote_path(raw)?;
    if path == DEV_NULL {
        return Ok(None);
    }
    Ok(Some(path.strip_prefix(prefix).map(str::to_owned).unwrap_or(path)))
}

/// Splits the `a/X b/Y` tail of a `diff --git` line into `(X, Y)`.
///
/// Unquoted names containing ` b/` are ambiguous; the split that yields two
/// equal names wins, otherwise the first ` b/` is used. Extended headers and
/// `---`/`+++` lines override these provisional names anyway.
fn split_git_header(rest: &str) -> Option<(String, String)> {
    if rest.starts_with('"') {
        let (old, tail) = take_quoted(rest).ok()?;
        let new = unquote_path(tail.trim_start()).ok()?;
        return Some((strip(&old, "a/"), strip(&new, "b/")));
    }
    if let Some(idx) = rest.find(" \"") {
        let new = unquote_path(&rest[idx + 1..]).ok()?;
        return Some((strip(&rest[..idx], "a/"), strip(&new, "b/")));
    }

    let candidates: Vec<usize> = rest.match_indices(" b/").map(|(i, _)| i).collect();
    let symmetric = candidates.iter().copied().find(|&i| {
        strip(&rest[..i], "a/") == strip(&rest[i + 1..], "b/")
    });
    let idx = symmetric.or_else(|| candidates.first().copied())?;
    Some((strip(&rest[..idx], "a/"), strip(&rest[idx + 1..], "b/")))
}

fn strip(path: &str, prefix: &str) -> String {
    path.strip_prefix(prefix).unwrap_or(path).to_owned()
}

/// Returns `raw` with git's C-style quoting removed, if it is quoted.
fn unquote_path(raw: &str) -> Result<String, String> {
    if !raw.starts_with('"') {
        return Ok(raw.to_owned());
    }
    let (path, tail) = take_quoted(raw)?;
    if !tail.trim().is_empty() {
        return Err(format!("trailing text after quoted path: {raw}"));
    }
    Ok(path)
}

/// Decodes one leading quoted string, returning it and the unconsumed tail.
fn take_quoted(raw: &str) -> Result<(String, &str), String> {
    let body = raw.strip_prefix('"').ok_or_else(|| format!("expected quoted path: {raw}"))?;
    let bytes = body.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                let path = String::from_utf8_lossy(&out).into_owned();
                return Ok((path, &body[i + 1..]));
            }
            b'\\' => {
                let esc = *bytes.get(i + 1).ok_or_else(|| format!("dangling escape: {raw}"))?;
                i += 2;
                match esc {
                    b'n' => out.push(b'\n'),
                    b't' => out.push(b'\t'),
                    b'r' => out.push(b'\r'),
                    b'a' => out.push(0x07),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0c),
                    b'v' => out.push(0x0b),
                    b'0'..=b'7' => {
                        let digits = bytes.get(i - 1..i + 2).ok_or_else(|| format!("short octal escape: {raw}"))?;
                        let text = std::str::from_utf8(digits).map_err(|e| e.to_string())?;
                        let value = u8::from_str_radix(text, 8)
                            .map_err(|_| format!("bad octal escape: {raw}"))?;
                        out.push(value);
                        i += 2;
                    }
                    other => out.push(other),
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Err(format!("unterminated quoted path: {raw}"))
}

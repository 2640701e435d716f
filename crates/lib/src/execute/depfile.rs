//! Parser for make-style dependency files (`cc -MMD -MF out.d`).

use std::path::PathBuf;

/// Prerequisites listed in a depfile, in order of first appearance.
///
/// Handles backslash-newline continuations, `\ ` escaped spaces, `\#` and
/// `$$`. Targets (the part before `:`) are dropped. Phony rules emitted by
/// `-MP` contribute nothing since they have no prerequisites.
pub fn parse(contents: &str) -> Vec<PathBuf> {
  let joined = contents.replace("\\\r\n", " ").replace("\\\n", " ");
  let mut prerequisites: Vec<PathBuf> = Vec::new();

  for line in joined.lines() {
    let Some(rest) = after_targets(line) else {
      continue;
    };
    for token in tokens(rest) {
      let path = PathBuf::from(token);
      if !prerequisites.contains(&path) {
        prerequisites.push(path);
      }
    }
  }

  prerequisites
}

/// The text after the unescaped `: ` separating targets from prerequisites.
fn after_targets(line: &str) -> Option<&str> {
  let bytes = line.as_bytes();
  let mut i = 0;
  while i < bytes.len() {
    match bytes[i] {
      b'\\' => i += 2,
      b':' => {
        let next = bytes.get(i + 1);
        if next.is_none_or(|b| b.is_ascii_whitespace()) {
          return Some(&line[i + 1..]);
        }
        i += 1;
      }
      _ => i += 1,
    }
  }
  None
}

fn tokens(text: &str) -> Vec<String> {
  let mut out = Vec::new();
  let mut current = String::new();
  let mut chars = text.chars().peekable();

  while let Some(c) = chars.next() {
    match c {
      '\\' => match chars.peek() {
        Some(&next @ (' ' | '#')) => {
          current.push(next);
          chars.next();
        }
        _ => current.push('\\'),
      },
      '$' if chars.peek() == Some(&'$') => {
        current.push('$');
        chars.next();
      }
      c if c.is_whitespace() => {
        if !current.is_empty() {
          out.push(std::mem::take(&mut current));
        }
      }
      c => current.push(c),
    }
  }
  if !current.is_empty() {
    out.push(current);
  }

  out
}

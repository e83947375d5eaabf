//! Choice traces: the choice indices along one path, from the root.
//!
//! A trace is enough to re-run a path: the driver rebuilds each decision
//! point in order and selects the recorded index instead of enumerating.
//! Traces are saved as text or, for files ending in `.json`, as JSON.
//!
//! ```text
//! // found by a depth-first search
//! application: Racer
//! [0] schedule 1
//! [1] verifyGetInt 3   /* comments are ignored */
//! ```

use crate::error::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Name of the generator the choice was made at.
    pub name: String,
    /// Index of the chosen value in the generator's enumeration order.
    pub index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceTrace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    pub entries: Vec<TraceEntry>,
}

impl ChoiceTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = Some(application.into());
        self
    }

    pub fn push(&mut self, name: impl Into<String>, index: usize) {
        self.entries.push(TraceEntry {
            name: name.into(),
            index,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter()
    }

    /// Whether `prefix` is a prefix of this trace, ignoring the application.
    pub fn starts_with(&self, prefix: &ChoiceTrace) -> bool {
        self.entries.starts_with(&prefix.entries)
    }

    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Parses the text format. Entries must be numbered consecutively
    /// from 0.
    pub fn parse(text: &str) -> SearchResult<Self> {
        let text = strip_comments(text)?;
        let mut trace = ChoiceTrace::new();
        for (n, line) in text.lines().enumerate() {
            let line_no = n + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fail = |message: String| SearchError::TraceParse {
                line: line_no,
                message,
            };
            if let Some(app) = line.strip_prefix("application:") {
                let app = app.trim();
                if app.is_empty() {
                    return Err(fail("empty application name".into()));
                }
                if trace.application.is_some() {
                    return Err(fail("duplicate application header".into()));
                }
                trace.application = Some(app.to_string());
                continue;
            }
            let Some((pos, rest)) = line.strip_prefix('[').and_then(|l| l.split_once(']')) else {
                return Err(fail(format!("expected '[n] name index', found '{line}'")));
            };
            let pos: usize = pos
                .trim()
                .parse()
                .map_err(|_| fail(format!("bad entry number '{pos}'")))?;
            if pos != trace.entries.len() {
                return Err(fail(format!(
                    "entry number {pos} out of sequence, expected {}",
                    trace.entries.len()
                )));
            }
            let Some((name, index)) = rest.trim().rsplit_once(char::is_whitespace) else {
                return Err(fail("missing choice name or index".into()));
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(fail("missing choice name".into()));
            }
            let index = index
                .parse()
                .map_err(|_| fail(format!("bad choice index '{index}'")))?;
            trace.push(name, index);
        }
        Ok(trace)
    }

    pub fn to_json(&self) -> SearchResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> SearchResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes JSON if `path` ends in `.json`, text otherwise.
    pub fn save(&self, path: &Path) -> SearchResult<()> {
        let body = if is_json(path) {
            self.to_json()?
        } else {
            self.to_text()
        };
        std::fs::write(path, body)?;
        Ok(())
    }

    pub fn load(path: &Path) -> SearchResult<Self> {
        let body = std::fs::read_to_string(path)?;
        if is_json(path) {
            Self::from_json(&body)
        } else {
            Self::parse(&body)
        }
    }
}

impl fmt::Display for ChoiceTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(app) = &self.application {
            writeln!(f, "application: {app}")?;
        }
        for (i, e) in self.entries.iter().enumerate() {
            writeln!(f, "[{i}] {} {}", e.name, e.index)?;
        }
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

/// Removes `//` and `/* */` comments, keeping newlines so that line
/// numbers stay meaningful.
fn strip_comments(text: &str) -> SearchResult<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut line = 1;
    let mut block_start = None;
    while let Some(c) = chars.next() {
        if c == '\n' {
            line += 1;
            out.push('\n');
            continue;
        }
        if block_start.is_some() {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                block_start = None;
            }
            continue;
        }
        if c == '/' {
            match chars.peek() {
                Some('/') => {
                    while chars.peek().is_some_and(|&n| n != '\n') {
                        chars.next();
                    }
                    continue;
                }
                Some('*') => {
                    chars.next();
                    block_start = Some(line);
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    match block_start {
        Some(line) => Err(SearchError::TraceParse {
            line,
            message: "unterminated block comment".into(),
        }),
        None => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChoiceTrace {
        let mut t = ChoiceTrace::new().with_application("Racer");
        t.push("schedule", 1);
        t.push("verifyGetInt", 3);
        t
    }

    #[test]
    fn test_text_format() {
        assert_eq!(
            sample().to_text(),
            "application: Racer\n[0] schedule 1\n[1] verifyGetInt 3\n"
        );
        assert_eq!(ChoiceTrace::parse(&sample().to_text()).unwrap(), sample());
    }

    #[test]
    fn test_parse_with_comments() {
        let text = "// header\napplication: Racer\n/* multi\n line */ [0] schedule 1\n[1] verifyGetInt 3 // tail\n";
        assert_eq!(ChoiceTrace::parse(text).unwrap(), sample());
    }

    #[test]
    fn test_parse_errors_carry_line() {
        let err = ChoiceTrace::parse("[0] a 1\n[2] b 0\n").unwrap_err();
        assert!(matches!(err, SearchError::TraceParse { line: 2, .. }), "{err}");
        let err = ChoiceTrace::parse("\n\n/* open").unwrap_err();
        assert!(matches!(err, SearchError::TraceParse { line: 3, .. }), "{err}");
        assert!(ChoiceTrace::parse("[0] a x").is_err());
        assert!(ChoiceTrace::parse("[0] 1").is_err());
        assert!(ChoiceTrace::parse("garbage").is_err());
    }

    #[test]
    fn test_empty_trace() {
        let t = ChoiceTrace::parse("// nothing here\n\n").unwrap();
        assert!(t.is_empty());
        assert_eq!(t.application, None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        for file in ["trace.txt", "trace.json"] {
            let path = dir.path().join(file);
            sample().save(&path).unwrap();
            assert_eq!(ChoiceTrace::load(&path).unwrap(), sample());
        }
        let json = std::fs::read_to_string(dir.path().join("trace.json")).unwrap();
        assert!(json.contains("\"verifyGetInt\""));
    }

    #[test]
    fn test_prefix() {
        let mut p = ChoiceTrace::new();
        p.push("schedule", 1);
        assert!(sample().starts_with(&p));
        p.push("verifyGetInt", 2);
        assert!(!sample().starts_with(&p));
    }
}

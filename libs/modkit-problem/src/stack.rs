//! Call-stack capture for problem causes.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Maximum number of frames kept per captured trace.
pub const MAX_DEPTH: usize = 32;

/// Placeholder used when a frame cannot be mapped back to a symbol.
pub const UNKNOWN: &str = "unknown";

/// Frames walked past the requested ones, covering the unwinder's own frames.
const INTERNAL_SLACK: usize = 16;

/// A single resolved call-site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub function: String,
    pub file: String,
    pub line: u32,
    pub file_with_line: String,
}

impl StackFrame {
    pub fn new(function: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        let file = file.into();
        Self {
            function: function.into(),
            file_with_line: format!("{file}:{line}"),
            file,
            line,
        }
    }

    /// Frame for a program counter the runtime could not symbolize.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN, 0)
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.function == UNKNOWN && self.file == UNKNOWN
    }

    /// Parses the location half of a rendered frame (`file:line`).
    ///
    /// The path ends at the first `:`; a missing or malformed line number becomes `0`.
    pub fn from_location(function: impl Into<String>, location: &str) -> Self {
        let (file, line) = match location.split_once(':') {
            Some((file, rest)) => (file, rest.trim().parse().unwrap_or(0)),
            None => (location, 0),
        };
        Self {
            function: function.into(),
            file: file.to_owned(),
            line,
            file_with_line: location.to_owned(),
        }
    }

    /// Appends `\n{function}\n\t{file:line}` to `out`.
    pub fn render_verbose(&self, out: &mut String) {
        out.push('\n');
        out.push_str(&self.function);
        out.push_str("\n\t");
        out.push_str(&self.file_with_line);
    }

    fn to_map(&self) -> Value {
        json!({
            "file": self.file_with_line,
            "func": self.function,
        })
    }
}

/// Ordered frames, innermost call-site first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackTrace(Vec<StackFrame>);

impl StackTrace {
    #[must_use]
    pub fn new(frames: Vec<StackFrame>) -> Self {
        Self(frames)
    }

    /// Captures the calling thread's stack.
    ///
    /// The first frame is the caller of `capture` once `skip` further frames are dropped,
    /// so a constructor passing `skip = 1` gets its own caller on top. At most
    /// [`MAX_DEPTH`] frames are kept; unresolvable frames become [`StackFrame::unknown`].
    #[inline(never)]
    #[must_use]
    pub fn capture(skip: usize) -> Self {
        let this = (Self::capture as fn(usize) -> Self) as usize;
        let limit = skip + MAX_DEPTH + INTERNAL_SLACK;

        let mut raw = Vec::with_capacity(limit);
        backtrace::trace(|frame| {
            raw.push(frame.clone());
            raw.len() < limit
        });

        // Everything up to and including this function belongs to the unwinder.
        let start = raw
            .iter()
            .position(|frame| frame.symbol_address() as usize == this)
            .map_or(0, |idx| idx + 1)
            + skip;

        let frames = raw
            .iter()
            .skip(start)
            .take(MAX_DEPTH)
            .map(resolve)
            .collect();
        Self(frames)
    }

    /// Drops the first frame, unless it is the only one.
    #[must_use]
    pub fn shift(&self) -> Self {
        match self.0.split_first() {
            Some((_, rest)) if !rest.is_empty() => Self(rest.to_vec()),
            _ => self.clone(),
        }
    }

    #[must_use]
    pub fn frames(&self) -> &[StackFrame] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, frame: StackFrame) {
        self.0.push(frame);
    }

    pub fn render_verbose(&self, out: &mut String) {
        for frame in &self.0 {
            frame.render_verbose(out);
        }
    }

    /// Plain records (`file`, `func`) for the transport layer.
    #[must_use]
    pub fn to_map(&self) -> Vec<Value> {
        self.0.iter().map(StackFrame::to_map).collect()
    }
}

impl FromIterator<StackFrame> for StackTrace {
    fn from_iter<I: IntoIterator<Item = StackFrame>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn resolve(frame: &backtrace::Frame) -> StackFrame {
    let mut resolved: Option<StackFrame> = None;
    backtrace::resolve_frame(frame, |symbol| {
        // Inlined frames yield several symbols; the first one is the innermost call-site.
        if resolved.is_some() {
            return;
        }
        let Some(name) = symbol.name() else {
            return;
        };
        let file = symbol
            .filename()
            .map_or_else(|| UNKNOWN.to_owned(), |path| path.display().to_string());
        resolved = Some(StackFrame::new(
            format!("{name:#}"),
            file,
            symbol.lineno().unwrap_or(0),
        ));
    });
    resolved.unwrap_or_else(|| {
        tracing::trace!(ip = ?frame.ip(), "unresolved stack frame");
        StackFrame::unknown()
    })
}

//! Cause chains: the ancestry of a problem, one message and stack trace per hop.

use std::error::Error as StdError;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::problem::Problem;
use crate::stack::{StackFrame, StackTrace, UNKNOWN};

/// One hop in an error's ancestry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cause {
    pub message: String,
    #[serde(rename = "stacktrace")]
    pub stack_trace: StackTrace,
}

impl Cause {
    pub fn new(message: impl Into<String>, stack_trace: StackTrace) -> Self {
        Self {
            message: message.into(),
            stack_trace,
        }
    }

    /// Message followed by every frame as `\n{function}\n\t{file:line}`.
    pub fn render_verbose(&self, out: &mut String) {
        out.push_str(&self.message);
        self.stack_trace.render_verbose(out);
    }

    #[must_use]
    pub fn render_concise(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn render_quoted(&self) -> String {
        format!("{:?}", self.message)
    }
}

/// Causes ordered root first, most recent wrapping last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CauseChain(Vec<Cause>);

impl CauseChain {
    #[must_use]
    pub fn new(causes: Vec<Cause>) -> Self {
        Self(causes)
    }

    #[must_use]
    pub fn causes(&self) -> &[Cause] {
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

    pub fn iter(&self) -> std::slice::Iter<'_, Cause> {
        self.0.iter()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Cause> {
        self.0.last()
    }

    pub fn push(&mut self, cause: Cause) {
        self.0.push(cause);
    }

    /// Puts `older` ahead of the causes already in the chain.
    pub fn prepend(&mut self, older: CauseChain) {
        let mut causes = older.0;
        causes.append(&mut self.0);
        self.0 = causes;
    }

    pub fn extend(&mut self, newer: CauseChain) {
        self.0.extend(newer.0);
    }

    /// Text form accepted by [`CauseChain::parse`], one cause per line group.
    #[must_use]
    pub fn render_verbose(&self) -> String {
        let mut out = String::new();
        for (idx, cause) in self.0.iter().enumerate() {
            if idx > 0 {
                out.push('\n');
            }
            cause.render_verbose(&mut out);
        }
        out
    }

    /// Plain records (`message`, `stacktrace`) for the transport layer.
    #[must_use]
    pub fn to_map(&self) -> Vec<Value> {
        self.0
            .iter()
            .map(|cause| {
                json!({
                    "message": cause.message,
                    "stacktrace": cause.stack_trace.to_map(),
                })
            })
            .collect()
    }

    /// Rebuilds a chain from its verbose text form.
    ///
    /// Unindented lines open a new cause; the line after a message (or after a completed
    /// frame) names the function of the next frame, and a tab-indented line completes that
    /// frame with its `file:line`. A name line followed by another unindented line was a
    /// message after all and opens a cause of its own, including at the end of input.
    /// Never fails: unexpected input yields extra or frameless causes.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut causes: Vec<Cause> = Vec::new();
        let mut pending: Option<String> = None;

        for line in text.split('\n') {
            if let Some(location) = line.strip_prefix('\t')
                && let Some(current) = causes.last_mut()
            {
                let function = pending.take().unwrap_or_else(|| UNKNOWN.to_owned());
                current
                    .stack_trace
                    .push(StackFrame::from_location(function, location));
                continue;
            }

            if causes.is_empty() {
                causes.push(Cause::new(line, StackTrace::default()));
                continue;
            }

            if let Some(message) = pending.replace(line.to_owned()) {
                causes.push(Cause::new(message, StackTrace::default()));
            }
        }

        if let Some(message) = pending {
            causes.push(Cause::new(message, StackTrace::default()));
        }

        Self(causes)
    }

    /// Derives the cause chain of an arbitrary error.
    ///
    /// A [`Problem`] anywhere in the `source()` chain contributes its own causes as they are;
    /// only the opaque layers wrapped around it are rendered root first and recovered through
    /// [`CauseChain::parse`].
    #[must_use]
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        if let Some(problem) = err.downcast_ref::<Problem>() {
            return problem.causes().clone();
        }

        let mut layers: Vec<&(dyn StdError + 'static)> = Vec::new();
        let mut root: Option<&Problem> = None;
        let mut next = Some(err);
        while let Some(current) = next {
            if let Some(problem) = current.downcast_ref::<Problem>() {
                root = Some(problem);
                break;
            }
            layers.push(current);
            next = current.source();
        }

        let text = layers
            .iter()
            .rev()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");

        let mut chain = root.map_or_else(Self::default, |p| p.causes().clone());
        chain.extend(Self::parse(&text));
        tracing::trace!(
            layers = layers.len(),
            structured = root.is_some(),
            causes = chain.len(),
            "extracted cause chain"
        );
        chain
    }
}

impl<'a> IntoIterator for &'a CauseChain {
    type Item = &'a Cause;
    type IntoIter = std::slice::Iter<'a, Cause>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Cause> for CauseChain {
    fn from_iter<I: IntoIterator<Item = Cause>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn frame(function: &str, file: &str, line: u32) -> StackFrame {
        StackFrame::new(function, file, line)
    }

    fn sample() -> CauseChain {
        CauseChain::new(vec![
            Cause::new(
                "connection refused",
                StackTrace::new(vec![
                    frame("db::connect", "/src/db.rs", 10),
                    frame("db::pool::get", "/src/db/pool.rs", 88),
                ]),
            ),
            Cause::new(
                "internal_error: loading user",
                StackTrace::new(vec![frame("users::load", "/src/users.rs", 3)]),
            ),
        ])
    }

    #[test]
    fn verbose_render_layout() {
        let chain = CauseChain::new(vec![Cause::new(
            "boom",
            StackTrace::new(vec![frame("app::run", "/src/main.rs", 5)]),
        )]);
        assert_eq!(chain.render_verbose(), "boom\napp::run\n\t/src/main.rs:5");
    }

    #[test]
    fn parse_recovers_rendered_chain() {
        let chain = sample();
        assert_eq!(CauseChain::parse(&chain.render_verbose()), chain);
    }

    #[test]
    fn parse_message_without_frames() {
        let chain = CauseChain::parse("just a message");
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.causes()[0].message, "just a message");
        assert!(chain.causes()[0].stack_trace.is_empty());
    }

    #[test]
    fn consecutive_message_lines_are_separate_causes() {
        let chain = CauseChain::parse("outer\nmiddle\ninner");
        let messages: Vec<_> = chain.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, ["outer", "middle", "inner"]);
        assert!(chain.iter().all(|c| c.stack_trace.is_empty()));
    }

    #[test]
    fn frameless_cause_between_traced_causes() {
        let text = "root\nf1\n\t/a.rs:1\nbare\nnext\nf2\n\t/b.rs:2";
        let chain = CauseChain::parse(text);
        let messages: Vec<_> = chain.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, ["root", "bare", "next"]);
        assert_eq!(chain.causes()[0].stack_trace.frames()[0].function, "f1");
        assert!(chain.causes()[1].stack_trace.is_empty());
        assert_eq!(chain.causes()[2].stack_trace.frames()[0].line, 2);
    }

    #[test]
    fn location_without_name_gets_unknown_function() {
        let chain = CauseChain::parse("msg\nf1\n\t/a.rs:1\n\t/a.rs:2");
        let frames = chain.causes()[0].stack_trace.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].function, UNKNOWN);
        assert_eq!(frames[1].line, 2);
    }

    #[test]
    fn leading_tab_line_is_a_message() {
        let chain = CauseChain::parse("\tindented");
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.causes()[0].message, "\tindented");
    }

    #[test]
    fn prepend_keeps_root_first() {
        let mut chain = CauseChain::new(vec![Cause::new("newest", StackTrace::default())]);
        chain.prepend(sample());
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.causes()[0].message, "connection refused");
        assert_eq!(chain.last().map(|c| c.message.as_str()), Some("newest"));
    }

    #[test]
    fn opaque_error_chain_is_rendered_root_first() {
        #[derive(Debug)]
        struct Outer(std::io::Error);

        impl std::fmt::Display for Outer {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("reading config")
            }
        }

        impl StdError for Outer {
            fn source(&self) -> Option<&(dyn StdError + 'static)> {
                Some(&self.0)
            }
        }

        let err = Outer(std::io::Error::other("disk gone"));
        let chain = CauseChain::from_error(&err);
        let messages: Vec<_> = chain.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, ["disk gone", "reading config"]);
    }

    #[test]
    fn problem_behind_wrapper_keeps_its_causes() {
        #[derive(Debug)]
        struct Loading(Problem);

        impl std::fmt::Display for Loading {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("loading row")
            }
        }

        impl StdError for Loading {
            fn source(&self) -> Option<&(dyn StdError + 'static)> {
                Some(&self.0)
            }
        }

        let inner = crate::problem!(
            crate::Typed::new("not_found", 404, []),
            "row 9\nmissing"
        );
        let chain = CauseChain::from_error(&Loading(inner.clone()));

        assert_eq!(chain.len(), inner.causes().len() + 1);
        assert_eq!(chain.causes()[0], inner.causes().causes()[0]);
        assert_eq!(chain.causes()[0].message, "row 9\nmissing");
        assert_eq!(chain.last().map(|c| c.message.as_str()), Some("loading row"));
        assert!(chain.last().is_some_and(|c| c.stack_trace.is_empty()));
    }

    #[test]
    fn to_map_shape() {
        let maps = sample().to_map();
        assert_eq!(maps.len(), 2);
        assert_eq!(
            maps[1],
            json!({
                "message": "internal_error: loading user",
                "stacktrace": [{"file": "/src/users.rs:3", "func": "users::load"}],
            })
        );
    }

    #[test]
    fn quoted_render_escapes() {
        let cause = Cause::new("say \"hi\"", StackTrace::default());
        assert_eq!(cause.render_quoted(), "\"say \\\"hi\\\"\"");
        assert_eq!(cause.render_concise(), "say \"hi\"");
    }
}

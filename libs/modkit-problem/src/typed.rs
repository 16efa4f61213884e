//! Typed constructors: fixed title and status, arguments supplied per call.

use std::borrow::Cow;
use std::sync::Arc;

use serde_json::Map;

use crate::args::{Arg, Category, plain};
use crate::cause::{Cause, CauseChain};
use crate::context::ProblemContext;
use crate::problem::Problem;
use crate::stack::StackTrace;

/// Factory for one kind of problem.
///
/// `fixed` arguments are placed ahead of every call's arguments, which is how a type pins
/// its category or a default detail.
#[derive(Debug, Clone)]
pub struct Typed {
    title: Cow<'static, str>,
    status: u16,
    fixed: Vec<Arg>,
    ctx: Arc<ProblemContext>,
}

impl Typed {
    pub fn new(
        title: impl Into<Cow<'static, str>>,
        status: u16,
        fixed: impl IntoIterator<Item = Arg>,
    ) -> Self {
        Self {
            title: title.into(),
            status,
            fixed: fixed.into_iter().collect(),
            ctx: ProblemContext::shared(),
        }
    }

    /// Same as [`Typed::new`] with a leading [`Category`] marker.
    pub fn within_category(
        category: impl Into<String>,
        title: impl Into<Cow<'static, str>>,
        status: u16,
        fixed: impl IntoIterator<Item = Arg>,
    ) -> Self {
        let fixed = std::iter::once(Arg::from(Category(category.into()))).chain(fixed);
        Self::new(title, status, fixed)
    }

    /// Rebinds the constructor to another context (ID source, type base URI).
    #[must_use]
    pub fn with_context(mut self, ctx: Arc<ProblemContext>) -> Self {
        self.ctx = ctx;
        self
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn context(&self) -> &Arc<ProblemContext> {
        &self.ctx
    }

    /// Builds a problem from `args`, capturing the caller's stack as its newest cause.
    ///
    /// Arguments are dispatched by variant, left to right, after the fixed ones:
    /// the first detail-like value wins, markers set their field, wrapped errors
    /// splice their causes in ahead of this one, `Meta` and `ValidationResult`
    /// merge by key. A bare [`Arg::Value`] only counts in first position.
    #[inline(never)]
    pub fn call(&self, args: impl IntoIterator<Item = Arg>) -> Problem {
        let mut own = Cause::new(String::new(), StackTrace::capture(1));
        let mut causes = CauseChain::default();
        let mut p = Problem::blank(Arc::clone(&self.ctx), &self.title, self.status);
        let mut meta = Map::new();
        let mut validation = Map::new();

        let all = self.fixed.iter().cloned().chain(args);
        for (idx, arg) in all.enumerate() {
            match arg {
                Arg::Detail(s) | Arg::Text(s) | Arg::Stringable(s) => {
                    if p.detail.is_empty() {
                        p.detail = s;
                    }
                }
                Arg::Category(s) => p.category = s,
                Arg::Instance(s) => p.instance = s,
                Arg::Resource(s) => p.resource = s,
                Arg::Field(s) => p.field = s,
                Arg::Error(err) => {
                    let message = err.to_string();
                    causes.prepend(CauseChain::from_error(err.as_ref()));
                    if p.detail.is_empty() {
                        p.detail.clone_from(&message);
                    }
                    own.message = message;
                    p.source = Some(err);
                }
                Arg::Meta(m) => m.merge_into(&mut meta),
                Arg::Validation(v) => v.merge_into(&mut validation),
                Arg::Value(v) => {
                    if idx == 0 {
                        p.detail = plain(&v);
                    }
                }
            }
        }

        if p.detail.is_empty() {
            p.detail = "unknown".to_owned();
        }
        if own.message.is_empty() {
            own.message.clone_from(&p.detail);
        }
        causes.push(own);

        p.causes = causes;
        p.meta = meta;
        p.validation_result = validation;
        p.type_url = self.ctx.type_uri(&p.category, &p.title);

        tracing::trace!(
            id = %p.id,
            title = %p.title,
            status = p.status,
            causes = p.causes.len(),
            "problem constructed"
        );
        p
    }
}

/// Calls a [`Typed`] constructor with any mix of values convertible into [`Arg`].
///
/// ```
/// use modkit_problem::{Catalog, Field, problem};
///
/// let catalog = Catalog::default();
/// let p = problem!(catalog.not_found, "user 42 not found", Field::new("id"));
/// assert_eq!(p.to_string(), "not_found: user 42 not found");
/// assert_eq!(p.field(), "id");
/// ```
#[macro_export]
macro_rules! problem {
    ($typed:expr $(, $arg:expr)* $(,)?) => {
        $typed.call([$($crate::Arg::from($arg)),*])
    };
}

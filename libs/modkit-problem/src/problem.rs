//! Problem details with captured cause chains.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::args::{Arg, SharedError};
use crate::cause::{Cause, CauseChain};
use crate::context::ProblemContext;
use crate::stack::StackTrace;
use crate::typed::Typed;

/// Content type for Problem Details as per RFC 9457.
pub const APPLICATION_PROBLEM_JSON: &str = "application/problem+json";

/// Title and status every unclassified error is mapped to.
pub const INTERNAL_ERROR: (&str, u16) = ("internal_error", 500);

/// Title and status of merged problems that stay below 500.
pub const BAD_REQUEST: (&str, u16) = ("bad_request", 400);

/// Category of problems produced by merging disagreeing problems.
pub const MERGED_CATEGORY: &str = "merged";

/// Structured error value.
///
/// Built through a [`Typed`] constructor and immutable afterwards; [`Problem::merge`] returns a
/// new problem. Serializes to the transport fields only: causes and the wrapped error stay
/// in-process, so a deserialized problem starts a fresh chain from its detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ProblemRepr")]
pub struct Problem {
    pub(crate) id: String,
    #[serde(rename = "type")]
    pub(crate) type_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) category: String,
    pub(crate) title: String,
    pub(crate) status: u16,
    pub(crate) detail: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) instance: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) resource: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) field: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) merged: Vec<Problem>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub(crate) meta: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub(crate) validation_result: Map<String, Value>,
    #[serde(skip)]
    pub(crate) causes: CauseChain,
    #[serde(skip)]
    pub(crate) source: Option<SharedError>,
    #[serde(skip)]
    pub(crate) ctx: Arc<ProblemContext>,
}

/// Wire form of a [`Problem`].
#[derive(Deserialize)]
struct ProblemRepr {
    id: String,
    #[serde(rename = "type")]
    type_url: String,
    #[serde(default)]
    category: String,
    title: String,
    status: u16,
    #[serde(default)]
    detail: String,
    #[serde(default)]
    instance: String,
    #[serde(default)]
    resource: String,
    #[serde(default)]
    field: String,
    #[serde(default)]
    merged: Vec<Problem>,
    #[serde(default)]
    meta: Map<String, Value>,
    #[serde(default)]
    validation_result: Map<String, Value>,
}

impl From<ProblemRepr> for Problem {
    fn from(repr: ProblemRepr) -> Self {
        let detail = if repr.detail.is_empty() {
            "unknown".to_owned()
        } else {
            repr.detail
        };
        let causes = CauseChain::new(vec![Cause::new(detail.clone(), StackTrace::default())]);
        Self {
            id: repr.id,
            type_url: repr.type_url,
            category: repr.category,
            title: repr.title,
            status: repr.status,
            detail,
            instance: repr.instance,
            resource: repr.resource,
            field: repr.field,
            merged: repr.merged,
            meta: repr.meta,
            validation_result: repr.validation_result,
            causes,
            source: None,
            ctx: ProblemContext::shared(),
        }
    }
}

impl Problem {
    /// Empty problem with a fresh ID, filled in by [`Typed::call`].
    pub(crate) fn blank(ctx: Arc<ProblemContext>, title: &str, status: u16) -> Self {
        Self {
            id: ctx.next_id(),
            type_url: String::new(),
            category: String::new(),
            title: title.to_owned(),
            status,
            detail: String::new(),
            instance: String::new(),
            resource: String::new(),
            field: String::new(),
            merged: Vec::new(),
            meta: Map::new(),
            validation_result: Map::new(),
            causes: CauseChain::default(),
            source: None,
            ctx,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn type_url(&self) -> &str {
        &self.type_url
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Status as an HTTP status code; out-of-range values map to 500.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    #[must_use]
    pub fn instance(&self) -> &str {
        &self.instance
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Problems folded into this one; empty unless produced by [`Problem::merge`].
    #[must_use]
    pub fn merged(&self) -> &[Problem] {
        &self.merged
    }

    #[must_use]
    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    #[must_use]
    pub fn validation_result(&self) -> &Map<String, Value> {
        &self.validation_result
    }

    #[must_use]
    pub fn causes(&self) -> &CauseChain {
        &self.causes
    }

    #[must_use]
    pub fn render_concise(&self) -> String {
        self.to_string()
    }

    #[must_use]
    pub fn render_quoted(&self) -> String {
        format!("{:?}", self.to_string())
    }

    /// Detail line followed by every cause with its frames.
    #[must_use]
    pub fn render_verbose(&self) -> String {
        let mut out = self.detail.clone();
        if !self.causes.is_empty() {
            out.push('\n');
            out.push_str(&self.causes.render_verbose());
        }
        out
    }

    /// Combines this problem with `err` into a new problem.
    ///
    /// Non-problem errors are first converted with [`as_problem`]. Both inputs end up in
    /// `merged` (flattened if they were merges themselves) and their causes are
    /// concatenated. If status or title disagree the result is `bad_request`/400 or, when the
    /// worse status is a server error, `internal_error`/500, in the `merged` category.
    #[must_use]
    pub fn merge(&self, err: impl Into<Box<dyn StdError + Send + Sync>>) -> Problem {
        let other = convert(&self.ctx, err.into());
        self.merge_problem(other)
    }

    fn merge_problem(&self, mut other: Problem) -> Problem {
        let mut this = self.clone();

        let mut m = Problem::blank(Arc::clone(&self.ctx), &self.title, self.status);
        m.type_url.clone_from(&self.type_url);
        m.category.clone_from(&self.category);
        m.detail = if other.detail.is_empty() {
            self.detail.clone()
        } else {
            format!("{}; {}", self.detail, other.detail)
        };
        m.meta.insert("merged".to_owned(), Value::Bool(true));

        let mut causes = this.causes.clone();
        causes.extend(other.causes.clone());
        m.causes = causes;

        if this.status != other.status || this.title != other.title {
            let worst = this.status.max(other.status);
            let (title, status) = if worst < 500 { BAD_REQUEST } else { INTERNAL_ERROR };
            title.clone_into(&mut m.title);
            m.status = status;
            MERGED_CATEGORY.clone_into(&mut m.category);
            m.type_url = self.ctx.type_uri(&m.category, &m.title);
        }

        let mut left = std::mem::take(&mut this.merged);
        if left.is_empty() {
            left.push(this);
        }
        let mut right = std::mem::take(&mut other.merged);
        if right.is_empty() {
            right.push(other);
        }
        left.append(&mut right);
        m.merged = left;

        tracing::debug!(
            id = %m.id,
            title = %m.title,
            status = m.status,
            merged = m.merged.len(),
            "problems merged"
        );
        m
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            f.write_str(&self.title)
        } else {
            write!(f, "{}: {}", self.title, self.detail)
        }
    }
}

impl StdError for Problem {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn StdError + 'static))
    }
}

/// Accessors an HTTP error-mapping layer needs from a service error.
pub trait ServiceError: StdError + Send + Sync + 'static {
    /// HTTP status of the response.
    fn response_status(&self) -> u16;

    /// Unique token correlating the response with logs.
    fn token(&self) -> &str;

    /// Folds another error into this one.
    fn merge(&self, err: Box<dyn StdError + Send + Sync>) -> Problem;
}

impl ServiceError for Problem {
    fn response_status(&self) -> u16 {
        self.status
    }

    fn token(&self) -> &str {
        &self.id
    }

    fn merge(&self, err: Box<dyn StdError + Send + Sync>) -> Problem {
        Problem::merge(self, err)
    }
}

/// Returns `err` itself if it is a [`Problem`], otherwise wraps it as an `internal_error`.
pub fn as_problem(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Problem {
    convert(&ProblemContext::shared(), err.into())
}

pub(crate) fn convert(ctx: &Arc<ProblemContext>, err: Box<dyn StdError + Send + Sync>) -> Problem {
    match err.downcast::<Problem>() {
        Ok(problem) => *problem,
        Err(other) => {
            let (title, status) = INTERNAL_ERROR;
            Typed::new(title, status, [])
                .with_context(Arc::clone(ctx))
                .call([Arg::from(other)])
        }
    }
}

/// Axum integration: make Problem directly usable as a response
#[cfg(feature = "axum")]
impl axum::response::IntoResponse for Problem {
    fn into_response(self) -> axum::response::Response {
        use axum::http::HeaderValue;

        let status = self.status_code();
        let mut resp = axum::Json(self).into_response();
        *resp.status_mut() = status;
        resp.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static(APPLICATION_PROBLEM_JSON),
        );
        resp
    }
}

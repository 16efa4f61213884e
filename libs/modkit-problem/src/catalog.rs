//! Problem type catalog: the predefined constructors plus configured ones.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::args::{Arg, Category, Detail, ValidationResult, literal, plain};
use crate::config::{ConfigError, ProblemConfig};
use crate::context::{IdSource, ProblemContext};
use crate::problem::{Problem, convert};
use crate::typed::Typed;

/// Category of the case-specific helpers.
pub const GENERAL: &str = "general";

/// Declarative problem type, e.g. from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDef {
    pub title: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Detail used when a call supplies none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TypeDef {
    pub fn new(title: impl Into<String>, status: u16) -> Self {
        Self {
            title: title.into(),
            status,
            category: None,
            detail: None,
        }
    }

    /// Builds the constructor for this definition, bound to `ctx`.
    #[must_use]
    pub fn typed(&self, ctx: &Arc<ProblemContext>) -> Typed {
        let fixed = self
            .category
            .iter()
            .map(|c| Arg::from(Category::new(c.as_str())))
            .chain(self.detail.iter().map(|d| Arg::from(Detail::new(d.as_str()))));
        Typed::new(self.title.clone(), self.status, fixed).with_context(Arc::clone(ctx))
    }
}

/// Immutable registry of problem constructors.
///
/// Build one at startup and hand it to whatever raises problems; every constructor shares
/// the catalog's [`ProblemContext`].
#[derive(Debug, Clone)]
pub struct Catalog {
    ctx: Arc<ProblemContext>,
    pub bad_request: Typed,
    pub unauthorized: Typed,
    /// Request parameter or payload failed validation.
    pub invalid_request: Typed,
    /// Request body could not be decoded.
    pub invalid_encoding: Typed,
    pub request_too_large: Typed,
    /// No auth middleware mounted for a security scheme.
    pub no_auth_middleware: Typed,
    /// Requested file is missing or unreadable.
    pub invalid_file: Typed,
    pub not_found: Typed,
    pub method_not_allowed: Typed,
    pub io_error: Typed,
    /// Uncaught errors.
    pub internal_error: Typed,
    custom: BTreeMap<String, Typed>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(ProblemContext::shared())
    }
}

impl Catalog {
    pub fn new(ctx: Arc<ProblemContext>) -> Self {
        let typed = |title: &'static str, status: u16| {
            Typed::new(title, status, []).with_context(Arc::clone(&ctx))
        };
        Self {
            bad_request: typed("bad_request", 400),
            unauthorized: typed("unauthorized", 401),
            invalid_request: typed("invalid_request", 400),
            invalid_encoding: typed("invalid_encoding", 400),
            request_too_large: typed("request_too_large", 413),
            no_auth_middleware: typed("no_auth_middleware", 500),
            invalid_file: typed("invalid_file", 404),
            not_found: typed("not_found", 404),
            method_not_allowed: typed("method_not_allowed", 405),
            io_error: Typed::new("io_error", 500, [Arg::from(Detail::new("io error"))])
                .with_context(Arc::clone(&ctx)),
            internal_error: typed("internal_error", 500),
            custom: BTreeMap::new(),
            ctx,
        }
    }

    /// Catalog bound to the configured base URI, with the configured types registered.
    ///
    /// # Errors
    /// Returns `ConfigError` if the configured types are invalid or shadow a built-in title.
    pub fn from_config(config: &ProblemConfig, ids: Arc<dyn IdSource>) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut catalog = Self::new(Arc::new(ProblemContext::new(config, ids)));
        for def in &config.types {
            if catalog.builtin(&def.title).is_some() {
                return Err(ConfigError::DuplicateType {
                    title: def.title.clone(),
                });
            }
            catalog
                .custom
                .insert(def.title.clone(), def.typed(&catalog.ctx));
        }
        tracing::debug!(custom = catalog.custom.len(), "problem catalog built");
        Ok(catalog)
    }

    #[must_use]
    pub fn context(&self) -> &Arc<ProblemContext> {
        &self.ctx
    }

    /// Looks a constructor up by title, built-in ones first.
    #[must_use]
    pub fn get(&self, title: &str) -> Option<&Typed> {
        self.builtin(title).or_else(|| self.custom.get(title))
    }

    /// Titles of every registered constructor.
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.builtins()
            .into_iter()
            .map(Typed::title)
            .chain(self.custom.keys().map(String::as_str))
    }

    fn builtins(&self) -> [&Typed; 11] {
        [
            &self.bad_request,
            &self.unauthorized,
            &self.invalid_request,
            &self.invalid_encoding,
            &self.request_too_large,
            &self.no_auth_middleware,
            &self.invalid_file,
            &self.not_found,
            &self.method_not_allowed,
            &self.io_error,
            &self.internal_error,
        ]
    }

    fn builtin(&self, title: &str) -> Option<&Typed> {
        self.builtins().into_iter().find(|t| t.title() == title)
    }

    /// Returns `err` itself if it is a [`Problem`], otherwise wraps it as an `internal_error`.
    pub fn as_problem(&self, err: impl Into<Box<dyn StdError + Send + Sync>>) -> Problem {
        convert(&self.ctx, err.into())
    }

    fn general(&self, title: &'static str, status: u16) -> Typed {
        Typed::within_category(GENERAL, title, status, []).with_context(Arc::clone(&self.ctx))
    }

    pub fn ok(&self, detail: impl Into<String>) -> Problem {
        Typed::new("ok", 200, [])
            .with_context(Arc::clone(&self.ctx))
            .call([Arg::Text(detail.into())])
    }

    /// Request is missing a required payload.
    pub fn missing_payload(&self) -> Problem {
        self.general("missing_payload", 400)
            .call([Arg::from("missing required payload")])
    }

    /// Parameter value does not have the expected type.
    pub fn invalid_param_type(
        &self,
        name: &str,
        val: impl Into<Value>,
        expected: &str,
    ) -> Problem {
        let val = val.into();
        self.general("invalid_param_type", 400).call([
            Arg::from(format!(
                "invalid value {} for parameter {}, must be a {expected}",
                literal(&val),
                quote(name)
            )),
            Arg::from(
                ValidationResult::new()
                    .with("name", name)
                    .with("value", val)
                    .with("expected", expected),
            ),
        ])
    }

    /// Path or query parameter is missing.
    pub fn missing_param(&self, name: &str) -> Problem {
        self.general("missing_param", 400).call([
            Arg::from(format!("missing required parameter {}", quote(name))),
            Arg::from(ValidationResult::new().with("name", name)),
        ])
    }

    /// Payload field does not have the expected type.
    pub fn invalid_attribute_type(
        &self,
        ctx: &str,
        val: impl Into<Value>,
        expected: &str,
    ) -> Problem {
        let val = val.into();
        self.general("invalid_attribute_type", 400).call([
            Arg::from(format!(
                "type of {ctx} must be {expected} but got value {}",
                literal(&val)
            )),
            Arg::from(
                ValidationResult::new()
                    .with("name", ctx)
                    .with("value", val)
                    .with("expected", expected),
            ),
        ])
    }

    /// Required payload field is missing.
    pub fn missing_attribute(&self, ctx: &str, name: &str) -> Problem {
        self.general("missing_attribute", 400).call([
            Arg::from(format!(
                "attribute {} of {ctx} is missing and required",
                quote(name)
            )),
            Arg::from(ValidationResult::new().with("name", name).with("parent", ctx)),
        ])
    }

    pub fn missing_header(&self, name: &str) -> Problem {
        self.general("missing_header", 400).call([
            Arg::from(format!("missing required HTTP header {}", quote(name))),
            Arg::from(ValidationResult::new().with("name", name)),
        ])
    }

    /// Value is not one of the allowed enum values.
    pub fn invalid_enum_value(
        &self,
        ctx: &str,
        val: impl Into<Value>,
        allowed: &[Value],
    ) -> Problem {
        let val = val.into();
        let elems: Vec<String> = allowed.iter().map(literal).collect();
        self.general("invalid_enum_value", 400).call([
            Arg::from(format!(
                "value of {ctx} must be one of {} but got value {}",
                elems.join(", "),
                literal(&val)
            )),
            Arg::from(
                ValidationResult::new()
                    .with("name", ctx)
                    .with("value", val)
                    .with("expected", elems.join(": ")),
            ),
        ])
    }

    /// Value does not match the expected format; `format_error` says why.
    pub fn invalid_format(
        &self,
        ctx: &str,
        target: &str,
        format: &str,
        format_error: &dyn StdError,
    ) -> Problem {
        let reason = format_error.to_string();
        self.general("invalid_format", 400).call([
            Arg::from(format!(
                "{ctx} must be formatted as a {format} but got value {}, {reason}",
                quote(target)
            )),
            Arg::from(
                ValidationResult::new()
                    .with("name", ctx)
                    .with("value", target)
                    .with("expected", format)
                    .with("error", reason),
            ),
        ])
    }

    /// Value does not match the pattern.
    pub fn invalid_pattern(&self, ctx: &str, target: &str, pattern: &str) -> Problem {
        self.general("invalid_pattern", 400).call([
            Arg::from(format!(
                "{ctx} must match the regexp {} but got value {}",
                quote(pattern),
                quote(target)
            )),
            Arg::from(
                ValidationResult::new()
                    .with("name", ctx)
                    .with("value", target)
                    .with("expected", pattern),
            ),
        ])
    }

    /// Value is outside the allowed range; `min` tells which bound was violated.
    pub fn invalid_range(
        &self,
        ctx: &str,
        target: impl Into<Value>,
        value: impl Into<Value>,
        min: bool,
    ) -> Problem {
        let (target, value) = (target.into(), value.into());
        let comp = comparison(min);
        self.general("invalid_range", 400).call([
            Arg::from(format!(
                "{ctx} must be {comp} {} but got value {}",
                plain(&value),
                literal(&target)
            )),
            Arg::from(
                ValidationResult::new()
                    .with("name", ctx)
                    .with("value", target)
                    .with("comp", comp)
                    .with("expected", value)
                    .with("min", min),
            ),
        ])
    }

    /// Value length is outside the allowed range.
    pub fn invalid_length(
        &self,
        ctx: &str,
        target: impl Into<Value>,
        len: usize,
        value: usize,
        min: bool,
    ) -> Problem {
        let target = target.into();
        let comp = comparison(min);
        self.general("invalid_length", 400).call([
            Arg::from(format!(
                "length of {ctx} must be {comp} {value} but got value {} (len={len})",
                literal(&target)
            )),
            Arg::from(
                ValidationResult::new()
                    .with("name", ctx)
                    .with("value", target)
                    .with("len", len)
                    .with("comp", comp)
                    .with("expected", value)
                    .with("min", min),
            ),
        ])
    }

    /// No auth middleware is mounted for `scheme`.
    pub fn no_auth_middleware(&self, scheme: &str) -> Problem {
        self.general("no_auth_middleware", 500).call([
            Arg::from(format!(
                "Auth middleware for security scheme {scheme} is not mounted"
            )),
            Arg::from(ValidationResult::new().with("scheme", scheme)),
        ])
    }

    /// Path matched but `method` is not one of `allowed`.
    pub fn method_not_allowed(&self, method: &str, allowed: &[&str]) -> Problem {
        let plural = if allowed.len() > 1 { " one of" } else { "" };
        self.general("method_not_allowed", 405).call([
            Arg::from(format!(
                "Method {method} must be{plural} {}",
                allowed.join(", ")
            )),
            Arg::from(
                ValidationResult::new()
                    .with("method", method)
                    .with("allowed", allowed.join(": ")),
            ),
        ])
    }
}

fn comparison(min: bool) -> &'static str {
    if min {
        "greater than or equal to"
    } else {
        "less than or equal to"
    }
}

fn quote(s: &str) -> String {
    literal(&Value::from(s))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::context::SequentialIds;
    use serde_json::json;

    #[test]
    fn builtins_have_fixed_status() {
        let catalog = Catalog::default();
        let expected = [
            ("bad_request", 400),
            ("unauthorized", 401),
            ("invalid_request", 400),
            ("invalid_encoding", 400),
            ("request_too_large", 413),
            ("no_auth_middleware", 500),
            ("invalid_file", 404),
            ("not_found", 404),
            ("method_not_allowed", 405),
            ("io_error", 500),
            ("internal_error", 500),
        ];
        for (title, status) in expected {
            let typed = catalog.get(title).unwrap();
            assert_eq!(typed.status(), status, "{title}");
        }
        assert!(catalog.get("teapot").is_none());
        assert_eq!(catalog.titles().count(), expected.len());
    }

    #[test]
    fn io_error_has_default_detail() {
        let p = Catalog::default().io_error.call([]);
        assert_eq!(p.to_string(), "io_error: io error");
    }

    #[test]
    fn configured_types_are_registered() {
        let config = ProblemConfig {
            type_base_uri: "https://errors.acme.io".to_owned(),
            types: vec![TypeDef {
                title: "quota_exceeded".to_owned(),
                status: 429,
                category: Some("billing".to_owned()),
                detail: Some("quota exceeded".to_owned()),
            }],
        };
        let catalog = Catalog::from_config(&config, Arc::new(SequentialIds::default())).unwrap();
        let p = catalog.get("quota_exceeded").unwrap().call([]);
        assert_eq!(p.id(), "AAAAAAAA");
        assert_eq!(p.status(), 429);
        assert_eq!(p.detail(), "quota exceeded");
        assert_eq!(p.type_url(), "https://errors.acme.io/billing/quota_exceeded");
        assert!(catalog.titles().any(|t| t == "quota_exceeded"));
    }

    #[test]
    fn configured_type_cannot_shadow_builtin() {
        let config = ProblemConfig {
            types: vec![TypeDef::new("not_found", 404)],
            ..ProblemConfig::default()
        };
        let err = Catalog::from_config(&config, Arc::new(SequentialIds::default())).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateType { .. }));
    }

    #[test]
    fn type_def_from_json() {
        let def: TypeDef =
            serde_json::from_value(json!({"title": "gone", "status": 410})).unwrap();
        assert_eq!(def, TypeDef::new("gone", 410));
    }

    #[test]
    fn ok_is_status_200() {
        let p = Catalog::default().ok("all good");
        assert_eq!(p.status(), 200);
        assert_eq!(p.to_string(), "ok: all good");
    }

    #[test]
    fn missing_payload_detail() {
        let p = Catalog::default().missing_payload();
        assert_eq!(p.title(), "missing_payload");
        assert_eq!(p.category(), GENERAL);
        assert_eq!(p.detail(), "missing required payload");
        assert!(p.validation_result().is_empty());
    }

    #[test]
    fn invalid_enum_value_lists_allowed() {
        let p = Catalog::default().invalid_enum_value(
            "color",
            "pink",
            &[json!("red"), json!("green")],
        );
        assert_eq!(
            p.detail(),
            "value of color must be one of \"red\", \"green\" but got value \"pink\""
        );
        assert_eq!(p.validation_result()["expected"], "\"red\": \"green\"");
    }

    #[test]
    fn method_not_allowed_pluralizes() {
        let catalog = Catalog::default();
        let one = catalog.method_not_allowed("POST", &["GET"]);
        assert_eq!(one.detail(), "Method POST must be GET");
        let many = catalog.method_not_allowed("POST", &["GET", "HEAD"]);
        assert_eq!(many.detail(), "Method POST must be one of GET, HEAD");
        assert_eq!(many.status(), 405);
        assert_eq!(many.validation_result()["allowed"], "GET: HEAD");
    }
}

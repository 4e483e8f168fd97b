//! Exchange strategy hooks that classify trust broker failures.
//!
//! Implementations decorate outgoing delegation bodies and normalize error mapping
//! without tying engines to any particular HTTP client.

// crates.io
use serde_json::{Map, Value};
// self
use crate::_prelude::*;

/// Strategy hook that allows deployments to decorate requests and classify errors.
///
/// The hooks work on crate-owned data so downstream crates never depend on
/// transport-specific structures. `augment_request` has a default no-op implementation.
pub trait ExchangeStrategy
where
	Self: Send + Sync,
{
	/// Maps a failed exchange into the broker taxonomy.
	fn classify(&self, ctx: &ExchangeErrorContext) -> ExchangeErrorKind;

	/// Gives deployments a chance to add fields to the JSON request body before dispatching.
	fn augment_request(&self, _body: &mut Map<String, Value>) {}
}

/// Canonical exchange failure categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeErrorKind {
	/// The request is malformed.
	InvalidRequest,
	/// The caller is not allowed to obtain the requested credential.
	Denied,
	/// Failure is temporary and may be retried.
	Transient,
}

/// Primitive failure data handed to [`ExchangeStrategy::classify`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExchangeErrorContext {
	/// HTTP status code, when available.
	pub http_status: Option<u16>,
	/// Structured error code (`PERMISSION_DENIED`, `invalid_grant`, ...).
	pub error_code: Option<String>,
	/// Structured error message or `error_description`.
	pub error_message: Option<String>,
	/// Preview of a body that carried no structured error.
	pub body_preview: Option<String>,
	/// Whether the failure originated in the transport layer.
	pub network_error: bool,
}
impl ExchangeErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Context for a transport-level failure.
	pub fn network_failure() -> Self {
		Self { network_error: true, ..Default::default() }
	}

	/// Extracts whatever structure an error response carries.
	///
	/// Understands both `{"error": {"code", "message", "status"}}` and the OAuth
	/// `{"error", "error_description"}` shapes; anything else becomes a body preview.
	pub fn from_response(status: u16, body: &[u8]) -> Self {
		let mut ctx = Self::default().with_http_status(status);

		match serde_json::from_slice::<Value>(body) {
			Ok(Value::Object(document)) => match document.get("error") {
				Some(Value::Object(error)) => {
					if let Some(code) = error.get("status").and_then(Value::as_str) {
						ctx = ctx.with_error_code(code);
					}
					if let Some(message) = error.get("message").and_then(Value::as_str) {
						ctx = ctx.with_error_message(message);
					}
				},
				Some(Value::String(code)) => {
					ctx = ctx.with_error_code(code.as_str());

					if let Some(description) =
						document.get("error_description").and_then(Value::as_str)
					{
						ctx = ctx.with_error_message(description);
					}
				},
				_ => ctx = ctx.with_body_preview(String::from_utf8_lossy(body)),
			},
			_ if !body.is_empty() => ctx = ctx.with_body_preview(String::from_utf8_lossy(body)),
			_ => (),
		}

		ctx
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds a structured error code.
	pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
		self.error_code = Some(code.into());

		self
	}

	/// Adds a structured error message.
	pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
		self.error_message = Some(message.into());

		self
	}

	/// Adds a truncated body preview.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}

	/// Best human-readable description available.
	pub fn summary(&self) -> String {
		self.error_message
			.clone()
			.or_else(|| self.error_code.clone())
			.or_else(|| self.body_preview.clone())
			.unwrap_or_else(|| match self.http_status {
				Some(status) => format!("HTTP {status}"),
				None => "no response".into(),
			})
	}
}

/// Default strategy.
///
/// Structured error codes win, then body hints, then the HTTP status: 400/422 are invalid
/// requests, 401/403/404 denials, 408/429/5xx transient. Network failures are always transient.
#[derive(Debug, Default)]
pub struct DefaultExchangeStrategy;
impl Display for DefaultExchangeStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-exchange-strategy")
	}
}
impl ExchangeStrategy for DefaultExchangeStrategy {
	fn classify(&self, ctx: &ExchangeErrorContext) -> ExchangeErrorKind {
		if ctx.network_error {
			return ExchangeErrorKind::Transient;
		}

		if let Some(kind) = ctx.error_code.as_deref().and_then(match_code) {
			return kind;
		}
		if let Some(kind) = classify_body(ctx.body_preview.as_deref()) {
			return kind;
		}

		classify_status(ctx.http_status)
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ExchangeErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = body.chars().take(ExchangeErrorContext::BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}

fn match_code(value: &str) -> Option<ExchangeErrorKind> {
	match value.to_ascii_lowercase().as_str() {
		"invalid_argument" | "invalid_request" | "invalid_scope" | "failed_precondition"
		| "out_of_range" => Some(ExchangeErrorKind::InvalidRequest),
		"permission_denied" | "unauthenticated" | "access_denied" | "invalid_grant"
		| "invalid_client" | "unauthorized_client" | "not_found" => Some(ExchangeErrorKind::Denied),
		"unavailable" | "resource_exhausted" | "deadline_exceeded" | "internal" | "aborted"
		| "temporarily_unavailable" | "server_error" => Some(ExchangeErrorKind::Transient),
		_ => None,
	}
}

fn classify_body(body: Option<&str>) -> Option<ExchangeErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("permission") || text.contains("denied") =>
			Some(ExchangeErrorKind::Denied),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(ExchangeErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ExchangeErrorKind {
	match status {
		Some(400 | 422) => ExchangeErrorKind::InvalidRequest,
		Some(401 | 403 | 404) => ExchangeErrorKind::Denied,
		Some(408 | 429) => ExchangeErrorKind::Transient,
		Some(code) if code >= 500 => ExchangeErrorKind::Transient,
		Some(code) if (400..500).contains(&code) => ExchangeErrorKind::InvalidRequest,
		_ => ExchangeErrorKind::Transient,
	}
}

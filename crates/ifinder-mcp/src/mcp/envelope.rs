use ifinder_core::escalation::{next_strategy, Strategy, Trigger};
use ifinder_core::{Error, ErrorKind};
use serde::Serialize;

pub(crate) const SCHEMA_VERSION: u64 = 1;

/// Failure codes carried in `error.code`.
///
/// Engine failures reuse the engine's classification verbatim; the rest are produced before any
/// retrieval starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    Engine(ErrorKind),
    InvalidParams,
}

impl ErrorCode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Engine(kind) => kind.as_str(),
            Self::InvalidParams => "invalid_params",
        }
    }

    pub(crate) fn retryable(self) -> bool {
        match self {
            Self::Engine(kind) => kind.retryable(),
            Self::InvalidParams => false,
        }
    }
}

/// What the calling policy can do about a failure of `strategy`.
pub(crate) fn hint_for(strategy: Strategy, kind: ErrorKind) -> &'static str {
    match (kind, strategy) {
        (ErrorKind::Network, _) => {
            "The portal could not be reached or answered with an error status. Check the reference; the page may have moved."
        }
        (ErrorKind::Timeout, Strategy::FetchRendered) => {
            "The browser did not finish within the render ceiling. Report the failure instead of retrying."
        }
        (ErrorKind::Timeout, _) => {
            "The request exceeded its time budget. A rendered fetch may succeed where the static one did not."
        }
        (ErrorKind::EmptyContent, _) => {
            "The page has no static text, likely client-rendered. Try fetch_rendered."
        }
        (ErrorKind::UnreadableDocument, _) => {
            "The document is not a readable PDF (scanned, corrupt, or not a PDF at all). Try fetch on the reference instead."
        }
        (ErrorKind::LayoutMismatch, _) => {
            "The page no longer carries the expected markers; the portal layout probably changed. Try fetch_rendered and read the page directly."
        }
        (ErrorKind::NoResults, Strategy::SearchSimple) => {
            "The search worked but found nothing. Try search_filtered with other wording, or extract_navigation."
        }
        (ErrorKind::NoResults, _) => {
            "Nothing matched. Try a broader term or browse with extract_navigation."
        }
        (ErrorKind::Cancelled, _) => "The call was cancelled before it finished.",
        (ErrorKind::NotConfigured, _) => {
            "A required local tool is missing (Node.js/Playwright or pdftotext). Run `ifinder doctor`."
        }
    }
}

pub(crate) fn add_envelope_fields(payload: &mut serde_json::Value, kind: &str, elapsed_ms: u128) {
    payload["schema_version"] = serde_json::json!(SCHEMA_VERSION);
    payload["kind"] = serde_json::json!(kind);
    payload["elapsed_ms"] = serde_json::json!(elapsed_ms);
    if payload.get("request").is_none() {
        payload["request"] = serde_json::Value::Null;
    }
}

pub(crate) fn error_obj(
    code: ErrorCode,
    message: impl ToString,
    hint: impl ToString,
) -> serde_json::Value {
    #[derive(Serialize)]
    struct ErrorObject {
        code: &'static str,
        message: String,
        hint: String,
        retryable: bool,
    }

    let e = ErrorObject {
        code: code.as_str(),
        message: message.to_string(),
        hint: hint.to_string(),
        retryable: code.retryable(),
    };
    match serde_json::to_value(e) {
        Ok(v) => v,
        Err(_) => serde_json::json!({
            "code": code.as_str(),
            "message": message.to_string(),
            "hint": hint.to_string(),
            "retryable": code.retryable()
        }),
    }
}

/// A finished capability call: the JSON envelope plus the human-readable text it mirrors.
#[derive(Debug, Clone)]
pub(crate) struct Outcome {
    pub(crate) payload: serde_json::Value,
    pub(crate) text: String,
}

impl Outcome {
    pub(crate) fn ok(&self) -> bool {
        self.payload["ok"].as_bool().unwrap_or(false)
    }
}

pub(crate) fn success(
    strategy: Strategy,
    request: serde_json::Value,
    result: serde_json::Value,
    text: String,
    trigger: Option<Trigger>,
    elapsed_ms: u128,
) -> Outcome {
    let mut payload = serde_json::json!({
        "ok": true,
        "state": "succeeded",
        "request": request,
        "result": result,
        "next": trigger.and_then(|t| next_strategy(strategy, t)).map(Strategy::name),
    });
    add_envelope_fields(&mut payload, strategy.name(), elapsed_ms);
    Outcome { payload, text }
}

pub(crate) fn failure(
    strategy: Strategy,
    request: serde_json::Value,
    err: &Error,
    elapsed_ms: u128,
) -> Outcome {
    let kind = err.kind();
    let mut payload = serde_json::json!({
        "ok": false,
        "state": "failed",
        "request": request,
        "error": error_obj(ErrorCode::Engine(kind), err, hint_for(strategy, kind)),
        "absence": kind.is_absence(),
        "next": next_strategy(strategy, Trigger::Failed(kind)).map(Strategy::name),
    });
    add_envelope_fields(&mut payload, strategy.name(), elapsed_ms);
    Outcome {
        payload,
        text: err.to_string(),
    }
}

/// Rejected before any retrieval started.
pub(crate) fn invalid(strategy: Strategy, request: serde_json::Value, message: &str) -> Outcome {
    let mut payload = serde_json::json!({
        "ok": false,
        "state": "not_started",
        "request": request,
        "error": error_obj(
            ErrorCode::InvalidParams,
            message,
            "Pass a non-empty value; see the tool's input schema.",
        ),
        "absence": false,
        "next": null,
    });
    add_envelope_fields(&mut payload, strategy.name(), 0);
    Outcome {
        payload,
        text: message.to_string(),
    }
}

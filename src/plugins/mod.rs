//! Change appliers: one per editable scope.
//!
//! Each applier receives the operations of its namespace, mutates the
//! [`SiteState`] in place and returns a JSON summary for the edit ledger.
//! Language model failures never escape an applier; it records the attempt
//! in the trace table and falls back to a deterministic local rewrite. Only
//! state store errors propagate.

pub mod content;
pub mod css;
pub mod head;
pub mod llm;
pub mod nav;
pub mod seo;

use crate::core::error::PostEditError;
use crate::site::changeset::{ChangeOperation, Scope};
use crate::site::model::SiteState;
use crate::site::state_store::{StateStore, TraceEntry};
use llm::{JsonCompletion, LlmError, LlmService, Message, TextCompletion};
use serde_json::{Map, Value as JsonValue, json};
use std::time::Instant;

pub type ApplySummary = Map<String, JsonValue>;

/// Everything an applier may consult besides the document itself.
pub struct ApplyContext<'a> {
    pub prompt: &'a str,
    pub store: &'a StateStore,
    pub llm: &'a dyn LlmService,
    pub provider: &'a str,
    pub model: &'a str,
    /// Extra design guidance from configuration
    pub design_directives: Option<&'a str>,
}

pub trait ChangeApplier {
    fn scope(&self) -> Scope;

    fn apply(
        &self,
        state: &mut SiteState,
        operations: &[ChangeOperation],
        ctx: &ApplyContext<'_>,
    ) -> Result<ApplySummary, PostEditError>;
}

/// Scopes with an applier, in dispatch order.
pub const APPLY_ORDER: [Scope; 5] = [Scope::Css, Scope::Nav, Scope::Content, Scope::Seo, Scope::Head];

pub struct ApplierRegistry {
    appliers: Vec<Box<dyn ChangeApplier>>,
}

impl ApplierRegistry {
    pub fn standard() -> Self {
        Self {
            appliers: vec![
                Box::new(css::CssApplier),
                Box::new(nav::NavApplier),
                Box::new(content::ContentApplier),
                Box::new(seo::SeoApplier),
                Box::new(head::HeadApplier),
            ],
        }
    }

    pub fn get(&self, scope: Scope) -> Option<&dyn ChangeApplier> {
        self.appliers
            .iter()
            .find(|a| a.scope() == scope)
            .map(|a| &**a)
    }

    /// Appliers in [`APPLY_ORDER`].
    pub fn ordered(&self) -> impl Iterator<Item = &dyn ChangeApplier> {
        APPLY_ORDER.into_iter().filter_map(|scope| self.get(scope))
    }
}

fn request_text(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

fn record_attempt(
    ctx: &ApplyContext<'_>,
    request: &str,
    response: &str,
    started: Instant,
    tokens: JsonValue,
) -> Result<(), PostEditError> {
    ctx.store.record_trace(TraceEntry {
        provider: ctx.provider,
        model: ctx.model,
        request,
        response,
        duration_ms: elapsed_ms(started),
        tokens,
    })?;
    Ok(())
}

fn failure_tokens(request: &str) -> JsonValue {
    json!({"input": crate::core::trace::estimate_tokens(request), "output": 0})
}

/// Ask for free text. `Ok(None)` means the model failed and the caller
/// should fall back; the attempt is traced either way.
pub(crate) fn ask_text(
    ctx: &ApplyContext<'_>,
    applier: &str,
    messages: &[Message],
    temperature: Option<f32>,
) -> Result<Option<TextCompletion>, PostEditError> {
    let request = request_text(messages);
    let started = Instant::now();
    match ctx.llm.complete_text(messages, ctx.model, temperature) {
        Ok(completion) if !completion.text.trim().is_empty() => {
            let tokens = json!({
                "input": completion.input_tokens,
                "output": completion.output_tokens,
            });
            record_attempt(ctx, &request, &completion.text, started, tokens)?;
            Ok(Some(completion))
        }
        Ok(_) => {
            fallback(ctx, applier, &request, started, LlmError::InvalidResponse("empty text".into()))?;
            Ok(None)
        }
        Err(err) => {
            fallback(ctx, applier, &request, started, err)?;
            Ok(None)
        }
    }
}

/// Ask for a JSON document; same fallback contract as [`ask_text`].
pub(crate) fn ask_json(
    ctx: &ApplyContext<'_>,
    applier: &str,
    messages: &[Message],
    schema: Option<&JsonValue>,
) -> Result<Option<JsonCompletion>, PostEditError> {
    let request = request_text(messages);
    let started = Instant::now();
    match ctx.llm.complete_json(messages, ctx.model, schema) {
        Ok(completion) => {
            let tokens = json!({
                "input": completion.input_tokens,
                "output": completion.output_tokens,
            });
            record_attempt(ctx, &request, &completion.value.to_string(), started, tokens)?;
            Ok(Some(completion))
        }
        Err(err) => {
            fallback(ctx, applier, &request, started, err)?;
            Ok(None)
        }
    }
}

fn fallback(
    ctx: &ApplyContext<'_>,
    applier: &str,
    request: &str,
    started: Instant,
    err: LlmError,
) -> Result<(), PostEditError> {
    tracing::warn!(
        applier,
        provider = ctx.provider,
        model = ctx.model,
        error = %err,
        "llm call failed, using local fallback"
    );
    record_attempt(
        ctx,
        request,
        &format!("error: {}", err),
        started,
        failure_tokens(request),
    )
}

/// Strip a surrounding Markdown code fence from a model reply.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.strip_suffix("```").unwrap_or(body).trim()
}

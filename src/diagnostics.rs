//! Diagnostics adapter.
//!
//! Every matched binding produces one diagnostic record. The record is a
//! template with `{name}` placeholders plus the values to put in them: the
//! optional binding message, the failure's message, and any named arguments.
//! Records go to a [`DiagnosticSink`] registered for the call site's declaring
//! type, then to one registered for the receiver's runtime type, then to the
//! fallback; when there is none, emission does nothing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::binding::LogLevel;
use crate::error::Result;
use crate::failure::Failure;
use crate::value::TypeKey;

/// Field name of the binding's message prefix.
pub const MESSAGE_FIELD: &str = "message";

/// Field name of the failure's message.
pub const FAILURE_FIELD: &str = "failure";

/// One named value in a diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticField {
    /// Placeholder name.
    pub name: String,
    /// Rendered value.
    pub value: String,
}

/// A structured diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticRecord {
    /// Severity.
    pub level: LogLevel,
    /// Category path of the failure.
    pub category: String,
    /// Format template with `{name}` placeholders.
    pub template: String,
    /// Values in template order.
    pub fields: Vec<DiagnosticField>,
}

impl DiagnosticRecord {
    /// Build a record for `failure`.
    ///
    /// `message` becomes the leading field when set, the failure message is
    /// always present, and `named` values follow in order.
    pub fn build(
        level: LogLevel,
        failure: &Failure,
        message: Option<&str>,
        named: &[(String, String)],
    ) -> Self {
        let mut fields = Vec::with_capacity(named.len() + 2);
        if let Some(message) = message {
            fields.push(DiagnosticField {
                name: MESSAGE_FIELD.to_string(),
                value: message.to_string(),
            });
        }
        fields.push(DiagnosticField {
            name: FAILURE_FIELD.to_string(),
            value: failure.message().to_string(),
        });
        fields.extend(named.iter().map(|(name, value)| DiagnosticField {
            name: name.clone(),
            value: value.clone(),
        }));

        let mut template = String::new();
        if message.is_some() {
            template.push_str("{message}: ");
        }
        template.push_str("{failure}");
        if !named.is_empty() {
            let args: Vec<String> = named
                .iter()
                .map(|(name, _)| format!("{name}={{{name}}}"))
                .collect();
            template.push_str(" (");
            template.push_str(&args.join(", "));
            template.push(')');
        }

        Self {
            level,
            category: failure.category().path(),
            template,
            fields,
        }
    }

    /// Field values as `(name, value)` pairs.
    pub fn values(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.value.clone()))
            .collect()
    }

    /// Template with every placeholder substituted.
    pub fn render(&self) -> String {
        render_template(&self.template, &self.values())
    }

    /// Serialize the record as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Substitute `{name}` placeholders. Unknown placeholders are left as they are.
pub fn render_template(template: &str, values: &[(String, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match values.iter().find(|(n, _)| n == name) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Logging capability the adapter emits to.
pub trait DiagnosticSink: Send + Sync + 'static {
    /// Log one record.
    fn log(&self, level: LogLevel, failure: &Failure, template: &str, values: &[(String, String)]);
}

/// Sink forwarding records to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn log(&self, level: LogLevel, failure: &Failure, template: &str, values: &[(String, String)]) {
        let text = render_template(template, values);
        let category = failure.category().name();
        match level {
            LogLevel::Trace => tracing::trace!(category, "{text}"),
            LogLevel::Debug => tracing::debug!(category, "{text}"),
            LogLevel::Info => tracing::info!(category, "{text}"),
            LogLevel::Warn => tracing::warn!(category, "{text}"),
            LogLevel::Error => tracing::error!(category, "{text}"),
        }
    }
}

/// Routes diagnostic records to the sink of the emitting type.
#[derive(Clone, Default)]
pub struct DiagnosticsAdapter {
    sinks: HashMap<String, Arc<dyn DiagnosticSink>>,
    fallback: Option<Arc<dyn DiagnosticSink>>,
}

impl DiagnosticsAdapter {
    /// Create an adapter with no sinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the sink for `scope` (a declaring type name).
    pub fn register(&mut self, scope: impl Into<String>, sink: Arc<dyn DiagnosticSink>) {
        self.sinks.insert(scope.into(), sink);
    }

    /// Set the sink used for scopes with no registered sink.
    pub fn with_fallback(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.fallback = Some(sink);
        self
    }

    /// Replace the fallback sink.
    pub fn set_fallback(&mut self, sink: Arc<dyn DiagnosticSink>) {
        self.fallback = Some(sink);
    }

    /// Register the sink for receivers of type `T`.
    ///
    /// Used when the call site's declaring type has no sink of its own.
    pub fn register_type<T: std::any::Any>(&mut self, sink: Arc<dyn DiagnosticSink>) {
        self.register(TypeKey::of::<T>().name(), sink);
    }

    /// Returns true if `scope` would reach a sink.
    pub fn has_sink(&self, scope: &str) -> bool {
        self.has_scope(scope) || self.fallback.is_some()
    }

    /// Returns true if `scope` has a sink of its own.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.sinks.contains_key(scope)
    }

    /// Emit one record for `failure` under `scope`.
    ///
    /// Returns the emitted record, or `None` when no sink is reachable.
    pub fn emit(
        &self,
        scope: &str,
        level: LogLevel,
        failure: &Failure,
        message: Option<&str>,
        named: &[(String, String)],
    ) -> Option<DiagnosticRecord> {
        let sink = self.sinks.get(scope).or(self.fallback.as_ref())?;
        let record = DiagnosticRecord::build(level, failure, message, named);
        sink.log(level, failure, &record.template, &record.values());
        Some(record)
    }
}

impl fmt::Debug for DiagnosticsAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut scopes: Vec<&String> = self.sinks.keys().collect();
        scopes.sort();
        f.debug_struct("DiagnosticsAdapter")
            .field("scopes", &scopes)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

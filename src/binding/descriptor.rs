//! Binding descriptors.
//!
//! A [`BindingDescriptor`] is the resolved shape of one declared rule: which
//! failure categories it matches and how it responds. Descriptors are plain
//! data; declaration order on a call site is significant and never re-sorted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{InterceptError, Result};
use crate::failure::{Category, Failure};

/// Identity of a handler or cleanup routine: target type plus routine name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutineId {
    /// Target type the routine belongs to.
    pub target: String,
    /// Routine name.
    pub name: String,
}

impl RoutineId {
    /// Create a routine identity.
    pub fn new(target: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RoutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.target, self.name)
    }
}

/// Severity of the diagnostic emitted when a binding matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    Info,
    /// Warn level.
    Warn,
    /// Error level.
    #[default]
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Short-circuit that supplies a result without invoking a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnDefaultPolicy {
    /// Invoke the handler (or log only).
    #[default]
    None,
    /// Substitute the zero value of the declared result type.
    DefaultValue,
    /// Substitute a freshly constructed instance of the declared result type.
    NewInstance,
}

/// One declared exception-handling rule.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingDescriptor {
    filters: Vec<&'static Category>,
    handler: Option<RoutineId>,
    cleanup: Option<RoutineId>,
    log_only: bool,
    log_level: LogLevel,
    message: Option<String>,
    log_targets: Vec<String>,
    return_default: ReturnDefaultPolicy,
}

impl BindingDescriptor {
    /// Start a descriptor matching the given categories.
    pub fn on(filters: &[&'static Category]) -> Self {
        Self {
            filters: filters.to_vec(),
            handler: None,
            cleanup: None,
            log_only: false,
            log_level: LogLevel::default(),
            message: None,
            log_targets: Vec::new(),
            return_default: ReturnDefaultPolicy::None,
        }
    }

    /// Set the handler routine deciding the flow.
    pub fn handler(mut self, target: impl Into<String>, name: impl Into<String>) -> Self {
        self.handler = Some(RoutineId::new(target, name));
        self
    }

    /// Set the cleanup routine.
    pub fn cleanup(mut self, target: impl Into<String>, name: impl Into<String>) -> Self {
        self.cleanup = Some(RoutineId::new(target, name));
        self
    }

    /// Log and re-raise without invoking a handler.
    pub fn log_only(mut self) -> Self {
        self.log_only = true;
        self
    }

    /// Set the diagnostic level.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Set the diagnostic message prefix.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Name the guarded call's parameters to include in the diagnostic.
    pub fn log_targets<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.log_targets = names.into_iter().map(Into::into).collect();
        self
    }

    /// Short-circuit with a default result instead of invoking a handler.
    pub fn return_default(mut self, policy: ReturnDefaultPolicy) -> Self {
        self.return_default = policy;
        self
    }

    /// Categories this binding matches.
    #[inline]
    pub fn filters(&self) -> &[&'static Category] {
        &self.filters
    }

    /// Handler routine, if any.
    #[inline]
    pub fn handler_routine(&self) -> Option<&RoutineId> {
        self.handler.as_ref()
    }

    /// Cleanup routine, if any.
    #[inline]
    pub fn cleanup_routine(&self) -> Option<&RoutineId> {
        self.cleanup.as_ref()
    }

    /// Whether matching only logs and re-raises.
    #[inline]
    pub fn is_log_only(&self) -> bool {
        self.log_only
    }

    /// Diagnostic level.
    #[inline]
    pub fn level(&self) -> LogLevel {
        self.log_level
    }

    /// Diagnostic message prefix.
    #[inline]
    pub fn message_text(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Parameter names included in the diagnostic.
    #[inline]
    pub fn targets(&self) -> &[String] {
        &self.log_targets
    }

    /// Default-result policy.
    #[inline]
    pub fn default_policy(&self) -> ReturnDefaultPolicy {
        self.return_default
    }

    /// Returns true if `failure` falls under any filter.
    #[inline]
    pub fn matches(&self, failure: &Failure) -> bool {
        failure.matches_any(&self.filters)
    }

    /// Check the descriptor is well-formed.
    ///
    /// The filter set must be non-empty, and the descriptor must have some way
    /// to respond: a handler, `log_only`, or a default-result policy.
    pub fn validate(&self) -> Result<()> {
        if self.filters.is_empty() {
            return Err(InterceptError::InvalidBinding(
                "binding has no exception filters".to_string(),
            ));
        }
        if self.handler.is_none()
            && !self.log_only
            && self.return_default == ReturnDefaultPolicy::None
        {
            return Err(InterceptError::InvalidBinding(format!(
                "binding on {:?} has neither a handler, log_only, nor a default-result policy",
                self.filters
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::categories;

    static VALIDATION: Category = Category::child_of("Validation", &categories::FAILURE);
    static IO: Category = Category::child_of("Io", &categories::FAILURE);

    #[test]
    fn test_builder_fields() {
        let d = BindingDescriptor::on(&[&VALIDATION])
            .handler("Handlers", "on_validation")
            .cleanup("Handlers", "release")
            .log_level(LogLevel::Warn)
            .message("placing order")
            .log_targets(["order_id", "sku"]);

        assert_eq!(d.filters().len(), 1);
        assert_eq!(
            d.handler_routine(),
            Some(&RoutineId::new("Handlers", "on_validation"))
        );
        assert_eq!(d.cleanup_routine().map(|r| r.to_string()).as_deref(), Some("Handlers.release"));
        assert!(!d.is_log_only());
        assert_eq!(d.level(), LogLevel::Warn);
        assert_eq!(d.message_text(), Some("placing order"));
        assert_eq!(d.targets(), &["order_id".to_string(), "sku".to_string()]);
        assert_eq!(d.default_policy(), ReturnDefaultPolicy::None);
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_matches_subtypes() {
        static FIELD: Category = Category::child_of("Field", &VALIDATION);
        let d = BindingDescriptor::on(&[&VALIDATION]).log_only();

        assert!(d.matches(&Failure::new(&FIELD, "missing field")));
        assert!(!d.matches(&Failure::new(&IO, "disk")));
    }

    #[test]
    fn test_validate_rejects_empty_filters() {
        let d = BindingDescriptor::on(&[]).log_only();
        assert!(matches!(d.validate(), Err(InterceptError::InvalidBinding(_))));
    }

    #[test]
    fn test_validate_requires_a_response() {
        let d = BindingDescriptor::on(&[&IO]);
        assert!(matches!(d.validate(), Err(InterceptError::InvalidBinding(_))));

        let d = BindingDescriptor::on(&[&IO]).return_default(ReturnDefaultPolicy::DefaultValue);
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_level_serde_names() {
        let level: LogLevel = serde_json::from_str("\"warn\"").unwrap();
        assert_eq!(level, LogLevel::Warn);
        let policy: ReturnDefaultPolicy = serde_json::from_str("\"new_instance\"").unwrap();
        assert_eq!(policy, ReturnDefaultPolicy::NewInstance);
        assert_eq!(tracing::Level::from(LogLevel::Info), tracing::Level::INFO);
    }

    #[test]
    fn test_descriptor_equality() {
        let a = BindingDescriptor::on(&[&IO]).handler("H", "h");
        let b = BindingDescriptor::on(&[&IO]).handler("H", "h");
        let c = BindingDescriptor::on(&[&VALIDATION]).handler("H", "h");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

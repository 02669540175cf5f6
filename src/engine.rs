//! Dispatch engine.
//!
//! One dispatch runs the guarded call and, on failure, walks the call site's
//! bindings in declaration order until one settles the failure:
//!
//! ```text
//! Running -> Succeeded | Failed -> Finalizing -> Completed | Propagating
//! ```
//!
//! The first binding that declares a cleanup routine has it run on every path
//! before the dispatch settles.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::binding::{BindingAction, ResolvedBinding, ReturnDefaultPolicy, RoutineId};
use crate::cache::{InvocationCache, SiteBindings};
use crate::context::{Arguments, CallSite, InvocationContext, Receiver};
use crate::diagnostics::DiagnosticsAdapter;
use crate::error::{InterceptError, Result};
use crate::failure::{categories, Failure};
use crate::handler::{BoxFuture, FlowDecision};
use crate::value::Value;

/// Default composite-failure policy.
pub const DEFAULT_COMPOSITE_POLICY: CompositePolicy = CompositePolicy::LastEvaluated;

/// Default cleanup-failure policy.
pub const DEFAULT_CLEANUP_FAILURE_POLICY: CleanupFailurePolicy = CleanupFailurePolicy::Supersede;

/// Default handler isolation.
pub const DEFAULT_HANDLER_ISOLATION: HandlerIsolation = HandlerIsolation::Inline;

/// How a binding settles when several inner failures of a composite match it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositePolicy {
    /// Evaluate every matching inner failure; the last outcome wins.
    #[default]
    LastEvaluated,
    /// Stop at the first matching inner failure.
    FirstMatch,
}

/// What a failing cleanup does to a dispatch that had otherwise completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupFailurePolicy {
    /// The cleanup failure replaces the result.
    #[default]
    Supersede,
    /// The cleanup failure is logged and the result kept.
    Suppress,
}

/// Where handler and cleanup routines execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerIsolation {
    /// Awaited directly inside the dispatch.
    #[default]
    Inline,
    /// Spawned as a task and awaited; a panic surfaces as `HandlerExecution`.
    Spawned,
}

/// Engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Composite-failure policy.
    pub composite_policy: CompositePolicy,
    /// Cleanup-failure policy.
    pub cleanup_failure_policy: CleanupFailurePolicy,
    /// Handler isolation.
    pub handler_isolation: HandlerIsolation,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            composite_policy: DEFAULT_COMPOSITE_POLICY,
            cleanup_failure_policy: DEFAULT_CLEANUP_FAILURE_POLICY,
            handler_isolation: DEFAULT_HANDLER_ISOLATION,
        }
    }
}

/// Dispatch state, traced as the dispatch advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The guarded call is running.
    Running,
    /// The guarded call returned normally.
    Succeeded,
    /// The guarded call failed; bindings are being consulted.
    Failed,
    /// The cleanup routine is running.
    Finalizing,
    /// A result is available.
    Completed,
    /// A failure is being raised to the caller.
    Propagating,
}

/// Outcome of one binding for one failure.
#[derive(Debug)]
enum Step {
    /// Try the next binding.
    Next,
    /// Handled, with an optional result override.
    Handled(Option<Value>),
    /// Raise this failure.
    Propagate(Failure),
    /// Defect; never handled.
    Fatal(InterceptError),
}

/// Where the dispatch stands before cleanup.
#[derive(Debug)]
enum Settled {
    Completed,
    Propagating(Failure),
    Fatal(InterceptError),
}

/// Runs guarded calls under their declared bindings.
#[derive(Debug)]
pub struct DispatchEngine {
    cache: Arc<InvocationCache>,
    diagnostics: DiagnosticsAdapter,
    config: EngineConfig,
}

impl DispatchEngine {
    /// Create an engine.
    pub fn new(
        cache: Arc<InvocationCache>,
        diagnostics: DiagnosticsAdapter,
        config: EngineConfig,
    ) -> Self {
        Self {
            cache,
            diagnostics,
            config,
        }
    }

    /// Shared invocation cache.
    #[inline]
    pub fn cache(&self) -> &Arc<InvocationCache> {
        &self.cache
    }

    /// Diagnostics adapter.
    #[inline]
    pub fn diagnostics(&self) -> &DiagnosticsAdapter {
        &self.diagnostics
    }

    /// Engine configuration.
    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Dispatch one guarded call.
    ///
    /// Returns the call's result (or a substituted one), `Guarded` with the
    /// failure to raise, or a defect error.
    pub async fn dispatch(&self, mut ctx: InvocationContext) -> Result<Option<Value>> {
        let bindings = self.cache.resolve_bindings(ctx.site())?;
        let site = ctx.site().clone();
        let receiver = ctx.receiver().cloned();
        let arguments = ctx.arguments().clone();

        tracing::trace!(site = %site.id(), phase = ?Phase::Running);
        let settled = match ctx.proceed().await {
            Ok(value) => {
                tracing::trace!(site = %site.id(), phase = ?Phase::Succeeded);
                if let Some(value) = value {
                    ctx.set_result(value);
                }
                Settled::Completed
            }
            Err(failure) => {
                tracing::trace!(site = %site.id(), phase = ?Phase::Failed, failure = %failure);
                let step = self
                    .handle_failure(&site, receiver, &arguments, &bindings, &failure)
                    .await;
                match step {
                    Step::Next => {
                        tracing::debug!(site = %site.id(), "no binding handled the failure");
                        ctx.set_failure(failure.clone());
                        Settled::Propagating(failure)
                    }
                    Step::Handled(value) => {
                        if let Some(value) = value {
                            ctx.set_result(value);
                        }
                        Settled::Completed
                    }
                    Step::Propagate(raised) => {
                        ctx.set_failure(raised.clone());
                        Settled::Propagating(raised)
                    }
                    Step::Fatal(err) => Settled::Fatal(err),
                }
            }
        };

        tracing::trace!(site = %site.id(), phase = ?Phase::Finalizing);
        let cleanup = self.run_cleanup(&bindings, &arguments).await;
        self.settle(&site, &mut ctx, settled, cleanup)
    }

    /// Walk the bindings for `failure`. `Step::Next` means nothing settled it.
    async fn handle_failure(
        &self,
        site: &Arc<CallSite>,
        receiver: Option<Receiver>,
        arguments: &Arguments,
        bindings: &SiteBindings,
        failure: &Failure,
    ) -> Step {
        let expanded = failure.expand();

        for (index, binding) in bindings.as_slice().iter().enumerate() {
            let mut outcome: Option<Step> = None;

            for inner in expanded.iter().filter(|f| binding.descriptor().matches(f)) {
                self.emit(site, binding, receiver.as_ref(), arguments, inner);
                let step = self
                    .apply(site, binding, receiver.clone(), arguments, failure, inner)
                    .await;
                let fatal = matches!(step, Step::Fatal(_));
                outcome = Some(step);
                if fatal || self.config.composite_policy == CompositePolicy::FirstMatch {
                    break;
                }
                // No handler to consult: one diagnostic and one outcome per binding.
                if matches!(
                    binding.action(),
                    BindingAction::LogOnly | BindingAction::ReturnDefault(_)
                ) {
                    break;
                }
            }

            match outcome {
                None => continue,
                Some(Step::Next) => {
                    tracing::debug!(site = %site.id(), binding = index, "binding passed, continuing");
                    continue;
                }
                Some(step) => {
                    tracing::debug!(site = %site.id(), binding = index, outcome = ?step, "binding settled failure");
                    return step;
                }
            }
        }

        Step::Next
    }

    /// Apply one matched binding to one (inner) failure.
    async fn apply(
        &self,
        site: &CallSite,
        binding: &ResolvedBinding,
        receiver: Option<Receiver>,
        arguments: &Arguments,
        original: &Failure,
        matched: &Failure,
    ) -> Step {
        match binding.action() {
            BindingAction::LogOnly => Step::Propagate(original.clone()),
            BindingAction::ReturnDefault(policy) => {
                let result = site.result();
                let value = match policy {
                    ReturnDefaultPolicy::DefaultValue => result.zero_value(),
                    ReturnDefaultPolicy::NewInstance => result.new_instance(),
                    ReturnDefaultPolicy::None => None,
                };
                if value.is_none() && !result.is_unit() {
                    tracing::debug!(site = %site.id(), result = %result.describe(), "no default available, result left empty");
                }
                Step::Handled(value)
            }
            BindingAction::Handler(thunk) => {
                let fut = thunk.invoke(receiver, arguments.clone(), matched.clone());
                match self.isolate(thunk.routine(), fut).await {
                    Ok(decision) => self.decide(site, original, decision),
                    Err(err) => Step::Fatal(err),
                }
            }
        }
    }

    /// Turn a flow decision into a step.
    fn decide(&self, site: &CallSite, original: &Failure, decision: FlowDecision) -> Step {
        match decision {
            FlowDecision::Rethrow | FlowDecision::DefaultUnspecified => {
                Step::Propagate(original.clone())
            }
            FlowDecision::Continue => Step::Next,
            FlowDecision::Return(None) => Step::Handled(None),
            FlowDecision::Return(Some(value)) => {
                if site.result().accepts(&value) {
                    Step::Handled(Some(value))
                } else {
                    Step::Fatal(InterceptError::ReturnTypeMismatch {
                        expected: site.result().describe(),
                        actual: value.type_key().name().to_string(),
                    })
                }
            }
            FlowDecision::Throw(replacement) => Step::Propagate(replacement),
        }
    }

    /// Emit under the declaring type's sink, else the receiver type's sink.
    fn emit(
        &self,
        site: &CallSite,
        binding: &ResolvedBinding,
        receiver: Option<&Receiver>,
        arguments: &Arguments,
        failure: &Failure,
    ) {
        let descriptor = binding.descriptor();
        let named: Vec<(String, String)> = binding
            .log_targets()
            .iter()
            .filter_map(|(name, index)| arguments.get(*index).map(|v| (name.clone(), v.render())))
            .collect();

        let declared = site.id().declaring_type();
        let scope = match receiver.map(|r| r.type_key().name()) {
            Some(runtime) if !self.diagnostics.has_scope(declared) => runtime,
            _ => declared,
        };
        self.diagnostics.emit(
            scope,
            descriptor.level(),
            failure,
            descriptor.message_text(),
            &named,
        );
    }

    /// Run the first declared cleanup, if any.
    async fn run_cleanup(&self, bindings: &SiteBindings, arguments: &Arguments) -> Result<()> {
        let Some(cleanup) = bindings.as_slice().iter().find_map(ResolvedBinding::cleanup) else {
            return Ok(());
        };
        let fut = cleanup.invoke(arguments.clone());
        self.isolate(cleanup.routine(), fut).await
    }

    /// Await a routine according to the isolation setting.
    async fn isolate<T: Send + 'static>(
        &self,
        routine: &RoutineId,
        fut: BoxFuture<'static, Result<T>>,
    ) -> Result<T> {
        match self.config.handler_isolation {
            HandlerIsolation::Inline => fut.await,
            HandlerIsolation::Spawned => match tokio::spawn(fut).await {
                Ok(result) => result,
                Err(join) => Err(InterceptError::HandlerExecution {
                    routine: routine.clone(),
                    source: Failure::new(&categories::ABORTED, join.to_string()),
                }),
            },
        }
    }

    /// Combine the pre-cleanup outcome with the cleanup's own result.
    fn settle(
        &self,
        site: &CallSite,
        ctx: &mut InvocationContext,
        settled: Settled,
        cleanup: Result<()>,
    ) -> Result<Option<Value>> {
        let outcome = match (settled, cleanup) {
            (Settled::Completed, Ok(())) => Ok(ctx.take_result()),
            (Settled::Completed, Err(err)) => match self.config.cleanup_failure_policy {
                CleanupFailurePolicy::Supersede => Err(err),
                CleanupFailurePolicy::Suppress => {
                    tracing::warn!(site = %site.id(), error = %err, "cleanup failed, result kept");
                    Ok(ctx.take_result())
                }
            },
            (Settled::Propagating(failure), Ok(())) => Err(InterceptError::Guarded(failure)),
            (Settled::Propagating(failure), Err(err)) => {
                tracing::warn!(site = %site.id(), error = %err, "cleanup failed while a failure was propagating");
                Err(InterceptError::Guarded(failure))
            }
            (Settled::Fatal(fatal), Ok(())) => Err(fatal),
            (Settled::Fatal(fatal), Err(err)) => {
                tracing::warn!(site = %site.id(), error = %err, "cleanup failed after a dispatch defect");
                Err(fatal)
            }
        };

        let phase = if outcome.is_ok() {
            Phase::Completed
        } else {
            Phase::Propagating
        };
        tracing::trace!(site = %site.id(), phase = ?phase);
        outcome
    }
}

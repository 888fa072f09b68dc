//! Compensating-action sagas for multi-step flows that mix vendor calls and
//! local writes.
//!
//! These flows cannot be atomic: a vendor call, once made, is not undone by
//! any database rollback. Instead each step declares a typed compensation,
//! and when a later step fails the completed steps are compensated in reverse
//! order. Pure-database multi-writes should use a real transaction
//! ([`crate::repositories::transaction`]) instead of a saga.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Error;

/// One unit of work with an explicit undo action.
#[async_trait]
pub trait SagaStep: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<(), Error>;

    /// Undoes the externally visible effect of a completed `run`. Only called
    /// for steps that ran successfully before a later step failed.
    async fn compensate(&self) -> Result<(), Error>;
}

/// Bounded retry with exponential backoff applied to each step's `run`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// A failed saga: which step failed, and how far compensation got.
#[derive(Debug, thiserror::Error)]
#[error("saga '{saga}' failed at step '{step}': {source}")]
pub struct SagaFailure {
    pub saga: String,
    pub step: String,
    #[source]
    pub source: Error,
    /// Steps whose compensation ran, in execution order of the compensations.
    pub compensated: Vec<String>,
    /// Steps whose compensation itself failed; their effects are still live.
    pub compensation_failures: Vec<String>,
}

pub struct Saga {
    name: String,
    steps: Vec<Box<dyn SagaStep>>,
    retry: RetryPolicy,
}

impl Saga {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn step(mut self, step: impl SagaStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Runs every step in order. On the first step that fails (after
    /// retries), compensates the already-completed steps in reverse order and
    /// reports what happened. Compensation failures are logged and recorded,
    /// not retried.
    pub async fn execute(self) -> Result<(), SagaFailure> {
        for (index, step) in self.steps.iter().enumerate() {
            if let Err(error) = run_with_retry(step.as_ref(), &self.retry).await {
                tracing::warn!(
                    saga = %self.name,
                    step = step.name(),
                    %error,
                    "saga step failed, compensating completed steps"
                );

                let mut compensated = Vec::new();
                let mut compensation_failures = Vec::new();
                for done in self.steps[..index].iter().rev() {
                    match done.compensate().await {
                        Ok(()) => compensated.push(done.name().to_string()),
                        Err(undo_error) => {
                            tracing::error!(
                                saga = %self.name,
                                step = done.name(),
                                error = %undo_error,
                                "compensation failed, effect is still live"
                            );
                            compensation_failures.push(done.name().to_string());
                        }
                    }
                }

                return Err(SagaFailure {
                    saga: self.name,
                    step: step.name().to_string(),
                    source: error,
                    compensated,
                    compensation_failures,
                });
            }
            tracing::debug!(saga = %self.name, step = step.name(), "saga step completed");
        }
        Ok(())
    }
}

async fn run_with_retry(step: &dyn SagaStep, retry: &RetryPolicy) -> Result<(), Error> {
    let mut attempt = 0u32;
    loop {
        match step.run().await {
            Ok(()) => return Ok(()),
            Err(error) if attempt < retry.attempts => {
                attempt += 1;
                let delay = retry.delay_for(attempt);
                tracing::debug!(
                    step = step.name(),
                    attempt,
                    %error,
                    "saga step failed, retrying after {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

type StepFuture = Pin<Box<dyn Future<Output = Result<(), Error>> + Send>>;

/// Closure-backed [`SagaStep`] for flows that don't warrant a named type.
pub struct FnStep {
    name: String,
    run: Box<dyn Fn() -> StepFuture + Send + Sync>,
    undo: Box<dyn Fn() -> StepFuture + Send + Sync>,
}

impl FnStep {
    pub fn new<R, RF, C, CF>(name: impl Into<String>, run: R, undo: C) -> Self
    where
        R: Fn() -> RF + Send + Sync + 'static,
        RF: Future<Output = Result<(), Error>> + Send + 'static,
        C: Fn() -> CF + Send + Sync + 'static,
        CF: Future<Output = Result<(), Error>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(move || Box::pin(run()) as StepFuture),
            undo: Box::new(move || Box::pin(undo()) as StepFuture),
        }
    }
}

#[async_trait]
impl SagaStep for FnStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<(), Error> {
        (self.run)().await
    }

    async fn compensate(&self) -> Result<(), Error> {
        (self.undo)().await
    }
}

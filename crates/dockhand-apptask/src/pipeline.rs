// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Generic pipeline driver.
//!
//! A pipeline is an ordered list of [`PipelineStep`]s run strictly in
//! sequence against a context. The first failing step aborts the rest; there
//! is no undo. Progress steps persist a `"<percent>, <message>"` marker
//! before the heavy step they announce, so an interrupted run leaves an
//! accurate hint of where it stopped.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;
use crate::retry::RetryPolicy;

/// Future returned by a step function.
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A step body operating on the pipeline context.
pub type StepFn<C> = for<'a> fn(&'a mut C) -> StepFuture<'a>;

/// Persists pipeline progress.
#[async_trait]
pub trait ProgressReporter: Send {
    /// Record `"<percent>, <message>"`.
    async fn report_progress(&mut self, percent: u8, message: &str) -> Result<()>;
}

/// One entry of a pipeline.
pub enum PipelineStep<C> {
    /// Persist a progress marker.
    ReportProgress {
        /// Percentage shown to operators.
        percent: u8,
        /// Human readable description of the next step.
        message: String,
    },
    /// Mutate external resources and/or the app record.
    Mutate {
        /// Step name used in logs.
        name: &'static str,
        /// Step body.
        run: StepFn<C>,
    },
    /// Re-run `inner` while it fails with a transient error.
    Retry {
        /// Wrapped step.
        inner: Box<PipelineStep<C>>,
        /// Attempt budget.
        policy: RetryPolicy,
    },
}

impl<C> PipelineStep<C> {
    /// Name used in logs.
    pub fn name(&self) -> &str {
        match self {
            Self::ReportProgress { message, .. } => message.as_str(),
            Self::Mutate { name, .. } => *name,
            Self::Retry { inner, .. } => inner.name(),
        }
    }
}

impl<C> std::fmt::Debug for PipelineStep<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReportProgress { percent, message } => {
                write!(f, "ReportProgress({}, {:?})", percent, message)
            }
            Self::Mutate { name, .. } => write!(f, "Mutate({})", name),
            Self::Retry { inner, policy } => {
                write!(f, "Retry({:?}, {} attempts)", inner, policy.attempts)
            }
        }
    }
}

/// Ordered list of steps.
pub struct Pipeline<C> {
    name: &'static str,
    steps: Vec<PipelineStep<C>>,
}

impl<C: ProgressReporter> Pipeline<C> {
    /// Start an empty pipeline.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    /// Pipeline name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[PipelineStep<C>] {
        &self.steps
    }

    /// Append a progress marker.
    pub fn progress(mut self, percent: u8, message: impl Into<String>) -> Self {
        self.steps.push(PipelineStep::ReportProgress {
            percent,
            message: message.into(),
        });
        self
    }

    /// Append a mutation step.
    pub fn step(mut self, name: &'static str, run: StepFn<C>) -> Self {
        self.steps.push(PipelineStep::Mutate { name, run });
        self
    }

    /// Append a mutation step wrapped in a retry.
    pub fn retry(mut self, name: &'static str, run: StepFn<C>, policy: RetryPolicy) -> Self {
        self.steps.push(PipelineStep::Retry {
            inner: Box::new(PipelineStep::Mutate { name, run }),
            policy,
        });
        self
    }

    /// Apply `build` only when `condition` holds.
    pub fn when(self, condition: bool, build: impl FnOnce(Self) -> Self) -> Self {
        if condition { build(self) } else { self }
    }

    /// Run every step in order, stopping at the first error.
    pub async fn run(&self, ctx: &mut C) -> Result<()> {
        for step in &self.steps {
            if let Err(e) = run_step(step, ctx).await {
                warn!(
                    pipeline = self.name,
                    step = step.name(),
                    error = %e,
                    "Pipeline step failed"
                );
                return Err(e);
            }
        }
        debug!(pipeline = self.name, "Pipeline finished");
        Ok(())
    }
}

fn run_step<'s, 'c, C>(step: &'s PipelineStep<C>, ctx: &'c mut C) -> StepFuture<'c>
where
    's: 'c,
    C: ProgressReporter,
{
    Box::pin(async move {
        match step {
            PipelineStep::ReportProgress { percent, message } => {
                ctx.report_progress(*percent, message).await
            }
            PipelineStep::Mutate { name, run } => {
                debug!(step = *name, "Running step");
                (*run)(ctx).await
            }
            PipelineStep::Retry { inner, policy } => {
                let attempts = policy.attempts.max(1);
                let mut attempt = 1;
                loop {
                    match run_step(inner, &mut *ctx).await {
                        Ok(()) => return Ok(()),
                        Err(e) if attempt < attempts && e.is_transient() => {
                            warn!(
                                step = inner.name(),
                                attempt,
                                max_attempts = attempts,
                                error = %e,
                                "Transient step failure, retrying"
                            );
                            tokio::time::sleep(policy.interval).await;
                            attempt += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    })
}

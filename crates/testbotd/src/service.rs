//! Service context and push dispatch.
//!
//! A single [`BotContext`] is built at startup and shared by every request.
//! It owns the configuration, the run gate, the pipeline and the reporter.

use crate::config::BotConfig;
use crate::notify::{Reporter, WebhookNotifier};
use crate::push::PushEvent;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use testbot_ci::{CommandRunner, GateOutcome, Pipeline, ProcessRunner, RunGate};
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

/// What the listener did with an inbound push.
#[derive(Debug)]
pub enum Dispatch {
    /// Undecodable body or wrong commit count; a rejection was reported.
    Rejected,

    /// Push to a ref other than the mainline; nothing happens.
    Ignored,

    /// A run task was spawned.
    Spawned(JoinHandle<()>),
}

pub struct BotContext {
    config: BotConfig,
    pipeline: Pipeline,
    gate: RunGate,
    reporter: Reporter,
}

impl BotContext {
    pub fn new(config: BotConfig, runner: Arc<dyn CommandRunner>, reporter: Reporter) -> Self {
        let pipeline = Pipeline::new(runner, config.pipeline.clone());
        Self {
            config,
            pipeline,
            gate: RunGate::new(),
            reporter,
        }
    }

    /// Production wiring: real processes and the configured chat webhook.
    pub fn from_config(config: BotConfig) -> Self {
        let reporter = match &config.webhook_url {
            Some(url) => Reporter::new(Arc::new(WebhookNotifier::new(url.clone()))),
            None => {
                warn!("SLACK_WEBHOOK_URL not set; notifications will only be logged");
                Reporter::disabled()
            }
        };
        Self::new(config, Arc::new(ProcessRunner), reporter)
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Validate a raw push body and start a run when it targets the mainline.
    ///
    /// Rejections are reported before returning. Accepted pushes run on their
    /// own task; the caller never waits for the outcome.
    pub async fn handle_push(self: &Arc<Self>, body: &[u8]) -> Dispatch {
        let push = match PushEvent::from_body(body) {
            Ok(push) => push,
            Err(e) => {
                warn!(error = %e, "rejecting push");
                self.reporter.reject(&e.to_string()).await;
                return Dispatch::Rejected;
            }
        };

        info!(git_ref = %push.git_ref, "ref pushed");
        if push.git_ref != self.config.mainline_ref {
            return Dispatch::Ignored;
        }

        let ctx = Arc::clone(self);
        Dispatch::Spawned(tokio::spawn(ctx.run_push(push)))
    }

    /// One run: wait for the gate, execute the pipeline, report.
    ///
    /// A panic anywhere in the run is caught here so it never reaches the listener.
    async fn run_push(self: Arc<Self>, push: PushEvent) {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("testbot.run", run_id = %run_id, commit = %push.short_sha());

        async move {
            if self.gate.is_busy() {
                info!("another run is in progress; queueing behind it");
            }
            let run = self.gate.run(self.pipeline.execute(&push.after));
            match AssertUnwindSafe(run).catch_unwind().await {
                Ok(GateOutcome::Ran(outcome)) => {
                    info!(passed = outcome.passed(), "run finished");
                    self.reporter.report(&outcome, &push).await;
                }
                Ok(GateOutcome::Superseded) => {
                    info!("superseded by a newer push; not running");
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(
                        git_ref = %push.git_ref,
                        commit = %push.after,
                        error = %message,
                        "run aborted by internal error"
                    );
                    self.reporter.internal_error(&message, &push).await;
                }
            }
        }
        .instrument(span)
        .await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

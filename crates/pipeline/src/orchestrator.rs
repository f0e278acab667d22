//! Streaming job orchestrator.
//!
//! Drives one request through its provider chain as an explicit state
//! machine:
//!
//! ```text
//! Selecting -> Running(i) -> Succeeded
//!                         -> Advancing(i + 1) -> Running(i + 1)
//!                         -> Exhausted
//! ```
//!
//! Events go to an `mpsc` sink in creation order: one `start`, then
//! `progress`/`fallback`, then exactly one `complete` or `error`. A closed
//! sink means the client went away; the orchestrator stops writing and
//! leaves any in-flight provider to finish on its own.

use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use tokio::sync::mpsc;
use upscaler_core::chain::ProviderDescriptor;
use upscaler_core::error::CoreError;
use upscaler_core::events::StreamEvent;
use upscaler_core::outcome::JobOutcome;
use upscaler_core::request::UpscaleParams;
use upscaler_core::types::ImageSize;
use upscaler_providers::codec::{encode_png_base64, size_of};
use upscaler_providers::resample::resize_exact;
use upscaler_providers::{ProviderCatalog, ProviderError};

use crate::executor::execute;
use crate::relay::{progress_relay, RelayPoll, DEFAULT_RELAY_CAPACITY};

/// Default relay poll timeout.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How long one relay poll waits before looping.
    pub poll_interval: Duration,
    /// Queue capacity of each per-attempt relay.
    pub relay_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            relay_capacity: DEFAULT_RELAY_CAPACITY,
        }
    }
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// How a run ended, from the server's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// `complete` was emitted.
    Completed { method: String, attempts: usize },
    /// `error` was emitted.
    Exhausted { error: String },
    /// The client disconnected before the terminal event.
    Disconnected,
}

enum State {
    Running(usize),
    Succeeded { method: String, attempts: usize },
    Exhausted(String),
}

/// A provider attempt as seen by the state machine.
enum Attempt {
    Finished(JobOutcome<FinalImage>),
    Disconnected,
}

/// Result image resampled to the exact target and encoded for the wire.
struct FinalImage {
    encoded: String,
    size: ImageSize,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run `chain` against `image` and write every event to `sink`.
    pub async fn run(
        &self,
        image: Arc<DynamicImage>,
        params: UpscaleParams,
        chain: Vec<ProviderDescriptor>,
        catalog: Arc<dyn ProviderCatalog>,
        sink: mpsc::Sender<StreamEvent>,
    ) -> RunOutcome {
        let original_size = size_of(&image);
        let target = original_size.scaled(params.scale);

        if !emit(&sink, StreamEvent::Start { original_size }).await {
            return disconnected();
        }

        let mut state = if chain.is_empty() {
            State::Exhausted("no upscaling providers available".to_string())
        } else {
            State::Running(0)
        };

        loop {
            state = match state {
                State::Running(index) => {
                    let descriptor = &chain[index];
                    tracing::debug!(
                        attempt = index + 1,
                        provider = %descriptor.label,
                        tier = %descriptor.tier,
                        "Starting provider attempt",
                    );

                    let attempt = self
                        .attempt(descriptor, &image, &params, target, catalog.as_ref(), &sink)
                        .await;

                    match attempt {
                        Attempt::Disconnected => return disconnected(),
                        Attempt::Finished(JobOutcome::Success { image: done, elapsed }) => {
                            tracing::info!(
                                method = %descriptor.label,
                                elapsed_ms = elapsed.as_millis() as u64,
                                original = %original_size,
                                upscaled = %done.size,
                                "Upscale complete",
                            );
                            let complete = StreamEvent::Complete {
                                image: done.encoded,
                                original_size,
                                upscaled_size: done.size,
                                method: descriptor.label.clone(),
                            };
                            if !emit(&sink, complete).await {
                                return disconnected();
                            }
                            State::Succeeded {
                                method: descriptor.label.clone(),
                                attempts: index + 1,
                            }
                        }
                        Attempt::Finished(JobOutcome::Failure { cause, .. }) => {
                            if index + 1 < chain.len() {
                                tracing::warn!(
                                    provider = %descriptor.label,
                                    next = %chain[index + 1].label,
                                    cause = %cause,
                                    "Provider failed, falling back",
                                );
                                if !emit(&sink, StreamEvent::Fallback { reason: cause }).await {
                                    return disconnected();
                                }
                                State::Running(index + 1)
                            } else {
                                State::Exhausted(cause)
                            }
                        }
                    }
                }
                State::Succeeded { method, attempts } => {
                    return RunOutcome::Completed { method, attempts };
                }
                State::Exhausted(cause) => {
                    let error = CoreError::ChainExhausted(cause).to_string();
                    tracing::error!(error = %error, "Provider chain exhausted");
                    if !emit(&sink, StreamEvent::Error { error: error.clone() }).await {
                        return disconnected();
                    }
                    return RunOutcome::Exhausted { error };
                }
            };
        }
    }

    /// Run the chain and return only its terminal event.
    ///
    /// Used by clients that cannot consume a stream.
    pub async fn run_to_terminal(
        &self,
        image: Arc<DynamicImage>,
        params: UpscaleParams,
        chain: Vec<ProviderDescriptor>,
        catalog: Arc<dyn ProviderCatalog>,
    ) -> Option<StreamEvent> {
        let (tx, mut rx) = mpsc::channel::<StreamEvent>(self.config.relay_capacity.max(1));
        let collect = async move {
            let mut terminal = None;
            while let Some(event) = rx.recv().await {
                if event.is_terminal() {
                    terminal = Some(event);
                }
            }
            terminal
        };
        let (_, terminal) = tokio::join!(self.run(image, params, chain, catalog, tx), collect);
        terminal
    }

    /// Running(i): one provider invocation with its own relay.
    async fn attempt(
        &self,
        descriptor: &ProviderDescriptor,
        image: &Arc<DynamicImage>,
        params: &UpscaleParams,
        target: ImageSize,
        catalog: &dyn ProviderCatalog,
        sink: &mpsc::Sender<StreamEvent>,
    ) -> Attempt {
        let Some(provider) = catalog.provider(descriptor.tier) else {
            return Attempt::Finished(JobOutcome::failure(
                ProviderError::Unavailable(descriptor.tier).to_string(),
            ));
        };

        let (publisher, mut relay) = progress_relay(self.config.relay_capacity);
        let job = execute(provider, Arc::clone(image), params.clone(), publisher);
        tokio::pin!(job);
        let mut relay_open = true;

        let outcome = loop {
            tokio::select! {
                biased;

                _ = sink.closed() => return Attempt::Disconnected,

                outcome = &mut job => break outcome,

                polled = relay.poll(self.config.poll_interval), if relay_open => match polled {
                    RelayPoll::Event(event) => {
                        if !emit(sink, StreamEvent::from(event)).await {
                            return Attempt::Disconnected;
                        }
                    }
                    RelayPoll::Timeout => {}
                    RelayPoll::Closed => relay_open = false,
                },
            }
        };

        // Progress queued before the outcome still precedes it on the wire.
        for event in relay.drain() {
            if !emit(sink, StreamEvent::from(event)).await {
                return Attempt::Disconnected;
            }
        }

        match outcome {
            JobOutcome::Success { image: output, elapsed } => {
                Attempt::Finished(match finalize(output, target).await {
                    Ok(done) => JobOutcome::success(done, elapsed),
                    Err(cause) => JobOutcome::failure(cause),
                })
            }
            JobOutcome::Failure {
                cause,
                kind,
                retryable,
            } => Attempt::Finished(JobOutcome::Failure {
                cause,
                kind,
                retryable,
            }),
        }
    }
}

/// Resample to exactly `target` when the provider missed it, then encode
/// as base64 PNG. Runs on a blocking worker.
async fn finalize(output: DynamicImage, target: ImageSize) -> Result<FinalImage, String> {
    let result = tokio::task::spawn_blocking(move || {
        let actual = size_of(&output);
        let exact = if actual == target {
            output
        } else {
            tracing::debug!(from = %actual, to = %target, "Resampling provider output to target size");
            resize_exact(&output, target)
        };
        encode_png_base64(&exact).map(|encoded| FinalImage {
            encoded,
            size: size_of(&exact),
        })
    })
    .await;

    match result {
        Ok(Ok(done)) => Ok(done),
        Ok(Err(e)) => Err(format!("Failed to encode result: {e}")),
        Err(e) => Err(format!("Result encoding worker failed: {e}")),
    }
}

/// Write one event; `false` once the client is gone.
async fn emit(sink: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
    sink.send(event).await.is_ok()
}

fn disconnected() -> RunOutcome {
    tracing::info!("Client disconnected, stopping event relay");
    RunOutcome::Disconnected
}

//! Runs one provider invocation on a blocking worker.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;
use upscaler_core::outcome::JobOutcome;
use upscaler_core::request::UpscaleParams;
use upscaler_providers::{ProviderError, UpscaleProvider};

use crate::relay::RelayPublisher;

/// Execute `provider` once and produce its [`JobOutcome`].
///
/// The provider runs on tokio's blocking pool, so the awaiting task stays
/// free to poll the relay. Errors, panics and lost workers all become a
/// retryable `Failure`. Dropping the returned future does not stop the
/// provider: it runs to completion and its result is discarded.
pub async fn execute(
    provider: Arc<dyn UpscaleProvider>,
    image: Arc<DynamicImage>,
    params: UpscaleParams,
    mut publisher: RelayPublisher,
) -> JobOutcome<DynamicImage> {
    let label = provider.label();
    let worker = tokio::task::spawn_blocking(move || {
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            provider.invoke(&image, &params, &mut |event| {
                publisher.publish(event);
            })
        }));
        tracing::debug!(dropped = publisher.dropped(), "Provider progress relay finished");

        match result {
            Ok(Ok(output)) => JobOutcome::success(output, started.elapsed()),
            Ok(Err(e)) => JobOutcome::failure(e.to_string()),
            Err(payload) => JobOutcome::failure(
                ProviderError::Panicked(panic_message(payload.as_ref())).to_string(),
            ),
        }
    });

    match worker.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(provider = %label, error = %e, "Provider worker lost");
            JobOutcome::failure(format!("Provider worker failed: {e}"))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

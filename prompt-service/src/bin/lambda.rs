//! Function runtime entrypoint.
//!
//! The invocation payload is handed to the handler as-is; the result is
//! returned in proxy-integration shape. Handler errors are reported to the
//! runtime as invocation failures without a custom body.

use lambda_runtime::{service_fn, Error, LambdaEvent};
use prompt_service::config::PromptConfig;
use prompt_service::startup::build_handler;
use serde_json::Value;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = PromptConfig::load()?;

    init_tracing(
        "prompt-lambda",
        &config.observability.log_level,
        config.observability.otlp_endpoint.as_deref(),
    )?;

    let handler = build_handler(&config).await?;
    let handler = &handler;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        tracing::info!(request_id = %event.context.request_id, "Received invocation");
        Ok::<Value, Error>(handler.handle_proxy(&event.payload).await?)
    }))
    .await
}

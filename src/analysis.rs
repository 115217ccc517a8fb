use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::errors::AnalysisError;
use crate::llm_client::{CompletionRequest, ModelInvoker};
use crate::models::{AnalysisInput, AnalysisResult};
use crate::normalizer::normalize;
use crate::validator::validate;

/// Runs one scan: normalize, invoke the model once, validate.
#[derive(Clone)]
pub struct AnalysisService {
    invoker: Arc<dyn ModelInvoker>,
    deadline: Duration,
    structured_output: bool,
}

impl AnalysisService {
    /// # Arguments
    ///
    /// * `invoker` - Backend that talks to the model.
    /// * `deadline` - Upper bound for the model call.
    /// * `structured_output` - Send the result schema with the request.
    pub fn new(invoker: Arc<dyn ModelInvoker>, deadline: Duration, structured_output: bool) -> Self {
        Self {
            invoker,
            deadline,
            structured_output,
        }
    }

    pub async fn analyze(&self, input: &AnalysisInput) -> Result<AnalysisResult, AnalysisError> {
        self.analyze_with_cancel(input, &CancellationToken::new())
            .await
    }

    /// Like [`analyze`](Self::analyze), but gives up as soon as `cancel` fires.
    ///
    /// Invalid input fails before the model is contacted. The model call is
    /// bounded by the service deadline; expiry is reported as a transport error.
    pub async fn analyze_with_cancel(
        &self,
        input: &AnalysisInput,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let span = tracing::info_span!(
            "analysis",
            request_id = %Uuid::new_v4(),
            kind = input.kind()
        );

        async move {
            let prompt = normalize(input)?;
            let request = CompletionRequest::new(prompt, self.structured_output);
            let started = std::time::Instant::now();

            let raw = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Scan abandoned by caller");
                    return Err(AnalysisError::Cancelled);
                }
                outcome = tokio::time::timeout(self.deadline, self.invoker.invoke(&request)) => {
                    match outcome {
                        Ok(result) => result?,
                        Err(_) => {
                            tracing::warn!("Model call exceeded {:?}", self.deadline);
                            return Err(AnalysisError::Transport(format!(
                                "model did not answer within {} seconds",
                                self.deadline.as_secs()
                            )));
                        }
                    }
                }
            };

            let result = validate(&raw)?;
            tracing::info!(
                "✓ Analysis complete for {} (score {}, {:?}) in {}ms",
                result.company_name,
                result.risk_score,
                result.verdict,
                started.elapsed().as_millis()
            );
            Ok::<_, AnalysisError>(result)
        }
        .instrument(span)
        .await
    }
}

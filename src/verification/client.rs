use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Url};

use crate::{
    error::VerificationError,
    settings::VerificationSettings,
};

use super::models::{ServerErrorBody, VerificationRequest, VerificationResponse};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Remote judge deciding whether a break was earned.
///
/// One attempt per call. Retrying is the user's decision.
#[async_trait]
pub trait ProgressVerifier: Send + Sync {
    async fn verify(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationResponse, VerificationError>;
}

/// POSTs the request as JSON to the configured endpoint.
#[derive(Clone)]
pub struct HttpVerifier {
    client: Client,
    endpoint: Option<String>,
    timeout: Duration,
}

impl HttpVerifier {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<Self, VerificationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| VerificationError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    pub fn from_settings(settings: &VerificationSettings) -> Result<Self, VerificationError> {
        let verifier = Self::new(
            settings.endpoint(),
            Duration::from_secs(settings.timeout_secs),
        )?;
        log_info!("{}", settings.configuration_status());
        Ok(verifier)
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    fn resolve_endpoint(&self) -> Result<Url, VerificationError> {
        let raw = self
            .endpoint
            .as_deref()
            .ok_or(VerificationError::NotConfigured)?;
        Url::parse(raw).map_err(|_| VerificationError::InvalidEndpoint(raw.to_string()))
    }

    fn map_transport(&self, err: reqwest::Error) -> VerificationError {
        if err.is_timeout() {
            VerificationError::Timeout(self.timeout.as_secs())
        } else {
            VerificationError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl ProgressVerifier for HttpVerifier {
    async fn verify(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationResponse, VerificationError> {
        let url = self.resolve_endpoint()?;
        log_debug!(
            "verifying progress: {} delta chars, note {} chars",
            request.scraped_text_delta.len(),
            request.user_progress_note.len()
        );

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|err| self.map_transport(err))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| self.map_transport(err))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ServerErrorBody>(&body)
                .ok()
                .map(|parsed| parsed.error);
            log_warn!("verification rejected with HTTP {}: {:?}", status.as_u16(), message);
            return Err(VerificationError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: VerificationResponse = serde_json::from_slice(&body).map_err(|err| {
            log_error!(
                "failed to decode verification response: {err}; body: {}",
                String::from_utf8_lossy(&body)
            );
            VerificationError::MalformedBody(err.to_string())
        })?;

        if !parsed.score_in_range() {
            log_error!("verification score {} outside 0.0-1.0", parsed.score);
            return Err(VerificationError::ScoreOutOfRange(parsed.score));
        }

        log_info!(
            "verification result: score={:.2} allow_break={}",
            parsed.score,
            parsed.allow_break
        );
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SessionProgressState;
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn request() -> VerificationRequest {
        let state = SessionProgressState::new("Finish report");
        VerificationRequest::from_state(&state, "Wrote 3 paragraphs", "Wrote 3 paragraphs".into())
    }

    async fn verifier_for(server: &MockServer) -> HttpVerifier {
        HttpVerifier::new(
            Some(format!("{}/verify-progress", server.uri())),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn posts_json_and_parses_decision() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify-progress"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({
                "sessionGoal": "Finish report",
                "sessionStateSummary": "Session just started. No progress has been made yet.",
                "userProgressNote": "Wrote 3 paragraphs",
                "scrapedTextDelta": "Wrote 3 paragraphs",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "score": 0.65,
                "allowBreak": true,
                "reason": "Solid start.",
                "updatedSummary": "Three paragraphs drafted.",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = verifier_for(&server).await.verify(&request()).await.unwrap();
        assert_eq!(response.score, 0.65);
        assert!(response.allow_break);
        assert_eq!(response.updated_summary, "Three paragraphs drafted.");
    }

    #[tokio::test]
    async fn missing_endpoint_is_a_configuration_error() {
        let verifier = HttpVerifier::new(None, Duration::from_secs(1)).unwrap();
        let err = verifier.verify(&request()).await.unwrap_err();
        assert!(matches!(err, VerificationError::NotConfigured));
    }

    #[tokio::test]
    async fn unparsable_endpoint_is_rejected() {
        let verifier =
            HttpVerifier::new(Some("not a url".into()), Duration::from_secs(1)).unwrap();
        let err = verifier.verify(&request()).await.unwrap_err();
        assert!(matches!(err, VerificationError::InvalidEndpoint(_)));
    }

    #[tokio::test]
    async fn server_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(json!({"error": "judge unavailable"})),
            )
            .mount(&server)
            .await;

        let err = verifier_for(&server).await.verify(&request()).await.unwrap_err();
        assert_eq!(err.to_string(), "server error: judge unavailable");
    }

    #[tokio::test]
    async fn server_error_without_body_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = verifier_for(&server).await.verify(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            VerificationError::Server {
                status: 500,
                message: None
            }
        ));
        assert_eq!(err.to_string(), "HTTP 500");
    }

    #[tokio::test]
    async fn out_of_range_score_is_a_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "score": 1.5,
                "allowBreak": true,
                "reason": "?",
                "updatedSummary": "?",
            })))
            .mount(&server)
            .await;

        let err = verifier_for(&server).await.verify(&request()).await.unwrap_err();
        assert!(matches!(err, VerificationError::ScoreOutOfRange(score) if score == 1.5));
    }

    #[tokio::test]
    async fn missing_field_is_a_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "score": 0.9,
                "allowBreak": true,
            })))
            .mount(&server)
            .await;

        let err = verifier_for(&server).await.verify(&request()).await.unwrap_err();
        assert!(matches!(err, VerificationError::MalformedBody(_)));
    }

    #[tokio::test]
    async fn slow_judge_times_out_as_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_json(json!({
                        "score": 0.9,
                        "allowBreak": true,
                        "reason": "",
                        "updatedSummary": "",
                    })),
            )
            .mount(&server)
            .await;

        let verifier = HttpVerifier::new(
            Some(format!("{}/verify-progress", server.uri())),
            Duration::from_millis(200),
        )
        .unwrap();
        let err = verifier.verify(&request()).await.unwrap_err();
        assert!(matches!(err, VerificationError::Timeout(_)));
    }
}

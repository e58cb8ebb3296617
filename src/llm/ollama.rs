// src/llm/ollama.rs

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::error::{ChangelogError, Result};
use crate::llm::prompt::GenerationRequest;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const LISTING_TIMEOUT: Duration = Duration::from_secs(5);
const PULL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub text: String,
}

/// Anything that can turn a prompt into text.
pub trait TextGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult>;
}

/// Blocking client for a local Ollama server.
pub struct OllamaClient {
    http: Client,
    generate_url: Url,
    tags_url: Url,
    pull_url: Url,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    #[serde(default)]
    name: String,
}

impl OllamaClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(cfg.request_timeout())
            .build()
            .map_err(|e| ChangelogError::Config(format!("http client: {}", e)))?;

        Ok(Self {
            http,
            generate_url: cfg.generate_url()?,
            tags_url: cfg.tags_url()?,
            pull_url: cfg.pull_url()?,
            timeout_secs: cfg.request_timeout_secs,
        })
    }

    /// True when the tags endpoint answers with a success status.
    pub fn is_running(&self) -> bool {
        self.http
            .get(self.tags_url.clone())
            .timeout(PROBE_TIMEOUT)
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    pub fn installed_models(&self) -> Result<Vec<String>> {
        let resp = self
            .http
            .get(self.tags_url.clone())
            .timeout(LISTING_TIMEOUT)
            .send()
            .map_err(|e| self.classify(e, &self.tags_url))?;

        let body = read_success_body(resp, |e| self.classify(e, &self.tags_url))?;
        let tags: TagsResponse = serde_json::from_str(&body)
            .map_err(|e| ChangelogError::MalformedServiceResponse(e.to_string()))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    pub fn has_model(&self, model: &str) -> Result<bool> {
        Ok(self
            .installed_models()?
            .iter()
            .any(|name| model_matches(name, model)))
    }

    /// Downloads `model`. Blocks until the server reports completion.
    pub fn pull(&self, model: &str) -> Result<()> {
        info!(model, "pulling model, this is a one-time download");

        let resp = self
            .http
            .post(self.pull_url.clone())
            .timeout(PULL_TIMEOUT)
            .json(&serde_json::json!({ "name": model, "stream": false }))
            .send()
            .map_err(|e| self.classify(e, &self.pull_url))?;

        let body = read_success_body(resp, |e| self.classify(e, &self.pull_url))?;
        let json: Value = serde_json::from_str(&body)
            .map_err(|e| ChangelogError::MalformedServiceResponse(e.to_string()))?;

        match json.get("status").and_then(Value::as_str) {
            Some("success") => Ok(()),
            Some(other) => Err(ChangelogError::MalformedServiceResponse(format!(
                "pull finished with status '{}'",
                other
            ))),
            None => Err(ChangelogError::MalformedServiceResponse(
                "pull response has no status".into(),
            )),
        }
    }

    fn classify(&self, e: reqwest::Error, url: &Url) -> ChangelogError {
        if e.is_timeout() {
            ChangelogError::ServiceTimeout {
                secs: self.timeout_secs,
            }
        } else if e.is_decode() || e.is_body() {
            ChangelogError::MalformedServiceResponse(e.to_string())
        } else {
            ChangelogError::ServiceUnreachable {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

impl TextGenerator for OllamaClient {
    fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        debug!(model = %request.model, chars = request.prompt.len(), "sending generation request");

        let resp = self
            .http
            .post(self.generate_url.clone())
            .json(request)
            .send()
            .map_err(|e| self.classify(e, &self.generate_url))?;

        let body = read_success_body(resp, |e| self.classify(e, &self.generate_url))?;
        let text = extract_text(&body)?;

        if text.is_empty() {
            return Err(ChangelogError::EmptyGeneration);
        }
        Ok(GenerationResult { text })
    }
}

fn read_success_body(
    resp: reqwest::blocking::Response,
    classify: impl Fn(reqwest::Error) -> ChangelogError,
) -> Result<String> {
    let status = resp.status();
    let body = resp.text().map_err(classify)?;

    if !status.is_success() {
        return Err(ChangelogError::ServiceStatus {
            status: status.as_u16(),
            body: one_line(&body),
        });
    }
    Ok(body)
}

fn extract_text(body: &str) -> Result<String> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| ChangelogError::MalformedServiceResponse(e.to_string()))?;

    json.get("response")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| {
            ChangelogError::MalformedServiceResponse("missing `response` text field".into())
        })
}

/// `phi3:mini` matches itself, `phi3` matches `phi3:latest` or any `phi3:<tag>`.
pub fn model_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted
        || installed
            .strip_prefix(wanted)
            .is_some_and(|rest| rest.starts_with(':'))
}

fn one_line(s: &str) -> String {
    let line = s.lines().next().unwrap_or("");
    if line.chars().count() > 180 {
        let mut x: String = line.chars().take(180).collect();
        x.push_str("...");
        x
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(uri: &str) -> Config {
        Config {
            base_url: uri.to_string(),
            request_timeout_secs: 1,
            ..Config::default()
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: "phi3:mini".into(),
            prompt: "Code changes:\n\n+x".into(),
            stream: false,
        }
    }

    async fn blocking<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
        tokio::task::spawn_blocking(f).await.unwrap()
    }

    #[test]
    fn model_name_matching() {
        assert!(model_matches("phi3:mini", "phi3:mini"));
        assert!(model_matches("phi3:latest", "phi3"));
        assert!(model_matches("phi3:medium", "phi3"));
        assert!(!model_matches("phi3mini", "phi3"));
        assert!(!model_matches("mistral:latest", "phi3"));
        assert!(!model_matches("phi3:mini", "phi3:medium"));
    }

    #[test]
    fn refused_connection_is_unreachable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = OllamaClient::new(&config_for(&format!("http://127.0.0.1:{}", port))).unwrap();

        let err = client.generate(&request()).unwrap_err();
        assert!(matches!(err, ChangelogError::ServiceUnreachable { .. }), "{:?}", err);
        assert!(!client.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn generate_returns_trimmed_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({ "model": "phi3:mini", "stream": false })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "response": "  feat: add login\n", "done": true })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cfg = config_for(&server.uri());
        let result = blocking(move || OllamaClient::new(&cfg).unwrap().generate(&request())).await;
        assert_eq!(result.unwrap().text, "feat: add login");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_generation_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "   " })))
            .mount(&server)
            .await;

        let cfg = config_for(&server.uri());
        let result = blocking(move || OllamaClient::new(&cfg).unwrap().generate(&request())).await;
        assert!(matches!(result, Err(ChangelogError::EmptyGeneration)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_bodies_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "feat: x" })))
            .mount(&server)
            .await;

        let cfg = config_for(&server.uri());
        let (first, second) = blocking(move || {
            let client = OllamaClient::new(&cfg).unwrap();
            (client.generate(&request()), client.generate(&request()))
        })
        .await;

        assert!(matches!(first, Err(ChangelogError::MalformedServiceResponse(_))));
        assert!(matches!(second, Err(ChangelogError::MalformedServiceResponse(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn error_status_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "error": "model not found" })),
            )
            .mount(&server)
            .await;

        let cfg = config_for(&server.uri());
        let result = blocking(move || OllamaClient::new(&cfg).unwrap().generate(&request())).await;
        match result {
            Err(ChangelogError::ServiceStatus { status, body }) => {
                assert_eq!(status, 404);
                assert!(body.contains("model not found"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "response": "feat: late" }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let cfg = config_for(&server.uri());
        let result = blocking(move || OllamaClient::new(&cfg).unwrap().generate(&request())).await;
        assert!(matches!(result, Err(ChangelogError::ServiceTimeout { secs: 1 })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tags_listing_drives_availability() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [ { "name": "mistral:latest" }, { "name": "phi3:mini" } ]
            })))
            .mount(&server)
            .await;

        let cfg = config_for(&server.uri());
        let (running, phi, mistral, llama) = blocking(move || {
            let client = OllamaClient::new(&cfg).unwrap();
            (
                client.is_running(),
                client.has_model("phi3:mini").unwrap(),
                client.has_model("mistral").unwrap(),
                client.has_model("llama3").unwrap(),
            )
        })
        .await;

        assert!(running);
        assert!(phi);
        assert!(mistral);
        assert!(!llama);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pull_posts_model_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .and(body_partial_json(json!({ "name": "phi3:mini", "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
            .expect(1)
            .mount(&server)
            .await;

        let cfg = config_for(&server.uri());
        let result = blocking(move || OllamaClient::new(&cfg).unwrap().pull("phi3:mini")).await;
        assert!(result.is_ok());
    }
}

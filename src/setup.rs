// src/setup.rs

//! Pre-flight checks against the Ollama server.
//!
//! Installing Ollama itself is left to the operator; this only confirms
//! the server answers and the configured model is present, pulling it
//! when allowed.

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{ChangelogError, Result};
use crate::llm::ollama::OllamaClient;
use crate::pipeline::Confirm;

pub fn ensure_ready(
    client: &OllamaClient,
    cfg: &Config,
    unattended: bool,
    confirm: &mut dyn Confirm,
) -> Result<()> {
    if !client.is_running() {
        return Err(ChangelogError::ServiceUnreachable {
            url: cfg.tags_url()?.to_string(),
            reason: "no answer from the tags endpoint".into(),
        });
    }
    info!("Ollama service is running");

    if client.has_model(&cfg.model)? {
        info!(model = %cfg.model, "model is ready");
        return Ok(());
    }

    warn!(model = %cfg.model, "model is not installed");
    if !unattended && !confirm.confirm(&format!("Download '{}' model now?", cfg.model)) {
        return Err(ChangelogError::ModelUnavailable(cfg.model.clone()));
    }

    client.pull(&cfg.model)?;
    info!(model = %cfg.model, "model downloaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::Answers;

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_with_models(models: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": models })))
            .mount(&server)
            .await;
        server
    }

    fn config_for(server: &MockServer) -> Config {
        Config {
            base_url: server.uri(),
            ..Config::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ready_when_model_listed() {
        let server = server_with_models(json!([{ "name": "phi3:mini" }])).await;
        let cfg = config_for(&server);

        let result = tokio::task::spawn_blocking(move || {
            let client = OllamaClient::new(&cfg).unwrap();
            ensure_ready(&client, &cfg, false, &mut Answers::new(&[]))
        })
        .await
        .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn declined_download_reports_missing_model() {
        let server = server_with_models(json!([])).await;
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
            .expect(0)
            .mount(&server)
            .await;
        let cfg = config_for(&server);

        let result = tokio::task::spawn_blocking(move || {
            let client = OllamaClient::new(&cfg).unwrap();
            ensure_ready(&client, &cfg, false, &mut Answers::new(&[false]))
        })
        .await
        .unwrap();
        assert!(matches!(result, Err(ChangelogError::ModelUnavailable(m)) if m == "phi3:mini"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unattended_pulls_missing_model() {
        let server = server_with_models(json!([{ "name": "mistral:latest" }])).await;
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
            .expect(1)
            .mount(&server)
            .await;
        let cfg = config_for(&server);

        let result = tokio::task::spawn_blocking(move || {
            let client = OllamaClient::new(&cfg).unwrap();
            ensure_ready(&client, &cfg, true, &mut Answers::new(&[]))
        })
        .await
        .unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn stopped_service_is_unreachable() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let cfg = Config {
            base_url: format!("http://127.0.0.1:{}", port),
            ..Config::default()
        };
        let client = OllamaClient::new(&cfg).unwrap();

        let err = ensure_ready(&client, &cfg, true, &mut Answers::new(&[])).unwrap_err();
        assert!(matches!(err, ChangelogError::ServiceUnreachable { .. }));
    }
}

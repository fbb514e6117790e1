//! 分诊决策服务HTTP客户端
//!
//! 通过HTTP把患者/医护快照提交给外部决策服务，并登记新患者：
//! - `POST {endpoint}/triage`：`{patients, staff}` -> `{result: {...}}` 或裸结果
//! - `POST {endpoint}/patient`：登记输入 -> `{patient: {...}}` 或裸记录

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use triage_core::{Patient, PatientInput, Result, Staff, TriageError, TriageResult};
use triage_workflow::DecisionClient;

/// 决策服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionServiceConfig {
    pub endpoint: String,
    pub authentication: AuthenticationConfig,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for DecisionServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000".to_string(),
            authentication: AuthenticationConfig::None,
            request_timeout_secs: 10,
        }
    }
}

/// 认证配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthenticationConfig {
    None,
    BasicAuth { username: String, password: String },
    ApiKey { key: String, header: Option<String> },
    BearerToken { token: String },
}

#[derive(Serialize)]
struct TriageRequest<'a> {
    patients: &'a [Patient],
    staff: &'a [Staff],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TriageEnvelope {
    Wrapped { result: TriageResult },
    Bare(TriageResult),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntakeEnvelope {
    Wrapped { patient: Patient },
    Bare(Patient),
}

/// 解析决策服务返回的分诊结果，包裹与裸结果两种形式均可
pub fn parse_triage_response(body: &str) -> Result<TriageResult> {
    match serde_json::from_str::<TriageEnvelope>(body) {
        Ok(TriageEnvelope::Wrapped { result }) => Ok(result),
        Ok(TriageEnvelope::Bare(result)) => Ok(result),
        Err(e) => Err(TriageError::DecisionMalformed(format!(
            "undecodable triage response: {}",
            e
        ))),
    }
}

/// 解析登记服务返回的患者记录，包裹与裸记录两种形式均可
pub fn parse_intake_response(body: &str) -> Result<Patient> {
    match serde_json::from_str::<IntakeEnvelope>(body) {
        Ok(IntakeEnvelope::Wrapped { patient }) => Ok(patient),
        Ok(IntakeEnvelope::Bare(patient)) => Ok(patient),
        Err(e) => Err(TriageError::IntakeRejected(format!(
            "undecodable intake response: {}",
            e
        ))),
    }
}

/// 决策服务HTTP客户端
#[derive(Debug, Clone)]
pub struct HttpDecisionClient {
    config: DecisionServiceConfig,
    client: reqwest::Client,
}

impl HttpDecisionClient {
    pub fn new(config: DecisionServiceConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(TriageError::Config("decision service endpoint is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| TriageError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &DecisionServiceConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    /// 添加认证头
    fn add_auth_headers(
        request: reqwest::RequestBuilder,
        auth: &AuthenticationConfig,
    ) -> reqwest::RequestBuilder {
        match auth {
            AuthenticationConfig::None => request,
            AuthenticationConfig::BasicAuth { username, password } => {
                request.basic_auth(username, Some(password))
            }
            AuthenticationConfig::ApiKey { key, header } => {
                let header_name = header.as_deref().unwrap_or("X-API-Key");
                request.header(header_name, key)
            }
            AuthenticationConfig::BearerToken { token } => request.bearer_auth(token),
        }
    }

    /// 发送JSON请求，返回状态码与响应正文
    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<(reqwest::StatusCode, String), reqwest::Error> {
        let url = self.url(path);
        debug!("POST {}", url);

        let request = Self::add_auth_headers(self.client.post(&url).json(body), &self.config.authentication);
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }
}

#[async_trait]
impl DecisionClient for HttpDecisionClient {
    async fn fetch_triage(&self, patients: &[Patient], staff: &[Staff]) -> Result<TriageResult> {
        let request = TriageRequest { patients, staff };
        let (status, body) = self
            .post_json("triage", &request)
            .await
            .map_err(|e| TriageError::DecisionUnavailable(format!("triage request failed: {}", e)))?;

        if !status.is_success() {
            return Err(TriageError::DecisionUnavailable(format!(
                "triage service returned {}: {}",
                status, body
            )));
        }

        parse_triage_response(&body)
    }

    async fn submit_patient(&self, input: &PatientInput) -> Result<Patient> {
        let (status, body) = self
            .post_json("patient", input)
            .await
            .map_err(|e| TriageError::IntakeRejected(format!("intake request failed: {}", e)))?;

        if !status.is_success() {
            return Err(TriageError::IntakeRejected(format!(
                "Failed to add patient ({}): {}",
                status, body
            )));
        }

        parse_intake_response(&body)
    }

    fn name(&self) -> &str {
        &self.config.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use chrono::Utc;
    use triage_core::Severity;

    async fn spawn_service(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(endpoint: String) -> HttpDecisionClient {
        HttpDecisionClient::new(DecisionServiceConfig {
            endpoint,
            ..Default::default()
        })
        .unwrap()
    }

    fn patient(id: &str) -> Patient {
        Patient {
            id: id.to_string(),
            name: "Alice".to_string(),
            symptoms: Some("chest pain".to_string()),
            severity: Some(Severity::Critical),
            arrival_time: Utc::now(),
            treatment_duration: 30,
        }
    }

    #[test]
    fn test_parse_wrapped_and_bare_triage() {
        let wrapped = r#"{"result": {"triage_order": ["P1"], "assignments": [
            {"patient_id": "P1", "doctor_id": "D1", "wait_time_minutes": 5}
        ], "summary": "ok"}}"#;
        let result = parse_triage_response(wrapped).unwrap();
        assert_eq!(result.triage_order, vec!["P1"]);
        assert_eq!(result.assignments[0].wait_time_minutes, 5);

        let bare = r#"{"triage_order": ["P2", "P1"], "assignments": [
            {"patient_id": "P2", "doctor_id": null, "wait_time_minutes": 0}
        ], "summary": "no staff"}"#;
        let result = parse_triage_response(bare).unwrap();
        assert_eq!(result.triage_order, vec!["P2", "P1"]);
        assert!(result.assignments[0].doctor_id.is_none());
    }

    #[test]
    fn test_parse_malformed_triage() {
        let negative_wait = r#"{"result": {"triage_order": [], "assignments": [
            {"patient_id": "P1", "doctor_id": "D1", "wait_time_minutes": -3}
        ], "summary": ""}}"#;
        assert!(matches!(
            parse_triage_response(negative_wait),
            Err(TriageError::DecisionMalformed(_))
        ));
        assert!(matches!(
            parse_triage_response("Internal Server Error"),
            Err(TriageError::DecisionMalformed(_))
        ));
    }

    #[test]
    fn test_parse_wrapped_and_bare_intake() {
        let wrapped = r#"{"message": "Patient added successfully", "patient": {
            "id": "P3", "name": "Carol", "symptoms": "fever", "severity": "medium",
            "arrival_time": "2024-05-01T10:15:30.123456", "treatment_duration": 25
        }}"#;
        let patient = parse_intake_response(wrapped).unwrap();
        assert_eq!(patient.id, "P3");
        assert_eq!(patient.severity, Some(Severity::Medium));

        let bare = r#"{"id": "P4", "name": "Dave", "arrival_time": "2024-05-01T10:15:30Z",
            "treatment_duration": 20}"#;
        let patient = parse_intake_response(bare).unwrap();
        assert_eq!(patient.id, "P4");
        assert!(patient.severity.is_none());

        assert!(matches!(
            parse_intake_response(r#"{"error": "Missing field: symptoms"}"#),
            Err(TriageError::IntakeRejected(_))
        ));
    }

    #[test]
    fn test_auth_headers() {
        let client = reqwest::Client::new();

        let request = HttpDecisionClient::add_auth_headers(
            client.post("http://localhost/triage"),
            &AuthenticationConfig::BearerToken {
                token: "secret".to_string(),
            },
        )
        .build()
        .unwrap();
        assert_eq!(request.headers()["authorization"], "Bearer secret");

        let request = HttpDecisionClient::add_auth_headers(
            client.post("http://localhost/triage"),
            &AuthenticationConfig::ApiKey {
                key: "k-1".to_string(),
                header: None,
            },
        )
        .build()
        .unwrap();
        assert_eq!(request.headers()["x-api-key"], "k-1");
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        let result = HttpDecisionClient::new(DecisionServiceConfig {
            endpoint: " ".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(TriageError::Config(_))));
    }

    #[tokio::test]
    async fn test_round_trip_against_service() {
        let router = Router::new()
            .route(
                "/triage",
                post(|Json(body): Json<serde_json::Value>| async move {
                    let order: Vec<serde_json::Value> = body["patients"]
                        .as_array()
                        .map(|patients| patients.iter().map(|p| p["id"].clone()).collect())
                        .unwrap_or_default();
                    Json(serde_json::json!({
                        "triage_order": order,
                        "assignments": [],
                        "summary": format!("{} staff on shift", body["staff"].as_array().map(|s| s.len()).unwrap_or(0)),
                    }))
                }),
            )
            .route(
                "/patient",
                post(|Json(mut body): Json<serde_json::Value>| async move {
                    body["severity"] = serde_json::json!("critical");
                    Json(serde_json::json!({ "message": "Patient added successfully", "patient": body }))
                }),
            );
        let client = client_for(spawn_service(router).await);

        let patients = vec![patient("P1"), patient("P2")];
        let staff = vec![Staff::new("D1", "Dr. Lee", "general")];
        let result = client.request_triage(&patients, &staff).await.unwrap();
        assert_eq!(result.triage_order, vec!["P1", "P2"]);
        assert_eq!(result.summary, "1 staff on shift");

        let mut input = PatientInput::new("Eve", "head injury", 35).with_id("P5");
        input.arrival_time = Some(Utc::now());
        let record = client.submit_patient(&input).await.unwrap();
        assert_eq!(record.id, "P5");
        assert_eq!(record.severity, Some(Severity::Critical));
    }

    #[tokio::test]
    async fn test_service_errors() {
        let router = Router::new()
            .route(
                "/triage",
                post(|| async {
                    (
                        StatusCode::BAD_GATEWAY,
                        Json(serde_json::json!({ "error": "Model returned non-JSON response" })),
                    )
                }),
            )
            .route(
                "/patient",
                post(|| async { (StatusCode::BAD_REQUEST, "Missing field: symptoms") }),
            );
        let client = client_for(spawn_service(router).await);

        let result = client.request_triage(&[patient("P1")], &[]).await;
        assert!(matches!(result, Err(TriageError::DecisionUnavailable(_))));

        let result = client
            .submit_patient(&PatientInput::new("Eve", "head injury", 35))
            .await;
        match result {
            Err(TriageError::IntakeRejected(message)) => {
                assert!(message.contains("Missing field: symptoms"));
            }
            other => panic!("unexpected intake result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let client = client_for("http://127.0.0.1:9".to_string());
        let result = client.request_triage(&[], &[]).await;
        assert!(matches!(result, Err(TriageError::DecisionUnavailable(_))));
    }
}

//! RESTful API接口模块
//!
//! 提供人工登记入口和队列视图的只读接口

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use triage_core::{Patient, PatientInput, Staff, TriageError};
use triage_workflow::{EngineStats, QueueView, TriageEngine};

/// API状态
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<TriageEngine>,
}

impl ApiState {
    pub fn new(engine: Arc<TriageEngine>) -> Self {
        Self { engine }
    }
}

/// API错误
#[derive(Debug)]
pub struct ApiError(pub TriageError);

impl From<TriageError> for ApiError {
    fn from(error: TriageError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TriageError::DuplicateId(_) => StatusCode::CONFLICT,
            TriageError::NotFound(_) => StatusCode::NOT_FOUND,
            TriageError::IntakeRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TriageError::DecisionUnavailable(_) | TriageError::DecisionMalformed(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = HashMap::new();
        body.insert("error".to_string(), self.0.to_string());
        (status, Json(body)).into_response()
    }
}

/// API处理器
pub struct ApiHandler;

impl ApiHandler {
    /// 健康检查
    pub async fn health_check(State(state): State<ApiState>) -> Json<HashMap<String, String>> {
        let mut status = HashMap::new();
        status.insert("status".to_string(), "healthy".to_string());
        status.insert("timestamp".to_string(), chrono::Utc::now().to_rfc3339());
        status.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());
        status.insert("decision_service".to_string(), state.engine.client_name().to_string());
        Json(status)
    }

    /// 获取当前队列视图
    pub async fn get_queue(State(state): State<ApiState>) -> Json<QueueView> {
        debug!("Projecting queue view");
        Json(state.engine.queue_view())
    }

    /// 获取引擎统计
    pub async fn get_stats(State(state): State<ApiState>) -> Json<EngineStats> {
        Json(state.engine.stats())
    }

    /// 获取患者记录
    pub async fn get_patient(
        State(state): State<ApiState>,
        Path(patient_id): Path<String>,
    ) -> Result<Json<Patient>, ApiError> {
        state
            .engine
            .patient(&patient_id)
            .map(Json)
            .ok_or_else(|| TriageError::NotFound(format!("patient {}", patient_id)).into())
    }

    /// 人工登记患者
    pub async fn admit_patient(
        State(state): State<ApiState>,
        Json(input): Json<PatientInput>,
    ) -> Result<(StatusCode, Json<Patient>), ApiError> {
        info!("Manual intake for {}", input.name);
        let patient = state.engine.admit_patient(input).await?;
        Ok((StatusCode::CREATED, Json(patient)))
    }

    /// 登记医护人员
    pub async fn register_staff(
        State(state): State<ApiState>,
        Json(staff): Json<Staff>,
    ) -> Result<(StatusCode, Json<Staff>), ApiError> {
        state.engine.register_staff(staff.clone())?;
        Ok((StatusCode::CREATED, Json(staff)))
    }

    /// 请求立即重新分诊
    pub async fn refresh(State(state): State<ApiState>) -> StatusCode {
        state.engine.request_refresh();
        StatusCode::ACCEPTED
    }
}

async fn log_requests(req: Request, next: Next) -> Response {
    info!("API request: {} {}", req.method(), req.uri());
    let response = next.run(req).await;
    info!("API response: {}", response.status());
    response
}

/// 创建API路由
pub fn create_api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(ApiHandler::health_check))
        .route("/queue", get(ApiHandler::get_queue))
        .route("/stats", get(ApiHandler::get_stats))
        .route("/patients", post(ApiHandler::admit_patient))
        .route("/patients/:id", get(ApiHandler::get_patient))
        .route("/staff", post(ApiHandler::register_staff))
        .route("/triage/refresh", post(ApiHandler::refresh))
        .with_state(state)
        .layer(middleware::from_fn(log_requests))
}

/// API服务器
pub struct ApiServer {
    app: Router,
}

impl ApiServer {
    pub fn new(state: ApiState) -> Self {
        let app = create_api_routes(state);
        let app = app.layer(tower_http::cors::CorsLayer::permissive());
        Self { app }
    }

    /// 运行直到收到关闭信号
    pub async fn run(self, addr: &str, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!("Starting API server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        info!("API server stopped");
        Ok(())
    }
}

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use bomflow_api::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db,
    entities::user::UserRole,
    errors::ServiceError,
    events::{self, EventHandler, EventSender},
    handlers::AppServices,
    notifications::{MessageSender, SendReceipt},
    services::{notifications::ProjectNotifier, users::CreateUserInput},
    AppState,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";
pub const ADMIN_PASSWORD: &str = "admin-password-1";

/// Message sender that keeps every message in memory.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl RecordingSender {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, ServiceError> {
        if self.fail {
            return Err(ServiceError::ExternalServiceError("provider rejected".into()));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((to.to_string(), body.to_string()));
        Ok(SendReceipt {
            provider_message_id: Some(format!("wamid.test.{}", sent.len())),
        })
    }

    fn channel(&self) -> &'static str {
        "recording"
    }
}

/// Full application router over a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub sender: Arc<RecordingSender>,
    pub admin_id: Uuid,
    admin_token: String,
    _upload_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Builds the app after letting the caller adjust the configuration.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let upload_dir = TempDir::new().expect("temp upload dir");

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_JWT_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.upload_dir = upload_dir.path().to_string_lossy().into_owned();
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);

        let sender = Arc::new(RecordingSender::default());
        let services = AppServices::new(db_arc.clone(), event_sender.clone(), &cfg, sender.clone());

        let mut handlers: Vec<Arc<dyn EventHandler>> = Vec::new();
        if cfg.notify_on_project_events {
            handlers.push(Arc::new(ProjectNotifier::new(
                (*services.notifications).clone(),
            )));
        }
        let event_task = tokio::spawn(events::process_events(event_rx, handlers));

        let auth = Arc::new(AuthService::new(
            AuthConfig::from_app_config(&cfg),
            db_arc.clone(),
        ));

        let admin = services
            .users
            .create_user(CreateUserInput {
                name: "Test Admin".into(),
                email: "admin@example.com".into(),
                password: ADMIN_PASSWORD.into(),
                role: UserRole::Admin,
                phone: None,
            })
            .await
            .expect("seed admin");
        let admin_token = auth
            .generate_token(&admin)
            .expect("admin token")
            .access_token;

        let state = AppState {
            db: db_arc,
            config: Arc::new(cfg),
            event_sender,
            services,
            auth,
        };
        let router = bomflow_api::app_router(state.clone(), CorsLayer::permissive());

        Self {
            router,
            state,
            sender,
            admin_id: admin.id,
            admin_token,
            _upload_dir: upload_dir,
            _event_task: event_task,
        }
    }

    pub fn token(&self) -> &str {
        &self.admin_token
    }

    /// Creates a user with the given role and returns a token for them.
    pub async fn token_for(&self, role: UserRole) -> String {
        let user = self
            .state
            .services
            .users
            .create_user(CreateUserInput {
                name: format!("{} user", role),
                email: format!("{}-{}@example.com", role, Uuid::new_v4().simple()),
                password: "password-123".into(),
                role,
                phone: None,
            })
            .await
            .expect("seed user");
        self.state
            .auth
            .generate_token(&user)
            .expect("user token")
            .access_token
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Sends a JSON request with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("build request")).await
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.request(Method::GET, uri, None, Some(self.token())).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> Response {
        self.request(Method::POST, uri, Some(body), Some(self.token()))
            .await
    }

    pub async fn put(&self, uri: &str, body: Value) -> Response {
        self.request(Method::PUT, uri, Some(body), Some(self.token()))
            .await
    }

    pub async fn delete(&self, uri: &str) -> Response {
        self.request(Method::DELETE, uri, None, Some(self.token()))
            .await
    }

    /// Posts a single-file multipart form under the `file` field.
    pub async fn upload(
        &self,
        uri: &str,
        file_name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Response {
        let boundary = "bomflow-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("authorization", format!("Bearer {}", self.token()))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .expect("build multipart request");
        self.send(request).await
    }

    /// Creates a material and returns its id.
    pub async fn material(&self, name: &str, unit: &str, price: &str) -> Uuid {
        let res = self
            .post(
                "/api/v1/materials",
                serde_json::json!({ "name": name, "unit": unit, "unit_price": price }),
            )
            .await;
        assert_eq!(res.status(), 201, "material {} not created", name);
        id_of(&response_json(res).await)
    }

    /// Creates an assembly from `(material_id, quantity)` lines.
    pub async fn assembly(&self, name: &str, labor: &str, lines: &[(Uuid, &str)]) -> Uuid {
        let materials: Vec<Value> = lines
            .iter()
            .map(|(id, qty)| serde_json::json!({ "material_id": id, "quantity": qty }))
            .collect();
        let res = self
            .post(
                "/api/v1/assemblies",
                serde_json::json!({ "name": name, "labor_cost": labor, "materials": materials }),
            )
            .await;
        assert_eq!(res.status(), 201, "assembly {} not created", name);
        id_of(&response_json(res).await)
    }

    pub async fn client(&self, name: &str, phone: Option<&str>, opt_in: bool) -> Uuid {
        let res = self
            .post(
                "/api/v1/clients",
                serde_json::json!({ "name": name, "phone": phone, "whatsapp_opt_in": opt_in }),
            )
            .await;
        assert_eq!(res.status(), 201, "client {} not created", name);
        id_of(&response_json(res).await)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn response_bytes(response: Response) -> Vec<u8> {
    body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes")
        .to_vec()
}

/// `data.id` of an `ApiResponse` body.
pub fn id_of(body: &Value) -> Uuid {
    body["data"]["id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .expect("response carries data.id")
}

/// Decimal fields serialize as strings.
pub fn money(value: &Value) -> rust_decimal::Decimal {
    value
        .as_str()
        .expect("decimal serialized as string")
        .parse()
        .expect("decimal string")
}

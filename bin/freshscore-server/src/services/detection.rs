//! Produce detection orchestration.
//!
//! [`DetectionService::submit`] persists a pending task row, hands the model
//! call to the worker pool, and returns the task id without waiting.
//! [`DetectionService::run`] executes inside a pool slot and drives the row
//! through `running → (success | failed)`.  The submitting request has
//! already been answered by then, so `run`'s errors are logged and reflected
//! in the persisted status rather than returned over HTTP.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use freshscore_core::WorkerPool;

use crate::config::Config;
use crate::db::sqlite::SqliteStore;
use crate::db::{TaskStatus, TaskStore};
use crate::error::ServerError;
use crate::models::detection::{
    DetectImageRequest, DetectImageResponse, DETECT_IMAGE_RESPONSE_SCHEMA,
};

/// System prompt pinned for every detection call.
const DETECTION_SYSTEM_PROMPT: &str = "\
You are a produce quality inspector. Look at the photo, identify the fruit \
or vegetable it shows, and judge its quality. Score each relevant metric \
(such as ripeness, freshness, colour and surface condition) from 0 to 10 and \
name the visual basis for every score. Derive an overall score from the \
metrics, then give practical expert advice on storage, nutrition and \
selection. Answer in JSON only, following the schema you are given.";

const DETECTION_USER_INSTRUCTION: &str =
    "Identify the produce in the image and return the result as JSON.";

/// Errors from the asynchronous detection path.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The model endpoint was unreachable or the response body unreadable.
    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The model endpoint answered with a non-success status.
    #[error("model endpoint returned status {status}: {body}")]
    Provider { status: u16, body: String },

    /// The completion carried no choices at all.
    #[error("no result from model")]
    EmptyCompletion,

    /// The persisted raw output did not decode into the structured shape.
    #[error("model output is not a valid detection result: {0}")]
    Parse(#[from] serde_json::Error),
}

// ── chat-completion wire types ───────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatMessage<'a> {
    Text { role: &'a str, content: &'a str },
    Parts { role: &'a str, content: Vec<ContentPart<'a>> },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    r#type: &'a str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    description: &'a str,
    schema: &'a serde_json::Value,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

// ── Service ──────────────────────────────────────────────────────────────────

/// Orchestrates the asynchronous detection lifecycle.
#[derive(Debug)]
pub struct DetectionService {
    config: Arc<Config>,
    store: Arc<SqliteStore>,
    pool: Arc<WorkerPool>,
    http: reqwest::Client,
}

impl DetectionService {
    pub fn new(config: Arc<Config>, store: Arc<SqliteStore>, pool: Arc<WorkerPool>) -> Self {
        Self {
            config,
            store,
            pool,
            http: reqwest::Client::new(),
        }
    }

    /// Create the task row and schedule the detection.
    ///
    /// Returns the fresh task id as soon as the unit of work is accepted;
    /// completion is observed by polling [`TaskStore::get_task`].  If the
    /// pool refuses the unit, the error propagates to the caller and the
    /// already-created pending row is left behind as-is.
    pub async fn submit(
        self: &Arc<Self>,
        request: DetectImageRequest,
    ) -> Result<String, ServerError> {
        let task_id = Uuid::new_v4().to_string();
        self.store.create_task(&task_id).await?;

        // The unit of work owns its state outright, so a client disconnect
        // never aborts an in-flight detection.
        let service = Arc::clone(self);
        let id = task_id.clone();
        self.pool.try_execute(async move {
            if let Err(e) = service.run(&id, &request).await {
                error!(task_id = %id, error = %e, "detection task failed");
            }
        })?;

        info!(task_id = %task_id, "detection task submitted");
        Ok(task_id)
    }

    /// Drive one task through `running → (success | failed)`.
    ///
    /// The returned structured response is a convenience for the caller of
    /// `run`; the persisted raw result is the source of truth, and a decode
    /// failure here does not revert an already-persisted success.
    async fn run(
        &self,
        task_id: &str,
        request: &DetectImageRequest,
    ) -> Result<DetectImageResponse, DetectionError> {
        self.store
            .update_task_status(task_id, TaskStatus::Running)
            .await?;

        let content = match self.chat_completion(&request.image_url).await {
            Ok(content) => content,
            Err(e) => {
                self.store
                    .update_task_status(task_id, TaskStatus::Failed)
                    .await?;
                return Err(e);
            }
        };

        // Terminal status and verbatim payload land in a single write.
        self.store
            .update_task_result(task_id, TaskStatus::Success, &content)
            .await?;
        info!(task_id, "detection task succeeded");

        let response: DetectImageResponse = serde_json::from_str(&content)?;
        Ok(response)
    }

    /// One schema-constrained chat-completion round trip.
    async fn chat_completion(&self, image_url: &str) -> Result<String, DetectionError> {
        let body = ChatRequest {
            model: &self.config.model.model,
            messages: vec![
                ChatMessage::Text {
                    role: "system",
                    content: DETECTION_SYSTEM_PROMPT,
                },
                ChatMessage::Text {
                    role: "user",
                    content: DETECTION_USER_INSTRUCTION,
                },
                ChatMessage::Parts {
                    role: "user",
                    content: vec![ContentPart::ImageUrl {
                        image_url: ImageUrl { url: image_url },
                    }],
                },
            ],
            response_format: ResponseFormat {
                r#type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: "ImageDetectResult",
                    description: "image detect result",
                    schema: &DETECT_IMAGE_RESPONSE_SCHEMA,
                    strict: true,
                },
            },
        };

        debug!(model = %self.config.model.model, image_url, "calling model endpoint");
        let response = self
            .http
            .post(format!(
                "{}/chat/completions",
                self.config.model.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.config.model.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DetectionError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatResponse = response.json().await?;
        let Some(choice) = completion.choices.into_iter().next() else {
            return Err(DetectionError::EmptyCompletion);
        };
        Ok(choice.message.content)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;
    use crate::config::{ModelConfig, StorageConfig};
    use crate::models::detection::DetectionType;

    /// Serve a canned chat-completion response on an ephemeral port.
    async fn spawn_model_stub(status: StatusCode, response: serde_json::Value) -> String {
        let app = Router::new().route(
            "/chat/completions",
            post(move || {
                let response = response.clone();
                async move { (status, Json(response)) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn test_config(model_base_url: &str) -> Arc<Config> {
        Arc::new(Config {
            bind_address: "127.0.0.1:0".into(),
            database_url: "sqlite::memory:".into(),
            log_level: "info".into(),
            log_json: false,
            enable_swagger: false,
            cors_allowed_origins: None,
            pool_capacity: 2,
            model: ModelConfig {
                base_url: model_base_url.into(),
                api_key: "test-key".into(),
                model: "gpt-4o".into(),
            },
            storage: StorageConfig {
                auth_endpoint: "http://127.0.0.1:1/getauth".into(),
                bucket: "test-bucket".into(),
                region: "test-region".into(),
                endpoint_url: None,
                force_path_style: true,
                presign_expiry_secs: 3600,
                max_upload_size_mb: 10,
            },
        })
    }

    async fn temp_store(dir: &tempfile::TempDir) -> Arc<SqliteStore> {
        let url = format!("sqlite://{}/tasks.db?mode=rwc", dir.path().display());
        Arc::new(SqliteStore::connect(&url).await.expect("store connects"))
    }

    fn sample_request() -> DetectImageRequest {
        DetectImageRequest {
            image_url: "https://img.example/banana.jpg".into(),
            detection_type: DetectionType::Fruit,
        }
    }

    fn sample_result() -> serde_json::Value {
        json!({
            "name": "banana",
            "scientific_name": "Musa acuminata",
            "category": "fruit",
            "family": "Musaceae",
            "metrics": [{
                "name": "ripeness",
                "label": "Ripeness",
                "value": 8.5,
                "basis": "peel is yellow with light spotting"
            }],
            "overall_score": {"score": 8.2, "reason": "firm and evenly ripe"},
            "expert_advice": {
                "storage": "room temperature, away from direct sun",
                "nutrition": "rich in potassium",
                "selection": "pick firm fruit without bruising"
            }
        })
    }

    async fn service_with_stub(
        dir: &tempfile::TempDir,
        status: StatusCode,
        response: serde_json::Value,
    ) -> (Arc<DetectionService>, Arc<SqliteStore>) {
        let base_url = spawn_model_stub(status, response).await;
        let store = temp_store(dir).await;
        let pool = Arc::new(WorkerPool::new(2));
        let service = Arc::new(DetectionService::new(
            test_config(&base_url),
            Arc::clone(&store),
            pool,
        ));
        (service, store)
    }

    #[tokio::test]
    async fn run_persists_success_with_verbatim_result() {
        let dir = tempfile::tempdir().expect("tempdir");
        let raw = sample_result().to_string();
        let completion = json!({"choices": [{"message": {"content": raw}}]});
        let (service, store) = service_with_stub(&dir, StatusCode::OK, completion).await;

        store.create_task("task-1").await.expect("create");
        let parsed = service
            .run("task-1", &sample_request())
            .await
            .expect("run succeeds");
        assert_eq!(parsed.name, "banana");
        assert_eq!(parsed.overall_score.score, 8.2);

        let row = store.get_task("task-1").await.expect("get").expect("row");
        assert_eq!(row.status, TaskStatus::Success);
        // Persisted verbatim, and re-parsing reproduces the structured shape.
        let stored = row.result.expect("result present");
        assert_eq!(stored, sample_result().to_string());
        let reparsed: DetectImageResponse =
            serde_json::from_str(&stored).expect("stored result re-parses");
        assert_eq!(reparsed, parsed);
    }

    #[tokio::test]
    async fn empty_choices_mark_the_task_failed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (service, store) =
            service_with_stub(&dir, StatusCode::OK, json!({"choices": []})).await;

        store.create_task("task-1").await.expect("create");
        let err = service
            .run("task-1", &sample_request())
            .await
            .expect_err("empty completion should fail");
        assert!(matches!(err, DetectionError::EmptyCompletion));

        let row = store.get_task("task-1").await.expect("get").expect("row");
        assert_eq!(row.status, TaskStatus::Failed);
        assert!(row.result.is_none(), "failed tasks never carry a result");
    }

    #[tokio::test]
    async fn provider_error_marks_the_task_failed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (service, store) = service_with_stub(
            &dir,
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": "boom"}),
        )
        .await;

        store.create_task("task-1").await.expect("create");
        let err = service
            .run("task-1", &sample_request())
            .await
            .expect_err("provider error should fail");
        assert!(matches!(err, DetectionError::Provider { status: 500, .. }));

        let row = store.get_task("task-1").await.expect("get").expect("row");
        assert_eq!(row.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn parse_failure_does_not_revert_persisted_success() {
        let dir = tempfile::tempdir().expect("tempdir");
        let completion = json!({"choices": [{"message": {"content": "not json at all"}}]});
        let (service, store) = service_with_stub(&dir, StatusCode::OK, completion).await;

        store.create_task("task-1").await.expect("create");
        let err = service
            .run("task-1", &sample_request())
            .await
            .expect_err("unparseable content should surface");
        assert!(matches!(err, DetectionError::Parse(_)));

        let row = store.get_task("task-1").await.expect("get").expect("row");
        assert_eq!(row.status, TaskStatus::Success);
        assert_eq!(row.result.as_deref(), Some("not json at all"));
    }

    #[tokio::test]
    async fn submit_rejects_when_the_pool_is_saturated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base_url = spawn_model_stub(StatusCode::OK, json!({"choices": []})).await;
        let store = temp_store(&dir).await;
        let pool = Arc::new(WorkerPool::new(1));
        let service = Arc::new(DetectionService::new(
            test_config(&base_url),
            store,
            Arc::clone(&pool),
        ));

        // Occupy the only slot so the submission has nowhere to go.
        let gate = Arc::new(tokio::sync::Notify::new());
        let held = Arc::clone(&gate);
        pool.try_execute(async move {
            held.notified().await;
        })
        .expect("gate unit accepted");

        let err = service
            .submit(sample_request())
            .await
            .expect_err("saturated pool should reject the submission");
        assert!(matches!(
            err,
            ServerError::Pool(freshscore_core::PoolError::Saturated { .. })
        ));

        gate.notify_one();
    }

    #[tokio::test]
    async fn submit_then_poll_reaches_success_end_to_end() {
        let dir = tempfile::tempdir().expect("tempdir");
        let raw = sample_result().to_string();
        let completion = json!({"choices": [{"message": {"content": raw}}]});

        // Gate the stub so the model call cannot finish until released; that
        // pins the task in a non-terminal state for the first poll.
        let gate = Arc::new(tokio::sync::Notify::new());
        let stub_gate = Arc::clone(&gate);
        let app = Router::new().route(
            "/chat/completions",
            post(move || {
                let completion = completion.clone();
                let stub_gate = Arc::clone(&stub_gate);
                async move {
                    stub_gate.notified().await;
                    Json(completion)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub");
        let base_url = format!("http://{}", listener.local_addr().expect("stub addr"));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let store = temp_store(&dir).await;
        let pool = Arc::new(WorkerPool::new(2));
        let service = Arc::new(DetectionService::new(
            test_config(&base_url),
            Arc::clone(&store),
            pool,
        ));

        let task_id = service
            .submit(sample_request())
            .await
            .expect("submission accepted");

        // The row exists from the moment submit returns, and cannot be
        // terminal while the stub is gated.
        let snapshot = store
            .get_task(&task_id)
            .await
            .expect("get")
            .expect("row exists immediately");
        assert!(
            matches!(snapshot.status, TaskStatus::Pending | TaskStatus::Running),
            "fresh task should not be terminal yet"
        );
        assert!(snapshot.result.is_none());

        gate.notify_one();

        // Poll until the background unit finishes.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let row = store.get_task(&task_id).await.expect("get").expect("row");
            if row.status == TaskStatus::Success {
                assert_eq!(row.result, Some(sample_result().to_string()));
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "task did not complete in time (status: {})",
                row.status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn concurrent_submissions_get_distinct_task_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let raw = sample_result().to_string();
        let completion = json!({"choices": [{"message": {"content": raw}}]});
        let (service, store) = service_with_stub(&dir, StatusCode::OK, completion).await;

        let mut handles = Vec::new();
        for _ in 0..2 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service.submit(sample_request()).await.expect("submit")
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.expect("join"));
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 2, "task ids must be unique under concurrency");

        for id in &ids {
            assert!(store.get_task(id).await.expect("get").is_some());
        }
    }
}

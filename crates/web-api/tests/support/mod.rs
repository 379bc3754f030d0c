use std::sync::Arc;

use application::ManualClock;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use config::{AppConfig, CounsellorSeed};
use domain::Timestamp;
use infrastructure::Infrastructure;
use serde_json::Value;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use web_api::{router, AppState};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub infrastructure: Infrastructure,
    pub clock: Arc<ManualClock>,
    notification_worker: Option<JoinHandle<()>>,
}

pub fn start_time() -> Timestamp {
    Utc.with_ymd_and_hms(2025, 8, 31, 9, 0, 0).unwrap()
}

pub fn seed(id: &str, name: &str) -> CounsellorSeed {
    CounsellorSeed {
        id: id.into(),
        display_name: name.into(),
        institution: "TU Munich".into(),
        program: "MSc Informatics".into(),
        specialty_tags: vec!["germany".into(), "visa".into()],
        external_scheduling_ref: format!("calendly/{id}"),
        graduation_year: Some(2024),
        bio: None,
        photo_url: None,
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        let mut config = AppConfig::default();
        config.counsellors = vec![seed("mira", "Mira"), seed("jonas", "Jonas")];
        config.notifications.backoff_base_ms = 1;

        let clock = Arc::new(ManualClock::new(start_time()));
        let infrastructure = Infrastructure::build(&config, start_time())
            .await
            .expect("seed directory");
        let (state, worker) = AppState::assemble(&config, &infrastructure, clock.clone());

        Self {
            router: router(state.clone()),
            state,
            infrastructure,
            clock,
            notification_worker: Some(worker),
        }
    }

    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(json) => Body::from(json.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body)).await
    }

    /// 关闭通知队列并等待后台任务发送完所有消息
    pub async fn drain_notifications(&mut self) {
        self.state.notifications.close();
        if let Some(worker) = self.notification_worker.take() {
            worker.await.unwrap();
        }
    }
}

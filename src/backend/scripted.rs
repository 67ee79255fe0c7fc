//! In-memory backend for tests: replies are scripted per path and every
//! request received is recorded.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{Backend, BackendError};
use crate::protocol::{Request, Response};

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    routes: HashMap<String, Result<Response, BackendError>>,
    delays: HashMap<String, Duration>,
    received: Mutex<Vec<Request>>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(mut self, path: &str, response: Response) -> Self {
        self.routes.insert(path.to_string(), Ok(response));
        self
    }

    pub(crate) fn reply_json(self, path: &str, body: Value) -> Self {
        self.reply(path, Response::new(200, body))
    }

    pub(crate) fn fail(mut self, path: &str, error: BackendError) -> Self {
        self.routes.insert(path.to_string(), Err(error));
        self
    }

    pub(crate) fn delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(path.to_string(), delay);
        self
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.received.lock().unwrap().clone()
    }

    pub(crate) fn requests_to(&self, path: &str) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn send(&self, request: &Request) -> Result<Response, BackendError> {
        self.received.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delays.get(&request.path) {
            tokio::time::sleep(*delay).await;
        }

        match self.routes.get(&request.path) {
            Some(outcome) => outcome.clone(),
            None => Ok(Response::new(404, Value::Null)),
        }
    }
}

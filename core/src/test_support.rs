//! Scripted transport for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::{json, Value};

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::Transport;

/// Replays queued responses in order and records every request it sees.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, ApiError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, body: Value) {
        self.push(Ok(HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: body.to_string(),
        }));
    }

    pub fn push_server_error(&self, number: i64, name: &str) {
        self.push_json(json!({"name": name, "description": format!("{name} (test)"), "number": number}));
    }

    pub fn push(&self, response: Result<HttpResponse, ApiError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The `method` form field of every request, in order.
    pub fn methods(&self) -> Vec<String> {
        self.forms().into_iter().map(|(method, _)| method).collect()
    }

    /// The decoded `rest_data` of request `index`.
    pub fn rest_data(&self, index: usize) -> Value {
        let (_, rest_data) = self.forms().swap_remove(index);
        serde_json::from_str(&rest_data).unwrap()
    }

    fn forms(&self) -> Vec<(String, String)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|req| {
                let form: Vec<(String, String)> = serde_urlencoded::from_str(&req.body).unwrap();
                let field = |name: &str| {
                    form.iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default()
                };
                (field("method"), field("rest_data"))
            })
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Transport("no scripted response left".to_string())))
    }
}

//! In-memory stand-in for a SuiteCRM `service/v4_1/rest.php` endpoint.
//!
//! Speaks the same form-POST contract as the real server: `method`,
//! `input_type`, `response_type` and a JSON `rest_data`. Business errors come
//! back as `{name, description, number}` with status 200, as SuiteCRM does.

pub mod crm;

use std::sync::Arc;

use axum::{extract::State, routing::post, Form, Json, Router};
use serde::Deserialize;
use serde_json::Value;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;

pub use crm::{Crm, DEFAULT_PASSWORD_MD5, DEFAULT_USERNAME};

pub const REST_PATH: &str = "/service/v4_1/rest.php";

#[derive(Debug, Deserialize)]
pub struct RestForm {
    pub method: String,
    pub input_type: String,
    pub response_type: String,
    #[serde(default)]
    pub rest_data: String,
}

pub type Db = Arc<RwLock<Crm>>;

pub fn app() -> Router {
    app_with_db(Arc::new(RwLock::new(Crm::default())))
}

pub fn app_with_db(db: Db) -> Router {
    Router::new().route(REST_PATH, post(rest)).with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_db(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_db(db)).await
}

async fn rest(State(db): State<Db>, Form(form): Form<RestForm>) -> Json<Value> {
    debug!(method = %form.method, "rest call");
    if form.input_type != "JSON" || form.response_type != "JSON" {
        return Json(invalid_format("only JSON input and response types are supported"));
    }
    let args: Value = match serde_json::from_str(&form.rest_data) {
        Ok(args @ Value::Object(_)) => args,
        Ok(_) | Err(_) => return Json(invalid_format("rest_data must be a JSON object")),
    };
    let reply = db.write().await.handle(&form.method, &args);
    Json(reply)
}

fn invalid_format(description: &str) -> Value {
    serde_json::json!({"name": "Invalid Data Format", "description": description, "number": 1001})
}

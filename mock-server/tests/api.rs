use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, DEFAULT_PASSWORD_MD5, REST_PATH};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn rest_request(method: &str, rest_data: &Value) -> Request<String> {
    let body = serde_urlencoded::to_string([
        ("method", method),
        ("input_type", "JSON"),
        ("response_type", "JSON"),
        ("rest_data", rest_data.to_string().as_str()),
    ])
    .unwrap();
    Request::builder()
        .method("POST")
        .uri(REST_PATH)
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(body)
        .unwrap()
}

fn login_data() -> Value {
    json!({"user_auth": {"user_name": "admin", "password": DEFAULT_PASSWORD_MD5}, "application_name": "tests"})
}

// --- login ---

#[tokio::test]
async fn login_returns_session_id() {
    let resp = app().oneshot(rest_request("login", &login_data())).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert!(!body["id"].as_str().unwrap().is_empty());
    assert_eq!(body["module_name"], "Users");
}

#[tokio::test]
async fn bad_password_is_error_body_with_200() {
    let data = json!({"user_auth": {"user_name": "admin", "password": "nope"}, "application_name": "tests"});
    let resp = app().oneshot(rest_request("login", &data)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["number"], 10);
    assert_eq!(body.as_object().unwrap().len(), 3);
}

// --- envelope ---

#[tokio::test]
async fn non_json_input_type_is_invalid_data_format() {
    let body = "method=login&input_type=XML&response_type=JSON&rest_data=%7B%7D".to_string();
    let request = Request::builder()
        .method("POST")
        .uri(REST_PATH)
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(body)
        .unwrap();
    let resp = app().oneshot(request).await.unwrap();

    assert_eq!(body_json(resp).await["number"], 1001);
}

#[tokio::test]
async fn missing_session_is_invalid_session() {
    let resp = app()
        .oneshot(rest_request("get_available_modules", &json!({"session": "", "filter": "all"})))
        .await
        .unwrap();

    assert_eq!(body_json(resp).await["number"], 11);
}

#[tokio::test]
async fn get_is_not_routed() {
    let resp = app()
        .oneshot(Request::builder().uri(REST_PATH).body(String::new()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// --- full record lifecycle ---

#[tokio::test]
async fn record_lifecycle() {
    use tower::Service;

    let mut app = app().into_service();

    // login
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(rest_request("login", &login_data()))
        .await
        .unwrap();
    let session = body_json(resp).await["id"].as_str().unwrap().to_string();

    // create
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(rest_request(
            "set_entry",
            &json!({
                "session": session,
                "module_name": "Contacts",
                "name_value_list": [{"name": "last_name", "value": "Hopper"}]
            }),
        ))
        .await
        .unwrap();
    let created = body_json(resp).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["entry_list"]["last_name"]["value"], "Hopper");

    // get
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(rest_request(
            "get_entry",
            &json!({
                "session": session,
                "module_name": "Contacts",
                "id": id,
                "select_fields": ["last_name"],
                "link_name_to_fields_array": [],
                "track_view": false
            }),
        ))
        .await
        .unwrap();
    let fetched = body_json(resp).await;
    let fields = &fetched["entry_list"][0]["name_value_list"];
    assert_eq!(fields["last_name"]["value"], "Hopper");
    assert!(fields.get("id").is_none(), "select_fields limits the reply");

    // update
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(rest_request(
            "set_entry",
            &json!({
                "session": session,
                "module_name": "Contacts",
                "name_value_list": [{"name": "id", "value": id}, {"name": "first_name", "value": "Grace"}]
            }),
        ))
        .await
        .unwrap();
    let updated = body_json(resp).await;
    assert_eq!(updated["id"], id.as_str());
    assert_eq!(updated["entry_list"]["first_name"]["value"], "Grace");
    assert_eq!(updated["entry_list"]["last_name"]["value"], "Hopper");

    // list
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(rest_request(
            "get_entry_list",
            &json!({
                "session": session,
                "module_name": "Contacts",
                "query": "",
                "order_by": "",
                "offset": "",
                "select_fields": [],
                "link_name_to_fields_array": [],
                "max_results": "",
                "deleted": 0,
                "favorites": false
            }),
        ))
        .await
        .unwrap();
    let listing = body_json(resp).await;
    assert_eq!(listing["total_count"], "1");
    assert_eq!(listing["entry_list"][0]["id"], id.as_str());

    // logout, then the session is gone
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(rest_request("logout", &json!({"session": session})))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await, Value::Null);

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(rest_request("get_entry", &json!({"session": session, "module_name": "Contacts", "id": id})))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["number"], 11);
}

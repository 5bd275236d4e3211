//! End-to-end tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives the client over real
//! HTTP with the default ureq transport. The server state handle is kept so
//! tests can expire sessions and count the calls that actually arrived.

use std::sync::Arc;

use mock_server::{Crm, Db, REST_PATH};
use suitecrm_core::{
    password_hash, ApiError, Config, Connection, FailureKind, LinkFields, ListQuery, Parameters,
    Record, RecordQuery, RelatedQuery, SessionClient, Transport, UreqTransport,
};
use tokio::sync::RwLock;

const PASSWORD: &str = "s3cret";

/// Start a mock server in a background thread; returns its URL and state.
fn start_server() -> (String, Db) {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    let db: Db = Arc::new(RwLock::new(Crm::new("api", &password_hash(PASSWORD))));
    let server_db = db.clone();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run_with_db(listener, server_db).await
        })
        .unwrap();
    });

    (format!("http://{addr}{REST_PATH}"), db)
}

fn config(url: &str) -> Config {
    Config::new(url, "api", PASSWORD).with_application_name("integration")
}

#[test]
fn record_lifecycle() {
    let (url, db) = start_server();
    let client = SessionClient::new(&config(&url));

    // Step 1: log in.
    let session = client.authenticate().unwrap();
    assert!(!session.is_empty());

    // Step 2: create an account; the server assigns id and timestamps.
    let mut account = Record::new("Accounts");
    account.set("name", "Analytical Engines Ltd");
    account.set("industry", "Engineering");
    client.save_record(&mut account).unwrap();
    assert!(!account.id().is_empty());
    assert_eq!(account.get("date_entered"), "2024-01-01 00:00:00");

    // Step 3: create two contacts.
    let mut ids = Vec::new();
    for last_name in ["Lovelace", "Babbage"] {
        let mut contact = Record::new("Contacts");
        contact.set("last_name", last_name);
        client.save_record(&mut contact).unwrap();
        ids.push(contact.id().to_string());
    }

    // Step 4: update an existing record.
    account.set("industry", "Computing");
    client.save_record(&mut account).unwrap();
    let fetched = client
        .get_record("Accounts", account.id(), &RecordQuery::new())
        .unwrap();
    assert_eq!(fetched.get("industry"), "Computing");
    assert_eq!(fetched.get("no_such_field"), "");

    // Step 5: relate both contacts to the account.
    let related_ids: Vec<&str> = ids.iter().map(String::as_str).collect();
    let outcome = client
        .relate("Accounts", account.id(), "contacts", &related_ids)
        .unwrap();
    assert_eq!(outcome.created, 2);
    assert_eq!(outcome.failed, 0);

    // Step 6: links come back with the record and through get_related.
    let query = RecordQuery::new()
        .fields(["id", "name"])
        .link(LinkFields::new("contacts", ["id", "last_name"]));
    let with_links = client.get_record("Accounts", account.id(), &query).unwrap();
    let last_names: Vec<&str> = with_links
        .related("contacts")
        .iter()
        .map(|contact| contact["last_name"].as_str())
        .collect();
    assert_eq!(last_names, ["Lovelace", "Babbage"]);

    let related = client
        .get_related("Accounts", account.id(), "contacts", &RelatedQuery::new().fields(["last_name"]))
        .unwrap();
    assert_eq!(related.len(), 2);
    assert_eq!(related[0].module(), "Contacts");

    // Step 7: unrelate one.
    let outcome = client
        .unrelate("Accounts", account.id(), "contacts", &[ids[0].as_str()])
        .unwrap();
    assert_eq!(outcome.deleted, 1);
    let related = client
        .get_related("Accounts", account.id(), "contacts", &RelatedQuery::new())
        .unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].get("last_name"), "Babbage");

    // Step 8: paging through contacts.
    let first = client
        .get_records("Contacts", &ListQuery::new().offset(0).limit(1))
        .unwrap();
    assert_eq!(first.total_count, 2);
    assert_eq!(first.previous_offset, None);
    assert_eq!(first.next_offset, Some(1));
    let second = client
        .get_records("Contacts", &ListQuery::new().offset(1).limit(1))
        .unwrap();
    assert_eq!(second.previous_offset, Some(0));
    assert_eq!(second.next_offset, None);
    assert_eq!(second.entries[0].get("last_name"), "Babbage");

    let filtered = client
        .get_records("Contacts", &ListQuery::new().query("contacts.last_name = 'Lovelace'"))
        .unwrap();
    assert_eq!(filtered.entries.len(), 1);

    // Step 9: note attachment.
    let mut note = Record::new("Notes");
    note.set("name", "Design notes");
    client.save_record(&mut note).unwrap();
    client
        .set_note_attachment(note.id(), "notes.txt", b"difference engine")
        .unwrap();
    let attachment = client.get_note_attachment(note.id()).unwrap();
    assert_eq!(attachment.filename, "notes.txt");
    assert_eq!(attachment.contents().unwrap(), b"difference engine");

    // Step 10: metadata and templates as raw payloads.
    let modules = client.get_available_modules("all").unwrap();
    assert!(modules["modules"].as_array().unwrap().len() >= 4);
    let fields = client.get_module_fields("Contacts", &["last_name"]).unwrap();
    assert_eq!(fields["module_fields"]["last_name"]["name"], "last_name");

    db.blocking_write().add_template("tpl-1", "<h1>{name}</h1>");
    let rendered = client.get_pdf_template("tpl-1", "Accounts", account.id()).unwrap();
    assert_eq!(rendered["html"], "<h1>Analytical Engines Ltd</h1>");

    // Step 11: unknown module is a typed server error.
    let err = client
        .get_records("Spaceships", &ListQuery::new())
        .unwrap_err();
    assert_eq!(err.failure_kind(), Some(FailureKind::ModuleDoesNotExist));

    // Step 12: log out; the server forgets the session.
    client.logout().unwrap();
    assert_eq!(client.session_id(), None);
    assert_eq!(db.blocking_read().session_count(), 0);
}

#[test]
fn expired_session_is_renewed_once() {
    let (url, db) = start_server();
    let client = SessionClient::new(&config(&url));
    let first = client.authenticate().unwrap();

    db.blocking_write().expire_sessions();
    client.get_available_modules("default").unwrap();

    let second = client.session_id().unwrap();
    assert_ne!(first, second);
    let server = db.blocking_read();
    assert_eq!(server.call_count("login"), 2);
    assert_eq!(server.call_count("get_available_modules"), 2);
}

#[test]
fn cached_client_skips_repeat_calls() {
    let (url, db) = start_server();
    let client = SessionClient::cached(&config(&url));

    let mut lead = Record::new("Leads");
    lead.set("last_name", "Noether");
    client.save_record(&mut lead).unwrap();

    let a = client.get_record("Leads", lead.id(), &RecordQuery::new()).unwrap();
    let b = client.get_record("Leads", lead.id(), &RecordQuery::new()).unwrap();
    assert_eq!(a, b);
    assert_eq!(db.blocking_read().call_count("get_entry"), 1);

    client.clear_cache();
    client.get_record("Leads", lead.id(), &RecordQuery::new()).unwrap();
    assert_eq!(db.blocking_read().call_count("get_entry"), 2);

    let stats = client.caller().stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.entries, 1);
}

#[test]
fn ureq_transport_returns_status_headers_and_body() {
    let (url, _db) = start_server();
    let connection = Connection::new(&url, true);
    let request = connection.build_request("get_available_modules", &Parameters::new()).unwrap();

    let response = UreqTransport::default().execute(&request).unwrap();

    assert_eq!(response.status, 200);
    assert!(response.header("Content-Type").unwrap().starts_with("application/json"));
    assert_eq!(connection.parse_response(response).unwrap_err().failure_kind(), Some(FailureKind::InvalidSessionId));
}

#[test]
fn wrong_password_is_auth_error() {
    let (url, _db) = start_server();
    let client = SessionClient::new(&Config::new(&url, "api", "wrong"));

    let err = client.authenticate().unwrap_err();
    assert!(matches!(err, ApiError::Auth(ref e) if e.kind == FailureKind::InvalidLogin));

    // Lazy login inside a request surfaces the same error.
    let err = client.get_available_modules("all").unwrap_err();
    assert!(matches!(err, ApiError::Auth(_)));
}

#[test]
fn wrong_path_is_http_error() {
    let (url, _db) = start_server();
    let client = SessionClient::new(&config(&url.replace(REST_PATH, "/nowhere")));

    let err = client.authenticate().unwrap_err();
    assert!(matches!(err, ApiError::Http { status: 404, .. }));
}

#[test]
fn closed_port_is_transport_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = SessionClient::new(&config(&format!("http://127.0.0.1:{port}{REST_PATH}")));

    let err = client.authenticate().unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
}

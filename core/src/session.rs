//! Authenticated client for SuiteCRM's REST API.
//!
//! # Design
//! `SessionClient` owns the session id and nothing else that changes. The
//! actual call goes through a `Call` implementation: a bare `Connection`, or a
//! `CachingClient` wrapping one. Record operations map typed arguments onto
//! the ordered parameter list each server method expects, then hand the
//! response to the matching decoder in `types`.
//!
//! `request` is the workhorse: it puts the session id first, and when the
//! server reports the session as invalid it logs in again and retries once.
//! A second rejection goes back to the caller.

use std::sync::{Mutex, MutexGuard, PoisonError};

use md5::{Digest, Md5};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::cache::CachingClient;
use crate::config::Config;
use crate::connection::{Call, Connection, Parameters};
use crate::error::{ApiError, FailureCategory};
use crate::record::Record;
use crate::types::{
    decode_entries, encode_file, flag, optional_number, LinkFields, ListQuery, NoteAttachment,
    RecordPage, RecordQuery, RelatedQuery, RelationshipOutcome,
};

/// Client over a plain connection.
pub type SuiteCrm = SessionClient<Connection>;

/// Client whose calls go through a response cache.
pub type CachedSuiteCrm = SessionClient<CachingClient<Connection>>;

/// Lowercase hex MD5 of the password, the form `login` expects.
pub fn password_hash(password: &str) -> String {
    hex::encode(Md5::digest(password.as_bytes()))
}

pub struct SessionClient<C> {
    caller: C,
    username: String,
    password_hash: String,
    application_name: String,
    session: Mutex<Option<String>>,
}

impl SessionClient<Connection> {
    pub fn new(config: &Config) -> Self {
        Self::with_caller(Connection::new(&config.url, config.verify_tls), config)
    }
}

impl SessionClient<CachingClient<Connection>> {
    pub fn cached(config: &Config) -> Self {
        Self::with_caller(
            CachingClient::new(Connection::new(&config.url, config.verify_tls)),
            config,
        )
    }
}

impl<C: Call> SessionClient<CachingClient<C>> {
    pub fn clear_cache(&self) {
        self.caller.clear_cache();
    }
}

impl<C: Call> SessionClient<C> {
    pub fn with_caller(caller: C, config: &Config) -> Self {
        Self {
            caller,
            username: config.username.clone(),
            password_hash: password_hash(&config.password),
            application_name: config.application_name.clone(),
            session: Mutex::new(None),
        }
    }

    pub fn caller(&self) -> &C {
        &self.caller
    }

    pub fn session_id(&self) -> Option<String> {
        self.session().clone()
    }

    /// Log in and replace the current session.
    pub fn authenticate(&self) -> Result<String, ApiError> {
        let mut session = self.session();

        let mut user_auth = Parameters::new();
        user_auth.insert("user_name".into(), json!(self.username));
        user_auth.insert("password".into(), json!(self.password_hash));
        let mut parameters = Parameters::new();
        parameters.insert("user_auth".into(), Value::Object(user_auth));
        parameters.insert("application_name".into(), json!(self.application_name));

        let response = self
            .caller
            .call_uncached("login", &parameters)
            .map_err(|err| match err {
                ApiError::Server(e) if e.kind.category() == FailureCategory::Authentication => {
                    ApiError::Auth(e)
                }
                other => other,
            })?;
        let id = response
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::UnexpectedResponse("login response has no session id".into()))?
            .to_string();

        info!(user = %self.username, "authenticated");
        *session = Some(id.clone());
        Ok(id)
    }

    /// End the server session, if there is one.
    pub fn logout(&self) -> Result<(), ApiError> {
        let mut session = self.session();
        if let Some(id) = session.as_deref() {
            let mut parameters = Parameters::new();
            parameters.insert("session".into(), json!(id));
            // A failed logout keeps the session; the server may still hold it.
            self.caller.call_uncached("logout", &parameters)?;
            *session = None;
            info!(user = %self.username, "logged out");
        }
        Ok(())
    }

    /// A single call with no session handling.
    pub fn call(&self, method: &str, parameters: &Parameters) -> Result<Value, ApiError> {
        self.caller.call(method, parameters)
    }

    /// Call `method` with the session id prepended, logging in first if
    /// needed and once more if the server rejects the session.
    pub fn request(&self, method: &str, parameters: Parameters) -> Result<Value, ApiError> {
        let session = match self.session_id() {
            Some(id) => id,
            None => self.authenticate()?,
        };
        match self.caller.call(method, &with_session(&session, &parameters)) {
            Err(err) if err.is_invalid_session() => {
                warn!(method, "session rejected, authenticating again");
                let session = self.authenticate()?;
                self.caller.call(method, &with_session(&session, &parameters))
            }
            result => result,
        }
    }

    pub fn get_record(&self, module: &str, id: &str, query: &RecordQuery) -> Result<Record, ApiError> {
        let mut parameters = Parameters::new();
        parameters.insert("module_name".into(), json!(module));
        parameters.insert("id".into(), json!(id));
        parameters.insert("select_fields".into(), json!(query.fields));
        parameters.insert("link_name_to_fields_array".into(), LinkFields::to_value(&query.links));
        parameters.insert("track_view".into(), json!(query.track_view));

        let response = self.request("get_entry", parameters)?;
        decode_entries(module, &response)
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::UnexpectedResponse(format!("no {module} record with id {id}")))
    }

    pub fn get_records(&self, module: &str, query: &ListQuery) -> Result<RecordPage, ApiError> {
        let mut parameters = Parameters::new();
        parameters.insert("module_name".into(), json!(module));
        parameters.insert("query".into(), json!(query.query));
        parameters.insert("order_by".into(), json!(query.order_by));
        parameters.insert("offset".into(), optional_number(query.offset));
        parameters.insert("select_fields".into(), json!(query.fields));
        parameters.insert("link_name_to_fields_array".into(), LinkFields::to_value(&query.links));
        parameters.insert("max_results".into(), optional_number(query.limit));
        parameters.insert("deleted".into(), flag(query.deleted));
        parameters.insert("favorites".into(), json!(query.favorites));

        let response = self.request("get_entry_list", parameters)?;
        Ok(RecordPage::from_response(module, &response, query.offset, query.limit))
    }

    /// Create or update `record`, then copy back what the server stored.
    pub fn save_record(&self, record: &mut Record) -> Result<(), ApiError> {
        let mut parameters = Parameters::new();
        parameters.insert("module_name".into(), json!(record.module()));
        parameters.insert("name_value_list".into(), record.name_value_list());

        let response = self.request("set_entry", parameters)?;
        if let Some(entry_list) = response.get("entry_list") {
            record.assign_name_value_list(entry_list);
        }
        match response.get("id").and_then(Value::as_str) {
            Some(id) => record.set("id", id),
            None if record.id().is_empty() => {
                return Err(ApiError::UnexpectedResponse("set_entry returned no id".into()));
            }
            None => {}
        }
        Ok(())
    }

    pub fn relate(
        &self,
        module: &str,
        id: &str,
        link: &str,
        related_ids: &[&str],
    ) -> Result<RelationshipOutcome, ApiError> {
        self.set_relationship(module, id, link, related_ids, false)
    }

    pub fn unrelate(
        &self,
        module: &str,
        id: &str,
        link: &str,
        related_ids: &[&str],
    ) -> Result<RelationshipOutcome, ApiError> {
        self.set_relationship(module, id, link, related_ids, true)
    }

    fn set_relationship(
        &self,
        module: &str,
        id: &str,
        link: &str,
        related_ids: &[&str],
        delete: bool,
    ) -> Result<RelationshipOutcome, ApiError> {
        let mut parameters = Parameters::new();
        parameters.insert("module_name".into(), json!(module));
        parameters.insert("module_id".into(), json!(id));
        parameters.insert("link_field_name".into(), json!(link));
        parameters.insert("related_ids".into(), json!(related_ids));
        parameters.insert("name_value_list".into(), json!([]));
        parameters.insert("delete".into(), flag(delete));

        let response = self.request("set_relationship", parameters)?;
        Ok(RelationshipOutcome::from_response(&response))
    }

    /// Records reachable from `module`/`id` through `link`.
    pub fn get_related(
        &self,
        module: &str,
        id: &str,
        link: &str,
        query: &RelatedQuery,
    ) -> Result<Vec<Record>, ApiError> {
        let mut parameters = Parameters::new();
        parameters.insert("module_name".into(), json!(module));
        parameters.insert("module_id".into(), json!(id));
        parameters.insert("link_field_name".into(), json!(link));
        parameters.insert("related_module_query".into(), json!(query.related_module_query));
        parameters.insert("related_fields".into(), json!(query.related_fields));
        parameters.insert(
            "related_module_link_name_to_fields_array".into(),
            LinkFields::to_value(&query.related_links),
        );
        parameters.insert("deleted".into(), flag(query.deleted));
        parameters.insert("order_by".into(), json!(query.order_by));
        parameters.insert("offset".into(), optional_number(query.offset));
        parameters.insert("limit".into(), optional_number(query.limit));

        let response = self.request("get_relationships", parameters)?;
        Ok(decode_entries("", &response))
    }

    pub fn get_note_attachment(&self, note_id: &str) -> Result<NoteAttachment, ApiError> {
        let mut parameters = Parameters::new();
        parameters.insert("id".into(), json!(note_id));

        let mut response = self.request("get_note_attachment", parameters)?;
        let attachment = response
            .get_mut("note_attachment")
            .map(Value::take)
            .ok_or_else(|| ApiError::UnexpectedResponse("response has no note_attachment".into()))?;
        serde_json::from_value(attachment).map_err(|e| ApiError::DeserializationError(e.to_string()))
    }

    /// Attach a file to an existing note. Returns the note id the server reports.
    pub fn set_note_attachment(
        &self,
        note_id: &str,
        filename: &str,
        contents: &[u8],
    ) -> Result<String, ApiError> {
        let mut parameters = Parameters::new();
        parameters.insert(
            "note".into(),
            json!({"id": note_id, "filename": filename, "file": encode_file(contents)}),
        );

        let response = self.request("set_note_attachment", parameters)?;
        response
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::UnexpectedResponse("set_note_attachment returned no id".into()))
    }

    /// Render a PDF template against one record.
    pub fn get_pdf_template(&self, template_id: &str, module: &str, record_id: &str) -> Result<Value, ApiError> {
        let mut parameters = Parameters::new();
        parameters.insert("template_id".into(), json!(template_id));
        parameters.insert("bean_module".into(), json!(module));
        parameters.insert("bean_id".into(), json!(record_id));
        self.request("get_pdf_template", parameters)
    }

    /// `filter` is one of `"default"`, `"mobile"` or `"all"`.
    pub fn get_available_modules(&self, filter: &str) -> Result<Value, ApiError> {
        let mut parameters = Parameters::new();
        parameters.insert("filter".into(), json!(filter));
        self.request("get_available_modules", parameters)
    }

    /// Field definitions of `module`; an empty `fields` asks for all of them.
    pub fn get_module_fields(&self, module: &str, fields: &[&str]) -> Result<Value, ApiError> {
        let mut parameters = Parameters::new();
        parameters.insert("module_name".into(), json!(module));
        parameters.insert("fields".into(), json!(fields));
        self.request("get_module_fields", parameters)
    }

    fn session(&self) -> MutexGuard<'_, Option<String>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn with_session(session: &str, parameters: &Parameters) -> Parameters {
    let mut with_session = Parameters::new();
    with_session.insert("session".into(), json!(session));
    with_session.extend(
        parameters
            .iter()
            .filter(|(key, _)| key.as_str() != "session")
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    with_session
}

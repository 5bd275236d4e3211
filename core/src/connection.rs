//! One REST call: encode, send, decode, classify.
//!
//! # Design
//! Every SuiteCRM method is a form POST to the same URL carrying the method
//! name and a JSON `rest_data` blob. `Connection` splits that into
//! `build_request` and `parse_response` around the `Transport`, so both halves
//! can be checked without a server. It holds no session; that belongs to
//! `SessionClient`.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ApiError, ServerError};
use crate::http::{HttpRequest, HttpResponse, FORM_CONTENT_TYPE};
use crate::transport::{Transport, UreqTransport};

/// Ordered call parameters. Insertion order is kept on the wire; some server
/// versions read `rest_data` positionally.
pub type Parameters = Map<String, Value>;

/// Something that can perform a SuiteCRM method call.
pub trait Call: Send + Sync {
    fn call(&self, method: &str, parameters: &Parameters) -> Result<Value, ApiError>;

    /// Like `call`, but skips any caching layer in between.
    fn call_uncached(&self, method: &str, parameters: &Parameters) -> Result<Value, ApiError> {
        self.call(method, parameters)
    }
}

/// Sends calls to one REST endpoint through a `Transport`.
pub struct Connection<T = UreqTransport> {
    url: String,
    transport: T,
}

impl Connection<UreqTransport> {
    pub fn new(url: &str, verify_tls: bool) -> Self {
        Self::with_transport(url, UreqTransport::new(verify_tls))
    }
}

impl<T: Transport> Connection<T> {
    pub fn with_transport(url: &str, transport: T) -> Self {
        Self {
            url: url.to_string(),
            transport,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn build_request(&self, method: &str, parameters: &Parameters) -> Result<HttpRequest, ApiError> {
        let rest_data =
            serde_json::to_string(parameters).map_err(|e| ApiError::SerializationError(e.to_string()))?;
        let body = serde_urlencoded::to_string([
            ("method", method),
            ("input_type", "JSON"),
            ("response_type", "JSON"),
            ("rest_data", rest_data.as_str()),
        ])
        .map_err(|e| ApiError::SerializationError(e.to_string()))?;

        Ok(HttpRequest {
            url: self.url.clone(),
            headers: vec![("content-type".to_string(), FORM_CONTENT_TYPE.to_string())],
            body,
        })
    }

    pub fn parse_response(&self, response: HttpResponse) -> Result<Value, ApiError> {
        if !response.is_success() {
            return Err(ApiError::Http {
                status: response.status,
                body: response.body,
            });
        }
        let value: Value = serde_json::from_str(&response.body)
            .map_err(|e| ApiError::DeserializationError(e.to_string()))?;
        if is_error_payload(&value) {
            return Err(ApiError::Server(ServerError::from_payload(Some(&value))));
        }
        Ok(value)
    }
}

impl<T: Transport> Call for Connection<T> {
    fn call(&self, method: &str, parameters: &Parameters) -> Result<Value, ApiError> {
        debug!(method, url = %self.url, "sending call");
        let request = self.build_request(method, parameters)?;
        let response = self.transport.execute(&request)?;
        self.parse_response(response)
    }
}

/// The server signals failure with a body of exactly `{name, description, number}`.
///
/// A successful payload with that same shape would be misread as an error;
/// the server gives no other marker to go by.
pub fn is_error_payload(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.len() == 3
                && map.contains_key("name")
                && map.contains_key("description")
                && map.contains_key("number")
        }
        _ => false,
    }
}

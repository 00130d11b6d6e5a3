//! Blocking HTTP access to ESPER variables via `read_var`/`write_var`.

use std::time::Duration;

use esper_proto::transfer::{VariableClient, VariableError};
use esper_proto::variable::{ErrorReply, VariableDescriptor, WriteAck};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;

/// Blocking client for one ESPER node. One request timeout applies to every
/// call; credentials, if any, ride along as HTTP basic auth.
pub struct EsperHttp {
    base_url: String,
    client: Client,
    auth: Option<(String, String)>,
}

impl EsperHttp {
    /// Build a client for `base_url`. A missing scheme defaults to plain
    /// `http://`; a trailing slash is stripped.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: normalize_url(base_url),
            client,
            auth: None,
        })
    }

    /// Attach basic-auth credentials to every request.
    pub fn with_auth(mut self, user: &str, password: &str) -> Self {
        self.auth = Some((user.to_string(), password.to_string()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a variable's descriptor only (zero-length read, no data).
    pub fn read_descriptor(
        &self,
        module: &str,
        variable: &str,
    ) -> Result<VariableDescriptor, VariableError> {
        let resp = self.get(
            "read_var",
            &[
                ("mid", module.to_string()),
                ("vid", variable.to_string()),
                ("len", "0".to_string()),
                ("includeData", "n".to_string()),
            ],
        )?;
        decode_json(resp)
    }

    /// Binary-mode read of up to `len` bytes at `offset`; the body is the
    /// raw data.
    pub fn read_binary(
        &self,
        module: &str,
        variable: &str,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>, VariableError> {
        log::debug!("read {}/{} offset {} len {}", module, variable, offset, len);
        let resp = self.get(
            "read_var",
            &[
                ("mid", module.to_string()),
                ("vid", variable.to_string()),
                ("offset", offset.to_string()),
                ("len", len.to_string()),
                ("binary", "y".to_string()),
                ("dataOnly", "y".to_string()),
            ],
        )?;
        body_bytes(resp)
    }

    /// Binary-mode write of `payload` at `offset`.
    pub fn write_binary(
        &self,
        module: &str,
        variable: &str,
        offset: u64,
        payload: &[u8],
    ) -> Result<WriteAck, VariableError> {
        log::debug!(
            "write {}/{} offset {} len {}",
            module,
            variable,
            offset,
            payload.len()
        );
        let resp = self.post(
            "write_var",
            &[
                ("mid", module.to_string()),
                ("vid", variable.to_string()),
                ("offset", offset.to_string()),
                ("binary", "y".to_string()),
            ],
            payload.to_vec(),
        )?;
        decode_json(resp)
    }

    /// Read a variable with element data included (JSON mode).
    pub fn read_values(
        &self,
        module: &str,
        variable: &str,
        offset: u64,
        len: u64,
    ) -> Result<VariableDescriptor, VariableError> {
        let resp = self.get(
            "read_var",
            &[
                ("mid", module.to_string()),
                ("vid", variable.to_string()),
                ("offset", offset.to_string()),
                ("len", len.to_string()),
                ("includeData", "y".to_string()),
            ],
        )?;
        decode_json(resp)
    }

    /// Write a JSON value (single element or array) at `offset`.
    pub fn write_values(
        &self,
        module: &str,
        variable: &str,
        offset: u64,
        value: &serde_json::Value,
    ) -> Result<WriteAck, VariableError> {
        let body = serde_json::to_vec(value)
            .map_err(|e| VariableError::Fatal(format!("payload is not valid json: {e}")))?;
        let resp = self.post(
            "write_var",
            &[
                ("mid", module.to_string()),
                ("vid", variable.to_string()),
                ("offset", offset.to_string()),
            ],
            body,
        )?;
        decode_json(resp)
    }

    /// Write one value replicated across the variable's full declared
    /// length. The length probe and the write are separate requests, so a
    /// variable resized in between may end up partially filled; callers
    /// needing stronger guarantees must lock the variable themselves.
    pub fn write_fill(
        &self,
        module: &str,
        variable: &str,
        value: &serde_json::Value,
    ) -> Result<WriteAck, VariableError> {
        let desc = self.read_descriptor(module, variable)?;
        let filled = serde_json::Value::Array(vec![value.clone(); desc.len as usize]);
        self.write_values(module, variable, 0, &filled)
    }

    fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Response, VariableError> {
        let req = self
            .client
            .get(format!("{}/{}", self.base_url, endpoint))
            .query(query);
        self.send(req)
    }

    fn post(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
        body: Vec<u8>,
    ) -> Result<Response, VariableError> {
        let req = self
            .client
            .post(format!("{}/{}", self.base_url, endpoint))
            .query(query)
            .body(body);
        self.send(req)
    }

    fn send(&self, req: RequestBuilder) -> Result<Response, VariableError> {
        let req = match &self.auth {
            Some((user, password)) => req.basic_auth(user, Some(password)),
            None => req,
        };
        let resp = req.send().map_err(classify_transport)?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            let body = resp.bytes().map(|b| b.to_vec()).unwrap_or_default();
            Err(classify_status(status, &body))
        }
    }
}

impl VariableClient for EsperHttp {
    fn descriptor(
        &mut self,
        module: &str,
        variable: &str,
    ) -> Result<VariableDescriptor, VariableError> {
        self.read_descriptor(module, variable)
    }

    fn read_chunk(
        &mut self,
        module: &str,
        variable: &str,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>, VariableError> {
        self.read_binary(module, variable, offset, len)
    }

    fn write_chunk(
        &mut self,
        module: &str,
        variable: &str,
        offset: u64,
        payload: &[u8],
    ) -> Result<WriteAck, VariableError> {
        self.write_binary(module, variable, offset, payload)
    }
}

fn body_bytes(resp: Response) -> Result<Vec<u8>, VariableError> {
    resp.bytes()
        .map(|b| b.to_vec())
        .map_err(|e| VariableError::Retryable(format!("reading response body: {e}")))
}

fn decode_json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, VariableError> {
    let body = body_bytes(resp)?;
    serde_json::from_slice(&body)
        .map_err(|e| VariableError::Fatal(format!("unexpected response shape: {e}")))
}

/// Transport failures: a timed-out request is worth re-issuing; an
/// unreachable node is not.
fn classify_transport(err: reqwest::Error) -> VariableError {
    if err.is_timeout() {
        VariableError::Retryable(format!("request timed out: {err}"))
    } else {
        VariableError::Fatal(format!("transport failure: {err}"))
    }
}

/// Non-success statuses: 405 means the variable is locked or read-only and
/// will not succeed on a retry; anything else is assumed transient. The
/// node's JSON error body, when present, supplies the message.
fn classify_status(status: StatusCode, body: &[u8]) -> VariableError {
    let detail = serde_json::from_slice::<ErrorReply>(body)
        .map(|r| r.error.to_string())
        .unwrap_or_else(|_| format!("http status {status}"));
    if status == StatusCode::METHOD_NOT_ALLOWED {
        VariableError::Fatal(detail)
    } else {
        VariableError::Retryable(detail)
    }
}

fn normalize_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_gets_scheme_and_loses_trailing_slash() {
        assert_eq!(normalize_url("grif16.local:8080/"), "http://grif16.local:8080");
        assert_eq!(normalize_url("http://10.0.0.5"), "http://10.0.0.5");
        assert_eq!(normalize_url("https://node/"), "https://node");
    }

    #[test]
    fn status_405_is_fatal() {
        let err = classify_status(StatusCode::METHOD_NOT_ALLOWED, b"");
        assert!(matches!(err, VariableError::Fatal(_)));
    }

    #[test]
    fn server_errors_are_retryable() {
        for code in [500u16, 502, 503, 408] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(matches!(
                classify_status(status, b""),
                VariableError::Retryable(_)
            ));
        }
    }

    #[test]
    fn error_body_feeds_the_message() {
        let body =
            br#"{"error":{"status":405,"code":7,"meaning":"Not Allowed","message":"locked"}}"#;
        match classify_status(StatusCode::METHOD_NOT_ALLOWED, body) {
            VariableError::Fatal(msg) => {
                assert_eq!(msg, "error 405: Not Allowed (7): locked")
            }
            other => panic!("expected Fatal, got {other:?}"),
        }
    }

    #[test]
    fn opaque_body_falls_back_to_status_text() {
        match classify_status(StatusCode::INTERNAL_SERVER_ERROR, b"<html>oops</html>") {
            VariableError::Retryable(msg) => assert!(msg.contains("500")),
            other => panic!("expected Retryable, got {other:?}"),
        }
    }
}

//! HTTP plumbing for the booking API.
//!
//! [`Transport`] is the raw seam (one request in, one response out) so the
//! stores can be exercised against scripted responses. [`SecureClient`] sits on
//! top of it and adds the anti-forgery header plus a single refresh-and-retry
//! when the session has expired.

use crate::config::ApiConfig;
use crate::error::{extract_message, ApiError};
use crate::session::SessionCell;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

pub const ME_PATH: &str = "/auth/me/";
pub const LOGIN_PATH: &str = "/auth/login/";
pub const LOGOUT_PATH: &str = "/auth/logout/";
pub const REFRESH_PATH: &str = "/auth/refresh/";
pub const REGISTER_PATH: &str = "/auth/register/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// A request relative to the API base URL
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Convert a non-OK response into an error, preferring the server's message
    pub fn into_error(self, fallback: &str) -> ApiError {
        ApiError::Status {
            code: self.status,
            message: extract_message(&self.body).unwrap_or_else(|| fallback.to_string()),
        }
    }
}

/// Raw request execution against the API.
///
/// Implementations must carry cookies between calls and return non-2xx
/// statuses as `Ok` responses; only transport failures are `Err`.
pub trait Transport: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;

    /// Current value of a cookie held for the API origin
    fn cookie(&self, name: &str) -> Option<String>;
}

/// Production transport: a `ureq` agent with a cookie jar
pub struct UreqTransport {
    base_url: String,
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(base_url: &str, timeout_ms: u64) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut req = self.agent.request(request.method.as_str(), &url);
        for (name, value) in &request.headers {
            req = req.set(name, value);
        }

        let result = match &request.body {
            Some(body) => req.send_json(body.clone()),
            None => req.call(),
        };

        match result {
            Ok(r) => {
                let status = r.status();
                let body = r
                    .into_string()
                    .map_err(|e| ApiError::Network(format!("failed to read body: {}", e)))?;
                Ok(ApiResponse::new(status, body))
            }
            Err(ureq::Error::Status(code, r)) => {
                let body = r.into_string().unwrap_or_default();
                Ok(ApiResponse::new(code, body))
            }
            Err(e) => Err(ApiError::Network(e.to_string())),
        }
    }

    fn cookie(&self, name: &str) -> Option<String> {
        let store = self.agent.cookie_store();
        let found = store
            .iter_unexpired()
            .find(|c| c.name() == name)
            .map(|c| c.value().to_string());
        found
    }
}

/// Request wrapper that attaches the CSRF header and recovers once from an
/// expired session.
pub struct SecureClient {
    transport: Box<dyn Transport>,
    csrf_cookie: String,
    csrf_header: String,
    session: SessionCell,
}

impl SecureClient {
    pub fn new(transport: Box<dyn Transport>, api: &ApiConfig, session: SessionCell) -> Self {
        Self {
            transport,
            csrf_cookie: api.csrf_cookie.clone(),
            csrf_header: api.csrf_header.clone(),
            session,
        }
    }

    /// Identity cell cleared by this client when a refresh fails
    pub fn session(&self) -> &SessionCell {
        &self.session
    }

    pub fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.execute(Method::Get, path, None)
    }

    pub fn post(&self, path: &str, body: Option<Value>) -> Result<ApiResponse, ApiError> {
        self.execute(Method::Post, path, body)
    }

    pub fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.execute(Method::Delete, path, None)
    }

    /// Send a request; on 401 refresh the session once and retry once.
    ///
    /// A 401 from the retried request is returned as-is. If the refresh itself
    /// fails the session is torn down and `SessionExpired` is returned.
    pub fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse, ApiError> {
        let request = self.prepare(method, path, body);
        debug!(method = method.as_str(), path, "api request");
        let response = self.transport.send(&request)?;
        debug!(path, status = response.status, "api response");

        if response.status != 401 || is_refresh_path(path) {
            return Ok(response);
        }

        debug!(path, "session expired, attempting refresh");
        match self.refresh() {
            Ok(()) => {
                // The refresh may have rotated the CSRF cookie
                let retry = self.prepare(method, path, request.body);
                let response = self.transport.send(&retry)?;
                debug!(path, status = response.status, "api response after refresh");
                Ok(response)
            }
            Err(err) => {
                warn!(path, error = %err, "session refresh failed, logging out");
                self.end_session();
                Err(ApiError::SessionExpired)
            }
        }
    }

    fn prepare(&self, method: Method, path: &str, body: Option<Value>) -> ApiRequest {
        let token = self.transport.cookie(&self.csrf_cookie).unwrap_or_default();
        ApiRequest {
            method,
            path: path.to_string(),
            headers: vec![
                (self.csrf_header.clone(), token),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body,
        }
    }

    fn refresh(&self) -> Result<(), ApiError> {
        let request = self.prepare(Method::Post, REFRESH_PATH, None);
        let response = self.transport.send(&request)?;
        if response.is_ok() {
            Ok(())
        } else {
            Err(response.into_error("Refresh failed"))
        }
    }

    /// Best-effort server logout that never refreshes, then drop local identity
    fn end_session(&self) {
        let request = self.prepare(Method::Post, LOGOUT_PATH, None);
        if let Err(e) = self.transport.send(&request) {
            debug!(error = %e, "logout after failed refresh did not reach server");
        }
        self.session.clear();
    }
}

fn is_refresh_path(path: &str) -> bool {
    path.contains(REFRESH_PATH.trim_end_matches('/'))
}

#[cfg(test)]
pub mod testing {
    //! Scripted transport for store tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    type Handler = Box<dyn Fn(&ApiRequest, usize) -> Result<ApiResponse, ApiError> + Send + Sync>;

    /// Answers requests through a closure that also receives how many times the
    /// same method and path were requested before.
    pub struct ScriptedTransport {
        handler: Handler,
        cookies: HashMap<String, String>,
        log: Mutex<Vec<ApiRequest>>,
    }

    impl ScriptedTransport {
        pub fn new<F>(handler: F) -> Self
        where
            F: Fn(&ApiRequest, usize) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
        {
            Self {
                handler: Box::new(handler),
                cookies: HashMap::new(),
                log: Mutex::new(Vec::new()),
            }
        }

        pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
            self.cookies.insert(name.to_string(), value.to_string());
            self
        }
    }

    impl ApiRequest {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    impl ApiResponse {
        pub fn json_body(status: u16, body: &Value) -> Self {
            Self::new(status, body.to_string())
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
            let seen = {
                let mut log = self.log.lock().unwrap();
                let seen = log
                    .iter()
                    .filter(|r| r.method == request.method && r.path == request.path)
                    .count();
                log.push(request.clone());
                seen
            };
            (self.handler)(request, seen)
        }

        fn cookie(&self, name: &str) -> Option<String> {
            self.cookies.get(name).cloned()
        }
    }

    /// Shares a transport's request log after it has been boxed into a client
    pub struct Recorded(pub std::sync::Arc<ScriptedTransport>);

    impl Recorded {
        pub fn requests(&self) -> Vec<ApiRequest> {
            self.0.log.lock().unwrap().clone()
        }

        pub fn paths(&self) -> Vec<String> {
            self.requests()
                .iter()
                .map(|r| format!("{} {}", r.method.as_str(), r.path))
                .collect()
        }

        pub fn count(&self, method: Method, path: &str) -> usize {
            self.requests()
                .iter()
                .filter(|r| r.method == method && r.path == path)
                .count()
        }
    }

    impl Transport for std::sync::Arc<ScriptedTransport> {
        fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
            self.as_ref().send(request)
        }

        fn cookie(&self, name: &str) -> Option<String> {
            self.as_ref().cookie(name)
        }
    }

    /// Client plus a handle on everything it sent
    pub fn client_with<F>(handler: F) -> (std::sync::Arc<SecureClient>, Recorded)
    where
        F: Fn(&ApiRequest, usize) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
    {
        let transport = std::sync::Arc::new(
            ScriptedTransport::new(handler).with_cookie("csrftoken", "tok-123"),
        );
        let client = SecureClient::new(
            Box::new(transport.clone()),
            &ApiConfig::default(),
            SessionCell::new(),
        );
        (std::sync::Arc::new(client), Recorded(transport))
    }
}

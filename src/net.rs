//! HTTP surface: request/response value types, classification helpers, and
//! the `Network` trait the agent fetches through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AgentError, Result};

/// HTTP method of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Delete,
  Patch,
}

impl Method {
  /// Only GET requests are eligible for interception and caching.
  pub fn is_get(self) -> bool {
    matches!(self, Method::Get)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
      Method::Patch => "PATCH",
    }
  }
}

/// An outbound request as seen by the agent.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: String,
  /// Value of the Accept header, if the caller sent one.
  pub accept: Option<String>,
  /// JSON body for write requests.
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      url: url.into(),
      accept: None,
      body: None,
    }
  }

  pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
    self.accept = Some(accept.into());
    self
  }

  /// Build a JSON POST, used for order submission and replay.
  pub fn post_json(url: impl Into<String>, payload: &serde_json::Value) -> Result<Self> {
    let body = serde_json::to_vec(payload)
      .map_err(|e| AgentError::Storage(format!("failed to serialize payload: {}", e)))?;

    Ok(Self {
      method: Method::Post,
      url: url.into(),
      accept: None,
      body: Some(body),
    })
  }

  /// Does the caller expect an HTML document back?
  pub fn accepts_html(&self) -> bool {
    self
      .accept
      .as_deref()
      .is_some_and(|a| a.contains("text/html"))
  }
}

/// A response, either live from the network or reconstructed from cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
  /// Final URL after redirects.
  pub url: String,
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Synthetic response served when a request has no cache and no network.
  pub fn request_timeout(url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      status: 408,
      headers: vec![("content-type".to_string(), "text/plain".to_string())],
      body: b"Network error occurred".to_vec(),
    }
  }
}

/// True for http/https URLs; anything else (extension schemes, data URLs)
/// passes through unintercepted.
pub fn is_http(url: &str) -> bool {
  Url::parse(url)
    .map(|u| matches!(u.scheme(), "http" | "https"))
    .unwrap_or(false)
}

/// Compare scheme + host + port of two URLs. Unparseable URLs never match.
pub fn same_origin(a: &str, b: &str) -> bool {
  match (Url::parse(a), Url::parse(b)) {
    (Ok(a), Ok(b)) => a.origin() == b.origin(),
    _ => false,
  }
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Image detection by URL path extension, for the offline placeholder
/// fallback.
pub fn is_image_url(url: &str) -> bool {
  let Ok(parsed) = Url::parse(url) else {
    return false;
  };

  parsed
    .path()
    .rsplit_once('.')
    .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Network abstraction so the agent can be driven with a scripted fake in
/// tests and reqwest in production.
#[async_trait]
pub trait Network: Send + Sync {
  async fn send(&self, request: &Request) -> Result<Response>;
}

/// reqwest-backed network client.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| AgentError::Network(format!("failed to build HTTP client: {}", e)))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn send(&self, request: &Request) -> Result<Response> {
    let mut builder = match request.method {
      Method::Get => self.client.get(&request.url),
      Method::Head => self.client.head(&request.url),
      Method::Post => self.client.post(&request.url),
      Method::Put => self.client.put(&request.url),
      Method::Delete => self.client.delete(&request.url),
      Method::Patch => self.client.patch(&request.url),
    };

    if let Some(accept) = &request.accept {
      builder = builder.header(reqwest::header::ACCEPT, accept);
    }

    if let Some(body) = &request.body {
      builder = builder
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| AgentError::Network(format!("{}: {}", request.url, e)))?;

    let url = response.url().to_string();
    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| AgentError::Network(format!("{}: {}", request.url, e)))?
      .to_vec();

    Ok(Response {
      url,
      status,
      headers,
      body,
    })
  }
}

#[cfg(test)]
pub mod testing {
  //! Scripted network fake shared by the module tests.

  use std::collections::HashMap;
  use std::sync::Mutex;

  use super::*;

  /// Fake network that serves stubbed responses and records every call.
  pub struct FakeNetwork {
    responses: Mutex<HashMap<String, Response>>,
    offline: Mutex<bool>,
    fail_next: Mutex<usize>,
    calls: Mutex<Vec<String>>,
  }

  impl FakeNetwork {
    pub fn new() -> Self {
      Self {
        responses: Mutex::new(HashMap::new()),
        offline: Mutex::new(false),
        fail_next: Mutex::new(0),
        calls: Mutex::new(Vec::new()),
      }
    }

    pub fn stub(&self, url: &str, response: Response) {
      self.responses.lock().unwrap().insert(url.to_string(), response);
    }

    /// Stub a 200 response with the given body.
    pub fn stub_ok(&self, url: &str, body: &[u8]) {
      self.stub(
        url,
        Response {
          url: url.to_string(),
          status: 200,
          headers: Vec::new(),
          body: body.to_vec(),
        },
      );
    }

    pub fn set_offline(&self, offline: bool) {
      *self.offline.lock().unwrap() = offline;
    }

    /// Fail the next `count` sends, then serve stubs again.
    pub fn fail_next(&self, count: usize) {
      *self.fail_next.lock().unwrap() = count;
    }

    pub fn call_count(&self) -> usize {
      self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
      self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }
  }

  #[async_trait]
  impl Network for FakeNetwork {
    async fn send(&self, request: &Request) -> Result<Response> {
      self.calls.lock().unwrap().push(request.url.clone());

      if *self.offline.lock().unwrap() {
        return Err(AgentError::Network(format!(
          "{}: connection refused",
          request.url
        )));
      }

      {
        let mut fail_next = self.fail_next.lock().unwrap();
        if *fail_next > 0 {
          *fail_next -= 1;
          return Err(AgentError::Network(format!(
            "{}: connection reset",
            request.url
          )));
        }
      }

      self
        .responses
        .lock()
        .unwrap()
        .get(&request.url)
        .cloned()
        .ok_or_else(|| AgentError::Network(format!("{}: no route to host", request.url)))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn get_requests_are_interceptable() {
    assert!(Method::Get.is_get());
    assert!(!Method::Post.is_get());
    assert!(!Method::Head.is_get());
  }

  #[test]
  fn http_and_https_only() {
    assert!(is_http("https://shop.example/index.html"));
    assert!(is_http("http://shop.example/"));
    assert!(!is_http("chrome-extension://abcdef/page.html"));
    assert!(!is_http("data:text/plain,hello"));
    assert!(!is_http("not a url"));
  }

  #[test]
  fn same_origin_compares_scheme_host_port() {
    assert!(same_origin(
      "https://shop.example/a.css",
      "https://shop.example/"
    ));
    assert!(!same_origin(
      "https://cdn.example/a.css",
      "https://shop.example/"
    ));
    assert!(!same_origin(
      "http://shop.example/a.css",
      "https://shop.example/"
    ));
  }

  #[test]
  fn image_detection_by_extension() {
    assert!(is_image_url("https://shop.example/img/hero.webp"));
    assert!(is_image_url("https://shop.example/img/logo.PNG"));
    assert!(is_image_url("https://shop.example/photo.jpeg?w=400"));
    assert!(!is_image_url("https://shop.example/styles.css"));
    assert!(!is_image_url("https://shop.example/products"));
  }

  #[test]
  fn html_accept_detection() {
    let page = Request::get("https://shop.example/mens.html")
      .with_accept("text/html,application/xhtml+xml");
    assert!(page.accepts_html());

    let api = Request::get("https://shop.example/api").with_accept("application/json");
    assert!(!api.accepts_html());

    assert!(!Request::get("https://shop.example/x").accepts_html());
  }

  #[test]
  fn synthetic_timeout_shape() {
    let resp = Response::request_timeout("https://shop.example/x");
    assert_eq!(resp.status, 408);
    assert_eq!(resp.body, b"Network error occurred");
    assert!(resp
      .headers
      .iter()
      .any(|(k, v)| k == "content-type" && v == "text/plain"));
  }
}

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};
use url::Url;

use crate::error::{BridgeError, Result};

/// Path of the SOAP endpoint relative to the Jira base url.
pub const SERVICE_PATH: &str = "rpc/soap/jirasoapservice-v2";

/// Raw reply to a posted envelope.
#[derive(Debug, Clone)]
pub struct SoapResponse {
  pub status: u16,
  pub body: String,
}

impl SoapResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Carries request envelopes to the remote service.
///
/// Implementations return the response body regardless of the HTTP status:
/// Axis reports faults with status 500 and a regular SOAP body.
#[async_trait]
pub trait SoapTransport: Send + Sync {
  async fn post(&self, method: &str, envelope: String) -> Result<SoapResponse>;
}

/// HTTP transport backed by reqwest.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  endpoint: Url,
}

impl HttpTransport {
  pub fn new(base_url: &str) -> Result<Self> {
    let endpoint = service_url(base_url)?;
    let client = reqwest::Client::builder()
      .build()
      .map_err(|source| BridgeError::Http {
        context: "Failed to create HTTP client".to_string(),
        source,
      })?;
    Ok(Self { client, endpoint })
  }

  /// Check that the service description can be fetched.
  ///
  /// Returns a transport ready for use, or `None` if the service is
  /// unreachable (bad url, DNS failure, non-success status).
  pub async fn probe(base_url: &str) -> Option<Self> {
    let transport = match Self::new(base_url) {
      Ok(t) => t,
      Err(e) => {
        warn!(base_url, error = %e, "invalid Jira url");
        return None;
      }
    };

    let mut wsdl = transport.endpoint.clone();
    wsdl.set_query(Some("wsdl"));

    match transport.client.get(wsdl.clone()).send().await {
      Ok(resp) if resp.status().is_success() => {
        debug!(%wsdl, "SOAP service available");
        Some(transport)
      }
      Ok(resp) => {
        warn!(%wsdl, status = %resp.status(), "SOAP service description unavailable");
        None
      }
      Err(e) => {
        warn!(%wsdl, error = %e, "SOAP service unreachable");
        None
      }
    }
  }

}

#[async_trait]
impl SoapTransport for HttpTransport {
  async fn post(&self, method: &str, envelope: String) -> Result<SoapResponse> {
    debug!(method, endpoint = %self.endpoint, "SOAP request");

    let resp = self
      .client
      .post(self.endpoint.clone())
      .header(CONTENT_TYPE, "text/xml; charset=utf-8")
      .header("SOAPAction", "\"\"")
      .body(envelope)
      .send()
      .await
      .map_err(|source| BridgeError::Http {
        context: format!("{} failed", method),
        source,
      })?;

    let status = resp.status();
    let body = resp
      .text()
      .await
      .map_err(|source| BridgeError::Http {
        context: format!("Failed to read {} response", method),
        source,
      })?;

    debug!(method, %status, bytes = body.len(), "SOAP response");
    Ok(SoapResponse {
      status: status.as_u16(),
      body,
    })
  }
}

/// Resolve the SOAP endpoint for a Jira base url.
pub fn service_url(base_url: &str) -> Result<Url> {
  let mut base = Url::parse(base_url)
    .map_err(|e| BridgeError::Transport(format!("Invalid url {}: {}", base_url, e)))?;
  if !base.path().ends_with('/') {
    let path = format!("{}/", base.path());
    base.set_path(&path);
  }
  base
    .join(SERVICE_PATH)
    .map_err(|e| BridgeError::Transport(format!("Invalid url {}: {}", base_url, e)))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_service_url_plain_host() {
    let url = service_url("https://jira.example.com").unwrap();
    assert_eq!(
      url.as_str(),
      "https://jira.example.com/rpc/soap/jirasoapservice-v2"
    );
  }

  #[test]
  fn test_service_url_keeps_context_path() {
    let url = service_url("https://example.com/jira").unwrap();
    assert_eq!(
      url.as_str(),
      "https://example.com/jira/rpc/soap/jirasoapservice-v2"
    );
    let url = service_url("https://example.com/jira/").unwrap();
    assert_eq!(
      url.as_str(),
      "https://example.com/jira/rpc/soap/jirasoapservice-v2"
    );
  }

  #[test]
  fn test_service_url_rejects_garbage() {
    assert!(matches!(
      service_url("not a url"),
      Err(BridgeError::Transport(_))
    ));
  }

  #[test]
  fn test_response_success_range() {
    let response = |status| SoapResponse {
      status,
      body: String::new(),
    };
    assert!(response(200).is_success());
    assert!(!response(500).is_success());
    assert!(!response(401).is_success());
  }

  #[tokio::test]
  async fn test_post_to_unreachable_host_keeps_cause() {
    let transport = HttpTransport::new("http://127.0.0.1:1").unwrap();
    let err = transport
      .post("getServerInfo", String::new())
      .await
      .unwrap_err();
    assert!(matches!(err, BridgeError::Http { .. }));
    assert!(std::error::Error::source(&err).is_some());
  }

  #[tokio::test]
  async fn test_probe_unreachable_host() {
    assert!(HttpTransport::probe("http://127.0.0.1:1").await.is_none());
  }
}

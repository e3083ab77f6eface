//! The slice of SOAP 1.1 RPC/encoded needed to talk to Jira's
//! `jirasoapservice-v2`: request envelopes, response decoding and transport.

pub mod decode;
pub mod envelope;
mod transport;

pub use envelope::SoapValue;
pub use transport::{service_url, HttpTransport, SoapResponse, SoapTransport};

use serde_json::Value;
use tracing::debug;

use crate::error::{BridgeError, Result};

/// Invokes remote operations over a transport.
pub struct SoapClient<T: SoapTransport> {
  transport: T,
}

impl<T: SoapTransport> SoapClient<T> {
  pub fn new(transport: T) -> Self {
    Self { transport }
  }

  /// Call `method` and decode its return value.
  ///
  /// A body that is not SOAP is reported with its HTTP status when the
  /// status is not a success (proxy error pages, rejected credentials).
  pub async fn invoke(&self, method: &str, args: &[SoapValue]) -> Result<Option<Value>> {
    let response = self
      .transport
      .post(method, envelope::request(method, args))
      .await?;
    let result = match decode::response(&response.body) {
      Err(BridgeError::Protocol(detail)) if !response.is_success() => Err(BridgeError::Transport(
        format!("{} returned HTTP {}: {}", method, response.status, detail),
      )),
      other => other,
    };
    if let Err(e) = &result {
      debug!(method, error = %e, "SOAP call failed");
    }
    result
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;

  struct FixedTransport(SoapResponse);

  #[async_trait]
  impl SoapTransport for FixedTransport {
    async fn post(&self, _method: &str, _envelope: String) -> Result<SoapResponse> {
      Ok(self.0.clone())
    }
  }

  fn client(status: u16, body: &str) -> SoapClient<FixedTransport> {
    SoapClient::new(FixedTransport(SoapResponse {
      status,
      body: body.to_string(),
    }))
  }

  const FAULT: &str = r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"><soapenv:Body><soapenv:Fault><faultcode>soapenv:Server</faultcode><faultstring>Issue does not exist</faultstring></soapenv:Fault></soapenv:Body></soapenv:Envelope>"#;

  #[tokio::test]
  async fn test_error_page_reports_status() {
    let err = client(502, "<html><body>Bad Gateway</body></html>")
      .invoke("getIssue", &[])
      .await
      .unwrap_err();
    match err {
      BridgeError::Transport(message) => assert!(message.contains("HTTP 502"), "{}", message),
      other => panic!("expected transport error, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_fault_with_error_status_stays_fault() {
    let err = client(500, FAULT).invoke("getIssue", &[]).await.unwrap_err();
    assert!(err.is_fault());
  }

  #[tokio::test]
  async fn test_garbage_with_success_status_is_protocol_error() {
    let err = client(200, "not xml at all <")
      .invoke("getIssue", &[])
      .await
      .unwrap_err();
    assert!(matches!(err, BridgeError::Protocol(_)));
  }
}

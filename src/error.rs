use thiserror::Error;

/// Errors surfaced by the SOAP bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
  #[error("Unable to reach the Jira SOAP service. Check the configured url.")]
  Initialization,

  #[error("Authentication failed. Check your username and password.")]
  Authentication,

  #[error("{0}")]
  Usage(String),

  #[error("{0}")]
  Cli(String),

  #[error("Remote fault ({code}): {message}")]
  Fault { code: String, message: String },

  #[error("Transport error: {0}")]
  Transport(String),

  #[error("HTTP request failed: {context}")]
  Http {
    context: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("Malformed SOAP response: {0}")]
  Protocol(String),

  #[error("Failed to persist configuration: {0}")]
  Config(String),

  #[error("Cache error: {0}")]
  Cache(String),
}

impl BridgeError {
  pub fn is_fault(&self) -> bool {
    matches!(self, BridgeError::Fault { .. })
  }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

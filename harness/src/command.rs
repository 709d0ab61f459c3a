//! Typed run requests and their validation.

use crate::dispatch::RequestShape;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("A target agent URL is required")]
    MissingTargetUrl,

    #[error("Invalid target agent URL '{url}': {reason}")]
    InvalidTargetUrl { url: String, reason: String },

    #[error("Unsupported URL scheme '{scheme}'; expected http or https")]
    UnsupportedScheme { scheme: String },
}

pub type CommandResult<T> = Result<T, CommandError>;

/// Validated base address of a target agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAddress(reqwest::Url);

impl TargetAddress {
    pub fn parse(raw: &str) -> CommandResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CommandError::MissingTargetUrl);
        }

        let url = reqwest::Url::parse(trimmed).map_err(|e| CommandError::InvalidTargetUrl {
            url: trimmed.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(CommandError::UnsupportedScheme {
                    scheme: other.to_string(),
                })
            }
        }

        if url.host_str().is_none() {
            return Err(CommandError::InvalidTargetUrl {
                url: trimmed.to_string(),
                reason: "missing host".to_string(),
            });
        }

        Ok(Self(url))
    }

    pub fn as_url(&self) -> &reqwest::Url {
        &self.0
    }

    /// The address itself, where JSON-RPC messages are posted.
    pub fn rpc_url(&self) -> reqwest::Url {
        self.0.clone()
    }

    /// `<target>/profile`, keeping any path prefix of the address.
    pub fn profile_url(&self) -> String {
        format!("{}/profile", self.0.as_str().trim_end_matches('/'))
    }
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl std::str::FromStr for TargetAddress {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Unvalidated run parameters, as received from a caller or the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub shape: Option<RequestShape>,
}

impl EvaluationRequest {
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: Some(target_url.into()),
            shape: None,
        }
    }

    pub fn with_shape(mut self, shape: RequestShape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Check the request before anything is sent anywhere.
    pub fn validate(self) -> CommandResult<EvaluationCommand> {
        let raw = self.target_url.ok_or(CommandError::MissingTargetUrl)?;
        Ok(EvaluationCommand {
            target: TargetAddress::parse(&raw)?,
            shape: self.shape,
        })
    }
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationCommand {
    pub target: TargetAddress,
    /// Overrides the configured request shape when set.
    pub shape: Option<RequestShape>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_request() {
        let command = EvaluationRequest::new("http://localhost:9009/")
            .with_shape(RequestShape::PersonaAndQuestion)
            .validate()
            .unwrap();
        assert_eq!(command.target.profile_url(), "http://localhost:9009/profile");
        assert_eq!(command.shape, Some(RequestShape::PersonaAndQuestion));
    }

    #[test]
    fn test_missing_url() {
        assert_eq!(
            EvaluationRequest::default().validate(),
            Err(CommandError::MissingTargetUrl)
        );
        assert_eq!(
            EvaluationRequest::new("   ").validate(),
            Err(CommandError::MissingTargetUrl)
        );
    }

    #[test]
    fn test_invalid_urls() {
        assert!(matches!(
            TargetAddress::parse("not a url"),
            Err(CommandError::InvalidTargetUrl { .. })
        ));
        assert_eq!(
            TargetAddress::parse("ftp://agent.example"),
            Err(CommandError::UnsupportedScheme {
                scheme: "ftp".to_string()
            })
        );
    }

    #[test]
    fn test_profile_url_keeps_prefix() {
        let target: TargetAddress = "https://agents.example/white".parse().unwrap();
        assert_eq!(target.profile_url(), "https://agents.example/white/profile");
        assert_eq!(target.to_string(), "https://agents.example/white");
    }

    #[test]
    fn test_request_deserializes() {
        let request: EvaluationRequest = serde_json::from_str(
            r#"{"target_url": "http://127.0.0.1:8000", "shape": "question-only"}"#,
        )
        .unwrap();
        let command = request.validate().unwrap();
        assert_eq!(command.shape, Some(RequestShape::QuestionOnly));
    }
}

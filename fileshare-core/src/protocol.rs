// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Request/response envelopes shared by every transport.
//!
//! On the broker the envelopes travel as JSON bodies:
//! request `{operation, file_name?, file_data?}` and response
//! `{success, message?, files?, file_data?, file_name?}`, with binary
//! payloads base64-encoded. Correlation and reply addressing are message
//! metadata and never appear in the body.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three operations of the file service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    List,
    Upload,
    Download,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::List, Operation::Upload, Operation::Download];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Upload => "upload",
            Operation::Download => "download",
        }
    }

    /// Whether the operation moves a payload and therefore has a size class.
    pub const fn carries_payload(&self) -> bool {
        !matches!(self, Operation::List)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(Operation::List),
            "upload" => Ok(Operation::Upload),
            "download" => Ok(Operation::Download),
            other => Err(EnvelopeError::UnknownOperation(other.to_string())),
        }
    }
}

/// Envelope decoding failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The body is not a well-formed envelope; the message is poison.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// The body is well-formed but names an operation nobody implements.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
}

/// The logical unit sent over either transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub operation: Operation,
    pub file_name: Option<String>,
    pub payload: Option<Vec<u8>>,
}

impl RequestEnvelope {
    pub fn list() -> Self {
        Self {
            operation: Operation::List,
            file_name: None,
            payload: None,
        }
    }

    pub fn upload(file_name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            operation: Operation::Upload,
            file_name: Some(file_name.into()),
            payload: Some(payload.into()),
        }
    }

    pub fn download(file_name: impl Into<String>) -> Self {
        Self {
            operation: Operation::Download,
            file_name: Some(file_name.into()),
            payload: None,
        }
    }

    /// File name or the empty string when absent.
    pub fn file_name_or_empty(&self) -> &str {
        self.file_name.as_deref().unwrap_or("")
    }

    pub fn to_json(&self) -> Result<Vec<u8>, EnvelopeError> {
        let wire = WireRequest {
            operation: self.operation.as_str().to_string(),
            file_name: self.file_name.clone(),
            file_data: self.payload.clone(),
        };
        serde_json::to_vec(&wire).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }

    pub fn from_json(body: &[u8]) -> Result<Self, EnvelopeError> {
        let wire: WireRequest =
            serde_json::from_slice(body).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        let operation = wire.operation.parse()?;
        Ok(Self {
            operation,
            file_name: wire.file_name,
            payload: wire.file_data,
        })
    }
}

/// Request as it appears on the wire; the operation stays a string so that
/// an unknown operation is distinguishable from a malformed body.
#[derive(Debug, Serialize, Deserialize)]
struct WireRequest {
    operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    file_data: Option<Vec<u8>>,
}

/// Reply to one request.
///
/// `files` is only set on List replies; `file_name` and `payload` only on
/// successful Download replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(
        rename = "file_data",
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_bytes"
    )]
    pub payload: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl ResponseEnvelope {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            files: None,
            payload: None,
            file_name: None,
        }
    }

    pub fn listing(files: Vec<String>) -> Self {
        Self {
            success: true,
            message: format!("{} file(s) found", files.len()),
            files: Some(files),
            payload: None,
            file_name: None,
        }
    }

    pub fn uploaded(file_name: &str) -> Self {
        Self {
            success: true,
            message: format!("file {} uploaded", file_name),
            files: None,
            payload: None,
            file_name: None,
        }
    }

    pub fn downloaded(file_name: &str, payload: Vec<u8>) -> Self {
        Self {
            success: true,
            message: format!("file {} downloaded", file_name),
            files: None,
            payload: Some(payload),
            file_name: Some(file_name.to_string()),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }

    pub fn from_json(body: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(body).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|text| STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request = RequestEnvelope::upload("a.txt", b"hi".to_vec());
        let json: serde_json::Value = serde_json::from_slice(&request.to_json().unwrap()).unwrap();

        assert_eq!(json["operation"], "upload");
        assert_eq!(json["file_name"], "a.txt");
        // base64("hi")
        assert_eq!(json["file_data"], "aGk=");
    }

    #[test]
    fn test_list_request_omits_optional_fields() {
        let body = RequestEnvelope::list().to_json().unwrap();
        assert_eq!(body, br#"{"operation":"list"}"#.to_vec());
    }

    #[test]
    fn test_unknown_operation_is_not_malformed() {
        let err = RequestEnvelope::from_json(br#"{"operation":"delete"}"#).unwrap_err();
        assert_eq!(err, EnvelopeError::UnknownOperation("delete".to_string()));

        let err = RequestEnvelope::from_json(b"not json").unwrap_err();
        assert!(matches!(err, EnvelopeError::Malformed(_)));
    }

    #[test]
    fn test_invalid_base64_is_malformed() {
        let err = RequestEnvelope::from_json(
            br#"{"operation":"upload","file_name":"x","file_data":"***"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, EnvelopeError::Malformed(_)));
    }

    #[test]
    fn test_download_response_carries_payload_and_name() {
        let response = ResponseEnvelope::downloaded("f.bin", vec![0, 1, 2, 255]);
        let decoded = ResponseEnvelope::from_json(&response.to_json().unwrap()).unwrap();

        assert!(decoded.success);
        assert_eq!(decoded.payload.as_deref(), Some(&[0u8, 1, 2, 255][..]));
        assert_eq!(decoded.file_name.as_deref(), Some("f.bin"));
        assert!(decoded.files.is_none());
    }

    #[test]
    fn test_failure_response_omits_payload_fields() {
        let body = ResponseEnvelope::failure("nope").to_json().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "nope");
        assert!(json.get("file_data").is_none());
        assert!(json.get("files").is_none());
    }

    #[test]
    fn test_operation_parse() {
        assert_eq!("download".parse::<Operation>().unwrap(), Operation::Download);
        assert!("LIST".parse::<Operation>().is_err());
        assert!(!Operation::List.carries_payload());
        assert!(Operation::Upload.carries_payload());
    }
}

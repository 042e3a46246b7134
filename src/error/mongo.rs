use std::fmt;

use serde::Serialize;

/// Structured summary of a MongoDB driver error.
///
/// Export failures end up in a toast or a log line, so only the parts a user
/// can act on are kept.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_name: Option<String>,
    pub message: String,
}

impl ErrorInfo {
    /// Single-line rendering: `[CodeName (code)] message`.
    pub fn summary(&self) -> String {
        match (&self.code_name, self.code) {
            (Some(name), Some(code)) => format!("{name} ({code}): {}", self.message),
            (None, Some(code)) => format!("code {code}: {}", self.message),
            _ => self.message.clone(),
        }
    }
}

/// Render a driver error for `MongoExportError::MongoDb`.
pub fn format_mongodb_error(
    f: &mut fmt::Formatter<'_>,
    error: &mongodb::error::Error,
) -> fmt::Result {
    write!(f, "MongoDB error: {}", extract_error_info(error).summary())
}

/// Extract structured information from a driver error.
///
/// Export only reads, so command and server-selection failures are the
/// interesting cases; everything else falls back to the driver's message.
pub fn extract_error_info(error: &mongodb::error::Error) -> ErrorInfo {
    use mongodb::error::ErrorKind;

    match error.kind.as_ref() {
        ErrorKind::Command(command_error) => ErrorInfo {
            error_type: Some("mongo.command_error"),
            code: Some(command_error.code),
            code_name: Some(command_error.code_name.clone()).filter(|n| !n.is_empty()),
            message: command_error.message.clone(),
        },
        ErrorKind::Authentication { message, .. } => ErrorInfo {
            error_type: Some("mongo.authentication_error"),
            message: message.clone(),
            ..ErrorInfo::default()
        },
        ErrorKind::InvalidArgument { message, .. } => ErrorInfo {
            error_type: Some("mongo.invalid_argument"),
            message: message.clone(),
            ..ErrorInfo::default()
        },
        ErrorKind::ServerSelection { message, .. } => ErrorInfo {
            error_type: Some("mongo.server_selection_error"),
            message: message.clone(),
            ..ErrorInfo::default()
        },
        _ => ErrorInfo {
            message: error.to_string(),
            ..ErrorInfo::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_with_code_name() {
        let info = ErrorInfo {
            error_type: Some("mongo.command_error"),
            code: Some(50),
            code_name: Some("MaxTimeMSExpired".to_string()),
            message: "operation exceeded time limit".to_string(),
        };
        assert_eq!(
            info.summary(),
            "MaxTimeMSExpired (50): operation exceeded time limit"
        );
    }

    #[test]
    fn test_summary_message_only() {
        let info = ErrorInfo {
            message: "no servers".to_string(),
            ..ErrorInfo::default()
        };
        assert_eq!(info.summary(), "no servers");
    }

    #[test]
    fn test_serialize_skips_missing_fields() {
        let info = ErrorInfo {
            message: "boom".to_string(),
            ..ErrorInfo::default()
        };
        let json = serde_json::to_string(&info).unwrap();
        assert_eq!(json, r#"{"message":"boom"}"#);
    }
}

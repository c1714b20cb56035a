//! MCP tools implementation

pub mod get;
pub mod list;
pub mod refresh;
pub mod search;

use crate::error::AppError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decode tool arguments, treating absent arguments as an empty object.
///
/// A missing required field is reported as a missing parameter rather than
/// a malformed request.
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, AppError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };

    serde_json::from_value(args).map_err(|e| {
        let message = e.to_string();
        if message.starts_with("missing field") {
            AppError::MissingParameter(message)
        } else {
            AppError::InvalidInput(format!("Invalid arguments: {}", message))
        }
    })
}

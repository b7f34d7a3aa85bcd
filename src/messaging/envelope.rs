// Response envelope handling for the messages backend
//
// Every payload arrives wrapped as {"status": .., "message": .., "data": ..}.
// Bare arrays from older backends are not accepted.

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::MessagingError;

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub status: Option<Value>,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Status carried inside the body, which some handlers use instead of the HTTP code
    fn reported_failure(&self) -> Option<MessagingError> {
        let detail = || self.message.clone().unwrap_or_else(|| "no detail".to_string());
        match &self.status {
            Some(Value::Number(code)) => match code.as_u64() {
                Some(404) => Some(MessagingError::NotFound(detail())),
                Some(code) if code >= 400 => {
                    Some(MessagingError::Server(format!("backend reported {}: {}", code, detail())))
                }
                _ => None,
            },
            Some(Value::String(text)) if text.eq_ignore_ascii_case("error") => {
                Some(MessagingError::Server(format!("backend reported error: {}", detail())))
            }
            _ => None,
        }
    }

    pub fn into_data(self) -> Result<T, MessagingError> {
        if let Some(err) = self.reported_failure() {
            return Err(err);
        }
        self.data
            .ok_or_else(|| MessagingError::Server("response envelope has no data".to_string()))
    }
}

/// Decode a response whose envelope must carry `data` of type `T`
pub fn decode<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T, MessagingError> {
    check_status(status, body)?;

    let value = parse_object(body)?;
    let envelope: Envelope<T> = serde_json::from_value(value).map_err(|e| {
        warn!("Rejecting malformed payload: {}", e);
        MessagingError::Server(format!("malformed response payload: {}", e))
    })?;
    envelope.into_data()
}

/// Decode a response where any 2xx counts as success and the body may be empty
pub fn decode_empty(status: u16, body: &[u8]) -> Result<(), MessagingError> {
    check_status(status, body)?;

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }
    match serde_json::from_slice::<Envelope<Value>>(body) {
        Ok(envelope) => match envelope.reported_failure() {
            Some(err) => Err(err),
            None => Ok(()),
        },
        Err(_) => {
            debug!("Ignoring non-envelope body on empty-success response");
            Ok(())
        }
    }
}

fn check_status(status: u16, body: &[u8]) -> Result<(), MessagingError> {
    if (200..300).contains(&status) {
        return Ok(());
    }

    let detail = backend_message(body).unwrap_or_else(|| "no detail".to_string());
    if status == 404 {
        Err(MessagingError::NotFound(detail))
    } else {
        Err(MessagingError::Server(format!("backend returned {}: {}", status, detail)))
    }
}

fn parse_object(body: &[u8]) -> Result<Value, MessagingError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| MessagingError::Server(format!("response is not JSON: {}", e)))?;
    if !value.is_object() {
        warn!("Rejecting un-enveloped response payload");
        return Err(MessagingError::Server(
            "expected an enveloped object response".to_string(),
        ));
    }
    Ok(value)
}

fn backend_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value.get("message")?.as_str().map(|s| s.to_string())
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utilities::result::DfsError;

/// Client to server command envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub command: String,
    pub args: Vec<String>,
}

impl Message {
    pub fn new(command: &str, args: Vec<String>) -> Self {
        Self {
            command: command.to_owned(),
            args,
        }
    }
    /// Positional argument accessor; missing arguments are a BadRequest, the
    /// connection stays open.
    pub fn arg(&self, index: usize) -> Result<&str, DfsError> {
        match self.args.get(index) {
            Some(v) => Ok(v),
            None => Err(DfsError::BadRequest(format!(
                "command {} missing argument {}",
                self.command, index
            ))),
        }
    }
}

/// Server to client response envelope. An empty `error` means success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub result: Value,
    pub error: String,
}

impl Response {
    pub fn ok(result: Value) -> Self {
        Self {
            result,
            error: String::new(),
        }
    }
    pub fn text(result: impl Into<String>) -> Self {
        Self::ok(Value::String(result.into()))
    }
    pub fn failure(error: &DfsError) -> Self {
        Self {
            result: Value::Null,
            error: error.to_string(),
        }
    }
    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }
    /// Folds the envelope back into a result on the caller side.
    pub fn into_result(self) -> Result<Value, DfsError> {
        if self.is_ok() {
            Ok(self.result)
        } else if let Some(detail) = self.error.strip_prefix("not found: ") {
            Err(DfsError::NotFound(detail.to_owned()))
        } else if let Some(detail) = self.error.strip_prefix("bad request: ") {
            Err(DfsError::BadRequest(detail.to_owned()))
        } else if let Some(detail) = self.error.strip_prefix("data unavailable: ") {
            Err(DfsError::DataUnavailable(detail.to_owned()))
        } else if let Some(detail) = self.error.strip_prefix("no capacity: ") {
            Err(DfsError::NoCapacity(detail.to_owned()))
        } else {
            Err(DfsError::Internal(self.error))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_argument_is_bad_request() {
        let msg = Message::new("rename", vec!["old.txt".to_owned()]);
        assert_eq!(msg.arg(0).unwrap(), "old.txt");
        assert!(matches!(msg.arg(1), Err(DfsError::BadRequest(_))));
    }

    #[test]
    fn error_kind_survives_the_envelope() {
        let response = Response::failure(&DfsError::NoCapacity("pool exhausted".to_owned()));
        assert!(!response.is_ok());
        match response.into_result() {
            Err(DfsError::NoCapacity(detail)) => assert_eq!(detail, "pool exhausted"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}

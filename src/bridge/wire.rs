use crate::bridge::{Command, Reply, ServerEvent};
use crate::error::{Error, RemoteError, Result};
use serde::{Deserialize, Serialize};

/// One line of the bridge protocol.
///
/// Messages are JSON objects, one per line:
///
/// ```text
/// {"type":"request","id":"6f1c...","command":{"type":"getMemory"}}
/// {"type":"response","id":"6f1c...","result":{"type":"memory","value":{"total":1,"free":1}}}
/// {"type":"event","event":{"event":"message","id":4242,"record":{...}}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireMessage {
    /// Client to worker
    Request { id: String, command: Command },
    /// Worker to client, exactly one per request
    Response {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Reply>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RemoteError>,
    },
    /// Worker to client
    Event { event: ServerEvent },
}

impl WireMessage {
    /// Response carrying the outcome of a request
    pub fn response(id: String, outcome: Result<Reply>) -> Self {
        match outcome {
            Ok(reply) => WireMessage::Response {
                id,
                result: Some(reply),
                error: None,
            },
            Err(e) => WireMessage::Response {
                id,
                result: None,
                error: Some(RemoteError::from(&e)),
            },
        }
    }

    /// Serialize as one newline-terminated line
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)
            .map_err(|e| Error::Serialization(format!("Failed to encode message: {}", e)))?;
        line.push('\n');
        Ok(line)
    }

    /// Parse one line, with or without its newline
    pub fn from_line(line: &str) -> Result<Self> {
        serde_json::from_str(line.trim_end())
            .map_err(|e| Error::Serialization(format!("Failed to decode message: {}", e)))
    }
}

/// Turn the payload of a response back into a command outcome.
pub(crate) fn into_outcome(result: Option<Reply>, error: Option<RemoteError>) -> Result<Reply> {
    match (result, error) {
        (_, Some(error)) => Err(error.into()),
        (Some(reply), None) => Ok(reply),
        (None, None) => Err(Error::Communication(
            "Response carried neither result nor error".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerId;

    #[test]
    fn test_error_response_keeps_its_kind() {
        let id = ServerId::from_pid(31);
        let line = WireMessage::response("r1".to_string(), Err(Error::UnknownInstance(id)))
            .to_line()
            .unwrap();
        assert!(line.ends_with('\n'));

        let WireMessage::Response { id: request, result, error } = WireMessage::from_line(&line).unwrap() else {
            panic!("expected a response");
        };
        assert_eq!(request, "r1");
        assert!(matches!(into_outcome(result, error), Err(Error::UnknownInstance(got)) if got == id));
    }

    #[test]
    fn test_request_line() {
        let message = WireMessage::Request {
            id: "abc".to_string(),
            command: Command::ListInstances,
        };
        let value: serde_json::Value = serde_json::from_str(&message.to_line().unwrap()).unwrap();
        assert_eq!(value["type"], "request");
        assert_eq!(value["command"]["type"], "listInstances");
    }

    #[test]
    fn test_garbage_is_a_serialization_error() {
        assert!(matches!(
            WireMessage::from_line("not json"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_empty_response_is_rejected() {
        assert!(matches!(into_outcome(None, None), Err(Error::Communication(_))));
    }
}

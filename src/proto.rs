//! Wire protocol between the daemon and its UI clients.
//!
//! JSON-lines over localhost TCP: one request or response per line, tagged
//! with `type`. There is no versioning or schema negotiation — both ends
//! agree on the panel dimensions out of band through the layout constants.

use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Pull shape: reply with the latest state once.
    GetState,
    /// Push shape: stream every accepted state until the connection closes.
    Subscribe,
    /// Retune the producer cadence.
    SetIntervalMs { ms: u64 },
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    State(Snapshot),
    Success { message: String },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Clock;
    use serde_json::json;

    #[test]
    fn requests_are_type_tagged() {
        assert_eq!(
            serde_json::to_value(Request::GetState).unwrap(),
            json!({"type": "GetState"})
        );
        assert_eq!(
            serde_json::to_value(Request::SetIntervalMs { ms: 250 }).unwrap(),
            json!({"type": "SetIntervalMs", "ms": 250})
        );
    }

    #[test]
    fn state_response_carries_the_snapshot_wire_shape() {
        let snapshot = Snapshot {
            clock: Clock::Ticks(65),
            stack: 2,
            history: vec!["jmp loop".to_string()],
            ..Snapshot::default()
        };
        let value = serde_json::to_value(Response::State(snapshot.clone())).unwrap();
        assert_eq!(value["type"], "State");
        assert_eq!(value["numbers"], json!([65]));
        assert_eq!(value["stack"], json!(2));

        let line = serde_json::to_string(&Response::State(snapshot.clone())).unwrap();
        match serde_json::from_str::<Response>(&line).unwrap() {
            Response::State(decoded) => assert_eq!(decoded, snapshot),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn malformed_requests_fail_to_parse() {
        assert!(serde_json::from_str::<Request>("{\"type\":\"Nonsense\"}").is_err());
        assert!(serde_json::from_str::<Request>("not json").is_err());
    }
}

use crate::{MessageError, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of the task a response answers
pub type TaskId = String;

/// Wire format of `metadata.timestamp` (UTC, second precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Task response consumed from the response queue.
///
/// Only `task_id` is interpreted; every other key is carried along untouched
/// in `fields` so scorers can look at whatever the producer sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseMessage {
    pub task_id: TaskId,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Shape used for the typed decode step. `task_id` is optional here so a
/// missing key can be reported separately from a malformed body.
#[derive(Deserialize)]
struct RawResponse {
    task_id: Option<String>,

    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl ResponseMessage {
    pub fn new(task_id: impl Into<TaskId>) -> Self {
        ResponseMessage {
            task_id: task_id.into(),
            fields: Map::new(),
        }
    }

    /// Decode and validate a response body.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let raw: RawResponse = serde_json::from_slice(body)?;
        let task_id = raw.task_id.ok_or(MessageError::MissingTaskId)?;
        if task_id.trim().is_empty() {
            return Err(MessageError::EmptyTaskId);
        }

        Ok(ResponseMessage {
            task_id,
            fields: raw.fields,
        })
    }

    /// Look up one of the producer-supplied fields
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardMetadata {
    /// When the reward was created
    #[serde(with = "utc_seconds")]
    pub timestamp: DateTime<Utc>,
}

/// Reward published to the reward queue, one per valid response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardMessage {
    pub task_id: TaskId,
    pub score: f64,
    pub metadata: RewardMetadata,
}

impl RewardMessage {
    /// Build the reward for `response`, stamped with the current time
    pub fn for_response(response: &ResponseMessage, score: f64) -> Self {
        Self::at(response.task_id.clone(), score, Utc::now())
    }

    /// Build a reward with an explicit creation time. The timestamp is
    /// truncated to whole seconds to match the wire format.
    pub fn at(task_id: impl Into<TaskId>, score: f64, timestamp: DateTime<Utc>) -> Self {
        RewardMessage {
            task_id: task_id.into(),
            score,
            metadata: RewardMetadata {
                timestamp: timestamp.trunc_subsecs(0),
            },
        }
    }

    /// Encode for the reward queue. JSON has no NaN or infinity, so a
    /// non-finite score is rejected rather than written as `null`.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        if !self.score.is_finite() {
            return Err(MessageError::NonFiniteScore(self.score));
        }
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }
}

mod utc_seconds {
    use super::TIMESTAMP_FORMAT;
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&timestamp.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_decode_response() {
        let body = br#"{"task_id": "T-1", "answer": "42", "tokens": 7}"#;
        let response = ResponseMessage::from_slice(body).unwrap();

        assert_eq!(response.task_id, "T-1");
        assert_eq!(response.field("answer"), Some(&Value::from("42")));
        assert_eq!(response.field("tokens"), Some(&Value::from(7)));
        assert!(response.field("task_id").is_none());
    }

    #[test]
    fn test_missing_task_id() {
        let result = ResponseMessage::from_slice(br#"{"answer": "42"}"#);
        assert!(matches!(result, Err(MessageError::MissingTaskId)));
    }

    #[test]
    fn test_empty_task_id() {
        let result = ResponseMessage::from_slice(br#"{"task_id": "  "}"#);
        assert!(matches!(result, Err(MessageError::EmptyTaskId)));
    }

    #[test]
    fn test_malformed_bodies() {
        let bodies: [&[u8]; 4] = [b"not json", b"[1, 2, 3]", b"\"task_id\"", br#"{"task_id": 17}"#];
        for body in bodies {
            let result = ResponseMessage::from_slice(body);
            assert!(
                matches!(result, Err(MessageError::Malformed(_))),
                "expected malformed error for {:?}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn test_large_response_is_accepted() {
        let mut body = br#"{"task_id": "T-big", "blob": ""#.to_vec();
        body.extend(std::iter::repeat(b'a').take(4 * 1024 * 1024));
        body.extend(br#""}"#);

        let response = ResponseMessage::from_slice(&body).unwrap();
        assert_eq!(response.task_id, "T-big");
        assert_eq!(response.field("blob").and_then(Value::as_str).map(str::len), Some(4 * 1024 * 1024));
    }

    #[test]
    fn test_non_finite_score_is_not_encoded() {
        for score in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let reward = RewardMessage::at("T", score, Utc::now());
            assert!(
                matches!(reward.to_vec(), Err(MessageError::NonFiniteScore(_))),
                "score {} must be rejected",
                score
            );
        }
    }

    #[test]
    fn test_reward_wire_format() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 30).unwrap();
        let reward = RewardMessage::at("T-1", 0.75, timestamp);

        let json: Value = serde_json::from_slice(&reward.to_vec().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "task_id": "T-1",
                "score": 0.75,
                "metadata": { "timestamp": "2024-03-09T14:05:30Z" },
            })
        );
    }

    #[test]
    fn test_reward_round_trip() {
        let response = ResponseMessage::new("T-42");
        let reward = RewardMessage::for_response(&response, 1.0);

        let decoded = RewardMessage::from_slice(&reward.to_vec().unwrap()).unwrap();
        assert_eq!(decoded.task_id, reward.task_id);
        assert_eq!(decoded.score, reward.score);
        assert_eq!(decoded.metadata.timestamp, reward.metadata.timestamp);
    }

    #[test]
    fn test_reward_rejects_bad_timestamp() {
        let body = br#"{"task_id": "T", "score": 1.0, "metadata": {"timestamp": "yesterday"}}"#;
        assert!(RewardMessage::from_slice(body).is_err());
    }
}

// Property tests for the response decode step

use proptest::prelude::*;
use scoring_core::{MessageError, ResponseMessage, RewardMessage};

proptest! {
    #[test]
    fn decode_never_panics(body in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = ResponseMessage::from_slice(&body);
    }

    #[test]
    fn task_id_is_copied_verbatim(task_id in "[A-Za-z0-9_-]{1,64}", score in -1.0e6f64..1.0e6) {
        let body = serde_json::to_vec(&serde_json::json!({
            "task_id": task_id,
            "payload": { "nested": [1, 2, 3] },
        })).unwrap();

        let response = ResponseMessage::from_slice(&body).unwrap();
        prop_assert_eq!(&response.task_id, &task_id);

        let reward = RewardMessage::for_response(&response, score);
        let decoded = RewardMessage::from_slice(&reward.to_vec().unwrap()).unwrap();
        prop_assert_eq!(decoded.task_id, task_id);
        prop_assert_eq!(decoded.score, score);
    }

    #[test]
    fn objects_without_task_id_are_rejected(key in "[a-z]{1,8}", value in any::<i64>()) {
        prop_assume!(key != "task_id");
        let mut object = serde_json::Map::new();
        object.insert(key, serde_json::Value::from(value));
        let body = serde_json::to_vec(&object).unwrap();

        let result = ResponseMessage::from_slice(&body);
        prop_assert!(matches!(result, Err(MessageError::MissingTaskId)));
    }
}

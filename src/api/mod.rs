use serde::{Deserialize, Serialize};

use crate::core::message::Role;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct InputMessage {
    pub role: Role,
    pub content: String,
}

/// Body of `POST /v1/responses`.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ResponseRequest {
    pub model: String,
    pub input: Vec<InputMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    pub stream: bool,
    pub store: bool,
}

impl ResponseRequest {
    pub fn streaming(
        model: impl Into<String>,
        input: Vec<InputMessage>,
        previous_response_id: Option<String>,
    ) -> Self {
        Self {
            model: model.into(),
            input,
            previous_response_id,
            stream: true,
            store: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub owned_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelsResponse {
    pub data: Vec<ModelInfo>,
}

pub mod models;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_missing_previous_response_id() {
        let request = ResponseRequest::streaming(
            "qwen/qwen3-8b",
            vec![InputMessage {
                role: Role::User,
                content: "hi".into(),
            }],
            None,
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "qwen/qwen3-8b",
                "input": [{"role": "user", "content": "hi"}],
                "stream": true,
                "store": false
            })
        );
    }

    #[test]
    fn request_carries_previous_response_id() {
        let request = ResponseRequest::streaming("m", Vec::new(), Some("resp_1".into()));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["previous_response_id"], "resp_1");
    }

    #[test]
    fn models_response_tolerates_extra_fields() {
        let parsed: ModelsResponse = serde_json::from_str(
            r#"{"object":"list","data":[{"id":"a","object":"model","owned_by":"org","extra":1},{"id":"b"}]}"#,
        )
        .unwrap();
        let ids: Vec<_> = parsed.data.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}

//! Input and output schema checks.
//!
//! Submissions are checked before the orchestrator touches any state; every
//! response envelope is checked before it is committed or shown.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::config::ModelConfig;
use crate::error::AssistantError;
use crate::models::OutputEnvelope;

pub const MAX_QUESTION_CHARS: usize = 2000;

static QUESTION_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^[\p{Han}a-zA-Z0-9\s,.!?;:，。！？；：'"()\[\]\-+=_<>/\\]+$"#)
        .expect("question charset pattern compiles")
});

/// One user submission, as entered.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub question: String,
    pub model: String,
    pub temperature: f64,
    /// Base64-encoded image, only for the multimodal model.
    pub image: Option<String>,
}

/// Models a submission may select, and which one takes images.
#[derive(Debug, Clone)]
pub struct InputPolicy {
    pub models: Vec<String>,
    pub multimodal: String,
}

impl InputPolicy {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            models: config.available.clone(),
            multimodal: config.multimodal.clone(),
        }
    }
}

pub fn validate_submission(
    submission: &Submission,
    policy: &InputPolicy,
) -> Result<(), AssistantError> {
    let invalid = |msg: String| Err(AssistantError::InputValidation(msg));

    let is_multimodal = submission.model == policy.multimodal;
    match (is_multimodal, submission.image.is_some()) {
        (true, false) => return invalid(format!("model {} requires an image", submission.model)),
        (false, true) => {
            return invalid(format!(
                "images are only accepted by {}",
                policy.multimodal
            ))
        }
        _ => {}
    }

    let len = submission.question.chars().count();
    if len == 0 || submission.question.trim().is_empty() {
        return invalid("question is empty".to_string());
    }
    if len > MAX_QUESTION_CHARS {
        return invalid(format!(
            "question is {} characters; the limit is {}",
            len, MAX_QUESTION_CHARS
        ));
    }
    if !QUESTION_CHARSET.is_match(&submission.question) {
        return invalid("question contains unsupported characters".to_string());
    }
    if !policy.models.contains(&submission.model) {
        return invalid(format!("unknown model: {}", submission.model));
    }
    if !(0.0..=2.0).contains(&submission.temperature) {
        return invalid(format!(
            "temperature {} is outside [0, 2]",
            submission.temperature
        ));
    }
    Ok(())
}

const REQUIRED_KEYS: &[&str] = &["status", "content", "timestamp", "model", "tool_used"];
const STATUSES: &[&str] = &["success", "error", "loading", "tool_required"];
const TOOLS_USED: &[&str] = &["none", "file", "weather", "search"];

pub fn validate_envelope(envelope: &OutputEnvelope) -> Result<(), AssistantError> {
    validate_output_value(&serde_json::to_value(envelope).map_err(|e| {
        AssistantError::OutputValidation(format!("envelope is not serializable: {}", e))
    })?)
}

/// Checks a JSON response envelope against the output schema.
pub fn validate_output_value(value: &Value) -> Result<(), AssistantError> {
    let invalid = |msg: String| Err(AssistantError::OutputValidation(msg));
    let Some(obj) = value.as_object() else {
        return invalid("envelope is not an object".to_string());
    };

    for key in REQUIRED_KEYS {
        if !obj.contains_key(*key) {
            return invalid(format!("missing field '{}'", key));
        }
    }

    let status = obj["status"].as_str().unwrap_or_default();
    if !STATUSES.contains(&status) {
        return invalid(format!("invalid status {}", obj["status"]));
    }
    let Some(content) = obj["content"].as_str() else {
        return invalid("content must be a string".to_string());
    };
    if status == "success" && content.is_empty() {
        return invalid("response content is empty".to_string());
    }
    if !obj["timestamp"].is_number() {
        return invalid("timestamp must be a number".to_string());
    }
    if !obj["model"].is_string() {
        return invalid("model must be a string".to_string());
    }
    if let Some(rag) = obj.get("rag_context") {
        if !rag.is_string() {
            return invalid("rag_context must be a string".to_string());
        }
    }
    let tool = obj["tool_used"].as_str().unwrap_or_default();
    if !TOOLS_USED.contains(&tool) {
        return invalid(format!("invalid tool_used {}", obj["tool_used"]));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolUsed;
    use serde_json::json;

    fn policy() -> InputPolicy {
        InputPolicy::from_config(&ModelConfig::default())
    }

    fn submission(question: &str) -> Submission {
        Submission {
            question: question.to_string(),
            model: "Pro/deepseek-ai/DeepSeek-R1".to_string(),
            temperature: 0.7,
            image: None,
        }
    }

    #[test]
    fn test_accepts_mixed_text() {
        assert!(validate_submission(&submission("杭州市天气怎么样？"), &policy()).is_ok());
        assert!(validate_submission(&submission("读取 C:\\a.txt 的内容"), &policy()).is_ok());
    }

    #[test]
    fn test_length_bounds() {
        assert!(validate_submission(&submission(""), &policy()).is_err());
        assert!(validate_submission(&submission("   "), &policy()).is_err());
        let max = "字".repeat(MAX_QUESTION_CHARS);
        assert!(validate_submission(&submission(&max), &policy()).is_ok());
        let over = "字".repeat(MAX_QUESTION_CHARS + 1);
        assert!(validate_submission(&submission(&over), &policy()).is_err());
    }

    #[test]
    fn test_rejects_unsupported_characters() {
        let err = validate_submission(&submission("hello 😀"), &policy()).unwrap_err();
        assert!(matches!(err, AssistantError::InputValidation(_)));
    }

    #[test]
    fn test_model_and_temperature() {
        let mut s = submission("你好");
        s.model = "gpt-x".into();
        assert!(validate_submission(&s, &policy()).is_err());

        let mut s = submission("你好");
        s.temperature = 2.01;
        assert!(validate_submission(&s, &policy()).is_err());
        s.temperature = 0.0;
        assert!(validate_submission(&s, &policy()).is_ok());
    }

    #[test]
    fn test_image_iff_multimodal() {
        let mut s = submission("这是什么");
        s.model = "Qwen/QVQ-72B-Preview".into();
        assert!(validate_submission(&s, &policy()).is_err());
        s.image = Some("QUJD".into());
        assert!(validate_submission(&s, &policy()).is_ok());

        let mut s = submission("这是什么");
        s.image = Some("QUJD".into());
        assert!(validate_submission(&s, &policy()).is_err());
    }

    #[test]
    fn test_envelopes() {
        let ok = OutputEnvelope::success("答案", "m", "", ToolUsed::None);
        assert!(validate_envelope(&ok).is_ok());

        let empty = OutputEnvelope::success("", "m", "", ToolUsed::None);
        assert!(matches!(
            validate_envelope(&empty),
            Err(AssistantError::OutputValidation(_))
        ));

        let blank = OutputEnvelope::success(" \n", "m", "", ToolUsed::None);
        assert!(validate_envelope(&blank).is_ok());

        let err = OutputEnvelope::error("model backend error: boom", "m", ToolUsed::Search);
        assert!(validate_envelope(&err).is_ok());
    }

    #[test]
    fn test_output_value_schema() {
        let base = json!({
            "status": "success",
            "content": "x",
            "timestamp": 1.5,
            "model": "m",
            "rag_context": "",
            "tool_used": "none"
        });
        assert!(validate_output_value(&base).is_ok());

        let mut bad_status = base.clone();
        bad_status["status"] = json!("done");
        assert!(validate_output_value(&bad_status).is_err());

        let mut bad_tool = base.clone();
        bad_tool["tool_used"] = json!("calendar");
        assert!(validate_output_value(&bad_tool).is_err());

        let mut missing = base.clone();
        missing.as_object_mut().unwrap().remove("timestamp");
        assert!(validate_output_value(&missing).is_err());
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What the classifier script prints on stdout.
///
/// Fields beyond the three required ones are kept and echoed back so the
/// response body matches the script's object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClassificationResult {
    pub class_number: i64,
    pub class_name: String,
    pub confidence: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub result: ClassificationResult,
    #[serde(rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extra_classifier_fields_pass_through() {
        let parsed: ClassificationResult = serde_json::from_value(json!({
            "class_number": 30,
            "class_name": "Tomato___healthy",
            "confidence": 0.5,
            "top_k": [30, 28]
        }))
        .unwrap();
        assert_eq!(parsed.extra.get("top_k"), Some(&json!([30, 28])));

        let body = serde_json::to_value(UploadResponse {
            result: parsed,
            image_url: None,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "class_number": 30,
                "class_name": "Tomato___healthy",
                "confidence": 0.5,
                "top_k": [30, 28]
            })
        );
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let parsed = serde_json::from_value::<ClassificationResult>(json!({
            "class_name": "Apple___healthy",
            "confidence": 0.9
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn image_url_is_camel_cased() {
        let body = serde_json::to_value(UploadResponse {
            result: ClassificationResult {
                class_number: 3,
                class_name: "Apple___healthy".into(),
                confidence: 0.25,
                extra: Map::new(),
            },
            image_url: Some("http://localhost:5000/uploads/abc.jpg".into()),
        })
        .unwrap();
        assert_eq!(body["imageUrl"], "http://localhost:5000/uploads/abc.jpg");
    }

    #[test]
    fn error_body_omits_empty_details() {
        let body = serde_json::to_value(ErrorBody {
            error: "No image uploaded.".into(),
            details: None,
        })
        .unwrap();
        assert_eq!(body, json!({ "error": "No image uploaded." }));
    }
}

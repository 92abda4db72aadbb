use base64::Engine;
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::models::{AiMetadata, Detection};

const ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";
const LABEL_MIN_CONFIDENCE: f64 = 0.7;
const OBJECT_MIN_CONFIDENCE: f64 = 0.5;
const MAX_LABELS: usize = 10;
const MAX_OBJECTS: usize = 5;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct VisionCredentials {
    api_key: String,
}

#[derive(Debug, thiserror::Error)]
enum VisionError {
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("annotate request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("annotate response was empty")]
    EmptyResponse,
}

/// Best-effort image enrichment via the external vision service. Every
/// failure path degrades to "no AI metadata"; this adapter can never fail
/// issue creation.
#[derive(Clone)]
pub struct VisionClient {
    http: reqwest::Client,
    api_key: String,
}

impl VisionClient {
    /// Build a client from the configured credentials file, or return None
    /// (enrichment disabled) when it is absent or unreadable.
    pub fn from_credentials_file(path: Option<&Path>) -> Option<VisionClient> {
        let path = match path {
            Some(p) => p,
            None => {
                warn!("Vision service not configured. Image analysis will be skipped.");
                return None;
            }
        };

        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "Vision credentials file {} not readable: {}. Image analysis will be skipped.",
                    path.display(),
                    e
                );
                return None;
            }
        };

        let creds: VisionCredentials = match serde_json::from_str(&raw) {
            Ok(creds) => creds,
            Err(e) => {
                warn!(
                    "Vision credentials file {} not parseable: {}. Image analysis will be skipped.",
                    path.display(),
                    e
                );
                return None;
            }
        };

        let http = match reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build() {
            Ok(http) => http,
            Err(e) => {
                warn!("Failed to build HTTP client for vision service: {}", e);
                return None;
            }
        };

        info!("Vision client initialized");
        Some(VisionClient {
            http,
            api_key: creds.api_key,
        })
    }

    pub async fn analyze(&self, image_path: &Path) -> Option<AiMetadata> {
        match self.try_analyze(image_path).await {
            Ok(metadata) => {
                info!(
                    "Vision analysis complete: {} labels, {} objects, text detected: {}",
                    metadata.labels.len(),
                    metadata.objects.len(),
                    metadata.detected_text.is_some()
                );
                Some(metadata)
            }
            Err(e) => {
                warn!("Image analysis failed for {}: {}", image_path.display(), e);
                None
            }
        }
    }

    async fn try_analyze(&self, image_path: &Path) -> Result<AiMetadata, VisionError> {
        let bytes = tokio::fs::read(image_path).await?;
        let content = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let body = serde_json::json!({
            "requests": [{
                "image": { "content": content },
                "features": [
                    { "type": "LABEL_DETECTION", "maxResults": 20 },
                    { "type": "OBJECT_LOCALIZATION", "maxResults": 10 },
                    { "type": "TEXT_DETECTION" }
                ]
            }]
        });

        let response: AnnotateResponse = self
            .http
            .post(ANNOTATE_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let result = response
            .responses
            .into_iter()
            .next()
            .ok_or(VisionError::EmptyResponse)?;

        Ok(metadata_from_annotation(result))
    }
}

#[derive(Deserialize, Debug)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateResult>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct AnnotateResult {
    #[serde(default)]
    label_annotations: Vec<EntityAnnotation>,
    #[serde(default)]
    localized_object_annotations: Vec<ObjectAnnotation>,
    full_text_annotation: Option<TextAnnotation>,
    error: Option<ApiStatus>,
}

#[derive(Deserialize, Debug)]
struct EntityAnnotation {
    description: Option<String>,
    score: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct ObjectAnnotation {
    name: Option<String>,
    score: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct TextAnnotation {
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiStatus {
    message: Option<String>,
}

// Partial results are kept: a per-feature error inside an otherwise
// successful response only costs that feature's output.
fn metadata_from_annotation(result: AnnotateResult) -> AiMetadata {
    if let Some(status) = &result.error {
        warn!(
            "Vision API reported a partial error: {}",
            status.message.as_deref().unwrap_or("unknown")
        );
    }

    let labels: Vec<Detection> = result
        .label_annotations
        .iter()
        .filter_map(|l| match (&l.description, l.score) {
            (Some(name), Some(score)) if score > LABEL_MIN_CONFIDENCE => Some(Detection {
                name: name.clone(),
                confidence: score,
            }),
            _ => None,
        })
        .take(MAX_LABELS)
        .collect();

    let objects: Vec<Detection> = result
        .localized_object_annotations
        .iter()
        .filter_map(|o| match (&o.name, o.score) {
            (Some(name), Some(score)) if score > OBJECT_MIN_CONFIDENCE => Some(Detection {
                name: name.clone(),
                confidence: score,
            }),
            _ => None,
        })
        .take(MAX_OBJECTS)
        .collect();

    let detected_text = result
        .full_text_annotation
        .and_then(|t| t.text)
        .filter(|t| !t.trim().is_empty());

    let suggested =
        compose_suggested_description(&labels, &objects, detected_text.as_deref());

    AiMetadata {
        labels,
        objects,
        detected_text,
        suggested_description: Some(suggested),
    }
}

/// Compose a short natural description from the detections: top objects
/// first, then labels not already named, plus a note when the OCR text looks
/// like an error message.
pub fn compose_suggested_description(
    labels: &[Detection],
    objects: &[Detection],
    detected_text: Option<&str>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !objects.is_empty() {
        let names: Vec<String> = objects
            .iter()
            .take(3)
            .map(|o| o.name.to_lowercase())
            .collect();
        parts.push(names.join(", "));
    }

    let object_set: HashSet<String> = objects.iter().map(|o| o.name.to_lowercase()).collect();
    parts.extend(
        labels
            .iter()
            .filter(|l| !object_set.contains(&l.name.to_lowercase()))
            .take(3)
            .map(|l| l.name.to_lowercase()),
    );

    if let Some(text) = detected_text {
        let snippet: String = text.trim().chars().take(50).collect::<String>().to_lowercase();
        if snippet.contains("error") || snippet.contains("warning") || snippet.contains("fail") {
            parts.push("with visible error message".to_string());
        }
    }

    if parts.is_empty() {
        return "Item requiring attention".to_string();
    }

    let description = parts
        .into_iter()
        .take(5)
        .collect::<Vec<String>>()
        .join(", ");
    let mut chars = description.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(name: &str, confidence: f64) -> Detection {
        Detection {
            name: name.to_string(),
            confidence,
        }
    }

    #[test]
    fn description_prefers_objects_then_unique_labels() {
        let objects = vec![detection("Chair", 0.9), detection("Table", 0.8)];
        let labels = vec![
            detection("Chair", 0.95),
            detection("Furniture", 0.9),
            detection("Wood", 0.8),
        ];
        let description = compose_suggested_description(&labels, &objects, None);
        assert_eq!(description, "Chair, table, furniture, wood");
    }

    #[test]
    fn description_mentions_visible_error_text() {
        let description =
            compose_suggested_description(&[], &[], Some("ERROR: disk not found"));
        assert_eq!(description, "With visible error message");
    }

    #[test]
    fn description_falls_back_when_nothing_detected() {
        assert_eq!(
            compose_suggested_description(&[], &[], None),
            "Item requiring attention"
        );
        assert_eq!(
            compose_suggested_description(&[], &[], Some("just a poster")),
            "Item requiring attention"
        );
    }

    #[test]
    fn annotation_parsing_applies_thresholds_and_limits() {
        let raw = serde_json::json!({
            "labelAnnotations": [
                { "description": "Chair", "score": 0.97 },
                { "description": "Background noise", "score": 0.4 },
                { "description": null, "score": 0.9 }
            ],
            "localizedObjectAnnotations": [
                { "name": "Chair", "score": 0.85 },
                { "name": "Shadow", "score": 0.3 }
            ],
            "fullTextAnnotation": { "text": "  " }
        });
        let result: AnnotateResult = serde_json::from_value(raw).unwrap();
        let metadata = metadata_from_annotation(result);

        assert_eq!(metadata.labels, vec![detection("Chair", 0.97)]);
        assert_eq!(metadata.objects, vec![detection("Chair", 0.85)]);
        assert!(metadata.detected_text.is_none());
        assert_eq!(metadata.suggested_description.as_deref(), Some("Chair"));
    }

    #[test]
    fn annotation_with_feature_error_keeps_partial_results() {
        let raw = serde_json::json!({
            "labelAnnotations": [{ "description": "Tap", "score": 0.9 }],
            "error": { "message": "text detection quota exceeded" }
        });
        let result: AnnotateResult = serde_json::from_value(raw).unwrap();
        let metadata = metadata_from_annotation(result);
        assert_eq!(metadata.labels.len(), 1);
        assert!(metadata.detected_text.is_none());
    }
}

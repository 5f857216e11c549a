//! Gemini `generateContent` with image output.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use imagegen_core::generation::GenerationParams;
use imagegen_core::image_format::ImageFormat;
use serde::{Deserialize, Serialize};

use crate::capability::ImageProvider;
use crate::error::{ensure_success, ProviderError};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

/// Client for the Gemini API.
pub struct GeminiImageProvider {
    client: reqwest::Client,
    name: String,
    api_base: String,
    api_key: String,
}

// Gemini API request/response structures

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text { text: String },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_size: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiImageProvider {
    pub fn new(
        client: reqwest::Client,
        name: impl Into<String>,
        api_base: &str,
        api_key: impl Into<String>,
    ) -> Self {
        let base = api_base.trim().trim_end_matches('/');
        Self {
            client,
            name: name.into(),
            api_base: if base.is_empty() {
                DEFAULT_API_BASE.to_string()
            } else {
                base.to_string()
            },
            api_key: api_key.into(),
        }
    }

    fn build_url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.api_base, model)
    }
}

fn build_request(params: &GenerationParams) -> Result<GenerateContentRequest, ProviderError> {
    let mut parts = vec![RequestPart::Text {
        text: params.prompt.clone(),
    }];
    for (i, image) in params.reference_images.iter().enumerate() {
        let format = ImageFormat::detect(image)
            .map_err(|e| ProviderError::Validation(format!("Reference image {i}: {e}")))?;
        parts.push(RequestPart::Inline {
            inline_data: InlineData {
                mime_type: format.mime_type().to_string(),
                data: STANDARD.encode(image),
            },
        });
    }

    let image_config = (params.aspect_ratio.is_some() || params.image_size.is_some()).then(|| {
        ImageConfig {
            aspect_ratio: params.aspect_ratio.clone(),
            image_size: params.image_size.clone(),
        }
    });

    Ok(GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts,
        }],
        generation_config: GenerationConfig {
            response_modalities: vec!["IMAGE"],
            image_config,
        },
    })
}

fn extract_images(response: GenerateContentResponse) -> Result<Vec<Vec<u8>>, ProviderError> {
    let mut images = Vec::new();
    let mut finish_reason = None;
    for candidate in response.candidates {
        finish_reason = finish_reason.or(candidate.finish_reason);
        let Some(content) = candidate.content else {
            continue;
        };
        for part in content.parts {
            if let Some(inline) = part.inline_data {
                let bytes = STANDARD
                    .decode(inline.data.trim())
                    .map_err(|e| ProviderError::Decode(e.to_string()))?;
                images.push(bytes);
            }
        }
    }
    if !images.is_empty() {
        return Ok(images);
    }
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::Validation(format!("Prompt blocked: {reason}")));
    }
    if let Some(reason) = finish_reason.filter(|r| r != "STOP") {
        return Err(ProviderError::Validation(format!(
            "Generation stopped: {reason}"
        )));
    }
    Err(ProviderError::EmptyResponse)
}

#[async_trait]
impl ImageProvider for GeminiImageProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    async fn generate(&self, params: &GenerationParams) -> Result<Vec<Vec<u8>>, ProviderError> {
        let model = if params.model_id.is_empty() {
            DEFAULT_MODEL
        } else {
            params.model_id.as_str()
        };
        let body = build_request(params)?;
        let response = self
            .client
            .post(self.build_url(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let parsed: GenerateContentResponse = ensure_success(response).await?.json().await?;
        extract_images(parsed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn request_carries_prompt_references_and_image_config() {
        let mut reference = b"\x89PNG\r\n\x1a\n".to_vec();
        reference.extend_from_slice(&[0; 8]);
        let params = GenerationParams {
            prompt: "a fox".into(),
            aspect_ratio: Some("16:9".into()),
            image_size: Some("2K".into()),
            count: 1,
            reference_images: vec![reference],
            ..Default::default()
        };

        let json = serde_json::to_value(build_request(&params).unwrap()).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "a fox");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(json["generationConfig"]["responseModalities"][0], "IMAGE");
        assert_eq!(json["generationConfig"]["imageConfig"]["aspectRatio"], "16:9");
        assert_eq!(json["generationConfig"]["imageConfig"]["imageSize"], "2K");
    }

    #[test]
    fn image_config_omitted_without_options() {
        let params = GenerationParams {
            prompt: "a fox".into(),
            count: 1,
            ..Default::default()
        };
        let json = serde_json::to_value(build_request(&params).unwrap()).unwrap();
        assert!(json["generationConfig"].get("imageConfig").is_none());
    }

    #[test]
    fn inline_images_are_decoded() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[
                {"text":"here you go"},
                {"inlineData":{"mimeType":"image/png","data":"aGVsbG8="}}
            ]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_images(response).unwrap(), vec![b"hello".to_vec()]);
    }

    #[test]
    fn blocked_prompt_is_reported() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert_matches!(extract_images(response), Err(ProviderError::Validation(msg)) if msg.contains("SAFETY"));
    }

    #[test]
    fn text_only_answer_is_empty() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"no"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_matches!(extract_images(response), Err(ProviderError::EmptyResponse));
    }
}

//! OpenAI-compatible Images API (`/images/generations`, `/images/edits`).

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::{Stream, StreamExt};
use imagegen_core::generation::{validate_params, GenerationParams};
use imagegen_core::image_format::{ImageFormat, MAX_IMAGE_BYTES};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::capability::ImageProvider;
use crate::error::{ensure_success, ProviderError};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-image-1";

/// Client for one OpenAI-compatible endpoint.
pub struct OpenAiImageProvider {
    client: reqwest::Client,
    name: String,
    api_base: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
    url: Option<String>,
}

impl OpenAiImageProvider {
    pub fn new(
        client: reqwest::Client,
        name: impl Into<String>,
        api_base: &str,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            api_base: normalize_api_base(api_base),
            api_key: api_key.into(),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn create(&self, params: &GenerationParams, model: &str) -> Result<ImagesResponse, ProviderError> {
        let body = GenerationRequest {
            model,
            prompt: &params.prompt,
            n: 1,
            size: size_for_aspect_ratio(params.aspect_ratio.as_deref()),
        };
        let response = self
            .client
            .post(format!("{}/images/generations", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn edit(&self, params: &GenerationParams, model: &str) -> Result<ImagesResponse, ProviderError> {
        let mut form = Form::new()
            .text("model", model.to_string())
            .text("prompt", params.prompt.clone())
            .text("n", "1")
            .text(
                "size",
                size_for_aspect_ratio(params.aspect_ratio.as_deref()).to_string(),
            );
        for (i, image) in params.reference_images.iter().enumerate() {
            let format = ImageFormat::detect(image)
                .map_err(|e| ProviderError::Validation(format!("Reference image {i}: {e}")))?;
            let part = Part::bytes(image.clone())
                .file_name(format!("reference_{i}.{}", format.extension()))
                .mime_str(format.mime_type())?;
            form = form.part("image[]", part);
        }
        let response = self
            .client
            .post(format!("{}/images/edits", self.api_base))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    /// Image bytes from one response entry, fetching URL results.
    async fn image_bytes(&self, data: ImageData) -> Result<Vec<u8>, ProviderError> {
        if let Some(encoded) = data.b64_json {
            return STANDARD
                .decode(encoded.trim())
                .map_err(|e| ProviderError::Decode(e.to_string()));
        }
        if let Some(url) = data.url {
            let response = ensure_success(self.client.get(url).send().await?).await?;
            if response
                .content_length()
                .is_some_and(|len| len > MAX_IMAGE_BYTES as u64)
            {
                return Err(ProviderError::TooLarge {
                    limit: MAX_IMAGE_BYTES,
                });
            }
            return read_capped(response.bytes_stream(), MAX_IMAGE_BYTES).await;
        }
        Err(ProviderError::EmptyResponse)
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    fn validate(&self, params: &GenerationParams) -> Result<(), ProviderError> {
        validate_params(params)?;
        if params.image_size.as_deref() == Some("4K") {
            return Err(ProviderError::Validation(
                "4K output is not supported by this provider".into(),
            ));
        }
        Ok(())
    }

    async fn generate(&self, params: &GenerationParams) -> Result<Vec<Vec<u8>>, ProviderError> {
        let model = if params.model_id.is_empty() {
            DEFAULT_MODEL
        } else {
            params.model_id.as_str()
        };
        let response = if params.reference_images.is_empty() {
            self.create(params, model).await?
        } else {
            self.edit(params, model).await?
        };

        let mut images = Vec::with_capacity(response.data.len());
        for data in response.data {
            images.push(self.image_bytes(data).await?);
        }
        if images.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(images)
    }
}

/// Trim trailing slashes and make sure the base ends in `/v1`.
pub fn normalize_api_base(api_base: &str) -> String {
    let base = api_base.trim().trim_end_matches('/');
    if base.is_empty() {
        return DEFAULT_API_BASE.to_string();
    }
    if base.ends_with("/v1") {
        base.to_string()
    } else {
        format!("{base}/v1")
    }
}

/// Output size for an aspect ratio. The Images API only offers square,
/// portrait, and landscape canvases.
pub fn size_for_aspect_ratio(aspect_ratio: Option<&str>) -> &'static str {
    let Some((w, h)) = aspect_ratio.and_then(|r| r.split_once(':')) else {
        return "1024x1024";
    };
    match (w.trim().parse::<u32>(), h.trim().parse::<u32>()) {
        (Ok(w), Ok(h)) if w > h => "1536x1024",
        (Ok(w), Ok(h)) if w < h => "1024x1536",
        _ => "1024x1024",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Collect a response body, failing as soon as it grows past `limit`.
async fn read_capped<S, B>(mut body: S, limit: usize) -> Result<Vec<u8>, ProviderError>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if bytes.len() + chunk.as_ref().len() > limit {
            return Err(ProviderError::TooLarge { limit });
        }
        bytes.extend_from_slice(chunk.as_ref());
    }
    Ok(bytes)
}

//! Generation request parameters and provider-independent validation.
//!
//! Providers apply their own checks on top of [`validate_params`]
//! (supported aspect ratios, reference image support, and so on).

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Maximum number of images a single task may request.
pub const MAX_IMAGES_PER_TASK: u32 = 10;

/// Maximum number of reference images attached to one request.
pub const MAX_REFERENCE_IMAGES: usize = 8;

/// Maximum size of one reference image (20 MB).
pub const MAX_REFERENCE_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// Maximum prompt length in characters.
pub const MAX_PROMPT_CHARS: usize = 8_000;

/// Aspect ratios accepted by the bundled providers.
pub const VALID_ASPECT_RATIOS: &[&str] = &[
    "1:1", "2:3", "3:2", "3:4", "4:3", "4:5", "5:4", "9:16", "16:9", "21:9",
];

/// Output resolution tiers.
pub const VALID_IMAGE_SIZES: &[&str] = &["1K", "2K", "4K"];

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Everything a provider needs to produce images for one task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationParams {
    pub prompt: String,
    /// Resolved model identifier; empty means "provider default".
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub image_size: Option<String>,
    /// Requested number of images (`total_count` of the task).
    #[serde(default = "default_count")]
    pub count: u32,
    /// Raw reference image bytes (image-to-image requests).
    #[serde(skip)]
    pub reference_images: Vec<Vec<u8>>,
}

fn default_count() -> u32 {
    1
}

impl GenerationParams {
    /// Build parameters from a loosely-typed JSON `params` object.
    ///
    /// Accepts the key spellings clients have used over time:
    /// `aspectRatio` / `aspect_ratio` / `aspect` and
    /// `imageSize` / `resolution_level` / `image_size`. A missing `count`
    /// means one image; a present one must be a whole number.
    pub fn from_json_map(
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, CoreError> {
        let prompt = string_param(params, &["prompt"]).unwrap_or_default();
        let model_id = string_param(params, &["model_id"]).unwrap_or_default();
        let aspect_ratio = string_param(params, &["aspectRatio", "aspect_ratio", "aspect"]);
        let image_size = string_param(params, &["imageSize", "resolution_level", "image_size"]);
        let count = count_param(params)?.unwrap_or(1);

        Ok(Self {
            prompt,
            model_id,
            aspect_ratio,
            image_size,
            count,
            reference_images: Vec::new(),
        })
    }
}

/// First non-empty string value among `keys`.
pub fn string_param(
    params: &serde_json::Map<String, serde_json::Value>,
    keys: &[&str],
) -> Option<String> {
    keys.iter()
        .filter_map(|k| params.get(*k).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// `count`, if present. JSON numbers may arrive as floats but must be whole.
///
/// Range checks are left to [`validate_params`].
pub fn count_param(
    params: &serde_json::Map<String, serde_json::Value>,
) -> Result<Option<u32>, CoreError> {
    let value = match params.get("count") {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(value) => value,
    };
    let invalid = || CoreError::Validation(format!("count must be a whole number, got {value}"));

    let n = match value.as_u64() {
        Some(n) => n,
        None => {
            let f = value.as_f64().ok_or_else(invalid)?;
            if f < 0.0 {
                return Err(CoreError::Validation(format!(
                    "count must be between 1 and {MAX_IMAGES_PER_TASK}"
                )));
            }
            if f.fract() != 0.0 {
                return Err(invalid());
            }
            f as u64
        }
    };
    Ok(Some(n.min(u64::from(u32::MAX)) as u32))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Provider-independent checks applied before a task is created.
pub fn validate_params(params: &GenerationParams) -> Result<(), CoreError> {
    let prompt = params.prompt.trim();
    if prompt.is_empty() {
        return Err(CoreError::Validation("prompt must not be empty".into()));
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(CoreError::Validation(format!(
            "prompt must not exceed {MAX_PROMPT_CHARS} characters"
        )));
    }
    if params.count == 0 || params.count > MAX_IMAGES_PER_TASK {
        return Err(CoreError::Validation(format!(
            "count must be between 1 and {MAX_IMAGES_PER_TASK}"
        )));
    }
    if let Some(ratio) = params.aspect_ratio.as_deref() {
        validate_aspect_ratio(ratio)?;
    }
    if let Some(size) = params.image_size.as_deref() {
        validate_image_size(size)?;
    }
    if params.reference_images.len() > MAX_REFERENCE_IMAGES {
        return Err(CoreError::Validation(format!(
            "At most {MAX_REFERENCE_IMAGES} reference images are allowed"
        )));
    }
    if let Some((i, _)) = params
        .reference_images
        .iter()
        .enumerate()
        .find(|(_, img)| img.len() > MAX_REFERENCE_IMAGE_BYTES)
    {
        return Err(CoreError::Validation(format!(
            "Reference image {i} exceeds the 20 MB limit"
        )));
    }
    Ok(())
}

pub fn validate_aspect_ratio(ratio: &str) -> Result<(), CoreError> {
    if VALID_ASPECT_RATIOS.contains(&ratio) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid aspect ratio '{ratio}'. Must be one of: {}",
            VALID_ASPECT_RATIOS.join(", ")
        )))
    }
}

pub fn validate_image_size(size: &str) -> Result<(), CoreError> {
    if VALID_IMAGE_SIZES.contains(&size) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid image size '{size}'. Must be one of: {}",
            VALID_IMAGE_SIZES.join(", ")
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    fn params(prompt: &str, count: u32) -> GenerationParams {
        GenerationParams {
            prompt: prompt.into(),
            count,
            ..Default::default()
        }
    }

    #[test]
    fn from_json_map_reads_aliases() {
        let p = GenerationParams::from_json_map(&map(json!({
            "prompt": "a red fox",
            "aspect": "16:9",
            "resolution_level": "2K",
            "count": 3.0,
        })))
        .unwrap();
        assert_eq!(p.prompt, "a red fox");
        assert_eq!(p.aspect_ratio.as_deref(), Some("16:9"));
        assert_eq!(p.image_size.as_deref(), Some("2K"));
        assert_eq!(p.count, 3);
    }

    #[test]
    fn from_json_map_prefers_camel_case_key() {
        let p = GenerationParams::from_json_map(&map(json!({
            "prompt": "x",
            "aspectRatio": "1:1",
            "aspect_ratio": "16:9",
        })))
        .unwrap();
        assert_eq!(p.aspect_ratio.as_deref(), Some("1:1"));
    }

    #[test]
    fn missing_count_defaults_to_one() {
        let p = GenerationParams::from_json_map(&map(json!({ "prompt": "x" }))).unwrap();
        assert_eq!(p.count, 1);
        let p = GenerationParams::from_json_map(&map(json!({ "prompt": "x", "count": null })))
            .unwrap();
        assert_eq!(p.count, 1);
    }

    #[test]
    fn invalid_count_is_rejected_not_rewritten() {
        for count in [json!("lots"), json!(2.7), json!(-4), json!(true)] {
            let result = GenerationParams::from_json_map(&map(json!({ "prompt": "x", "count": count })));
            assert!(
                matches!(result, Err(CoreError::Validation(_))),
                "count {count} was accepted"
            );
        }
    }

    #[test]
    fn zero_count_fails_validation() {
        let p = GenerationParams::from_json_map(&map(json!({ "prompt": "x", "count": 0 }))).unwrap();
        assert_eq!(p.count, 0);
        assert!(validate_params(&p).is_err());
    }

    #[test]
    fn empty_prompt_rejected() {
        assert!(validate_params(&params("   ", 1)).is_err());
    }

    #[test]
    fn count_bounds() {
        assert!(validate_params(&params("x", 0)).is_err());
        assert!(validate_params(&params("x", 1)).is_ok());
        assert!(validate_params(&params("x", MAX_IMAGES_PER_TASK)).is_ok());
        assert!(validate_params(&params("x", MAX_IMAGES_PER_TASK + 1)).is_err());
    }

    #[test]
    fn unknown_aspect_ratio_rejected() {
        let mut p = params("x", 1);
        p.aspect_ratio = Some("7:3".into());
        assert!(validate_params(&p).is_err());
    }

    #[test]
    fn too_many_reference_images_rejected() {
        let mut p = params("x", 1);
        p.reference_images = vec![vec![0u8; 4]; MAX_REFERENCE_IMAGES + 1];
        assert!(validate_params(&p).is_err());
    }
}

//! Immutable configuration snapshot stored on every task for replay.

use serde_json::{json, Map, Value};

use crate::generation::GenerationParams;

/// Serialize the parameters that reproduce a task.
///
/// Reference images are deliberately excluded; only their count is kept.
pub fn build_config_snapshot(provider_name: &str, params: &GenerationParams) -> Value {
    let mut snapshot = Map::new();
    snapshot.insert("provider".into(), json!(provider_name));
    if !params.model_id.is_empty() {
        snapshot.insert("model_id".into(), json!(params.model_id));
    }
    if let Some(ratio) = &params.aspect_ratio {
        snapshot.insert("aspectRatio".into(), json!(ratio));
    }
    if let Some(size) = &params.image_size {
        snapshot.insert("imageSize".into(), json!(size));
    }
    if params.count > 0 {
        snapshot.insert("count".into(), json!(params.count));
    }
    if !params.reference_images.is_empty() {
        snapshot.insert(
            "referenceImageCount".into(),
            json!(params.reference_images.len()),
        );
    }
    Value::Object(snapshot)
}

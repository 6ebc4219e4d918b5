//! Generative backend adapters.
//!
//! A [`CameraPathProvider`] turns a compiled prompt into an *unvalidated*
//! [`RawCameraPath`]. The engine owns validation, so adapters only need to
//! report what the backend said.
//!
//! Built-in adapters:
//!
//! | Provider id | Type             | Backend                                  |
//! |-------------|------------------|------------------------------------------|
//! | `orbit`     | [`OrbitProvider`]| Local, deterministic safe orbit          |
//! | `openai`    | [`HttpProvider`] | Any OpenAI-compatible chat completion API |

use crate::error::{PlannerError, Result};
use crate::protocol::{CompiledPrompt, ProviderCapabilities, RawCameraPath, RawKeyframe};
use crate::scene::SceneAnalyzer;
use crate::types::{
    Aabb, BoundingBox, BoundingSphere, EngineConfig, Floor, SafeDistance, SceneGeometry, Vec3,
};
use async_trait::async_trait;
use log::{debug, warn};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CameraPathProvider: Send + Sync {
    /// Ask the backend for a path lasting roughly `duration_seconds`.
    ///
    /// `config` is the engine configuration snapshot taken for this request.
    async fn generate_camera_path(
        &self,
        prompt: &CompiledPrompt,
        duration_seconds: f32,
        config: &EngineConfig,
    ) -> Result<RawCameraPath>;

    /// Identifier the engine resolves this adapter by.
    fn provider_type(&self) -> &str;

    fn capabilities(&self) -> ProviderCapabilities;
}

// ---------------------------------------------------------------------------
// Orbit provider
// ---------------------------------------------------------------------------

/// Offline backend: an instruction-shaped orbit around the prompt's scene.
#[derive(Debug, Clone, Default)]
pub struct OrbitProvider {
    analyzer: SceneAnalyzer,
}

impl OrbitProvider {
    pub const ID: &'static str = "orbit";

    pub fn new(analyzer: SceneAnalyzer) -> Self {
        Self { analyzer }
    }

    /// Geometry to orbit when the prompt carries no scene: a sphere at the
    /// origin sized so its default orbit sits mid-band in the constraints.
    fn synthetic_geometry(prompt: &CompiledPrompt) -> SceneGeometry {
        let c = &prompt.constraints;
        let floor = c.min_height.unwrap_or(0.0);
        let mid = (c.min_distance + c.max_distance) * 0.5;
        let center = Vec3::new(0.0, floor, 0.0);
        let half = Vec3::splat(mid * 0.25);
        SceneGeometry {
            bounding_box: BoundingBox::from(Aabb::new(center - half, center + half)),
            bounding_sphere: BoundingSphere {
                center,
                radius: mid * 0.5,
            },
            floor: Floor {
                height: floor,
                normal: Vec3::UP,
            },
            safe_distance: SafeDistance {
                min: c.min_distance,
                max: c.max_distance,
            },
            current_camera: None,
        }
    }
}

#[async_trait]
impl CameraPathProvider for OrbitProvider {
    async fn generate_camera_path(
        &self,
        prompt: &CompiledPrompt,
        duration_seconds: f32,
        _config: &EngineConfig,
    ) -> Result<RawCameraPath> {
        let geometry = prompt
            .scene
            .clone()
            .unwrap_or_else(|| Self::synthetic_geometry(prompt));

        let keyframes = self
            .analyzer
            .generate_safe_keyframes(&geometry, &prompt.instruction);
        if keyframes.is_empty() {
            return Ok(RawCameraPath {
                keyframes: Some(Vec::new()),
            });
        }

        let step = duration_seconds / keyframes.len() as f32;
        debug!(
            "Orbit provider planned {} keyframes, {:.2}s each",
            keyframes.len(),
            step
        );

        Ok(RawCameraPath {
            keyframes: Some(
                keyframes
                    .into_iter()
                    .map(|k| RawKeyframe::new(k.position, k.target, step))
                    .collect(),
            ),
        })
    }

    fn provider_type(&self) -> &str {
        Self::ID
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            name: "orbit".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            max_tokens: 0,
            supports_json: true,
            temperature: 0.0,
            max_duration: 600.0,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP provider (OpenAI-compatible)
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = "You plan camera paths for a 3D viewer. \
Reply with a single JSON object of the form \
{\"keyframes\": [{\"position\": {\"x\": 0, \"y\": 0, \"z\": 0}, \
\"target\": {\"x\": 0, \"y\": 0, \"z\": 0}, \"duration\": 1.0}]}. \
Durations are seconds and must sum to the requested total. \
Respect every constraint you are given. Output JSON only.";

/// Adapter for chat-completion endpoints that speak the OpenAI wire format.
pub struct HttpProvider {
    id: String,
    client: Option<reqwest::Client>,
}

impl HttpProvider {
    pub const ID: &'static str = "openai";

    pub fn new() -> Self {
        Self::with_id(Self::ID)
    }

    /// Same adapter registered under another provider id.
    pub fn with_id(id: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| warn!("HTTP client unavailable: {}", e))
            .ok();
        Self {
            id: id.into(),
            client,
        }
    }

    fn user_message(prompt: &CompiledPrompt, duration_seconds: f32) -> Result<String> {
        let constraints = serde_json::to_string(&prompt.constraints)?;
        let mut msg = format!(
            "Instruction: {}\nTotal duration: {:.2} seconds\nConstraints: {}",
            prompt.instruction, duration_seconds, constraints
        );
        if let Some(style) = &prompt.style {
            msg.push_str(&format!("\nStyle: {}", style));
        }
        if let Some(focus) = &prompt.focus {
            msg.push_str(&format!("\nFocus: {}", focus));
        }
        if let Some(scene) = &prompt.scene {
            msg.push_str(&format!("\nScene: {}", serde_json::to_string(scene)?));
        }
        Ok(msg)
    }
}

impl Default for HttpProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull the outermost JSON object out of a chat reply.
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

#[async_trait]
impl CameraPathProvider for HttpProvider {
    async fn generate_camera_path(
        &self,
        prompt: &CompiledPrompt,
        duration_seconds: f32,
        config: &EngineConfig,
    ) -> Result<RawCameraPath> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| PlannerError::Config("No API endpoint configured".into()))?;

        let body = serde_json::json!({
            "model": config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": Self::user_message(prompt, duration_seconds)?}
            ],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "response_format": {"type": "json_object"}
        });

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| PlannerError::provider("HTTP client unavailable"))?;
        let mut request = client.post(endpoint).json(&body);
        if let Some(key) = &config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PlannerError::provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PlannerError::provider(format!("HTTP {}: {}", status, text)));
        }

        let reply: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlannerError::provider(e.to_string()))?;

        let content = reply["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| PlannerError::InvalidStructure("reply has no message content".into()))?;

        let json = extract_json_object(content)
            .ok_or_else(|| PlannerError::InvalidStructure("reply contains no JSON object".into()))?;

        serde_json::from_str(json).map_err(|e| PlannerError::InvalidStructure(e.to_string()))
    }

    fn provider_type(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            name: "openai-compatible".into(),
            version: "v1".into(),
            max_tokens: 4096,
            supports_json: true,
            temperature: 0.7,
            max_duration: 120.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_fenced_reply() {
        let reply = "```json\n{\"keyframes\": []}\n```";
        assert_eq!(extract_json_object(reply), Some("{\"keyframes\": []}"));
    }

    #[test]
    fn no_json_object_is_none() {
        assert_eq!(extract_json_object("sorry, I can't"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }
}

use serde::{Serialize, Deserialize};

/// One image's generation settings in the Automatic1111 convention.
///
/// Everything except `prompt` is optional on the wire; missing numeric
/// fields take the defaults Civitai-facing tools assume.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GenerationRecord {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_sampler")]
    pub sampler: String,
    #[serde(default = "default_cfg_scale")]
    pub cfg_scale: f64,
    #[serde(default = "default_seed")]
    pub seed: i64,
    /// Defaults to the source image dimensions when unset.
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub model_hash: Option<String>,
    /// Only serialized into the parameters text when != 1.
    #[serde(default = "default_clip_skip")]
    pub clip_skip: u32,
}

pub fn default_steps() -> u32 { 20 }
pub fn default_sampler() -> String { "DPM++ 2M Karras".to_string() }
pub fn default_cfg_scale() -> f64 { 7.0 }
pub fn default_seed() -> i64 { -1 }
pub fn default_clip_skip() -> u32 { 1 }

impl Default for GenerationRecord {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: None,
            steps: default_steps(),
            sampler: default_sampler(),
            cfg_scale: default_cfg_scale(),
            seed: default_seed(),
            width: None,
            height: None,
            model_name: None,
            model_hash: None,
            clip_skip: default_clip_skip(),
        }
    }
}

/// Fields recovered from an existing `parameters` blob. Everything stays a
/// string: the parser reports what the text said, not what it means, and the
/// form on the page fills inputs verbatim.
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
pub struct ParsedParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_hash: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoadImageRequest {
    pub image: String,
    pub filename: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct LoadImageResponse {
    pub width: u32,
    pub height: u32,
    pub metadata: String,
    pub parsed: ParsedParameters,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SaveImageRequest {
    pub image: String,
    pub filename: String,
    /// Pre-built parameters text; literal `\n` sequences are decoded to real
    /// newlines before use. Wins over `record` when both are present.
    #[serde(default)]
    pub parameters: Option<String>,
    /// Structured alternative: the server composes the parameters text.
    #[serde(default)]
    pub record: Option<GenerationRecord>,
    /// With `record`: fill blank fields with minimal Civitai-valid values.
    #[serde(default)]
    pub autofill: bool,
}

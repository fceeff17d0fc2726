use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reference to an image stored in one of ComfyUI's folders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Folder kind: `output`, `input` or `temp`.
    #[serde(rename = "type", default = "default_folder_type")]
    pub folder_type: String,
}

fn default_folder_type() -> String {
    "output".to_string()
}

impl ImageRef {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            subfolder: String::new(),
            folder_type: default_folder_type(),
        }
    }
}

/// An output image together with its downloaded bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectedImage {
    pub image: ImageRef,
    pub blob: Vec<u8>,
}

/// Output node id → images that node produced.
pub type JobOutputs = BTreeMap<String, Vec<CollectedImage>>;

// ── Prompt ──────────────────────────────────────────────────────────

/// Body of `POST /prompt`.
#[derive(Debug, Clone, Serialize)]
pub struct PromptRequest<'a> {
    pub prompt: &'a Value,
    pub client_id: &'a str,
}

/// Answer to a queued prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct QueuedPrompt {
    pub prompt_id: String,
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub node_errors: Map<String, Value>,
}

/// Answer to `GET /prompt`.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptInfo {
    pub exec_info: ExecInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: u32,
}

// ── History ─────────────────────────────────────────────────────────

/// Prompt id → history entry.
pub type History = BTreeMap<String, HistoryEntry>;

/// One executed prompt as recorded by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub prompt: Value,
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
    #[serde(default)]
    pub status: Option<HistoryStatus>,
}

/// Outputs produced by a single node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<ImageRef>,
    /// Non-image outputs (text, gifs, latents) kept as sent.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub status_str: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub messages: Vec<Value>,
}

/// Body of `POST /history`: clear everything and/or delete specific ids.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HistoryEdit {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub clear: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub delete: Vec<String>,
}

impl HistoryEdit {
    pub fn clear() -> Self {
        Self {
            clear: true,
            delete: Vec::new(),
        }
    }

    pub fn delete<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            clear: false,
            delete: ids.into_iter().map(Into::into).collect(),
        }
    }
}

// ── Uploads ─────────────────────────────────────────────────────────

/// An image to send to `upload/image`.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub overwrite: Option<bool>,
    pub subfolder: Option<String>,
    pub folder_type: Option<String>,
}

impl ImageUpload {
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            bytes,
            filename: filename.into(),
            overwrite: None,
            subfolder: None,
            folder_type: None,
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = Some(overwrite);
        self
    }

    pub fn subfolder(mut self, subfolder: impl Into<String>) -> Self {
        self.subfolder = Some(subfolder.into());
        self
    }

    pub fn folder_type(mut self, folder_type: impl Into<String>) -> Self {
        self.folder_type = Some(folder_type.into());
        self
    }
}

/// A mask to send to `upload/mask`, applied to `original`.
#[derive(Debug, Clone)]
pub struct MaskUpload {
    pub image: ImageUpload,
    pub original: ImageRef,
}

impl MaskUpload {
    pub fn new(image: ImageUpload, original: ImageRef) -> Self {
        Self { image, original }
    }
}

/// Where the server stored an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadResult {
    pub name: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub folder_type: String,
}

impl UploadResult {
    /// The uploaded file as an image reference usable in a mask upload.
    pub fn as_image_ref(&self) -> ImageRef {
        ImageRef {
            filename: self.name.clone(),
            subfolder: self.subfolder.clone(),
            folder_type: self.folder_type.clone(),
        }
    }
}

// ── System ──────────────────────────────────────────────────────────

/// Answer to `GET /system_stats`.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemStats {
    pub system: SystemInfo,
    #[serde(default)]
    pub devices: Vec<DeviceStats>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemInfo {
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub python_version: String,
    #[serde(default)]
    pub embedded_python: bool,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceStats {
    pub name: String,
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub vram_total: u64,
    #[serde(default)]
    pub vram_free: u64,
    #[serde(default)]
    pub torch_vram_total: u64,
    #[serde(default)]
    pub torch_vram_free: u64,
}

/// Safetensors metadata returned by `view_metadata`.
pub type ModelMetadata = Map<String, Value>;

// ── Node schema ─────────────────────────────────────────────────────

/// Node class → schema.
pub type ObjectInfo = BTreeMap<String, NodeSchema>;

#[derive(Debug, Clone, Deserialize)]
pub struct NodeSchema {
    #[serde(default)]
    pub input: NodeInputs,
    #[serde(default)]
    pub output: Vec<Value>,
    #[serde(default)]
    pub output_name: Vec<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub output_node: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeInputs {
    #[serde(default)]
    pub required: Map<String, Value>,
    #[serde(default)]
    pub optional: Map<String, Value>,
}

impl NodeSchema {
    /// Choices of a combo input (`[[choice, ...], {...}]`), empty otherwise.
    pub fn choices(&self, input: &str) -> Vec<String> {
        self.input
            .required
            .get(input)
            .or_else(|| self.input.optional.get(input))
            .and_then(|spec| spec.get(0))
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ── Queue ───────────────────────────────────────────────────────────

/// Answer to `GET /queue`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueState {
    #[serde(default)]
    pub queue_running: Vec<Value>,
    #[serde(default)]
    pub queue_pending: Vec<Value>,
}

impl QueueState {
    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            running: u32::try_from(self.queue_running.len()).unwrap_or(u32::MAX),
            pending: u32::try_from(self.queue_pending.len()).unwrap_or(u32::MAX),
        }
    }
}

/// Snapshot of ComfyUI's queue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub running: u32,
    pub pending: u32,
}

/// Real-time sampling progress from ComfyUI's WebSocket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub node: Option<String>,
    pub current_step: u32,
    pub total_steps: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_history_response() {
        let history: History = serde_json::from_str(
            r#"{
            "abc123": {
                "prompt": [1, "abc123", {}, {}, ["9"]],
                "status": {"status_str": "success", "completed": true, "messages": []},
                "outputs": {
                    "9": {
                        "images": [
                            {"filename": "ComfyUI_00001_.png", "subfolder": "", "type": "output"}
                        ]
                    },
                    "12": {"text": ["hello"]}
                }
            }
        }"#,
        )
        .unwrap();

        let entry = &history["abc123"];
        let status = entry.status.as_ref().unwrap();
        assert_eq!(status.status_str, "success");
        assert!(status.completed);
        assert_eq!(entry.outputs["9"].images[0].filename, "ComfyUI_00001_.png");
        assert!(entry.outputs["12"].images.is_empty());
        assert!(entry.outputs["12"].other.contains_key("text"));
    }

    #[test]
    fn test_image_ref_wire_format() {
        let img = ImageRef::new("test.png");
        let json = serde_json::to_value(&img).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"filename": "test.png", "subfolder": "", "type": "output"})
        );

        let parsed: ImageRef = serde_json::from_str(r#"{"filename": "x.png"}"#).unwrap();
        assert_eq!(parsed, ImageRef::new("x.png"));
    }

    #[test]
    fn test_parse_queued_prompt() {
        let queued: QueuedPrompt = serde_json::from_str(
            r#"{"prompt_id": "abc-123-def", "number": 1, "node_errors": {}}"#,
        )
        .unwrap();
        assert_eq!(queued.prompt_id, "abc-123-def");
        assert_eq!(queued.number, Some(1));
        assert!(queued.node_errors.is_empty());
    }

    #[test]
    fn test_history_edit_body() {
        let clear = serde_json::to_value(HistoryEdit::clear()).unwrap();
        assert_eq!(clear, serde_json::json!({"clear": true}));

        let delete = serde_json::to_value(HistoryEdit::delete(["a", "b"])).unwrap();
        assert_eq!(delete, serde_json::json!({"delete": ["a", "b"]}));
    }

    #[test]
    fn test_queue_status() {
        let state: QueueState = serde_json::from_str(
            r#"{"queue_running": [["item1"]], "queue_pending": [["item2"], ["item3"]]}"#,
        )
        .unwrap();
        assert_eq!(state.status(), QueueStatus { running: 1, pending: 2 });

        let json = serde_json::to_string(&state.status()).unwrap();
        assert!(json.contains("\"running\":1"));
        assert!(json.contains("\"pending\":2"));
    }

    #[test]
    fn test_node_schema_choices() {
        let info: ObjectInfo = serde_json::from_str(
            r#"{
            "KSampler": {
                "input": {
                    "required": {
                        "sampler_name": [["euler", "dpmpp_2m", "dpmpp_sde"]],
                        "steps": ["INT", {"default": 20}]
                    }
                },
                "output": ["LATENT"],
                "name": "KSampler",
                "category": "sampling"
            }
        }"#,
        )
        .unwrap();

        let sampler = &info["KSampler"];
        assert_eq!(sampler.choices("sampler_name").len(), 3);
        assert!(sampler.choices("steps").is_empty());
        assert!(sampler.choices("missing").is_empty());
        assert_eq!(sampler.category, "sampling");
    }

    #[test]
    fn test_parse_system_stats() {
        let stats: SystemStats = serde_json::from_str(
            r#"{
            "system": {"os": "posix", "python_version": "3.11", "embedded_python": false, "comfyui_version": "0.3.10"},
            "devices": [{"name": "cuda:0", "type": "cuda", "index": 0, "vram_total": 100, "vram_free": 50,
                         "torch_vram_total": 10, "torch_vram_free": 5}]
        }"#,
        )
        .unwrap();
        assert_eq!(stats.system.os, "posix");
        assert!(stats.system.other.contains_key("comfyui_version"));
        assert_eq!(stats.devices[0].device_type, "cuda");
        assert_eq!(stats.devices[0].vram_free, 50);
    }

    #[test]
    fn test_upload_result_as_image_ref() {
        let result: UploadResult =
            serde_json::from_str(r#"{"name": "cat.png", "subfolder": "clip", "type": "input"}"#)
                .unwrap();
        let img = result.as_image_ref();
        assert_eq!(img.filename, "cat.png");
        assert_eq!(img.subfolder, "clip");
        assert_eq!(img.folder_type, "input");
    }
}

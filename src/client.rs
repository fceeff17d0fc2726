use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::connection::Link;
use crate::endpoint::Endpoint;
use crate::error::{ComfyError, Result};
use crate::logging::{Logger, TracingLogger};
use crate::types::*;

/// What goes in the request body. Anything but `Empty` makes it a POST.
enum Payload {
    Empty,
    Json(Value),
    Form(Form),
}

impl Payload {
    fn json<T: Serialize>(body: &T) -> Result<Self> {
        Ok(Payload::Json(serde_json::to_value(body)?))
    }
}

/// Async client for a ComfyUI server instance.
///
/// Every request method maps to one HTTP call and returns `Ok(None)` (or
/// `Ok(false)`) when the server answers with anything but HTTP 200 or with
/// an `error` field in the body. `Err` is reserved for transport failures
/// and bodies that cannot be decoded.
///
/// Clones share the same WebSocket connection.
///
/// # Example
/// ```no_run
/// use comfyui_client::ComfyClient;
///
/// # async fn example() -> comfyui_client::Result<()> {
/// let client = ComfyClient::new("127.0.0.1:8188", "my-app");
/// let healthy = client.health().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ComfyClient {
    http: Client,
    config: ClientConfig,
    pub(crate) logger: Arc<dyn Logger>,
    pub(crate) link: Arc<Link>,
}

impl ComfyClient {
    /// Create a new client for the given server address and client id.
    pub fn new(server_address: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self::with_config(ClientConfig::new(server_address, client_id))
    }

    /// Create a client from a full [`ClientConfig`].
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            logger: Arc::new(TracingLogger),
            link: Arc::new(Link::default()),
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Route this client's diagnostics through `logger`.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the configured server address (without scheme).
    pub fn server_address(&self) -> &str {
        &self.config.server_address
    }

    /// Returns the configured client ID.
    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    // ── Health ──────────────────────────────────────────────────────

    /// Check whether ComfyUI answers on `/system_stats`.
    pub async fn health(&self) -> Result<bool> {
        Ok(self
            .execute(Endpoint::SystemStats, &[], Payload::Empty)
            .await?
            .is_some())
    }

    // ── Discovery ───────────────────────────────────────────────────

    /// List installed textual-inversion embeddings.
    pub async fn embeddings(&self) -> Result<Option<Vec<String>>> {
        self.fetch_json(Endpoint::Embeddings, &[], Payload::Empty)
            .await
    }

    /// List web extensions served by ComfyUI.
    pub async fn extensions(&self) -> Result<Option<Vec<String>>> {
        self.fetch_json(Endpoint::Extensions, &[], Payload::Empty)
            .await
    }

    /// Schemas of every node class, or of a single one.
    pub async fn object_info(&self, node_class: Option<&str>) -> Result<Option<ObjectInfo>> {
        self.fetch_json(Endpoint::ObjectInfo(node_class), &[], Payload::Empty)
            .await
    }

    /// List available checkpoint models from ComfyUI.
    pub async fn checkpoints(&self) -> Result<Vec<String>> {
        self.combo_choices("CheckpointLoaderSimple", "ckpt_name")
            .await
    }

    /// List available sampler algorithms from ComfyUI.
    pub async fn samplers(&self) -> Result<Vec<String>> {
        self.combo_choices("KSampler", "sampler_name").await
    }

    /// List available scheduler algorithms from ComfyUI.
    pub async fn schedulers(&self) -> Result<Vec<String>> {
        self.combo_choices("KSampler", "scheduler").await
    }

    async fn combo_choices(&self, node_class: &str, input: &str) -> Result<Vec<String>> {
        Ok(self
            .object_info(Some(node_class))
            .await?
            .and_then(|info| info.get(node_class).map(|schema| schema.choices(input)))
            .unwrap_or_default())
    }

    /// Metadata embedded in a model file under `folder_name`.
    pub async fn view_metadata(
        &self,
        folder_name: &str,
        filename: Option<&str>,
    ) -> Result<Option<ModelMetadata>> {
        let params: Vec<(&str, &str)> = filename.map(|f| ("filename", f)).into_iter().collect();
        self.fetch_json(Endpoint::ViewMetadata(folder_name), &params, Payload::Empty)
            .await
    }

    /// OS, Python and device statistics.
    ///
    /// Requests `GET /system_stats`, the route ComfyUI actually serves.
    pub async fn system_stats(&self) -> Result<Option<SystemStats>> {
        self.fetch_json(Endpoint::SystemStats, &[], Payload::Empty)
            .await
    }

    // ── Prompt ──────────────────────────────────────────────────────

    /// Queue a workflow for execution under this client's id.
    pub async fn queue_prompt(&self, workflow: &Value) -> Result<Option<QueuedPrompt>> {
        let body = PromptRequest {
            prompt: workflow,
            client_id: &self.config.client_id,
        };
        self.fetch_json(Endpoint::Prompt, &[], Payload::json(&body)?)
            .await
    }

    /// Remaining queue length as seen by `GET /prompt`.
    pub async fn prompt_info(&self) -> Result<Option<PromptInfo>> {
        self.fetch_json(Endpoint::Prompt, &[], Payload::Empty).await
    }

    /// Interrupt the currently running generation.
    pub async fn interrupt(&self) -> Result<bool> {
        self.acknowledge(Endpoint::Interrupt, Payload::Json(Value::Object(Default::default())))
            .await
    }

    /// Free VRAM. If `unload_models` is true, all models are unloaded.
    pub async fn free_memory(&self, unload_models: bool) -> Result<bool> {
        let body = if unload_models {
            serde_json::json!({"unload_models": true})
        } else {
            serde_json::json!({"free_memory": true})
        };
        self.acknowledge(Endpoint::Free, Payload::Json(body)).await
    }

    // ── History & queue ─────────────────────────────────────────────

    /// History of one prompt, or of every prompt when `prompt_id` is `None`.
    pub async fn history(&self, prompt_id: Option<&str>) -> Result<Option<History>> {
        self.fetch_json(Endpoint::History(prompt_id), &[], Payload::Empty)
            .await
    }

    /// Clear or delete history entries.
    pub async fn edit_history(&self, edit: &HistoryEdit) -> Result<bool> {
        self.acknowledge(Endpoint::History(None), Payload::json(edit)?)
            .await
    }

    /// Running and pending queue items.
    pub async fn queue(&self) -> Result<Option<QueueState>> {
        self.fetch_json(Endpoint::Queue, &[], Payload::Empty).await
    }

    // ── Uploads ─────────────────────────────────────────────────────

    /// Upload an image into ComfyUI's input folder.
    pub async fn upload_image(&self, upload: &ImageUpload) -> Result<Option<UploadResult>> {
        let form = image_form(upload)?;
        self.fetch_json(Endpoint::UploadImage, &[], Payload::Form(form))
            .await
    }

    /// Upload a mask whose alpha is applied to an already uploaded image.
    pub async fn upload_mask(&self, upload: &MaskUpload) -> Result<Option<UploadResult>> {
        let original = serde_json::to_string(&upload.original)?;
        let form = image_form(&upload.image)?.text("original_ref", original);
        self.fetch_json(Endpoint::UploadMask, &[], Payload::Form(form))
            .await
    }

    // ── Image download ──────────────────────────────────────────────

    /// Download an image by its reference. Returns raw bytes.
    pub async fn view(&self, img: &ImageRef) -> Result<Option<Vec<u8>>> {
        let params = [
            ("filename", img.filename.as_str()),
            ("subfolder", img.subfolder.as_str()),
            ("type", img.folder_type.as_str()),
        ];
        let Some(resp) = self.execute(Endpoint::View, &params, Payload::Empty).await? else {
            return Ok(None);
        };
        let bytes = resp.bytes().await.map_err(|e| ComfyError::Network {
            context: format!("Failed to read image {} from ComfyUI", img.filename),
            source: e,
        })?;
        Ok(Some(bytes.to_vec()))
    }

    // ── Transport ───────────────────────────────────────────────────

    /// Send one request. `None` when the server answered with a non-200.
    async fn execute(
        &self,
        endpoint: Endpoint<'_>,
        params: &[(&str, &str)],
        payload: Payload,
    ) -> Result<Option<Response>> {
        let url = endpoint.http_url(&self.config, params)?;
        let request = match payload {
            Payload::Empty => self.http.get(url),
            Payload::Json(body) => self.http.post(url).json(&body),
            Payload::Form(form) => self.http.post(url).multipart(form),
        };
        let request = match self.config.authorization() {
            Some(auth) => request.header(AUTHORIZATION, auth),
            None => request,
        };

        let resp = request
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| ComfyError::Network {
                context: format!(
                    "Cannot reach ComfyUI at {} for /{} \u{2014} is the service running?",
                    self.config.server_address,
                    endpoint.name()
                ),
                source: e,
            })?;

        if resp.status() != StatusCode::OK {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            self.logger.warn(&format!(
                "/{} returned HTTP {}: {}",
                endpoint.name(),
                status,
                body
            ));
            return Ok(None);
        }

        Ok(Some(resp))
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint<'_>,
        params: &[(&str, &str)],
        payload: Payload,
    ) -> Result<Option<T>> {
        let Some(resp) = self.execute(endpoint, params, payload).await? else {
            return Ok(None);
        };
        let text = resp.text().await.map_err(|e| ComfyError::Network {
            context: format!("Failed to read ComfyUI /{} response", endpoint.name()),
            source: e,
        })?;

        let json: Value = serde_json::from_str(&text)?;
        if self.is_server_error(endpoint, &json) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(json)?))
    }

    /// For endpoints that answer with an empty or irrelevant body.
    async fn acknowledge(&self, endpoint: Endpoint<'_>, payload: Payload) -> Result<bool> {
        let Some(resp) = self.execute(endpoint, &[], payload).await? else {
            return Ok(false);
        };
        let text = resp.text().await.unwrap_or_default();
        match serde_json::from_str::<Value>(&text) {
            Ok(json) => Ok(!self.is_server_error(endpoint, &json)),
            Err(_) => Ok(true),
        }
    }

    fn is_server_error(&self, endpoint: Endpoint<'_>, json: &Value) -> bool {
        match json.get("error") {
            Some(error) => {
                self.logger
                    .warn(&format!("/{} reported an error: {}", endpoint.name(), error));
                true
            }
            None => false,
        }
    }
}

fn image_form(upload: &ImageUpload) -> Result<Form> {
    let part = Part::bytes(upload.bytes.clone())
        .file_name(upload.filename.clone())
        .mime_str(mime_for(&upload.filename))
        .map_err(|e| ComfyError::InvalidConfig(format!("Bad upload content type: {}", e)))?;

    let mut form = Form::new().part("image", part);
    if let Some(overwrite) = upload.overwrite {
        form = form.text("overwrite", overwrite.to_string());
    }
    if let Some(subfolder) = &upload.subfolder {
        form = form.text("subfolder", subfolder.clone());
    }
    if let Some(folder_type) = &upload.folder_type {
        form = form.text("type", folder_type.clone());
    }
    Ok(form)
}

fn mime_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builder() {
        let client = ComfyClient::new("http://127.0.0.1:8188/", "my-app");
        assert_eq!(client.server_address(), "127.0.0.1:8188");
        assert_eq!(client.client_id(), "my-app");
        assert!(!client.config().secure);
    }

    #[test]
    fn test_with_config() {
        let config = ClientConfig::builder()
            .with_server_address("https://comfy.example.com")
            .with_client_id("abc")
            .build();
        let client = ComfyClient::with_config(config);
        assert!(client.config().secure);
        assert_eq!(client.client_id(), "abc");
    }

    #[test]
    fn test_prompt_body() {
        let workflow = serde_json::json!({"1": {"class_type": "SaveImage", "inputs": {}}});
        let body = PromptRequest {
            prompt: &workflow,
            client_id: "abc",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["client_id"], "abc");
        assert_eq!(json["prompt"]["1"]["class_type"], "SaveImage");
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for("a.PNG"), "image/png");
        assert_eq!(mime_for("b.jpeg"), "image/jpeg");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }

    #[test]
    fn test_image_form_builds() {
        let upload = ImageUpload::new(vec![1, 2, 3], "cat.png")
            .overwrite(true)
            .subfolder("pets");
        let form = image_form(&upload).unwrap();
        assert!(!form.boundary().is_empty());
    }
}

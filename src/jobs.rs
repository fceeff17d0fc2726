use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::client::ComfyClient;
use crate::error::{ComfyError, Result};
use crate::events::ServerEvent;
use crate::subscription::OneShot;
use crate::types::{CollectedImage, HistoryEntry, JobOutputs, ProgressUpdate};

impl ComfyClient {
    /// Queue `workflow`, wait for its completion event, and download every
    /// image its output nodes produced.
    ///
    /// Requires an open connection (see [`connect`](Self::connect)); this
    /// never connects implicitly. There is no built-in timeout: wrap the
    /// future in `tokio::time::timeout` to bound the wait.
    pub async fn get_images(&self, workflow: &Value) -> Result<JobOutputs> {
        self.get_images_with_progress(workflow, |_| {}).await
    }

    /// Like [`get_images`](Self::get_images), calling `on_progress` for
    /// each sampling step of this job.
    pub async fn get_images_with_progress<F>(
        &self,
        workflow: &Value,
        mut on_progress: F,
    ) -> Result<JobOutputs>
    where
        F: FnMut(ProgressUpdate),
    {
        let observers = self.open_observers().await?;
        // Registered before submission: a cached job can finish before the
        // prompt id comes back. Held frames are replayed once it is known.
        let finished = OneShot::pending(&observers);

        let queued = self
            .queue_prompt(workflow)
            .await?
            .ok_or(ComfyError::Rejected { operation: "prompt" })?;
        if !queued.node_errors.is_empty() {
            return Err(ComfyError::NodeErrors(
                serde_json::to_string_pretty(&queued.node_errors).unwrap_or_default(),
            ));
        }
        let prompt_id = queued.prompt_id;
        self.logger.debug(&format!("Queued prompt {}", prompt_id));

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let pid = prompt_id.clone();
        finished.arm(move |text| match ServerEvent::parse(text) {
            Err(e) => Some(Err(ComfyError::MalformedFrame(e))),
            Ok(event) if event.is_completion_of(&pid) => Some(Ok(())),
            Ok(ServerEvent::ExecutionError(e)) if e.prompt_id.as_deref() == Some(pid.as_str()) => {
                Some(Err(ComfyError::GenerationFailed(e.exception_message)))
            }
            Ok(ServerEvent::Progress(p)) => {
                if p.prompt_id.as_deref() == Some(pid.as_str()) {
                    let _ = progress_tx.send(ProgressUpdate {
                        node: p.node,
                        current_step: p.value,
                        total_steps: p.max,
                    });
                }
                None
            }
            Ok(_) => None,
        });
        let finished = finished.wait();
        tokio::pin!(finished);

        let outcome = loop {
            tokio::select! {
                outcome = &mut finished => break outcome,
                Some(update) = progress_rx.recv() => on_progress(update),
            }
        };
        // Outer: the connection went away. Inner: the frame reported a failure.
        outcome??;

        while let Ok(update) = progress_rx.try_recv() {
            on_progress(update);
        }

        self.collect_outputs(&prompt_id).await
    }

    async fn collect_outputs(&self, prompt_id: &str) -> Result<JobOutputs> {
        let history = self
            .history(Some(prompt_id))
            .await?
            .ok_or(ComfyError::Rejected { operation: "history" })?;
        let entry = history.get(prompt_id).ok_or_else(|| {
            ComfyError::InvalidResponse(format!("History has no record for prompt {}", prompt_id))
        })?;
        self.download_outputs(entry).await
    }

    /// Fetch every image named in a history entry, grouped by output node.
    ///
    /// Output nodes without images map to an empty list.
    pub async fn download_outputs(&self, entry: &HistoryEntry) -> Result<JobOutputs> {
        let mut outputs = JobOutputs::new();
        for (node_id, node_output) in &entry.outputs {
            let mut collected = Vec::with_capacity(node_output.images.len());
            for image in &node_output.images {
                let blob = self
                    .view(image)
                    .await?
                    .ok_or(ComfyError::Rejected { operation: "view" })?;
                collected.push(CollectedImage {
                    image: image.clone(),
                    blob,
                });
            }
            outputs.insert(node_id.clone(), collected);
        }
        Ok(outputs)
    }

    /// Write each collected image to `dir/<filename>`, overwriting existing
    /// files. Creates `dir` if needed and returns the written paths.
    pub async fn save_images(&self, outputs: &JobOutputs, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| ComfyError::Io {
                path: dir.to_path_buf(),
                source,
            })?;

        let mut written = Vec::new();
        for image in outputs.values().flatten() {
            let name = Path::new(&image.image.filename).file_name().ok_or_else(|| {
                ComfyError::InvalidResponse(format!("Unusable image filename {:?}", image.image.filename))
            })?;
            let path = dir.join(name);
            tokio::fs::write(&path, &image.blob)
                .await
                .map_err(|source| ComfyError::Io {
                    path: path.clone(),
                    source,
                })?;
            self.logger
                .debug(&format!("Wrote {} bytes to {}", image.blob.len(), path.display()));
            written.push(path);
        }
        Ok(written)
    }
}

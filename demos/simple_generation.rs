//! Queue a text-to-image workflow and save the resulting images.
//!
//! Requires a running ComfyUI instance at 127.0.0.1:8188
//! with at least one checkpoint installed.
//!
//! ```sh
//! cargo run --example simple_generation
//! ```

use comfyui_client::{ComfyClient, ConnectionState};
use serde_json::json;
use std::time::Duration;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let client = ComfyClient::new("127.0.0.1:8188", "simple-generation");

    if !client.health().await? {
        eprintln!("ComfyUI is not responding");
        return Ok(());
    }

    let checkpoints = client.checkpoints().await?;
    let Some(checkpoint) = checkpoints.first() else {
        eprintln!("No checkpoints found, install a model first");
        return Ok(());
    };
    println!("Using checkpoint: {}", checkpoint);

    if client.connect().await? != ConnectionState::Open {
        eprintln!("WebSocket connection failed");
        return Ok(());
    }

    let workflow = json!({
        "1": {"class_type": "CheckpointLoaderSimple", "inputs": {"ckpt_name": checkpoint}},
        "2": {"class_type": "EmptyLatentImage", "inputs": {"width": 512, "height": 768, "batch_size": 1}},
        "3": {"class_type": "CLIPTextEncode", "inputs": {"text": "a beautiful sunset over mountains", "clip": ["1", 1]}},
        "4": {"class_type": "CLIPTextEncode", "inputs": {"text": "lowres, blurry", "clip": ["1", 1]}},
        "5": {"class_type": "KSampler", "inputs": {
            "seed": 42, "steps": 25, "cfg": 7.5, "sampler_name": "dpmpp_2m", "scheduler": "karras",
            "denoise": 1.0, "model": ["1", 0], "positive": ["3", 0], "negative": ["4", 0],
            "latent_image": ["2", 0]
        }},
        "6": {"class_type": "VAEDecode", "inputs": {"samples": ["5", 0], "vae": ["1", 2]}},
        "7": {"class_type": "SaveImage", "inputs": {"filename_prefix": "ComfyUI", "images": ["6", 0]}}
    });

    // No built-in timeout; bound the wait here.
    let outputs = tokio::time::timeout(
        Duration::from_secs(300),
        client.get_images_with_progress(&workflow, |p| {
            println!("  Step {}/{}", p.current_step, p.total_steps);
        }),
    )
    .await??;

    for path in client.save_images(&outputs, "./output").await? {
        println!("Saved: {}", path.display());
    }

    client.disconnect().await;
    Ok(())
}

//! Upload an image and a mask for inpainting, then inspect the queue.
//!
//! ```sh
//! cargo run --example inpaint_upload -- photo.png mask.png
//! ```

use comfyui_client::{ClientConfig, ComfyClient, Credentials, ImageUpload, MaskUpload};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let (Some(image_path), Some(mask_path)) = (args.next(), args.next()) else {
        eprintln!("usage: inpaint_upload <image> <mask>");
        return Ok(());
    };

    let mut builder = ClientConfig::builder()
        .with_server_address("127.0.0.1:8188")
        .with_client_id("inpaint-upload");
    if let (Ok(user), Ok(pass)) = (std::env::var("COMFYUI_USER"), std::env::var("COMFYUI_PASSWORD")) {
        builder = builder.with_credentials(Credentials::new(user, pass));
    }
    let client = ComfyClient::with_config(builder.build());

    let image = ImageUpload::new(std::fs::read(&image_path)?, "inpaint_source.png").overwrite(true);
    let Some(uploaded) = client.upload_image(&image).await? else {
        eprintln!("Image upload was rejected");
        return Ok(());
    };
    println!("Uploaded image as {}/{}", uploaded.folder_type, uploaded.name);

    let mask = MaskUpload::new(
        ImageUpload::new(std::fs::read(&mask_path)?, "inpaint_mask.png").overwrite(true),
        uploaded.as_image_ref(),
    );
    match client.upload_mask(&mask).await? {
        Some(result) => println!("Mask applied to {}", result.name),
        None => eprintln!("Mask upload was rejected"),
    }

    if let Some(queue) = client.queue().await? {
        let status = queue.status();
        println!("Queue: {} running, {} pending", status.running, status.pending);
    }

    Ok(())
}

//! The `ocr` subcommand.

use std::path::PathBuf;

use anyhow::bail;
use clap::Args;
use tokio::fs;

use crate::{
    config::ApiConfig,
    ocr::{ImageData, Recognizer},
    orchestrator::LoopOrder,
    prelude::*,
};

/// Options for the `ocr` subcommand.
#[derive(Debug, Args)]
pub struct OcrOpts {
    /// Path to the image to recognize.
    pub image: PathBuf,

    /// Treat the input file as base64 text instead of raw image bytes.
    #[clap(long)]
    pub base64: bool,
}

/// Run the `ocr` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_ocr(opts: &OcrOpts) -> Result<()> {
    let config = ApiConfig::from_env()?;
    let image = if opts.base64 {
        let text = fs::read_to_string(&opts.image)
            .await
            .with_context(|| format!("failed to read {}", opts.image.display()))?;
        ImageData::Base64(text)
    } else {
        let bytes = fs::read(&opts.image)
            .await
            .with_context(|| format!("failed to read {}", opts.image.display()))?;
        ImageData::Bytes(bytes)
    };

    let recognizer = Recognizer::new(config, LoopOrder::default());
    let result = recognizer.recognize(image).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if let Some(error) = &result.error {
        bail!("recognition failed: {error}");
    }
    Ok(())
}

/// Model file auto-download from HuggingFace.
///
/// Fetches the quantized nomic-embed-text GGUF file when it doesn't already
/// exist locally.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Base URL for HuggingFace model files.
const HF_BASE: &str = "https://huggingface.co/nomic-ai/nomic-embed-text-v1.5-GGUF/resolve/main";

/// GGUF file downloaded and loaded by default.
pub const MODEL_FILE: &str = "nomic-embed-text-v1.5.Q8_0.gguf";

/// Return the default model directory path.
#[must_use]
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("models/nomic-embed-text-v1.5")
}

/// Download URL for `file_name` in the model repository.
#[must_use]
pub fn model_url(file_name: &str) -> String {
    format!("{HF_BASE}/{file_name}")
}

/// Whether a non-empty model file exists at `path`.
#[must_use]
pub fn model_present(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

/// Download the model to `dest` if it is missing.
///
/// The file name of `dest` selects the file in the repository. Data is
/// written to a `.part` file next to `dest` and renamed into place once
/// complete, so an interrupted download never looks like a model.
pub fn download_model(dest: &Path) -> Result<()> {
    if model_present(dest) {
        info!("Model found at {}, skipping download", dest.display());
        return Ok(());
    }

    let file_name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("invalid model path: {}", dest.display()))?;
    if let Some(dir) = dest.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create models directory: {}", dir.display()))?;
    }

    eprintln!("[INFO] Downloading {file_name} from HuggingFace...");
    eprintln!("[INFO] This is a one-time download (~140MB), please wait...");

    let part = part_path(dest);
    let result = download_file(&part, &model_url(file_name));
    if let Err(e) = result {
        let _ = fs::remove_file(&part);
        return Err(e).with_context(|| format!("failed to download {file_name}"));
    }
    fs::rename(&part, dest)
        .with_context(|| format!("failed to move model into {}", dest.display()))?;

    eprintln!("[INFO] Model download complete!");
    Ok(())
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Stream a single file to `dest` with a progress bar.
fn download_file(dest: &Path, url: &str) -> Result<()> {
    let resp =
        reqwest::blocking::get(url).with_context(|| format!("HTTP request failed: {url}"))?;

    if !resp.status().is_success() {
        anyhow::bail!("bad status: {} for {url}", resp.status());
    }

    let pb = match resp.content_length() {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes}) {msg}")
                    .context("invalid progress template")?
                    .progress_chars("█▓░"),
            );
            pb
        }
        _ => ProgressBar::new_spinner(),
    };

    let mut file = fs::File::create(dest)
        .with_context(|| format!("failed to create file: {}", dest.display()))?;
    let mut reader = pb.wrap_read(resp);
    io::copy(&mut reader, &mut file).context("failed to write model file")?;
    file.sync_all().context("failed to flush model file")?;
    pb.finish_and_clear();

    Ok(())
}

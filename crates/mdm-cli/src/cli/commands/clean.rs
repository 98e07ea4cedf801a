//! `mdm clean` – remove part files left by an interrupted download.

use anyhow::{Context, Result};
use mdm_core::chunk::clean_temp_files;
use mdm_core::config::MdmConfig;
use mdm_core::downloaders::DownloadSettings;
use std::path::Path;

pub fn run_clean(cfg: &MdmConfig, output: &Path) -> Result<bool> {
    let destination = DownloadSettings::from_config(cfg).resolve(output);
    let removed = clean_temp_files(&destination).with_context(|| format!("clean parts of {}", destination.display()))?;
    tracing::info!(path = %destination.display(), removed, "cleaned part files");
    println!("Removed {} part file(s) for {}.", removed, destination.display());
    Ok(true)
}

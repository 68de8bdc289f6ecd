// src/recipe/kitchen/archive.rs

//! Archive and source file utilities for the Kitchen

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Download a file from a URL
pub fn download_file(url: &str, dest: &Path) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(600))
        .user_agent(concat!("mpd-kitchen/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::DownloadError(format!("HTTP client setup failed: {}", e)))?;

    let mut response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::DownloadError(format!("Failed to download {}: {}", url, e)))?;

    let mut file = File::create(dest)?;
    io::copy(&mut response, &mut file)
        .map_err(|e| Error::DownloadError(format!("Failed to write {}: {}", dest.display(), e)))?;

    Ok(())
}

/// SHA-256 of a file as lowercase hex
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Verify file checksum
///
/// The expected checksum is in the format "sha256:<hex>".
pub fn verify_file_checksum(path: &Path, expected: &str) -> Result<bool> {
    let (algorithm, expected_hash) = expected
        .split_once(':')
        .ok_or_else(|| Error::ParseError("Invalid checksum format".to_string()))?;

    if algorithm != "sha256" {
        return Err(Error::ParseError(format!(
            "Unsupported checksum algorithm: {} (supported: sha256)",
            algorithm
        )));
    }

    let actual = sha256_file(path)?;
    Ok(actual.eq_ignore_ascii_case(expected_hash))
}

/// Extract an archive to a destination directory
///
/// Supports: .tar.gz, .tgz, .tar.xz, .txz, .tar.bz2, .tbz2, .tar
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let filename = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let mode = if filename.ends_with(".tar.gz") || filename.ends_with(".tgz") {
        "-xzf"
    } else if filename.ends_with(".tar.xz") || filename.ends_with(".txz") {
        "-xJf"
    } else if filename.ends_with(".tar.bz2") || filename.ends_with(".tbz2") {
        "-xjf"
    } else if filename.ends_with(".tar") {
        "-xf"
    } else {
        return Err(Error::ParseError(format!(
            "Unknown archive format: {}",
            filename
        )));
    };

    fs::create_dir_all(dest)?;

    let output = Command::new("tar")
        .arg(mode)
        .arg(archive)
        .arg("-C")
        .arg(dest)
        .output()
        .map_err(|e| Error::IoError(format!("tar failed: {}", e)))?;

    if !output.status.success() {
        return Err(Error::IoError(format!(
            "Failed to extract archive: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(())
}

/// Apply a patch to the source directory
pub fn apply_patch(source_dir: &Path, patch_path: &Path, strip: u32) -> Result<()> {
    let output = Command::new("patch")
        .arg(format!("-p{}", strip))
        .arg("-i")
        .arg(patch_path)
        .current_dir(source_dir)
        .output()
        .map_err(|e| Error::IoError(format!("patch failed: {}", e)))?;

    if !output.status.success() {
        return Err(Error::BuildFailure {
            phase: "patch".to_string(),
            output: String::from_utf8_lossy(&output.stdout).to_string(),
        });
    }

    Ok(())
}

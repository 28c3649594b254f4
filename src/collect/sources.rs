// Prefix sources - prefix files, IRR AS-SET enumeration and the ignore list

use std::collections::BTreeSet;
use std::path::Path;
use tokio::process::Command;

use crate::error::{AppError, AppResult};
use crate::routes::Prefix;

pub const DEFAULT_ENUMERATOR: &str = "enumerate_as_set_prefixes";

/// Parse one prefix per line. Blank lines are skipped, anything else must be a valid network.
pub fn parse_prefix_list(text: &str) -> AppResult<Vec<Prefix>> {
    text.lines()
        .map(str::trim)
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .map(|(idx, line)| {
            line.parse::<Prefix>()
                .map_err(|_| AppError::InvalidPrefix(format!("{} (line {})", line, idx + 1)))
        })
        .collect()
}

pub fn load_prefix_file(path: &Path) -> AppResult<Vec<Prefix>> {
    if !path.is_file() {
        return Err(AppError::MissingInput(format!("prefix file {} not found", path.display())));
    }
    let prefixes = parse_prefix_list(&std::fs::read_to_string(path)?)?;
    if prefixes.is_empty() {
        return Err(AppError::MissingInput(format!("prefix file {} is empty", path.display())));
    }
    tracing::debug!("Loaded {} prefixes from {}", prefixes.len(), path.display());
    Ok(prefixes)
}

/// Enumerate an AS-SET or aut-num through the external IRR enumerator.
pub async fn enumerate_as_set(program: &str, object: &str) -> AppResult<Vec<Prefix>> {
    tracing::debug!("Calling {} -q {}", program, object);
    let output = Command::new(program)
        .args(["-q", object])
        .output()
        .await
        .map_err(|e| AppError::CommandExecution(format!("{}: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::CommandExecution(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }

    let prefixes = parse_prefix_list(&String::from_utf8_lossy(&output.stdout))?;
    if prefixes.is_empty() {
        return Err(AppError::MissingInput(format!("{} enumerated no prefixes", object)));
    }
    Ok(prefixes)
}

/// Load the operator's ignore list. A missing file is an empty list; bad lines are skipped.
pub fn load_ignore_file(path: &Path) -> AppResult<BTreeSet<Prefix>> {
    if !path.exists() {
        tracing::info!("No ignore file found at: {}", path.display());
        return Ok(BTreeSet::new());
    }

    let mut ignored = BTreeSet::new();
    for line in std::fs::read_to_string(path)?.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        match line.parse::<Prefix>() {
            Ok(prefix) => {
                ignored.insert(prefix);
            }
            Err(e) => tracing::warn!("Ignoring bad line in {}: {}", path.display(), e),
        }
    }

    tracing::info!("Found ignore file: {}", path.display());
    tracing::info!("Ignoring {} prefix(es)", ignored.len());
    Ok(ignored)
}

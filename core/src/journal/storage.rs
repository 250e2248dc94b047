use super::RunEntry;
use anyhow::Context;
use std::fs;
use std::path::Path;

pub fn load_journal(path: &Path) -> anyhow::Result<Vec<RunEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read run journal: {}", path.display()))?;

    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<RunEntry> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse run journal: {}", path.display()))?;

    Ok(entries)
}

pub fn save_journal(path: &Path, entries: &[RunEntry]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create journal directory: {}", parent.display())
        })?;
    }

    let content =
        serde_json::to_string_pretty(entries).context("Failed to serialize run journal")?;

    fs::write(path, content)
        .with_context(|| format!("Failed to write run journal: {}", path.display()))?;

    Ok(())
}

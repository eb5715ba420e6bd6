//! `skopeo-mirror completions` - Generate shell completions
//!
//! Supports bash, zsh, fish, and PowerShell.

use anyhow::{Context, Result};
use clap_complete::Shell;
use std::fs;
use std::path::{Path, PathBuf};

const BIN_NAME: &str = "skopeo-mirror";

pub fn generate_completions(shell: Shell) -> Result<String> {
    use clap_complete::generate;

    let mut cmd = super::build_cli();
    let mut buf = Vec::new();
    generate(shell, &mut cmd, BIN_NAME, &mut buf);

    String::from_utf8(buf).context("Failed to generate completions")
}

pub fn save_completions(completions: &str, output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(output_path, completions)
        .with_context(|| format!("Failed to write completions to: {}", output_path.display()))?;
    Ok(())
}

/// Per-user location each shell loads completions from
pub fn default_completions_path(shell: Shell, home: &Path) -> Result<PathBuf> {
    match shell {
        Shell::Bash => Ok(home
            .join(".local/share/bash-completion/completions")
            .join(BIN_NAME)),
        Shell::Zsh => Ok(home.join(".zsh/completion").join(format!("_{BIN_NAME}"))),
        Shell::Fish => Ok(home
            .join(".config/fish/completions")
            .join(format!("{BIN_NAME}.fish"))),
        Shell::PowerShell => Ok(home
            .join(".config/powershell/completions")
            .join(format!("{BIN_NAME}.ps1"))),
        _ => anyhow::bail!("Unsupported shell: {:?}", shell),
    }
}

use std::{path::Path, str::FromStr};

use alloy::signers::local::PrivateKeySigner;
use eyre::WrapErr;
use tokio::io::AsyncBufReadExt;

pub async fn read_file_lines(path: impl AsRef<Path>) -> eyre::Result<Vec<String>> {
    let file = tokio::fs::read(path).await?;
    let mut lines = file.lines();

    let mut contents = vec![];
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            contents.push(trimmed.to_string());
        }
    }

    Ok(contents)
}

/// Reads one private key per line, keeping file order and duplicates.
pub async fn read_private_keys(path: impl AsRef<Path>) -> eyre::Result<Vec<PrivateKeySigner>> {
    let path = path.as_ref();
    let lines = read_file_lines(path)
        .await
        .wrap_err_with(|| format!("Failed to read private keys from {}", path.display()))?;

    if lines.is_empty() {
        eyre::bail!("No private keys found in {}", path.display());
    }

    lines
        .iter()
        .enumerate()
        .map(|(i, pk)| {
            let key = pk.strip_prefix("0x").unwrap_or(pk);
            // the key itself must never end up in the error message
            PrivateKeySigner::from_str(key)
                .map_err(|_| eyre::eyre!("Private key #{} in {} is invalid", i + 1, path.display()))
        })
        .collect()
}

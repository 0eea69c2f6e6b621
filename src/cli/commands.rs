use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::progress::BarListener;
use crate::core::Core;
use crate::s3::signer;
use crate::s3::Transport;
use crate::sync::DiscrepancyResult;

/// Split `s3://bucket/key` (or mc-style `s3/bucket/key`) into bucket and optional key
pub fn parse_s3_path(path: &str) -> Result<(String, Option<String>)> {
    let path = path.trim();

    let stripped = if let Some(p) = path.strip_prefix("s3://") {
        p
    } else if let Some(p) = path.strip_prefix("s3/") {
        p
    } else {
        anyhow::bail!("Invalid S3 path format. Expected: s3://bucket/key");
    };

    let (bucket, key) = match stripped.split_once('/') {
        Some((bucket, key)) => (bucket, key),
        None => (stripped, ""),
    };
    if bucket.is_empty() {
        anyhow::bail!("Bucket name cannot be empty");
    }

    let key = if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    };
    Ok((bucket.to_string(), key))
}

/// Parse `Name: value` header arguments
pub fn parse_header_args(args: &[String]) -> Result<BTreeMap<String, String>> {
    let mut headers = BTreeMap::new();
    for arg in args {
        let (name, value) = arg
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("Invalid header '{}', expected Name:Value", arg))?;
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("Invalid header '{}', name is empty", arg);
        }
        headers.insert(name.to_string(), value.trim().to_string());
    }
    Ok(headers)
}

/// Format bytes in human-readable form (B, KB, MB, GB, TB)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let exponent = (bytes_f64.ln() / 1024_f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);

    let value = bytes_f64 / 1024_f64.powi(exponent as i32);

    if exponent == 0 {
        format!("{} {}", bytes, UNITS[exponent])
    } else {
        format!("{:.2} {}", value, UNITS[exponent])
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Print a delegated URL for one object
pub async fn cmd_presign(
    core: &Core,
    verb: &str,
    path: &str,
    expires_in: u64,
    content_type: Option<&str>,
    headers: &[String],
) -> Result<()> {
    let (bucket, key) = parse_s3_path(path)?;
    let key = key.ok_or_else(|| anyhow::anyhow!("Object key is required for presign"))?;
    let resource = signer::resource_path(&bucket, &key);
    let expires_in = i64::try_from(expires_in).context("Expiry is too large")?;
    let expiry = Utc::now().timestamp() + expires_in;

    let url = match verb {
        "get" => core
            .url_factory
            .create_get_url(&resource, expiry, core.credential())?,
        "put" => {
            let headers = parse_header_args(headers)?;
            core.url_factory.create_put_url(
                &resource,
                expiry,
                core.credential(),
                content_type.unwrap_or("application/octet-stream"),
                &headers,
            )?
        }
        other => anyhow::bail!("Unsupported presign verb: {}", other),
    };

    println!("{}", url.url());
    if let Some(bound) = &url.bound_metadata {
        eprintln!("Upload must send:");
        eprintln!("  Content-Type: {}", bound.content_type);
        for (name, value) in &bound.headers {
            eprintln!("  {}: {}", name, value);
        }
    }
    Ok(())
}

fn print_discrepancies(result: &DiscrepancyResult) {
    let sections = [
        ("Only on server", &result.only_on_server),
        ("Only on client", &result.only_on_client),
        ("Updated on server", &result.updated_on_server),
        ("Updated on client", &result.updated_on_client),
    ];
    for (title, keys) in sections {
        if keys.is_empty() {
            continue;
        }
        println!("{} ({}):", title, keys.len());
        for key in keys {
            println!("  {}", key);
        }
    }
    println!(
        "Synchronized: {} of {} keys",
        result.synchronized.len(),
        result.len()
    );
}

/// Compare a local directory against a remote prefix
pub async fn cmd_diff(
    core: &Core,
    local_dir: &str,
    remote: &str,
    local_prefix: &str,
    json: bool,
    progress: bool,
) -> Result<()> {
    let (bucket, prefix) = parse_s3_path(remote)?;
    let prefix = prefix.unwrap_or_default();
    let root = Path::new(local_dir);
    if !root.is_dir() {
        anyhow::bail!("Not a directory: {}", local_dir);
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            ctrl_c.cancel();
        }
    });

    let mut listener = if progress && !json {
        BarListener::new("fetching metadata")?
    } else {
        BarListener::hidden()
    };

    let reconciler = core.reconciler(&bucket);
    let result = reconciler
        .reconcile(root, local_prefix, &prefix, &mut listener, &cancel)
        .await
        .context(format!("Failed to compare {} with {}", local_dir, remote))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_discrepancies(&result);
    }
    Ok(())
}

/// Stat command
pub async fn cmd_stat(core: &Core, path: &str) -> Result<()> {
    let (bucket, key) = parse_s3_path(path)?;
    let key = key.ok_or_else(|| anyhow::anyhow!("Object key is required for stat command"))?;

    let client = core.s3_client_for(&bucket);
    let entry = client.fetch_metadata(&key).await?;

    println!("Object: s3://{}/{}", bucket, entry.key);
    println!("Size: {} ({})", format_bytes(entry.size_bytes), entry.size_bytes);
    println!("Last Modified: {}", format_date(&entry.last_modified));
    if let Some(ref etag) = entry.etag {
        println!("ETag: {}", etag);
    }
    if let Some(ref hash) = entry.content_hash {
        println!("MD5: {}", hash);
    }
    if let Some(ref date) = entry.local_file_date {
        println!("Original File Date: {}", format_date(date));
    }

    Ok(())
}

/// List objects command
pub async fn cmd_ls(core: &Core, path: &str) -> Result<()> {
    let (bucket, prefix) = parse_s3_path(path)?;
    let client = core.s3_client_for(&bucket);
    let objects = client.list_objects(prefix.as_deref().unwrap_or("")).await?;

    let mut total_size = 0u64;
    for obj in &objects {
        total_size += obj.size;
        println!(
            "[{}] {:>10} {}",
            obj.last_modified.as_deref().unwrap_or("-"),
            format_bytes(obj.size),
            obj.key
        );
    }
    println!("Total: {} objects, {}", objects.len(), format_bytes(total_size));

    Ok(())
}

/// Upload one file with hash and file-date metadata
pub async fn cmd_put(core: &Core, source: &str, destination: &str) -> Result<()> {
    let source_path = Path::new(source);
    if !source_path.is_file() {
        anyhow::bail!("Not a file: {}", source);
    }
    let (bucket, key) = parse_s3_path(destination)?;
    let key = match key {
        Some(key) if key.ends_with('/') => format!("{}{}", key, file_name(source_path)?),
        Some(key) => key,
        None => file_name(source_path)?,
    };

    let client = core.s3_client_for(&bucket);
    let etag = client
        .put_file(&key, source_path)
        .await
        .context(format!("Failed to upload {}", source))?;

    println!("Uploaded: s3://{}/{} (ETag {})", bucket, key, etag);
    Ok(())
}

/// Download one object to a local file
pub async fn cmd_get(core: &Core, source: &str, destination: &str) -> Result<()> {
    let (bucket, key) = parse_s3_path(source)?;
    let key = key.ok_or_else(|| anyhow::anyhow!("Object key is required for get command"))?;

    let client = core.s3_client_for(&bucket);
    let body = client.get_object(&key).await?;
    tokio::fs::write(destination, &body)
        .await
        .context(format!("Failed to write {}", destination))?;

    println!("Downloaded: {} ({})", destination, format_bytes(body.len() as u64));
    Ok(())
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow::anyhow!("Path has no file name: {}", path.display()))
}

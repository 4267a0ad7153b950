// 🌐 Remote fetch - pull the organizations' reports over SFTP
//
// The staging directory is wiped first, so after a successful fetch it holds
// exactly the `.csv` files found remotely.

use crate::config::RemoteConfig;
use crate::external::is_csv;
use crate::storage::reset_dir;
use anyhow::{Context, Result};
use ssh2::Session;
use std::fs::File;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn fetch_external(remote: &RemoteConfig, staging: &Path) -> Result<Vec<PathBuf>> {
    let username = std::env::var(&remote.username_env)
        .with_context(|| format!("{} is not set", remote.username_env))?;
    let password = std::env::var(&remote.password_env)
        .with_context(|| format!("{} is not set", remote.password_env))?;

    reset_dir(staging)?;

    let timeout = Duration::from_secs(remote.timeout_secs);
    let tcp = TcpStream::connect((remote.host.as_str(), remote.port))
        .with_context(|| format!("Failed to connect to {}:{}", remote.host, remote.port))?;
    tcp.set_read_timeout(Some(timeout))?;

    let mut session = Session::new().context("Failed to create SSH session")?;
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session.set_tcp_stream(tcp);
    session.handshake().context("SSH handshake failed")?;
    session
        .userauth_password(&username, &password)
        .with_context(|| format!("Authentication as {} failed", username))?;

    let sftp = session.sftp().context("Failed to open SFTP channel")?;
    let entries = sftp
        .readdir(Path::new(&remote.remote_dir))
        .with_context(|| format!("Failed to list {}", remote.remote_dir))?;

    let mut fetched = Vec::new();
    for (remote_path, stat) in entries {
        let name = match remote_path.file_name().and_then(|n| n.to_str()) {
            Some(name) if stat.is_file() && is_csv(name) => name.to_string(),
            _ => continue,
        };

        let local_path = staging.join(&name);
        let mut remote_file = sftp
            .open(&remote_path)
            .with_context(|| format!("Failed to open remote {}", remote_path.display()))?;
        let mut local_file = File::create(&local_path)?;
        std::io::copy(&mut remote_file, &mut local_file)
            .with_context(|| format!("Failed to download {}", name))?;

        tracing::info!(file = %name, "downloaded");
        fetched.push(local_path);
    }

    tracing::info!(host = %remote.host, files = fetched.len(), "remote fetch finished");
    Ok(fetched)
}

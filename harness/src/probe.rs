//! On-disk footprint probe
//!
//! Shells out to docker to size the volumes behind a backend. The result is a
//! human-readable string; any failure becomes a diagnostic string in its
//! place, so a broken probe never costs a metrics row.

use sensorbench_shared::utils::format_size;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected output from {command}: {output:?}")]
    Output { command: String, output: String },

    #[error("container {0} has no mounted volumes")]
    NoMounts(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProbe {
    /// Sum of `du -sb` over every mount of the named container.
    ContainerMounts { container: String, sudo: bool },
    /// `du -sh` of a named docker volume, read through a throwaway alpine container.
    Volume { volume: String },
    /// No footprint available (in-memory backends).
    Disabled,
}

#[derive(Debug, Deserialize)]
struct ContainerInfo {
    #[serde(rename = "Mounts", default)]
    mounts: Vec<MountInfo>,
}

#[derive(Debug, Deserialize)]
struct MountInfo {
    #[serde(rename = "Source", default)]
    source: Option<String>,
}

impl StorageProbe {
    /// Current footprint, or the reason it could not be measured.
    pub async fn size(&self) -> String {
        match self.lookup().await {
            Ok(size) => size,
            Err(e) => {
                debug!("Storage probe failed: {}", e);
                format!("error: {}", e)
            }
        }
    }

    async fn lookup(&self) -> Result<String, ProbeError> {
        match self {
            Self::ContainerMounts { container, sudo } => {
                let inspect = run("docker", &["inspect", container.as_str()]).await?;
                let sources = mount_sources(&inspect).ok_or_else(|| ProbeError::Output {
                    command: "docker inspect".to_string(),
                    output: truncate(&inspect),
                })?;
                if sources.is_empty() {
                    return Err(ProbeError::NoMounts(container.clone()));
                }

                let mut total = 0u64;
                for source in &sources {
                    let out = if *sudo {
                        run("sudo", &["du", "-sb", source.as_str()]).await?
                    } else {
                        run("du", &["-sb", source.as_str()]).await?
                    };
                    total += parse_du_bytes(&out).ok_or_else(|| ProbeError::Output {
                        command: "du -sb".to_string(),
                        output: truncate(&out),
                    })?;
                }
                Ok(format_size(total))
            }
            Self::Volume { volume } => {
                let mount = format!("{}:/data", volume);
                let out = run(
                    "docker",
                    &["run", "--rm", "-v", mount.as_str(), "alpine", "du", "-sh", "/data"],
                )
                .await?;
                out.split_whitespace()
                    .next()
                    .map(str::to_string)
                    .ok_or_else(|| ProbeError::Output {
                        command: "du -sh".to_string(),
                        output: truncate(&out),
                    })
            }
            Self::Disabled => Ok("n/a".to_string()),
        }
    }
}

async fn run(program: &str, args: &[&str]) -> Result<String, ProbeError> {
    let command = format!("{} {}", program, args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|source| ProbeError::Spawn {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(ProbeError::Failed {
            command,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Mount sources from `docker inspect` output (a JSON array of containers).
fn mount_sources(inspect_json: &str) -> Option<Vec<String>> {
    let containers: Vec<ContainerInfo> = serde_json::from_str(inspect_json).ok()?;
    let first = containers.into_iter().next()?;
    Some(first.mounts.into_iter().filter_map(|m| m.source).filter(|s| !s.is_empty()).collect())
}

/// First column of `du -sb` output.
fn parse_du_bytes(out: &str) -> Option<u64> {
    out.split_whitespace().next()?.parse().ok()
}

fn truncate(s: &str) -> String {
    s.trim().chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_sources() {
        let json = r#"[{"Id":"abc","Mounts":[
            {"Type":"volume","Source":"/var/lib/docker/volumes/a/_data","Destination":"/var/lib/mysql"},
            {"Type":"bind","Source":"/etc/mysql","Destination":"/etc/mysql"},
            {"Type":"tmpfs","Destination":"/tmp"}
        ]}]"#;
        assert_eq!(
            mount_sources(json).unwrap(),
            vec!["/var/lib/docker/volumes/a/_data", "/etc/mysql"]
        );
    }

    #[test]
    fn test_mount_sources_without_mounts() {
        assert_eq!(mount_sources(r#"[{"Id":"abc"}]"#).unwrap(), Vec::<String>::new());
        assert!(mount_sources("[]").is_none());
        assert!(mount_sources("not json").is_none());
    }

    #[test]
    fn test_parse_du_bytes() {
        assert_eq!(parse_du_bytes("123456\t/var/lib/docker/volumes/a/_data\n"), Some(123_456));
        assert_eq!(parse_du_bytes("du: cannot access"), None);
        assert_eq!(parse_du_bytes(""), None);
    }

    #[tokio::test]
    async fn test_disabled_probe() {
        assert_eq!(StorageProbe::Disabled.size().await, "n/a");
    }

    #[tokio::test]
    async fn test_failure_becomes_diagnostic() {
        let probe = StorageProbe::ContainerMounts {
            container: "sensorbench-no-such-container".to_string(),
            sudo: false,
        };
        assert!(probe.size().await.starts_with("error: "));
    }
}

//! Filesystem materializer backend.
//!
//! Droplets materialize as directory trees: the template's tree is copied
//! into a per-droplet instance directory, placeholders in the boot files
//! are rewritten, and `boot.sh` starts the droplet from inside its tree.
//! Teardown kills the droplet's terminal session and removes the tree.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::droplet::Droplet;
use crate::materializer::{MaterializeError, Materializer};

/// Boot files that get placeholder substitution, when present.
const REWRITE_FILES: &[&str] = &["boot.sh", "server.properties"];

/// The boot script every template must carry.
const BOOT_SCRIPT: &str = "boot.sh";

/// Configuration for the filesystem backend.
#[derive(Debug, Clone)]
pub struct WorkdirConfig {
    /// Directory holding one subdirectory per template.
    pub templates_dir: PathBuf,

    /// Directory receiving one subdirectory per live droplet.
    pub instances_dir: PathBuf,
}

impl Default for WorkdirConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("templates"),
            instances_dir: PathBuf::from("instances"),
        }
    }
}

/// Filesystem materializer.
pub struct WorkdirMaterializer {
    config: WorkdirConfig,
}

impl WorkdirMaterializer {
    pub fn new(config: WorkdirConfig) -> Self {
        Self { config }
    }

    fn template_dir(&self, template_name: &str) -> PathBuf {
        self.config.templates_dir.join(template_name)
    }

    fn instance_dir(&self, identifier: &str) -> PathBuf {
        self.config.instances_dir.join(identifier)
    }

    /// Placeholder → value pairs for a droplet: the endpoint and data,
    /// plus every scalar template parameter uppercased (`min-memory`
    /// becomes `MIN_MEMORY`).
    fn substitutions(droplet: &Droplet) -> Vec<(String, String)> {
        let mut vars = vec![
            ("IDENTIFIER".to_string(), droplet.identifier().to_string()),
            ("DATA".to_string(), droplet.data().to_string()),
            ("IP".to_string(), droplet.ip().to_string()),
            ("PORT".to_string(), droplet.port().to_string()),
        ];
        for (key, value) in &droplet.template().params {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            let placeholder = key.to_uppercase().replace('-', "_");
            vars.push((placeholder, rendered));
        }
        vars
    }

    async fn rewrite_boot_files(
        &self,
        target: &Path,
        droplet: &Droplet,
    ) -> Result<(), MaterializeError> {
        let vars = Self::substitutions(droplet);
        for name in REWRITE_FILES {
            let path = target.join(name);
            if !path.exists() {
                continue;
            }
            let mut contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
                MaterializeError::Prepare {
                    identifier: droplet.identifier().to_string(),
                    detail: format!("read {}: {e}", path.display()),
                }
            })?;
            for (placeholder, value) in &vars {
                contents = contents.replace(placeholder.as_str(), value);
            }
            tokio::fs::write(&path, contents).await.map_err(|e| {
                MaterializeError::Prepare {
                    identifier: droplet.identifier().to_string(),
                    detail: format!("write {}: {e}", path.display()),
                }
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl Materializer for WorkdirMaterializer {
    async fn prepare(&self, droplet: &Droplet) -> Result<(), MaterializeError> {
        let identifier = droplet.identifier();
        let template_dir = self.template_dir(&droplet.template().name);
        let target = self.instance_dir(identifier);

        // A previous droplet may have left a session or tree behind under
        // this identifier.
        kill_terminal(identifier).await;
        remove_tree(&target).await.map_err(|detail| MaterializeError::Prepare {
            identifier: identifier.to_string(),
            detail,
        })?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MaterializeError::Prepare {
                    identifier: identifier.to_string(),
                    detail: format!("create {}: {e}", parent.display()),
                })?;
        }

        run(
            "cp",
            [OsStr::new("-r"), template_dir.as_os_str(), target.as_os_str()],
        )
        .await
        .map_err(|detail| MaterializeError::Prepare {
            identifier: identifier.to_string(),
            detail,
        })?;

        self.rewrite_boot_files(&target, droplet).await
    }

    async fn boot(&self, identifier: &str) -> Result<(), MaterializeError> {
        let target = self.instance_dir(identifier);
        let script = target.join(BOOT_SCRIPT);

        run("chmod", [OsStr::new("+x"), script.as_os_str()])
            .await
            .map_err(|detail| MaterializeError::Boot {
                identifier: identifier.to_string(),
                detail,
            })?;

        // The script path is resolved after the chdir into the instance
        // directory, so exec it relative to there.
        let output = Command::new(format!("./{BOOT_SCRIPT}"))
            .current_dir(&target)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| MaterializeError::Boot {
                identifier: identifier.to_string(),
                detail: format!("spawn {}: {e}", script.display()),
            })?;
        log_output(BOOT_SCRIPT, &output);
        if !output.status.success() {
            return Err(MaterializeError::Boot {
                identifier: identifier.to_string(),
                detail: format!("{} exited with {}", BOOT_SCRIPT, output.status),
            });
        }
        Ok(())
    }

    async fn destroy(&self, identifier: &str) -> Result<(), MaterializeError> {
        kill_terminal(identifier).await;
        let target = self.instance_dir(identifier);
        remove_tree(&target)
            .await
            .map_err(|detail| MaterializeError::Destroy {
                identifier: identifier.to_string(),
                detail,
            })
    }
}

/// Run an external command, logging its combined output.
async fn run<I, S>(program: &str, args: I) -> Result<(), String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| format!("spawn {program}: {e}"))?;
    log_output(program, &output);
    if !output.status.success() {
        return Err(format!("{program} exited with {}", output.status));
    }
    Ok(())
}

fn log_output(program: &str, output: &std::process::Output) {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!(
        program,
        status = %output.status,
        stdout = %stdout.trim(),
        stderr = %stderr.trim(),
        "Command finished"
    );
}

/// Kill the droplet's terminal session. Sessions are per-identifier; a
/// missing session (or a missing tmux) is not an error.
async fn kill_terminal(identifier: &str) {
    match Command::new("tmux")
        .args(["kill-session", "-t", identifier])
        .stdin(Stdio::null())
        .output()
        .await
    {
        Ok(output) if !output.status.success() => {
            debug!(identifier, status = %output.status, "No terminal session to kill");
        }
        Ok(_) => {}
        Err(e) => warn!(identifier, error = %e, "Could not invoke tmux"),
    }
}

/// Remove a directory tree if it exists.
async fn remove_tree(path: &Path) -> Result<(), String> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(format!("remove {}: {e}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Template;
    use std::sync::Arc;

    fn backend(root: &Path) -> WorkdirMaterializer {
        WorkdirMaterializer::new(WorkdirConfig {
            templates_dir: root.join("templates"),
            instances_dir: root.join("instances"),
        })
    }

    fn droplet_for(template: Template) -> Droplet {
        Droplet::new(
            "arena-1".to_string(),
            1,
            Arc::new(template),
            "1.2.3.4".to_string(),
            25565,
            "map=nether".to_string(),
        )
    }

    fn seed_template(root: &Path, boot_contents: &str) {
        let dir = root.join("templates").join("arena");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("boot.sh"), boot_contents).unwrap();
        std::fs::write(dir.join("server.jar"), b"jar bytes").unwrap();
    }

    #[tokio::test]
    async fn prepare_copies_and_substitutes() {
        let root = tempfile::tempdir().unwrap();
        seed_template(
            root.path(),
            "#!/bin/sh\n# IDENTIFIER on IP:PORT mem MIN_MEMORY data DATA\n",
        );
        let template: Template =
            serde_json::from_str(r#"{"name":"arena","min-memory":512}"#).unwrap();
        let droplet = droplet_for(template);

        let backend = backend(root.path());
        backend.prepare(&droplet).await.unwrap();

        let target = root.path().join("instances").join("arena-1");
        assert!(target.join("server.jar").exists());
        let boot = std::fs::read_to_string(target.join("boot.sh")).unwrap();
        assert!(boot.contains("arena-1 on 1.2.3.4:25565"));
        assert!(boot.contains("mem 512"));
        assert!(boot.contains("data map=nether"));
    }

    #[tokio::test]
    async fn prepare_replaces_stale_tree() {
        let root = tempfile::tempdir().unwrap();
        seed_template(root.path(), "#!/bin/sh\n");
        let stale = root.path().join("instances").join("arena-1");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("leftover"), b"old").unwrap();

        let template: Template = serde_json::from_str(r#"{"name":"arena"}"#).unwrap();
        let backend = backend(root.path());
        backend.prepare(&droplet_for(template)).await.unwrap();

        assert!(!stale.join("leftover").exists());
        assert!(stale.join("boot.sh").exists());
    }

    #[tokio::test]
    async fn prepare_fails_without_template_tree() {
        let root = tempfile::tempdir().unwrap();
        let template: Template = serde_json::from_str(r#"{"name":"arena"}"#).unwrap();
        let backend = backend(root.path());
        let err = backend.prepare(&droplet_for(template)).await.unwrap_err();
        assert!(matches!(err, MaterializeError::Prepare { .. }));
    }

    #[tokio::test]
    async fn boot_runs_the_boot_script() {
        let root = tempfile::tempdir().unwrap();
        seed_template(root.path(), "#!/bin/sh\ntouch booted\n");
        let template: Template = serde_json::from_str(r#"{"name":"arena"}"#).unwrap();
        let backend = backend(root.path());
        backend.prepare(&droplet_for(template)).await.unwrap();

        backend.boot("arena-1").await.unwrap();
        let target = root.path().join("instances").join("arena-1");
        assert!(target.join("booted").exists());
    }

    #[tokio::test]
    async fn boot_surfaces_script_failure() {
        let root = tempfile::tempdir().unwrap();
        seed_template(root.path(), "#!/bin/sh\nexit 3\n");
        let template: Template = serde_json::from_str(r#"{"name":"arena"}"#).unwrap();
        let backend = backend(root.path());
        backend.prepare(&droplet_for(template)).await.unwrap();

        let err = backend.boot("arena-1").await.unwrap_err();
        assert!(matches!(err, MaterializeError::Boot { .. }));
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        seed_template(root.path(), "#!/bin/sh\n");
        let template: Template = serde_json::from_str(r#"{"name":"arena"}"#).unwrap();
        let backend = backend(root.path());
        backend.prepare(&droplet_for(template)).await.unwrap();

        backend.destroy("arena-1").await.unwrap();
        assert!(!root.path().join("instances").join("arena-1").exists());
        // Destroying again is accepted.
        backend.destroy("arena-1").await.unwrap();
    }
}

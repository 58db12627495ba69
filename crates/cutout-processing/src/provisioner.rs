//! Python environment provisioning for the `rembg` engine.
//!
//! Before a job runs, the provisioner makes sure `rembg`, `onnxruntime` and
//! `pillow` are importable by the configured interpreter, installing them with
//! pip when they are not. Failures are reported but callers treat them as
//! non-fatal: the job is still attempted and fails on its own if the packages
//! really are missing.

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::error::ProvisionError;
use crate::process;
use crate::traits::Provisioner;

/// Distributions the engine needs at import time.
const REQUIRED_PACKAGES: [&str; 2] = ["rembg", "onnxruntime"];

/// Prints `name==version` for the engine's distributions, comma separated.
const CHECK_SCRIPT: &str = r#"
import importlib.metadata as md
wanted = {"rembg", "pillow", "onnxruntime"}
found = []
for dist in md.distributions():
    name = (dist.metadata["Name"] or "").lower()
    if name in wanted:
        found.append(f"{name}=={dist.version}")
print(",".join(sorted(set(found))))
"#;

/// Installed distribution name to version.
pub type PackageList = BTreeMap<String, String>;

/// Parse the check script's `name==version,name==version` output.
pub fn parse_installed_packages(output: &str) -> PackageList {
    output
        .trim()
        .split(',')
        .filter_map(|entry| {
            let (name, version) = entry.trim().split_once("==")?;
            let name = name.trim().to_lowercase();
            if name.is_empty() {
                return None;
            }
            Some((name, version.trim().to_string()))
        })
        .collect()
}

/// Whether every package the engine imports is present.
pub fn has_required_packages(packages: &PackageList) -> bool {
    REQUIRED_PACKAGES.iter().all(|p| packages.contains_key(*p))
}

/// Versions listed by `pip index versions`, newest first.
pub fn parse_available_versions(output: &str) -> Vec<String> {
    let pattern = match Regex::new(r"Available versions: ([\d., ]+)") {
        Ok(pattern) => pattern,
        Err(_) => return Vec::new(),
    };
    pattern
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| {
            m.as_str()
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Arguments for `python -m pip install ...`.
///
/// A requirements file wins over the pinned package list.
pub fn install_args(requirements: Option<&Path>, onnxruntime_version: &str) -> Vec<String> {
    let mut args: Vec<String> = vec!["-m".into(), "pip".into(), "install".into()];
    match requirements {
        Some(path) => {
            args.push("-r".into());
            args.push(path.to_string_lossy().into_owned());
        }
        None => {
            args.extend([
                "rembg==2.0.65".to_string(),
                "pillow>=10.0.1,<12.0.0".to_string(),
                format!("onnxruntime=={}", onnxruntime_version),
                "numpy>=1.23.5".to_string(),
                "scipy>=1.9.0".to_string(),
                "pooch>=1.6.0".to_string(),
            ]);
        }
    }
    args
}

/// Locate `requirements.txt`: the configured path, then `dir`, then its parent.
pub fn find_requirements(configured: Option<&Path>, dir: &Path) -> Option<PathBuf> {
    if let Some(path) = configured {
        return path.is_file().then(|| path.to_path_buf());
    }
    [dir.join("requirements.txt"), dir.join("..").join("requirements.txt")]
        .into_iter()
        .find(|p| p.is_file())
}

/// Provisioner for engines that run in-process.
pub struct NoopProvisioner;

#[async_trait]
impl Provisioner for NoopProvisioner {
    async fn ensure_ready(&self) -> Result<(), ProvisionError> {
        Ok(())
    }
}

/// Checks and installs the `rembg` stack for one Python interpreter.
pub struct PythonProvisioner {
    python: String,
    requirements_path: Option<PathBuf>,
    default_onnxruntime_version: String,
    ready: AtomicBool,
    install_lock: Mutex<()>,
}

impl PythonProvisioner {
    pub fn new(
        python: impl Into<String>,
        requirements_path: Option<PathBuf>,
        default_onnxruntime_version: impl Into<String>,
    ) -> Self {
        Self {
            python: python.into(),
            requirements_path,
            default_onnxruntime_version: default_onnxruntime_version.into(),
            ready: AtomicBool::new(false),
            install_lock: Mutex::new(()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn check(&self) -> Result<PackageList, ProvisionError> {
        let output = process::run(&self.python, ["-c", CHECK_SCRIPT], None)
            .await
            .map_err(|source| ProvisionError::Spawn {
                program: self.python.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ProvisionError::CheckFailed(output.combined()));
        }
        Ok(parse_installed_packages(&output.stdout))
    }

    /// Newest `onnxruntime` pip can see, or the configured default.
    async fn resolve_onnxruntime_version(&self) -> String {
        let args = ["-m", "pip", "index", "versions", "onnxruntime"];
        match process::run(&self.python, args, None).await {
            Ok(output) => match parse_available_versions(&output.stdout).into_iter().next() {
                Some(version) => {
                    tracing::info!(version = %version, "Resolved latest onnxruntime version");
                    version
                }
                None => {
                    tracing::warn!(
                        default = %self.default_onnxruntime_version,
                        "Could not parse onnxruntime versions, using default"
                    );
                    self.default_onnxruntime_version.clone()
                }
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    default = %self.default_onnxruntime_version,
                    "onnxruntime version lookup failed, using default"
                );
                self.default_onnxruntime_version.clone()
            }
        }
    }

    async fn install(&self) -> Result<(), ProvisionError> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let requirements = find_requirements(self.requirements_path.as_deref(), &cwd);

        let args = match &requirements {
            Some(path) => {
                tracing::info!(requirements = %path.display(), "Installing packages from requirements file");
                install_args(Some(path.as_path()), "")
            }
            None => {
                let version = self.resolve_onnxruntime_version().await;
                tracing::info!("requirements.txt not found, installing pinned packages");
                install_args(None, &version)
            }
        };

        let output = process::run(&self.python, &args, None)
            .await
            .map_err(|source| ProvisionError::Spawn {
                program: self.python.clone(),
                source,
            })?;

        for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
            tracing::debug!(target: "cutout_processing::pip", "{}", line.trim());
        }

        if !output.status.success() {
            return Err(ProvisionError::InstallFailed(output.stderr.trim().to_string()));
        }
        tracing::info!("Package installation completed");
        Ok(())
    }
}

#[async_trait]
impl Provisioner for PythonProvisioner {
    async fn ensure_ready(&self) -> Result<(), ProvisionError> {
        if self.is_ready() {
            return Ok(());
        }

        let _guard = self.install_lock.lock().await;
        // Another caller may have finished while we waited.
        if self.is_ready() {
            return Ok(());
        }

        match self.check().await {
            Ok(packages) if has_required_packages(&packages) => {
                tracing::debug!(packages = ?packages, "Python environment ready");
                self.ready.store(true, Ordering::Release);
                return Ok(());
            }
            Ok(packages) => {
                tracing::info!(packages = ?packages, "Required Python packages missing");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Python environment check failed, attempting install");
            }
        }

        if let Err(e) = self.install().await {
            tracing::error!(error = %e, "Failed to install Python packages");
            return Err(e);
        }

        let packages = self.check().await?;
        tracing::info!(packages = ?packages, "Installed Python packages");
        if has_required_packages(&packages) {
            self.ready.store(true, Ordering::Release);
            Ok(())
        } else {
            Err(ProvisionError::CheckFailed(format!(
                "packages still missing after install: {:?}",
                packages
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_installed_packages() {
        let packages = parse_installed_packages("onnxruntime==1.17.0,pillow==10.2.0,rembg==2.0.65\n");
        assert_eq!(packages.len(), 3);
        assert_eq!(packages["rembg"], "2.0.65");
        assert!(has_required_packages(&packages));

        let partial = parse_installed_packages("pillow==10.2.0");
        assert!(!has_required_packages(&partial));
        assert!(parse_installed_packages("").is_empty());
    }

    #[test]
    fn test_parse_available_versions_newest_first() {
        let output = "onnxruntime (1.19.2)\nAvailable versions: 1.19.2, 1.19.0, 1.18.1, 1.17.0\n";
        let versions = parse_available_versions(output);
        assert_eq!(versions.first().map(String::as_str), Some("1.19.2"));
        assert_eq!(versions.len(), 4);

        assert!(parse_available_versions("ERROR: No matching distribution").is_empty());
    }

    #[test]
    fn test_install_args_pins_resolved_onnxruntime() {
        let args = install_args(None, "1.19.2");
        assert_eq!(&args[..3], ["-m", "pip", "install"]);
        assert!(args.contains(&"onnxruntime==1.19.2".to_string()));
        assert!(args.contains(&"rembg==2.0.65".to_string()));

        let args = install_args(Some(Path::new("/srv/requirements.txt")), "unused");
        assert_eq!(args[3..], ["-r", "/srv/requirements.txt"]);
    }

    #[test]
    fn test_find_requirements_prefers_working_dir_then_parent() {
        let root = tempfile::tempdir().unwrap();
        let child = root.path().join("app");
        std::fs::create_dir(&child).unwrap();
        assert_eq!(find_requirements(None, &child), None);

        std::fs::write(root.path().join("requirements.txt"), "rembg").unwrap();
        let found = find_requirements(None, &child).unwrap();
        assert!(found.ends_with("../requirements.txt"));

        std::fs::write(child.join("requirements.txt"), "rembg").unwrap();
        assert_eq!(
            find_requirements(None, &child),
            Some(child.join("requirements.txt"))
        );

        let missing = root.path().join("nope.txt");
        assert_eq!(find_requirements(Some(missing.as_path()), &child), None);
    }

    #[tokio::test]
    async fn test_missing_interpreter_reports_error() {
        let provisioner = PythonProvisioner::new("cutout-no-such-python", None, "1.17.0");
        let err = provisioner.ensure_ready().await.unwrap_err();
        assert!(matches!(err, ProvisionError::Spawn { .. }));
        assert!(!provisioner.is_ready());
    }

    #[tokio::test]
    async fn test_noop_provisioner_is_ready() {
        assert!(NoopProvisioner.ensure_ready().await.is_ok());
    }
}

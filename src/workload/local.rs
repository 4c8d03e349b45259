//! Filesystem-rooted container
//!
//! Used when the operator shares a volume with the workload: container paths
//! resolve below `root`, and supervisor state lives in `<root>/.pebble`
//! (`layers/<label>.yaml`, `services.yaml`, `checks.yaml`). Check results are
//! written to `checks.yaml` by whatever probes the workload.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::layer::{CheckInfo, CheckStatus, Layer, ServiceStatus, Startup};
use super::{Container, ExecOutput};
use crate::error::{Error, Result};

const STATE_DIR: &str = ".pebble";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ServiceState {
    status: ServiceStatus,
    /// Fingerprint of the service definition the process was started with
    #[serde(default)]
    started_with: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct CheckState {
    status: CheckStatus,
    #[serde(default)]
    failures: u32,
}

#[derive(Clone, Debug)]
pub struct LocalContainer {
    name: String,
    root: PathBuf,
}

impl LocalContainer {
    pub fn new(name: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path backing a container path
    pub fn host_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    /// Record the outcome of a probe run against `check`
    pub fn record_check(&self, check: &str, status: CheckStatus, failures: u32) -> Result<()> {
        let mut checks = self.load_checks()?;
        checks.insert(check.to_string(), CheckState { status, failures });
        self.write_state("checks.yaml", &serde_yaml::to_string(&checks)?)
    }

    fn state_path(&self, file: &str) -> PathBuf {
        self.root.join(STATE_DIR).join(file)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.can_connect() {
            Ok(())
        } else {
            Err(Error::WorkloadError(format!(
                "cannot connect to container {}",
                self.name
            )))
        }
    }

    fn write_state(&self, file: &str, content: &str) -> Result<()> {
        let path = self.state_path(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    fn load_services(&self) -> Result<BTreeMap<String, ServiceState>> {
        load_yaml_map(&self.state_path("services.yaml"))
    }

    fn load_checks(&self) -> Result<BTreeMap<String, CheckState>> {
        load_yaml_map(&self.state_path("checks.yaml"))
    }

    fn save_services(
        &self,
        before: &BTreeMap<String, ServiceState>,
        after: &BTreeMap<String, ServiceState>,
    ) -> Result<()> {
        if before == after {
            return Ok(());
        }
        self.write_state("services.yaml", &serde_yaml::to_string(after)?)
    }
}

fn load_yaml_map<T: serde::de::DeserializeOwned>(path: &Path) -> Result<BTreeMap<String, T>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_yaml::from_str(&raw)?)
}

fn service_fingerprint(service: &super::Service) -> Result<String> {
    let yaml = serde_yaml::to_string(service)?;
    Ok(hex::encode(Sha256::digest(yaml.as_bytes())))
}

impl Container for LocalContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_connect(&self) -> bool {
        self.root.is_dir()
    }

    fn exists(&self, path: &str) -> Result<bool> {
        self.ensure_connected()?;
        Ok(self.host_path(path).exists())
    }

    fn pull(&self, path: &str) -> Result<String> {
        self.ensure_connected()?;
        Ok(fs::read_to_string(self.host_path(path))?)
    }

    fn push(&mut self, path: &str, content: &str, make_dirs: bool) -> Result<()> {
        self.ensure_connected()?;
        let target = self.host_path(path);
        if make_dirs {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&target, content)?;
        debug!("Pushed {} to {}", path, self.name);
        Ok(())
    }

    fn remove_path(&mut self, path: &str, recursive: bool) -> Result<()> {
        self.ensure_connected()?;
        let target = self.host_path(path);
        if target.is_dir() {
            if recursive {
                fs::remove_dir_all(&target)?;
            } else {
                fs::remove_dir(&target)?;
            }
        } else {
            fs::remove_file(&target)?;
        }
        debug!("Removed {} from {}", path, self.name);
        Ok(())
    }

    fn add_layer(&mut self, label: &str, layer: &Layer, combine: bool) -> Result<()> {
        self.ensure_connected()?;
        let file = format!("layers/{label}.yaml");
        let path = self.state_path(&file);
        let yaml = layer.to_yaml()?;
        if path.exists() {
            if !combine {
                return Err(Error::WorkloadError(format!(
                    "layer {label} already exists in {}",
                    self.name
                )));
            }
            if fs::read_to_string(&path)? == yaml {
                debug!("Layer {} unchanged in {}", label, self.name);
                return Ok(());
            }
        }
        self.write_state(&file, &yaml)?;
        info!("Layer {} written to {}", label, self.name);
        Ok(())
    }

    fn plan(&self) -> Result<Layer> {
        self.ensure_connected()?;
        let dir = self.state_path("layers");
        let mut plan = Layer::default();
        if !dir.is_dir() {
            return Ok(plan);
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "yaml"))
            .collect();
        files.sort();
        for file in files {
            plan.combine(&Layer::from_yaml(&fs::read_to_string(file)?)?);
        }
        Ok(plan)
    }

    fn replan(&mut self) -> Result<()> {
        let plan = self.plan()?;
        let before = self.load_services()?;
        let mut after = before.clone();
        for (name, service) in &plan.services {
            if service.startup != Startup::Enabled {
                continue;
            }
            let fingerprint = service_fingerprint(service)?;
            let state = after.entry(name.clone()).or_default();
            if state.status != ServiceStatus::Active || state.started_with != fingerprint {
                info!("Starting service {} in {}", name, self.name);
                state.status = ServiceStatus::Active;
                state.started_with = fingerprint;
            }
        }
        self.save_services(&before, &after)
    }

    fn restart(&mut self, services: &[String]) -> Result<()> {
        let plan = self.plan()?;
        let before = self.load_services()?;
        let mut after = before.clone();
        for name in services {
            let service = plan.services.get(name).ok_or_else(|| {
                Error::WorkloadError(format!("service {name} is not in the plan of {}", self.name))
            })?;
            let state = after.entry(name.clone()).or_default();
            state.status = ServiceStatus::Active;
            state.started_with = service_fingerprint(service)?;
        }
        // Restarting always touches the process even when nothing changed.
        self.write_state("services.yaml", &serde_yaml::to_string(&after)?)
    }

    fn stop(&mut self, services: &[String]) -> Result<()> {
        self.ensure_connected()?;
        let before = self.load_services()?;
        let mut after = before.clone();
        for name in services {
            let state = after.entry(name.clone()).or_default();
            state.status = ServiceStatus::Inactive;
        }
        self.save_services(&before, &after)
    }

    fn service_status(&self, service: &str) -> Result<ServiceStatus> {
        self.ensure_connected()?;
        Ok(self
            .load_services()?
            .get(service)
            .map(|s| s.status)
            .unwrap_or_default())
    }

    fn get_checks(&self) -> Result<Vec<CheckInfo>> {
        let plan = self.plan()?;
        let recorded = self.load_checks()?;
        Ok(plan
            .checks
            .iter()
            .map(|(name, check)| {
                let state = recorded.get(name).cloned().unwrap_or_default();
                CheckInfo {
                    name: name.clone(),
                    level: check.level,
                    status: state.status,
                    failures: state.failures,
                    threshold: check.threshold,
                }
            })
            .collect())
    }

    fn exec(&mut self, command: &[String]) -> Result<ExecOutput> {
        self.ensure_connected()?;
        let Some((program, args)) = command.split_first() else {
            return Err(Error::ValidationError("empty command".to_string()));
        };
        let output = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| Error::WorkloadError(format!("failed to run {program}: {e}")))?;
        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

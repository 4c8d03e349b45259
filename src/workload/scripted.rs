//! A [`LocalContainer`] whose `exec` is scripted instead of spawning processes

use std::sync::{Arc, Mutex};

use super::{CheckInfo, Container, ExecOutput, Layer, LocalContainer, ServiceStatus};
use crate::error::Result;

#[derive(Clone)]
pub struct ScriptedContainer {
    inner: LocalContainer,
    pub exit_code: i32,
    pub stderr: String,
    /// Every command passed to `exec`, shared with clones
    pub calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl ScriptedContainer {
    pub fn new(inner: LocalContainer) -> Self {
        Self {
            inner,
            exit_code: 0,
            stderr: String::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(mut self, exit_code: i32, stderr: &str) -> Self {
        self.exit_code = exit_code;
        self.stderr = stderr.to_string();
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl Container for ScriptedContainer {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn can_connect(&self) -> bool {
        self.inner.can_connect()
    }

    fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(path)
    }

    fn pull(&self, path: &str) -> Result<String> {
        self.inner.pull(path)
    }

    fn push(&mut self, path: &str, content: &str, make_dirs: bool) -> Result<()> {
        self.inner.push(path, content, make_dirs)
    }

    fn remove_path(&mut self, path: &str, recursive: bool) -> Result<()> {
        self.inner.remove_path(path, recursive)
    }

    fn add_layer(&mut self, label: &str, layer: &Layer, combine: bool) -> Result<()> {
        self.inner.add_layer(label, layer, combine)
    }

    fn plan(&self) -> Result<Layer> {
        self.inner.plan()
    }

    fn replan(&mut self) -> Result<()> {
        self.inner.replan()
    }

    fn restart(&mut self, services: &[String]) -> Result<()> {
        self.inner.restart(services)
    }

    fn stop(&mut self, services: &[String]) -> Result<()> {
        self.inner.stop(services)
    }

    fn service_status(&self, service: &str) -> Result<ServiceStatus> {
        self.inner.service_status(service)
    }

    fn get_checks(&self) -> Result<Vec<CheckInfo>> {
        self.inner.get_checks()
    }

    fn exec(&mut self, command: &[String]) -> Result<ExecOutput> {
        self.calls.lock().unwrap().push(command.to_vec());
        Ok(ExecOutput {
            exit_code: self.exit_code,
            stdout: String::new(),
            stderr: self.stderr.clone(),
        })
    }
}

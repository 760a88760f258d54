//! Mock drivers for testing
//!
//! [`MockWorld`] is the shared fake machine: which resources are installed,
//! which services run, and every driver call in the order it happened.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use engage_core::types::{Resource, ResourceKey};
use engage_install::registry::ANY_VERSION;
use engage_install::{DriverRegistry, InstallContext, Package, ResourceManager, ServiceManager};

#[derive(Debug, Default)]
struct WorldState {
    installed: HashSet<String>,
    running: HashSet<String>,
    calls: Vec<String>,
    failures: HashMap<String, HashSet<String>>,
    /// Services whose start never takes effect
    stuck: HashSet<String>,
}

/// Shared state behind every [`MockManager`]
#[derive(Debug, Clone, Default)]
pub struct MockWorld {
    state: Arc<Mutex<WorldState>>,
}

impl MockWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `step` fail for resource `id`
    pub fn fail(&self, id: &str, step: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(id.to_string())
            .or_default()
            .insert(step.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    pub fn stick(&self, id: &str) {
        self.state.lock().unwrap().stuck.insert(id.to_string());
    }

    pub fn mark_installed(&self, id: &str) {
        self.state.lock().unwrap().installed.insert(id.to_string());
    }

    pub fn mark_running(&self, id: &str) {
        self.state.lock().unwrap().running.insert(id.to_string());
    }

    pub fn is_installed(&self, id: &str) -> bool {
        self.state.lock().unwrap().installed.contains(id)
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.state.lock().unwrap().running.contains(id)
    }

    pub fn running_count(&self) -> usize {
        self.state.lock().unwrap().running.len()
    }

    /// Every call as `step:id`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Ids passed to `step`, in call order
    pub fn calls_for(&self, step: &str) -> Vec<String> {
        let prefix = format!("{}:", step);
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    pub fn reset_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn call(&self, step: &str, id: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{}:{}", step, id));
        if state.failures.get(id).is_some_and(|steps| steps.contains(step)) {
            return Err(anyhow!("injected {} failure", step));
        }
        Ok(())
    }

    /// Register a mock driver for every version of `name`
    pub fn register(&self, registry: &mut DriverRegistry, name: &str, service: bool) {
        let world = self.clone();
        registry.register(
            ResourceKey::new(name, ANY_VERSION),
            Package::reference(name),
            move |resource| {
                Ok(Box::new(MockManager {
                    resource: resource.clone(),
                    world: world.clone(),
                    service,
                }))
            },
        );
    }
}

/// Recording driver backed by a [`MockWorld`]
pub struct MockManager {
    resource: Resource,
    world: MockWorld,
    service: bool,
}

impl MockManager {
    fn id_str(&self) -> &str {
        &self.resource.id
    }

    fn update(&self, f: impl FnOnce(&mut WorldState, &str)) {
        let mut state = self.world.state.lock().unwrap();
        f(&mut state, &self.resource.id);
    }
}

impl ResourceManager for MockManager {
    fn resource(&self) -> &Resource {
        &self.resource
    }

    fn validate_pre_install(&self, _ctx: &InstallContext) -> anyhow::Result<()> {
        self.world.call("validate_pre_install", self.id_str())
    }

    fn is_installed(&self, _ctx: &InstallContext) -> anyhow::Result<bool> {
        self.world.call("is_installed", self.id_str())?;
        Ok(self.world.is_installed(self.id_str()))
    }

    fn install(&self, _ctx: &InstallContext, _package: &Package) -> anyhow::Result<()> {
        self.world.call("install", self.id_str())?;
        self.update(|s, id| {
            s.installed.insert(id.to_string());
        });
        Ok(())
    }

    fn validate_post_install(&self, _ctx: &InstallContext) -> anyhow::Result<()> {
        self.world.call("validate_post_install", self.id_str())
    }

    fn backup(&self, _ctx: &InstallContext, _backup_dir: &Path, _compress: bool) -> anyhow::Result<()> {
        self.world.call("backup", self.id_str())
    }

    fn uninstall(
        &self,
        _ctx: &InstallContext,
        _backup_dir: &Path,
        incomplete_install: bool,
        _compress: bool,
    ) -> anyhow::Result<()> {
        let step = if incomplete_install {
            "uninstall_incomplete"
        } else {
            "uninstall"
        };
        self.world.call(step, self.id_str())?;
        self.update(|s, id| {
            s.installed.remove(id);
        });
        Ok(())
    }

    fn restore(&self, _ctx: &InstallContext, _backup_dir: &Path, _package: &Package) -> anyhow::Result<()> {
        self.world.call("restore", self.id_str())?;
        self.update(|s, id| {
            s.installed.insert(id.to_string());
        });
        Ok(())
    }

    fn upgrade(
        &self,
        _ctx: &InstallContext,
        _package: &Package,
        _old_resource: &Resource,
        _backup_dir: &Path,
    ) -> anyhow::Result<()> {
        self.world.call("upgrade", self.id_str())?;
        self.update(|s, id| {
            s.installed.insert(id.to_string());
        });
        Ok(())
    }

    fn as_service(&self) -> Option<&dyn ServiceManager> {
        if self.service {
            Some(self)
        } else {
            None
        }
    }
}

impl ServiceManager for MockManager {
    fn start(&self, _ctx: &InstallContext) -> anyhow::Result<()> {
        self.world.call("start", self.id_str())?;
        self.update(|s, id| {
            if !s.stuck.contains(id) {
                s.running.insert(id.to_string());
            }
        });
        Ok(())
    }

    fn stop(&self, _ctx: &InstallContext) -> anyhow::Result<()> {
        self.world.call("stop", self.id_str())?;
        self.update(|s, id| {
            s.running.remove(id);
        });
        Ok(())
    }

    fn is_running(&self, _ctx: &InstallContext) -> anyhow::Result<bool> {
        Ok(self.world.is_running(self.id_str()))
    }

    fn force_stop(&self, _ctx: &InstallContext) -> bool {
        if self.world.call("force_stop", self.id_str()).is_err() {
            return false;
        }
        self.update(|s, id| {
            s.running.remove(id);
        });
        true
    }
}

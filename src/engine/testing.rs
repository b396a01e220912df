//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! In-memory container runtime used by unit tests

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::container::{BdevOptions, Container, ContainerError, ContainerRuntime, SnapshotRecord};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MockStats {
    pub handles_opened: usize,
    pub handles_released: usize,
    pub snapshots_acquired: usize,
    pub snapshots_released: usize,
}

#[derive(Debug, Default)]
struct MockState {
    containers: HashMap<String, Vec<String>>,
    stats: MockStats,
    calls: Vec<String>,
    fail_snapshots: bool,
    refuse_open: bool,
    next_error: Option<ContainerError>,
}

/// Runtime whose containers exist only in memory. Containers are known by
/// name regardless of the path they are opened under.
#[derive(Debug, Default, Clone)]
pub struct MockRuntime {
    state: Rc<RefCell<MockState>>,
}

impl MockRuntime {
    pub fn define(&self, name: &str, snapshots: &[&str]) {
        self.state.borrow_mut().containers.insert(
            name.to_string(),
            snapshots.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn fail_snapshots(&self) {
        self.state.borrow_mut().fail_snapshots = true;
    }

    pub fn refuse_open(&self) {
        self.state.borrow_mut().refuse_open = true;
    }

    /// Make the next export/create/destroy call fail with `err`.
    pub fn fail_next(&self, err: ContainerError) {
        self.state.borrow_mut().next_error = Some(err);
    }

    pub fn handle(&self, name: &str) -> MockContainer {
        self.open(name, Path::new("/mock"))
            .expect("mock runtime refused to open")
    }

    pub fn stats(&self) -> MockStats {
        self.state.borrow().stats
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.state.borrow().containers.contains_key(name)
    }
}

impl ContainerRuntime for MockRuntime {
    type Handle = MockContainer;

    fn open(&self, name: &str, lxcpath: &Path) -> Option<MockContainer> {
        let mut state = self.state.borrow_mut();
        if state.refuse_open {
            return None;
        }
        state.stats.handles_opened += 1;
        Some(MockContainer {
            name: name.to_string(),
            lxcpath: lxcpath.to_path_buf(),
            state: Rc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub struct MockContainer {
    name: String,
    lxcpath: PathBuf,
    state: Rc<RefCell<MockState>>,
}

impl MockContainer {
    fn call(&self, call: String) -> Result<(), ContainerError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(call);
        match state.next_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for MockContainer {
    fn drop(&mut self) {
        self.state.borrow_mut().stats.handles_released += 1;
    }
}

impl Container for MockContainer {
    type Snapshot = MockSnapshot;

    fn name(&self) -> &str {
        &self.name
    }

    fn is_defined(&self) -> bool {
        self.state.borrow().containers.contains_key(&self.name)
    }

    fn snapshots(&self) -> Result<Vec<MockSnapshot>, ContainerError> {
        let mut state = self.state.borrow_mut();
        if state.fail_snapshots {
            return Err(ContainerError::failed(-1, "snapshot list unavailable"));
        }
        let names = state.containers.get(&self.name).cloned().unwrap_or_default();
        state.stats.snapshots_acquired += names.len();
        let path = self.lxcpath.join(&self.name).join("snaps");
        Ok(names
            .into_iter()
            .enumerate()
            .map(|(i, name)| MockSnapshot {
                name,
                path: path.clone(),
                timestamp: format!("2016:06:01 12:00:{i:02}"),
                state: Rc::clone(&self.state),
            })
            .collect())
    }

    fn export(
        &self,
        export_name: &str,
        store_root: &Path,
        opts: &BdevOptions,
    ) -> Result<(), ContainerError> {
        self.call(format!(
            "export {} as {} to {} bdev={}",
            self.name,
            export_name,
            store_root.display(),
            opts.bdev_type
        ))
    }

    fn create_from_export(
        &self,
        create_name: &str,
        lxcpath: &Path,
        opts: &BdevOptions,
    ) -> Result<(), ContainerError> {
        self.call(format!(
            "create {} from {} in {} bdev={}",
            create_name,
            self.name,
            lxcpath.display(),
            opts.bdev_type
        ))
    }

    fn destroy(&self) -> Result<(), ContainerError> {
        self.call(format!("destroy {}", self.name))?;
        self.state.borrow_mut().containers.remove(&self.name);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockSnapshot {
    name: String,
    path: PathBuf,
    timestamp: String,
    state: Rc<RefCell<MockState>>,
}

impl Drop for MockSnapshot {
    fn drop(&mut self) {
        self.state.borrow_mut().stats.snapshots_released += 1;
    }
}

impl SnapshotRecord for MockSnapshot {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

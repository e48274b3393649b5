#![allow(dead_code)]

use stackkeeper::config::{ServiceEntry, StackConfig};
use stackkeeper::runtime::{
    ContainerRuntime, ContainerSlot, ImageIdentity, RuntimeError, SlotState, with_timeout,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

pub const CALL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Inspect(String),
    Pull(String),
    InspectImage(String),
    Remove(String),
    UpOne(String),
    UpAll,
}

/// In-memory runtime. Containers are keyed by name, pulled images by reference.
#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<HashMap<String, ContainerSlot>>,
    remote: HashMap<String, ImageIdentity>,
    failing_pulls: HashSet<String>,
    hanging_pulls: HashSet<String>,
    failing_inspects: HashSet<String>,
    failing_image_inspects: HashSet<String>,
    failing_removes: HashSet<String>,
    failing_ups: HashSet<String>,
    fail_up_all: bool,
    service_containers: HashMap<String, String>,
    calls: Mutex<Vec<Call>>,
}

impl FakeRuntime {
    pub fn new(config: &StackConfig) -> Self {
        Self {
            service_containers: config
                .services
                .iter()
                .map(|s| (s.name.clone(), s.container.clone()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn with_container(self, name: &str, state: SlotState, image: &str) -> Self {
        self.containers.lock().unwrap().insert(
            name.to_string(),
            ContainerSlot {
                name: name.to_string(),
                state,
                image: Some(ImageIdentity::new(image)),
            },
        );
        self
    }

    pub fn with_remote(mut self, reference: &str, image: &str) -> Self {
        self.remote
            .insert(reference.to_string(), ImageIdentity::new(image));
        self
    }

    pub fn failing_pull(mut self, reference: &str) -> Self {
        self.failing_pulls.insert(reference.to_string());
        self
    }

    /// The pull never completes and is cut off by [`CALL_TIMEOUT`].
    pub fn hanging_pull(mut self, reference: &str) -> Self {
        self.hanging_pulls.insert(reference.to_string());
        self
    }

    pub fn failing_inspect(mut self, container: &str) -> Self {
        self.failing_inspects.insert(container.to_string());
        self
    }

    /// The pull succeeds but the pulled image cannot be looked up.
    pub fn failing_inspect_image(mut self, reference: &str) -> Self {
        self.failing_image_inspects.insert(reference.to_string());
        self
    }

    pub fn failing_remove(mut self, container: &str) -> Self {
        self.failing_removes.insert(container.to_string());
        self
    }

    pub fn failing_up(mut self, service: &str) -> Self {
        self.failing_ups.insert(service.to_string());
        self
    }

    pub fn failing_up_all(mut self) -> Self {
        self.fail_up_all = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that change or query the runtime beyond plain inspection.
    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Inspect(_)))
            .collect()
    }

    pub fn state_of(&self, container: &str) -> SlotState {
        self.containers
            .lock()
            .unwrap()
            .get(container)
            .map(|slot| slot.state)
            .unwrap_or(SlotState::Absent)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    // Mirrors the daemon: creating over an existing name fails whatever its state.
    fn create_and_start(&self, container: &str) -> Result<(), RuntimeError> {
        let mut containers = self.containers.lock().unwrap();
        match containers.get_mut(container) {
            Some(slot) if slot.state == SlotState::Running => Ok(()),
            Some(_) => Err(RuntimeError::Compose {
                status: 1,
                stderr: format!("Conflict. The container name \"/{container}\" is already in use"),
            }),
            None => {
                containers.insert(
                    container.to_string(),
                    ContainerSlot {
                        name: container.to_string(),
                        state: SlotState::Running,
                        image: Some(ImageIdentity::new("sha256:fresh")),
                    },
                );
                Ok(())
            }
        }
    }
}

impl ContainerRuntime for FakeRuntime {
    async fn inspect(&self, container: &str) -> Result<ContainerSlot, RuntimeError> {
        self.record(Call::Inspect(container.to_string()));
        if self.failing_inspects.contains(container) {
            return Err(RuntimeError::Unavailable(
                "Cannot connect to the Docker daemon".to_string(),
            ));
        }
        Ok(self
            .containers
            .lock()
            .unwrap()
            .get(container)
            .cloned()
            .unwrap_or_else(|| ContainerSlot::absent(container)))
    }

    async fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        self.record(Call::Pull(image.to_string()));
        if self.hanging_pulls.contains(image) {
            return with_timeout(CALL_TIMEOUT, std::future::pending()).await;
        }
        let known =
            self.remote.contains_key(image) || self.failing_image_inspects.contains(image);
        if self.failing_pulls.contains(image) || !known {
            return Err(RuntimeError::Pull(format!("manifest for {image} not found")));
        }
        Ok(())
    }

    async fn inspect_image(&self, image: &str) -> Result<ImageIdentity, RuntimeError> {
        self.record(Call::InspectImage(image.to_string()));
        if self.failing_image_inspects.contains(image) {
            return Err(RuntimeError::NotFound(image.to_string()));
        }
        self.remote
            .get(image)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(image.to_string()))
    }

    async fn remove(&self, container: &str) -> Result<(), RuntimeError> {
        self.record(Call::Remove(container.to_string()));
        if self.failing_removes.contains(container) {
            return Err(RuntimeError::Unavailable("permission denied".to_string()));
        }
        self.containers.lock().unwrap().remove(container);
        Ok(())
    }

    async fn up_one(&self, service: &str) -> Result<(), RuntimeError> {
        self.record(Call::UpOne(service.to_string()));
        if self.failing_ups.contains(service) {
            return Err(RuntimeError::Compose {
                status: 1,
                stderr: format!("service {service} failed"),
            });
        }
        let container = self
            .service_containers
            .get(service)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(service.to_string()))?;
        self.create_and_start(&container)
    }

    async fn up_all(&self) -> Result<(), RuntimeError> {
        self.record(Call::UpAll);
        if self.fail_up_all {
            return Err(RuntimeError::Compose {
                status: 1,
                stderr: "compose failed".to_string(),
            });
        }
        let mut containers: Vec<&String> = self.service_containers.values().collect();
        containers.sort();
        for container in containers {
            self.create_and_start(container)?;
        }
        Ok(())
    }
}

pub fn three_services() -> StackConfig {
    StackConfig {
        services: vec![
            ServiceEntry::new("svcA", "svcA", Some("example/a:latest")),
            ServiceEntry::new("svcB", "svcB", Some("example/b:latest")),
            ServiceEntry::new("svcC", "svcC", Some("example/c:latest")),
        ],
        ..Default::default()
    }
}

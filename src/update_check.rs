//! Compare running images with the latest remote images without touching any
//! container.
use futures_util::future::join_all;
use log::{debug, info, warn};
use std::fmt::{Display, Formatter};

use crate::runtime::{ContainerRuntime, IdentityComparable, ImageIdentity, SlotState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredService {
    pub name: String,
    pub container: String,
    pub image: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Skipped,
    UpToDate,
    UpdateAvailable,
    PullFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceObservation {
    pub service: MonitoredService,
    pub running: Option<ImageIdentity>,
    pub latest: Option<ImageIdentity>,
    pub outcome: Outcome,
    /// Reason for a failed pull.
    pub detail: Option<String>,
}

impl ServiceObservation {
    fn skipped(service: &MonitoredService) -> Self {
        Self {
            service: service.clone(),
            running: None,
            latest: None,
            outcome: Outcome::Skipped,
            detail: None,
        }
    }

    fn pull_failed(service: &MonitoredService, running: ImageIdentity, reason: String) -> Self {
        Self {
            service: service.clone(),
            running: Some(running),
            latest: None,
            outcome: Outcome::PullFailed,
            detail: Some(reason),
        }
    }
}

impl Display for ServiceObservation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = &self.service.name;
        match self.outcome {
            Outcome::Skipped => write!(f, "SKIP {name} — not running"),
            Outcome::UpToDate => write!(f, "OK {name} — up to date"),
            Outcome::UpdateAvailable => {
                write!(f, "UPDATE {name} — update available")?;
                if let (Some(running), Some(latest)) = (&self.running, &self.latest) {
                    write!(f, " ({} -> {})", running.short(), latest.short())?;
                }
                Ok(())
            }
            Outcome::PullFailed => write!(
                f,
                "ERROR {name} — pull failed: {}",
                self.detail.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

pub struct UpdateChecker<'a, R> {
    runtime: &'a R,
    services: Vec<MonitoredService>,
}

impl<'a, R: ContainerRuntime> UpdateChecker<'a, R> {
    pub fn new(runtime: &'a R, services: Vec<MonitoredService>) -> Self {
        Self { runtime, services }
    }

    pub async fn check_service(&self, service: &MonitoredService) -> ServiceObservation {
        let slot = match self.runtime.inspect(&service.container).await {
            Ok(slot) => slot,
            Err(e) => {
                warn!("could not inspect {}: {e}", service.container);
                return ServiceObservation::skipped(service);
            }
        };
        let running = match (slot.state, slot.image) {
            (SlotState::Running, Some(image)) => image,
            (state, _) => {
                debug!("{} is {state}, skipping", service.container);
                return ServiceObservation::skipped(service);
            }
        };

        info!("Checking for updates: {}", service.image);
        if let Err(e) = self.runtime.pull(&service.image).await {
            warn!("pulling {} failed: {e}", service.image);
            return ServiceObservation::pull_failed(service, running, e.to_string());
        }
        let latest = match self.runtime.inspect_image(&service.image).await {
            Ok(latest) => latest,
            Err(e) => {
                warn!("inspecting {} failed: {e}", service.image);
                return ServiceObservation::pull_failed(service, running, e.to_string());
            }
        };

        let outcome = if running.same_image(&latest) {
            Outcome::UpToDate
        } else {
            Outcome::UpdateAvailable
        };
        debug!("{}: running {running}, latest {latest}", service.name);
        ServiceObservation {
            service: service.clone(),
            running: Some(running),
            latest: Some(latest),
            outcome,
            detail: None,
        }
    }

    /// Checks every service concurrently. Observations keep the configured order.
    pub async fn run(&self) -> UpdateReport {
        let observations = join_all(self.services.iter().map(|s| self.check_service(s))).await;
        UpdateReport { observations }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub observations: Vec<ServiceObservation>,
}

impl UpdateReport {
    fn with_outcome(&self, outcome: Outcome) -> Vec<&ServiceObservation> {
        self.observations
            .iter()
            .filter(|o| o.outcome == outcome)
            .collect()
    }

    pub fn updates(&self) -> Vec<&ServiceObservation> {
        self.with_outcome(Outcome::UpdateAvailable)
    }

    pub fn errors(&self) -> Vec<&ServiceObservation> {
        self.with_outcome(Outcome::PullFailed)
    }

    pub fn current(&self) -> Vec<&ServiceObservation> {
        self.with_outcome(Outcome::UpToDate)
    }

    pub fn skipped(&self) -> Vec<&ServiceObservation> {
        self.with_outcome(Outcome::Skipped)
    }

    pub fn has_updates(&self) -> bool {
        !self.updates().is_empty()
    }

    pub fn outcomes(&self) -> Vec<(&str, Outcome)> {
        self.observations
            .iter()
            .map(|o| (o.service.name.as_str(), o.outcome))
            .collect()
    }

    /// Short text for notifications, `None` when there is nothing to report.
    pub fn summary(&self) -> Option<String> {
        let updates = self.updates();
        let errors = self.errors();
        if updates.is_empty() && errors.is_empty() {
            return None;
        }
        let names = |list: &[&ServiceObservation]| {
            list.iter()
                .map(|o| o.service.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut parts = Vec::new();
        if !updates.is_empty() {
            parts.push(format!("updates available: {}", names(&updates)));
        }
        if !errors.is_empty() {
            parts.push(format!("check failed: {}", names(&errors)));
        }
        Some(parts.join("; "))
    }
}

impl Display for UpdateReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for observation in &self.observations {
            writeln!(f, "{observation}")?;
        }
        writeln!(f)?;

        let updates = self.updates();
        let errors = self.errors();
        if updates.is_empty() && errors.is_empty() {
            if self.current().is_empty() {
                return writeln!(f, "No services checked (all skipped).");
            }
            return writeln!(f, "All services are current.");
        }
        if updates.is_empty() {
            writeln!(f, "No updates available.")?;
        } else {
            writeln!(f, "Updates available for:")?;
            for o in &updates {
                writeln!(
                    f,
                    "  {name}: docker compose pull {name} && stackkeeper restart {name}",
                    name = o.service.name
                )?;
            }
        }
        if !errors.is_empty() {
            writeln!(f, "Errors for:")?;
            for o in &errors {
                writeln!(f, "  {}", o.service.name)?;
            }
        }
        Ok(())
    }
}

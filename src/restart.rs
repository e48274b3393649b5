//! Recreate services without tripping over stopped containers that still hold
//! their reserved names.
use log::{debug, error, info, warn};
use std::fmt::{Display, Formatter};
use thiserror::Error;

use crate::config::StackConfig;
use crate::runtime::{ContainerRuntime, SlotState};

pub const ALL: &str = "all";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("no services given, expected `all` or one or more service names")]
    NoTargets,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every managed service. `extra` holds the other names given next to `all`
    /// so unknown ones are still reported.
    All { extra: Vec<String> },
    Services(Vec<String>),
}

impl Target {
    pub fn all() -> Self {
        Target::All { extra: Vec::new() }
    }

    /// `all` anywhere in the arguments selects every managed service. Repeated
    /// names are only processed once.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, TargetError> {
        if args.is_empty() {
            return Err(TargetError::NoTargets);
        }
        let mut names: Vec<String> = Vec::with_capacity(args.len());
        for arg in args {
            let arg = arg.as_ref();
            if arg != ALL && !names.iter().any(|n| n == arg) {
                names.push(arg.to_string());
            }
        }
        if args.iter().any(|a| a.as_ref() == ALL) {
            return Ok(Target::All { extra: names });
        }
        Ok(Target::Services(names))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    Started,
    StartFailed(String),
    UnknownService,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResult {
    pub name: String,
    pub container: Option<String>,
    pub outcome: RestartOutcome,
    pub cleanup_warning: Option<String>,
    pub final_state: Option<SlotState>,
}

impl ServiceResult {
    fn unknown(name: &str) -> Self {
        Self {
            name: name.to_string(),
            container: None,
            outcome: RestartOutcome::UnknownService,
            cleanup_warning: None,
            final_state: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartReport {
    pub results: Vec<ServiceResult>,
    pub valid_names: Vec<String>,
}

impl RestartReport {
    pub fn success(&self) -> bool {
        self.results
            .iter()
            .all(|r| r.outcome == RestartOutcome::Started)
    }

    pub fn failed(&self) -> Vec<&ServiceResult> {
        self.results
            .iter()
            .filter(|r| r.outcome != RestartOutcome::Started)
            .collect()
    }

    pub fn unknown(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.outcome == RestartOutcome::UnknownService)
            .map(|r| r.name.as_str())
            .collect()
    }
}

impl Display for RestartReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for name in self.unknown() {
            writeln!(
                f,
                "error: unknown service '{name}' (valid: {})",
                self.valid_names.join(", ")
            )?;
        }
        for r in &self.results {
            if let Some(warning) = &r.cleanup_warning {
                writeln!(f, "warning: {}: {warning}", r.name)?;
            }
            if let RestartOutcome::StartFailed(reason) = &r.outcome {
                writeln!(f, "error: {} failed to start: {reason}", r.name)?;
            }
        }

        let rows: Vec<[String; 4]> = self
            .results
            .iter()
            .map(|r| {
                let result = match r.outcome {
                    RestartOutcome::Started => "started",
                    RestartOutcome::StartFailed(_) => "FAILED",
                    RestartOutcome::UnknownService => "unknown",
                };
                [
                    r.name.clone(),
                    r.container.clone().unwrap_or_else(|| "-".to_string()),
                    result.to_string(),
                    match (&r.container, r.final_state) {
                        (None, _) => "-".to_string(),
                        (Some(_), Some(state)) => state.to_string(),
                        (Some(_), None) => "unknown".to_string(),
                    },
                ]
            })
            .collect();
        if !rows.is_empty() {
            write_table(f, ["SERVICE", "CONTAINER", "RESULT", "STATE"], &rows)?;
        }
        Ok(())
    }
}

/// Current state of every managed service, for `--status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTable {
    pub rows: Vec<(String, String, Option<SlotState>)>,
}

impl Display for StatusTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let rows: Vec<[String; 3]> = self
            .rows
            .iter()
            .map(|(name, container, state)| {
                [
                    name.clone(),
                    container.clone(),
                    state
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "unknown".to_string()),
                ]
            })
            .collect();
        write_table(f, ["SERVICE", "CONTAINER", "STATE"], &rows)
    }
}

fn write_table<const N: usize>(
    f: &mut Formatter<'_>,
    header: [&str; N],
    rows: &[[String; N]],
) -> std::fmt::Result {
    let mut widths = header.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }
    write_row(f, header, &widths)?;
    for row in rows {
        write_row(f, row.each_ref().map(String::as_str), &widths)?;
    }
    Ok(())
}

fn write_row<const N: usize>(
    f: &mut Formatter<'_>,
    cells: [&str; N],
    widths: &[usize; N],
) -> std::fmt::Result {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths.iter().copied())
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    writeln!(f, "{}", padded.join("  ").trim_end())
}

pub struct RestartReconciler<'a, R> {
    runtime: &'a R,
    config: &'a StackConfig,
}

impl<'a, R: ContainerRuntime> RestartReconciler<'a, R> {
    pub fn new(runtime: &'a R, config: &'a StackConfig) -> Self {
        Self { runtime, config }
    }

    /// Removes the container if it exists but is stopped. A failure is returned
    /// as a warning; the following start is attempted regardless.
    pub async fn cleanup(&self, container: &str) -> Option<String> {
        let slot = match self.runtime.inspect(container).await {
            Ok(slot) => slot,
            Err(e) => {
                warn!("could not inspect {container}: {e}");
                return Some(format!("could not inspect {container}: {e}"));
            }
        };
        match slot.state {
            SlotState::Stopped => {
                info!("Removing stale container {container}");
                match self.runtime.remove(container).await {
                    Ok(()) => None,
                    Err(e) => {
                        warn!("could not remove stale container {container}: {e}");
                        Some(format!("could not remove stale container {container}: {e}"))
                    }
                }
            }
            SlotState::Running => {
                debug!("{container} is running, compose recreates it in place");
                None
            }
            SlotState::Absent => None,
        }
    }

    async fn final_state(&self, container: &str) -> Option<SlotState> {
        self.runtime
            .inspect(container)
            .await
            .inspect_err(|e| error!("could not inspect {container}: {e}"))
            .ok()
            .map(|slot| slot.state)
    }

    pub async fn reconcile(&self, target: &Target) -> RestartReport {
        let mut results = match target {
            Target::All { extra } => {
                let mut results: Vec<ServiceResult> = extra
                    .iter()
                    .filter(|name| self.config.container_for(name).is_none())
                    .map(|name| {
                        error!("unknown service '{name}'");
                        ServiceResult::unknown(name)
                    })
                    .collect();
                results.extend(self.reconcile_all().await);
                results
            }
            Target::Services(names) => self.reconcile_services(names).await,
        };
        for result in results.iter_mut() {
            if let Some(container) = &result.container {
                result.final_state = self.final_state(container).await;
            }
        }
        RestartReport {
            results,
            valid_names: self
                .config
                .service_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    async fn reconcile_services(&self, names: &[String]) -> Vec<ServiceResult> {
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            let Some(container) = self.config.container_for(name) else {
                error!("unknown service '{name}'");
                results.push(ServiceResult::unknown(name));
                continue;
            };
            let cleanup_warning = self.cleanup(container).await;
            info!("Starting {name}");
            let outcome = match self.runtime.up_one(name).await {
                Ok(()) => RestartOutcome::Started,
                Err(e) => {
                    error!("failed to start {name}: {e}");
                    RestartOutcome::StartFailed(e.to_string())
                }
            };
            results.push(ServiceResult {
                name: name.clone(),
                container: Some(container.to_string()),
                outcome,
                cleanup_warning,
                final_state: None,
            });
        }
        results
    }

    // The whole sweep finishes before the single `up_all`.
    async fn reconcile_all(&self) -> Vec<ServiceResult> {
        let mut warnings = Vec::with_capacity(self.config.services.len());
        for service in &self.config.services {
            warnings.push(self.cleanup(&service.container).await);
        }

        info!("Starting all services");
        let outcome = match self.runtime.up_all().await {
            Ok(()) => RestartOutcome::Started,
            Err(e) => {
                error!("failed to start services: {e}");
                RestartOutcome::StartFailed(e.to_string())
            }
        };

        self.config
            .services
            .iter()
            .zip(warnings)
            .map(|(service, cleanup_warning)| ServiceResult {
                name: service.name.clone(),
                container: Some(service.container.clone()),
                outcome: outcome.clone(),
                cleanup_warning,
                final_state: None,
            })
            .collect()
    }
}

pub async fn status<R: ContainerRuntime>(runtime: &R, config: &StackConfig) -> StatusTable {
    let mut rows = Vec::with_capacity(config.services.len());
    for service in &config.services {
        let state = runtime
            .inspect(&service.container)
            .await
            .inspect_err(|e| error!("could not inspect {}: {e}", service.container))
            .ok()
            .map(|slot| slot.state);
        rows.push((service.name.clone(), service.container.clone(), state));
    }
    StatusTable { rows }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets() {
        assert_eq!(Target::parse::<&str>(&[]), Err(TargetError::NoTargets));
        assert_eq!(Target::parse(&["all"]), Ok(Target::all()));
        assert_eq!(
            Target::parse(&["redis", "all", "bogus", "all"]),
            Ok(Target::All {
                extra: vec!["redis".to_string(), "bogus".to_string()]
            })
        );
        assert_eq!(
            Target::parse(&["redis", "postgres", "redis"]),
            Ok(Target::Services(vec![
                "redis".to_string(),
                "postgres".to_string()
            ]))
        );
    }

    #[test]
    fn test_report_lists_unknown_with_valid_names() {
        let report = RestartReport {
            results: vec![ServiceResult::unknown("bogus")],
            valid_names: vec!["n8n".to_string(), "redis".to_string()],
        };
        assert!(!report.success());
        let text = report.to_string();
        assert!(text.contains("unknown service 'bogus' (valid: n8n, redis)"));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "SERVICE  CONTAINER  RESULT   STATE");
        assert_eq!(lines[2], "bogus    -          unknown  -");
    }

    #[test]
    fn test_status_table_alignment() {
        let table = StatusTable {
            rows: vec![
                ("n8n".into(), "n8n".into(), Some(SlotState::Running)),
                ("postgres".into(), "n8n-postgres".into(), None),
            ],
        };
        let text = table.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "SERVICE   CONTAINER     STATE");
        assert_eq!(lines[1], "n8n       n8n           running");
        assert_eq!(lines[2], "postgres  n8n-postgres  unknown");
    }
}

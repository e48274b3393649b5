mod cli;

use env_logger::Env;
use log::{debug, error, info};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::cli::{Action, configure_cli};
use stackkeeper::StackError;
use stackkeeper::config::{StackConfig, load_config};
use stackkeeper::docker::DockerRuntime;
use stackkeeper::notifications::{notify, setup_dispatcher};
use stackkeeper::restart::{RestartReconciler, Target, status};
use stackkeeper::update_check::UpdateChecker;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    #[cfg(target_os = "linux")]
    set_group_id();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode, StackError> {
    let cli = configure_cli();
    let config = load_config(cli.config_path.as_deref())?;
    debug!("services: {:?}", config.service_names());

    match cli.action {
        Action::Check { interval, notify } => {
            check_updates(&config, interval, notify).await?;
            Ok(ExitCode::SUCCESS)
        }
        Action::Restart { status: true, .. } => {
            let runtime = DockerRuntime::connect(&config);
            print!("{}", status(&runtime, &config).await);
            Ok(ExitCode::SUCCESS)
        }
        Action::Restart { targets, .. } => {
            let target = match Target::parse(&targets) {
                Ok(target) => target,
                Err(e) => {
                    eprintln!("error: {e}");
                    eprintln!("valid services: {}", config.service_names().join(", "));
                    return Ok(ExitCode::FAILURE);
                }
            };
            let runtime = DockerRuntime::connect(&config);
            let report = RestartReconciler::new(&runtime, &config)
                .reconcile(&target)
                .await;
            print!("{report}");
            if report.success() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

async fn check_updates(
    config: &StackConfig,
    interval: Option<u64>,
    send_notification: bool,
) -> Result<(), StackError> {
    let dispatcher = if send_notification {
        setup_dispatcher()
    } else {
        None
    };
    let runtime = DockerRuntime::connect(config);
    let checker = UpdateChecker::new(&runtime, config.monitored());

    let running = Arc::new(AtomicBool::new(true));
    if interval.is_some() {
        let r = running.clone();
        ctrlc::set_handler(move || {
            info!("Received shutdown signal, gracefully shutting down...");
            r.store(false, Ordering::SeqCst);
        })?;
    }

    loop {
        info!("checking for updates");
        let started = Instant::now();
        let report = checker.run().await;
        print!("{report}");
        if let Some(dispatcher) = &dispatcher {
            notify(&report, dispatcher);
        }

        let Some(interval) = interval else {
            break;
        };
        while running.load(Ordering::SeqCst) && started.elapsed() < Duration::from_secs(interval)
        {
            sleep(Duration::from_millis(500)).await;
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }
    }
    Ok(())
}

/// Joins the group owning the docker socket when running inside a container.
#[cfg(target_os = "linux")]
fn set_group_id() {
    let Ok(gid) = std::env::var("DOCKER_GID") else {
        return;
    };
    let Ok(docker_gid) = gid.parse::<u32>() else {
        error!("Invalid DOCKER_GID {gid}");
        return;
    };
    info!("Setting GID to {docker_gid}");
    // requires CAP_SETGID
    unsafe {
        if libc::setgid(docker_gid) != 0 {
            error!("Failed to set GID to {docker_gid}");
        }
    }
}

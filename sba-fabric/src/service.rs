//! Shared bootstrap for the NF binaries: listener, background workers,
//! registry registration and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use axum::Router;
use sba_task::{NfTask, Shutdown, TaskEnd, TaskSet};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::client::Sbi;
use crate::types::NfProfile;

const JOIN_GRACE: Duration = Duration::from_secs(10);

/// Registry bootstrap material: who we are and how to reach the NRF.
pub struct Registration {
    pub sbi: Arc<Sbi>,
    pub profile: NfProfile,
}

/// Keeps trying to register the NF profile until it succeeds or the process
/// shuts down. The NF serves traffic regardless; a missing registration only
/// means peers cannot discover it yet.
struct RegistrationTask {
    sbi: Arc<Sbi>,
    profile: NfProfile,
}

impl NfTask for RegistrationTask {
    const NAME: &'static str = "nrf registration";

    async fn run(self, mut shutdown: Shutdown) -> anyhow::Result<()> {
        const RETRY_DELAY: Duration = Duration::from_secs(2);
        const MAX_ATTEMPTS: u32 = 30;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.sbi.register_profile(&self.profile).await {
                Ok(()) => {
                    info!(
                        nf.instance_id = %self.profile.nf_instance_id,
                        nf_type = %self.profile.nf_type,
                        "Registered with the NRF"
                    );
                    return Ok(());
                }
                Err(error) => {
                    debug!(%error, attempt, "NRF registration attempt failed");
                }
            }

            tokio::select! {
                () = tokio::time::sleep(RETRY_DELAY) => {}
                () = shutdown.requested() => return Ok(()),
            }
        }

        warn!("Giving up on NRF registration; this NF stays undiscoverable");
        Ok(())
    }
}

/// Run an NF to completion: serve `router` on `bind_addr`, drive the
/// workers in `tasks`, and tear everything down on ctrl-c.
pub async fn serve(
    name: &'static str,
    bind_addr: SocketAddr,
    router: Router,
    mut tasks: TaskSet,
    registration: Option<Registration>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    info!(%bind_addr, "{name} listening");

    let deregistration = registration
        .as_ref()
        .map(|reg| (Arc::clone(&reg.sbi), reg.profile.nf_instance_id));

    if let Some(reg) = registration {
        tasks.spawn(RegistrationTask {
            sbi: reg.sbi,
            profile: reg.profile,
        });
    }

    let router = router
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(15)));

    let mut server_shutdown = tasks.shutdown();
    let server = std::future::IntoFuture::into_future(
        axum::serve(listener, router).with_graceful_shutdown(async move { server_shutdown.requested().await }),
    );
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.context("server error")?;
        }
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("Shutdown requested");
            tasks.request_shutdown();
            (&mut server).await.context("server error during shutdown")?;
        }
    }

    for (task_name, end) in tasks.shutdown_and_join(JOIN_GRACE).await {
        match end {
            TaskEnd::Completed => trace!(task = task_name, "Worker terminated gracefully"),
            TaskEnd::Failed(error) => error!(task = task_name, error = format!("{error:#}"), "Worker failed"),
            TaskEnd::Panicked(error) => error!(task = task_name, %error, "Worker panicked"),
            TaskEnd::TimedOut => warn!(task = task_name, "Worker ignored the shutdown token and was aborted"),
        }
    }

    if let Some((sbi, instance_id)) = deregistration {
        deregister(&sbi, instance_id).await;
    }

    info!("{name} stopped");

    Ok(())
}

async fn deregister(sbi: &Sbi, instance_id: Uuid) {
    match sbi.deregister(instance_id).await {
        Ok(()) => debug!(%instance_id, "Deregistered from the NRF"),
        Err(error) => debug!(%error, "NRF deregistration failed (ignored)"),
    }
}

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::capture_pipeline::{CapturePipeline, PipelineStats};
use super::shutdown::ShutdownSignal;
use crate::capture::{CaptureEngine, CaptureFilter};
use crate::configuration::config::Config;
use crate::error_handling::types::*;
use crate::fingerprint::{FingerprintDb, FingerprintDispatcher};
use crate::network::{load_tls_acceptor, NetworkListener};
use crate::storage::DatabaseStorage;

/// How long a stopped capture thread gets on top of its read timeout.
const CAPTURE_STOP_GRACE: Duration = Duration::from_secs(1);

/// Owns the startup sequence and the two long-lived tasks: the capture
/// pipeline and the auxiliary listener.
pub struct Controller {
    config: Config,
}

impl Controller {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn open_capture(&self) -> Result<CaptureEngine, ControllerError> {
        let filter = CaptureFilter::default();
        if let Some(path) = &self.config.pcap_file {
            return Ok(CaptureEngine::open_file(path, &filter)?);
        }
        match self.config.interface.as_deref() {
            Some(device) if !device.is_empty() => Ok(CaptureEngine::open_device(
                device,
                &filter,
                self.config.capture_timeout_ms,
            )?),
            _ => Err(ConfigError::MissingCaptureSource.into()),
        }
    }

    /// Runs until a stop signal arrives, a capture file is fully replayed, or
    /// either task fails. Everything that can fail at startup is done before
    /// the first packet is read.
    pub async fn run(&self) -> Result<(), ControllerError> {
        let identities = Arc::new(FingerprintDb::from_file(&self.config.fingerprint_file)?);

        let storage = Arc::new(DatabaseStorage::connect(&self.config.database).await?);
        storage.init_schema().await?;
        info!("Storing results in {}", self.config.database.display());

        let mut engine = self.open_capture()?;

        let acceptor = load_tls_acceptor(&self.config.tls_cert, &self.config.tls_key)?;
        let listener = NetworkListener::bind(
            self.config.listen_addr()?,
            acceptor,
            Arc::clone(&storage),
            self.config.blocklist(),
        )
        .await?;

        let shutdown = ShutdownSignal::new();
        let pipeline = CapturePipeline::new(
            FingerprintDispatcher::with_client_hello(identities),
            Arc::clone(&storage),
            Handle::current(),
        );

        let capture_shutdown = shutdown.clone();
        let mut capture: JoinHandle<Result<PipelineStats, CaptureError>> =
            tokio::task::spawn_blocking(move || pipeline.run(&mut engine, &capture_shutdown));

        let listener_shutdown = shutdown.clone();
        let mut listening: JoinHandle<Result<(), NetworkError>> =
            tokio::spawn(async move { listener.run(listener_shutdown).await });

        let result = tokio::select! {
            _ = wait_for_stop_signal() => {
                info!("Stop signal received, shutting down");
                Ok(())
            }
            joined = &mut capture => match joined {
                Ok(Ok(stats)) => {
                    info!("Capture ended after {} packets", stats.packets);
                    Ok(())
                }
                Ok(Err(e)) => Err(ControllerError::from(e)),
                Err(e) => Err(ControllerError::TaskFailed(e.to_string())),
            },
            joined = &mut listening => match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ControllerError::from(e)),
                Err(e) => Err(ControllerError::TaskFailed(e.to_string())),
            },
        };

        shutdown.trigger();
        if !listening.is_finished() {
            let _ = listening.await;
        }
        if !capture.is_finished() {
            await_capture(capture, self.config.capture_timeout_ms).await;
        }
        result
    }
}

/// Gives a stopped capture thread the length of one read to notice the
/// signal. Returns false when the thread is left behind: with no read
/// timeout it only wakes on the next matching packet, so the caller has to
/// end the process without joining it.
async fn await_capture(
    capture: JoinHandle<Result<PipelineStats, CaptureError>>,
    capture_timeout_ms: i32,
) -> bool {
    if capture_timeout_ms <= 0 {
        warn!("Capture read has no timeout, not waiting for the capture thread");
        return false;
    }
    let grace = Duration::from_millis(capture_timeout_ms as u64) + CAPTURE_STOP_GRACE;
    match tokio::time::timeout(grace, capture).await {
        Ok(_) => true,
        Err(_) => {
            warn!("Capture thread did not stop within {:?}", grace);
            false
        }
    }
}

#[cfg(unix)]
async fn wait_for_stop_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_stop_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

// [libs/infra/process/src/native.rs]
/*!
 * =================================================================
 * APARATO: NATIVE PROCESS SUPERVISOR (V2.1 - GRACE WINDOW)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: IGNICIÓN Y TERMINACIÓN DE PROCESOS DEL SISTEMA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. POLITE TERMINATION: SIGTERM primero (Unix), kill forzado tras la
 *    ventana de gracia de 2 segundos.
 * 2. SINK-FIRST: La bitácora se abre en modo append antes del exec;
 *    stdout y stderr del hijo jamás contaminan el rastro del padre.
 * 3. HANDLE HYGIENE: El estado del hijo vive bajo un Mutex asíncrono;
 *    terminate/wait son idempotentes sobre handles difuntos.
 * =================================================================
 */

use crate::{SpawnBlueprint, SupervisorError, WorkerSupervisor};
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Ventana de gracia entre la señal cortés y el kill forzado.
const TERMINATION_GRACE_WINDOW: Duration = Duration::from_secs(2);

/**
 * Handle de un proceso supervisado. Clonable; todos los clones observan
 * el mismo hijo nativo.
 */
#[derive(Clone)]
pub struct WorkerHandle {
    process_identifier: u32,
    child_slot: Arc<Mutex<Option<Child>>>,
}

impl WorkerHandle {
    /// PID nativo asignado por el sistema operativo en la ignición.
    pub fn pid(&self) -> u32 {
        self.process_identifier
    }
}

/// Supervisor de producción sobre 'tokio::process'.
#[derive(Debug, Default, Clone)]
pub struct NativeSupervisor;

impl NativeSupervisor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WorkerSupervisor for NativeSupervisor {
    async fn spawn(&self, blueprint: &SpawnBlueprint) -> Result<WorkerHandle, SupervisorError> {
        // 1. BITÁCORA: append-only, creada si no existe, abierta pre-exec.
        let log_sink_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&blueprint.log_sink)?;
        let stderr_sink = log_sink_file.try_clone()?;

        // 2. IGNICIÓN DEL HIJO
        let child = Command::new(&blueprint.executable)
            .args(&blueprint.argv)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_sink_file))
            .stderr(Stdio::from(stderr_sink))
            .spawn()
            .map_err(|fault| SupervisorError::SpawnError(fault.to_string()))?;

        let process_identifier = child
            .id()
            .ok_or_else(|| SupervisorError::SpawnError("PID_UNAVAILABLE_POST_SPAWN".into()))?;

        debug!(
            "🧬 [SUPERVISOR]: Child [{}] ignited as PID {} (sink: {}).",
            blueprint.executable.display(),
            process_identifier,
            blueprint.log_sink.display()
        );

        Ok(WorkerHandle {
            process_identifier,
            child_slot: Arc::new(Mutex::new(Some(child))),
        })
    }

    async fn is_running(&self, handle: &WorkerHandle) -> bool {
        let mut child_guard = handle.child_slot.lock().await;
        match child_guard.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                // Salió o el sondeo falló: el handle queda difunto.
                Ok(Some(_)) | Err(_) => {
                    *child_guard = None;
                    false
                }
            },
            None => false,
        }
    }

    async fn terminate(&self, handle: &WorkerHandle) {
        let mut child_guard = handle.child_slot.lock().await;
        let Some(mut child) = child_guard.take() else {
            return;
        };

        #[cfg(unix)]
        {
            // Señal cortés: el worker puede vaciar buffers y cerrar el socket.
            unsafe {
                libc::kill(handle.process_identifier as i32, libc::SIGTERM);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }

        match tokio::time::timeout(TERMINATION_GRACE_WINDOW, child.wait()).await {
            Ok(_) => {
                debug!(
                    "💀 [SUPERVISOR]: PID {} terminated within grace window.",
                    handle.process_identifier
                );
            }
            Err(_) => {
                warn!(
                    "💀 [SUPERVISOR]: PID {} ignored polite signal. Forcing kill.",
                    handle.process_identifier
                );
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
    }

    async fn wait(&self, handle: &WorkerHandle) {
        let mut child_guard = handle.child_slot.lock().await;
        if let Some(mut child) = child_guard.take() {
            let _ = child.wait().await;
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn blueprint_for(command: &str, log_sink: PathBuf) -> SpawnBlueprint {
        SpawnBlueprint {
            executable: PathBuf::from("/bin/sh"),
            argv: vec!["-c".into(), command.into()],
            log_sink,
        }
    }

    #[tokio::test]
    async fn spawned_child_reports_running_until_terminated() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let supervisor = NativeSupervisor::new();

        let handle = supervisor
            .spawn(&blueprint_for("sleep 30", scratch.path().join("worker.log")))
            .await
            .expect("spawn must succeed");

        assert!(supervisor.is_running(&handle).await);
        supervisor.terminate(&handle).await;
        assert!(!supervisor.is_running(&handle).await);
    }

    #[tokio::test]
    async fn child_stdio_lands_in_the_log_sink() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let sink_path = scratch.path().join("echo.log");
        let supervisor = NativeSupervisor::new();

        let handle = supervisor
            .spawn(&blueprint_for("echo sink-probe", sink_path.clone()))
            .await
            .expect("spawn must succeed");
        supervisor.wait(&handle).await;

        let captured = std::fs::read_to_string(&sink_path).expect("sink must exist");
        assert!(captured.contains("sink-probe"));
    }

    #[tokio::test]
    async fn terminate_is_idempotent_on_dead_handles() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let supervisor = NativeSupervisor::new();

        let handle = supervisor
            .spawn(&blueprint_for("true", scratch.path().join("noop.log")))
            .await
            .expect("spawn must succeed");
        supervisor.wait(&handle).await;

        // Segunda y tercera terminación: sin pánico, sin bloqueo.
        supervisor.terminate(&handle).await;
        supervisor.terminate(&handle).await;
        assert!(!supervisor.is_running(&handle).await);
    }
}

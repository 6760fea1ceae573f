// [apps/orchestrator/src/services/health_service.rs]
/*!
 * =================================================================
 * APARATO: WORKER HEALTH SERVICE (V4.3 - PHOENIX PROTOCOL)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: VIGILANCIA, RESURRECCIÓN Y MODO SEGURO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. DUAL PROBE: Liveness del proceso (supervisor) + sondeo HTTP de
 *    '/internal/health'; tres fallos HTTP consecutivos marcan al worker
 *    como no-responsivo aunque el proceso viva.
 * 2. SERIALIZED RESTARTS: El cerrojo por worker garantiza que dos
 *    resurrecciones del mismo proceso jamás se solapen.
 * 3. SAFE-MODE LATCH: Al alcanzar el umbral de crashes consecutivos se
 *    desarma el payload de recuperación; una carga exitosa del cliente
 *    lo rearma y resetea el contador.
 * 4. ALERT DISCIPLINE: Cada transición emite warning/success al bus.
 *
 * Máquina de estados por worker:
 *   Up -> Unresponsive -> Restarting -> Recovering -> {Up | Degraded}
 * =================================================================
 */

use crate::services::event_bus::EventBus;
use crate::state::LoadStateVault;
use mysti_domain_models::{AlertLevel, WorkerKind};
use mysti_infra_process::{SpawnBlueprint, WorkerHandle, WorkerSupervisor};
use mysti_infra_worker_client::WorkerClient;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

/// Cadencia del bucle de vigilancia.
const HEALTH_TICK: Duration = Duration::from_secs(2);
/// Fallos HTTP consecutivos que degradan a "no-responsivo".
const MAX_PROBE_FAILURES: u32 = 3;
/// Presupuesto de espera de salud tras una resurrección.
const RECOVERY_HEALTH_TIMEOUT: Duration = Duration::from_secs(30);

/**
 * Identidad operativa de un worker supervisado: plano de ignición,
 * handle vivo, túnel de control y bóveda de recuperación.
 */
pub struct WorkerRuntime {
    pub kind: WorkerKind,
    pub blueprint: SpawnBlueprint,
    /// Cerrojo por proceso: serializa spawn/terminate/observación.
    pub handle: Mutex<WorkerHandle>,
    pub control: WorkerClient,
    pub load_state: Arc<LoadStateVault>,
    /// Ruta de replay del payload capturado tras la resurrección.
    pub load_replay_path: &'static str,
    /// Crashes consecutivos sin restauración exitosa. Compartido con el
    /// interceptor de cargas: un load manual aceptado lo resetea.
    pub crash_count: Arc<AtomicU32>,
}

impl WorkerRuntime {
    pub fn new(
        kind: WorkerKind,
        blueprint: SpawnBlueprint,
        initial_handle: WorkerHandle,
        control: WorkerClient,
        load_state: Arc<LoadStateVault>,
        crash_count: Arc<AtomicU32>,
    ) -> Self {
        let load_replay_path = match kind {
            WorkerKind::Sd => "/v1/models/load",
            WorkerKind::Llm => "/v1/llm/load",
        };
        Self {
            kind,
            blueprint,
            handle: Mutex::new(initial_handle),
            control,
            load_state,
            load_replay_path,
            crash_count,
        }
    }

    fn display_name(&self) -> &'static str {
        match self.kind {
            WorkerKind::Sd => "SD Worker",
            WorkerKind::Llm => "LLM Worker",
        }
    }
}

/**
 * Servicio de vigilancia y resurrección de la pareja de workers.
 */
pub struct HealthService {
    supervisor: Arc<dyn WorkerSupervisor>,
    sd_runtime: Arc<WorkerRuntime>,
    llm_runtime: Arc<WorkerRuntime>,
    event_bus: Arc<EventBus>,
    shutting_down: Arc<AtomicBool>,
    safe_mode_crashes: u32,
}

impl HealthService {
    pub fn new(
        supervisor: Arc<dyn WorkerSupervisor>,
        sd_runtime: Arc<WorkerRuntime>,
        llm_runtime: Arc<WorkerRuntime>,
        event_bus: Arc<EventBus>,
        shutting_down: Arc<AtomicBool>,
        safe_mode_crashes: u32,
    ) -> Self {
        Self {
            supervisor,
            sd_runtime,
            llm_runtime,
            event_bus,
            shutting_down,
            safe_mode_crashes,
        }
    }

    /// Enciende el daemon de vigilancia en el runtime de Tokio.
    pub fn spawn_daemon(self: Arc<Self>) {
        tokio::spawn(async move {
            info!("🫀 [HEALTH]: Surveillance daemon initiated (tick: 2s).");
            self.run_surveillance_loop().await;
            info!("🫀 [HEALTH]: Surveillance daemon stopped.");
        });
    }

    async fn run_surveillance_loop(&self) {
        let mut sd_probe_failures: u32 = 0;
        let mut llm_probe_failures: u32 = 0;

        loop {
            tokio::time::sleep(HEALTH_TICK).await;
            if self.shutting_down.load(Ordering::SeqCst) {
                break;
            }

            self.check_worker(&self.sd_runtime, &mut sd_probe_failures).await;
            self.check_worker(&self.llm_runtime, &mut llm_probe_failures).await;
        }
    }

    async fn check_worker(&self, runtime: &Arc<WorkerRuntime>, probe_failures: &mut u32) {
        let mut worker_alive = {
            let handle_guard = runtime.handle.lock().await;
            self.supervisor.is_running(&handle_guard).await
        };

        if worker_alive {
            if runtime.control.is_healthy().await {
                *probe_failures = 0;
            } else {
                *probe_failures += 1;
                if *probe_failures >= MAX_PROBE_FAILURES {
                    warn!("🫀 [HEALTH]: {} unresponsive (HTTP).", runtime.display_name());
                    worker_alive = false;
                }
            }
        }

        if !worker_alive {
            self.restart_worker(runtime).await;
            *probe_failures = 0;
        }
    }

    /**
     * Resurrección serializada: terminar (idempotente), re-encender con
     * el argv original, esperar salud y reproducir la última carga.
     */
    #[instrument(skip(self, runtime), fields(worker = runtime.display_name()))]
    async fn restart_worker(&self, runtime: &Arc<WorkerRuntime>) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        warn!("🫀 [HEALTH]: Detected {} failure. Restarting...", runtime.display_name());
        self.event_bus.emit_system_alert(
            AlertLevel::Warning,
            format!(
                "{} crashed! Restarting and attempting to restore model state...",
                runtime.display_name()
            ),
        );

        // Umbral de modo seguro: solo el worker SD arrastra el latch de
        // cargas que tumban al proceso.
        if runtime.kind == WorkerKind::Sd {
            let consecutive_crashes = runtime.crash_count.fetch_add(1, Ordering::SeqCst) + 1;
            if consecutive_crashes >= self.safe_mode_crashes {
                warn!("🫀 [HEALTH]: SD Worker entered Safe Mode (model auto-load disabled).");
                runtime.load_state.clear();
                self.event_bus.emit_system_alert(
                    AlertLevel::Warning,
                    "SD Worker entered Safe Mode: automatic model reload disabled until a manual load succeeds.",
                );
            }
        }

        {
            let mut handle_guard = runtime.handle.lock().await;
            self.supervisor.terminate(&handle_guard).await;
            match self.supervisor.spawn(&runtime.blueprint).await {
                Ok(fresh_handle) => *handle_guard = fresh_handle,
                Err(spawn_fault) => {
                    error!(
                        "🫀 [HEALTH]: Failed to respawn {}: {}",
                        runtime.display_name(),
                        spawn_fault
                    );
                    return;
                }
            }
        }

        if !runtime.control.wait_for_health(RECOVERY_HEALTH_TIMEOUT).await {
            error!(
                "🫀 [HEALTH]: {} failed to recover within timeout.",
                runtime.display_name()
            );
            return;
        }

        info!("🫀 [HEALTH]: {} back online.", runtime.display_name());
        self.event_bus.emit_system_alert(
            AlertLevel::Success,
            format!("{} recovered successfully.", runtime.display_name()),
        );

        match runtime.load_state.peek() {
            Some(captured_load_body) => {
                info!("🫀 [HEALTH]: Restoring {} model state...", runtime.display_name());
                match runtime
                    .control
                    .replay_model_load(runtime.load_replay_path, &captured_load_body)
                    .await
                {
                    Ok(status) if status.is_success() => {
                        info!("🫀 [HEALTH]: {} model restored successfully.", runtime.display_name());
                        runtime.crash_count.store(0, Ordering::SeqCst);
                    }
                    _ => {
                        // El worker queda "corriendo, vacío"; el latch de
                        // modo seguro decide si se reintenta al próximo crash.
                        error!("🫀 [HEALTH]: Failed to restore {} model.", runtime.display_name());
                    }
                }
            }
            None => {
                // Sin payload no hay nada que reproducir: el worker queda
                // "corriendo, vacío". El contador solo se rearma con una
                // carga manual exitosa (latch de modo seguro).
                info!("🫀 [HEALTH]: {} running empty; no captured load to replay.", runtime.display_name());
            }
        }
    }
}

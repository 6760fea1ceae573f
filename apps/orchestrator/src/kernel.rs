// [apps/orchestrator/src/kernel.rs]
/*!
 * =================================================================
 * APARATO: ORCHESTRATOR KERNEL (V4.4 - COMPOSITION ROOT)
 * CLASIFICACIÓN: COMPOSITION ROOT (ESTRATO L1-APP)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. EXPLICIT GRAPH: Todos los servicios se construyen aquí y reciben
 *    sus dependencias por inyección; no existen singletons.
 * 2. IGNITION ORDER: ledger -> importación -> workers -> daemons ->
 *    transporte; el apagado recorre el orden inverso.
 * 3. FATAL DISCIPLINE: El fallo del ledger o del bind de puertos aborta
 *    con código 1; todo lo demás degrada con rastro.
 * =================================================================
 */

use crate::config::{compose_worker_argv, OrchestratorConfig, DATABASE_FILE};
use crate::routes::{create_public_router, create_websocket_router};
use crate::services::health_service::{HealthService, WorkerRuntime};
use crate::services::job_service::{JobHandler, JobService};
use crate::services::style_preview::generate_style_preview;
use crate::services::{import_service, metrics_loop, progress_bridge, tagging_service};
use crate::state::AppState;
use anyhow::Context;
use mysti_domain_models::{Style, WorkerKind};
use mysti_infra_db::StoreClient;
use mysti_infra_gpu::NvidiaSmiProbe;
use mysti_infra_process::{NativeSupervisor, SpawnBlueprint, WorkerSupervisor};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct OrchestratorKernel {
    pub application_state: AppState,
    raw_arguments: Vec<String>,
}

impl OrchestratorKernel {
    /**
     * Ignición del ledger y del estado neural. El fallo de esquema es
     * fatal y se propaga a 'main' (exit 1).
     */
    pub async fn ignite(
        mut config: OrchestratorConfig,
        raw_arguments: Vec<String>,
    ) -> anyhow::Result<Self> {
        config.ensure_internal_token();

        let store = StoreClient::open(DATABASE_FILE)
            .await
            .context("database initialization failed")?;

        let application_state = AppState::new(config, store, Arc::new(NvidiaSmiProbe::new()));

        Ok(Self {
            application_state,
            raw_arguments,
        })
    }

    /**
     * Lanza workers, daemons y transporte HTTP; bloquea hasta la señal
     * de apagado y desmonta en orden inverso.
     */
    pub async fn launch(self) -> anyhow::Result<()> {
        let state = self.application_state.clone();
        let config = state.config.clone();

        // --- 1. ARQUEOLOGÍA: adopción de imágenes huérfanas ---
        import_service::auto_import_outputs(&state).await;

        // --- 2. IGNICIÓN DE WORKERS SUPERVISADOS ---
        let supervisor: Arc<dyn WorkerSupervisor> = Arc::new(NativeSupervisor::new());

        let sd_runtime = self
            .spawn_worker(&supervisor, WorkerKind::Sd)
            .await
            .context("failed to spawn SD worker")?;
        let llm_runtime = match self.spawn_worker(&supervisor, WorkerKind::Llm).await {
            Ok(runtime) => runtime,
            Err(fault) => {
                // Simetría de arranque: sin pareja de workers no hay servicio.
                supervisor
                    .terminate(&*sd_runtime.handle.lock().await)
                    .await;
                return Err(fault).context("failed to spawn LLM worker");
            }
        };

        // --- 3. DAEMONS DE FONDO ---
        let health_service = Arc::new(HealthService::new(
            supervisor.clone(),
            sd_runtime.clone(),
            llm_runtime.clone(),
            state.event_bus.clone(),
            state.shutting_down.clone(),
            config.safe_mode_crashes,
        ));
        health_service.spawn_daemon();

        tagging_service::spawn_tagging_daemon(state.clone());
        metrics_loop::spawn_metrics_loop(state.clone());
        progress_bridge::spawn_progress_bridge(state.clone());

        let mut job_service = JobService::new(state.clone());
        job_service.register_handler("style_preview", style_preview_handler(state.clone()));
        job_service.spawn_daemon();

        // --- 4. PRECARGA OPCIONAL DEL LLM ---
        if let Some(preload_model) = config.llm_model.clone() {
            spawn_llm_preload(state.clone(), preload_model);
        }

        // --- 5. TRANSPORTE: WEBSOCKET (loopback) + HTTP PÚBLICO ---
        let websocket_address =
            SocketAddr::new("127.0.0.1".parse::<IpAddr>().expect("loopback parses"), config.websocket_port());
        let websocket_listener = tokio::net::TcpListener::bind(websocket_address)
            .await
            .context("failed to bind WebSocket port")?;
        info!("📡 [KERNEL]: WebSocket fan-out listening at {}", websocket_address);

        let websocket_router = create_websocket_router(state.clone());
        tokio::spawn(async move {
            if let Err(server_fault) = axum::serve(websocket_listener, websocket_router).await {
                error!("📡 [KERNEL]: WebSocket listener collapsed: {}", server_fault);
            }
        });

        let public_address = SocketAddr::new(
            config
                .listen_ip
                .parse::<IpAddr>()
                .context("invalid listen ip")?,
            config.listen_port,
        );
        let public_listener = tokio::net::TcpListener::bind(public_address)
            .await
            .context("failed to bind public port")?;
        info!("🚀 [KERNEL_ONLINE]: Orchestrator listening at {}", public_address);

        let public_router = create_public_router(state.clone());
        let shutdown_state = state.clone();
        let shutdown_supervisor = supervisor.clone();
        let shutdown_runtimes = [sd_runtime.clone(), llm_runtime.clone()];

        axum::serve(public_listener, public_router)
            .with_graceful_shutdown(async move {
                wait_for_termination_signal().await;
                info!("🛑 [KERNEL]: Shutdown signal received. Dismantling strata...");

                // Orden inverso: bandera global, tagger despierto para
                // salir, luego defunción de los hijos.
                shutdown_state.shutting_down.store(true, Ordering::SeqCst);
                shutdown_state.notify_tagger();

                for runtime in &shutdown_runtimes {
                    let handle_guard = runtime.handle.lock().await;
                    shutdown_supervisor.terminate(&handle_guard).await;
                }
                info!("🛑 [KERNEL]: Workers terminated. Exiting.");
            })
            .await
            .context("public HTTP server collapsed")?;

        Ok(())
    }

    /// Ignición de un worker: ejecutable hermano, argv heredado, bitácora.
    async fn spawn_worker(
        &self,
        supervisor: &Arc<dyn WorkerSupervisor>,
        kind: WorkerKind,
    ) -> anyhow::Result<Arc<WorkerRuntime>> {
        let state = &self.application_state;
        let config = &state.config;

        let (executable_name, worker_mode, worker_port, control, load_state, crash_count) =
            match kind {
                WorkerKind::Sd => (
                    worker_binary_name("mysti-sd-worker"),
                    "sd-worker",
                    config.sd_worker_port(),
                    state.sd_control.clone(),
                    state.sd_load_state.clone(),
                    state.sd_crash_count.clone(),
                ),
                WorkerKind::Llm => (
                    worker_binary_name("mysti-llm-worker"),
                    "llm-worker",
                    config.llm_worker_port(),
                    state.llm_control.clone(),
                    state.llm_load_state.clone(),
                    Arc::new(std::sync::atomic::AtomicU32::new(0)),
                ),
            };

        let binary_directory = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));

        let blueprint = SpawnBlueprint {
            executable: binary_directory.join(executable_name),
            argv: compose_worker_argv(
                &self.raw_arguments,
                worker_mode,
                worker_port,
                &config.internal_token,
            ),
            log_sink: PathBuf::from(format!("{}.log", worker_mode)),
        };

        info!(
            "🧬 [KERNEL]: Spawning {} ({}) on port {}",
            worker_mode,
            blueprint.executable.display(),
            worker_port
        );
        let handle = supervisor.spawn(&blueprint).await?;

        Ok(Arc::new(WorkerRuntime::new(
            kind, blueprint, handle, control, load_state, crash_count,
        )))
    }
}

/// Nombre de binario hermano según plataforma.
fn worker_binary_name(base_name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", base_name)
    } else {
        base_name.to_string()
    }
}

/// Handler del job 'style_preview': el payload es el estilo serializado.
fn style_preview_handler(state: AppState) -> JobHandler {
    Arc::new(move |payload: serde_json::Value| {
        let state = state.clone();
        Box::pin(async move {
            let style: Style = serde_json::from_value(payload)
                .map_err(|fault| format!("malformed style payload: {}", fault))?;
            generate_style_preview(&state, style).await
        })
    })
}

/// Precarga diferida del LLM: espera salud, carga y captura el payload.
fn spawn_llm_preload(state: AppState, preload_model: String) {
    tokio::spawn(async move {
        info!("🧠 [KERNEL]: Waiting for LLM worker to preload model: {}", preload_model);
        if !state
            .llm_control
            .wait_for_health(std::time::Duration::from_secs(30))
            .await
        {
            warn!("🧠 [KERNEL]: LLM worker never became healthy; preload skipped.");
            return;
        }

        let load_body =
            serde_json::json!({ "model_id": preload_model, "n_gpu_layers": -1 }).to_string();

        // Captura previa: el replay post-crash restaura la precarga.
        state.llm_load_state.capture(load_body.clone());

        match state
            .llm_control
            .replay_model_load("/v1/llm/load", &load_body)
            .await
        {
            Ok(status) if status.is_success() => {
                info!("🧠 [KERNEL]: LLM model pre-loaded successfully.")
            }
            _ => error!("🧠 [KERNEL]: Failed to pre-load LLM model."),
        }
    });
}

/// Señales de terminación del proceso (Ctrl-C y SIGTERM en Unix).
async fn wait_for_termination_signal() {
    let ctrl_c_signal = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    {
        let mut sigterm_stream =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(stream) => stream,
                Err(_) => {
                    ctrl_c_signal.await;
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c_signal => {}
            _ = sigterm_stream.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c_signal.await;
    }
}

// [apps/orchestrator/src/state/mod.rs]
/*!
 * =================================================================
 * APARATO: SOVEREIGN STATE HUB (V4.2 - COMPOSITION ROOT)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L1-APP)
 * RESPONSABILIDAD: ORQUESTACIÓN DE REPOSITORIOS, ÁRBITRO Y SEÑALES
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. COMPOSITION ROOT: Ningún singleton global; todo servicio recibe el
 *    estado por inyección y los tests lo construyen con fakes.
 * 2. PRIORITY FLAG: 'generation_active' pausa el tagger mientras el
 *    worker de difusión posee la VRAM.
 * 3. RECOVERY VAULTS: Un 'LoadStateVault' por worker guarda el último
 *    cuerpo de carga aceptado para el replay post-crash.
 * =================================================================
 */

pub mod load_state;

pub use load_state::{LoadState, LoadStateVault};

use crate::config::OrchestratorConfig;
use crate::proxy::StreamingProxy;
use crate::services::event_bus::EventBus;
use crate::services::resource_manager::ResourceManager;
use mysti_infra_db::repositories::{
    GenerationRepository, JobRepository, LibraryRepository, MetadataRepository, PresetRepository,
    StyleRepository, TagRepository,
};
use mysti_infra_db::StoreClient;
use mysti_infra_gpu::VramProbe;
use mysti_infra_worker_client::WorkerClient;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/**
 * Contenedor de estado compartido (thread-safe) del orquestador.
 * Actúa como la placa base donde se conectan todos los estratos.
 */
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<OrchestratorConfig>,

    // --- ESTRATO DE PERSISTENCIA ---
    pub generations: Arc<GenerationRepository>,
    pub tags: Arc<TagRepository>,
    pub styles: Arc<StyleRepository>,
    pub library: Arc<LibraryRepository>,
    pub jobs: Arc<JobRepository>,
    pub presets: Arc<PresetRepository>,
    pub metadata: Arc<MetadataRepository>,

    // --- ESTRATO DE RED INTERNA ---
    pub sd_control: WorkerClient,
    pub llm_control: WorkerClient,
    pub proxy: Arc<StreamingProxy>,

    // --- ESTRATO DE ARBITRAJE Y SEÑALES ---
    pub resource_manager: Arc<ResourceManager>,
    pub event_bus: Arc<EventBus>,
    pub vram_probe: Arc<dyn VramProbe>,

    // --- ESTRATO DE RECUPERACIÓN ---
    pub sd_load_state: Arc<LoadStateVault>,
    pub llm_load_state: Arc<LoadStateVault>,
    /// Crashes consecutivos del worker SD; una carga manual aceptada lo
    /// rearma (latch de modo seguro).
    pub sd_crash_count: Arc<AtomicU32>,

    // --- ESTRATO DE COORDINACIÓN ---
    /// Una generación está en vuelo: el tagger cede la VRAM.
    pub generation_active: Arc<AtomicBool>,
    /// Señal del pipeline de generación hacia el bucle de tagging.
    pub tagger_notifier: Arc<Notify>,
    /// Bandera global observada por todos los bucles en su frontera.
    pub shutting_down: Arc<AtomicBool>,
}

impl AppState {
    /**
     * Forja el estado maestro inyectando todas las dependencias.
     */
    pub fn new(
        config: OrchestratorConfig,
        store: StoreClient,
        vram_probe: Arc<dyn VramProbe>,
    ) -> Self {
        let sd_control = WorkerClient::new(config.sd_worker_port(), &config.internal_token);
        let llm_control = WorkerClient::new(config.llm_worker_port(), &config.internal_token);

        let resource_manager = Arc::new(ResourceManager::new(
            sd_control.clone(),
            llm_control.clone(),
            vram_probe.clone(),
        ));

        Self {
            proxy: Arc::new(StreamingProxy::new(&config.internal_token)),
            config: Arc::new(config),

            generations: Arc::new(GenerationRepository::new(store.clone())),
            tags: Arc::new(TagRepository::new(store.clone())),
            styles: Arc::new(StyleRepository::new(store.clone())),
            library: Arc::new(LibraryRepository::new(store.clone())),
            jobs: Arc::new(JobRepository::new(store.clone())),
            presets: Arc::new(PresetRepository::new(store.clone())),
            metadata: Arc::new(MetadataRepository::new(store)),

            sd_control,
            llm_control,

            resource_manager,
            event_bus: Arc::new(EventBus::new()),
            vram_probe,

            sd_load_state: Arc::new(LoadStateVault::new()),
            llm_load_state: Arc::new(LoadStateVault::new()),
            sd_crash_count: Arc::new(AtomicU32::new(0)),

            generation_active: Arc::new(AtomicBool::new(false)),
            tagger_notifier: Arc::new(Notify::new()),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Marca o libera la prioridad de VRAM del pipeline de generación.
    pub fn set_generation_active(&self, active: bool) {
        self.generation_active.store(active, Ordering::SeqCst);
    }

    pub fn is_generation_active(&self) -> bool {
        self.generation_active.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Despierta al tagger: hay una generación recién persistida.
    pub fn notify_tagger(&self) {
        self.tagger_notifier.notify_one();
    }
}

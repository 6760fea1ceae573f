// [apps/orchestrator/src/services/resource_manager.rs]
/*!
 * =================================================================
 * APARATO: VRAM RESOURCE ARBITER (V4.3 - MULTI-PHASE ESCALATION)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: ADMISIÓN DE GENERACIONES Y CARGAS BAJO VRAM ESCASA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ESCALATION LADDER: swap del LLM a RAM, unload duro del LLM,
 *    CLIP-offload y VAE-tiling, en ese orden; cada fase re-mide antes
 *    de escalar.
 * 2. LOCK-FREE COMMITMENTS: El acumulador de compromisos es un f32
 *    bit-cast sobre AtomicU32 con CAS; la liberación tiene piso en cero
 *    para tolerar pares perdidos.
 * 3. FOOTPRINT LEARNING: Las huellas base por modelo se aprenden del
 *    bucle de métricas y alimentan presupuestos futuros.
 * =================================================================
 */

use mysti_domain_models::{ArbitrationRequest, ArbitrationVerdict};
use mysti_infra_gpu::VramProbe;
use mysti_infra_worker_client::WorkerClient;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

/// Huella base asumida cuando el modelo no tiene historial (GB).
const DEFAULT_BASE_FOOTPRINT_GB: f32 = 2.5;
/// Piso del overhead de resolución (GB).
const MIN_RESOLUTION_OVERHEAD_GB: f32 = 0.5;
/// Margen por contexto CUDA y buffers temporales.
const OVERHEAD_SAFETY_FACTOR: f32 = 1.15;
/// Holgura que define "VRAM apretada" en cada fase (GB).
const TIGHTNESS_MARGIN_GB: f32 = 0.5;
/// El modelo se considera residente si el worker SD retiene esta
/// fracción de la huella base.
const MODEL_RESIDENT_RATIO: f32 = 0.7;
/// Ahorro nominal al mover el codificador de texto a CPU (GB).
const DEFAULT_CLIP_SAVINGS_GB: f32 = 1.5;
/// Factor de necesidad efectiva con el VAE decodificando por teselas.
const VAE_TILING_RELIEF_FACTOR: f32 = 0.4;
/// Factor de necesidad efectiva sin teselado.
const NO_TILING_FACTOR: f32 = 0.85;
/// Umbral de megapíxeles que recomienda CLIP-offload por sí solo.
const CLIP_OFFLOAD_MEGAPIXEL_THRESHOLD: f32 = 2.0;
/// Umbral de megapíxeles que recomienda VAE-tiling por sí solo.
const VAE_TILING_MEGAPIXEL_THRESHOLD: f32 = 2.5;
/// Margen de seguridad de una carga de LLM.
const LLM_LOAD_SAFETY_FACTOR: f32 = 1.1;
const LLM_LOAD_HEADROOM_GB: f32 = 0.3;

/// Huellas observadas y aprendidas (protegidas por el cerrojo).
#[derive(Debug, Default)]
struct FootprintLedger {
    last_sd_vram_gb: f32,
    last_llm_vram_gb: f32,
    model_footprints: HashMap<String, f32>,
}

/**
 * Árbitro central de memoria GPU.
 */
pub struct ResourceManager {
    sd_control: WorkerClient,
    llm_control: WorkerClient,
    vram_probe: Arc<dyn VramProbe>,
    /// f32 bit-cast: compromisos prometidos a peticiones en vuelo.
    committed_vram_bits: AtomicU32,
    ledger: Mutex<FootprintLedger>,
}

impl ResourceManager {
    pub fn new(
        sd_control: WorkerClient,
        llm_control: WorkerClient,
        vram_probe: Arc<dyn VramProbe>,
    ) -> Self {
        Self {
            sd_control,
            llm_control,
            vram_probe,
            committed_vram_bits: AtomicU32::new(0f32.to_bits()),
            ledger: Mutex::new(FootprintLedger::default()),
        }
    }

    // --- ESTRATO DE COMPROMISOS (LOCK-FREE) ---

    pub fn committed_gb(&self) -> f32 {
        f32::from_bits(self.committed_vram_bits.load(Ordering::Acquire))
    }

    /// Reserva atómica por CAS.
    pub fn commit_vram(&self, gigabytes: f32) {
        self.mutate_committed(|current| current + gigabytes);
    }

    /// Liberación atómica con piso en cero (tolera pares perdidos).
    pub fn uncommit_vram(&self, gigabytes: f32) {
        self.mutate_committed(|current| (current - gigabytes).max(0.0));
    }

    fn mutate_committed(&self, transform: impl Fn(f32) -> f32) {
        let mut observed_bits = self.committed_vram_bits.load(Ordering::Acquire);
        loop {
            let next_value = transform(f32::from_bits(observed_bits)).max(0.0);
            match self.committed_vram_bits.compare_exchange_weak(
                observed_bits,
                next_value.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual_bits) => observed_bits = actual_bits,
            }
        }
    }

    // --- ESTRATO DE OBSERVACIÓN ---

    /// Huellas medidas por el bucle de métricas.
    pub async fn update_worker_usage(&self, sd_vram_gb: f32, llm_vram_gb: f32) {
        let mut ledger = self.ledger.lock().await;
        ledger.last_sd_vram_gb = sd_vram_gb;
        ledger.last_llm_vram_gb = llm_vram_gb;
    }

    /// Sella la huella base aprendida de un modelo.
    pub async fn update_model_footprint(&self, model_id: &str, vram_gb: f32) {
        if vram_gb > 0.05 && !model_id.is_empty() {
            let mut ledger = self.ledger.lock().await;
            ledger.model_footprints.insert(model_id.to_string(), vram_gb);
        }
    }

    pub async fn model_footprint(&self, model_id: &str) -> f32 {
        let ledger = self.ledger.lock().await;
        ledger.model_footprints.get(model_id).copied().unwrap_or(0.0)
    }

    /// El LLM parece tener pesos residentes (ledger, luego sonda HTTP).
    pub async fn is_llm_loaded(&self) -> bool {
        {
            let ledger = self.ledger.lock().await;
            if ledger.last_llm_vram_gb > 0.1 {
                return true;
            }
        }
        match self.llm_control.health().await {
            Ok(vitals) => vitals.loaded,
            Err(_) => false,
        }
    }

    /// Resumen de VRAM para '/health' y herramientas.
    pub async fn vram_status(&self) -> serde_json::Value {
        let total = self.vram_probe.total_gb().await;
        let free = self.vram_probe.free_gb().await;
        let committed = self.committed_gb();
        let ledger = self.ledger.lock().await;
        serde_json::json!({
            "total_gb": total,
            "free_gb": free,
            "committed_gb": committed,
            "effective_free_gb": (free - committed).max(0.0),
            "sd_worker_gb": ledger.last_sd_vram_gb,
            "llm_worker_gb": ledger.last_llm_vram_gb,
        })
    }

    // --- ESTRATO DE ARBITRAJE: GENERACIÓN DE IMAGEN ---

    /**
     * Decide la admisión de una generación y escala la presión sobre el
     * LLM fase a fase. Un veredicto admitido transporta el compromiso
     * que la llamante debe liberar al terminar.
     */
    #[instrument(skip(self, request), fields(model = %request.model_id, mp = request.megapixels))]
    pub async fn prepare_for_image_generation(
        &self,
        request: &ArbitrationRequest,
    ) -> ArbitrationVerdict {
        let mut ledger = self.ledger.lock().await;
        let mut verdict = ArbitrationVerdict {
            admit: true,
            ..Default::default()
        };

        // 1. PRESUPUESTO
        let mut effective_free_gb = self.effective_free_gb().await;

        let base_footprint_gb = if request.base_gb_override > 0.1 {
            request.base_gb_override
        } else {
            ledger
                .model_footprints
                .get(&request.model_id)
                .copied()
                .unwrap_or(DEFAULT_BASE_FOOTPRINT_GB)
        };

        let resolution_overhead_gb = (request.estimated_total_needed_gb - base_footprint_gb)
            .max(MIN_RESOLUTION_OVERHEAD_GB)
            * OVERHEAD_SAFETY_FACTOR;

        let sd_has_model_resident =
            ledger.last_sd_vram_gb > base_footprint_gb * MODEL_RESIDENT_RATIO;
        let required_additional_gb = if sd_has_model_resident {
            resolution_overhead_gb
        } else {
            base_footprint_gb + resolution_overhead_gb
        };

        info!(
            "⚖️ [ARBITER]: Effective free: {:.2} GB (committed: {:.2}), SD holds: {:.2} GB (base: {:.2}), needed: {:.2} GB",
            effective_free_gb,
            self.committed_gb(),
            ledger.last_sd_vram_gb,
            base_footprint_gb,
            required_additional_gb
        );

        let llm_seems_loaded = ledger.last_llm_vram_gb > 0.1;
        let is_tight =
            |free: f32| free < required_additional_gb + TIGHTNESS_MARGIN_GB;

        // 2. FASE 1: SWAP SUAVE DEL LLM A RAM
        if is_tight(effective_free_gb) && llm_seems_loaded {
            info!("⚖️ [ARBITER]: VRAM tight. Requesting LLM swap to RAM...");
            match self.llm_control.post_control("/v1/llm/offload").await {
                Ok(status) if status.is_success() => {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    effective_free_gb = self.effective_free_gb().await;
                }
                _ => warn!("⚖️ [ARBITER]: LLM swap to RAM failed."),
            }
        }

        // 3. FASE 2: UNLOAD DURO DEL LLM
        if is_tight(effective_free_gb) && llm_seems_loaded {
            warn!("⚖️ [ARBITER]: VRAM still tight. Requesting hard LLM unload...");
            if let Ok(status) = self.llm_control.post_control("/v1/llm/unload").await {
                if status.is_success() {
                    tokio::time::sleep(Duration::from_millis(800)).await;
                    effective_free_gb = self.effective_free_gb().await;
                    ledger.last_llm_vram_gb = 0.0;
                }
            }
        }

        // 4. FASE 3: RECOMENDAR CLIP-OFFLOAD
        if is_tight(effective_free_gb)
            || request.megapixels > CLIP_OFFLOAD_MEGAPIXEL_THRESHOLD
        {
            warn!("⚖️ [ARBITER]: Tight or high resolution. Recommending CLIP offload.");
            verdict.request_clip_offload = true;
        }

        // 5. FASE 4: RECOMENDAR VAE-TILING
        if is_tight(effective_free_gb)
            || request.megapixels > VAE_TILING_MEGAPIXEL_THRESHOLD
        {
            warn!("⚖️ [ARBITER]: Very tight or very high resolution. Recommending VAE tiling.");
            verdict.request_vae_tiling = true;
        }

        // 6. ADMISIÓN FINAL
        let mut adjusted_need_gb = required_additional_gb;
        if verdict.request_clip_offload {
            let clip_savings = if request.clip_size_gb > 0.1 {
                request.clip_size_gb
            } else {
                DEFAULT_CLIP_SAVINGS_GB
            };
            adjusted_need_gb -= clip_savings;
        }
        adjusted_need_gb *= if verdict.request_vae_tiling {
            VAE_TILING_RELIEF_FACTOR
        } else {
            NO_TILING_FACTOR
        };

        if effective_free_gb < adjusted_need_gb {
            error!(
                "⚖️ [ARBITER]: Insufficient VRAM. Free: {:.2} GB, needed: {:.2} GB. Rejecting.",
                effective_free_gb, adjusted_need_gb
            );
            return ArbitrationVerdict::rejected(format!(
                "insufficient VRAM: {:.2} GB free, {:.2} GB required",
                effective_free_gb, adjusted_need_gb
            ));
        }

        verdict.committed_gb = required_additional_gb;
        self.commit_vram(required_additional_gb);
        verdict
    }

    // --- ESTRATO DE ARBITRAJE: CARGA DE LLM ---

    /**
     * Prepara VRAM para una carga de LLM. Política de LLM único:
     * cualquier LLM residente se descarga primero; si sigue apretado,
     * escala sobre el worker SD (offload suave, luego unload duro).
     */
    #[instrument(skip(self))]
    pub async fn prepare_for_llm_load(&self, requested_gb: f32) -> bool {
        let mut ledger = self.ledger.lock().await;

        if ledger.last_llm_vram_gb > 0.1 {
            info!("⚖️ [ARBITER]: Unloading current LLM for new load.");
            let _ = self.llm_control.post_control("/v1/llm/unload").await;
            tokio::time::sleep(Duration::from_millis(500)).await;
            ledger.last_llm_vram_gb = 0.0;
        }

        let safety_needed_gb = requested_gb * LLM_LOAD_SAFETY_FACTOR + LLM_LOAD_HEADROOM_GB;
        let mut effective_free_gb = self.effective_free_gb().await;
        let mut can_fit = effective_free_gb >= safety_needed_gb;

        if !can_fit && ledger.last_sd_vram_gb > 0.5 {
            warn!("⚖️ [ARBITER]: VRAM tight for LLM. Requesting SD offload to CPU...");
            if let Ok(status) = self.sd_control.post_control("/v1/models/offload").await {
                if status.is_success() {
                    tokio::time::sleep(Duration::from_millis(800)).await;
                    effective_free_gb = self.effective_free_gb().await;
                    can_fit = effective_free_gb >= safety_needed_gb;
                }
            }
        }

        if !can_fit && ledger.last_sd_vram_gb > 0.5 {
            warn!("⚖️ [ARBITER]: VRAM still tight. Requesting hard SD unload...");
            let _ = self.sd_control.post_control("/v1/models/unload").await;
            tokio::time::sleep(Duration::from_millis(1000)).await;
            effective_free_gb = self.effective_free_gb().await;
            can_fit = effective_free_gb >= safety_needed_gb;
        }

        if can_fit {
            self.commit_vram(safety_needed_gb);
            return true;
        }

        error!(
            "⚖️ [ARBITER]: Insufficient VRAM for LLM. Need {:.2} GB, have {:.2} GB.",
            safety_needed_gb, effective_free_gb
        );
        false
    }

    /// VRAM libre medida menos compromisos, con piso en cero.
    async fn effective_free_gb(&self) -> f32 {
        (self.vram_probe.free_gb().await - self.committed_gb()).max(0.0)
    }
}

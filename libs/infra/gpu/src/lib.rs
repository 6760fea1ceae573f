// [libs/infra/gpu/src/lib.rs]
/*!
 * =================================================================
 * APARATO: GPU TELEMETRY PROBE (V2.1 - INJECTABLE CAPABILITY)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: OBSERVACIÓN DE VRAM TOTAL/LIBRE Y MAPA POR PID
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. INJECTABLE CAPABILITY: El árbitro y el bucle de métricas dependen
 *    del trait 'VramProbe', nunca del binario 'nvidia-smi'; los tests
 *    inyectan sondas deterministas.
 * 2. GRACEFUL DEGRADATION: Un host sin GPU reporta 0.0 GB en lugar de
 *    colapsar; la admisión degrada a rechazo, no a pánico.
 * 3. CSV DISCIPLINE: El parseo de la salida 'csv,noheader,nounits' vive
 *    en funciones puras auditables.
 * =================================================================
 */

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// MiB reportados por nvidia-smi convertidos a GB decimales.
const MIB_PER_GB: f32 = 1024.0;

#[derive(Error, Debug)]
pub enum GpuProbeError {
    /// El binario de telemetría no pudo ejecutarse en este host.
    #[error("[L3_GPU_EXEC_FAULT]: TELEMETRY_BINARY_UNAVAILABLE -> {0}")]
    ExecutionError(String),

    /// La salida CSV no respeta el contrato 'noheader,nounits'.
    #[error("[L3_GPU_PARSE_FAULT]: CSV_CONTRACT_VIOLATION -> {0}")]
    ParseError(String),
}

/**
 * Capacidad inyectable de observación de memoria GPU.
 * Las lecturas son instantáneas sin estado; el árbitro conserva el ledger.
 */
#[async_trait]
pub trait VramProbe: Send + Sync {
    /// VRAM total del dispositivo en GB (0.0 si no hay GPU).
    async fn total_gb(&self) -> f32;

    /// VRAM libre del dispositivo en GB (0.0 si no hay GPU).
    async fn free_gb(&self) -> f32;

    /// Huella de VRAM por PID de proceso de cómputo, en GB.
    async fn usage_by_pid(&self) -> HashMap<u32, f32>;
}

/**
 * Sonda de producción sobre 'nvidia-smi' con contrato CSV sin unidades.
 */
#[derive(Debug, Default, Clone)]
pub struct NvidiaSmiProbe;

impl NvidiaSmiProbe {
    pub fn new() -> Self {
        Self
    }

    /// Ejecuta una consulta de nvidia-smi y devuelve stdout en crudo.
    async fn run_query(&self, query_arguments: &[&str]) -> Result<String, GpuProbeError> {
        let command_output = Command::new("nvidia-smi")
            .args(query_arguments)
            .output()
            .await
            .map_err(|fault| GpuProbeError::ExecutionError(fault.to_string()))?;

        if !command_output.status.success() {
            return Err(GpuProbeError::ExecutionError(format!(
                "exit_status={}",
                command_output.status
            )));
        }

        String::from_utf8(command_output.stdout)
            .map_err(|fault| GpuProbeError::ParseError(fault.to_string()))
    }

    async fn query_single_metric_gb(&self, gpu_field: &str) -> f32 {
        let query_flag = format!("--query-gpu={}", gpu_field);
        match self
            .run_query(&[query_flag.as_str(), "--format=csv,noheader,nounits"])
            .await
        {
            Ok(raw_csv) => parse_first_mib_value(&raw_csv).unwrap_or(0.0),
            Err(fault) => {
                debug!("📉 [GPU_PROBE]: {} unavailable: {}", gpu_field, fault);
                0.0
            }
        }
    }
}

#[async_trait]
impl VramProbe for NvidiaSmiProbe {
    async fn total_gb(&self) -> f32 {
        self.query_single_metric_gb("memory.total").await
    }

    async fn free_gb(&self) -> f32 {
        self.query_single_metric_gb("memory.free").await
    }

    async fn usage_by_pid(&self) -> HashMap<u32, f32> {
        match self
            .run_query(&[
                "--query-compute-apps=pid,used_memory",
                "--format=csv,noheader,nounits",
            ])
            .await
        {
            Ok(raw_csv) => parse_pid_usage_map(&raw_csv),
            Err(fault) => {
                debug!("📉 [GPU_PROBE]: compute-apps query unavailable: {}", fault);
                HashMap::new()
            }
        }
    }
}

/// Primera línea numérica de un CSV 'noheader,nounits', en GB.
pub fn parse_first_mib_value(raw_csv: &str) -> Option<f32> {
    raw_csv
        .lines()
        .find_map(|line| line.trim().parse::<f32>().ok())
        .map(|mib| mib / MIB_PER_GB)
}

/// Mapa PID -> GB desde líneas 'pid, used_memory'.
pub fn parse_pid_usage_map(raw_csv: &str) -> HashMap<u32, f32> {
    let mut usage_map = HashMap::new();
    for line in raw_csv.lines() {
        let mut columns = line.split(',').map(str::trim);
        let pid = columns.next().and_then(|col| col.parse::<u32>().ok());
        let mib = columns.next().and_then(|col| col.parse::<f32>().ok());
        if let (Some(pid), Some(mib)) = (pid, mib) {
            usage_map.insert(pid, mib / MIB_PER_GB);
        }
    }
    usage_map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_metric_to_gigabytes() {
        assert_eq!(parse_first_mib_value("24576\n"), Some(24.0));
        assert_eq!(parse_first_mib_value(""), None);
        assert_eq!(parse_first_mib_value("not-a-number\n"), None);
    }

    #[test]
    fn parses_pid_usage_rows() {
        let usage = parse_pid_usage_map("1234, 2048\n5678, 512\nmalformed\n");
        assert_eq!(usage.get(&1234), Some(&2.0));
        assert_eq!(usage.get(&5678), Some(&0.5));
        assert_eq!(usage.len(), 2);
    }
}

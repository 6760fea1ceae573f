// [apps/orchestrator/src/main.rs]
/*!
 * =================================================================
 * APARATO: ORCHESTRATOR MAIN ENTRY POINT (V4.1 - IGNITION SHELL)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: BOOTSTRAP DE OBSERVABILIDAD E IGNICIÓN SEGURA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. EXIT DISCIPLINE: 0 en apagado normal; 1 ante fallo fatal de
 *    arranque (bind de puerto, ignición del ledger).
 * 2. RAW ARGV CAPTURE: El argv crudo se preserva antes del parseo para
 *    derivar la herencia de los workers.
 * =================================================================
 */

use clap::Parser;
use dotenvy::dotenv;
use mysti_orchestrator::prelude::*;
use mysti_shared_argus::init_tracing;
use tracing::{error, info};

fn main() {
    // 1. CARGA DE ENTORNO: hidrata .env en el espacio del proceso.
    dotenv().ok();

    // 2. OBSERVABILIDAD NEURAL (ARGUS)
    init_tracing("mysti-orchestrator");

    // 3. CAPTURA DEL ARGV CRUDO (herencia de workers) Y PARSEO
    let raw_arguments: Vec<String> = std::env::args().skip(1).collect();
    let config = OrchestratorConfig::parse();

    // 4. RUNTIME MULTIHILO
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(runtime_fault) => {
            error!("💀 [MAIN]: Runtime construction failed: {}", runtime_fault);
            std::process::exit(1);
        }
    };

    let exit_code = runtime.block_on(async {
        info!("🛰️ [MAIN]: Starting orchestrator on port {}...", config.listen_port);

        let kernel = match OrchestratorKernel::ignite(config, raw_arguments).await {
            Ok(kernel) => kernel,
            Err(ignition_fault) => {
                error!("💀 [MAIN]: Fatal startup failure: {:#}", ignition_fault);
                return 1;
            }
        };

        match kernel.launch().await {
            Ok(()) => 0,
            Err(launch_fault) => {
                error!("💀 [MAIN]: Fatal launch failure: {:#}", launch_fault);
                1
            }
        }
    });

    std::process::exit(exit_code);
}

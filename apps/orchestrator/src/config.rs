// [apps/orchestrator/src/config.rs]
/*!
 * =================================================================
 * APARATO: ORCHESTRATOR CONFIGURATION (V4.1 - ARGV DERIVATION)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: BANDERAS CLI, SECRETO INTERNO Y ARGV DE WORKERS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ARGV INHERITANCE: Los workers heredan la línea de comandos del
 *    orquestador MENOS las banderas de modo/escucha/secreto, más sus
 *    banderas de escucha propias y el token interno.
 * 2. SECRET GENERATION: Sin '--internal-token', el secreto se forja en
 *    el arranque con material UUIDv4; los workers rechazan tráfico sin él.
 * 3. PORT TOPOLOGY: SD en puerto+1, LLM en puerto+2, WebSocket en
 *    puerto+3 (loopback).
 * =================================================================
 */

use clap::Parser;
use uuid::Uuid;

/// Banderas que NO se heredan a los workers (consumen un valor).
const NON_INHERITED_FLAGS: &[&str] = &[
    "--mode",
    "-l",
    "--listen-ip",
    "--listen-port",
    "--internal-token",
];

/// Archivo del ledger relacional en el cwd del proceso.
pub const DATABASE_FILE: &str = "mysti.db";

#[derive(Parser, Debug, Clone)]
#[command(name = "mysti-orchestrator", about = "Mysti local image stack orchestrator")]
pub struct OrchestratorConfig {
    /// Rol del proceso; los hijos se relanzan con su propio modo.
    #[arg(long, default_value = "orchestrator")]
    pub mode: String,

    /// Puerto público del orquestador; los workers toman +1/+2, el
    /// WebSocket +3.
    #[arg(long, default_value_t = 1337)]
    pub listen_port: u16,

    #[arg(long, default_value = "0.0.0.0")]
    pub listen_ip: String,

    /// Raíz de imágenes producidas (sidecars incluidos).
    #[arg(long, default_value = "./outputs")]
    pub output_dir: String,

    /// Activos estáticos de la UI (SPA).
    #[arg(long, default_value = "./app")]
    pub app_dir: String,

    /// Raíz de pesos de modelo para estimaciones de tamaño.
    #[arg(long, default_value = "./models")]
    pub model_dir: String,

    /// Secreto compartido worker<->orquestador; vacío lo genera al vuelo.
    #[arg(long, default_value = "", env = "MYSTI_INTERNAL_TOKEN")]
    pub internal_token: String,

    /// Crashes consecutivos del worker SD que activan el modo seguro.
    #[arg(long, default_value_t = 3)]
    pub safe_mode_crashes: u32,

    /// Modelo LLM a precargar cuando el worker esté sano.
    #[arg(long = "llm-model", alias = "lm")]
    pub llm_model: Option<String>,

    /// Banderas adicionales heredadas verbatim por ambos workers
    /// (tipos de tensor, flash attention, directorios de LoRA).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    pub passthrough: Vec<String>,
}

impl OrchestratorConfig {
    pub fn sd_worker_port(&self) -> u16 {
        self.listen_port + 1
    }

    pub fn llm_worker_port(&self) -> u16 {
        self.listen_port + 2
    }

    pub fn websocket_port(&self) -> u16 {
        self.listen_port + 3
    }

    /// Sella el secreto interno, forjándolo si el operador no lo aportó.
    pub fn ensure_internal_token(&mut self) {
        if self.internal_token.is_empty() {
            self.internal_token = generate_internal_token();
        }
    }
}

/// Material de secreto: dos UUIDv4 concatenados sin guiones.
pub fn generate_internal_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/**
 * Deriva el argv común de los workers desde el argv crudo del
 * orquestador: filtra las banderas no heredables junto con su valor.
 */
pub fn derive_worker_argv(raw_arguments: &[String]) -> Vec<String> {
    let mut inherited_arguments = Vec::new();
    let mut cursor = 0usize;
    while cursor < raw_arguments.len() {
        let argument = raw_arguments[cursor].as_str();
        if NON_INHERITED_FLAGS.contains(&argument) {
            cursor += 2; // la bandera consume su valor
            continue;
        }
        inherited_arguments.push(raw_arguments[cursor].clone());
        cursor += 1;
    }
    inherited_arguments
}

/**
 * Argv completo de un worker: herencia + escucha loopback + secreto.
 */
pub fn compose_worker_argv(
    raw_arguments: &[String],
    worker_mode: &str,
    worker_port: u16,
    internal_token: &str,
) -> Vec<String> {
    let mut argv = derive_worker_argv(raw_arguments);
    argv.push("--mode".into());
    argv.push(worker_mode.into());
    argv.push("--listen-port".into());
    argv.push(worker_port.to_string());
    argv.push("--listen-ip".into());
    argv.push("127.0.0.1".into());
    if !internal_token.is_empty() {
        argv.push("--internal-token".into());
        argv.push(internal_token.into());
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(arguments: &[&str]) -> Vec<String> {
        arguments.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn worker_argv_drops_listen_and_secret_flags() {
        let derived = derive_worker_argv(&raw(&[
            "--mode",
            "orchestrator",
            "--listen-port",
            "1337",
            "--output-dir",
            "./outputs",
            "--internal-token",
            "sekret",
            "--diffusion-fa",
        ]));
        assert_eq!(derived, raw(&["--output-dir", "./outputs", "--diffusion-fa"]));
    }

    #[test]
    fn composed_argv_appends_worker_listen_flags_and_token() {
        let argv = compose_worker_argv(
            &raw(&["--listen-port", "1337", "--output-dir", "./out"]),
            "sd-worker",
            1338,
            "sekret",
        );
        assert_eq!(
            argv,
            raw(&[
                "--output-dir",
                "./out",
                "--mode",
                "sd-worker",
                "--listen-port",
                "1338",
                "--listen-ip",
                "127.0.0.1",
                "--internal-token",
                "sekret",
            ])
        );
    }

    #[test]
    fn generated_tokens_are_long_and_unique() {
        let first = generate_internal_token();
        let second = generate_internal_token();
        assert_eq!(first.len(), 64);
        assert_ne!(first, second);
    }
}

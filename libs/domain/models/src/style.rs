// [libs/domain/models/src/style.rs]
/*!
 * =================================================================
 * APARATO: STYLE & PROMPT LIBRARY MODELS (V3.0)
 * CLASIFICACIÓN: DOMAIN LAYER (ESTRATO L2)
 * RESPONSABILIDAD: MODIFICADORES DE PROMPT REUTILIZABLES
 * =================================================================
 */

use serde::{Deserialize, Serialize};

/// Marcador de sustitución dentro del prompt de un estilo.
pub const STYLE_PROMPT_PLACEHOLDER: &str = "{prompt}";

/**
 * Modificador de prompt reutilizable. Si 'prompt' no contiene el marcador
 * '{prompt}', se aplica como sufijo separado por coma.
 */
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Style {
    pub name: String,
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    /// URL relativa de la vista previa generada asíncronamente.
    #[serde(default)]
    pub preview_path: String,
}

impl Style {
    /// Materializa el prompt final sustituyendo el marcador o anexando.
    pub fn apply_to(&self, subject_prompt: &str) -> String {
        if self.prompt.contains(STYLE_PROMPT_PLACEHOLDER) {
            self.prompt.replace(STYLE_PROMPT_PLACEHOLDER, subject_prompt)
        } else {
            format!("{}, {}", subject_prompt, self.prompt)
        }
    }
}

/// Fragmento de prompt catalogado en la biblioteca del operador.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryItem {
    #[serde(default)]
    pub id: i64,
    pub label: String,
    pub content: String,
    #[serde(default = "default_library_category")]
    pub category: String,
    #[serde(default)]
    pub preview_path: String,
    #[serde(default)]
    pub usage_count: i64,
}

fn default_library_category() -> String {
    "Style".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_substitutes_placeholder() {
        let style = Style {
            name: "Cyberpunk".into(),
            prompt: "{prompt}, neon lights, rain".into(),
            ..Default::default()
        };
        assert_eq!(style.apply_to("a cat"), "a cat, neon lights, rain");
    }

    #[test]
    fn style_without_placeholder_appends_as_suffix() {
        let style = Style {
            name: "Oil".into(),
            prompt: "oil painting".into(),
            ..Default::default()
        };
        assert_eq!(style.apply_to("a cat"), "a cat, oil painting");
    }
}

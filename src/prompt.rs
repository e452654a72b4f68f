//! Construcción del prompt a partir de la ruta, el subárbol y la pregunta.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::warn;

use crate::models::TreeNode;

const PATH_PLACEHOLDER: &str = "{retrieved_path}";
const SUBTREE_PLACEHOLDER: &str = "{retrieved_subtree}";
const QUESTION_PLACEHOLDER: &str = "{user_question}";

pub const DEFAULT_TEMPLATE: &str = r#"
### Instrucciones del sistema
Eres un asistente profesional de diagnóstico de averías de automóviles. Responde de forma rigurosa y detallada a la pregunta del usuario basándote en la "Ruta de conocimiento" y en el "Subárbol de conocimiento relacionado" que se proporcionan a continuación. Cíñete estrictamente al contexto y no inventes información.
Nota 1: la respuesta debe incluir íntegramente el contenido de la "Ruta de conocimiento" y del "Subárbol de conocimiento relacionado" como base de la solución, en formato Markdown y sin omitir nada.
Nota 2: la respuesta tiene sólo 3 partes: 1. **Ruta de conocimiento**: cita literal de la ruta; 2. **Solución**: cita literal del subárbol, sin omitir nada; 3. **Pregunta recomendada**: una pregunta de seguimiento relacionada con la del usuario.

### Ruta de conocimiento
{retrieved_path}

### Subárbol de conocimiento relacionado
```json
{retrieved_subtree}
```

### Pregunta del usuario
{user_question}

### Tu respuesta
"#;

/// Plantilla con los marcadores `{retrieved_path}`, `{retrieved_subtree}`
/// y `{user_question}`.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [PATH_PLACEHOLDER, SUBTREE_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(anyhow!("La plantilla de prompt no contiene {placeholder}"));
            }
        }
        Ok(Self { template })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("No se pudo leer la plantilla {}", path.display()))?;
        Self::new(raw)
    }

    /// Sustituye los marcadores en una sola pasada: el texto insertado no se
    /// vuelve a examinar, así que una pregunta con `{retrieved_path}` queda tal cual.
    pub fn render(&self, path: &str, subtree: &TreeNode, question: &str) -> String {
        let subtree_json = serialize_subtree(subtree);
        let mut out = String::with_capacity(self.template.len() + subtree_json.len() + question.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let candidate = &rest[start..];
            let replacement = [
                (PATH_PLACEHOLDER, path),
                (SUBTREE_PLACEHOLDER, subtree_json.as_str()),
                (QUESTION_PLACEHOLDER, question),
            ]
            .into_iter()
            .find(|(placeholder, _)| candidate.starts_with(*placeholder));

            match replacement {
                Some((placeholder, value)) => {
                    out.push_str(value);
                    rest = &candidate[placeholder.len()..];
                }
                None => {
                    out.push('{');
                    rest = &candidate[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Prompt con la plantilla por defecto.
pub fn build_prompt(path: &str, subtree: &TreeNode, question: &str) -> String {
    PromptTemplate::default().render(path, subtree, question)
}

/// JSON indentado a 2 espacios, sin escapar caracteres no ASCII.
fn serialize_subtree(subtree: &TreeNode) -> String {
    serde_json::to_string_pretty(subtree).unwrap_or_else(|err| {
        warn!("No se pudo serializar el subárbol '{}': {}", subtree.name, err);
        subtree.name.clone()
    })
}

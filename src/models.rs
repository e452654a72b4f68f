//! Modelos de dominio (nodos del árbol de conocimiento y entradas del índice vectorial).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Separador de segmentos en los identificadores de ruta (`A>B>C`).
pub const PATH_SEPARATOR: &str = ">";

/// Nodo del árbol de conocimiento tal como aparece en el fichero JSON.
///
/// `child` ausente, `null` y `[]` son equivalentes; `name: null` cuenta como
/// nodo sin nombre. Cualquier otra clave del
/// objeto se conserva en `extra` para que el subárbol llegue íntegro al prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "desc", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        rename = "child",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub children: Vec<TreeNode>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl TreeNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_children(mut self, children: Vec<TreeNode>) -> Self {
        self.children = children;
        self
    }

    /// Un nodo sin nombre (o con nombre en blanco) no puede formar una ruta.
    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// Proyección plana de un `TreeNode` para el índice vectorial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub path_id: String,
    pub name: String,
    pub document: String,
}

/// Entrada con su vector ya calculado, lista para el upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedEntry {
    pub entry: IndexEntry,
    pub embedding: Vec<f64>,
}

/// Un resultado de la búsqueda vectorial (menor distancia = más parecido).
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub distance: f64,
    pub document: String,
}

/// Convierte `A>B>C` en `A -> B -> C` para mostrarlo al usuario.
pub fn format_path(path_id: &str) -> String {
    path_id.replace(PATH_SEPARATOR, " -> ")
}

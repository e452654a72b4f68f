//! Almacén del árbol de conocimiento.
//!
//! El árbol se carga una vez desde el JSON y no se modifica después. Sobre él
//! se implementan las dos operaciones no triviales del servicio:
//!   - `resolve`: de un identificador de ruta (`A>B>C`) al nodo exacto.
//!   - `flatten`: recorrido en preorden que produce las entradas del índice.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::error::ResolveError;
use crate::models::{IndexEntry, TreeNode, PATH_SEPARATOR};

/// Bosque de nodos raíz, sólo lectura.
#[derive(Debug, Clone, Default)]
pub struct TreeStore {
    roots: Vec<TreeNode>,
    source: Option<PathBuf>,
}

impl TreeStore {
    /// Carga el fichero JSON cuya raíz es un array de nodos.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("No se pudo leer la base de conocimiento {}", path.display()))?;
        let roots: Vec<TreeNode> = serde_json::from_str(&raw)
            .with_context(|| format!("JSON inválido en {}", path.display()))?;
        info!("Base de conocimiento cargada: {} ({} nodos raíz)", path.display(), roots.len());
        Ok(Self {
            roots,
            source: Some(path.to_path_buf()),
        })
    }

    pub fn from_nodes(roots: Vec<TreeNode>) -> Self {
        Self { roots, source: None }
    }

    /// Vuelve a leer el fichero de origen y devuelve un almacén nuevo.
    /// Un árbol construido en memoria se copia tal cual.
    pub fn reload(&self) -> Result<Self> {
        match &self.source {
            Some(path) => Self::load(path),
            None => Ok(self.clone()),
        }
    }

    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    pub fn resolve(&self, path_id: &str) -> Result<&TreeNode, ResolveError> {
        resolve(path_id, &self.roots)
    }

    pub fn flatten(&self) -> Vec<IndexEntry> {
        flatten(&self.roots)
    }
}

/// Recorre el árbol nivel a nivel siguiendo los segmentos de `path_id`.
///
/// En cada nivel gana el primer hermano con ese nombre; si hay nombres
/// duplicados el resto son inalcanzables. No hay vuelta atrás: el primer
/// segmento sin coincidencia termina la búsqueda con `NotFound`.
pub fn resolve<'a>(path_id: &str, roots: &'a [TreeNode]) -> Result<&'a TreeNode, ResolveError> {
    let segments: Vec<&str> = path_id.split(PATH_SEPARATOR).collect();
    if segments.iter().all(|segment| segment.is_empty()) {
        return Err(ResolveError::EmptyPath);
    }

    let mut current_level = roots;
    let mut found: Option<&'a TreeNode> = None;
    for (depth, segment) in segments.iter().enumerate() {
        let node = current_level
            .iter()
            .find(|node| node.name == *segment)
            .ok_or_else(|| ResolveError::NotFound {
                path_id: path_id.to_string(),
                segment: segment.to_string(),
                depth,
            })?;
        current_level = &node.children;
        found = Some(node);
    }

    found.ok_or(ResolveError::EmptyPath)
}

/// Aplana el árbol en preorden. Un nodo sin nombre se descarta junto con
/// todo su subárbol.
pub fn flatten(roots: &[TreeNode]) -> Vec<IndexEntry> {
    let mut entries = Vec::new();
    collect_entries(roots, &mut Vec::new(), &mut entries);
    entries
}

fn collect_entries<'a>(nodes: &'a [TreeNode], prefix: &mut Vec<&'a str>, out: &mut Vec<IndexEntry>) {
    for node in nodes {
        if !node.has_name() {
            warn!(
                "Saltando nodo sin 'name' bajo '{}' ({} hijos ignorados)",
                prefix.join(PATH_SEPARATOR),
                node.children.len()
            );
            continue;
        }

        prefix.push(&node.name);
        let path_id = prefix.join(PATH_SEPARATOR);
        let document = format!("{}\n{}", node.name, node.description.as_deref().unwrap_or(""))
            .trim()
            .to_string();
        out.push(IndexEntry {
            path_id,
            name: node.name.clone(),
            document,
        });

        collect_entries(&node.children, prefix, out);
        prefix.pop();
    }
}

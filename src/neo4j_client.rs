//! Integración con Neo4j como índice vectorial de las entradas del árbol.
//!
//! Cada entrada es un nodo `(:TreeEntry {path_id, name, document, embedding})`.
//! `path_id` es único, así que el upsert es un `MERGE` por clave y reindexar
//! un árbol sin cambios converge al mismo estado.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use neo4rs::{query, Graph};
use tracing::info;
use url::Url;

use crate::config::Neo4jConfig;
use crate::models::{EmbeddedEntry, VectorMatch};
use crate::vector_store::VectorIndex;

pub async fn connect_from_config(cfg: &Neo4jConfig) -> Result<Graph> {
    let url = Url::parse(&cfg.uri)?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(7687);
    let addr = format!("{host}:{port}");

    info!("Conectando a Neo4j en {addr}...");
    let graph = Graph::new(&addr, &cfg.user, &cfg.password).await?;
    info!("Conexión a Neo4j OK");
    Ok(graph)
}

/// Índice vectorial respaldado por un vector index de Neo4j (coseno).
pub struct Neo4jVectorIndex {
    graph: Graph,
    index_name: String,
}

impl Neo4jVectorIndex {
    /// Conecta y asegura constraint + índice vectorial.
    pub async fn connect(cfg: &Neo4jConfig, dimensions: usize) -> Result<Self> {
        let graph = connect_from_config(cfg).await?;
        let index = Self {
            graph,
            index_name: cfg.index_name.clone(),
        };
        index.ensure_schema().await?;
        index.ensure_vector_index(dimensions).await?;
        Ok(index)
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.graph
            .run(query(
                "CREATE CONSTRAINT tree_entry_path_id IF NOT EXISTS
                 FOR (e:TreeEntry)
                 REQUIRE e.path_id IS UNIQUE",
            ))
            .await?;
        info!("Esquema de Neo4j asegurado (constraint sobre :TreeEntry(path_id)).");
        Ok(())
    }

    async fn ensure_vector_index(&self, dimensions: usize) -> Result<()> {
        if !is_valid_index_name(&self.index_name) {
            return Err(anyhow!("Nombre de índice vectorial inválido: '{}'", self.index_name));
        }

        let mut cursor = self
            .graph
            .execute(
                query("SHOW VECTOR INDEXES YIELD name WHERE name = $name RETURN name")
                    .param("name", self.index_name.clone()),
            )
            .await?;

        if cursor.next().await?.is_some() {
            info!("Índice vectorial '{}' ya existe.", self.index_name);
            return Ok(());
        }

        let cypher = format!(
            "\
CREATE VECTOR INDEX {index_name} IF NOT EXISTS
FOR (e:TreeEntry)
ON (e.embedding)
OPTIONS {{
  indexConfig: {{
    `vector.dimensions`: {dimensions},
    `vector.similarity_function`: 'cosine'
  }}
}}",
            index_name = self.index_name,
            dimensions = dimensions
        );

        self.graph.run(query(&cypher)).await?;
        info!("Índice vectorial '{}' creado ({} dimensiones).", self.index_name, dimensions);
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for Neo4jVectorIndex {
    async fn upsert(&self, entries: &[EmbeddedEntry]) -> Result<usize> {
        let indexed_at = Utc::now().to_rfc3339();

        // Una sola transacción: o se escribe el lote entero o nada.
        let tx = self.graph.start_txn().await?;
        for embedded in entries {
            tx.run(
                query(
                    "MERGE (e:TreeEntry {path_id: $path_id})
                     SET e.name = $name, e.document = $document,
                         e.embedding = $embedding, e.indexed_at = datetime($indexed_at)",
                )
                .param("path_id", embedded.entry.path_id.clone())
                .param("name", embedded.entry.name.clone())
                .param("document", embedded.entry.document.clone())
                .param("embedding", embedded.embedding.clone())
                .param("indexed_at", indexed_at.clone()),
            )
            .await?;
        }
        tx.commit().await?;

        info!("Upsert en Neo4j: {} entradas :TreeEntry.", entries.len());
        Ok(entries.len())
    }

    async fn query(&self, vector: &[f64], top_k: usize) -> Result<Vec<VectorMatch>> {
        let mut cursor = self
            .graph
            .execute(
                query(
                    "CALL db.index.vector.queryNodes($index_name, $k, $embedding)
                     YIELD node, score
                     RETURN node.path_id AS id, score, node.document AS document
                     ORDER BY score DESC",
                )
                .param("index_name", self.index_name.clone())
                .param("k", top_k as i64)
                .param("embedding", vector.to_vec()),
            )
            .await?;

        let mut output = Vec::new();
        while let Some(row) = cursor.next().await? {
            let id: String = row
                .get("id")
                .ok_or_else(|| anyhow!("Falta campo 'id' en resultado de Neo4j"))?;
            let score: f64 = row
                .get("score")
                .ok_or_else(|| anyhow!("Falta campo 'score' en resultado de Neo4j"))?;
            let document: String = row.get("document").unwrap_or_default();

            output.push(VectorMatch {
                id,
                distance: 1.0 - score,
                document,
            });
        }

        Ok(output)
    }
}

/// El nombre del índice se interpola en el Cypher, así que sólo se aceptan
/// identificadores simples.
fn is_valid_index_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

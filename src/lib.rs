//! Servicio RAG compatible con OpenAI sobre una base de conocimiento en árbol JSON.
//!
//! La pregunta se convierte en embedding, se busca el nodo más cercano en el
//! índice vectorial, se resuelve su ruta (`A>B>C`) en el árbol y el subárbol
//! resultante se inyecta en el prompt del LLM, cuya respuesta se devuelve en
//! streaming con el formato SSE de OpenAI.

pub mod api;
pub mod app_state;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod neo4j_client;
pub mod prompt;
pub mod rag;
pub mod streaming;
pub mod tree;
pub mod vector_store;

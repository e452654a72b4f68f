//! Carga y gestión de configuración de la aplicación (árbol JSON + índice vectorial + LLM).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

/// Backend del índice vectorial.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VectorBackend {
    Neo4j,
    Memory,
}

impl VectorBackend {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "neo4j" => Ok(Self::Neo4j),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!("Backend de índice vectorial no soportado: {other}")),
        }
    }
}

/// Credenciales de Neo4j; sólo existen cuando el backend es `neo4j`.
#[derive(Clone, Debug)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub index_name: String,
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub knowledge_base_file: PathBuf,

    pub vector_backend: VectorBackend,
    pub neo4j: Option<Neo4jConfig>,

    pub embedding_model: String,
    pub embedding_dimensions: usize,

    pub llm_api_base_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub llm_enable_thinking: Option<bool>,

    pub top_k: usize,
    pub prompt_template_file: Option<PathBuf>,
    pub index_on_startup: bool,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let knowledge_base_file = PathBuf::from(
            env::var("KNOWLEDGE_BASE_FILE")
                .unwrap_or_else(|_| "data/combined_output.json".to_string()),
        );

        let vector_backend =
            VectorBackend::from_str(&env::var("VECTOR_STORE").unwrap_or_else(|_| "neo4j".to_string()))?;

        let neo4j = match vector_backend {
            VectorBackend::Neo4j => Some(Neo4jConfig {
                uri: env::var("NEO4J_URI").map_err(|_| anyhow!("Falta NEO4J_URI en el entorno"))?,
                user: env::var("NEO4J_USER")
                    .map_err(|_| anyhow!("Falta NEO4J_USER en el entorno"))?,
                password: env::var("NEO4J_PASSWORD")
                    .map_err(|_| anyhow!("Falta NEO4J_PASSWORD en el entorno"))?,
                index_name: env::var("NEO4J_INDEX_NAME")
                    .unwrap_or_else(|_| "knowledge_base".to_string()),
            }),
            VectorBackend::Memory => None,
        };

        let embedding_model =
            env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "bge-large-zh-v1.5".to_string());
        let embedding_dimensions = parse_var("EMBEDDING_DIMENSIONS", 1024usize)?;

        let llm_api_base_url =
            env::var("LLM_API_BASE_URL").unwrap_or_else(|_| "http://localhost:8002/v1".to_string());
        let llm_api_key = env::var("LLM_API_KEY").unwrap_or_else(|_| "dummy-key".to_string());
        let llm_model = env::var("LLM_MODEL").unwrap_or_else(|_| "Qwen1.5-14B-Chat".to_string());
        let llm_temperature = parse_var("LLM_TEMPERATURE", 0.7f32)?;
        let llm_max_tokens = parse_var("LLM_MAX_TOKENS", 20000u32)?;
        let llm_enable_thinking = match env::var("LLM_ENABLE_THINKING") {
            Ok(raw) => Some(parse_bool("LLM_ENABLE_THINKING", &raw)?),
            Err(_) => None,
        };

        let top_k = parse_var("TOP_K_RESULTS", 3usize)?;
        if top_k == 0 {
            return Err(anyhow!("TOP_K_RESULTS debe ser mayor que 0"));
        }

        let prompt_template_file = env::var("PROMPT_TEMPLATE_FILE").ok().map(PathBuf::from);
        let index_on_startup = match env::var("INDEX_ON_STARTUP") {
            Ok(raw) => parse_bool("INDEX_ON_STARTUP", &raw)?,
            Err(_) => false,
        } || vector_backend == VectorBackend::Memory;

        Ok(Self {
            server_addr,
            knowledge_base_file,
            vector_backend,
            neo4j,
            embedding_model,
            embedding_dimensions,
            llm_api_base_url,
            llm_api_key,
            llm_model,
            llm_temperature,
            llm_max_tokens,
            llm_enable_thinking,
            top_k,
            prompt_template_file,
            index_on_startup,
        })
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Valor inválido para {key}: '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("Valor booleano inválido para {key}: '{other}'")),
    }
}

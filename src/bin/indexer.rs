//! Indexación única de la base de conocimiento en el índice vectorial.
//! Hay que volver a ejecutarlo cada vez que cambie el fichero JSON.

use json_tree_rag::{
    app_state::connect_vector_index,
    config::{self, VectorBackend},
    ingest,
    llm::RigEmbedder,
    tree::TreeStore,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        error!("La indexación ha fallado: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    info!("Iniciando el proceso de indexación...");
    let cfg = config::AppConfig::from_env()?;
    if cfg.vector_backend == VectorBackend::Memory {
        anyhow::bail!("El indexador necesita un índice persistente; use VECTOR_STORE=neo4j");
    }

    let tree = TreeStore::load(&cfg.knowledge_base_file)?;
    let embedder = RigEmbedder::from_config(&cfg)?;
    let index = connect_vector_index(&cfg).await?;

    let report = ingest::index_tree(&tree, &embedder, index.as_ref()).await?;
    info!("{report}");
    Ok(())
}

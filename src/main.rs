use json_tree_rag::{api, app_state::AppState, config};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 2. Cargar configuración
    let cfg = match config::AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Error al cargar la configuración: {e:#}");
            std::process::exit(1);
        }
    };

    // 3. Árbol, embeddings, índice vectorial y cliente LLM
    let app_state = match AppState::build(cfg).await {
        Ok(state) => state,
        Err(e) => {
            error!("Error inicializando los servicios: {e:#}");
            std::process::exit(1);
        }
    };

    // 4. Router de la API
    let app = api::create_router(app_state.clone()).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    // 5. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = match tokio::net::TcpListener::bind(server_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("No se pudo escuchar en {server_addr}: {e}");
            std::process::exit(1);
        }
    };
    info!("🚀 Servidor escuchando en http://{}", server_addr);

    // Apagado ordenado con Ctrl+C.
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await;

    match served {
        Ok(()) => info!("✅ Servidor cerrado correctamente."),
        Err(e) => {
            error!("El servidor terminó con error: {e}");
            std::process::exit(1);
        }
    }
}

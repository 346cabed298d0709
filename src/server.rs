use crate::{
    config::Config,
    model_service::ModelService,
    ort_service::OrtModelService,
    routes::api_routes,
    state::{ServiceState, State},
};
use axum::Router;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub struct SharedState<M: ModelService, S: State> {
    pub model_service: Arc<M>,
    pub service_state: Arc<S>,
}

impl<M: ModelService, S: State> Clone for SharedState<M, S> {
    fn clone(&self) -> Self {
        Self {
            model_service: self.model_service.clone(),
            service_state: self.service_state.clone(),
        }
    }
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(
        model_service: impl ModelService,
        service_state: impl State,
        addr: &str,
    ) -> anyhow::Result<Self> {
        let app_state = SharedState {
            model_service: Arc::new(model_service),
            service_state: Arc::new(service_state),
        };

        // The frontend is served from another origin.
        let router = Router::new()
            .merge(api_routes())
            .with_state(app_state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive());

        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!(
            "Prediction service listening on {}",
            self.listener.local_addr()?
        );

        let shutdown = async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown");
        };

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let ort_model_service =
        OrtModelService::new(&config.model).expect("failed to instantiate ort model service");
    let service_state =
        ServiceState::new(&config.labels).expect("failed to load class labels");

    let addr = config.server.get_address();
    let http_server = HttpServer::new(ort_model_service, service_state, &addr).await?;

    http_server.run().await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

use std::net::TcpListener;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer as ActixHttpServer};
use log::info;

use super::routes;
use crate::error::MeshResult;
use crate::node::MeshNode;

/// Shared application state for the HTTP server.
///
/// Handlers go through the node's store and reference graph directly, which
/// are internally synchronized; no handler ever holds a lock across a
/// network call, and no handler blocks on the tick loop.
pub struct AppState {
    pub node: Arc<MeshNode>,
}

/// HTTP server exposing the node's coordination endpoints.
///
/// Peers and external tools use it to read/write data and configuration,
/// list entities, and export/import subtrees. Every internal failure becomes
/// a client-visible error response; the serving threads never crash on one.
pub struct MeshHttpServer {
    node: Arc<MeshNode>,
    bind_address: String,
}

impl MeshHttpServer {
    /// Create a new HTTP server over the given node.
    ///
    /// `bind_address` is the address to bind to (e.g. "127.0.0.1:9600").
    pub fn new(node: Arc<MeshNode>, bind_address: &str) -> Self {
        Self {
            node,
            bind_address: bind_address.to_string(),
        }
    }

    /// Run the HTTP server until the process shuts down.
    pub async fn run(&self) -> MeshResult<()> {
        info!("HTTP server running on {}", self.bind_address);
        let state = self.app_state();

        ActixHttpServer::new(move || {
            App::new()
                .wrap(Cors::permissive())
                .app_data(state.clone())
                .configure(routes::configure)
        })
        .bind(&self.bind_address)?
        .run()
        .await?;

        Ok(())
    }

    /// Run on an already-bound listener. Useful when the caller picked the
    /// port, e.g. by binding to port 0.
    pub async fn run_on_listener(&self, listener: TcpListener) -> MeshResult<()> {
        let state = self.app_state();

        // Bind the `Server` to a local before awaiting so the non-`Send`
        // `HttpServer` builder temporary is dropped before the await point,
        // keeping this future `Send` (required when spawned on a multi-thread
        // runtime).
        let server = ActixHttpServer::new(move || {
            App::new()
                .wrap(Cors::permissive())
                .app_data(state.clone())
                .configure(routes::configure)
        })
        .listen(listener)?
        .run();
        server.await?;

        Ok(())
    }

    fn app_state(&self) -> web::Data<AppState> {
        web::Data::new(AppState {
            node: Arc::clone(&self.node),
        })
    }
}

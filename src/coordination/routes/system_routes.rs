use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::coordination::http_server::AppState;

/// Get node status information
pub async fn get_system_status(state: web::Data<AppState>) -> impl Responder {
    let node = &state.node;
    let entities = node
        .store()
        .list_entities()
        .map(|records| records.len())
        .unwrap_or(0);

    HttpResponse::Ok().json(json!({
        "node": node.name(),
        "ticks": node.tick_count(),
        "entities": entities,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

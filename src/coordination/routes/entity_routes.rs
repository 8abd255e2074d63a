use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::coordination::http_server::AppState;
use crate::loaders;

/// List every known entity record.
pub async fn list_entities(state: web::Data<AppState>) -> impl Responder {
    match state.node.store().list_entities() {
        Ok(records) => HttpResponse::Ok().json(records),
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}

#[derive(Serialize, Deserialize)]
pub struct EntityImportForm {
    pub model: String,
}

/// Create entities from a JSON array of entity records.
pub async fn create_entities(
    state: web::Data<AppState>,
    form: web::Form<EntityImportForm>,
) -> impl Responder {
    match loaders::import_entities(&state.node, &form.model) {
        Ok(count) => HttpResponse::Ok().json(json!({
            "success": true,
            "created": count,
        })),
        Err(e) => HttpResponse::BadRequest().json(json!({
            "error": format!("Unable to import entities: {}", e),
        })),
    }
}

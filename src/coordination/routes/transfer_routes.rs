use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::coordination::http_server::AppState;
use crate::error::MeshError;
use crate::subtree::{self, SubtreeKind};

#[derive(Deserialize)]
pub struct ExportQuery {
    pub entity: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Export a subtree of entities or their output data as a JSON array.
pub async fn export_subtree(
    state: web::Data<AppState>,
    query: web::Query<ExportQuery>,
) -> impl Responder {
    let kind: SubtreeKind = match query.kind.parse() {
        Ok(kind) => kind,
        Err(e) => {
            return HttpResponse::BadRequest()
                .json(json!({ "error": format!("{}", e) }))
        }
    };

    match subtree::export_subtree(
        state.node.store(),
        state.node.registry(),
        &query.entity,
        kind,
    ) {
        Ok(serialized) => HttpResponse::Ok()
            .content_type("application/json")
            .body(serialized),
        Err(e @ MeshError::Config(_)) => {
            HttpResponse::NotFound().json(json!({ "error": e.to_string() }))
        }
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}

#[derive(Serialize, Deserialize)]
pub struct ImportForm {
    pub entities: String,
    #[serde(default)]
    pub data: String,
}

/// Import an exported subtree: entity collection plus its data collection.
pub async fn import_subtree(
    state: web::Data<AppState>,
    form: web::Form<ImportForm>,
) -> impl Responder {
    match subtree::import_subtree(&state.node, &form.entities, &form.data) {
        Ok(()) => HttpResponse::Ok().json(json!({ "success": true })),
        Err(e @ MeshError::ImportIntegrity(_)) => {
            HttpResponse::BadRequest().json(json!({ "error": e.to_string() }))
        }
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}

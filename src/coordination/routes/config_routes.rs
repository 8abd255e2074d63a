use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::coordination::http_server::AppState;
use crate::error::MeshError;

#[derive(Deserialize)]
pub struct ConfigQuery {
    pub entity: String,
    #[serde(default)]
    pub path: Option<String>,
}

/// Read one config property by dot path, or the whole document when no path
/// is given.
pub async fn get_config(
    state: web::Data<AppState>,
    query: web::Query<ConfigQuery>,
) -> impl Responder {
    let node = &state.node;
    let result = match &query.path {
        Some(path) => node.get_config_path(&query.entity, path),
        None => node.get_config(&query.entity),
    };

    match result {
        Ok(value) => HttpResponse::Ok().json(json!({
            "entity": query.entity,
            "path": query.path,
            "value": value,
        })),
        Err(e) => config_error(e),
    }
}

#[derive(Serialize, Deserialize)]
pub struct ConfigUpdateForm {
    pub entity: String,
    pub path: String,
    pub value: String,
}

/// Write one config property by dot path.
pub async fn set_config(
    state: web::Data<AppState>,
    form: web::Form<ConfigUpdateForm>,
) -> impl Responder {
    match state
        .node
        .set_config_path(&form.entity, &form.path, &form.value)
    {
        Ok(()) => HttpResponse::Ok().json(json!({
            "success": true,
            "entity": form.entity,
            "path": form.path,
        })),
        Err(e) => config_error(e),
    }
}

fn config_error(error: MeshError) -> HttpResponse {
    match &error {
        MeshError::PathNotFound(_) | MeshError::Config(_) => {
            HttpResponse::NotFound().json(json!({ "error": error.to_string() }))
        }
        _ => HttpResponse::InternalServerError().json(json!({ "error": error.to_string() })),
    }
}

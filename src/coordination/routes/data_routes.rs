use actix_web::{web, HttpResponse, Responder};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::coordination::http_server::AppState;
use crate::loaders;
use crate::model::DataRecord;

pub const PARAMETER_NAME: &str = "name";
pub const PARAMETER_FILTER: &str = "filter";

/// Read named or filtered data records.
///
/// Accepts repeated `name=<key>` and/or `filter=<expr>` parameters and
/// returns a JSON array of data records. With no parameters, returns the
/// full list of known keys as name-only stubs.
pub async fn get_data(
    state: web::Data<AppState>,
    query: web::Query<Vec<(String, String)>>,
) -> impl Responder {
    let node = &state.node;
    info!("Request: /data {:?}", query.as_slice());

    let mut results: Vec<DataRecord> = Vec::new();
    let mut selected = false;

    for (key, value) in query.iter() {
        if key.eq_ignore_ascii_case(PARAMETER_NAME) {
            selected = true;
            match fetch_one(node, value) {
                Ok(Some(record)) => results.push(record),
                Ok(None) => {}
                Err(response) => return response,
            }
        } else if key.eq_ignore_ascii_case(PARAMETER_FILTER) {
            selected = true;
            match node.graph().find_by_filter(value) {
                Ok(records) => results.extend(records),
                Err(e) => return internal_error(&e.to_string()),
            }
        }
    }

    // No data specified: list all known keys.
    if !selected {
        match node.graph().data_keys() {
            Ok(keys) => results.extend(keys.iter().map(|key| DataRecord::meta(key))),
            Err(e) => return internal_error(&e.to_string()),
        }
    }

    HttpResponse::Ok().json(results)
}

fn fetch_one(
    node: &crate::node::MeshNode,
    key: &str,
) -> Result<Option<DataRecord>, HttpResponse> {
    let mut record = match node.store().get_data(key) {
        Ok(record) => record,
        Err(e) => return Err(internal_error(&e.to_string())),
    };
    if let Some(record) = record.as_mut() {
        // Stamp the stored reference edge, if any, onto the wire record.
        match node.graph().reference(key) {
            Ok(expr) => record.ref_keys = expr,
            Err(e) => return Err(internal_error(&e.to_string())),
        }
    }
    Ok(record)
}

#[derive(Serialize, Deserialize)]
pub struct DataImportForm {
    pub model: String,
}

/// Import a JSON array of data records, upserting each.
pub async fn post_data(
    state: web::Data<AppState>,
    form: web::Form<DataImportForm>,
) -> impl Responder {
    match loaders::import_data(&state.node, &form.model) {
        Ok(count) => HttpResponse::Ok().json(json!({
            "success": true,
            "imported": count,
        })),
        Err(e) => HttpResponse::BadRequest().json(json!({
            "error": format!("Unable to import data: {}", e),
        })),
    }
}

fn internal_error(message: &str) -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({ "error": message }))
}

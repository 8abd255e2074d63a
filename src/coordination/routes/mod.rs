use actix_web::web;

pub mod config_routes;
pub mod data_routes;
pub mod entity_routes;
pub mod system_routes;
pub mod transfer_routes;

/// Wires every inbound coordination endpoint into the actix app.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/data", web::get().to(data_routes::get_data))
        .route("/data", web::post().to(data_routes::post_data))
        .route("/config", web::get().to(config_routes::get_config))
        .route("/config", web::post().to(config_routes::set_config))
        .route("/entities", web::get().to(entity_routes::list_entities))
        .route("/entities", web::post().to(entity_routes::create_entities))
        .route("/export", web::get().to(transfer_routes::export_subtree))
        .route("/import", web::post().to(transfer_routes::import_subtree))
        .route("/system/status", web::get().to(system_routes::get_system_status));
}

/// HTTP server exposing the data explorer over WebSocket
use actix_web::{middleware, web, App, Error, HttpRequest, HttpResponse, HttpServer};
use actix_web_actors::ws;

use crate::websocket::{AppState, ExplorerWebSocket};

/// WebSocket endpoint handler
async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let resp = ws::start(ExplorerWebSocket::new(state), &req, stream)?;
    Ok(resp)
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let open_views = state
        .service
        .lock()
        .map(|service| service.num_views())
        .unwrap_or(0);
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "open_views": open_views,
    }))
}

/// Start the HTTP server with WebSocket support
pub async fn run_server(host: &str, port: u16, num_workers: usize) -> std::io::Result<()> {
    let state = web::Data::new(AppState::new(num_workers));

    log::info!("explorer websocket: ws://{}:{}/ws", host, port);
    log::info!("health check: http://{}:{}/health", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            // Enable logger
            .wrap(middleware::Logger::default())
            // CORS for development
            .wrap(
                actix_cors::Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            // WebSocket endpoint
            .route("/ws", web::get().to(ws_index))
            // Health check
            .route("/health", web::get().to(health_check))
    })
    .bind((host, port))?
    .run()
    .await
}

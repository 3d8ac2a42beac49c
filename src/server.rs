//! HTTP transport.
//!
//! Two listeners run side by side. The API listener maps each facade
//! operation to a route and talks to the facade only through the
//! [`ProxyActor`]. The admin listener serves health, readiness and metrics.

use actix::prelude::*;
use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpResponse, HttpServer};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::actor::{
    start_proxy_actor_with_channel, ConfigureVault, InitStatus, InitVault, ProxyActor, SealStatus,
    UnsealVault,
};
use crate::configure::ConfigOptions;
use crate::health::{HealthState, ReadinessChecks, STATUS_OK, STATUS_UNAVAILABLE};
use crate::metrics::MetricsRecorder;
use crate::service::{InitKeys, InitOptions, ProxyError, Service, UnsealOptions};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InitStatusResponse {
    pub initialized: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InitResponse {
    pub init: InitKeys,
}

/// State shared by the API handlers.
pub struct AppState {
    pub actor: Addr<ProxyActor>,
}

/// State shared by the admin handlers.
pub struct AdminState {
    pub health: Arc<HealthState>,
    pub checks: Arc<ReadinessChecks>,
    pub metrics: Option<MetricsRecorder>,
}

fn error_response(err: &ProxyError) -> HttpResponse {
    let body = ErrorBody {
        error: err.to_string(),
    };
    if err.is_client_error() {
        HttpResponse::BadRequest().json(body)
    } else {
        error!("request failed: {}", err);
        HttpResponse::InternalServerError().json(body)
    }
}

fn respond<T, R, F>(result: Result<Result<T, ProxyError>, MailboxError>, map: F) -> HttpResponse
where
    R: Serialize,
    F: FnOnce(T) -> R,
{
    match result {
        Ok(Ok(value)) => HttpResponse::Ok().json(map(value)),
        Ok(Err(e)) => error_response(&e),
        Err(e) => {
            error!("proxy actor unavailable: {}", e);
            HttpResponse::InternalServerError().json(ErrorBody {
                error: e.to_string(),
            })
        }
    }
}

async fn init_status(state: web::Data<AppState>) -> HttpResponse {
    respond(state.actor.send(InitStatus).await, |initialized| {
        InitStatusResponse { initialized }
    })
}

async fn init(state: web::Data<AppState>, req: web::Json<InitOptions>) -> HttpResponse {
    respond(state.actor.send(InitVault(req.into_inner())).await, |init| {
        InitResponse { init }
    })
}

async fn seal_status(state: web::Data<AppState>) -> HttpResponse {
    respond(state.actor.send(SealStatus).await, |s| s)
}

async fn unseal(state: web::Data<AppState>, req: web::Json<UnsealOptions>) -> HttpResponse {
    respond(state.actor.send(UnsealVault(req.into_inner())).await, |s| s)
}

async fn configure(state: web::Data<AppState>, req: web::Json<ConfigOptions>) -> HttpResponse {
    respond(state.actor.send(ConfigureVault(req.into_inner())).await, |s| s)
}

/// Malformed request bodies are the caller's fault.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::BadRequest().json(ErrorBody {
            error: err.to_string(),
        });
        actix_web::error::InternalError::from_response(err, response).into()
    })
}

/// Routes of the API listener.
pub fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/init/status", web::get().to(init_status))
        .route("/init", web::put().to(init))
        .route("/seal/status", web::get().to(seal_status))
        .route("/unseal", web::put().to(unseal))
        .route("/configure", web::post().to(configure));
}

fn status_response(code: u16) -> HttpResponse {
    HttpResponse::build(StatusCode::from_u16(code).unwrap_or(StatusCode::SERVICE_UNAVAILABLE))
        .finish()
}

async fn healthz(state: web::Data<AdminState>) -> HttpResponse {
    status_response(state.health.healthz())
}

async fn healthz_toggle(state: web::Data<AdminState>) -> HttpResponse {
    state.health.toggle_healthz();
    status_response(STATUS_OK)
}

async fn readiness(state: web::Data<AdminState>) -> HttpResponse {
    status_response(state.checks.update(&state.health).await)
}

async fn metrics(state: web::Data<AdminState>) -> HttpResponse {
    match &state.metrics {
        Some(recorder) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(recorder.render()),
        None => status_response(STATUS_UNAVAILABLE),
    }
}

/// Routes of the admin listener.
pub fn admin_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/healthz", web::get().to(healthz))
        .route("/healthz/status", web::get().to(healthz_toggle))
        .route("/readiness", web::get().to(readiness))
        .route("/metrics", web::get().to(metrics));
}

/// Starts both listeners and runs until either stops.
///
/// Must be called from inside an actix system so the proxy actor can start.
pub async fn start_server(
    api_addr: &str,
    admin_addr: &str,
    service: Arc<dyn Service>,
    admin: AdminState,
) -> std::io::Result<()> {
    let (actor, mut events) = start_proxy_actor_with_channel(service);

    actix_rt::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("proxy event: {:?}", event);
        }
    });

    let app_state = web::Data::new(AppState { actor });
    let admin_state = web::Data::new(admin);

    info!("API listening on {}", api_addr);
    let api = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .configure(api_routes)
    })
    .bind(api_addr)?
    .run();

    info!("Admin listening on {}", admin_addr);
    let admin = HttpServer::new(move || {
        App::new()
            .app_data(admin_state.clone())
            .wrap(Logger::default())
            .configure(admin_routes)
    })
    .bind(admin_addr)?
    .run();

    tokio::try_join!(api, admin)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configure::Configurator;
    use crate::service::{ProxyService, SealState};
    use crate::testing::{FakeFactory, FakeVault};
    use actix_web::test;

    fn app_state(backend: Arc<FakeVault>) -> web::Data<AppState> {
        let svc = ProxyService::new(Arc::new(FakeFactory::new(backend)), Configurator::new(None));
        web::Data::new(AppState {
            actor: ProxyActor::new(Arc::new(svc), None).start(),
        })
    }

    #[actix_web::test]
    async fn init_status_is_wrapped() {
        let app = test::init_service(
            App::new()
                .app_data(app_state(FakeVault::fresh()))
                .configure(api_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/init/status").to_request();
        let body: InitStatusResponse = test::call_and_read_body_json(&app, req).await;
        assert!(!body.initialized);
    }

    #[actix_web::test]
    async fn unseal_without_key_is_a_bad_request() {
        let app = test::init_service(
            App::new()
                .app_data(app_state(FakeVault::sealed(3)))
                .configure(api_routes),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/unseal")
            .set_json(serde_json::json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = test::read_body_json(resp).await;
        assert_eq!(body.error, "'key' must be specified, or 'reset' set to true");

        let req = test::TestRequest::put()
            .uri("/unseal")
            .set_json(serde_json::json!({"key": "key-0"}))
            .to_request();
        let state: SealState = test::call_and_read_body_json(&app, req).await;
        assert_eq!(state.progress, 1);
        assert_eq!(state.t, 3);
    }

    #[actix_web::test]
    async fn malformed_json_is_a_bad_request() {
        let app = test::init_service(
            App::new()
                .app_data(app_state(FakeVault::fresh()))
                .configure(api_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/configure")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"url\": ")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn vault_failures_are_server_errors() {
        let backend = FakeVault::fresh();
        backend.fail_on("seal_status");
        let app = test::init_service(
            App::new()
                .app_data(app_state(backend))
                .configure(api_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/seal/status").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn init_returns_keys_under_init() {
        let app = test::init_service(
            App::new()
                .app_data(app_state(FakeVault::fresh()))
                .configure(api_routes),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/init")
            .set_json(serde_json::json!({"secret_shares": 2, "secret_threshold": 1}))
            .to_request();
        let body: InitResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.init.keys, vec!["key-0", "key-1"]);
        assert_eq!(body.init.root_token, "root-token");
    }

    #[actix_web::test]
    async fn healthz_toggles() {
        let dir = tempfile::tempdir().unwrap();
        let admin = web::Data::new(AdminState {
            health: Arc::new(HealthState::default()),
            checks: Arc::new(ReadinessChecks::new(
                None,
                Some(dir.path().to_path_buf()),
                Arc::new(FakeFactory::new(FakeVault::fresh())),
            )),
            metrics: None,
        });
        let app = test::init_service(App::new().app_data(admin).configure(admin_routes)).await;

        let get = |uri: &str| test::TestRequest::get().uri(uri).to_request();
        assert_eq!(test::call_service(&app, get("/healthz")).await.status(), StatusCode::OK);
        assert_eq!(
            test::call_service(&app, get("/healthz/status")).await.status(),
            StatusCode::OK
        );
        assert_eq!(
            test::call_service(&app, get("/healthz")).await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(test::call_service(&app, get("/readiness")).await.status(), StatusCode::OK);
        assert_eq!(
            test::call_service(&app, get("/metrics")).await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use tokio::net::TcpListener;

use crate::{
    configatron::LOCAL_HOST,
    dashboard::{ScreenOutcome, ADMIN_POST_PATH, NONCE_FIELD},
    error::{CustomCssError, ErrorAction, ErrorKind},
    gatekeeper::{Actor, Capability},
    hookway::NEW_SITE_INITIALISED,
    kickstartor::Kickstartor,
    utils::escape_html::escape_html,
    CustomCssResult,
};

pub mod request;

use request::{session_token, AdminAction, NEW_SITE_ACTION};

/// MIME types served from the uploads folder beyond the vault's allow-list.
const SERVED_MIMES: &[(&str, &str)] = &[("css", "text/css; charset=utf-8")];

/// HTTP front of the site: the admin screen, the admin post endpoint, the public page and the
/// uploaded files.
#[derive(Debug)]
pub struct Lothlorien {
    socket_addr: String,
}

impl Lothlorien {
    pub fn new(port: &str) -> Self {
        Self {
            socket_addr: format!("{}:{}", LOCAL_HOST, port),
        }
    }

    /// Binds the configured address. Port `0` lets the OS pick one.
    ///
    /// # Errors
    ///
    /// `SocketAddressBindingError` when the address is taken or invalid.
    pub async fn create_listener(&self) -> CustomCssResult<TcpListener> {
        TcpListener::bind(self.socket_addr.clone())
            .await
            .map_err(|err| {
                CustomCssError::raise_critical_server_error(
                    ErrorKind::SocketAddressBindingError,
                    &err.to_string(),
                    ErrorAction::Exit,
                )
            })
    }

    /// The address `listener` actually listens on.
    pub fn local_addr(listener: &TcpListener) -> CustomCssResult<SocketAddr> {
        listener.local_addr().map_err(|err| {
            CustomCssError::raise_critical_server_error(
                ErrorKind::ServerLocalAddrFetchFailed,
                &err.to_string(),
                ErrorAction::Exit,
            )
        })
    }

    /// Serves `services` on `listener` until the process stops.
    pub async fn serve(
        &self,
        listener: TcpListener,
        services: Arc<Kickstartor>,
    ) -> CustomCssResult<()> {
        let local_addr = Self::local_addr(&listener)?;

        tracing::info!("Custom CSS dashboard listening on http://{}", local_addr);
        println!(
            "Custom CSS dashboard listening on http://{}{}",
            local_addr,
            services.dashboard.dashboard_url()
        );

        axum::serve(listener, Self::build_router(services))
            .await
            .map_err(|err| {
                CustomCssError::raise_critical_server_error(
                    ErrorKind::ServerRunFailed,
                    &err.to_string(),
                    ErrorAction::Exit,
                )
            })
    }

    /// The route table.
    pub fn build_router(services: Arc<Kickstartor>) -> Router {
        let dashboard_path = services.dashboard.dashboard_url();

        Router::new()
            .route("/", get(public_page))
            .route(&dashboard_path, get(dashboard_screen))
            .route(ADMIN_POST_PATH, post(admin_post))
            .route("/uploads/*path", get(uploaded_file))
            .with_state(services)
            .layer(middleware::from_fn(log_requests))
    }
}

fn current_actor(services: &Kickstartor, headers: &HeaderMap) -> Actor {
    services
        .gatekeeper
        .identify(session_token(headers).as_deref())
}

/// A minimal front page whose `<head>` carries the active theme's head hook output.
async fn public_page(State(services): State<Arc<Kickstartor>>) -> Html<String> {
    let head = match services.hookway.render_head().await {
        Ok(head) => head,
        Err(err) => {
            tracing::error!("Rendering the head hook failed: {}", err.get_message());
            String::new()
        }
    };

    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\" />\n<title>{}</title>{}</head>\n<body>\n</body>\n</html>\n",
        escape_html(&services.site_url),
        head
    ))
}

async fn dashboard_screen(
    State(services): State<Arc<Kickstartor>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Html<String> {
    let actor = current_actor(&services, &headers);

    Html(
        services
            .dashboard
            .render(&actor, ScreenOutcome::from_query(&query)),
    )
}

async fn admin_post(
    State(services): State<Arc<Kickstartor>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let actor = current_actor(&services, &headers);
    let action = form.get("action").map(String::as_str).unwrap_or_default();

    match AdminAction::from_name(action) {
        AdminAction::UpdateCustomCss => {
            let outcome = services.dashboard.handle_save(&actor, &form).await;

            Redirect::to(&services.dashboard.redirect_url(outcome)).into_response()
        }
        AdminAction::NewSite => {
            let outcome = new_site(&services, &actor, &form).await;

            Redirect::to(&services.dashboard.redirect_url(outcome)).into_response()
        }
        AdminAction::Unknown(name) => {
            let err = CustomCssError::raise_general_server_error(
                ErrorKind::UnknownAdminAction,
                &format!("Unknown admin action: {}", name),
                ErrorAction::Ignore,
            );

            (
                StatusCode::BAD_REQUEST,
                escape_html(&err.get_message()).into_owned(),
            )
                .into_response()
        }
    }
}

async fn new_site(
    services: &Kickstartor,
    actor: &Actor,
    form: &HashMap<String, String>,
) -> ScreenOutcome {
    let allowed = services
        .gatekeeper
        .require(actor, Capability::ManageOptions)
        .and_then(|_| {
            services.gatekeeper.check_admin_referer(
                form.get(NONCE_FIELD).map(String::as_str),
                NEW_SITE_ACTION,
                actor,
            )
        });

    if allowed.is_err() {
        return ScreenOutcome::Denied;
    }

    match services.hookway.fire(NEW_SITE_INITIALISED).await {
        Ok(_) => ScreenOutcome::Saved,
        Err(_) => ScreenOutcome::SaveFailed,
    }
}

async fn uploaded_file(
    State(services): State<Arc<Kickstartor>>,
    Path(path): Path<String>,
) -> Response {
    let relative = format!("/{}", path);

    if !services.uploadvault.is_file(&relative).await {
        return StatusCode::NOT_FOUND.into_response();
    }

    match services.uploadvault.read(&relative).await {
        Ok(bytes) => {
            let mime = services
                .uploadvault
                .mime_for(&relative, SERVED_MIMES)
                .unwrap_or_else(|| "application/octet-stream".to_string());

            ([(header::CONTENT_TYPE, mime)], bytes).into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    tracing::info!("{} {} -> {}", method, path, response.status().as_u16());

    response
}

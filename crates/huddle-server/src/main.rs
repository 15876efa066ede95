use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use huddle_api::auth::{self, AppState, AppStateInner};
use huddle_api::middleware::require_auth;
use huddle_api::{contacts, groups, messages, reactions};
use huddle_gateway::connection;
use huddle_gateway::dispatcher::Dispatcher;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    jwt_secret: String,
    db: Arc<huddle_store::Database>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("HUDDLE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("HUDDLE_DB_PATH").unwrap_or_else(|_| "huddle.db".into());
    let host = std::env::var("HUDDLE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("HUDDLE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    let db = Arc::new(huddle_store::Database::open(&PathBuf::from(&db_path))?);

    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: jwt_secret.clone(),
        dispatcher: dispatcher.clone(),
    });

    let ws_state = ServerState {
        dispatcher,
        jwt_secret,
        db,
    };

    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route(
            "/contacts/requests",
            post(contacts::request_contact).get(contacts::pending_requests),
        )
        .route(
            "/contacts/requests/{user_id}/accept",
            post(contacts::accept_contact),
        )
        .route("/groups", post(groups::create_group).get(groups::list_groups))
        .route(
            "/groups/{group_id}",
            get(groups::get_group).patch(groups::update_group),
        )
        .route(
            "/groups/{group_id}/members",
            get(groups::list_members).post(groups::add_members),
        )
        .route(
            "/groups/{group_id}/members/{user_id}",
            delete(groups::remove_member),
        )
        .route(
            "/groups/{group_id}/members/{user_id}/role",
            put(groups::set_role),
        )
        .route("/groups/{group_id}/messages", get(messages::group_messages))
        .route("/groups/{group_id}/read", post(groups::mark_group_read))
        .route("/groups/{group_id}/unread", get(groups::group_unread))
        .route("/users/{user_id}", get(auth::get_user))
        .route("/messages", post(messages::send_message))
        .route(
            "/messages/{message_id}",
            axum::routing::patch(messages::edit_message).delete(messages::delete_message),
        )
        .route(
            "/messages/{message_id}/reactions",
            get(reactions::reaction_summary)
                .put(reactions::react)
                .delete(reactions::unreact),
        )
        .route("/direct/{user_id}/messages", get(messages::direct_messages))
        .route("/direct/{user_id}/read", post(messages::mark_direct_read))
        .route("/direct/{user_id}/unread", get(messages::direct_unread))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(ws_state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Huddle server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.jwt_secret, state.db)
    })
}

mod auth;
mod responses;
mod routes;

use anyhow::{anyhow, Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, TraceLayer};
use tracing::{info, Level};

use crate::state::State;

pub fn router(state: State) -> Router {
    use axum::routing::{get, post, put};

    Router::new()
        .route("/me", put(routes::me::put_me))
        .route("/me/settings", get(routes::me::get_settings))
        .route("/me/rss/enable", post(routes::me::enable_rss))
        .route("/me/rss/rotate", post(routes::me::rotate_rss))
        .route("/me/rss/disable", post(routes::me::disable_rss))
        .route("/me/subscription", get(routes::me::get_subscription))
        .route("/plans", get(routes::me::get_plans))
        .route(
            "/feeds",
            get(routes::feeds::list_feeds).post(routes::feeds::create_feed),
        )
        .route(
            "/feeds/:id",
            get(routes::feeds::get_feed)
                .patch(routes::feeds::update_feed)
                .delete(routes::feeds::delete_feed),
        )
        .route("/feeds/:id/posts", get(routes::feeds::preview_posts))
        .route(
            "/feeds/:id/attempts",
            get(routes::attempts::list_attempts).post(routes::attempts::record_attempt),
        )
        .route("/feeds/:id/attempts/stats", get(routes::attempts::attempt_stats))
        .route("/programs", get(routes::attempts::list_programs))
        .route("/objects/*path", get(routes::objects::get_object))
        .layer(
            ServiceBuilder::new().layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_request(DefaultOnRequest::new().level(Level::INFO)),
            ),
        )
        .with_state(state)
}

pub struct Server {
    socket: TcpListener,
    app: Router,
}

impl Server {
    pub async fn new(state: State) -> Result<Self> {
        let bind_addr = state.cfg.bind_addr.clone();
        let socket = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| anyhow!("could not bind to `{bind_addr}`"))?;
        info!("Listening on {bind_addr}");

        Ok(Self {
            socket,
            app: router(state),
        })
    }

    pub async fn serve(self, cancel: CancellationToken) -> Result<()> {
        axum::serve(self.socket, self.app)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .context("the HTTP server encountered a failure")
    }
}

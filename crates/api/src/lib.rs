//! HTTP API for the accommodation service.
//!
//! Listings are created through the creation saga, queries go straight to
//! the store, and protected routes are authorized by the external auth
//! service behind a circuit breaker. Images are served through a
//! read-through cache. Logging uses `tracing` and metrics are exported in
//! Prometheus format.

pub mod auth;
pub mod authority;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use accommodation::{AccommodationService, AccommodationStore, InMemoryAccommodationStore};
use assets::{AssetError, AssetStore};
use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post};
use messaging::{InMemoryChannel, MessageChannel, Subscription};
use metrics_exporter_prometheus::PrometheusHandle;
use resilience::{BackingStore, CircuitBreaker, ReadThroughCache};
use saga::{CreateAccommodationHandler, RemoveCreatedAccommodation, SagaOrchestrator};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use auth::{AuthGuard, require_guest, require_host};
use authority::Authority;
use config::Config;
use error::StartupError;
use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let host_only = Router::new()
        .route("/api/accommodations/create", post(routes::accommodations::create))
        .route(
            "/api/accommodations/delete/{username}",
            delete(routes::accommodations::delete_by_username),
        )
        .route("/api/accommodations/write/{file_name}", post(routes::assets::write))
        .route("/api/accommodations/copy", post(routes::assets::copy))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_host));

    let guest_only = Router::new()
        .route("/api/accommodations/accommodationGrade", post(routes::grades::create))
        .route(
            "/api/accommodations/deleteAccommodationGrade/{id}",
            delete(routes::grades::delete),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_guest));

    let public = Router::new()
        .route("/health", get(routes::health::check))
        .route("/api/accommodations/", get(routes::accommodations::list))
        .route("/api/accommodations/{id}", get(routes::accommodations::get))
        .route(
            "/api/accommodations/myAccommodations/{username}",
            get(routes::accommodations::by_username),
        )
        .route(
            "/api/accommodations/search_by_location/{location}",
            get(routes::accommodations::search_by_location),
        )
        .route(
            "/api/accommodations/search_by_noGuests/{no_guests}",
            get(routes::accommodations::search_by_guests),
        )
        .route(
            "/api/accommodations/search_by_date/{start}/{end}",
            get(routes::accommodations::search_by_date),
        )
        .route(
            "/api/accommodations/recommendations",
            post(routes::accommodations::recommendations),
        )
        .route(
            "/api/accommodations/accommodationGrades/{id}",
            get(routes::grades::list),
        )
        .route("/api/accommodations/sagas/{id}", get(routes::sagas::status))
        .route("/api/accommodations/read/{file_name}", get(routes::assets::read));

    Router::new()
        .merge(host_only)
        .merge(guest_only)
        .merge(public)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Running pieces produced by [`build`].
pub struct Components {
    pub state: Arc<AppState>,
    pub channel: InMemoryChannel,
    pub store: Arc<InMemoryAccommodationStore>,
    /// Subscription of the accommodation service side of the saga.
    pub handler_subscription: Subscription,
}

impl Components {
    /// Drains in-flight sagas, then detaches the participant and closes the
    /// channel. Returns the number of sagas that did not finish in time.
    pub async fn shutdown(self, grace: std::time::Duration) -> usize {
        let unfinished = self.state.orchestrator.shutdown(grace).await;
        self.handler_subscription.unsubscribe();
        self.channel.close();
        unfinished
    }
}

/// Wires the store, saga participants, auth guard and asset cache.
pub async fn build<A>(
    config: &Config,
    authority: Arc<dyn Authority>,
    assets: Arc<A>,
) -> Result<Components, StartupError>
where
    A: AssetStore + BackingStore<Error = AssetError> + 'static,
{
    let store = Arc::new(InMemoryAccommodationStore::new());
    let dyn_store: Arc<dyn AccommodationStore> = store.clone();
    // No message history: nothing reads it in a running service.
    let channel = InMemoryChannel::with_history(0);
    let transport: Arc<dyn MessageChannel> = Arc::new(channel.clone());
    let subjects = config.subjects();

    let handler = Arc::new(CreateAccommodationHandler::new(
        dyn_store.clone(),
        transport.clone(),
        subjects.clone(),
    ));
    let handler_subscription = handler.listen().await?;

    let orchestrator = SagaOrchestrator::new(transport, subjects, config.retry_policy())
        .with_compensation(
            saga::create_accommodation::STEP_CREATE_ACCOMMODATION,
            Arc::new(RemoveCreatedAccommodation::new(dyn_store.clone())),
        );
    orchestrator.listen().await?;

    let breaker = Arc::new(CircuitBreaker::new(config.breaker_settings()));
    let asset_store: Arc<dyn AssetStore> = assets.clone();
    let backing: Arc<dyn BackingStore<Error = AssetError>> = assets;

    let state = Arc::new(AppState {
        accommodations: AccommodationService::new(dyn_store),
        orchestrator,
        auth: AuthGuard::new(authority, breaker),
        assets: asset_store,
        asset_cache: ReadThroughCache::new(backing, config.cache_settings()),
        create_wait: config.create_wait,
    });

    tracing::info!(
        command_subject = %config.command_subject,
        reply_subject = %config.reply_subject,
        "application wired"
    );

    Ok(Components {
        state,
        channel,
        store,
        handler_subscription,
    })
}

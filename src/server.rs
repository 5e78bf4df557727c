use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing,
};
use rearch::Container;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    api::{self, CreateShortUrlPayload},
    registry::ResolveError,
    url_service::{CreateShortUrlError, GetStatsError, url_service_capsule},
};

/// Path segment of the create and stats routes, which is also a valid shortcode.
const SHORTURLS: &str = "shorturls";

/// Routes of the service. axum prefers static segments over captures, so
/// `GET /shorturls` is routed explicitly to the redirect of that shortcode.
pub fn router(container: Container) -> Router {
    Router::new()
        .route(
            "/shorturls",
            routing::post(create_short_url).get(redirect_shorturls),
        )
        .route("/shorturls/{code}", routing::get(get_stats))
        .route("/{code}", routing::get(redirect))
        .with_state(container)
}

fn error_response(status: StatusCode, error: String, error_id: Uuid) -> Response {
    (
        status,
        Json(api::Error {
            error,
            error_id: error_id.to_string(),
        }),
    )
        .into_response()
}

#[instrument(skip(container))]
async fn create_short_url(
    State(container): State<Container>,
    payload: Result<Json<CreateShortUrlPayload>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            let err_uuid = Uuid::new_v4();
            info!(?err_uuid, ?rejection, "User submitted a malformed request body");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text(), err_uuid);
        }
    };

    match container
        .read(url_service_capsule)
        .create_short_url(payload)
        .await
    {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(error) => {
            let err_uuid = Uuid::new_v4();
            match error {
                CreateShortUrlError::ShortcodeTaken(_) => {
                    info!(?err_uuid, ?error, "Shortcode exists under a different entry");
                    error_response(StatusCode::CONFLICT, error.to_string(), err_uuid)
                }
                CreateShortUrlError::MissingUrl | CreateShortUrlError::ValidityOutOfRange(_) => {
                    info!(?err_uuid, ?error, "User submitted a bad request");
                    error_response(StatusCode::BAD_REQUEST, error.to_string(), err_uuid)
                }
                CreateShortUrlError::Internal(_) => {
                    error!(?err_uuid, ?error, "Encountered an error during a request");
                    error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_owned(),
                        err_uuid,
                    )
                }
            }
        }
    }
}

#[instrument(skip(container))]
async fn get_stats(State(container): State<Container>, Path(code): Path<String>) -> Response {
    match container.read(url_service_capsule).get_stats(&code).await {
        Ok(stats) => Json(stats).into_response(),
        Err(error) => {
            let err_uuid = Uuid::new_v4();
            match error {
                GetStatsError::NotFound => {
                    info!(?err_uuid, %code, "Statistics requested for unknown shortcode");
                    error_response(StatusCode::NOT_FOUND, error.to_string(), err_uuid)
                }
                GetStatsError::Internal(_) => {
                    error!(?err_uuid, ?error, "Encountered an error during a request");
                    error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_owned(),
                        err_uuid,
                    )
                }
            }
        }
    }
}

#[instrument(skip(container, headers))]
async fn redirect(
    State(container): State<Container>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Response {
    resolve_redirect(&container, &code, &headers).await
}

#[instrument(skip(container, headers))]
async fn redirect_shorturls(State(container): State<Container>, headers: HeaderMap) -> Response {
    resolve_redirect(&container, SHORTURLS, &headers).await
}

async fn resolve_redirect(container: &Container, code: &str, headers: &HeaderMap) -> Response {
    let referrer = headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    match container
        .read(url_service_capsule)
        .redirect(code, referrer)
        .await
    {
        Ok(api::Redirect { url }) => (StatusCode::FOUND, [(header::LOCATION, url)]).into_response(),
        Err(ResolveError::NotFound) => {
            let err_uuid = Uuid::new_v4();
            info!(?err_uuid, %code, "Redirect requested for unknown shortcode");
            error_response(
                StatusCode::NOT_FOUND,
                "Shortcode not found.".to_owned(),
                err_uuid,
            )
        }
        Err(ResolveError::Expired) => {
            let err_uuid = Uuid::new_v4();
            info!(?err_uuid, %code, "Redirect requested for expired shortcode");
            error_response(
                StatusCode::GONE,
                "This link has expired.".to_owned(),
                err_uuid,
            )
        }
    }
}

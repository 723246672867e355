//! HTTP routes for Krishi Sakhi
//!
//! Every `/api` request goes through [`admit_request`] (identity resolution
//! and admission, from the request head alone) and then [`dispatch`].
//! Handlers return `Result` and errors are shaped into
//! `{"success": false, "error", "code"}` bodies here.

pub mod alerts;
pub mod farm;
pub mod health;
pub mod market;
pub mod schemes;

pub use health::{health_check, readiness_check, version_info};

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};

use crate::admission::{Decision, RouteClass};
use crate::identity::resolve_client_id;
use crate::server::AppState;
use crate::store::Page;
use crate::types::{Result, SakhiError};

pub type FullBody = Full<Bytes>;

/// Known `/api` endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRoute {
    GetFarmProfile,
    SaveFarmProfile,
    ListActivities,
    AddActivity,
    DeleteActivity(String),
    ListSchemes,
    EligibleSchemes,
    MyApplications,
    GetScheme(String),
    ApplyScheme(String),
    ListAlerts,
    MarkAlertRead(String),
    MarkAllAlertsRead,
    GenerateAlerts,
    DeleteAlert(String),
    MarketPrices,
    ListListings,
    CreateListing,
    MyListings,
    UpdateListing(String),
    DeleteListing(String),
    InquireListing(String),
}

impl ApiRoute {
    pub fn parse(method: &Method, path: &str) -> Option<Self> {
        let rest = path.strip_prefix("/api/")?;
        let segments: Vec<&str> = rest.trim_end_matches('/').split('/').collect();

        let route = match (method.clone(), segments.as_slice()) {
            (Method::GET, ["farm", "profile"]) => Self::GetFarmProfile,
            (Method::POST, ["farm", "profile"]) => Self::SaveFarmProfile,
            (Method::GET, ["farm", "activities"]) => Self::ListActivities,
            (Method::POST, ["farm", "activities"]) => Self::AddActivity,
            (Method::DELETE, ["farm", "activities", id]) => Self::DeleteActivity(decode(id)),

            (Method::GET, ["schemes"]) => Self::ListSchemes,
            (Method::GET, ["schemes", "eligible"]) => Self::EligibleSchemes,
            (Method::GET, ["schemes", "applications", "my"]) => Self::MyApplications,
            (Method::GET, ["schemes", id]) => Self::GetScheme(decode(id)),
            (Method::POST, ["schemes", id, "apply"]) => Self::ApplyScheme(decode(id)),

            (Method::GET, ["alerts"]) => Self::ListAlerts,
            (Method::PATCH, ["alerts", "read-all"]) => Self::MarkAllAlertsRead,
            (Method::PATCH, ["alerts", id, "read"]) => Self::MarkAlertRead(decode(id)),
            (Method::POST, ["alerts", "generate"]) => Self::GenerateAlerts,
            (Method::DELETE, ["alerts", id]) => Self::DeleteAlert(decode(id)),

            (Method::GET, ["market", "prices"]) => Self::MarketPrices,
            (Method::GET, ["market", "listings"]) => Self::ListListings,
            (Method::POST, ["market", "listings"]) => Self::CreateListing,
            (Method::GET, ["market", "listings", "my"]) => Self::MyListings,
            (Method::PUT, ["market", "listings", id]) => Self::UpdateListing(decode(id)),
            (Method::DELETE, ["market", "listings", id]) => Self::DeleteListing(decode(id)),
            (Method::POST, ["market", "listings", id, "inquire"]) => {
                Self::InquireListing(decode(id))
            }

            _ => return None,
        };
        Some(route)
    }

    /// Admission class charged for this endpoint
    pub fn class(&self) -> RouteClass {
        match self {
            Self::GetFarmProfile
            | Self::ListActivities
            | Self::ListSchemes
            | Self::EligibleSchemes
            | Self::MyApplications
            | Self::GetScheme(_)
            | Self::ListAlerts
            | Self::MarketPrices
            | Self::ListListings
            | Self::MyListings => RouteClass::Read,

            Self::AddActivity | Self::MarkAlertRead(_) | Self::InquireListing(_) => {
                RouteClass::Write
            }

            Self::SaveFarmProfile
            | Self::DeleteActivity(_)
            | Self::ApplyScheme(_)
            | Self::MarkAllAlertsRead
            | Self::DeleteAlert(_)
            | Self::CreateListing
            | Self::UpdateListing(_)
            | Self::DeleteListing(_) => RouteClass::Submit,

            Self::GenerateAlerts => RouteClass::Generate,
        }
    }
}

/// Class charged for `/api` paths that match no endpoint
fn unmatched_class(method: &Method) -> RouteClass {
    if method == Method::GET || method == Method::HEAD {
        RouteClass::Read
    } else {
        RouteClass::Write
    }
}

fn decode(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

/// Per-request data handed to handlers
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: String,
    pub query: Option<String>,
    pub body: Bytes,
}

impl RequestContext {
    /// Deserialize the query string; a missing query yields all-default params
    pub fn query<T: DeserializeOwned>(&self) -> Result<T> {
        serde_urlencoded::from_str(self.query.as_deref().unwrap_or(""))
            .map_err(|e| SakhiError::BadRequest(format!("Invalid query string: {}", e)))
    }

    /// Deserialize the JSON body
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.body.is_empty() {
            return Err(SakhiError::BadRequest("Request body is required".into()));
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// `page`/`limit` query parameters
#[derive(Debug, Default, serde::Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page::new(self.page.unwrap_or(1), self.limit.unwrap_or(20))
    }
}

pub fn pagination_json(page: Page, total: u64) -> serde_json::Value {
    serde_json::json!({
        "page": page.page,
        "limit": page.limit,
        "total": total,
        "pages": page.pages(total),
    })
}

/// An `/api` request that passed admission and matched an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedRequest {
    pub client_id: String,
    pub route: ApiRoute,
}

/// Resolve identity, classify the route and charge admission. Needs only the
/// request head, so the server runs it before reading the body. Unmatched
/// paths are charged first and then answered with 404.
pub fn admit_request(
    state: &AppState,
    parts: &Parts,
) -> std::result::Result<AdmittedRequest, Response<FullBody>> {
    let client_id = resolve_client_id(&parts.headers);
    let route = ApiRoute::parse(&parts.method, parts.uri.path());
    let class = route
        .as_ref()
        .map(ApiRoute::class)
        .unwrap_or_else(|| unmatched_class(&parts.method));

    if let Decision::Rejected { retry_after_secs } = state.admission.admit(&client_id, class) {
        warn!(
            client_id = %client_id,
            class = %class,
            retry_after_secs,
            "Rate limit exceeded"
        );
        return Err(rate_limited_response(retry_after_secs));
    }

    match route {
        Some(route) => Ok(AdmittedRequest { client_id, route }),
        None => Err(not_found_response(parts.uri.path())),
    }
}

/// Run the handler for an admitted request
pub async fn dispatch(
    state: &AppState,
    admitted: AdmittedRequest,
    parts: &Parts,
    body: Bytes,
) -> Response<FullBody> {
    let ctx = RequestContext {
        user_id: admitted.client_id,
        query: parts.uri.query().map(str::to_string),
        body,
    };

    let result = match admitted.route {
        ApiRoute::GetFarmProfile => farm::get_profile(state, &ctx).await,
        ApiRoute::SaveFarmProfile => farm::save_profile(state, &ctx).await,
        ApiRoute::ListActivities => farm::list_activities(state, &ctx).await,
        ApiRoute::AddActivity => farm::add_activity(state, &ctx).await,
        ApiRoute::DeleteActivity(id) => farm::delete_activity(state, &ctx, &id).await,
        ApiRoute::ListSchemes => schemes::list_schemes(state),
        ApiRoute::EligibleSchemes => schemes::eligible_schemes(state, &ctx).await,
        ApiRoute::MyApplications => schemes::my_applications(state, &ctx).await,
        ApiRoute::GetScheme(id) => schemes::get_scheme(state, &ctx, &id).await,
        ApiRoute::ApplyScheme(id) => schemes::apply(state, &ctx, &id).await,
        ApiRoute::ListAlerts => alerts::list_alerts(state, &ctx).await,
        ApiRoute::MarkAlertRead(id) => alerts::mark_read(state, &ctx, &id).await,
        ApiRoute::MarkAllAlertsRead => alerts::mark_all_read(state, &ctx).await,
        ApiRoute::GenerateAlerts => alerts::generate(state, &ctx).await,
        ApiRoute::DeleteAlert(id) => alerts::delete_alert(state, &ctx, &id).await,
        ApiRoute::MarketPrices => market::get_prices(&ctx),
        ApiRoute::ListListings => market::list_listings(state, &ctx).await,
        ApiRoute::CreateListing => market::create_listing(state, &ctx).await,
        ApiRoute::MyListings => market::my_listings(state, &ctx).await,
        ApiRoute::UpdateListing(id) => market::update_listing(state, &ctx, &id).await,
        ApiRoute::DeleteListing(id) => market::delete_listing(state, &ctx, &id).await,
        ApiRoute::InquireListing(id) => market::inquire(state, &ctx, &id).await,
    };

    result.unwrap_or_else(|e| error_response(&e, state.args.is_development()))
}

/// Admission, then dispatch, for a request whose body is already buffered
pub async fn handle_api(state: &AppState, req: Request<Bytes>) -> Response<FullBody> {
    let (parts, body) = req.into_parts();
    match admit_request(state, &parts) {
        Ok(admitted) => dispatch(state, admitted, &parts, body).await,
        Err(response) => response,
    }
}

// =============================================================================
// Response Helpers
// =============================================================================

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<FullBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

pub fn error_response(err: &SakhiError, development: bool) -> Response<FullBody> {
    let status = err.status_code();
    if status.is_server_error() {
        error!("Request failed: {}", err);
    }
    json_response(
        status,
        &serde_json::json!({
            "success": false,
            "error": err.public_message(development),
            "code": err.code(),
        }),
    )
}

pub fn rate_limited_response(retry_after_secs: u64) -> Response<FullBody> {
    let mut response = json_response(
        StatusCode::TOO_MANY_REQUESTS,
        &serde_json::json!({
            "success": false,
            "error": "Rate limit exceeded",
            "code": "RATE_LIMITED",
            "retryAfterSeconds": retry_after_secs,
        }),
    );
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
    response
}

pub fn not_found_response(path: &str) -> Response<FullBody> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({
            "success": false,
            "error": "Not Found",
            "code": "NOT_FOUND",
            "path": path,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_parsing() {
        assert_eq!(
            ApiRoute::parse(&Method::GET, "/api/farm/profile"),
            Some(ApiRoute::GetFarmProfile)
        );
        assert_eq!(
            ApiRoute::parse(&Method::GET, "/api/schemes/eligible/"),
            Some(ApiRoute::EligibleSchemes)
        );
        assert_eq!(
            ApiRoute::parse(&Method::GET, "/api/schemes/applications/my"),
            Some(ApiRoute::MyApplications)
        );
        assert_eq!(
            ApiRoute::parse(&Method::POST, "/api/schemes/pm-kisan/apply"),
            Some(ApiRoute::ApplyScheme("pm-kisan".into()))
        );
        assert_eq!(
            ApiRoute::parse(&Method::PATCH, "/api/alerts/read-all"),
            Some(ApiRoute::MarkAllAlertsRead)
        );
        assert_eq!(
            ApiRoute::parse(&Method::PATCH, "/api/alerts/abc/read"),
            Some(ApiRoute::MarkAlertRead("abc".into()))
        );
        assert_eq!(
            ApiRoute::parse(&Method::GET, "/api/market/listings/my"),
            Some(ApiRoute::MyListings)
        );
        assert_eq!(
            ApiRoute::parse(&Method::PUT, "/api/market/listings/abc"),
            Some(ApiRoute::UpdateListing("abc".into()))
        );
        assert_eq!(
            ApiRoute::parse(&Method::POST, "/api/market/listings/abc/inquire"),
            Some(ApiRoute::InquireListing("abc".into()))
        );
        assert_eq!(ApiRoute::parse(&Method::PUT, "/api/farm/profile"), None);
        assert_eq!(ApiRoute::parse(&Method::GET, "/health"), None);
    }

    #[test]
    fn test_route_classes() {
        assert_eq!(ApiRoute::ListSchemes.class(), RouteClass::Read);
        assert_eq!(ApiRoute::AddActivity.class(), RouteClass::Write);
        assert_eq!(ApiRoute::ApplyScheme("x".into()).class(), RouteClass::Submit);
        assert_eq!(ApiRoute::SaveFarmProfile.class(), RouteClass::Submit);
        assert_eq!(ApiRoute::GenerateAlerts.class(), RouteClass::Generate);
        assert_eq!(ApiRoute::MarketPrices.class(), RouteClass::Read);
        assert_eq!(ApiRoute::CreateListing.class(), RouteClass::Submit);
        assert_eq!(ApiRoute::InquireListing("x".into()).class(), RouteClass::Write);
        assert_eq!(unmatched_class(&Method::GET), RouteClass::Read);
        assert_eq!(unmatched_class(&Method::POST), RouteClass::Write);
    }

    #[test]
    fn test_path_segments_are_decoded() {
        assert_eq!(
            ApiRoute::parse(&Method::GET, "/api/schemes/crop%20insurance"),
            Some(ApiRoute::GetScheme("crop insurance".into()))
        );
    }

    #[test]
    fn test_rate_limited_response_shape() {
        let response = rate_limited_response(50);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "50");
    }

    #[test]
    fn test_query_parsing() {
        let ctx = RequestContext {
            user_id: "u".into(),
            query: Some("page=2&limit=5".into()),
            body: Bytes::new(),
        };
        let q: PageQuery = ctx.query().unwrap();
        assert_eq!(q.page(), Page::new(2, 5));

        let bad = RequestContext { query: Some("page=two".into()), ..ctx };
        assert!(bad.query::<PageQuery>().is_err());
    }
}

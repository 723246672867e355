//! Scheme catalog, eligibility and application endpoints

use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{json_response, FullBody, RequestContext};
use crate::db::schemas::{ApplicationDoc, ApplicationFarmData, ApplicationStatus};
use crate::eligibility::{eligible_for, with_application_status, EligibilityOutcome, Scheme};
use crate::server::AppState;
use crate::types::{Result, SakhiError};

/// Most applications returned by the "my applications" listing
pub const MAX_LISTED_APPLICATIONS: u64 = 50;

pub const SETUP_INCOMPLETE_CODE: &str = "FARM_SETUP_INCOMPLETE";

/// Scheme annotated with the caller's application state
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemeView<'a> {
    #[serde(flatten)]
    pub scheme: &'a Scheme,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_status: Option<ApplicationStatus>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationView {
    pub id: Option<String>,
    pub scheme_id: String,
    pub scheme_name: String,
    pub status: ApplicationStatus,
    pub applied_at: String,
    pub farm_data: FarmDataView,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmDataView {
    pub land_size: f64,
    pub crop: crate::db::schemas::Crop,
    pub location: String,
}

impl From<&ApplicationDoc> for ApplicationView {
    fn from(app: &ApplicationDoc) -> Self {
        Self {
            id: app._id.map(|id| id.to_hex()),
            scheme_id: app.scheme_id.clone(),
            scheme_name: app.scheme_name.clone(),
            status: app.status,
            applied_at: crate::db::schemas::to_rfc3339(app.applied_at),
            farm_data: FarmDataView {
                land_size: app.farm_data.land_size,
                crop: app.farm_data.crop,
                location: app.farm_data.location.clone(),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct EligibleQuery {
    unapplied: Option<bool>,
}

/// GET /api/schemes
pub fn list_schemes(state: &AppState) -> Result<Response<FullBody>> {
    Ok(json_response(
        StatusCode::OK,
        &json!({ "success": true, "data": state.catalog.schemes() }),
    ))
}

/// GET /api/schemes/eligible[?unapplied=true]
pub async fn eligible_schemes(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<Response<FullBody>> {
    let query: EligibleQuery = ctx.query()?;

    let snapshot = state.stores.farms.farm_snapshot(&ctx.user_id).await?;
    let context = snapshot.map(|s| s.context());

    let eligible = match eligible_for(context.as_ref(), &state.catalog) {
        EligibilityOutcome::SetupIncomplete => {
            return Ok(json_response(
                StatusCode::OK,
                &json!({
                    "success": true,
                    "data": [],
                    "code": SETUP_INCOMPLETE_CODE,
                    "message": "Complete farm setup to see eligible schemes",
                }),
            ));
        }
        EligibilityOutcome::Eligible(schemes) => schemes,
    };

    let applied = state
        .stores
        .applications
        .applied_scheme_ids(&ctx.user_id)
        .await?;
    let unapplied_only = query.unapplied.unwrap_or(false);

    let data: Vec<SchemeView> = with_application_status(&eligible, &applied)
        .into_iter()
        .filter(|(_, applied)| !(unapplied_only && *applied))
        .map(|(scheme, applied)| SchemeView {
            scheme,
            applied,
            application_status: None,
        })
        .collect();

    Ok(json_response(
        StatusCode::OK,
        &json!({ "success": true, "data": data }),
    ))
}

/// GET /api/schemes/applications/my
pub async fn my_applications(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<Response<FullBody>> {
    let applications = state
        .stores
        .applications
        .list_applications(&ctx.user_id, MAX_LISTED_APPLICATIONS)
        .await?;
    let data: Vec<ApplicationView> = applications.iter().map(ApplicationView::from).collect();

    Ok(json_response(
        StatusCode::OK,
        &json!({ "success": true, "data": data }),
    ))
}

fn find_scheme<'a>(state: &'a AppState, id: &str) -> Result<&'a Scheme> {
    state
        .catalog
        .find(id)
        .ok_or_else(|| SakhiError::NotFound("Scheme not found".into()))
}

/// GET /api/schemes/{id}
pub async fn get_scheme(
    state: &AppState,
    ctx: &RequestContext,
    id: &str,
) -> Result<Response<FullBody>> {
    let scheme = find_scheme(state, id)?;
    let application = state
        .stores
        .applications
        .find_application(&ctx.user_id, &scheme.id)
        .await?;

    let view = SchemeView {
        scheme,
        applied: application.is_some(),
        application_status: application.map(|a| a.status),
    };
    Ok(json_response(
        StatusCode::OK,
        &json!({ "success": true, "data": view }),
    ))
}

/// POST /api/schemes/{id}/apply
pub async fn apply(state: &AppState, ctx: &RequestContext, id: &str) -> Result<Response<FullBody>> {
    let scheme = find_scheme(state, id)?;
    if !scheme.is_active() {
        return Err(SakhiError::BadRequest(
            "Scheme is not accepting applications".into(),
        ));
    }

    let stores = &state.stores;
    if stores
        .applications
        .find_application(&ctx.user_id, &scheme.id)
        .await?
        .is_some()
    {
        return Err(SakhiError::Conflict("Already applied for this scheme".into()));
    }

    let farm = stores
        .farms
        .active_farm(&ctx.user_id)
        .await?
        .ok_or_else(|| SakhiError::BadRequest("Complete farm setup before applying".into()))?;

    let farm_data = ApplicationFarmData {
        land_size: farm.land_size,
        crop: farm.current_crop,
        location: farm.location.clone(),
    };
    let application = ApplicationDoc::pending(&ctx.user_id, &scheme.id, &scheme.display_name, farm_data);
    let saved = stores.applications.insert_application(application).await?;

    info!(user_id = %ctx.user_id, scheme = %scheme.id, "Scheme application submitted");

    Ok(json_response(
        StatusCode::CREATED,
        &json!({
            "success": true,
            "message": "Application submitted successfully",
            "data": ApplicationView::from(&saved),
        }),
    ))
}

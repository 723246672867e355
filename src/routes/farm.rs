//! Farm profile and activity endpoints

use bson::oid::ObjectId;
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::{json_response, pagination_json, FullBody, PageQuery, RequestContext};
use crate::db::schemas::{
    ActivityDoc, ActivityType, Coordinates, Crop, FarmDoc, LandUnit, SoilType,
};
use crate::server::AppState;
use crate::store::{FarmProfile, NewActivity};
use crate::types::{Result, SakhiError};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmView {
    pub id: Option<String>,
    pub name: String,
    pub location: String,
    pub land_size: f64,
    pub land_unit: LandUnit,
    pub current_crop: Crop,
    pub soil_type: SoilType,
    pub irrigation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    pub is_resident: bool,
    pub organic_certified: bool,
    pub land_certified: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<&FarmDoc> for FarmView {
    fn from(farm: &FarmDoc) -> Self {
        Self {
            id: farm._id.map(|id| id.to_hex()),
            name: farm.name.clone(),
            location: farm.location.clone(),
            land_size: farm.land_size,
            land_unit: farm.land_unit,
            current_crop: farm.current_crop,
            soil_type: farm.soil_type,
            irrigation: farm.irrigation,
            coordinates: farm.coordinates,
            is_resident: farm.is_resident,
            organic_certified: farm.organic_certified,
            land_certified: farm.land_certified,
            created_at: farm.metadata.created_rfc3339(),
            updated_at: farm.metadata.updated_rfc3339(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityView {
    pub id: Option<String>,
    pub farm_id: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub crop: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub location: String,
    pub created_at: Option<String>,
}

impl From<&ActivityDoc> for ActivityView {
    fn from(activity: &ActivityDoc) -> Self {
        Self {
            id: activity._id.map(|id| id.to_hex()),
            farm_id: activity.farm_id.to_hex(),
            activity_type: activity.activity_type,
            crop: activity.crop.clone(),
            notes: activity.notes.clone(),
            location: activity.location.clone(),
            created_at: activity.metadata.created_rfc3339(),
        }
    }
}

fn farm_not_found() -> SakhiError {
    SakhiError::NotFound("Farm profile not found".into())
}

/// GET /api/farm/profile
pub async fn get_profile(state: &AppState, ctx: &RequestContext) -> Result<Response<FullBody>> {
    let farm = state
        .stores
        .farms
        .active_farm(&ctx.user_id)
        .await?
        .ok_or_else(farm_not_found)?;

    Ok(json_response(
        StatusCode::OK,
        &json!({ "success": true, "data": FarmView::from(&farm) }),
    ))
}

/// POST /api/farm/profile - create or replace
pub async fn save_profile(state: &AppState, ctx: &RequestContext) -> Result<Response<FullBody>> {
    let profile: FarmProfile = ctx.json()?;
    profile.validate()?;

    let farm = state.stores.farms.save_farm(&ctx.user_id, profile).await?;
    info!(user_id = %ctx.user_id, crop = ?farm.current_crop, "Farm profile saved");

    Ok(json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "message": "Farm profile saved successfully",
            "data": FarmView::from(&farm),
        }),
    ))
}

/// GET /api/farm/activities
pub async fn list_activities(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<Response<FullBody>> {
    let query: PageQuery = ctx.query()?;
    let page = query.page();

    let activities = state
        .stores
        .farms
        .list_activities(&ctx.user_id, page)
        .await?;
    let data: Vec<ActivityView> = activities.items.iter().map(ActivityView::from).collect();

    Ok(json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "data": data,
            "pagination": pagination_json(page, activities.total),
        }),
    ))
}

/// POST /api/farm/activities
pub async fn add_activity(state: &AppState, ctx: &RequestContext) -> Result<Response<FullBody>> {
    let activity: NewActivity = ctx.json()?;
    activity.validate()?;

    let farm = state
        .stores
        .farms
        .active_farm(&ctx.user_id)
        .await?
        .ok_or_else(farm_not_found)?;
    let farm_id = farm
        ._id
        .ok_or_else(|| SakhiError::Internal("Farm profile has no id".into()))?;

    let saved = state
        .stores
        .farms
        .add_activity(activity.into_doc(&ctx.user_id, farm_id))
        .await?;

    Ok(json_response(
        StatusCode::CREATED,
        &json!({
            "success": true,
            "message": "Activity added successfully",
            "data": ActivityView::from(&saved),
        }),
    ))
}

/// DELETE /api/farm/activities/{id}
pub async fn delete_activity(
    state: &AppState,
    ctx: &RequestContext,
    id: &str,
) -> Result<Response<FullBody>> {
    let activity_id = ObjectId::parse_str(id)?;
    let deleted = state
        .stores
        .farms
        .delete_activity(&ctx.user_id, activity_id)
        .await?;
    if !deleted {
        return Err(SakhiError::NotFound("Activity not found".into()));
    }

    Ok(json_response(
        StatusCode::OK,
        &json!({ "success": true, "message": "Activity deleted successfully" }),
    ))
}

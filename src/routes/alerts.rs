//! Alert feed endpoints and rule-based alert generation

use bson::oid::ObjectId;
use chrono::Datelike;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{json_response, pagination_json, FullBody, RequestContext};
use crate::db::schemas::{to_rfc3339, AlertDoc, AlertPriority, AlertType, Crop, FarmDoc, SoilType};
use crate::server::AppState;
use crate::store::{AlertFilter, Page};
use crate::types::{Result, SakhiError};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertView {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<Crop>,
    pub is_read: bool,
    pub created_at: Option<String>,
    pub expires_at: String,
}

impl From<&AlertDoc> for AlertView {
    fn from(alert: &AlertDoc) -> Self {
        Self {
            id: alert._id.map(|id| id.to_hex()),
            alert_type: alert.alert_type,
            priority: alert.priority,
            title: alert.title.clone(),
            message: alert.message.clone(),
            location: alert.location.clone(),
            crop: alert.crop,
            is_read: alert.is_read,
            created_at: alert.metadata.created_rfc3339(),
            expires_at: to_rfc3339(alert.expires_at),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct AlertQuery {
    page: Option<u64>,
    limit: Option<u64>,
    #[serde(rename = "type")]
    alert_type: Option<AlertType>,
    priority: Option<AlertPriority>,
    #[serde(alias = "unreadOnly")]
    unread_only: Option<bool>,
}

/// Alerts for a farm profile. `month` is 1-12; June to October adds the
/// monsoon advisory.
pub fn generate_alerts(user_id: &str, farm: &FarmDoc, month: u32) -> Vec<AlertDoc> {
    let location = farm.location.as_str();
    let crop = farm.current_crop;
    let alert = |alert_type, priority, title: &str, message: String| {
        AlertDoc::new(user_id, alert_type, priority, title, message).at(location, crop)
    };

    let mut alerts = vec![alert(
        AlertType::Weather,
        AlertPriority::High,
        "Weather Alert",
        format!(
            "Rain expected in {} area. Avoid applying fertilizers or pesticides today.",
            location
        ),
    )];

    match crop {
        Crop::Paddy => alerts.push(alert(
            AlertType::Irrigation,
            AlertPriority::Medium,
            "Irrigation Reminder",
            "Maintain water level in paddy fields. Check for proper drainage.".into(),
        )),
        Crop::Coconut => alerts.push(alert(
            AlertType::Pest,
            AlertPriority::Medium,
            "Pest Alert",
            "Check coconut trees for red palm weevil infestation. Look for holes in trunk.".into(),
        )),
        Crop::Brinjal => alerts.push(alert(
            AlertType::Pest,
            AlertPriority::High,
            "Pest Alert",
            "Brinjal shoot and fruit borer activity reported in your area. Check plants regularly."
                .into(),
        )),
        _ => {}
    }

    if farm.soil_type == SoilType::Laterite {
        alerts.push(alert(
            AlertType::Fertilizer,
            AlertPriority::Medium,
            "Soil Management",
            "Laterite soil requires organic matter. Consider adding compost or green manure."
                .into(),
        ));
    }

    if (6..=10).contains(&month) {
        alerts.push(alert(
            AlertType::Weather,
            AlertPriority::Medium,
            "Monsoon Advisory",
            "Monsoon season: Ensure proper drainage and watch for fungal diseases.".into(),
        ));
    }

    alerts.push(alert(
        AlertType::Scheme,
        AlertPriority::Low,
        "Government Scheme",
        "Kerala Farmer Assistance Scheme applications are open. Apply before the deadline.".into(),
    ));

    alerts
}

/// GET /api/alerts
pub async fn list_alerts(state: &AppState, ctx: &RequestContext) -> Result<Response<FullBody>> {
    let query: AlertQuery = ctx.query()?;
    let page = Page::new(query.page.unwrap_or(1), query.limit.unwrap_or(20));
    let filter = AlertFilter {
        alert_type: query.alert_type,
        priority: query.priority,
        unread_only: query.unread_only.unwrap_or(false),
    };

    let alerts = state.stores.alerts.list_alerts(&ctx.user_id, &filter, page).await?;
    let unread_count = state.stores.alerts.unread_count(&ctx.user_id).await?;
    let data: Vec<AlertView> = alerts.items.iter().map(AlertView::from).collect();

    Ok(json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "data": data,
            "unreadCount": unread_count,
            "pagination": pagination_json(page, alerts.total),
        }),
    ))
}

fn alert_not_found() -> SakhiError {
    SakhiError::NotFound("Alert not found".into())
}

/// PATCH /api/alerts/{id}/read
pub async fn mark_read(
    state: &AppState,
    ctx: &RequestContext,
    id: &str,
) -> Result<Response<FullBody>> {
    let alert_id = ObjectId::parse_str(id)?;
    if !state.stores.alerts.mark_read(&ctx.user_id, alert_id).await? {
        return Err(alert_not_found());
    }
    Ok(json_response(
        StatusCode::OK,
        &json!({ "success": true, "message": "Alert marked as read" }),
    ))
}

/// PATCH /api/alerts/read-all
pub async fn mark_all_read(state: &AppState, ctx: &RequestContext) -> Result<Response<FullBody>> {
    let updated = state.stores.alerts.mark_all_read(&ctx.user_id).await?;
    Ok(json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "message": "All alerts marked as read",
            "updated": updated,
        }),
    ))
}

/// POST /api/alerts/generate
pub async fn generate(state: &AppState, ctx: &RequestContext) -> Result<Response<FullBody>> {
    let farm = state
        .stores
        .farms
        .active_farm(&ctx.user_id)
        .await?
        .ok_or_else(|| SakhiError::NotFound("Farm profile not found".into()))?;

    let month = chrono::Utc::now().month();
    let alerts = generate_alerts(&ctx.user_id, &farm, month);
    let saved = state.stores.alerts.insert_alerts(alerts).await?;
    info!(user_id = %ctx.user_id, count = saved.len(), "Generated alerts");

    let data: Vec<AlertView> = saved.iter().map(AlertView::from).collect();
    Ok(json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "message": format!("Generated {} alerts", saved.len()),
            "data": data,
        }),
    ))
}

/// DELETE /api/alerts/{id}
pub async fn delete_alert(
    state: &AppState,
    ctx: &RequestContext,
    id: &str,
) -> Result<Response<FullBody>> {
    let alert_id = ObjectId::parse_str(id)?;
    if !state.stores.alerts.deactivate_alert(&ctx.user_id, alert_id).await? {
        return Err(alert_not_found());
    }
    Ok(json_response(
        StatusCode::OK,
        &json!({ "success": true, "message": "Alert deleted successfully" }),
    ))
}

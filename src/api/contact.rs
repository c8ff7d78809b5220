use axum::{Json, extract::State};
use std::sync::Arc;

use super::validation::validate_contact;
use super::{ApiError, ApiResponse, AppState, ContactRequest, MessageResponse};
use crate::services::notify::contact_email;

/// POST /contact
/// Relays a public contact form submission to the front desk.
pub async fn submit_contact(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ContactRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let submission = validate_contact(payload)?;

    let message = contact_email(
        &submission,
        &state.config().notifications.contact_recipients,
    );
    state.relay().send(message).await?;

    metrics::counter!("contact_messages_total").increment(1);
    tracing::info!(subject = %submission.subject, "Contact message relayed");

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Message envoyé",
    ))))
}

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use application::{ApplicationError, CreateBookingRequest, PaymentResolution, PayoutOverviewEntry};
use domain::{
    Booking, BookingFilter, BookingId, BookingState, CancelActor, Counsellor, CounsellorFilter,
    CounsellorId, Feedback, Money, PaymentAttempt, PaymentMethod, PaymentOutcome, PayoutRecord,
    PayoutSummary, Slot, StudentId, TimeRange, Timestamp,
};

use crate::{error::ApiError, state::AppState};

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct CounsellorListQuery {
    tag: Option<String>,
    institution: Option<String>,
    #[serde(default)]
    include_inactive: bool,
}

#[derive(Debug, Deserialize)]
struct SlotsQuery {
    from: Timestamp,
    to: Timestamp,
}

#[derive(Debug, Deserialize)]
struct CreateBookingPayload {
    counsellor_id: String,
    student_id: String,
    student_name: Option<String>,
    student_email: Option<String>,
    student_whatsapp: Option<String>,
    slot_start: Timestamp,
}

#[derive(Debug, Deserialize)]
struct BookingListQuery {
    counsellor_id: Option<String>,
    student_id: Option<String>,
    state: Option<BookingState>,
}

#[derive(Debug, Deserialize)]
struct InitiatePaymentPayload {
    method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
struct PaymentResultPayload {
    outcome: PaymentOutcome,
}

#[derive(Debug, Deserialize)]
struct CancelPayload {
    actor: CancelActor,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedbackPayload {
    rating: i64,
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedbackListQuery {
    counsellor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordPayoutPayload {
    amount_minor: i64,
    currency: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `*` 表示允许任意来源
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/counsellors", get(list_counsellors))
        .route("/counsellors/{counsellor_id}", get(get_counsellor))
        .route("/counsellors/{counsellor_id}/slots", get(available_slots))
        .route(
            "/counsellors/{counsellor_id}/payouts",
            get(payout_summary).post(record_payout),
        )
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/{booking_id}", get(get_booking))
        .route("/bookings/{booking_id}/payments", post(initiate_payment))
        .route("/bookings/{booking_id}/cancel", post(cancel_booking))
        .route("/bookings/{booking_id}/feedback", post(submit_feedback))
        .route("/payments/{handle}/result", post(payment_result))
        .route("/feedback", get(list_feedback))
        .route("/admin/payouts", get(payout_overview))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

fn counsellor_id(raw: String) -> ApiResult<CounsellorId> {
    CounsellorId::parse(raw).map_err(|err| ApplicationError::from(err).into())
}

async fn list_counsellors(
    State(state): State<AppState>,
    query: Result<Query<CounsellorListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Counsellor>>> {
    let Query(query) = query?;
    let filter = CounsellorFilter {
        specialty_tag: query.tag,
        institution: query.institution,
        include_inactive: query.include_inactive,
    };
    Ok(Json(state.directory.list_counsellors(&filter).await?))
}

async fn get_counsellor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Counsellor>> {
    let id = counsellor_id(id)?;
    Ok(Json(state.directory.get_counsellor(&id).await?))
}

async fn available_slots(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<SlotsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Slot>>> {
    let Query(query) = query?;
    let id = counsellor_id(id)?;
    let window = TimeRange::new(query.from, query.to).map_err(ApplicationError::from)?;
    Ok(Json(state.availability.get_available_slots(&id, window).await?))
}

async fn create_booking(
    State(state): State<AppState>,
    payload: Result<Json<CreateBookingPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Booking>)> {
    let Json(payload) = payload?;
    let booking = state
        .ledger
        .create(CreateBookingRequest {
            counsellor_id: payload.counsellor_id,
            student_id: payload.student_id,
            student_name: payload.student_name,
            student_email: payload.student_email,
            student_whatsapp: payload.student_whatsapp,
            slot_start: payload.slot_start,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn list_bookings(
    State(state): State<AppState>,
    query: Result<Query<BookingListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Booking>>> {
    let Query(query) = query?;
    let filter = BookingFilter {
        counsellor_id: query.counsellor_id.map(counsellor_id).transpose()?,
        student_id: query
            .student_id
            .map(StudentId::parse)
            .transpose()
            .map_err(ApplicationError::from)?,
        state: query.state,
    };
    Ok(Json(state.ledger.list_bookings(filter).await?))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<Json<Booking>> {
    Ok(Json(
        state.ledger.get_booking(BookingId::from(booking_id)).await?,
    ))
}

async fn initiate_payment(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    payload: Result<Json<InitiatePaymentPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PaymentAttempt>)> {
    let Json(payload) = payload?;
    let attempt = state
        .payments
        .initiate_payment(BookingId::from(booking_id), payload.method)
        .await?;
    Ok((StatusCode::CREATED, Json(attempt)))
}

async fn payment_result(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    payload: Result<Json<PaymentResultPayload>, JsonRejection>,
) -> ApiResult<Json<PaymentResolution>> {
    let Json(payload) = payload?;
    Ok(Json(
        state
            .payments
            .on_payment_result(&handle, payload.outcome)
            .await?,
    ))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    payload: Result<Json<CancelPayload>, JsonRejection>,
) -> ApiResult<Json<Booking>> {
    let Json(payload) = payload?;
    if payload.actor == CancelActor::System {
        return Err(ApiError::bad_request("actor must be student or counsellor"));
    }
    Ok(Json(
        state
            .ledger
            .cancel(BookingId::from(booking_id), payload.actor, payload.reason)
            .await?,
    ))
}

async fn submit_feedback(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    payload: Result<Json<FeedbackPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Feedback>)> {
    let Json(payload) = payload?;
    let feedback = state
        .feedback
        .submit_feedback(BookingId::from(booking_id), payload.rating, payload.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

async fn list_feedback(
    State(state): State<AppState>,
    query: Result<Query<FeedbackListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Feedback>>> {
    let Query(query) = query?;
    let counsellor = query.counsellor_id.map(counsellor_id).transpose()?;
    Ok(Json(state.feedback.list_feedback(counsellor).await?))
}

async fn payout_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PayoutSummary>> {
    let id = counsellor_id(id)?;
    Ok(Json(state.payouts.compute_payout_summary(&id).await?))
}

async fn record_payout(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<RecordPayoutPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PayoutRecord>)> {
    let Json(payload) = payload?;
    let id = counsellor_id(id)?;
    let currency = payload.currency.unwrap_or_else(|| state.currency.clone());
    let amount = Money::new(payload.amount_minor, currency).map_err(ApplicationError::from)?;
    let record = state.payouts.record_payout(&id, amount).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn payout_overview(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<PayoutOverviewEntry>>> {
    Ok(Json(state.payouts.payout_overview().await?))
}

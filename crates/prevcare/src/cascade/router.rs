use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::art::{ArtError, ArtPatient, ClinicVisit};
use super::assessment::{Assessment, AssessmentError};
use super::audit::AuditTrail;
use super::billing::{BillingError, PatientBillingSummary};
use super::domain::{
    AssessmentId, PatientId, Principal, ProgramRole, ReferralId, TestCenterId, TestOutcome,
    TestResultId,
};
use super::messaging::NotificationDispatcher;
use super::referral::{Referral, ReferralError};
use super::repository::{
    ArtStore, AssessmentStore, BillingStore, PatientRegistry, ReferralStore, RepositoryError,
    ResultStore,
};
use super::results::{RecordedOutcome, ResultError, TestKind, TestResult};
use super::CascadeServices;

/// Router builder exposing the cascade API surface.
pub fn cascade_router<S, B, A, N>(services: Arc<CascadeServices<S, B, A, N>>) -> Router
where
    S: AssessmentStore + ReferralStore + ResultStore + ArtStore + 'static,
    B: BillingStore + PatientRegistry + 'static,
    A: AuditTrail + 'static,
    N: NotificationDispatcher + 'static,
{
    Router::new()
        .route(
            "/api/v1/assessments",
            post(start_assessment_handler::<S, B, A, N>),
        )
        .route(
            "/api/v1/assessments/:assessment_id",
            get(get_assessment_handler::<S, B, A, N>),
        )
        .route(
            "/api/v1/assessments/:assessment_id/responses",
            post(submit_response_handler::<S, B, A, N>),
        )
        .route(
            "/api/v1/referrals/:referral_id",
            get(get_referral_handler::<S, B, A, N>),
        )
        .route(
            "/api/v1/referrals/:referral_id/transitions",
            post(referral_transition_handler::<S, B, A, N>),
        )
        .route(
            "/api/v1/referrals/:referral_id/result",
            post(record_result_handler::<S, B, A, N>),
        )
        .route(
            "/api/v1/results/:result_id/confirm",
            post(confirm_result_handler::<S, B, A, N>),
        )
        .route("/api/v1/art/:patient_id", get(get_art_handler::<S, B, A, N>))
        .route(
            "/api/v1/art/:patient_id/visits",
            post(clinic_visit_handler::<S, B, A, N>),
        )
        .route(
            "/api/v1/art/:patient_id/adherence",
            get(adherence_level_handler::<S, B, A, N>).post(log_adherence_handler::<S, B, A, N>),
        )
        .route(
            "/api/v1/patients/:patient_id/billing",
            get(billing_summary_handler::<S, B, A, N>),
        )
        .route(
            "/api/v1/billing/export.csv",
            get(billing_csv_handler::<S, B, A, N>),
        )
        .with_state(services)
}

// ---------------------------------------------------------------------------
// request payloads and response views

#[derive(Debug, Deserialize)]
pub struct StartAssessmentRequest {
    pub patient_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponseRequest {
    pub question_key: String,
    pub answer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralAction {
    Sent,
    Received,
    Schedule,
    NoShow,
    Cancel,
}

#[derive(Debug, Deserialize)]
pub struct ReferralTransitionRequest {
    pub action: ReferralAction,
    #[serde(default)]
    pub test_center_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordResultRequest {
    pub outcome: TestOutcome,
    pub kind: TestKind,
    pub test_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ClinicVisitRequest {
    #[serde(default)]
    pub regimen: Option<String>,
    #[serde(default)]
    pub next_appointment: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct AdherenceRequest {
    pub date: NaiveDate,
    pub doses_missed: u8,
}

#[derive(Debug, Serialize)]
pub struct AssessmentView {
    pub assessment_id: String,
    pub patient_id: String,
    pub status: &'static str,
    pub answered: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_tier: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral: Option<ReferralView>,
}

impl AssessmentView {
    fn from_assessment(assessment: &Assessment, referral: Option<ReferralView>) -> Self {
        let now = Utc::now();
        Self {
            assessment_id: assessment.id.0.clone(),
            patient_id: assessment.patient_id.0.clone(),
            status: if assessment.is_expired(now) {
                "expired"
            } else {
                assessment.status.label()
            },
            answered: assessment.responses.len(),
            total_score: assessment.total_score,
            risk_tier: assessment.risk_tier.map(|tier| tier.label()),
            referral,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReferralView {
    pub referral_id: String,
    pub code: String,
    pub patient_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_center_id: Option<String>,
    pub expires_on: NaiveDate,
}

impl ReferralView {
    fn from_referral(referral: &Referral) -> Self {
        Self {
            referral_id: referral.id.0.clone(),
            code: referral.code.clone(),
            patient_id: referral.patient_id.0.clone(),
            status: referral.effective_status_label(Utc::now()),
            test_center_id: referral.test_center_id.as_ref().map(|id| id.0.clone()),
            expires_on: referral.expires_at.date_naive(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResultView {
    pub result_id: String,
    pub referral_id: String,
    pub patient_id: String,
    pub outcome: &'static str,
    pub kind: &'static str,
    pub test_date: NaiveDate,
    pub confirmed: bool,
}

impl ResultView {
    fn from_result(result: &TestResult) -> Self {
        Self {
            result_id: result.id.0.clone(),
            referral_id: result.referral_id.0.clone(),
            patient_id: result.patient_id.0.clone(),
            outcome: result.outcome.label(),
            kind: result.kind.label(),
            test_date: result.test_date,
            confirmed: result.confirmed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ArtView {
    pub art_id: String,
    pub patient_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regimen: Option<String>,
    pub enrolled_on: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_on: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_appointment: Option<NaiveDate>,
}

impl ArtView {
    fn from_record(record: &ArtPatient) -> Self {
        Self {
            art_id: record.id.0.clone(),
            patient_id: record.patient_id.0.clone(),
            status: record.status.label(),
            regimen: record.regimen.clone(),
            enrolled_on: record.enrolled_on,
            started_on: record.started_on,
            next_appointment: record.next_appointment,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordedResultView {
    pub result: ResultView,
    pub referral_status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment: Option<ArtView>,
}

impl RecordedResultView {
    fn from_outcome(outcome: &RecordedOutcome) -> Self {
        Self {
            result: ResultView::from_result(&outcome.result),
            referral_status: outcome.referral_status.label(),
            enrollment: outcome.enrollment.as_ref().map(ArtView::from_record),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BillingSummaryView {
    #[serde(flatten)]
    pub summary: PatientBillingSummary,
    pub remaining: u32,
}

/// Principal resolved by the identity collaborator upstream; an absent
/// header falls back to the system principal.
fn principal_from_headers(headers: &HeaderMap) -> Principal {
    let actor = headers
        .get("x-acting-principal")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let role = headers
        .get("x-acting-role")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| match value {
            "counselor" => Some(ProgramRole::Counselor),
            "clinician" => Some(ProgramRole::Clinician),
            "billing_officer" => Some(ProgramRole::BillingOfficer),
            "program_admin" => Some(ProgramRole::ProgramAdmin),
            _ => None,
        });

    match actor {
        Some(actor) => Principal::new(actor, role.unwrap_or(ProgramRole::System)),
        None => Principal::system(),
    }
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, axum::Json(json!({ "error": message }))).into_response()
}

fn assessment_error(error: AssessmentError) -> Response {
    let status = match &error {
        AssessmentError::DuplicateAssessment | AssessmentError::Closed { .. } => {
            StatusCode::CONFLICT
        }
        AssessmentError::NotFound => StatusCode::NOT_FOUND,
        AssessmentError::UnknownQuestion { .. } | AssessmentError::AlreadyAnswered { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AssessmentError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        AssessmentError::Scoring(_)
        | AssessmentError::Referral(_)
        | AssessmentError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_body(status, error.to_string())
}

fn referral_error(error: ReferralError) -> Response {
    let status = match &error {
        ReferralError::NotFound => StatusCode::NOT_FOUND,
        ReferralError::NotOpen { .. } | ReferralError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        ReferralError::CodeSpaceExhausted | ReferralError::Repository(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_body(status, error.to_string())
}

fn result_error(error: ResultError) -> Response {
    let status = match &error {
        ResultError::ReferralNotFound | ResultError::NotFound => StatusCode::NOT_FOUND,
        ResultError::ReferralNotOpen { .. }
        | ResultError::Duplicate
        | ResultError::AlreadyConfirmed => StatusCode::CONFLICT,
        ResultError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_body(status, error.to_string())
}

fn art_error(error: ArtError) -> Response {
    let status = match &error {
        ArtError::NotEnrolled => StatusCode::NOT_FOUND,
        ArtError::InvalidTransition { .. } => StatusCode::CONFLICT,
        ArtError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_body(status, error.to_string())
}

fn billing_error(error: BillingError) -> Response {
    let status = match &error {
        BillingError::AlreadyBilled { .. }
        | BillingError::CapReached { .. }
        | BillingError::AlreadySuperseded
        | BillingError::PeriodAlreadyOpen
        | BillingError::InvalidPeriodTransition { .. } => StatusCode::CONFLICT,
        BillingError::EventNotFound | BillingError::PeriodNotFound => StatusCode::NOT_FOUND,
        BillingError::Export(_) | BillingError::Repository(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_body(status, error.to_string())
}

// ---------------------------------------------------------------------------
// handlers

pub(crate) async fn start_assessment_handler<S, B, A, N>(
    State(services): State<Arc<CascadeServices<S, B, A, N>>>,
    axum::Json(payload): axum::Json<StartAssessmentRequest>,
) -> Response
where
    S: AssessmentStore + ReferralStore + ResultStore + ArtStore + 'static,
    B: BillingStore + PatientRegistry + 'static,
    A: AuditTrail + 'static,
    N: NotificationDispatcher + 'static,
{
    let patient_id = PatientId(payload.patient_id);
    match services.assessments.start(&patient_id, Utc::now()) {
        Ok(assessment) => (
            StatusCode::CREATED,
            axum::Json(AssessmentView::from_assessment(&assessment, None)),
        )
            .into_response(),
        Err(error) => assessment_error(error),
    }
}

pub(crate) async fn get_assessment_handler<S, B, A, N>(
    State(services): State<Arc<CascadeServices<S, B, A, N>>>,
    Path(assessment_id): Path<String>,
) -> Response
where
    S: AssessmentStore + ReferralStore + ResultStore + ArtStore + 'static,
    B: BillingStore + PatientRegistry + 'static,
    A: AuditTrail + 'static,
    N: NotificationDispatcher + 'static,
{
    match services.assessments.get(&AssessmentId(assessment_id)) {
        Ok(assessment) => (
            StatusCode::OK,
            axum::Json(AssessmentView::from_assessment(&assessment, None)),
        )
            .into_response(),
        Err(error) => assessment_error(error),
    }
}

pub(crate) async fn submit_response_handler<S, B, A, N>(
    State(services): State<Arc<CascadeServices<S, B, A, N>>>,
    Path(assessment_id): Path<String>,
    headers: HeaderMap,
    axum::Json(payload): axum::Json<SubmitResponseRequest>,
) -> Response
where
    S: AssessmentStore + ReferralStore + ResultStore + ArtStore + 'static,
    B: BillingStore + PatientRegistry + 'static,
    A: AuditTrail + 'static,
    N: NotificationDispatcher + 'static,
{
    let principal = principal_from_headers(&headers);
    match services.assessments.submit_response(
        &AssessmentId(assessment_id),
        &payload.question_key,
        payload.answer,
        &principal,
        Utc::now(),
    ) {
        Ok(outcome) => {
            let referral = outcome.referral.as_ref().map(ReferralView::from_referral);
            (
                StatusCode::OK,
                axum::Json(AssessmentView::from_assessment(&outcome.assessment, referral)),
            )
                .into_response()
        }
        Err(error) => assessment_error(error),
    }
}

pub(crate) async fn get_referral_handler<S, B, A, N>(
    State(services): State<Arc<CascadeServices<S, B, A, N>>>,
    Path(referral_id): Path<String>,
) -> Response
where
    S: AssessmentStore + ReferralStore + ResultStore + ArtStore + 'static,
    B: BillingStore + PatientRegistry + 'static,
    A: AuditTrail + 'static,
    N: NotificationDispatcher + 'static,
{
    match services.referrals.get(&ReferralId(referral_id)) {
        Ok(referral) => (
            StatusCode::OK,
            axum::Json(ReferralView::from_referral(&referral)),
        )
            .into_response(),
        Err(error) => referral_error(error),
    }
}

pub(crate) async fn referral_transition_handler<S, B, A, N>(
    State(services): State<Arc<CascadeServices<S, B, A, N>>>,
    Path(referral_id): Path<String>,
    axum::Json(payload): axum::Json<ReferralTransitionRequest>,
) -> Response
where
    S: AssessmentStore + ReferralStore + ResultStore + ArtStore + 'static,
    B: BillingStore + PatientRegistry + 'static,
    A: AuditTrail + 'static,
    N: NotificationDispatcher + 'static,
{
    let id = ReferralId(referral_id);
    let now = Utc::now();
    let outcome = match payload.action {
        ReferralAction::Sent => services.referrals.mark_sent(&id, now),
        ReferralAction::Received => services.referrals.mark_received(&id, now),
        ReferralAction::Schedule => match payload.test_center_id {
            Some(center) => services.referrals.schedule(&id, TestCenterId(center), now),
            None => {
                return error_body(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "scheduling requires a test_center_id".to_string(),
                )
            }
        },
        ReferralAction::NoShow => services.referrals.mark_no_show(&id, now),
        ReferralAction::Cancel => services.referrals.cancel(&id, now),
    };

    match outcome {
        Ok(referral) => (
            StatusCode::OK,
            axum::Json(ReferralView::from_referral(&referral)),
        )
            .into_response(),
        Err(error) => referral_error(error),
    }
}

pub(crate) async fn record_result_handler<S, B, A, N>(
    State(services): State<Arc<CascadeServices<S, B, A, N>>>,
    Path(referral_id): Path<String>,
    headers: HeaderMap,
    axum::Json(payload): axum::Json<RecordResultRequest>,
) -> Response
where
    S: AssessmentStore + ReferralStore + ResultStore + ArtStore + 'static,
    B: BillingStore + PatientRegistry + 'static,
    A: AuditTrail + 'static,
    N: NotificationDispatcher + 'static,
{
    let principal = principal_from_headers(&headers);
    match services.recorder.record(
        &ReferralId(referral_id),
        payload.outcome,
        payload.kind,
        payload.test_date,
        &principal,
        Utc::now(),
    ) {
        Ok(outcome) => (
            StatusCode::CREATED,
            axum::Json(RecordedResultView::from_outcome(&outcome)),
        )
            .into_response(),
        Err(error) => result_error(error),
    }
}

pub(crate) async fn confirm_result_handler<S, B, A, N>(
    State(services): State<Arc<CascadeServices<S, B, A, N>>>,
    Path(result_id): Path<String>,
) -> Response
where
    S: AssessmentStore + ReferralStore + ResultStore + ArtStore + 'static,
    B: BillingStore + PatientRegistry + 'static,
    A: AuditTrail + 'static,
    N: NotificationDispatcher + 'static,
{
    match services
        .recorder
        .confirm(&TestResultId(result_id), Utc::now())
    {
        Ok(result) => (StatusCode::OK, axum::Json(ResultView::from_result(&result))).into_response(),
        Err(error) => result_error(error),
    }
}

pub(crate) async fn get_art_handler<S, B, A, N>(
    State(services): State<Arc<CascadeServices<S, B, A, N>>>,
    Path(patient_id): Path<String>,
) -> Response
where
    S: AssessmentStore + ReferralStore + ResultStore + ArtStore + 'static,
    B: BillingStore + PatientRegistry + 'static,
    A: AuditTrail + 'static,
    N: NotificationDispatcher + 'static,
{
    match services.art.get(&PatientId(patient_id)) {
        Ok(record) => (StatusCode::OK, axum::Json(ArtView::from_record(&record))).into_response(),
        Err(error) => art_error(error),
    }
}

pub(crate) async fn clinic_visit_handler<S, B, A, N>(
    State(services): State<Arc<CascadeServices<S, B, A, N>>>,
    Path(patient_id): Path<String>,
    axum::Json(payload): axum::Json<ClinicVisitRequest>,
) -> Response
where
    S: AssessmentStore + ReferralStore + ResultStore + ArtStore + 'static,
    B: BillingStore + PatientRegistry + 'static,
    A: AuditTrail + 'static,
    N: NotificationDispatcher + 'static,
{
    let visit = ClinicVisit {
        regimen: payload.regimen,
        next_appointment: payload.next_appointment,
    };
    match services
        .art
        .record_clinic_visit(&PatientId(patient_id), visit)
    {
        Ok(record) => (StatusCode::OK, axum::Json(ArtView::from_record(&record))).into_response(),
        Err(error) => art_error(error),
    }
}

pub(crate) async fn log_adherence_handler<S, B, A, N>(
    State(services): State<Arc<CascadeServices<S, B, A, N>>>,
    Path(patient_id): Path<String>,
    axum::Json(payload): axum::Json<AdherenceRequest>,
) -> Response
where
    S: AssessmentStore + ReferralStore + ResultStore + ArtStore + 'static,
    B: BillingStore + PatientRegistry + 'static,
    A: AuditTrail + 'static,
    N: NotificationDispatcher + 'static,
{
    match services.art.log_adherence(
        &PatientId(patient_id),
        payload.date,
        payload.doses_missed,
    ) {
        Ok(level) => (
            StatusCode::OK,
            axum::Json(json!({ "adherence_level": level.label() })),
        )
            .into_response(),
        Err(error) => art_error(error),
    }
}

pub(crate) async fn adherence_level_handler<S, B, A, N>(
    State(services): State<Arc<CascadeServices<S, B, A, N>>>,
    Path(patient_id): Path<String>,
) -> Response
where
    S: AssessmentStore + ReferralStore + ResultStore + ArtStore + 'static,
    B: BillingStore + PatientRegistry + 'static,
    A: AuditTrail + 'static,
    N: NotificationDispatcher + 'static,
{
    match services
        .art
        .adherence_level(&PatientId(patient_id), Utc::now().date_naive())
    {
        Ok(level) => (
            StatusCode::OK,
            axum::Json(json!({ "adherence_level": level.label() })),
        )
            .into_response(),
        Err(error) => art_error(error),
    }
}

pub(crate) async fn billing_summary_handler<S, B, A, N>(
    State(services): State<Arc<CascadeServices<S, B, A, N>>>,
    Path(patient_id): Path<String>,
) -> Response
where
    S: AssessmentStore + ReferralStore + ResultStore + ArtStore + 'static,
    B: BillingStore + PatientRegistry + 'static,
    A: AuditTrail + 'static,
    N: NotificationDispatcher + 'static,
{
    let patient_id = PatientId(patient_id);
    let summary = match services.ledger.summary_for(&patient_id) {
        Ok(summary) => summary,
        Err(error) => return billing_error(error),
    };
    let remaining = match services.ledger.remaining_billable_amount(&patient_id) {
        Ok(remaining) => remaining,
        Err(error) => return billing_error(error),
    };

    (
        StatusCode::OK,
        axum::Json(BillingSummaryView { summary, remaining }),
    )
        .into_response()
}

pub(crate) async fn billing_csv_handler<S, B, A, N>(
    State(services): State<Arc<CascadeServices<S, B, A, N>>>,
    headers: HeaderMap,
) -> Response
where
    S: AssessmentStore + ReferralStore + ResultStore + ArtStore + 'static,
    B: BillingStore + PatientRegistry + 'static,
    A: AuditTrail + 'static,
    N: NotificationDispatcher + 'static,
{
    let principal = principal_from_headers(&headers);
    match services.ledger.export_csv(None, &principal, Utc::now()) {
        Ok(csv) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv")],
            csv,
        )
            .into_response(),
        Err(error) => billing_error(error),
    }
}

//! Axum route handlers for the tutor API.

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tutor_core::{Account, AccountId, LessonDraft, LessonId, Role, SessionToken, MAX_AVATAR_BYTES};

use crate::{
    auth::AccountView,
    extract::{AdminPrincipal, ApiJson, MaybePrincipal, Principal},
    security, session_cookie,
    state::AppState,
    ApiError,
};

// ── Request bodies ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileBody {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCodeBody {
    pub lesson_id: LessonId,
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCodeBody {
    #[serde(default)]
    pub lesson_id: Option<LessonId>,
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedCodeQuery {
    pub lesson_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminAccountBody {
    pub name: String,
    pub role: String,
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Multipart form field carrying the photo.
const PHOTO_FIELD: &str = "photo";

/// Room for multipart framing around a maximal photo.
const UPLOAD_BODY_LIMIT: usize = MAX_AVATAR_BYTES + 64 * 1024;

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    let throttled = Router::new()
        .route("/api/registration", post(register))
        .route("/api/login", post(login))
        .route_layer(middleware::from_fn_with_state(state.clone(), security::throttle));

    Router::new()
        .merge(throttled)
        .route("/api/logout", post(logout))
        .route("/api/me", get(me))
        .route("/api/update-profile", put(update_profile))
        .route("/api/delete-account", delete(delete_account))
        .route(
            "/api/upload-photo",
            patch(upload_photo).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/avatars/{name}", get(avatar))
        .route("/api/lessons", get(lessons))
        .route("/api/save-code", post(save_code))
        .route("/api/saved-code", get(saved_code))
        .route("/api/run-code", post(run_code))
        .route("/api/admin/users", get(admin_list_accounts))
        .route("/api/admin/users/{id}", put(admin_update_account).delete(admin_delete_account))
        .route("/api/admin/lessons", post(admin_create_lesson))
        .route("/api/admin/lessons/{id}", put(admin_update_lesson).delete(admin_delete_lesson))
        .route("/health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(security::harden))
        .layer(TraceLayer::new_for_http())
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// `GET /health` — liveness check with sandbox load.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let sandbox = state.coursework.sandbox();
    Json(serde_json::json!({
        "status": "ok",
        "backend": sandbox.backend_name(),
        "activeRuns": sandbox.active_count(),
    }))
}

/// `POST /api/registration` — create an account and sign it in.
///
/// # Errors
/// 400 for invalid input, 409 for a taken email.
pub async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterBody>,
) -> Result<impl IntoResponse, ApiError> {
    let (account, token) = state.auth.register(&body.name, &body.email, &body.password).await?;
    signed_in(&state, StatusCode::CREATED, &account, &token)
}

/// `POST /api/login`
///
/// # Errors
/// 401 on any credential mismatch.
pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginBody>,
) -> Result<impl IntoResponse, ApiError> {
    let (account, token) = state.auth.login(&body.email, &body.password).await?;
    signed_in(&state, StatusCode::OK, &account, &token)
}

/// `POST /api/logout` — always clears the cookie.
///
/// # Errors
/// 500 on store failure.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.logout(session_cookie::read(&headers).as_ref()).await?;
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, session_cookie::clear(state.secure_cookies)?)]))
}

/// `GET /api/me`
pub async fn me(Principal(account): Principal) -> Json<AccountView> {
    Json(AccountView::from(&account))
}

/// `PUT /api/update-profile`
///
/// # Errors
/// 400 for invalid input, 409 for a taken email.
pub async fn update_profile(
    State(state): State<AppState>,
    Principal(account): Principal,
    ApiJson(body): ApiJson<ProfileBody>,
) -> Result<Json<AccountView>, ApiError> {
    let updated = state.auth.update_profile(&account, &body.name, &body.email).await?;
    Ok(Json(AccountView::from(&updated)))
}

/// `DELETE /api/delete-account`
///
/// # Errors
/// 401 without a session.
pub async fn delete_account(
    State(state): State<AppState>,
    Principal(account): Principal,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.delete_account(&account).await?;
    state.avatars.remove_all_for(account.id).await;
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, session_cookie::clear(state.secure_cookies)?)]))
}

/// `PATCH /api/upload-photo` — multipart form with a JPG or PNG `photo`
/// field of at most 5 MiB.
///
/// # Errors
/// 400 for a missing, disallowed or mislabelled file, 413 above the limit.
pub async fn upload_photo(
    State(state): State<AppState>,
    Principal(account): Principal,
    form: Result<Multipart, MultipartRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut form = form?;
    while let Some(field) = form.next_field().await? {
        if field.name() != Some(PHOTO_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_owned();
        let bytes = field.bytes().await?;
        let url = state.avatars.upload(&account, &file_name, &bytes).await?;
        return Ok(Json(serde_json::json!({ "url": url })));
    }
    Err(ApiError::BadRequest("invalid file".to_owned()))
}

/// `GET /avatars/{name}`
///
/// # Errors
/// 404 for anything but a stored photo.
pub async fn avatar(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (format, bytes) = state.avatars.fetch(&name).await?;
    Ok(([(header::CONTENT_TYPE, format.content_type()), (header::CACHE_CONTROL, "no-cache")], bytes))
}

/// `GET /api/lessons` — gated catalog; guests get the guest view.
///
/// # Errors
/// 500 on store failure.
pub async fn lessons(
    State(state): State<AppState>,
    MaybePrincipal(viewer): MaybePrincipal,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.coursework.lessons(viewer.as_ref()).await?))
}

/// `POST /api/save-code`
///
/// # Errors
/// 404 for an unknown lesson, 400 for oversized code.
pub async fn save_code(
    State(state): State<AppState>,
    Principal(account): Principal,
    ApiJson(body): ApiJson<SaveCodeBody>,
) -> Result<StatusCode, ApiError> {
    state.coursework.save_code(&account, body.lesson_id, body.code).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/saved-code?lessonId=<id>`
///
/// # Errors
/// 400 without a valid lesson id.
pub async fn saved_code(
    State(state): State<AppState>,
    Principal(account): Principal,
    Query(query): Query<SavedCodeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let raw = query
        .lesson_id
        .ok_or_else(|| ApiError::BadRequest("lessonId is required".to_owned()))?;
    let lesson_id: LessonId = raw.parse()?;
    let code = state.coursework.saved_code(&account, lesson_id).await?;
    Ok(Json(serde_json::json!({ "code": code })))
}

/// `POST /api/run-code` — run, and grade when a lesson is named.
///
/// # Errors
/// 404 for an unknown lesson, 500 when the sandbox is unavailable.
pub async fn run_code(
    State(state): State<AppState>,
    Principal(account): Principal,
    ApiJson(body): ApiJson<RunCodeBody>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.coursework.run_code(&account, body.lesson_id, body.code).await?))
}

/// `GET /api/admin/users`
///
/// # Errors
/// 403 for non-admins.
pub async fn admin_list_accounts(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
) -> Result<Json<Vec<AccountView>>, ApiError> {
    let accounts = state.auth.list_accounts(&admin).await?;
    Ok(Json(accounts.iter().map(AccountView::from).collect()))
}

/// `PUT /api/admin/users/{id}`
///
/// # Errors
/// 400 for an invalid name or role, 404 for an unknown account.
pub async fn admin_update_account(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<AdminAccountBody>,
) -> Result<StatusCode, ApiError> {
    let id: AccountId = id.parse()?;
    let role: Role = body.role.parse()?;
    state.auth.admin_update_account(&admin, id, &body.name, role).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/admin/users/{id}`
///
/// # Errors
/// 404 for an unknown account.
pub async fn admin_delete_account(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: AccountId = id.parse()?;
    state.auth.admin_delete_account(&admin, id).await?;
    state.avatars.remove_all_for(id).await;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/admin/lessons`
///
/// # Errors
/// 400 for an invalid draft.
pub async fn admin_create_lesson(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    ApiJson(draft): ApiJson<LessonDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let lesson = state.coursework.create_lesson(&admin, draft).await?;
    Ok((StatusCode::CREATED, Json(lesson)))
}

/// `PUT /api/admin/lessons/{id}`
///
/// # Errors
/// 400 for an invalid draft, 404 for an unknown lesson.
pub async fn admin_update_lesson(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(id): Path<String>,
    ApiJson(draft): ApiJson<LessonDraft>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.coursework.update_lesson(&admin, id.parse()?, draft).await?))
}

/// `DELETE /api/admin/lessons/{id}`
///
/// # Errors
/// 404 for an unknown lesson.
pub async fn admin_delete_lesson(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.coursework.delete_lesson(&admin, id.parse()?).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn signed_in(
    state: &AppState,
    status: StatusCode,
    account: &Account,
    token: &SessionToken,
) -> Result<(StatusCode, [(header::HeaderName, HeaderValue); 1], Json<AccountView>), ApiError> {
    let cookie = session_cookie::issue(token, state.auth.session_ttl(), state.secure_cookies)?;
    Ok((status, [(header::SET_COOKIE, cookie)], Json(AccountView::from(account))))
}

use axum::{
    extract::{Multipart, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tera::Context;
use tracing::{info, warn};

use crate::db::{self, AttendanceStatus, NewResource, NewUser, ResourceKind, Role, Score, User};
use crate::error::AppError;
use crate::session::{expired_session_cookie, session_cookie, session_token, Flash, Session};
use crate::state::AppState;
use crate::uploads::{clean_filename, is_accepted_upload};

const RECENT_LOGINS_SHOWN: usize = 20;
const TRAINER_UPLOAD_DESCRIPTION: &str = "File from your trainer";

#[derive(Deserialize)]
pub struct IndexQuery {
    view: Option<String>,
    date: Option<String>,
}

pub async fn index(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<IndexQuery>,
) -> Result<Response, AppError> {
    let Some((token, session)) = current_session(&state, &headers).await else {
        let view = match query.view.as_deref() {
            Some("register") => AuthView::Register,
            _ => AuthView::Login,
        };
        return render_auth(&state, view, None).await;
    };

    let flash = state.sessions.take_flash(&token).await;
    match session.user.role {
        Role::Trainee => trainee_dashboard(&state, &session.user, flash).await,
        Role::Trainer => {
            let date = query
                .date
                .as_deref()
                .and_then(valid_date)
                .unwrap_or_else(db::today);
            trainer_dashboard(&state, &session.user, flash, &date).await
        }
    }
}

async fn trainee_dashboard(
    state: &AppState,
    user: &User,
    flash: Option<Flash>,
) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let submissions = db::submissions_of(store, &user.id).await?;
    let trainer_name = match user.assigned_trainer_id.as_deref() {
        Some(trainer_id) => db::find_user(store, trainer_id).await?.map(|t| t.name),
        None => None,
    };
    let meetings = db::meetings_for(store, user).await?;
    let resources = db::resources_for(store, user).await?;

    let mut ctx = Context::new();
    ctx.insert("user", user);
    ctx.insert("trainer_name", &trainer_name);
    ctx.insert("submissions", &submissions);
    ctx.insert("meetings", &meetings);
    ctx.insert("resources", &resources);
    ctx.insert("flash", &flash);
    Ok(render("trainee.html", &ctx)?.into_response())
}

#[derive(Serialize)]
struct GradeOption {
    id: String,
    label: String,
}

#[derive(Serialize)]
struct RosterEntry {
    trainee_id: String,
    name: String,
    present: bool,
}

async fn trainer_dashboard(
    state: &AppState,
    user: &User,
    flash: Option<Flash>,
    date: &str,
) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let submissions = db::list_submissions(store).await?;
    let options: Vec<GradeOption> = submissions
        .iter()
        .map(|s| GradeOption {
            id: s.id.clone(),
            label: s.label(),
        })
        .collect();
    let trainees = db::trainees_of(store, &user.id).await?;
    let recent_logins = db::recent_logins(store, RECENT_LOGINS_SHOWN).await?;
    let resources = db::resources_for(store, user).await?;
    let meetings = db::meetings_for(store, user).await?;

    // Trainees without a record for the day start unticked.
    let recorded = db::attendance_on(store, &user.id, date).await?;
    let roster: Vec<RosterEntry> = trainees
        .iter()
        .map(|t| RosterEntry {
            trainee_id: t.id.clone(),
            name: t.name.clone(),
            present: recorded
                .iter()
                .any(|r| r.trainee_id == t.id && r.status == AttendanceStatus::Present),
        })
        .collect();

    let mut ctx = Context::new();
    ctx.insert("user", user);
    ctx.insert("submissions", &submissions);
    ctx.insert("options", &options);
    ctx.insert("trainees", &trainees);
    ctx.insert("recent_logins", &recent_logins);
    ctx.insert("resources", &resources);
    ctx.insert("meetings", &meetings);
    ctx.insert("attendance_date", date);
    ctx.insert("roster", &roster);
    ctx.insert("flash", &flash);
    Ok(render("trainer.html", &ctx)?.into_response())
}

#[derive(Clone, Copy, PartialEq)]
enum AuthView {
    Login,
    Register,
}

async fn render_auth(
    state: &AppState,
    view: AuthView,
    flash: Option<Flash>,
) -> Result<Response, AppError> {
    let trainers = if view == AuthView::Register {
        db::list_trainers(state.store.as_ref()).await?
    } else {
        Vec::new()
    };

    let mut ctx = Context::new();
    ctx.insert("view", if view == AuthView::Register { "register" } else { "login" });
    ctx.insert("trainers", &trainers);
    ctx.insert("flash", &flash);
    Ok(render("auth.html", &ctx)?.into_response())
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    if form.email.trim().is_empty() || form.password.is_empty() {
        let page = render_auth(&state, AuthView::Login, Some(Flash::error("Please fill in all fields"))).await?;
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, page).into_response());
    }

    let store = state.store.as_ref();
    let Some(user) = db::authenticate(store, &form.email, &form.password).await? else {
        warn!(email = %form.email, "Failed login attempt");
        let page = render_auth(
            &state,
            AuthView::Login,
            Some(Flash::error("Incorrect email or password")),
        )
        .await?;
        return Ok((StatusCode::UNAUTHORIZED, page).into_response());
    };

    info!(user_id = %user.id, role = user.role.as_str(), "User logged in");
    if let Err(e) = db::record_login(store, &user).await {
        warn!("Failed to record login for {}: {}", user.id, e);
    }

    if let Some(previous) = session_token(&headers) {
        state.sessions.remove(&previous).await;
    }
    let greeting = Flash::success(format!("Welcome {}", user.name));
    let token = state.sessions.create(user).await;
    state.sessions.set_flash(&token, greeting).await;

    Ok((
        [(header::SET_COOKIE, session_cookie(&token))],
        Redirect::to("/"),
    )
        .into_response())
}

#[derive(Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    assigned_trainer_id: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    if form.name.trim().is_empty() || form.email.trim().is_empty() || form.password.is_empty() {
        let page = render_auth(
            &state,
            AuthView::Register,
            Some(Flash::error("Please fill in all the details")),
        )
        .await?;
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, page).into_response());
    }

    let role = Role::parse(&form.role)
        .ok_or_else(|| AppError::Validation(format!("Unknown account type '{}'", form.role)))?;

    let store = state.store.as_ref();
    let assigned_trainer_id = Some(form.assigned_trainer_id.trim().to_string())
        .filter(|id| role == Role::Trainee && !id.is_empty());
    if let Some(trainer_id) = assigned_trainer_id.as_deref() {
        let known = db::list_trainers(store).await?.iter().any(|t| t.id == trainer_id);
        if !known {
            return Err(AppError::Validation("The selected trainer does not exist".to_string()));
        }
    }

    let user = db::create_user(
        store,
        NewUser {
            name: form.name.trim().to_string(),
            email: form.email,
            password: form.password,
            phone: form.phone.trim().to_string(),
            role,
            assigned_trainer_id,
        },
    )
    .await?;
    info!(user_id = %user.id, role = role.as_str(), "User registered");

    render_auth(
        &state,
        AuthView::Login,
        Some(Flash::success("Account created, please log in.")),
    )
    .await
}

pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        state.sessions.remove(&token).await;
    }
    (
        [(header::SET_COOKIE, expired_session_cookie())],
        Redirect::to("/"),
    )
        .into_response()
}

#[derive(Default)]
struct UploadForm {
    description: String,
    trainee_id: String,
    filename: Option<String>,
}

/// Reads the text fields and the file name of an upload form. The file body
/// is drained and dropped.
async fn read_upload(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let read_error = |e: axum::extract::multipart::MultipartError| {
        AppError::Validation(format!("Upload could not be read: {}", e))
    };

    let mut form = UploadForm::default();
    while let Some(mut field) = multipart.next_field().await.map_err(read_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "description" => form.description = field.text().await.map_err(read_error)?,
            "trainee_id" => form.trainee_id = field.text().await.map_err(read_error)?,
            "file" => {
                form.filename = field
                    .file_name()
                    .map(clean_filename)
                    .filter(|n| !n.is_empty());
                while field.chunk().await.map_err(read_error)?.is_some() {}
            }
            _ => {}
        }
    }
    Ok(form)
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (token, session) = require_role(&state, &headers, Role::Trainee).await?;
    let upload = read_upload(multipart).await?;

    let flash = match upload.filename {
        None => Flash::error("Please choose a file to upload"),
        Some(name) if !is_accepted_upload(&name) => {
            Flash::error("Only pdf, docx, png and jpg files are accepted")
        }
        Some(name) => {
            let submission = db::create_submission(
                state.store.as_ref(),
                &session.user,
                &name,
                upload.description.trim(),
            )
            .await?;
            info!(submission_id = %submission.id, user_id = %session.user.id, "Submission received");
            Flash::success("Your submission was sent to the trainer")
        }
    };

    state.sessions.set_flash(&token, flash).await;
    Ok(Redirect::to("/").into_response())
}

/// A trainer files a document on behalf of one of their trainees. It lands
/// in the trainee's list like any other submission.
pub async fn upload_for_trainee(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (token, session) = require_role(&state, &headers, Role::Trainer).await?;
    let upload = read_upload(multipart).await?;
    let store = state.store.as_ref();

    let flash = match upload.filename {
        Some(name) if !upload.trainee_id.is_empty() => {
            let trainee = db::trainees_of(store, &session.user.id)
                .await?
                .into_iter()
                .find(|t| t.id == upload.trainee_id);
            match trainee {
                None => Flash::error("That trainee is not in your group"),
                Some(_) if !is_accepted_upload(&name) => {
                    Flash::error("Only pdf, docx, png and jpg files are accepted")
                }
                Some(trainee) => {
                    let description = match upload.description.trim() {
                        "" => TRAINER_UPLOAD_DESCRIPTION,
                        text => text,
                    };
                    let submission = db::create_submission(store, &trainee, &name, description).await?;
                    info!(
                        submission_id = %submission.id,
                        trainee_id = %trainee.id,
                        trainer_id = %session.user.id,
                        "Trainer uploaded a file for a trainee"
                    );
                    Flash::success(format!("File sent to {}", trainee.name))
                }
            }
        }
        _ => Flash::error("Please choose a trainee and a file"),
    };

    state.sessions.set_flash(&token, flash).await;
    Ok(Redirect::to("/").into_response())
}

#[derive(Deserialize)]
pub struct GradeForm {
    #[serde(default)]
    submission_id: String,
    #[serde(default)]
    score: String,
    #[serde(default)]
    feedback: String,
}

pub async fn grade(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<GradeForm>,
) -> Result<Response, AppError> {
    let (token, session) = require_role(&state, &headers, Role::Trainer).await?;

    let submission_id = form.submission_id.trim();
    if submission_id.is_empty() {
        state
            .sessions
            .set_flash(&token, Flash::error("Choose a submission to grade"))
            .await;
        return Ok(Redirect::to("/").into_response());
    }

    let Some(score) = Score::parse(&form.score) else {
        state
            .sessions
            .set_flash(&token, Flash::error("Score must be a whole number from 0 to 100"))
            .await;
        return Ok(Redirect::to("/").into_response());
    };

    let graded = db::grade_submission(
        state.store.as_ref(),
        submission_id,
        score,
        form.feedback.trim(),
    )
    .await?;
    if !graded {
        return Err(AppError::NotFound("Submission not found".to_string()));
    }

    info!(
        submission_id = %submission_id,
        trainer_id = %session.user.id,
        score = score.value(),
        "Submission graded"
    );
    state
        .sessions
        .set_flash(&token, Flash::success("Grade saved"))
        .await;
    Ok(Redirect::to("/").into_response())
}

#[derive(Deserialize)]
pub struct ResourceForm {
    #[serde(default)]
    title: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    link: String,
}

pub async fn add_resource(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<ResourceForm>,
) -> Result<Response, AppError> {
    let (token, session) = require_role(&state, &headers, Role::Trainer).await?;

    let title = form.title.trim();
    let link = form.link.trim();
    if title.is_empty() || link.is_empty() {
        state
            .sessions
            .set_flash(&token, Flash::error("A resource needs a title and a link"))
            .await;
        return Ok(Redirect::to("/").into_response());
    }
    let kind = ResourceKind::parse(&form.kind)
        .ok_or_else(|| AppError::Validation(format!("Unknown resource type '{}'", form.kind)))?;

    let resource = db::add_resource(
        state.store.as_ref(),
        &session.user,
        NewResource {
            title: title.to_string(),
            description: form.description.trim().to_string(),
            kind,
            link: link.to_string(),
        },
    )
    .await?;
    info!(resource_id = %resource.id, trainer_id = %session.user.id, "Resource shared");

    state
        .sessions
        .set_flash(&token, Flash::success("Resource shared with your group"))
        .await;
    Ok(Redirect::to("/").into_response())
}

#[derive(Deserialize)]
pub struct DeleteResourceForm {
    #[serde(default)]
    resource_id: String,
}

pub async fn delete_resource(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<DeleteResourceForm>,
) -> Result<Response, AppError> {
    let (token, session) = require_role(&state, &headers, Role::Trainer).await?;

    let deleted = db::delete_resource(state.store.as_ref(), &session.user.id, form.resource_id.trim()).await?;
    if !deleted {
        return Err(AppError::NotFound("Resource not found".to_string()));
    }
    info!(resource_id = %form.resource_id, trainer_id = %session.user.id, "Resource deleted");

    state
        .sessions
        .set_flash(&token, Flash::success("Resource deleted"))
        .await;
    Ok(Redirect::to("/").into_response())
}

/// Form body is `date=...` followed by one `present=<trainee id>` per ticked
/// box, so it is read as raw pairs.
pub async fn save_attendance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let (token, session) = require_role(&state, &headers, Role::Trainer).await?;

    let date = pairs
        .iter()
        .find(|(key, _)| key == "date")
        .and_then(|(_, value)| valid_date(value));
    let Some(date) = date else {
        state
            .sessions
            .set_flash(&token, Flash::error("Pick a valid date for the attendance sheet"))
            .await;
        return Ok(Redirect::to("/").into_response());
    };
    let present: Vec<&str> = pairs
        .iter()
        .filter(|(key, _)| key == "present")
        .map(|(_, value)| value.as_str())
        .collect();

    let store = state.store.as_ref();
    let marks: Vec<(String, AttendanceStatus)> = db::trainees_of(store, &session.user.id)
        .await?
        .into_iter()
        .map(|t| {
            let status = if present.contains(&t.id.as_str()) {
                AttendanceStatus::Present
            } else {
                AttendanceStatus::Absent
            };
            (t.id, status)
        })
        .collect();
    db::save_attendance(store, &session.user.id, &date, &marks).await?;
    info!(trainer_id = %session.user.id, %date, trainees = marks.len(), "Attendance saved");

    state
        .sessions
        .set_flash(&token, Flash::success("Attendance saved"))
        .await;
    Ok(Redirect::to(&format!("/?date={}", date)).into_response())
}

#[derive(Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    phone: String,
    #[serde(default)]
    password: String,
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<ProfileForm>,
) -> Result<Response, AppError> {
    let (token, session) = current_session(&state, &headers)
        .await
        .ok_or(AppError::Unauthorized)?;

    let phone = Some(form.phone.trim().to_string()).filter(|p| !p.is_empty());
    let password = Some(form.password).filter(|p| !p.is_empty());
    if phone.is_none() && password.is_none() {
        state
            .sessions
            .set_flash(&token, Flash::error("Enter a new phone number or password"))
            .await;
        return Ok(Redirect::to("/").into_response());
    }

    let updated = db::update_credentials(state.store.as_ref(), &session.user, password, phone)
        .await?
        .ok_or_else(|| AppError::NotFound("Your account no longer exists".to_string()))?;
    info!(user_id = %updated.id, "Profile updated");

    state.sessions.replace_user(&token, updated).await;
    state
        .sessions
        .set_flash(&token, Flash::success("Profile updated"))
        .await;
    Ok(Redirect::to("/").into_response())
}

pub(crate) async fn current_session(state: &AppState, headers: &HeaderMap) -> Option<(String, Session)> {
    let token = session_token(headers)?;
    let session = state.sessions.get(&token).await?;
    Some((token, session))
}

async fn require_role(
    state: &AppState,
    headers: &HeaderMap,
    role: Role,
) -> Result<(String, Session), AppError> {
    let (token, session) = current_session(state, headers)
        .await
        .ok_or(AppError::Unauthorized)?;
    if session.user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok((token, session))
}

/// `YYYY-MM-DD` dates only, normalised.
fn valid_date(raw: &str) -> Option<String> {
    chrono::NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

fn render(name: &str, ctx: &Context) -> Result<Html<String>, AppError> {
    let tera = crate::templates::get_tera();
    Ok(Html(tera.render(name, ctx)?))
}

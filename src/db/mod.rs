mod models;

pub use models::*;

use chrono::Local;
use serde::Serialize;
use uuid::Uuid;

use crate::error::SheetError;
use crate::sheets::{fetch_optional, SheetStore, Table};

pub const USERS_SHEET: &str = "users";
pub const FILES_SHEET: &str = "files";
pub const LOGIN_LOGS_SHEET: &str = "login_logs";
pub const RESOURCES_SHEET: &str = "resources";
pub const MEETINGS_SHEET: &str = "meetings";
pub const ATTENDANCE_SHEET: &str = "attendance";

pub const USERS_HEADER: &[&str] = &[
    "id",
    "name",
    "email",
    "password",
    "phone",
    "role",
    "assigned_trainer_id",
];
pub const FILES_HEADER: &[&str] = &[
    "id",
    "user_id",
    "filename",
    "description",
    "upload_date",
    "score",
    "feedback",
    "status",
    "student_name",
];
pub const LOGIN_LOGS_HEADER: &[&str] = &["id", "user_id", "user_name", "role", "timestamp"];
pub const RESOURCES_HEADER: &[&str] = &[
    "id",
    "title",
    "description",
    "type",
    "link",
    "uploaded_by",
    "target_audience",
    "created_at",
];
pub const MEETINGS_HEADER: &[&str] = &["id", "link", "topic", "target_audience", "target_group_id", "created_at"];
pub const ATTENDANCE_HEADER: &[&str] = &["id", "trainee_id", "trainer_id", "date", "status"];

/// Worksheets a spreadsheet may lack. They are created at startup when
/// possible and read as empty otherwise.
pub const OPTIONAL_WORKSHEETS: &[(&str, &[&str])] = &[
    (LOGIN_LOGS_SHEET, LOGIN_LOGS_HEADER),
    (RESOURCES_SHEET, RESOURCES_HEADER),
    (MEETINGS_SHEET, MEETINGS_HEADER),
    (ATTENDANCE_SHEET, ATTENDANCE_HEADER),
];

// score, feedback, status are columns F..H of `files`
const GRADE_FIRST_COLUMN: usize = 6;
// password, phone are columns D..E of `users`
const CREDENTIALS_FIRST_COLUMN: usize = 4;
// trainer_id, date, status are columns C..E of `attendance`
const ATTENDANCE_FIRST_COLUMN: usize = 3;

pub fn generate_record_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn timestamp_now() -> String {
    Local::now().format("%Y-%m-%d %H:%M").to_string()
}

/// Today's date as `YYYY-MM-DD`, the attendance key.
pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Checks the worksheet layout at startup. `users` and `files` must exist.
/// Optional worksheets are created when missing; if that fails the features
/// backed by them show nothing until an operator adds the sheet.
/// Empty worksheets get their header row, and a header that does not match
/// the column layout positional updates rely on is logged.
pub async fn ensure_worksheets(store: &dyn SheetStore) -> Result<(), SheetError> {
    for (sheet, expected) in [(USERS_SHEET, USERS_HEADER), (FILES_SHEET, FILES_HEADER)] {
        let table = store.fetch_all(sheet).await?;
        ensure_header(store, sheet, &table, expected).await?;
    }

    for &(sheet, expected) in OPTIONAL_WORKSHEETS {
        let table = match store.fetch_all(sheet).await {
            Ok(table) => table,
            Err(SheetError::WorksheetNotFound(_)) => match store.create_sheet(sheet).await {
                Ok(()) => Table::default(),
                Err(e) => {
                    tracing::warn!("Worksheet '{}' is missing and could not be created: {}", sheet, e);
                    continue;
                }
            },
            Err(e) => return Err(e),
        };
        ensure_header(store, sheet, &table, expected).await?;
    }
    Ok(())
}

async fn ensure_header(
    store: &dyn SheetStore,
    sheet: &str,
    table: &Table,
    expected: &[&str],
) -> Result<(), SheetError> {
    if table.header.is_empty() {
        tracing::info!("Writing header row to empty worksheet '{}'", sheet);
        store
            .append_row(sheet, expected.iter().map(|h| h.to_string()).collect())
            .await?;
    } else if table.header.iter().map(String::as_str).ne(expected.iter().copied()) {
        tracing::warn!(
            "Worksheet '{}' header {:?} differs from expected {:?}; updates are positional",
            sheet,
            table.header,
            expected
        );
    }
    Ok(())
}

pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub role: Role,
    pub assigned_trainer_id: Option<String>,
}

pub async fn list_users(store: &dyn SheetStore) -> Result<Vec<User>, SheetError> {
    let table = store.fetch_all(USERS_SHEET).await?;
    Ok(table
        .rows
        .iter()
        .filter_map(|row| {
            let user = User::from_row(row);
            if user.is_none() {
                tracing::warn!("Skipping malformed users row {:?}", row.first());
            }
            user
        })
        .collect())
}

pub async fn list_trainers(store: &dyn SheetStore) -> Result<Vec<User>, SheetError> {
    Ok(list_users(store)
        .await?
        .into_iter()
        .filter(|u| u.role == Role::Trainer)
        .collect())
}

pub async fn find_user(store: &dyn SheetStore, id: &str) -> Result<Option<User>, SheetError> {
    Ok(list_users(store).await?.into_iter().find(|u| u.id == id))
}

/// Appends a user row. Emails are not checked for duplicates, and only
/// trainees keep an assigned trainer.
pub async fn create_user(store: &dyn SheetStore, new_user: NewUser) -> Result<User, SheetError> {
    let assigned_trainer_id = match new_user.role {
        Role::Trainee => new_user.assigned_trainer_id.filter(|t| !t.trim().is_empty()),
        Role::Trainer => None,
    };
    let user = User {
        id: generate_record_id(),
        name: new_user.name,
        email: new_user.email,
        password: new_user.password,
        phone: new_user.phone,
        role: new_user.role,
        assigned_trainer_id,
    };
    store.append_row(USERS_SHEET, user.to_row()).await?;
    Ok(user)
}

/// First user whose email and password both equal the given strings.
pub async fn authenticate(
    store: &dyn SheetStore,
    email: &str,
    password: &str,
) -> Result<Option<User>, SheetError> {
    Ok(list_users(store)
        .await?
        .into_iter()
        .find(|u| u.email == email && u.password == password))
}

pub async fn trainees_of(store: &dyn SheetStore, trainer_id: &str) -> Result<Vec<User>, SheetError> {
    Ok(list_users(store)
        .await?
        .into_iter()
        .filter(|u| u.role == Role::Trainee && u.assigned_trainer_id.as_deref() == Some(trainer_id))
        .collect())
}

/// Overwrites password and phone in one range write. Returns `None` when
/// the user row no longer exists.
pub async fn update_credentials(
    store: &dyn SheetStore,
    user: &User,
    password: Option<String>,
    phone: Option<String>,
) -> Result<Option<User>, SheetError> {
    let mut updated = user.clone();
    if let Some(password) = password {
        updated.password = password;
    }
    if let Some(phone) = phone {
        updated.phone = phone;
    }
    let found = store
        .find_and_update(
            USERS_SHEET,
            &user.id,
            CREDENTIALS_FIRST_COLUMN,
            vec![updated.password.clone(), updated.phone.clone()],
        )
        .await?;
    Ok(found.then_some(updated))
}

pub async fn record_login(store: &dyn SheetStore, user: &User) -> Result<(), SheetError> {
    let event = LoginEvent {
        id: generate_record_id(),
        user_id: user.id.clone(),
        user_name: user.name.clone(),
        role: user.role.as_str().to_string(),
        timestamp: timestamp_now(),
    };
    store.append_row(LOGIN_LOGS_SHEET, event.to_row()).await
}

/// Newest first. Empty when the spreadsheet has no `login_logs` worksheet.
pub async fn recent_logins(store: &dyn SheetStore, limit: usize) -> Result<Vec<LoginEvent>, SheetError> {
    let table = fetch_optional(store, LOGIN_LOGS_SHEET).await?;
    Ok(table
        .rows
        .iter()
        .rev()
        .filter_map(|row| LoginEvent::from_row(row))
        .take(limit)
        .collect())
}

pub async fn create_submission(
    store: &dyn SheetStore,
    owner: &User,
    filename: &str,
    description: &str,
) -> Result<Submission, SheetError> {
    let submission = Submission {
        id: generate_record_id(),
        user_id: owner.id.clone(),
        filename: filename.to_string(),
        description: description.to_string(),
        upload_date: timestamp_now(),
        score: None,
        feedback: None,
        status: SubmissionStatus::PendingReview,
        student_name: owner.name.clone(),
    };
    store.append_row(FILES_SHEET, submission.to_row()).await?;
    Ok(submission)
}

pub async fn list_submissions(store: &dyn SheetStore) -> Result<Vec<Submission>, SheetError> {
    let table = store.fetch_all(FILES_SHEET).await?;
    Ok(table
        .rows
        .iter()
        .filter_map(|row| {
            let submission = Submission::from_row(row);
            if submission.is_none() {
                tracing::warn!("Skipping malformed files row {:?}", row.first());
            }
            submission
        })
        .collect())
}

pub async fn submissions_of(store: &dyn SheetStore, user_id: &str) -> Result<Vec<Submission>, SheetError> {
    Ok(list_submissions(store)
        .await?
        .into_iter()
        .filter(|s| s.user_id == user_id)
        .collect())
}

pub async fn get_submission(store: &dyn SheetStore, id: &str) -> Result<Option<Submission>, SheetError> {
    Ok(list_submissions(store).await?.into_iter().find(|s| s.id == id))
}

/// Writes score, feedback and the graded status as one range. Returns
/// `false` when no submission has this id.
pub async fn grade_submission(
    store: &dyn SheetStore,
    submission_id: &str,
    score: Score,
    feedback: &str,
) -> Result<bool, SheetError> {
    store
        .find_and_update(
            FILES_SHEET,
            submission_id,
            GRADE_FIRST_COLUMN,
            vec![
                score.value().to_string(),
                feedback.to_string(),
                SubmissionStatus::Graded.as_str().to_string(),
            ],
        )
        .await
}

pub struct NewResource {
    pub title: String,
    pub description: String,
    pub kind: ResourceKind,
    pub link: String,
}

/// A library entry with the name of whoever shared it.
#[derive(Debug, Clone, Serialize)]
pub struct SharedResource {
    #[serde(flatten)]
    pub resource: Resource,
    pub uploader_name: String,
}

/// Shares a resource with the trainer's own group.
pub async fn add_resource(
    store: &dyn SheetStore,
    trainer: &User,
    new_resource: NewResource,
) -> Result<Resource, SheetError> {
    let resource = Resource {
        id: generate_record_id(),
        title: new_resource.title,
        description: new_resource.description,
        kind: new_resource.kind,
        link: new_resource.link,
        uploaded_by: trainer.id.clone(),
        audience: Audience::Group,
        created_at: timestamp_now(),
    };
    store.append_row(RESOURCES_SHEET, resource.to_row()).await?;
    Ok(resource)
}

async fn list_resources(store: &dyn SheetStore) -> Result<Vec<Resource>, SheetError> {
    let table = fetch_optional(store, RESOURCES_SHEET).await?;
    Ok(table.rows.iter().filter_map(|row| Resource::from_row(row)).collect())
}

/// Library as `user` sees it, newest first. Trainers get public resources
/// and their own; trainees get public ones and their trainer's.
pub async fn resources_for(store: &dyn SheetStore, user: &User) -> Result<Vec<SharedResource>, SheetError> {
    let users = list_users(store).await?;
    let visible = list_resources(store)
        .await?
        .into_iter()
        .rev()
        .filter(|r| match user.role {
            Role::Trainer => r.audience == Audience::All || r.uploaded_by == user.id,
            Role::Trainee => r.visible_to_trainee(user.assigned_trainer_id.as_deref()),
        })
        .map(|resource| {
            let uploader_name = users
                .iter()
                .find(|u| u.id == resource.uploaded_by)
                .map(|u| u.name.clone())
                .unwrap_or_else(|| "Unknown".to_string());
            SharedResource {
                resource,
                uploader_name,
            }
        })
        .collect();
    Ok(visible)
}

/// Deletes a resource the trainer shared. Returns `false` without writing
/// when the id is unknown or belongs to someone else.
pub async fn delete_resource(
    store: &dyn SheetStore,
    trainer_id: &str,
    resource_id: &str,
) -> Result<bool, SheetError> {
    if resource_id.is_empty() {
        return Ok(false);
    }
    let table = fetch_optional(store, RESOURCES_SHEET).await?;
    let position = table.rows.iter().position(|row| {
        Resource::from_row(row).is_some_and(|r| r.id == resource_id && r.uploaded_by == trainer_id)
    });
    match position {
        Some(index) => {
            store.delete_row(RESOURCES_SHEET, index + 2).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Meetings `user` is invited to, newest first.
pub async fn meetings_for(store: &dyn SheetStore, user: &User) -> Result<Vec<Meeting>, SheetError> {
    let table = fetch_optional(store, MEETINGS_SHEET).await?;
    Ok(table
        .rows
        .iter()
        .rev()
        .filter_map(|row| Meeting::from_row(row))
        .filter(|m| m.visible_to(user))
        .collect())
}

/// Attendance the trainer recorded on `date`.
pub async fn attendance_on(
    store: &dyn SheetStore,
    trainer_id: &str,
    date: &str,
) -> Result<Vec<AttendanceRecord>, SheetError> {
    let table = fetch_optional(store, ATTENDANCE_SHEET).await?;
    Ok(table
        .rows
        .iter()
        .filter_map(|row| AttendanceRecord::from_row(row))
        .filter(|r| r.trainer_id == trainer_id && r.date == date)
        .collect())
}

/// Records one status per trainee for `date`. A trainee who already has a
/// row for that date has it overwritten in place; others get a new row.
pub async fn save_attendance(
    store: &dyn SheetStore,
    trainer_id: &str,
    date: &str,
    marks: &[(String, AttendanceStatus)],
) -> Result<(), SheetError> {
    let table = fetch_optional(store, ATTENDANCE_SHEET).await?;
    for (trainee_id, status) in marks {
        let existing = table.rows.iter().position(|row| {
            row.get(1).map(String::as_str) == Some(trainee_id.as_str())
                && row.get(3).map(String::as_str) == Some(date)
        });
        match existing {
            Some(index) => {
                store
                    .update_cells(
                        ATTENDANCE_SHEET,
                        index + 2,
                        ATTENDANCE_FIRST_COLUMN,
                        vec![trainer_id.to_string(), date.to_string(), status.as_str().to_string()],
                    )
                    .await?;
            }
            None => {
                let record = AttendanceRecord {
                    id: generate_record_id(),
                    trainee_id: trainee_id.clone(),
                    trainer_id: trainer_id.to_string(),
                    date: date.to_string(),
                    status: *status,
                };
                store.append_row(ATTENDANCE_SHEET, record.to_row()).await?;
            }
        }
    }
    Ok(())
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Trainee,
    Trainer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Trainee => "trainee",
            Role::Trainer => "trainer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "trainee" => Some(Role::Trainee),
            "trainer" => Some(Role::Trainer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    #[serde(rename = "pending review")]
    PendingReview,
    #[serde(rename = "graded")]
    Graded,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::PendingReview => "pending review",
            SubmissionStatus::Graded => "graded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "pending review" => Some(SubmissionStatus::PendingReview),
            "graded" => Some(SubmissionStatus::Graded),
            _ => None,
        }
    }
}

/// Row of the `users` worksheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub phone: String,
    pub role: Role,
    pub assigned_trainer_id: Option<String>,
}

impl User {
    pub fn from_row(row: &[String]) -> Option<Self> {
        let cell = |i: usize| row.get(i).cloned().unwrap_or_default();
        let role = Role::parse(&cell(5))?;
        let id = cell(0);
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id,
            name: cell(1),
            email: cell(2),
            password: cell(3),
            phone: cell(4),
            role,
            assigned_trainer_id: Some(cell(6)).filter(|t| !t.is_empty()),
        })
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.email.clone(),
            self.password.clone(),
            self.phone.clone(),
            self.role.as_str().to_string(),
            self.assigned_trainer_id.clone().unwrap_or_default(),
        ]
    }
}

/// Row of the `files` worksheet. Only the filename of the upload is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    pub description: String,
    pub upload_date: String,
    pub score: Option<String>,
    pub feedback: Option<String>,
    pub status: SubmissionStatus,
    pub student_name: String,
}

impl Submission {
    pub fn from_row(row: &[String]) -> Option<Self> {
        let cell = |i: usize| row.get(i).cloned().unwrap_or_default();
        let optional = |i: usize| Some(cell(i)).filter(|v| !v.is_empty());
        let id = cell(0);
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id,
            user_id: cell(1),
            filename: cell(2),
            description: cell(3),
            upload_date: cell(4),
            score: optional(5),
            feedback: optional(6),
            status: SubmissionStatus::parse(&cell(7))?,
            student_name: cell(8),
        })
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.user_id.clone(),
            self.filename.clone(),
            self.description.clone(),
            self.upload_date.clone(),
            self.score.clone().unwrap_or_default(),
            self.feedback.clone().unwrap_or_default(),
            self.status.as_str().to_string(),
            self.student_name.clone(),
        ]
    }

    /// Label shown in the trainer's grading selector.
    pub fn label(&self) -> String {
        format!("{} - {}", self.student_name, self.filename)
    }
}

/// Row of the `login_logs` worksheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginEvent {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub role: String,
    pub timestamp: String,
}

impl LoginEvent {
    pub fn from_row(row: &[String]) -> Option<Self> {
        let cell = |i: usize| row.get(i).cloned().unwrap_or_default();
        let id = cell(0);
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id,
            user_id: cell(1),
            user_name: cell(2),
            role: cell(3),
            timestamp: cell(4),
        })
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.user_id.clone(),
            self.user_name.clone(),
            self.role.clone(),
            self.timestamp.clone(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pdf,
    Video,
    Link,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Pdf => "pdf",
            ResourceKind::Video => "video",
            ResourceKind::Link => "link",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "pdf" => Some(ResourceKind::Pdf),
            "video" => Some(ResourceKind::Video),
            "link" => Some(ResourceKind::Link),
            _ => None,
        }
    }
}

/// Who sees a resource or meeting. `Trainers` only applies to meetings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    All,
    Trainers,
    Group,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::All => "all",
            Audience::Trainers => "trainers",
            Audience::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "all" => Some(Audience::All),
            "trainers" => Some(Audience::Trainers),
            "group" => Some(Audience::Group),
            _ => None,
        }
    }
}

/// Row of the `resources` worksheet: a link shared in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind: ResourceKind,
    pub link: String,
    pub uploaded_by: String,
    pub audience: Audience,
    pub created_at: String,
}

impl Resource {
    pub fn from_row(row: &[String]) -> Option<Self> {
        let cell = |i: usize| row.get(i).cloned().unwrap_or_default();
        let id = cell(0);
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id,
            title: cell(1),
            description: cell(2),
            kind: ResourceKind::parse(&cell(3))?,
            link: cell(4),
            uploaded_by: cell(5),
            audience: Audience::parse(&cell(6))?,
            created_at: cell(7),
        })
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.title.clone(),
            self.description.clone(),
            self.kind.as_str().to_string(),
            self.link.clone(),
            self.uploaded_by.clone(),
            self.audience.as_str().to_string(),
            self.created_at.clone(),
        ]
    }

    /// Resources a trainee sees: everything public plus what their own
    /// trainer shared with the group.
    pub fn visible_to_trainee(&self, assigned_trainer_id: Option<&str>) -> bool {
        match self.audience {
            Audience::All => true,
            Audience::Group => assigned_trainer_id == Some(self.uploaded_by.as_str()),
            Audience::Trainers => false,
        }
    }
}

/// Row of the `meetings` worksheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub link: String,
    pub topic: String,
    pub audience: Audience,
    /// Trainer whose group is invited when `audience` is `group`.
    pub target_group_id: Option<String>,
    pub created_at: String,
}

impl Meeting {
    pub fn from_row(row: &[String]) -> Option<Self> {
        let cell = |i: usize| row.get(i).cloned().unwrap_or_default();
        let id = cell(0);
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id,
            link: cell(1),
            topic: cell(2),
            audience: Audience::parse(&cell(3))?,
            target_group_id: Some(cell(4)).filter(|g| !g.is_empty()),
            created_at: cell(5),
        })
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.link.clone(),
            self.topic.clone(),
            self.audience.as_str().to_string(),
            self.target_group_id.clone().unwrap_or_default(),
            self.created_at.clone(),
        ]
    }

    pub fn visible_to(&self, user: &User) -> bool {
        let group = self.target_group_id.as_deref();
        match (self.audience, user.role) {
            (Audience::All, _) => true,
            (Audience::Trainers, Role::Trainer) => true,
            (Audience::Trainers, Role::Trainee) => false,
            (Audience::Group, Role::Trainer) => group == Some(user.id.as_str()),
            (Audience::Group, Role::Trainee) => {
                group.is_some() && group == user.assigned_trainer_id.as_deref()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            _ => None,
        }
    }
}

/// Row of the `attendance` worksheet. One row per trainee and date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub trainee_id: String,
    pub trainer_id: String,
    /// `YYYY-MM-DD`
    pub date: String,
    pub status: AttendanceStatus,
}

impl AttendanceRecord {
    pub fn from_row(row: &[String]) -> Option<Self> {
        let cell = |i: usize| row.get(i).cloned().unwrap_or_default();
        let id = cell(0);
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id,
            trainee_id: cell(1),
            trainer_id: cell(2),
            date: cell(3),
            status: AttendanceStatus::parse(&cell(4))?,
        })
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.trainee_id.clone(),
            self.trainer_id.clone(),
            self.date.clone(),
            self.status.as_str().to_string(),
        ]
    }
}

/// Whole-number score out of 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score(u8);

impl Score {
    pub fn parse(input: &str) -> Option<Self> {
        input
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|v| *v <= 100)
            .map(Score)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

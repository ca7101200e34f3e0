use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use trainhub::db::{self, NewUser, Role};
use trainhub::sheets::{MemoryStore, SharedStore, SheetStore};
use trainhub::{build_router, AppState, Config};

struct TestApp {
    addr: SocketAddr,
    store: Arc<MemoryStore>,
    state: AppState,
    client: Client,
}

impl TestApp {
    async fn spawn() -> Self {
        let store = Arc::new(MemoryStore::with_default_sheets());
        let shared: SharedStore = store.clone();
        let state = AppState::new(shared, Config::memory());
        let app = build_router(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("client");
        Self {
            addr,
            store,
            state,
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn get(&self, path: &str, token: Option<&str>) -> Response {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.header(COOKIE, format!("trainhub_session={}", token));
        }
        req.send().await.expect("get")
    }

    async fn post_form(&self, path: &str, token: Option<&str>, fields: &[(&str, &str)]) -> Response {
        let mut req = self.client.post(self.url(path)).form(fields);
        if let Some(token) = token {
            req = req.header(COOKIE, format!("trainhub_session={}", token));
        }
        req.send().await.expect("post")
    }

    async fn register(&self, name: &str, email: &str, password: &str, role: &str, trainer_id: &str) {
        let resp = self
            .post_form(
                "/register",
                None,
                &[
                    ("name", name),
                    ("email", email),
                    ("phone", "0100"),
                    ("password", password),
                    ("role", role),
                    ("assigned_trainer_id", trainer_id),
                ],
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.text().await.unwrap().contains("Account created"));
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let resp = self
            .post_form("/login", None, &[("email", email), ("password", password)])
            .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        cookie_token(&resp).expect("session cookie")
    }

    async fn submit(&self, token: &str, filename: &str, description: &str) -> Response {
        let form = Form::new().text("description", description.to_string()).part(
            "file",
            Part::bytes(b"%PDF-1.4 fake".to_vec()).file_name(filename.to_string()),
        );
        self.client
            .post(self.url("/submissions"))
            .header(COOKIE, format!("trainhub_session={}", token))
            .multipart(form)
            .send()
            .await
            .expect("submit")
    }
}

fn cookie_token(resp: &Response) -> Option<String> {
    let raw = resp.headers().get(SET_COOKIE)?.to_str().ok()?;
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    (name == "trainhub_session" && !value.is_empty()).then(|| value.to_string())
}

#[tokio::test]
async fn anonymous_visitor_sees_login_and_register_forms() {
    let app = TestApp::spawn().await;

    let login = app.get("/", None).await;
    assert_eq!(login.status(), StatusCode::OK);
    assert!(login.text().await.unwrap().contains("action=\"/login\""));

    let register = app.get("/?view=register", None).await;
    assert!(register.text().await.unwrap().contains("action=\"/register\""));
}

#[tokio::test]
async fn login_with_registered_credentials_opens_role_dashboard() {
    let app = TestApp::spawn().await;
    app.register("Hala Trainer", "hala@x.io", "pw-t", "trainer", "").await;

    let token = app.login("hala@x.io", "pw-t").await;
    let session = app.state.sessions.get(&token).await.expect("session");
    assert_eq!(session.user.role, Role::Trainer);

    let page = app.get("/", Some(&token)).await.text().await.unwrap();
    assert!(page.contains("Trainer dashboard: Hala Trainer"));
    assert!(page.contains("Welcome Hala Trainer"));

    let logins = db::recent_logins(&*app.store, 5).await.unwrap();
    assert_eq!(logins.len(), 1);
}

#[tokio::test]
async fn wrong_password_is_rejected_without_creating_a_session() {
    let app = TestApp::spawn().await;
    app.register("Sami", "sami@x.io", "right", "trainee", "").await;

    let resp = app
        .post_form("/login", None, &[("email", "sami@x.io"), ("password", "wrong")])
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().get(SET_COOKIE).is_none());
    assert!(resp.text().await.unwrap().contains("Incorrect email or password"));
    assert_eq!(app.state.sessions.len().await, 0);
}

#[tokio::test]
async fn empty_login_fields_are_refused() {
    let app = TestApp::spawn().await;
    let resp = app.post_form("/login", None, &[("email", ""), ("password", "")]).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(resp.text().await.unwrap().contains("Please fill in all fields"));
}

#[tokio::test]
async fn submission_flow_from_upload_to_grade() {
    let app = TestApp::spawn().await;
    let trainer = db::create_user(
        &*app.store,
        NewUser {
            name: "Yara".to_string(),
            email: "yara@x.io".to_string(),
            password: "pw-y".to_string(),
            phone: String::new(),
            role: Role::Trainer,
            assigned_trainer_id: None,
        },
    )
    .await
    .unwrap();
    app.register("Mona", "mona@x.io", "pw-m", "trainee", &trainer.id).await;

    let trainee = app.login("mona@x.io", "pw-m").await;
    let dashboard = app.get("/", Some(&trainee)).await.text().await.unwrap();
    assert!(dashboard.contains("Your trainer: Yara"));

    let resp = app.submit(&trainee, "week1.pdf", "https://drive.example/w1").await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let submissions = db::list_submissions(&*app.store).await.unwrap();
    assert_eq!(submissions.len(), 1);
    let submission = &submissions[0];
    assert_eq!(submission.filename, "week1.pdf");
    assert_eq!(submission.student_name, "Mona");

    let page = app.get("/", Some(&trainee)).await.text().await.unwrap();
    assert!(page.contains("week1.pdf"));
    assert!(page.contains("pending review"));

    // Trainees cannot grade.
    let forbidden = app
        .post_form(
            "/grade",
            Some(&trainee),
            &[("submission_id", submission.id.as_str()), ("score", "100"), ("feedback", "self")],
        )
        .await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let grader = app.login("yara@x.io", "pw-y").await;
    let trainer_page = app.get("/", Some(&grader)).await.text().await.unwrap();
    assert!(trainer_page.contains("Mona - week1.pdf"));
    assert!(trainer_page.contains("mona@x.io"));

    let graded = app
        .post_form(
            "/grade",
            Some(&grader),
            &[("submission_id", submission.id.as_str()), ("score", "91"), ("feedback", "Clear structure")],
        )
        .await;
    assert_eq!(graded.status(), StatusCode::SEE_OTHER);

    let status: Value = app
        .get(&format!("/api/submissions/{}", submission.id), Some(&trainee))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "graded");
    assert_eq!(status["score"], "91");
    assert_eq!(status["feedback"], "Clear structure");
}

#[tokio::test]
async fn invalid_score_and_unknown_submission_write_nothing() {
    let app = TestApp::spawn().await;
    app.register("Adel", "adel@x.io", "pw", "trainer", "").await;
    let grader = app.login("adel@x.io", "pw").await;
    let writes = app.store.write_calls();

    let bad_score = app
        .post_form(
            "/grade",
            Some(&grader),
            &[("submission_id", "anything"), ("score", "150"), ("feedback", "")],
        )
        .await;
    assert_eq!(bad_score.status(), StatusCode::SEE_OTHER);
    let page = app.get("/", Some(&grader)).await.text().await.unwrap();
    assert!(page.contains("Score must be a whole number from 0 to 100"));

    let missing = app
        .post_form(
            "/grade",
            Some(&grader),
            &[("submission_id", "does-not-exist"), ("score", "50"), ("feedback", "x")],
        )
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert!(missing.text().await.unwrap().contains("Submission not found"));

    assert_eq!(app.store.write_calls(), writes);
}

#[tokio::test]
async fn trainee_never_sees_other_submissions_but_trainer_sees_all() {
    let app = TestApp::spawn().await;
    app.register("Ali", "ali@x.io", "pw-a", "trainee", "").await;
    app.register("Bea", "bea@x.io", "pw-b", "trainee", "").await;
    app.register("Tamer", "tamer@x.io", "pw-t", "trainer", "").await;

    let ali = app.login("ali@x.io", "pw-a").await;
    let bea = app.login("bea@x.io", "pw-b").await;
    app.submit(&ali, "ali-report.docx", "").await;
    app.submit(&bea, "bea-diagram.png", "").await;

    let ali_page = app.get("/", Some(&ali)).await.text().await.unwrap();
    assert!(ali_page.contains("ali-report.docx"));
    assert!(!ali_page.contains("bea-diagram.png"));

    let bea_submission = db::list_submissions(&*app.store)
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.filename == "bea-diagram.png")
        .unwrap();
    let foreign = app
        .get(&format!("/api/submissions/{}", bea_submission.id), Some(&ali))
        .await;
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

    let trainer = app.login("tamer@x.io", "pw-t").await;
    let trainer_page = app.get("/", Some(&trainer)).await.text().await.unwrap();
    assert!(trainer_page.contains("ali-report.docx"));
    assert!(trainer_page.contains("bea-diagram.png"));
}

#[tokio::test]
async fn rejected_file_types_are_not_recorded() {
    let app = TestApp::spawn().await;
    app.register("Rana", "rana@x.io", "pw", "trainee", "").await;
    let token = app.login("rana@x.io", "pw").await;

    let resp = app.submit(&token, "virus.exe", "").await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(db::list_submissions(&*app.store).await.unwrap().is_empty());

    let page = app.get("/", Some(&token)).await.text().await.unwrap();
    assert!(page.contains("Only pdf, docx, png and jpg files are accepted"));
}

#[tokio::test]
async fn profile_update_changes_password_for_next_login() {
    let app = TestApp::spawn().await;
    app.register("Nada", "nada@x.io", "old-pw", "trainee", "").await;
    let token = app.login("nada@x.io", "old-pw").await;

    let resp = app
        .post_form("/profile", Some(&token), &[("phone", "0122"), ("password", "new-pw")])
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let session = app.state.sessions.get(&token).await.unwrap();
    assert_eq!(session.user.phone, "0122");

    let stale = app
        .post_form("/login", None, &[("email", "nada@x.io"), ("password", "old-pw")])
        .await;
    assert_eq!(stale.status(), StatusCode::UNAUTHORIZED);
    app.login("nada@x.io", "new-pw").await;
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = TestApp::spawn().await;
    app.register("Omar", "omar@x.io", "pw", "trainee", "").await;
    let token = app.login("omar@x.io", "pw").await;

    let resp = app.post_form("/logout", Some(&token), &[]).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let cleared = resp.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));

    let page = app.get("/", Some(&token)).await.text().await.unwrap();
    assert!(page.contains("action=\"/login\""));

    let anonymous = app.post_form("/grade", None, &[("submission_id", "x"), ("score", "1")]).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn healthz_reports_backend() {
    let app = TestApp::spawn().await;
    let body: Value = app.get("/healthz", None).await.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "memory");
}

#[tokio::test]
async fn registration_with_missing_fields_is_refused_without_writes() {
    let app = TestApp::spawn().await;
    let writes = app.store.write_calls();

    for (name, email, password) in [("", "a@x.io", "pw"), ("Ali", "", "pw"), ("Ali", "a@x.io", "")] {
        let resp = app
            .post_form(
                "/register",
                None,
                &[("name", name), ("email", email), ("password", password), ("role", "trainee")],
            )
            .await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(resp.text().await.unwrap().contains("Please fill in all the details"));
    }
    assert_eq!(app.store.write_calls(), writes);
}

#[tokio::test]
async fn registration_with_unknown_role_or_trainer_is_refused_without_writes() {
    let app = TestApp::spawn().await;
    app.register("Sami", "sami@x.io", "pw", "trainee", "").await;
    let sami = db::list_users(&*app.store).await.unwrap().remove(0);
    let writes = app.store.write_calls();

    let admin = app
        .post_form(
            "/register",
            None,
            &[("name", "Root"), ("email", "root@x.io"), ("password", "pw"), ("role", "admin")],
        )
        .await;
    assert_eq!(admin.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(admin.text().await.unwrap().contains("Unknown account type"));

    // A trainee id is not a trainer id.
    for trainer_id in [sami.id.as_str(), "no-such-user"] {
        let resp = app
            .post_form(
                "/register",
                None,
                &[
                    ("name", "Lina"),
                    ("email", "lina@x.io"),
                    ("password", "pw"),
                    ("role", "trainee"),
                    ("assigned_trainer_id", trainer_id),
                ],
            )
            .await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(resp.text().await.unwrap().contains("The selected trainer does not exist"));
    }

    assert_eq!(app.store.write_calls(), writes);
    assert_eq!(db::list_users(&*app.store).await.unwrap().len(), 1);
}

#[tokio::test]
async fn logging_in_again_replaces_the_previous_session() {
    let app = TestApp::spawn().await;
    app.register("Omar", "omar@x.io", "pw", "trainee", "").await;
    let first = app.login("omar@x.io", "pw").await;

    let resp = app
        .post_form("/login", Some(&first), &[("email", "omar@x.io"), ("password", "pw")])
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let second = cookie_token(&resp).expect("new session cookie");

    assert_ne!(first, second);
    assert!(app.state.sessions.get(&first).await.is_none());
    assert!(app.state.sessions.get(&second).await.is_some());
    assert_eq!(app.state.sessions.len().await, 1);
}

#[tokio::test]
async fn grading_with_blank_submission_id_touches_no_row() {
    let app = TestApp::spawn().await;
    app.register("Adel", "adel@x.io", "pw", "trainer", "").await;
    let grader = app.login("adel@x.io", "pw").await;
    // A row with a blank id cell, as left behind by a hand edit.
    app.store
        .append_row(
            db::FILES_SHEET,
            vec![String::new(), "u".into(), "orphan.pdf".into(), String::new(), String::new(), String::new(), String::new(), "pending review".into(), "X".into()],
        )
        .await
        .unwrap();
    let writes = app.store.write_calls();

    let resp = app
        .post_form("/grade", Some(&grader), &[("submission_id", ""), ("score", "80"), ("feedback", "x")])
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.store.write_calls(), writes);

    let table = app.store.fetch_all(db::FILES_SHEET).await.unwrap();
    assert_eq!(table.rows[0][5], "");
    let page = app.get("/", Some(&grader)).await.text().await.unwrap();
    assert!(page.contains("Choose a submission to grade"));
}

async fn trainer_with_trainee(app: &TestApp) -> (String, String, String) {
    app.register("Hala", "hala@x.io", "pw-t", "trainer", "").await;
    let trainer_id = db::list_trainers(&*app.store).await.unwrap().remove(0).id;
    app.register("Mona", "mona@x.io", "pw-m", "trainee", &trainer_id).await;
    let trainer = app.login("hala@x.io", "pw-t").await;
    let trainee = app.login("mona@x.io", "pw-m").await;
    (trainer_id, trainer, trainee)
}

#[tokio::test]
async fn shared_resources_reach_the_group_and_can_be_deleted() {
    let app = TestApp::spawn().await;
    let (_, trainer, trainee) = trainer_with_trainee(&app).await;
    app.register("Karim", "karim@x.io", "pw-k", "trainer", "").await;
    let other_trainer = app.login("karim@x.io", "pw-k").await;

    let resp = app
        .post_form(
            "/resources",
            Some(&trainer),
            &[("title", "Week 1 reading"), ("kind", "pdf"), ("description", ""), ("link", "https://docs.example/w1.pdf")],
        )
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let page = app.get("/", Some(&trainee)).await.text().await.unwrap();
    assert!(page.contains("Week 1 reading"));
    assert!(page.contains("shared by Hala"));
    let other_page = app.get("/", Some(&other_trainer)).await.text().await.unwrap();
    assert!(!other_page.contains("Week 1 reading"));

    let missing_link = app
        .post_form("/resources", Some(&trainer), &[("title", "No link"), ("kind", "link"), ("link", "")])
        .await;
    assert_eq!(missing_link.status(), StatusCode::SEE_OTHER);
    let bad_kind = app
        .post_form("/resources", Some(&trainer), &[("title", "Pod"), ("kind", "podcast"), ("link", "https://x")])
        .await;
    assert_eq!(bad_kind.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let trainee_try = app
        .post_form("/resources", Some(&trainee), &[("title", "Mine"), ("kind", "link"), ("link", "https://x")])
        .await;
    assert_eq!(trainee_try.status(), StatusCode::FORBIDDEN);

    let mona = db::authenticate(&*app.store, "mona@x.io", "pw-m").await.unwrap().unwrap();
    let shared = db::resources_for(&*app.store, &mona).await.unwrap();
    assert_eq!(shared.len(), 1);
    let resource_id = shared[0].resource.id.clone();

    let not_theirs = app
        .post_form("/resources/delete", Some(&other_trainer), &[("resource_id", resource_id.as_str())])
        .await;
    assert_eq!(not_theirs.status(), StatusCode::NOT_FOUND);

    let deleted = app
        .post_form("/resources/delete", Some(&trainer), &[("resource_id", resource_id.as_str())])
        .await;
    assert_eq!(deleted.status(), StatusCode::SEE_OTHER);
    assert!(db::resources_for(&*app.store, &mona).await.unwrap().is_empty());
}

#[tokio::test]
async fn attendance_is_recorded_per_day_and_shown_back() {
    let app = TestApp::spawn().await;
    let (trainer_id, trainer, trainee) = trainer_with_trainee(&app).await;
    let mona_id = db::authenticate(&*app.store, "mona@x.io", "pw-m").await.unwrap().unwrap().id;

    let resp = app
        .post_form(
            "/attendance",
            Some(&trainer),
            &[("date", "2024-03-05"), ("present", mona_id.as_str())],
        )
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        resp.headers().get(reqwest::header::LOCATION).unwrap(),
        "/?date=2024-03-05"
    );

    let day = db::attendance_on(&*app.store, &trainer_id, "2024-03-05").await.unwrap();
    assert_eq!(day.len(), 1);
    assert_eq!(day[0].status, db::AttendanceStatus::Present);

    // Unticked on resubmission means absent, overwriting the same row.
    app.post_form("/attendance", Some(&trainer), &[("date", "2024-03-05")]).await;
    let day = db::attendance_on(&*app.store, &trainer_id, "2024-03-05").await.unwrap();
    assert_eq!(day.len(), 1);
    assert_eq!(day[0].status, db::AttendanceStatus::Absent);

    let page = app.get("/?date=2024-03-05", Some(&trainer)).await.text().await.unwrap();
    assert!(page.contains("Save attendance for 2024-03-05"));

    let writes = app.store.write_calls();
    let bad_date = app
        .post_form("/attendance", Some(&trainer), &[("date", "05/03/2024")])
        .await;
    assert_eq!(bad_date.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.store.write_calls(), writes);

    let trainee_try = app
        .post_form("/attendance", Some(&trainee), &[("date", "2024-03-05")])
        .await;
    assert_eq!(trainee_try.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn trainer_upload_lands_in_the_trainees_list() {
    let app = TestApp::spawn().await;
    let (_, trainer, trainee) = trainer_with_trainee(&app).await;
    let mona_id = db::authenticate(&*app.store, "mona@x.io", "pw-m").await.unwrap().unwrap().id;
    app.register("Stray", "stray@x.io", "pw", "trainee", "").await;
    let stray_id = db::authenticate(&*app.store, "stray@x.io", "pw").await.unwrap().unwrap().id;

    let upload = |trainee_id: String, filename: &'static str| {
        let form = Form::new()
            .text("trainee_id", trainee_id)
            .text("description", "")
            .part("file", Part::bytes(b"data".to_vec()).file_name(filename));
        app.client
            .post(app.url("/trainee-files"))
            .header(COOKIE, format!("trainhub_session={}", trainer))
            .multipart(form)
            .send()
    };

    let resp = upload(mona_id.clone(), "corrected.pdf").await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    upload(stray_id, "misdirected.pdf").await.unwrap();

    let submissions = db::list_submissions(&*app.store).await.unwrap();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].user_id, mona_id);
    assert_eq!(submissions[0].student_name, "Mona");
    assert_eq!(submissions[0].description, "File from your trainer");

    let page = app.get("/", Some(&trainee)).await.text().await.unwrap();
    assert!(page.contains("corrected.pdf"));
}

#[tokio::test]
async fn meetings_for_the_group_show_on_both_dashboards() {
    let app = TestApp::spawn().await;
    let (trainer_id, trainer, trainee) = trainer_with_trainee(&app).await;
    for (id, topic, audience, group) in [
        ("m1", "Kickoff", "all", ""),
        ("m2", "Trainer sync", "trainers", ""),
        ("m3", "Group review", "group", trainer_id.as_str()),
    ] {
        app.store
            .append_row(
                db::MEETINGS_SHEET,
                vec![id.into(), format!("https://meet.example/{}", id), topic.into(), audience.into(), group.into(), String::new()],
            )
            .await
            .unwrap();
    }

    let trainee_page = app.get("/", Some(&trainee)).await.text().await.unwrap();
    assert!(trainee_page.contains("Group review"));
    assert!(trainee_page.contains("Kickoff"));
    assert!(!trainee_page.contains("Trainer sync"));

    let trainer_page = app.get("/", Some(&trainer)).await.text().await.unwrap();
    assert!(trainer_page.contains("Trainer sync"));
}

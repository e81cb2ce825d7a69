use std::collections::BTreeMap;

use rocket::{Build, Rocket, Route};

pub mod admin;
pub mod courses;
pub mod dashboard;
pub mod enrollment;
pub mod feed;
pub mod files;
pub mod sessions;
pub mod users;

use admin::*;
use courses::*;
use dashboard::*;
use enrollment::*;
use feed::*;
use files::*;
use sessions::*;
use users::*;

use utoipa::OpenApi;

use crate::{
    data::{
        analytics::{
            AdminDashboard, CourseAnalytics, Dashboard, EnrolledStudent, InstructorCourse,
            InstructorDashboard, RoleCounts, StatusCounts, StudentCourse, StudentDashboard,
        },
        attendance::{
            AttendanceLog, AttendanceRecord, AttendanceResponse, AttendanceSummary,
            MarkAttendance,
        },
        course::{
            catalog::{LevelFilter, PriceFilter},
            db::{CourseCreateData, CourseUpdateData, ModuleData, ModuleUpdateData},
            Course, CourseLevel, CourseResponse, CourseStatus, CourseSummary, Lesson, LessonType,
            Module,
        },
        enrollment::{EnrolledCourse, EnrollRequest, Enrollment, EnrollmentResponse},
        session::{LiveSession, ScheduleRequest, SessionSchedule, SessionStatus, SessionView},
        user::{
            db::{LessonCompletion, ProfileUpdate, RoleChange, UserLoginData, UserSignupData},
            CourseProgress, LessonProgress, UserCreatedResponse, UserResponse,
        },
    },
    feed::ChangeEvent,
    middleware::paging::{CoursePage, UserPage},
    payment::{PaymentMethod, PaymentReceipt},
    resp::{jwt::doc::JWTAuth, problem::Problem},
    role::Role,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        user_create,
        login_submit,
        logout,
        user_me,
        user_update,
        user_get,
        user_delete,
        user_list,
        user_set_role,
        lesson_progress,
        course_list,
        course_mine,
        course_list_all,
        course_get,
        course_create,
        course_update,
        course_delete,
        module_create,
        module_update,
        module_delete,
        course_analytics,
        course_students,
        course_enroll,
        enrollment_list,
        session_schedule,
        session_list,
        attendance_mark,
        attendance_get,
        dashboard_get,
        feed_stream,
        admin_bootstrap,
        admin_seed,
    ),
    components(schemas(
        Role,
        Problem,
        UserResponse,
        UserCreatedResponse,
        UserListResponse,
        UserLoginData,
        UserSignupData,
        ProfileUpdate,
        RoleChange,
        LessonCompletion,
        LessonProgress,
        CourseProgress,
        Course,
        CourseLevel,
        CourseStatus,
        LessonType,
        Lesson,
        Module,
        CourseResponse,
        CourseSummary,
        CourseCreateData,
        CourseUpdateData,
        ModuleData,
        ModuleUpdateData,
        LevelFilter,
        PriceFilter,
        CoursePage,
        UserPage,
        CourseAnalytics,
        EnrolledStudent,
        Enrollment,
        EnrollRequest,
        EnrollmentResponse,
        EnrolledCourse,
        PaymentMethod,
        PaymentReceipt,
        LiveSession,
        ScheduleRequest,
        SessionSchedule,
        SessionStatus,
        SessionView,
        AttendanceRecord,
        AttendanceLog,
        AttendanceSummary,
        AttendanceResponse,
        MarkAttendance,
        Dashboard,
        StudentDashboard,
        StudentCourse,
        InstructorDashboard,
        InstructorCourse,
        AdminDashboard,
        RoleCounts,
        StatusCounts,
        ChangeEvent,
    )),
    modifiers(&JWTAuth, &V1_PREFIX)
)]
pub struct ApiDocV1;

pub struct PathPrefix(pub &'static str);
static V1_PREFIX: PathPrefix = PathPrefix("/api/v1");

impl utoipa::Modify for PathPrefix {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut new_paths = BTreeMap::new();

        for (path, item) in std::mem::take(&mut openapi.paths.paths) {
            new_paths.insert(self.0.to_string() + path.as_ref(), item);
        }

        openapi.paths.paths = new_paths;
    }
}

pub fn api_v1() -> Vec<Route> {
    routes![
        user_create,
        login_submit,
        logout,
        user_me,
        user_update,
        user_get,
        user_delete,
        user_list,
        user_set_role,
        lesson_progress,
        course_list,
        course_mine,
        course_list_all,
        course_get,
        course_create,
        course_update,
        course_delete,
        module_create,
        module_update,
        module_delete,
        course_analytics,
        course_students,
        course_enroll,
        enrollment_list,
        session_schedule,
        session_list,
        attendance_mark,
        attendance_get,
        dashboard_get,
        feed_stream,
        admin_bootstrap,
        admin_seed,
    ]
}

#[cfg(feature = "swagger-ui")]
pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    use utoipa_swagger_ui::SwaggerUi;

    rocket
        .mount("/api/v1", api_v1())
        .mount(
            "/",
            SwaggerUi::new("/swagger/<_..>").url("/api/v1/openapi.json", ApiDocV1::openapi()),
        )
        .mount("/", routes![app, app_path])
}

/// Serves the OpenAPI document when swagger UI isn't compiled in.
#[cfg(not(feature = "swagger-ui"))]
#[get("/openapi.json")]
pub fn openapi_json() -> rocket::serde::json::Value {
    match serde_json::to_value(ApiDocV1::openapi()) {
        Ok(it) => it,
        Err(e) => {
            tracing::error!("Unable to serialize OpenAPI document: {}", e);
            rocket::serde::json::Value::Null
        }
    }
}

#[cfg(not(feature = "swagger-ui"))]
pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/api/v1", api_v1())
        .mount("/api/v1", routes![openapi_json])
        .mount("/", routes![app, app_path])
}

#[cfg(test)]
pub(crate) mod testing {
    use rocket::http::{ContentType, Header, Status};
    use rocket::local::asynchronous::Client;
    use uuid::Uuid;

    use crate::config::Config;
    use crate::data::course::CourseResponse;
    use crate::data::user::UserCreatedResponse;
    use crate::role::Role;
    use crate::security::Security;
    use crate::store::StoreHandle;

    /// Client against an in-memory server. Untracked, so every request authenticates through
    /// its own bearer header.
    pub async fn client() -> Client {
        client_with(Config::testing()).await
    }

    pub async fn client_with(config: Config) -> Client {
        let security = Security::ephemeral(&config);
        let rocket = crate::create_with(config, security)
            .await
            .expect("valid test server");
        Client::untracked(rocket).await.expect("valid rocket instance")
    }

    pub fn email(name: &str) -> String {
        format!("{}@example.com", name)
    }

    pub fn signup_form_body(name: &str) -> String {
        format!(
            "email={}&display_name={}&password=password123",
            email(name),
            name
        )
    }

    pub fn login_form_body(name: &str) -> String {
        format!("email={}&password=password123", email(name))
    }

    pub fn bearer(token: &str) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {}", token))
    }

    pub fn store(client: &Client) -> &StoreHandle {
        client
            .rocket()
            .state::<StoreHandle>()
            .expect("store is managed")
    }

    pub async fn signup(client: &Client, name: &str) -> UserCreatedResponse {
        let response = client
            .post("/api/v1/user")
            .header(ContentType::Form)
            .body(signup_form_body(name))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok, "sign up failed for {}", name);
        response.into_json().await.expect("invalid sign up json")
    }

    pub async fn login(client: &Client, name: &str) -> UserCreatedResponse {
        let response = client
            .post("/api/v1/login")
            .header(ContentType::Form)
            .body(login_form_body(name))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok, "login failed for {}", name);
        response.into_json().await.expect("invalid login json")
    }

    pub async fn promote(client: &Client, id: Uuid, role: Role) {
        store(client)
            .set_user_role(id, role, id)
            .await
            .expect("role change")
            .expect("user exists");
    }

    pub async fn signup_as(client: &Client, name: &str, role: Role) -> UserCreatedResponse {
        let user = signup(client, name).await;
        promote(client, user.id, role).await;
        user
    }

    pub async fn signup_admin(client: &Client, name: &str) -> UserCreatedResponse {
        signup_as(client, name, Role::Admin).await
    }

    /// Creates a course as `token` with `lessons[i]` lessons in module `i`.
    pub async fn create_course(
        client: &Client,
        token: &str,
        title: &str,
        price: f64,
        lessons: &[usize],
        status: &str,
    ) -> CourseResponse {
        let modules: Vec<serde_json::Value> = lessons
            .iter()
            .enumerate()
            .map(|(m, count)| {
                serde_json::json!({
                    "title": format!("Module {}", m + 1),
                    "lessons": (0..*count)
                        .map(|l| serde_json::json!({ "title": format!("Lesson {}", l + 1) }))
                        .collect::<Vec<_>>(),
                })
            })
            .collect();
        let body = serde_json::json!({
            "title": title,
            "description": format!("Learn {}", title),
            "price": price,
            "level": "beginner",
            "status": status,
            "modules": modules,
        });

        let response = client
            .post("/api/v1/course")
            .header(bearer(token))
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created, "course creation failed");
        response.into_json().await.expect("invalid course json")
    }
}

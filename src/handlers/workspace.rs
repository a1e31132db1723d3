//! Tenant-scoped handlers. They run inside the unit of work opened by
//! [`tenant_scope`](crate::extractors::tenant_scope) and borrow through the router.

use crate::context;
use crate::error::AppError;
use crate::pool::TenantConnection;
use crate::response::{success_many, success_one, success_one_ok};
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{Executor, FromRow};
use std::str::FromStr;

#[derive(Serialize, FromRow, Debug)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct NewStudent {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct NewAttendance {
    pub student_id: i64,
    pub status: String,
    /// `YYYY-MM-DD`; today when absent.
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
    OD,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::OD => "OD",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Present" => Ok(AttendanceStatus::Present),
            "Absent" => Ok(AttendanceStatus::Absent),
            "OD" => Ok(AttendanceStatus::OD),
            other => Err(AppError::BadRequest(format!(
                "status must be one of Present, Absent, OD; got '{}'",
                other
            ))),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct AttendanceRecord {
    pub id: i64,
    pub student_id: i64,
    pub status: AttendanceStatus,
    pub date: NaiveDate,
}

const LIST_STUDENTS: &str = "SELECT id, name, email FROM students ORDER BY id";

/// The registry database has no school tables, so these handlers need a tenant.
fn require_tenant() -> Result<String, AppError> {
    context::current().ok_or_else(|| AppError::BadRequest("X-Tenant-ID header is required".into()))
}

/// Students of the school named by `X-Tenant-ID`.
pub async fn list_students(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    require_tenant()?;
    let mut conn = state.router.resolve_connection().await?;
    let students = match &mut conn {
        TenantConnection::MySql(c) => sqlx::query_as::<_, Student>(LIST_STUDENTS).fetch_all(&mut **c).await?,
        TenantConnection::Postgres(c) => sqlx::query_as::<_, Student>(LIST_STUDENTS).fetch_all(&mut **c).await?,
        TenantConnection::Generic(c) => sqlx::query_as::<_, Student>(LIST_STUDENTS).fetch_all(&mut **c).await?,
    };
    Ok(success_many(students))
}

pub async fn add_student(
    State(state): State<AppState>,
    Json(body): Json<NewStudent>,
) -> Result<impl IntoResponse, AppError> {
    let tenant = require_tenant()?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("student name is required".into()));
    }
    let email = body.email.as_deref().map(str::trim).filter(|e| !e.is_empty());

    let mut conn = state.router.resolve_connection().await?;
    let id = match &mut conn {
        TenantConnection::MySql(c) => {
            let insert = sqlx::query("INSERT INTO students (name, email) VALUES (?, ?)")
                .bind(name)
                .bind(email);
            (&mut **c).execute(insert).await.map(|done| done.last_insert_id() as i64)
        }
        TenantConnection::Postgres(c) => {
            sqlx::query_scalar::<_, i64>("INSERT INTO students (name, email) VALUES ($1, $2) RETURNING id")
                .bind(name)
                .bind(email)
                .fetch_one(&mut **c)
                .await
        }
        TenantConnection::Generic(c) => {
            sqlx::query_scalar::<_, i64>("INSERT INTO students (name, email) VALUES (?, ?) RETURNING id")
                .bind(name)
                .bind(email)
                .fetch_one(&mut **c)
                .await
        }
    }
    .map_err(|e| conflict_or_db(e, "a student with this email already exists"))?;

    tracing::debug!(tenant = %tenant, student = id, "student added");
    Ok(success_one(Student {
        id,
        name: name.to_string(),
        email: email.map(str::to_string),
    }))
}

/// Record one attendance mark. One mark per student per day.
pub async fn submit_attendance(
    State(state): State<AppState>,
    Json(body): Json<NewAttendance>,
) -> Result<impl IntoResponse, AppError> {
    let tenant = require_tenant()?;
    let status: AttendanceStatus = body.status.parse()?;
    let date = match body.date.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| AppError::BadRequest(format!("date must be YYYY-MM-DD; got '{}'", raw)))?,
        None => chrono::Local::now().date_naive(),
    };
    // Bound as text: the generic driver has no date type.
    let day = date.format("%Y-%m-%d").to_string();

    let mut conn = state.router.resolve_connection().await?;
    let known = match &mut conn {
        TenantConnection::MySql(c) => sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM students WHERE id = ?")
            .bind(body.student_id)
            .fetch_one(&mut **c)
            .await?,
        TenantConnection::Postgres(c) => sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM students WHERE id = $1")
            .bind(body.student_id)
            .fetch_one(&mut **c)
            .await?,
        TenantConnection::Generic(c) => sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM students WHERE id = ?")
            .bind(body.student_id)
            .fetch_one(&mut **c)
            .await?,
    };
    if known == 0 {
        return Err(AppError::NotFound(format!("student {}", body.student_id)));
    }

    let id = match &mut conn {
        TenantConnection::MySql(c) => {
            let insert =
                sqlx::query("INSERT INTO attendance_records (student_id, status, attendance_date) VALUES (?, ?, ?)")
                    .bind(body.student_id)
                    .bind(status.as_str())
                    .bind(day.as_str());
            (&mut **c).execute(insert).await.map(|done| done.last_insert_id() as i64)
        }
        TenantConnection::Postgres(c) => sqlx::query_scalar::<_, i64>(
            "INSERT INTO attendance_records (student_id, status, attendance_date) VALUES ($1, $2, $3::date) RETURNING id",
        )
        .bind(body.student_id)
        .bind(status.as_str())
        .bind(day.as_str())
        .fetch_one(&mut **c)
        .await,
        TenantConnection::Generic(c) => sqlx::query_scalar::<_, i64>(
            "INSERT INTO attendance_records (student_id, status, attendance_date) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(body.student_id)
        .bind(status.as_str())
        .bind(day.as_str())
        .fetch_one(&mut **c)
        .await,
    }
    .map_err(|e| conflict_or_db(e, &format!("attendance for student {} on {} already recorded", body.student_id, day)))?;

    tracing::debug!(tenant = %tenant, student = body.student_id, %date, status = status.as_str(), "attendance recorded");
    Ok(success_one(AttendanceRecord {
        id,
        student_id: body.student_id,
        status,
        date,
    }))
}

/// Which database this request is routed to; no header means the registry database.
pub async fn whoami(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let tenant = context::current();
    let mut conn = state.router.resolve_connection().await?;
    conn.ping().await?;
    Ok(success_one_ok(json!({ "tenant": tenant, "backend": conn.backend() })))
}

fn conflict_or_db(e: sqlx::Error, message: &str) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(message.to_string()),
        _ => AppError::Db(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attendance_status_accepts_only_known_marks() {
        assert_eq!("OD".parse::<AttendanceStatus>().unwrap(), AttendanceStatus::OD);
        assert_eq!("Present".parse::<AttendanceStatus>().unwrap().as_str(), "Present");
        for bad in ["present", "Late", ""] {
            assert!(matches!(bad.parse::<AttendanceStatus>(), Err(AppError::BadRequest(_))));
        }
    }
}

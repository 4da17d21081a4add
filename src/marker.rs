//! The attendance marker: given a student identifier and the current moment,
//! decides between check-in, check-out and rejection, enforcing the
//! one-record-per-student-per-day rule.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use derive_more::Display;
use once_cell::sync::Lazy;
use sqlx::SqlitePool;

use crate::model::attendance::{AttendanceRecord, AttendanceStatus};
use crate::model::student::StudentSummary;

pub const DEFAULT_LOCATION: &str = "Main Campus";

/// Arrivals strictly after this local time-of-day are "late". A scan at
/// exactly 09:00:00.000 is still "present".
static LATE_CUTOFF: Lazy<NaiveTime> = Lazy::new(|| NaiveTime::from_hms_opt(9, 0, 0).unwrap());

/// Classify a check-in moment. Only ever called at record creation; a later
/// check-out does not reclassify the record.
pub fn classify(now: NaiveDateTime) -> AttendanceStatus {
    if now.time() > *LATE_CUTOFF {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Present
    }
}

#[derive(Debug, Display)]
pub enum MarkError {
    #[display(fmt = "Student not found")]
    StudentNotFound,
    #[display(fmt = "Attendance already marked for today")]
    AlreadyMarked,
    #[display(fmt = "storage error: {}", _0)]
    Store(sqlx::Error),
}

impl std::error::Error for MarkError {}

impl From<sqlx::Error> for MarkError {
    fn from(e: sqlx::Error) -> Self {
        MarkError::Store(e)
    }
}

#[derive(Debug)]
pub enum MarkOutcome {
    /// First scan of the day created a record
    CheckedIn(AttendanceRecord),
    /// Second scan of the day set the time-out
    CheckedOut(AttendanceRecord),
}

#[derive(Debug)]
pub struct MarkReceipt {
    pub outcome: MarkOutcome,
    pub student: StudentSummary,
}

pub struct NewAttendance<'a> {
    pub student_id: &'a str,
    pub date: NaiveDate,
    pub time_in: NaiveDateTime,
    pub status: AttendanceStatus,
    pub location: &'a str,
}

/// Lookup surface the marker needs from the student registry.
pub trait StudentDirectory {
    async fn find_active(&self, student_id: &str)
    -> Result<Option<StudentSummary>, sqlx::Error>;
}

/// Persistence surface for attendance rows. The backing store must reject a
/// second insert for the same (student_id, date) pair.
pub trait AttendanceStore {
    async fn find_by_student_and_date(
        &self,
        student_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, sqlx::Error>;

    async fn create(&self, rec: NewAttendance<'_>) -> Result<AttendanceRecord, sqlx::Error>;

    async fn update_time_out(
        &self,
        id: i64,
        time_out: NaiveDateTime,
    ) -> Result<AttendanceRecord, sqlx::Error>;
}

/// One scan, one decision. Student lookup failure wins over every
/// attendance-state check; `now` is an explicit input so the rule is
/// deterministic under test.
pub async fn mark_attendance<D, S>(
    directory: &D,
    store: &S,
    student_id: &str,
    location: Option<&str>,
    now: NaiveDateTime,
) -> Result<MarkReceipt, MarkError>
where
    D: StudentDirectory,
    S: AttendanceStore,
{
    let student = directory
        .find_active(student_id)
        .await?
        .ok_or(MarkError::StudentNotFound)?;

    let date = now.date();

    match store.find_by_student_and_date(student_id, date).await? {
        None => {
            let rec = NewAttendance {
                student_id,
                date,
                time_in: now,
                status: classify(now),
                location: location.unwrap_or(DEFAULT_LOCATION),
            };
            match store.create(rec).await {
                Ok(record) => Ok(MarkReceipt {
                    outcome: MarkOutcome::CheckedIn(record),
                    student,
                }),
                // A concurrent first scan won the race on UNIQUE(student_id, date)
                Err(e) if is_unique_violation(&e) => Err(MarkError::AlreadyMarked),
                Err(e) => Err(MarkError::Store(e)),
            }
        }
        Some(existing) if existing.time_out.is_none() => {
            let record = store.update_time_out(existing.id, now).await?;
            Ok(MarkReceipt {
                outcome: MarkOutcome::CheckedOut(record),
                student,
            })
        }
        Some(_) => Err(MarkError::AlreadyMarked),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

// -------------------- SQLite-backed collaborators --------------------

pub struct SqlStudentDirectory<'a>(pub &'a SqlitePool);

impl StudentDirectory for SqlStudentDirectory<'_> {
    async fn find_active(
        &self,
        student_id: &str,
    ) -> Result<Option<StudentSummary>, sqlx::Error> {
        let row = sqlx::query_as::<_, (String, String, String, String)>(
            r#"
            SELECT student_id, first_name, last_name, course
            FROM students
            WHERE student_id = ? AND is_active = 1
            "#,
        )
        .bind(student_id)
        .fetch_optional(self.0)
        .await?;

        Ok(row.map(|(student_id, first_name, last_name, course)| StudentSummary {
            full_name: format!("{} {}", first_name, last_name),
            student_id,
            course,
        }))
    }
}

pub struct SqlAttendanceStore<'a>(pub &'a SqlitePool);

const RECORD_COLUMNS: &str = "id, student_id, date, time_in, time_out, status, location, notes";

impl AttendanceStore for SqlAttendanceStore<'_> {
    async fn find_by_student_and_date(
        &self,
        student_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, sqlx::Error> {
        sqlx::query_as::<_, AttendanceRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM attendance WHERE student_id = ? AND date = ?"
        ))
        .bind(student_id)
        .bind(date)
        .fetch_optional(self.0)
        .await
    }

    async fn create(&self, rec: NewAttendance<'_>) -> Result<AttendanceRecord, sqlx::Error> {
        sqlx::query_as::<_, AttendanceRecord>(&format!(
            r#"
            INSERT INTO attendance (student_id, date, time_in, status, location)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(rec.student_id)
        .bind(rec.date)
        .bind(rec.time_in)
        .bind(rec.status)
        .bind(rec.location)
        .fetch_one(self.0)
        .await
    }

    async fn update_time_out(
        &self,
        id: i64,
        time_out: NaiveDateTime,
    ) -> Result<AttendanceRecord, sqlx::Error> {
        sqlx::query_as::<_, AttendanceRecord>(&format!(
            r#"
            UPDATE attendance
            SET time_out = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(time_out)
        .bind(id)
        .fetch_one(self.0)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        // Single connection so every query sees the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        pool
    }

    async fn seed_student(pool: &SqlitePool, student_id: &str) {
        sqlx::query(
            r#"
            INSERT INTO students
            (student_id, first_name, last_name, email, phone_number, course, year, section, qr_code)
            VALUES (?, 'Jane', 'Doe', ?, '+15550001111', 'Computer Science', 2, 'B', 'data:image/png;base64,')
            "#,
        )
        .bind(student_id)
        .bind(format!("{}@campus.edu", student_id.to_lowercase()))
        .execute(pool)
        .await
        .unwrap();
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").unwrap()
    }

    async fn mark(
        pool: &SqlitePool,
        student_id: &str,
        now: NaiveDateTime,
    ) -> Result<MarkReceipt, MarkError> {
        mark_attendance(
            &SqlStudentDirectory(pool),
            &SqlAttendanceStore(pool),
            student_id,
            Some("Main Campus"),
            now,
        )
        .await
    }

    async fn record_count(pool: &SqlitePool, student_id: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM attendance WHERE student_id = ?")
            .bind(student_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[test]
    fn classify_is_strictly_after_cutoff() {
        assert_eq!(classify(at("2025-07-05T08:59:59")), AttendanceStatus::Present);
        assert_eq!(classify(at("2025-07-05T09:00:00.000")), AttendanceStatus::Present);
        assert_eq!(classify(at("2025-07-05T09:00:00.001")), AttendanceStatus::Late);
        assert_eq!(classify(at("2025-07-05T09:15:00")), AttendanceStatus::Late);
    }

    #[actix_web::test]
    async fn first_scan_creates_present_record() {
        let pool = pool().await;
        seed_student(&pool, "STU123").await;

        let receipt = mark(&pool, "STU123", at("2025-07-05T08:45:00")).await.unwrap();
        match receipt.outcome {
            MarkOutcome::CheckedIn(rec) => {
                assert_eq!(rec.status, AttendanceStatus::Present);
                assert_eq!(rec.time_in, at("2025-07-05T08:45:00"));
                assert!(rec.time_out.is_none());
                assert_eq!(rec.location, "Main Campus");
            }
            other => panic!("expected check-in, got {:?}", other),
        }
        assert_eq!(receipt.student.full_name, "Jane Doe");
    }

    #[actix_web::test]
    async fn scan_after_cutoff_is_late() {
        let pool = pool().await;
        seed_student(&pool, "STU456").await;

        let receipt = mark(&pool, "STU456", at("2025-07-05T09:15:00")).await.unwrap();
        match receipt.outcome {
            MarkOutcome::CheckedIn(rec) => assert_eq!(rec.status, AttendanceStatus::Late),
            other => panic!("expected check-in, got {:?}", other),
        }
    }

    #[actix_web::test]
    async fn second_scan_sets_time_out_without_reclassifying() {
        let pool = pool().await;
        seed_student(&pool, "STU456").await;

        // "late" check-in, check-out well past the cutoff
        mark(&pool, "STU456", at("2025-07-05T09:05:00")).await.unwrap();
        let receipt = mark(&pool, "STU456", at("2025-07-05T18:00:00")).await.unwrap();

        match receipt.outcome {
            MarkOutcome::CheckedOut(rec) => {
                assert_eq!(rec.status, AttendanceStatus::Late);
                assert_eq!(rec.time_out, Some(at("2025-07-05T18:00:00")));
            }
            other => panic!("expected check-out, got {:?}", other),
        }
        assert_eq!(record_count(&pool, "STU456").await, 1);
    }

    #[actix_web::test]
    async fn third_scan_is_rejected_without_mutation() {
        let pool = pool().await;
        seed_student(&pool, "STU123").await;

        mark(&pool, "STU123", at("2025-07-05T08:45:00")).await.unwrap();
        mark(&pool, "STU123", at("2025-07-05T17:30:00")).await.unwrap();
        let err = mark(&pool, "STU123", at("2025-07-05T19:00:00")).await.unwrap_err();
        assert!(matches!(err, MarkError::AlreadyMarked));

        let rec = SqlAttendanceStore(&pool)
            .find_by_student_and_date("STU123", at("2025-07-05T19:00:00").date())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec.time_out, Some(at("2025-07-05T17:30:00")));
        assert_eq!(record_count(&pool, "STU123").await, 1);
    }

    #[actix_web::test]
    async fn scans_on_different_days_create_separate_records() {
        let pool = pool().await;
        seed_student(&pool, "STU123").await;

        mark(&pool, "STU123", at("2025-07-05T23:59:00")).await.unwrap();
        let receipt = mark(&pool, "STU123", at("2025-07-06T00:01:00")).await.unwrap();

        assert!(matches!(receipt.outcome, MarkOutcome::CheckedIn(_)));
        assert_eq!(record_count(&pool, "STU123").await, 2);
    }

    #[actix_web::test]
    async fn unknown_student_is_not_found() {
        let pool = pool().await;
        let err = mark(&pool, "STU999", at("2025-07-05T08:45:00")).await.unwrap_err();
        assert!(matches!(err, MarkError::StudentNotFound));
    }

    #[actix_web::test]
    async fn inactive_student_is_not_found_even_with_open_record() {
        let pool = pool().await;
        seed_student(&pool, "STU123").await;
        mark(&pool, "STU123", at("2025-07-05T08:45:00")).await.unwrap();

        sqlx::query("UPDATE students SET is_active = 0 WHERE student_id = ?")
            .bind("STU123")
            .execute(&pool)
            .await
            .unwrap();

        let err = mark(&pool, "STU123", at("2025-07-05T17:30:00")).await.unwrap_err();
        assert!(matches!(err, MarkError::StudentNotFound));
    }

    #[actix_web::test]
    async fn duplicate_create_surfaces_as_unique_violation() {
        let pool = pool().await;
        seed_student(&pool, "STU123").await;
        let store = SqlAttendanceStore(&pool);

        let rec = |time_in| NewAttendance {
            student_id: "STU123",
            date: at("2025-07-05T08:00:00").date(),
            time_in,
            status: AttendanceStatus::Present,
            location: DEFAULT_LOCATION,
        };
        store.create(rec(at("2025-07-05T08:00:00"))).await.unwrap();
        let err = store.create(rec(at("2025-07-05T08:01:00"))).await.unwrap_err();
        assert!(is_unique_violation(&err));
    }
}

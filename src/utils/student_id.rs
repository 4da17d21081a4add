use sqlx::SqlitePool;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Candidate ids are random; uniqueness is checked against the students
/// table, retrying up to this bound before failing closed.
const MAX_ATTEMPTS: usize = 10;

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

/// "STU" + millis in base36 + 6 random hex chars, uppercased.
pub fn candidate() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let random = Uuid::new_v4().to_simple().to_string();

    format!("STU{}{}", to_base36(millis), &random[..6]).to_uppercase()
}

/// Ok(None) means the retry bound was exhausted; the caller rejects the
/// registration rather than risking a collision.
pub async fn generate_student_id(pool: &SqlitePool) -> Result<Option<String>, sqlx::Error> {
    for _ in 0..MAX_ATTEMPTS {
        let id = candidate();

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM students WHERE student_id = ?)")
                .bind(&id)
                .fetch_one(pool)
                .await?;

        if !exists {
            return Ok(Some(id));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_have_the_expected_shape() {
        let id = candidate();
        assert!(id.starts_with("STU"));
        assert!(id.len() > 9);
        assert!(id.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn candidates_differ() {
        assert_ne!(candidate(), candidate());
    }

    #[test]
    fn base36_round_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[actix_web::test]
    async fn generates_against_an_empty_table() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::create_schema(&pool).await.unwrap();

        let id = generate_student_id(&pool).await.unwrap();
        assert!(id.is_some());
    }
}

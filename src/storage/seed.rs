use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use secrecy::{ExposeSecret, SecretString};

use super::schema::Database;
use super::types::{now_millis, DatabaseError, SeedReport, StorageResult};

/// Default categories: (name, description)
const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("הדרכה", "מאמרי הדרכה והכשרה"),
    ("נהלים", "נהלי עבודה ותקנון"),
    ("טכני", "מידע טכני ותמיכה"),
    ("שירות לקוחות", "מידע לנציגי שירות"),
    ("מכירות", "חומרי מכירות ומידע מסחרי"),
    ("כללי", "מידע כללי"),
];

/// Default departments: (name, description)
const DEFAULT_DEPARTMENTS: &[(&str, &str)] = &[
    ("תפעול", "מחלקת תפעול"),
    ("פיתוח", "מחלקת פיתוח תוכנה"),
    ("שיווק", "מחלקת שיווק ופרסום"),
    ("משאבי אנוש", "מחלקת משאבי אנוש"),
    ("הנהלה", "הנהלת החברה"),
    ("תמיכה טכנית", "מחלקת תמיכה טכנית"),
];

/// Default priorities: (name, level, color)
const DEFAULT_PRIORITIES: &[(&str, i64, &str)] = &[
    ("דחוף", 4, "#DC3545"),
    ("גבוהה", 3, "#E74C5C"),
    ("בינונית", 2, "#FFC107"),
    ("נמוכה", 1, "#28A745"),
];

// ============================================================================
// Password Hashing
// ============================================================================

/// Hash a password with Argon2id and a random 16-byte salt (PHC string format).
pub fn hash_password(password: &str) -> StorageResult<String> {
    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| DatabaseError::PasswordHash(e.to_string()))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DatabaseError::PasswordHash(e.to_string()))
}

/// Check a password against a stored PHC hash. Malformed hashes never verify.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        tracing::warn!("Stored password hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

impl Database {
    // ========================================================================
    // Seeding
    // ========================================================================

    /// Insert the default categories, departments and priorities.
    ///
    /// Rows whose name already exists are left untouched, so re-running is
    /// safe. Everything commits in one transaction.
    pub async fn seed_default_data(&self) -> StorageResult<SeedReport> {
        let now = now_millis();
        let mut report = SeedReport::default();
        let mut tx = self.pool.begin().await?;

        for &(name, description) in DEFAULT_CATEGORIES {
            let result = sqlx::query(
                "INSERT INTO categories (name, description, created_at) VALUES (?, ?, ?) \
                 ON CONFLICT(name) DO NOTHING",
            )
            .bind(name)
            .bind(description)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            report.categories += result.rows_affected();
        }

        for &(name, description) in DEFAULT_DEPARTMENTS {
            let result = sqlx::query(
                "INSERT INTO departments (name, description, created_at) VALUES (?, ?, ?) \
                 ON CONFLICT(name) DO NOTHING",
            )
            .bind(name)
            .bind(description)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            report.departments += result.rows_affected();
        }

        for &(name, level, color) in DEFAULT_PRIORITIES {
            let result = sqlx::query(
                "INSERT INTO priorities (name, level, color, created_at) VALUES (?, ?, ?, ?) \
                 ON CONFLICT(name) DO NOTHING",
            )
            .bind(name)
            .bind(level)
            .bind(color)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            report.priorities += result.rows_affected();
        }

        tx.commit().await?;
        tracing::info!(
            categories = report.categories,
            departments = report.departments,
            priorities = report.priorities,
            "Default data seeded"
        );
        Ok(report)
    }

    /// Ensure the root administrator exists.
    ///
    /// An existing account with `email` is promoted to an approved root admin
    /// and keeps its password. Otherwise the account is created with a hash of
    /// `initial_password`. Returns whether a new account was created.
    pub async fn seed_root_user(
        &self,
        email: &str,
        initial_password: &SecretString,
    ) -> StorageResult<bool> {
        let email = email.trim();
        if email.is_empty() {
            return Err(DatabaseError::Validation(
                "Root email cannot be empty".to_string(),
            ));
        }

        let promoted = sqlx::query(
            "UPDATE users SET role = 'admin', approved = 1, is_root = 1 WHERE email = ?",
        )
        .bind(email)
        .execute(&self.pool)
        .await?;

        if promoted.rows_affected() > 0 {
            tracing::info!(email = %email, "Root user already exists, privileges confirmed");
            return Ok(false);
        }

        let password_hash = hash_password(initial_password.expose_secret())?;
        sqlx::query(
            r#"
            INSERT INTO users (email, password_hash, role, approved, is_root, created_at)
            VALUES (?, ?, 'admin', 1, 1, ?)
        "#,
        )
        .bind(email)
        .bind(&password_hash)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        tracing::info!(email = %email, "Root user created");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;

    use super::{hash_password, verify_password};
    use crate::storage::{Database, DatabaseError, SeedReport, UserRole};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn test_hash_uses_fresh_salt() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn test_seed_default_data_is_idempotent() {
        let db = test_db().await;

        let first = db.seed_default_data().await.unwrap();
        assert_eq!(
            first,
            SeedReport {
                categories: 6,
                departments: 6,
                priorities: 4,
            }
        );

        let second = db.seed_default_data().await.unwrap();
        assert_eq!(second, SeedReport::default());
        assert_eq!(db.list_categories().await.unwrap().len(), 6);
        assert_eq!(db.list_departments().await.unwrap().len(), 6);

        let levels: Vec<i64> = db
            .list_priorities()
            .await
            .unwrap()
            .iter()
            .map(|p| p.level)
            .collect();
        assert_eq!(levels, vec![4, 3, 2, 1]);
    }

    #[tokio::test]
    async fn test_seed_skips_existing_names() {
        let db = test_db().await;
        db.create_category("כללי", Some("custom"), None).await.unwrap();

        let report = db.seed_default_data().await.unwrap();
        assert_eq!(report.categories, 5);

        let general = db
            .list_categories()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.name == "כללי")
            .unwrap();
        assert_eq!(general.description.as_deref(), Some("custom"));
    }

    #[tokio::test]
    async fn test_seed_root_user_creates_then_confirms() {
        let db = test_db().await;
        let password = SecretString::from("initial-pass".to_string());

        assert!(db.seed_root_user("root@kbase.local", &password).await.unwrap());
        assert!(!db.seed_root_user("root@kbase.local", &password).await.unwrap());

        let root = db
            .get_user_by_email("root@kbase.local")
            .await
            .unwrap()
            .unwrap();
        assert!(root.is_root);
        assert!(root.approved);
        assert_eq!(root.role, UserRole::Admin);
        assert!(verify_password("initial-pass", &root.password_hash));
        assert_eq!(db.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_seed_root_user_promotes_existing_account() {
        let db = test_db().await;
        let existing = db
            .create_user("boss@example.com", "kept-hash", UserRole::User, false)
            .await
            .unwrap();

        let created = db
            .seed_root_user("boss@example.com", &SecretString::from("ignored".to_string()))
            .await
            .unwrap();
        assert!(!created);

        let root = db.get_user_by_id(existing.id).await.unwrap().unwrap();
        assert!(root.is_root);
        assert!(root.approved);
        assert_eq!(root.role, UserRole::Admin);
        assert_eq!(root.password_hash, "kept-hash");

        assert!(matches!(
            db.delete_user(root.id).await,
            Err(DatabaseError::Forbidden(_))
        ));
    }
}

use super::schema::Database;
use super::types::{now_millis, Department, StorageResult, TaxonomyRow};

impl Database {
    // ========================================================================
    // Department Operations
    // ========================================================================

    /// All departments, alphabetical by name.
    pub async fn list_departments(&self) -> StorageResult<Vec<Department>> {
        let rows = sqlx::query_as::<_, TaxonomyRow>(
            "SELECT id, name, description, created_by, created_at FROM departments ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TaxonomyRow::into_department).collect())
    }

    pub async fn get_department(&self, id: i64) -> StorageResult<Option<Department>> {
        let row = sqlx::query_as::<_, TaxonomyRow>(
            "SELECT id, name, description, created_by, created_at FROM departments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TaxonomyRow::into_department))
    }

    /// Create a department. Duplicate names surface as `Conflict`.
    pub async fn create_department(
        &self,
        name: &str,
        description: Option<&str>,
        created_by: Option<&str>,
    ) -> StorageResult<Department> {
        let clean_name = Self::sanitize_name(name, "Department")?;

        let row = sqlx::query_as::<_, TaxonomyRow>(
            r#"
            INSERT INTO departments (name, description, created_by, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, name, description, created_by, created_at
        "#,
        )
        .bind(&clean_name)
        .bind(description)
        .bind(created_by)
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(id = row.id, name = %row.name, "Created department");
        Ok(row.into_department())
    }

    pub async fn update_department(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
    ) -> StorageResult<Option<Department>> {
        let clean_name = Self::sanitize_name(name, "Department")?;

        let row = sqlx::query_as::<_, TaxonomyRow>(
            r#"
            UPDATE departments SET name = ?, description = ?
            WHERE id = ?
            RETURNING id, name, description, created_by, created_at
        "#,
        )
        .bind(&clean_name)
        .bind(description)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TaxonomyRow::into_department))
    }

    /// Hard-delete a department; referencing articles keep a NULL department.
    pub async fn delete_department(&self, id: i64) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM departments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn department_in_use(&self, id: i64) -> StorageResult<bool> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM articles WHERE department_id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }
}

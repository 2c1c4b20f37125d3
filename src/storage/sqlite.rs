use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteQueryResult,
};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

use super::{
    AnalysisRecord, Assumption, LiteratureReview, Milestone, Problem, Relationship, Segment,
    Storage,
};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// In-memory database on a single connection, for tests and one-shot runs
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        // Each connection to :memory: is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn require_row(result: SqliteQueryResult, entity: &'static str, id: &str) -> StorageResult<()> {
    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound {
            entity,
            id: id.to_string(),
        });
    }
    Ok(())
}

fn to_json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn from_json_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

async fn insert_segment(conn: &mut SqliteConnection, segment: &Segment) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO segments (
            id, problem_id, parent_id, title, description, analysis, potential_solution,
            status, critical_assumptions, required_data, external_review_required,
            external_review_status, progress, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&segment.id)
    .bind(&segment.problem_id)
    .bind(&segment.parent_id)
    .bind(&segment.title)
    .bind(&segment.description)
    .bind(&segment.analysis)
    .bind(&segment.potential_solution)
    .bind(&segment.status)
    .bind(to_json_list(&segment.critical_assumptions))
    .bind(to_json_list(&segment.required_data))
    .bind(segment.external_review_required)
    .bind(&segment.external_review_status)
    .bind(segment.progress)
    .bind(segment.created_at.to_rfc3339())
    .bind(segment.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn update_critical_path(
    conn: &mut SqliteConnection,
    problem_id: &str,
    path: &[String],
) -> StorageResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE problems
        SET critical_path = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(to_json_list(path))
    .bind(Utc::now().to_rfc3339())
    .bind(problem_id)
    .execute(&mut *conn)
    .await?;

    require_row(result, "Problem", problem_id)
}

async fn insert_analysis(conn: &mut SqliteConnection, record: &AnalysisRecord) -> StorageResult<()> {
    let outcome = serde_json::to_string(&record.outcome).map_err(|e| StorageError::Query {
        message: format!("Failed to serialize analysis outcome: {}", e),
    })?;

    sqlx::query(
        r#"
        INSERT INTO analysis_records (id, problem_id, query, outcome, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.problem_id)
    .bind(&record.query)
    .bind(&outcome)
    .bind(record.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_problem(&self, problem: &Problem) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO problems (id, title, description, client, status, critical_path, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&problem.id)
        .bind(&problem.title)
        .bind(&problem.description)
        .bind(&problem.client)
        .bind(&problem.status)
        .bind(to_json_list(&problem.critical_path))
        .bind(problem.created_at.to_rfc3339())
        .bind(problem.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_problem(&self, id: &str) -> StorageResult<Option<Problem>> {
        let row: Option<ProblemRow> = sqlx::query_as(
            r#"
            SELECT id, title, description, client, status, critical_path, created_at, updated_at
            FROM problems
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_problems(&self, skip: u32, limit: u32) -> StorageResult<Vec<Problem>> {
        let rows: Vec<ProblemRow> = sqlx::query_as(
            r#"
            SELECT id, title, description, client, status, critical_path, created_at, updated_at
            FROM problems
            ORDER BY created_at ASC, rowid ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(i64::from(limit))
        .bind(i64::from(skip))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn set_critical_path(&self, problem_id: &str, path: &[String]) -> StorageResult<()> {
        let mut conn = self.pool.acquire().await?;
        update_critical_path(&mut conn, problem_id, path).await
    }

    async fn create_segment(&self, segment: &Segment) -> StorageResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_segment(&mut conn, segment).await
    }

    async fn get_segment(&self, id: &str) -> StorageResult<Option<Segment>> {
        let row: Option<SegmentRow> = sqlx::query_as(
            r#"
            SELECT id, problem_id, parent_id, title, description, analysis, potential_solution,
                   status, critical_assumptions, required_data, external_review_required,
                   external_review_status, progress, created_at, updated_at
            FROM segments
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_segments(&self, problem_id: &str) -> StorageResult<Vec<Segment>> {
        let rows: Vec<SegmentRow> = sqlx::query_as(
            r#"
            SELECT id, problem_id, parent_id, title, description, analysis, potential_solution,
                   status, critical_assumptions, required_data, external_review_required,
                   external_review_status, progress, created_at, updated_at
            FROM segments
            WHERE problem_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(problem_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn update_segment(&self, segment: &Segment) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE segments
            SET parent_id = ?, title = ?, description = ?, analysis = ?, potential_solution = ?,
                status = ?, critical_assumptions = ?, required_data = ?,
                external_review_required = ?, external_review_status = ?, progress = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&segment.parent_id)
        .bind(&segment.title)
        .bind(&segment.description)
        .bind(&segment.analysis)
        .bind(&segment.potential_solution)
        .bind(&segment.status)
        .bind(to_json_list(&segment.critical_assumptions))
        .bind(to_json_list(&segment.required_data))
        .bind(segment.external_review_required)
        .bind(&segment.external_review_status)
        .bind(segment.progress)
        .bind(segment.updated_at.to_rfc3339())
        .bind(&segment.id)
        .execute(&self.pool)
        .await?;

        require_row(result, "Segment", &segment.id)
    }

    async fn create_relationship(&self, relationship: &Relationship) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO relationships (id, from_segment_id, to_segment_id, relationship_type, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&relationship.id)
        .bind(&relationship.from_segment_id)
        .bind(&relationship.to_segment_id)
        .bind(&relationship.relationship_type)
        .bind(&relationship.description)
        .bind(relationship.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_relationships(&self, problem_id: &str) -> StorageResult<Vec<Relationship>> {
        let rows: Vec<RelationshipRow> = sqlx::query_as(
            r#"
            SELECT r.id, r.from_segment_id, r.to_segment_id, r.relationship_type, r.description, r.created_at
            FROM relationships r
            JOIN segments s ON s.id = r.from_segment_id
            WHERE s.problem_id = ?
            ORDER BY r.created_at ASC, r.rowid ASC
            "#,
        )
        .bind(problem_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn create_assumption(&self, assumption: &Assumption) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO assumptions (id, problem_id, description, min_value, max_value, distribution, impact_area, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&assumption.id)
        .bind(&assumption.problem_id)
        .bind(&assumption.description)
        .bind(assumption.min_value)
        .bind(assumption.max_value)
        .bind(&assumption.distribution)
        .bind(&assumption.impact_area)
        .bind(assumption.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_assumptions(&self, problem_id: &str) -> StorageResult<Vec<Assumption>> {
        let rows: Vec<AssumptionRow> = sqlx::query_as(
            r#"
            SELECT id, problem_id, description, min_value, max_value, distribution, impact_area, created_at
            FROM assumptions
            WHERE problem_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(problem_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn get_assumptions(&self, ids: &[String]) -> StorageResult<Vec<Assumption>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, problem_id, description, min_value, max_value, distribution, impact_area, created_at \
             FROM assumptions WHERE id IN ({})",
            placeholders
        );

        let mut query = sqlx::query_as::<_, AssumptionRow>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        debug!(requested = ids.len(), found = rows.len(), "Loaded assumptions");

        let by_id: HashMap<String, Assumption> = rows
            .into_iter()
            .map(|r| (r.id.clone(), Assumption::from(r)))
            .collect();

        ids.iter()
            .map(|id| {
                by_id.get(id).cloned().ok_or_else(|| StorageError::NotFound {
                    entity: "Assumption",
                    id: id.clone(),
                })
            })
            .collect()
    }

    async fn create_literature_review(&self, review: &LiteratureReview) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO literature_reviews (id, problem_id, title, content, source, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&review.id)
        .bind(&review.problem_id)
        .bind(&review.title)
        .bind(&review.content)
        .bind(&review.source)
        .bind(review.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_literature_review(&self, id: &str) -> StorageResult<Option<LiteratureReview>> {
        let row: Option<LiteratureReviewRow> = sqlx::query_as(
            r#"
            SELECT id, problem_id, title, content, source, created_at
            FROM literature_reviews
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_literature_reviews(
        &self,
        problem_id: &str,
    ) -> StorageResult<Vec<LiteratureReview>> {
        let rows: Vec<LiteratureReviewRow> = sqlx::query_as(
            r#"
            SELECT id, problem_id, title, content, source, created_at
            FROM literature_reviews
            WHERE problem_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(problem_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn update_literature_review(&self, review: &LiteratureReview) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE literature_reviews
            SET title = ?, content = ?, source = ?
            WHERE id = ?
            "#,
        )
        .bind(&review.title)
        .bind(&review.content)
        .bind(&review.source)
        .bind(&review.id)
        .execute(&self.pool)
        .await?;

        require_row(result, "LiteratureReview", &review.id)
    }

    async fn delete_literature_review(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM literature_reviews WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        require_row(result, "LiteratureReview", id)
    }

    async fn create_milestone(&self, milestone: &Milestone) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO milestones (id, problem_id, title, due_date, completed, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&milestone.id)
        .bind(&milestone.problem_id)
        .bind(&milestone.title)
        .bind(milestone.due_date.to_rfc3339())
        .bind(milestone.completed)
        .bind(milestone.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_milestone(&self, id: &str) -> StorageResult<Option<Milestone>> {
        let row: Option<MilestoneRow> = sqlx::query_as(
            r#"
            SELECT id, problem_id, title, due_date, completed, created_at
            FROM milestones
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_milestones(&self, problem_id: &str) -> StorageResult<Vec<Milestone>> {
        let rows: Vec<MilestoneRow> = sqlx::query_as(
            r#"
            SELECT id, problem_id, title, due_date, completed, created_at
            FROM milestones
            WHERE problem_id = ?
            ORDER BY due_date ASC, rowid ASC
            "#,
        )
        .bind(problem_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn update_milestone(&self, milestone: &Milestone) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE milestones
            SET title = ?, due_date = ?, completed = ?
            WHERE id = ?
            "#,
        )
        .bind(&milestone.title)
        .bind(milestone.due_date.to_rfc3339())
        .bind(milestone.completed)
        .bind(&milestone.id)
        .execute(&self.pool)
        .await?;

        require_row(result, "Milestone", &milestone.id)
    }

    async fn save_analysis(&self, record: &AnalysisRecord) -> StorageResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_analysis(&mut conn, record).await
    }

    async fn record_analysis(
        &self,
        record: &AnalysisRecord,
        segments: &[Segment],
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        for segment in segments {
            insert_segment(&mut tx, segment).await?;
        }
        update_critical_path(&mut tx, &record.problem_id, &record.outcome.meta_analysis.critical_path)
            .await?;
        insert_analysis(&mut tx, record).await?;

        tx.commit().await?;
        debug!(
            problem_id = %record.problem_id,
            segments = segments.len(),
            "Analysis recorded"
        );
        Ok(())
    }

    async fn list_analyses(&self, problem_id: &str) -> StorageResult<Vec<AnalysisRecord>> {
        let rows: Vec<AnalysisRecordRow> = sqlx::query_as(
            r#"
            SELECT id, problem_id, query, outcome, created_at
            FROM analysis_records
            WHERE problem_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(problem_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AnalysisRecord::try_from).collect()
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct ProblemRow {
    id: String,
    title: String,
    description: String,
    client: String,
    status: String,
    critical_path: String,
    created_at: String,
    updated_at: String,
}

impl From<ProblemRow> for Problem {
    fn from(row: ProblemRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            client: row.client,
            status: row.status,
            critical_path: from_json_list(&row.critical_path),
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct SegmentRow {
    id: String,
    problem_id: String,
    parent_id: Option<String>,
    title: String,
    description: String,
    analysis: Option<String>,
    potential_solution: Option<String>,
    status: String,
    critical_assumptions: String,
    required_data: String,
    external_review_required: bool,
    external_review_status: Option<String>,
    progress: f64,
    created_at: String,
    updated_at: String,
}

impl From<SegmentRow> for Segment {
    fn from(row: SegmentRow) -> Self {
        Self {
            id: row.id,
            problem_id: row.problem_id,
            parent_id: row.parent_id,
            title: row.title,
            description: row.description,
            analysis: row.analysis,
            potential_solution: row.potential_solution,
            status: row.status,
            critical_assumptions: from_json_list(&row.critical_assumptions),
            required_data: from_json_list(&row.required_data),
            external_review_required: row.external_review_required,
            external_review_status: row.external_review_status,
            progress: row.progress,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct RelationshipRow {
    id: String,
    from_segment_id: String,
    to_segment_id: String,
    relationship_type: String,
    description: Option<String>,
    created_at: String,
}

impl From<RelationshipRow> for Relationship {
    fn from(row: RelationshipRow) -> Self {
        Self {
            id: row.id,
            from_segment_id: row.from_segment_id,
            to_segment_id: row.to_segment_id,
            relationship_type: row.relationship_type,
            description: row.description,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct AssumptionRow {
    id: String,
    problem_id: String,
    description: String,
    min_value: f64,
    max_value: f64,
    distribution: String,
    impact_area: String,
    created_at: String,
}

impl From<AssumptionRow> for Assumption {
    fn from(row: AssumptionRow) -> Self {
        Self {
            id: row.id,
            problem_id: row.problem_id,
            description: row.description,
            min_value: row.min_value,
            max_value: row.max_value,
            distribution: row.distribution,
            impact_area: row.impact_area,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct MilestoneRow {
    id: String,
    problem_id: String,
    title: String,
    due_date: String,
    completed: bool,
    created_at: String,
}

impl From<MilestoneRow> for Milestone {
    fn from(row: MilestoneRow) -> Self {
        Self {
            id: row.id,
            problem_id: row.problem_id,
            title: row.title,
            due_date: parse_timestamp(&row.due_date),
            completed: row.completed,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct LiteratureReviewRow {
    id: String,
    problem_id: String,
    title: String,
    content: String,
    source: Option<String>,
    created_at: String,
}

impl From<LiteratureReviewRow> for LiteratureReview {
    fn from(row: LiteratureReviewRow) -> Self {
        Self {
            id: row.id,
            problem_id: row.problem_id,
            title: row.title,
            content: row.content,
            source: row.source,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct AnalysisRecordRow {
    id: String,
    problem_id: String,
    query: String,
    outcome: String,
    created_at: String,
}

impl TryFrom<AnalysisRecordRow> for AnalysisRecord {
    type Error = StorageError;

    fn try_from(row: AnalysisRecordRow) -> Result<Self, Self::Error> {
        let outcome = serde_json::from_str(&row.outcome).map_err(|e| StorageError::Query {
            message: format!("Corrupt analysis outcome {}: {}", row.id, e),
        })?;

        Ok(Self {
            id: row.id,
            problem_id: row.problem_id,
            query: row.query,
            outcome,
            created_at: parse_timestamp(&row.created_at),
        })
    }
}

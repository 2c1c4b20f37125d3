//! Storage layer for consulting records.
//!
//! This module provides SQLite-based storage for problems, segments,
//! relationships, assumptions, milestones, literature reviews, and saved
//! analysis outcomes.

mod sqlite;


pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{AnalysisOutcome, AnalysisStep};
use crate::error::StorageResult;

/// Status given to problems when they are created.
pub const PROBLEM_STATUS_OPEN: &str = "Open";
/// Status given to segments created from analysis steps.
pub const SEGMENT_STATUS_PENDING: &str = "Pending";

const STEP_TITLE_CHARS: usize = 50;

/// A client problem under analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    /// Unique problem identifier.
    pub id: String,
    pub title: String,
    pub description: String,
    /// Client the problem belongs to.
    pub client: String,
    pub status: String,
    /// Most consequential steps from the latest meta-analysis.
    #[serde(default)]
    pub critical_path: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A node in a problem's decomposition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Unique segment identifier.
    pub id: String,
    /// Owning problem.
    pub problem_id: String,
    /// Parent segment; `None` for roots.
    pub parent_id: Option<String>,
    pub title: String,
    pub description: String,
    /// Analysis text, usually a serialized segment output.
    pub analysis: Option<String>,
    pub potential_solution: Option<String>,
    pub status: String,
    #[serde(default)]
    pub critical_assumptions: Vec<String>,
    #[serde(default)]
    pub required_data: Vec<String>,
    pub external_review_required: bool,
    pub external_review_status: Option<String>,
    /// Completion fraction in `[0, 1]`.
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A typed, directed link between two segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub from_segment_id: String,
    pub to_segment_id: String,
    /// Free-form kind, e.g. "depends_on" or "contradicts".
    pub relationship_type: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An uncertain numeric input for simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assumption {
    pub id: String,
    pub problem_id: String,
    pub description: String,
    pub min_value: f64,
    pub max_value: f64,
    /// Distribution name; validated when sampled.
    pub distribution: String,
    /// Aggregation key for simulated values.
    pub impact_area: String,
    pub created_at: DateTime<Utc>,
}

/// A dated deliverable on a problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub problem_id: String,
    pub title: String,
    pub due_date: DateTime<Utc>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// Background reading attached to a problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteratureReview {
    pub id: String,
    pub problem_id: String,
    pub title: String,
    pub content: String,
    /// Citation or URL.
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A persisted pipeline outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub problem_id: String,
    /// The user query that was analyzed.
    pub query: String,
    pub outcome: AnalysisOutcome,
    pub created_at: DateTime<Utc>,
}

impl Problem {
    /// Create a new open problem.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        client: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            client: client.into(),
            status: PROBLEM_STATUS_OPEN.to_string(),
            critical_path: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the status.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
}

impl Segment {
    /// Create a new root segment.
    pub fn new(
        problem_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            problem_id: problem_id.into(),
            parent_id: None,
            title: title.into(),
            description: description.into(),
            analysis: None,
            potential_solution: None,
            status: SEGMENT_STATUS_PENDING.to_string(),
            critical_assumptions: Vec::new(),
            required_data: Vec::new(),
            external_review_required: false,
            external_review_status: None,
            progress: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build the segment that records one analysis step.
    pub fn from_step(problem_id: impl Into<String>, step: &AnalysisStep) -> Self {
        let prefix: String = step.query.chars().take(STEP_TITLE_CHARS).collect();
        let output = &step.structured_output;

        let mut segment = Self::new(problem_id, format!("Step: {}...", prefix), step.query.clone());
        segment.analysis = serde_json::to_string(output).ok();
        segment.critical_assumptions = output.critical_assumptions.clone();
        segment.required_data = output.required_data.clone();
        segment.external_review_required = output.external_review_required;
        segment
    }

    /// Set the parent segment.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Set the status.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
}

impl Relationship {
    /// Create a new relationship.
    pub fn new(
        from_segment_id: impl Into<String>,
        to_segment_id: impl Into<String>,
        relationship_type: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from_segment_id: from_segment_id.into(),
            to_segment_id: to_segment_id.into(),
            relationship_type: relationship_type.into(),
            description: None,
            created_at: Utc::now(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Assumption {
    /// Create a new assumption.
    pub fn new(
        problem_id: impl Into<String>,
        description: impl Into<String>,
        min_value: f64,
        max_value: f64,
        distribution: impl Into<String>,
        impact_area: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            problem_id: problem_id.into(),
            description: description.into(),
            min_value,
            max_value,
            distribution: distribution.into(),
            impact_area: impact_area.into(),
            created_at: Utc::now(),
        }
    }
}

impl Milestone {
    /// Create a new, incomplete milestone.
    pub fn new(
        problem_id: impl Into<String>,
        title: impl Into<String>,
        due_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            problem_id: problem_id.into(),
            title: title.into(),
            due_date,
            completed: false,
            created_at: Utc::now(),
        }
    }
}

impl LiteratureReview {
    /// Create a new literature review.
    pub fn new(
        problem_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            problem_id: problem_id.into(),
            title: title.into(),
            content: content.into(),
            source: None,
            created_at: Utc::now(),
        }
    }

    /// Set the source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl AnalysisRecord {
    /// Wrap a pipeline outcome for persistence.
    pub fn new(problem_id: impl Into<String>, query: impl Into<String>, outcome: AnalysisOutcome) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            problem_id: problem_id.into(),
            query: query.into(),
            outcome,
            created_at: Utc::now(),
        }
    }
}

/// Storage trait for database operations.
///
/// `update_*` and `delete_*` return `StorageError::NotFound` when no row matches.
#[async_trait]
pub trait Storage: Send + Sync {
    // Problem operations

    /// Create a new problem.
    async fn create_problem(&self, problem: &Problem) -> StorageResult<()>;
    /// Get a problem by ID.
    async fn get_problem(&self, id: &str) -> StorageResult<Option<Problem>>;
    /// List problems, oldest first.
    async fn list_problems(&self, skip: u32, limit: u32) -> StorageResult<Vec<Problem>>;
    /// Replace a problem's critical path.
    async fn set_critical_path(&self, problem_id: &str, path: &[String]) -> StorageResult<()>;

    // Segment operations

    /// Create a new segment.
    async fn create_segment(&self, segment: &Segment) -> StorageResult<()>;
    /// Get a segment by ID.
    async fn get_segment(&self, id: &str) -> StorageResult<Option<Segment>>;
    /// Get all segments of a problem, oldest first.
    async fn list_segments(&self, problem_id: &str) -> StorageResult<Vec<Segment>>;
    /// Update an existing segment.
    async fn update_segment(&self, segment: &Segment) -> StorageResult<()>;

    // Relationship operations

    /// Create a new relationship.
    async fn create_relationship(&self, relationship: &Relationship) -> StorageResult<()>;
    /// Get every relationship whose source segment belongs to a problem.
    async fn list_relationships(&self, problem_id: &str) -> StorageResult<Vec<Relationship>>;

    // Assumption operations

    /// Create a new assumption.
    async fn create_assumption(&self, assumption: &Assumption) -> StorageResult<()>;
    /// Get all assumptions of a problem.
    async fn list_assumptions(&self, problem_id: &str) -> StorageResult<Vec<Assumption>>;
    /// Get assumptions by ID, in the order requested.
    ///
    /// Fails with `NotFound` naming the first unknown ID.
    async fn get_assumptions(&self, ids: &[String]) -> StorageResult<Vec<Assumption>>;

    // Literature review operations

    /// Create a new literature review.
    async fn create_literature_review(&self, review: &LiteratureReview) -> StorageResult<()>;
    /// Get a literature review by ID.
    async fn get_literature_review(&self, id: &str) -> StorageResult<Option<LiteratureReview>>;
    /// Get all literature reviews of a problem, oldest first.
    async fn list_literature_reviews(&self, problem_id: &str)
        -> StorageResult<Vec<LiteratureReview>>;
    /// Update an existing literature review.
    async fn update_literature_review(&self, review: &LiteratureReview) -> StorageResult<()>;
    /// Delete a literature review by ID.
    async fn delete_literature_review(&self, id: &str) -> StorageResult<()>;

    // Milestone operations

    /// Create a new milestone.
    async fn create_milestone(&self, milestone: &Milestone) -> StorageResult<()>;
    /// Get a milestone by ID.
    async fn get_milestone(&self, id: &str) -> StorageResult<Option<Milestone>>;
    /// Get all milestones of a problem, by due date.
    async fn list_milestones(&self, problem_id: &str) -> StorageResult<Vec<Milestone>>;
    /// Update an existing milestone.
    async fn update_milestone(&self, milestone: &Milestone) -> StorageResult<()>;

    // Analysis records

    /// Save a pipeline outcome.
    async fn save_analysis(&self, record: &AnalysisRecord) -> StorageResult<()>;
    /// Atomically write an analysis: its step segments, the problem's critical
    /// path from the meta-analysis, and the record itself. On error nothing
    /// is kept.
    async fn record_analysis(&self, record: &AnalysisRecord, segments: &[Segment])
        -> StorageResult<()>;
    /// Get saved outcomes for a problem, newest first.
    async fn list_analyses(&self, problem_id: &str) -> StorageResult<Vec<AnalysisRecord>>;
}

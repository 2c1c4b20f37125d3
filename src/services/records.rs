use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AnalysisError, AnalysisResult};
use crate::graph::{SegmentGraph, SegmentTreeNode};
use crate::simulation::{validate_bounds, DistributionKind};
use crate::storage::{
    Assumption, LiteratureReview, Milestone, Problem, Relationship, Segment, SqliteStorage,
    Storage,
};

/// Input for `problem_create`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemCreateParams {
    pub title: String,
    pub description: String,
    pub client: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Input for `segment_create`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentCreateParams {
    pub problem_id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub potential_solution: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub critical_assumptions: Vec<String>,
    #[serde(default)]
    pub required_data: Vec<String>,
    #[serde(default)]
    pub external_review_required: bool,
}

/// Input for `segment_update`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentUpdateParams {
    pub segment_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub potential_solution: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Move the segment under another parent.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Make the segment a root. Ignored when `parent_id` is set.
    #[serde(default)]
    pub detach: bool,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub external_review_required: Option<bool>,
    #[serde(default)]
    pub external_review_status: Option<String>,
}

/// Input for `relationship_create`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipCreateParams {
    pub from_segment_id: String,
    pub to_segment_id: String,
    pub relationship_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Input for `literature_review_create`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewCreateParams {
    pub problem_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Input for `literature_review_update`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewUpdateParams {
    pub review_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Input for `assumption_create`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssumptionCreateParams {
    pub problem_id: String,
    pub description: String,
    pub min_value: f64,
    pub max_value: f64,
    #[serde(default = "default_distribution")]
    pub distribution: String,
    pub impact_area: String,
}

fn default_distribution() -> String {
    DistributionKind::Uniform.to_string()
}

/// Input for `milestone_create`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneCreateParams {
    pub problem_id: String,
    pub title: String,
    pub due_date: DateTime<Utc>,
}

/// Input for `milestone_update`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MilestoneUpdateParams {
    pub milestone_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: Option<bool>,
}

/// CRUD over a problem's records, with the invariants storage cannot check.
#[derive(Clone)]
pub struct RecordService {
    storage: SqliteStorage,
}

impl RecordService {
    pub fn new(storage: SqliteStorage) -> Self {
        Self { storage }
    }

    pub async fn create_problem(&self, params: ProblemCreateParams) -> AnalysisResult<Problem> {
        require_text("title", &params.title)?;

        let mut problem = Problem::new(params.title, params.description, params.client);
        if let Some(status) = params.status {
            problem = problem.with_status(status);
        }
        self.storage.create_problem(&problem).await?;

        info!(problem_id = %problem.id, client = %problem.client, "Problem created");
        Ok(problem)
    }

    pub async fn get_problem(&self, problem_id: &str) -> AnalysisResult<Problem> {
        self.storage
            .get_problem(problem_id)
            .await?
            .ok_or_else(|| not_found("Problem", problem_id))
    }

    pub async fn list_problems(&self, skip: u32, limit: u32) -> AnalysisResult<Vec<Problem>> {
        Ok(self.storage.list_problems(skip, limit).await?)
    }

    pub async fn create_segment(&self, params: SegmentCreateParams) -> AnalysisResult<Segment> {
        require_text("title", &params.title)?;
        self.get_problem(&params.problem_id).await?;

        let mut segment = Segment::new(&params.problem_id, params.title, params.description);
        segment.parent_id = params.parent_id;
        segment.potential_solution = params.potential_solution;
        segment.critical_assumptions = params.critical_assumptions;
        segment.required_data = params.required_data;
        segment.external_review_required = params.external_review_required;
        if let Some(status) = params.status {
            segment = segment.with_status(status);
        }

        if segment.parent_id.is_some() {
            self.graph(&segment.problem_id)
                .await?
                .validate_parent(&segment)?;
        }
        self.storage.create_segment(&segment).await?;

        debug!(segment_id = %segment.id, parent_id = ?segment.parent_id, "Segment created");
        Ok(segment)
    }

    pub async fn list_segments(&self, problem_id: &str) -> AnalysisResult<Vec<Segment>> {
        self.get_problem(problem_id).await?;
        Ok(self.storage.list_segments(problem_id).await?)
    }

    pub async fn update_segment(&self, params: SegmentUpdateParams) -> AnalysisResult<Segment> {
        let mut segment = self
            .storage
            .get_segment(&params.segment_id)
            .await?
            .ok_or_else(|| not_found("Segment", &params.segment_id))?;
        let previous_parent = segment.parent_id.clone();

        if let Some(title) = params.title {
            require_text("title", &title)?;
            segment.title = title;
        }
        if let Some(description) = params.description {
            segment.description = description;
        }
        if params.analysis.is_some() {
            segment.analysis = params.analysis;
        }
        if params.potential_solution.is_some() {
            segment.potential_solution = params.potential_solution;
        }
        if let Some(status) = params.status {
            segment.status = status;
        }
        if let Some(progress) = params.progress {
            if !(0.0..=1.0).contains(&progress) {
                return Err(AnalysisError::invalid_argument(format!(
                    "progress must be within [0, 1], got {}",
                    progress
                )));
            }
            segment.progress = progress;
        }
        if let Some(required) = params.external_review_required {
            segment.external_review_required = required;
        }
        if params.external_review_status.is_some() {
            segment.external_review_status = params.external_review_status;
        }
        if params.parent_id.is_some() {
            segment.parent_id = params.parent_id;
        } else if params.detach {
            segment.parent_id = None;
        }

        if segment.parent_id != previous_parent && segment.parent_id.is_some() {
            self.graph(&segment.problem_id)
                .await?
                .validate_parent(&segment)?;
        }

        segment.updated_at = Utc::now();
        self.storage.update_segment(&segment).await?;

        debug!(segment_id = %segment.id, status = %segment.status, "Segment updated");
        Ok(segment)
    }

    /// Nested view of a problem's segments.
    pub async fn segment_tree(&self, problem_id: &str) -> AnalysisResult<Vec<SegmentTreeNode>> {
        self.get_problem(problem_id).await?;
        Ok(self.graph(problem_id).await?.tree())
    }

    pub async fn create_relationship(
        &self,
        params: RelationshipCreateParams,
    ) -> AnalysisResult<Relationship> {
        require_text("relationship_type", &params.relationship_type)?;
        if params.from_segment_id == params.to_segment_id {
            return Err(AnalysisError::invalid_argument(
                "a relationship needs two distinct segments",
            ));
        }

        let from = self.require_segment(&params.from_segment_id).await?;
        let to = self.require_segment(&params.to_segment_id).await?;
        if from.problem_id != to.problem_id {
            return Err(AnalysisError::invalid_argument(format!(
                "segments {} and {} belong to different problems",
                from.id, to.id
            )));
        }

        let mut relationship = Relationship::new(from.id, to.id, params.relationship_type);
        if let Some(description) = params.description {
            relationship = relationship.with_description(description);
        }
        self.storage.create_relationship(&relationship).await?;

        debug!(
            relationship_id = %relationship.id,
            relationship_type = %relationship.relationship_type,
            "Relationship created"
        );
        Ok(relationship)
    }

    pub async fn create_review(&self, params: ReviewCreateParams) -> AnalysisResult<LiteratureReview> {
        require_text("title", &params.title)?;
        self.get_problem(&params.problem_id).await?;

        let mut review = LiteratureReview::new(params.problem_id, params.title, params.content);
        if let Some(source) = params.source {
            review = review.with_source(source);
        }
        self.storage.create_literature_review(&review).await?;

        debug!(review_id = %review.id, "Literature review created");
        Ok(review)
    }

    pub async fn list_reviews(&self, problem_id: &str) -> AnalysisResult<Vec<LiteratureReview>> {
        self.get_problem(problem_id).await?;
        Ok(self.storage.list_literature_reviews(problem_id).await?)
    }

    pub async fn update_review(&self, params: ReviewUpdateParams) -> AnalysisResult<LiteratureReview> {
        let mut review = self
            .storage
            .get_literature_review(&params.review_id)
            .await?
            .ok_or_else(|| not_found("LiteratureReview", &params.review_id))?;

        if let Some(title) = params.title {
            require_text("title", &title)?;
            review.title = title;
        }
        if let Some(content) = params.content {
            review.content = content;
        }
        if params.source.is_some() {
            review.source = params.source;
        }
        self.storage.update_literature_review(&review).await?;
        Ok(review)
    }

    pub async fn delete_review(&self, review_id: &str) -> AnalysisResult<()> {
        self.storage.delete_literature_review(review_id).await?;
        debug!(review_id = %review_id, "Literature review deleted");
        Ok(())
    }

    /// Store an assumption after checking its distribution and bounds.
    pub async fn create_assumption(&self, params: AssumptionCreateParams) -> AnalysisResult<Assumption> {
        require_text("impact_area", &params.impact_area)?;
        let kind: DistributionKind = params.distribution.parse()?;
        validate_bounds(params.min_value, params.max_value)?;
        self.get_problem(&params.problem_id).await?;

        let assumption = Assumption::new(
            params.problem_id,
            params.description,
            params.min_value,
            params.max_value,
            kind.as_str(),
            params.impact_area,
        );
        self.storage.create_assumption(&assumption).await?;

        debug!(
            assumption_id = %assumption.id,
            distribution = %assumption.distribution,
            impact_area = %assumption.impact_area,
            "Assumption created"
        );
        Ok(assumption)
    }

    pub async fn list_assumptions(&self, problem_id: &str) -> AnalysisResult<Vec<Assumption>> {
        self.get_problem(problem_id).await?;
        Ok(self.storage.list_assumptions(problem_id).await?)
    }

    pub async fn create_milestone(&self, params: MilestoneCreateParams) -> AnalysisResult<Milestone> {
        require_text("title", &params.title)?;
        self.get_problem(&params.problem_id).await?;

        let milestone = Milestone::new(params.problem_id, params.title, params.due_date);
        self.storage.create_milestone(&milestone).await?;
        Ok(milestone)
    }

    pub async fn list_milestones(&self, problem_id: &str) -> AnalysisResult<Vec<Milestone>> {
        self.get_problem(problem_id).await?;
        Ok(self.storage.list_milestones(problem_id).await?)
    }

    pub async fn update_milestone(&self, params: MilestoneUpdateParams) -> AnalysisResult<Milestone> {
        let mut milestone = self
            .storage
            .get_milestone(&params.milestone_id)
            .await?
            .ok_or_else(|| not_found("Milestone", &params.milestone_id))?;

        if let Some(title) = params.title {
            require_text("title", &title)?;
            milestone.title = title;
        }
        if let Some(due_date) = params.due_date {
            milestone.due_date = due_date;
        }
        if let Some(completed) = params.completed {
            milestone.completed = completed;
        }
        self.storage.update_milestone(&milestone).await?;
        Ok(milestone)
    }

    async fn require_segment(&self, segment_id: &str) -> AnalysisResult<Segment> {
        self.storage
            .get_segment(segment_id)
            .await?
            .ok_or_else(|| not_found("Segment", segment_id))
    }

    async fn graph(&self, problem_id: &str) -> AnalysisResult<SegmentGraph> {
        let segments = self.storage.list_segments(problem_id).await?;
        let relationships = self.storage.list_relationships(problem_id).await?;
        SegmentGraph::build(problem_id, segments, relationships)
    }
}

fn require_text(field: &str, value: &str) -> AnalysisResult<()> {
    if value.trim().is_empty() {
        return Err(AnalysisError::invalid_argument(format!(
            "{} cannot be empty",
            field
        )));
    }
    Ok(())
}

fn not_found(entity: &'static str, id: &str) -> AnalysisError {
    AnalysisError::NotFound {
        entity,
        id: id.to_string(),
    }
}

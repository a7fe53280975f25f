use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Garment classification passed to the synthesis provider.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum GarmentCategory {
    Tops,
    Bottoms,
    OnePieces,
}

/// Lifecycle state of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Submitted,
    Waiting,
    Polling,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Terminal states never transition again for the same job id.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// One in-flight or completed try-on request against the synthesis provider.
///
/// The image URLs are fixed at submission time; only the polling side mutates
/// `status`, `result_urls` and `resolved_at`, and only until a terminal state
/// is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub model_image_url: String,
    pub garment_image_url: String,
    pub category: GarmentCategory,
    pub job_id: String,
    pub status: JobStatus,
    pub result_urls: Vec<String>,
    pub submitted_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    /// A freshly submitted job, before the quiescence delay has started.
    pub fn submitted(
        model_image_url: String,
        garment_image_url: String,
        category: GarmentCategory,
        job_id: String,
    ) -> Self {
        Self {
            model_image_url,
            garment_image_url,
            category,
            job_id,
            status: JobStatus::Submitted,
            result_urls: Vec::new(),
            submitted_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Resolve the job as succeeded with the provider's output URLs.
    ///
    /// `outputs` must be non-empty; an empty output set is a failure, not a
    /// success, and must go through [`GenerationJob::fail`] instead.
    pub fn succeed(&mut self, outputs: Vec<String>) {
        debug_assert!(!outputs.is_empty());
        self.status = JobStatus::Succeeded;
        self.result_urls = outputs;
        self.resolved_at = Some(Utc::now());
    }

    /// Resolve the job as failed. `result_urls` stays empty.
    pub fn fail(&mut self) {
        self.status = JobStatus::Failed;
        self.result_urls.clear();
        self.resolved_at = Some(Utc::now());
    }

    /// The image shown to the user: deterministically the first output.
    pub fn display_url(&self) -> Option<&str> {
        self.result_urls.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> GenerationJob {
        GenerationJob::submitted(
            "https://x/m.jpg".into(),
            "https://x/g.jpg".into(),
            GarmentCategory::Tops,
            "abc123".into(),
        )
    }

    #[test]
    fn category_wire_strings() {
        assert_eq!(GarmentCategory::Tops.to_string(), "tops");
        assert_eq!(GarmentCategory::OnePieces.to_string(), "one-pieces");
        assert_eq!(
            "bottoms".parse::<GarmentCategory>().unwrap(),
            GarmentCategory::Bottoms
        );
        assert_eq!(
            serde_json::to_string(&GarmentCategory::OnePieces).unwrap(),
            "\"one-pieces\""
        );
    }

    #[test]
    fn submitted_job_has_no_results() {
        let job = sample_job();
        assert_eq!(job.status, JobStatus::Submitted);
        assert!(job.result_urls.is_empty());
        assert!(job.resolved_at.is_none());
        assert!(!job.status.is_terminal());
    }

    #[test]
    fn succeed_populates_results_and_resolved_at() {
        let mut job = sample_job();
        job.succeed(vec!["https://x/r.png".into()]);
        assert_eq!(job.status, JobStatus::Succeeded);
        assert!(job.status.is_terminal());
        assert_eq!(job.display_url(), Some("https://x/r.png"));
        assert!(job.resolved_at.is_some());
    }

    #[test]
    fn failed_job_has_no_results() {
        let mut job = sample_job();
        job.fail();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.status.is_terminal());
        assert!(job.result_urls.is_empty());
        assert_eq!(job.display_url(), None);
        assert!(job.resolved_at.is_some());
    }

    #[test]
    fn results_nonempty_iff_succeeded() {
        let submitted = sample_job();
        let mut succeeded = sample_job();
        succeeded.succeed(vec!["https://x/r.png".into()]);
        let mut failed = sample_job();
        failed.fail();

        for job in [&submitted, &succeeded, &failed] {
            assert_eq!(job.status == JobStatus::Succeeded, !job.result_urls.is_empty());
        }
    }
}

use serde::{Deserialize, Serialize};

pub mod token;

pub const LATEST_REPORTS_LIMIT: u32 = 10;
pub const FILTERED_REPORTS_LIMIT: u32 = 20;
pub const ALL_CATEGORIES: &str = "all";

/// Statuses the service itself knows about. Stored rows may carry any other
/// value written out of band, so `Report::status` stays a plain string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Pending,
    Verified,
    Resolved,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Verified => "verified",
            ReportStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub token: String,
    pub category: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub status: String,
    pub created_at: String,
}

/// Public row of the latest-reports listing. The token is masked and
/// `created_at` is exposed as `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestReport {
    pub token: String,
    pub category: String,
    pub title: String,
    pub location: String,
    pub status: String,
    pub date: String,
}

impl From<Report> for LatestReport {
    fn from(report: Report) -> Self {
        Self {
            token: token::mask_token(&report.token),
            category: report.category,
            title: report.title,
            location: report.location,
            status: report.status,
            date: report.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReport {
    pub category: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub location: String,
}

impl NewReport {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.category.is_empty() || self.title.is_empty() || self.description.is_empty() {
            return Err("Category, title, and description are required");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedReport {
    pub id: i64,
    pub token: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_reports: i64,
    pub verified_reports: i64,
    pub pending_reports: i64,
    pub resolved_reports: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilter {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

impl ReportFilter {
    pub fn category(&self) -> Option<&str> {
        self.category
            .as_deref()
            .filter(|c| !c.is_empty() && *c != ALL_CATEGORIES)
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref().filter(|s| !s.is_empty())
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> Report {
        Report {
            id: 7,
            token: "CGS-101112-3456".to_string(),
            category: "Safety".to_string(),
            title: "Broken light".to_string(),
            description: "Hallway light out".to_string(),
            location: "Bldg A".to_string(),
            status: ReportStatus::Pending.as_str().to_string(),
            created_at: "2024-03-09 10:11:12".to_string(),
        }
    }

    #[test]
    fn failure_envelope_omits_data() {
        let body = serde_json::to_value(ApiResponse::<Stats>::failure("Report not found"))
            .expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({"success": false, "message": "Report not found"})
        );
    }

    #[test]
    fn success_envelope_omits_absent_message() {
        let body = serde_json::to_value(ApiResponse::ok(Stats::default())).expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({
                "success": true,
                "data": {
                    "total_reports": 0,
                    "verified_reports": 0,
                    "pending_reports": 0,
                    "resolved_reports": 0
                }
            })
        );
    }

    #[test]
    fn report_serializes_status_lowercase() {
        let body = serde_json::to_value(sample_report()).expect("serialize");
        assert_eq!(body["status"], "pending");
        assert_eq!(body["token"], "CGS-101112-3456");
        assert_eq!(body["created_at"], "2024-03-09 10:11:12");
    }

    #[test]
    fn latest_report_masks_token_and_renames_created_at() {
        let latest = LatestReport::from(sample_report());
        assert_eq!(latest.token, "CGS-1011...");
        assert_eq!(latest.date, "2024-03-09 10:11:12");

        let body = serde_json::to_value(&latest).expect("serialize");
        assert!(body.get("description").is_none());
        assert!(body.get("id").is_none());
    }

    #[test]
    fn new_report_requires_category_title_description() {
        let mut report = NewReport {
            category: "Safety".to_string(),
            title: "Broken light".to_string(),
            description: "Hallway light out".to_string(),
            location: String::new(),
        };
        assert!(report.validate().is_ok());

        report.title.clear();
        assert_eq!(
            report.validate(),
            Err("Category, title, and description are required")
        );
    }

    #[test]
    fn filter_ignores_all_category_and_empty_values() {
        let filter = ReportFilter {
            category: Some("all".to_string()),
            status: Some(String::new()),
            search: None,
        };
        assert_eq!(filter.category(), None);
        assert_eq!(filter.status(), None);
        assert_eq!(filter.search(), None);

        let filter = ReportFilter {
            category: Some("Safety".to_string()),
            status: Some("pending".to_string()),
            search: Some("light".to_string()),
        };
        assert_eq!(filter.category(), Some("Safety"));
        assert_eq!(filter.status(), Some("pending"));
        assert_eq!(filter.search(), Some("light"));
    }

    #[test]
    fn latest_report_passes_unknown_status_through() {
        let mut report = sample_report();
        report.status = "in_review".to_string();

        let latest = LatestReport::from(report);
        assert_eq!(latest.status, "in_review");

        let body = serde_json::to_value(&latest).expect("serialize");
        assert_eq!(body["status"], "in_review");
    }
}

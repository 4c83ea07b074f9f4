//! Business logic. Handlers stay thin and call into these services.

pub mod edit_logs;
pub mod forecasting;
pub mod items;
pub mod neighbors;
pub mod purchases;
pub mod reports;
pub mod sales;

use crate::errors::ServiceError;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Service registry carried in [`crate::AppState`].
#[derive(Clone)]
pub struct AppServices {
    pub items: Arc<items::ItemService>,
    pub neighbors: Arc<neighbors::NeighborService>,
    pub purchases: Arc<purchases::PurchaseService>,
    pub sales: Arc<sales::SaleService>,
    pub edit_logs: Arc<edit_logs::EditLogService>,
    pub reports: Arc<reports::ReportService>,
}

/// Outcome of one entry in a bulk operation.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchOutcome {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

/// Per-entry report for bulk operations that allow partial success.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    pub fn record_success(&mut self, id: impl Into<String>) {
        self.succeeded += 1;
        self.outcomes.push(BatchOutcome {
            id: id.into(),
            ok: true,
            error: None,
            error_kind: None,
        });
    }

    pub fn record_failure(&mut self, id: impl Into<String>, err: &ServiceError) {
        self.failed += 1;
        self.outcomes.push(BatchOutcome {
            id: id.into(),
            ok: false,
            error: Some(err.response_message()),
            error_kind: Some(err.kind().to_string()),
        });
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Parses a client-supplied identifier.
pub(crate) fn parse_id(field: &str, raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ServiceError::ValidationError(format!("{} must be a valid id", field)))
}

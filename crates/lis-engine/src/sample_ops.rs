//! Bulk test operations on sample items

use crate::api::{AddTestsRequest, AddTestsResponse, CancelTestRequest, CancelTestResponse, StorageApi};
use crate::error::EngineError;
use crate::scope::ViewScope;
use lis_model::{SampleItem, SampleItemId};
use std::sync::Arc;

/// Selected samples split by whether tests can be added to them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Eligibility<'a> {
    pub eligible: Vec<&'a SampleItem>,
    pub excluded: Vec<&'a SampleItem>,
}

impl Eligibility<'_> {
    /// Ids to submit
    #[must_use]
    pub fn eligible_ids(&self) -> Vec<SampleItemId> {
        self.eligible.iter().map(|s| s.id.clone()).collect()
    }
}

/// Partition a selection: samples without remaining quantity are excluded
#[must_use]
pub fn partition_eligible<'a, I>(selection: I) -> Eligibility<'a>
where
    I: IntoIterator<Item = &'a SampleItem>,
{
    let (eligible, excluded): (Vec<_>, Vec<_>) = selection.into_iter().partition(|s| s.has_remaining_quantity);
    Eligibility { eligible, excluded }
}

/// Async driver for add-tests and cancel-test
pub struct SampleOperations {
    api: Arc<dyn StorageApi>,
    scope: ViewScope,
}

impl SampleOperations {
    /// Create bound to a view scope
    #[must_use]
    pub fn new(api: Arc<dyn StorageApi>, scope: ViewScope) -> Self {
        Self { api, scope }
    }

    /// Add tests to every eligible sample in `selection`
    ///
    /// # Errors
    /// - `EngineError::NoEligibleSamples` / `EngineError::NoTestsSelected`;
    ///   no request is sent
    /// - `EngineError::Api` / `EngineError::Stale` otherwise
    pub async fn add_tests(
        &self,
        selection: &[SampleItem],
        test_ids: Vec<String>,
    ) -> Result<AddTestsResponse, EngineError> {
        let split = partition_eligible(selection);
        if split.eligible.is_empty() {
            return Err(EngineError::NoEligibleSamples);
        }
        if test_ids.is_empty() {
            return Err(EngineError::NoTestsSelected);
        }
        if !split.excluded.is_empty() {
            tracing::debug!(excluded = split.excluded.len(), "skipping samples without remaining quantity");
        }

        let request = AddTestsRequest {
            sample_item_ids: split.eligible_ids(),
            test_ids,
        };
        let ticket = self.scope.ticket();
        let response = self.api.add_tests(&request).await?;
        let response = ticket.accept(response)?;
        tracing::info!(
            samples = request.sample_item_ids.len(),
            tests = request.test_ids.len(),
            added = response.success_count,
            "tests added"
        );
        Ok(response)
    }

    /// Cancel one ordered test
    ///
    /// # Errors
    /// `EngineError::Api` / `EngineError::Stale`
    pub async fn cancel_test(
        &self,
        sample_item_id: SampleItemId,
        analysis_id: impl Into<String>,
    ) -> Result<CancelTestResponse, EngineError> {
        let request = CancelTestRequest {
            analysis_id: analysis_id.into(),
            sample_item_id,
        };
        let ticket = self.scope.ticket();
        let response = self.api.cancel_test(&request).await?;
        let response = ticket.accept(response)?;
        tracing::info!(
            sample = %request.sample_item_id,
            analysis = %request.analysis_id,
            "test cancelled"
        );
        Ok(response)
    }
}

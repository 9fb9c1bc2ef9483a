//! Aliquot splitting
//!
//! Validation runs in a fixed order and the first failure wins:
//! 1. Quantity present and positive
//! 2. Quantity within the parent's effective remaining quantity
//! 3. Aliquot count within `[1, 100]`
//! 4. Per-aliquot quantity at least `0.001`
//!
//! The server divides and persists; the client only previews the per-aliquot
//! quantity and checks the created volumes add back up to the request. A
//! mismatch is reported next to the created aliquots, since the split is
//! already committed.

use crate::api::{AliquotResponse, AliquotSubmission, StorageApi};
use crate::error::{AliquotValidationError, EngineError, VolumeDiscrepancy};
use crate::scope::ViewScope;
use lis_model::{SampleItem, SampleItemId};
use std::sync::Arc;

/// Smallest aliquot the backend accepts
pub const MIN_QUANTITY_PER_ALIQUOT: f64 = 0.001;
/// Fewest aliquots per request
pub const MIN_ALIQUOTS: u32 = 1;
/// Most aliquots per request
pub const MAX_ALIQUOTS: u32 = 100;
/// Allowed rounding gap per created aliquot
pub const CONSERVATION_TOLERANCE: f64 = 0.0005;

/// Raw form input, as typed by the operator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AliquotForm {
    pub quantity_to_transfer: String,
    pub number_of_aliquots: i64,
    pub notes: Option<String>,
}

impl AliquotForm {
    /// Form with quantity and count
    #[must_use]
    pub fn new(quantity: impl Into<String>, count: i64) -> Self {
        Self {
            quantity_to_transfer: quantity.into(),
            number_of_aliquots: count,
            notes: None,
        }
    }

    /// With notes
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Validated split request
#[derive(Debug, Clone, PartialEq)]
pub struct AliquotRequest {
    pub parent_sample_item_id: SampleItemId,
    pub quantity_to_transfer: f64,
    pub number_of_aliquots: u32,
    pub notes: Option<String>,
}

impl AliquotRequest {
    /// Wire body for the aliquot endpoint
    #[must_use]
    pub fn to_submission(&self) -> AliquotSubmission {
        AliquotSubmission {
            parent_sample_item_id: self.parent_sample_item_id.clone(),
            quantity_to_transfer: self.quantity_to_transfer,
            number_of_aliquots: self.number_of_aliquots,
            notes: self.notes.clone().filter(|n| !n.trim().is_empty()),
        }
    }
}

/// Derived split figures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AliquotPlan {
    pub quantity_per_aliquot: f64,
}

impl AliquotPlan {
    /// Per-aliquot quantity to three decimals
    #[must_use]
    pub fn display(&self) -> String {
        format!("{:.3}", self.quantity_per_aliquot)
    }
}

/// Whether `parent` can be split at all
///
/// # Errors
/// `AliquotValidationError::NothingRemaining` when the parent is empty
pub fn ensure_splittable(parent: &SampleItem) -> Result<(), AliquotValidationError> {
    if parent.has_remaining_quantity {
        Ok(())
    } else {
        Err(AliquotValidationError::NothingRemaining(parent.external_id.clone()))
    }
}

/// Validate form input against the parent sample
///
/// # Errors
/// The first rule violated, in rule order
pub fn validate(parent: &SampleItem, form: &AliquotForm) -> Result<AliquotRequest, AliquotValidationError> {
    let raw = form.quantity_to_transfer.trim();
    if raw.is_empty() {
        return Err(AliquotValidationError::QuantityRequired);
    }
    let quantity: f64 = raw
        .parse()
        .map_err(|_| AliquotValidationError::QuantityNotPositive)?;
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(AliquotValidationError::QuantityNotPositive);
    }

    if let Some(remaining) = parent.effective_remaining_quantity {
        if quantity > remaining {
            return Err(AliquotValidationError::QuantityExceedsRemaining {
                requested: quantity,
                remaining,
            });
        }
    }

    let count = u32::try_from(form.number_of_aliquots)
        .ok()
        .filter(|c| (MIN_ALIQUOTS..=MAX_ALIQUOTS).contains(c))
        .ok_or(AliquotValidationError::InvalidCount {
            count: form.number_of_aliquots,
            min: MIN_ALIQUOTS,
            max: MAX_ALIQUOTS,
        })?;

    let per_aliquot = quantity / f64::from(count);
    if per_aliquot < MIN_QUANTITY_PER_ALIQUOT {
        return Err(AliquotValidationError::QuantityPerAliquotTooSmall {
            quantity_per_aliquot: format!("{per_aliquot:.6}"),
        });
    }

    Ok(AliquotRequest {
        parent_sample_item_id: parent.id.clone(),
        quantity_to_transfer: quantity,
        number_of_aliquots: count,
        notes: form.notes.clone(),
    })
}

/// Per-aliquot quantity of a validated request
#[must_use]
pub fn compute(request: &AliquotRequest) -> AliquotPlan {
    AliquotPlan {
        quantity_per_aliquot: request.quantity_to_transfer / f64::from(request.number_of_aliquots),
    }
}

/// Live preview for the form: per-aliquot quantity, or the first error
///
/// # Errors
/// Same as [`validate`]
pub fn preview(parent: &SampleItem, form: &AliquotForm) -> Result<String, AliquotValidationError> {
    validate(parent, form).map(|request| compute(&request).display())
}

/// Check the server's answer conserves the requested volume
///
/// Per-aliquot quantities are used when every created aliquot carries one;
/// otherwise `quantityPerAliquot × aliquotCount`. An answer with neither is
/// not checked.
///
/// # Errors
/// `VolumeDiscrepancy` when the total differs from the request by more than
/// three-decimal rounding of each aliquot
pub fn verify_conservation(request: &AliquotRequest, response: &AliquotResponse) -> Result<(), VolumeDiscrepancy> {
    let quantities: Option<Vec<f64>> = response
        .created()
        .iter()
        .map(|a| a.quantity.or(response.quantity_per_aliquot))
        .collect();

    let (actual, parts) = match quantities {
        Some(quantities) if !quantities.is_empty() => {
            let parts = u32::try_from(quantities.len()).unwrap_or(u32::MAX);
            (quantities.iter().sum::<f64>(), parts)
        }
        _ => {
            let Some(per) = response.quantity_per_aliquot else {
                return Ok(());
            };
            let count = response.aliquot_count.unwrap_or(request.number_of_aliquots);
            (per * f64::from(count), count)
        }
    };

    let tolerance = CONSERVATION_TOLERANCE * f64::from(parts.max(1));
    if (actual - request.quantity_to_transfer).abs() <= tolerance + f64::EPSILON {
        Ok(())
    } else {
        Err(VolumeDiscrepancy {
            expected: request.quantity_to_transfer,
            actual,
        })
    }
}

/// Committed split, with any volume mismatch in the server's answer
#[derive(Debug, Clone, PartialEq)]
pub struct AliquotSplit {
    pub response: AliquotResponse,
    pub discrepancy: Option<VolumeDiscrepancy>,
}

impl AliquotSplit {
    /// Every created aliquot
    #[must_use]
    pub fn created(&self) -> Vec<&SampleItem> {
        self.response.created()
    }

    /// Whether the created volumes add up to the request
    #[must_use]
    pub fn is_conserved(&self) -> bool {
        self.discrepancy.is_none()
    }
}

/// Async driver: validate, submit, verify
pub struct AliquotSplitter {
    api: Arc<dyn StorageApi>,
    scope: ViewScope,
}

impl AliquotSplitter {
    /// Create a splitter bound to a view scope
    #[must_use]
    pub fn new(api: Arc<dyn StorageApi>, scope: ViewScope) -> Self {
        Self { api, scope }
    }

    /// Validate and submit a split
    ///
    /// Nothing is sent when validation fails. External ids of the new
    /// aliquots come from the server only.
    ///
    /// # Errors
    /// - `EngineError::Aliquot` for local validation failures
    /// - `EngineError::Api` when the server rejects the split
    /// - `EngineError::Stale` if the view closed meanwhile
    pub async fn submit(&self, parent: &SampleItem, form: &AliquotForm) -> Result<AliquotSplit, EngineError> {
        ensure_splittable(parent)?;
        let request = validate(parent, form)?;
        let plan = compute(&request);
        let ticket = self.scope.ticket();

        tracing::info!(
            parent = %request.parent_sample_item_id,
            quantity = request.quantity_to_transfer,
            count = request.number_of_aliquots,
            per_aliquot = %plan.display(),
            "submitting aliquot split"
        );

        let response = match self.api.create_aliquots(&request.to_submission()).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(parent = %request.parent_sample_item_id, error = %e, "aliquot split rejected");
                return Err(e.into());
            }
        };
        let response = ticket.accept(response)?;

        let discrepancy = verify_conservation(&request, &response).err();
        if let Some(d) = &discrepancy {
            tracing::warn!(
                parent = %request.parent_sample_item_id,
                expected = d.expected,
                actual = d.actual,
                "aliquot volumes do not add up to the request"
            );
        }
        tracing::info!(
            parent = %request.parent_sample_item_id,
            created = response.created().len(),
            "aliquot split created"
        );
        Ok(AliquotSplit { response, discrepancy })
    }
}

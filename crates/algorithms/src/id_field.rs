//! Identifier column resolution
//!
//! Waterbody layers come from many producers and name their key column
//! differently (`UID`, `WB_ID`, `FID`, ...). Before time series can be keyed by
//! waterbody, the column that uniquely identifies each row has to be picked,
//! either as requested by the user or by guessing from a fixed preference list.
//!
//! Guessing runs two passes over the preference list: exact names first, then
//! lower-cased names. The lower-case pass only runs when the exact pass found
//! no columns at all; exact candidates that fail the uniqueness check never
//! fall through to it.

use thiserror::Error;
use tracing::{debug, warn};
use waterbodies_core::vector::AttributeTable;

/// Candidate identifier columns, in order of preference.
pub const ID_FIELD_PREFERENCE: [&str; 8] = [
    "UID", "WB_ID", "FID_1", "FID", "ID", "OBJECTID", "ORIG_FID", "FeatureID",
];

/// Reasons an identifier column could not be resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdFieldError {
    #[error("Couldn't find ID column '{requested}' in the vector file columns: {available:?}.")]
    ColumnNotFound {
        requested: String,
        available: Vec<String>,
    },

    #[error("Values in the {column} column are not unique.")]
    NotUnique { column: String },

    #[error("Couldn't find any ID column {preference:?} in the vector file columns: {available:?}.")]
    NoIdColumnFound {
        preference: Vec<String>,
        available: Vec<String>,
    },

    #[error("ID values in the column(s) {candidates:?} are not unique.")]
    NoUniqueIdColumn { candidates: Vec<String> },
}

impl From<IdFieldError> for waterbodies_core::Error {
    fn from(e: IdFieldError) -> Self {
        waterbodies_core::Error::Algorithm(e.to_string())
    }
}

/// Check whether `column` holds one distinct value per row.
///
/// An empty table passes trivially.
pub fn id_field_values_is_unique<D>(dataset: &D, column: &str) -> bool
where
    D: AttributeTable + ?Sized,
{
    dataset.distinct_count(column) == dataset.row_count()
}

/// Resolve the identifier column of `dataset`.
///
/// With `use_id` set (and non-empty) that column must exist and be unique.
/// Otherwise the first unique column from [`ID_FIELD_PREFERENCE`] is
/// returned.
pub fn guess_id_field<D>(dataset: &D, use_id: Option<&str>) -> Result<String, IdFieldError>
where
    D: AttributeTable + ?Sized,
{
    IdFieldResolver::default().resolve(dataset, use_id)
}

/// Identifier column resolver over a preference list.
#[derive(Debug, Clone)]
pub struct IdFieldResolver {
    preference: Vec<String>,
}

impl Default for IdFieldResolver {
    fn default() -> Self {
        Self::with_preference(ID_FIELD_PREFERENCE)
    }
}

impl IdFieldResolver {
    /// Resolver with a custom preference list
    pub fn with_preference<I, S>(preference: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            preference: preference.into_iter().map(Into::into).collect(),
        }
    }

    pub fn preference(&self) -> &[String] {
        &self.preference
    }

    /// See [`guess_id_field`].
    pub fn resolve<D>(&self, dataset: &D, requested: Option<&str>) -> Result<String, IdFieldError>
    where
        D: AttributeTable + ?Sized,
    {
        if dataset.row_count() == 0 {
            warn!("Attribute table has no rows; every column is trivially unique");
        }

        match requested.filter(|name| !name.is_empty()) {
            Some(name) => self.check_requested(dataset, name),
            None => self.guess(dataset),
        }
    }

    fn check_requested<D>(&self, dataset: &D, name: &str) -> Result<String, IdFieldError>
    where
        D: AttributeTable + ?Sized,
    {
        if !dataset.has_column(name) {
            return Err(IdFieldError::ColumnNotFound {
                requested: name.to_string(),
                available: dataset.column_names().to_vec(),
            });
        }
        if !id_field_values_is_unique(dataset, name) {
            return Err(IdFieldError::NotUnique {
                column: name.to_string(),
            });
        }
        debug!(column = name, "Using requested ID column");
        Ok(name.to_string())
    }

    fn guess<D>(&self, dataset: &D) -> Result<String, IdFieldError>
    where
        D: AttributeTable + ?Sized,
    {
        let mut candidates: Vec<String> = self
            .preference
            .iter()
            .filter(|name| dataset.has_column(name))
            .cloned()
            .collect();

        if candidates.is_empty() {
            candidates = self
                .preference
                .iter()
                .map(|name| name.to_lowercase())
                .filter(|name| dataset.has_column(name))
                .collect();
        }

        if candidates.is_empty() {
            return Err(IdFieldError::NoIdColumnFound {
                preference: self.preference.clone(),
                available: dataset.column_names().to_vec(),
            });
        }

        match candidates
            .iter()
            .find(|name| id_field_values_is_unique(dataset, name))
        {
            Some(found) => {
                debug!(column = %found, ?candidates, "Guessed ID column");
                Ok(found.clone())
            }
            None => Err(IdFieldError::NoUniqueIdColumn { candidates }),
        }
    }
}

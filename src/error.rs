use std::fmt;

use thiserror::Error;

/// Stage of a poll cycle, attached to every error for diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Load,
    Fetch,
    Deliver,
    Save,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Resolve => "resolve",
            Stage::Load => "load",
            Stage::Fetch => "fetch",
            Stage::Deliver => "deliver",
            Stage::Save => "save",
        };
        f.write_str(s)
    }
}

/// Failures a poll cycle (or an administrative command) can run into.
///
/// None of these are fatal to the scheduler; callers decide per kind whether
/// to skip, degrade or surface.
#[derive(Debug, Error)]
pub enum SaleError {
    /// Unknown collection or unresolvable destination channel.
    #[error("configuration error for {collection}: {reason}")]
    Configuration { collection: String, reason: String },

    /// Network, HTTP status or decode failure talking to the feed.
    #[error("fetch failed for {collection}: {reason}")]
    UpstreamFetch { collection: String, reason: String },

    /// Watermark load or save failure.
    #[error("storage {stage} failed for {collection}: {reason}")]
    Storage {
        collection: String,
        stage: Stage,
        reason: String,
    },

    /// A single notification could not be delivered.
    #[error("delivery failed for {collection}: {reason}")]
    Delivery { collection: String, reason: String },
}

impl SaleError {
    pub fn configuration(collection: &str, reason: impl fmt::Display) -> Self {
        Self::Configuration {
            collection: collection.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn fetch(collection: &str, reason: impl fmt::Display) -> Self {
        Self::UpstreamFetch {
            collection: collection.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn storage(collection: &str, stage: Stage, reason: impl fmt::Display) -> Self {
        Self::Storage {
            collection: collection.to_string(),
            stage,
            reason: reason.to_string(),
        }
    }

    pub fn delivery(collection: &str, reason: impl fmt::Display) -> Self {
        Self::Delivery {
            collection: collection.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Collection the error belongs to.
    pub fn collection(&self) -> &str {
        match self {
            Self::Configuration { collection, .. }
            | Self::UpstreamFetch { collection, .. }
            | Self::Storage { collection, .. }
            | Self::Delivery { collection, .. } => collection,
        }
    }

    /// Cycle stage that produced the error.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Configuration { .. } => Stage::Resolve,
            Self::UpstreamFetch { .. } => Stage::Fetch,
            Self::Storage { stage, .. } => *stage,
            Self::Delivery { .. } => Stage::Deliver,
        }
    }
}

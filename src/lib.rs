use serde::{Deserialize, Serialize};

pub mod dataset;
pub mod error;
pub mod harness;
pub mod interrupt;
pub mod pipeline;
pub mod query;
pub mod report;
pub mod schema;
pub mod stage;
pub mod transport;

/// One bulk mutation in the fixed pipeline order.
///
/// Variant order is the execution order; `Ord` follows it so stage-keyed maps
/// iterate the way the pipeline ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// `bulkCreateLogServicesHeader`: roots the primary identifier chain.
    HeaderCreate,
    /// `bulkUpdateLogServicesHeader`, keyed by header ids.
    HeaderUpdate,
    /// `bulkCreateLogMicroservice`, keyed by header ids; roots the microservice chain.
    MicroCreate,
    /// `bulkUpdateLogMicroservice`, keyed by microservice ids.
    MicroUpdate,
    /// `bulkCreateLogServicesContent`, keyed by header ids.
    ContentCreate,
    /// `bulkUpdateLogServicesContent`, keyed by header ids.
    ContentUpdate,
}

/// An identifier chain threaded between stages of one batch iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chain {
    /// `logId` values returned by the header create.
    Header,
    /// `logMicroserviceId` values returned by the microservice create.
    Micro,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Create,
    Update,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::HeaderCreate,
        Stage::HeaderUpdate,
        Stage::MicroCreate,
        Stage::MicroUpdate,
        Stage::ContentCreate,
        Stage::ContentUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::HeaderCreate => "header_create",
            Stage::HeaderUpdate => "header_update",
            Stage::MicroCreate => "micro_create",
            Stage::MicroUpdate => "micro_update",
            Stage::ContentCreate => "content_create",
            Stage::ContentUpdate => "content_update",
        }
    }

    /// GraphQL mutation field name.
    pub fn operation(&self) -> &'static str {
        match self {
            Stage::HeaderCreate => "bulkCreateLogServicesHeader",
            Stage::HeaderUpdate => "bulkUpdateLogServicesHeader",
            Stage::MicroCreate => "bulkCreateLogMicroservice",
            Stage::MicroUpdate => "bulkUpdateLogMicroservice",
            Stage::ContentCreate => "bulkCreateLogServicesContent",
            Stage::ContentUpdate => "bulkUpdateLogServicesContent",
        }
    }

    pub fn kind(&self) -> StageKind {
        match self {
            Stage::HeaderCreate | Stage::MicroCreate | Stage::ContentCreate => StageKind::Create,
            Stage::HeaderUpdate | Stage::MicroUpdate | Stage::ContentUpdate => StageKind::Update,
        }
    }

    /// The chain whose identifiers this stage's records bind to, if any.
    pub fn consumes(&self) -> Option<Chain> {
        match self {
            Stage::HeaderCreate => None,
            Stage::MicroUpdate => Some(Chain::Micro),
            Stage::HeaderUpdate | Stage::MicroCreate | Stage::ContentCreate | Stage::ContentUpdate => {
                Some(Chain::Header)
            }
        }
    }

    /// The chain this stage's returned identifiers feed.
    pub fn produces(&self) -> Option<Chain> {
        match self {
            Stage::HeaderCreate => Some(Chain::Header),
            Stage::MicroCreate => Some(Chain::Micro),
            _ => None,
        }
    }

    /// Identifier field selected under `insertedItems` for producing stages.
    pub fn id_field(&self) -> Option<&'static str> {
        match self.produces() {
            Some(Chain::Header) => Some("logId"),
            Some(Chain::Micro) => Some("logMicroserviceId"),
            None => None,
        }
    }

    /// Console tag, e.g. `[Header]`.
    pub fn entity_label(&self) -> &'static str {
        match self {
            Stage::HeaderCreate | Stage::HeaderUpdate => "[Header]",
            Stage::MicroCreate | Stage::MicroUpdate => "[Micro]",
            Stage::ContentCreate | Stage::ContentUpdate => "[Content]",
        }
    }

    pub fn action_label(&self) -> &'static str {
        match self.kind() {
            StageKind::Create => "BulkCreate",
            StageKind::Update => "BulkUpdate",
        }
    }

    /// Response field carrying the succeeded count.
    pub fn count_field(&self) -> &'static str {
        match self.kind() {
            StageKind::Create => "totalInserted",
            StageKind::Update => "totalUpdated",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

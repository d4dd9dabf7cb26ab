//! Plot searches offering leased land to applicants, and free-form area searches.

pub mod domain;
pub mod repository;
pub mod router;
pub mod service;
pub mod view;

pub use domain::{AreaSearch, PlotSearch, PlotSearchId, PlotSearchTarget, TargetType};
pub use repository::{PlotSearchRepository, PlotSearchWrite};
pub use router::plot_search_router;
pub use service::PlotSearchService;
pub use view::{PlotSearchView, TargetView};

use crate::forms::{AnswerId, FormError};
use crate::http::ApiError;
use crate::leasing::domain::DecisionId;
use crate::leasing::land_area::PlanUnitId;
use crate::store::{NestedError, RepositoryError};

use domain::{AreaSearchIntendedUseId, PlotSearchStageId, PlotSearchSubtypeId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlotSearchError {
    #[error("plan unit {0} is not a master plan unit")]
    PlanUnitNotMaster(PlanUnitId),
    #[error("plan unit {0} does not exist")]
    UnknownPlanUnit(PlanUnitId),
    #[error("new plot search targets need a plan_unit_id")]
    PlanUnitRequired,
    #[error("decision {0} does not exist")]
    UnknownDecision(DecisionId),
    #[error("plot search subtype {0} does not exist")]
    UnknownSubtype(PlotSearchSubtypeId),
    #[error("plot search stage {0} does not exist")]
    UnknownStage(PlotSearchStageId),
    #[error("intended use {0} does not exist")]
    UnknownIntendedUse(AreaSearchIntendedUseId),
    #[error("answer {0} does not exist")]
    UnknownAnswer(AnswerId),
    #[error("geometry must be a GeoJSON geometry object")]
    InvalidGeometry,
    #[error(transparent)]
    Form(#[from] FormError),
    #[error(transparent)]
    Nested(#[from] NestedError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<PlotSearchError> for ApiError {
    fn from(value: PlotSearchError) -> Self {
        match value {
            PlotSearchError::Repository(err) => err.into(),
            PlotSearchError::Form(err) => err.into(),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

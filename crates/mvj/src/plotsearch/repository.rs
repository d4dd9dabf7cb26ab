use crate::leasing::repository::PlanUnitAccess;
use crate::store::{IdSource, RepositoryError};

use super::domain::{
    AreaSearch, AreaSearchId, AreaSearchIntendedUse, PlotSearch, PlotSearchId, PlotSearchStage,
    PlotSearchSubtype, PlotSearchType,
};

/// Which plot search [`PlotSearchRepository::write_plot_search`] works on.
#[derive(Debug, Clone)]
pub enum PlotSearchWrite {
    Create(PlotSearch),
    Update(PlotSearchId),
}

/// Storage for plot searches, area searches, and their reference data.
pub trait PlotSearchRepository: IdSource {
    fn plot_searches(&self) -> Result<Vec<PlotSearch>, RepositoryError>;
    fn plot_search(&self, id: PlotSearchId) -> Result<Option<PlotSearch>, RepositoryError>;

    /// Runs `change` on the plot search while holding the plan units it may duplicate or
    /// remove. Nothing is stored unless `change` succeeds.
    fn write_plot_search<E, F>(&self, target: PlotSearchWrite, change: F) -> Result<PlotSearch, E>
    where
        F: FnOnce(&mut PlotSearch, &mut dyn PlanUnitAccess) -> Result<(), E>,
        E: From<RepositoryError>;

    /// Removes the plot search together with the duplicated plan units of its targets.
    fn delete_plot_search(&self, id: PlotSearchId) -> Result<PlotSearch, RepositoryError>;

    fn plot_search_types(&self) -> Result<Vec<PlotSearchType>, RepositoryError>;
    fn plot_search_subtypes(&self) -> Result<Vec<PlotSearchSubtype>, RepositoryError>;
    fn plot_search_stages(&self) -> Result<Vec<PlotSearchStage>, RepositoryError>;

    fn intended_uses(&self) -> Result<Vec<AreaSearchIntendedUse>, RepositoryError>;
    fn area_searches(&self) -> Result<Vec<AreaSearch>, RepositoryError>;
    fn insert_area_search(&self, search: AreaSearch) -> Result<AreaSearch, RepositoryError>;

    fn area_search(&self, id: AreaSearchId) -> Result<Option<AreaSearch>, RepositoryError> {
        Ok(self
            .area_searches()?
            .into_iter()
            .find(|search| search.id == id))
    }
}

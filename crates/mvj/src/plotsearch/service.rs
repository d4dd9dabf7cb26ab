use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::auth::User;
use crate::forms::{FormId, FormRepository, FormService};
use crate::leasing::domain::DecisionId;
use crate::leasing::land_area::PlanUnitId;
use crate::leasing::repository::{LeasingRepository, PlanUnitAccess};
use crate::store::{create_nested, IdSource, NestedError, RepositoryError};

use super::domain::{
    is_geometry, AreaSearch, AreaSearchDraft, AreaSearchId, PlotSearch, PlotSearchId,
    PlotSearchInput, PlotSearchTarget, PlotSearchTargetId, TargetInput,
};
use super::repository::{PlotSearchRepository, PlotSearchWrite};
use super::view::PlotSearchView;
use super::PlotSearchError;

/// Plot searches with their targets and attached forms, plus area searches.
pub struct PlotSearchService<R> {
    repository: Arc<R>,
    forms: FormService<R>,
}

impl<R> PlotSearchService<R>
where
    R: PlotSearchRepository + LeasingRepository + FormRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            forms: FormService::new(Arc::clone(&repository)),
            repository,
        }
    }

    fn ids(&self) -> &dyn IdSource {
        self.repository.as_ref()
    }

    fn view(&self, search: PlotSearch) -> Result<PlotSearchView, PlotSearchError> {
        let leases = self.repository.leases()?;
        let subtypes = self.repository.plot_search_subtypes()?;
        Ok(PlotSearchView::build(search, &leases, &subtypes))
    }

    pub fn list(&self) -> Result<Vec<PlotSearchView>, PlotSearchError> {
        let leases = self.repository.leases()?;
        let subtypes = self.repository.plot_search_subtypes()?;
        let mut searches = self.repository.plot_searches()?;
        searches.sort_by_key(|search| search.id);
        Ok(searches
            .into_iter()
            .map(|search| PlotSearchView::build(search, &leases, &subtypes))
            .collect())
    }

    pub fn get(&self, id: PlotSearchId) -> Result<PlotSearchView, PlotSearchError> {
        self.view(self.stored(id)?)
    }

    fn stored(&self, id: PlotSearchId) -> Result<PlotSearch, PlotSearchError> {
        self.repository
            .plot_search(id)?
            .ok_or_else(|| RepositoryError::not_found("plot search", id.0).into())
    }

    pub fn create(&self, input: PlotSearchInput) -> Result<PlotSearchView, PlotSearchError> {
        self.validate(&input)?;
        let (form, fresh_clone) = self.resolve_form(input.form, None)?;
        let search = PlotSearch::new(PlotSearchId(self.ids().next_id()), input.name.clone());
        let written = self.write(PlotSearchWrite::Create(search), input, form);
        let search = self.settle_forms(written, fresh_clone, None)?;
        info!(
            plot_search_id = %search.id,
            targets = search.plot_search_targets.len(),
            "plot search created"
        );
        self.view(search)
    }

    pub fn update(
        &self,
        id: PlotSearchId,
        input: PlotSearchInput,
    ) -> Result<PlotSearchView, PlotSearchError> {
        let current = self.stored(id)?;
        self.validate(&input)?;
        let (form, fresh_clone) = self.resolve_form(input.form, current.form)?;
        let written = self.write(PlotSearchWrite::Update(id), input, form);
        let search = self.settle_forms(written, fresh_clone, current.form)?;
        info!(
            plot_search_id = %id,
            targets = search.plot_search_targets.len(),
            "plot search updated"
        );
        self.view(search)
    }

    pub fn delete(&self, id: PlotSearchId) -> Result<(), PlotSearchError> {
        let search = self.repository.delete_plot_search(id)?;
        info!(
            plot_search_id = %id,
            targets = search.plot_search_targets.len(),
            "plot search deleted"
        );
        Ok(())
    }

    pub fn area_searches(&self) -> Result<Vec<AreaSearch>, PlotSearchError> {
        let mut searches = self.repository.area_searches()?;
        searches.sort_by_key(|search| search.id);
        Ok(searches)
    }

    pub fn area_search(&self, id: AreaSearchId) -> Result<AreaSearch, PlotSearchError> {
        self.repository
            .area_search(id)?
            .ok_or_else(|| RepositoryError::not_found("area search", id.0).into())
    }

    pub fn create_area_search(
        &self,
        user: &User,
        draft: AreaSearchDraft,
    ) -> Result<AreaSearch, PlotSearchError> {
        let known_use = self
            .repository
            .intended_uses()?
            .iter()
            .any(|intended_use| intended_use.id == draft.intended_use);
        if !known_use {
            return Err(PlotSearchError::UnknownIntendedUse(draft.intended_use));
        }
        if !is_geometry(&draft.geometry) {
            warn!(user_id = %user.id, "area search rejected: invalid geometry");
            return Err(PlotSearchError::InvalidGeometry);
        }
        if let Some(answer) = draft.answer {
            if self.repository.answer(answer)?.is_none() {
                return Err(PlotSearchError::UnknownAnswer(answer));
            }
        }

        let search = AreaSearch {
            id: AreaSearchId(self.ids().next_id()),
            description_area: draft.description_area,
            description_intended_use: draft.description_intended_use,
            intended_use: draft.intended_use,
            geometry: draft.geometry,
            start_date: draft.start_date,
            end_date: draft.end_date,
            user: user.id,
            answer: draft.answer,
            created_at: Utc::now(),
        };
        let stored = self.repository.insert_area_search(search)?;
        info!(area_search_id = %stored.id, user_id = %user.id, "area search created");
        Ok(stored)
    }

    fn validate(&self, input: &PlotSearchInput) -> Result<(), PlotSearchError> {
        if let Some(subtype) = input.subtype {
            let known = self.repository.plot_search_subtypes()?;
            if !known.iter().any(|candidate| candidate.id == subtype) {
                return Err(PlotSearchError::UnknownSubtype(subtype));
            }
        }
        if let Some(stage) = input.stage {
            let known = self.repository.plot_search_stages()?;
            if !known.iter().any(|candidate| candidate.id == stage) {
                return Err(PlotSearchError::UnknownStage(stage));
            }
        }
        if !input.decisions.is_empty() {
            let known: HashSet<DecisionId> = self
                .repository
                .leases()?
                .iter()
                .flat_map(|lease| lease.decisions.iter().map(|decision| decision.id))
                .collect();
            if let Some(missing) = input.decisions.iter().find(|id| !known.contains(*id)) {
                return Err(PlotSearchError::UnknownDecision(*missing));
            }
        }
        Ok(())
    }

    /// Form to attach for `requested`, and the id of a clone made for it from a template.
    fn resolve_form(
        &self,
        requested: Option<FormId>,
        current: Option<FormId>,
    ) -> Result<(Option<FormId>, Option<FormId>), PlotSearchError> {
        let Some(id) = requested else {
            return Ok((None, None));
        };
        if Some(id) == current {
            return Ok((Some(id), None));
        }
        if self.forms.form(id)?.is_template {
            let clone = self.forms.clone_template(id)?;
            return Ok((Some(clone.id), Some(clone.id)));
        }
        Ok((Some(id), None))
    }

    fn write(
        &self,
        target: PlotSearchWrite,
        input: PlotSearchInput,
        form: Option<FormId>,
    ) -> Result<PlotSearch, PlotSearchError> {
        let ids = self.ids();
        self.repository
            .write_plot_search(target, |search, plan_units| {
                search.name = input.name;
                search.subtype = input.subtype;
                search.stage = input.stage;
                search.search_class = input.search_class;
                search.preparer = input.preparer;
                search.begin_at = input.begin_at;
                search.end_at = input.end_at;
                search.form = form;
                search.decisions = input.decisions;
                search.plot_search_targets = merge_targets(
                    std::mem::take(&mut search.plot_search_targets),
                    input.plot_search_targets,
                    plan_units,
                    ids,
                )?;
                search.modified_at = Utc::now();
                Ok(())
            })
            .inspect_err(|err| warn!(error = %err, "plot search write rejected"))
    }

    /// Drops the fresh clone when the write failed, or the replaced clone when it succeeded.
    fn settle_forms(
        &self,
        written: Result<PlotSearch, PlotSearchError>,
        fresh_clone: Option<FormId>,
        previous: Option<FormId>,
    ) -> Result<PlotSearch, PlotSearchError> {
        match written {
            Err(err) => {
                if let Some(clone) = fresh_clone {
                    self.discard_form(clone);
                }
                Err(err)
            }
            Ok(search) => {
                if let Some(replaced) = previous.filter(|previous| search.form != Some(*previous)) {
                    self.discard_form(replaced);
                }
                Ok(search)
            }
        }
    }

    fn discard_form(&self, id: FormId) {
        match self.forms.form(id) {
            Ok(form) if !form.is_template => {
                if let Err(err) = self.forms.delete_form(id) {
                    warn!(form_id = %id, error = %err, "detached form kept");
                }
            }
            Ok(_) => {}
            Err(err) => warn!(form_id = %id, error = %err, "detached form not found"),
        }
    }
}

/// Targets with an id keep their plan unit; new ones duplicate a master plan unit; dropped
/// ones take their duplicate with them.
fn merge_targets(
    existing: Vec<PlotSearchTarget>,
    inputs: Vec<TargetInput>,
    plan_units: &mut dyn PlanUnitAccess,
    ids: &dyn IdSource,
) -> Result<Vec<PlotSearchTarget>, PlotSearchError> {
    let mut pool: Vec<Option<PlotSearchTarget>> = existing.into_iter().map(Some).collect();
    let mut merged = Vec::with_capacity(inputs.len());

    for input in inputs {
        match input.id {
            Some(id) => {
                let mut target = pool
                    .iter_mut()
                    .find(|slot| slot.as_ref().is_some_and(|target| target.id == id))
                    .and_then(Option::take)
                    .ok_or(NestedError::UnknownId {
                        entity: "plot search target",
                        id: id.0,
                    })?;
                target.apply(input, ids)?;
                merged.push(target);
            }
            None => merged.push(attach_target(input, plan_units, ids)?),
        }
    }

    for dropped in pool.into_iter().flatten() {
        plan_units.remove(dropped.plan_unit);
    }
    Ok(merged)
}

fn attach_target(
    input: TargetInput,
    plan_units: &mut dyn PlanUnitAccess,
    ids: &dyn IdSource,
) -> Result<PlotSearchTarget, PlotSearchError> {
    let master = input.plan_unit_id.ok_or(PlotSearchError::PlanUnitRequired)?;
    let context = plan_units
        .locate(master)
        .ok_or(PlotSearchError::UnknownPlanUnit(master))?;
    if !context.plan_unit.is_master {
        return Err(PlotSearchError::PlanUnitNotMaster(master));
    }
    let duplicate = plan_units.duplicate_master(master, PlanUnitId(ids.next_id()))?;
    Ok(PlotSearchTarget {
        id: PlotSearchTargetId(ids.next_id()),
        plan_unit: duplicate.id,
        master_plan_unit_id: Some(master),
        target_type: input.target_type,
        info_links: create_nested(input.info_links, ids)?,
    })
}

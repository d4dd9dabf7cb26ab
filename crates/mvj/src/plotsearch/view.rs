//! Read shape of plot searches, resolving each target's plan units against the leases.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::UserId;
use crate::forms::FormId;
use crate::leasing::domain::{DecisionId, Lease};
use crate::leasing::land_area::{PlanUnit, PlanUnitId};
use crate::leasing::repository::locate_plan_unit;

use super::domain::{
    InfoLink, PlotSearch, PlotSearchId, PlotSearchStageId, PlotSearchSubtype,
    PlotSearchSubtypeId, PlotSearchTarget, PlotSearchTargetId, PlotSearchTypeId, SearchClass,
    TargetType,
};

pub const MASTER_DELETED_LABEL: &str = "The master plan unit has been deleted";
pub const MASTER_NEWER_LABEL: &str = "The master plan unit has changed after it was copied";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotSearchView {
    pub id: PlotSearchId,
    pub name: String,
    #[serde(rename = "type")]
    pub search_type: Option<PlotSearchTypeId>,
    pub subtype: Option<PlotSearchSubtypeId>,
    pub stage: Option<PlotSearchStageId>,
    pub search_class: Option<SearchClass>,
    pub preparer: Option<UserId>,
    pub begin_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub form: Option<FormId>,
    pub decisions: Vec<DecisionId>,
    pub plot_search_targets: Vec<TargetView>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetView {
    pub id: PlotSearchTargetId,
    pub plan_unit_id: PlanUnitId,
    pub plan_unit: Option<PlanUnit>,
    pub master_plan_unit_id: Option<PlanUnitId>,
    pub target_type: TargetType,
    pub info_links: Vec<InfoLink>,
    pub lease_identifier: Option<String>,
    pub lease_area_identifier: Option<String>,
    pub lease_address: Option<String>,
    pub is_master_plan_unit_deleted: bool,
    pub is_master_plan_unit_newer: bool,
    pub message_label: String,
}

impl TargetView {
    pub fn build(target: &PlotSearchTarget, leases: &[Lease]) -> Self {
        let duplicate = locate_plan_unit(leases, target.plan_unit);
        let master = target
            .master_plan_unit_id
            .and_then(|id| locate_plan_unit(leases, id));

        let deleted = master.is_none();
        let newer = match (&master, &duplicate) {
            (Some(master), Some(duplicate)) => duplicate
                .plan_unit
                .master_timestamp
                .map_or(true, |copied| master.plan_unit.modified_at > copied),
            _ => false,
        };
        let message_label = if deleted {
            MASTER_DELETED_LABEL
        } else if newer {
            MASTER_NEWER_LABEL
        } else {
            ""
        };

        TargetView {
            id: target.id,
            plan_unit_id: target.plan_unit,
            master_plan_unit_id: master.as_ref().map(|context| context.plan_unit.id),
            target_type: target.target_type,
            info_links: target.info_links.clone(),
            lease_identifier: duplicate
                .as_ref()
                .map(|context| context.lease_identifier.to_string()),
            lease_area_identifier: duplicate
                .as_ref()
                .map(|context| context.lease_area_identifier.clone()),
            lease_address: duplicate
                .as_ref()
                .and_then(|context| context.lease_address.clone()),
            plan_unit: duplicate.map(|context| context.plan_unit),
            is_master_plan_unit_deleted: deleted,
            is_master_plan_unit_newer: newer,
            message_label: message_label.to_string(),
        }
    }
}

impl PlotSearchView {
    pub fn build(search: PlotSearch, leases: &[Lease], subtypes: &[PlotSearchSubtype]) -> Self {
        let search_type = search.subtype.and_then(|subtype| {
            subtypes
                .iter()
                .find(|candidate| candidate.id == subtype)
                .map(|candidate| candidate.plot_search_type)
        });
        PlotSearchView {
            id: search.id,
            name: search.name,
            search_type,
            subtype: search.subtype,
            stage: search.stage,
            search_class: search.search_class,
            preparer: search.preparer,
            begin_at: search.begin_at,
            end_at: search.end_at,
            form: search.form,
            decisions: search.decisions,
            plot_search_targets: search
                .plot_search_targets
                .iter()
                .map(|target| TargetView::build(target, leases))
                .collect(),
            created_at: search.created_at,
            modified_at: search.modified_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::leasing::testing::{lease, lease_area, plan_unit};

    fn leases(master: Option<PlanUnit>, duplicate: PlanUnit) -> Vec<Lease> {
        let mut area = lease_area(3, "91-1-1-1", &["Testikatu 1"]);
        area.plan_units.extend(master);
        area.plan_units.push(duplicate);
        let mut record = lease(1, "A1104-12");
        record.lease_areas.push(area);
        vec![record]
    }

    fn target() -> PlotSearchTarget {
        PlotSearchTarget {
            id: PlotSearchTargetId(1),
            plan_unit: PlanUnitId(11),
            master_plan_unit_id: Some(PlanUnitId(10)),
            target_type: TargetType::Searchable,
            info_links: Vec::new(),
        }
    }

    #[test]
    fn fresh_duplicate_carries_lease_context() {
        let master = plan_unit(10, "PU1", true);
        let duplicate = master.duplicate(PlanUnitId(11));
        let view = TargetView::build(&target(), &leases(Some(master), duplicate));

        assert_eq!(view.lease_identifier.as_deref(), Some("A1104-12"));
        assert_eq!(view.lease_area_identifier.as_deref(), Some("91-1-1-1"));
        assert_eq!(view.lease_address.as_deref(), Some("Testikatu 1"));
        assert_eq!(view.master_plan_unit_id, Some(PlanUnitId(10)));
        assert!(!view.is_master_plan_unit_deleted);
        assert!(!view.is_master_plan_unit_newer);
        assert!(view.message_label.is_empty());
    }

    #[test]
    fn deleted_master_is_flagged() {
        let master = plan_unit(10, "PU1", true);
        let duplicate = master.duplicate(PlanUnitId(11));
        let view = TargetView::build(&target(), &leases(None, duplicate));

        assert_eq!(view.master_plan_unit_id, None);
        assert!(view.is_master_plan_unit_deleted);
        assert_eq!(view.message_label, MASTER_DELETED_LABEL);
    }

    #[test]
    fn edited_master_is_newer() {
        let mut master = plan_unit(10, "PU1", true);
        let duplicate = master.duplicate(PlanUnitId(11));
        master.modified_at = master.modified_at + Duration::minutes(5);
        let view = TargetView::build(&target(), &leases(Some(master), duplicate));

        assert!(view.is_master_plan_unit_newer);
        assert_eq!(view.message_label, MASTER_NEWER_LABEL);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::UserId;
use crate::forms::{AnswerId, FormId};
use crate::leasing::domain::DecisionId;
use crate::leasing::land_area::PlanUnitId;
use crate::store::{merge_nested, IdSource, NestedError, NestedRecord};

entity_id!(PlotSearchId);
entity_id!(PlotSearchTargetId);
entity_id!(InfoLinkId);
entity_id!(PlotSearchTypeId);
entity_id!(PlotSearchSubtypeId);
entity_id!(PlotSearchStageId);
entity_id!(AreaSearchId);
entity_id!(AreaSearchIntendedUseId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotSearchType {
    pub id: PlotSearchTypeId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotSearchSubtype {
    pub id: PlotSearchSubtypeId,
    pub name: String,
    pub plot_search_type: PlotSearchTypeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotSearchStage {
    pub id: PlotSearchStageId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchClass {
    PlotSearch,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Searchable,
    Procedure,
    DirectReservation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Fi,
    Sv,
    En,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoLink {
    pub id: InfoLinkId,
    pub url: String,
    pub description: String,
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfoLinkInput {
    #[serde(default)]
    pub id: Option<InfoLinkId>,
    pub url: String,
    #[serde(default)]
    pub description: String,
    pub language: Language,
}

impl NestedRecord for InfoLink {
    type Input = InfoLinkInput;

    fn record_id(&self) -> u64 {
        self.id.0
    }

    fn input_id(input: &InfoLinkInput) -> Option<u64> {
        input.id.map(|id| id.0)
    }

    fn create(id: u64, input: InfoLinkInput, _ids: &dyn IdSource) -> Result<Self, NestedError> {
        Ok(InfoLink {
            id: InfoLinkId(id),
            url: input.url,
            description: input.description,
            language: input.language,
        })
    }

    fn apply(&mut self, input: InfoLinkInput, _ids: &dyn IdSource) -> Result<(), NestedError> {
        self.url = input.url;
        self.description = input.description;
        self.language = input.language;
        Ok(())
    }
}

/// Land offered in a plot search. `plan_unit` is the target's own duplicate of the master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotSearchTarget {
    pub id: PlotSearchTargetId,
    pub plan_unit: PlanUnitId,
    pub master_plan_unit_id: Option<PlanUnitId>,
    pub target_type: TargetType,
    pub info_links: Vec<InfoLink>,
}

impl PlotSearchTarget {
    /// Takes the target type and info links of `input`; the plan unit never changes.
    pub fn apply(&mut self, input: TargetInput, ids: &dyn IdSource) -> Result<(), NestedError> {
        self.target_type = input.target_type;
        self.info_links = merge_nested(
            "info link",
            std::mem::take(&mut self.info_links),
            input.info_links,
            ids,
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TargetInput {
    #[serde(default)]
    pub id: Option<PlotSearchTargetId>,
    /// Master plan unit to duplicate; ignored for existing targets.
    #[serde(default)]
    pub plan_unit_id: Option<PlanUnitId>,
    pub target_type: TargetType,
    #[serde(default)]
    pub info_links: Vec<InfoLinkInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSearch {
    pub id: PlotSearchId,
    pub name: String,
    pub subtype: Option<PlotSearchSubtypeId>,
    pub stage: Option<PlotSearchStageId>,
    pub search_class: Option<SearchClass>,
    pub preparer: Option<UserId>,
    pub begin_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub form: Option<FormId>,
    pub decisions: Vec<DecisionId>,
    pub plot_search_targets: Vec<PlotSearchTarget>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl PlotSearch {
    pub fn new(id: PlotSearchId, name: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            subtype: None,
            stage: None,
            search_class: None,
            preparer: None,
            begin_at: None,
            end_at: None,
            form: None,
            decisions: Vec::new(),
            plot_search_targets: Vec::new(),
            created_at: now,
            modified_at: now,
        }
    }
}

/// Body of plot search creation and the merged body of updates.
#[derive(Debug, Clone, Deserialize)]
pub struct PlotSearchInput {
    pub name: String,
    #[serde(default)]
    pub subtype: Option<PlotSearchSubtypeId>,
    #[serde(default)]
    pub stage: Option<PlotSearchStageId>,
    #[serde(default)]
    pub search_class: Option<SearchClass>,
    #[serde(default)]
    pub preparer: Option<UserId>,
    #[serde(default)]
    pub begin_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub form: Option<FormId>,
    #[serde(default)]
    pub decisions: Vec<DecisionId>,
    #[serde(default)]
    pub plot_search_targets: Vec<TargetInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaSearchIntendedUse {
    pub id: AreaSearchIntendedUseId,
    pub name: String,
}

/// Applicant-drawn area of interest outside any plot search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaSearch {
    pub id: AreaSearchId,
    pub description_area: Option<String>,
    pub description_intended_use: Option<String>,
    pub intended_use: AreaSearchIntendedUseId,
    pub geometry: Value,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub user: UserId,
    pub answer: Option<AnswerId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AreaSearchDraft {
    #[serde(default)]
    pub description_area: Option<String>,
    #[serde(default)]
    pub description_intended_use: Option<String>,
    pub intended_use: AreaSearchIntendedUseId,
    pub geometry: Value,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub answer: Option<AnswerId>,
}

const GEOMETRY_TYPES: &[&str] = &[
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
    "GeometryCollection",
];

/// A GeoJSON geometry object naming one of the geometry types.
pub fn is_geometry(value: &Value) -> bool {
    value
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|kind| GEOMETRY_TYPES.contains(&kind))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::nested::tests::Counter;

    #[test]
    fn geometry_needs_a_known_type() {
        assert!(is_geometry(&json!({
            "type": "MultiPolygon",
            "coordinates": [[[[24.9, 60.1], [24.91, 60.1], [24.91, 60.11], [24.9, 60.1]]]]
        })));
        assert!(!is_geometry(&json!({ "coordinates": [] })));
        assert!(!is_geometry(&json!({ "type": "Feature" })));
        assert!(!is_geometry(&json!("POLYGON((0 0, 1 1, 1 0, 0 0))")));
    }

    #[test]
    fn target_updates_keep_the_plan_unit() {
        let ids = Counter::starting_at(100);
        let mut target = PlotSearchTarget {
            id: PlotSearchTargetId(1),
            plan_unit: PlanUnitId(5),
            master_plan_unit_id: Some(PlanUnitId(4)),
            target_type: TargetType::Searchable,
            info_links: vec![InfoLink {
                id: InfoLinkId(9),
                url: "https://example.org/a".to_string(),
                description: "a".to_string(),
                language: Language::Fi,
            }],
        };
        let input: TargetInput = serde_json::from_value(json!({
            "id": 1,
            "plan_unit_id": 77,
            "target_type": "direct_reservation",
            "info_links": [
                { "url": "https://example.org/b", "language": "sv" }
            ]
        }))
        .expect("target input");

        target.apply(input, &ids).expect("applies");
        assert_eq!(target.plan_unit, PlanUnitId(5));
        assert_eq!(target.target_type, TargetType::DirectReservation);
        assert_eq!(target.info_links.len(), 1);
        assert_eq!(target.info_links[0].language, Language::Sv);
        assert_ne!(target.info_links[0].id, InfoLinkId(9));
    }
}

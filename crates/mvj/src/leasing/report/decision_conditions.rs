use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::leasing::domain::{ConditionTypeId, Lease, LeaseIdentifier};

use super::{InputField, Report, ReportColumn, ReportData};

/// Decision conditions still waiting to be supervised.
pub struct DecisionConditionsReport;

#[derive(Debug, Default, Deserialize)]
pub struct DecisionConditionsInput {
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub condition_type: Option<ConditionTypeId>,
    /// When given, filters on whether a supervision date is set and the date bounds are ignored.
    #[serde(default)]
    pub supervision_exists: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionConditionRow {
    pub lease_id: String,
    pub area: String,
    pub address: String,
    #[serde(rename = "type")]
    pub condition_type: Option<String>,
    pub supervision_date: Option<NaiveDate>,
    pub description: Option<String>,
    #[serde(skip)]
    identifier: LeaseIdentifier,
}

const INPUTS: &[InputField] = &[
    InputField {
        name: "start_date",
        label: "Start date",
        kind: "date",
        required: false,
    },
    InputField {
        name: "end_date",
        label: "End date",
        kind: "date",
        required: false,
    },
    InputField {
        name: "condition_type",
        label: "Condition type",
        kind: "integer",
        required: false,
    },
    InputField {
        name: "supervision_exists",
        label: "Supervision date exists",
        kind: "boolean",
        required: false,
    },
];

const COLUMNS: &[ReportColumn] = &[
    ReportColumn {
        key: "lease_id",
        label: "Lease id",
    },
    ReportColumn {
        key: "area",
        label: "Lease area",
    },
    ReportColumn {
        key: "address",
        label: "Address",
    },
    ReportColumn {
        key: "type",
        label: "Type",
    },
    ReportColumn {
        key: "supervision_date",
        label: "Supervision date",
    },
    ReportColumn {
        key: "description",
        label: "Description",
    },
];

impl DecisionConditionsInput {
    fn accepts(&self, supervision_date: Option<NaiveDate>) -> bool {
        if let Some(exists) = self.supervision_exists {
            return supervision_date.is_some() == exists;
        }
        if self.start_date.is_none() && self.end_date.is_none() {
            return true;
        }
        let Some(date) = supervision_date else {
            return false;
        };
        self.start_date.map_or(true, |start| date >= start)
            && self.end_date.map_or(true, |end| date <= end)
    }
}

fn active_areas(lease: &Lease) -> (String, String) {
    let areas: Vec<_> = lease
        .lease_areas
        .iter()
        .filter(|area| area.archived_at.is_none())
        .collect();
    let identifiers = areas
        .iter()
        .map(|area| area.identifier.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let addresses = areas
        .iter()
        .flat_map(|area| area.addresses.iter())
        .map(|address| address.address.as_str())
        .collect::<Vec<_>>()
        .join(" / ");
    (identifiers, addresses)
}

fn by_supervision_then_lease(a: &DecisionConditionRow, b: &DecisionConditionRow) -> Ordering {
    let dates = match (a.supervision_date, b.supervision_date) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    dates.then_with(|| a.identifier.cmp(&b.identifier))
}

impl Report for DecisionConditionsReport {
    type Input = DecisionConditionsInput;
    type Row = DecisionConditionRow;

    fn slug(&self) -> &'static str {
        "decision_conditions"
    }

    fn name(&self) -> &'static str {
        "Decision conditions"
    }

    fn description(&self) -> &'static str {
        "Unsupervised decision conditions by supervision date"
    }

    fn permission(&self) -> &'static str {
        "lease"
    }

    fn input_fields(&self) -> &'static [InputField] {
        INPUTS
    }

    fn columns(&self) -> &'static [ReportColumn] {
        COLUMNS
    }

    fn rows(&self, data: &ReportData, input: &Self::Input) -> Vec<DecisionConditionRow> {
        let type_names: HashMap<ConditionTypeId, &str> = data
            .condition_types
            .iter()
            .map(|kind| (kind.id, kind.name.as_str()))
            .collect();

        let mut rows = Vec::new();
        for lease in &data.leases {
            let (area, address) = active_areas(lease);
            let conditions = lease
                .decisions
                .iter()
                .flat_map(|decision| decision.conditions.iter())
                .filter(|condition| condition.supervised_date.is_none())
                .filter(|condition| {
                    input
                        .condition_type
                        .map_or(true, |wanted| condition.condition_type == Some(wanted))
                })
                .filter(|condition| input.accepts(condition.supervision_date));
            for condition in conditions {
                rows.push(DecisionConditionRow {
                    lease_id: lease.identifier.to_string(),
                    area: area.clone(),
                    address: address.clone(),
                    condition_type: condition
                        .condition_type
                        .and_then(|id| type_names.get(&id))
                        .map(|name| name.to_string()),
                    supervision_date: condition.supervision_date,
                    description: condition.description.clone(),
                    identifier: lease.identifier.clone(),
                });
            }
        }
        rows.sort_by(by_supervision_then_lease);
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leasing::domain::{
        Condition, ConditionId, ConditionType, Decision, DecisionId, LeaseId,
    };
    use crate::leasing::testing::{lease, lease_area};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn condition(
        id: u64,
        kind: u64,
        supervision: Option<NaiveDate>,
        supervised: Option<NaiveDate>,
    ) -> Condition {
        Condition {
            id: ConditionId(id),
            condition_type: Some(ConditionTypeId(kind)),
            supervision_date: supervision,
            supervised_date: supervised,
            description: Some(format!("condition {id}")),
        }
    }

    fn leased(id: u64, identifier: &str, conditions: Vec<Condition>) -> Lease {
        let mut record = lease(id, identifier);
        let mut archived = lease_area(id * 10 + 1, "old", &["Vanha 1"]);
        archived.archived_at = Some(date(2020, 1, 1));
        record.lease_areas = vec![
            lease_area(id * 10, &format!("{identifier}-area"), &["Katu 1", "Katu 2"]),
            archived,
        ];
        record.decisions = vec![Decision {
            id: DecisionId(id),
            lease: LeaseId(id),
            reference_number: None,
            decision_maker: None,
            decision_date: None,
            section: None,
            decision_type: None,
            description: None,
            conditions,
        }];
        record
    }

    fn data() -> ReportData {
        ReportData {
            leases: vec![
                leased(
                    1,
                    "T1100-3",
                    vec![
                        condition(1, 1, Some(date(2024, 5, 1)), None),
                        condition(2, 2, None, None),
                        condition(3, 1, Some(date(2024, 1, 1)), Some(date(2024, 1, 2))),
                    ],
                ),
                leased(
                    2,
                    "A1104-12",
                    vec![
                        condition(4, 1, Some(date(2024, 5, 1)), None),
                        condition(5, 2, Some(date(2024, 3, 1)), None),
                    ],
                ),
            ],
            invoices: Vec::new(),
            condition_types: vec![
                ConditionType {
                    id: ConditionTypeId(1),
                    name: "Rakentamisvelvoite".to_string(),
                },
                ConditionType {
                    id: ConditionTypeId(2),
                    name: "Muu".to_string(),
                },
            ],
        }
    }

    fn descriptions(rows: &[DecisionConditionRow]) -> Vec<&str> {
        rows.iter()
            .filter_map(|row| row.description.as_deref())
            .collect()
    }

    #[test]
    fn unsupervised_conditions_order_by_date_then_lease() {
        let rows = DecisionConditionsReport.rows(&data(), &DecisionConditionsInput::default());
        assert_eq!(
            descriptions(&rows),
            ["condition 5", "condition 4", "condition 1", "condition 2"]
        );
        assert_eq!(rows[0].area, "A1104-12-area");
        assert_eq!(rows[0].address, "Katu 1 / Katu 2");
        assert_eq!(rows[0].condition_type.as_deref(), Some("Muu"));
    }

    #[test]
    fn filters_by_type_and_date_bounds() {
        let input = DecisionConditionsInput {
            start_date: Some(date(2024, 4, 1)),
            condition_type: Some(ConditionTypeId(1)),
            ..DecisionConditionsInput::default()
        };
        let rows = DecisionConditionsReport.rows(&data(), &input);
        assert_eq!(descriptions(&rows), ["condition 4", "condition 1"]);
    }

    #[test]
    fn supervision_exists_overrides_dates() {
        let input = DecisionConditionsInput {
            start_date: Some(date(2030, 1, 1)),
            supervision_exists: Some(false),
            ..DecisionConditionsInput::default()
        };
        let rows = DecisionConditionsReport.rows(&data(), &input);
        assert_eq!(descriptions(&rows), ["condition 2"]);
    }
}

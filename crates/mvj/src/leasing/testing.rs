//! Lease records for unit tests.

use serde_json::json;

use super::domain::Lease;
use super::land_area::{LeaseArea, PlanUnit};

pub(crate) fn lease(id: u64, identifier: &str) -> Lease {
    serde_json::from_value(json!({
        "id": id,
        "identifier": identifier,
        "is_invoicing_enabled": false,
        "tenants": [],
        "lease_areas": [],
        "decisions": [],
        "rents": [],
        "created_at": "2024-01-01T00:00:00Z",
        "modified_at": "2024-01-01T00:00:00Z",
    }))
    .expect("lease fixture")
}

pub(crate) fn lease_area(id: u64, identifier: &str, addresses: &[&str]) -> LeaseArea {
    let addresses: Vec<_> = addresses
        .iter()
        .enumerate()
        .map(|(index, address)| {
            json!({
                "id": id * 100 + index as u64,
                "address": address,
                "is_primary": index == 0,
            })
        })
        .collect();
    serde_json::from_value(json!({
        "id": id,
        "identifier": identifier,
        "area": 1000,
        "type": "plan_unit",
        "location": "surface",
        "addresses": addresses,
        "plots": [],
        "plan_units": [],
        "constructability_descriptions": [],
    }))
    .expect("lease area fixture")
}

pub(crate) fn plan_unit(id: u64, identifier: &str, is_master: bool) -> PlanUnit {
    serde_json::from_value(json!({
        "id": id,
        "identifier": identifier,
        "area": 500,
        "in_contract": true,
        "is_master": is_master,
        "plan_unit_status": "present",
        "modified_at": "2024-01-01T00:00:00Z",
    }))
    .expect("plan unit fixture")
}

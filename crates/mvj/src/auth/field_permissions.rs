//! Field-level visibility and writability for registered models.
//!
//! A field of a registered model is visible with `{app}.view_{model}_{field}` or
//! `{app}.change_{model}_{field}` and writable only with the `change_` codename.
//! Filtering runs on the JSON representation so every handler shares it.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::Value;

use super::User;

/// `(app, model)` pair naming a registered model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub app: &'static str,
    pub model: &'static str,
}

impl ModelKey {
    pub const fn new(app: &'static str, model: &'static str) -> Self {
        Self { app, model }
    }
}

pub const LEASE_AREA: ModelKey = ModelKey::new("leasing", "leasearea");
pub const LEASE_AREA_ADDRESS: ModelKey = ModelKey::new("leasing", "leaseareaaddress");
pub const PLOT: ModelKey = ModelKey::new("leasing", "plot");
pub const PLAN_UNIT: ModelKey = ModelKey::new("leasing", "planunit");
pub const CONSTRUCTABILITY_DESCRIPTION: ModelKey =
    ModelKey::new("leasing", "constructabilitydescription");
pub const INVOICE: ModelKey = ModelKey::new("leasing", "invoice");
pub const INVOICE_ROW: ModelKey = ModelKey::new("leasing", "invoicerow");
pub const INVOICE_PAYMENT: ModelKey = ModelKey::new("leasing", "invoicepayment");

#[derive(Debug, Clone)]
struct ModelRule {
    fields: &'static [&'static str],
    excluded: &'static [&'static str],
    children: Vec<(&'static str, ModelKey)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

/// Registry of models whose fields are individually permissioned.
#[derive(Debug, Clone)]
pub struct FieldPermissions {
    rules: HashMap<ModelKey, ModelRule>,
}

impl Default for FieldPermissions {
    fn default() -> Self {
        Self::standard()
    }
}

impl FieldPermissions {
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// The leasing models exposed through the lease and invoice endpoints.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(
            LEASE_AREA,
            &[
                "identifier",
                "area",
                "section_area",
                "type",
                "location",
                "preconstruction_state",
                "demolition_state",
                "polluted_land_state",
                "constructability_report_state",
                "other_state",
                "archived_at",
                "addresses",
                "plots",
                "plan_units",
                "constructability_descriptions",
            ],
            &["id", "lease"],
            vec![
                ("addresses", LEASE_AREA_ADDRESS),
                ("plots", PLOT),
                ("plan_units", PLAN_UNIT),
                ("constructability_descriptions", CONSTRUCTABILITY_DESCRIPTION),
            ],
        );
        registry.register(
            LEASE_AREA_ADDRESS,
            &["address", "postal_code", "city", "is_primary"],
            &["id"],
            Vec::new(),
        );
        registry.register(
            PLOT,
            &[
                "identifier",
                "area",
                "section_area",
                "type",
                "registration_date",
                "repeal_date",
                "in_contract",
            ],
            &["id", "lease_area"],
            Vec::new(),
        );
        registry.register(
            PLAN_UNIT,
            &[
                "identifier",
                "area",
                "section_area",
                "in_contract",
                "is_master",
                "master_timestamp",
                "plot_division_identifier",
                "plot_division_date_of_approval",
                "plot_division_effective_date",
                "plot_division_state",
                "detailed_plan_identifier",
                "detailed_plan_latest_processing_date",
                "detailed_plan_latest_processing_date_note",
                "plan_unit_type",
                "plan_unit_state",
                "plan_unit_intended_use",
                "plan_unit_status",
                "modified_at",
            ],
            &["id", "lease", "lease_area"],
            Vec::new(),
        );
        registry.register(
            CONSTRUCTABILITY_DESCRIPTION,
            &[
                "type",
                "user",
                "text",
                "ahjo_reference_number",
                "is_static",
                "modified_at",
            ],
            &["id"],
            Vec::new(),
        );
        registry.register(
            INVOICE,
            &[
                "invoiceset",
                "number",
                "recipient",
                "sent_to_sap_at",
                "sap_id",
                "due_date",
                "adjusted_due_date",
                "invoicing_date",
                "state",
                "billing_period_start_date",
                "billing_period_end_date",
                "postpone_date",
                "total_amount",
                "billed_amount",
                "outstanding_amount",
                "payment_notification_date",
                "collection_charge",
                "payment_notification_catalog_date",
                "delivery_method",
                "type",
                "notes",
                "generated",
                "description",
                "credited_invoice",
                "credit_invoices",
                "rows",
                "payments",
            ],
            &["id", "lease"],
            vec![("rows", INVOICE_ROW), ("payments", INVOICE_PAYMENT)],
        );
        registry.register(
            INVOICE_ROW,
            &[
                "tenant",
                "receivable_type",
                "billing_period_start_date",
                "billing_period_end_date",
                "description",
                "amount",
            ],
            &["id", "invoice"],
            Vec::new(),
        );
        registry.register(
            INVOICE_PAYMENT,
            &["paid_amount", "paid_date", "filing_code"],
            &["id", "invoice"],
            Vec::new(),
        );
        registry
    }

    fn register(
        &mut self,
        key: ModelKey,
        fields: &'static [&'static str],
        excluded: &'static [&'static str],
        children: Vec<(&'static str, ModelKey)>,
    ) {
        self.rules.insert(
            key,
            ModelRule {
                fields,
                excluded,
                children,
            },
        );
    }

    pub fn is_registered(&self, key: ModelKey) -> bool {
        self.rules.contains_key(&key)
    }

    /// Every field codename of every registered model for `action` (`view` or `change`).
    pub fn codenames(&self, action: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .rules
            .iter()
            .flat_map(|(key, rule)| {
                rule.fields
                    .iter()
                    .map(move |field| field_permission(*key, action, field))
            })
            .collect();
        names.sort();
        names
    }

    pub fn can_view(&self, user: Option<&User>, key: ModelKey, field: &str) -> bool {
        self.allowed(user, key, field, Access::Read)
    }

    pub fn can_change(&self, user: Option<&User>, key: ModelKey, field: &str) -> bool {
        self.allowed(user, key, field, Access::Write)
    }

    /// Strips fields the user may not see, descending into registered child models.
    pub fn filter_output(&self, user: Option<&User>, key: ModelKey, value: &mut Value) {
        self.filter(user, key, value, Access::Read);
    }

    /// Drops fields the user may not write so they are ignored on update.
    pub fn filter_input(&self, user: Option<&User>, key: ModelKey, value: &mut Value) {
        self.filter(user, key, value, Access::Write);
    }

    fn allowed(&self, user: Option<&User>, key: ModelKey, field: &str, access: Access) -> bool {
        let Some(rule) = self.rules.get(&key) else {
            return true;
        };
        if rule.excluded.contains(&field) {
            return true;
        }
        let Some(user) = user else {
            return false;
        };
        if user.is_superuser {
            return true;
        }
        let change = field_permission(key, "change", field);
        match access {
            Access::Write => user.has_perm(&change),
            Access::Read => {
                user.has_perm(&change) || user.has_perm(&field_permission(key, "view", field))
            }
        }
    }

    fn filter(&self, user: Option<&User>, key: ModelKey, value: &mut Value, access: Access) {
        match value {
            Value::Array(items) => {
                for item in items {
                    self.filter(user, key, item, access);
                }
            }
            Value::Object(map) => {
                let Some(rule) = self.rules.get(&key) else {
                    return;
                };
                map.retain(|field, _| self.allowed(user, key, field, access));
                for (field, child) in &rule.children {
                    if let Some(nested) = map.get_mut(*field) {
                        self.filter(user, *child, nested, access);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Shared registry of the standard leasing models.
pub fn registry() -> &'static FieldPermissions {
    static REGISTRY: OnceLock<FieldPermissions> = OnceLock::new();
    REGISTRY.get_or_init(FieldPermissions::standard)
}

fn field_permission(key: ModelKey, action: &str, field: &str) -> String {
    format!("{}.{action}_{}_{field}", key.app, key.model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invoice_json() -> Value {
        json!({
            "id": 7,
            "lease": 1,
            "number": 1000001,
            "total_amount": "120.00",
            "notes": "internal",
            "rows": [
                {"id": 1, "invoice": 7, "amount": "120.00", "description": "rent"}
            ],
        })
    }

    #[test]
    fn output_keeps_only_visible_fields() {
        let registry = FieldPermissions::standard();
        let user = User::new(1, "viewer").with_permissions([
            "leasing.view_invoice_number",
            "leasing.change_invoice_rows",
            "leasing.view_invoicerow_amount",
        ]);

        let mut value = invoice_json();
        registry.filter_output(Some(&user), INVOICE, &mut value);

        assert_eq!(
            value,
            json!({
                "id": 7,
                "lease": 1,
                "number": 1000001,
                "rows": [{"id": 1, "invoice": 7, "amount": "120.00"}],
            })
        );
    }

    #[test]
    fn input_ignores_fields_without_change_permission() {
        let registry = FieldPermissions::standard();
        let user = User::new(1, "editor").with_permissions([
            "leasing.view_invoice_notes",
            "leasing.change_invoice_total_amount",
        ]);

        let mut value = invoice_json();
        registry.filter_input(Some(&user), INVOICE, &mut value);

        assert_eq!(
            value,
            json!({"id": 7, "lease": 1, "total_amount": "120.00"})
        );
    }

    #[test]
    fn superusers_and_unregistered_models_are_untouched() {
        let registry = FieldPermissions::standard();
        let admin = User::superuser(1, "admin");
        let mut value = invoice_json();
        registry.filter_output(Some(&admin), INVOICE, &mut value);
        assert_eq!(value, invoice_json());

        let mut other = json!({"anything": true});
        registry.filter_output(None, ModelKey::new("forms", "form"), &mut other);
        assert_eq!(other, json!({"anything": true}));
    }

    #[test]
    fn codenames_cover_every_registered_field() {
        let registry = FieldPermissions::standard();
        let names = registry.codenames("view");
        assert!(names.contains(&"leasing.view_planunit_is_master".to_string()));
        assert!(names.contains(&"leasing.view_invoicepayment_paid_amount".to_string()));
        assert!(!names.contains(&"leasing.view_invoice_id".to_string()));
    }
}

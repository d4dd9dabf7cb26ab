use crate::infra::{parse_date, reference_data};
use axum::http::Uri;
use chrono::{Datelike, Duration, Local, NaiveDate};
use clap::{Args, ValueEnum};
use mvj::auth::{User, UserDirectory, UserId};
use mvj::credit_integration::service::{InquiryOutcome, InquiryRequest};
use mvj::credit_integration::{CreditIntegrationService, MockCreditBureau};
use mvj::error::AppError;
use mvj::http::ApiError;
use mvj::leasing::domain::{ContactInput, DecisionInput, ReceivableTypeId};
use mvj::leasing::invoice::service::PaymentDraft;
use mvj::leasing::invoice::{ChargeRequest, CreditRequest, InvoiceService, InvoiceView};
use mvj::leasing::report::ReportService;
use mvj::leasing::service::LeaseDraft;
use mvj::leasing::{Contact, Lease, LeasingService};
use mvj::money::Money;
use mvj::store::MemoryStore;
use serde_json::json;
use std::sync::Arc;

const DEMO_BUSINESS_ID: &str = "1234567-8";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Reporting date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Credit only this amount of the first invoice instead of crediting it in full.
    #[arg(long, value_parser = parse_money)]
    pub(crate) credit_amount: Option<Money>,
    /// Business id sent to the mock credit bureau.
    #[arg(long, default_value = DEMO_BUSINESS_ID)]
    pub(crate) business_id: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum ReportFormat {
    #[default]
    Csv,
    Json,
}

#[derive(Args, Debug)]
pub(crate) struct ReportArgs {
    /// Report slug, e.g. invoice_payments or decision_conditions
    pub(crate) slug: String,
    /// Report inputs as a query string, e.g. "start_date=2024-01-01&end_date=2024-12-31"
    #[arg(long)]
    pub(crate) query: Option<String>,
    #[arg(long, value_enum, default_value_t = ReportFormat::Csv)]
    pub(crate) format: ReportFormat,
    /// Date the demo data is seeded around (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

fn parse_money(raw: &str) -> Result<Money, String> {
    raw.parse::<Money>()
        .map_err(|err| format!("failed to parse '{raw}' as an amount ({err})"))
}

/// What [`seed_demo`] put in the store.
pub(crate) struct DemoSeed {
    pub(crate) lease: Lease,
    pub(crate) contacts: Vec<Contact>,
    pub(crate) invoices: Vec<InvoiceView>,
}

/// Users for a demo deployment, keyed by their API tokens.
pub(crate) fn demo_users() -> UserDirectory {
    let directory = UserDirectory::new();
    directory.insert(User::superuser(1, "admin"), "demo-admin-token");
    directory.insert(
        User::new(2, "viewer").with_permissions([
            "leasing.view_lease",
            "leasing.view_leasearea",
            "leasing.view_planunit",
            "leasing.view_invoice",
            "leasing.view_invoicepayment",
            "plotsearch.view_plotsearch",
            "plotsearch.view_areasearch",
            "credit_integration.view_creditdecision",
        ]),
        "demo-viewer-token",
    );
    directory
}

/// Seeds two tenants sharing a lease, a decision with conditions, a charge and one payment.
pub(crate) fn seed_demo(store: &Arc<MemoryStore>, today: NaiveDate) -> Result<DemoSeed, AppError> {
    store.seed(reference_data()?)?;
    let leasing = LeasingService::new(store.clone());
    let invoicing = InvoiceService::new(store.clone());

    let contacts = vec![
        leasing.create_contact(serde_json::from_value::<ContactInput>(json!({
            "type": "business",
            "name": "Rakennus Oy",
            "business_id": DEMO_BUSINESS_ID,
            "address": "Mannerheimintie 1",
            "postal_code": "00100",
            "city": "Helsinki",
        }))?)?,
        leasing.create_contact(serde_json::from_value::<ContactInput>(json!({
            "type": "person",
            "first_name": "Maija",
            "last_name": "Meikäläinen",
            "city": "Helsinki",
        }))?)?,
    ];

    let tenants: Vec<_> = contacts
        .iter()
        .map(|contact| {
            json!({
                "share_numerator": 1,
                "share_denominator": 2,
                "contacts": [{ "contact": contact.id, "type": "tenant" }],
            })
        })
        .collect();
    let draft: LeaseDraft = serde_json::from_value(json!({
        "type": "A1",
        "municipality": 1,
        "district": 4,
        "state": "lease",
        "start_date": NaiveDate::from_ymd_opt(today.year() - 5, 1, 1),
        "intended_use": "Asuminen",
        "is_invoicing_enabled": true,
        "tenants": tenants,
        "lease_areas": [{
            "identifier": "91-4-12-3",
            "area": 1200,
            "type": "plan_unit",
            "location": "surface",
            "addresses": [{ "address": "Laivurinkatu 8", "postal_code": "00150", "city": "Helsinki", "is_primary": true }],
            "plan_units": [{
                "identifier": "91-4-12-3-P1",
                "area": 1200,
                "in_contract": true,
                "is_master": true,
                "detailed_plan_identifier": "12345",
            }],
        }],
    }))?;
    let lease = leasing.create_lease(draft, Some(UserId(1)))?;

    leasing.create_decision(serde_json::from_value::<DecisionInput>(json!({
        "lease": lease.id,
        "reference_number": "HEL 2024-000123",
        "decision_maker": 1,
        "decision_date": today - Duration::days(60),
        "section": "12",
        "conditions": [
            { "type": 1, "supervision_date": today + Duration::days(30), "description": "Rakennettava kahden vuoden kuluessa" },
            { "type": 3, "supervision_date": today + Duration::days(120), "supervised_date": today },
        ],
    }))?)?;

    let charge: ChargeRequest = serde_json::from_value(json!({
        "due_date": today + Duration::days(14),
        "billing_period_start_date": NaiveDate::from_ymd_opt(today.year(), 1, 1),
        "billing_period_end_date": NaiveDate::from_ymd_opt(today.year(), 12, 31),
        "rows": [
            { "amount": "1200.00", "receivable_type": 1 },
            { "amount": "150.25", "receivable_type": 2 },
        ],
        "notes": "Demo charge",
    }))?;
    let invoices = invoicing.create_charge(lease.id, &charge)?;

    if let Some(first) = invoices.first() {
        invoicing.add_payment(PaymentDraft {
            invoice: first.invoice.id,
            paid_amount: Money::from_euros(100),
            paid_date: today,
            filing_code: Some("DEMO-1".to_string()),
        })?;
    }

    Ok(DemoSeed {
        lease,
        contacts,
        invoices,
    })
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        today,
        credit_amount,
        business_id,
    } = args;
    let today = today.unwrap_or_else(|| Local::now().date_naive());

    let store = Arc::new(MemoryStore::new());
    let seed = seed_demo(&store, today)?;
    let invoicing = InvoiceService::new(store.clone());

    println!("Land lease demo ({today})");
    println!("\nLease {}", seed.lease.identifier);
    for contact in &seed.contacts {
        println!("  Tenant: {} (1/2)", contact.display_name());
    }

    println!("\nCharge invoices");
    for view in &seed.invoices {
        print_invoice(&invoicing.get(view.invoice.id)?);
    }

    let Some(first) = seed.invoices.first() else {
        println!("\nNo invoices to credit");
        return Ok(());
    };
    let request = CreditRequest {
        amount: credit_amount,
        receivable_type: credit_amount.map(|_| ReceivableTypeId(1)),
        ..CreditRequest::default()
    };
    match invoicing.credit(first.invoice.id, &request) {
        Ok(note) => {
            println!("\nCredit note");
            print_invoice(&note);
            println!("\nCredited invoice after crediting");
            print_invoice(&invoicing.get(first.invoice.id)?);
        }
        Err(err) => println!("\nCredit rejected: {}", err),
    }

    let credit = CreditIntegrationService::new(store.clone(), Arc::new(MockCreditBureau));
    let admin = User::superuser(1, "admin");
    let inquiry = InquiryRequest {
        business_id: Some(business_id.clone()),
        identity_number: None,
    };
    println!("\nCredit decision for {business_id}");
    match credit.send_inquiry(&admin, inquiry).await {
        Ok(InquiryOutcome::Business(decision)) => {
            println!("  Status: {:?}", decision.status);
            for reason in &decision.reasons {
                println!("  Reason {}: {}", reason.reason_code, reason.reason);
            }
            if let Some(customer) = decision.customer {
                println!("  Matched contact {}", customer);
            }
        }
        Ok(InquiryOutcome::Person(decision)) => println!("  Status: {:?}", decision.status),
        Err(err) => println!("  Inquiry failed: {}", err),
    }

    Ok(())
}

pub(crate) fn run_report(args: ReportArgs) -> Result<(), AppError> {
    let ReportArgs {
        slug,
        query,
        format,
        today,
    } = args;
    let today = today.unwrap_or_else(|| Local::now().date_naive());

    let store = Arc::new(MemoryStore::new());
    seed_demo(&store, today)?;
    let reports = ReportService::new(store);

    let uri = report_uri(&slug, query.as_deref())?;
    let output = reports.run(&slug, &uri)?;
    match format {
        ReportFormat::Csv => print!("{}", output.to_csv()?),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
    }
    Ok(())
}

fn report_uri(slug: &str, query: Option<&str>) -> Result<Uri, AppError> {
    let raw = match query.map(str::trim).filter(|query| !query.is_empty()) {
        Some(query) => format!("/api/v1/reports/{slug}/?{}", query.trim_start_matches('?')),
        None => format!("/api/v1/reports/{slug}/"),
    };
    raw.parse::<Uri>()
        .map_err(|err| ApiError::BadRequest(format!("invalid report query: {err}")).into())
}

fn print_invoice(view: &InvoiceView) {
    let invoice = &view.invoice;
    let number = invoice
        .number
        .map_or_else(|| "-".to_string(), |number| number.to_string());
    println!(
        "  #{} {:?} recipient {} billed {} outstanding {} ({:?}, due {})",
        number,
        invoice.invoice_type,
        invoice.recipient,
        invoice.billed_amount,
        invoice.outstanding_amount,
        invoice.state,
        view.adjusted_due_date,
    );
    for note in &view.credit_invoices {
        let number = note
            .number
            .map_or_else(|| "-".to_string(), |number| number.to_string());
        println!("    credited by #{} (due {})", number, note.due_date);
    }
}

//! Plot searches over the HTTP surface: targets duplicating master plan units, attached forms
//! cloned from templates, and area searches.

mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::Router;
use serde_json::{json, Value};

use common::{app, lease, send, store, template_form, ADMIN, CLERK, OUTSIDER};
use mvj::forms::FormService;
use mvj::leasing::domain::DecisionInput;
use mvj::leasing::{leasing_router, Lease, LeasingService};
use mvj::plotsearch::view::{MASTER_DELETED_LABEL, MASTER_NEWER_LABEL};
use mvj::plotsearch::{plot_search_router, PlotSearchService};
use mvj::store::MemoryStore;

struct Fixture {
    store: Arc<MemoryStore>,
    app: Router,
    lease: Lease,
    master: u64,
}

fn fixture() -> Fixture {
    let store = store();
    let lease = lease(&store, json!([]));
    let master = lease.lease_areas[0].plan_units[0].id.0;
    let router = plot_search_router(Arc::new(PlotSearchService::new(store.clone())))
        .merge(leasing_router(Arc::new(LeasingService::new(store.clone()))));
    Fixture {
        app: app(router),
        store,
        lease,
        master,
    }
}

fn search_body(master: u64) -> Value {
    json!({
        "name": "Omakotitontit 2024",
        "subtype": 1,
        "stage": 1,
        "search_class": "plot_search",
        "begin_at": "2024-03-01T08:00:00Z",
        "end_at": "2024-04-01T12:00:00Z",
        "plot_search_targets": [{
            "plan_unit_id": master,
            "target_type": "searchable",
            "info_links": [
                { "url": "https://www.hel.fi/tontit", "description": "Tonttihaku", "language": "fi" }
            ],
        }],
    })
}

async fn create_search(fixture: &Fixture, body: Value) -> Value {
    let response = send(
        &fixture.app,
        Method::POST,
        "/api/v1/plot_searches/",
        Some(ADMIN),
        Some(body),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
    response.json()
}

async fn plan_unit_count(fixture: &Fixture) -> u64 {
    let response = send(
        &fixture.app,
        Method::GET,
        "/api/v1/plan_units/",
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    response.json()["count"].as_u64().expect("count")
}

mod targets {
    use super::*;

    #[tokio::test]
    async fn new_target_duplicates_the_master_plan_unit() {
        let fixture = fixture();
        let created = create_search(&fixture, search_body(fixture.master)).await;

        assert_eq!(created["type"], 1);
        let target = &created["plot_search_targets"][0];
        assert_eq!(target["master_plan_unit_id"], fixture.master);
        assert_ne!(target["plan_unit_id"], fixture.master);
        assert_eq!(target["plan_unit"]["is_master"], false);
        assert_eq!(
            target["lease_identifier"],
            fixture.lease.identifier.to_string()
        );
        assert_eq!(target["lease_address"], "Laivurinkatu 8");
        assert_eq!(target["is_master_plan_unit_deleted"], false);
        assert_eq!(target["is_master_plan_unit_newer"], false);
        assert_eq!(target["message_label"], "");
        assert_eq!(target["info_links"][0]["language"], "fi");
        assert_eq!(plan_unit_count(&fixture).await, 2);
    }

    #[tokio::test]
    async fn detail_and_list_are_visible_to_viewers() {
        let fixture = fixture();
        let created = create_search(&fixture, search_body(fixture.master)).await;
        let id = created["id"].as_u64().expect("id");

        let detail = send(
            &fixture.app,
            Method::GET,
            &format!("/api/v1/plot_searches/{id}/"),
            Some(CLERK),
            None,
        )
        .await;
        assert_eq!(detail.status, StatusCode::OK);
        assert_eq!(detail.json()["name"], "Omakotitontit 2024");

        let list = send(
            &fixture.app,
            Method::GET,
            "/api/v1/plot_searches/",
            Some(CLERK),
            None,
        )
        .await;
        assert_eq!(list.json()["count"], 1);

        let forbidden = send(
            &fixture.app,
            Method::POST,
            "/api/v1/plot_searches/",
            Some(CLERK),
            Some(search_body(fixture.master)),
        )
        .await;
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn replacing_targets_drops_their_duplicates() {
        let fixture = fixture();
        let created = create_search(&fixture, search_body(fixture.master)).await;
        let id = created["id"].as_u64().expect("id");
        let target_id = created["plot_search_targets"][0]["id"].clone();

        let kept = send(
            &fixture.app,
            Method::PATCH,
            &format!("/api/v1/plot_searches/{id}/"),
            Some(ADMIN),
            Some(json!({
                "plot_search_targets": [{ "id": target_id, "target_type": "procedure" }],
            })),
        )
        .await;
        assert_eq!(kept.status, StatusCode::OK, "{}", kept.text);
        let kept = kept.json();
        assert_eq!(kept["plot_search_targets"][0]["target_type"], "procedure");
        assert_eq!(
            kept["plot_search_targets"][0]["plan_unit_id"],
            created["plot_search_targets"][0]["plan_unit_id"]
        );
        assert_eq!(plan_unit_count(&fixture).await, 2);

        let emptied = send(
            &fixture.app,
            Method::PUT,
            &format!("/api/v1/plot_searches/{id}/"),
            Some(ADMIN),
            Some(json!({ "name": "Omakotitontit 2024", "plot_search_targets": [] })),
        )
        .await;
        assert_eq!(emptied.status, StatusCode::OK);
        assert_eq!(emptied.json()["plot_search_targets"], json!([]));
        assert_eq!(plan_unit_count(&fixture).await, 1);
    }

    #[tokio::test]
    async fn info_links_are_added_edited_and_removed() {
        let fixture = fixture();
        let created = create_search(&fixture, search_body(fixture.master)).await;
        let uri = format!("/api/v1/plot_searches/{}/", created["id"]);
        let patch_links = |target: &Value, links: Value| {
            json!({
                "plot_search_targets": [{
                    "id": target["id"],
                    "target_type": target["target_type"],
                    "info_links": links,
                }],
            })
        };

        let current = send(&fixture.app, Method::GET, &uri, Some(ADMIN), None).await.json();
        let target = &current["plot_search_targets"][0];
        let mut links = target["info_links"].as_array().cloned().unwrap_or_default();
        links.push(json!({ "url": "https://www.hel.fi/en/plots", "language": "en" }));
        let added = send(
            &fixture.app,
            Method::PATCH,
            &uri,
            Some(ADMIN),
            Some(patch_links(target, json!(links))),
        )
        .await;
        assert_eq!(added.status, StatusCode::OK, "{}", added.text);
        let added = added.json();
        let links = added["plot_search_targets"][0]["info_links"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        assert_eq!(links.len(), 2);
        assert_eq!(links[1]["language"], "en");

        let edited_id = links[0]["id"].clone();
        let mut edited = links.clone();
        edited[0]["url"] = json!("https://www.hel.fi/tontit/uusi");
        let response = send(
            &fixture.app,
            Method::PATCH,
            &uri,
            Some(ADMIN),
            Some(patch_links(&added["plot_search_targets"][0], json!(edited))),
        )
        .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text);
        let response = response.json();
        let link = &response["plot_search_targets"][0]["info_links"][0];
        assert_eq!(link["id"], edited_id);
        assert_eq!(link["url"], "https://www.hel.fi/tontit/uusi");

        let remaining = vec![edited[1].clone()];
        let response = send(
            &fixture.app,
            Method::PATCH,
            &uri,
            Some(ADMIN),
            Some(patch_links(&response["plot_search_targets"][0], json!(remaining))),
        )
        .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text);
        let ids: Vec<Value> = response.json()["plot_search_targets"][0]["info_links"]
            .as_array()
            .map(|links| links.iter().map(|link| link["id"].clone()).collect())
            .unwrap_or_default();
        assert_eq!(ids, vec![links[1]["id"].clone()]);

        let full = send(&fixture.app, Method::GET, &uri, Some(ADMIN), None).await.json();
        let replaced = send(&fixture.app, Method::PUT, &uri, Some(ADMIN), Some(full.clone())).await;
        assert_eq!(replaced.status, StatusCode::OK, "{}", replaced.text);
        assert_eq!(
            replaced.json()["plot_search_targets"],
            full["plot_search_targets"]
        );
    }

    #[tokio::test]
    async fn targets_need_an_existing_master() {
        let fixture = fixture();
        let created = create_search(&fixture, search_body(fixture.master)).await;
        let duplicate = created["plot_search_targets"][0]["plan_unit_id"]
            .as_u64()
            .expect("duplicate id");

        for plan_unit_id in [Some(duplicate), Some(999_999), None] {
            let response = send(
                &fixture.app,
                Method::POST,
                "/api/v1/plot_searches/",
                Some(ADMIN),
                Some(json!({
                    "name": "Hylätty",
                    "plot_search_targets": [{ "plan_unit_id": plan_unit_id, "target_type": "searchable" }],
                })),
            )
            .await;
            assert_eq!(response.status, StatusCode::BAD_REQUEST, "{:?}", plan_unit_id);
        }
        assert_eq!(plan_unit_count(&fixture).await, 2);
    }

    #[tokio::test]
    async fn changed_master_is_flagged_newer() {
        let fixture = fixture();
        let created = create_search(&fixture, search_body(fixture.master)).await;
        let id = created["id"].as_u64().expect("id");

        let patched = send(
            &fixture.app,
            Method::PATCH,
            &format!("/api/v1/plan_units/{}/", fixture.master),
            Some(ADMIN),
            Some(json!({ "area": 1300 })),
        )
        .await;
        assert_eq!(patched.status, StatusCode::OK, "{}", patched.text);

        let detail = send(
            &fixture.app,
            Method::GET,
            &format!("/api/v1/plot_searches/{id}/"),
            Some(ADMIN),
            None,
        )
        .await
        .json();
        let target = &detail["plot_search_targets"][0];
        assert_eq!(target["is_master_plan_unit_newer"], true);
        assert_eq!(target["message_label"], MASTER_NEWER_LABEL);
        assert_eq!(target["plan_unit"]["area"], 1200);
    }

    #[tokio::test]
    async fn deleted_master_is_flagged_and_duplicate_protected() {
        let fixture = fixture();
        let created = create_search(&fixture, search_body(fixture.master)).await;
        let id = created["id"].as_u64().expect("id");
        let duplicate = created["plot_search_targets"][0]["plan_unit_id"]
            .as_u64()
            .expect("duplicate id");

        let protected = send(
            &fixture.app,
            Method::DELETE,
            &format!("/api/v1/plan_units/{duplicate}/"),
            Some(ADMIN),
            None,
        )
        .await;
        assert_eq!(protected.status, StatusCode::CONFLICT);

        let deleted = send(
            &fixture.app,
            Method::DELETE,
            &format!("/api/v1/plan_units/{}/", fixture.master),
            Some(ADMIN),
            None,
        )
        .await;
        assert_eq!(deleted.status, StatusCode::NO_CONTENT);

        let detail = send(
            &fixture.app,
            Method::GET,
            &format!("/api/v1/plot_searches/{id}/"),
            Some(ADMIN),
            None,
        )
        .await
        .json();
        let target = &detail["plot_search_targets"][0];
        assert_eq!(target["is_master_plan_unit_deleted"], true);
        assert_eq!(target["master_plan_unit_id"], Value::Null);
        assert_eq!(target["message_label"], MASTER_DELETED_LABEL);
    }
}

mod forms_and_decisions {
    use super::*;

    #[tokio::test]
    async fn attaching_a_template_clones_it() {
        let fixture = fixture();
        let template = template_form(&fixture.store);
        let forms = FormService::new(fixture.store.clone());

        let mut body = search_body(fixture.master);
        body["form"] = json!(template.id);
        let created = create_search(&fixture, body).await;
        let attached = created["form"].as_u64().expect("form id");
        assert_ne!(attached, template.id.0);
        assert_eq!(forms.forms(None).expect("forms").len(), 2);
        assert_eq!(forms.forms(Some(true)).expect("templates").len(), 1);

        // attaching the template again replaces the previous clone
        let id = created["id"].as_u64().expect("id");
        let updated = send(
            &fixture.app,
            Method::PATCH,
            &format!("/api/v1/plot_searches/{id}/"),
            Some(ADMIN),
            Some(json!({ "form": template.id })),
        )
        .await
        .json();
        assert_ne!(updated["form"].as_u64(), Some(attached));
        assert_eq!(forms.forms(None).expect("forms").len(), 2);
    }

    #[tokio::test]
    async fn failed_write_discards_the_fresh_clone() {
        let fixture = fixture();
        let template = template_form(&fixture.store);
        let forms = FormService::new(fixture.store.clone());

        let response = send(
            &fixture.app,
            Method::POST,
            "/api/v1/plot_searches/",
            Some(ADMIN),
            Some(json!({
                "name": "Virheellinen",
                "form": template.id,
                "plot_search_targets": [{ "target_type": "searchable" }],
            })),
        )
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(forms.forms(None).expect("forms").len(), 1);
    }

    #[tokio::test]
    async fn decisions_must_exist() {
        let fixture = fixture();
        let decision = LeasingService::new(fixture.store.clone())
            .create_decision(
                serde_json::from_value::<DecisionInput>(json!({
                    "lease": fixture.lease.id,
                    "reference_number": "HEL 2024-1",
                }))
                .expect("decision input"),
            )
            .expect("decision created");

        let mut body = search_body(fixture.master);
        body["decisions"] = json!([decision.id]);
        let created = create_search(&fixture, body).await;
        assert_eq!(created["decisions"], json!([decision.id]));

        let mut unknown = search_body(fixture.master);
        unknown["decisions"] = json!([424_242]);
        let response = send(
            &fixture.app,
            Method::POST,
            "/api/v1/plot_searches/",
            Some(ADMIN),
            Some(unknown),
        )
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deleting_a_search_releases_the_lease() {
        let fixture = fixture();
        let created = create_search(&fixture, search_body(fixture.master)).await;
        let id = created["id"].as_u64().expect("id");

        let lease_uri = format!("/api/v1/leases/{}/", fixture.lease.id);
        let blocked = send(&fixture.app, Method::DELETE, &lease_uri, Some(ADMIN), None).await;
        assert_eq!(blocked.status, StatusCode::CONFLICT);

        let removed = send(
            &fixture.app,
            Method::DELETE,
            &format!("/api/v1/plot_searches/{id}/"),
            Some(ADMIN),
            None,
        )
        .await;
        assert_eq!(removed.status, StatusCode::NO_CONTENT);
        assert_eq!(plan_unit_count(&fixture).await, 1);

        let released = send(&fixture.app, Method::DELETE, &lease_uri, Some(ADMIN), None).await;
        assert_eq!(released.status, StatusCode::NO_CONTENT);
    }
}

mod area_searches {
    use super::*;

    fn polygon() -> Value {
        json!({
            "type": "MultiPolygon",
            "coordinates": [[[
                [24.94, 60.17], [24.95, 60.17], [24.95, 60.18], [24.94, 60.17]
            ]]],
        })
    }

    #[tokio::test]
    async fn any_user_can_file_an_area_search() {
        let fixture = fixture();
        let created = send(
            &fixture.app,
            Method::POST,
            "/api/v1/area_searches/",
            Some(ADMIN),
            Some(json!({
                "description_area": "Satama-alue",
                "intended_use": 1,
                "geometry": polygon(),
                "start_date": "2024-05-01T00:00:00Z",
            })),
        )
        .await;
        assert_eq!(created.status, StatusCode::CREATED, "{}", created.text);
        let body = created.json();
        assert_eq!(body["user"], 1);
        assert_eq!(body["geometry"]["type"], "MultiPolygon");

        let anonymous = send(
            &fixture.app,
            Method::POST,
            "/api/v1/area_searches/",
            None,
            Some(json!({ "intended_use": 1, "geometry": polygon() })),
        )
        .await;
        assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

        let outsider = send(
            &fixture.app,
            Method::GET,
            "/api/v1/area_searches/",
            Some(OUTSIDER),
            None,
        )
        .await;
        assert_eq!(outsider.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn invalid_geometry_and_use_are_rejected() {
        let fixture = fixture();
        for body in [
            json!({ "intended_use": 1, "geometry": { "type": "Circle", "coordinates": [] } }),
            json!({ "intended_use": 9, "geometry": polygon() }),
        ] {
            let response = send(
                &fixture.app,
                Method::POST,
                "/api/v1/area_searches/",
                Some(ADMIN),
                Some(body),
            )
            .await;
            assert_eq!(response.status, StatusCode::BAD_REQUEST);
        }
    }
}

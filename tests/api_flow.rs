mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, Path, Query, RawQuery};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use floodguard_client::{
    CredentialStore, DEFAULT_NEARBY_RADIUS, DataKind, Error, LocationSelection, LocationSource,
    MemoryCredentialStore, PollData, ReportDraft, ReportId, ReportImage, ReportStatus,
    SessionStatus, Severity,
};
use parking_lot::Mutex;
use serde_json::json;

use common::{Recorder, client, client_with_timeout, page_json, report_json, serve, user_token};

type Fields = Arc<Mutex<Vec<(String, String)>>>;

fn backend(recorder: &Recorder, fields: &Fields) -> Router {
    let weather_rec = recorder.clone();
    let nearby_rec = recorder.clone();
    let submit_rec = recorder.clone();
    let approve_rec = recorder.clone();
    let reject_rec = recorder.clone();
    let risk_rec = recorder.clone();
    let feed_rec = recorder.clone();
    let mine_rec = recorder.clone();
    let admin_rec = recorder.clone();
    let fields = fields.clone();

    Router::new()
        .route(
            "/weather/current",
            get(move |headers: HeaderMap, Query(q): Query<HashMap<String, f64>>| {
                let rec = weather_rec.clone();
                async move {
                    rec.record("/weather/current", &headers);
                    Json(json!({
                        "latitude": q["latitude"],
                        "longitude": q["longitude"],
                        "temperature": 29.5,
                        "humidity": 88,
                        "precipitation": 12.0,
                    }))
                }
            }),
        )
        .route(
            "/weather/flood-risk",
            get(move |headers: HeaderMap| {
                let rec = risk_rec.clone();
                async move {
                    rec.record("/weather/flood-risk", &headers);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "message": "Weather provider unavailable" })),
                    )
                }
            }),
        )
        .route(
            "/reports/nearby",
            get(move |headers: HeaderMap, RawQuery(query): RawQuery| {
                let rec = nearby_rec.clone();
                async move {
                    rec.record_query("/reports/nearby", &headers, query);
                    Json(json!([
                        report_json(1, "LOW", "VERIFIED"),
                        report_json(2, "HIGH", "PENDING"),
                        report_json(3, "EXTREME", "VERIFIED"),
                        report_json(4, "MEDIUM", "PENDING"),
                    ]))
                }
            }),
        )
        .route(
            "/reports",
            post(move |headers: HeaderMap, mut multipart: Multipart| {
                let rec = submit_rec.clone();
                let fields = fields.clone();
                async move {
                    rec.record("/reports", &headers);
                    while let Some(field) = multipart.next_field().await.unwrap() {
                        let name = field.name().unwrap_or_default().to_owned();
                        let value = if name == "image" {
                            format!("{} bytes", field.bytes().await.unwrap().len())
                        } else {
                            field.text().await.unwrap()
                        };
                        fields.lock().push((name, value));
                    }
                    (StatusCode::CREATED, Json(report_json(7, "HIGH", "PENDING")))
                }
            })
            .get(move |headers: HeaderMap, RawQuery(query): RawQuery| {
                let rec = feed_rec.clone();
                async move {
                    rec.record_query("/reports", &headers, query);
                    Json(page_json(vec![
                        report_json(11, "MEDIUM", "VERIFIED"),
                        report_json(12, "LOW", "VERIFIED"),
                    ]))
                }
            }),
        )
        .route(
            "/reports/my",
            get(move |headers: HeaderMap, RawQuery(query): RawQuery| {
                let rec = mine_rec.clone();
                async move {
                    rec.record_query("/reports/my", &headers, query);
                    Json(page_json(vec![report_json(5, "HIGH", "PENDING")]))
                }
            }),
        )
        .route(
            "/admin/reports",
            get(move |headers: HeaderMap| {
                let rec = admin_rec.clone();
                async move {
                    rec.record("/admin/reports", &headers);
                    (StatusCode::BAD_GATEWAY, "upstream exploded")
                }
            }),
        )
        .route(
            "/admin/reports/{id}/approve",
            post(move |headers: HeaderMap, Path(id): Path<i64>| {
                let rec = approve_rec.clone();
                async move {
                    rec.record(&format!("/admin/reports/{id}/approve"), &headers);
                    Json(report_json(id, "HIGH", "VERIFIED"))
                }
            }),
        )
        .route(
            "/admin/reports/{id}/reject",
            post(move |headers: HeaderMap, Path(id): Path<i64>| {
                let rec = reject_rec.clone();
                async move {
                    rec.record(&format!("/admin/reports/{id}/reject"), &headers);
                    Json(report_json(id, "LOW", "REJECTED"))
                }
            }),
        )
}

async fn signed_in(role: &str) -> (floodguard_client::FloodGuard, Recorder, Fields) {
    let recorder = Recorder::default();
    let fields = Fields::default();
    let base = serve(backend(&recorder, &fields)).await;
    let store = Arc::new(MemoryCredentialStore::with_token(user_token("alice", role)));
    let client = client(base, store);
    client.session().initialize();
    (client, recorder, fields)
}

#[tokio::test]
async fn out_of_range_location_never_reaches_the_network() {
    let (client, recorder, _) = signed_in("USER").await;

    let err = LocationSelection::new(200.0, 0.0, LocationSource::Map).unwrap_err();
    assert!(matches!(err, Error::InvalidLocation { .. }));
    assert!(client.location().select_on_map(200.0, 0.0).is_err());
    assert!(client.location().current().is_none());

    let draft = ReportDraft::new("Flooded road", "Water is rising quickly near the bridge")
        .with_position(200.0, 0.0);
    match client.api().submit_report(draft).await.unwrap_err() {
        Error::Validation(errors) => {
            assert_eq!(errors.get("latitude"), Some("Invalid latitude value"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert!(recorder.is_empty());
}

#[tokio::test]
async fn poller_follows_the_selected_location() {
    let (client, recorder, _) = signed_in("USER").await;
    let (mut poller, mut updates) = client.poller();
    poller.watch(DataKind::Weather);
    poller.watch(DataKind::Alerts);
    let task = poller.follow(client.location().subscribe());

    client.location().select_on_map(13.75, 100.5).unwrap();

    let mut weather = None;
    let mut alerts = None;
    while weather.is_none() || alerts.is_none() {
        let update = tokio::time::timeout(Duration::from_secs(5), updates.recv())
            .await
            .expect("no poll update")
            .expect("poller closed");
        assert_eq!(update.location.latitude(), 13.75);
        match update.result.unwrap() {
            PollData::Weather(w) => weather = Some(w),
            PollData::Alerts(a) => alerts = Some(a),
            other => panic!("unexpected {other:?}"),
        }
    }

    let weather = weather.unwrap();
    assert_eq!(weather.latitude, 13.75);
    assert_eq!(weather.humidity, Some(88));

    let severities: Vec<Severity> = alerts.unwrap().iter().map(|r| r.severity).collect();
    assert_eq!(severities, vec![Severity::High, Severity::Extreme]);

    assert!(recorder.authorization("/weather/current").is_some());
    task.abort();
}

#[tokio::test]
async fn server_message_is_surfaced_and_session_kept() {
    let (client, _, _) = signed_in("USER").await;
    let location = LocationSelection::new(13.75, 100.5, LocationSource::Device).unwrap();

    let err = client.api().flood_risk(&location).await.unwrap_err();
    assert!(
        matches!(&err, Error::Server { status: 500, message } if message == "Weather provider unavailable"),
        "{err:?}"
    );
    assert_eq!(err.to_string(), "Weather provider unavailable");

    let err = client.api().admin_reports(0, 20).await.unwrap_err();
    assert!(
        matches!(&err, Error::Server { status: 502, message } if message == "An unexpected error occurred"),
        "{err:?}"
    );
    assert_eq!(client.session().status(), SessionStatus::Authenticated);
}

#[tokio::test]
async fn failed_poll_is_delivered_and_other_kinds_continue() {
    let (client, _, _) = signed_in("USER").await;
    let (mut poller, mut updates) = client.poller();
    poller.watch(DataKind::FloodRisk);
    poller.watch(DataKind::Weather);
    poller.set_location(LocationSelection::new(14.0, 100.0, LocationSource::Search).unwrap());

    let mut kinds = Vec::new();
    for _ in 0..2 {
        let update = tokio::time::timeout(Duration::from_secs(5), updates.recv())
            .await
            .unwrap()
            .unwrap();
        match update.kind {
            DataKind::FloodRisk => assert!(update.result.is_err()),
            DataKind::Weather => assert!(update.result.is_ok()),
            other => panic!("unexpected kind {other:?}"),
        }
        kinds.push(update.kind);
    }
    assert!(kinds.contains(&DataKind::FloodRisk));
    assert!(kinds.contains(&DataKind::Weather));
    assert!(poller.is_watching(DataKind::FloodRisk));
    poller.teardown();
}

#[tokio::test]
async fn submit_report_sends_multipart_form() {
    let (client, recorder, fields) = signed_in("USER").await;
    let draft = ReportDraft::new("Flooded underpass", "Cars are stuck, water is waist deep")
        .with_position(13.7, 100.4)
        .with_severity(Severity::High)
        .with_image(ReportImage {
            file_name: "flood.jpg".into(),
            content_type: Some("image/jpeg".into()),
            bytes: vec![0xFF; 1024],
        });

    let report = client.api().submit_report(draft).await.unwrap();
    assert_eq!(report.id, ReportId(7));
    assert_eq!(report.status, ReportStatus::Pending);
    assert!(recorder.authorization("/reports").is_some());

    let fields: HashMap<String, String> = fields.lock().iter().cloned().collect();
    assert_eq!(fields["title"], "Flooded underpass");
    assert_eq!(fields["severity"], "HIGH");
    assert_eq!(fields["latitude"], "13.7");
    assert_eq!(fields["image"], "1024 bytes");
}

#[tokio::test]
async fn admin_can_approve_reports() {
    let (client, recorder, _) = signed_in("ADMIN").await;
    assert!(client.session().is_admin());

    let report = client.api().approve_report(ReportId(42)).await.unwrap();
    assert_eq!(report.id, ReportId(42));
    assert_eq!(report.status, ReportStatus::Verified);
    assert_eq!(recorder.paths(), vec!["/admin/reports/42/approve".to_owned()]);
}

#[tokio::test]
async fn admin_can_reject_reports() {
    let (client, recorder, _) = signed_in("ADMIN").await;

    let report = client.api().reject_report(ReportId(9)).await.unwrap();
    assert_eq!(report.id, ReportId(9));
    assert_eq!(report.status, ReportStatus::Rejected);
    assert_eq!(recorder.paths(), vec!["/admin/reports/9/reject".to_owned()]);
    assert!(recorder.authorization("/admin/reports/9/reject").is_some());
}

#[tokio::test]
async fn my_reports_are_paged_and_authenticated() {
    let (client, recorder, _) = signed_in("USER").await;

    let page = client.api().my_reports(2, 5).await.unwrap();
    assert_eq!(page.content.len(), 1);
    assert_eq!(page.content[0].id, ReportId(5));

    let query = recorder.query("/reports/my");
    assert_eq!(query["page"], "2");
    assert_eq!(query["size"], "5");
    assert_eq!(
        recorder.authorization("/reports/my"),
        Some(format!("Bearer {}", user_token("alice", "USER")))
    );
}

#[tokio::test]
async fn nearby_reports_send_the_search_radius() {
    let (client, recorder, _) = signed_in("USER").await;

    let reports = client
        .api()
        .nearby_reports(13.75, 100.5, Some(1200.0))
        .await
        .unwrap();
    assert_eq!(reports.len(), 4);
    let query = recorder.query("/reports/nearby");
    assert_eq!(query["latitude"].parse::<f64>().unwrap(), 13.75);
    assert_eq!(query["longitude"].parse::<f64>().unwrap(), 100.5);
    assert_eq!(query["radius"].parse::<f64>().unwrap(), 1200.0);

    client.api().nearby_reports(13.75, 100.5, None).await.unwrap();
    let query = recorder.query("/reports/nearby");
    assert_eq!(query["radius"].parse::<f64>().unwrap(), DEFAULT_NEARBY_RADIUS);
}

#[tokio::test]
async fn reports_feed_polls_the_first_page() {
    let (client, recorder, _) = signed_in("USER").await;
    let (mut poller, mut updates) = client.poller();
    poller.watch(DataKind::ReportsFeed);
    poller.set_location(LocationSelection::new(13.75, 100.5, LocationSource::Map).unwrap());

    let update = tokio::time::timeout(Duration::from_secs(5), updates.recv())
        .await
        .expect("no poll update")
        .expect("poller closed");
    assert_eq!(update.kind, DataKind::ReportsFeed);
    match update.result.unwrap() {
        PollData::ReportsFeed(page) => {
            let ids: Vec<ReportId> = page.content.iter().map(|r| r.id).collect();
            assert_eq!(ids, vec![ReportId(11), ReportId(12)]);
        }
        other => panic!("unexpected {other:?}"),
    }

    let query = recorder.query("/reports");
    assert_eq!(query["page"], "0");
    assert_eq!(query["size"], "10");
    poller.teardown();
}

#[tokio::test]
async fn timed_out_request_is_an_http_error_and_keeps_the_session() {
    let slow = Router::new().route(
        "/reports",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(page_json(vec![]))
        }),
    );
    let base = serve(slow).await;
    let token = user_token("alice", "USER");
    let store = Arc::new(MemoryCredentialStore::with_token(token.clone()));
    let client = client_with_timeout(base, store.clone(), Duration::from_millis(200));
    client.session().initialize();

    let err = client.api().reports(0, 10).await.unwrap_err();
    match &err {
        Error::Http(e) => assert!(e.is_timeout(), "{e:?}"),
        other => panic!("expected HTTP error, got {other:?}"),
    }
    assert!(!err.is_authorization());
    assert_eq!(client.session().status(), SessionStatus::Authenticated);
    assert_eq!(store.read().as_deref(), Some(token.as_str()));
}

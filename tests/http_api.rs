//! End-to-end tests against the real HTTP service on a local port.

use fake::faker::address::en::CityName;
use fake::faker::company::en::CompanyName;
use fake::Fake;
use serde_json::{json, Value};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vendstock::{MemoryStore, Router, VendstockService};

static UNIQUE: AtomicUsize = AtomicUsize::new(0);

fn unique_name() -> String {
    let company: String = CompanyName().fake();
    format!("{company} #{}", UNIQUE.fetch_add(1, Ordering::Relaxed))
}

/// Start a server backed by a fresh in-memory store; returns its base URL.
fn start_server() -> String {
    let port = TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .expect("free port")
        .port();
    let address = format!("127.0.0.1:{port}");

    let service = VendstockService::new(Router::new(Arc::new(MemoryStore::new())));
    let _server = may_minihttp::HttpServer(service)
        .start(&address)
        .expect("server start");

    for _ in 0..100 {
        if TcpStream::connect(&address).is_ok() {
            return format!("http://{address}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("server on {address} never accepted connections");
}

fn send(method: &str, url: &str, body: Option<Value>) -> (u16, Value) {
    let request = ureq::request(method, url).set("Content-Type", "application/json");
    let result = match body {
        Some(body) => request.send_string(&body.to_string()),
        None => request.call(),
    };
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(e) => panic!("{method} {url}: {e}"),
    };
    let status = response.status();
    let text = response.into_string().expect("body");
    let value = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).expect("JSON body")
    };
    (status, value)
}

#[test]
fn vending_machine_lifecycle() {
    let base = start_server();
    let name = unique_name();
    let location: String = CityName().fake();

    let (status, created) = send(
        "POST",
        &format!("{base}/vending-machine/"),
        Some(json!({ "name": name, "location": location, "is_active": true })),
    );
    assert_eq!(status, 201);
    let id = created["id"].as_i64().expect("id");
    assert_eq!(
        created,
        json!({ "id": id, "name": name, "location": location, "is_active": true })
    );

    let item = format!("{base}/vending-machine/{id}/");
    let (status, fetched) = send("GET", &item, None);
    assert_eq!(status, 200);
    assert_eq!(fetched, created);

    let (status, updated) = send(
        "PUT",
        &item,
        Some(json!({ "name": name, "location": "Basement", "is_active": "off" })),
    );
    assert_eq!(status, 200);
    assert_eq!(updated["location"], "Basement");
    assert_eq!(updated["is_active"], false);

    let (status, listed) = send("GET", &format!("{base}/vending-machine"), None);
    assert_eq!(status, 200);
    assert_eq!(listed, json!([updated]));

    let (status, body) = send("DELETE", &item, None);
    assert_eq!(status, 204);
    assert_eq!(body, Value::Null);

    let (status, body) = send("GET", &item, None);
    assert_eq!(status, 404);
    assert_eq!(body, json!({ "detail": "Not found." }));
}

#[test]
fn is_active_defaults_to_true() {
    let base = start_server();
    let (status, created) = send(
        "POST",
        &format!("{base}/vending-machine/"),
        Some(json!({ "name": unique_name(), "location": "Lobby" })),
    );
    assert_eq!(status, 201);
    assert_eq!(created["is_active"], true);
}

#[test]
fn duplicate_names_are_rejected() {
    let base = start_server();
    let name = unique_name();
    let url = format!("{base}/product/");

    let (status, _) = send("POST", &url, Some(json!({ "name": name, "cost": "2.50" })));
    assert_eq!(status, 201);

    let (status, body) = send("POST", &url, Some(json!({ "name": name, "cost": "3.00" })));
    assert_eq!(status, 400);
    assert_eq!(body, json!({ "name": ["product with this name already exists."] }));
}

#[test]
fn duplicate_name_is_reported_with_other_field_errors() {
    let base = start_server();
    let name = unique_name();
    let url = format!("{base}/product/");

    let (status, _) = send("POST", &url, Some(json!({ "name": name, "cost": "2.50" })));
    assert_eq!(status, 201);

    let (status, body) = send("POST", &url, Some(json!({ "name": name, "cost": "-1" })));
    assert_eq!(status, 400);
    assert_eq!(
        body,
        json!({
            "cost": ["Ensure this value is greater than or equal to 0."],
            "name": ["product with this name already exists."]
        })
    );
}

#[test]
fn product_validation_messages() {
    let base = start_server();
    let url = format!("{base}/product/");

    let (status, body) = send(
        "POST",
        &url,
        Some(json!({ "name": "x".repeat(101), "cost": "1.505" })),
    );
    assert_eq!(status, 400);
    assert_eq!(
        body,
        json!({
            "name": ["Ensure this field has no more than 100 characters."],
            "cost": ["Ensure that there are no more than 2 decimal places."]
        })
    );
}

#[test]
fn unknown_product_update_is_not_found() {
    let base = start_server();
    let (status, body) = send(
        "PUT",
        &format!("{base}/product/4242/"),
        Some(json!({ "name": "Gum", "cost": "0.50" })),
    );
    assert_eq!(status, 404);
    assert_eq!(body, json!({ "detail": "Not found." }));
}

#[test]
fn stock_round_trip_over_http() {
    let base = start_server();
    let (_, machine) = send(
        "POST",
        &format!("{base}/vending-machine/"),
        Some(json!({ "name": unique_name(), "location": "Gym" })),
    );
    let (_, product) = send(
        "POST",
        &format!("{base}/product/"),
        Some(json!({ "name": unique_name(), "cost": 1.5 })),
    );
    assert_eq!(product["cost"], "1.50");

    let (status, stock) = send(
        "POST",
        &format!("{base}/stock/"),
        Some(json!({
            "vending_machine": machine["id"].to_string(),
            "product": product["id"],
            "quantity": "8"
        })),
    );
    assert_eq!(status, 201);
    assert_eq!(stock["vending_machine"], machine["id"]);
    assert_eq!(stock["quantity"], 8);

    let (status, fetched) = send("GET", &format!("{base}/stock/{}/", stock["id"]), None);
    assert_eq!(status, 200);
    assert_eq!(fetched, stock);

    let (status, timeline) = send("GET", &format!("{base}/stock-timeline/"), None);
    assert_eq!(status, 200);
    assert_eq!(timeline.as_array().map(Vec::len), Some(1));
    assert_eq!(timeline[0]["quantity"], 8);
}

#[test]
fn wrong_reference_type_is_reported() {
    let base = start_server();
    let (status, body) = send(
        "POST",
        &format!("{base}/stock/"),
        Some(json!({ "vending_machine": true, "product": [1], "quantity": 1 })),
    );
    assert_eq!(status, 400);
    assert_eq!(
        body,
        json!({
            "vending_machine": ["Incorrect type. Expected pk value, received bool."],
            "product": ["Incorrect type. Expected pk value, received list."]
        })
    );
}

#[test]
fn health_and_metrics_endpoints() {
    let base = start_server();
    let (status, body) = send("GET", &format!("{base}/health"), None);
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "status": "ok" }));

    #[cfg(feature = "metrics")]
    {
        let text = ureq::get(&format!("{base}/metrics"))
            .call()
            .expect("metrics")
            .into_string()
            .expect("text");
        assert!(text.contains("vendstock_requests"), "{text}");
    }
}

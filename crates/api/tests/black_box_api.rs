use std::collections::HashSet;
use std::str::FromStr;

use compta_api::app::{AppServices, build_app};
use compta_core::TenantId;
use compta_infra::ComptaConfig;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::{Value, json};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(ComptaConfig::default()).await
    }

    async fn spawn_with(config: ComptaConfig) -> Self {
        // Same router as prod, in-memory store, ephemeral port.
        let app = build_app(AppServices::in_memory(&config));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn decimal(v: &Value) -> Decimal {
    match v {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).unwrap(),
        other => panic!("not a decimal: {other}"),
    }
}

fn invoice_body() -> Value {
    json!({
        "client_id": compta_core::ClientId::new().to_string(),
        "document_type": "FACTURE",
        "lines": [
            { "description": "Tenue de comptabilité", "amount": 100 },
            { "description": "Déclaration TVA", "quantity": 2, "unit_price": 25 }
        ],
        "discount": 50
    })
}

async fn create(client: &reqwest::Client, server: &TestServer, tenant: TenantId, body: &Value) -> reqwest::Response {
    client
        .post(server.url("/documents"))
        .header("x-tenant-id", tenant.to_string())
        .json(body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_needs_no_tenant() {
    let server = TestServer::spawn().await;
    let res = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn tenant_header_is_required_and_validated() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/documents")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "missing_tenant");

    let res = client
        .get(server.url("/documents"))
        .header("x-tenant-id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn breakdown_applies_discount_and_default_vat() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(server.url("/breakdown"))
        .header("x-tenant-id", TenantId::new().to_string())
        .json(&json!({ "subtotal": 150, "discount": 50 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    assert_eq!(decimal(&body["net_amount"]), Decimal::from(100));
    assert_eq!(decimal(&body["vat_rate"]), Decimal::from(20));
    assert_eq!(decimal(&body["vat_amount"]), Decimal::from(20));
    assert_eq!(decimal(&body["gross_amount"]), Decimal::from(120));
}

#[tokio::test]
async fn allocate_returns_formatted_numbers() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = TenantId::new();

    for expected in ["DV-2026-0001", "DV-2026-0002"] {
        let res = client
            .post(server.url("/numbers/allocate"))
            .header("x-tenant-id", tenant.to_string())
            .json(&json!({ "document_type": "DEVIS", "year": 2026 }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["full_number"], expected);
        assert_eq!(body["prefix"], "DV-2026-");
    }

    let res = client
        .post(server.url("/numbers/allocate"))
        .header("x-tenant-id", tenant.to_string())
        .json(&json!({ "document_type": "BON_DE_COMMANDE" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn concurrent_document_creation_yields_unique_numbers() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = TenantId::new();
    let body = invoice_body();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let client = client.clone();
        let url = server.url("/documents");
        let body = body.clone();
        handles.push(tokio::spawn(async move {
            let res = client
                .post(url)
                .header("x-tenant-id", tenant.to_string())
                .json(&body)
                .send()
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::CREATED);
            let doc: Value = res.json().await.unwrap();
            doc["number"]["sequential_number"].as_u64().unwrap()
        }));
    }

    let mut seen = HashSet::new();
    for h in handles {
        assert!(seen.insert(h.await.unwrap()));
    }
    assert_eq!(seen, (1..=20).collect::<HashSet<u64>>());
}

#[tokio::test]
async fn document_lifecycle_over_http() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = TenantId::new();

    let res = create(&client, &server, tenant, &invoice_body()).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let doc: Value = res.json().await.unwrap();
    assert_eq!(doc["status"], "issued");
    assert_eq!(doc["document_type"], "FACTURE");
    assert_eq!(decimal(&doc["breakdown"]["gross_amount"]), Decimal::from(120));
    assert!(doc["number"]["full_number"].as_str().unwrap().starts_with("FA-"));
    let id = doc["id"].as_str().unwrap().to_string();

    let res = client
        .get(server.url(&format!("/documents/{id}")))
        .header("x-tenant-id", tenant.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Another tenant cannot see it.
    let res = client
        .get(server.url(&format!("/documents/{id}")))
        .header("x-tenant-id", TenantId::new().to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(server.url(&format!("/documents/{id}/paid")))
        .header("x-tenant-id", tenant.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let paid: Value = res.json().await.unwrap();
    assert_eq!(paid["status"], "paid");

    let res = client
        .post(server.url(&format!("/documents/{id}/cancel")))
        .header("x-tenant-id", tenant.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invariant_violation");
}

#[tokio::test]
async fn list_filters_by_type_and_status() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = TenantId::new();

    create(&client, &server, tenant, &invoice_body()).await;
    let mut quote = invoice_body();
    quote["document_type"] = json!("DEVIS");
    let res = create(&client, &server, tenant, &quote).await;
    let quote: Value = res.json().await.unwrap();
    let quote_id = quote["id"].as_str().unwrap();

    client
        .post(server.url(&format!("/documents/{quote_id}/cancel")))
        .header("x-tenant-id", tenant.to_string())
        .send()
        .await
        .unwrap();

    let res = client
        .get(server.url("/documents?document_type=FACTURE"))
        .header("x-tenant-id", tenant.to_string())
        .send()
        .await
        .unwrap();
    let invoices: Vec<Value> = res.json().await.unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0]["document_type"], "FACTURE");

    let res = client
        .get(server.url("/documents?status=cancelled"))
        .header("x-tenant-id", tenant.to_string())
        .send()
        .await
        .unwrap();
    let cancelled: Vec<Value> = res.json().await.unwrap();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0]["id"], quote["id"]);

    let res = client
        .get(server.url("/documents?status=archived"))
        .header("x-tenant-id", tenant.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn document_without_lines_is_rejected_without_consuming_a_number() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = TenantId::new();

    let mut empty = invoice_body();
    empty["lines"] = json!([]);
    let res = create(&client, &server, tenant, &empty).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = create(&client, &server, tenant, &invoice_body()).await;
    let doc: Value = res.json().await.unwrap();
    assert_eq!(doc["number"]["sequential_number"], 1);
}

#[tokio::test]
async fn huge_amounts_do_not_crash_the_server() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = TenantId::new();

    let res = client
        .post(server.url("/breakdown"))
        .header("x-tenant-id", tenant.to_string())
        .json(&json!({ "subtotal": "79228162514264337593543950335", "vat_rate": "100" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(decimal(&body["gross_amount"]), Decimal::MAX);

    let mut overflowing = invoice_body();
    overflowing["lines"] = json!([
        { "description": "Heures", "quantity": "79228162514264337593543950335", "unit_price": "2" }
    ]);
    let res = create(&client, &server, tenant, &overflowing).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    let res = create(&client, &server, tenant, &invoice_body()).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let doc: Value = res.json().await.unwrap();
    assert_eq!(doc["number"]["sequential_number"], 1);
}

#[tokio::test]
async fn back_dated_allocation_keeps_current_year_sequence() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = TenantId::new();

    let mut issued = Vec::new();
    for year in [2026, 2026, 2025, 2026] {
        let res = client
            .post(server.url("/numbers/allocate"))
            .header("x-tenant-id", tenant.to_string())
            .json(&json!({ "document_type": "FACTURE", "year": year }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();
        issued.push(body["full_number"].as_str().unwrap().to_string());
    }
    assert_eq!(issued, ["FA-2026-0001", "FA-2026-0002", "FA-2025-0001", "FA-2026-0003"]);
}

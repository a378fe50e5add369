#![allow(clippy::unwrap_used)]
// Integration tests for `Client` against wiremock servers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use unimux_api::{
    BackendConfig, CacheStore, Client, ClientConfig, Clock, ErrorKind, ManualClock, RateLimit,
    Request, RetryPolicy, StoreError, TlsMode, WarmReport,
};

const API_KEY: &str = "sk-test-4f9a2c";

// ── Helpers ─────────────────────────────────────────────────────────

fn cloud(server: &MockServer) -> BackendConfig {
    BackendConfig::CloudStable { url: server.uri() }
}

fn early_access(server: &MockServer) -> BackendConfig {
    BackendConfig::CloudEarlyAccess { url: server.uri() }
}

fn gateway(server: &MockServer) -> BackendConfig {
    BackendConfig::LocalGateway {
        host: Some(server.uri()),
        port: 443,
        tls: TlsMode::System,
    }
}

fn config(backend: BackendConfig) -> ClientConfig {
    let mut config = ClientConfig::new(backend, API_KEY.to_string().into());
    config.retry = RetryPolicy::new(3).with_jitter(0.0);
    config
}

fn build(config: ClientConfig) -> (Arc<ManualClock>, Client) {
    let clock = Arc::new(ManualClock::new());
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let client = Client::builder(config).clock(dyn_clock).build().unwrap();
    (clock, client)
}

fn cloud_envelope(data: Value) -> Value {
    json!({ "data": data, "httpStatusCode": 200, "traceId": "trace-1" })
}

async fn hits(server: &MockServer, method_name: &str, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == method_name && r.url.path() == request_path)
        .count()
}

fn devices() -> Value {
    json!([
        { "id": "d1", "name": "USW-24", "state": "ONLINE" },
        { "id": "d2", "name": "U6-Pro", "state": "ONLINE" }
    ])
}

#[derive(Debug)]
struct UnreachableStore;

#[async_trait]
impl CacheStore for UnreachableStore {
    async fn get(&self, _: &str) -> Result<Option<Value>, StoreError> {
        Err(StoreError("connection refused".into()))
    }
    async fn set(&self, _: &str, _: Value, _: Duration) -> Result<(), StoreError> {
        Err(StoreError("connection refused".into()))
    }
    async fn delete(&self, _: &str) -> Result<bool, StoreError> {
        Err(StoreError("connection refused".into()))
    }
    async fn delete_prefix(&self, _: &str) -> Result<usize, StoreError> {
        Err(StoreError("connection refused".into()))
    }
    async fn delete_matching(
        &self,
        _: &(dyn for<'k> Fn(&'k str) -> bool + Sync),
    ) -> Result<usize, StoreError> {
        Err(StoreError("connection refused".into()))
    }
    async fn clear(&self) -> Result<(), StoreError> {
        Err(StoreError("connection refused".into()))
    }
}

// ── Path translation and normalization ──────────────────────────────

#[tokio::test]
async fn gateway_and_cloud_yield_identical_shapes() {
    let cloud_server = MockServer::start().await;
    let gateway_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/sites"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cloud_envelope(json!([
            { "id": "site-7d1e", "internalReference": "default" }
        ]))))
        .mount(&cloud_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/site-7d1e/devices"))
        .and(header("X-API-Key", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(cloud_envelope(devices())))
        .mount(&cloud_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/proxy/network/integration/v1/sites/default/devices"))
        .and(header("X-API-Key", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "offset": 0, "limit": 25, "count": 2, "totalCount": 2, "data": devices()
        })))
        .mount(&gateway_server)
        .await;

    let (_, cloud_client) = build(config(cloud(&cloud_server)));
    let (_, gateway_client) = build(config(gateway(&gateway_server)));

    let from_cloud = cloud_client.get("devices", "default", None, &[]).await.unwrap();
    let from_gateway = gateway_client
        .get("devices", "default", None, &[])
        .await
        .unwrap();

    assert_eq!(from_cloud.data, devices());
    assert_eq!(from_gateway.data, from_cloud.data);
    assert_eq!(from_gateway.total_count(), Some(2));

    for response in [from_cloud, from_gateway] {
        let value = response.into_value();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["data", "meta"]);
        assert!(value["meta"].is_object());
    }
}

#[tokio::test]
async fn early_access_bare_body_becomes_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ea/sites/s1/clients/c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "c1", "ip": "10.0.0.5"})))
        .mount(&server)
        .await;

    let (_, client) = build(config(early_access(&server)));
    let response = client.get("clients", "s1", Some("c1"), &[]).await.unwrap();

    assert_eq!(response.data, json!({"id": "c1", "ip": "10.0.0.5"}));
    assert!(response.meta.is_empty());
}

#[tokio::test]
async fn site_collection_is_addressed_directly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(cloud_envelope(json!([{"id": "s1"}]))),
        )
        .mount(&server)
        .await;

    let (_, client) = build(config(cloud(&server)));
    let response = client.request(Request::get("sites", "default")).await.unwrap();

    assert_eq!(response.items().len(), 1);
}

// ── Site alias ──────────────────────────────────────────────────────

#[tokio::test]
async fn default_site_is_resolved_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cloud_envelope(json!([
            { "id": "s-branch", "meta": { "name": "Branch" } },
            { "id": "s-main", "meta": { "name": "Default" } }
        ]))))
        .mount(&server)
        .await;
    for resource in ["devices", "networks"] {
        Mock::given(method("GET"))
            .and(path(format!("/v1/sites/s-main/{resource}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(cloud_envelope(json!([]))))
            .mount(&server)
            .await;
    }

    let (_, client) = build(config(cloud(&server)));
    client.get("devices", "default", None, &[]).await.unwrap();
    client.get("networks", "default", None, &[]).await.unwrap();

    assert_eq!(client.resolve_site("default").await.unwrap(), "s-main");
    assert_eq!(client.resolve_site("other").await.unwrap(), "other");
    assert_eq!(hits(&server, "GET", "/v1/sites").await, 1);
}

#[tokio::test]
async fn unresolvable_default_site_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(cloud_envelope(json!([{"id": "a"}, {"id": "b"}]))),
        )
        .mount(&server)
        .await;

    let (_, client) = build(config(cloud(&server)));
    let err = client
        .get("devices", "default", None, &[])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ── Cache ───────────────────────────────────────────────────────────

#[tokio::test]
async fn cached_read_expires_after_ttl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cloud_envelope(devices())))
        .mount(&server)
        .await;

    let mut cfg = config(cloud(&server));
    cfg.cache = cfg.cache.with_ttl("devices", Duration::from_secs(60));
    let (clock, client) = build(cfg);

    client.get("devices", "s1", None, &[]).await.unwrap();
    clock.advance(Duration::from_secs(59));
    let cached = client.get("devices", "s1", None, &[]).await.unwrap();
    assert_eq!(cached.data, devices());
    assert_eq!(hits(&server, "GET", "/v1/sites/s1/devices").await, 1);

    clock.advance(Duration::from_secs(1));
    client.get("devices", "s1", None, &[]).await.unwrap();
    assert_eq!(hits(&server, "GET", "/v1/sites/s1/devices").await, 2);
}

#[tokio::test]
async fn reads_with_different_params_are_cached_apart() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/events"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cloud_envelope(json!([1]))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/events"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cloud_envelope(json!([1, 2]))))
        .mount(&server)
        .await;

    let (_, client) = build(config(cloud(&server)));
    let one = client
        .get("events", "s1", None, &[("limit", "1")])
        .await
        .unwrap();
    let two = client
        .get("events", "s1", None, &[("limit", "2")])
        .await
        .unwrap();

    assert_eq!(one.items().len(), 1);
    assert_eq!(two.items().len(), 2);
}

#[tokio::test]
async fn concurrent_mutations_invalidate_before_returning() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/networks"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(cloud_envelope(json!([{"id": "old"}]))),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/networks"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(cloud_envelope(json!([{"id": "new"}]))),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/sites/s1/networks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(cloud_envelope(json!({}))))
        .mount(&server)
        .await;

    let (_, client) = build(config(cloud(&server)));

    let before = client.get("networks", "s1", None, &[]).await.unwrap();
    assert_eq!(before.data, json!([{"id": "old"}]));

    let mutations = (0..3).map(|i| {
        let client = client.clone();
        async move { client.post("networks", "s1", json!({ "name": format!("net-{i}") })).await }
    });
    for result in futures::future::join_all(mutations).await {
        result.unwrap();
    }

    assert_eq!(client.cache_stats().invalidations, 3);

    let after = client.get("networks", "s1", None, &[]).await.unwrap();
    assert_eq!(after.data, json!([{"id": "new"}]));
    assert_eq!(hits(&server, "GET", "/v1/sites/s1/networks").await, 2);
}

#[tokio::test]
async fn read_overtaken_by_mutation_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/networks"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(cloud_envelope(json!([{"id": "old"}])))
                .set_delay(Duration::from_millis(400)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/networks"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(cloud_envelope(json!([{"id": "new"}]))),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/sites/s1/networks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(cloud_envelope(json!({}))))
        .mount(&server)
        .await;

    let (_, client) = build(config(cloud(&server)));

    let (in_flight, ()) = tokio::join!(client.get("networks", "s1", None, &[]), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        client
            .post("networks", "s1", json!({"name": "iot"}))
            .await
            .unwrap();
    });
    assert_eq!(in_flight.unwrap().data, json!([{"id": "old"}]));

    let after = client.get("networks", "s1", None, &[]).await.unwrap();
    assert_eq!(after.data, json!([{"id": "new"}]));
    assert_eq!(hits(&server, "GET", "/v1/sites/s1/networks").await, 2);
    assert_eq!(client.cache_stats().stale_writes, 1);
}

#[tokio::test]
async fn failed_mutation_still_invalidates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/wlans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cloud_envelope(json!([]))))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/sites/s1/wlans/w1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (_, client) = build(config(cloud(&server)));
    client.get("wlans", "s1", None, &[]).await.unwrap();
    let err = client
        .put("wlans", "s1", "w1", json!({"enabled": false}))
        .await
        .unwrap_err();
    client.get("wlans", "s1", None, &[]).await.unwrap();

    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(hits(&server, "GET", "/v1/sites/s1/wlans").await, 2);
}

#[tokio::test]
async fn unreachable_cache_store_never_fails_reads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cloud_envelope(devices())))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/sites/s1/devices/d1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
    let client = Client::builder(config(cloud(&server)))
        .clock(clock)
        .cache_store(Arc::new(UnreachableStore))
        .build()
        .unwrap();

    for _ in 0..2 {
        let response = client.get("devices", "s1", None, &[]).await.unwrap();
        assert_eq!(response.data, devices());
    }
    client.delete("devices", "s1", "d1").await.unwrap();

    assert_eq!(hits(&server, "GET", "/v1/sites/s1/devices").await, 2);
    assert!(client.cache_stats().store_errors >= 4);
}

#[tokio::test]
async fn explicit_invalidate_forces_refetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/clients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cloud_envelope(json!([]))))
        .mount(&server)
        .await;

    let (_, client) = build(config(cloud(&server)));
    client.get("clients", "s1", None, &[]).await.unwrap();
    client.invalidate("clients", "s1").await;
    client.get("clients", "s1", None, &[]).await.unwrap();

    assert_eq!(hits(&server, "GET", "/v1/sites/s1/clients").await, 2);
}

#[tokio::test]
async fn site_and_resource_invalidation_span_their_scope() {
    let server = MockServer::start().await;
    for route in ["/v1/sites/s1/devices", "/v1/sites/s1/clients", "/v1/sites/s2/devices"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(cloud_envelope(json!([]))))
            .mount(&server)
            .await;
    }

    let (_, client) = build(config(cloud(&server)));
    let client = &client;
    let read_all = || async move {
        client.get("devices", "s1", None, &[]).await.unwrap();
        client.get("clients", "s1", None, &[]).await.unwrap();
        client.get("devices", "s2", None, &[]).await.unwrap();
    };

    read_all().await;
    client.invalidate_site("s1").await;
    read_all().await;

    assert_eq!(hits(&server, "GET", "/v1/sites/s1/devices").await, 2);
    assert_eq!(hits(&server, "GET", "/v1/sites/s1/clients").await, 2);
    assert_eq!(hits(&server, "GET", "/v1/sites/s2/devices").await, 1);

    client.invalidate_resource("devices").await;
    read_all().await;

    assert_eq!(hits(&server, "GET", "/v1/sites/s1/devices").await, 3);
    assert_eq!(hits(&server, "GET", "/v1/sites/s1/clients").await, 2);
    assert_eq!(hits(&server, "GET", "/v1/sites/s2/devices").await, 2);
}

#[tokio::test]
async fn warm_cache_loads_sites_and_devices() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cloud_envelope(json!([
            {"id": "s1", "name": "HQ"},
            {"id": "s2", "name": "Branch"}
        ]))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cloud_envelope(devices())))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s2/devices"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "gone"})))
        .mount(&server)
        .await;

    let (_, client) = build(config(cloud(&server)));
    let report = client.warm_cache().await.unwrap();

    assert_eq!(
        report,
        WarmReport {
            sites: 2,
            devices: 2,
            failed: 1
        }
    );

    let devices_s1 = client.get("devices", "s1", None, &[]).await.unwrap();
    assert_eq!(devices_s1.data, devices());
    let site = client.get("sites", "", Some("s2"), &[]).await.unwrap();
    assert_eq!(site.data["name"], "Branch");
    client.get("sites", "", None, &[]).await.unwrap();

    assert_eq!(hits(&server, "GET", "/v1/sites").await, 1);
    assert_eq!(hits(&server, "GET", "/v1/sites/s1/devices").await, 1);
    assert_eq!(hits(&server, "GET", "/v1/sites/s2").await, 0);
}

#[tokio::test]
async fn warm_cache_fails_when_sites_cannot_be_listed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "bad key"})))
        .mount(&server)
        .await;

    let (_, client) = build(config(cloud(&server)));
    let err = client.warm_cache().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
}

// ── Retry ───────────────────────────────────────────────────────────

#[tokio::test]
async fn rate_limited_read_waits_for_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/devices"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "5"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cloud_envelope(devices())))
        .mount(&server)
        .await;

    let (clock, client) = build(config(cloud(&server)));
    let response = client.get("devices", "s1", None, &[]).await.unwrap();

    assert_eq!(response.data, devices());
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    assert!(clock.elapsed() >= Duration::from_secs(5));
}

#[tokio::test]
async fn rate_limit_surfaces_after_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/devices"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .mount(&server)
        .await;

    let (clock, client) = build(config(cloud(&server)));
    let err = client.get("devices", "s1", None, &[]).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateLimit);
    assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    assert_eq!(clock.sleeps().len(), 3);
    assert_eq!(hits(&server, "GET", "/v1/sites/s1/devices").await, 4);
}

#[tokio::test]
async fn unauthorized_is_never_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/devices"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "bad key"})))
        .mount(&server)
        .await;

    let mut cfg = config(cloud(&server));
    cfg.retry = RetryPolicy::new(10);
    let (clock, client) = build(cfg);
    let err = client.get("devices", "s1", None, &[]).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(clock.sleeps().is_empty());
    assert_eq!(hits(&server, "GET", "/v1/sites/s1/devices").await, 1);
}

#[tokio::test]
async fn server_error_retries_reads_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/devices"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cloud_envelope(devices())))
        .mount(&server)
        .await;

    let (clock, client) = build(config(cloud(&server)));
    client.get("devices", "s1", None, &[]).await.unwrap();

    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[tokio::test]
async fn mutation_is_not_retried_after_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/sites/s1/port_forwards"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (clock, client) = build(config(cloud(&server)));
    let err = client
        .post("port_forwards", "s1", json!({"port": 443}))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Server);
    assert!(clock.sleeps().is_empty());
    assert_eq!(hits(&server, "POST", "/v1/sites/s1/port_forwards").await, 1);
}

#[tokio::test]
async fn refused_connection_retries_mutation() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let backend = BackendConfig::CloudStable {
        url: format!("http://127.0.0.1:{port}"),
    };

    let (clock, client) = build(config(backend));
    let err = client
        .post("networks", "s1", json!({"name": "iot"}))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(clock.sleeps().len(), 3);
}

#[tokio::test]
async fn non_json_success_is_server_error_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/topology"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let (clock, client) = build(config(cloud(&server)));
    let err = client.get("topology", "s1", None, &[]).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Server);
    assert!(clock.sleeps().is_empty());
}

#[tokio::test]
async fn empty_success_body_reads_as_empty_object() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/proxy/network/integration/v1/sites/default/firewall_rules/r1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let (_, client) = build(config(gateway(&server)));
    let response = client
        .delete("firewall_rules", "default", "r1")
        .await
        .unwrap();

    assert_eq!(response.data, json!({}));
    assert!(response.meta.is_empty());
}

// ── Errors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn api_key_never_appears_in_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/sites/s1/networks"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": format!("header X-API-Key={API_KEY} is not allowed here")
        })))
        .mount(&server)
        .await;

    let (_, client) = build(config(cloud(&server)));
    let err = client
        .post("networks", "s1", json!({}))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(!err.to_string().contains(API_KEY));
    assert!(!format!("{err:?}").contains(API_KEY));
    assert!(err.message().contains("[REDACTED]"));
}

#[tokio::test]
async fn deadline_cancels_slow_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sites/s1/dpi_stats"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(cloud_envelope(json!([])))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/v1/sites/s1/dpi_stats/x"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let (_, client) = build(config(cloud(&server)));

    let err = client
        .request(Request::get("dpi_stats", "s1").deadline(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.message().contains("deadline"));

    let err = client
        .request(
            Request::patch("dpi_stats", "s1")
                .id("x")
                .body(json!({}))
                .deadline(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(client.cache_stats().invalidations, 1);
}

// ── Construction ────────────────────────────────────────────────────

#[test]
fn missing_gateway_host_fails_at_construction() {
    let backend = BackendConfig::LocalGateway {
        host: None,
        port: 443,
        tls: TlsMode::DangerAcceptInvalid,
    };
    let err = Client::new(config(backend)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn zero_rate_limit_fails_at_construction() {
    let mut cfg = config(BackendConfig::cloud_stable());
    cfg.rate_limit = Some(RateLimit::per_minute(0));
    let err = Client::new(cfg).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

use autocrud::MemoryStore;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

// Test client driving the router in-process
struct TestClient {
    app: Router,
}

impl TestClient {
    fn new() -> Self {
        let app = autocrud::app(Arc::new(MemoryStore::new())).expect("demo router should mount");
        Self { app }
    }

    async fn send(&self, method: &str, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .header("x-user-id", "tester")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send("GET", path, None).await
    }

    async fn post(&self, path: &str, json: Value) -> (StatusCode, Value) {
        self.send("POST", path, Some(json)).await
    }

    async fn put(&self, path: &str, json: Value) -> (StatusCode, Value) {
        self.send("PUT", path, Some(json)).await
    }

    async fn delete(&self, path: &str, json: Option<Value>) -> (StatusCode, Value) {
        self.send("DELETE", path, json).await
    }

    async fn seed(&self) {
        let (status, _) = self
            .post(
                "/people",
                json!([
                    {"name": "ada", "age": 3, "email": "ADA@example.com"},
                    {"name": "alan", "age": 4},
                    {"name": "grace", "age": 8},
                    {"name": "linus", "age": 5}
                ]),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_health() {
    let client = TestClient::new();
    let (status, body) = client.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_create_runs_hook() {
    let client = TestClient::new();
    let (status, body) = client.post("/people", json!({"name": "a", "age": 1})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id": 1, "name": "A", "age": 10, "email": ""}));

    let (status, body) = client.get("/people/id/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "A");
}

#[tokio::test]
async fn test_batch_create_returns_array() {
    let client = TestClient::new();
    let (status, body) = client
        .post("/people", json!([{"name": "x", "age": 1}, {"name": "y", "age": 2}]))
        .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = body.as_array().unwrap().iter().map(|p| p["name"].clone()).collect();
    assert_eq!(names, vec![json!("X"), json!("Y")]);
}

#[tokio::test]
async fn test_batch_create_is_atomic() {
    let client = TestClient::new();
    // the second element has no name
    let (status, body) = client
        .post("/people", json!([{"name": "x", "age": 1}, {"age": 2}]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("payload does not match"));

    let (_, listing) = client.get("/people").await;
    assert_eq!(listing["total"], 0);
    assert_eq!(listing["result"], json!([]));
}

#[tokio::test]
async fn test_read_missing_is_null() {
    let client = TestClient::new();
    let (status, body) = client.get("/people/id/42").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_read_by_storage_name() {
    let client = TestClient::new();
    client.seed().await;
    let (status, body) = client.get("/people/full_name/GRACE").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["age"], 80);
    assert_eq!(body["email"], "");
}

#[tokio::test]
async fn test_list_envelope_and_pagination() {
    let client = TestClient::new();
    client.seed().await;

    let (status, body) = client
        .get("/people?name=A&sort=age%20desc&page=2&size=2&select=name&select=age")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["count"], 1);
    assert_eq!(body["page"], 2);
    assert_eq!(body["size"], 2);
    assert_eq!(body["sort"], "age desc");
    assert_eq!(body["select"], json!(["name", "age"]));
    assert_eq!(body["result"], json!([{"id": 0, "name": "ADA", "age": 30, "email": ""}]));
}

#[tokio::test]
async fn test_reserved_and_unknown_params_are_not_filters() {
    let client = TestClient::new();
    client.seed().await;

    let (status, body) = client.get("/people?count=1&total=2&result=x&nickname=zz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 4);
    assert_eq!(body["count"], 4);
}

#[tokio::test]
async fn test_in_filter_and_omit() {
    let client = TestClient::new();
    client.seed().await;

    let (_, body) = client.get("/people?id=1&id=4&omit=email&omit=age").await;
    assert_eq!(body["total"], 2);
    let result = body["result"].as_array().unwrap();
    assert_eq!(result[0]["name"], "ADA");
    assert_eq!(result[0]["email"], "");
    assert_eq!(result[1]["name"], "LINUS");
    assert_eq!(result[1]["age"], 0);
}

#[tokio::test]
async fn test_update_keeps_address() {
    let client = TestClient::new();
    client.seed().await;

    let (status, body) = client.put("/people/id/2", json!({"id": 9, "age": 41})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(1));

    let (_, person) = client.get("/people/id/2").await;
    assert_eq!(person["age"], 41);
    assert_eq!(person["name"], "ALAN");
    let (_, missing) = client.get("/people/id/9").await;
    assert_eq!(missing, Value::Null);

    let (status, _) = client.put("/people/name/ADA", json!({"id": 2, "age": 5})).await;
    assert_eq!(status, StatusCode::OK);
    let (_, by_id) = client.get("/people?id=2&id=2").await;
    assert_eq!(by_id["total"], 1);
    assert_eq!(by_id["result"][0]["name"], "ALAN");
}

#[tokio::test]
async fn test_update_hook_rejection() {
    let client = TestClient::new();
    client.seed().await;

    let (status, body) = client.put("/people/id/1", json!({"age": -1})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("age must not be negative"));
}

#[tokio::test]
async fn test_batch_update_rolls_back_on_rejection() {
    let client = TestClient::new();
    client.seed().await;

    let (status, _) = client
        .put("/people/id", json!([{"id": 1, "age": 7}, {"id": 2, "age": -7}]))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (_, person) = client.get("/people/id/1").await;
    assert_eq!(person["age"], 30);

    let (status, body) = client
        .put("/people/name", json!([{"name": "ADA", "age": 7}, {"name": "GRACE", "age": 9}]))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(2));
    let (_, person) = client.get("/people/id/3").await;
    assert_eq!(person["age"], 9);
}

#[tokio::test]
async fn test_deletes() {
    let client = TestClient::new();
    client.seed().await;

    let (status, body) = client.delete("/people/name/ADA", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(1));

    let (status, body) = client.delete("/people/id", Some(json!([2, 3, 99]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(2));

    let (_, listing) = client.get("/people").await;
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["result"][0]["name"], "LINUS");
}

#[tokio::test]
async fn test_bad_requests() {
    let client = TestClient::new();
    client.seed().await;

    let (status, _) = client.get("/people?page=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = client.get("/people?sort=nickname").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = client.get("/people/id/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = client.put("/people/id", json!({"id": 1})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = client.get("/people?page=9223372036854775807&size=10").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = client.put("/people/id/1", json!({"age": "old"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = client.get("/things").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

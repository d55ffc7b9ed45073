//! Integration tests for the apply executor using wiremock
//!
//! These tests run whole applies against a mocked control plane, covering
//! synchronous creates, the three long-running operation styles, failures,
//! cancellation, and parent-before-child scheduling.

use aery::arm::{ArmClient, ArmCredentials};
use aery::deploy::{self, ApplyRequest, ExecuteOptions, Outcome};
use aery::error::{ApplyError, PollingError};
use aery::naming::{unique_string, Catalog};
use reqwest::StatusCode;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{bearer_token, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "test-token";
const SUBSCRIPTION: &str = "sub-1";
const GROUP: &str = "rg-demo";

const CATALOG: &str = r#"
resourceTypes:
  Microsoft.Resources/resourceGroups:
    - name: Resource group
      abbreviation: rg
  Microsoft.Foo/bars:
    - name: Bar
      abbreviation: bar
"#;

fn catalog() -> Catalog {
    Catalog::from_yaml_str(CATALOG).expect("Catalog should parse")
}

fn client(server: &MockServer) -> ArmClient {
    ArmClient::with_endpoint(ArmCredentials::from_static(TOKEN), &server.uri())
        .expect("Client should build")
}

fn options(max_parallel: usize) -> ExecuteOptions {
    ExecuteOptions {
        poll_interval: Duration::from_millis(10),
        max_parallel,
    }
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let file = dir.join(name);
    std::fs::write(&file, content).expect("Should write test file");
    file
}

fn bar(name: &str) -> String {
    format!("name: {name}\ntype: Microsoft.Foo/bars\napiVersion: \"2023-01-01\"\nspec:\n  location: eastus\n")
}

fn file_request(file: PathBuf, max_parallel: usize) -> ApplyRequest {
    ApplyRequest {
        path: file,
        subscription_id: Some(SUBSCRIPTION.to_string()),
        resource_group: Some(GROUP.to_string()),
        options: options(max_parallel),
    }
}

fn bar_path(name: &str) -> String {
    format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/{GROUP}/providers/Microsoft.Foo/bars/{name}")
}

/// Tests covering a full apply
mod apply_tests {
    use super::*;

    /// Group plus an aliased resource, created through an async operation
    #[tokio::test]
    async fn test_group_and_aliased_resource_end_to_end() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "group.yaml",
            "name: rg-demo\ntype: Microsoft.Resources/resourceGroups\napiVersion: \"2021-04-01\"\nspec:\n  location: eastus\n",
        );
        write(
            dir.path(),
            "app.yaml",
            "alias: web\ntype: Microsoft.Foo/bars\napiVersion: \"2023-01-01\"\nspec:\n  location: eastus\n  properties:\n    tier: basic\n",
        );

        let name = format!("web-{}", unique_string(&[SUBSCRIPTION, GROUP, "web"]));
        assert_eq!(name, "web-wdlvsvf3xrih4");

        Mock::given(method("PUT"))
            .and(path("/subscriptions/sub-1/resourcegroups/rg-demo"))
            .and(query_param("api-version", "2021-04-01"))
            .and(bearer_token(TOKEN))
            .and(header_exists("x-ms-client-request-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "rg-demo"})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path(bar_path(&name)))
            .and(query_param("api-version", "2023-01-01"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header(
                        "Azure-AsyncOperation",
                        format!("{}/operations/op-1", server.uri()).as_str(),
                    )
                    .set_body_json(json!({"properties": {"provisioningState": "Accepted"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/operations/op-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "InProgress"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/operations/op-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Succeeded"})))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(bar_path(&name)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"properties": {"provisioningState": "Succeeded"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let request = ApplyRequest {
            path: dir.path().to_path_buf(),
            subscription_id: Some(SUBSCRIPTION.to_string()),
            resource_group: None,
            options: options(1),
        };
        let result = deploy::apply(&client(&server), &catalog(), &request, &CancellationToken::new()).await;
        let report = assert_ok!(result);

        let applied: Vec<_> = report
            .applied
            .iter()
            .map(|r| (r.name.as_str(), r.outcome))
            .collect();
        assert_eq!(
            applied,
            vec![("rg-demo", Outcome::Sync), (name.as_str(), Outcome::Polled)]
        );

        let requests = server.received_requests().await.unwrap();
        let put = requests
            .iter()
            .find(|r| r.method.to_string() == "PUT" && r.url.path() == bar_path(&name))
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&put.body).unwrap();
        assert_eq!(body, json!({"location": "eastus", "properties": {"tier": "basic"}}));
    }

    /// 201 with a Location monitor that answers 202 until done
    #[tokio::test]
    async fn test_location_header_polling() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "app.yaml", &bar("api"));

        Mock::given(method("PUT"))
            .and(path(bar_path("api")))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Location", format!("{}/monitors/m-1", server.uri()).as_str()),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/monitors/m-1"))
            .respond_with(ResponseTemplate::new(202))
            .up_to_n_times(2)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/monitors/m-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "api"})))
            .expect(1)
            .mount(&server)
            .await;

        let result = deploy::apply(
            &client(&server),
            &catalog(),
            &file_request(file, 1),
            &CancellationToken::new(),
        )
        .await;
        let report = assert_ok!(result);
        assert_eq!(report.applied[0].outcome, Outcome::Polled);
    }

    /// 201 without monitor headers polls the resource itself
    #[tokio::test]
    async fn test_provisioning_state_polling() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "app.yaml", &bar("api"));

        Mock::given(method("PUT"))
            .and(path(bar_path("api")))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({"properties": {"provisioningState": "Creating"}})),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(bar_path("api")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"properties": {"provisioningState": "Updating"}})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(bar_path("api")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"properties": {"provisioningState": "Succeeded"}})),
            )
            .mount(&server)
            .await;

        let result = deploy::apply(
            &client(&server),
            &catalog(),
            &file_request(file, 1),
            &CancellationToken::new(),
        )
        .await;
        assert_ok!(result);
    }

    /// Child resources resolve their parent and nest under its path
    #[tokio::test]
    async fn test_child_resource_nests_under_parent() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let file = write(
            dir.path(),
            "app.yaml",
            &format!(
                "name: db\ntype: Microsoft.Foo/bars/bazs\napiVersion: \"2023-01-01\"\nspec: {{}}\n---\n{}",
                bar("api")
            ),
        );

        Mock::given(method("PUT"))
            .and(path(bar_path("api")))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path(format!("{}/bazs/db", bar_path("api"))))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let result = deploy::apply(
            &client(&server),
            &catalog(),
            &file_request(file, 1),
            &CancellationToken::new(),
        )
        .await;
        let report = assert_ok!(result);

        let names: Vec<_> = report.applied.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["api", "db"]);
    }
}

/// Tests covering failure handling
mod failure_tests {
    use super::*;

    /// A rejected PUT stops the batch; later resources are never sent
    #[tokio::test]
    async fn test_response_error_stops_the_batch() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "app.yaml", &format!("{}---\n{}", bar("a"), bar("b")));

        Mock::given(method("PUT"))
            .and(path(bar_path("a")))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": {"code": "Conflict", "message": "already being deleted"}
            })))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path(bar_path("b")))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = deploy::apply(
            &client(&server),
            &catalog(),
            &file_request(file, 1),
            &CancellationToken::new(),
        )
        .await
        .expect_err("Apply should fail");

        assert_eq!(err.status(), Some(StatusCode::CONFLICT));
        let chain = format!("{:#}", anyhow::Error::from(err));
        assert!(chain.starts_with("failed applying resource a: PUT "));
        assert!(chain.ends_with("409 Conflict (Conflict: already being deleted)"));
    }

    /// Statuses other than 200 and 201 are errors, 202 included
    #[tokio::test]
    async fn test_accepted_put_is_an_error() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "app.yaml", &bar("a"));

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(202).set_body_string("queued"))
            .mount(&server)
            .await;

        let err = deploy::apply(
            &client(&server),
            &catalog(),
            &file_request(file, 1),
            &CancellationToken::new(),
        )
        .await
        .expect_err("Apply should fail");

        match err.innermost() {
            ApplyError::Response(e) => {
                assert_eq!(e.status, StatusCode::ACCEPTED);
                assert_eq!(e.body, "queued");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// A failed async operation surfaces its terminal state
    #[tokio::test]
    async fn test_failed_operation_is_an_error() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "app.yaml", &bar("a"));

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201).insert_header(
                "Azure-AsyncOperation",
                format!("{}/operations/op-9", server.uri()).as_str(),
            ))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/operations/op-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "Failed",
                "error": {"code": "QuotaExceeded"}
            })))
            .mount(&server)
            .await;

        let err = deploy::apply(
            &client(&server),
            &catalog(),
            &file_request(file, 1),
            &CancellationToken::new(),
        )
        .await
        .expect_err("Apply should fail");

        match err.innermost() {
            ApplyError::Polling(PollingError::Failed { status, body }) => {
                assert_eq!(status, "Failed");
                assert!(body.contains("QuotaExceeded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// An operation body without a status ends the apply instead of polling on
    #[tokio::test]
    async fn test_operation_without_status_is_an_error() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "app.yaml", &bar("a"));

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201).insert_header(
                "Azure-AsyncOperation",
                format!("{}/operations/op-x", server.uri()).as_str(),
            ))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/operations/op-x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "op"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let catalog = catalog();
        let request = file_request(file, 1);
        let cancel = CancellationToken::new();
        let apply = deploy::apply(&client, &catalog, &request, &cancel);
        let err = tokio::time::timeout(Duration::from_secs(5), apply)
            .await
            .expect("Apply should finish")
            .expect_err("Apply should fail");

        match err.innermost() {
            ApplyError::Polling(PollingError::MissingStatus { url, body }) => {
                assert!(url.ends_with("/operations/op-x"));
                assert_eq!(body, r#"{"id":"op"}"#);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Cancelling while an operation is still running aborts the wait
    #[tokio::test]
    async fn test_cancel_during_polling() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "app.yaml", &format!("{}---\n{}", bar("a"), bar("b")));

        Mock::given(method("PUT"))
            .and(path(bar_path("a")))
            .respond_with(ResponseTemplate::new(201).insert_header(
                "Azure-AsyncOperation",
                format!("{}/operations/slow", server.uri()).as_str(),
            ))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/operations/slow"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Running"})))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path(bar_path("b")))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = deploy::apply(&client(&server), &catalog(), &file_request(file, 1), &cancel)
            .await
            .expect_err("Apply should be cancelled");

        assert!(matches!(err.innermost(), ApplyError::Cancelled));
        assert_eq!(err.to_string(), "failed applying resource a");
    }
}

/// Tests covering parallel scheduling
mod scheduling_tests {
    use super::*;

    /// Independent resources overlap when parallelism allows it
    #[tokio::test]
    async fn test_independent_resources_run_in_parallel() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let file = write(
            dir.path(),
            "app.yaml",
            &format!("{}---\n{}---\n{}", bar("a"), bar("b"), bar("c")),
        );

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .expect(3)
            .mount(&server)
            .await;

        let start = Instant::now();
        let result = deploy::apply(
            &client(&server),
            &catalog(),
            &file_request(file, 3),
            &CancellationToken::new(),
        )
        .await;
        let report = assert_ok!(result);

        assert_eq!(report.applied.len(), 3);
        assert!(start.elapsed() < Duration::from_millis(1400));
    }

    /// A child listed before its parent still waits for the parent
    #[tokio::test]
    async fn test_parent_applies_before_child() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let file = write(
            dir.path(),
            "app.yaml",
            &format!(
                "name: db\ntype: Microsoft.Foo/bars/bazs\napiVersion: \"2023-01-01\"\nspec: {{}}\n---\n{}",
                bar("api")
            ),
        );

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(50)))
            .expect(2)
            .mount(&server)
            .await;

        let result = deploy::apply(
            &client(&server),
            &catalog(),
            &file_request(file, 4),
            &CancellationToken::new(),
        )
        .await;
        assert_ok!(result);

        let paths: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| r.url.path().to_string())
            .collect();
        assert_eq!(paths, vec![bar_path("api"), format!("{}/bazs/db", bar_path("api"))]);
    }
}

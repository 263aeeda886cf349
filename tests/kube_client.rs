//! Integration tests for the API server client using wiremock
//!
//! These tests verify pagination, authentication and error handling of the
//! list client against mocked endpoints.

use kflat::kube::http::format_kube_error;
use kflat::kube::{Context, KubeClient};
use kflat::resource::{ListRequest, Node, Path, Upstream};
use serde_json::json;
use url::Url;
use wiremock::matchers::{bearer_token, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn context(server: &MockServer) -> Context {
    Context::new("test", Url::parse(&server.uri()).unwrap())
}

fn request(path: &str) -> ListRequest {
    ListRequest {
        path: path.to_string(),
        response_path: Path::key("items"),
    }
}

mod pagination {
    use super::*;

    #[tokio::test]
    async fn test_follows_continue_tokens_in_order() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/pods"))
            .and(query_param("limit", "2"))
            .and(query_param_is_missing("continue"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metadata": {"continue": "page-2"},
                "items": [{"metadata": {"name": "a"}}, {"metadata": {"name": "b"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/pods"))
            .and(query_param("continue", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metadata": {"continue": ""},
                "items": [{"metadata": {"name": "c"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = KubeClient::new(2).unwrap();
        let items = client
            .list(&context(&server), &request("/api/v1/pods"))
            .await
            .expect("listing succeeds");

        let names: Vec<String> = items
            .iter()
            .filter_map(|item| {
                Path::parse("metadata.name")
                    .unwrap()
                    .resolve(item)
                    .and_then(|n| n.as_str().map(str::to_string))
            })
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_list_is_not_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/default/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metadata": {},
                "items": null
            })))
            .mount(&server)
            .await;

        let client = KubeClient::new(500).unwrap();
        let items = client
            .list(&context(&server), &request("/api/v1/namespaces/default/events"))
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_continue_token_fails() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/pods"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metadata": {"continue": "stuck"},
                "items": [{"metadata": {"name": "a"}}]
            })))
            .mount(&server)
            .await;

        let client = KubeClient::new(1).unwrap();
        let result = client.list(&context(&server), &request("/api/v1/pods")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_non_list_items_field_fails() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/pods"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": "nope"})))
            .mount(&server)
            .await;

        let client = KubeClient::new(10).unwrap();
        assert!(client
            .list(&context(&server), &request("/api/v1/pods"))
            .await
            .is_err());
    }
}

mod auth_and_errors {
    use super::*;

    #[tokio::test]
    async fn test_sends_bearer_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/nodes"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{}]})))
            .expect(1)
            .mount(&server)
            .await;

        let client = KubeClient::new(10).unwrap();
        let items = client
            .list(&context(&server).with_token("test-token"), &request("/api/v1/nodes"))
            .await
            .unwrap();
        assert_eq!(items, vec![Node::record(Vec::<(&str, Node)>::new())]);
    }

    #[tokio::test]
    async fn test_forbidden_is_a_listing_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/secrets"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "kind": "Status",
                "message": "secrets is forbidden",
                "code": 403
            })))
            .mount(&server)
            .await;

        let client = KubeClient::new(10).unwrap();
        let err = client
            .list(&context(&server), &request("/api/v1/secrets"))
            .await
            .unwrap_err();
        assert!(format_kube_error(&err).contains("Permission denied"));
    }

    #[tokio::test]
    async fn test_invalid_json_fails() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/pods"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
            .mount(&server)
            .await;

        let client = KubeClient::new(10).unwrap();
        let err = client
            .list(&context(&server), &request("/api/v1/pods"))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse response JSON"));
    }
}

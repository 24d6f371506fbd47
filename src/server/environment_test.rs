#[cfg(test)]
mod tests {
    use crate::fake::{FakeClientBuilder, Verb};
    use crate::resources::{Environment, EnvironmentSpec};
    use crate::server::test_support::*;
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn lab(name: &str) -> Environment {
        Environment::new(
            name,
            EnvironmentSpec {
                display_name: "Lab1".to_string(),
                dnssuffix: "lab.example.com".to_string(),
                provider: "aws".to_string(),
                template_mapping: BTreeMap::from([(
                    "t1".to_string(),
                    BTreeMap::from([("image".to_string(), "ami-123".to_string())]),
                )]),
                environment_specifics: BTreeMap::from([("region".to_string(), "us-east-1".to_string())]),
                ip_translation_map: BTreeMap::new(),
                ws_endpoint: "wss://x".to_string(),
                count_capacity: BTreeMap::from([("t1".to_string(), 5)]),
            },
        )
    }

    const CREATE_FIELDS: &[(&str, &str)] = &[
        ("display_name", "Lab1"),
        ("provider", "aws"),
        ("template_mapping", r#"{"t1":{"k":"v"}}"#),
        ("environment_specifics", r#"{"region":"eu-west-1"}"#),
        ("count_capacity", r#"{"t1":5}"#),
        ("ip_translation_map", "{}"),
        ("ws_endpoint", "wss://x"),
    ];

    fn without(field: &str) -> Vec<(&'static str, &'static str)> {
        CREATE_FIELDS
            .iter()
            .copied()
            .filter(|(name, _)| *name != field)
            .collect()
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let app = app(FakeClientBuilder::new()).await;

        let (status, body) = app
            .send(form(Method::POST, "/a/environment/create", ADMIN, CREATE_FIELDS))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "created");

        let name = body["message"].as_str().unwrap().to_string();
        assert_eq!(name.len(), 14);
        assert!(name.starts_with("env-"));
        assert!(name[4..].chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));

        let (status, body) = app.send(get(&format!("/a/environment/{}", name), AUDITOR)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "success");
        let env = &body["content"];
        assert_eq!(env["name"], name.as_str());
        assert_eq!(env["display_name"], "Lab1");
        assert_eq!(env["provider"], "aws");
        assert_eq!(env["dnssuffix"], "");
        assert_eq!(env["template_mapping"], json!({"t1": {"k": "v"}}));
        assert_eq!(env["count_capacity"], json!({"t1": 5}));
        assert_eq!(env["environment_specifics"], json!({"region": "eu-west-1"}));
        assert_eq!(env["ws_endpoint"], "wss://x");
    }

    #[tokio::test]
    async fn test_create_rejects_missing_fields() {
        let app = app(FakeClientBuilder::new()).await;

        for field in ["display_name", "provider", "count_capacity", "ws_endpoint"] {
            let (status, body) = app
                .send(form(Method::POST, "/a/environment/create", ADMIN, &without(field)))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "missing {}", field);
            assert_eq!(body["message"], format!("no {} passed in", field));
        }
        assert!(app.cluster.actions_for(Verb::Create, "environments").is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_malformed_json_fields() {
        let app = app(FakeClientBuilder::new()).await;

        let mut fields = without("count_capacity");
        fields.push(("count_capacity", r#"{"t1":"five"}"#));
        let (status, body) = app
            .send(form(Method::POST, "/a/environment/create", ADMIN, &fields))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "error parsing count_capacity");
        assert!(app.cluster.actions_for(Verb::Create, "environments").is_empty());
    }

    #[tokio::test]
    async fn test_create_requires_permission() {
        let app = app(FakeClientBuilder::new()).await;

        let (status, body) = app
            .send(form(Method::POST, "/a/environment/create", AUDITOR, CREATE_FIELDS))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["status"], "forbidden");

        let (status, _) = app
            .send(form(Method::POST, "/a/environment/create", "bogus", CREATE_FIELDS))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(app.cluster.actions().is_empty());
    }

    #[tokio::test]
    async fn test_bodiless_requests_reach_the_handler() {
        let app = app(FakeClientBuilder::new().with_object(&lab("env-a")).unwrap()).await;

        let (status, body) = app
            .send(bodiless(Method::POST, "/a/environment/create", "bogus"))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["status"], "forbidden");

        let (status, body) = app
            .send(bodiless(Method::POST, "/a/environment/create", ADMIN))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "no display_name passed in");

        let (status, body) = app
            .send(bodiless(Method::POST, "/a/environment/env-a/available", ADMIN))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "start or end time not provided");

        // no fields means only the suffix is reset
        let (status, body) = app
            .send(bodiless(Method::PUT, "/a/environment/env-a/update", ADMIN))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "updated");

        let (_, body) = app.send(get("/a/environment/env-a", ADMIN)).await;
        assert_eq!(body["content"]["display_name"], "Lab1");
        assert_eq!(body["content"]["dnssuffix"], "");

        assert!(app.cluster.actions_for(Verb::Create, "environments").is_empty());
    }

    #[tokio::test]
    async fn test_list_projects_template_keys() {
        let app = app(
            FakeClientBuilder::new()
                .with_objects(&[lab("env-a"), lab("env-b")])
                .unwrap(),
        )
        .await;

        let (status, body) = app.send(get("/a/environment/list", AUDITOR)).await;
        assert_eq!(status, StatusCode::OK);

        let items = body["content"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        for item in items {
            assert_eq!(item["display_name"], "Lab1");
            assert_eq!(item["provider"], "aws");
            assert_eq!(item["template_mapping"], json!({"t1": {}}));
            assert!(item.get("dnssuffix").is_none());
            assert!(item.get("count_capacity").is_none());
        }
    }

    #[tokio::test]
    async fn test_list_empty_is_an_empty_array() {
        let app = app(FakeClientBuilder::new()).await;
        let (status, body) = app.send(get("/a/environment/list", ADMIN)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], json!([]));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let app = app(FakeClientBuilder::new()).await;
        let (status, body) = app.send(get("/a/environment/env-missing", ADMIN)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "notfound");
    }

    #[tokio::test]
    async fn test_update_merges_present_fields_and_overwrites_suffix() {
        let app = app(FakeClientBuilder::new().with_object(&lab("env-a")).unwrap()).await;

        let (status, body) = app
            .send(form(
                Method::PUT,
                "/a/environment/env-a/update",
                ADMIN,
                &[("display_name", "Lab2"), ("provider", ""), ("count_capacity", r#"{"t1":9}"#)],
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "updated", "message": ""}));

        let (_, body) = app.send(get("/a/environment/env-a", ADMIN)).await;
        let env = &body["content"];
        assert_eq!(env["display_name"], "Lab2");
        assert_eq!(env["provider"], "aws");
        assert_eq!(env["count_capacity"], json!({"t1": 9}));
        assert_eq!(env["dnssuffix"], "");
        assert_eq!(env["template_mapping"], json!({"t1": {"image": "ami-123"}}));
        assert_eq!(env["environment_specifics"], json!({"region": "us-east-1"}));
        assert_eq!(env["ws_endpoint"], "wss://x");
    }

    #[tokio::test]
    async fn test_update_is_idempotent() {
        let app = app(FakeClientBuilder::new().with_object(&lab("env-a")).unwrap()).await;
        let fields = [("display_name", "Lab2"), ("dnssuffix", "labs.internal")];

        app.send(form(Method::PUT, "/a/environment/env-a/update", ADMIN, &fields))
            .await;
        let (_, first) = app.send(get("/a/environment/env-a", ADMIN)).await;

        app.send(form(Method::PUT, "/a/environment/env-a/update", ADMIN, &fields))
            .await;
        let (_, second) = app.send(get("/a/environment/env-a", ADMIN)).await;

        assert_eq!(first["content"], second["content"]);
        assert_eq!(second["content"]["dnssuffix"], "labs.internal");
    }

    #[tokio::test]
    async fn test_update_errors() {
        let app = app(FakeClientBuilder::new().with_object(&lab("env-a")).unwrap()).await;

        let (status, _) = app
            .send(form(Method::PUT, "/a/environment/env-missing/update", ADMIN, &[("display_name", "x")]))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = app
            .send(form(Method::PUT, "/a/environment/env-a/update", ADMIN, &[("template_mapping", "[")]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "error parsing template_mapping");

        let (status, _) = app
            .send(form(Method::PUT, "/a/environment/env-a/update", AUDITOR, &[("display_name", "x")]))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        assert!(app.cluster.actions_for(Verb::Update, "environments").is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let app = app(FakeClientBuilder::new().with_object(&lab("env-a")).unwrap()).await;

        let (status, _) = app.send(delete("/a/environment/env-a", AUDITOR)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app.send(delete("/a/environment/env-a", ADMIN)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "env-a");

        let (status, _) = app.send(get("/a/environment/env-a", ADMIN)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_available() {
        let app = app(FakeClientBuilder::new().with_object(&lab("env-a")).unwrap()).await;
        let window = [
            ("start", "Fri Mar  1 09:00:00 UTC 2024"),
            ("end", "Fri Mar  1 17:00:00 UTC 2024"),
        ];

        let (status, body) = app
            .send(form(Method::POST, "/a/environment/env-a/available", ADMIN, &window))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], json!({"available_count": {"t1": 5}}));

        // listing environments alone is not enough
        let (status, _) = app
            .send(form(Method::POST, "/a/environment/env-a/available", AUDITOR, &window))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .send(form(Method::POST, "/a/environment/env-a/available", ADMIN, &window[..1]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "start or end time not provided");

        let (status, _) = app
            .send(form(
                Method::POST,
                "/a/environment/env-a/available",
                ADMIN,
                &[("start", "yesterday"), ("end", "today")],
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .send(form(Method::POST, "/a/environment/env-missing/available", ADMIN, &window))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = app(FakeClientBuilder::new()).await;
        let (status, body) = app.send(get("/a/nothing/here", ADMIN)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "notfound");
    }
}

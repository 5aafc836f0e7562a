#[cfg(test)]
mod goals_api_tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use goalserver::core::config::AppConfig;
    use goalserver::core::shared::state::AppState;
    use goalserver::goals::InMemoryGoalStore;
    use goalserver::main_module::build_router;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let state = AppState::new(AppConfig::default(), Arc::new(InMemoryGoalStore::new()));
        build_router(Arc::new(state))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_objective(app: &Router, body: Value) -> String {
        let (status, objective) =
            send(app, Method::POST, "/api/goals/objectives", Some(body)).await;
        assert_eq!(status, StatusCode::OK, "{objective}");
        objective["id"].as_str().unwrap().to_string()
    }

    async fn objective_progress(app: &Router, id: &str) -> u64 {
        let uri = format!("/api/goals/objectives/{id}");
        let (status, detail) = send(app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        detail["progress"].as_u64().unwrap()
    }

    /// The persisted value, as returned by the list endpoint without any read-side recompute.
    async fn stored_progress(app: &Router, id: &str) -> u64 {
        let (status, list) = send(app, Method::GET, "/api/goals/objectives", None).await;
        assert_eq!(status, StatusCode::OK);
        let objective = list
            .as_array()
            .unwrap()
            .iter()
            .find(|o| o["id"] == id)
            .unwrap();
        objective["progress"].as_u64().unwrap()
    }

    /// Creates a project with `total` top-level tasks, the first `done` completed.
    async fn project_with_tasks(app: &Router, done: usize, total: usize) -> String {
        let body = json!({"name": "Launch"});
        let (_, project) = send(app, Method::POST, "/api/projects", Some(body)).await;
        let project_id = project["id"].as_str().unwrap().to_string();
        for i in 0..total {
            let (status, _) = send(
                app,
                Method::POST,
                &format!("/api/projects/{project_id}/tasks"),
                Some(json!({"name": format!("task {i}"), "completed": i < done})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
        project_id
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "goalserver");
    }

    #[tokio::test]
    async fn test_connect_and_disconnect_project() {
        let app = app();
        let objective_id = create_objective(
            &app,
            json!({"name": "Ship the beta", "period": "Q3", "progress_source": "PROJECTS"}),
        )
        .await;
        let project_id = project_with_tasks(&app, 3, 4).await;
        let uri = format!("/api/goals/objectives/{objective_id}/connections");
        let link = json!({"connection_type": "project", "target_id": project_id});

        let (status, result) = send(&app, Method::POST, &uri, Some(link.clone())).await;
        assert_eq!(status, StatusCode::OK, "{result}");
        assert_eq!(result["progress"], 75);
        assert_eq!(objective_progress(&app, &objective_id).await, 75);

        let detail_uri = format!("/api/goals/objectives/{objective_id}");
        let (status, detail) = send(&app, Method::GET, &detail_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["linked_projects"], json!([project_id]));

        let (status, result) = send(&app, Method::DELETE, &uri, Some(link)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["progress"], 0);
        assert_eq!(objective_progress(&app, &objective_id).await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_connection_is_conflict() {
        let app = app();
        let objective_id = create_objective(
            &app,
            json!({"name": "Ship the beta", "period": "Q3", "progress_source": "PROJECTS"}),
        )
        .await;
        let project_id = project_with_tasks(&app, 1, 2).await;
        let uri = format!("/api/goals/objectives/{objective_id}/connections");
        let link = json!({"connection_type": "project", "target_id": project_id});

        let (status, _) = send(&app, Method::POST, &uri, Some(link.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, Method::POST, &uri, Some(link)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Connection already exists");
        assert_eq!(objective_progress(&app, &objective_id).await, 50);
    }

    #[tokio::test]
    async fn test_connection_errors() {
        let app = app();
        let objective_id = create_objective(&app, json!({"name": "Hire", "period": "2026"})).await;
        let project_id = project_with_tasks(&app, 0, 1).await;
        let uri = format!("/api/goals/objectives/{objective_id}/connections");

        let (status, _) = send(
            &app,
            Method::POST,
            &uri,
            Some(json!({"connection_type": "portfolio", "target_id": project_id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            &uri,
            Some(json!({"connection_type": "task", "target_id": uuid::Uuid::new_v4()})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let missing = format!("/api/goals/objectives/{}/connections", uuid::Uuid::new_v4());
        let (status, _) = send(
            &app,
            Method::POST,
            &missing,
            Some(json!({"connection_type": "project", "target_id": project_id})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            Method::DELETE,
            &uri,
            Some(json!({"connection_type": "project", "target_id": project_id})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_check_in_moves_objective_progress() {
        let app = app();
        let objective_id = create_objective(&app, json!({"name": "Grow", "period": "2026"})).await;
        let (status, kr) = send(
            &app,
            Method::POST,
            &format!("/api/goals/objectives/{objective_id}/key-results"),
            Some(json!({"name": "Customers", "start_value": 0.0, "target_value": 10.0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(kr["progress"], 0);
        let kr_id = kr["id"].as_str().unwrap().to_string();

        let (status, check_in) = send(
            &app,
            Method::POST,
            &format!("/api/goals/key-results/{kr_id}/check-in"),
            Some(json!({"new_value": 5.0, "note": "halfway"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(check_in["previous_value"], 0.0);
        assert_eq!(objective_progress(&app, &objective_id).await, 50);

        let (status, history) = send(
            &app,
            Method::GET,
            &format!("/api/goals/key-results/{kr_id}/history"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["new_value"], 5.0);
    }

    #[tokio::test]
    async fn test_manual_progress_survives_recalculation() {
        let app = app();
        let objective_id = create_objective(
            &app,
            json!({"name": "Culture", "period": "2026", "progress_source": "MANUAL"}),
        )
        .await;
        let (status, updated) = send(
            &app,
            Method::PUT,
            &format!("/api/goals/objectives/{objective_id}"),
            Some(json!({"progress": 40})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["progress"], 40);

        send(
            &app,
            Method::POST,
            &format!("/api/goals/objectives/{objective_id}/key-results"),
            Some(json!({"name": "Survey", "target_value": 10.0, "current_value": 10.0})),
        )
        .await;
        let (status, result) = send(
            &app,
            Method::POST,
            &format!("/api/goals/objectives/{objective_id}/recalculate"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["progress"], 40);

        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/api/goals/objectives/{objective_id}"),
            Some(json!({"progress": 140})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_children_roll_up_one_level() {
        let app = app();
        let parent_id = create_objective(
            &app,
            json!({"name": "Company", "period": "2026", "progress_source": "SUB_OBJECTIVES"}),
        )
        .await;
        for progress in [30, 45] {
            let child_id = create_objective(
                &app,
                json!({
                    "name": "Team",
                    "period": "2026",
                    "progress_source": "MANUAL",
                    "parent_id": parent_id
                }),
            )
            .await;
            send(
                &app,
                Method::PUT,
                &format!("/api/goals/objectives/{child_id}"),
                Some(json!({"progress": progress})),
            )
            .await;
        }
        assert_eq!(objective_progress(&app, &parent_id).await, 38);

        let (status, forest) = send(&app, Method::GET, "/api/goals/alignment", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(forest.as_array().unwrap().len(), 1);
        assert_eq!(forest[0]["children"].as_array().unwrap().len(), 2);

        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/api/goals/objectives/{parent_id}"),
            Some(json!({"parent_id": parent_id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_task_completion_updates_linked_objective() {
        let app = app();
        let objective_id = create_objective(
            &app,
            json!({"name": "Ship", "period": "Q3", "progress_source": "PROJECTS"}),
        )
        .await;
        let project_id = project_with_tasks(&app, 0, 2).await;
        send(
            &app,
            Method::POST,
            &format!("/api/goals/objectives/{objective_id}/connections"),
            Some(json!({"connection_type": "project", "target_id": project_id})),
        )
        .await;

        let tasks_uri = format!("/api/projects/{project_id}/tasks");
        let (_, tasks) = send(&app, Method::GET, &tasks_uri, None).await;
        let task_id = tasks[0]["id"].as_str().unwrap().to_string();
        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/api/tasks/{task_id}"),
            Some(json!({"completed": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(objective_progress(&app, &objective_id).await, 50);

        let summary_uri = format!("/api/projects/{project_id}");
        let (status, summary) = send(&app, Method::GET, &summary_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["completed_tasks"], 1);
        assert_eq!(summary["progress"], 50);
    }

    #[tokio::test]
    async fn test_project_link_refreshes_stored_parent() {
        let app = app();
        let parent_id = create_objective(
            &app,
            json!({"name": "Company", "period": "2026", "progress_source": "SUB_OBJECTIVES"}),
        )
        .await;
        let child_id = create_objective(
            &app,
            json!({
                "name": "Ship",
                "period": "2026",
                "progress_source": "PROJECTS",
                "parent_id": parent_id
            }),
        )
        .await;
        let project_id = project_with_tasks(&app, 3, 4).await;
        let uri = format!("/api/goals/objectives/{child_id}/connections");
        let link = json!({"connection_type": "project", "target_id": project_id});

        let (status, result) = send(&app, Method::POST, &uri, Some(link.clone())).await;
        assert_eq!(status, StatusCode::OK, "{result}");
        assert_eq!(result["progress"], 75);
        assert_eq!(stored_progress(&app, &child_id).await, 75);
        assert_eq!(stored_progress(&app, &parent_id).await, 75);

        let (status, dashboard) = send(&app, Method::GET, "/api/goals/dashboard", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dashboard["average_progress"], 75.0);

        let tasks_uri = format!("/api/projects/{project_id}/tasks");
        let (_, tasks) = send(&app, Method::GET, &tasks_uri, None).await;
        let open = tasks
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["completed"] == false)
            .unwrap();
        let task_uri = format!("/api/tasks/{}", open["id"].as_str().unwrap());
        let done = json!({"completed": true});
        let (status, _) = send(&app, Method::PUT, &task_uri, Some(done)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stored_progress(&app, &parent_id).await, 100);

        let (status, _) = send(&app, Method::DELETE, &uri, Some(link)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stored_progress(&app, &child_id).await, 0);
        assert_eq!(stored_progress(&app, &parent_id).await, 0);
    }

    #[tokio::test]
    async fn test_key_result_connections() {
        let app = app();
        let objective_id = create_objective(
            &app,
            json!({"name": "Ship the beta", "period": "Q3", "progress_source": "PROJECTS"}),
        )
        .await;
        let done_project = project_with_tasks(&app, 2, 2).await;
        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/goals/objectives/{objective_id}/connections"),
            Some(json!({"connection_type": "project", "target_id": done_project})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stored_progress(&app, &objective_id).await, 100);

        let (status, kr) = send(
            &app,
            Method::POST,
            &format!("/api/goals/objectives/{objective_id}/key-results"),
            Some(json!({"name": "Signups", "start_value": 0.0, "target_value": 10.0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let kr_id = kr["id"].as_str().unwrap().to_string();

        // a project linked only through the key result does not count for PROJECTS
        let open_project = project_with_tasks(&app, 0, 1).await;
        let uri = format!("/api/goals/key-results/{kr_id}/connections");
        let link = json!({"connection_type": "project", "target_id": open_project});
        let (status, result) = send(&app, Method::POST, &uri, Some(link.clone())).await;
        assert_eq!(status, StatusCode::OK, "{result}");
        assert_eq!(result["objective_id"], objective_id.as_str());
        assert_eq!(result["progress"], 100);
        assert_eq!(stored_progress(&app, &objective_id).await, 100);

        let (status, body) = send(&app, Method::POST, &uri, Some(link.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Connection already exists");

        let (status, result) = send(&app, Method::DELETE, &uri, Some(link.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["objective_id"], objective_id.as_str());
        assert_eq!(result["progress"], 100);

        let (status, _) = send(&app, Method::DELETE, &uri, Some(link.clone())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let missing = format!("/api/goals/key-results/{}/connections", uuid::Uuid::new_v4());
        let (status, body) = send(&app, Method::POST, &missing, Some(link)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Key result not found");
    }

    #[tokio::test]
    async fn test_unknown_objective_is_not_found() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/api/goals/objectives/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Objective not found");
    }
}

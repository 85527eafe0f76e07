mod helpers;

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};

use helpers::{FINANCEIRO, JUSTIFICATION, OPERACOES, RH, TI};

// ---------------------------------------------------------------------------
// Surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn healthz() {
    let app = helpers::test_app().await;
    let (status, _) = helpers::get_json(&app.router, "", "/healthz").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let app = helpers::test_app().await;

    let (status, _) = helpers::get_json(&app.router, "", "/api/requests").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = helpers::get_json(&app.router, "not-an-email", "/api/modules").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let app = helpers::test_app().await;
    let (status, body) =
        helpers::create_request(&app.router, "ghost@empresa.com", &["Compras"]).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");
}

#[tokio::test]
async fn modules_list_is_sorted_and_active_only() {
    let app = helpers::test_app().await;
    let (status, body) = helpers::get_json(&app.router, RH, "/api/modules").await;
    assert_eq!(status, StatusCode::OK);

    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 10);
    assert!(names.windows(2).all(|w| w[0] <= w[1]));
    assert!(!names.contains(&"Sistema Legado"));

    let auditoria = body
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["name"] == "Auditoria")
        .unwrap();
    assert_eq!(auditoria["allowed_departments"], serde_json::json!(["TI"]));
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn finance_user_denied_for_audit_module() {
    let app = helpers::test_app().await;

    let (status, body) = helpers::create_request(&app.router, FINANCEIRO, &["Auditoria"]).await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "DENIED");
    assert_eq!(
        body["message"],
        "Request denied. Reason: department not authorized for this module"
    );

    let id = body["request_id"].as_str().unwrap();
    let (_, detail) =
        helpers::get_json(&app.router, FINANCEIRO, &format!("/api/requests/{id}")).await;
    assert_eq!(
        detail["denial_reason"],
        "department not authorized for this module"
    );
    assert!(detail["expires_at"].is_null());
}

#[tokio::test]
async fn ti_user_two_modules_approved() {
    let app = helpers::test_app().await;

    let (status, body) = helpers::create_request(
        &app.router,
        TI,
        &["Gestão Financeira", "Relatórios Gerenciais"],
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "ACTIVE");
    assert_eq!(body["protocol"], "SOL-20250301-0001");
    assert_eq!(
        body["message"],
        "Request created successfully! Protocol: SOL-20250301-0001. Your access is already available!"
    );

    let id = body["request_id"].as_str().unwrap();
    let (_, detail) = helpers::get_json(&app.router, TI, &format!("/api/requests/{id}")).await;
    let expires: DateTime<Utc> = detail["expires_at"].as_str().unwrap().parse().unwrap();
    assert_eq!(expires, helpers::epoch() + Duration::days(180));
    assert_eq!(detail["history"].as_array().unwrap().len(), 1);
    assert_eq!(
        detail["history"][0]["description"],
        "Solicitação aprovada automaticamente"
    );
    assert_eq!(
        helpers::request_module_names(&app.router, TI, id).await,
        vec!["Gestão Financeira", "Relatórios Gerenciais"]
    );
}

#[tokio::test]
async fn mutually_incompatible_modules_denied() {
    let app = helpers::test_app().await;

    let (status, body) =
        helpers::create_request(&app.router, RH, &["Administrador RH", "Colaborador RH"]).await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "DENIED");
    assert_eq!(
        body["message"],
        "Request denied. Reason: incompatible with an already-active module"
    );
}

#[tokio::test]
async fn one_sided_incompatibility_applies_both_ways() {
    let app = helpers::test_app().await;

    // Aprovador Financeiro declares the conflict, requested second.
    let (_, body) =
        helpers::create_request(&app.router, FINANCEIRO, &["Solicitante Financeiro"]).await;
    assert_eq!(body["status"], "ACTIVE");
    let (_, body) =
        helpers::create_request(&app.router, FINANCEIRO, &["Aprovador Financeiro"]).await;
    assert_eq!(body["status"], "DENIED");

    // Declaring side already active, the other side requested.
    let (_, body) = helpers::create_request(&app.router, TI, &["Aprovador Financeiro"]).await;
    assert_eq!(body["status"], "ACTIVE");
    let (_, body) = helpers::create_request(&app.router, TI, &["Solicitante Financeiro"]).await;
    assert_eq!(body["status"], "DENIED");
}

#[tokio::test]
async fn placeholder_justification_rejected() {
    let app = helpers::test_app().await;
    let id = helpers::module_id(&app.router, "Compras").await;

    for justification in ["teste", "testeeeeeeeeeeeeeeeeeeeeee", "too short"] {
        let (status, body) = helpers::post_json(
            &app.router,
            TI,
            "/api/requests",
            serde_json::json!({ "module_ids": [id], "justification": justification }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{justification}: {body}");
    }
}

#[tokio::test]
async fn module_count_bounds() {
    let app = helpers::test_app().await;

    let (status, body) = helpers::create_request(&app.router, TI, &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("between 1 and 3"));

    let (status, _) = helpers::create_request(
        &app.router,
        TI,
        &["Compras", "Auditoria", "Gestão de Estoque", "Portal do Colaborador"],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_module_rejected_and_nothing_stored() {
    let app = helpers::test_app().await;

    let (status, body) = helpers::post_json(
        &app.router,
        TI,
        "/api/requests",
        serde_json::json!({
            "module_ids": [uuid::Uuid::new_v4()],
            "justification": JUSTIFICATION,
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "modules not found");
    assert_eq!(app.store.request_count().await, 0);
}

#[tokio::test]
async fn duplicate_active_request_rejected() {
    let app = helpers::test_app().await;
    helpers::create_request(&app.router, TI, &["Compras"]).await;

    let (status, body) = helpers::create_request(&app.router, TI, &["Compras"]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "active request already exists for module: Compras"
    );
}

#[tokio::test]
async fn elevated_department_exceeds_default_quota() {
    let app = helpers::test_app().await;

    for modules in [
        &["Portal do Colaborador", "Relatórios Gerenciais", "Gestão Financeira"][..],
        &["Aprovador Financeiro", "Administrador RH", "Gestão de Estoque"][..],
        &["Compras", "Auditoria"][..],
    ] {
        let (_, body) = helpers::create_request(&app.router, TI, modules).await;
        assert_eq!(body["status"], "ACTIVE", "{body}");
    }

    let (_, body) = helpers::get_json(&app.router, TI, "/api/requests?status=ACTIVE").await;
    assert_eq!(body["total"], 3);
}

#[tokio::test]
async fn default_quota_limits_other_departments() {
    let app = helpers::test_app().await;

    let (_, body) = helpers::create_request(
        &app.router,
        OPERACOES,
        &["Portal do Colaborador", "Relatórios Gerenciais", "Solicitante Financeiro"],
    )
    .await;
    assert_eq!(body["status"], "ACTIVE", "{body}");
    let (_, body) =
        helpers::create_request(&app.router, OPERACOES, &["Colaborador RH", "Gestão de Estoque"])
            .await;
    assert_eq!(body["status"], "ACTIVE", "{body}");

    let (_, body) = helpers::create_request(&app.router, OPERACOES, &["Compras"]).await;
    assert_eq!(body["status"], "DENIED");
    assert_eq!(
        body["message"],
        "Request denied. Reason: active module limit reached"
    );
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_filters_and_pages() {
    let app = helpers::test_app().await;

    helpers::create_request(&app.router, FINANCEIRO, &["Auditoria"]).await;
    app.clock.advance(Duration::minutes(5));
    helpers::create_request(&app.router, FINANCEIRO, &["Gestão Financeira"]).await;
    app.clock.advance(Duration::minutes(5));
    helpers::create_request(&app.router, FINANCEIRO, &["Portal do Colaborador"]).await;
    helpers::create_request(&app.router, TI, &["Compras"]).await;

    let (status, body) = helpers::get_json(&app.router, FINANCEIRO, "/api/requests").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["page"], 0);
    assert_eq!(body["size"], 10);
    assert_eq!(body["items"][0]["modules"][0]["name"], "Portal do Colaborador");
    assert_eq!(body["items"][2]["modules"][0]["name"], "Auditoria");

    let (_, body) =
        helpers::get_json(&app.router, FINANCEIRO, "/api/requests?status=DENIED").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["status"], "DENIED");

    let (_, body) = helpers::get_json(&app.router, FINANCEIRO, "/api/requests?text=audit").await;
    assert_eq!(body["total"], 1);

    let (_, body) =
        helpers::get_json(&app.router, FINANCEIRO, "/api/requests?text=sol-20250301-0002").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["protocol"], "SOL-20250301-0002");

    let (_, body) = helpers::get_json(&app.router, FINANCEIRO, "/api/requests?urgent=true").await;
    assert_eq!(body["total"], 0);

    let (_, body) =
        helpers::get_json(&app.router, FINANCEIRO, "/api/requests?page=1&size=2").await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["modules"][0]["name"], "Auditoria");

    let (status, _) =
        helpers::get_json(&app.router, FINANCEIRO, "/api/requests?status=PENDING").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_page_past_the_end_is_empty() {
    let app = helpers::test_app().await;
    helpers::create_request(&app.router, TI, &["Compras"]).await;

    let (status, body) = helpers::get_json(
        &app.router,
        TI,
        "/api/requests?page=9223372036854775807&size=10",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn list_date_range() {
    let app = helpers::test_app().await;

    helpers::create_request(&app.router, TI, &["Compras"]).await;
    app.clock.advance(Duration::days(2));
    helpers::create_request(&app.router, TI, &["Auditoria"]).await;

    let (_, body) = helpers::get_json(
        &app.router,
        TI,
        "/api/requests?from=2025-03-02T00:00:00Z&to=2025-03-31T00:00:00Z",
    )
    .await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["modules"][0]["name"], "Auditoria");
}

#[tokio::test]
async fn detail_hidden_from_other_users() {
    let app = helpers::test_app().await;
    let (_, body) = helpers::create_request(&app.router, TI, &["Compras"]).await;
    let id = body["request_id"].as_str().unwrap();

    let (status, _) = helpers::get_json(&app.router, RH, &format!("/api/requests/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = helpers::get_json(
        &app.router,
        TI,
        &format!("/api/requests/{}", uuid::Uuid::new_v4()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_active_request() {
    let app = helpers::test_app().await;
    let (_, body) = helpers::create_request(&app.router, TI, &["Compras", "Auditoria"]).await;
    let id = body["request_id"].as_str().unwrap();
    let path = format!("/api/requests/{id}/cancel");

    let (status, _) =
        helpers::put_json(&app.router, TI, &path, serde_json::json!({ "reason": "short" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = helpers::put_json(
        &app.router,
        TI,
        &path,
        serde_json::json!({ "reason": "Project was cancelled" }),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, detail) = helpers::get_json(&app.router, TI, &format!("/api/requests/{id}")).await;
    assert_eq!(detail["status"], "CANCELLED");
    assert_eq!(detail["cancellation_reason"], "Project was cancelled");
    assert_eq!(detail["history"].as_array().unwrap().len(), 2);
    assert_eq!(
        detail["history"][1]["description"],
        "Solicitação cancelada: Project was cancelled"
    );

    let (status, body) = helpers::put_json(
        &app.router,
        TI,
        &path,
        serde_json::json!({ "reason": "Project was cancelled" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "only active requests can be cancelled");

    // Access is gone, so the modules can be requested again.
    let (_, body) = helpers::create_request(&app.router, TI, &["Compras", "Auditoria"]).await;
    assert_eq!(body["status"], "ACTIVE");
}

#[tokio::test]
async fn cancel_by_other_user_is_not_found() {
    let app = helpers::test_app().await;
    let (_, body) = helpers::create_request(&app.router, TI, &["Compras"]).await;
    let id = body["request_id"].as_str().unwrap();

    let (status, _) = helpers::put_json(
        &app.router,
        RH,
        &format!("/api/requests/{id}/cancel"),
        serde_json::json!({ "reason": "Not my request at all" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Renew
// ---------------------------------------------------------------------------

#[tokio::test]
async fn renew_within_window() {
    let app = helpers::test_app().await;
    let (_, body) = helpers::create_request(&app.router, TI, &["Compras"]).await;
    let id = body["request_id"].as_str().unwrap().to_owned();
    let path = format!("/api/requests/{id}/renew");

    app.clock.advance(Duration::days(100));
    let (status, body) = helpers::post_json(&app.router, TI, &path, serde_json::json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "renewal only available within 30 days of expiration"
    );

    app.clock.set(helpers::epoch() + Duration::days(150));
    let (status, body) = helpers::post_json(&app.router, TI, &path, serde_json::json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "ACTIVE");
    assert_eq!(body["protocol"], "SOL-20250729-0002");

    let renewed = body["request_id"].as_str().unwrap();
    let (_, detail) =
        helpers::get_json(&app.router, TI, &format!("/api/requests/{renewed}")).await;
    assert_eq!(detail["origin_request_id"], id.as_str());
    assert_eq!(detail["justification"], JUSTIFICATION);
    assert_eq!(detail["urgent"], false);

    let (_, origin) = helpers::get_json(&app.router, TI, &format!("/api/requests/{id}")).await;
    assert_eq!(origin["status"], "ACTIVE");
}

#[tokio::test]
async fn renew_denied_request_rejected() {
    let app = helpers::test_app().await;
    let (_, body) = helpers::create_request(&app.router, FINANCEIRO, &["Auditoria"]).await;
    let id = body["request_id"].as_str().unwrap();

    let (status, body) = helpers::post_json(
        &app.router,
        FINANCEIRO,
        &format!("/api/requests/{id}/renew"),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "only active requests can be renewed");
}

//! Tests for the client portal.

use reqwest::StatusCode;
use serde_json::Value;

use feira::auth::Role;

use crate::common::{item, receivable, sale, spawn, FakeErp, TestApp};

async fn portal() -> TestApp {
    let mut erp = FakeErp {
        sales: vec![sale(1000, 7), sale(2000, 8)],
        receivables: vec![receivable(1, 7), receivable(2, 8)],
        ..FakeErp::default()
    };
    erp.items.insert(1000, vec![item(1)]);
    erp.items.insert(2000, vec![item(1)]);
    spawn(erp).await
}

async fn get_json(app: &TestApp, path: &str, token: &str) -> (StatusCode, Value) {
    let response = app.get(path, token).send().await.expect("should send");
    let status = response.status();
    (status, response.json().await.expect("should be json"))
}

#[tokio::test]
async fn purchases_are_scoped_to_the_caller() {
    let app = portal().await;
    let token = app.token(Role::Cliente, &[], Some(7));

    let (status, body) = get_json(&app, "/api/cliente/minhas-compras", &token).await;
    assert_eq!(status, StatusCode::OK);
    let data = body["data"].as_array().expect("should list");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["CODIGO"], 1000);
    assert!(data[0].get("NOME_CLIENTE").is_none());
}

#[tokio::test]
async fn foreign_orders_are_refused() {
    let app = portal().await;
    let token = app.token(Role::Cliente, &[], Some(7));

    let (status, body) = get_json(&app, "/api/cliente/minhas-compras/1000", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["QUANTIDADE"], 2.0);
    assert!(body["items"][0].get("CUSTO_REPOSICAO").is_none());

    let (status, body) = get_json(&app, "/api/cliente/minhas-compras/2000", &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], "Acesso negado a este orçamento.");

    let (status, _) = get_json(&app, "/api/cliente/minhas-compras/9999", &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = get_json(&app, "/api/cliente/minhas-compras/x", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn titles_and_dashboard() {
    let app = portal().await;
    let token = app.token(Role::Cliente, &[], Some(8));

    let (_, body) = get_json(&app, "/api/cliente/meus-titulos", &token).await;
    let data = body["data"].as_array().expect("should list");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["CODIGO_CLIENTE"], 8);

    let (_, body) = get_json(&app, "/api/cliente/dashboard", &token).await;
    assert_eq!(body["topProdutos"][0]["QUANTIDADE_TOTAL"], 42.0);
}

#[tokio::test]
async fn portal_requires_client_role_and_code() {
    let app = portal().await;

    let staff = app.token(Role::User, &["VIEW_RESUMO_VENDAS"], None);
    let (status, body) = get_json(&app, "/api/cliente/produtos-disponiveis", &staff).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], "Acesso restrito: apenas clientes.");

    let orphan = app.token(Role::Cliente, &[], None);
    let (status, body) = get_json(&app, "/api/cliente/minhas-compras", &orphan).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["error"]["message"],
        "Usuário não está associado a um cliente."
    );

    let admin = app.token(Role::Admin, &[], Some(7));
    let (status, _) = get_json(&app, "/api/cliente/produtos-disponiveis", &admin).await;
    assert_eq!(status, StatusCode::OK);
}

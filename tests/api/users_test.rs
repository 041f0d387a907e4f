//! Tests for account administration.

use reqwest::StatusCode;
use serde_json::{json, Value};

use feira::auth::Role;

use crate::common::{spawn, FakeErp};

#[tokio::test]
async fn create_update_list_delete() {
    let app = spawn(FakeErp::default()).await;
    let admin = app.token(Role::Admin, &[], None);

    let created = app
        .post("/api/users", &admin)
        .json(&json!({ "username": "loja7", "password": "abc123", "role": "cliente", "codigoCliente": 7 }))
        .send()
        .await
        .expect("should send");
    assert_eq!(created.status(), StatusCode::CREATED);
    let body: Value = created.json().await.expect("should be json");
    let id = body["userId"].as_i64().expect("should return id");

    let updated = app
        .put(&format!("/api/users/{id}"), &admin)
        .json(&json!({ "permissions": ["VIEW_FINANCEIRO"], "codigoCliente": null }))
        .send()
        .await
        .expect("should send");
    assert_eq!(updated.status(), StatusCode::OK);

    let users: Value = app
        .get("/api/users", &admin)
        .send()
        .await
        .expect("should send")
        .json()
        .await
        .expect("should be json");
    let listed = &users[0];
    assert_eq!(listed["username"], "loja7");
    assert_eq!(listed["role"], "cliente");
    assert!(listed["codigoCliente"].is_null());
    assert_eq!(listed["permissions"], json!(["VIEW_FINANCEIRO"]));
    assert!(listed.get("password").is_none());

    let deleted = app
        .http
        .delete(app.url(&format!("/api/users/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("should send");
    assert_eq!(deleted.status(), StatusCode::OK);

    let again = app
        .http
        .delete(app.url(&format!("/api/users/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("should send");
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rejects_bad_ids_roles_and_empty_patches() {
    let app = spawn(FakeErp::default()).await;
    let admin = app.token(Role::Admin, &[], None);

    let bad_id = app
        .put("/api/users/abc", &admin)
        .json(&json!({ "role": "user" }))
        .send()
        .await
        .expect("should send");
    assert_eq!(bad_id.status(), StatusCode::BAD_REQUEST);
    let body: Value = bad_id.json().await.expect("should be json");
    assert_eq!(body["error"]["message"], "ID de usuário inválido.");

    let bad_role = app
        .post("/api/users", &admin)
        .json(&json!({ "username": "x1", "password": "abc123", "role": "root" }))
        .send()
        .await
        .expect("should send");
    assert_eq!(bad_role.status(), StatusCode::BAD_REQUEST);

    let missing = app
        .post("/api/users", &admin)
        .json(&json!({ "username": "x1" }))
        .send()
        .await
        .expect("should send");
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let empty = app
        .put("/api/users/1", &admin)
        .json(&json!({}))
        .send()
        .await
        .expect("should send");
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn staff_cannot_manage_users() {
    let app = spawn(FakeErp::default()).await;
    let user = app.token(Role::User, &["VIEW_FINANCEIRO"], None);
    let response = app.get("/api/users", &user).send().await.expect("should send");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.expect("should be json");
    assert_eq!(
        body["error"]["message"],
        "Acesso restrito: apenas administradores."
    );
}

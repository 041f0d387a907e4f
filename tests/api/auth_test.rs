//! Tests for login, token verification and registration.

use reqwest::StatusCode;
use serde_json::{json, Value};

use feira::auth::{hash_password, Role};
use feira::erp::ClientAgreement;
use feira::store::NewUser;

use crate::common::{spawn, FakeErp, TestApp};

async fn seed(app: &TestApp, username: &str, role: Role, client: Option<i64>) {
    let password_hash = hash_password("segredo123".to_owned(), 4)
        .await
        .expect("should hash");
    app.store
        .create_user(&NewUser {
            username: username.to_owned(),
            password_hash,
            role,
            codigo_cliente: client,
            permissions: vec!["VIEW_RESUMO_VENDAS".to_owned()],
        })
        .await
        .expect("should create user");
}

async fn login(app: &TestApp, username: &str, password: &str) -> reqwest::Response {
    app.http
        .post(app.url("/api/login"))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("should send")
}

#[tokio::test]
async fn login_issues_a_token_that_verifies() {
    let app = spawn(FakeErp::default()).await;
    seed(&app, "joana", Role::User, None).await;

    let response = login(&app, "joana", "segredo123").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("should be json");
    assert_eq!(body["message"], "Login realizado com sucesso!");
    assert_eq!(body["user"]["username"], "joana");
    assert_eq!(body["user"]["permissions"][0], "VIEW_RESUMO_VENDAS");

    let token = body["token"].as_str().expect("should carry token");
    let verified: Value = app
        .get("/api/verify-token", token)
        .send()
        .await
        .expect("should send")
        .json()
        .await
        .expect("should be json");
    assert_eq!(verified["valid"], true);
    assert_eq!(verified["user"]["role"], "user");
}

#[tokio::test]
async fn unknown_user_and_wrong_password_look_the_same() {
    let app = spawn(FakeErp::default()).await;
    seed(&app, "joana", Role::User, None).await;

    let wrong = login(&app, "joana", "errada").await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    let wrong: Value = wrong.json().await.expect("should be json");

    let unknown = login(&app, "ninguem", "segredo123").await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    let unknown: Value = unknown.json().await.expect("should be json");

    assert_eq!(wrong, unknown);
    assert_eq!(wrong["error"]["message"], "Usuário ou senha inválidos.");
}

#[tokio::test]
async fn login_requires_both_fields() {
    let app = spawn(FakeErp::default()).await;
    let response = app
        .http
        .post(app.url("/api/login"))
        .json(&json!({ "password": "x" }))
        .send()
        .await
        .expect("should send");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("should be json");
    assert_eq!(body["error"]["message"], "O nome de usuário é obrigatório.");
}

#[tokio::test]
async fn client_login_carries_agreement() {
    let mut erp = FakeErp::default();
    erp.agreements.insert(
        77,
        ClientAgreement {
            convenio_desconto: 5.0,
            apelido: Some("MERCADINHO".to_owned()),
        },
    );
    let app = spawn(erp).await;
    seed(&app, "mercadinho", Role::Cliente, Some(77)).await;

    let body: Value = login(&app, "mercadinho", "segredo123")
        .await
        .json()
        .await
        .expect("should be json");
    assert_eq!(body["user"]["codigoCliente"], 77);
    assert_eq!(body["user"]["convenioDesconto"], 5.0);
    assert_eq!(body["user"]["apelido"], "MERCADINHO");
}

#[tokio::test]
async fn client_login_survives_erp_failure() {
    let app = spawn(FakeErp {
        agreement_fails: true,
        ..FakeErp::default()
    })
    .await;
    seed(&app, "mercadinho", Role::Cliente, Some(77)).await;

    let response = login(&app, "mercadinho", "segredo123").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("should be json");
    assert_eq!(body["user"]["convenioDesconto"], 0.0);
    assert!(body["user"]["apelido"].is_null());
}

#[tokio::test]
async fn missing_token_is_401_and_bad_token_is_403() {
    let app = spawn(FakeErp::default()).await;

    let missing = app
        .http
        .get(app.url("/api/verify-token"))
        .send()
        .await
        .expect("should send");
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let forged = app
        .get("/api/verify-token", "not.a.token")
        .send()
        .await
        .expect("should send");
    assert_eq!(forged.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn register_is_admin_only_and_validates() {
    let app = spawn(FakeErp::default()).await;
    let admin = app.token(Role::Admin, &[], None);
    let user = app.token(Role::User, &[], None);

    let denied = app
        .post("/api/admin/register", &user)
        .json(&json!({ "username": "novo", "password": "segredo123" }))
        .send()
        .await
        .expect("should send");
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let bad_name = app
        .post("/api/admin/register", &admin)
        .json(&json!({ "username": "a.b", "password": "segredo123" }))
        .send()
        .await
        .expect("should send");
    assert_eq!(bad_name.status(), StatusCode::BAD_REQUEST);

    let short = app
        .post("/api/admin/register", &admin)
        .json(&json!({ "username": "novo", "password": "123" }))
        .send()
        .await
        .expect("should send");
    assert_eq!(short.status(), StatusCode::BAD_REQUEST);

    let created = app
        .post("/api/admin/register", &admin)
        .json(&json!({ "username": "novo", "password": "segredo123" }))
        .send()
        .await
        .expect("should send");
    assert_eq!(created.status(), StatusCode::CREATED);
    let body: Value = created.json().await.expect("should be json");
    assert_eq!(body["role"], "user");
    assert_eq!(body["permissions"], json!([]));

    let duplicate = app
        .post("/api/admin/register", &admin)
        .json(&json!({ "username": "novo", "password": "segredo123" }))
        .send()
        .await
        .expect("should send");
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn usernames_are_taken_exactly_as_sent() {
    let app = spawn(FakeErp::default()).await;
    seed(&app, "joana", Role::User, None).await;

    let padded = login(&app, " joana ", "segredo123").await;
    assert_eq!(padded.status(), StatusCode::UNAUTHORIZED);

    let admin = app.token(Role::Admin, &[], None);
    let register = app
        .post("/api/admin/register", &admin)
        .json(&json!({ "username": " ana ", "password": "segredo123" }))
        .send()
        .await
        .expect("should send");
    assert_eq!(register.status(), StatusCode::BAD_REQUEST);
    assert!(app
        .store
        .find_user_by_username("ana")
        .await
        .expect("should read")
        .is_none());
}

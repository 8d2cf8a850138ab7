use crate::fixtures::test_app::TestApp;
use serde_json::Value;

async fn create_group(app: &TestApp, token: &str, name: &str, participants: &[&str]) -> String {
    let resp = app
        .auth_post("/chats", token)
        .json(&serde_json::json!({
            "tipo": "GROUP",
            "nome": name,
            "participantes": participants,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    json["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn only_admins_manage_participants() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("padm").await;
    let chat_id = create_group(
        &app,
        &tenant.admin.access_token,
        "Agenda",
        &[&tenant.member.user_id],
    )
    .await;

    // An ordinary member cannot add people.
    let resp = app
        .auth_post(
            &format!("/chats/{chat_id}/participantes"),
            &tenant.member.access_token,
        )
        .json(&serde_json::json!({ "userId": tenant.colleague.user_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    // The creator can.
    let resp = app
        .auth_post(
            &format!("/chats/{chat_id}/participantes"),
            &tenant.admin.access_token,
        )
        .json(&serde_json::json!({ "userId": tenant.colleague.user_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let added: Value = resp.json().await.unwrap();
    assert_eq!(added["userId"], tenant.colleague.user_id);
    assert_eq!(added["name"], tenant.colleague.name);
    assert_eq!(added["isAdmin"], false);
}

#[tokio::test]
async fn duplicate_add_conflicts() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("pdup").await;
    let chat_id = create_group(
        &app,
        &tenant.admin.access_token,
        "Plantao",
        &[&tenant.member.user_id],
    )
    .await;

    let resp = app
        .auth_post(
            &format!("/chats/{chat_id}/participantes"),
            &tenant.admin.access_token,
        )
        .json(&serde_json::json!({ "userId": tenant.member.user_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);
}

#[tokio::test]
async fn creator_cannot_be_removed() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("pcri").await;
    let chat_id = create_group(
        &app,
        &tenant.admin.access_token,
        "Direcao",
        &[&tenant.member.user_id],
    )
    .await;

    let resp = app
        .auth_delete(
            &format!("/chats/{chat_id}/participantes/{}", tenant.admin.user_id),
            &tenant.admin.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);
}

#[tokio::test]
async fn removed_member_loses_access_and_can_return() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("prem").await;
    let chat_id = create_group(
        &app,
        &tenant.admin.access_token,
        "Recepcao",
        &[&tenant.member.user_id],
    )
    .await;

    let resp = app
        .auth_delete(
            &format!("/chats/{chat_id}/participantes/{}", tenant.member.user_id),
            &tenant.admin.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["removed"], true);

    let resp = app
        .auth_get(&format!("/chats/{chat_id}"), &tenant.member.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let resp = app
        .auth_get("/chats", &tenant.member.access_token)
        .send()
        .await
        .unwrap();
    let chats: Value = resp.json().await.unwrap();
    assert!(
        !chats
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c["id"].as_str() == Some(&chat_id)),
        "Removed member should not see the chat in their list"
    );

    // Re-adding reactivates the old membership row.
    let resp = app
        .auth_post(
            &format!("/chats/{chat_id}/participantes"),
            &tenant.admin.access_token,
        )
        .json(&serde_json::json!({ "userId": tenant.member.user_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = app
        .auth_get(&format!("/chats/{chat_id}"), &tenant.member.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn members_cannot_remove_themselves() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("pself").await;
    let chat_id = create_group(
        &app,
        &tenant.admin.access_token,
        "Escala",
        &[&tenant.member.user_id],
    )
    .await;

    // Membership is admin-managed; there is no self-service leave.
    let resp = app
        .auth_delete(
            &format!("/chats/{chat_id}/participantes/{}", tenant.member.user_id),
            &tenant.member.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn private_pairs_are_fixed() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("pfix").await;

    let resp = app
        .auth_get(
            &format!("/chats/privado/{}", tenant.member.user_id),
            &tenant.admin.access_token,
        )
        .send()
        .await
        .unwrap();
    let private: Value = resp.json().await.unwrap();
    let chat_id = private["chat"]["id"].as_str().unwrap().to_string();

    let resp = app
        .auth_post(
            &format!("/chats/{chat_id}/participantes"),
            &tenant.admin.access_token,
        )
        .json(&serde_json::json!({ "userId": tenant.colleague.user_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);

    let resp = app
        .auth_delete(
            &format!("/chats/{chat_id}/participantes/{}", tenant.member.user_id),
            &tenant.admin.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);
}

#[tokio::test]
async fn unknown_users_cannot_be_added() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("punk").await;
    let chat_id = create_group(
        &app,
        &tenant.admin.access_token,
        "Cadastro",
        &[&tenant.member.user_id],
    )
    .await;

    let stranger = bson::oid::ObjectId::new().to_hex();
    let resp = app
        .auth_post(
            &format!("/chats/{chat_id}/participantes"),
            &tenant.admin.access_token,
        )
        .json(&serde_json::json!({ "userId": stranger }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);

    let resp = app
        .auth_post(
            &format!("/chats/{chat_id}/participantes"),
            &tenant.admin.access_token,
        )
        .json(&serde_json::json!({ "userId": "nao-e-um-id" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

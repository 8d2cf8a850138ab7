use crate::fixtures::test_app::TestApp;
use serde_json::Value;
use vitalis_services::dao::conversation::GENERAL_NAME;

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
async fn general_chat_is_shared_by_the_tenant() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("geral1").await;

    let resp = app
        .auth_get("/chats/geral", &tenant.admin.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let first: Value = resp.json().await.unwrap();
    assert_eq!(first["kind"], "GENERAL");
    assert_eq!(first["name"], GENERAL_NAME);
    assert_eq!(first["isActive"], true);

    // A second user resolves the same conversation, not a new one.
    let resp = app
        .auth_get("/chats/geral", &tenant.member.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let second: Value = resp.json().await.unwrap();
    assert_eq!(second["id"], first["id"]);

    // A different tenant gets its own general chat.
    let other_tenant = app.seed_tenant("geral2").await;
    let resp = app
        .auth_get("/chats/geral", &other_tenant.admin.access_token)
        .send()
        .await
        .unwrap();
    let other: Value = resp.json().await.unwrap();
    assert_ne!(other["id"], first["id"]);
}

#[tokio::test]
async fn concurrent_first_access_settles_on_one_general_chat() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("corrida").await;

    // Both requests race the creation; the unique index picks the winner
    // and the loser re-fetches it.
    let (a, b) = tokio::join!(
        app.auth_get("/chats/geral", &tenant.admin.access_token).send(),
        app.auth_get("/chats/geral", &tenant.member.access_token).send(),
    );
    let a: Value = a.unwrap().json().await.unwrap();
    let b: Value = b.unwrap().json().await.unwrap();
    assert_eq!(a["id"], b["id"]);
}

#[tokio::test]
async fn general_chat_enrolls_late_hires() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("late").await;

    // Created before the new hire exists.
    let resp = app
        .auth_get("/chats/geral", &tenant.admin.access_token)
        .send()
        .await
        .unwrap();
    let general: Value = resp.json().await.unwrap();
    let general_id = general["id"].as_str().unwrap();

    let hire = app
        .seed_extra_user(&tenant.tenant_id, "Novo Contratado", "dentista")
        .await;

    // First access back-fills the membership row.
    let resp = app
        .auth_get("/chats/geral", &hire.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let seen: Value = resp.json().await.unwrap();
    assert_eq!(seen["id"].as_str().unwrap(), general_id);

    // And the new hire can post right away.
    let resp = app
        .auth_post(
            &format!("/chats/{general_id}/mensagens"),
            &hire.access_token,
        )
        .json(&serde_json::json!({ "conteudo": "Bom dia!" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn private_chat_is_shared_by_the_pair() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("par").await;

    let resp = app
        .auth_get(
            &format!("/chats/privado/{}", tenant.member.user_id),
            &tenant.admin.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let first: Value = resp.json().await.unwrap();
    assert_eq!(first["chat"]["kind"], "PRIVATE");
    assert_eq!(first["messages"].as_array().unwrap().len(), 0);

    // Opened from the other side it is the same conversation.
    let resp = app
        .auth_get(
            &format!("/chats/privado/{}", tenant.admin.user_id),
            &tenant.member.access_token,
        )
        .send()
        .await
        .unwrap();
    let second: Value = resp.json().await.unwrap();
    assert_eq!(second["chat"]["id"], first["chat"]["id"]);
}

#[tokio::test]
async fn private_chat_with_yourself_is_rejected() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("selfpar").await;

    let resp = app
        .auth_get(
            &format!("/chats/privado/{}", tenant.admin.user_id),
            &tenant.admin.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);
}

#[tokio::test]
async fn cross_tenant_users_cannot_pair() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("cross1").await;
    let other_tenant = app.seed_tenant("cross2").await;

    // The counterpart must be an active user of the caller's tenant.
    let resp = app
        .auth_get(
            &format!("/chats/privado/{}", other_tenant.admin.user_id),
            &tenant.admin.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);
}

#[tokio::test]
async fn group_chat_lifecycle() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("grupo").await;

    let resp = app
        .auth_post("/chats", &tenant.admin.access_token)
        .json(&serde_json::json!({
            "tipo": "GROUP",
            "nome": "Equipe Clinica",
            "descricao": "Coordenacao do dia",
            "participantes": [tenant.member.user_id],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let created: Value = resp.json().await.unwrap();
    let chat_id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["kind"], "GROUP");
    assert_eq!(created["name"], "Equipe Clinica");
    assert_eq!(created["description"], "Coordenacao do dia");
    assert_eq!(created["createdBy"], tenant.admin.user_id);

    let participants = created["participants"].as_array().unwrap();
    assert_eq!(participants.len(), 2);
    let creator = participants
        .iter()
        .find(|p| p["userId"] == tenant.admin.user_id)
        .unwrap();
    assert_eq!(creator["isAdmin"], true);
    let member = participants
        .iter()
        .find(|p| p["userId"] == tenant.member.user_id)
        .unwrap();
    assert_eq!(member["isAdmin"], false);

    // Rename
    let resp = app
        .auth_patch(&format!("/chats/{chat_id}"), &tenant.admin.access_token)
        .json(&serde_json::json!({ "nome": "Equipe Nova" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["name"], "Equipe Nova");

    // Deactivate
    let resp = app
        .auth_delete(&format!("/chats/{chat_id}"), &tenant.admin.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let deleted: Value = resp.json().await.unwrap();
    assert_eq!(deleted["deleted"], true);

    // Gone from everyone's view afterwards.
    let resp = app
        .auth_get(&format!("/chats/{chat_id}"), &tenant.admin.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn only_admins_update_or_delete() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("gate").await;
    let chat_id = create_group(
        &app,
        &tenant.admin.access_token,
        "Plantao",
        &[&tenant.member.user_id],
    )
    .await;

    let resp = app
        .auth_patch(&format!("/chats/{chat_id}"), &tenant.member.access_token)
        .json(&serde_json::json!({ "nome": "Tomada" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = app
        .auth_delete(&format!("/chats/{chat_id}"), &tenant.member.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    // The general chat has no admins at all, so nobody can delete it.
    let resp = app
        .auth_get("/chats/geral", &tenant.admin.access_token)
        .send()
        .await
        .unwrap();
    let general: Value = resp.json().await.unwrap();
    let resp = app
        .auth_delete(
            &format!("/chats/{}", general["id"].as_str().unwrap()),
            &tenant.admin.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn membership_gates_visibility() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("vis").await;
    let chat_id = create_group(
        &app,
        &tenant.admin.access_token,
        "Reservado",
        &[&tenant.member.user_id],
    )
    .await;

    // Non-participants get the same 404 as a conversation that does not
    // exist, so membership never leaks.
    let resp = app
        .auth_get(&format!("/chats/{chat_id}"), &tenant.colleague.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let resp = app
        .auth_get(
            &format!("/chats/{chat_id}/mensagens"),
            &tenant.colleague.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let missing = bson::oid::ObjectId::new().to_hex();
    let resp = app
        .auth_get(&format!("/chats/{missing}"), &tenant.colleague.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn only_group_chats_are_created_directly() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("tipos").await;

    for tipo in ["GENERAL", "PRIVATE"] {
        let resp = app
            .auth_post("/chats", &tenant.admin.access_token)
            .json(&serde_json::json!({ "tipo": tipo, "nome": "Nao" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 422, "tipo {tipo} should be rejected");
    }

    // A group without a name is rejected too.
    let resp = app
        .auth_post("/chats", &tenant.admin.access_token)
        .json(&serde_json::json!({ "tipo": "GROUP" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);

    let resp = app
        .auth_post("/chats", &tenant.admin.access_token)
        .json(&serde_json::json!({ "tipo": "GROUP", "nome": "x".repeat(101) }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);
}

#[tokio::test]
async fn chat_list_uses_display_names() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("lista").await;

    app.auth_get("/chats/geral", &tenant.admin.access_token)
        .send()
        .await
        .unwrap();
    app.auth_get(
        &format!("/chats/privado/{}", tenant.member.user_id),
        &tenant.admin.access_token,
    )
    .send()
    .await
    .unwrap();

    let resp = app
        .auth_get("/chats", &tenant.admin.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let chats: Value = resp.json().await.unwrap();
    let chats = chats.as_array().unwrap();
    assert_eq!(chats.len(), 2);

    let general = chats.iter().find(|c| c["kind"] == "GENERAL").unwrap();
    assert_eq!(general["displayName"], GENERAL_NAME);

    // A private chat is listed under the counterpart's name on each side.
    let private = chats.iter().find(|c| c["kind"] == "PRIVATE").unwrap();
    assert_eq!(private["displayName"], tenant.member.name);

    let resp = app
        .auth_get("/chats", &tenant.member.access_token)
        .send()
        .await
        .unwrap();
    let chats: Value = resp.json().await.unwrap();
    let private = chats
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["kind"] == "PRIVATE")
        .unwrap();
    assert_eq!(private["displayName"], tenant.admin.name);
}

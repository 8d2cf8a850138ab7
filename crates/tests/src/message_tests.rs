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

async fn send_message(app: &TestApp, token: &str, chat_id: &str, content: &str) -> Value {
    let resp = app
        .auth_post(&format!("/chats/{chat_id}/mensagens"), token)
        .json(&serde_json::json!({ "conteudo": content }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200, "Failed to send {content:?}");
    resp.json().await.unwrap()
}

#[tokio::test]
async fn create_and_list_messages() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("msg1").await;
    let chat_id = create_group(
        &app,
        &tenant.admin.access_token,
        "Avisos",
        &[&tenant.member.user_id],
    )
    .await;

    for i in 1..=3 {
        send_message(
            &app,
            &tenant.admin.access_token,
            &chat_id,
            &format!("Mensagem {i}"),
        )
        .await;
    }

    let resp = app
        .auth_get(
            &format!("/chats/{chat_id}/mensagens"),
            &tenant.member.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["total"], 3);
    assert_eq!(page["page"], 1);
    assert_eq!(page["pages"], 1);

    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    // Oldest first within the page.
    assert_eq!(items[0]["content"], "Mensagem 1");
    assert_eq!(items[2]["content"], "Mensagem 3");

    // Sender identity is denormalized onto every message.
    assert_eq!(items[0]["senderId"], tenant.admin.user_id);
    assert_eq!(items[0]["senderName"], tenant.admin.name);
    assert_eq!(items[0]["senderRole"], "gestor");
    assert_eq!(items[0]["isEdited"], false);
    assert_eq!(items[0]["chatId"], chat_id);
}

#[tokio::test]
async fn pagination_slices_newest_first() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("msg2").await;
    let chat_id = create_group(
        &app,
        &tenant.admin.access_token,
        "Historico",
        &[&tenant.member.user_id],
    )
    .await;

    for i in 1..=5 {
        send_message(
            &app,
            &tenant.admin.access_token,
            &chat_id,
            &format!("Mensagem {i}"),
        )
        .await;
    }

    let contents_of = |page: &Value| -> Vec<String> {
        page["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["content"].as_str().unwrap().to_string())
            .collect()
    };

    // Page 1 is the newest slice, still oldest→newest inside the page.
    let resp = app
        .auth_get(
            &format!("/chats/{chat_id}/mensagens?limit=2"),
            &tenant.admin.access_token,
        )
        .send()
        .await
        .unwrap();
    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["total"], 5);
    assert_eq!(page["pages"], 3);
    assert_eq!(page["limit"], 2);
    assert_eq!(contents_of(&page), ["Mensagem 4", "Mensagem 5"]);

    let resp = app
        .auth_get(
            &format!("/chats/{chat_id}/mensagens?limit=2&page=2"),
            &tenant.admin.access_token,
        )
        .send()
        .await
        .unwrap();
    let page: Value = resp.json().await.unwrap();
    assert_eq!(contents_of(&page), ["Mensagem 2", "Mensagem 3"]);

    let resp = app
        .auth_get(
            &format!("/chats/{chat_id}/mensagens?limit=2&page=3"),
            &tenant.admin.access_token,
        )
        .send()
        .await
        .unwrap();
    let page: Value = resp.json().await.unwrap();
    assert_eq!(contents_of(&page), ["Mensagem 1"]);

    // Walking past the end is empty, not an error.
    let resp = app
        .auth_get(
            &format!("/chats/{chat_id}/mensagens?limit=2&page=4"),
            &tenant.admin.access_token,
        )
        .send()
        .await
        .unwrap();
    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn message_content_is_validated() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("msg3").await;
    let chat_id = create_group(
        &app,
        &tenant.admin.access_token,
        "Limites",
        &[&tenant.member.user_id],
    )
    .await;

    for bad in ["", "   "] {
        let resp = app
            .auth_post(
                &format!("/chats/{chat_id}/mensagens"),
                &tenant.admin.access_token,
            )
            .json(&serde_json::json!({ "conteudo": bad }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 422, "content {bad:?} should be rejected");
    }

    let too_long = "a".repeat(app.settings.chat.max_message_length + 1);
    let resp = app
        .auth_post(
            &format!("/chats/{chat_id}/mensagens"),
            &tenant.admin.access_token,
        )
        .json(&serde_json::json!({ "conteudo": too_long }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);
}

#[tokio::test]
async fn non_participants_cannot_send() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("msg4").await;
    let chat_id = create_group(
        &app,
        &tenant.admin.access_token,
        "Fechado",
        &[&tenant.member.user_id],
    )
    .await;

    let resp = app
        .auth_post(
            &format!("/chats/{chat_id}/mensagens"),
            &tenant.colleague.access_token,
        )
        .json(&serde_json::json!({ "conteudo": "Posso entrar?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn edits_are_sender_only_and_flagged() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("msg5").await;
    let chat_id = create_group(
        &app,
        &tenant.admin.access_token,
        "Correcoes",
        &[&tenant.member.user_id],
    )
    .await;

    let sent = send_message(&app, &tenant.admin.access_token, &chat_id, "Reuniao as 14h").await;
    let message_id = sent["id"].as_str().unwrap().to_string();
    assert_eq!(sent["isEdited"], false);
    assert!(sent["editedAt"].is_null());

    // Someone else cannot edit it.
    let resp = app
        .auth_patch(
            &format!("/chats/{chat_id}/mensagens/{message_id}"),
            &tenant.member.access_token,
        )
        .json(&serde_json::json!({ "conteudo": "Reuniao as 15h" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    // The sender can, and the edited pair flips together.
    let resp = app
        .auth_patch(
            &format!("/chats/{chat_id}/mensagens/{message_id}"),
            &tenant.admin.access_token,
        )
        .json(&serde_json::json!({ "conteudo": "Reuniao as 15h" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let edited: Value = resp.json().await.unwrap();
    assert_eq!(edited["content"], "Reuniao as 15h");
    assert_eq!(edited["isEdited"], true);
    assert!(edited["editedAt"].is_string());

    // History shows the corrected text in place.
    let resp = app
        .auth_get(
            &format!("/chats/{chat_id}/mensagens"),
            &tenant.member.access_token,
        )
        .send()
        .await
        .unwrap();
    let page: Value = resp.json().await.unwrap();
    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["content"], "Reuniao as 15h");
    assert_eq!(items[0]["isEdited"], true);

    // Clearing the text is not an edit.
    let resp = app
        .auth_patch(
            &format!("/chats/{chat_id}/mensagens/{message_id}"),
            &tenant.admin.access_token,
        )
        .json(&serde_json::json!({ "conteudo": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);

    let missing = bson::oid::ObjectId::new().to_hex();
    let resp = app
        .auth_patch(
            &format!("/chats/{chat_id}/mensagens/{missing}"),
            &tenant.admin.access_token,
        )
        .json(&serde_json::json!({ "conteudo": "Nada" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn attachments_ride_along() {
    let Some(app) = TestApp::spawn().await else { return };
    let tenant = app.seed_tenant("msg6").await;
    let chat_id = create_group(
        &app,
        &tenant.admin.access_token,
        "Exames",
        &[&tenant.member.user_id],
    )
    .await;

    // A message can be attachment-only.
    let resp = app
        .auth_post(
            &format!("/chats/{chat_id}/mensagens"),
            &tenant.admin.access_token,
        )
        .json(&serde_json::json!({
            "conteudo": "",
            "anexos": [{
                "fileName": "radiografia.png",
                "storedName": "a1b2c3-radiografia.png",
                "contentType": "image/png",
                "size": 48211,
                "url": "/uploads/a1b2c3-radiografia.png",
            }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let sent: Value = resp.json().await.unwrap();
    let files = sent["attachments"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["fileName"], "radiografia.png");
    assert_eq!(files[0]["contentType"], "image/png");
    assert_eq!(files[0]["size"], 48211);

    // They come back on history reads too.
    let resp = app
        .auth_get(
            &format!("/chats/{chat_id}/mensagens"),
            &tenant.member.access_token,
        )
        .send()
        .await
        .unwrap();
    let page: Value = resp.json().await.unwrap();
    let items = page["items"].as_array().unwrap();
    assert_eq!(items[0]["attachments"][0]["fileName"], "radiografia.png");
    assert_eq!(items[0]["attachments"][0]["url"], "/uploads/a1b2c3-radiografia.png");
}

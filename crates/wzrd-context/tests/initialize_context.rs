use rusqlite::Connection;
use wzrd_context::{
    create_conversation, create_messages, create_twin, initialize_chat_context, ContextError,
    NewConversation, NewTwin, DEFAULT_SYSTEM_PROMPT,
};
use wzrd_types::{ChatMessage, Role, Tools, TwinFeatures};

fn setup() -> Connection {
    let conn = Connection::open_in_memory().expect("failed to open db");
    wzrd_db::run_migrations(&conn).expect("failed to run migrations");
    conn
}

fn seed_twin(conn: &Connection, id: &str, name: &str) {
    create_twin(
        conn,
        &NewTwin {
            id: id.to_string(),
            name: name.to_string(),
            description: Some("inventor".to_string()),
            features: TwinFeatures {
                bio: Some("b".to_string()),
                lore: Some("l".to_string()),
                knowledge: Some("k".to_string()),
                ..Default::default()
            },
            ..Default::default()
        },
    )
    .expect("failed to create twin");
}

fn seed_conversation(conn: &Connection, id: &str, twin_id: Option<&str>) {
    create_conversation(
        conn,
        &NewConversation {
            id: id.to_string(),
            twin_id: twin_id.map(str::to_string),
            user_id: Some("user-1".to_string()),
            title: None,
        },
    )
    .expect("failed to create conversation");
}

#[test]
fn twin_from_conversation_seeds_persona_prompt() {
    let conn = setup();
    seed_twin(&conn, "twin-ada", "Ada");
    seed_conversation(&conn, "conv-1", Some("twin-ada"));
    create_messages(
        &conn,
        "conv-1",
        &[ChatMessage::user("hi"), ChatMessage::assistant("hello")],
    )
    .expect("failed to store messages");

    let init = initialize_chat_context(&conn, "conv-1", None, Tools::NotGiven, DEFAULT_SYSTEM_PROMPT)
        .expect("context should initialize");

    let messages = init.context.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].role, Role::System);
    assert!(messages[0]
        .content
        .starts_with("You are Ada, a digital twin with the following traits:"));
    assert_eq!(messages[1], ChatMessage::user("hi"));
    assert_eq!(init.twin.expect("twin should be returned").name, "Ada");
    assert_eq!(init.context.tools(), &Tools::NotGiven);
}

#[test]
fn explicit_twin_overrides_conversation_twin() {
    let conn = setup();
    seed_twin(&conn, "twin-ada", "Ada");
    seed_twin(&conn, "twin-grace", "Grace");
    seed_conversation(&conn, "conv-1", Some("twin-ada"));

    let init = initialize_chat_context(
        &conn,
        "conv-1",
        Some("twin-grace"),
        Tools::NotGiven,
        DEFAULT_SYSTEM_PROMPT,
    )
    .expect("context should initialize");

    assert_eq!(init.twin.map(|t| t.name).as_deref(), Some("Grace"));
    assert!(init.context.messages()[0].content.starts_with("You are Grace"));
}

#[test]
fn conversation_without_twin_uses_fallback_prompt() {
    let conn = setup();
    seed_conversation(&conn, "conv-1", None);

    let init = initialize_chat_context(&conn, "conv-1", None, Tools::NotGiven, DEFAULT_SYSTEM_PROMPT)
        .expect("context should initialize");

    assert!(init.twin.is_none());
    assert_eq!(
        init.context.messages(),
        &[ChatMessage::system(DEFAULT_SYSTEM_PROMPT)]
    );
}

#[test]
fn empty_fallback_leaves_history_untouched() {
    let conn = setup();
    seed_conversation(&conn, "conv-1", None);
    create_messages(&conn, "conv-1", &[ChatMessage::user("hi")]).expect("store");

    let init = initialize_chat_context(&conn, "conv-1", None, Tools::NotGiven, "")
        .expect("context should initialize");

    assert_eq!(init.context.messages(), &[ChatMessage::user("hi")]);
}

#[test]
fn stored_system_message_is_not_duplicated() {
    let conn = setup();
    seed_twin(&conn, "twin-ada", "Ada");
    seed_conversation(&conn, "conv-1", Some("twin-ada"));
    create_messages(
        &conn,
        "conv-1",
        &[ChatMessage::system("earlier rules"), ChatMessage::user("hi")],
    )
    .expect("store");

    let init = initialize_chat_context(&conn, "conv-1", None, Tools::NotGiven, DEFAULT_SYSTEM_PROMPT)
        .expect("context should initialize");

    let systems = init
        .context
        .messages()
        .iter()
        .filter(|m| m.role == Role::System)
        .count();
    assert_eq!(systems, 1);
    assert_eq!(init.context.system_prompt(), Some("earlier rules"));
}

#[test]
fn unknown_twin_degrades_to_fallback() {
    let conn = setup();
    seed_conversation(&conn, "conv-1", None);

    let init = initialize_chat_context(
        &conn,
        "conv-1",
        Some("twin-missing"),
        Tools::NotGiven,
        "fallback",
    )
    .expect("missing twin should not abort initialization");

    assert!(init.twin.is_none());
    assert_eq!(init.context.system_prompt(), Some("fallback"));
}

#[test]
fn missing_conversation_is_an_error() {
    let conn = setup();
    let err = initialize_chat_context(&conn, "ghost", None, Tools::NotGiven, DEFAULT_SYSTEM_PROMPT)
        .expect_err("missing conversation should fail");
    assert!(matches!(err, ContextError::ConversationNotFound(_)));
}

#[test]
fn tools_are_carried_into_context() {
    let conn = setup();
    seed_conversation(&conn, "conv-1", None);
    let tools = Tools::List(vec![serde_json::json!({ "name": "get_weather" })]);

    let init = initialize_chat_context(&conn, "conv-1", None, tools.clone(), "")
        .expect("context should initialize");
    assert_eq!(init.context.tools(), &tools);
}

#[test]
fn blank_twin_id_falls_back_to_conversation_twin() {
    let conn = setup();
    seed_twin(&conn, "twin-ada", "Ada");
    seed_conversation(&conn, "conv-1", Some("twin-ada"));

    for blank in ["", "   "] {
        let init = initialize_chat_context(
            &conn,
            "conv-1",
            Some(blank),
            Tools::NotGiven,
            "fallback",
        )
        .expect("context should initialize");

        assert_eq!(init.twin.as_ref().map(|t| t.name.as_str()), Some("Ada"));
        assert_ne!(init.context.system_prompt(), Some("fallback"));
    }
}

#[test]
fn undecodable_stored_message_is_skipped() {
    let conn = setup();
    seed_conversation(&conn, "conv-1", None);
    create_messages(&conn, "conv-1", &[ChatMessage::user("first")]).expect("store");
    conn.execute(
        "INSERT INTO messages (message_id, conversation_id, role, content_json)
         VALUES ('multipart', 'conv-1', 'user', ?1)",
        [r#"{"role":"user","content":[{"type":"text","text":"hi"}]}"#],
    )
    .expect("insert raw row");
    create_messages(&conn, "conv-1", &[ChatMessage::assistant("second")]).expect("store");

    let init = initialize_chat_context(&conn, "conv-1", None, Tools::NotGiven, "fallback")
        .expect("a bad row should not abort initialization");

    assert_eq!(
        init.context.messages(),
        &[
            ChatMessage::system("fallback"),
            ChatMessage::user("first"),
            ChatMessage::assistant("second"),
        ][..]
    );
}

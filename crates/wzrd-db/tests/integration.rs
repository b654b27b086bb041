use wzrd_db::{create_pool, run_migrations, DbRuntimeSettings};

#[test]
fn migrated_file_database_is_shared_across_connections() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("wzrd.db");
    let pool = create_pool(path.to_str().expect("utf-8 path"), DbRuntimeSettings::default())
        .expect("failed to create pool");

    {
        let conn = pool.get().expect("failed to get connection");
        let applied = run_migrations(&conn).expect("failed to run migrations");
        assert!(applied > 0);
        conn.execute(
            "INSERT INTO digital_twins (id, name) VALUES ('twin-1', 'Ada')",
            [],
        )
        .expect("failed to insert twin");
    }

    let other = pool.get().expect("failed to get second connection");
    let name: String = other
        .query_row(
            "SELECT name FROM digital_twins WHERE id = 'twin-1'",
            [],
            |row| row.get(0),
        )
        .expect("twin should be visible from another connection");
    assert_eq!(name, "Ada");

    let tables: Vec<String> = {
        let mut stmt = other
            .prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .expect("failed to prepare table query");
        stmt.query_map([], |row| row.get(0))
            .expect("failed to list tables")
            .map(|r| r.expect("failed to read table name"))
            .collect()
    };
    assert_eq!(
        tables,
        vec!["_wzrd_migrations", "conversations", "digital_twins", "messages"]
    );
}

#[test]
fn deleting_a_conversation_cascades_to_messages() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("cascade.db");
    let pool = create_pool(path.to_str().expect("utf-8 path"), DbRuntimeSettings::default())
        .expect("failed to create pool");
    let conn = pool.get().expect("failed to get connection");
    run_migrations(&conn).expect("failed to run migrations");

    conn.execute("INSERT INTO conversations (id) VALUES ('conv-1')", [])
        .expect("failed to insert conversation");
    conn.execute(
        "INSERT INTO messages (message_id, conversation_id, role, content_json)
         VALUES ('m-1', 'conv-1', 'user', '{\"role\":\"user\",\"content\":\"hi\"}')",
        [],
    )
    .expect("failed to insert message");

    conn.execute("DELETE FROM conversations WHERE id = 'conv-1'", [])
        .expect("failed to delete conversation");

    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
        .expect("failed to count messages");
    assert_eq!(remaining, 0);
}

//! Integration tests for UTF-8 round trips.

use sqlmagic::{Sql, Statement};
use tempfile::TempDir;

#[test]
fn test_sqlite_utf8_chinese_characters() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("utf8.db").display());
    let sql = Sql::connect(&url).unwrap();
    let connection = sql.create_connection(true).unwrap();

    connection
        .execute(&Statement::text(
            "CREATE TABLE utf8_test (id INTEGER PRIMARY KEY, name TEXT, description TEXT)",
        ))
        .unwrap();
    connection
        .execute(
            &Statement::text("INSERT INTO utf8_test (id, name, description) VALUES (?, ?, ?)")
                .with_param("id", 1)
                .with_param("name", "张三")
                .with_param("description", "这是中文描述"),
        )
        .unwrap();

    let rows = connection
        .fetch(&Statement::text("SELECT name, description FROM utf8_test WHERE id = 1"))
        .unwrap();
    assert_eq!(rows[0]["name"], "张三");
    assert_eq!(rows[0]["description"], "这是中文描述");
    sql.dispose();
}

/// Test that requires a running MySQL database.
/// Set TEST_MYSQL_URL environment variable to run this test.
#[tokio::test]
async fn test_mysql_utf8_chinese_characters() {
    let mysql_url = match std::env::var("TEST_MYSQL_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: TEST_MYSQL_URL not set");
            return;
        }
    };

    let sql = Sql::connect(&mysql_url).unwrap();
    let connection = sql.create_connection_async(true).await.unwrap();

    connection
        .execute_async(&Statement::text("DROP TABLE IF EXISTS sqlmagic_utf8_test"))
        .await
        .unwrap();
    connection
        .execute_async(&Statement::text(
            r#"CREATE TABLE sqlmagic_utf8_test (
                id INT PRIMARY KEY COMMENT '主键ID',
                name VARCHAR(100) COMMENT '用户名称',
                description TEXT COMMENT '详细描述'
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COMMENT='中文测试表'"#,
        ))
        .await
        .expect("Failed to create table");
    connection
        .execute_async(&Statement::text(
            "INSERT INTO sqlmagic_utf8_test (id, name, description) VALUES (1, '张三', '这是中文描述')",
        ))
        .await
        .expect("Failed to insert");

    let rows = connection
        .fetch_async(&Statement::text(
            "SELECT name, description FROM sqlmagic_utf8_test WHERE id = 1",
        ))
        .await
        .unwrap();
    assert_eq!(rows[0]["name"], "张三");
    assert_eq!(rows[0]["description"], "这是中文描述");

    let _ = connection
        .execute_async(&Statement::text("DROP TABLE sqlmagic_utf8_test"))
        .await;
    sql.dispose_async().await;
}

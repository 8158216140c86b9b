use sqlx::postgres::{PgPool, PgPoolOptions};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS nodes (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        scheme TEXT NOT NULL DEFAULT 'https',
        ip TEXT NOT NULL,
        port INT NOT NULL DEFAULT 8080,
        token TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS nests (
        id BIGSERIAL PRIMARY KEY,
        uuid UUID NOT NULL UNIQUE,
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS eggs (
        id BIGSERIAL PRIMARY KEY,
        uuid UUID NOT NULL UNIQUE,
        nest_id BIGINT NOT NULL REFERENCES nests(id),
        name TEXT NOT NULL,
        docker_image TEXT NOT NULL,
        startup TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS egg_variables (
        id BIGSERIAL PRIMARY KEY,
        egg_id BIGINT NOT NULL REFERENCES eggs(id),
        name TEXT NOT NULL,
        env_variable TEXT NOT NULL,
        default_value TEXT NOT NULL DEFAULT '',
        user_editable BOOLEAN NOT NULL DEFAULT TRUE,
        required BOOLEAN NOT NULL DEFAULT FALSE
    )",
    "CREATE TABLE IF NOT EXISTS servers (
        id BIGSERIAL PRIMARY KEY,
        uuid UUID NOT NULL UNIQUE,
        uuid_short TEXT NOT NULL UNIQUE,
        external_id TEXT UNIQUE,
        owner_id BIGINT NOT NULL,
        node_id BIGINT NOT NULL REFERENCES nodes(id),
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        allocation_id BIGINT NOT NULL,
        nest_id BIGINT NOT NULL REFERENCES nests(id),
        egg_id BIGINT NOT NULL REFERENCES eggs(id),
        startup TEXT NOT NULL,
        image TEXT NOT NULL,
        memory BIGINT NOT NULL,
        swap BIGINT NOT NULL,
        disk BIGINT NOT NULL,
        io BIGINT NOT NULL DEFAULT 500,
        cpu BIGINT NOT NULL,
        threads TEXT,
        oom_disabled BOOLEAN NOT NULL DEFAULT TRUE,
        database_limit BIGINT,
        allocation_limit BIGINT,
        backup_limit BIGINT,
        installed SMALLINT NOT NULL DEFAULT 0,
        suspended BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS allocations (
        id BIGSERIAL PRIMARY KEY,
        node_id BIGINT NOT NULL REFERENCES nodes(id),
        ip TEXT NOT NULL,
        port INT NOT NULL,
        server_id BIGINT REFERENCES servers(id),
        UNIQUE (node_id, ip, port)
    )",
    "CREATE TABLE IF NOT EXISTS server_variables (
        server_id BIGINT NOT NULL REFERENCES servers(id),
        variable_id BIGINT NOT NULL REFERENCES egg_variables(id),
        variable_value TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (server_id, variable_id)
    )",
    "CREATE TABLE IF NOT EXISTS databases (
        id BIGSERIAL PRIMARY KEY,
        server_id BIGINT NOT NULL REFERENCES servers(id),
        database_host_id BIGINT NOT NULL,
        database TEXT NOT NULL,
        username TEXT NOT NULL,
        remote TEXT NOT NULL DEFAULT '%',
        password TEXT NOT NULL,
        max_connections INT,
        UNIQUE (database_host_id, database)
    )",
    "CREATE TABLE IF NOT EXISTS mounts (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        source TEXT NOT NULL,
        target TEXT NOT NULL,
        read_only BOOLEAN NOT NULL DEFAULT FALSE
    )",
    "CREATE TABLE IF NOT EXISTS mount_server (
        server_id BIGINT NOT NULL REFERENCES servers(id),
        mount_id BIGINT NOT NULL REFERENCES mounts(id),
        PRIMARY KEY (server_id, mount_id)
    )",
];

pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

/// Creates missing tables. Existing tables are left untouched.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(*statement).execute(pool).await?;
    }
    tracing::info!(tables = SCHEMA.len(), "database schema ready");
    Ok(())
}

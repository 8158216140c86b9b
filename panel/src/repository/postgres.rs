use super::{DatabaseStore, MountStore, PowerActionScope, ServerStore};
use crate::error::{PanelError, PanelResult};
use crate::models::{
    Allocation, Database, Egg, Mount, Nest, Node, Relation, RelationData, Server, ServerVariable,
};
use async_trait::async_trait;
use sqlx::PgExecutor;
use sqlx::postgres::PgPool;
use uuid::Uuid;

const SERVER_COLUMNS: &str = "id, uuid, uuid_short, external_id, owner_id, node_id, name, \
    description, allocation_id, nest_id, egg_id, startup, image, memory, swap, disk, io, cpu, \
    threads, oom_disabled, database_limit, allocation_limit, backup_limit, installed, suspended, \
    created_at, updated_at";

const ALLOCATION_COLUMNS: &str = "id, node_id, ip, port, server_id";

const DATABASE_COLUMNS: &str =
    "id, server_id, database_host_id, database, username, remote, password, max_connections";

/// Postgres-backed store shared by the repository and the services.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Fails when fewer allocations were claimed than requested, which means
/// another server took one after validation. Returning the error drops the
/// open transaction.
fn ensure_claimed(field: &str, requested: &[i64], claimed: u64) -> PanelResult<()> {
    if claimed == requested.len() as u64 {
        return Ok(());
    }
    tracing::warn!(field, ?requested, claimed, "allocation claimed concurrently, rolling back");
    Err(PanelError::validation(
        field,
        "an allocation was assigned to another server in the meantime",
    ))
}

async fn write_server<'e, E>(executor: E, server: &Server) -> PanelResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        "UPDATE servers SET external_id = $2, owner_id = $3, node_id = $4, name = $5, \
         description = $6, allocation_id = $7, nest_id = $8, egg_id = $9, startup = $10, \
         image = $11, memory = $12, swap = $13, disk = $14, io = $15, cpu = $16, threads = $17, \
         oom_disabled = $18, database_limit = $19, allocation_limit = $20, backup_limit = $21, \
         installed = $22, suspended = $23, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(server.id)
    .bind(&server.external_id)
    .bind(server.owner_id)
    .bind(server.node_id)
    .bind(&server.name)
    .bind(&server.description)
    .bind(server.allocation_id)
    .bind(server.nest_id)
    .bind(server.egg_id)
    .bind(&server.startup)
    .bind(&server.image)
    .bind(server.memory)
    .bind(server.swap)
    .bind(server.disk)
    .bind(server.io)
    .bind(server.cpu)
    .bind(&server.threads)
    .bind(server.oom_disabled)
    .bind(server.database_limit)
    .bind(server.allocation_limit)
    .bind(server.backup_limit)
    .bind(server.installed)
    .bind(server.suspended)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl ServerStore for PgStore {
    async fn find(&self, id: i64) -> PanelResult<Option<Server>> {
        let sql = format!("SELECT {} FROM servers WHERE id = $1", SERVER_COLUMNS);
        Ok(sqlx::query_as::<_, Server>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn find_by_identifier(&self, identifier: &str) -> PanelResult<Option<Server>> {
        let sql = format!(
            "SELECT {} FROM servers WHERE uuid_short = $1 OR uuid::text = $1 LIMIT 1",
            SERVER_COLUMNS
        );
        Ok(sqlx::query_as::<_, Server>(&sql)
            .bind(identifier)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn insert(&self, server: &Server, allocations: &[i64]) -> PanelResult<i64> {
        let mut tx = self.db.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO servers (uuid, uuid_short, external_id, owner_id, node_id, name, \
             description, allocation_id, nest_id, egg_id, startup, image, memory, swap, disk, io, \
             cpu, threads, oom_disabled, database_limit, allocation_limit, backup_limit, \
             installed, suspended) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
             $18, $19, $20, $21, $22, $23, $24) RETURNING id",
        )
        .bind(server.uuid)
        .bind(&server.uuid_short)
        .bind(&server.external_id)
        .bind(server.owner_id)
        .bind(server.node_id)
        .bind(&server.name)
        .bind(&server.description)
        .bind(server.allocation_id)
        .bind(server.nest_id)
        .bind(server.egg_id)
        .bind(&server.startup)
        .bind(&server.image)
        .bind(server.memory)
        .bind(server.swap)
        .bind(server.disk)
        .bind(server.io)
        .bind(server.cpu)
        .bind(&server.threads)
        .bind(server.oom_disabled)
        .bind(server.database_limit)
        .bind(server.allocation_limit)
        .bind(server.backup_limit)
        .bind(server.installed)
        .bind(server.suspended)
        .fetch_one(&mut *tx)
        .await?;

        let claimed = sqlx::query(
            "UPDATE allocations SET server_id = $1 WHERE id = ANY($2) AND server_id IS NULL",
        )
        .bind(id)
        .bind(allocations)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        ensure_claimed("allocation_id", allocations, claimed)?;

        tx.commit().await?;
        Ok(id)
    }

    async fn update(&self, server: &Server) -> PanelResult<()> {
        write_server(&self.db, server).await
    }

    async fn save_build(&self, server: &Server, add: &[i64], remove: &[i64]) -> PanelResult<()> {
        let mut tx = self.db.begin().await?;

        write_server(&mut *tx, server).await?;

        sqlx::query("UPDATE allocations SET server_id = NULL WHERE server_id = $1 AND id = ANY($2)")
            .bind(server.id)
            .bind(remove)
            .execute(&mut *tx)
            .await?;

        let claimed = sqlx::query(
            "UPDATE allocations SET server_id = $1 \
             WHERE id = ANY($2) AND node_id = $3 AND (server_id IS NULL OR server_id = $1)",
        )
        .bind(server.id)
        .bind(add)
        .bind(server.node_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        ensure_claimed("add_allocations", add, claimed)?;

        tx.commit().await?;
        Ok(())
    }

    async fn save_startup(&self, server: &Server, variables: &[(i64, String)]) -> PanelResult<()> {
        let mut tx = self.db.begin().await?;

        write_server(&mut *tx, server).await?;

        for (variable_id, value) in variables {
            sqlx::query(
                "INSERT INTO server_variables (server_id, variable_id, variable_value) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (server_id, variable_id) DO UPDATE SET variable_value = EXCLUDED.variable_value",
            )
            .bind(server.id)
            .bind(variable_id)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> PanelResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE allocations SET server_id = NULL WHERE server_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for table in ["server_variables", "databases", "mount_server"] {
            sqlx::query(&format!("DELETE FROM {} WHERE server_id = $1", table))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM servers WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn fetch_relation(
        &self,
        server: &Server,
        relation: Relation,
    ) -> PanelResult<RelationData> {
        let data = match relation {
            Relation::Allocation => {
                let sql = format!("SELECT {} FROM allocations WHERE id = $1", ALLOCATION_COLUMNS);
                let allocation = sqlx::query_as::<_, Allocation>(&sql)
                    .bind(server.allocation_id)
                    .fetch_optional(&self.db)
                    .await?
                    .ok_or_else(|| PanelError::not_found("allocation", server.allocation_id))?;
                RelationData::Allocation(allocation)
            }
            Relation::Allocations => {
                let sql = format!(
                    "SELECT {} FROM allocations WHERE server_id = $1 ORDER BY ip, port",
                    ALLOCATION_COLUMNS
                );
                let allocations = sqlx::query_as::<_, Allocation>(&sql)
                    .bind(server.id)
                    .fetch_all(&self.db)
                    .await?;
                RelationData::Allocations(allocations)
            }
            Relation::Egg => {
                let egg = self
                    .find_egg(server.egg_id)
                    .await?
                    .ok_or_else(|| PanelError::not_found("egg", server.egg_id))?;
                RelationData::Egg(egg)
            }
            Relation::Nest => {
                let nest = sqlx::query_as::<_, Nest>("SELECT id, uuid, name FROM nests WHERE id = $1")
                    .bind(server.nest_id)
                    .fetch_optional(&self.db)
                    .await?
                    .ok_or_else(|| PanelError::not_found("nest", server.nest_id))?;
                RelationData::Nest(nest)
            }
            Relation::Node => {
                let node = self
                    .find_node(server.node_id)
                    .await?
                    .ok_or_else(|| PanelError::not_found("node", server.node_id))?;
                RelationData::Node(node)
            }
            Relation::Variables => {
                let variables = sqlx::query_as::<_, ServerVariable>(
                    "SELECT ev.id AS variable_id, ev.name, ev.env_variable, ev.default_value, \
                     sv.variable_value AS server_value, ev.user_editable, ev.required \
                     FROM egg_variables ev \
                     LEFT JOIN server_variables sv ON sv.variable_id = ev.id AND sv.server_id = $1 \
                     WHERE ev.egg_id = $2 ORDER BY ev.id",
                )
                .bind(server.id)
                .bind(server.egg_id)
                .fetch_all(&self.db)
                .await?;
                RelationData::Variables(variables)
            }
            Relation::Databases => {
                let sql = format!(
                    "SELECT {} FROM databases WHERE server_id = $1 ORDER BY id",
                    DATABASE_COLUMNS
                );
                let databases = sqlx::query_as::<_, Database>(&sql)
                    .bind(server.id)
                    .fetch_all(&self.db)
                    .await?;
                RelationData::Databases(databases)
            }
            Relation::Mounts => {
                let mounts = sqlx::query_as::<_, Mount>(
                    "SELECT m.id, m.name, m.source, m.target, m.read_only FROM mounts m \
                     JOIN mount_server ms ON ms.mount_id = m.id \
                     WHERE ms.server_id = $1 ORDER BY m.id",
                )
                .bind(server.id)
                .fetch_all(&self.db)
                .await?;
                RelationData::Mounts(mounts)
            }
        };

        Ok(data)
    }

    async fn find_allocations(&self, ids: &[i64]) -> PanelResult<Vec<Allocation>> {
        let sql = format!(
            "SELECT {} FROM allocations WHERE id = ANY($1) ORDER BY id",
            ALLOCATION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Allocation>(&sql)
            .bind(ids)
            .fetch_all(&self.db)
            .await?)
    }

    async fn find_egg(&self, id: i64) -> PanelResult<Option<Egg>> {
        Ok(sqlx::query_as::<_, Egg>(
            "SELECT id, uuid, nest_id, name, docker_image, startup FROM eggs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?)
    }

    async fn find_node(&self, id: i64) -> PanelResult<Option<Node>> {
        Ok(
            sqlx::query_as::<_, Node>("SELECT id, name, scheme, ip, port, token FROM nodes WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.db)
                .await?,
        )
    }

    async fn external_id_in_use(
        &self,
        external_id: &str,
        except: Option<i64>,
    ) -> PanelResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM servers WHERE external_id = $1 \
             AND ($2::BIGINT IS NULL OR id <> $2))",
        )
        .bind(external_id)
        .bind(except)
        .fetch_one(&self.db)
        .await?)
    }

    async fn is_unique_uuid_combo(&self, uuid: Uuid, short: &str) -> PanelResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT NOT EXISTS(SELECT 1 FROM servers WHERE uuid = $1 OR uuid_short = $2)",
        )
        .bind(uuid)
        .bind(short)
        .fetch_one(&self.db)
        .await?)
    }

    async fn count_suspended(&self) -> PanelResult<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM servers WHERE suspended")
                .fetch_one(&self.db)
                .await?,
        )
    }

    async fn for_power_action(&self, scope: &PowerActionScope) -> PanelResult<Vec<Server>> {
        let sql = format!(
            "SELECT {} FROM servers WHERE {} ORDER BY id",
            SERVER_COLUMNS, POWER_ACTION_FILTER
        );
        Ok(sqlx::query_as::<_, Server>(&sql)
            .bind(&scope.servers)
            .bind(&scope.nodes)
            .fetch_all(&self.db)
            .await?)
    }

    async fn count_for_power_action(&self, scope: &PowerActionScope) -> PanelResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM servers WHERE {}", POWER_ACTION_FILTER);
        Ok(sqlx::query_scalar::<_, i64>(&sql)
            .bind(&scope.servers)
            .bind(&scope.nodes)
            .fetch_one(&self.db)
            .await?)
    }

    async fn for_node(&self, node_id: i64, limit: i64, offset: i64) -> PanelResult<Vec<Server>> {
        let sql = format!(
            "SELECT {} FROM servers WHERE node_id = $1 ORDER BY id LIMIT $2 OFFSET $3",
            SERVER_COLUMNS
        );
        Ok(sqlx::query_as::<_, Server>(&sql)
            .bind(node_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?)
    }
}

// Both lists empty selects everything; otherwise a server matches either list.
const POWER_ACTION_FILTER: &str = "(cardinality($1::BIGINT[]) = 0 AND cardinality($2::BIGINT[]) = 0) \
     OR id = ANY($1) OR node_id = ANY($2)";

#[async_trait]
impl DatabaseStore for PgStore {
    async fn find_database(&self, server_id: i64, id: i64) -> PanelResult<Option<Database>> {
        let sql = format!(
            "SELECT {} FROM databases WHERE id = $1 AND server_id = $2",
            DATABASE_COLUMNS
        );
        Ok(sqlx::query_as::<_, Database>(&sql)
            .bind(id)
            .bind(server_id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn database_name_taken(&self, host_id: i64, name: &str) -> PanelResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM databases WHERE database_host_id = $1 AND database = $2)",
        )
        .bind(host_id)
        .bind(name)
        .fetch_one(&self.db)
        .await?)
    }

    async fn insert_database(&self, database: &Database) -> PanelResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "INSERT INTO databases (server_id, database_host_id, database, username, remote, \
             password, max_connections) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(database.server_id)
        .bind(database.database_host_id)
        .bind(&database.database)
        .bind(&database.username)
        .bind(&database.remote)
        .bind(&database.password)
        .bind(database.max_connections)
        .fetch_one(&self.db)
        .await?)
    }

    async fn update_database_password(&self, id: i64, password: &str) -> PanelResult<()> {
        sqlx::query("UPDATE databases SET password = $2 WHERE id = $1")
            .bind(id)
            .bind(password)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn delete_database(&self, id: i64) -> PanelResult<()> {
        sqlx::query("DELETE FROM databases WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MountStore for PgStore {
    async fn find_mount(&self, id: i64) -> PanelResult<Option<Mount>> {
        Ok(sqlx::query_as::<_, Mount>(
            "SELECT id, name, source, target, read_only FROM mounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?)
    }

    async fn attach_mount(&self, server_id: i64, mount_id: i64) -> PanelResult<()> {
        sqlx::query(
            "INSERT INTO mount_server (server_id, mount_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(server_id)
        .bind(mount_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn detach_mount(&self, server_id: i64, mount_id: i64) -> PanelResult<bool> {
        let result = sqlx::query("DELETE FROM mount_server WHERE server_id = $1 AND mount_id = $2")
            .bind(server_id)
            .bind(mount_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

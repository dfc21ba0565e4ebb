use crate::entities::{
    audit_logs, file_entries, file_entry_models, notifications, share_jobs, shareable_links,
    transactions, users,
};
use sea_orm::sea_query::{IndexCreateStatement, TableCreateStatement};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, EntityName,
    EntityTrait, Schema,
};
use std::time::Duration;
use tracing::info;

pub async fn setup_database(db_url: &str) -> anyhow::Result<DatabaseConnection> {
    info!("📂 Database: {}", redact(db_url));

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

/// Hides the password part of a connection URL.
fn redact(db_url: &str) -> String {
    match (db_url.find("://"), db_url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}://***{}", &db_url[..scheme], &db_url[at..])
        }
        _ => db_url.to_string(),
    }
}

pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();

    if builder == DatabaseBackend::Postgres {
        info!("🔄 Running SQLx migrations for PostgreSQL...");
        sqlx::migrate!("./migrations")
            .run(db.get_postgres_connection_pool())
            .await?;
        return Ok(());
    }

    info!("🔄 Running SeaORM auto-migrations for SQLite/Other...");
    let schema = Schema::new(builder);

    // Parents before children for foreign keys
    let tables: Vec<(String, TableCreateStatement, Vec<IndexCreateStatement>)> = vec![
        entity_table(&schema, users::Entity),
        entity_table(&schema, file_entries::Entity),
        entity_table(&schema, file_entry_models::Entity),
        entity_table(&schema, transactions::Entity),
        entity_table(&schema, shareable_links::Entity),
        entity_table(&schema, share_jobs::Entity),
        entity_table(&schema, notifications::Entity),
        entity_table(&schema, audit_logs::Entity),
    ];

    for (name, table, indexes) in tables {
        db.execute(builder.build(&table)).await?;
        for index in indexes {
            db.execute(builder.build(&index)).await?;
        }
        info!("   - Table '{}' checked/created", name);
    }

    Ok(())
}

fn entity_table<E: EntityTrait>(
    schema: &Schema,
    entity: E,
) -> (String, TableCreateStatement, Vec<IndexCreateStatement>) {
    let table = schema
        .create_table_from_entity(entity)
        .if_not_exists()
        .to_owned();
    let indexes = schema
        .create_index_from_entity(entity)
        .into_iter()
        .map(|mut index| index.if_not_exists().to_owned())
        .collect();

    (entity.table_name().to_string(), table, indexes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_hides_credentials() {
        assert_eq!(
            redact("postgres://app:s3cret@db:5432/drive"),
            "postgres://***@db:5432/drive"
        );
        assert_eq!(redact("sqlite::memory:"), "sqlite::memory:");
    }
}

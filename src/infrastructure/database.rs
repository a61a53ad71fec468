use crate::entities::{file_thumbnails, files, share_links, virus_scans};
use anyhow::Context;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::env;
use std::time::Duration;
use tracing::info;

pub async fn setup_database() -> anyhow::Result<DatabaseConnection> {
    let db_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    info!("📂 Database: {}", redact(&db_url));

    let mut opt = ConnectOptions::new(&db_url);
    opt.max_connections(20)
        .min_connections(2)
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

/// Create missing tables from the entity definitions
pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    info!("🔄 Running auto-migrations...");

    // Parents before children for the foreign keys
    let stmts = vec![
        (
            "files",
            schema
                .create_table_from_entity(files::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "file_thumbnails",
            schema
                .create_table_from_entity(file_thumbnails::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "virus_scans",
            schema
                .create_table_from_entity(virus_scans::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "share_links",
            schema
                .create_table_from_entity(share_links::Entity)
                .if_not_exists()
                .to_owned(),
        ),
    ];

    for (name, stmt) in stmts {
        let stmt = builder.build(&stmt);
        db.execute(stmt)
            .await
            .with_context(|| format!("Failed to create table '{}'", name))?;
        info!("   - Table '{}' checked/created", name);
    }

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_files_owner ON files(owner)",
        "CREATE INDEX IF NOT EXISTS idx_files_expires_at ON files(expires_at)",
        "CREATE INDEX IF NOT EXISTS idx_files_object ON files(bucket_name, object_name)",
        "CREATE INDEX IF NOT EXISTS idx_file_thumbnails_file_id ON file_thumbnails(file_id)",
        "CREATE INDEX IF NOT EXISTS idx_share_links_file_id ON share_links(file_id)",
        "CREATE INDEX IF NOT EXISTS idx_share_links_expires_at ON share_links(expires_at)",
    ];

    for query in indexes {
        if let Err(e) = db
            .execute(sea_orm::Statement::from_string(builder, query.to_owned()))
            .await
        {
            tracing::warn!("   - Index creation warning: {} -> {}", query, e);
        }
    }

    Ok(())
}

/// Hide the password part of a connection URL
fn redact(db_url: &str) -> String {
    match url::Url::parse(db_url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("****"));
            parsed.to_string()
        }
        _ => db_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact() {
        assert_eq!(
            redact("postgres://app:secret@db:5432/files"),
            "postgres://app:****@db:5432/files"
        );
        assert_eq!(redact("sqlite::memory:"), "sqlite::memory:");
    }

    #[tokio::test]
    async fn test_migrations_are_repeatable() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        run_migrations(&db).await.unwrap();
        run_migrations(&db).await.unwrap();
    }
}

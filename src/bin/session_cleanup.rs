use fleetsync::{
    config::Config, db::connection::create_pool, repositories::session as session_repo,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    let pool = create_pool(&config.database_url).await?;

    let deleted = session_repo::cleanup_expired_sessions(&pool).await?;
    if deleted > 0 {
        tracing::info!("Deleted {} expired vendor sessions", deleted);
    }

    sqlx::query("VACUUM (ANALYZE) gp51_sessions")
        .execute(pool.as_ref())
        .await?;

    Ok(())
}

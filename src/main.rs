use std::{path::Path, sync::Arc};

use anyhow::Context;
use savoa::{
    SavoaResult,
    api_client::SavoaClient,
    catalog::{self, LessonLoader, LoadOutcome},
    config::Config,
    progress::ProgressSync,
    session::Session,
    storage::{LocalStore, SqliteStore},
};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt::SubscriberBuilder, prelude::*};

#[tokio::main]
async fn main() -> SavoaResult<()> {
    // Respect RUST_LOG if set, default to info for our crate and warn for deps.
    let default_filter = format!(
        "{}=info,reqwest=warn,h2=warn,sqlx=warn",
        env!("CARGO_PKG_NAME")
    );
    let env_filter = std::env::var("RUST_LOG").unwrap_or(default_filter);
    SubscriberBuilder::default()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .with_level(true)
        .pretty()
        .finish()
        .with(ErrorLayer::default())
        .init();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting Savoa sync");

    if Path::new(".env.local").exists() {
        dotenvy::from_filename(".env.local")?;
    } else if Path::new(".env").exists() {
        dotenvy::from_filename(".env")?;
    };
    let config = Config::load()?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    let store: Arc<dyn LocalStore> = Arc::new(
        SqliteStore::connect(&config.db_connection_string)
            .await
            .with_context(|| "Failed to open local store")?,
    );

    let client = SavoaClient::new(&config.api_base_url, config.request_timeout())?;
    let mut session = Session::new(store.clone(), client);
    session.hydrate().await?;
    if !session.is_authenticated() {
        match config.credentials() {
            Some((login, password)) => session.login(login, password).await?,
            None => tracing::warn!("no stored session and no credentials configured"),
        }
    }
    let client = session.client();
    tracing::info!(api_base = %client.base_url(), has_token = client.has_token(), "configured Savoa client");

    let sync = Arc::new(ProgressSync::load(store.clone(), Arc::new(client.clone())).await);
    sync.pull_and_merge().await;
    tracing::info!(
        lessons = sync.snapshot().len(),
        completed = sync.completed_count(),
        "progress synced"
    );

    match catalog::fetch_course(&client, &sync.snapshot()).await {
        Ok(weeks) => {
            for week in &weeks {
                let done = week.lessons.iter().filter(|l| l.completed).count();
                tracing::info!(
                    week = %week.id,
                    title = week.title.as_deref().unwrap_or(""),
                    done,
                    total = week.lessons.len(),
                    "course week"
                );
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to fetch course weeks"),
    }

    if let Some(lesson_id) = std::env::args().nth(1) {
        let loader = LessonLoader::new(client);
        match loader.load(&lesson_id, &sync.snapshot()).await? {
            LoadOutcome::Loaded(lesson) => {
                tracing::info!(
                    lesson = %lesson.id,
                    locked = lesson.is_locked,
                    completed = lesson.completed,
                    url = lesson.video.as_ref().map(|v| v.url.as_str()).unwrap_or("-"),
                    hls = lesson.video.as_ref().is_some_and(|v| v.is_hls),
                    "lesson loaded"
                );
            }
            LoadOutcome::Superseded => {}
        }
    }
    Ok(())
}

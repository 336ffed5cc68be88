//! Binary entrypoint: wires settings, the store, the background job fleet,
//! and the debug HTTP surface, then serves until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use finlit_news_engine::api::{create_router, AppState};
use finlit_news_engine::config::Settings;
use finlit_news_engine::ingest::providers::finnhub::FinnhubProvider;
use finlit_news_engine::ingest::providers::gnews::{GnewsProvider, TopicGroup};
use finlit_news_engine::ingest::providers::rss::RssProvider;
use finlit_news_engine::ingest::{self, feeds};
use finlit_news_engine::jobs::{self, JobScheduler};
use finlit_news_engine::lesson::OpenRouterGenerator;
use finlit_news_engine::metrics::Metrics;
use finlit_news_engine::pipeline::Pipeline;
use finlit_news_engine::scrape::HttpScraper;
use finlit_news_engine::store::supabase::SupabaseStore;
use finlit_news_engine::store::ArticleStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("finlit_news_engine=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::from_env()?;
    let metrics = Metrics::init(settings.batch_size);

    let store: Arc<dyn ArticleStore> = Arc::new(SupabaseStore::new(
        &settings.supabase_url,
        &settings.supabase_service_key,
    ));
    let scraper = Arc::new(HttpScraper::new());
    let generator = Arc::new(OpenRouterGenerator::new(
        settings.openrouter_api_key.clone(),
        settings.llm_model.clone(),
    ));
    let pipeline = Pipeline::new(store.clone(), scraper, generator)
        .with_staleness_secs(settings.stale_after_secs)
        .with_sweep_cap(settings.sweep_cap);

    let scheduler = Arc::new(JobScheduler::new());
    let batch_size = settings.batch_size;

    // Market-data feed: adaptive cadence, ingest then an immediate
    // processing pass so fresh items surface quickly.
    {
        let store = store.clone();
        let pipeline = pipeline.clone();
        let finnhub = Arc::new(FinnhubProvider::new(settings.finnhub_api_key.clone()));
        scheduler.spawn_adaptive(
            "finnhub-poll",
            Duration::from_secs(15 * 60),
            move || {
                let store = store.clone();
                let finnhub = finnhub.clone();
                let pipeline = pipeline.clone();
                async move {
                    ingest::run_source(store.as_ref(), finnhub.as_ref()).await;
                    pipeline.run_batch(batch_size).await;
                    Ok(())
                }
            },
            jobs::current_finnhub_interval,
        );
    }

    // News search: alternate topic groups to stay under the daily ceiling.
    {
        let store = store.clone();
        let world = Arc::new(GnewsProvider::new(
            settings.gnews_api_key.clone(),
            TopicGroup::World,
        ));
        let markets = Arc::new(GnewsProvider::new(
            settings.gnews_api_key.clone(),
            TopicGroup::Markets,
        ));
        let mut group = TopicGroup::World;
        scheduler.spawn_repeating("gnews-poll", Duration::from_secs(2 * 3600), move || {
            let provider = match group {
                TopicGroup::World => world.clone(),
                TopicGroup::Markets => markets.clone(),
            };
            group = group.other();
            let store = store.clone();
            async move {
                ingest::run_source(store.as_ref(), provider.as_ref()).await;
                Ok(())
            }
        });
    }

    // RSS fleet
    {
        let store = store.clone();
        let feed_list = feeds::load_feeds_default().context("loading feed config")?;
        let rss = Arc::new(RssProvider::new(feed_list));
        scheduler.spawn_repeating("rss-poll", Duration::from_secs(30 * 60), move || {
            let store = store.clone();
            let rss = rss.clone();
            async move {
                ingest::run_source(store.as_ref(), rss.as_ref()).await;
                Ok(())
            }
        });
    }

    // Scrape + generate for pending articles; the sweep runs inside.
    {
        let pipeline = pipeline.clone();
        scheduler.spawn_repeating("process-pending", Duration::from_secs(5 * 60), move || {
            let pipeline = pipeline.clone();
            async move {
                pipeline.run_batch(batch_size).await;
                Ok(())
            }
        });
    }

    let state = AppState {
        scheduler: scheduler.clone(),
    };
    let router = create_router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("binding {}", settings.bind_addr))?;
    tracing::info!(addr = %settings.bind_addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("http server")?;

    scheduler.shutdown().await;
    Ok(())
}

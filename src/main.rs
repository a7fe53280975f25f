use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use elo_tryon::{
    app_state::AppState,
    config::AppConfig,
    db,
    models::job::GarmentCategory,
    models::request::TryOnRequest,
    services::controller::TryOnController,
    services::ingestion::{FileImageSource, ImagePayload},
    services::media::DiskMediaSink,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let mut args = std::env::args().skip(1);
    let model_path = args.next().unwrap_or_else(|| usage());
    let garment_arg = args.next().unwrap_or_else(|| usage());
    let category = args
        .next()
        .map(|raw| {
            raw.parse::<GarmentCategory>()
                .expect("category must be one of: tops, bottoms, one-pieces")
        })
        .unwrap_or(GarmentCategory::Tops);

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing elo-tryon");

    // Register application metrics
    metrics::describe_counter!("tryon_jobs_total", "Total generation jobs submitted");
    metrics::describe_counter!("tryon_jobs_succeeded", "Total generation jobs that succeeded");
    metrics::describe_counter!("tryon_jobs_failed", "Total generation jobs that failed");
    metrics::describe_histogram!(
        "tryon_generation_seconds",
        "Time from job submission to a terminal state"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let state = AppState::new(db_pool.clone(), &config).expect("Failed to initialize services");

    // Demo identity: a fixed user can be supplied to keep history in one place.
    let user_id = std::env::var("ELO_USER_ID")
        .ok()
        .and_then(|raw| raw.parse::<Uuid>().ok())
        .unwrap_or_else(Uuid::new_v4);

    // First run starts on the free tier.
    if db::queries::remaining_tries(&db_pool, user_id)
        .await
        .expect("Failed to query entitlement")
        .is_none()
    {
        let granted = db::queries::grant_tries(&db_pool, user_id, 3)
            .await
            .expect("Failed to grant free tries");
        tracing::info!(%user_id, granted, "granted free-tier tries");
    }

    let (garment_url, device_garment) =
        if garment_arg.starts_with("http://") || garment_arg.starts_with("https://") {
            (Some(garment_arg), None)
        } else {
            let bytes = std::fs::read(&garment_arg).expect("Failed to read garment image");
            let payload =
                ImagePayload::from_bytes(bytes).expect("Garment image is not decodable");
            (None, Some(payload))
        };

    let controller = TryOnController::new(state.flow_deps());
    let mut updates = controller.subscribe();

    let request = TryOnRequest {
        user_id,
        category,
        garment_url,
    };

    let handle = controller
        .start(request, Arc::new(FileImageSource::new(&model_path)), device_garment)
        .expect("Failed to start try-on flow");

    tracing::info!(model = %model_path, ?category, "try-on flow started");

    // Follow the flow to a terminal phase; Ctrl-C tears it down.
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted, cancelling generation");
                handle.cancel();
                controller.reset();
                return;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    return;
                }
                let snapshot = updates.borrow_and_update().clone();
                tracing::info!(phase = ?snapshot.phase, view = ?snapshot.view, "flow update");
                if snapshot.phase.is_terminal() {
                    break;
                }
            }
        }
    }

    let snapshot = controller.snapshot();
    match snapshot.result_url() {
        Some(url) => {
            tracing::info!(result = url, "generation succeeded");
            let sink = DiskMediaSink::new(&config.media_dir);
            let saved = controller
                .save_to_device(&sink)
                .await
                .expect("Failed to save result image");
            tracing::info!(path = %saved.display(), "result saved");
        }
        None => {
            let notice = snapshot.notice.unwrap_or_else(|| "unknown failure".to_string());
            tracing::error!(%notice, "generation failed");
            std::process::exit(1);
        }
    }
}

fn usage() -> ! {
    eprintln!("usage: elo-tryon <model-image-path> <garment-url-or-path> [tops|bottoms|one-pieces]");
    std::process::exit(2);
}

/**
 * LP Factory Console Entry Point
 *
 * Loads configuration, opens the persisted application state, probes the
 * Engine and prints a short status report. With `--follow <job-id>` it
 * tails that job's log stream until the stream ends.
 */
use std::sync::Arc;
use std::time::Duration;

use lpfactory::console::refresh::{LogStream, StreamStatus};
use lpfactory::console::state::{AppStore, FileStorage};
use lpfactory::console::{Config, SyncClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let follow = follow_target(std::env::args().skip(1))?;

    let config = Config::from_env()?;
    let storage = FileStorage::default_location()?;
    tracing::info!("State directory: {}", storage.dir().display());

    let store = AppStore::new(Arc::new(storage), &config);
    let client = SyncClient::new(store.clone(), &config);

    let healthy = store.check_health(&client).await;
    let state = store.get_state();
    println!("Mode:      {}", state.connectivity_mode);
    println!("Engine:    {}", state.endpoint_base_url);
    println!("Reachable: {}", if healthy { "yes" } else { "no" });
    println!("Project:   {}", state.selected_project_id);

    let project = Some(state.selected_project_id.as_str());
    match client.list_clusters(project).await {
        Ok(clusters) => {
            println!("Clusters:  {}", clusters.len());
            for cluster in clusters {
                println!("  {:<8} {:<12} {}", cluster.id, cluster.status, cluster.name);
            }
        }
        Err(e) => eprintln!("Failed to list clusters: {}", e),
    }

    if let Some(job_id) = follow {
        follow_job(client, &job_id).await;
    }

    Ok(())
}

/// `--follow <job-id>`, if given
fn follow_target(
    mut args: impl Iterator<Item = String>,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let mut target = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--follow" => match args.next() {
                Some(job_id) => target = Some(job_id),
                None => return Err("--follow needs a job id".into()),
            },
            other => return Err(format!("Unknown argument: {}", other).into()),
        }
    }
    Ok(target)
}

async fn follow_job(client: SyncClient, job_id: &str) {
    println!("Following {} (Ctrl-C to stop)", job_id);
    let stream = LogStream::for_job(client, job_id);
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let mut cursor = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                stream.cancel();
                break;
            }
            _ = ticker.tick() => {}
        }

        let (fresh, next) = stream.lines_since(cursor);
        for line in fresh {
            println!("{}", line);
        }
        cursor = next;

        match stream.status() {
            StreamStatus::Ended => break,
            StreamStatus::Unavailable(reason) => {
                eprintln!("Stream unavailable: {}", reason);
                break;
            }
            StreamStatus::Connecting | StreamStatus::Streaming => {}
        }
    }
}

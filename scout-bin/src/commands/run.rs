use tracing::{info, warn};

use scout_config::ScoutConfig;
use scout_runtime::CapabilityRegistry;

use crate::plane::ControlPlane;

pub(super) async fn cmd_run(config: ScoutConfig) -> scout_core::Result<()> {
    println!("scoutd v{}", env!("CARGO_PKG_VERSION"));
    println!("   Store: {}", config.store.db_path.display());
    println!("   Coordination: shared ({})", config.store.db_path.display());
    println!("   Task queue: in-process");
    println!("   Brake fail mode: {:?}", config.brake.fail_mode);
    println!("   Workers: {}", config.worker.concurrency);
    println!();

    let (plane, rx) = ControlPlane::build(config)?;

    // Agent capabilities are registered by the deployment embedding the
    // runtime; tasks for missing kinds fail and are logged by the worker.
    let registry = CapabilityRegistry::new();
    let missing = registry.missing();
    if !missing.is_empty() {
        let kinds: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
        warn!(kinds = %kinds.join(", "), "no capability registered for some task kinds");
    }

    let worker = tokio::spawn(plane.worker(registry).run(rx));
    let scheduler = tokio::spawn(plane.scheduler().await?.run());

    info!("scoutd running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    scheduler.abort();
    worker.abort();
    let in_flight = plane.queue.in_flight_count();
    if in_flight > 0 {
        warn!(in_flight, "stopping with tasks still in flight");
    }
    Ok(())
}

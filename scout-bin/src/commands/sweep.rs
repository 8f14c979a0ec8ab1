use chrono::Utc;

use scout_config::ScoutConfig;

use crate::plane::ControlPlane;

pub(super) async fn cmd_sweep(config: ScoutConfig) -> scout_core::Result<()> {
    let (plane, _rx) = ControlPlane::build(config)?;
    let expired = plane.approvals.expire_stale(Utc::now()).await?;
    println!("expired {expired} approval item(s)");
    Ok(())
}

// src/executor/verify.rs

//! Post-sync size comparison.

use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};

use crate::definition::{BackupDefinition, DELETED_EXCLUDE};
use crate::rclone::SizeProbe;
use crate::run::{RunId, RunLedger};
use crate::verify::Comparison;

/// Measure both sides and log the comparison. Returns `true` only on a
/// confirmed mismatch; if either side cannot be measured the check is
/// skipped and the run keeps its outcome.
pub async fn verify_transfer(
    ledger: &RunLedger,
    prober: &dyn SizeProbe,
    definition: &BackupDefinition,
    run_id: RunId,
    config: &Path,
) -> Result<bool> {
    ledger.append_log(run_id, "\n\nVerifying transfer...\n");

    let source_path = definition.source_remote();
    let destination_path = definition.destination_remote();
    // The retention area lives inside the destination bucket.
    let excludes = [DELETED_EXCLUDE.to_string()];

    let source = prober.measure(&source_path, config, &[]).await;
    if let Some(stats) = source {
        ledger.record_source_stats(run_id, stats)?;
    }
    let destination = prober.measure(&destination_path, config, &excludes).await;

    let (Some(source), Some(destination)) = (source, destination) else {
        let side = match (source.is_some(), destination.is_some()) {
            (false, false) => "source and destination",
            (false, true) => "source",
            _ => "destination",
        };
        warn!(run_id, side, "verification skipped: size unavailable");
        ledger.append_log(
            run_id,
            &format!("Verification skipped: could not measure {side}\n"),
        );
        return Ok(false);
    };

    let comparison = Comparison::new(source, destination, definition.verify.tolerance);
    ledger.append_log(run_id, &format!("{}\n", comparison.summary()));
    info!(
        run_id,
        source_bytes = source.bytes,
        destination_bytes = destination.bytes,
        mismatch = comparison.is_mismatch(),
        "verification finished"
    );
    Ok(comparison.is_mismatch())
}

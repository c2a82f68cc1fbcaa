//! The Controls pipeline: trigger band, spike sharing, then cap/floor.
//!
//! Works on the percent delta between a calculated price and a base price.
//! The three stages always run in this order, each one seeing the delta left
//! by the previous stage. The adjusted delta is applied back to the base and
//! rounded by the output policy.

use super::decimal::{self, DecimalPolicy};
use super::ledger::NodeError;
use crate::store::{ControlsConfig, SpikeSharing, TriggerBand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::trace;

/// Every intermediate delta of one pipeline run, kept for audit output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlsOutcome {
    pub base: Decimal,
    pub calculated: Decimal,
    pub raw_delta: Decimal,
    pub after_band: Decimal,
    pub after_sharing: Decimal,
    pub final_delta: Decimal,
    pub value: Decimal,
}

impl ControlsOutcome {
    pub fn suppressed(&self) -> bool { self.after_band != self.raw_delta }
    pub fn shared(&self) -> bool { self.after_sharing != self.after_band }
    pub fn clamped(&self) -> bool { self.final_delta != self.after_sharing }
}

/// Rejects configurations that cannot produce a meaningful collar.
pub fn validate(config: &ControlsConfig) -> Result<(), NodeError> {
    let invalid = |reason: String| Err(NodeError::InvalidControlsConfig { reason });

    if let (Some(floor), Some(cap)) = (config.floor, config.cap) {
        if floor > cap {
            return invalid(format!("floor {}% is above cap {}%", floor, cap));
        }
    }
    if let Some(band) = config.trigger_band {
        if band.lower > band.upper {
            return invalid(format!("trigger band lower {}% is above upper {}%", band.lower, band.upper));
        }
    }
    if let Some(sharing) = config.spike_sharing {
        if sharing.share_percent < Decimal::ZERO || sharing.share_percent > Decimal::ONE_HUNDRED {
            return invalid(format!("share percent {}% is outside 0..=100", sharing.share_percent));
        }
    }
    Ok(())
}

/// Runs the pipeline for one calculated/base pair.
pub fn apply(
    config: &ControlsConfig,
    calculated: Decimal,
    base: Decimal,
    policy: &DecimalPolicy,
) -> Result<ControlsOutcome, NodeError> {
    validate(config)?;

    let raw_delta = decimal::delta_percent(base, calculated)?;
    let after_band = suppress(config.trigger_band, raw_delta);
    let after_sharing = share(config.trigger_band, config.spike_sharing, after_band)?;
    let final_delta = clamp(config.cap, config.floor, after_sharing);

    let value = policy.round(decimal::apply_percent_delta(base, final_delta)?);
    trace!(%raw_delta, %after_band, %after_sharing, %final_delta, %value, "controls applied");

    Ok(ControlsOutcome { base, calculated, raw_delta, after_band, after_sharing, final_delta, value })
}

/// Stage 1: a delta inside the band (inclusive) becomes zero.
fn suppress(band: Option<TriggerBand>, delta: Decimal) -> Decimal {
    match band {
        Some(TriggerBand { lower, upper }) if lower <= delta && delta <= upper => Decimal::ZERO,
        _ => delta,
    }
}

/// Stage 2: only the part of the delta beyond the band edge is passed
/// through, scaled by the share. Without a band there is no edge, so nothing
/// is shared.
fn share(band: Option<TriggerBand>, sharing: Option<SpikeSharing>, delta: Decimal) -> Result<Decimal, NodeError> {
    let (Some(band), Some(sharing)) = (band, sharing) else {
        if sharing.is_some() {
            trace!("spike sharing configured without a trigger band; skipped");
        }
        return Ok(delta);
    };

    let edge = if sharing.direction.shares_above() && delta > band.upper {
        band.upper
    } else if sharing.direction.shares_below() && delta < band.lower {
        band.lower
    } else {
        return Ok(delta);
    };

    // Signed excess: positive above the upper edge, negative below the lower one.
    let excess = decimal::subtract(delta, edge)?;
    Ok(decimal::add(edge, decimal::percent_of(excess, sharing.share_percent)?)?)
}

/// Stage 3: cap and floor bound the delta independently.
fn clamp(cap: Option<Decimal>, floor: Option<Decimal>, delta: Decimal) -> Decimal {
    let delta = match cap {
        Some(cap) if delta > cap => cap,
        _ => delta,
    };
    match floor {
        Some(floor) if delta < floor => floor,
        _ => delta,
    }
}

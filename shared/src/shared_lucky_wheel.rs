use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, Time};

use crate::constants::{DEFAULT_DAILY_SPINS, DEFAULT_RESET_TIME, DEFAULT_SPIN_COOLDOWN_MINUTES};

/// Operator-controlled wheel settings. A missing `dailySpins` falls back to
/// the allowance cached on the user record, then to the hard default.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct WheelConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_spins: Option<u32>,
    pub reset_time: String,
    /// Minimum spacing between two successful spins, in minutes.
    pub spin_cooldown: u64,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_spins: None,
            reset_time: DEFAULT_RESET_TIME.to_string(),
            spin_cooldown: DEFAULT_SPIN_COOLDOWN_MINUTES,
        }
    }
}

/// Reward semantics of a prize. The tag discriminates what the ledger
/// applier does with a win; only voucher prizes carry a payload.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrizeKind {
    Voucher {
        #[serde(rename = "voucherId")]
        voucher_id: String,
    },
    Discount,
    FreeShipping,
    GoodLuck,
    None,
}

impl PrizeKind {
    /// Stable wire tag, used as the prize-type snapshot in spin logs.
    pub fn tag(&self) -> &'static str {
        match self {
            PrizeKind::Voucher { .. } => "voucher",
            PrizeKind::Discount => "discount",
            PrizeKind::FreeShipping => "free_shipping",
            PrizeKind::GoodLuck => "good_luck",
            PrizeKind::None => "none",
        }
    }
}

/// One entry of the wheel's prize table. `icon`/`color`/`value` are
/// display-only; `value` doubles as the points-lookup discriminator for
/// voucher prizes.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Prize {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub probability: f64,
    #[serde(flatten)]
    pub kind: PrizeKind,
}

/// The persisted per-user spin state. The stored user document may carry
/// additional profile fields; writers must merge this record into the
/// document rather than replacing it.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserEntitlement {
    pub id: String,
    pub remaining_spins: u32,
    /// Allowance cached as of the last reset; `None` means no cycle has
    /// ever been started for this user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_spins: Option<u32>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_spin_at: Option<OffsetDateTime>,
    pub points: u64,
    pub vouchers: Vec<String>,
    pub used_vouchers: Vec<String>,
}

/// Append-only record of one successful spin. Never mutated after creation.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SpinLogEntry {
    pub user_id: String,
    pub prize_id: Option<String>,
    pub prize_type: Option<String>,
    pub voucher_id: Option<String>,
    pub points_earned: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

// === Clock ===

/// Parses "HH:MM". Malformed or out-of-range components default to 0, so
/// the function stays total on operator-edited input.
fn parse_reset_time(reset_time: &str) -> (u8, u8) {
    let mut parts = reset_time.split(':');
    let hour: u8 = parts
        .next()
        .and_then(|p| p.trim().parse().ok())
        .unwrap_or(0);
    let minute: u8 = parts
        .next()
        .and_then(|p| p.trim().parse().ok())
        .unwrap_or(0);
    if hour > 23 || minute > 59 {
        log::warn!("out-of-range reset time {:?}, using 00:00 components", reset_time);
    }
    (
        if hour > 23 { 0 } else { hour },
        if minute > 59 { 0 } else { minute },
    )
}

/// Instant of the most recent reset crossing: today's reset time-of-day if
/// it has already passed, otherwise yesterday's. Pure and total.
pub fn last_reset_boundary(now: OffsetDateTime, reset_time: &str) -> OffsetDateTime {
    let (hour, minute) = parse_reset_time(reset_time);
    let reset = Time::from_hms(hour, minute, 0).unwrap_or(Time::MIDNIGHT);
    let todays_reset = now.replace_time(reset);
    if now >= todays_reset {
        todays_reset
    } else {
        todays_reset - Duration::days(1)
    }
}

// === Spin engine ===

#[derive(Debug, Clone, PartialEq)]
pub enum SpinVerdict {
    Allowed,
    /// Master switch is off; no state was touched.
    Disabled,
    CooldownActive {
        retry_after_seconds: u64,
    },
    Exhausted,
}

/// Result of evaluating one spin attempt. `entitlement` is the post-reset
/// record (post-decrement when allowed); callers must persist it before
/// reporting the outcome, even on a deny, so a stale allowance never leaks
/// across cycles.
#[derive(Debug, Clone)]
pub struct SpinEvaluation {
    pub entitlement: UserEntitlement,
    pub reset_applied: bool,
    pub verdict: SpinVerdict,
}

/// The spin state machine. Evaluated fresh on every request; the only
/// persisted state is the entitlement record itself.
pub fn evaluate_spin(
    config: &WheelConfig,
    user: &UserEntitlement,
    now: OffsetDateTime,
) -> SpinEvaluation {
    let mut entitlement = user.clone();

    if !config.enabled {
        return SpinEvaluation {
            entitlement,
            reset_applied: false,
            verdict: SpinVerdict::Disabled,
        };
    }

    let boundary = last_reset_boundary(now, &config.reset_time);

    // Fresh cycle: no spin recorded since the boundary. Restock the
    // allowance and clear lastSpinAt so the cooldown check below cannot
    // block the first spin of the new cycle.
    let mut reset_applied = false;
    if entitlement.last_spin_at.map_or(true, |t| t < boundary) {
        let allowance = config
            .daily_spins
            .or(entitlement.daily_spins)
            .unwrap_or(DEFAULT_DAILY_SPINS);
        entitlement.remaining_spins = allowance;
        entitlement.daily_spins = Some(allowance);
        entitlement.last_spin_at = None;
        reset_applied = true;
    }

    if config.spin_cooldown > 0 {
        if let Some(last) = entitlement.last_spin_at {
            let elapsed = now - last;
            let cooldown = Duration::minutes(config.spin_cooldown as i64);
            if elapsed < cooldown {
                let wait_ms = (cooldown - elapsed).whole_milliseconds();
                let retry_after_seconds = ((wait_ms + 999) / 1000) as u64;
                return SpinEvaluation {
                    entitlement,
                    reset_applied,
                    verdict: SpinVerdict::CooldownActive { retry_after_seconds },
                };
            }
        }
    }

    if entitlement.remaining_spins == 0 {
        return SpinEvaluation {
            entitlement,
            reset_applied,
            verdict: SpinVerdict::Exhausted,
        };
    }

    entitlement.remaining_spins -= 1;
    entitlement.last_spin_at = Some(now);
    SpinEvaluation {
        entitlement,
        reset_applied,
        verdict: SpinVerdict::Allowed,
    }
}

// === Weighted draw ===

/// Cumulative-probability selection in table order. Deterministic given
/// `draw`; the caller supplies a fresh uniform in [0,1) per spin. When the
/// table sums below the draw value the last prize wins — a documented bias
/// kept from the reference behavior, not a silent repair.
pub fn select_prize(prizes: &[Prize], draw: f64) -> Option<&Prize> {
    let mut cumulative = 0.0;
    for prize in prizes {
        cumulative += prize.probability;
        if draw <= cumulative {
            return Some(prize);
        }
    }
    prizes.last()
}

// === Reward ledger ===

/// Points awarded for a prize, keyed by (type, value).
pub fn points_for(prize: &Prize) -> u64 {
    match &prize.kind {
        PrizeKind::Voucher { .. } => match prize.value.as_str() {
            "50k" => 10,
            "100k" => 20,
            "VIP" => 50,
            _ => 0,
        },
        PrizeKind::Discount => 5,
        PrizeKind::FreeShipping => 3,
        PrizeKind::GoodLuck => 1,
        PrizeKind::None => 0,
    }
}

/// Applies a won prize to the entitlement: additive point credit and an
/// idempotent voucher grant. A voucher id already claimed, or already
/// redeemed, is never granted again. Returns the updated record and the
/// log entry to append.
pub fn apply_reward(
    user: &UserEntitlement,
    prize: &Prize,
    now: OffsetDateTime,
) -> (UserEntitlement, SpinLogEntry) {
    let mut entitlement = user.clone();
    let points = points_for(prize);
    entitlement.points += points;

    let mut won_voucher = None;
    if let PrizeKind::Voucher { voucher_id } = &prize.kind {
        won_voucher = Some(voucher_id.clone());
        let already_claimed = entitlement.vouchers.iter().any(|v| v == voucher_id);
        let already_used = entitlement.used_vouchers.iter().any(|v| v == voucher_id);
        if !already_claimed && !already_used {
            entitlement.vouchers.push(voucher_id.clone());
        }
    }

    let log = SpinLogEntry {
        user_id: entitlement.id.clone(),
        prize_id: Some(prize.id.clone()),
        prize_type: Some(prize.kind.tag().to_string()),
        voucher_id: won_voucher,
        points_earned: points,
        timestamp: now,
    };
    (entitlement, log)
}

// === API Types ===

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    /// Optional evaluation instant supplied by the caller; the server
    /// falls back to its own clock when absent.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
}

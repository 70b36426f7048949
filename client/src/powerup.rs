//! Purchasable buffs with an escalating cost schedule

use shared::PlayerState;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerUpKind {
    Speed,
    Shield,
    Health,
}

impl PowerUpKind {
    pub const ALL: [PowerUpKind; 3] = [PowerUpKind::Speed, PowerUpKind::Shield, PowerUpKind::Health];

    pub fn base_cost(self) -> u64 {
        match self {
            PowerUpKind::Speed => 100,
            PowerUpKind::Shield => 150,
            PowerUpKind::Health => 50,
        }
    }

    pub fn cost_increment(self) -> u64 {
        match self {
            PowerUpKind::Speed => 50,
            PowerUpKind::Shield => 75,
            PowerUpKind::Health => 25,
        }
    }

    /// `base + prior_uses * increment`
    pub fn cost(self, prior_uses: u32) -> u64 {
        self.base_cost() + u64::from(prior_uses) * self.cost_increment()
    }

    /// How long the effect lasts; `None` for instantaneous effects.
    pub fn duration(self) -> Option<Duration> {
        match self {
            PowerUpKind::Speed => Some(Duration::from_secs(10)),
            PowerUpKind::Shield => Some(Duration::from_secs(8)),
            PowerUpKind::Health => None,
        }
    }

    pub fn is_active(self, state: &PlayerState) -> bool {
        match self {
            PowerUpKind::Speed => state.has_speed,
            PowerUpKind::Shield => state.has_shield,
            PowerUpKind::Health => false,
        }
    }
}

impl fmt::Display for PowerUpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PowerUpKind::Speed => "speed",
            PowerUpKind::Shield => "shield",
            PowerUpKind::Health => "health",
        };
        f.write_str(name)
    }
}

/// Why a purchase was turned down. Rejections never mutate any state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PurchaseError {
    #[error("{kind} costs {cost} but only {balance} is available")]
    InsufficientBalance {
        kind: PowerUpKind,
        cost: u64,
        balance: u64,
    },
    #[error("{0} is already active")]
    AlreadyActive(PowerUpKind),
    #[error("health is already full")]
    FullHealth,
    #[error("eliminated players cannot buy power-ups")]
    Eliminated,
    #[error("the session has ended")]
    SessionEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub kind: PowerUpKind,
    pub cost: u64,
    pub remaining_balance: u64,
    pub expires_in: Option<Duration>,
}

/// Successful purchases per kind for the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PowerUpLedger {
    speed_uses: u32,
    shield_uses: u32,
    health_uses: u32,
}

impl PowerUpLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uses(&self, kind: PowerUpKind) -> u32 {
        match kind {
            PowerUpKind::Speed => self.speed_uses,
            PowerUpKind::Shield => self.shield_uses,
            PowerUpKind::Health => self.health_uses,
        }
    }

    pub fn next_cost(&self, kind: PowerUpKind) -> u64 {
        kind.cost(self.uses(kind))
    }

    pub fn record(&mut self, kind: PowerUpKind) {
        let counter = match kind {
            PowerUpKind::Speed => &mut self.speed_uses,
            PowerUpKind::Shield => &mut self.shield_uses,
            PowerUpKind::Health => &mut self.health_uses,
        };
        *counter = counter.saturating_add(1);
    }
}

pub fn check_eligibility(
    kind: PowerUpKind,
    state: &PlayerState,
    balance: u64,
    cost: u64,
) -> Result<(), PurchaseError> {
    if !state.is_alive() {
        return Err(PurchaseError::Eliminated);
    }
    if kind.is_active(state) {
        return Err(PurchaseError::AlreadyActive(kind));
    }
    if kind == PowerUpKind::Health && state.hp >= state.max_hp {
        return Err(PurchaseError::FullHealth);
    }
    if balance < cost {
        return Err(PurchaseError::InsufficientBalance {
            kind,
            cost,
            balance,
        });
    }
    Ok(())
}

pub fn apply_effect(kind: PowerUpKind, state: &mut PlayerState, heal_amount: i32) {
    match kind {
        PowerUpKind::Speed => state.has_speed = true,
        PowerUpKind::Shield => state.has_shield = true,
        PowerUpKind::Health => state.hp = (state.hp + heal_amount).min(state.max_hp),
    }
}

/// Clears a timed effect. Returns whether anything changed.
pub fn expire_effect(kind: PowerUpKind, state: &mut PlayerState) -> bool {
    let flag = match kind {
        PowerUpKind::Speed => &mut state.has_speed,
        PowerUpKind::Shield => &mut state.has_shield,
        PowerUpKind::Health => return false,
    };
    std::mem::replace(flag, false)
}

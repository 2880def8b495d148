//! Randomised transaction amounts bounded by live balances

use super::gas::GasEstimator;
use crate::chain::Balances;
use crate::config::RunConfig;

use ethers::types::U256;
use rand::Rng;

/// Amounts are drawn in steps of 10^-6 native units (10^12 wei)
const AMOUNT_STEP_WEI: u64 = 1_000_000_000_000;

/// Outcome of an amount decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountPlan {
    Ready(U256),
    /// Available balance cannot cover the minimum amount
    Insufficient { available: U256, minimum: U256 },
}

/// Computes safe wrap/unwrap amounts
#[derive(Debug, Clone)]
pub struct AmountPlanner {
    min_amount: U256,
    max_amount: U256,
    /// Gas reserve at the fee ceiling plus the safety margin
    reserve: U256,
}

impl AmountPlanner {
    pub fn new(config: &RunConfig) -> Self {
        let gas_reserve = GasEstimator::reserve_for(config.gas_limit, config.max_fee_per_gas);
        Self {
            min_amount: config.min_amount,
            max_amount: config.max_amount,
            reserve: gas_reserve.saturating_add(config.safety_margin),
        }
    }

    pub fn reserve(&self) -> U256 {
        self.reserve
    }

    /// Amount to wrap, keeping the gas reserve back from the native balance
    pub fn plan_wrap_amount<R: Rng>(&self, balances: &Balances, rng: &mut R) -> AmountPlan {
        let spendable = balances.native.saturating_sub(self.reserve);
        self.plan(spendable, rng)
    }

    /// Amount to unwrap, bounded by the wrapped balance only
    pub fn plan_unwrap_amount<R: Rng>(
        &self,
        balances: &Balances,
        rng: &mut R,
    ) -> AmountPlan {
        self.plan(balances.wrapped, rng)
    }

    fn plan<R: Rng>(&self, available: U256, rng: &mut R) -> AmountPlan {
        let insufficient = AmountPlan::Insufficient {
            available,
            minimum: self.min_amount,
        };
        if available < self.min_amount {
            return insufficient;
        }

        let upper = std::cmp::min(self.max_amount, available);
        let step = U256::from(AMOUNT_STEP_WEI);
        let low_steps = ceil_div(self.min_amount, step);
        let high_steps = upper / step;
        if low_steps > high_steps {
            return insufficient;
        }

        let high_steps = std::cmp::min(high_steps, U256::from(u64::MAX));
        let steps = rng.gen_range(low_steps.as_u64()..=high_steps.as_u64());
        AmountPlan::Ready(U256::from(steps) * step)
    }
}

fn ceil_div(value: U256, divisor: U256) -> U256 {
    let (quotient, remainder) = value.div_mod(divisor);
    if remainder.is_zero() {
        quotient
    } else {
        quotient + 1
    }
}

use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::builtin::{Builtin, ALL};

/// A (memory, cpu) pair: either a price or a limit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ExBudget {
    pub mem: u64,
    pub cpu: u64,
}

impl ExBudget {
    pub const fn new(mem: u64, cpu: u64) -> Self {
        ExBudget { mem, cpu }
    }

    /// The default per-run limit, in the ballpark of mainnet script limits.
    pub const DEFAULT_LIMIT: ExBudget = ExBudget::new(14_000_000, 10_000_000_000);

    pub fn saturating_add(self, other: ExBudget) -> ExBudget {
        ExBudget {
            mem: self.mem.saturating_add(other.mem),
            cpu: self.cpu.saturating_add(other.cpu),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CostKind {
    Constant,
    LinearInX,
    LinearInY,
    LinearInZ,
    AddedSizes,
    MaxSize,
    MinSize,
}

/// One-dimensional cost function over argument sizes (in words).
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct CostFn {
    pub kind: CostKind,
    pub intercept: u64,
    #[serde(default)]
    pub slope: u64,
}

impl CostFn {
    pub fn eval(&self, sizes: &[u64]) -> u64 {
        let pick = |i: usize| sizes.get(i).copied().unwrap_or(1);
        let x = match self.kind {
            CostKind::Constant => return self.intercept,
            CostKind::LinearInX => pick(0),
            CostKind::LinearInY => pick(1),
            CostKind::LinearInZ => pick(2),
            CostKind::AddedSizes => sizes.iter().sum(),
            CostKind::MaxSize => sizes.iter().copied().max().unwrap_or(1),
            CostKind::MinSize => sizes.iter().copied().min().unwrap_or(1),
        };
        self.intercept.saturating_add(self.slope.saturating_mul(x))
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct BuiltinCost {
    pub cpu: CostFn,
    pub mem: CostFn,
}

/// Flat per-step machine prices.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct MachineCosts {
    pub startup: ExBudget,
    pub var: ExBudget,
    pub constant: ExBudget,
    pub lambda: ExBudget,
    pub apply: ExBudget,
    pub delay: ExBudget,
    pub force: ExBudget,
    pub builtin: ExBudget,
}

/// The network parameter file: machine step prices plus one cost entry per
/// builtin, keyed by builtin name.
#[derive(Clone, Debug, Deserialize)]
pub struct CostModel {
    pub machine: MachineCosts,
    pub builtins: BTreeMap<String, BuiltinCost>,
}

pub const DEFAULT_PARAMS: &str = include_str!("default_params.json");

impl CostModel {
    pub fn from_json(s: &str) -> Result<CostModel> {
        let model: CostModel = serde_json::from_str(s)?;
        for &b in ALL {
            if !model.builtins.contains_key(b.name()) {
                bail!("cost model is missing an entry for {}", b.name());
            }
        }
        Ok(model)
    }

    pub fn cost_of(&self, b: Builtin, sizes: &[u64]) -> ExBudget {
        // presence is validated at load time
        let entry = &self.builtins[b.name()];
        ExBudget {
            mem: entry.mem.eval(sizes),
            cpu: entry.cpu.eval(sizes),
        }
    }
}

impl Default for CostModel {
    fn default() -> Self {
        CostModel::from_json(DEFAULT_PARAMS).expect("embedded default params are valid")
    }
}

/// Tracks consumption against a limit. Acquired when a run starts; whatever
/// path the run exits through, `spent()` reports what was consumed.
#[derive(Clone, Debug)]
pub struct Meter {
    limit: ExBudget,
    spent: ExBudget,
}

impl Meter {
    pub fn new(limit: ExBudget) -> Self {
        Meter {
            limit,
            spent: ExBudget::default(),
        }
    }

    /// Charge; reports `Err` once either dimension crosses the limit.
    pub fn spend(&mut self, cost: ExBudget) -> std::result::Result<(), ()> {
        self.spent = self.spent.saturating_add(cost);
        if self.spent.mem > self.limit.mem || self.spent.cpu > self.limit.cpu {
            Err(())
        } else {
            Ok(())
        }
    }

    pub fn spent(&self) -> ExBudget {
        self.spent
    }

    pub fn remaining(&self) -> ExBudget {
        ExBudget {
            mem: self.limit.mem.saturating_sub(self.spent.mem),
            cpu: self.limit.cpu.saturating_sub(self.spent.cpu),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_cover_every_builtin() {
        let model = CostModel::default();
        for &b in ALL {
            let c = model.cost_of(b, &[1, 1, 1]);
            assert!(c.cpu > 0, "{} has zero cpu cost", b.name());
        }
    }

    #[test]
    fn meter_reports_partial_spend_on_overrun() {
        let mut m = Meter::new(ExBudget::new(10, 10));
        assert!(m.spend(ExBudget::new(6, 6)).is_ok());
        assert!(m.spend(ExBudget::new(6, 6)).is_err());
        assert_eq!(m.spent(), ExBudget::new(12, 12));
        assert_eq!(m.remaining(), ExBudget::new(0, 0));
    }

    #[test]
    fn cost_fn_shapes() {
        let f = CostFn {
            kind: CostKind::MaxSize,
            intercept: 10,
            slope: 2,
        };
        assert_eq!(f.eval(&[3, 7]), 24);
        let g = CostFn {
            kind: CostKind::Constant,
            intercept: 5,
            slope: 999,
        };
        assert_eq!(g.eval(&[3, 7]), 5);
    }
}

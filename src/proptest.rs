//! The property-testing entry point: run a compiled script over N seeded
//! random cases and judge each observable outcome with an oracle predicate.

use num_bigint::BigInt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use datacore::Data;
use uplc::cost::{CostModel, ExBudget};
use uplc::machine::Outcome;
use uplc::term::Const;

use crate::CompiledScript;

pub type Gen = Box<dyn Fn(&mut StdRng) -> Data>;

/// What one case observably produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaseOutcome {
    Value(Const),
    Failure(String),
    OutOfBudget,
}

#[derive(Clone, Debug)]
pub struct CaseReport {
    pub inputs: Vec<Data>,
    pub outcome: CaseOutcome,
    pub ok: bool,
}

#[derive(Clone, Debug)]
pub struct PropertyReport {
    pub cases: Vec<CaseReport>,
}

impl PropertyReport {
    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|c| !c.ok)
    }

    pub fn all_ok(&self) -> bool {
        self.cases.iter().all(|c| c.ok)
    }
}

pub struct Harness<'a> {
    script: &'a CompiledScript,
    params: CostModel,
    budget: ExBudget,
    gens: Vec<Gen>,
}

impl<'a> Harness<'a> {
    pub fn new(script: &'a CompiledScript, gens: Vec<Gen>) -> Self {
        Harness {
            script,
            params: CostModel::default(),
            budget: ExBudget::DEFAULT_LIMIT,
            gens,
        }
    }

    /// Override the network parameters the evaluator prices with.
    pub fn with_params(mut self, params: CostModel) -> Self {
        self.params = params;
        self
    }

    pub fn with_budget(mut self, budget: ExBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Run `n` seeded cases; the oracle judges (inputs, outcome) pairs. The
    /// script is compiled once and shared across cases.
    pub fn run<O>(&self, n: usize, seed: u64, oracle: O) -> PropertyReport
    where
        O: Fn(&[Data], &CaseOutcome) -> bool,
    {
        let program = self.script.emit(true);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut cases = Vec::with_capacity(n);
        for _ in 0..n {
            let inputs: Vec<Data> = self.gens.iter().map(|g| g(&mut rng)).collect();
            let result = self
                .script
                .run_emitted(&program, &inputs, &self.params, self.budget);
            let outcome = match result.outcome {
                Outcome::Value(c) => CaseOutcome::Value(c),
                Outcome::Opaque => CaseOutcome::Failure("opaque result".to_string()),
                Outcome::Failure { info, .. } => CaseOutcome::Failure(info),
                Outcome::OutOfBudget { .. } => CaseOutcome::OutOfBudget,
            };
            let ok = oracle(&inputs, &outcome);
            cases.push(CaseReport {
                inputs,
                outcome,
                ok,
            });
        }
        PropertyReport { cases }
    }
}

// ---- generator combinators ----

pub fn gen_int(lo: i64, hi: i64) -> Gen {
    Box::new(move |rng| Data::Int(BigInt::from(rng.gen_range(lo..=hi))))
}

pub fn gen_bool() -> Gen {
    Box::new(|rng| Data::bool_(rng.gen()))
}

pub fn gen_bytes(max_len: usize) -> Gen {
    Box::new(move |rng| {
        let len = rng.gen_range(0..=max_len);
        let mut out = vec![0u8; len];
        rng.fill(&mut out[..]);
        Data::Bytes(out)
    })
}

pub fn gen_list(elem: Gen, max_len: usize) -> Gen {
    Box::new(move |rng| {
        let len = rng.gen_range(0..=max_len);
        Data::List((0..len).map(|_| elem(rng)).collect())
    })
}

pub fn gen_option(inner: Gen) -> Gen {
    Box::new(move |rng| {
        if rng.gen() {
            Data::some(inner(rng))
        } else {
            Data::none()
        }
    })
}

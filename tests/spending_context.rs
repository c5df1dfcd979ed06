use datacore::Data;
use helios::compile;
use uplc::cost::{CostModel, ExBudget};
use uplc::machine::Outcome;
use uplc::term::Const;

// Data constructors for the prelude context types. Structs are
// Constr(0, fields); enum variants use their declaration-order tag.

fn value(n: i64) -> Data {
    Data::constr(
        0,
        vec![Data::map(vec![(
            Data::bytes(vec![]),
            Data::map(vec![(Data::bytes(vec![]), Data::int(n))]),
        )])],
    )
}

fn value_zero() -> Data {
    Data::constr(0, vec![Data::map(vec![])])
}

fn tx_output_id(tx: &[u8], index: i64) -> Data {
    Data::constr(
        0,
        vec![
            Data::constr(0, vec![Data::bytes(tx.to_vec())]),
            Data::int(index),
        ],
    )
}

fn address() -> Data {
    // Address { credential: Credential::PubKey { hash } }
    Data::constr(
        0,
        vec![Data::constr(
            0,
            vec![Data::constr(0, vec![Data::bytes(vec![0x01; 4])])],
        )],
    )
}

fn tx_output(v: Data) -> Data {
    Data::constr(0, vec![address(), v, Data::none()])
}

fn tx_input(oid: Data, v: Data) -> Data {
    Data::constr(0, vec![oid, tx_output(v)])
}

fn tx(inputs: Vec<Data>, outputs: Vec<Data>, fee: Data, minted: Data) -> Data {
    Data::constr(
        0,
        vec![
            Data::list(inputs),
            Data::list(outputs),
            fee,
            minted,
            Data::list(vec![Data::constr(0, vec![Data::bytes(vec![0x55; 4])])]),
        ],
    )
}

fn spending_purpose(oid: Data) -> Data {
    // ScriptPurpose::Spending is the second variant
    Data::constr(1, vec![oid])
}

fn script_context(tx: Data, purpose: Data) -> Data {
    Data::constr(0, vec![tx, purpose])
}

fn run(src: &str, args: &[Data]) -> Outcome {
    let script = compile(src).unwrap();
    script
        .run(args, &CostModel::default(), ExBudget::DEFAULT_LIMIT)
        .outcome
}

#[test]
fn spending_value_is_conserved() {
    let src = r#"
spending value_balance

struct Datum {
    n: Int
}

struct Redeemer {
    n: Int
}

func sum_inputs(inputs: []TxInput) -> Value {
    inputs.fold(fn(acc: Value, input: TxInput) -> Value {
        acc + input.output.value
    }, Value::ZERO)
}

func sum_outputs(outputs: []TxOutput) -> Value {
    outputs.fold(fn(acc: Value, output: TxOutput) -> Value {
        acc + output.value
    }, Value::ZERO)
}

func main(datum: Datum, redeemer: Redeemer, ctx: ScriptContext) -> Bool {
    sum_inputs(ctx.tx.inputs) + ctx.tx.minted == ctx.tx.fee + sum_outputs(ctx.tx.outputs)
}
"#;
    let oid = tx_output_id(&[0xaa; 4], 0);
    let balanced = script_context(
        tx(
            vec![tx_input(oid.clone(), value(100))],
            vec![tx_output(value(90))],
            value(10),
            value_zero(),
        ),
        spending_purpose(oid.clone()),
    );
    let datum = Data::constr(0, vec![Data::int(0)]);
    let redeemer = Data::constr(0, vec![Data::int(0)]);
    assert_eq!(
        run(src, &[datum.clone(), redeemer.clone(), balanced]),
        Outcome::Value(Const::Unit)
    );

    let unbalanced = script_context(
        tx(
            vec![tx_input(oid.clone(), value(100))],
            vec![tx_output(value(90))],
            value(20),
            value_zero(),
        ),
        spending_purpose(oid),
    );
    match run(src, &[datum, redeemer, unbalanced]) {
        Outcome::Failure { info, .. } => assert_eq!(info, "validation returned false"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn get_current_input_matches_the_purpose_output_id() {
    let src = r#"
testing current_input
func main(ctx: ScriptContext) -> Int {
    ctx.get_current_input().output_id.index
}
"#;
    let wanted = tx_output_id(&[0xbb; 4], 7);
    let other = tx_output_id(&[0xcc; 4], 3);
    let ctx = script_context(
        tx(
            vec![
                tx_input(other, value(5)),
                tx_input(wanted.clone(), value(9)),
            ],
            vec![],
            value_zero(),
            value_zero(),
        ),
        spending_purpose(wanted),
    );
    assert_eq!(run(src, &[ctx]), Outcome::Value(Const::int(7)));
}

#[test]
fn get_current_input_outside_spending_fails() {
    let src = r#"
testing not_spending
func main(ctx: ScriptContext) -> Int {
    ctx.get_current_input().output_id.index
}
"#;
    // ScriptPurpose::Certifying carries no fields
    let ctx = script_context(
        tx(vec![], vec![], value_zero(), value_zero()),
        Data::constr(3, vec![]),
    );
    match run(src, &[ctx]) {
        Outcome::Failure { info, .. } => assert_eq!(info, "not in the spending purpose"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn pure_queries_do_not_disturb_the_context() {
    let src = r#"
testing stable_tx
func main(ctx: ScriptContext) -> Bool {
    let fee_before: Value = ctx.tx.fee;
    let signed: Bool = ctx.tx.is_signed_by(PubKeyHash{#55555555});
    assert(signed);
    fee_before == ctx.tx.fee
}
"#;
    let oid = tx_output_id(&[0xaa; 4], 0);
    let ctx = script_context(
        tx(vec![], vec![], value(10), value_zero()),
        spending_purpose(oid),
    );
    assert_eq!(run(src, &[ctx]), Outcome::Value(Const::Bool(true)));
}

#[test]
fn minting_purpose_main_signature() {
    let src = r#"
minting gatekeeper

enum Redeemer {
    Mint,
    Burn
}

func main(redeemer: Redeemer, ctx: ScriptContext) -> Bool {
    redeemer.switch {
        Mint => ctx.tx.minted.get(#, #) > 0,
        Burn => true
    }
}
"#;
    // ScriptPurpose::Minting { policy_hash }
    let purpose = Data::constr(0, vec![Data::constr(0, vec![Data::bytes(vec![])])]);
    let ctx = script_context(tx(vec![], vec![], value_zero(), value(5)), purpose);
    let mint_redeemer = Data::constr(0, vec![]);
    assert_eq!(run(src, &[mint_redeemer, ctx]), Outcome::Value(Const::Unit));
}

#[test]
fn staking_purpose_takes_only_the_context() {
    let src = r#"
staking stake_guard
func main(ctx: ScriptContext) -> Bool {
    ctx.tx.fee.is_zero()
}
"#;
    let ctx = script_context(
        tx(vec![], vec![], value_zero(), value_zero()),
        Data::constr(3, vec![]),
    );
    assert_eq!(run(src, &[ctx]), Outcome::Value(Const::Unit));
}

#[test]
fn value_addition_merges_nested_quantities() {
    let src = r#"
testing value_add
func main(ctx: ScriptContext) -> Int {
    let total: Value = ctx.tx.fee + ctx.tx.minted;
    total.get(#, #)
}
"#;
    let ctx = script_context(
        tx(vec![], vec![], value(10), value(32)),
        spending_purpose(tx_output_id(&[0xaa; 4], 0)),
    );
    assert_eq!(run(src, &[ctx]), Outcome::Value(Const::int(42)));
}

// Helios: a compiler for a small purely-functional validator-script
// language targeting metered lambda-calculus bytecode.
pub mod proptest;

use datacore::Data;
use helioslang::ast;
use helioslang::error::CompileError;
use helioslang::texpr::TProgram;
pub use helioslang::{peek_purpose, Purpose, Site, Source};
use uplc::cost::{CostModel, ExBudget};
use uplc::machine::RunResult;
use uplc::term::Const;

/// The implicitly imported module holding the blockchain-domain types.
pub const PRELUDE: &str = include_str!("prelude.hl");

#[derive(Clone, Debug)]
pub struct CompiledScript {
    pub name: String,
    pub purpose: Purpose,
    program: TProgram,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Profile {
    pub mem: u64,
    pub cpu: u64,
    pub size: usize,
}

/// Compile a script with no imports beyond the prelude.
pub fn compile(src: &str) -> Result<CompiledScript, CompileError> {
    compile_with(src, &[])
}

/// Compile a script together with the module sources its `import`
/// declarations may name.
pub fn compile_with(src: &str, modules: &[&str]) -> Result<CompiledScript, CompileError> {
    let main = helioslang::parse(src)?;
    if main.purpose == Purpose::Module {
        return Err(CompileError::type_(
            main.name.site,
            "a module cannot be compiled on its own; import it from a script",
        ));
    }
    let ordered = resolve_modules(&main, modules)?;
    let mut refs: Vec<&ast::Program> = ordered.iter().collect();
    refs.push(&main);
    let program = helioslang::check(&refs)?;
    Ok(CompiledScript {
        name: program.name.clone(),
        purpose: program.purpose,
        program,
    })
}

/// Parse and type-check a module on its own.
pub fn check_module(src: &str) -> Result<(), CompileError> {
    let m = helioslang::parse(src)?;
    if m.purpose != Purpose::Module {
        return Err(CompileError::type_(
            m.name.site,
            "expected a module declaration",
        ));
    }
    let prelude = parse_prelude();
    let refs: Vec<&ast::Program> = vec![&prelude, &m];
    helioslang::check(&refs).map(|_| ())
}

fn parse_prelude() -> ast::Program {
    helioslang::parse(PRELUDE).expect("the bundled prelude parses")
}

/// Single-file import inclusion: the prelude first, then every imported
/// module (depth-first, deduplicated), then the script itself.
fn resolve_modules(
    main: &ast::Program,
    sources: &[&str],
) -> Result<Vec<ast::Program>, CompileError> {
    let mut available: Vec<ast::Program> = Vec::new();
    for src in sources {
        let m = helioslang::parse(src)?;
        if m.purpose != Purpose::Module {
            return Err(CompileError::type_(
                m.name.site,
                format!("'{}' is not a module", m.name.name),
            ));
        }
        available.push(m);
    }

    let mut ordered = vec![parse_prelude()];
    let mut included: Vec<String> = vec!["prelude".to_string()];
    include_imports(main, &available, &mut ordered, &mut included)?;
    Ok(ordered)
}

fn include_imports(
    prog: &ast::Program,
    available: &[ast::Program],
    ordered: &mut Vec<ast::Program>,
    included: &mut Vec<String>,
) -> Result<(), CompileError> {
    for decl in &prog.decls {
        let ast::Decl::Import(imp) = decl else {
            continue;
        };
        if included.iter().any(|n| *n == imp.module.name) {
            continue;
        }
        let m = available
            .iter()
            .find(|m| m.name.name == imp.module.name)
            .ok_or_else(|| {
                CompileError::reference(
                    imp.module.site,
                    format!("unknown module '{}'", imp.module.name),
                )
            })?;
        included.push(imp.module.name.clone());
        include_imports(m, available, ordered, included)?;
        ordered.push(m.clone());
    }
    Ok(())
}

impl CompiledScript {
    /// Produce bytecode, with or without the optimizer.
    pub fn emit(&self, simplify: bool) -> uplc::Program {
        let ir = helioslang::lower(&self.program);
        let ir = if simplify {
            helioslang::optimize(ir)
        } else {
            ir
        };
        helioslang::emit(&ir)
    }

    /// The IR, pretty-printed with original source sites.
    pub fn ir_pretty(&self, simplify: bool) -> String {
        let ir = helioslang::lower(&self.program);
        let ir = if simplify {
            helioslang::optimize(ir)
        } else {
            ir
        };
        format!("{}", ir)
    }

    /// Apply `main` to data arguments and evaluate under the given budget.
    pub fn run(&self, args: &[Data], params: &CostModel, budget: ExBudget) -> RunResult {
        self.run_emitted(&self.emit(true), args, params, budget)
    }

    /// Like `run`, but against an already-emitted program (used to compare
    /// optimized and unoptimized bytecode).
    pub fn run_emitted(
        &self,
        program: &uplc::Program,
        args: &[Data],
        params: &CostModel,
        budget: ExBudget,
    ) -> RunResult {
        let consts: Vec<Const> = args.iter().map(|d| Const::Data(d.clone())).collect();
        uplc::machine::run(&program.apply_args(&consts), params, budget)
    }

    /// Budget consumption and bytecode size for one run.
    pub fn profile(&self, args: &[Data], params: &CostModel) -> Profile {
        let program = self.emit(true);
        let size = uplc::flat::encode(&program).len();
        let r = self.run_emitted(&program, args, params, ExBudget::DEFAULT_LIMIT);
        Profile {
            mem: r.spent.mem,
            cpu: r.spent.cpu,
            size,
        }
    }
}

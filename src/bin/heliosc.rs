use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "heliosc", about = "Compile validator scripts to bytecode")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Compile a script and write the flat-encoded bytecode.
    Build {
        src: PathBuf,
        /// Output path; defaults to the source path with a .flat extension.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Skip the IR optimizer.
        #[arg(long)]
        no_optimize: bool,
    },
    /// Print the purpose and name of a script without compiling it.
    Inspect { src: PathBuf },
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

fn main() -> Result<()> {
    match Cli::parse().cmd {
        Cmd::Build {
            src,
            output,
            no_optimize,
        } => {
            let text = fs::read_to_string(&src)
                .with_context(|| format!("reading {}", src.display()))?;
            let source = helios::Source::new(src.display().to_string(), text);

            let script = match helios::compile(&source.text) {
                Ok(s) => s,
                Err(e) => bail!("{}", e.describe(&source)),
            };
            let program = script.emit(!no_optimize);
            let bytes = uplc::flat::encode(&program);

            let out = output.unwrap_or_else(|| src.with_extension("flat"));
            fs::write(&out, &bytes).with_context(|| format!("writing {}", out.display()))?;

            println!("sha256:{}", sha256_hex(&bytes));
            Ok(())
        }
        Cmd::Inspect { src } => {
            let text = fs::read_to_string(&src)
                .with_context(|| format!("reading {}", src.display()))?;
            match helios::peek_purpose(&text) {
                Some((purpose, name)) => {
                    println!("{} {}", purpose, name);
                    Ok(())
                }
                None => bail!("{} has no script header", src.display()),
            }
        }
    }
}

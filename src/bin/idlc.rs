use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use idlc::arch::Configuration;
use idlc::compile::{CompilationContext, Fragment};
use idlc::idl::analysis::RegDetermination;
use idlc::idl::ast::render_body;
use idlc::loader::ArchLoader;

/// Compiler for the RISC-V instruction description language
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Args)]
struct Target {
    /// Architecture description (TOML)
    #[arg(short, long)]
    arch: PathBuf,

    /// Configuration (TOML); unconfigured when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct Selector {
    #[arg(value_enum)]
    kind: FragmentKind,

    /// Instruction, CSR or function name
    name: String,

    /// CSR field, for `sw-write`
    #[arg(long)]
    field: Option<String>,

    /// Effective XLEN
    #[arg(long)]
    xlen: Option<u32>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FragmentKind {
    Operation,
    SwRead,
    SwWrite,
    Function,
}

#[derive(Subcommand)]
enum Commands {
    /// Type check every fragment the configuration can reach
    Check {
        #[command(flatten)]
        target: Target,
    },

    /// Print a fragment after configuration pruning
    Prune {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        selector: Selector,
    },

    /// Emit C++ for a fragment
    Cpp {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        selector: Selector,
    },

    /// Emit an Asciidoc listing for a fragment
    Adoc {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        selector: Selector,
    },

    /// List functions, exceptions and registers a fragment can reach
    Reach {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        selector: Selector,

        /// Follow every syntactic path instead of the pruned one
        #[arg(long)]
        unevaluated: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Check { target } => {
            let ctx = open(&target)?;
            let report = ctx.check_all();
            for failure in &report.failures {
                eprintln!("{failure}");
            }
            if !report.is_clean() {
                bail!("{} of {} fragments failed to check", report.failures.len(), report.checked);
            }
            println!("{} fragments checked", report.checked);
        }
        Commands::Prune { target, selector } => {
            let ctx = open(&target)?;
            let fragment = fragment(&selector)?;
            let body = ctx
                .pruned(&fragment, selector.xlen)
                .with_context(|| format!("failed to prune {fragment}"))?;
            println!("{}", render_body(&body));
        }
        Commands::Cpp { target, selector } => {
            let ctx = open(&target)?;
            let fragment = fragment(&selector)?;
            let code = ctx
                .emit_cpp(&fragment, selector.xlen)
                .with_context(|| format!("failed to emit C++ for {fragment}"))?;
            print!("{code}");
        }
        Commands::Adoc { target, selector } => {
            let ctx = open(&target)?;
            let fragment = fragment(&selector)?;
            let listing = ctx
                .emit_adoc(&fragment, selector.xlen)
                .with_context(|| format!("failed to emit Asciidoc for {fragment}"))?;
            print!("{listing}");
        }
        Commands::Reach {
            target,
            selector,
            unevaluated,
        } => {
            let ctx = open(&target)?;
            let fragment = fragment(&selector)?;
            reach(&ctx, &fragment, selector.xlen, unevaluated)?;
        }
    }

    Ok(())
}

fn open(target: &Target) -> Result<CompilationContext> {
    let arch = ArchLoader::new()
        .load(&target.arch)
        .with_context(|| format!("failed to load architecture {}", target.arch.display()))?;
    let config = match &target.config {
        Some(path) => Configuration::from_path(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => Configuration::unconfigured("unconfigured"),
    };
    info!(arch = %arch.name, config = %config.name, "compiling");
    CompilationContext::new(Arc::new(arch), Arc::new(config)).context("failed to build the global scope")
}

fn fragment(selector: &Selector) -> Result<Fragment> {
    let name = selector.name.clone();
    Ok(match (selector.kind, &selector.field) {
        (FragmentKind::Operation, None) => Fragment::Operation(name),
        (FragmentKind::SwRead, None) => Fragment::SwRead(name),
        (FragmentKind::Function, None) => Fragment::Function(name),
        (FragmentKind::SwWrite, Some(field)) => Fragment::SwWrite {
            csr: name,
            field: field.clone(),
        },
        (FragmentKind::SwWrite, None) => bail!("sw-write needs --field"),
        (_, Some(_)) => bail!("--field only applies to sw-write"),
    })
}

fn reach(ctx: &CompilationContext, fragment: &Fragment, xlen: Option<u32>, unevaluated: bool) -> Result<()> {
    let functions = if unevaluated {
        ctx.reachable_functions_unevaluated(fragment, xlen)
    } else {
        ctx.reachable_functions(fragment, xlen)
    }
    .with_context(|| format!("failed to follow calls from {fragment}"))?;
    println!("functions:");
    for decl in &functions {
        println!("  {}", decl.name);
    }

    let exceptions = ctx
        .reachable_exceptions(fragment, xlen)
        .with_context(|| format!("failed to collect exceptions of {fragment}"))?;
    println!("exceptions:");
    for code in &exceptions {
        println!("  {} ({})", code.var, code.num);
    }

    if let Fragment::Operation(inst) = fragment {
        println!("sources: {}", registers(ctx.src_registers(inst, xlen)?));
        println!("destinations: {}", registers(ctx.dst_registers(inst, xlen)?));
    }
    Ok(())
}

fn registers(found: RegDetermination) -> String {
    match found {
        RegDetermination::Registers(regs) => regs.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
        RegDetermination::Complex => "complex".to_string(),
    }
}

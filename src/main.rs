use std::{path::PathBuf, process::ExitCode};

use clap::{error::ErrorKind, ArgAction, Parser as ClapParser};

use crate::{
    backend::codegen::generate_module,
    frontend::{parser::Parser, SourceFile, SourceFileOrigin},
    middle::{
        passes::{
            inline::{FunctionInliningPass, InlineConfig},
            parse_pass_order,
            tail::{TailConfig, TailRecursionPass},
            unroll::{LoopUnrollingPass, UnrollConfig},
            PassId, PassManager, DEFAULT_PASS_ORDER,
        },
        type_check,
    },
};

mod backend;
mod frontend;
mod index;
mod middle;

/// Compiler for the Tubular language. Emits WebAssembly Text to stdout.
#[derive(Debug, ClapParser)]
#[command(name = "tubular", disable_version_flag = true)]
pub struct Args {
    /// Input Tubular source file to compile
    filename: PathBuf,

    /// Disable loop unrolling optimization
    #[arg(long = "no-unroll")]
    no_unroll: bool,

    /// Loop unrolling factor; 1 effectively disables unrolling
    #[arg(
        long = "unroll-factor",
        value_name = "N",
        value_parser = clap::value_parser!(i64).range(1..=16),
        action = ArgAction::Append
    )]
    unroll_factor: Vec<i64>,

    /// Disable function inlining optimization
    #[arg(long = "no-inline")]
    no_inline: bool,

    /// Control tail recursion optimization
    #[arg(long = "tail", value_enum, value_name = "loop|off", action = ArgAction::Append)]
    tail: Vec<TailMode>,

    /// Optimization pass order: a permutation of inline,unroll,tail
    #[arg(long = "pass-order", value_name = "a,b,c")]
    pass_order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TailMode {
    #[value(name = "loop")]
    Loop,
    #[value(name = "off")]
    Off,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) if error.kind() == ErrorKind::DisplayHelp => {
            print!("{error}");
            return ExitCode::SUCCESS;
        }
        Err(error) => {
            eprint!("{error}");
            return ExitCode::FAILURE;
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), String> {
    /* Validate flag combinations before anything runs */

    let unroll_factor = resolve_unroll_factor(&args.unroll_factor)?;
    if args.no_unroll && unroll_factor > 1 && !args.unroll_factor.is_empty() {
        return Err(format!(
            "Cannot combine --no-unroll with --unroll-factor={unroll_factor}. \
             Use one or set --unroll-factor=1 to disable unrolling."
        ));
    }

    let tail_enabled = resolve_tail_mode(&args.tail)?;

    let pass_order = match &args.pass_order {
        Some(spec) => parse_pass_order(spec)?,
        None => DEFAULT_PASS_ORDER.to_vec(),
    };

    let enable_unrolling = !args.no_unroll && unroll_factor > 1;
    let enable_inlining = !args.no_inline;

    /* Front end */

    let contents = std::fs::read_to_string(&args.filename)
        .map_err(|_| format!("Unable to open file '{}'.", args.filename.display()))?;
    let source = SourceFile {
        contents,
        origin: SourceFileOrigin::File(args.filename),
    };

    let (mut program, symbols) = Parser::parse_program(&source);

    for function in &program.functions {
        if let Err(error) = type_check::check_function(function, &symbols) {
            error.report(&source);
            std::process::exit(1);
        }
    }

    /* Optimization passes in the configured order */

    let mut manager = PassManager::new();
    for id in pass_order {
        match id {
            PassId::Inline => {
                if enable_inlining {
                    manager.add_pass(Box::new(FunctionInliningPass::new(InlineConfig::default())));
                }
            }
            PassId::Unroll => {
                if enable_unrolling {
                    manager.add_pass(Box::new(LoopUnrollingPass::new(UnrollConfig {
                        factor: unroll_factor,
                        ..UnrollConfig::default()
                    })));
                }
            }
            PassId::Tail => {
                manager.add_pass(Box::new(TailRecursionPass::new(TailConfig {
                    enabled: tail_enabled,
                })));
            }
        }
    }
    manager.run_passes(&mut program, &symbols);

    /* Back end */

    print!("{}", generate_module(&program, &symbols));
    Ok(())
}

/// `--unroll-factor` takes a single value; repeating the flag is a
/// configuration error rather than a silent override
fn resolve_unroll_factor(values: &[i64]) -> Result<i64, String> {
    if values.len() > 1 {
        return Err("Duplicate --unroll-factor specified".to_string());
    }
    Ok(values.first().copied().unwrap_or(4))
}

/// `--tail` may repeat, but mixing 'loop' and 'off' within one invocation
/// is a configuration error
fn resolve_tail_mode(modes: &[TailMode]) -> Result<bool, String> {
    let wants_loop = modes.contains(&TailMode::Loop);
    let wants_off = modes.contains(&TailMode::Off);

    if wants_loop && wants_off {
        return Err("Conflicting --tail options: both 'loop' and 'off' specified".to_string());
    }

    Ok(!wants_off)
}

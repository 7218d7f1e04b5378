use anyhow::{anyhow, bail, Context, Result};
use clap::ArgMatches;
use log::LevelFilter;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use vsyncer::checker::{Ctx, Dartagnan, GenMc, MemoryModel, Mock, Tool};
use vsyncer::core::{Assignment, Bitseq, Selection};
use vsyncer::module::{report, Config, History};
use vsyncer::optimizer::{Driver, DriverConfig, FilterMode, Strategy};
use vsyncer::tools;

mod cli;

fn main() {
    let matches = cli::args().get_matches();
    init_logger(&matches);
    register_env();

    let result = match matches.subcommand() {
        Some(("optimize", sub)) => run_optimize(sub),
        Some(("check", sub)) => run_check(sub),
        Some(("info", sub)) => run_info(sub),
        Some(("mutate", sub)) => run_mutate(sub),
        Some(("env", _)) => run_env(),
        _ => unreachable!("a subcommand is required"),
    };

    if let Err(e) = result {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logger(matches: &ArgMatches) {
    let level = if matches.get_flag("debug") {
        LevelFilter::Debug
    } else if matches.get_flag("verbose") {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .init();
}

fn register_env() {
    tools::reg_env("VSYNCER_DEFAULT_CHECKER", "genmc", "Default model checker");
    tools::reg_env("VSYNCER_DEFAULT_MEMMODEL", "imm", "Default memory model");
    tools::reg_env(
        "VSYNCER_DEFAULT_ENTRY_FUNC",
        "main",
        "Default entry function for analysis",
    );
    GenMc::register_env();
    Dartagnan::register_env();
}

fn module_config(sub: &ArgMatches) -> Config {
    let mut cfg = Config {
        entry_funcs: vec![tools::get_env("VSYNCER_DEFAULT_ENTRY_FUNC")],
        ..Config::default()
    };
    if let Some(entries) = sub.get_many::<String>("entry-func") {
        cfg.entry_funcs = entries.cloned().collect();
    }
    if sub.get_flag("no-expand") {
        cfg.expand = false;
    }
    cfg
}

fn new_checker(sub: &ArgMatches) -> Result<Box<dyn Tool>> {
    let name = sub
        .get_one::<String>("checker")
        .cloned()
        .unwrap_or_else(|| tools::get_env("VSYNCER_DEFAULT_CHECKER"));
    let mm = sub
        .get_one::<String>("memory-model")
        .cloned()
        .unwrap_or_else(|| tools::get_env("VSYNCER_DEFAULT_MEMMODEL"));
    let mm = MemoryModel::from_str(&mm).map_err(|_| anyhow!("unknown memory model '{}'", mm))?;
    let threads: usize = sub
        .get_one::<String>("threads")
        .map(|t| t.parse())
        .transpose()
        .context("invalid thread count")?
        .unwrap_or(1);

    match name.as_str() {
        "genmc" => Ok(Box::new(GenMc::new(mm, threads, None))),
        "dartagnan" => Ok(Box::new(Dartagnan::new(mm))),
        "mock" => Ok(Box::new(Mock::default())),
        other => bail!("unknown checker '{}'", other),
    }
}

fn driver_config(sub: &ArgMatches) -> Result<DriverConfig> {
    let algorithm = sub.get_one::<String>("algorithm").expect("has default");
    let strategy = Strategy::from_str(algorithm)
        .map_err(|_| anyhow!("invalid algorithm '{}'", algorithm))?;
    let filter = sub.get_one::<String>("filter").expect("has default");
    let filter =
        FilterMode::from_str(filter).map_err(|_| anyhow!("unknown filter type '{}'", filter))?;
    let alpha: f64 = sub
        .get_one::<String>("alpha")
        .expect("has default")
        .parse()
        .context("invalid alpha")?;
    let speculate: f64 = sub
        .get_one::<String>("speculate")
        .expect("has default")
        .parse()
        .context("invalid speculation timeout")?;

    let mut tau = Duration::from_secs_f64(speculate);
    if tau.is_zero() && sub.get_flag("adaptive") {
        tau = Duration::from_millis(1);
    }

    Ok(DriverConfig {
        strategy,
        filter,
        alpha,
        tau,
        error_as_invalid: sub.get_flag("error-as-invalid"),
    })
}

fn run_optimize(sub: &ArgMatches) -> Result<()> {
    let input = sub.get_one::<String>("input").expect("input is required");
    let mut m = History::load(Path::new(input), module_config(sub))?;
    m.record()?;

    let checker = new_checker(sub)?;
    let mut driver = Driver::new(driver_config(sub)?, checker);

    let sel = Selection::Atomic;
    let initial = m.assignment(sel);
    let result = driver.run(&Ctx::new(), &mut m, sel);

    let outcome = match result {
        Ok(solution) => {
            println!("{}", report::summary(&m));
            if *solution.bitseq() == initial.bs {
                println!("Result\n   No optimization found!");
            } else {
                m.forget()?;
                m.mutate(Assignment::new(solution.bitseq().clone(), sel))?;
                println!("Result\n   Optimization found!");
                println!();
                print!("{}", report::diff(&m)?);
                println!("Solution: 0x{}", solution.bitseq().to_hex_string());
            }
            println!("== ITERATION STATS ===========================");
            println!("{}", driver.stats());
            Ok(())
        }
        Err(e) => Err(e.into()),
    };
    m.cleanup();
    outcome
}

fn run_check(sub: &ArgMatches) -> Result<()> {
    let input = sub.get_one::<String>("input").expect("input is required");
    let m = History::load(Path::new(input), module_config(sub))?;
    let checker = new_checker(sub)?;

    let result = checker.check(&Ctx::new(), &m);
    m.cleanup();
    let result = result?;
    println!("{}", result.status);
    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    match result.status {
        vsyncer::checker::CheckStatus::OK => Ok(()),
        status => bail!("verification failed: {}", status),
    }
}

fn run_info(sub: &ArgMatches) -> Result<()> {
    let input = sub.get_one::<String>("input").expect("input is required");
    let m = History::load(Path::new(input), module_config(sub))?;
    println!("{}", report::summary(&m));
    m.cleanup();
    Ok(())
}

fn run_mutate(sub: &ArgMatches) -> Result<()> {
    let input = sub.get_one::<String>("input").expect("input is required");
    let mut m = History::load(Path::new(input), module_config(sub))?;

    for (flag, sel) in [
        ("atomics", Selection::Atomic),
        ("loads", Selection::Loads),
        ("stores", Selection::Stores),
    ] {
        if let Some(value) = sub.get_one::<String>(flag) {
            let len = m.assignment(sel).bs.len();
            let bs = Bitseq::parse(value, len)
                .map_err(|e| anyhow!("invalid {} assignment: {}", flag, e))?;
            m.mutate(Assignment::new(bs, sel))?;
        }
    }

    let output = match sub.get_one::<String>("output") {
        Some(out) => out.clone(),
        None => {
            let stem = input.strip_suffix(".ll").unwrap_or(input);
            format!("{}.mut.ll", stem)
        }
    };
    tools::dump(&m, Path::new(&output))?;
    println!("{}", report::summary(&m));
    m.cleanup();
    Ok(())
}

fn run_env() -> Result<()> {
    for var in tools::env::envvars() {
        println!("{}", var);
    }
    Ok(())
}

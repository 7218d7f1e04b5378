use clap::{crate_description, crate_name, crate_version, Arg, ArgAction, Command};

pub fn args() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log informational messages")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Log debugging messages")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            with_check_args(with_module_args(
                Command::new("optimize")
                    .about("Finds a maximally relaxed ordering assignment for the input module")
                    .arg(
                        Arg::new("algorithm")
                            .short('a')
                            .long("algorithm")
                            .value_name("ALGO")
                            .help("Optimization algorithm (lr|ddmin)")
                            .default_value("lr"),
                    )
                    .arg(
                        Arg::new("filter")
                            .long("filter")
                            .value_name("MODE")
                            .help("Prune candidates against known failures (none|dup|rlx)")
                            .default_value("rlx"),
                    )
                    .arg(
                        Arg::new("speculate")
                            .long("speculate")
                            .value_name("SECONDS")
                            .help("Speculate a variant correct after this timeout")
                            .default_value("0"),
                    )
                    .arg(
                        Arg::new("adaptive")
                            .long("adaptive")
                            .help("Adapt the speculative timeout to observed recheck durations")
                            .action(ArgAction::SetTrue),
                    )
                    .arg(
                        Arg::new("alpha")
                            .long("alpha")
                            .value_name("WEIGHT")
                            .help("Memory weight of the adaptive timeout")
                            .default_value("0"),
                    )
                    .arg(
                        Arg::new("error-as-invalid")
                            .long("error-as-invalid")
                            .help("Map checker errors to invalid mutations")
                            .action(ArgAction::SetTrue),
                    ),
            )),
        )
        .subcommand(with_check_args(with_module_args(
            Command::new("check").about("Verifies the input module once"),
        )))
        .subcommand(with_module_args(
            Command::new("info").about("Prints a summary of the input module"),
        ))
        .subcommand(
            with_module_args(
                Command::new("mutate")
                    .about("Applies ordering and atomicity assignments to the input module")
                    .arg(
                        Arg::new("atomics")
                            .short('A')
                            .long("atomics")
                            .value_name("BITSEQ")
                            .help("Ordering assignment of all atomic operations"),
                    )
                    .arg(
                        Arg::new("loads")
                            .short('L')
                            .long("loads")
                            .value_name("BITSEQ")
                            .help("Atomicity assignment of all loads"),
                    )
                    .arg(
                        Arg::new("stores")
                            .short('S')
                            .long("stores")
                            .value_name("BITSEQ")
                            .help("Atomicity assignment of all stores"),
                    )
                    .arg(
                        Arg::new("output")
                            .short('o')
                            .long("output")
                            .value_name("FILE")
                            .help("Output file of the mutated module"),
                    ),
            ),
        )
        .subcommand(Command::new("env").about("Lists the recognized environment variables"))
}

//
// Private Implementation
//

fn with_module_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("input")
            .value_name("FILE")
            .help("LLVM-IR module (.ll)")
            .required(true),
    )
    .arg(
        Arg::new("entry-func")
            .short('e')
            .long("entry-func")
            .value_name("NAME")
            .help("Entry function of the analysis")
            .action(ArgAction::Append),
    )
    .arg(
        Arg::new("no-expand")
            .long("no-expand")
            .help("Do not clone ordering-parameterized wrappers")
            .action(ArgAction::SetTrue),
    )
}

fn with_check_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("checker")
            .short('c')
            .long("checker")
            .value_name("TOOL")
            .help("Model checker backend (genmc|dartagnan|mock)"),
    )
    .arg(
        Arg::new("memory-model")
            .short('m')
            .long("memory-model")
            .value_name("MODEL")
            .help("Memory model to verify against"),
    )
    .arg(
        Arg::new("threads")
            .long("threads")
            .value_name("N")
            .help("Parallel checker instances with randomized schedules")
            .default_value("1"),
    )
}

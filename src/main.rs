use std::io::{BufRead, IsTerminal, Write};

use clap::Parser;

use cjsh::parser::input_completeness;
use cjsh::shell::{EvalOutcome, Shell, ShellConfig};

#[derive(Parser)]
#[command(name = "cjsh")]
#[command(about = "An interactive POSIX-flavored command shell")]
#[command(version)]
struct Cli {
    /// Evaluate this string and exit with its last status
    #[arg(short = 'c', value_name = "COMMAND")]
    command: Option<String>,

    /// Exit immediately when a command fails (set -e)
    #[arg(short = 'e')]
    errexit: bool,

    /// Treat unset variables as errors (set -u)
    #[arg(short = 'u')]
    nounset: bool,

    /// Trace commands before executing them (set -x)
    #[arg(short = 'x')]
    xtrace: bool,

    /// Print input lines as they are read (set -v)
    #[arg(short = 'v')]
    verbose: bool,

    /// Enable the named option (set -o OPTION); repeatable
    #[arg(short = 'o', value_name = "OPTION")]
    set_options: Vec<String>,

    /// Force interactive mode even when stdin is not a terminal
    #[arg(short = 'i')]
    interactive: bool,

    /// Act as a login shell (also implied by an argv[0] starting with '-')
    #[arg(short = 'l', long = "login")]
    login: bool,

    /// Script file to run, followed by its positional parameters
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    script_and_args: Vec<String>,
}

/// `+o OPTION` pairs aren't expressible to clap; peel them off first.
fn extract_plus_o(args: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut rest = Vec::with_capacity(args.len());
    let mut unset_options = Vec::new();
    let mut iter = args.into_iter().peekable();
    while let Some(arg) = iter.next() {
        if arg == "+o" {
            if let Some(option) = iter.next() {
                unset_options.push(option);
            }
        } else if let Some(option) = arg.strip_prefix("+o") {
            unset_options.push(option.to_string());
        } else {
            rest.push(arg);
        }
    }
    (rest, unset_options)
}

fn finish(shell: &mut Shell, status: i32) -> ! {
    shell.source_logout_file();
    shell.shutdown();
    std::process::exit(status & 0xff);
}

fn run_interactive(shell: &mut Shell) -> ! {
    shell.source_startup_files();

    let stdin = std::io::stdin();
    let mut buffer = String::new();
    let mut eof_warned = false;

    loop {
        shell.notify_jobs();

        let prompt = if buffer.is_empty() {
            shell.prompt("PS1")
        } else {
            shell.prompt("PS2")
        };
        print!("{}", prompt);
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => {
                // EOF gets the same courtesy as `exit`: one warning about
                // live jobs, then through.
                match shell.eval("exit") {
                    EvalOutcome::Exit(status) => finish(shell, status),
                    EvalOutcome::Continue(status) => {
                        if eof_warned {
                            finish(shell, status);
                        }
                        eof_warned = true;
                        continue;
                    }
                }
            }
            Ok(_) => {}
            Err(_) => finish(shell, shell.state.last_status),
        }

        buffer.push_str(&line);
        if input_completeness(&buffer).is_err() {
            continue;
        }

        let source = std::mem::take(&mut buffer);
        if source.trim().is_empty() {
            continue;
        }
        match shell.eval(&source) {
            EvalOutcome::Continue(_) => {}
            EvalOutcome::Exit(status) => finish(shell, status),
        }
    }
}

fn main() {
    let raw_args: Vec<String> = std::env::args().collect();
    let login_by_argv0 = raw_args
        .first()
        .map(|a| a.starts_with('-'))
        .unwrap_or(false);
    let (clap_args, unset_options) = extract_plus_o(raw_args);
    let cli = Cli::parse_from(clap_args);

    let script_file = if cli.command.is_none() {
        cli.script_and_args.first().cloned()
    } else {
        None
    };

    let interactive = cli.interactive
        || (cli.command.is_none() && script_file.is_none() && std::io::stdin().is_terminal());

    // With -c, the first trailing word is $0 and the rest are $1..$N;
    // with a script file, the file is $0.
    let (script_name, args) = if cli.command.is_some() {
        (
            cli.script_and_args.first().cloned(),
            cli.script_and_args.iter().skip(1).cloned().collect(),
        )
    } else {
        (
            script_file.clone(),
            cli.script_and_args.iter().skip(1).cloned().collect(),
        )
    };

    let mut shell = Shell::new(ShellConfig {
        interactive,
        login: cli.login || login_by_argv0,
        script_name,
        args,
        ..Default::default()
    });

    shell.state.options.errexit = cli.errexit;
    shell.state.options.nounset = cli.nounset;
    shell.state.options.xtrace = cli.xtrace;
    shell.state.options.verbose = cli.verbose;
    shell.state.options.monitor = interactive;
    for option in &cli.set_options {
        match shell.state.options.by_name(option) {
            Some(slot) => *slot = true,
            None => {
                eprintln!("cjsh: -o {}: invalid option name", option);
                std::process::exit(2);
            }
        }
    }
    for option in &unset_options {
        match shell.state.options.by_name(option) {
            Some(slot) => *slot = false,
            None => {
                eprintln!("cjsh: +o {}: invalid option name", option);
                std::process::exit(2);
            }
        }
    }

    if let Some(command) = cli.command {
        if shell.is_login() {
            shell.source_startup_files();
        }
        let status = shell.eval(&command).status();
        finish(&mut shell, status);
    }

    if let Some(file) = script_file {
        let content = match std::fs::read_to_string(&file) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("cjsh: {}: {}", file, e);
                std::process::exit(127);
            }
        };
        let content = content
            .strip_prefix("#!")
            .and_then(|rest| rest.find('\n').map(|pos| &rest[pos + 1..]))
            .unwrap_or(&content);
        let status = shell.eval(content).status();
        finish(&mut shell, status);
    }

    if interactive {
        run_interactive(&mut shell);
    }

    // Non-interactive, no -c, no script: evaluate all of stdin.
    let mut source = String::new();
    let _ = std::io::Read::read_to_string(&mut std::io::stdin(), &mut source);
    let status = shell.eval(&source).status();
    finish(&mut shell, status);
}

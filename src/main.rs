use std::fs;
use std::io;
use std::str::FromStr;

use argh::FromArgs;
use thiserror::Error;

use regvm::registers::RegisterIndex;
use regvm::resolver::AMBIGUITY_THRESHOLD;
use regvm::{
  accelerate_program,
  count_ambiguous,
  disassemble,
  parse_samples,
  resolve,
  ExecutionError,
  LoadError,
  Machine,
  Profile,
  Program,
  RepeatWatch,
  ResolveError,
  RunOptions,
  Value,
  DEFAULT_REGISTER_COUNT
};

/// run register machine programs and work out opcode numbering from samples.
#[derive(FromArgs)]
struct Arguments {
  #[argh(subcommand)]
  command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
  Run(RunCommand),
  Resolve(ResolveCommand),
}

/// run an assembly program until it halts.
#[derive(FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {
  /// the program file
  #[argh(positional)]
  file: String,

  /// number of registers
  #[argh(option, short = 'r', default = "DEFAULT_REGISTER_COUNT")]
  registers: usize,

  /// initial register value as `index=value`, may be repeated
  #[argh(option, short = 's')]
  set: Vec<RegisterAssignment>,

  /// stop after this many steps
  #[argh(option)]
  max_steps: Option<u64>,

  /// program counter value at which to watch a register for a repeated value
  #[argh(option)]
  watch_pc: Option<usize>,

  /// the register to watch at `--watch-pc`
  #[argh(option)]
  watch_register: Option<RegisterIndex>,

  /// print an annotated listing with execution counts
  #[argh(switch)]
  profile: bool,

  /// replace recognized hot loops with their closed form
  #[argh(switch)]
  accelerate: bool,
}

/// resolve opcode numbers from a sample file and run its trailing program.
#[derive(FromArgs)]
#[argh(subcommand, name = "resolve")]
struct ResolveCommand {
  /// the sample file
  #[argh(positional)]
  file: String,

  /// number of registers for the trailing program
  #[argh(option, short = 'r', default = "4")]
  registers: usize,
}

/// `index=value`
struct RegisterAssignment {
  register : RegisterIndex,
  value    : Value,
}

impl FromStr for RegisterAssignment {
  type Err = String;

  fn from_str(text: &str) -> Result<RegisterAssignment, String> {
    let malformed = || format!("expected `index=value`, found `{}`", text);
    let (register, value) = text.split_once('=').ok_or_else(malformed)?;

    Ok(RegisterAssignment {
      register : register.trim().parse().map_err(|_| malformed())?,
      value    : value.trim().parse().map_err(|_| malformed())?
    })
  }
}

#[derive(Debug, Error)]
enum CliError {
  #[error("cannot read `{path}`: {source}")]
  Read { path: String, source: io::Error },
  #[error("cannot write output: {0}")]
  Write(#[from] io::Error),
  #[error(transparent)]
  Load(#[from] LoadError),
  #[error(transparent)]
  Execution(#[from] ExecutionError),
  #[error(transparent)]
  Resolve(#[from] ResolveError),
  #[error("{0}")]
  Usage(String),
}

fn read(path: &str) -> Result<String, CliError> {
  fs::read_to_string(path).map_err(|source| CliError::Read { path: path.to_string(), source })
}

fn run(command: RunCommand) -> Result<(), CliError> {
  let program = Program::parse(&read(&command.file)?, command.registers)?;

  let mut values = vec![0; command.registers];
  for assignment in &command.set {
    match values.get_mut(assignment.register) {
      Some(slot) => *slot = assignment.value,
      None       => {
        return Err(CliError::Usage(format!(
          "cannot set r[{}] in a bank of {} registers",
          assignment.register, command.registers
        )));
      }
    }
  }

  let mut machine = Machine::with_registers(&program, values)?;
  if command.accelerate {
    println!("Accelerated loops: {}", accelerate_program(&mut machine));
  }

  let mut watch =
    match (command.watch_pc, command.watch_register) {
      (Some(pc), Some(register)) => Some(RepeatWatch::for_program(&program, pc, register)?),
      (None, None)               => None,
      _                          => {
        return Err(CliError::Usage(
          "--watch-pc and --watch-register must be given together".to_string()
        ));
      }
    };
  let mut profile = Profile::new(&program);

  let mut options = RunOptions::new();
  if let Some(max_steps) = command.max_steps {
    options = options.max_steps(max_steps);
  }
  if let Some(watch) = watch.as_mut() {
    options = options.halt_when(watch);
  }
  if command.profile {
    options = options.observe(&mut profile);
  }

  let outcome = machine.run_with(options)?;
  println!("Outcome: {}", outcome);
  println!("{}", machine);

  if let Some(watch) = &watch {
    println!(
      "Watched r[{}] at pc {}: {} observations, {} distinct",
      command.watch_register.unwrap_or_default(),
      command.watch_pc.unwrap_or_default(),
      watch.observations(),
      watch.distinct()
    );
    if let Some(value) = watch.last_unique() {
      println!("Last unique value: {}", value);
    }
    if let Some(value) = watch.first_repeat() {
      println!("First repeated value: {}", value);
    }
  }

  if command.profile {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    disassemble(&program, &profile, machine.registers()).write_to(&mut handle)?;
  }

  Ok(())
}

fn resolve_samples(command: ResolveCommand) -> Result<(), CliError> {
  let file = parse_samples(&read(&command.file)?)?;

  println!(
    "{} of {} samples behave like {} or more opcodes",
    count_ambiguous(&file.samples, AMBIGUITY_THRESHOLD),
    file.samples.len(),
    AMBIGUITY_THRESHOLD
  );

  let table = resolve(&file.samples)?;
  println!("{}", table);

  if !file.program.is_empty() {
    let program = Program::decode(&file.program, &table, command.registers)?;
    let mut machine = Machine::new(&program);
    let outcome = machine.run()?;
    println!("Outcome: {}", outcome);
    println!("{}", machine);
  }

  Ok(())
}

fn main() {
  #[cfg(feature = "trace_computation")]
    println!("Computation Tracing ENABLED");

  let arguments: Arguments = argh::from_env();
  let result =
    match arguments.command {
      Command::Run(command)     => run(command),
      Command::Resolve(command) => resolve_samples(command),
    };

  if let Err(error) = result {
    eprintln!("error: {}", error);
    std::process::exit(1);
  }
}

//! The register machine: fetch, decode, execute, advance, until the program counter leaves the
//! program.

use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;
use std::fmt::{Display, Formatter};

use crate::accelerator::Accelerator;
use crate::bytecode::Instruction;
use crate::display::make_register_table;
use crate::error::{EvalError, ExecutionError, LoadError};
use crate::program::Program;
use crate::registers::{RegisterIndex, Registers, Value};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum State {
  Running,
  Halted
}

/// How a call to one of the `run` methods ended.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Outcome {
  /// The program counter left the program.
  Halted { steps: u64 },
  /// The halt predicate fired.
  Stopped { steps: u64 },
  /// The step budget ran out first. The machine can be resumed.
  BudgetExhausted { steps: u64 },
}

impl Outcome {
  pub fn steps(&self) -> u64 {
    match self {
      | Outcome::Halted { steps }
      | Outcome::Stopped { steps }
      | Outcome::BudgetExhausted { steps } => *steps
    }
  }
}

impl Display for Outcome {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Outcome::Halted { steps }          => write!(f, "halted after {} steps", steps),
      Outcome::Stopped { steps }         => write!(f, "stopped by predicate after {} steps", steps),
      Outcome::BudgetExhausted { steps } => write!(f, "step budget exhausted after {} steps", steps),
    }
  }
}

// region Hooks

/// Checked before every step. Returning `true` stops the run.
pub trait HaltPredicate {
  fn should_halt(&mut self, pc: usize, registers: &Registers) -> bool;
}

impl<F> HaltPredicate for F
  where F: FnMut(usize, &Registers) -> bool
{
  fn should_halt(&mut self, pc: usize, registers: &Registers) -> bool {
    self(pc, registers)
  }
}

/// Notified once per instruction fetched on the interpreted path.
pub trait FetchObserver {
  fn on_fetch(&mut self, pc: usize, instruction: &Instruction);
}

/**
  Stops the first time `register`, observed whenever the program counter is at `pc`, holds a
  value it has held there before. Programs that never halt on their own often cycle through a
  finite set of values at some program point; this finds the cycle.
*/
#[derive(Clone, Debug)]
pub struct RepeatWatch {
  pc           : usize,
  register     : RegisterIndex,
  seen         : HashSet<Value>,
  observations : usize,
  last_unique  : Option<Value>,
  first_repeat : Option<Value>,
}

impl RepeatWatch {

  pub fn new(pc: usize, register: RegisterIndex) -> RepeatWatch {
    RepeatWatch {
      pc,
      register,
      seen         : HashSet::new(),
      observations : 0,
      last_unique  : None,
      first_repeat : None,
    }
  }

  /// As `new`, but rejects a pc or register that `program` can never reach, since such a
  /// watch would never fire.
  pub fn for_program(program: &Program, pc: usize, register: RegisterIndex)
    -> Result<RepeatWatch, LoadError>
  {
    if pc >= program.len() {
      return Err(LoadError::WatchPcOutOfRange { pc, len: program.len() });
    }
    if register >= program.register_count() {
      return Err(LoadError::WatchRegisterOutOfRange {
        register,
        count: program.register_count()
      });
    }
    Ok(RepeatWatch::new(pc, register))
  }

  /// The value that repeated, once one has.
  pub fn first_repeat(&self) -> Option<Value> {
    self.first_repeat
  }

  /// The last value seen for the first time.
  pub fn last_unique(&self) -> Option<Value> {
    self.last_unique
  }

  /// How many times the watched point was reached, the repeat included.
  pub fn observations(&self) -> usize {
    self.observations
  }

  pub fn distinct(&self) -> usize {
    self.seen.len()
  }

}

impl HaltPredicate for RepeatWatch {
  fn should_halt(&mut self, pc: usize, registers: &Registers) -> bool {
    if pc != self.pc || self.first_repeat.is_some() {
      return self.first_repeat.is_some();
    }

    let value =
      match registers.get(self.register) {
        Some(value) => value,
        None        => return false
      };
    self.observations += 1;

    match self.seen.insert(value) {

      true  => {
        self.last_unique = Some(value);
        false
      }

      false => {
        self.first_repeat = Some(value);
        true
      }

    }
  }
}

/// Optional limits and hooks for `Machine::run_with`.
#[derive(Default)]
pub struct RunOptions<'a> {
  max_steps : Option<u64>,
  halt_when : Option<&'a mut dyn HaltPredicate>,
  observer  : Option<&'a mut dyn FetchObserver>,
}

impl<'a> RunOptions<'a> {

  pub fn new() -> RunOptions<'a> {
    RunOptions::default()
  }

  pub fn max_steps(mut self, max_steps: u64) -> RunOptions<'a> {
    self.max_steps = Some(max_steps);
    self
  }

  pub fn halt_when(mut self, predicate: &'a mut dyn HaltPredicate) -> RunOptions<'a> {
    self.halt_when = Some(predicate);
    self
  }

  pub fn observe(mut self, observer: &'a mut dyn FetchObserver) -> RunOptions<'a> {
    self.observer = Some(observer);
    self
  }

}

// endregion

/**
  A machine executes one program. It owns its registers, so any number of machines can share a
  program, including across threads.

  The program counter is either a register named by the program's `#ip` header or, for
  programs without one, a counter private to the machine. Each step executes the instruction
  at the program counter and then increments whatever value the program counter holds, so an
  instruction that writes the program counter register lands one past the value it wrote.
*/
pub struct Machine<'p> {
  program      : &'p Program,
  registers    : Registers,
  counter      : Value,
  state        : State,
  steps        : u64,
  accelerators : HashMap<usize, Box<dyn Accelerator + 'p>>,
}

impl<'p> Machine<'p> {

  // region Construction and inspection

  pub fn new(program: &'p Program) -> Machine<'p> {
    Machine {
      program,
      registers    : Registers::zeroed(program.register_count()),
      counter      : 0,
      state        : State::Running,
      steps        : 0,
      accelerators : HashMap::new(),
    }
  }

  /// Starts from caller supplied register values, which must match the program's bank size.
  pub fn with_registers(program: &'p Program, values: Vec<Value>) -> Result<Machine<'p>, LoadError> {
    if values.len() != program.register_count() {
      return Err(LoadError::BankSize {
        expected : program.register_count(),
        given    : values.len()
      });
    }
    let mut machine = Machine::new(program);
    machine.registers = Registers::from(values);
    Ok(machine)
  }

  /// Installs a shortcut consulted whenever the program counter is at `pc`.
  pub fn accelerate<A>(&mut self, pc: usize, accelerator: A)
    where A: Accelerator + 'p
  {
    self.accelerators.insert(pc, Box::new(accelerator));
  }

  pub fn program(&self) -> &'p Program {
    self.program
  }

  pub fn registers(&self) -> &Registers {
    &self.registers
  }

  pub fn state(&self) -> State {
    self.state
  }

  /// Total steps executed over the machine's lifetime.
  pub fn steps(&self) -> u64 {
    self.steps
  }

  /// The raw program counter value, which may lie outside the program.
  pub fn pc_value(&self) -> Value {
    match self.program.ip_register() {
      Some(ip) => self.registers[ip],
      None     => self.counter
    }
  }

  /// The program counter, if it points at an instruction.
  pub fn pc(&self) -> Option<usize> {
    match usize::try_from(self.pc_value()) {
      Ok(pc) if pc < self.program.len() => Some(pc),
      _                                 => None
    }
  }

  fn set_pc(&mut self, value: Value) {
    match self.program.ip_register() {
      Some(ip) => self.registers[ip] = value,
      None     => self.counter = value
    }
  }

  // endregion

  // region Execution

  /// Executes a single instruction, or halts if the program counter is outside the program.
  pub fn step(&mut self) -> Result<State, ExecutionError> {
    self.step_with(None)
  }

  fn step_with<'o>(&mut self, observer: Option<&mut (dyn FetchObserver + 'o)>)
    -> Result<State, ExecutionError>
  {
    if self.state == State::Halted {
      return Ok(State::Halted);
    }

    let pc =
      match self.pc() {
        Some(pc) => pc,
        None     => {
          self.state = State::Halted;
          return Ok(State::Halted);
        }
      };

    if let Some(accelerator) = self.accelerators.get_mut(&pc) {
      if let Some(next) = accelerator.accelerate(&mut self.registers) {
        #[cfg(feature = "trace_computation")]
          println!("accelerated at {}, continuing at {}", pc, next);

        self.set_pc(next);
        self.steps += 1;
        return Ok(State::Running);
      }
    }

    let instruction = self.program[pc];
    if let Some(observer) = observer {
      observer.on_fetch(pc, &instruction);
    }

    let fault = |source: EvalError, registers: &Registers| {
      ExecutionError {
        pc,
        instruction,
        registers: registers.clone(),
        source
      }
    };

    if let Err(source) = instruction.execute(&mut self.registers) {
      return Err(fault(source, &self.registers));
    }
    let next =
      match self.pc_value().checked_add(1) {
        Some(next) => next,
        None       => return Err(fault(EvalError::Overflow, &self.registers))
      };
    self.set_pc(next);
    self.steps += 1;

    #[cfg(feature = "trace_computation")]
      println!("{:>4}: {}\n{}", pc, instruction, self);

    Ok(State::Running)
  }

  /// Runs until the program counter leaves the program.
  pub fn run(&mut self) -> Result<Outcome, ExecutionError> {
    self.run_with(RunOptions::new())
  }

  /// Runs for at most `max_steps` steps.
  pub fn run_for(&mut self, max_steps: u64) -> Result<Outcome, ExecutionError> {
    self.run_with(RunOptions::new().max_steps(max_steps))
  }

  /// Runs until halted or until `predicate` fires.
  pub fn run_until<P>(&mut self, predicate: &mut P) -> Result<Outcome, ExecutionError>
    where P: HaltPredicate
  {
    self.run_with(RunOptions::new().halt_when(predicate))
  }

  /**
    The general run loop. Before each step, in this order: a program counter outside the
    program halts the machine, the halt predicate may stop the run, and the step budget may end
    it. The reported step count is for this call only; see `steps` for the lifetime total.
  */
  pub fn run_with(&mut self, mut options: RunOptions<'_>) -> Result<Outcome, ExecutionError> {
    let mut steps: u64 = 0;

    loop {
      let pc =
        match (self.state, self.pc()) {
          (State::Running, Some(pc)) => pc,
          _                          => {
            self.state = State::Halted;
            return Ok(Outcome::Halted { steps });
          }
        };

      if let Some(predicate) = options.halt_when.as_mut() {
        if predicate.should_halt(pc, &self.registers) {
          return Ok(Outcome::Stopped { steps });
        }
      }

      if let Some(max_steps) = options.max_steps {
        if steps >= max_steps {
          return Ok(Outcome::BudgetExhausted { steps });
        }
      }

      self.step_with(options.observer.as_deref_mut())?;
      steps += 1;
    }
  }

  // endregion

}

impl<'p> Display for Machine<'p> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let table = make_register_table('r', self.registers.as_slice(), self.program.ip_register());
    write!(
      f,
      "State: {:?}\tpc = {}\tsteps = {}\n{}",
      self.state, self.pc_value(), self.steps, table
    )
  }
}

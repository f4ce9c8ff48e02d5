/*!
  A small register machine: sixteen operations over a bank of integer registers, with an
  optional program counter register that programs can read and write to jump.

  Besides running programs, the crate can work out which numeric opcode means which operation
  from before/after samples (`resolver`), profile and annotate a program listing
  (`disassembler`), and short-circuit recognized hot loops (`accelerator`).
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod accelerator;
pub mod bytecode;
pub mod disassembler;
mod display;
pub mod error;
pub mod machine;
pub mod program;
pub mod registers;
pub mod resolver;

pub use crate::accelerator::{accelerate_program, Accelerator, ScaledCounterLoop};
pub use crate::bytecode::{Instruction, Mnemonic, MnemonicSet, OpcodeId, RawInstruction};
pub use crate::disassembler::{disassemble, Listing, Profile};
pub use crate::error::{EvalError, ExecutionError, LoadError, ResolveError};
pub use crate::machine::{FetchObserver, HaltPredicate, Machine, Outcome, RepeatWatch, RunOptions, State};
pub use crate::program::Program;
pub use crate::registers::{Registers, Value, DEFAULT_REGISTER_COUNT};
pub use crate::resolver::{count_ambiguous, parse_samples, resolve, OpcodeTable, Resolver, Sample};

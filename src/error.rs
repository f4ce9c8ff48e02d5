//! Error types for loading, evaluating, executing, and resolving.

use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::bytecode::{Instruction, MnemonicSet, OpcodeId};
use crate::registers::{RegisterIndex, Registers, Value};
use crate::resolver::OpcodeTable;

/// A program or sample file that cannot be turned into a valid `Program` or `Sample`.
/// Execution never starts after one of these.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum LoadError {
  #[error("line {line}: malformed header `{text}`, expected `#ip <register>`")]
  MalformedHeader { line: usize, text: String },
  #[error("line {line}: malformed instruction `{text}`")]
  MalformedInstruction { line: usize, text: String },
  #[error("line {line}: malformed sample line `{text}`")]
  MalformedSample { line: usize, text: String },
  #[error("line {line}: unknown opcode `{name}`")]
  UnknownOpcode { line: usize, name: String },
  #[error("line {line}: register {register} is out of range for a bank of {count} registers")]
  RegisterOutOfRange { line: usize, register: Value, count: usize },
  #[error("expected {expected} initial register values but was given {given}")]
  BankSize { expected: usize, given: usize },
  #[error("cannot watch register {register} in a bank of {count} registers")]
  WatchRegisterOutOfRange { register: RegisterIndex, count: usize },
  #[error("cannot watch pc {pc} in a program of {len} instructions")]
  WatchPcOutOfRange { pc: usize, len: usize },
}

/// Failure of a single opcode function.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum EvalError {
  #[error("operand {0} does not name a register")]
  RegisterOutOfRange(Value),
  #[error("arithmetic overflow")]
  Overflow,
}

/// A fatal error while running. Carries the last register state for postmortem inspection.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("at pc {pc} (`{instruction}`) with registers {registers}: {source}")]
pub struct ExecutionError {
  pub pc          : usize,
  pub instruction : Instruction,
  pub registers   : Registers,
  pub source      : EvalError,
}

/// The samples do not pin down a unique opcode assignment.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ResolveError {
  /// No identifier has a single feasible mnemonic left. `resolved` holds the assignments that
  /// were forced before elimination stalled.
  #[error("samples are underconstrained: {}", Unresolved(.unresolved))]
  Underconstrained {
    resolved   : OpcodeTable,
    unresolved : Vec<(OpcodeId, MnemonicSet)>,
  },
  /// A sample carries an identifier outside `0..16`.
  #[error("opcode identifier {0} is out of range")]
  IdOutOfRange(OpcodeId),
  /// Every mnemonic was ruled out for an identifier.
  #[error("no mnemonic is consistent with every sample for opcode {0}")]
  Contradiction(OpcodeId),
}

struct Unresolved<'a>(&'a [(OpcodeId, MnemonicSet)]);

impl<'a> Display for Unresolved<'a> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let parts = self.0
                    .iter()
                    .map(|(id, set)| format!("{} may be {}", id, set))
                    .collect::<Vec<String>>();
    write!(f, "{}", parts.join("; "))
  }
}

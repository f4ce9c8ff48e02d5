use std::convert::TryFrom;
use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::IntoEnumIterator;
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

use crate::error::EvalError;
use crate::registers::{Registers, Value};

/// Numeric opcode identifier as it appears in sample files, before it is resolved.
pub type OpcodeId = u8;

/// The number of operations, and therefore of numeric opcode identifiers.
pub const OPCODE_COUNT: usize = 16;

/**
  Operations of the machine.

  Each is a total function of the register bank and the operands `a` and `b`, whose result is
  written to register `c`. The suffix names the roles of `a` and `b`: `r` for register, `i`
  for immediate. The order below is the canonical one and doubles as the bit position in a
  `MnemonicSet`, so it must not be changed.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq, PartialEq, Ord, PartialOrd,        Debug,         Hash
)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum Mnemonic {
  // Arithmetic //
  Addr,     // r[c] = r[a] + r[b]
  Addi,     // r[c] = r[a] + b
  Mulr,     // r[c] = r[a] * r[b]
  Muli,     // r[c] = r[a] * b

  // Bitwise //
  Banr,     // r[c] = r[a] & r[b]
  Bani,     // r[c] = r[a] & b
  Borr,     // r[c] = r[a] | r[b]
  Bori,     // r[c] = r[a] | b

  // Assignment //
  Setr,     // r[c] = r[a]
  Seti,     // r[c] = a

  // Comparison //
  Gtir,     // r[c] = a > r[b]
  Gtri,     // r[c] = r[a] > b
  Gtrr,     // r[c] = r[a] > r[b]
  Eqir,     // r[c] = a == r[b]
  Eqri,     // r[c] = r[a] == b
  Eqrr,     // r[c] = r[a] == r[b]
}

/// How an instruction interprets one of its `a` or `b` operands.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Operand {
  Register,
  Immediate,
  Ignored
}

impl Mnemonic {

  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  /// Roles of the `a` and `b` operands. `c` is always a register.
  pub fn operands(&self) -> (Operand, Operand) {
    use Mnemonic::*;
    use Operand::*;

    match self {
      Addr | Mulr | Banr | Borr | Gtrr | Eqrr => (Register,  Register),
      Addi | Muli | Bani | Bori | Gtri | Eqri => (Register,  Immediate),
      Gtir | Eqir                             => (Immediate, Register),
      Setr                                    => (Register,  Ignored),
      Seti                                    => (Immediate, Ignored),
    }
  }

  /// Computes the value this operation stores in `c`, without touching the registers.
  pub fn evaluate(&self, registers: &Registers, a: Value, b: Value) -> Result<Value, EvalError> {
    use Mnemonic::*;

    let r = |operand: Value| registers.read(operand);
    let flag = |condition: bool| -> Value { if condition { 1 } else { 0 } };

    let value =
      match self {
        Addr => r(a)?.checked_add(r(b)?).ok_or(EvalError::Overflow)?,
        Addi => r(a)?.checked_add(b).ok_or(EvalError::Overflow)?,
        Mulr => r(a)?.checked_mul(r(b)?).ok_or(EvalError::Overflow)?,
        Muli => r(a)?.checked_mul(b).ok_or(EvalError::Overflow)?,
        Banr => r(a)? & r(b)?,
        Bani => r(a)? & b,
        Borr => r(a)? | r(b)?,
        Bori => r(a)? | b,
        Setr => r(a)?,
        Seti => a,
        Gtir => flag(a > r(b)?),
        Gtri => flag(r(a)? > b),
        Gtrr => flag(r(a)? > r(b)?),
        Eqir => flag(a == r(b)?),
        Eqri => flag(r(a)? == b),
        Eqrr => flag(r(a)? == r(b)?),
      };
    Ok(value)
  }

  /// Executes the operation in place.
  pub fn execute(&self, registers: &mut Registers, a: Value, b: Value, c: Value)
    -> Result<(), EvalError>
  {
    let value = self.evaluate(registers, a, b)?;
    registers.write(c, value)
  }

  /// The pure form: returns the updated bank and leaves the input alone.
  pub fn apply(&self, registers: &Registers, a: Value, b: Value, c: Value)
    -> Result<Registers, EvalError>
  {
    let mut result = registers.clone();
    self.execute(&mut result, a, b, c)?;
    Ok(result)
  }

  /// All mnemonics, in canonical order.
  pub fn all() -> impl Iterator<Item = Mnemonic> {
    Mnemonic::iter()
  }

}

/// A decoded instruction: an operation and its three operands.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct Instruction {
  pub op : Mnemonic,
  pub a  : Value,
  pub b  : Value,
  pub c  : Value
}

impl Instruction {
  pub fn new(op: Mnemonic, a: Value, b: Value, c: Value) -> Instruction {
    Instruction { op, a, b, c }
  }

  pub fn execute(&self, registers: &mut Registers) -> Result<(), EvalError> {
    self.op.execute(registers, self.a, self.b, self.c)
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {} {} {}", self.op, self.a, self.b, self.c)
  }
}

/// An instruction whose opcode is still a bare number.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct RawInstruction {
  pub id : OpcodeId,
  pub a  : Value,
  pub b  : Value,
  pub c  : Value
}

impl RawInstruction {
  pub fn new(id: OpcodeId, a: Value, b: Value, c: Value) -> RawInstruction {
    RawInstruction { id, a, b, c }
  }

  /// Attaches a mnemonic to the operands.
  pub fn with_op(&self, op: Mnemonic) -> Instruction {
    Instruction::new(op, self.a, self.b, self.c)
  }
}

impl Display for RawInstruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {} {} {}", self.id, self.a, self.b, self.c)
  }
}

/**
  A set of mnemonics, stored as a bit field indexed by `Mnemonic::code()`. Used for the
  candidates of a sample and the feasible set of an opcode identifier.
*/
#[derive(Clone, Copy, Eq, PartialEq, Default, Hash)]
pub struct MnemonicSet {
  bits: u16
}

impl MnemonicSet {

  pub fn empty() -> MnemonicSet {
    MnemonicSet { bits: 0 }
  }

  pub fn all() -> MnemonicSet {
    MnemonicSet { bits: u16::max_value() }
  }

  pub fn insert(&mut self, mnemonic: Mnemonic) {
    self.bits |= 1 << mnemonic.code();
  }

  pub fn remove(&mut self, mnemonic: Mnemonic) {
    self.bits &= !(1 << mnemonic.code());
  }

  pub fn contains(&self, mnemonic: Mnemonic) -> bool {
    self.bits & (1 << mnemonic.code()) != 0
  }

  pub fn intersection(&self, other: MnemonicSet) -> MnemonicSet {
    MnemonicSet { bits: self.bits & other.bits }
  }

  pub fn len(&self) -> usize {
    self.bits.count_ones() as usize
  }

  pub fn is_empty(&self) -> bool {
    self.bits == 0
  }

  /// The only member, if there is exactly one.
  pub fn single(&self) -> Option<Mnemonic> {
    match self.len() {
      1 => Mnemonic::try_from(self.bits.trailing_zeros() as u8).ok(),
      _ => None
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = Mnemonic> {
    let set = *self;
    Mnemonic::iter().filter(move |m| set.contains(*m))
  }

}

impl std::iter::FromIterator<Mnemonic> for MnemonicSet {
  fn from_iter<I: IntoIterator<Item = Mnemonic>>(iter: I) -> MnemonicSet {
    let mut set = MnemonicSet::empty();
    for mnemonic in iter {
      set.insert(mnemonic);
    }
    set
  }
}

impl Display for MnemonicSet {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{{{}}}",
      self.iter()
          .map(|m| m.to_string())
          .collect::<Vec<String>>()
          .join(", ")
    )
  }
}

impl std::fmt::Debug for MnemonicSet {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "MnemonicSet{}", self)
  }
}

//! The register bank and the integer types that live in it.

use std::convert::TryFrom;
use std::fmt::{Display, Formatter};
use std::ops::{Index, IndexMut};

use crate::error::EvalError;

/// Register contents. Observed programs exceed 32 bits, so values are 64 bit and signed.
pub type Value = i64;

/// `RegisterIndex` is `usize`, as it is naturally an index into the bank.
pub type RegisterIndex = usize;

/// Register count used when a program does not say otherwise.
pub const DEFAULT_REGISTER_COUNT: usize = 6;

/**
  Converts an operand to a register index if it names one of `count` registers. Operands are
  plain integers in the instruction encoding, so negative or oversized values are possible.
*/
pub fn register_index(operand: Value, count: usize) -> Option<RegisterIndex> {
  match RegisterIndex::try_from(operand) {
    Ok(idx) if idx < count => Some(idx),
    _                      => None
  }
}

/// A fixed-size bank of registers. The size never changes after construction.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Registers {
  values: Vec<Value>
}

impl Registers {

  pub fn zeroed(count: usize) -> Registers {
    Registers {
      values: vec![0; count]
    }
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn as_slice(&self) -> &[Value] {
    &self.values
  }

  pub fn get(&self, idx: RegisterIndex) -> Option<Value> {
    self.values.get(idx).copied()
  }

  /// Reads the register named by an instruction operand.
  pub fn read(&self, operand: Value) -> Result<Value, EvalError> {
    register_index(operand, self.len())
      .map(|idx| self.values[idx])
      .ok_or(EvalError::RegisterOutOfRange(operand))
  }

  /// Writes the register named by an instruction operand.
  pub fn write(&mut self, operand: Value, value: Value) -> Result<(), EvalError> {
    let idx = register_index(operand, self.len()).ok_or(EvalError::RegisterOutOfRange(operand))?;
    self.values[idx] = value;
    Ok(())
  }

  pub fn iter(&self) -> impl Iterator<Item = &Value> {
    self.values.iter()
  }

}

impl From<Vec<Value>> for Registers {
  fn from(values: Vec<Value>) -> Registers {
    Registers { values }
  }
}

impl Index<RegisterIndex> for Registers {
  type Output = Value;
  fn index(&self, idx: RegisterIndex) -> &Value {
    &self.values[idx]
  }
}

impl IndexMut<RegisterIndex> for Registers {
  fn index_mut(&mut self, idx: RegisterIndex) -> &mut Value {
    &mut self.values[idx]
  }
}

/// Same bracketed form the sample snapshots use: `[3, 2, 1, 1]`.
impl Display for Registers {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "[{}]",
      self.values
          .iter()
          .map(Value::to_string)
          .collect::<Vec<String>>()
          .join(", ")
    )
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn operand_to_index(){
    assert_eq!(register_index(0, 4), Some(0));
    assert_eq!(register_index(3, 4), Some(3));
    assert_eq!(register_index(4, 4), None);
    assert_eq!(register_index(-1, 4), None);
  }

  #[test]
  fn read_and_write(){
    let mut registers = Registers::zeroed(4);
    registers.write(2, 17).unwrap();
    assert_eq!(registers.read(2), Ok(17));
    assert_eq!(registers[2], 17);
    assert_eq!(registers.read(4), Err(EvalError::RegisterOutOfRange(4)));
    assert_eq!(registers.write(-3, 1), Err(EvalError::RegisterOutOfRange(-3)));
  }

  #[test]
  fn display_matches_snapshot_form(){
    let registers = Registers::from(vec![3, 2, -1, 1]);
    assert_eq!(registers.to_string(), "[3, 2, -1, 1]");
    assert_eq!(Registers::zeroed(0).to_string(), "[]");
  }

}

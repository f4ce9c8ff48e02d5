/*!

  The machine has sixteen operations over a small bank of signed 64 bit registers. Every
  instruction has the same shape: an operation and three integer operands `a`, `b`, and `c`.
  The result is always written to register `c`. Depending on the operation, `a` and `b` name
  registers, are literal values, or are ignored; see `Operand`.

  Instructions exist in two forms. An `Instruction` carries its `Mnemonic`. A
  `RawInstruction` carries a bare numeric identifier whose meaning is not known until a
  `Resolver` has matched identifiers to mnemonics.

  One design decision that needed to be made is whether to give every operation its own enum
  variant with its own operand payload. Since all sixteen share the `(a, b, c)` shape, the
  enum is only used for the operation itself, and operand roles are a property of the
  operation rather than of the instruction's type. This keeps instructions `Copy` and lets a
  sample be tested against every operation without reshaping it.

*/

mod instruction;
pub mod assembly;

pub use instruction::{
  Instruction,
  Mnemonic,
  MnemonicSet,
  OpcodeId,
  Operand,
  RawInstruction,
  OPCODE_COUNT
};

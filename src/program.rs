//! A validated, immutable sequence of instructions.

use std::fmt::{Display, Formatter};
use std::ops::Index;

use crate::bytecode::assembly::{is_header, parse_header, parse_instruction};
use crate::bytecode::{Instruction, Operand, RawInstruction};
use crate::error::LoadError;
use crate::registers::{register_index, RegisterIndex, Value};
use crate::resolver::OpcodeTable;

/**
  A program is created once and never mutated. Construction checks everything that can be
  checked statically, so that a running machine can only fail on arithmetic:

   1. every register-role operand and every `c` names one of `register_count` registers,
   2. the program counter register, if any, is one of them too.

  When `ip_register` is `None` the program counter is not visible to the program and the
  machine keeps it internally.
*/
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Program {
  instructions   : Vec<Instruction>,
  ip_register    : Option<RegisterIndex>,
  register_count : usize,
}

impl Program {

  /**
    Validates and wraps a list of instructions. Errors report the instruction's 1-based
    position as the line.
  */
  pub fn new(
    instructions   : Vec<Instruction>,
    ip_register    : Option<RegisterIndex>,
    register_count : usize
  ) -> Result<Program, LoadError>
  {
    let lines: Vec<usize> = (1..=instructions.len()).collect();
    Program::with_lines(instructions, &lines, ip_register, 0, register_count)
  }

  /// Parses assembly text. See `from_lines`.
  pub fn parse(text: &str, register_count: usize) -> Result<Program, LoadError> {
    Program::from_lines(text.lines(), register_count)
  }

  /**
    Parses assembly from a line iterator. The first non-blank line may be a `#ip <N>` header;
    every other non-blank line is an instruction. Blank lines are skipped but still counted,
    so error line numbers match the source.
  */
  pub fn from_lines<I, S>(lines: I, register_count: usize) -> Result<Program, LoadError>
    where I: IntoIterator<Item = S>,
          S: AsRef<str>
  {
    let mut ip_register          = None;
    let mut header_line          = 0;
    let mut instructions         = Vec::new();
    let mut instruction_lines    = Vec::new();

    for (idx, line) in lines.into_iter().enumerate() {
      let text = line.as_ref();
      let line_number = idx + 1;

      if text.trim().is_empty() {
        continue;
      }

      match is_header(text) {

        true if instructions.is_empty() && ip_register.is_none() => {
          ip_register = Some(parse_header(line_number, text)?);
          header_line = line_number;
        }

        // A second header, or one after the first instruction.
        true => {
          return Err(LoadError::MalformedInstruction {
            line: line_number,
            text: text.to_string()
          });
        }

        false => {
          instructions.push(parse_instruction(line_number, text)?);
          instruction_lines.push(line_number);
        }

      }
    }

    Program::with_lines(instructions, &instruction_lines, ip_register, header_line, register_count)
  }

  /**
    Translates a numeric instruction stream through a resolved opcode table. The result has no
    program counter register: the stream is executed top to bottom.
  */
  pub fn decode(
    raw            : &[RawInstruction],
    table          : &OpcodeTable,
    register_count : usize
  ) -> Result<Program, LoadError>
  {
    let instructions =
      raw.iter()
         .enumerate()
         .map(|(idx, instruction)| {
           match table.mnemonic(instruction.id) {
             Some(op) => Ok(instruction.with_op(op)),
             None     => Err(LoadError::UnknownOpcode {
               line: idx + 1,
               name: instruction.id.to_string()
             })
           }
         })
         .collect::<Result<Vec<Instruction>, LoadError>>()?;

    Program::new(instructions, None, register_count)
  }

  fn with_lines(
    instructions   : Vec<Instruction>,
    lines          : &[usize],
    ip_register    : Option<RegisterIndex>,
    header_line    : usize,
    register_count : usize
  ) -> Result<Program, LoadError>
  {
    if let Some(ip) = ip_register {
      if ip >= register_count {
        return Err(LoadError::RegisterOutOfRange {
          line     : header_line,
          register : ip as Value,
          count    : register_count
        });
      }
    }

    for (instruction, &line) in instructions.iter().zip(lines) {
      let (a_role, b_role) = instruction.op.operands();
      let register_operands =
        [(a_role, instruction.a), (b_role, instruction.b), (Operand::Register, instruction.c)];

      for &(role, operand) in register_operands.iter() {
        if role == Operand::Register && register_index(operand, register_count).is_none() {
          return Err(LoadError::RegisterOutOfRange {
            line,
            register : operand,
            count    : register_count
          });
        }
      }
    }

    Ok(Program { instructions, ip_register, register_count })
  }

  pub fn len(&self) -> usize {
    self.instructions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.instructions.is_empty()
  }

  pub fn get(&self, pc: usize) -> Option<&Instruction> {
    self.instructions.get(pc)
  }

  pub fn instructions(&self) -> &[Instruction] {
    &self.instructions
  }

  pub fn ip_register(&self) -> Option<RegisterIndex> {
    self.ip_register
  }

  pub fn register_count(&self) -> usize {
    self.register_count
  }

}

impl Index<usize> for Program {
  type Output = Instruction;
  fn index(&self, pc: usize) -> &Instruction {
    &self.instructions[pc]
  }
}

/// Writes the program back out as assembly that `Program::parse` accepts.
impl Display for Program {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    if let Some(ip) = self.ip_register {
      writeln!(f, "#ip {}", ip)?;
    }
    for instruction in &self.instructions {
      writeln!(f, "{}", instruction)?;
    }
    Ok(())
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::Mnemonic;

  const SAMPLE_PROGRAM: &str = "#ip 0
seti 5 0 1
seti 6 0 2
addi 0 1 0
addr 1 2 3
setr 1 0 0
seti 8 0 4
seti 9 0 5
";

  #[test]
  fn parse_with_header(){
    let program = Program::parse(SAMPLE_PROGRAM, 6).unwrap();
    assert_eq!(program.len(), 7);
    assert_eq!(program.ip_register(), Some(0));
    assert_eq!(program.register_count(), 6);
    assert_eq!(program[2], Instruction::new(Mnemonic::Addi, 0, 1, 0));
  }

  #[test]
  fn display_round_trips(){
    let program = Program::parse(SAMPLE_PROGRAM, 6).unwrap();
    assert_eq!(program.to_string(), SAMPLE_PROGRAM);
    assert_eq!(Program::parse(&program.to_string(), 6), Ok(program));
  }

  #[test]
  fn header_is_optional(){
    let program = Program::parse("\nseti 5 0 0\n\naddi 0 1 0\n", 4).unwrap();
    assert_eq!(program.ip_register(), None);
    assert_eq!(program.len(), 2);
  }

  #[test]
  fn error_lines_count_blank_lines(){
    let result = Program::parse("#ip 0\n\nseti 5 0 0\nmodr 1 2 3\n", 6);
    assert_eq!(result, Err(LoadError::UnknownOpcode { line: 4, name: "modr".to_string() }));
  }

  #[test]
  fn late_or_repeated_header_is_rejected(){
    assert!(matches!(
      Program::parse("seti 5 0 0\n#ip 1\n", 6),
      Err(LoadError::MalformedInstruction { line: 2, .. })
    ));
    assert!(matches!(
      Program::parse("#ip 1\n#ip 2\n", 6),
      Err(LoadError::MalformedInstruction { line: 2, .. })
    ));
  }

  #[test]
  fn registers_are_validated_at_load(){
    assert_eq!(
      Program::parse("#ip 0\nseti 5 0 6\n", 6),
      Err(LoadError::RegisterOutOfRange { line: 2, register: 6, count: 6 })
    );
    assert_eq!(
      Program::parse("#ip 6\nseti 5 0 0\n", 6),
      Err(LoadError::RegisterOutOfRange { line: 1, register: 6, count: 6 })
    );
    assert_eq!(
      Program::parse("gtir 9 -1 0\n", 4),
      Err(LoadError::RegisterOutOfRange { line: 1, register: -1, count: 4 })
    );
    // Literal and ignored operands are unrestricted.
    assert!(Program::parse("seti 99 -4 0\nbani 1 123456 2\ngtir 9 1 0\n", 4).is_ok());
  }

  #[test]
  fn built_in_code(){
    let program = Program::new(
      vec![Instruction::new(Mnemonic::Addr, 0, 1, 2), Instruction::new(Mnemonic::Mulr, 0, 7, 2)],
      None,
      4
    );
    assert_eq!(program, Err(LoadError::RegisterOutOfRange { line: 2, register: 7, count: 4 }));
  }

  #[test]
  fn decode_through_table(){
    let table = OpcodeTable::from_pairs(
      Mnemonic::all().enumerate().map(|(id, op)| (id as u8, op))
    ).unwrap();
    let raw = vec![RawInstruction::new(9, 7, 0, 0), RawInstruction::new(1, 0, 1, 0)];
    let program = Program::decode(&raw, &table, 4).unwrap();
    assert_eq!(program[0], Instruction::new(Mnemonic::Seti, 7, 0, 0));
    assert_eq!(program[1], Instruction::new(Mnemonic::Addi, 0, 1, 0));
    assert_eq!(program.ip_register(), None);

    let partial = OpcodeTable::from_pairs(vec![(1, Mnemonic::Addi)]).unwrap();
    assert_eq!(
      Program::decode(&raw, &partial, 4),
      Err(LoadError::UnknownOpcode { line: 1, name: "9".to_string() })
    );
  }

}

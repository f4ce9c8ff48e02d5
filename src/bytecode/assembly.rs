/*!
  The human readable textual form of programs is called assembly. This module parses the line
  shapes that appear in program and sample files:

    ```text
    <header>      ::= '#ip' <space>+ <digit>+
    <instruction> ::= <mnemonic> (<space>+ <integer>){3}
    <raw>         ::= <digit>+ (<space>+ <integer>){3}
    <snapshot>    ::= ('Before:' | 'After:') <space>* '[' <integer> (',' <integer>)* ']'
    <integer>     ::= '-'? <digit>+
    ```

  Each function takes a single line together with its 1-based line number, which ends up in
  the `LoadError` when the line is rejected. Mnemonic lookup leverages the `strum` derives of
  `Mnemonic`.
*/

use std::str::FromStr;

use nom::{
  bytes::complete::tag,
  character::complete::{
    alpha1,
    char as one_char,
    digit1,
    space0,
    space1
  },
  combinator::{all_consuming, map_res, opt, recognize},
  multi::separated_list,
  sequence::{
    delimited,
    pair,
    preceded,
    tuple
  },
  IResult
};

use crate::bytecode::{Instruction, Mnemonic, OpcodeId, RawInstruction, OPCODE_COUNT};
use crate::error::LoadError;
use crate::registers::{RegisterIndex, Registers, Value};

/// Directive that binds the program counter to a register.
pub const HEADER_DIRECTIVE: &str = "#ip";

// region Parsers

fn value_p(input: &str) -> IResult<&str, Value> {
  map_res(
    recognize(pair(opt(one_char('-')), digit1)),
    |text: &str| text.parse::<Value>()
  )(input)
}

fn operands_p(input: &str) -> IResult<&str, (Value, Value, Value)> {
  tuple((
    preceded(space1, value_p),
    preceded(space1, value_p),
    preceded(space1, value_p)
  ))(input)
}

fn header_p(input: &str) -> IResult<&str, RegisterIndex> {
  preceded(
    pair(tag(HEADER_DIRECTIVE), space1),
    map_res(digit1, |text: &str| text.parse::<RegisterIndex>())
  )(input)
}

fn instruction_p(input: &str) -> IResult<&str, (&str, (Value, Value, Value))> {
  pair(alpha1, operands_p)(input)
}

fn raw_instruction_p(input: &str) -> IResult<&str, (OpcodeId, (Value, Value, Value))> {
  pair(
    map_res(digit1, |text: &str| text.parse::<OpcodeId>()),
    operands_p
  )(input)
}

fn snapshot_p(input: &str) -> IResult<&str, Vec<Value>> {
  delimited(
    pair(one_char('['), space0),
    separated_list(delimited(space0, one_char(','), space0), value_p),
    pair(space0, one_char(']'))
  )(input)
}

// endregion

/// Whether a line is a `#ip` directive, well formed or not.
pub fn is_header(text: &str) -> bool {
  text.trim_start().starts_with(HEADER_DIRECTIVE)
}

/// Parses `#ip <N>`, returning the program counter register.
pub fn parse_header(line: usize, text: &str) -> Result<RegisterIndex, LoadError> {
  match all_consuming(header_p)(text.trim()) {
    Ok((_, register)) => Ok(register),
    Err(_e)           => Err(LoadError::MalformedHeader { line, text: text.to_string() })
  }
}

/// Parses `<mnemonic> <a> <b> <c>`.
pub fn parse_instruction(line: usize, text: &str) -> Result<Instruction, LoadError> {
  let (name, (a, b, c)) =
    match all_consuming(instruction_p)(text.trim()) {
      Ok((_, parsed)) => parsed,
      Err(_e)         => {
        return Err(LoadError::MalformedInstruction { line, text: text.to_string() });
      }
    };

  match Mnemonic::from_str(name) {
    Ok(op)  => Ok(Instruction::new(op, a, b, c)),
    Err(_e) => Err(LoadError::UnknownOpcode { line, name: name.to_string() })
  }
}

/// Parses `<id> <a> <b> <c>`, where `id` is a numeric opcode identifier.
pub fn parse_raw_instruction(line: usize, text: &str) -> Result<RawInstruction, LoadError> {
  match all_consuming(raw_instruction_p)(text.trim()) {

    Ok((_, (id, _))) if id as usize >= OPCODE_COUNT => {
      Err(LoadError::UnknownOpcode { line, name: id.to_string() })
    }

    Ok((_, (id, (a, b, c)))) => Ok(RawInstruction::new(id, a, b, c)),

    Err(_e) => Err(LoadError::MalformedInstruction { line, text: text.to_string() })

  }
}

/// Parses a labelled register snapshot such as `Before: [3, 2, 1, 1]`.
pub fn parse_snapshot(line: usize, label: &str, text: &str) -> Result<Registers, LoadError> {
  let parsed = all_consuming(preceded(pair(tag(label), space0), snapshot_p))(text.trim());
  match parsed {
    Ok((_, values)) => Ok(Registers::from(values)),
    Err(_e)         => Err(LoadError::MalformedSample { line, text: text.to_string() })
  }
}

/*!
  An annotated program listing for working out what a program computes.

  Each line of a `Listing` carries the instruction's execution count from a `Profile`, a
  marker on the line the program counter is at, and a short note: jumps are classified, and
  the common operations get a plain-language gloss. On the current line the gloss shows the
  live register values.

  ```text
     17 00000001 seti 0 _ 4 - store 0 in r[4]
  PC 18 00000391 addi 4 1 3 - add 1 to r[4]=390, store in r[3]
     19 00000390 muli 3 256 3 - multiply r[3] by 256, store in r[3]
  ```
*/

use std::fmt::{Display, Formatter};
use std::io::Write;

use crate::bytecode::{Instruction, Mnemonic, Operand};
use crate::machine::FetchObserver;
use crate::program::Program;
use crate::registers::{register_index, Registers, Value};

/// Per-instruction execution counts, gathered as a `FetchObserver`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Profile {
  counts: Vec<u64>
}

impl Profile {

  pub fn new(program: &Program) -> Profile {
    Profile {
      counts: vec![0; program.len()]
    }
  }

  pub fn count(&self, pc: usize) -> u64 {
    self.counts.get(pc).copied().unwrap_or(0)
  }

  pub fn counts(&self) -> &[u64] {
    &self.counts
  }

  pub fn total(&self) -> u64 {
    self.counts.iter().sum()
  }

}

impl FetchObserver for Profile {
  fn on_fetch(&mut self, pc: usize, _instruction: &Instruction) {
    if let Some(count) = self.counts.get_mut(pc) {
      *count += 1;
    }
  }
}

/// How an instruction that writes the program counter register moves control.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum JumpKind {
  /// `addi pc k pc`: continues at a fixed instruction.
  RelativeLiteral { target: Value },
  /// `addr pc r pc`: skips `r[register]` instructions.
  RelativeRegister { register: Value },
  /// `setr r _ pc`: continues at `r[register] + 1`.
  Absolute { register: Value },
  /// `seti k _ pc`: continues at `k + 1`.
  ToLiteral { target: Value },
  /// Anything else that writes the program counter.
  Other,
}

impl JumpKind {

  /// Classifies the instruction at `index`, or returns `None` if it does not write `ip`.
  pub fn classify(index: usize, instruction: &Instruction, ip: Value) -> Option<JumpKind> {
    let Instruction { op, a, b, c } = *instruction;
    if c != ip {
      return None;
    }

    let kind =
      match op {
        Mnemonic::Addi if a == ip => {
          JumpKind::RelativeLiteral { target: (index as Value).saturating_add(b).saturating_add(1) }
        }
        Mnemonic::Addr if a == ip => JumpKind::RelativeRegister { register: b },
        Mnemonic::Addr if b == ip => JumpKind::RelativeRegister { register: a },
        Mnemonic::Setr            => JumpKind::Absolute { register: a },
        Mnemonic::Seti            => JumpKind::ToLiteral { target: a.saturating_add(1) },
        _                         => JumpKind::Other
      };
    Some(kind)
  }

}

/// One line of a `Listing`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct AnnotatedLine {
  pub index       : usize,
  pub count       : u64,
  pub current     : bool,
  pub instruction : Instruction,
  pub jump        : Option<JumpKind>,
  pub note        : Option<String>,
}

impl AnnotatedLine {
  /// The instruction with ignored operands shown as `_`.
  pub fn text(&self) -> String {
    let Instruction { op, a, b, c } = self.instruction;
    let (a_role, b_role) = op.operands();
    let operand = |role: Operand, value: Value| {
      match role {
        Operand::Ignored => "_".to_string(),
        _                => value.to_string()
      }
    };
    format!("{} {} {} {}", op, operand(a_role, a), operand(b_role, b), c)
  }
}

impl Display for AnnotatedLine {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let marker =
      match self.current {
        true  => "PC ",
        false => "   "
      };
    write!(f, "{}{:02} {:08} {}", marker, self.index, self.count, self.text())?;
    if let Some(note) = &self.note {
      write!(f, " - {}", note)?;
    }
    Ok(())
  }
}

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Listing {
  lines: Vec<AnnotatedLine>
}

impl Listing {

  pub fn lines(&self) -> &[AnnotatedLine] {
    &self.lines
  }

  /// The line the program counter is at, if it is inside the program.
  pub fn current(&self) -> Option<&AnnotatedLine> {
    self.lines.iter().find(|line| line.current)
  }

  pub fn write_to<W: Write>(&self, sink: &mut W) -> std::io::Result<()> {
    write!(sink, "{}", self)
  }

}

impl Display for Listing {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    for line in &self.lines {
      writeln!(f, "{}", line)?;
    }
    Ok(())
  }
}

/// Hexadecimal as sign and magnitude.
fn hex(value: Value) -> String {
  match value < 0 {
    true  => format!("-{:x}", value.unsigned_abs()),
    false => format!("{:x}", value)
  }
}

/// Names register `r`, with its value when `live` registers are given.
fn register_text(r: Value, live: Option<&Registers>, as_hex: bool) -> String {
  let value = live.and_then(|registers| {
    register_index(r, registers.len()).map(|idx| registers[idx])
  });

  match (value, as_hex) {
    (Some(value), false) => format!("r[{}]={}", r, value),
    (Some(value), true)  => format!("r[{}]={}", r, hex(value)),
    (None, _)            => format!("r[{}]", r)
  }
}

fn jump_note(kind: JumpKind, live: Option<&Registers>) -> String {
  match kind {
    JumpKind::RelativeLiteral { target } => format!("relative jump, to instruction {}", target),
    JumpKind::RelativeRegister { register } => {
      format!("relative jump, {} steps", register_text(register, live, false))
    }
    JumpKind::Absolute { register } => {
      format!("absolute jump, to {} + 1", register_text(register, live, false))
    }
    JumpKind::ToLiteral { target } => format!("jump to instruction {}", target),
    JumpKind::Other                => "modifies pc".to_string(),
  }
}

fn gloss(instruction: &Instruction, live: Option<&Registers>) -> Option<String> {
  let Instruction { op, a, b, c } = *instruction;
  let r = |operand: Value| register_text(operand, live, false);

  let text =
    match op {
      Mnemonic::Seti => format!("store {} in r[{}]", a, c),
      Mnemonic::Setr => format!("copy {} to r[{}]", r(a), c),
      Mnemonic::Addi => format!("add {} to {}, store in r[{}]", b, r(a), c),
      Mnemonic::Addr => format!("add {} with {}, store in r[{}]", r(a), r(b), c),
      Mnemonic::Muli => format!("multiply {} by {}, store in r[{}]", r(a), b, c),
      Mnemonic::Mulr => format!("multiply {} with {}, store in r[{}]", r(a), r(b), c),
      Mnemonic::Eqrr => format!("if {} == {}, set r[{}] = 1", r(a), r(b), c),
      Mnemonic::Gtrr => format!("if {} > {}, set r[{}] = 1", r(a), r(b), c),
      Mnemonic::Bani => {
        format!("{} & {} (bitwise AND), store in r[{}]", register_text(a, live, true), hex(b), c)
      }
      Mnemonic::Bori => {
        format!("{} | {} (bitwise OR), store in r[{}]", register_text(a, live, true), hex(b), c)
      }
      _ => return None
    };
  Some(text)
}

/**
  Builds the annotated listing of `program`. The current line is the one the program counter
  register in `registers` points at; programs without a program counter register have none.
*/
pub fn disassemble(program: &Program, profile: &Profile, registers: &Registers) -> Listing {
  let ip = program.ip_register();
  let current_pc = ip.and_then(|ip| registers.get(ip));

  let lines =
    program.instructions()
           .iter()
           .enumerate()
           .map(|(index, instruction)| {
             let current = current_pc == Some(index as Value);
             let live    = match current {
               true  => Some(registers),
               false => None
             };
             let jump = ip.and_then(|ip| JumpKind::classify(index, instruction, ip as Value));
             let note =
               match jump {
                 Some(kind) => Some(jump_note(kind, live)),
                 None       => gloss(instruction, live)
               };

             AnnotatedLine {
               index,
               count: profile.count(index),
               current,
               instruction: *instruction,
               jump,
               note
             }
           })
           .collect();

  Listing { lines }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::machine::{Machine, Outcome, RunOptions};

  const JUMPS: &str = "#ip 1
addi 1 2 1
addr 4 1 1
setr 3 0 1
seti 7 0 1
mulr 1 1 1
bani 2 255 5
";

  #[test]
  fn profile_counts_each_fetch(){
    let program = Program::parse("#ip 1\naddi 0 1 0\nseti -1 0 1", 2).unwrap();
    let mut profile = Profile::new(&program);
    let mut machine = Machine::new(&program);

    let outcome = machine.run_with(RunOptions::new().max_steps(10).observe(&mut profile));
    assert_eq!(outcome, Ok(Outcome::BudgetExhausted { steps: 10 }));
    assert_eq!(profile.counts(), &[5, 5]);
    assert_eq!(profile.total(), 10);
    assert_eq!(profile.count(7), 0);
  }

  #[test]
  fn jumps_are_classified(){
    let program = Program::parse(JUMPS, 6).unwrap();
    let listing = disassemble(&program, &Profile::new(&program), &Registers::zeroed(6));
    let jumps: Vec<Option<JumpKind>> = listing.lines().iter().map(|line| line.jump).collect();

    assert_eq!(
      jumps,
      vec![
        Some(JumpKind::RelativeLiteral { target: 3 }),
        Some(JumpKind::RelativeRegister { register: 4 }),
        Some(JumpKind::Absolute { register: 3 }),
        Some(JumpKind::ToLiteral { target: 8 }),
        Some(JumpKind::Other),
        None,
      ]
    );
    assert_eq!(listing.lines()[2].text(), "setr 3 _ 1");
    assert_eq!(listing.lines()[3].text(), "seti 7 _ 1");
  }

  #[test]
  fn current_line_shows_live_values(){
    let program = Program::parse(JUMPS, 6).unwrap();

    let registers = Registers::from(vec![0, 5, 500, 0, 0, 0]);
    let listing = disassemble(&program, &Profile::new(&program), &registers);
    let current = listing.current().unwrap();
    assert_eq!(current.index, 5);
    assert_eq!(
      current.note.as_deref(),
      Some("r[2]=1f4 & ff (bitwise AND), store in r[5]")
    );

    let registers = Registers::from(vec![0, 1, 0, 0, 2, 0]);
    let listing = disassemble(&program, &Profile::new(&program), &registers);
    assert_eq!(listing.lines()[1].note.as_deref(), Some("relative jump, r[4]=2 steps"));
    assert_eq!(listing.lines()[5].note.as_deref(), Some("r[2] & ff (bitwise AND), store in r[5]"));
  }

  #[test]
  fn negative_hex_is_sign_and_magnitude(){
    let program = Program::parse("#ip 2\nbani 0 -1 1\nbori 0 -256 1\n", 3).unwrap();

    let listing = disassemble(&program, &Profile::new(&program), &Registers::from(vec![-255, 0, 1]));
    assert_eq!(listing.lines()[0].note.as_deref(), Some("r[0] & -1 (bitwise AND), store in r[1]"));
    assert_eq!(
      listing.lines()[1].note.as_deref(),
      Some("r[0]=-ff | -100 (bitwise OR), store in r[1]")
    );
    assert_eq!(hex(Value::min_value()), "-8000000000000000");
  }

  #[test]
  fn program_without_ip_register_has_no_jumps(){
    let program = Program::parse("seti 3 0 1\naddr 1 1 2\n", 4).unwrap();
    let listing = disassemble(&program, &Profile::new(&program), &Registers::zeroed(4));
    assert_eq!(listing.current(), None);
    assert_eq!(listing.lines()[0].note.as_deref(), Some("store 3 in r[1]"));
    assert_eq!(listing.lines()[1].note.as_deref(), Some("add r[1] with r[1], store in r[2]"));
  }

  #[test]
  fn listing_is_written_line_by_line(){
    let program = Program::parse(JUMPS, 6).unwrap();
    let mut profile = Profile::new(&program);
    profile.on_fetch(0, &program[0]);

    let mut sink: Vec<u8> = Vec::new();
    disassemble(&program, &profile, &Registers::zeroed(6)).write_to(&mut sink).unwrap();
    let text = String::from_utf8(sink).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.len(), program.len());
    assert_eq!(lines[0], "PC 00 00000001 addi 1 2 1 - relative jump, to instruction 3");
    assert_eq!(lines[4], "   04 00000000 mulr 1 1 1 - modifies pc");
  }

}

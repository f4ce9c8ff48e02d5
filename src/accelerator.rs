/*!
  Peephole shortcuts for hot loops.

  An accelerator is installed at a program counter value with `Machine::accelerate`. Whenever
  the machine is about to fetch at that pc it first offers the registers to the accelerator,
  which either declines or applies the net effect of a stretch of code in one go and names the
  pc to continue at. An accelerator must leave the registers exactly as the interpreted code
  would have, or the machine's results are no longer those of the program.
*/

use std::convert::TryFrom;

use crate::bytecode::{Instruction, Mnemonic};
use crate::machine::Machine;
use crate::program::Program;
use crate::registers::{RegisterIndex, Registers, Value};

pub trait Accelerator {
  /// Returns the next program counter value, or `None` to fall back to interpretation.
  fn accelerate(&mut self, registers: &mut Registers) -> Option<Value>;
}

impl<F> Accelerator for F
  where F: FnMut(&mut Registers) -> Option<Value>
{
  fn accelerate(&mut self, registers: &mut Registers) -> Option<Value> {
    self(registers)
  }
}

/// Number of instructions in a `ScaledCounterLoop`.
pub const LOOP_LENGTH: usize = 8;

/**
  The loop

  ```text
  entry+0: addi counter 1 scratch
  entry+1: muli scratch scale scratch
  entry+2: gtrr scratch bound scratch
  entry+3: addr scratch ip ip
  entry+4: addi ip 1 ip
  entry+5: seti exit _ ip
  entry+6: addi counter 1 counter
  entry+7: seti entry-1 _ ip
  ```

  increments `counter` until `(counter + 1) * scale > bound` and then leaves through the jump
  at `entry+5`. Interpreted, that is seven steps per increment. The closed form is
  `counter = bound div scale` (floor division), unless the test already holds on entry, in
  which case the counter is left alone. The operands of `addr` may come in either order.
*/
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct ScaledCounterLoop {
  counter : RegisterIndex,
  scratch : RegisterIndex,
  bound   : RegisterIndex,
  scale   : Value,
  exit    : Value,
}

impl ScaledCounterLoop {

  /// Recognizes the loop starting at `entry`. Requires a program counter register.
  pub fn detect(program: &Program, entry: usize) -> Option<ScaledCounterLoop> {
    use Mnemonic::*;

    let ip   = program.ip_register()? as Value;
    let body = program.instructions().get(entry..entry.checked_add(LOOP_LENGTH)?)?;

    let (counter, scratch) =
      match body[0] {
        Instruction { op: Addi, a, b: 1, c } => (a, c),
        _                                    => return None
      };

    let scale =
      match body[1] {
        Instruction { op: Muli, a, b, c } if a == scratch && c == scratch && b > 0 => b,
        _                                                                        => return None
      };

    let bound =
      match body[2] {
        Instruction { op: Gtrr, a, b, c } if a == scratch && c == scratch => b,
        _                                                                => return None
      };

    let skips =
      match body[3] {
        Instruction { op: Addr, a, b, c } => {
          c == ip && ((a == scratch && b == ip) || (a == ip && b == scratch))
        }
        _ => false
      };

    let exit =
      match body[5] {
        Instruction { op: Seti, a, c, .. } if c == ip => a.checked_add(1)?,
        _                                             => return None
      };

    let loops_back =
      match body[7] {
        Instruction { op: Seti, a, c, .. } => c == ip && a == entry as Value - 1,
        _                                  => false
      };

    let shape_matches =
      skips
      && loops_back
      && body[4] == Instruction::new(Addi, ip, 1, ip)
      && body[6] == Instruction::new(Addi, counter, 1, counter);
    if !shape_matches {
      return None;
    }

    let roles = [counter, scratch, bound, ip];
    for (i, role) in roles.iter().enumerate() {
      if roles[i + 1..].contains(role) {
        return None;
      }
    }

    Some(ScaledCounterLoop {
      counter : RegisterIndex::try_from(counter).ok()?,
      scratch : RegisterIndex::try_from(scratch).ok()?,
      bound   : RegisterIndex::try_from(bound).ok()?,
      scale,
      exit
    })
  }

  /// The program counter value the loop leaves to.
  pub fn exit(&self) -> Value {
    self.exit
  }

}

impl Accelerator for ScaledCounterLoop {
  /// Declines whenever the interpreted loop would overflow, so the error surfaces there.
  fn accelerate(&mut self, registers: &mut Registers) -> Option<Value> {
    let counter = registers.get(self.counter)?;
    let bound   = registers.get(self.bound)?;
    registers.get(self.scratch)?;

    let first_test = counter.checked_add(1)?.checked_mul(self.scale)?;
    let last =
      match first_test > bound {

        true  => counter,

        false => {
          let last = bound.div_euclid(self.scale);
          match last.checked_add(1)?.checked_mul(self.scale) {
            Some(_) => last,
            None    => return None
          }
        }

      };

    registers[self.counter] = last;
    registers[self.scratch] = 1;
    Some(self.exit)
  }
}

/// Installs a `ScaledCounterLoop` at every pc where one is detected. Returns how many.
pub fn accelerate_program(machine: &mut Machine<'_>) -> usize {
  let program = machine.program();
  let mut installed = 0;

  for entry in 0..program.len() {
    if let Some(shortcut) = ScaledCounterLoop::detect(program, entry) {
      #[cfg(feature = "trace_computation")]
        println!("accelerating loop at {}: {:?}", entry, shortcut);

      machine.accelerate(entry, shortcut);
      installed += 1;
    }
  }
  installed
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::machine::Outcome;
  use proptest::prelude::*;

  fn counting_program(counter: Value, bound: Value, scale: Value) -> Program {
    let text = format!("#ip 1
seti {bound} 0 3
seti {counter} 0 2
addi 2 1 4
muli 4 {scale} 4
gtrr 4 3 4
addr 4 1 1
addi 1 1 1
seti 9 0 1
addi 2 1 2
seti 1 0 1
seti 99 0 0
", bound = bound, counter = counter, scale = scale);
    Program::parse(&text, 6).unwrap()
  }

  fn run(program: &Program, accelerated: bool) -> (Registers, u64) {
    let mut machine = Machine::new(program);
    if accelerated {
      accelerate_program(&mut machine);
    }
    let outcome = machine.run().unwrap();
    (machine.registers().clone(), outcome.steps())
  }

  #[test]
  fn detects_the_loop_at_its_entry(){
    let program = counting_program(0, 100_000, 256);
    let shortcut = ScaledCounterLoop::detect(&program, 2).unwrap();
    assert_eq!(shortcut.exit(), 10);
    assert_eq!(
      shortcut,
      ScaledCounterLoop { counter: 2, scratch: 4, bound: 3, scale: 256, exit: 10 }
    );
    assert_eq!(ScaledCounterLoop::detect(&program, 1), None);
    assert_eq!(ScaledCounterLoop::detect(&program, 3), None);

    let mut machine = Machine::new(&program);
    assert_eq!(accelerate_program(&mut machine), 1);
  }

  #[test]
  fn needs_an_ip_register(){
    let with_header = counting_program(0, 10, 2).to_string();
    let without: String = with_header.lines().skip(1).collect::<Vec<_>>().join("\n");
    let program = Program::parse(&without, 6).unwrap();
    assert_eq!(ScaledCounterLoop::detect(&program, 2), None);
  }

  #[test]
  fn rejects_a_loop_that_jumps_elsewhere(){
    let text = counting_program(0, 10, 2).to_string().replace("seti 1 0 1", "seti 0 0 1");
    let program = Program::parse(&text, 6).unwrap();
    assert_eq!(ScaledCounterLoop::detect(&program, 2), None);
  }

  #[test]
  fn accelerated_run_matches_interpreted_run(){
    let program = counting_program(0, 100_000, 256);
    let (interpreted, slow_steps) = run(&program, false);
    let (accelerated, fast_steps) = run(&program, true);

    assert_eq!(interpreted.as_slice(), &[99, 11, 390, 100_000, 1, 0]);
    assert_eq!(accelerated, interpreted);
    assert_eq!(slow_steps, 2 + 390 * 7 + 5 + 1);
    assert_eq!(fast_steps, 4);
  }

  #[test]
  fn counter_already_past_the_bound(){
    let program = counting_program(50, 100, 3);
    let (interpreted, _) = run(&program, false);
    let (accelerated, _) = run(&program, true);
    assert_eq!(interpreted[2], 50);
    assert_eq!(accelerated, interpreted);
  }

  #[test]
  fn declines_when_the_loop_would_overflow(){
    let mut shortcut = ScaledCounterLoop { counter: 0, scratch: 1, bound: 2, scale: 2, exit: 9 };
    let mut registers = Registers::from(vec![Value::max_value() - 1, 0, Value::max_value()]);
    let before = registers.clone();
    assert_eq!(shortcut.accelerate(&mut registers), None);
    assert_eq!(registers, before);
  }

  #[test]
  fn shortcut_is_one_step_for_the_budget(){
    let program = counting_program(0, 1_000, 7);
    let mut machine = Machine::new(&program);
    accelerate_program(&mut machine);
    assert_eq!(machine.run_for(3), Ok(Outcome::BudgetExhausted { steps: 3 }));
    assert_eq!(machine.registers()[2], 142);
    assert_eq!(machine.pc_value(), 10);
  }

  proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn closed_form_agrees_with_interpretation(
      counter in -100i64..100,
      bound   in -200i64..2_000,
      scale   in 1i64..50
    ){
      let program = counting_program(counter, bound, scale);
      let (interpreted, _) = run(&program, false);
      let (accelerated, _) = run(&program, true);
      prop_assert_eq!(accelerated, interpreted);
    }
  }

}

/*!
  Deduces which numeric opcode identifier stands for which mnemonic from observed samples.

  A `Sample` records the registers before and after one instruction whose opcode is only known
  by number. Testing the sample against all sixteen operations gives its candidate set. The
  feasible set of an identifier is the intersection of the candidate sets of all samples that
  carry it; identifiers without samples start out feasible for everything.

  Resolution then repeatedly fixes an identifier whose feasible set is a single mnemonic and
  removes that mnemonic from every other feasible set, until all sixteen identifiers are fixed.
  If elimination stalls first, the samples are underconstrained and the caller gets an error
  carrying what was fixed so far. Nothing is guessed.
*/

use std::fmt::{Display, Formatter};

use bimap::BiMap;
use prettytable::Table;

use crate::bytecode::assembly::{parse_raw_instruction, parse_snapshot};
use crate::bytecode::{Mnemonic, MnemonicSet, OpcodeId, RawInstruction, OPCODE_COUNT};
use crate::display::TABLE_DISPLAY_FORMAT;
use crate::error::{LoadError, ResolveError};
use crate::registers::Registers;

pub const BEFORE_LABEL: &str = "Before:";
pub const AFTER_LABEL: &str = "After:";

/// The number of candidates from which a sample counts as ambiguous in the usual statistic.
pub const AMBIGUITY_THRESHOLD: usize = 3;

// region Samples

/// One observation of an instruction with an unknown opcode.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Sample {
  pub before      : Registers,
  pub instruction : RawInstruction,
  pub after       : Registers,
}

impl Sample {

  pub fn new(before: Registers, instruction: RawInstruction, after: Registers) -> Sample {
    Sample { before, instruction, after }
  }

  /// Whether `op`, applied to `before`, reproduces `after` exactly.
  pub fn behaves_like(&self, op: Mnemonic) -> bool {
    let RawInstruction { a, b, c, .. } = self.instruction;
    op.apply(&self.before, a, b, c)
      .map_or(false, |registers| registers == self.after)
  }

  /// Every mnemonic consistent with this sample.
  pub fn candidates(&self) -> MnemonicSet {
    Mnemonic::all().filter(|op| self.behaves_like(*op)).collect()
  }

}

impl Display for Sample {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{} {}\n{}\n{}  {}",
      BEFORE_LABEL, self.before, self.instruction, AFTER_LABEL, self.after
    )
  }
}

/// The contents of a sample file: the samples and the numeric program that may follow them.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct SampleFile {
  pub samples : Vec<Sample>,
  pub program : Vec<RawInstruction>,
}

/**
  Parses sample blocks of the form

    ```text
    Before: [3, 2, 1, 1]
    9 2 1 2
    After:  [3, 2, 2, 1]
    ```

  separated by blank lines. Any numeric instruction lines after the last block make up the
  trailing program. A block after the program has started is rejected.
*/
pub fn parse_samples(text: &str) -> Result<SampleFile, LoadError> {
  SampleFile::from_lines(text.lines())
}

impl SampleFile {

  /// As `parse_samples`, but over any line iterator. Line numbers count every line given.
  pub fn from_lines<I, S>(lines: I) -> Result<SampleFile, LoadError>
    where I: IntoIterator<Item = S>,
          S: AsRef<str>
  {
    let mut file  = SampleFile::default();
    let mut lines = lines.into_iter().enumerate().map(|(idx, line)| (idx + 1, line));

    while let Some((line, owned)) = lines.next() {
      let content = owned.as_ref();
      if content.trim().is_empty() {
        continue;
      }

      if !content.trim_start().starts_with(BEFORE_LABEL) {
        file.program.push(parse_raw_instruction(line, content)?);
        continue;
      }

      if !file.program.is_empty() {
        return Err(LoadError::MalformedSample { line, text: content.to_string() });
      }

      let before = parse_snapshot(line, BEFORE_LABEL, content)?;
      let truncated = || LoadError::MalformedSample { line, text: content.to_string() };

      let (instruction_line, instruction_text) = lines.next().ok_or_else(truncated)?;
      let instruction = parse_raw_instruction(instruction_line, instruction_text.as_ref())?;

      let (after_line, after_text) = lines.next().ok_or_else(truncated)?;
      let after_text = after_text.as_ref();
      let after = parse_snapshot(after_line, AFTER_LABEL, after_text)?;

      if before.len() != after.len() {
        return Err(LoadError::MalformedSample { line: after_line, text: after_text.to_string() });
      }

      file.samples.push(Sample::new(before, instruction, after));
    }

    Ok(file)
  }

}

/// Counts the samples consistent with at least `threshold` mnemonics.
pub fn count_ambiguous(samples: &[Sample], threshold: usize) -> usize {
  samples.iter()
         .filter(|sample| sample.candidates().len() >= threshold)
         .count()
}

// endregion

// region Opcode table

/**
  A resolved mapping between numeric opcode identifiers and mnemonics. It is a bijection: no
  identifier maps to two mnemonics and no mnemonic is claimed by two identifiers. A table is
  complete once it holds all sixteen pairs.
*/
#[derive(Clone, Eq, PartialEq, Default)]
pub struct OpcodeTable {
  table: BiMap<OpcodeId, Mnemonic>
}

impl OpcodeTable {

  pub fn new() -> OpcodeTable {
    OpcodeTable {
      table: BiMap::new()
    }
  }

  /// Builds a table from known pairs. Returns the first pair that conflicts with an earlier one.
  pub fn from_pairs<I>(pairs: I) -> Result<OpcodeTable, (OpcodeId, Mnemonic)>
    where I: IntoIterator<Item = (OpcodeId, Mnemonic)>
  {
    let mut table = OpcodeTable::new();
    for (id, op) in pairs {
      table.insert(id, op)?;
    }
    Ok(table)
  }

  pub fn insert(&mut self, id: OpcodeId, op: Mnemonic) -> Result<(), (OpcodeId, Mnemonic)> {
    self.table.insert_no_overwrite(id, op)
  }

  pub fn mnemonic(&self, id: OpcodeId) -> Option<Mnemonic> {
    self.table.get_by_left(&id).copied()
  }

  pub fn id(&self, op: Mnemonic) -> Option<OpcodeId> {
    self.table.get_by_right(&op).copied()
  }

  pub fn contains_id(&self, id: OpcodeId) -> bool {
    self.table.contains_left(&id)
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }

  pub fn is_complete(&self) -> bool {
    self.len() == OPCODE_COUNT
  }

  /// Pairs ordered by identifier.
  pub fn pairs(&self) -> Vec<(OpcodeId, Mnemonic)> {
    let mut pairs: Vec<(OpcodeId, Mnemonic)> =
      self.table.iter().map(|(id, op)| (*id, *op)).collect();
    pairs.sort();
    pairs
  }

  pub fn to_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Opcode", ubl->"Mnemonic"]);
    for (id, op) in self.pairs() {
      table.add_row(row![r->id, op]);
    }
    table
  }

}

impl std::fmt::Debug for OpcodeTable {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_map().entries(self.pairs()).finish()
  }
}

impl Display for OpcodeTable {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.to_table())
  }
}

// endregion

// region Resolution

/// Feasible sets for all sixteen identifiers, narrowed by a batch of samples.
#[derive(Clone, Debug)]
pub struct Resolver {
  feasible: [MnemonicSet; OPCODE_COUNT]
}

impl Resolver {

  pub fn new(samples: &[Sample]) -> Result<Resolver, ResolveError> {
    let mut feasible = [MnemonicSet::all(); OPCODE_COUNT];

    for sample in samples {
      let id = sample.instruction.id;
      match feasible.get_mut(id as usize) {
        Some(set) => *set = set.intersection(sample.candidates()),
        None      => return Err(ResolveError::IdOutOfRange(id))
      }
    }

    Ok(Resolver { feasible })
  }

  /// Mnemonics consistent with every sample that carries `id`.
  pub fn feasible(&self, id: OpcodeId) -> MnemonicSet {
    self.feasible
        .get(id as usize)
        .copied()
        .unwrap_or_else(MnemonicSet::empty)
  }

  /// Runs singleton elimination to a complete table.
  pub fn resolve(&self) -> Result<OpcodeTable, ResolveError> {
    let mut feasible = self.feasible;
    let mut table    = OpcodeTable::new();

    if let Some(id) = feasible.iter().position(MnemonicSet::is_empty) {
      return Err(ResolveError::Contradiction(id as OpcodeId));
    }

    while !table.is_complete() {
      let forced =
        (0..OPCODE_COUNT).find_map(|id| {
          match table.contains_id(id as OpcodeId) {
            true  => None,
            false => feasible[id].single().map(|op| (id, op))
          }
        });

      let (id, op) =
        match forced {
          Some(pair) => pair,
          None       => {
            let unresolved =
              (0..OPCODE_COUNT)
                .filter(|id| !table.contains_id(*id as OpcodeId))
                .map(|id| (id as OpcodeId, feasible[id]))
                .collect();
            return Err(ResolveError::Underconstrained { resolved: table, unresolved });
          }
        };

      #[cfg(feature = "trace_computation")]
        println!("Opcode {} can only be {}", id, op);

      if table.insert(id as OpcodeId, op).is_err() {
        return Err(ResolveError::Contradiction(id as OpcodeId));
      }

      for (other, set) in feasible.iter_mut().enumerate() {
        if other == id {
          continue;
        }
        set.remove(op);
        if set.is_empty() {
          return Err(ResolveError::Contradiction(other as OpcodeId));
        }
      }
    }

    Ok(table)
  }

}

/// Convenience for `Resolver::new(samples)?.resolve()`.
pub fn resolve(samples: &[Sample]) -> Result<OpcodeTable, ResolveError> {
  Resolver::new(samples)?.resolve()
}

// endregion


#[cfg(test)]
mod tests {
  use std::convert::TryFrom;

  use proptest::prelude::*;

  use super::*;
  use crate::registers::Value;

  fn sample(before: &[Value], raw: (OpcodeId, Value, Value, Value), after: &[Value]) -> Sample {
    Sample::new(
      Registers::from(before.to_vec()),
      RawInstruction::new(raw.0, raw.1, raw.2, raw.3),
      Registers::from(after.to_vec())
    )
  }

  fn set(ops: &[Mnemonic]) -> MnemonicSet {
    ops.iter().copied().collect()
  }

  #[test]
  fn candidates_of_a_sample(){
    let s = sample(&[3, 2, 1, 1], (9, 2, 1, 2), &[3, 2, 2, 1]);
    assert_eq!(s.candidates(), set(&[Mnemonic::Addi, Mnemonic::Mulr, Mnemonic::Seti]));
    assert_eq!(count_ambiguous(&[s.clone()], AMBIGUITY_THRESHOLD), 1);
    assert_eq!(count_ambiguous(&[s], 4), 0);
  }

  #[test]
  fn out_of_range_operands_rule_a_mnemonic_out(){
    // `c` = 4 is not a register of a four register bank.
    let s = sample(&[0, 0, 0, 0], (1, 0, 0, 4), &[0, 0, 0, 0]);
    assert!(s.candidates().is_empty());
  }

  #[test]
  fn intersection_narrows_to_seti(){
    let samples = vec![
      sample(&[4, 6, 1, 9], (7, 2, 1, 3), &[4, 6, 1, 2]),
      sample(&[4, 6, 0, 9], (7, 2, 1, 3), &[4, 6, 0, 2]),
    ];
    assert_eq!(samples[0].candidates(), set(&[Mnemonic::Addi, Mnemonic::Seti]));
    assert_eq!(samples[1].candidates(), set(&[Mnemonic::Seti]));

    let resolver = Resolver::new(&samples).unwrap();
    assert_eq!(resolver.feasible(7), set(&[Mnemonic::Seti]));
    assert_eq!(resolver.feasible(0), MnemonicSet::all());

    // Fifteen identifiers have no evidence, so the table cannot be completed, but 7 is forced.
    match resolver.resolve() {
      Err(ResolveError::Underconstrained { resolved, unresolved }) => {
        assert_eq!(resolved.mnemonic(7), Some(Mnemonic::Seti));
        assert_eq!(resolved.len(), 1);
        assert_eq!(unresolved.len(), OPCODE_COUNT - 1);
        assert!(unresolved.iter().all(|(_, s)| !s.contains(Mnemonic::Seti) && s.len() == 15));
      }
      other => panic!("unexpected result {:?}", other)
    }
  }

  #[test]
  fn no_samples_is_underconstrained(){
    match resolve(&[]) {
      Err(ResolveError::Underconstrained { resolved, unresolved }) => {
        assert!(resolved.is_empty());
        assert_eq!(unresolved.len(), OPCODE_COUNT);
      }
      other => panic!("unexpected result {:?}", other)
    }
  }

  #[test]
  fn inconsistent_samples_are_a_contradiction(){
    let samples = vec![
      sample(&[4, 6, 1, 9], (3, 2, 1, 3), &[4, 6, 1, 2]),
      sample(&[0, 0, 0, 0], (3, 0, 0, 0), &[5, 0, 0, 0]),
    ];
    assert_eq!(resolve(&samples), Err(ResolveError::Contradiction(3)));
  }

  #[test]
  fn identifiers_outside_the_table(){
    let samples = vec![sample(&[0, 0, 0, 0], (16, 0, 0, 0), &[0, 0, 0, 0])];
    assert_eq!(Resolver::new(&samples).err(), Some(ResolveError::IdOutOfRange(16)));
  }

  #[test]
  fn opcode_table_is_a_bijection(){
    let mut table = OpcodeTable::new();
    assert_eq!(table.insert(0, Mnemonic::Eqrr), Ok(()));
    assert_eq!(table.insert(1, Mnemonic::Eqrr), Err((1, Mnemonic::Eqrr)));
    assert_eq!(table.insert(0, Mnemonic::Addr), Err((0, Mnemonic::Addr)));
    assert_eq!(table.id(Mnemonic::Eqrr), Some(0));
    assert_eq!(table.mnemonic(1), None);
    assert_eq!(table.clone(), table);
    assert!(table.to_string().contains("eqrr"));
  }

  #[test]
  fn sample_file(){
    let text = "Before: [3, 2, 1, 1]
9 2 1 2
After:  [3, 2, 2, 1]

Before: [0, 1, 2, 3]
4 0 1 2
After:  [0, 1, 0, 3]



7 1 2 3
0 0 0 0
";
    let file = parse_samples(text).unwrap();
    assert_eq!(file.samples.len(), 2);
    assert_eq!(file.samples[1].instruction, RawInstruction::new(4, 0, 1, 2));
    assert_eq!(file.samples[1].after, Registers::from(vec![0, 1, 0, 3]));
    assert_eq!(file.program, vec![RawInstruction::new(7, 1, 2, 3), RawInstruction::new(0, 0, 0, 0)]);
    assert_eq!(file.samples[0].to_string(), "Before: [3, 2, 1, 1]\n9 2 1 2\nAfter:  [3, 2, 2, 1]");
  }

  #[test]
  fn sample_file_from_owned_lines(){
    let lines: Vec<String> = vec![
      "Before: [4, 6, 1, 9]".to_string(),
      "7 2 1 3".to_string(),
      "After:  [4, 6, 1, 2]".to_string(),
      String::new(),
      "7 5 0 0".to_string(),
    ];
    let file = SampleFile::from_lines(lines).unwrap();
    assert_eq!(file.samples.len(), 1);
    assert_eq!(file.samples[0].after, Registers::from(vec![4, 6, 1, 2]));
    assert_eq!(file.program, vec![RawInstruction::new(7, 5, 0, 0)]);

    assert_eq!(
      SampleFile::from_lines(vec!["", "Before: [1]", "1 0 0 0", "After: [x]"]),
      Err(LoadError::MalformedSample { line: 4, text: "After: [x]".to_string() })
    );
  }

  #[test]
  fn cloned_tables_compare_equal(){
    let table = OpcodeTable::from_pairs(vec![(3, Mnemonic::Bori), (0, Mnemonic::Seti)]).unwrap();
    let copy = table.clone();
    assert_eq!(copy, table);
    assert_eq!(copy.pairs(), vec![(0, Mnemonic::Seti), (3, Mnemonic::Bori)]);
    assert_ne!(copy, OpcodeTable::default());
  }

  #[test]
  fn malformed_sample_files(){
    assert_eq!(
      parse_samples("Before: [3, 2, 1, 1]\n9 2 1 2\n"),
      Err(LoadError::MalformedSample { line: 1, text: "Before: [3, 2, 1, 1]".to_string() })
    );
    assert_eq!(
      parse_samples("Before: [3, 2, 1, 1]\n9 2 1 2\nAfter:  [3, 2, 2]\n"),
      Err(LoadError::MalformedSample { line: 3, text: "After:  [3, 2, 2]".to_string() })
    );
    assert!(matches!(
      parse_samples("1 2 3 4\nBefore: [0]\n1 0 0 0\nAfter: [0]\n"),
      Err(LoadError::MalformedSample { line: 2, .. })
    ));
  }

  /// Register values and operands for one identifier's samples.
  fn operations() -> impl Strategy<Value = Vec<(Vec<Value>, Value, Value, Value)>> {
    prop::collection::vec((prop::collection::vec(0i64..4, 4), 0i64..4, 0i64..4, 0i64..4), 200)
  }

  proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn recovers_a_known_mapping(
      permutation in Just((0..OPCODE_COUNT as u8).collect::<Vec<u8>>()).prop_shuffle(),
      operations in prop::collection::vec(operations(), OPCODE_COUNT)
    ){
      let known = OpcodeTable::from_pairs(
        permutation.iter()
                   .enumerate()
                   .map(|(id, code)| (id as OpcodeId, Mnemonic::try_from(*code).unwrap()))
      ).unwrap();

      let mut samples = Vec::new();
      for ((id, op), batch) in known.pairs().into_iter().zip(operations) {
        for (values, a, b, c) in batch {
          let before = Registers::from(values);
          let after = op.apply(&before, a, b, c).unwrap();
          samples.push(Sample::new(before, RawInstruction::new(id, a, b, c), after));
        }
      }

      prop_assert_eq!(resolve(&samples), Ok(known));
    }
  }

}

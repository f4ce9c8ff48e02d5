//! Table rendering shared by the machine, the resolver, and the CLI.

use std::fmt::Display;

use prettytable::{format as TableFormat, Table};

lazy_static! {
  pub static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

/// Renders a register bank, marking the register at `highlight` with an arrow.
pub fn make_register_table<T>(name: char, registers: &[T], highlight: Option<usize>) -> Table
  where T: Display
{
  let mut table = Table::new();

  table.set_format(*TABLE_DISPLAY_FORMAT);
  table.set_titles(row![ubr->"Register", ubl->"Contents"]);

  for (i, value) in registers.iter().enumerate() {
    match Some(i) == highlight {

      true  => {
        table.add_row(
          row![r->format!("* --> {}[{}] =", name, i), format!("{}", value)]
        );
      }

      false => {
        table.add_row(
          row![r->format!("{}[{}] =", name, i), format!("{}", value)]
        );
      }

    } // end match on highlight
  } // end for
  table
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn highlighted_register_is_marked(){
    let rendered = make_register_table('r', &[7, 8, 9], Some(1)).to_string();
    assert!(rendered.contains("* --> r[1] ="));
    assert!(rendered.contains("r[0] ="));
    assert!(!rendered.contains("* --> r[0]"));
    assert!(rendered.contains('9'));
  }

}

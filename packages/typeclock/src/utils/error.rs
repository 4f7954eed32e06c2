#![allow(clippy::pub_use)]

use color_eyre::Report;
use itertools::Itertools;

pub fn report_to_string(report: &Report) -> String {
  report.chain().map(ToString::to_string).join(": ")
}

#[macro_export(local_inner_macros)]
macro_rules! make_error {
  ($($arg:tt)*) => {
    {
      Err(eyre::eyre!(std::format!($($arg)*)))
    }
  };
}

pub use make_error;

#[macro_export(local_inner_macros)]
macro_rules! make_report {
  ($($arg:tt)*) => {
    {
      eyre::eyre!($($arg)*)
    }
  };
}

pub use make_report;

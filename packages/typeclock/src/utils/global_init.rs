use color_eyre::owo_colors::OwoColorize;
use env_logger::Env;
use log::{Level, LevelFilter, Record};
use std::io::Write;

fn get_file_line(record: &Record) -> String {
  match (record.file(), record.line()) {
    (Some(file), None) => format!("{file}:"),
    (Some(file), Some(line)) => format!("{file}:{line}:"),
    _ => "".to_owned(),
  }
  .dimmed()
  .to_string()
}

fn log_level_str(record: &Record) -> String {
  let mut level_str = record.level().to_string();
  level_str.truncate(1);
  level_str
}

fn color_log_level(record: &Record) -> String {
  let level_str = match record.level() {
    Level::Error => log_level_str(record).red().to_string(),
    Level::Warn => log_level_str(record).yellow().to_string(),
    Level::Info => log_level_str(record).cyan().dimmed().to_string(),
    Level::Debug => log_level_str(record).green().dimmed().to_string(),
    Level::Trace => log_level_str(record).dimmed().to_string(),
  };
  format!("{:}{level_str}{:}", "[".dimmed(), "]".dimmed())
}

pub fn setup_logger(filter_level: LevelFilter) {
  env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
    .filter_level(filter_level)
    .format(|buf, record| {
      let file_line = get_file_line(record);
      let level = color_log_level(record);
      let args = record.args();
      writeln!(buf, "{level:} {file_line:} {args}")?;
      Ok(())
    })
    .init();
}

pub fn global_init() {
  color_eyre::config::HookBuilder::default()
    .panic_section(format!(
      "If you think it's a bug, consider reporting at: '{}/issues'",
      env!("CARGO_PKG_REPOSITORY"),
    ))
    .install()
    .expect("color_eyre initialization failed");
}

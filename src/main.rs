use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use orgnote::agenda::{self, AgendaEntry, WeekDay};
use orgnote::core::Document;
use orgnote::parse_document;
use orgnote::storage::DirStore;
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(
    name = "orgnote",
    about = "Outline-notes tooling built on the orgnote crate",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse note files and print their document trees.
    Parse(ParseArgs),
    /// List scheduled and deadline entries across a directory of notes.
    Agenda(AgendaArgs),
    /// Show the seven-day week view containing a reference date.
    Week(WeekArgs),
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Note files to parse.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Emit JSON instead of the debug tree.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct AgendaArgs {
    /// Directory holding `.org` note files.
    dir: PathBuf,
    /// Emit JSON instead of formatted lines.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct WeekArgs {
    /// Directory holding `.org` note files.
    dir: PathBuf,
    /// Reference date (YYYY-MM-DD); defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Emit JSON instead of formatted lines.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    match cli.command {
        Commands::Parse(args) => handle_parse(args, verbose),
        Commands::Agenda(args) => handle_agenda(args, verbose).await,
        Commands::Week(args) => handle_week(args, verbose).await,
    }
}

fn handle_parse(args: ParseArgs, verbose: bool) -> Result<()> {
    let ParseArgs { inputs, json } = args;
    let mut parsed: Vec<(PathBuf, Document)> = Vec::new();
    for path in inputs {
        if verbose {
            eprintln!("Parsing {:?}", path);
        }
        let text =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        parsed.push((path, parse_document(&text)));
    }

    if json {
        #[derive(Serialize)]
        struct ParsedFile<'a> {
            path: String,
            document: &'a Document,
        }
        let payload: Vec<ParsedFile<'_>> = parsed
            .iter()
            .map(|(path, document)| ParsedFile {
                path: path.display().to_string(),
                document,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for (path, document) in &parsed {
            if parsed.len() > 1 {
                println!("== {} ==", path.display());
            }
            println!("{:#?}", document);
        }
    }
    Ok(())
}

async fn handle_agenda(args: AgendaArgs, verbose: bool) -> Result<()> {
    let AgendaArgs { dir, json } = args;
    if verbose {
        eprintln!("Scanning notes in {:?}", dir);
    }
    let store = DirStore::new(dir);
    let entries = agenda::collect_entries(&store).await?;
    if verbose {
        eprintln!("Found {} agenda entries", entries.len());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("No agenda entries found.");
    } else {
        for entry in &entries {
            println!("{}", format_entry_line(entry));
        }
    }
    Ok(())
}

async fn handle_week(args: WeekArgs, verbose: bool) -> Result<()> {
    let WeekArgs { dir, date, json } = args;
    let reference = date.unwrap_or_else(|| Local::now().date_naive());
    if verbose {
        eprintln!("Scanning notes in {:?} for week of {}", dir, reference);
    }
    let store = DirStore::new(dir);
    let entries = agenda::collect_entries(&store).await?;
    let week: Vec<WeekDay> = agenda::build_week_view(&entries, reference);

    if json {
        println!("{}", serde_json::to_string_pretty(&week)?);
    } else {
        for day in &week {
            println!("{}", format_day_header(day.day, reference));
            for entry in &day.tasks {
                println!("  {}", format_entry_line(entry));
            }
        }
    }
    Ok(())
}

fn format_day_header(day: NaiveDate, reference: NaiveDate) -> String {
    let marker = if day == reference { " <- today" } else { "" };
    format!("{} {}{}", day.format("%A"), day, marker)
}

fn format_entry_line(entry: &AgendaEntry) -> String {
    let time = entry.time_display().unwrap_or_default();
    format!(
        "{} {:<8} {:<9} {:<14} {}",
        entry.date,
        time,
        entry.kind.label().trim_end_matches(':'),
        entry.file,
        entry.headline
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, NaiveTime};
    use orgnote::core::PlanningKind;

    fn sample_entry() -> AgendaEntry {
        let date = NaiveDate::from_ymd_opt(2020, 6, 3).expect("valid date");
        let time = NaiveTime::from_hms_opt(14, 30, 0).expect("valid time");
        AgendaEntry {
            file: "garden".into(),
            headline: "* TODO water the plants".into(),
            task: "SCHEDULED: <2020-06-03 Wed 14:30>".into(),
            kind: PlanningKind::Scheduled,
            state: Some(orgnote::core::State::Todo),
            date,
            time: Some(time),
            at: NaiveDateTime::new(date, time),
        }
    }

    #[test]
    fn entry_line_shows_twelve_hour_time() {
        let line = format_entry_line(&sample_entry());
        assert!(line.starts_with("2020-06-03 02:30:PM"));
        assert!(line.contains("SCHEDULED"));
        assert!(line.ends_with("* TODO water the plants"));
    }

    #[test]
    fn day_header_marks_the_reference_day() {
        let day = NaiveDate::from_ymd_opt(2020, 6, 3).expect("valid date");
        assert!(format_day_header(day, day).ends_with("<- today"));
        let other = NaiveDate::from_ymd_opt(2020, 6, 4).expect("valid date");
        assert!(!format_day_header(other, day).contains("today"));
    }
}

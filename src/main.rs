mod error;
mod incidence;
mod rki;
mod kreise;
mod output;

use std::{env,process};
use std::path::PathBuf;

use chrono::naive::NaiveDate;
use clap::Parser;
use log::{debug,info,warn,error};

use error::Result;
use output::Format;
use rki::{Case,Level};
use kreise::Kreis;


const DEFAULT_LOGGING_LEVEL: &str = "info";


/// Daily and 7-day incidence of RKI COVID-19 cases, deaths and recoveries
/// per state and county.
#[derive(Parser,Debug)]
#[command(version)]
struct Cli {
    /// RKI case table (path or http(s) URL)
    cases: String,
    /// County reference table with populations (path or http(s) URL)
    regions: String,
    #[arg(long, default_value = "cache")]
    cache: PathBuf,
    #[arg(long, default_value = "output")]
    output: PathBuf,
    #[arg(long, value_enum, default_value_t = Format::Csv)]
    format: Format,
    #[arg(long, value_enum, default_value_t = Levels::All)]
    level: Levels,
    /// Also write the rows of this date (YYYY-MM-DD), may be repeated
    #[arg(long)]
    snapshot: Vec<NaiveDate>,
    /// Also write the rows of this span (YYYY-MM-DD:YYYY-MM-DD), may be repeated
    #[arg(long, value_parser = parse_window)]
    window: Vec<(NaiveDate,NaiveDate)>,
}

#[derive(Clone,Copy,Debug,PartialEq,Eq,clap::ValueEnum)]
enum Levels {
    State,
    County,
    All,
}

impl Levels {

    fn levels(&self) -> Vec<Level> {
	match self {
	    Self::State => vec![Level::State],
	    Self::County => vec![Level::County],
	    Self::All => vec![Level::State, Level::County],
	}
    }

}


fn main() {

    if env::var("RUST_LOG").is_err() {
	env::set_var("RUST_LOG", DEFAULT_LOGGING_LEVEL);
    }
    pretty_env_logger::init_timed();

    let args = Cli::parse();
    debug!("args: {:?}", args);

    let (cases, kreise) = match load(&args) {
	Ok(data) => data,
	Err(err) => {
	    error!("{}", err);
	    process::exit(1);
	}
    };

    if !run(&args, &cases, &kreise) {
	process::exit(1);
    }

}


/// Writes the tables of every requested level. A failing level is logged
/// and the next one still runs; returns false if any level failed.
fn run(args: &Cli, cases: &[Case], kreise: &[Kreis]) -> bool {
    let mut ok = true;
    for level in args.level.levels() {
	if let Err(err) = incidence_tables(args, level, cases, kreise) {
	    error!("{} incidence: {}", level.name(), err);
	    ok = false;
	}
    }
    ok
}


fn load(args: &Cli) -> Result<(Vec<Case>,Vec<Kreis>)> {
    Ok((rki::cases(&args.cases, &args.cache)?,
	kreise::kreise(&args.regions, &args.cache)?))
}


fn incidence_tables(args: &Cli, level: Level, cases: &[Case], kreise: &[Kreis]) -> Result<()> {

    let records = rki::aggregate(cases, level)?;
    let regions = kreise::regions(kreise, level)?;
    let date_range = incidence::date_span(&records)?;

    info!("Computing {} incidence for {} regions from {} to {}", level.name(),
	  regions.len(), date_range[0], date_range[date_range.len() - 1]);

    let rows = incidence::compute_rolling_incidence_with_progress(
	&records, &regions, &date_range,
	|done,total| if done % 100 == 0 || done == total {
	    debug!("{}: {}/{} regions", level.name(), done, total);
	})?;

    if let Some(peak) = output::peak(&rows) {
	info!("Highest 7-day case incidence by {}: {:.1} in {} ({}) on {}", level.name(),
	      peak.rolling.cases, peak.name, peak.key, peak.date);
    }

    output::write_file(&args.output, level.name(), args.format, &rows)?;

    for date in &args.snapshot {
	let rows = output::snapshot(&rows, *date);
	if rows.is_empty() {
	    warn!("No {} rows on {}", level.name(), date);
	}
	output::write_file(&args.output, &format!("{}-{}", level.name(), date),
			   args.format, &rows)?;
    }

    for (from,to) in &args.window {
	output::write_file(&args.output, &format!("{}-{}_{}", level.name(), from, to),
			   args.format, &output::window(&rows, *from, *to)?)?;
    }

    Ok(())

}


fn parse_window(arg: &str) -> std::result::Result<(NaiveDate,NaiveDate), String> {
    let (from, to) = arg.split_once(':')
	.ok_or_else(|| format!("expected FROM:TO, got {:?}", arg))?;
    let from : NaiveDate = from.trim().parse().map_err(|e| format!("{}: {}", from, e))?;
    let to : NaiveDate = to.trim().parse().map_err(|e| format!("{}: {}", to, e))?;
    match from <= to {
	true => Ok((from, to)),
	false => Err(format!("{} is after {}", from, to)),
    }
}


#[derive(Clone,Debug)]
pub struct NaiveDateRange(NaiveDate,Option<NaiveDate>);

impl Iterator for NaiveDateRange {
    type Item = NaiveDate;
    fn next(&mut self) -> Option<NaiveDate> {
	match self.1.map_or(true, |end| self.0 <= end) {
	    false => None,
	    true => {
		let current = self.0;
		match self.0.succ_opt() {
		    Some(next) => self.0 = next,
		    None => self.1 = self.0.pred_opt(),
		}
		Some(current)
	    }
	}
    }
}

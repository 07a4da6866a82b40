use std::{io,fs};
use std::fs::File;
use std::path::Path;

use chrono::naive::NaiveDate;
use serde::Serialize;
use log::info;

use super::error::{Result,Error};
use super::incidence::IncidenceRow;


#[derive(Clone,Copy,Debug,PartialEq,Eq,clap::ValueEnum)]
pub enum Format {
    Csv,
    Json,
}

impl Format {

    pub fn extension(&self) -> &'static str {
	match self {
	    Self::Csv => "csv",
	    Self::Json => "json",
	}
    }

}


/// Flat row as handed to the GIS tooling.
#[derive(Serialize,Debug)]
struct Row<'a> {
    key: &'a str,
    name: &'a str,
    population: u64,
    date: NaiveDate,
    cases: u64,
    deaths: u64,
    recovered: u64,
    cases_rate: f64,
    deaths_rate: f64,
    recovered_rate: f64,
    cases_7: f64,
    deaths_7: f64,
    recovered_7: f64,
    reported: bool,
}

impl<'a> From<&'a IncidenceRow> for Row<'a> {
    fn from(row: &'a IncidenceRow) -> Self {
	Row {
	    key: &row.key,
	    name: &row.name,
	    population: row.population,
	    date: row.date,
	    cases: row.counts.cases,
	    deaths: row.counts.deaths,
	    recovered: row.counts.recovered,
	    cases_rate: row.rate.cases,
	    deaths_rate: row.rate.deaths,
	    recovered_rate: row.rate.recovered,
	    cases_7: row.rolling.cases,
	    deaths_7: row.rolling.deaths,
	    recovered_7: row.rolling.recovered,
	    reported: row.reported,
	}
    }
}


pub fn write<W: io::Write>(writer: W, format: Format, rows: &[IncidenceRow]) -> Result<()> {
    match format {
	Format::Csv => {
	    let mut writer = csv::Writer::from_writer(writer);
	    for row in rows {
		writer.serialize(Row::from(row))?;
	    }
	    writer.flush()?;
	}
	Format::Json => {
	    let rows : Vec<Row> = rows.iter().map(Row::from).collect();
	    serde_json::to_writer(writer, &rows)?;
	}
    }
    Ok(())
}


pub fn write_file(output_path: &Path, stem: &str, format: Format,
		  rows: &[IncidenceRow]) -> Result<()> {
    fs::create_dir_all(output_path)?;
    let file = output_path.join(format!("{}.{}", stem, format.extension()));
    info!("Writing {} rows to {}", rows.len(), file.display());
    write(io::BufWriter::new(File::create(file)?), format, rows)
}


/// The rows of a single report date.
pub fn snapshot(rows: &[IncidenceRow], date: NaiveDate) -> Vec<IncidenceRow> {
    rows.iter().filter(|row| row.date == date).cloned().collect()
}


/// The rows between `from` and `to`, both included.
pub fn window(rows: &[IncidenceRow], from: NaiveDate, to: NaiveDate) -> Result<Vec<IncidenceRow>> {
    if from > to {
	return Err(Error::InvalidRange(format!("{} is after {}", from, to)));
    }
    Ok(rows.iter().filter(|row| from <= row.date && row.date <= to).cloned().collect())
}


/// The row with the highest 7-day case incidence.
pub fn peak(rows: &[IncidenceRow]) -> Option<&IncidenceRow> {
    rows.iter().max_by(|a,b| a.rolling.cases.total_cmp(&b.rolling.cases))
}

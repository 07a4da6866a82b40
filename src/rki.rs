use std::{fs,io};
use std::path::{Path,PathBuf};
use std::time::Duration;
use std::collections::BTreeMap;
use std::io::Write;

use chrono::naive::NaiveDate;
use serde::Deserialize;
use encoding_rs::Encoding;
use encoding_rs::mem::decode_latin1;
use log::{info,warn,debug};

use super::error::{Result,Error};
use super::incidence::{Counts,Record};


/// One line of the RKI case table. Each line counts the cases of one age
/// group and sex reported for a county on a given day; other columns of the
/// table are ignored.
#[derive(Deserialize,Debug,Clone)]
pub struct Case {
    #[serde(rename = "IdBundesland")]
    pub state_id: String,
    #[serde(rename = "IdLandkreis")]
    pub county_id: String,
    #[serde(rename = "Meldedatum")]
    pub date: String,
    #[serde(rename = "AnzahlFall")]
    pub cases: i64,
    #[serde(rename = "AnzahlTodesfall")]
    pub deaths: i64,
    #[serde(rename = "AnzahlGenesen")]
    pub recovered: i64,
}

#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum Level {
    State,
    County,
}

impl Level {

    pub fn name(&self) -> &'static str {
	match self {
	    Self::State => "state",
	    Self::County => "county",
	}
    }

    /// Width of the zero-padded region key.
    pub fn width(&self) -> usize {
	match self {
	    Self::State => 2,
	    Self::County => 5,
	}
    }

    pub fn key(&self, case: &Case) -> Result<String> {
	match self {
	    Self::State => pad_key(&case.state_id, self.width()),
	    Self::County => pad_key(&case.county_id, self.width()),
	}
    }

}


pub fn pad_key(raw: &str, width: usize) -> Result<String> {
    let id : u64 = raw.trim().parse()?;
    Ok(format!("{:0width$}", id, width = width))
}


/// Parses a report date, dropping any time of day.
pub fn report_date(raw: &str) -> Result<NaiveDate> {
    let day = raw.trim().split(|c: char| c == ' ' || c == 'T').next().unwrap_or("");
    Ok(NaiveDate::parse_from_str(&day.replace('/', "-"), "%Y-%m-%d")?)
}


pub fn cases(source: &str, cache_path: &Path) -> Result<Vec<Case>> {
    let text = read_source(source, cache_path)?;
    let cases = csv::Reader::from_reader(text.as_bytes()).deserialize()
	.collect::<std::result::Result<Vec<Case>,_>>()?;
    info!("Read {} case rows", cases.len());
    Ok(cases)
}


/// Sums the case rows into one record per region and report date.
pub fn aggregate(cases: &[Case], level: Level) -> Result<Vec<Record>> {

    let mut sums : BTreeMap<(String,NaiveDate),(i64,i64,i64)> = BTreeMap::new();

    for case in cases {
	let sum = sums.entry((level.key(case)?, report_date(&case.date)?))
	    .or_insert((0,0,0));
	sum.0 += case.cases;
	sum.1 += case.deaths;
	sum.2 += case.recovered;
    }

    Ok(sums.into_iter().map(|((key,date),(cases,deaths,recovered))| {
	let counts = Counts {
	    cases: clamp(&key, date, "cases", cases),
	    deaths: clamp(&key, date, "deaths", deaths),
	    recovered: clamp(&key, date, "recovered", recovered),
	};
	Record { key, date, counts }
    }).collect())

}

fn clamp(key: &str, date: NaiveDate, metric: &str, value: i64) -> u64 {
    if value < 0 {
	warn!("Negative {} total ({}) for {} on {}, using 0", metric, value, key, date);
    }
    value.max(0) as u64
}


/// Reads a table from a local path or an http(s) URL. Downloads are kept
/// below `cache_path` and reused for half an hour.
pub fn read_source(source: &str, cache_path: &Path) -> Result<String> {

    if !(source.starts_with("http://") || source.starts_with("https://")) {
	return Ok(decode(&fs::read(source)?));
    }

    let cache_file = cache_file(cache_path, source);
    let cache_file = cache_file.as_path();

    if cache_file.exists() && fs::metadata(cache_file)?.modified()?.elapsed()? < Duration::new(1800,0) {
	debug!("Using cached {}", cache_file.display());
	return Ok(decode(&fs::read(cache_file)?));
    }

    let data = download(source)?;
    if let Some(dir) = cache_file.parent() {
	fs::create_dir_all(dir)?;
    }
    io::BufWriter::new(fs::File::create(cache_file)?).write_all(&data)?;
    Ok(decode(&data))

}

/// One cache file per URL, named after the URL with every character other
/// than ASCII letters, digits, `-` and `.` replaced by `_`.
pub fn cache_file(cache_path: &Path, url: &str) -> PathBuf {
    let name : String = url.splitn(2, "://").last().unwrap_or(url).chars()
	.map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
	.collect();
    cache_path.join("rki").join(name)
}

fn download(url: &str) -> Result<Vec<u8>> {
    info!("Downloading {}...", url);
    let res = reqwest::blocking::get(url)?;
    match res.status().as_u16() {
	200 => Ok(res.bytes()?.to_vec()),
	_ => Err(Error::HttpError(res.status())),
    }
}


/// Honours a byte order mark; otherwise UTF-8, falling back to Latin-1.
pub fn decode(bytes: &[u8]) -> String {
    if let Some((encoding,bom)) = Encoding::for_bom(bytes) {
	return encoding.decode_without_bom_handling(&bytes[bom..]).0.into_owned();
    }
    match std::str::from_utf8(bytes) {
	Ok(text) => text.to_string(),
	Err(_) => decode_latin1(bytes).into_owned(),
    }
}

//! Rolling 7-day incidence per region.
//!
//! Every region walks the same contiguous date range. Each day writes the
//! region's daily rate (or zero, when nothing was reported) into the slot
//! `day % 7` of a ring buffer, and the rolling value is the sum of all seven
//! slots after that write. All regions are refreshed in lockstep, so slot 0
//! always belongs to the first day of the range.

use std::collections::HashMap;

use chrono::naive::NaiveDate;

use super::error::{Result,Error};
use super::NaiveDateRange;


pub const WINDOW: usize = 7;
const PER_100K: f64 = 100_000.0;


#[derive(Clone,Copy,Debug,Default,PartialEq,Eq)]
pub struct Counts {
    pub cases: u64,
    pub deaths: u64,
    pub recovered: u64,
}

impl Counts {

    pub fn rates(&self, population: u64) -> Rates {
	let population = population as f64;
	Rates {
	    cases: PER_100K * self.cases as f64 / population,
	    deaths: PER_100K * self.deaths as f64 / population,
	    recovered: PER_100K * self.recovered as f64 / population,
	}
    }

}

/// Occurrences per 100,000 inhabitants.
#[derive(Clone,Copy,Debug,Default,PartialEq)]
pub struct Rates {
    pub cases: f64,
    pub deaths: f64,
    pub recovered: f64,
}


#[derive(Clone,Debug,PartialEq,Eq)]
pub struct Region {
    pub key: String,
    pub name: String,
    pub population: u64,
}

/// One pre-aggregated report: the sum of all cases reported for a region
/// on a single day.
#[derive(Clone,Debug,PartialEq,Eq)]
pub struct Record {
    pub key: String,
    pub date: NaiveDate,
    pub counts: Counts,
}

#[derive(Clone,Debug,PartialEq)]
pub struct IncidenceRow {
    pub key: String,
    pub name: String,
    pub population: u64,
    pub date: NaiveDate,
    pub counts: Counts,
    pub rate: Rates,
    pub rolling: Rates,
    /// False for rows filling a day without any report.
    pub reported: bool,
}


#[derive(Clone,Copy,Debug,Default)]
struct Ring {
    slots: [f64; WINDOW],
}

impl Ring {

    fn put(&mut self, day: usize, value: f64) -> f64 {
	self.slots[day % WINDOW] = value;
	self.slots.iter().sum()
    }

}

#[derive(Clone,Copy,Debug,Default)]
struct Window {
    cases: Ring,
    deaths: Ring,
    recovered: Ring,
}

impl Window {

    fn put(&mut self, day: usize, rate: Rates) -> Rates {
	Rates {
	    cases: self.cases.put(day, rate.cases),
	    deaths: self.deaths.put(day, rate.deaths),
	    recovered: self.recovered.put(day, rate.recovered),
	}
    }

}


/// The date range `[min, max]` spanned by the report dates of `records`.
pub fn date_span(records: &[Record]) -> Result<Vec<NaiveDate>> {
    let first = records.iter().map(|r| r.date).min().ok_or(Error::MissingData)?;
    let last = records.iter().map(|r| r.date).max().ok_or(Error::MissingData)?;
    Ok(NaiveDateRange(first, Some(last)).collect())
}


pub fn compute_rolling_incidence(records: &[Record], regions: &[Region],
				 date_range: &[NaiveDate]) -> Result<Vec<IncidenceRow>> {
    compute_rolling_incidence_with_progress(records, regions, date_range, |_,_| ())
}


/// Like [`compute_rolling_incidence`], calling `progress(done, total)` after
/// each region.
pub fn compute_rolling_incidence_with_progress<F>(records: &[Record], regions: &[Region],
						  date_range: &[NaiveDate], mut progress: F)
						  -> Result<Vec<IncidenceRow>>
where F: FnMut(usize,usize) {

    check_range(date_range)?;

    let mut sorted : Vec<&Region> = regions.iter().collect();
    sorted.sort_by(|a,b| a.key.cmp(&b.key));
    if let Some(pair) = sorted.windows(2).find(|pair| pair[0].key == pair[1].key) {
	return Err(Error::data(pair[0].key.as_str(), None, "duplicate region"));
    }

    let mut reports : HashMap<&str,Vec<Option<Counts>>> = sorted.iter()
	.map(|region| (region.key.as_str(), Vec::new())).collect();

    for record in records {
	let series = reports.get_mut(record.key.as_str()).ok_or_else(
	    || Error::UnknownRegion { key: record.key.clone(), date: record.date })?;
	let day = day_offset(date_range, record.date).ok_or_else(
	    || Error::Range { key: record.key.clone(), date: record.date })?;
	if series.is_empty() {
	    series.resize(date_range.len(), None);
	}
	match series[day] {
	    Some(_) => return Err(Error::data(record.key.as_str(), Some(record.date),
					      "duplicate report")),
	    None => series[day] = Some(record.counts),
	}
    }

    let total = sorted.len();
    let mut rows = Vec::with_capacity(total * date_range.len());

    for (done,region) in sorted.into_iter().enumerate() {
	let series = reports.remove(region.key.as_str()).unwrap_or_default();
	if !series.is_empty() && region.population == 0 {
	    let date = series.iter().zip(date_range).find_map(
		|(counts,date)| counts.map(|_| *date));
	    return Err(Error::data(region.key.as_str(), date, "zero population"));
	}
	rows.extend(region_series(region, date_range, &series));
	progress(done + 1, total);
    }

    Ok(rows)

}


fn region_series(region: &Region, date_range: &[NaiveDate],
		 reports: &[Option<Counts>]) -> Vec<IncidenceRow> {
    let mut window = Window::default();
    date_range.iter().enumerate().map(|(day,date)| {
	let counts = reports.get(day).copied().flatten();
	let rate = counts.map_or_else(Rates::default, |c| c.rates(region.population));
	IncidenceRow {
	    key: region.key.clone(),
	    name: region.name.clone(),
	    population: region.population,
	    date: *date,
	    counts: counts.unwrap_or_default(),
	    rate,
	    rolling: window.put(day, rate),
	    reported: counts.is_some(),
	}
    }).collect()
}


fn check_range(date_range: &[NaiveDate]) -> Result<()> {
    match date_range.windows(2).find(|pair| pair[0].succ_opt() != Some(pair[1])) {
	Some(pair) => Err(Error::InvalidRange(format!(
	    "{} is not followed by {}", pair[0], pair[1]))),
	None => Ok(()),
    }
}

fn day_offset(date_range: &[NaiveDate], date: NaiveDate) -> Option<usize> {
    let first = *date_range.first()?;
    let offset = (date - first).num_days();
    match offset >= 0 && (offset as usize) < date_range.len() {
	true => Some(offset as usize),
	false => None,
    }
}


#[cfg(test)]
mod tests {

    use super::*;

    fn date(day: u32) -> NaiveDate {
	NaiveDate::from_ymd_opt(2020, 3, day).unwrap()
    }

    fn days(n: u32) -> Vec<NaiveDate> {
	(1..=n).map(date).collect()
    }

    fn region(key: &str, population: u64) -> Region {
	Region { key: key.to_string(), name: format!("Region {}", key), population }
    }

    fn cases(key: &str, day: u32, cases: u64) -> Record {
	Record { key: key.to_string(), date: date(day),
		 counts: Counts { cases, deaths: 0, recovered: 0 } }
    }

    fn rolling_cases(rows: &[IncidenceRow], key: &str) -> Vec<f64> {
	rows.iter().filter(|r| r.key == key).map(|r| r.rolling.cases).collect()
    }

    #[test]
    fn every_region_gets_every_day() {
	let regions = vec![region("02", 1000), region("01", 2000), region("03", 500)];
	let records = vec![cases("01", 3, 4), cases("03", 1, 1), cases("03", 9, 2)];
	let rows = compute_rolling_incidence(&records, &regions, &days(10)).unwrap();

	assert_eq!(rows.len(), 30);
	for key in &["01", "02", "03"] {
	    let dates : Vec<NaiveDate> = rows.iter().filter(|r| r.key == *key)
		.map(|r| r.date).collect();
	    assert_eq!(dates, days(10));
	}
	let keys : Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
	let mut sorted = keys.clone();
	sorted.sort();
	assert_eq!(keys, sorted);
    }

    #[test]
    fn reported_rows_keep_counts_and_rates() {
	let regions = vec![region("05315", 83_000)];
	let records = vec![Record {
	    key: "05315".to_string(), date: date(2),
	    counts: Counts { cases: 7, deaths: 2, recovered: 5 },
	}];
	let rows = compute_rolling_incidence(&records, &regions, &days(3)).unwrap();

	let row = &rows[1];
	assert!(row.reported);
	assert_eq!(row.counts, Counts { cases: 7, deaths: 2, recovered: 5 });
	assert!((row.rate.cases - 100_000.0 * 7.0 / 83_000.0).abs() < 1e-9);
	assert!((row.rate.deaths - 100_000.0 * 2.0 / 83_000.0).abs() < 1e-9);
	assert!((row.rate.recovered - 100_000.0 * 5.0 / 83_000.0).abs() < 1e-9);

	for row in &[&rows[0], &rows[2]] {
	    assert!(!row.reported);
	    assert_eq!(row.counts, Counts::default());
	    assert_eq!(row.rate, Rates::default());
	}
	assert!((rows[2].rolling.deaths - rows[1].rate.deaths).abs() < 1e-9);
    }

    #[test]
    fn single_report_stays_in_window_for_seven_days() {
	let regions = vec![region("1", 100_000), region("2", 50_000)];
	let records = vec![cases("1", 5, 10)];
	let rows = compute_rolling_incidence(&records, &regions, &days(14)).unwrap();

	let mut expected = vec![0.0; 4];
	expected.extend(vec![10.0; 7]);
	expected.extend(vec![0.0; 3]);
	assert_eq!(rolling_cases(&rows, "1"), expected);
	assert_eq!(rolling_cases(&rows, "2"), vec![0.0; 14]);
	assert!((rows[4].rate.cases - 10.0).abs() < 1e-9);
    }

    #[test]
    fn gap_days_overwrite_their_slot() {
	let regions = vec![region("A", 100_000), region("B", 100_000), region("C", 100_000)];
	let records : Vec<Record> = vec![1, 2, 3, 8, 9, 10].into_iter()
	    .map(|day| cases("A", day, day as u64)).collect();
	let rows = compute_rolling_incidence(&records, &regions, &days(10)).unwrap();

	let rolling = rolling_cases(&rows, "A");
	assert_eq!(rolling[..7], [1.0, 3.0, 6.0, 6.0, 6.0, 6.0, 6.0]);
	// day 8 replaces day 1 in slot 0, days 2 and 3 are still held
	assert_eq!(rolling[7], 8.0 + 2.0 + 3.0);
	assert_eq!(rolling[8], 8.0 + 9.0 + 3.0);
	assert_eq!(rolling[9], 8.0 + 9.0 + 10.0);
	assert!(rows.iter().filter(|r| r.key != "A").all(|r| r.rolling.cases == 0.0));
    }

    #[test]
    fn zero_report_counts_as_gap_in_window() {
	let regions = vec![region("A", 100_000)];
	let with_zero = vec![cases("A", 1, 5), cases("A", 2, 0)];
	let without = vec![cases("A", 1, 5)];
	let a = compute_rolling_incidence(&with_zero, &regions, &days(9)).unwrap();
	let b = compute_rolling_incidence(&without, &regions, &days(9)).unwrap();

	assert_eq!(rolling_cases(&a, "A"), rolling_cases(&b, "A"));
	assert!(a[1].reported);
	assert!(!b[1].reported);
    }

    #[test]
    fn repeated_runs_are_identical() {
	let regions = vec![region("01", 3_000), region("02", 7_000)];
	let records = vec![cases("01", 1, 3), cases("02", 4, 9), cases("01", 6, 1)];
	let first = compute_rolling_incidence(&records, &regions, &days(8)).unwrap();
	let second = compute_rolling_incidence(&records, &regions, &days(8)).unwrap();
	assert_eq!(first, second);
	assert_eq!(format!("{:?}", first), format!("{:?}", second));
    }

    #[test]
    fn unknown_region_is_rejected() {
	let regions = vec![region("01", 1000)];
	let records = vec![cases("01", 1, 1), cases("99", 2, 1)];
	match compute_rolling_incidence(&records, &regions, &days(3)) {
	    Err(Error::UnknownRegion { key, date: d }) => {
		assert_eq!(key, "99");
		assert_eq!(d, date(2));
	    }
	    other => panic!("unexpected result {:?}", other),
	}
    }

    #[test]
    fn records_outside_range_are_rejected() {
	let regions = vec![region("01", 1000)];
	let records = vec![cases("01", 5, 1)];
	assert!(matches!(compute_rolling_incidence(&records, &regions, &days(4)),
			 Err(Error::Range { .. })));
	assert!(matches!(compute_rolling_incidence(&records, &regions, &[]),
			 Err(Error::Range { .. })));
    }

    #[test]
    fn broken_ranges_are_rejected() {
	let regions = vec![region("01", 1000)];
	let gap = vec![date(1), date(2), date(4)];
	let reversed = vec![date(2), date(1)];
	assert!(matches!(compute_rolling_incidence(&[], &regions, &gap),
			 Err(Error::InvalidRange(_))));
	assert!(matches!(compute_rolling_incidence(&[], &regions, &reversed),
			 Err(Error::InvalidRange(_))));
    }

    #[test]
    fn zero_population_fails_only_with_reports() {
	let regions = vec![region("01", 0), region("02", 1000)];
	let rows = compute_rolling_incidence(&[cases("02", 1, 1)], &regions, &days(2)).unwrap();
	assert_eq!(rows.len(), 4);

	match compute_rolling_incidence(&[cases("01", 2, 1)], &regions, &days(2)) {
	    Err(Error::Data { key, date: d, .. }) => {
		assert_eq!(key, "01");
		assert_eq!(d, Some(date(2)));
	    }
	    other => panic!("unexpected result {:?}", other),
	}
    }

    #[test]
    fn duplicates_are_rejected() {
	let regions = vec![region("01", 1000)];
	let records = vec![cases("01", 1, 1), cases("01", 1, 2)];
	assert!(matches!(compute_rolling_incidence(&records, &regions, &days(2)),
			 Err(Error::Data { .. })));
	let twice = vec![region("01", 1000), region("01", 2000)];
	assert!(matches!(compute_rolling_incidence(&[], &twice, &days(2)),
			 Err(Error::Data { .. })));
    }

    #[test]
    fn progress_counts_regions() {
	let regions = vec![region("01", 1000), region("02", 1000), region("03", 1000)];
	let mut seen = Vec::new();
	compute_rolling_incidence_with_progress(&[], &regions, &days(2),
						|done,total| seen.push((done,total))).unwrap();
	assert_eq!(seen, vec![(1,3), (2,3), (3,3)]);
    }

    #[test]
    fn date_span_covers_records() {
	let records = vec![cases("01", 4, 1), cases("02", 2, 1), cases("01", 6, 1)];
	assert_eq!(date_span(&records).unwrap(), vec![date(2), date(3), date(4), date(5), date(6)]);
	assert!(matches!(date_span(&[]), Err(Error::MissingData)));
    }

}

use std::path::Path;
use std::collections::BTreeMap;

use serde::Deserialize;
use log::info;

use super::error::{Result,Error};
use super::incidence::Region;
use super::rki::{self,Level,pad_key};


/// County reference data as published with the RKI county layer.
#[derive(Deserialize,Debug,Clone)]
pub struct Kreis {
    #[serde(rename = "AGS", default)]
    pub ags: Option<String>,
    #[serde(rename = "RS", default)]
    pub rs: Option<String>,
    #[serde(rename = "GEN", default)]
    pub name: Option<String>,
    #[serde(rename = "EWZ")]
    pub population: i64,
    #[serde(rename = "BL_ID")]
    pub state_id: String,
    #[serde(rename = "BL")]
    pub state: String,
    #[serde(rename = "EWZ_BL")]
    pub state_population: i64,
}

impl Kreis {

    /// The county key. Berlin districts carry no AGS and use their RS.
    pub fn key(&self) -> Result<String> {
	let ags = self.ags.as_deref().map(str::trim).filter(|ags| !ags.is_empty());
	let rs = self.rs.as_deref().map(str::trim).filter(|rs| !rs.is_empty());
	match ags.or(rs) {
	    Some(key) => pad_key(key, Level::County.width()),
	    None => Err(Error::data(self.name.clone().unwrap_or_default(), None,
				    "neither AGS nor RS given")),
	}
    }

}


pub fn kreise(source: &str, cache_path: &Path) -> Result<Vec<Kreis>> {
    let text = rki::read_source(source, cache_path)?;
    let kreise = csv::Reader::from_reader(text.as_bytes()).deserialize()
	.collect::<std::result::Result<Vec<Kreis>,_>>()?;
    info!("Read {} counties", kreise.len());
    Ok(kreise)
}


pub fn regions(kreise: &[Kreis], level: Level) -> Result<Vec<Region>> {
    match level {
	Level::County => counties(kreise),
	Level::State => states(kreise),
    }
}


pub fn counties(kreise: &[Kreis]) -> Result<Vec<Region>> {
    kreise.iter().map(|kreis| {
	let key = kreis.key()?;
	Ok(Region {
	    name: kreis.name.clone().unwrap_or_else(|| key.clone()),
	    population: population(&key, kreis.population)?,
	    key,
	})
    }).collect()
}


/// One region per state, sorted by key.
pub fn states(kreise: &[Kreis]) -> Result<Vec<Region>> {

    let mut states : BTreeMap<String,Region> = BTreeMap::new();

    for kreis in kreise {
	let key = pad_key(&kreis.state_id, Level::State.width())?;
	let population = population(&key, kreis.state_population)?;
	let state = states.entry(key.clone()).or_insert_with(|| Region {
	    key: key.clone(),
	    name: kreis.state.clone(),
	    population,
	});
	if state.population != population {
	    return Err(Error::data(key, None, format!(
		"conflicting state populations {} and {}", state.population, population)));
	}
    }

    Ok(states.into_values().collect())

}


fn population(key: &str, value: i64) -> Result<u64> {
    match value < 0 {
	true => Err(Error::data(key, None, format!("negative population {}", value))),
	false => Ok(value as u64),
    }
}

//! Registry of known datasets and the vintages each one publishes.

use url::Url;

use crate::error::CensusError;

/// Which reference years a dataset publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vintages {
    /// Every year in `first..=last` except those listed in `missing`.
    Range {
        first: u16,
        last: u16,
        missing: &'static [u16],
    },
    /// An explicit list of years.
    Years(&'static [u16]),
}

impl Vintages {
    pub fn contains(&self, year: u16) -> bool {
        match self {
            Vintages::Range { first, last, missing } => {
                (*first..=*last).contains(&year) && !missing.contains(&year)
            }
            Vintages::Years(years) => years.contains(&year),
        }
    }

    /// All valid years in ascending order.
    pub fn years(&self) -> Vec<u16> {
        match self {
            Vintages::Range { first, last, missing } => {
                (*first..=*last).filter(|y| !missing.contains(y)).collect()
            }
            Vintages::Years(years) => {
                let mut years = years.to_vec();
                years.sort_unstable();
                years
            }
        }
    }
}

/// A Census data product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dataset {
    /// Identifier used by callers (e.g. `acs5`).
    pub id: &'static str,
    /// URL segment after the vintage (e.g. `acs/acs5`).
    pub path: &'static str,
    pub description: &'static str,
    pub vintages: Vintages,
}

/// Known datasets.
pub const DATASETS: &[Dataset] = &[
    Dataset {
        id: "acs5",
        path: "acs/acs5",
        description: "American Community Survey 5-year estimates, detailed tables",
        vintages: Vintages::Range { first: 2009, last: 2022, missing: &[] },
    },
    Dataset {
        id: "acs5/subject",
        path: "acs/acs5/subject",
        description: "American Community Survey 5-year estimates, subject tables",
        vintages: Vintages::Range { first: 2010, last: 2022, missing: &[] },
    },
    Dataset {
        id: "acs5/profile",
        path: "acs/acs5/profile",
        description: "American Community Survey 5-year estimates, data profiles",
        vintages: Vintages::Range { first: 2009, last: 2022, missing: &[] },
    },
    Dataset {
        id: "acs1",
        path: "acs/acs1",
        description: "American Community Survey 1-year estimates, detailed tables",
        // No standard 1-year release for 2020.
        vintages: Vintages::Range { first: 2005, last: 2022, missing: &[2020] },
    },
    Dataset {
        id: "sf1",
        path: "dec/sf1",
        description: "Decennial Census Summary File 1",
        vintages: Vintages::Years(&[2000, 2010]),
    },
    Dataset {
        id: "sf3",
        path: "dec/sf3",
        description: "Decennial Census Summary File 3",
        vintages: Vintages::Years(&[2000]),
    },
    Dataset {
        id: "pl",
        path: "dec/pl",
        description: "Decennial Census redistricting data (Public Law 94-171)",
        vintages: Vintages::Years(&[2000, 2010, 2020]),
    },
];

/// Looks up a dataset by id.
pub fn find_dataset(id: &str) -> Option<&'static Dataset> {
    DATASETS.iter().find(|d| d.id == id)
}

impl Dataset {
    pub fn supports(&self, year: u16) -> bool {
        self.vintages.contains(year)
    }

    /// `{base}/{year}/{path}`.
    ///
    /// # Errors
    ///
    /// Returns `CensusError::Configuration` if `year` is not a vintage of
    /// this dataset or `base` cannot take a path.
    pub fn endpoint(&self, base: &Url, year: u16) -> Result<Url, CensusError> {
        if !self.supports(year) {
            return Err(CensusError::Configuration(format!(
                "{} has no {} vintage (valid: {:?})",
                self.id,
                year,
                self.vintages.years()
            )));
        }

        let mut url = base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                CensusError::Configuration(format!("Base URL cannot hold a path: {}", base))
            })?;
            segments.pop_if_empty();
            segments.push(&year.to_string());
            segments.extend(self.path.split('/'));
        }
        Ok(url)
    }
}

/// Resolves `dataset_id` and `year` against the registry.
///
/// # Errors
///
/// Returns `CensusError::Configuration` for an unknown dataset or year.
pub fn resolve_endpoint(base: &Url, dataset_id: &str, year: u16) -> Result<Url, CensusError> {
    let dataset = find_dataset(dataset_id)
        .ok_or_else(|| CensusError::Configuration(format!("Unknown dataset: {}", dataset_id)))?;
    dataset.endpoint(base, year)
}

use crate::sanitize::single_line;
use serde::{Deserialize, Deserializer};
use std::fmt::Write as _;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ListingError {
    #[error("could not open facility source {path:?}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed facility source: {0}")]
    Malformed(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FacilityRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "Contact")]
    pub contact: String,
    #[serde(rename = "Speciality")]
    pub speciality: String,
    #[serde(rename = "Free_Treatment", deserialize_with = "yes_no")]
    pub free_treatment: bool,
}

fn yes_no<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "1" => Ok(true),
        "no" | "n" | "false" | "0" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected yes/no for Free_Treatment, got {other:?}"
        ))),
    }
}

/// Rows in source order. Extra columns are ignored.
pub fn read_facilities<R: Read>(reader: R) -> Result<Vec<FacilityRecord>, ListingError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

pub fn load_facilities(path: &Path) -> Result<Vec<FacilityRecord>, ListingError> {
    let file = std::fs::File::open(path).map_err(|source| ListingError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    read_facilities(file)
}

/// One blank-line separated group per facility. Each field is collapsed
/// onto a single line so a multi-line cell cannot split its row.
pub fn render(facilities: &[FacilityRecord]) -> String {
    let mut out = String::new();
    for (i, facility) in facilities.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "{}", single_line(&facility.name));
        let _ = writeln!(out, "  Location: {}", single_line(&facility.location));
        let _ = writeln!(out, "  Contact: {}", single_line(&facility.contact));
        let _ = writeln!(out, "  Speciality: {}", single_line(&facility.speciality));
        let _ = writeln!(
            out,
            "  Free Treatment: {}",
            if facility.free_treatment { "Yes" } else { "No" }
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    const HEADER: &str = "Name,Location,Contact,Speciality,Free_Treatment\n";

    fn source(rows: usize) -> String {
        let mut csv = HEADER.to_string();
        for i in 0..rows {
            csv.push_str(&format!(
                "Hospital {i},\"City {i}, State\",+91 000-{i:04},Neurology,{}\n",
                if i % 2 == 0 { "Yes" } else { "No" }
            ));
        }
        csv
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(5)]
    fn renders_one_group_per_row_in_order(#[case] rows: usize) {
        let facilities = read_facilities(source(rows).as_bytes()).unwrap();
        assert_eq!(facilities.len(), rows);

        let rendered = render(&facilities);
        let groups: Vec<&str> = rendered
            .split("\n\n")
            .filter(|group| !group.trim().is_empty())
            .collect();
        assert_eq!(groups.len(), rows);
        for (i, group) in groups.iter().enumerate() {
            assert!(group.starts_with(&format!("Hospital {i}\n")));
            assert!(group.contains(&format!("Location: City {i}, State")));
        }
    }

    #[test]
    fn multi_line_cells_stay_in_their_row() {
        let csv = format!(
            "{HEADER}\"Civil Hospital\",\"Asarwa\n\nAhmedabad\",079-2268,Neurology,Yes\n\
             Apollo,Chennai,044-2829,Oncology,No\n"
        );
        let facilities = read_facilities(csv.as_bytes()).unwrap();
        assert_eq!(facilities.len(), 2);

        let rendered = render(&facilities);
        let groups: Vec<&str> = rendered.split("\n\n").collect();
        assert_eq!(groups.len(), 2);
        assert!(groups[0].contains("Location: Asarwa Ahmedabad\n"));
        assert!(groups[1].starts_with("Apollo\n"));
    }

    #[test]
    fn parses_flag_and_ignores_extra_columns() {
        let csv = "Name,Location,Contact,Speciality,Free_Treatment,Beds\n\
                   City Care, Pune ,020-1234,Oncology, TRUE ,40\n";
        let facilities = read_facilities(csv.as_bytes()).unwrap();
        assert_eq!(
            facilities,
            vec![FacilityRecord {
                name: "City Care".to_string(),
                location: "Pune".to_string(),
                contact: "020-1234".to_string(),
                speciality: "Oncology".to_string(),
                free_treatment: true,
            }]
        );
    }

    #[test]
    fn missing_column_or_bad_flag_is_malformed() {
        let missing = "Name,Location,Contact,Speciality\nA,B,C,D\n";
        assert!(matches!(
            read_facilities(missing.as_bytes()),
            Err(ListingError::Malformed(_))
        ));

        let bad_flag = format!("{HEADER}A,B,C,D,sometimes\n");
        assert!(matches!(
            read_facilities(bad_flag.as_bytes()),
            Err(ListingError::Malformed(_))
        ));
    }

    #[test]
    fn loads_from_disk_and_reports_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(source(2).as_bytes()).unwrap();
        assert_eq!(load_facilities(file.path()).unwrap().len(), 2);

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("facilities.csv");
        assert!(matches!(
            load_facilities(&missing),
            Err(ListingError::Open { .. })
        ));
    }
}

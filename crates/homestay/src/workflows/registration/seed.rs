use std::io::Read;

use serde::{Deserialize, Deserializer};

use super::domain::ApplicationForm;

/// One application to create during seeding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedApplication {
    pub owner_id: String,
    pub form: ApplicationForm,
    pub submit: bool,
}

/// Parse `owner_id, property_name, category, total_rooms, validity_years, female_owner,
/// special_region, submit` rows.
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<SeedApplication>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut seeds = Vec::new();

    for row in csv_reader.deserialize::<SeedRow>() {
        let row = row?;
        seeds.push(SeedApplication {
            owner_id: row.owner_id,
            form: ApplicationForm {
                property_name: row.property_name,
                category: row.category,
                total_rooms: row.total_rooms,
                validity_years: row.validity_years,
                female_owner: row.female_owner,
                special_region: row.special_region,
                documents: Vec::new(),
            },
            submit: row.submit,
        });
    }

    Ok(seeds)
}

/// Fixed sample data covering each category and both review tiers.
pub fn demo_applications() -> Vec<SeedApplication> {
    let sample = |owner: &str, name: &str, category: &str, rooms: u32, years: u32, submit: bool| {
        SeedApplication {
            owner_id: owner.to_string(),
            form: ApplicationForm {
                property_name: name.to_string(),
                category: category.to_string(),
                total_rooms: rooms,
                validity_years: years,
                female_owner: false,
                special_region: false,
                documents: Vec::new(),
            },
            submit,
        }
    };

    let mut female_owned = sample("owner-demo-2", "Deodar Heights", "diamond", 10, 3, true);
    female_owned.form.female_owner = true;

    vec![
        sample("owner-demo-1", "Apple Orchard Stay", "silver", 4, 1, true),
        female_owned,
        sample("owner-demo-3", "River Bend Cottage", "gold", 6, 2, false),
    ]
}

#[derive(Debug, Deserialize)]
struct SeedRow {
    owner_id: String,
    property_name: String,
    category: String,
    total_rooms: u32,
    validity_years: u32,
    #[serde(default, deserialize_with = "flexible_bool")]
    female_owner: bool,
    #[serde(default, deserialize_with = "flexible_bool")]
    special_region: bool,
    #[serde(default, deserialize_with = "flexible_bool")]
    submit: bool,
}

fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "no" | "n" | "0" => Ok(false),
        "true" | "yes" | "y" | "1" => Ok(true),
        other => Err(serde::de::Error::custom(format!(
            "expected a yes/no value, found '{other}'"
        ))),
    }
}

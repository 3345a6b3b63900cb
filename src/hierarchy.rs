// src/hierarchy.rs
//! Continent -> {ski regions, countries} index over resorts with a current entry,
//! plus the tables used to classify catalog resorts geographically.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::model::Resort;

pub const CONTINENT_ORDER: [&str; 5] = [
    "North America",
    "Europe",
    "Asia",
    "South America",
    "Oceania",
];

pub const OTHER_CONTINENT: &str = "Other";
pub const UNKNOWN_COUNTRY: &str = "unknown";

const CONTINENTS: &[(&str, &str)] = &[
    ("US", "North America"),
    ("CA", "North America"),
    ("FR", "Europe"),
    ("AT", "Europe"),
    ("CH", "Europe"),
    ("IT", "Europe"),
    ("DE", "Europe"),
    ("NO", "Europe"),
    ("SE", "Europe"),
    ("FI", "Europe"),
    ("ES", "Europe"),
    ("AD", "Europe"),
    ("SK", "Europe"),
    ("SI", "Europe"),
    ("BG", "Europe"),
    ("RO", "Europe"),
    ("GB", "Europe"),
    ("JP", "Asia"),
    ("KR", "Asia"),
    ("CN", "Asia"),
    ("AR", "South America"),
    ("CL", "South America"),
    ("AU", "Oceania"),
    ("NZ", "Oceania"),
];

/// Keyed by state (subregion).
const US_SKI_REGIONS: &[(&str, &str)] = &[
    ("Colorado", "Colorado"),
    ("Utah", "Utah"),
    ("California", "California"),
    ("Nevada", "California"),
    ("Washington", "Pacific Northwest"),
    ("Oregon", "Pacific Northwest"),
    ("Montana", "Mountain West"),
    ("Wyoming", "Mountain West"),
    ("Idaho", "Mountain West"),
    ("Vermont", "Northeast USA"),
    ("New Hampshire", "Northeast USA"),
    ("New York", "Northeast USA"),
    ("Maine", "Northeast USA"),
];

/// Keyed by province (subregion).
const CA_SKI_REGIONS: &[(&str, &str)] = &[
    ("British Columbia", "British Columbia"),
    ("Alberta", "Alberta"),
    ("Quebec", "Eastern Canada"),
    ("Ontario", "Eastern Canada"),
    ("Newfoundland", "Eastern Canada"),
];

const COUNTRY_SKI_REGIONS: &[(&str, &str)] = &[
    ("FR", "French Alps"),
    ("CH", "Swiss Alps"),
    ("AT", "Austrian Alps"),
    ("IT", "Italian Alps"),
    ("NO", "Scandinavia"),
    ("SE", "Scandinavia"),
    ("FI", "Scandinavia"),
    ("ES", "Pyrenees & Iberia"),
    ("AD", "Pyrenees & Iberia"),
    ("AR", "Andes"),
    ("CL", "Andes"),
    ("AU", "Australian Alps"),
    ("NZ", "Southern Alps"),
];

const COUNTRY_LABELS: &[(&str, &str, &str)] = &[
    ("US", "United States", "🇺🇸"),
    ("CA", "Canada", "🇨🇦"),
    ("FR", "France", "🇫🇷"),
    ("AT", "Austria", "🇦🇹"),
    ("CH", "Switzerland", "🇨🇭"),
    ("IT", "Italy", "🇮🇹"),
    ("DE", "Germany", "🇩🇪"),
    ("NO", "Norway", "🇳🇴"),
    ("SE", "Sweden", "🇸🇪"),
    ("FI", "Finland", "🇫🇮"),
    ("ES", "Spain", "🇪🇸"),
    ("AD", "Andorra", "🇦🇩"),
    ("SK", "Slovakia", "🇸🇰"),
    ("SI", "Slovenia", "🇸🇮"),
    ("BG", "Bulgaria", "🇧🇬"),
    ("RO", "Romania", "🇷🇴"),
    ("GB", "Great Britain", "🇬🇧"),
    ("JP", "Japan", "🇯🇵"),
    ("KR", "South Korea", "🇰🇷"),
    ("CN", "China", "🇨🇳"),
    ("AR", "Argentina", "🇦🇷"),
    ("CL", "Chile", "🇨🇱"),
    ("AU", "Australia", "🇦🇺"),
    ("NZ", "New Zealand", "🇳🇿"),
];

fn lookup(table: &[(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| *v)
}

/// `"Pyrenees & Iberia"` -> `"pyrenees-and-iberia"`.
pub fn slugify(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .replace(' ', "-")
        .replace('&', "and")
        .replace('/', "-")
}

pub fn continent_for(country: &str) -> Option<&'static str> {
    lookup(CONTINENTS, country)
}

pub fn ski_region_for(
    country: &str,
    region: Option<&str>,
    subregion: Option<&str>,
) -> Option<&'static str> {
    match country.to_ascii_uppercase().as_str() {
        "US" => subregion.and_then(|s| lookup(US_SKI_REGIONS, s)),
        "CA" => subregion.and_then(|s| lookup(CA_SKI_REGIONS, s)),
        "JP" => Some(match region {
            Some(r) if r.eq_ignore_ascii_case("Hokkaido") => "Hokkaido",
            _ => "Honshu",
        }),
        other => lookup(COUNTRY_SKI_REGIONS, other),
    }
}

pub fn country_label(code: &str) -> String {
    COUNTRY_LABELS
        .iter()
        .find(|(c, _, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, label, _)| (*label).to_string())
        .unwrap_or_else(|| code.to_string())
}

pub fn country_flag(code: &str) -> &'static str {
    COUNTRY_LABELS
        .iter()
        .find(|(c, _, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, _, flag)| *flag)
        .unwrap_or("")
}

/// Fill in any missing continent / ski region. Unknown values fall back to
/// `Other` buckets so every resort lands somewhere in the hierarchy.
pub fn classify(resort: &mut Resort) {
    if let Some(code) = resort.country.as_mut() {
        *code = code.trim().to_ascii_uppercase();
    }
    let country = resort.country.as_deref().filter(|c| !c.is_empty());

    if resort.continent.is_none() {
        resort.continent = Some(
            country
                .and_then(continent_for)
                .unwrap_or(OTHER_CONTINENT)
                .to_string(),
        );
    }
    if resort.ski_region.is_none() {
        let derived = country.and_then(|c| {
            ski_region_for(c, resort.region.as_deref(), resort.subregion.as_deref())
        });
        resort.ski_region = Some(match derived {
            Some(sr) => sr.to_string(),
            None => format!("Other {}", continent_label(resort)),
        });
    }
}

pub fn continent_label(resort: &Resort) -> &str {
    resort.continent.as_deref().unwrap_or(OTHER_CONTINENT)
}

pub fn ski_region_label(resort: &Resort) -> String {
    match resort.ski_region.as_deref() {
        Some(sr) => sr.to_string(),
        None => format!("Other {}", continent_label(resort)),
    }
}

pub fn country_code(resort: &Resort) -> &str {
    resort
        .country
        .as_deref()
        .filter(|c| !c.is_empty())
        .unwrap_or(UNKNOWN_COUNTRY)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkiRegionNode {
    pub slug: String,
    pub label: String,
    pub resort_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryNode {
    pub code: String,
    pub label: String,
    pub resort_count: usize,
    pub flag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinentNode {
    pub slug: String,
    pub label: String,
    pub resort_count: usize,
    pub ski_regions: Vec<SkiRegionNode>,
    pub countries: Vec<CountryNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Hierarchy {
    pub continents: Vec<ContinentNode>,
}

#[derive(Default)]
struct ContinentAcc {
    total: usize,
    ski_regions: HashMap<String, usize>,
    countries: HashMap<String, usize>,
}

pub struct HierarchyIndexer;

impl HierarchyIndexer {
    /// Callers pass only resorts that have an entry in the current run.
    pub fn build<'a>(resorts: impl IntoIterator<Item = &'a Resort>) -> Hierarchy {
        let mut acc: BTreeMap<String, ContinentAcc> = BTreeMap::new();
        for r in resorts {
            let c = acc.entry(continent_label(r).to_string()).or_default();
            c.total += 1;
            *c.ski_regions.entry(ski_region_label(r)).or_default() += 1;
            *c.countries.entry(country_code(r).to_string()).or_default() += 1;
        }

        let mut continents: Vec<ContinentNode> = acc
            .into_iter()
            .map(|(label, data)| {
                let mut ski_regions: Vec<SkiRegionNode> = data
                    .ski_regions
                    .into_iter()
                    .map(|(label, n)| SkiRegionNode {
                        slug: slugify(&label),
                        label,
                        resort_count: n,
                    })
                    .collect();
                ski_regions.sort_by(|a, b| {
                    b.resort_count.cmp(&a.resort_count).then_with(|| a.label.cmp(&b.label))
                });

                let mut countries: Vec<CountryNode> = data
                    .countries
                    .into_iter()
                    .map(|(code, n)| CountryNode {
                        label: country_label(&code),
                        flag: country_flag(&code).to_string(),
                        code,
                        resort_count: n,
                    })
                    .collect();
                countries.sort_by(|a, b| {
                    b.resort_count.cmp(&a.resort_count).then_with(|| a.label.cmp(&b.label))
                });

                ContinentNode {
                    slug: slugify(&label),
                    label,
                    resort_count: data.total,
                    ski_regions,
                    countries,
                }
            })
            .collect();

        continents.sort_by_key(|c| {
            let pos = CONTINENT_ORDER
                .iter()
                .position(|l| *l == c.label)
                .unwrap_or(CONTINENT_ORDER.len());
            (pos, c.label.clone())
        });
        Hierarchy { continents }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn resort(slug: &str, country: Option<&str>, region: Option<&str>, sub: Option<&str>) -> Resort {
        let mut r = Resort {
            id: Uuid::new_v4(),
            slug: slug.into(),
            name: slug.into(),
            latitude: 45.0,
            longitude: 7.0,
            elevation_base_m: None,
            elevation_summit_m: None,
            country: country.map(Into::into),
            region: region.map(Into::into),
            subregion: sub.map(Into::into),
            continent: None,
            ski_region: None,
            website_url: None,
        };
        classify(&mut r);
        r
    }

    #[test]
    fn slugify_matches_url_rules() {
        assert_eq!(slugify("Pyrenees & Iberia"), "pyrenees-and-iberia");
        assert_eq!(slugify("North America"), "north-america");
        assert_eq!(slugify("A/B"), "a-b");
    }

    #[test]
    fn classification_tables() {
        let r = resort("vail", Some("us"), Some("Rocky Mountains"), Some("Colorado"));
        assert_eq!(r.country.as_deref(), Some("US"));
        assert_eq!(r.continent.as_deref(), Some("North America"));
        assert_eq!(r.ski_region.as_deref(), Some("Colorado"));

        let r = resort("niseko", Some("JP"), Some("Hokkaido"), None);
        assert_eq!(r.ski_region.as_deref(), Some("Hokkaido"));
        let r = resort("hakuba", Some("JP"), Some("Nagano"), None);
        assert_eq!(r.ski_region.as_deref(), Some("Honshu"));

        let r = resort("portillo", Some("CL"), None, None);
        assert_eq!(r.continent.as_deref(), Some("South America"));
        assert_eq!(r.ski_region.as_deref(), Some("Andes"));

        let r = resort("zugspitze", Some("DE"), Some("Bavaria"), None);
        assert_eq!(r.ski_region.as_deref(), Some("Other Europe"));

        let r = resort("mystery", None, None, None);
        assert_eq!(r.continent.as_deref(), Some("Other"));
        assert_eq!(country_code(&r), UNKNOWN_COUNTRY);
    }

    #[test]
    fn counts_sum_at_every_level() {
        let resorts = vec![
            resort("vail", Some("US"), None, Some("Colorado")),
            resort("aspen", Some("US"), None, Some("Colorado")),
            resort("whistler", Some("CA"), None, Some("British Columbia")),
            resort("tiny-hill", Some("US"), None, Some("Iowa")),
            resort("chamonix", Some("FR"), None, None),
            resort("zermatt", Some("CH"), None, None),
            resort("zugspitze", Some("DE"), None, None),
            resort("niseko", Some("JP"), Some("Hokkaido"), None),
        ];
        let h = HierarchyIndexer::build(&resorts);

        let labels: Vec<&str> = h.continents.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["North America", "Europe", "Asia"]);

        let total: usize = h.continents.iter().map(|c| c.resort_count).sum();
        assert_eq!(total, resorts.len());
        for c in &h.continents {
            let by_region: usize = c.ski_regions.iter().map(|n| n.resort_count).sum();
            let by_country: usize = c.countries.iter().map(|n| n.resort_count).sum();
            assert_eq!(by_region, c.resort_count, "{}", c.label);
            assert_eq!(by_country, c.resort_count, "{}", c.label);
        }

        let na = &h.continents[0];
        assert_eq!(na.ski_regions[0].slug, "colorado");
        assert_eq!(na.ski_regions[0].resort_count, 2);
        assert_eq!(na.countries[0].code, "US");
        assert_eq!(na.countries[0].flag, "🇺🇸");
    }

    #[test]
    fn empty_input_gives_empty_tree() {
        assert!(HierarchyIndexer::build(std::iter::empty()).continents.is_empty());
    }
}
